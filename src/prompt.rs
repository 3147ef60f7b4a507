//! Prompt assembly over a windowed chat history, and reply extraction from
//! raw completions.

use log::debug;

/// How many of the most recent turns are replayed to the model by default.
pub const DEFAULT_WINDOW: usize = 5;

/// Shown instead of an empty reply.
pub const FALLBACK_REPLY: &str =
    "I'm having trouble generating a response. Try rephrasing your question.";

/// One completed user/assistant exchange.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Turn {
    pub user: String,
    pub assistant: String,
}

impl Turn {
    pub fn new(user: impl Into<String>, assistant: impl Into<String>) -> Self {
        Self {
            user: user.into(),
            assistant: assistant.into(),
        }
    }
}

/// Turns of one conversation, oldest first.
///
/// Stored without a bound; the window is only applied when a prompt is built.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct History {
    turns: Vec<Turn>,
}

impl History {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn append(&mut self, turn: Turn) {
        self.turns.push(turn);
    }

    pub fn clear(&mut self) {
        self.turns.clear();
    }

    pub fn len(&self) -> usize {
        self.turns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }

    pub fn turns(&self) -> &[Turn] {
        &self.turns
    }

    /// The last `n` turns, or all of them if there are fewer.
    pub fn last_n(&self, n: usize) -> &[Turn] {
        let start = self.turns.len().saturating_sub(n);
        &self.turns[start..]
    }
}

impl FromIterator<Turn> for History {
    fn from_iter<I: IntoIterator<Item = Turn>>(iter: I) -> Self {
        Self {
            turns: iter.into_iter().collect(),
        }
    }
}

/// The textual layout of a prompt.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum PromptTemplate {
    /// `User:` / `Assistant:` dialogue
    #[default]
    Chat,
    /// `### Instruction:` / `### Response:` blocks
    Instruct,
}

impl PromptTemplate {
    fn push_turn(self, out: &mut String, turn: &Turn) {
        match self {
            PromptTemplate::Chat => {
                out.push_str("User: ");
                out.push_str(&turn.user);
                out.push_str("\nAssistant: ");
                out.push_str(&turn.assistant);
                out.push_str("\n\n");
            }
            PromptTemplate::Instruct => {
                out.push_str("### Instruction:\n");
                out.push_str(&turn.user);
                out.push_str("\n### Response:\n");
                out.push_str(&turn.assistant);
                out.push_str("\n\n");
            }
        }
    }

    fn push_open_turn(self, out: &mut String, message: &str) {
        match self {
            PromptTemplate::Chat => {
                out.push_str("User: ");
                out.push_str(message);
                out.push_str("\nAssistant:");
            }
            PromptTemplate::Instruct => {
                out.push_str("### Instruction:\n");
                out.push_str(message);
                out.push_str("\n### Response:\n");
            }
        }
    }

    /// Delimiters that mark the model running past its own turn: the start of
    /// the next user turn, then a second assistant turn. Both sit after a
    /// blank line, the way turns are separated in the prompt, so a reply line
    /// that merely begins with `User:` is kept.
    pub fn stop_markers(self) -> &'static [&'static str] {
        match self {
            PromptTemplate::Chat => &["\n\nUser:", "\n\nAssistant:"],
            PromptTemplate::Instruct => &["\n\n### Instruction:", "\n\n### Response:"],
        }
    }
}

/// Builds bounded prompts and cleans up what the model returns.
///
/// Holds no conversation state: the caller owns the [`History`] and passes it
/// in on every call, so one assembler can serve any number of sessions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PromptAssembler {
    template: PromptTemplate,
    fallback: String,
}

impl Default for PromptAssembler {
    fn default() -> Self {
        Self::new(PromptTemplate::default())
    }
}

impl PromptAssembler {
    pub fn new(template: PromptTemplate) -> Self {
        Self {
            template,
            fallback: FALLBACK_REPLY.to_string(),
        }
    }

    /// Replace the message returned when a completion yields no usable text.
    pub fn with_fallback(mut self, fallback: impl Into<String>) -> Self {
        self.fallback = fallback.into();
        self
    }

    pub fn fallback(&self) -> &str {
        &self.fallback
    }

    /// Render the last `window` turns of `history` followed by an open turn
    /// holding `message`.
    pub fn build_prompt(&self, history: &History, message: &str, window: usize) -> String {
        let context = history.last_n(window);
        let mut prompt = String::new();
        for turn in context {
            self.template.push_turn(&mut prompt, turn);
        }
        self.template.push_open_turn(&mut prompt, message);
        prompt
    }

    /// Strip the echoed `prompt` from `completion` and cut the reply at the
    /// first stop marker.
    ///
    /// Never fails: anything that leaves no text behind becomes the fallback
    /// message.
    pub fn extract_reply(&self, prompt: &str, completion: &str) -> String {
        let generated = strip_echo(prompt, completion);

        let end = self
            .template
            .stop_markers()
            .iter()
            .filter_map(|marker| generated.find(marker))
            .min()
            .unwrap_or(generated.len());

        let reply = generated[..end].trim();
        if reply.is_empty() {
            debug!("completion left an empty reply");
            self.fallback.clone()
        } else {
            reply.to_string()
        }
    }

    /// Strip the echoed `prompt` from a raw completion and trim it, with no
    /// marker truncation and no fallback. The result may be empty.
    pub fn extract_completion(&self, prompt: &str, completion: &str) -> String {
        strip_echo(prompt, completion).trim().to_string()
    }
}

fn strip_echo<'a>(prompt: &str, completion: &'a str) -> &'a str {
    completion
        .strip_prefix(prompt)
        .or_else(|| completion.strip_prefix(prompt.trim_end()))
        .unwrap_or_else(|| {
            debug!("completion does not start with the prompt, using all of it");
            completion
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn history(pairs: &[(&str, &str)]) -> History {
        pairs.iter().map(|(u, a)| Turn::new(*u, *a)).collect()
    }

    #[test]
    fn chat_prompt_layout() {
        let assembler = PromptAssembler::default();
        let prompt = assembler.build_prompt(&history(&[("hi", "hello")]), "bye", DEFAULT_WINDOW);
        assert_eq!(prompt, "User: hi\nAssistant: hello\n\nUser: bye\nAssistant:");
    }

    #[test]
    fn instruct_prompt_layout() {
        let assembler = PromptAssembler::new(PromptTemplate::Instruct);
        let prompt = assembler.build_prompt(&history(&[("a", "b")]), "c", 1);
        assert_eq!(
            prompt,
            "### Instruction:\na\n### Response:\nb\n\n### Instruction:\nc\n### Response:\n"
        );
    }

    #[test]
    fn prior_turns_keep_relative_order() {
        let assembler = PromptAssembler::default();
        let prompt = assembler.build_prompt(&history(&[("hi", "hello")]), "bye", 5);
        let hi = prompt.find("hi").unwrap();
        let hello = prompt.find("hello").unwrap();
        let bye = prompt.find("bye").unwrap();
        assert!(hi < hello && hello < bye);
    }

    #[test]
    fn window_keeps_most_recent_turns() {
        let turns: Vec<(String, String)> = (0..8)
            .map(|i| (format!("q{i}"), format!("a{i}")))
            .collect();
        let history: History = turns.iter().map(|(u, a)| Turn::new(u, a)).collect();
        let assembler = PromptAssembler::default();

        for window in 0..10 {
            let prompt = assembler.build_prompt(&history, "now", window);
            let included = window.min(history.len());
            assert_eq!(prompt.matches("\nAssistant: ").count(), included);

            let first_kept = history.len() - included;
            let mut last_pos = 0;
            for (i, (u, a)) in turns.iter().enumerate() {
                let line = format!("User: {u}\nAssistant: {a}\n\n");
                match prompt.find(&line) {
                    Some(pos) => {
                        assert!(i >= first_kept, "turn {i} leaked into window {window}");
                        assert!(pos >= last_pos);
                        last_pos = pos;
                    }
                    None => assert!(i < first_kept, "turn {i} missing from window {window}"),
                }
            }
        }
    }

    #[test]
    fn zero_window_is_only_the_new_message() {
        let assembler = PromptAssembler::default();
        let prompt = assembler.build_prompt(&history(&[("hi", "hello")]), "bye", 0);
        assert_eq!(prompt, "User: bye\nAssistant:");
    }

    #[test]
    fn build_prompt_is_deterministic() {
        let assembler = PromptAssembler::default();
        let h = history(&[("x", "y"), ("z", "w")]);
        assert_eq!(
            assembler.build_prompt(&h, "m", 1),
            assembler.build_prompt(&h, "m", 1)
        );
    }

    #[test]
    fn reply_is_the_suffix_after_the_prompt() {
        let assembler = PromptAssembler::default();
        let p = assembler.build_prompt(&History::new(), "say hello", 5);
        assert_eq!(assembler.extract_reply(&p, &format!("{p}hello")), "hello");
    }

    #[test]
    fn echo_only_completion_falls_back() {
        let assembler = PromptAssembler::default();
        let p = assembler.build_prompt(&History::new(), "anything", 5);
        assert_eq!(assembler.extract_reply(&p, &p), FALLBACK_REPLY);
    }

    #[test]
    fn reply_is_cut_at_the_next_user_turn() {
        let assembler = PromptAssembler::default();
        let p = assembler.build_prompt(&history(&[("hi", "hello")]), "q", 5);
        let raw = format!("{p}answer\n\nUser: next question");
        assert_eq!(assembler.extract_reply(&p, &raw), "answer");
    }

    #[test]
    fn reply_is_cut_at_a_second_assistant_turn() {
        let assembler = PromptAssembler::default();
        let p = assembler.build_prompt(&History::new(), "q", 5);
        let raw = format!("{p} first\n\nAssistant: again");
        assert_eq!(assembler.extract_reply(&p, &raw), "first");
    }

    #[test]
    fn single_newline_user_line_is_kept() {
        let assembler = PromptAssembler::default();
        let p = assembler.build_prompt(&History::new(), "show a log", 5);
        let raw = format!("{p} Sample log:\nUser: alice logged in\nUser: bob logged in");
        assert_eq!(
            assembler.extract_reply(&p, &raw),
            "Sample log:\nUser: alice logged in\nUser: bob logged in"
        );
    }

    #[test]
    fn completion_is_only_stripped_and_trimmed() {
        let assembler = PromptAssembler::default();
        let raw = "def f():\nprint('x')\n\nUser: name = input()\n";
        assert_eq!(
            assembler.extract_completion("def f():", raw),
            "print('x')\n\nUser: name = input()"
        );
        assert_eq!(assembler.extract_completion("def f():", "def f():  "), "");
    }

    #[test]
    fn marker_right_after_prompt_falls_back() {
        let assembler = PromptAssembler::default();
        let p = assembler.build_prompt(&History::new(), "q", 5);
        let raw = format!("{p}\n\nUser: who are you");
        assert_eq!(assembler.extract_reply(&p, &raw), FALLBACK_REPLY);
    }

    #[test]
    fn instruct_reply_is_cut_at_the_next_instruction() {
        let assembler = PromptAssembler::new(PromptTemplate::Instruct);
        let p = assembler.build_prompt(&History::new(), "q", 5);
        let raw = format!("{p}fn main() {{}}\n\n### Instruction:\nmore");
        assert_eq!(assembler.extract_reply(&p, &raw), "fn main() {}");
    }

    #[test]
    fn prompt_with_trailing_whitespace_still_strips() {
        let assembler = PromptAssembler::new(PromptTemplate::Instruct);
        let p = assembler.build_prompt(&History::new(), "q", 5);
        let raw = format!("{}reply", p.trim_end());
        assert_eq!(assembler.extract_reply(&p, &raw), "reply");
    }

    #[test]
    fn mismatched_prefix_uses_whole_completion() {
        let assembler = PromptAssembler::default();
        assert_eq!(
            assembler.extract_reply("User: q\nAssistant:", "  just text  "),
            "just text"
        );
    }

    #[test]
    fn empty_completion_falls_back_to_custom_message() {
        let assembler = PromptAssembler::default().with_fallback("nothing to say");
        assert_eq!(assembler.extract_reply("prompt", ""), "nothing to say");
        assert_eq!(assembler.extract_reply("prompt", "   \n"), "nothing to say");
    }

    #[test]
    fn history_clear_and_last_n() {
        let mut h = history(&[("a", "1"), ("b", "2"), ("c", "3")]);
        assert_eq!(h.last_n(2), &[Turn::new("b", "2"), Turn::new("c", "3")]);
        assert_eq!(h.last_n(10).len(), 3);
        assert!(h.last_n(0).is_empty());
        h.clear();
        assert!(h.is_empty());
    }
}
