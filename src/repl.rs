//! In-chat commands typed at the prompt.

pub const EXAMPLE_PROMPTS: [&str; 8] = [
    "Write a Python function to reverse a string",
    "Create a REST API endpoint in Flask",
    "Explain async/await in JavaScript",
    "Write a SQL query to find duplicates",
    "Create a unit test for a calculator function",
    "Write a CSS flexbox layout",
    "Explain what a closure is with examples",
    "Write a quick sort algorithm in Python",
];

pub const HELP: &str = "\
/reset     forget the conversation so far
/history   show the conversation so far
/examples  list example prompts
/help      show this message
/quit      exit";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command<'a> {
    Send(&'a str),
    Reset,
    History,
    Examples,
    Help,
    Quit,
    Blank,
    Unknown(&'a str),
}

impl<'a> Command<'a> {
    pub fn parse(line: &'a str) -> Self {
        let line = line.trim();
        if line.is_empty() {
            return Command::Blank;
        }
        if !line.starts_with('/') {
            return Command::Send(line);
        }
        match line {
            "/reset" | "/clear" => Command::Reset,
            "/history" => Command::History,
            "/examples" => Command::Examples,
            "/help" => Command::Help,
            "/quit" | "/exit" => Command::Quit,
            other => Command::Unknown(other),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_commands_and_messages() {
        assert_eq!(Command::parse("  /reset \n"), Command::Reset);
        assert_eq!(Command::parse("/exit"), Command::Quit);
        assert_eq!(Command::parse("   "), Command::Blank);
        assert_eq!(Command::parse("hello\n"), Command::Send("hello"));
        assert_eq!(Command::parse("/nope"), Command::Unknown("/nope"));
    }
}
