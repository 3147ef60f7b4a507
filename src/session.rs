//! One conversation: its history, its prompt layout and the engine it talks to.

use log::{debug, error};

use crate::error::{failure_reply, ChatError};
use crate::llm::{GenerationParams, TextGenerator};
use crate::prompt::{History, PromptAssembler, PromptTemplate, Turn, DEFAULT_WINDOW};

#[derive(clap::ValueEnum, Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Mode {
    /// Multi-turn chat over a windowed history
    #[default]
    Chat,
    /// Each message is sent to the model as-is, without history
    Completion,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ChatConfig {
    pub mode: Mode,
    pub template: PromptTemplate,
    /// Prior turns replayed to the model; `None` replays the whole history.
    pub window: Option<usize>,
    pub generation: GenerationParams,
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            mode: Mode::default(),
            template: PromptTemplate::default(),
            window: Some(DEFAULT_WINDOW),
            generation: GenerationParams::default(),
        }
    }
}

impl ChatConfig {
    fn window_size(&self) -> usize {
        self.window.unwrap_or(usize::MAX)
    }
}

pub struct ChatSession<G> {
    generator: G,
    assembler: PromptAssembler,
    config: ChatConfig,
    history: History,
}

impl<G: TextGenerator> ChatSession<G> {
    pub fn new(generator: G, config: ChatConfig) -> Self {
        Self {
            generator,
            assembler: PromptAssembler::new(config.template),
            config,
            history: History::new(),
        }
    }

    pub fn history(&self) -> &History {
        &self.history
    }

    pub fn generator(&self) -> &G {
        &self.generator
    }

    pub fn config(&self) -> &ChatConfig {
        &self.config
    }

    pub fn reset(&mut self) {
        debug!("clearing {} turns of history", self.history.len());
        self.history.clear();
    }

    /// Run one round trip for `message`.
    ///
    /// A turn is recorded only when the model produced a usable reply.
    pub fn try_send(&mut self, message: &str) -> Result<String, ChatError> {
        let message = message.trim();
        if message.is_empty() {
            return Err(ChatError::EmptyMessage);
        }

        let prompt = match self.config.mode {
            Mode::Chat => {
                self.assembler
                    .build_prompt(&self.history, message, self.config.window_size())
            }
            Mode::Completion => message.to_string(),
        };
        debug!(
            "prompt of {} bytes with {} stored turns",
            prompt.len(),
            self.history.len()
        );

        let completion = self
            .generator
            .generate(&prompt, &self.config.generation.clamped())?;
        if self.config.mode == Mode::Completion {
            return Ok(self.assembler.extract_completion(&prompt, &completion));
        }

        let reply = self.assembler.extract_reply(&prompt, &completion);
        if reply != self.assembler.fallback() {
            self.history.append(Turn::new(message, reply.as_str()));
        }
        Ok(reply)
    }

    /// Like [`try_send`](Self::try_send), but always hands back displayable
    /// text. Returns `None` only for blank input.
    pub fn send(&mut self, message: &str) -> Option<String> {
        match self.try_send(message) {
            Ok(reply) => Some(reply),
            Err(ChatError::EmptyMessage) => None,
            Err(err) => {
                error!("error during inference: {err}");
                Some(failure_reply(&err))
            }
        }
    }
}
