use thiserror::Error;

#[cfg(feature = "llama")]
mod llama_cpp;

#[cfg(feature = "llama")]
pub use llama_cpp::LlamaGenerator;

/// Hard cap on new tokens per reply, whatever the caller asks for.
pub const MAX_NEW_TOKENS: usize = 512;

#[derive(Debug, Error)]
pub enum GenerateError {
    #[error("the prompt is too long: {tokens} tokens plus {max_new_tokens} new tokens exceed the context of {n_ctx}")]
    PromptTooLong {
        tokens: usize,
        max_new_tokens: usize,
        n_ctx: usize,
    },
    #[error("inference failed: {0}")]
    Engine(String),
}

/// Sampling settings for one completion.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GenerationParams {
    pub temperature: f32,
    pub top_p: f32,
    pub repetition_penalty: f32,
    pub max_new_tokens: usize,
}

impl Default for GenerationParams {
    fn default() -> Self {
        Self {
            temperature: 0.2,
            top_p: 0.95,
            repetition_penalty: 1.2,
            max_new_tokens: 256,
        }
    }
}

impl GenerationParams {
    pub fn clamped(self) -> Self {
        Self {
            max_new_tokens: self.max_new_tokens.min(MAX_NEW_TOKENS),
            ..self
        }
    }
}

/// A text-generation engine.
///
/// The returned completion is expected, but not guaranteed, to begin with the
/// prompt itself.
pub trait TextGenerator {
    fn generate(&mut self, prompt: &str, params: &GenerationParams) -> Result<String, GenerateError>;
}

impl<G: TextGenerator + ?Sized> TextGenerator for Box<G> {
    fn generate(&mut self, prompt: &str, params: &GenerationParams) -> Result<String, GenerateError> {
        (**self).generate(prompt, params)
    }
}
