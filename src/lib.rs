pub mod args_handler;
pub mod error;
pub mod llm;
pub mod prompt;
pub mod repl;
pub mod session;

pub use error::ChatError;
pub use llm::{GenerateError, GenerationParams, TextGenerator};
pub use prompt::{History, PromptAssembler, PromptTemplate, Turn};
pub use session::{ChatConfig, ChatSession, Mode};
