use thiserror::Error;

use crate::llm::GenerateError;

#[derive(Debug, Error)]
pub enum ChatError {
    #[error("message is empty")]
    EmptyMessage,
    #[error(transparent)]
    Generation(#[from] GenerateError),
}

/// How many characters of an error make it into a reply.
const ERROR_PREVIEW_CHARS: usize = 200;

/// A displayable reply standing in for a failed generation.
pub fn failure_reply(err: &ChatError) -> String {
    let detail: String = err.to_string().chars().take(ERROR_PREVIEW_CHARS).collect();
    format!("Error during generation: {detail}")
}
