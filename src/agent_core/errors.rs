//! Agent Core error types.

use thiserror::Error;

/// Errors raised by the transcript and turn driver.
#[derive(Debug, Error)]
pub enum AgentError {
    /// The user submitted blank input.
    #[error("message is empty")]
    EmptyMessage,

    /// Writing a transcript export failed.
    #[error("export to '{path}' failed: {reason}")]
    ExportFailed { path: String, reason: String },

    /// Serialization error.
    #[error("serialization error: {reason}")]
    SerializationError { reason: String },
}

impl From<serde_json::Error> for AgentError {
    fn from(e: serde_json::Error) -> Self {
        AgentError::SerializationError {
            reason: e.to_string(),
        }
    }
}
