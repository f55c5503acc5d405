//! Inference error types.
//!
//! All errors implement `std::error::Error` via `thiserror`. Structured logging
//! is the caller's responsibility; these types carry the context needed to build
//! meaningful log entries.

use thiserror::Error;

/// Broad classification of an [`InferenceError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Missing credential or invalid configuration. Terminal for the turn.
    Configuration,
    /// Network, auth, rate-limit or transport failure from the provider.
    Provider,
    /// A single stream chunk could not be understood. Absorbed by the decoder.
    MalformedChunk,
}

/// Errors that can occur while talking to the chat-completion provider.
#[derive(Debug, Error)]
pub enum InferenceError {
    /// TCP/HTTP connection to the provider failed.
    #[error("connection failed to {endpoint}: {reason}")]
    ConnectionFailed { endpoint: String, reason: String },

    /// The provider did not respond within the configured timeout.
    #[error("inference timeout after {duration_secs}s")]
    Timeout { duration_secs: u64 },

    /// Non-2xx HTTP response from the provider.
    #[error("HTTP {status}: {body}")]
    HttpError { status: u16, body: String },

    /// Transport failure or provider-reported error in the middle of a stream.
    #[error("stream error: {reason}")]
    StreamError { reason: String },

    /// One SSE event did not parse as a completion chunk.
    #[error("malformed chunk: {reason} (data: {data})")]
    MalformedChunk { data: String, reason: String },

    /// The API credential was not found in any configured source.
    #[error("{key} not found. Add it to .env for local dev or to the secrets file in production.")]
    MissingCredential { key: String },

    /// Configuration loading or validation error.
    #[error("config error: {reason}")]
    ConfigError { reason: String },
}

impl InferenceError {
    /// Classify this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            InferenceError::MissingCredential { .. } | InferenceError::ConfigError { .. } => {
                ErrorKind::Configuration
            }
            InferenceError::MalformedChunk { .. } => ErrorKind::MalformedChunk,
            InferenceError::ConnectionFailed { .. }
            | InferenceError::Timeout { .. }
            | InferenceError::HttpError { .. }
            | InferenceError::StreamError { .. } => ErrorKind::Provider,
        }
    }

    pub fn is_configuration_error(&self) -> bool {
        self.kind() == ErrorKind::Configuration
    }

    pub fn is_provider_error(&self) -> bool {
        self.kind() == ErrorKind::Provider
    }

    pub fn is_malformed_chunk(&self) -> bool {
        self.kind() == ErrorKind::MalformedChunk
    }

    /// Extract the error body text, if this is an `HttpError`.
    pub fn error_body(&self) -> Option<&str> {
        match self {
            InferenceError::HttpError { body, .. } => Some(body),
            _ => None,
        }
    }

    /// The human-readable message from an OpenAI-style error body
    /// (`{"error": {"message": "..."}}`), if the body has that shape.
    pub fn provider_message(&self) -> Option<String> {
        let body = self.error_body()?;
        let value: serde_json::Value = serde_json::from_str(body).ok()?;
        value
            .get("error")?
            .get("message")?
            .as_str()
            .map(str::to_string)
    }
}

/// A failed read from the response body.
impl From<std::io::Error> for InferenceError {
    fn from(e: std::io::Error) -> Self {
        InferenceError::StreamError {
            reason: format!("stream read error: {e}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_credential_is_configuration() {
        let err = InferenceError::MissingCredential {
            key: "OPENAI_API_KEY".into(),
        };
        assert!(err.is_configuration_error());
        assert!(!err.is_provider_error());
        assert!(err.to_string().starts_with("OPENAI_API_KEY not found"));
    }

    #[test]
    fn test_transport_errors_are_provider() {
        let errors = [
            InferenceError::ConnectionFailed {
                endpoint: "http://localhost".into(),
                reason: "refused".into(),
            },
            InferenceError::Timeout { duration_secs: 180 },
            InferenceError::HttpError {
                status: 429,
                body: "rate limited".into(),
            },
            InferenceError::StreamError {
                reason: "reset".into(),
            },
        ];
        for err in &errors {
            assert!(err.is_provider_error(), "{err} should be a provider error");
        }
    }

    #[test]
    fn test_malformed_chunk_kind() {
        let err = InferenceError::MalformedChunk {
            data: "{".into(),
            reason: "EOF".into(),
        };
        assert!(err.is_malformed_chunk());
        assert_eq!(err.kind(), ErrorKind::MalformedChunk);
    }

    #[test]
    fn test_provider_message_from_openai_body() {
        let err = InferenceError::HttpError {
            status: 401,
            body: r#"{"error":{"message":"Incorrect API key provided","type":"invalid_request_error"}}"#
                .to_string(),
        };
        assert_eq!(
            err.provider_message().as_deref(),
            Some("Incorrect API key provided")
        );
    }

    #[test]
    fn test_provider_message_plain_body() {
        let err = InferenceError::HttpError {
            status: 502,
            body: "bad gateway".to_string(),
        };
        assert!(err.provider_message().is_none());
        assert_eq!(err.error_body(), Some("bad gateway"));
    }

    #[test]
    fn test_error_body_non_http() {
        let err = InferenceError::Timeout { duration_secs: 5 };
        assert!(err.error_body().is_none());
    }

    #[test]
    fn test_io_read_error_is_stream_error() {
        let err: InferenceError =
            std::io::Error::new(std::io::ErrorKind::ConnectionReset, "reset by peer").into();
        assert!(matches!(err, InferenceError::StreamError { .. }));
        assert!(err.is_provider_error());
        assert!(err.to_string().contains("reset by peer"));
    }
}
