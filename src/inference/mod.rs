//! Inference — the chat request/response streaming pipeline.
//!
//! This module handles all communication with the chat-completion provider:
//! - System + user prompt assembly (`prompt`)
//! - Model resolution and the cost lock (`config`)
//! - Credential discovery (`credentials`)
//! - Streaming requests and the offline mock (`client`)
//! - SSE framing and fragment decoding (`streaming`)

pub mod client;
pub mod config;
pub mod credentials;
pub mod errors;
pub mod prompt;
pub mod streaming;
pub mod types;

// Re-exports for convenience
pub use client::{ChatClient, SendOptions};
pub use config::{ChatConfig, CANONICAL_MODEL};
pub use credentials::{Credentials, EnvSecrets, SecretSource, SecretsFile};
pub use errors::{ErrorKind, InferenceError};
pub use prompt::{Prompt, PromptBuilder};
pub use streaming::{collect_text, decode_fragments, StreamHandle};
pub use types::{ChatMessage, Role, TextFragment};
