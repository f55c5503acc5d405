//! Agent Core — the conversation layer that drives the inference pipeline.
//!
//! Submodules:
//! - `conversation`: In-memory transcript with bounded retention and export
//! - `turn`: One-turn driver and its lifecycle phases
//! - `errors`: Agent-level error types

pub mod conversation;
pub mod errors;
pub mod turn;

// Re-exports for convenience
pub use conversation::{Transcript, TranscriptEntry};
pub use errors::AgentError;
pub use turn::{ChatSession, TurnOutcome, TurnPhase, TurnRequest};
