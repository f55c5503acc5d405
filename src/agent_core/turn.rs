//! Turn driver — one user message in, one assistant reply out.
//!
//! Lifecycle of a turn:
//!
//! ```text
//! Idle → Requested → Streaming → Completed
//!             └────────┴───────→ Failed
//! ```
//!
//! The transcript is passed in and handed back; the driver appends the user
//! entry and the assistant entry (or the error notice that replaces it).

use futures::StreamExt;
use uuid::Uuid;

use crate::inference::client::{ChatClient, SendOptions};
use crate::inference::config::ChatConfig;
use crate::inference::credentials::Credentials;
use crate::inference::errors::InferenceError;
use crate::inference::prompt::PromptBuilder;
use crate::inference::streaming::decode_fragments;
use crate::inference::types::{Role, TextFragment};

use super::conversation::Transcript;
use super::errors::AgentError;

/// Prefix of the assistant entry recorded when a turn fails.
pub const ERROR_NOTICE_PREFIX: &str = "⚠️ Error generating response: ";

/// Where a turn is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TurnPhase {
    Idle,
    Requested,
    Streaming,
    Completed,
    Failed,
}

/// Validated input for one turn.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TurnRequest {
    user_text: String,
    force_compare: bool,
}

impl TurnRequest {
    /// Rejects blank input.
    pub fn new(user_text: impl Into<String>, force_compare: bool) -> Result<Self, AgentError> {
        let user_text = user_text.into();
        if user_text.trim().is_empty() {
            return Err(AgentError::EmptyMessage);
        }
        Ok(Self {
            user_text,
            force_compare,
        })
    }

    pub fn user_text(&self) -> &str {
        &self.user_text
    }

    pub fn force_compare(&self) -> bool {
        self.force_compare
    }
}

/// What happened during a turn.
#[derive(Debug)]
pub struct TurnOutcome {
    pub turn_id: Uuid,
    /// Concatenated fragments (possibly partial when the turn failed).
    pub reply: String,
    pub fragments: usize,
    /// `Completed` or `Failed`.
    pub phase: TurnPhase,
    pub error: Option<InferenceError>,
}

impl TurnOutcome {
    pub fn is_success(&self) -> bool {
        self.phase == TurnPhase::Completed
    }
}

/// Prompt builder, client, and request options bundled for repeated turns.
pub struct ChatSession {
    builder: PromptBuilder,
    client: ChatClient,
    options: SendOptions,
}

impl ChatSession {
    pub fn new(builder: PromptBuilder, client: ChatClient, options: SendOptions) -> Self {
        Self {
            builder,
            client,
            options,
        }
    }

    pub fn from_config(config: &ChatConfig, credentials: Credentials) -> Result<Self, InferenceError> {
        Ok(Self::new(
            PromptBuilder::new(config.persona.clone()),
            ChatClient::from_config(config, credentials)?,
            SendOptions::from_config(config),
        ))
    }

    pub fn options(&self) -> &SendOptions {
        &self.options
    }

    pub fn set_use_remote(&mut self, use_remote: bool) {
        self.options.use_remote = use_remote;
    }

    /// Run one turn to completion.
    ///
    /// `on_fragment` sees every fragment as it arrives. Failures never escape:
    /// the error notice becomes the assistant entry, and any text streamed
    /// before the failure is kept only in the outcome.
    pub async fn run_turn<F>(
        &self,
        mut transcript: Transcript,
        request: &TurnRequest,
        mut on_fragment: F,
    ) -> (Transcript, TurnOutcome)
    where
        F: FnMut(&TextFragment),
    {
        let turn_id = Uuid::new_v4();
        let mut phase = TurnPhase::Idle;
        transcript.push(Role::User, request.user_text());

        let prompt = self
            .builder
            .build(request.user_text(), request.force_compare());
        advance(&mut phase, TurnPhase::Requested, turn_id);

        let mut reply = String::new();
        let mut fragments = 0usize;
        let mut error = None;

        match self.client.send(&prompt, &self.options).await {
            Ok(handle) => {
                advance(&mut phase, TurnPhase::Streaming, turn_id);
                let stream = decode_fragments(handle);
                futures::pin_mut!(stream);

                while let Some(item) = stream.next().await {
                    match item {
                        Ok(fragment) => {
                            on_fragment(&fragment);
                            reply.push_str(&fragment);
                            fragments += 1;
                        }
                        Err(e) => {
                            tracing::warn!(turn = %turn_id, error = %e, "stream error mid-turn");
                            error = Some(e);
                            break;
                        }
                    }
                }
            }
            Err(e) => {
                tracing::warn!(turn = %turn_id, error = %e, "request failed");
                error = Some(e);
            }
        }

        let entry = match &error {
            None => {
                advance(&mut phase, TurnPhase::Completed, turn_id);
                reply.clone()
            }
            Some(e) => {
                advance(&mut phase, TurnPhase::Failed, turn_id);
                format!("{ERROR_NOTICE_PREFIX}{e}")
            }
        };
        transcript.push(Role::Assistant, entry);

        tracing::info!(
            turn = %turn_id,
            phase = ?phase,
            fragments,
            reply_len = reply.len(),
            "=== TURN FINISHED ==="
        );

        (
            transcript,
            TurnOutcome {
                turn_id,
                reply,
                fragments,
                phase,
                error,
            },
        )
    }
}

fn advance(phase: &mut TurnPhase, next: TurnPhase, turn_id: Uuid) {
    tracing::debug!(turn = %turn_id, from = ?*phase, to = ?next, "turn phase");
    *phase = next;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::inference::credentials::SecretSource;
    use std::collections::HashMap;
    use std::sync::Arc;

    fn session(use_remote: bool) -> ChatSession {
        let config = ChatConfig {
            use_remote,
            base_url: "http://127.0.0.1:9/v1".to_string(),
            ..ChatConfig::default()
        };
        let empty: Arc<dyn SecretSource> = Arc::new(HashMap::<String, String>::new());
        let credentials = Credentials::from_sources(vec![empty]);
        ChatSession::from_config(&config, credentials).unwrap()
    }

    #[test]
    fn test_turn_request_rejects_blank() {
        assert!(matches!(TurnRequest::new("", false), Err(AgentError::EmptyMessage)));
        assert!(matches!(TurnRequest::new(" \n\t", true), Err(AgentError::EmptyMessage)));
        let req = TurnRequest::new("hi", true).unwrap();
        assert_eq!(req.user_text(), "hi");
        assert!(req.force_compare());
    }

    #[tokio::test]
    async fn test_offline_turn_records_both_entries() {
        let session = session(false);
        let request = TurnRequest::new("What is a Kanban WIP limit?", false).unwrap();
        let mut seen = Vec::new();

        let (transcript, outcome) = session
            .run_turn(Transcript::new(10), &request, |f| seen.push(f.to_string()))
            .await;

        assert!(outcome.is_success());
        assert_eq!(outcome.fragments, 1);
        assert_eq!(seen, vec!["[Mock] What is a Kanban WIP limit?"]);
        assert_eq!(
            transcript.export_text(),
            "User: What is a Kanban WIP limit?\n\nAssistant: [Mock] What is a Kanban WIP limit?"
        );
    }

    #[tokio::test]
    async fn test_missing_key_becomes_error_entry() {
        let session = session(true);
        let request = TurnRequest::new("hello", false).unwrap();

        let (transcript, outcome) = session.run_turn(Transcript::new(10), &request, |_| {}).await;

        assert_eq!(outcome.phase, TurnPhase::Failed);
        assert!(outcome.reply.is_empty());
        assert!(outcome.error.as_ref().unwrap().is_configuration_error());

        let last = transcript.last().unwrap();
        assert_eq!(last.role, Role::Assistant);
        assert!(last.content.starts_with(ERROR_NOTICE_PREFIX));
        assert!(last.content.contains("OPENAI_API_KEY not found"));
        assert_eq!(transcript.len(), 2);
    }

    #[tokio::test]
    async fn test_transcript_retention_across_turns() {
        let mut session = session(true);
        session.set_use_remote(false);
        let mut transcript = Transcript::new(3);

        for text in ["one", "two", "three"] {
            let request = TurnRequest::new(text, false).unwrap();
            let (next, _) = session.run_turn(transcript, &request, |_| {}).await;
            transcript = next;
        }

        assert_eq!(transcript.len(), 3);
        let contents: Vec<_> = transcript.entries().map(|e| e.content.clone()).collect();
        assert_eq!(contents, vec!["[Mock] two", "three", "[Mock] three"]);
    }
}
