//! OpenAI chat-completion client.
//!
//! Resolves and cost-locks the model, checks the credential, issues the
//! streaming request, and hands back a [`StreamHandle`]. When remote calls are
//! disabled it answers with a deterministic offline handle instead.

use std::time::Duration;

use futures::StreamExt;
use reqwest::Client as HttpClient;

use super::config::{lock_model, resolve_model, ChatConfig};
use super::credentials::Credentials;
use super::errors::InferenceError;
use super::prompt::Prompt;
use super::streaming::{parse_sse_stream, StreamHandle};
use super::types::ChatCompletionRequest;

// ─── Constants ───────────────────────────────────────────────────────────────

/// TCP connection timeout.
const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// Prefix of every offline reply.
pub const OFFLINE_PREFIX: &str = "[Mock] ";

/// Tag inserted into offline replies when the comparison is forced.
pub const OFFLINE_COMPARE_TAG: &str = "(Compare) ";

// ─── Send Options ────────────────────────────────────────────────────────────

/// Per-request knobs.
#[derive(Debug, Clone, PartialEq)]
pub struct SendOptions {
    /// Model the caller asked for. Always cost-locked before dispatch.
    pub requested_model: String,
    pub max_tokens: u32,
    pub temperature: f32,
    /// `false` answers from the offline mock without touching the network.
    pub use_remote: bool,
}

impl SendOptions {
    pub fn from_config(config: &ChatConfig) -> Self {
        Self {
            requested_model: config.model.clone(),
            max_tokens: config.max_tokens,
            temperature: config.temperature,
            use_remote: config.use_remote,
        }
    }
}

impl Default for SendOptions {
    fn default() -> Self {
        Self::from_config(&ChatConfig::default())
    }
}

// ─── ChatClient ──────────────────────────────────────────────────────────────

/// Streaming client for the chat-completion provider.
///
/// Holds no per-request state; one client serves every turn.
pub struct ChatClient {
    /// HTTP client for streaming requests.
    http_stream: HttpClient,
    base_url: String,
    credentials: Credentials,
    request_timeout: Duration,
}

impl ChatClient {
    /// Build a client for `config.base_url`. Does NOT check connectivity or
    /// the credential; both happen per request.
    pub fn from_config(config: &ChatConfig, credentials: Credentials) -> Result<Self, InferenceError> {
        config.validate()?;

        let request_timeout = Duration::from_secs(config.request_timeout_secs);
        let http_stream = HttpClient::builder()
            .connect_timeout(CONNECT_TIMEOUT)
            .timeout(request_timeout)
            .build()
            .map_err(|e| InferenceError::ConnectionFailed {
                endpoint: config.base_url.clone(),
                reason: format!("failed to build streaming HTTP client: {e}"),
            })?;

        Ok(Self {
            http_stream,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            credentials,
            request_timeout,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// The request body that [`send`](Self::send) dispatches for `prompt`.
    ///
    /// The model is resolved through the alias table and then replaced by the
    /// canonical model, so the requested model never reaches the provider.
    pub fn build_request(&self, prompt: &Prompt, options: &SendOptions) -> ChatCompletionRequest {
        let resolved = resolve_model(&options.requested_model);
        let model = lock_model(&resolved);

        ChatCompletionRequest {
            model: model.to_string(),
            messages: prompt.messages.clone(),
            temperature: options.temperature,
            max_tokens: options.max_tokens,
            stream: true,
        }
    }

    /// Open a completion stream for `prompt`.
    ///
    /// Offline: returns a single-fragment handle, no credential needed.
    /// Remote: fails with `MissingCredential` before any network call when no
    /// key is found; connection, timeout, and non-2xx failures surface as
    /// provider errors. Nothing is retried.
    pub async fn send(
        &self,
        prompt: &Prompt,
        options: &SendOptions,
    ) -> Result<StreamHandle, InferenceError> {
        if !options.use_remote {
            tracing::debug!(force_compare = prompt.force_compare, "answering from offline mock");
            return Ok(StreamHandle::offline(offline_reply(prompt)));
        }

        let api_key = self.credentials.api_key()?;
        let url = format!("{}/chat/completions", self.base_url);
        let body = self.build_request(prompt, options);

        // Log the request metadata (not the full body)
        tracing::info!(
            url = %url,
            model = %body.model,
            requested_model = %options.requested_model,
            message_count = body.messages.len(),
            max_tokens = body.max_tokens,
            temperature = body.temperature,
            stream = body.stream,
            "=== LLM REQUEST ==="
        );

        let response = self
            .http_stream
            .post(&url)
            .bearer_auth(api_key)
            .json(&body)
            .header("Accept", "text/event-stream")
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    InferenceError::Timeout {
                        duration_secs: self.request_timeout.as_secs(),
                    }
                } else {
                    InferenceError::ConnectionFailed {
                        endpoint: url.clone(),
                        reason: e.to_string(),
                    }
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            let body_text = response.text().await.unwrap_or_default();
            tracing::warn!(status = status.as_u16(), "provider rejected request");
            return Err(InferenceError::HttpError {
                status: status.as_u16(),
                body: body_text,
            });
        }

        let duration_secs = self.request_timeout.as_secs();
        let bytes = response
            .bytes_stream()
            .map(move |read| read.map_err(|e| body_read_error(e, duration_secs)));

        Ok(StreamHandle::remote(body.model, parse_sse_stream(bytes)))
    }
}

/// The request timeout also bounds the body, so it can fire mid-stream.
fn body_read_error(e: reqwest::Error, duration_secs: u64) -> InferenceError {
    if e.is_timeout() {
        InferenceError::Timeout { duration_secs }
    } else {
        InferenceError::StreamError {
            reason: format!("stream read error: {e}"),
        }
    }
}

/// The offline reply: prefix, optional comparison tag, then the user text.
pub fn offline_reply(prompt: &Prompt) -> String {
    let tag = if prompt.force_compare {
        OFFLINE_COMPARE_TAG
    } else {
        ""
    };
    format!("{OFFLINE_PREFIX}{tag}{}", prompt.user_text)
}

// ─── Tests ───────────────────────────────────────────────────────────────────
