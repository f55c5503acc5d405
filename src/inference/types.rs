//! Shared types for the inference client.
//!
//! These mirror the OpenAI Chat Completions API types, used for both
//! request building and response parsing.

use std::fmt;
use std::ops::Deref;

use serde::{Deserialize, Serialize};

// ─── Request Types ───────────────────────────────────────────────────────────

/// Message role.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

impl Role {
    /// Capitalized name used in transcript exports (`"User"`, `"Assistant"`).
    pub fn title(self) -> &'static str {
        match self {
            Role::System => "System",
            Role::User => "User",
            Role::Assistant => "Assistant",
        }
    }
}

/// A single message in the conversation. Immutable once created.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}

/// Request body for `POST /v1/chat/completions`.
#[derive(Debug, Clone, Serialize)]
pub struct ChatCompletionRequest {
    pub model: String,
    pub messages: Vec<ChatMessage>,
    pub temperature: f32,
    pub max_tokens: u32,
    pub stream: bool,
}

// ─── Response Types ──────────────────────────────────────────────────────────

/// A non-empty piece of assistant text taken from one stream chunk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextFragment(String);

impl TextFragment {
    /// Wrap `text`, or return `None` when it is empty.
    pub fn new(text: impl Into<String>) -> Option<Self> {
        let text = text.into();
        if text.is_empty() {
            None
        } else {
            Some(Self(text))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_string(self) -> String {
        self.0
    }
}

impl Deref for TextFragment {
    type Target = str;

    fn deref(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TextFragment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Raw SSE chunk from the OpenAI API.
///
/// Every field is optional so that oddly shaped chunks (keep-alive objects,
/// usage-only chunks, role-only deltas) still deserialize; whether a chunk
/// carries text is answered by [`first_delta_content`](Self::first_delta_content).
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ChatCompletionChunk {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub choices: Vec<ChunkChoice>,
    /// Error object some providers emit mid-stream instead of a delta.
    #[serde(default)]
    pub error: Option<ChunkError>,
}

/// A single choice within a streaming chunk.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ChunkChoice {
    #[serde(default)]
    pub delta: Option<ChunkDelta>,
    #[serde(default)]
    pub finish_reason: Option<String>,
}

/// The delta (incremental update) within a chunk choice.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ChunkDelta {
    #[serde(default)]
    pub role: Option<String>,
    #[serde(default)]
    pub content: Option<String>,
}

/// Provider error reported inside the event stream.
#[derive(Debug, Clone, Deserialize)]
pub struct ChunkError {
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default, rename = "type")]
    pub kind: Option<String>,
}

impl ChatCompletionChunk {
    /// Build a chunk whose first choice carries `content` as its delta.
    pub fn from_text(content: impl Into<String>) -> Self {
        Self {
            id: None,
            choices: vec![ChunkChoice {
                delta: Some(ChunkDelta {
                    role: None,
                    content: Some(content.into()),
                }),
                finish_reason: None,
            }],
            error: None,
        }
    }

    /// `choices[0].delta.content`, when present and non-empty.
    pub fn first_delta_content(&self) -> Option<&str> {
        self.choices
            .first()?
            .delta
            .as_ref()?
            .content
            .as_deref()
            .filter(|c| !c.is_empty())
    }

    /// `choices[0].delta.content` as a [`TextFragment`].
    pub fn first_fragment(&self) -> Option<TextFragment> {
        self.first_delta_content().and_then(TextFragment::new)
    }
}

// ─── Tests ───────────────────────────────────────────────────────────────────
