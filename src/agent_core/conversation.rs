//! Transcript — the in-memory conversation record owned by the front-end.
//!
//! Responsibilities:
//! - Keep the ordered `(role, content)` entries of the conversation
//! - Enforce keep-last-N retention on every push
//! - Reset (clear) and export as plain text or JSON

use std::collections::VecDeque;
use std::path::Path;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::inference::types::Role;

use super::errors::AgentError;

/// A single transcript entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TranscriptEntry {
    pub role: Role,
    pub content: String,
    /// RFC 3339 timestamp.
    pub timestamp: String,
}

/// Bounded, ordered conversation record.
#[derive(Debug, Clone)]
pub struct Transcript {
    id: Uuid,
    entries: VecDeque<TranscriptEntry>,
    max_entries: usize,
}

#[derive(Serialize)]
struct TranscriptExport<'a> {
    id: Uuid,
    exported_at: String,
    entries: &'a VecDeque<TranscriptEntry>,
}

impl Transcript {
    /// An empty transcript keeping at most `max_entries` entries (minimum 1).
    pub fn new(max_entries: usize) -> Self {
        Self {
            id: Uuid::new_v4(),
            entries: VecDeque::new(),
            max_entries: max_entries.max(1),
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn max_entries(&self) -> usize {
        self.max_entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entries(&self) -> impl Iterator<Item = &TranscriptEntry> {
        self.entries.iter()
    }

    pub fn last(&self) -> Option<&TranscriptEntry> {
        self.entries.back()
    }

    /// Append an entry, evicting the oldest ones beyond the retention limit.
    pub fn push(&mut self, role: Role, content: impl Into<String>) {
        self.entries.push_back(TranscriptEntry {
            role,
            content: content.into(),
            timestamp: chrono::Utc::now().to_rfc3339(),
        });

        let mut evicted = 0usize;
        while self.entries.len() > self.max_entries {
            self.entries.pop_front();
            evicted += 1;
        }
        if evicted > 0 {
            tracing::debug!(transcript = %self.id, evicted, "transcript retention applied");
        }
    }

    /// Drop every entry. The transcript keeps its id.
    pub fn clear(&mut self) {
        tracing::info!(transcript = %self.id, entries = self.entries.len(), "transcript reset");
        self.entries.clear();
    }

    /// `"{Role}: {content}"` per entry, separated by blank lines.
    pub fn export_text(&self) -> String {
        self.entries
            .iter()
            .map(|e| format!("{}: {}", e.role.title(), e.content))
            .collect::<Vec<_>>()
            .join("\n\n")
    }

    /// JSON document with the transcript id and timestamped entries.
    pub fn to_json(&self) -> Result<String, AgentError> {
        let export = TranscriptExport {
            id: self.id,
            exported_at: chrono::Utc::now().to_rfc3339(),
            entries: &self.entries,
        };
        Ok(serde_json::to_string_pretty(&export)?)
    }

    /// Write the export to `path`. A `.json` extension selects the JSON
    /// format, anything else the plain-text format.
    pub fn write_export(&self, path: &Path) -> Result<(), AgentError> {
        let is_json = path
            .extension()
            .and_then(|e| e.to_str())
            .is_some_and(|e| e.eq_ignore_ascii_case("json"));
        let contents = if is_json {
            self.to_json()?
        } else {
            self.export_text()
        };

        std::fs::write(path, contents).map_err(|e| AgentError::ExportFailed {
            path: path.display().to_string(),
            reason: e.to_string(),
        })?;

        tracing::info!(
            transcript = %self.id,
            path = %path.display(),
            entries = self.entries.len(),
            "transcript exported"
        );
        Ok(())
    }
}
