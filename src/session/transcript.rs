use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::SessionId;

/// A single transcription result accumulated on the client side.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TranscriptLogEntry {
    pub timestamp: DateTime<Utc>,
    pub text: String,
    pub session_id: SessionId,
}

/// Append-only transcript accumulation for export. Owned by the controller;
/// cleared only when a new session starts.
#[derive(Debug, Default)]
pub struct TranscriptLog {
    entries: Vec<TranscriptLogEntry>,
}

impl TranscriptLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn append(&mut self, entry: TranscriptLogEntry) {
        self.entries.push(entry);
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entries(&self) -> &[TranscriptLogEntry] {
        &self.entries
    }

    /// Plain-text export, one timestamped line per result.
    pub fn export_text(&self) -> String {
        let mut out = String::new();
        for entry in &self.entries {
            out.push_str(&format!(
                "[{}] {}\n",
                entry.timestamp.to_rfc3339(),
                entry.text
            ));
        }
        out
    }
}
