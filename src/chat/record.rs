//! Conversation record deserialization and corpus loading.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::path::Path;

/// One speaker turn in a conversation.
///
/// Both fields default to the empty string when absent, so a partially
/// formed turn still formats (the serializer is total over any turn
/// sequence).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversationTurn {
    /// Sender label, free-form ("human", "gpt", "system", ...)
    #[serde(default)]
    pub from: String,
    /// Message text
    #[serde(default)]
    pub value: String,
}

impl ConversationTurn {
    /// Convenience constructor for building turns in code.
    #[must_use]
    pub fn new(from: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            from: from.into(),
            value: value.into(),
        }
    }
}

/// One training record: an ordered turn sequence plus an optional label.
///
/// `label` is part of the input format but drives no behavior in this
/// pipeline; it is retained only so corpora carrying it deserialize.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ConversationRecord {
    /// Ordered speaker turns; order determines prompt order
    #[serde(default)]
    pub conversations: Vec<ConversationTurn>,
    /// Dataset label, unused by the training path
    #[serde(default)]
    pub label: Option<String>,
}

/// Load a conversation corpus from a JSON document holding an array of
/// records.
///
/// # Errors
/// Returns an error if the file cannot be read or is not valid JSON for
/// the expected shape. Malformed *turns* do not fail: missing fields
/// deserialize to empty strings.
pub fn load_conversation_corpus(path: &Path) -> crate::Result<Vec<ConversationRecord>> {
    let content = std::fs::read_to_string(path).map_err(|e| crate::Error::Checkpoint {
        path: path.to_path_buf(),
        message: format!("corpus file not readable: {e}"),
    })?;
    let records: Vec<ConversationRecord> = serde_json::from_str(&content)?;
    Ok(records)
}

/// SHA-256 hash over all turns, for corpus provenance reporting.
#[must_use]
pub fn corpus_hash(records: &[ConversationRecord]) -> String {
    let mut hasher = Sha256::new();
    for record in records {
        for turn in &record.conversations {
            hasher.update(turn.from.as_bytes());
            hasher.update([0u8]);
            hasher.update(turn.value.as_bytes());
            hasher.update([0u8]);
        }
    }
    format!("sha256:{:x}", hasher.finalize())
}
