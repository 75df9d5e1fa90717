//! Conversation-to-prompt serialization.
//!
//! The formatter is the one deterministic transformation this pipeline
//! owns: it must be total over any turn sequence, pure, and byte-stable.

use super::record::ConversationTurn;

/// Delimiter appended after every message.
pub const END_TAG: &str = "<|end|>";

/// Speaker role, resolved from the normalized sender string.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    /// Sender "human"
    User,
    /// Sender "gpt"
    Assistant,
    /// Sender "system"
    System,
    /// Any other sender, including empty; emitted without a role tag
    Unknown,
}

impl Role {
    /// Resolve a role by trimming and lowercasing the sender, then exact
    /// matching.
    #[must_use]
    pub fn from_sender(sender: &str) -> Self {
        match sender.trim().to_lowercase().as_str() {
            "human" => Self::User,
            "gpt" => Self::Assistant,
            "system" => Self::System,
            _ => Self::Unknown,
        }
    }

    /// Opening tag emitted before the message, if the role has one.
    #[must_use]
    pub const fn open_tag(&self) -> Option<&'static str> {
        match self {
            Self::User => Some("<|user|>"),
            Self::Assistant => Some("<|assistant|>"),
            Self::System => Some("<|system|>"),
            Self::Unknown => None,
        }
    }
}

/// Serialize a turn sequence into a single prompt string.
///
/// Per turn, in input order: `<open-tag>\n<message><|end|>\n` for tagged
/// roles, or `<message><|end|>\n` for unknown senders. Messages are
/// whitespace-trimmed. An empty turn sequence yields the empty string.
#[must_use]
pub fn format_conversation(turns: &[ConversationTurn]) -> String {
    let mut prompt = String::new();
    for turn in turns {
        let message = turn.value.trim();
        if let Some(tag) = Role::from_sender(&turn.from).open_tag() {
            prompt.push_str(tag);
            prompt.push('\n');
        }
        prompt.push_str(message);
        prompt.push_str(END_TAG);
        prompt.push('\n');
    }
    prompt
}
