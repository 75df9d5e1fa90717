//! Conversation corpus types and the prompt serialization contract.
//!
//! A corpus is a JSON array of records; each record holds an ordered
//! sequence of speaker turns. [`format_conversation`] serializes a turn
//! sequence into the single role-tagged prompt string the tokenizer sees.

mod format;
mod record;

pub use format::{format_conversation, Role, END_TAG};
pub use record::{
    corpus_hash, load_conversation_corpus, ConversationRecord, ConversationTurn,
};
