//! Checkpoint tokenizer wrapper with a fixed padding/truncation policy.
//!
//! The tokenizer itself (vocabulary, merges, normalization) is external,
//! loaded from the checkpoint's `tokenizer.json`. This wrapper owns only
//! pad-token detection and the truncate-then-pad encoding the training
//! examples require.

use crate::dataset::TokenizedExample;
use std::path::Path;

/// Tokenizer for formatted prompts, loaded from a model checkpoint.
#[derive(Debug)]
pub struct PromptTokenizer {
    inner: tokenizers::Tokenizer,
    pad_id: u32,
}

impl PromptTokenizer {
    /// Load `tokenizer.json` from a checkpoint directory.
    ///
    /// # Errors
    /// Returns an error if the file is missing or cannot be parsed.
    pub fn from_pretrained(model_dir: &Path) -> crate::Result<Self> {
        let path = model_dir.join("tokenizer.json");
        if !path.exists() {
            return Err(crate::Error::Checkpoint {
                path,
                message: "tokenizer.json not found".to_string(),
            });
        }
        let inner = tokenizers::Tokenizer::from_file(&path)
            .map_err(|e| crate::Error::Tokenizer(e.to_string()))?;
        Ok(Self::from_tokenizer(inner))
    }

    /// Wrap an already constructed tokenizer, detecting the pad token from
    /// its vocabulary (`<pad>`, then `<|endoftext|>`, then `</s>`, else 0).
    #[must_use]
    pub fn from_tokenizer(inner: tokenizers::Tokenizer) -> Self {
        let pad_id = inner
            .token_to_id("<pad>")
            .or_else(|| inner.token_to_id("<|endoftext|>"))
            .or_else(|| inner.token_to_id("</s>"))
            .unwrap_or(0);
        Self { inner, pad_id }
    }

    /// Encode text to token ids without padding.
    ///
    /// # Errors
    /// Returns an error if the underlying tokenizer rejects the input.
    pub fn encode(&self, text: &str) -> crate::Result<Vec<u32>> {
        let encoding = self
            .inner
            .encode(text, false)
            .map_err(|e| crate::Error::Tokenizer(e.to_string()))?;
        Ok(encoding.get_ids().to_vec())
    }

    /// Encode text truncated and padded to exactly `max_length` tokens,
    /// with an attention mask covering the non-pad positions.
    ///
    /// # Errors
    /// Returns an error if encoding fails.
    pub fn encode_padded(&self, text: &str, max_length: usize) -> crate::Result<TokenizedExample> {
        let mut input_ids = self.encode(text)?;
        input_ids.truncate(max_length);

        let mut attention_mask = vec![1u8; input_ids.len()];
        input_ids.resize(max_length, self.pad_id);
        attention_mask.resize(max_length, 0);

        Ok(TokenizedExample {
            input_ids,
            attention_mask,
        })
    }

    /// Persist the tokenizer into an output directory as `tokenizer.json`.
    ///
    /// # Errors
    /// Returns an error if the directory cannot be created or written.
    pub fn save_pretrained(&self, dir: &Path) -> crate::Result<()> {
        std::fs::create_dir_all(dir)?;
        self.inner
            .save(dir.join("tokenizer.json"), false)
            .map_err(|e| crate::Error::Tokenizer(e.to_string()))?;
        Ok(())
    }

    /// Padding token id.
    #[must_use]
    pub fn pad_id(&self) -> u32 {
        self.pad_id
    }

    /// Vocabulary size, including added tokens.
    #[must_use]
    pub fn vocab_size(&self) -> usize {
        self.inner.get_vocab_size(true)
    }
}
