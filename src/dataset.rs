//! Tokenized training examples and the deterministic train/eval split.

use crate::chat::{format_conversation, ConversationRecord};
use crate::observe::ProgressSink;
use crate::tokenizer::PromptTokenizer;
use serde::{Deserialize, Serialize};
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

/// One tokenized training example with a fixed length.
///
/// `input_ids` and `attention_mask` are always exactly the configured
/// maximum length; truncation and padding happen at encoding time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenizedExample {
    /// Token ids, padded to the maximum length
    pub input_ids: Vec<u32>,
    /// 1 for real tokens, 0 for padding
    pub attention_mask: Vec<u8>,
}

/// Tokenization policy applied to every formatted prompt.
#[derive(Debug, Clone, Copy)]
pub struct TokenizeOptions {
    /// Fixed sequence length after truncation and padding
    pub max_length: usize,
}

impl Default for TokenizeOptions {
    fn default() -> Self {
        Self { max_length: 512 }
    }
}

/// Format and tokenize every record in the corpus, in corpus order.
///
/// Each formatted prompt is reported to the sink before encoding.
///
/// # Errors
/// Returns an error if the tokenizer rejects a prompt.
pub fn tokenize_corpus(
    records: &[ConversationRecord],
    tokenizer: &PromptTokenizer,
    options: &TokenizeOptions,
    sink: &dyn ProgressSink,
) -> crate::Result<Vec<TokenizedExample>> {
    let mut examples = Vec::with_capacity(records.len());
    for record in records {
        let prompt = format_conversation(&record.conversations);
        sink.prompt(&prompt);
        examples.push(tokenizer.encode_padded(&prompt, options.max_length)?);
    }
    Ok(examples)
}

/// Train and eval partitions of a tokenized corpus.
#[derive(Debug, Clone)]
pub struct SplitDataset {
    /// Training partition
    pub train: Vec<TokenizedExample>,
    /// Evaluation partition
    pub eval: Vec<TokenizedExample>,
}

/// Split examples into disjoint train/eval partitions.
///
/// The permutation is a Fisher-Yates shuffle driven by a hash of the seed,
/// so the same seed always produces the same split. The eval partition
/// holds `ceil(n * eval_fraction)` examples, clamped so neither partition
/// is empty.
///
/// # Errors
/// Returns a config error if `eval_fraction` is outside `(0, 1)` or there
/// are fewer than two examples.
pub fn train_eval_split(
    examples: Vec<TokenizedExample>,
    eval_fraction: f32,
    seed: u64,
) -> crate::Result<SplitDataset> {
    if !(eval_fraction > 0.0 && eval_fraction < 1.0) {
        return Err(crate::Error::Config(format!(
            "eval_fraction must be in (0, 1), got {eval_fraction}"
        )));
    }
    if examples.len() < 2 {
        return Err(crate::Error::Config(format!(
            "need at least 2 examples to split, got {}",
            examples.len()
        )));
    }

    let n = examples.len();
    let mut indices: Vec<usize> = (0..n).collect();
    for i in (1..n).rev() {
        let mut hasher = DefaultHasher::new();
        seed.hash(&mut hasher);
        i.hash(&mut hasher);
        let j = (hasher.finish() as usize) % (i + 1);
        indices.swap(i, j);
    }

    let eval_size = ((n as f32 * eval_fraction).ceil() as usize).clamp(1, n - 1);

    let mut examples: Vec<Option<TokenizedExample>> = examples.into_iter().map(Some).collect();
    let mut take = |idx: &usize| examples[*idx].take().expect("index used once");

    let eval: Vec<TokenizedExample> = indices[..eval_size].iter().map(&mut take).collect();
    let train: Vec<TokenizedExample> = indices[eval_size..].iter().map(&mut take).collect();

    Ok(SplitDataset { train, eval })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_examples(n: usize) -> Vec<TokenizedExample> {
        (0..n)
            .map(|i| TokenizedExample {
                input_ids: vec![i as u32; 4],
                attention_mask: vec![1; 4],
            })
            .collect()
    }

    #[test]
    fn test_split_sizes_ten_percent() {
        let split = train_eval_split(make_examples(100), 0.1, 42).unwrap();
        assert_eq!(split.eval.len(), 10);
        assert_eq!(split.train.len(), 90);
    }

    #[test]
    fn test_split_rounds_up_and_clamps() {
        let split = train_eval_split(make_examples(5), 0.1, 42).unwrap();
        // ceil(0.5) = 1
        assert_eq!(split.eval.len(), 1);
        assert_eq!(split.train.len(), 4);

        let split = train_eval_split(make_examples(2), 0.9, 42).unwrap();
        // ceil(1.8) = 2, clamped so train keeps one example
        assert_eq!(split.eval.len(), 1);
        assert_eq!(split.train.len(), 1);
    }

    #[test]
    fn test_split_deterministic_for_seed() {
        let a = train_eval_split(make_examples(20), 0.25, 7).unwrap();
        let b = train_eval_split(make_examples(20), 0.25, 7).unwrap();
        assert_eq!(a.train, b.train);
        assert_eq!(a.eval, b.eval);
    }

    #[test]
    fn test_split_varies_with_seed() {
        let a = train_eval_split(make_examples(50), 0.2, 1).unwrap();
        let b = train_eval_split(make_examples(50), 0.2, 2).unwrap();
        assert!(a.eval != b.eval || a.train != b.train);
    }

    #[test]
    fn test_split_partitions_disjoint_and_complete() {
        let split = train_eval_split(make_examples(30), 0.2, 42).unwrap();
        let mut ids: Vec<u32> = split
            .train
            .iter()
            .chain(split.eval.iter())
            .map(|e| e.input_ids[0])
            .collect();
        ids.sort_unstable();
        let expected: Vec<u32> = (0..30).collect();
        assert_eq!(ids, expected);
    }

    #[test]
    fn test_split_rejects_bad_fraction() {
        assert!(train_eval_split(make_examples(10), 0.0, 42).is_err());
        assert!(train_eval_split(make_examples(10), 1.0, 42).is_err());
        assert!(train_eval_split(make_examples(10), -0.1, 42).is_err());
    }

    #[test]
    fn test_split_rejects_tiny_corpus() {
        assert!(train_eval_split(make_examples(0), 0.1, 42).is_err());
        assert!(train_eval_split(make_examples(1), 0.1, 42).is_err());
    }
}
