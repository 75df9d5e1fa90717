//! End-to-end pipeline test against a synthetic checkpoint.

use afinar::dataset::TokenizedExample;
use afinar::model::{AdaptedModel, BaseModel, NamedTensor};
use afinar::observe::ProgressSink;
use afinar::pipeline::{FineTunePipeline, PipelineConfig};
use afinar::placement::DeviceMap;
use afinar::tokenizer::PromptTokenizer;
use afinar::train::{TrainReport, TrainerBackend, TrainingArguments};
use std::collections::HashMap;
use std::path::Path;
use std::sync::Mutex;
use tokenizers::models::wordlevel::WordLevel;
use tokenizers::pre_tokenizers::whitespace::Whitespace;

const D: usize = 4;

fn tiny_placement() -> DeviceMap {
    DeviceMap::pipeline_split(2, 1, "cuda:0", "cuda:1").unwrap()
}

/// Write a two-layer checkpoint with its tokenizer into `dir`.
fn write_checkpoint(dir: &Path) {
    let linear = |val: f32| NamedTensor {
        shape: vec![D, D],
        data: vec![val; D * D],
    };
    let tensors = vec![
        (
            "model.embed_tokens.weight".to_string(),
            NamedTensor {
                shape: vec![16, D],
                data: vec![0.1; 16 * D],
            },
        ),
        (
            "model.layers.0.self_attn.q_proj.weight".to_string(),
            linear(0.5),
        ),
        (
            "model.layers.1.self_attn.q_proj.weight".to_string(),
            linear(0.25),
        ),
        (
            "model.norm.weight".to_string(),
            NamedTensor {
                shape: vec![D],
                data: vec![1.0; D],
            },
        ),
        (
            "lm_head.weight".to_string(),
            NamedTensor {
                shape: vec![16, D],
                data: vec![0.1; 16 * D],
            },
        ),
    ];
    let model = BaseModel::from_tensors(tensors, tiny_placement()).unwrap();
    model.save_pretrained(dir).unwrap();

    let mut vocab: HashMap<String, u32> = HashMap::new();
    vocab.insert("[UNK]".to_string(), 0);
    vocab.insert("<pad>".to_string(), 1);
    for (i, word) in ["hello", "hi", "bye", "ok", "why", "sure"]
        .iter()
        .enumerate()
    {
        vocab.insert((*word).to_string(), 2 + i as u32);
    }
    let word_level = WordLevel::builder()
        .vocab(vocab)
        .unk_token("[UNK]".to_string())
        .build()
        .unwrap();
    let mut tokenizer = tokenizers::Tokenizer::new(word_level);
    tokenizer.with_pre_tokenizer(Whitespace {});
    PromptTokenizer::from_tokenizer(tokenizer)
        .save_pretrained(dir)
        .unwrap();
}

/// Write a small conversation corpus as JSON.
fn write_corpus(path: &Path, n: usize) {
    let records: Vec<serde_json::Value> = (0..n)
        .map(|i| {
            serde_json::json!({
                "conversations": [
                    {"from": "human", "value": format!("hi {i}")},
                    {"from": "gpt", "value": "hello"}
                ],
                "label": "greeting"
            })
        })
        .collect();
    std::fs::write(path, serde_json::to_string(&records).unwrap()).unwrap();
}

/// Backend double: records what it was handed and writes ones into every
/// adapter factor so the merged weights are checkable.
#[derive(Default)]
struct RecordingBackend {
    train_len: usize,
    eval_len: usize,
    seen_args: Option<TrainingArguments>,
}

impl TrainerBackend for RecordingBackend {
    fn run(
        &mut self,
        model: &mut AdaptedModel,
        args: &TrainingArguments,
        train: &[TokenizedExample],
        eval: &[TokenizedExample],
    ) -> afinar::Result<TrainReport> {
        self.train_len = train.len();
        self.eval_len = eval.len();
        self.seen_args = Some(args.clone());

        for (_, layer) in model.adapters_mut() {
            layer.lora_a_mut().fill(1.0);
            layer.lora_b_mut().fill(1.0);
        }

        Ok(TrainReport {
            epochs_completed: args.epochs,
            steps: train.len() * args.epochs,
            final_train_loss: Some(0.5),
            final_eval_loss: Some(0.6),
        })
    }
}

/// Sink that logs event kinds in order.
#[derive(Default)]
struct EventSink {
    events: Mutex<Vec<String>>,
}

impl ProgressSink for EventSink {
    fn device_map(&self, _map: &DeviceMap, _devices: &[afinar::placement::DeviceInfo]) {
        self.events.lock().unwrap().push("device_map".to_string());
    }
    fn prompt(&self, prompt: &str) {
        self.events
            .lock()
            .unwrap()
            .push(format!("prompt:{}", prompt.lines().count()));
    }
    fn trainable_parameters(&self, trainable: usize, total: usize) {
        assert!(trainable > 0);
        assert!(total > trainable);
        self.events.lock().unwrap().push("params".to_string());
    }
    fn message(&self, _msg: &str) {
        self.events.lock().unwrap().push("message".to_string());
    }
}

fn test_config(model_dir: &Path, corpus: &Path, out: &Path) -> PipelineConfig {
    PipelineConfig::new(model_dir, corpus)
        .unwrap()
        .with_placement(tiny_placement())
        .with_output_root(out)
}

#[test]
fn run_writes_both_artifacts() {
    let root = tempfile::tempdir().unwrap();
    let model_dir = root.path().join("checkpoint");
    std::fs::create_dir_all(&model_dir).unwrap();
    write_checkpoint(&model_dir);
    let corpus = root.path().join("corpus.json");
    write_corpus(&corpus, 10);

    let config = test_config(&model_dir, &corpus, root.path());
    let sink = EventSink::default();
    let mut backend = RecordingBackend::default();

    let artifacts = FineTunePipeline::new(config, &sink)
        .run(&mut backend)
        .unwrap();

    for file in ["adapter_model.safetensors", "adapter_config.json", "tokenizer.json"] {
        assert!(
            artifacts.adapter_dir.join(file).exists(),
            "missing adapter artifact {file}"
        );
    }
    for file in ["model.safetensors", "tokenizer.json"] {
        assert!(
            artifacts.merged_dir.join(file).exists(),
            "missing merged artifact {file}"
        );
    }

    // 10 records, 10% eval, ceil(1.0) = 1
    assert_eq!(backend.train_len, 9);
    assert_eq!(backend.eval_len, 1);
    let args = backend.seen_args.unwrap();
    assert_eq!(args.epochs, 3);
    assert!((args.learning_rate - 2e-5).abs() < 1e-12);

    assert_eq!(artifacts.report.epochs_completed, 3);
    assert_eq!(artifacts.report.steps, 27);

    let events = sink.events.lock().unwrap();
    assert_eq!(events[0], "device_map");
    let prompts = events.iter().filter(|e| e.starts_with("prompt:")).count();
    assert_eq!(prompts, 10);
    let params_pos = events.iter().position(|e| e == "params").unwrap();
    let first_prompt = events
        .iter()
        .position(|e| e.starts_with("prompt:"))
        .unwrap();
    assert!(params_pos < first_prompt, "adapters attach before tokenization");
}

#[test]
fn merged_weights_carry_adapter_delta() {
    let root = tempfile::tempdir().unwrap();
    let model_dir = root.path().join("checkpoint");
    std::fs::create_dir_all(&model_dir).unwrap();
    write_checkpoint(&model_dir);
    let corpus = root.path().join("corpus.json");
    write_corpus(&corpus, 4);

    let config = test_config(&model_dir, &corpus, root.path());
    let alpha = config.lora.alpha;
    let mut backend = RecordingBackend::default();
    let sink = afinar::observe::NullSink;

    let artifacts = FineTunePipeline::new(config, &sink)
        .run(&mut backend)
        .unwrap();

    let merged = BaseModel::from_pretrained(&artifacts.merged_dir, tiny_placement()).unwrap();

    // All-ones factors give delta_ij = scale * rank = alpha per element.
    let q0 = merged
        .tensor("model.layers.0.self_attn.q_proj.weight")
        .unwrap();
    for &v in &q0.data {
        assert!((v - (0.5 + alpha)).abs() < 1e-3, "got {v}");
    }

    // Non-adapted weights pass through unchanged.
    let norm = merged.tensor("model.norm.weight").unwrap();
    assert!(norm.data.iter().all(|&v| (v - 1.0).abs() < 1e-6));
    let head = merged.tensor("lm_head.weight").unwrap();
    assert!(head.data.iter().all(|&v| (v - 0.1).abs() < 1e-6));
}

#[test]
fn run_fails_cleanly_on_backend_error() {
    struct FailingBackend;
    impl TrainerBackend for FailingBackend {
        fn run(
            &mut self,
            _model: &mut AdaptedModel,
            _args: &TrainingArguments,
            _train: &[TokenizedExample],
            _eval: &[TokenizedExample],
        ) -> afinar::Result<TrainReport> {
            Err(afinar::Error::Backend("loss diverged".to_string()))
        }
    }

    let root = tempfile::tempdir().unwrap();
    let model_dir = root.path().join("checkpoint");
    std::fs::create_dir_all(&model_dir).unwrap();
    write_checkpoint(&model_dir);
    let corpus = root.path().join("corpus.json");
    write_corpus(&corpus, 4);

    let config = test_config(&model_dir, &corpus, root.path());
    let sink = afinar::observe::NullSink;
    let err = FineTunePipeline::new(config, &sink)
        .run(&mut FailingBackend)
        .unwrap_err();
    assert!(err.to_string().contains("loss diverged"));

    // No merged artifact is written after a failed run.
    assert!(!root
        .path()
        .join("fine_tuned_model_merged/model.safetensors")
        .exists());
}

#[test]
fn run_fails_on_missing_corpus() {
    let root = tempfile::tempdir().unwrap();
    let model_dir = root.path().join("checkpoint");
    std::fs::create_dir_all(&model_dir).unwrap();
    write_checkpoint(&model_dir);

    let config = test_config(&model_dir, &root.path().join("absent.json"), root.path());
    let sink = afinar::observe::NullSink;
    let err = FineTunePipeline::new(config, &sink)
        .run(&mut RecordingBackend::default())
        .unwrap_err();
    assert!(err.to_string().contains("absent.json"));
}
