//! End-to-end fine-tuning pipeline.
//!
//! One sequential pass: probe devices, load the checkpoint with its
//! placement table, attach LoRA adapters, format and tokenize the
//! conversation corpus, split it, hand everything to the training
//! backend, then write the adapter and merged-model artifacts. Every
//! failure aborts the run; there is no retry or partial recovery.

use crate::chat::{corpus_hash, load_conversation_corpus};
use crate::dataset::{tokenize_corpus, train_eval_split, TokenizeOptions};
use crate::lora::LoRAConfig;
use crate::model::{AdaptedModel, BaseModel};
use crate::observe::ProgressSink;
use crate::placement::{DeviceInfo, DeviceMap};
use crate::tokenizer::PromptTokenizer;
use crate::train::{TrainReport, TrainerBackend, TrainingArguments};
use std::path::{Path, PathBuf};

/// Everything a fine-tuning run needs, with the defaults the driver
/// shipped with: rank-16 LoRA over all linear projections, 512-token
/// examples, a 10% eval split, and a two-GPU 40-layer placement split
/// at layer 10.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Checkpoint directory holding `model.safetensors` and `tokenizer.json`
    pub model_dir: PathBuf,
    /// JSON conversation corpus
    pub corpus_path: PathBuf,
    /// Output directory for the adapter artifact
    pub adapter_output_dir: PathBuf,
    /// Output directory for the merged full model
    pub merged_output_dir: PathBuf,
    /// Adapter hyperparameters
    pub lora: LoRAConfig,
    /// Backend hyperparameters
    pub training: TrainingArguments,
    /// Tokenization policy
    pub tokenize: TokenizeOptions,
    /// Fraction of the corpus held out for evaluation
    pub eval_fraction: f32,
    /// Seed for the train/eval shuffle
    pub seed: u64,
    /// Layer-to-device placement table
    pub placement: DeviceMap,
}

impl PipelineConfig {
    /// Default configuration for a checkpoint and corpus.
    ///
    /// # Errors
    /// Returns a config error if the default placement table cannot be
    /// built (it always can; the error type is for uniformity with
    /// custom placements).
    pub fn new(model_dir: impl Into<PathBuf>, corpus_path: impl Into<PathBuf>) -> crate::Result<Self> {
        Ok(Self {
            model_dir: model_dir.into(),
            corpus_path: corpus_path.into(),
            adapter_output_dir: PathBuf::from("./fine_tuned_model"),
            merged_output_dir: PathBuf::from("./fine_tuned_model_merged"),
            lora: LoRAConfig::new(16, 32.0).with_dropout(0.1),
            training: TrainingArguments::default(),
            tokenize: TokenizeOptions::default(),
            eval_fraction: 0.1,
            seed: 42,
            placement: DeviceMap::pipeline_split(40, 10, "cuda:0", "cuda:1")?,
        })
    }

    /// Replace the placement table.
    #[must_use]
    pub fn with_placement(mut self, placement: DeviceMap) -> Self {
        self.placement = placement;
        self
    }

    /// Replace the adapter hyperparameters.
    #[must_use]
    pub fn with_lora(mut self, lora: LoRAConfig) -> Self {
        self.lora = lora;
        self
    }

    /// Redirect both output artifacts under a parent directory.
    #[must_use]
    pub fn with_output_root(mut self, root: &Path) -> Self {
        self.adapter_output_dir = root.join("fine_tuned_model");
        self.merged_output_dir = root.join("fine_tuned_model_merged");
        self.training.output_dir = self.adapter_output_dir.clone();
        self
    }
}

/// Paths to the files a completed run wrote.
#[derive(Debug, Clone)]
pub struct PipelineArtifacts {
    /// Adapter directory: `adapter_model.safetensors`, `adapter_config.json`,
    /// `tokenizer.json`
    pub adapter_dir: PathBuf,
    /// Merged model directory: `model.safetensors`, `tokenizer.json`
    pub merged_dir: PathBuf,
    /// What the training backend reported
    pub report: TrainReport,
}

/// The fine-tuning run, driven start to finish by [`FineTunePipeline::run`].
pub struct FineTunePipeline<'a> {
    config: PipelineConfig,
    sink: &'a dyn ProgressSink,
}

impl<'a> FineTunePipeline<'a> {
    /// Create a pipeline reporting progress to `sink`.
    #[must_use]
    pub fn new(config: PipelineConfig, sink: &'a dyn ProgressSink) -> Self {
        Self { config, sink }
    }

    /// Execute the full run with the given training backend.
    ///
    /// # Errors
    /// Returns the first error from any stage: checkpoint or corpus
    /// loading, adapter attachment, tokenization, splitting, the backend
    /// itself, or artifact writing.
    pub fn run(&self, backend: &mut dyn TrainerBackend) -> crate::Result<PipelineArtifacts> {
        let config = &self.config;

        let probed: Vec<DeviceInfo> = config
            .placement
            .devices()
            .iter()
            .filter_map(|d| DeviceInfo::probe(d))
            .collect();
        self.sink.device_map(&config.placement, &probed);

        self.sink.message(&format!(
            "loading checkpoint from {}",
            config.model_dir.display()
        ));
        let base = BaseModel::from_pretrained(&config.model_dir, config.placement.clone())?;
        let tokenizer = PromptTokenizer::from_pretrained(&config.model_dir)?;

        let mut model = AdaptedModel::attach(base, config.lora.clone())?;
        self.sink
            .trainable_parameters(model.trainable_parameters(), model.total_parameters());

        let records = load_conversation_corpus(&config.corpus_path)?;
        self.sink.message(&format!(
            "corpus: {} records, {}",
            records.len(),
            corpus_hash(&records)
        ));

        let examples = tokenize_corpus(&records, &tokenizer, &config.tokenize, self.sink)?;
        let split = train_eval_split(examples, config.eval_fraction, config.seed)?;
        self.sink.message(&format!(
            "split: {} train / {} eval",
            split.train.len(),
            split.eval.len()
        ));

        config.training.validate()?;
        let report = backend.run(&mut model, &config.training, &split.train, &split.eval)?;
        self.sink.message(&format!(
            "training finished: {} epochs, {} steps",
            report.epochs_completed, report.steps
        ));

        model.save_pretrained(&config.adapter_output_dir)?;
        tokenizer.save_pretrained(&config.adapter_output_dir)?;

        let merged = model.merge_and_unload()?;
        merged.save_pretrained(&config.merged_output_dir)?;
        tokenizer.save_pretrained(&config.merged_output_dir)?;
        self.sink.message(&format!(
            "artifacts written to {} and {}",
            config.adapter_output_dir.display(),
            config.merged_output_dir.display()
        ));

        Ok(PipelineArtifacts {
            adapter_dir: config.adapter_output_dir.clone(),
            merged_dir: config.merged_output_dir.clone(),
            report,
        })
    }
}
