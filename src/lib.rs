//! # afinar
//!
//! LoRA fine-tuning pipeline for multi-turn conversation corpora, with
//! manual partitioning of model layers across two accelerator devices.
//!
//! The crate owns the deterministic, testable parts of a fine-tuning run:
//!
//! - [`placement`] — the layer-placement table mapping model components to
//!   devices, built once before checkpoint loading
//! - [`chat`] — conversation records and the role-tagged prompt serializer
//! - [`dataset`] — fixed-length tokenization and the deterministic
//!   train/eval split
//! - [`lora`] — adapter configuration, target-module selection, and the
//!   low-rank merge algebra
//! - [`model`] — safetensors checkpoint I/O with placement enforcement,
//!   adapter attachment, and merged-model export
//! - [`pipeline`] — the sequential driver wiring everything to a training
//!   backend
//!
//! The training loop itself is an external collaborator behind the
//! [`train::TrainerBackend`] trait: this crate hands it an adapted model,
//! hyperparameters, and tokenized partitions, and persists whatever comes
//! back.
//!
//! # Example
//!
//! ```ignore
//! use afinar::observe::ConsoleSink;
//! use afinar::pipeline::{FineTunePipeline, PipelineConfig};
//!
//! let config = PipelineConfig::new("./Phi-3.5-mini-instruct", "merged_sharegpt.json")?;
//! let pipeline = FineTunePipeline::new(config, &ConsoleSink);
//! let artifacts = pipeline.run(&mut backend)?;
//! println!("adapter saved to {}", artifacts.adapter_dir.display());
//! ```

pub mod chat;
pub mod dataset;
mod error;
pub mod lora;
pub mod model;
pub mod observe;
pub mod pipeline;
pub mod placement;
pub mod tokenizer;
pub mod train;

pub use error::{Error, Result};
