//! Training arguments and the backend seam.
//!
//! The optimization loop itself lives behind [`TrainerBackend`]; this
//! crate prepares the adapted model and datasets, hands them over, and
//! consumes the resulting report. Arguments mirror the HuggingFace
//! `TrainingArguments` fields the pipeline fixes.

use crate::dataset::TokenizedExample;
use crate::model::AdaptedModel;
use std::path::PathBuf;

/// Hyperparameters handed to the training backend.
#[derive(Debug, Clone, PartialEq)]
pub struct TrainingArguments {
    /// Directory for backend-side checkpoints and logs
    pub output_dir: PathBuf,
    /// Optimizer learning rate
    pub learning_rate: f64,
    /// Examples per device per step
    pub per_device_batch_size: usize,
    /// Full passes over the training split
    pub epochs: usize,
    /// Micro-batches accumulated before each optimizer step
    pub gradient_accumulation_steps: usize,
    /// Decoupled weight decay coefficient
    pub weight_decay: f64,
    /// Run the backend in half precision
    pub fp16: bool,
    /// Evaluate on the held-out split after each epoch
    pub eval_each_epoch: bool,
}

impl Default for TrainingArguments {
    fn default() -> Self {
        Self {
            output_dir: PathBuf::from("./fine_tuned_model"),
            learning_rate: 2e-5,
            per_device_batch_size: 1,
            epochs: 3,
            gradient_accumulation_steps: 4,
            weight_decay: 0.01,
            fp16: true,
            eval_each_epoch: true,
        }
    }
}

impl TrainingArguments {
    /// Arguments writing backend output under `output_dir`.
    #[must_use]
    pub fn new(output_dir: impl Into<PathBuf>) -> Self {
        Self {
            output_dir: output_dir.into(),
            ..Self::default()
        }
    }

    /// Set the learning rate.
    #[must_use]
    pub fn with_learning_rate(mut self, lr: f64) -> Self {
        self.learning_rate = lr;
        self
    }

    /// Set the epoch count.
    #[must_use]
    pub fn with_epochs(mut self, epochs: usize) -> Self {
        self.epochs = epochs;
        self
    }

    /// Effective batch size: per-device batch times accumulation steps.
    #[must_use]
    pub fn effective_batch_size(&self) -> usize {
        self.per_device_batch_size * self.gradient_accumulation_steps
    }

    /// Validate argument ranges.
    ///
    /// # Errors
    /// Returns a config error for non-positive learning rate, zero
    /// batch size, zero epochs, zero accumulation steps, or negative
    /// weight decay.
    pub fn validate(&self) -> crate::Result<()> {
        if self.learning_rate <= 0.0 {
            return Err(crate::Error::Config(format!(
                "learning rate must be positive, got {}",
                self.learning_rate
            )));
        }
        if self.per_device_batch_size == 0 {
            return Err(crate::Error::Config(
                "batch size must be > 0".to_string(),
            ));
        }
        if self.epochs == 0 {
            return Err(crate::Error::Config("epochs must be > 0".to_string()));
        }
        if self.gradient_accumulation_steps == 0 {
            return Err(crate::Error::Config(
                "gradient accumulation steps must be > 0".to_string(),
            ));
        }
        if self.weight_decay < 0.0 {
            return Err(crate::Error::Config(format!(
                "weight decay must be non-negative, got {}",
                self.weight_decay
            )));
        }
        Ok(())
    }
}

/// Outcome summary returned by a training backend.
#[derive(Debug, Clone, PartialEq)]
pub struct TrainReport {
    /// Epochs the backend completed
    pub epochs_completed: usize,
    /// Optimizer steps taken
    pub steps: usize,
    /// Training loss at the end of the run, when reported
    pub final_train_loss: Option<f32>,
    /// Eval loss at the end of the run, when reported
    pub final_eval_loss: Option<f32>,
}

/// The optimization loop, supplied by the caller.
///
/// The backend receives the adapted model with mutable adapter factors,
/// the fixed base weights, the hyperparameters, and the two tokenized
/// splits. It updates the factors in place and reports what it did.
pub trait TrainerBackend {
    /// Run the training loop.
    ///
    /// # Errors
    /// Backends surface their failures as [`crate::Error::Backend`].
    fn run(
        &mut self,
        model: &mut AdaptedModel,
        args: &TrainingArguments,
        train: &[TokenizedExample],
        eval: &[TokenizedExample],
    ) -> crate::Result<TrainReport>;
}
