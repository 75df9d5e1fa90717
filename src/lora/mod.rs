//! LoRA (low-rank adaptation) configuration and merge algebra.
//!
//! For a frozen weight W in R^(d_out x d_in), LoRA adds dW = scale * B.A
//! with A in R^(r x d_in) and B in R^(d_out x r). Training the factors is
//! the backend's job; this module owns their shapes, initialization,
//! target selection, and the merge into the base weight.

mod config;
mod layer;
mod peft;

pub use config::{LoRAConfig, TargetModules};
pub use layer::LoRALayer;
pub use peft::{PeftAdapterConfig, TargetSelector};
