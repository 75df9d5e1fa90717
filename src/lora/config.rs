//! LoRA adapter configuration and target-module selection.

use std::collections::BTreeSet;

/// Which model weights receive adapters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TargetModules {
    /// Every linear projection: two-dimensional `.weight` tensors,
    /// excluding the embedding table, final norm, and output head.
    AllLinear,
    /// Only modules whose final path segment is in the set
    /// (e.g. `q_proj`, `v_proj`).
    Named(BTreeSet<String>),
}

impl TargetModules {
    /// Whether a parameter with the given name and shape is selected.
    #[must_use]
    pub fn matches(&self, name: &str, shape: &[usize]) -> bool {
        let Some(module) = linear_module_name(name, shape) else {
            return false;
        };
        match self {
            Self::AllLinear => true,
            Self::Named(set) => {
                let leaf = module.rsplit('.').next().unwrap_or(module);
                set.contains(leaf)
            }
        }
    }
}

/// Module name for a linear weight, or `None` if the parameter is not an
/// adaptable linear projection.
fn linear_module_name<'a>(name: &'a str, shape: &[usize]) -> Option<&'a str> {
    if shape.len() != 2 {
        return None;
    }
    let module = name.strip_suffix(".weight")?;
    if module.ends_with("embed_tokens")
        || module == "lm_head"
        || module.ends_with("norm")
        || module.contains("layernorm")
    {
        return None;
    }
    Some(module)
}

/// Adapter hyperparameters.
#[derive(Debug, Clone, PartialEq)]
pub struct LoRAConfig {
    /// Decomposition rank
    pub rank: usize,
    /// Scaling numerator; effective scale is `alpha / rank`
    pub alpha: f32,
    /// Dropout rate applied by the training backend
    pub dropout: f32,
    /// Which weights receive adapters
    pub target_modules: TargetModules,
}

impl LoRAConfig {
    /// New config targeting all linear projections, with no dropout.
    #[must_use]
    pub fn new(rank: usize, alpha: f32) -> Self {
        Self {
            rank,
            alpha,
            dropout: 0.0,
            target_modules: TargetModules::AllLinear,
        }
    }

    /// Set the dropout rate.
    #[must_use]
    pub fn with_dropout(mut self, dropout: f32) -> Self {
        self.dropout = dropout;
        self
    }

    /// Target only the named modules.
    #[must_use]
    pub fn target_modules<I, S>(mut self, modules: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.target_modules =
            TargetModules::Named(modules.into_iter().map(Into::into).collect());
        self
    }

    /// Effective scaling factor `alpha / rank`.
    #[must_use]
    pub fn scale(&self) -> f32 {
        self.alpha / self.rank as f32
    }

    /// Validate hyperparameter ranges.
    ///
    /// # Errors
    /// Returns a config error for zero rank, non-positive alpha, or a
    /// dropout outside `[0, 1)`.
    pub fn validate(&self) -> crate::Result<()> {
        if self.rank == 0 {
            return Err(crate::Error::Config("LoRA rank must be > 0".to_string()));
        }
        if self.alpha <= 0.0 {
            return Err(crate::Error::Config(format!(
                "LoRA alpha must be positive, got {}",
                self.alpha
            )));
        }
        if !(0.0..1.0).contains(&self.dropout) {
            return Err(crate::Error::Config(format!(
                "LoRA dropout must be in [0, 1), got {}",
                self.dropout
            )));
        }
        Ok(())
    }
}
