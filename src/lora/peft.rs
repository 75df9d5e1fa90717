//! PEFT-compatible `adapter_config.json` generation.
//!
//! The adapter artifact carries a config file in the HuggingFace PEFT
//! schema so the trained adapter loads directly in the Python ecosystem.

use super::config::{LoRAConfig, TargetModules};
use serde::{Deserialize, Serialize};

/// Serialized form of the adapter configuration, PEFT schema.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PeftAdapterConfig {
    /// Adapter method, always "LORA"
    pub peft_type: String,
    /// Task type for causal language modeling
    pub task_type: String,
    /// LoRA rank
    pub r: usize,
    /// LoRA alpha
    pub lora_alpha: f32,
    /// LoRA dropout
    pub lora_dropout: f32,
    /// Target selector: module names, or the string "all-linear"
    pub target_modules: TargetSelector,
    /// Bias handling, always "none" here
    pub bias: String,
    /// Base model checkpoint path, when known
    #[serde(skip_serializing_if = "Option::is_none")]
    pub base_model_name_or_path: Option<String>,
}

/// PEFT encodes the all-linear selector as a bare string and named
/// selections as a list.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum TargetSelector {
    /// `"all-linear"`
    Keyword(String),
    /// Explicit module names, sorted for deterministic output
    Names(Vec<String>),
}

impl PeftAdapterConfig {
    /// Build the PEFT view of a [`LoRAConfig`].
    #[must_use]
    pub fn from_lora_config(config: &LoRAConfig, base_model: Option<&str>) -> Self {
        let target_modules = match &config.target_modules {
            TargetModules::AllLinear => TargetSelector::Keyword("all-linear".to_string()),
            TargetModules::Named(set) => {
                TargetSelector::Names(set.iter().cloned().collect())
            }
        };

        Self {
            peft_type: "LORA".to_string(),
            task_type: "CAUSAL_LM".to_string(),
            r: config.rank,
            lora_alpha: config.alpha,
            lora_dropout: config.dropout,
            target_modules,
            bias: "none".to_string(),
            base_model_name_or_path: base_model.map(String::from),
        }
    }

    /// Serialize to pretty JSON.
    ///
    /// # Errors
    /// Returns an error if serialization fails.
    pub fn to_json(&self) -> crate::Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Deserialize from JSON.
    ///
    /// # Errors
    /// Returns an error if the JSON does not match the schema.
    pub fn from_json(json: &str) -> crate::Result<Self> {
        Ok(serde_json::from_str(json)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_all_linear_serializes_as_keyword() {
        let config = LoRAConfig::new(16, 32.0).with_dropout(0.1);
        let peft = PeftAdapterConfig::from_lora_config(&config, Some("./Phi-3.5-mini-instruct"));
        let json = peft.to_json().unwrap();

        assert!(json.contains("\"peft_type\": \"LORA\""));
        assert!(json.contains("\"task_type\": \"CAUSAL_LM\""));
        assert!(json.contains("\"target_modules\": \"all-linear\""));
        assert!(json.contains("\"r\": 16"));
        assert!(json.contains("Phi-3.5-mini-instruct"));
    }

    #[test]
    fn test_named_modules_serialize_sorted() {
        let config = LoRAConfig::new(8, 16.0).target_modules(["v_proj", "q_proj"]);
        let peft = PeftAdapterConfig::from_lora_config(&config, None);

        match &peft.target_modules {
            TargetSelector::Names(names) => {
                assert_eq!(names, &vec!["q_proj".to_string(), "v_proj".to_string()]);
            }
            TargetSelector::Keyword(_) => panic!("expected named modules"),
        }
    }

    #[test]
    fn test_json_roundtrip() {
        let config = LoRAConfig::new(16, 32.0).with_dropout(0.1);
        let peft = PeftAdapterConfig::from_lora_config(&config, Some("base"));
        let restored = PeftAdapterConfig::from_json(&peft.to_json().unwrap()).unwrap();
        assert_eq!(peft, restored);
    }

    #[test]
    fn test_base_model_omitted_when_unknown() {
        let peft = PeftAdapterConfig::from_lora_config(&LoRAConfig::new(4, 4.0), None);
        let json = peft.to_json().unwrap();
        assert!(!json.contains("base_model_name_or_path"));
    }
}
