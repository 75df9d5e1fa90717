//! Checkpoint I/O and adapter attachment.
//!
//! [`BaseModel`] loads a safetensors checkpoint while enforcing the
//! layer-placement invariant: every parameter must resolve to a device or
//! the load fails. [`AdaptedModel`] wraps a base model with LoRA factors
//! on its selected linear weights and owns the two output artifacts: the
//! adapter-only save and the merged full-model save.

use crate::lora::{LoRAConfig, LoRALayer, PeftAdapterConfig};
use crate::placement::DeviceMap;
use safetensors::tensor::{Dtype, TensorView};
use safetensors::SafeTensors;
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};

/// Checkpoint weight file name.
const WEIGHTS_FILE: &str = "model.safetensors";
/// Adapter-only artifact file name.
const ADAPTER_WEIGHTS_FILE: &str = "adapter_model.safetensors";
/// Adapter configuration file name.
const ADAPTER_CONFIG_FILE: &str = "adapter_config.json";

/// One named parameter tensor, decoded to f32 row-major data.
#[derive(Debug, Clone)]
pub struct NamedTensor {
    /// Tensor shape
    pub shape: Vec<usize>,
    /// Row-major values
    pub data: Vec<f32>,
}

/// A loaded base model: named tensors plus their device assignments.
#[derive(Debug, Clone)]
pub struct BaseModel {
    tensors: BTreeMap<String, NamedTensor>,
    assignments: BTreeMap<String, String>,
    placement: DeviceMap,
    source: Option<PathBuf>,
}

impl BaseModel {
    /// Load `model.safetensors` from a checkpoint directory, resolving a
    /// device for every parameter.
    ///
    /// # Errors
    /// Returns [`crate::Error::MissingPlacement`] for any parameter the
    /// placement table does not cover, a checkpoint error if the weight
    /// file is absent, and a safetensors error for undecodable content.
    pub fn from_pretrained(model_dir: &Path, placement: DeviceMap) -> crate::Result<Self> {
        let path = model_dir.join(WEIGHTS_FILE);
        let bytes = std::fs::read(&path).map_err(|e| crate::Error::Checkpoint {
            path: path.clone(),
            message: format!("cannot read weights: {e}"),
        })?;
        let tensors_file = SafeTensors::deserialize(&bytes)
            .map_err(|e| crate::Error::SafeTensors(e.to_string()))?;

        let mut tensors = BTreeMap::new();
        let mut assignments = BTreeMap::new();
        for (name, view) in tensors_file.tensors() {
            let device = placement
                .device_for(&name)
                .ok_or_else(|| crate::Error::MissingPlacement {
                    component: name.clone(),
                })?
                .to_string();
            let data = decode_to_f32(&view)?;
            assignments.insert(name.clone(), device);
            tensors.insert(
                name,
                NamedTensor {
                    shape: view.shape().to_vec(),
                    data,
                },
            );
        }

        Ok(Self {
            tensors,
            assignments,
            placement,
            source: Some(model_dir.to_path_buf()),
        })
    }

    /// Build a model directly from named tensors (used by tests and
    /// synthetic checkpoints). Placement resolution still applies.
    ///
    /// # Errors
    /// Returns [`crate::Error::MissingPlacement`] for unresolvable names.
    pub fn from_tensors(
        tensors: impl IntoIterator<Item = (String, NamedTensor)>,
        placement: DeviceMap,
    ) -> crate::Result<Self> {
        let tensors: BTreeMap<String, NamedTensor> = tensors.into_iter().collect();
        let mut assignments = BTreeMap::new();
        for name in tensors.keys() {
            let device = placement
                .device_for(name)
                .ok_or_else(|| crate::Error::MissingPlacement {
                    component: name.clone(),
                })?
                .to_string();
            assignments.insert(name.clone(), device);
        }
        Ok(Self {
            tensors,
            assignments,
            placement,
            source: None,
        })
    }

    /// Look up a tensor by parameter name.
    #[must_use]
    pub fn tensor(&self, name: &str) -> Option<&NamedTensor> {
        self.tensors.get(name)
    }

    /// Iterate `(name, tensor)` in name order.
    pub fn tensors(&self) -> impl Iterator<Item = (&str, &NamedTensor)> {
        self.tensors.iter().map(|(n, t)| (n.as_str(), t))
    }

    /// Device assigned to a parameter at load time.
    #[must_use]
    pub fn device_of(&self, name: &str) -> Option<&str> {
        self.assignments.get(name).map(String::as_str)
    }

    /// The placement table this model was loaded with.
    #[must_use]
    pub fn placement(&self) -> &DeviceMap {
        &self.placement
    }

    /// Checkpoint directory this model came from, when loaded from disk.
    #[must_use]
    pub fn source(&self) -> Option<&Path> {
        self.source.as_deref()
    }

    /// Total parameter count.
    #[must_use]
    pub fn param_count(&self) -> usize {
        self.tensors.values().map(|t| t.data.len()).sum()
    }

    /// Write the model to `dir/model.safetensors` as F32.
    ///
    /// # Errors
    /// Returns an error if the directory cannot be created or the
    /// serialization fails.
    pub fn save_pretrained(&self, dir: &Path) -> crate::Result<()> {
        std::fs::create_dir_all(dir)?;
        let entries: Vec<(String, Vec<usize>, &[f32])> = self
            .tensors
            .iter()
            .map(|(name, t)| (name.clone(), t.shape.clone(), t.data.as_slice()))
            .collect();
        write_safetensors(&dir.join(WEIGHTS_FILE), &entries)
    }
}

/// A base model with LoRA factors attached to its selected weights.
pub struct AdaptedModel {
    base: BaseModel,
    adapters: Vec<(String, LoRALayer)>,
    config: LoRAConfig,
}

impl AdaptedModel {
    /// Attach adapters to every weight the config's target selector
    /// matches, in parameter-name order.
    ///
    /// # Errors
    /// Returns a config error if the config is invalid or no weight
    /// matches the selector.
    pub fn attach(base: BaseModel, config: LoRAConfig) -> crate::Result<Self> {
        config.validate()?;

        let mut adapters = Vec::new();
        for (name, tensor) in base.tensors() {
            if config.target_modules.matches(name, &tensor.shape) {
                let module = name.trim_end_matches(".weight").to_string();
                let layer =
                    LoRALayer::new(tensor.shape[0], tensor.shape[1], config.rank, config.alpha);
                adapters.push((module, layer));
            }
        }

        if adapters.is_empty() {
            return Err(crate::Error::Config(
                "no model weights matched the LoRA target selector".to_string(),
            ));
        }

        Ok(Self {
            base,
            adapters,
            config,
        })
    }

    /// The underlying base model.
    #[must_use]
    pub fn base(&self) -> &BaseModel {
        &self.base
    }

    /// Adapter config used at attachment.
    #[must_use]
    pub fn config(&self) -> &LoRAConfig {
        &self.config
    }

    /// Attached adapters as `(module_name, layer)`, in attachment order.
    #[must_use]
    pub fn adapters(&self) -> &[(String, LoRALayer)] {
        &self.adapters
    }

    /// Mutable adapters, for the training backend.
    pub fn adapters_mut(&mut self) -> &mut [(String, LoRALayer)] {
        &mut self.adapters
    }

    /// Trainable (adapter) parameter count.
    #[must_use]
    pub fn trainable_parameters(&self) -> usize {
        self.adapters.iter().map(|(_, l)| l.num_parameters()).sum()
    }

    /// Total parameter count: frozen base plus adapters.
    #[must_use]
    pub fn total_parameters(&self) -> usize {
        self.base.param_count() + self.trainable_parameters()
    }

    /// One-line summary of what is trainable.
    #[must_use]
    pub fn summary(&self) -> String {
        format!(
            "{} adapted modules, rank={}, alpha={:.1}, trainable params: {} / {}",
            self.adapters.len(),
            self.config.rank,
            self.config.alpha,
            self.trainable_parameters(),
            self.total_parameters(),
        )
    }

    /// Write the adapter-only artifact: `adapter_model.safetensors` with
    /// the A/B factors per module, plus `adapter_config.json`.
    ///
    /// # Errors
    /// Returns an error on directory, serialization, or write failure.
    pub fn save_pretrained(&self, dir: &Path) -> crate::Result<()> {
        std::fs::create_dir_all(dir)?;

        let mut flats: Vec<(String, Vec<usize>, Vec<f32>)> = Vec::new();
        for (module, layer) in &self.adapters {
            flats.push((
                format!("{module}.lora_A.weight"),
                vec![layer.rank(), layer.d_in()],
                layer.lora_a().iter().copied().collect(),
            ));
            flats.push((
                format!("{module}.lora_B.weight"),
                vec![layer.d_out(), layer.rank()],
                layer.lora_b().iter().copied().collect(),
            ));
        }
        let entries: Vec<(String, Vec<usize>, &[f32])> = flats
            .iter()
            .map(|(n, s, d)| (n.clone(), s.clone(), d.as_slice()))
            .collect();
        write_safetensors(&dir.join(ADAPTER_WEIGHTS_FILE), &entries)?;

        let base_name = self
            .base
            .source()
            .map(|p| p.to_string_lossy().into_owned());
        let peft = PeftAdapterConfig::from_lora_config(&self.config, base_name.as_deref());
        std::fs::write(dir.join(ADAPTER_CONFIG_FILE), peft.to_json()?)?;
        Ok(())
    }

    /// Fold every adapter delta into its base weight and return the merged
    /// base model.
    ///
    /// # Errors
    /// Returns an error if an adapted module no longer resolves to a base
    /// tensor (cannot happen through [`AdaptedModel::attach`]).
    pub fn merge_and_unload(mut self) -> crate::Result<BaseModel> {
        for (module, layer) in &self.adapters {
            let name = format!("{module}.weight");
            let tensor = self.base.tensors.get_mut(&name).ok_or_else(|| {
                crate::Error::Config(format!("adapted module {module} has no base weight"))
            })?;
            layer.merge_into(&mut tensor.data);
        }
        Ok(self.base)
    }
}

/// Decode a safetensors view to f32, accepting F32/F16/BF16.
fn decode_to_f32(view: &TensorView<'_>) -> crate::Result<Vec<f32>> {
    let bytes = view.data();
    match view.dtype() {
        Dtype::F32 => Ok(bytes
            .chunks_exact(4)
            .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
            .collect()),
        Dtype::F16 => Ok(bytes
            .chunks_exact(2)
            .map(|c| half::f16::from_le_bytes([c[0], c[1]]).to_f32())
            .collect()),
        Dtype::BF16 => Ok(bytes
            .chunks_exact(2)
            .map(|c| half::bf16::from_le_bytes([c[0], c[1]]).to_f32())
            .collect()),
        other => Err(crate::Error::SafeTensors(format!(
            "unsupported tensor dtype {other:?}"
        ))),
    }
}

/// Serialize named f32 tensors to a safetensors file.
fn write_safetensors(path: &Path, entries: &[(String, Vec<usize>, &[f32])]) -> crate::Result<()> {
    let tensor_data: Vec<(String, Vec<u8>, Vec<usize>)> = entries
        .iter()
        .map(|(name, shape, data)| {
            let bytes: Vec<u8> = bytemuck::cast_slice(data).to_vec();
            (name.clone(), bytes, shape.clone())
        })
        .collect();

    let mut views: Vec<(&str, TensorView<'_>)> = Vec::with_capacity(tensor_data.len());
    for (name, bytes, shape) in &tensor_data {
        let view = TensorView::new(Dtype::F32, shape.clone(), bytes)
            .map_err(|e| crate::Error::SafeTensors(e.to_string()))?;
        views.push((name.as_str(), view));
    }

    let mut metadata = HashMap::new();
    metadata.insert("format".to_string(), "afinar".to_string());

    let bytes = safetensors::serialize(views, &Some(metadata))
        .map_err(|e| crate::Error::SafeTensors(e.to_string()))?;
    std::fs::write(path, bytes)?;
    Ok(())
}
