//! Layer-placement table for manual multi-device model partitioning.
//!
//! A [`DeviceMap`] assigns named model components to accelerator devices
//! before the checkpoint is loaded. The table is built once and read-only
//! thereafter; it performs no device-availability validation. A component
//! the model references but the table does not cover fails at load time
//! (see [`crate::model::BaseModel::from_pretrained`]).

use std::fmt;

/// Component name of the token embedding table.
pub const EMBED_TOKENS: &str = "model.embed_tokens";
/// Component name of the final normalization weight.
pub const FINAL_NORM: &str = "model.norm.weight";
/// Component name of the output head.
pub const LM_HEAD: &str = "lm_head.weight";

/// Ordered mapping from model component names to device identifiers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceMap {
    entries: Vec<(String, String)>,
}

impl DeviceMap {
    /// Build a two-device pipeline split.
    ///
    /// The embedding table and decoder layers below `split` go to `first`;
    /// layers at or above `split`, the final norm, and the output head go
    /// to `second`.
    ///
    /// # Errors
    /// Returns a config error if `num_layers` is zero or `split` exceeds
    /// `num_layers`.
    pub fn pipeline_split(
        num_layers: usize,
        split: usize,
        first: &str,
        second: &str,
    ) -> crate::Result<Self> {
        if num_layers == 0 {
            return Err(crate::Error::Config(
                "pipeline split requires at least one layer".to_string(),
            ));
        }
        if split > num_layers {
            return Err(crate::Error::Config(format!(
                "split point {split} exceeds layer count {num_layers}"
            )));
        }

        let mut entries = Vec::with_capacity(num_layers + 3);
        entries.push((EMBED_TOKENS.to_string(), first.to_string()));
        for i in 0..split {
            entries.push((format!("model.layers.{i}"), first.to_string()));
        }
        for i in split..num_layers {
            entries.push((format!("model.layers.{i}"), second.to_string()));
        }
        entries.push((FINAL_NORM.to_string(), second.to_string()));
        entries.push((LM_HEAD.to_string(), second.to_string()));

        Ok(Self { entries })
    }

    /// Build a map that places every component on a single device.
    #[must_use]
    pub fn single_device(device: &str) -> Self {
        Self {
            entries: vec![(String::new(), device.to_string())],
        }
    }

    /// Resolve the device for a parameter name.
    ///
    /// A parameter matches an entry exactly or by module prefix:
    /// `model.layers.1` covers `model.layers.1.self_attn.q_proj.weight`
    /// but never `model.layers.10.*`. The empty component name matches
    /// everything (single-device map).
    #[must_use]
    pub fn device_for(&self, param: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(component, _)| {
                component.is_empty()
                    || param == component
                    || (param.starts_with(component.as_str())
                        && param.as_bytes().get(component.len()) == Some(&b'.'))
            })
            .map(|(_, device)| device.as_str())
    }

    /// Distinct device identifiers, in first-use order.
    #[must_use]
    pub fn devices(&self) -> Vec<&str> {
        let mut seen: Vec<&str> = Vec::new();
        for (_, device) in &self.entries {
            if !seen.contains(&device.as_str()) {
                seen.push(device);
            }
        }
        seen
    }

    /// Iterate over `(component, device)` entries in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(c, d)| (c.as_str(), d.as_str()))
    }

    /// Number of entries in the table.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the table is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl fmt::Display for DeviceMap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (component, device) in &self.entries {
            writeln!(f, "{component}: {device}")?;
        }
        Ok(())
    }
}

/// Hardware information for one device, for operator visibility only.
#[derive(Debug, Clone)]
pub struct DeviceInfo {
    /// Device identifier as used in the placement table
    pub device: String,
    /// Hardware name
    pub name: String,
    /// Total memory in GB
    pub memory_gb: f64,
    /// Driver version, when known
    pub driver_version: Option<String>,
}

impl DeviceInfo {
    /// Probe a device identifier (`cuda:N` or `cpu`).
    ///
    /// Returns `None` when the device cannot be queried; probing never
    /// fails the pipeline.
    #[must_use]
    pub fn probe(device: &str) -> Option<Self> {
        if let Some(id) = device.strip_prefix("cuda:") {
            let id: usize = id.parse().ok()?;
            return Self::cuda_info(device, id);
        }
        if device == "cpu" {
            return Some(Self::cpu_info());
        }
        None
    }

    /// CPU description from core count and `/proc/meminfo`.
    #[must_use]
    pub fn cpu_info() -> Self {
        let num_cores = std::thread::available_parallelism()
            .map(std::num::NonZero::get)
            .unwrap_or(1);

        Self {
            device: "cpu".to_string(),
            name: format!("CPU ({num_cores} cores)"),
            memory_gb: Self::system_memory_gb(),
            driver_version: None,
        }
    }

    /// Query nvidia-smi for one CUDA device.
    fn cuda_info(device: &str, id: usize) -> Option<Self> {
        let output = std::process::Command::new("nvidia-smi")
            .args([
                "--query-gpu=name,memory.total,driver_version",
                "--format=csv,noheader,nounits",
                &format!("--id={id}"),
            ])
            .output()
            .ok()?;

        if !output.status.success() {
            return None;
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        let parts: Vec<&str> = stdout.trim().split(", ").collect();
        if parts.len() < 3 {
            return None;
        }

        let memory_mb: f64 = parts[1].parse().unwrap_or(0.0);
        Some(Self {
            device: device.to_string(),
            name: parts[0].to_string(),
            memory_gb: memory_mb / 1024.0,
            driver_version: Some(parts[2].to_string()),
        })
    }

    fn system_memory_gb() -> f64 {
        if let Ok(content) = std::fs::read_to_string("/proc/meminfo") {
            for line in content.lines() {
                if let Some(rest) = line.strip_prefix("MemTotal:") {
                    if let Some(kb) = rest.split_whitespace().next() {
                        if let Ok(kb) = kb.parse::<f64>() {
                            return kb / 1024.0 / 1024.0;
                        }
                    }
                }
            }
        }
        16.0
    }
}

impl fmt::Display for DeviceInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {} ({:.1} GB)", self.device, self.name, self.memory_gb)
    }
}
