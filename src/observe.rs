//! Pluggable observability sink for pipeline diagnostics.
//!
//! The original driver printed its device table, hardware names, formatted
//! prompts, and trainable-parameter summary to stdout. That output is
//! operational, not contractual, so it goes through a sink the caller can
//! replace or silence.

use crate::placement::{DeviceInfo, DeviceMap};

/// Receiver for pipeline diagnostics.
///
/// Every method has an empty default body; implementations override only
/// what they care about.
pub trait ProgressSink {
    /// The placement table and whatever hardware could be probed.
    fn device_map(&self, _map: &DeviceMap, _devices: &[DeviceInfo]) {}

    /// One formatted prompt, before tokenization.
    fn prompt(&self, _prompt: &str) {}

    /// Trainable vs. total parameter counts after adapter attachment.
    fn trainable_parameters(&self, _trainable: usize, _total: usize) {}

    /// Free-form progress message.
    fn message(&self, _msg: &str) {}
}

/// Sink that prints everything to stdout, matching the original driver's
/// console output.
#[derive(Debug, Default, Clone, Copy)]
pub struct ConsoleSink;

impl ProgressSink for ConsoleSink {
    fn device_map(&self, map: &DeviceMap, devices: &[DeviceInfo]) {
        for info in devices {
            println!("{info}");
        }
        print!("{map}");
    }

    fn prompt(&self, prompt: &str) {
        println!("prompt:\n{prompt}");
    }

    fn trainable_parameters(&self, trainable: usize, total: usize) {
        let pct = if total > 0 {
            100.0 * trainable as f64 / total as f64
        } else {
            0.0
        };
        println!("trainable params: {trainable} || all params: {total} || trainable%: {pct:.4}");
    }

    fn message(&self, msg: &str) {
        println!("{msg}");
    }
}

/// Sink that discards everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullSink;

impl ProgressSink for NullSink {}
