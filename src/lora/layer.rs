//! Low-rank factor pair for one adapted weight.

use ndarray::Array2;

/// LoRA factors attached to a frozen base weight.
///
/// A is initialized with small deterministic noise, B with zeros, so the
/// initial delta B.A is exactly zero and attachment does not perturb the
/// base model.
#[derive(Debug, Clone)]
pub struct LoRALayer {
    lora_a: Array2<f32>,
    lora_b: Array2<f32>,
    scale: f32,
}

impl LoRALayer {
    /// Create factors for a weight of shape `[d_out, d_in]`.
    #[must_use]
    pub fn new(d_out: usize, d_in: usize, rank: usize, alpha: f32) -> Self {
        let lora_a = Array2::from_shape_fn((rank, d_in), |(i, j)| {
            ((i * d_in + j) as f32 * 0.1).sin() * 0.01
        });
        let lora_b = Array2::zeros((d_out, rank));

        Self {
            lora_a,
            lora_b,
            scale: alpha / rank as f32,
        }
    }

    /// Adapter delta `scale * B.A` with shape `[d_out, d_in]`.
    #[must_use]
    pub fn delta(&self) -> Array2<f32> {
        let mut ba = self.lora_b.dot(&self.lora_a);
        ba.mapv_inplace(|v| v * self.scale);
        ba
    }

    /// Merge the delta into a flat row-major base weight buffer.
    ///
    /// # Panics
    /// Panics if `base` does not match the factor dimensions; callers are
    /// expected to have validated shapes at attachment time.
    pub fn merge_into(&self, base: &mut [f32]) {
        let delta = self.delta();
        assert_eq!(
            base.len(),
            delta.len(),
            "base weight length must match adapter dimensions"
        );
        for (w, d) in base.iter_mut().zip(delta.iter()) {
            *w += *d;
        }
    }

    /// A factor, `[rank, d_in]`.
    #[must_use]
    pub fn lora_a(&self) -> &Array2<f32> {
        &self.lora_a
    }

    /// B factor, `[d_out, rank]`.
    #[must_use]
    pub fn lora_b(&self) -> &Array2<f32> {
        &self.lora_b
    }

    /// Mutable A factor, for the training backend.
    pub fn lora_a_mut(&mut self) -> &mut Array2<f32> {
        &mut self.lora_a
    }

    /// Mutable B factor, for the training backend.
    pub fn lora_b_mut(&mut self) -> &mut Array2<f32> {
        &mut self.lora_b
    }

    /// Decomposition rank.
    #[must_use]
    pub fn rank(&self) -> usize {
        self.lora_a.nrows()
    }

    /// Effective scaling factor.
    #[must_use]
    pub fn scale(&self) -> f32 {
        self.scale
    }

    /// Output dimension of the adapted weight.
    #[must_use]
    pub fn d_out(&self) -> usize {
        self.lora_b.nrows()
    }

    /// Input dimension of the adapted weight.
    #[must_use]
    pub fn d_in(&self) -> usize {
        self.lora_a.ncols()
    }

    /// Trainable parameter count (A plus B).
    #[must_use]
    pub fn num_parameters(&self) -> usize {
        self.lora_a.len() + self.lora_b.len()
    }
}
