//! Fully connected building block shared by the feature extractor and the
//! classifiers.
//!
//! Layer order: `Linear → Dropout → [BatchNorm] → [ReLU]`.

use candle_core::{ModuleT, Result, Tensor};
use candle_nn::{batch_norm, linear, BatchNorm, BatchNormConfig, Linear, Module, VarBuilder};

/// Dropout keep probability and train/eval switch for one forward pass.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Regularization {
    /// Probability of keeping a unit; `1.0` disables dropout.
    pub keep_prob: f64,
    /// Training mode: dropout active, batch norm uses batch statistics.
    pub training: bool,
}

impl Regularization {
    /// Evaluation settings: no dropout, running batch-norm statistics.
    pub fn eval() -> Self {
        Self {
            keep_prob: 1.0,
            training: false,
        }
    }
}

/// One dense layer with optional batch norm and ReLU.
#[derive(Debug)]
pub struct DenseLayer {
    linear: Linear,
    norm: Option<BatchNorm>,
    relu: bool,
}

impl DenseLayer {
    /// Creates the layer's variables under `vb`.
    ///
    /// Weights live at `fully_connected.{weight,bias}`, batch norm state at
    /// `batch_normalization.*`.
    pub fn new(
        in_dim: usize,
        out_dim: usize,
        use_batch_norm: bool,
        relu: bool,
        vb: VarBuilder,
    ) -> Result<Self> {
        let linear = linear(in_dim, out_dim, vb.pp("fully_connected"))?;
        let norm = if use_batch_norm {
            let config = BatchNormConfig {
                eps: 1e-3,
                momentum: 0.01,
                ..BatchNormConfig::default()
            };
            Some(batch_norm(out_dim, config, vb.pp("batch_normalization"))?)
        } else {
            None
        };
        Ok(Self { linear, norm, relu })
    }

    /// Maps `[B, in_dim]` to `[B, out_dim]`.
    pub fn forward(&self, x: &Tensor, reg: Regularization) -> Result<Tensor> {
        let mut out = self.linear.forward(x)?;
        out = dropout(&out, reg)?;
        if let Some(norm) = &self.norm {
            out = norm.forward_t(&out, reg.training)?;
        }
        if self.relu {
            out = out.relu()?;
        }
        Ok(out)
    }
}

/// Inverted dropout, active only in training mode with `keep_prob < 1`.
pub fn dropout(x: &Tensor, reg: Regularization) -> Result<Tensor> {
    if !reg.training || reg.keep_prob >= 1.0 {
        return Ok(x.clone());
    }
    candle_nn::ops::dropout(x, (1.0 - reg.keep_prob) as f32)
}

/// A stack of dense layers of equal hidden width.
///
/// The last layer gets `out_dim` units and, when `relu_last` is false, no
/// activation (used to produce logits).
#[derive(Debug)]
pub struct DenseStack {
    layers: Vec<DenseLayer>,
}

impl DenseStack {
    /// Creates `num_layers` layers scoped `layer_0 .. layer_{n-1}` under `vb`.
    pub fn new(
        in_dim: usize,
        hidden_dim: usize,
        out_dim: usize,
        num_layers: usize,
        use_batch_norm: bool,
        relu_last: bool,
        vb: VarBuilder,
    ) -> Result<Self> {
        let mut layers = Vec::with_capacity(num_layers);
        let mut width = in_dim;
        for i in 0..num_layers {
            let last = i + 1 == num_layers;
            let out = if last { out_dim } else { hidden_dim };
            layers.push(DenseLayer::new(
                width,
                out,
                use_batch_norm,
                !last || relu_last,
                vb.pp(format!("layer_{i}")),
            )?);
            width = out;
        }
        Ok(Self { layers })
    }

    /// Runs every layer in order with the same regularization.
    pub fn forward(&self, x: &Tensor, reg: Regularization) -> Result<Tensor> {
        let mut out = x.clone();
        for layer in &self.layers {
            out = layer.forward(&out, reg)?;
        }
        Ok(out)
    }
}
