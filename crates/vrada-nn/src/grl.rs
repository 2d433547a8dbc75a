//! Gradient reversal layer.
//!
//! Identity on the way forward, `-lambda × grad` on the way back. Placing it
//! between the feature extractor and the domain classifier makes the
//! extractor *maximize* the domain loss the classifier minimizes.

use candle_core::{Result, Tensor};

/// Returns a tensor equal to `x` whose gradient w.r.t. `x` is `-lambda`.
///
/// The detached copy carries the forward value; the `(x - x.detach())` term
/// is exactly zero but keeps `x` in the graph with slope `-lambda`.
///
/// # Example
///
/// ```
/// use candle_core::{Device, Tensor};
/// use vrada_nn::grl::flip_gradient;
///
/// let x = Tensor::new(&[1.0f32, -2.0, 3.0], &Device::Cpu).unwrap();
/// let y = flip_gradient(&x, 0.5).unwrap();
/// assert_eq!(y.to_vec1::<f32>().unwrap(), vec![1.0, -2.0, 3.0]);
/// ```
pub fn flip_gradient(x: &Tensor, lambda: f64) -> Result<Tensor> {
    let frozen = x.detach();
    let reversed = (x - &frozen)?.affine(-lambda, 0.0)?;
    reversed + frozen
}
