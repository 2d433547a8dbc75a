//! Loss terms: soft-label cross entropy for the classifiers, Gaussian KL and
//! negative log-likelihood for the VRNN.
//!
//! The VRNN terms reduce `[B, T, D]` inputs to one value per sequence by
//! averaging over time, then over features. Sigmas are floored at `eps`
//! before any `log` or division.

use candle_core::{Result, Tensor, D};

/// Per-row softmax cross entropy against (possibly soft) one-hot labels.
///
/// `labels` is detached: no gradient ever flows into the targets.
/// Returns a `[B]` tensor.
pub fn softmax_cross_entropy(labels: &Tensor, logits: &Tensor) -> Result<Tensor> {
    let log_probs = candle_nn::ops::log_softmax(logits, D::Minus1)?;
    let labels = labels.detach().to_dtype(log_probs.dtype())?;
    (labels * log_probs)?.sum(D::Minus1)?.neg()
}

/// KL(q ‖ p) between diagonal Gaussians, `q = N(enc_mu, enc_sigma²)` and
/// `p = N(prior_mu, prior_sigma²)`, averaged per sequence. Returns `[B]`.
pub fn gaussian_kl(
    enc_mu: &Tensor,
    enc_sigma: &Tensor,
    prior_mu: &Tensor,
    prior_sigma: &Tensor,
    eps: f64,
) -> Result<Tensor> {
    let log_ratio = (floor(prior_sigma, eps)?.log()? - floor(enc_sigma, eps)?.log()?)?;
    let spread = (enc_sigma.sqr()? + (enc_mu - prior_mu)?.sqr()?)?;
    let quad = (spread / floor(&prior_sigma.sqr()?, eps)?)?.affine(0.5, -0.5)?;
    (log_ratio + quad)?.mean(1)?.mean(1)
}

/// Gaussian negative log-likelihood of `x` under `N(dec_mu, dec_sigma²)`,
/// without the constant `log(2π)` term, averaged per sequence. Returns `[B]`.
pub fn gaussian_nll(x: &Tensor, dec_mu: &Tensor, dec_sigma: &Tensor, eps: f64) -> Result<Tensor> {
    let var = floor(&dec_sigma.sqr()?, eps)?;
    let sq_err = (dec_mu - x)?.sqr()?;
    let per_elem = ((sq_err / &var)? + var.log()?)?;
    per_elem.mean(1)?.mean(1)?.affine(0.5, 0.0)
}

/// Elementwise `max(t, eps)`, differentiable where `t > eps`.
fn floor(t: &Tensor, eps: f64) -> Result<Tensor> {
    let eps = Tensor::new(eps, t.device())?.to_dtype(t.dtype())?;
    t.broadcast_maximum(&eps)
}
