//! Variational recurrent cell.
//!
//! Per time step with input `x_t` and LSTM state `(h, c)`:
//!
//! ```text
//! phi_x        = relu(W x_t)
//! prior        : relu(W h)            → (mu_p, softplus σ_p)
//! encoder      : relu(W [phi_x, h])   → (mu_e, softplus σ_e)
//! z            = mu_e + σ_e ⊙ ε       (training)   | mu_e (eval)
//! phi_z        = relu(W z)
//! decoder      : relu(W [phi_z, h])   → (mu_d, softplus σ_d)   width x_dim
//! (h', c')     = LSTM([phi_x, phi_z], (h, c))
//! ```

use candle_core::{Result, Tensor, D};
use candle_nn::rnn::{lstm, LSTMConfig, LSTMState, LSTM, RNN};
use candle_nn::{linear, Linear, Module, VarBuilder};

/// Sizes of the VRNN cell.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VrnnDims {
    pub x_dim: usize,
    pub h_dim: usize,
    pub z_dim: usize,
}

/// A linear map producing a Gaussian's mean and positive scale.
#[derive(Debug)]
struct GaussianHead {
    hidden: Linear,
    mu: Linear,
    sigma: Linear,
}

impl GaussianHead {
    fn new(in_dim: usize, hidden_dim: usize, out_dim: usize, vb: VarBuilder) -> Result<Self> {
        Ok(Self {
            hidden: linear(in_dim, hidden_dim, vb.pp("hidden"))?,
            mu: linear(hidden_dim, out_dim, vb.pp("mu"))?,
            sigma: linear(hidden_dim, out_dim, vb.pp("sigma"))?,
        })
    }

    fn forward(&self, x: &Tensor) -> Result<(Tensor, Tensor)> {
        let hidden = self.hidden.forward(x)?.relu()?;
        let mu = self.mu.forward(&hidden)?;
        let sigma = softplus(&self.sigma.forward(&hidden)?)?;
        Ok((mu, sigma))
    }
}

/// Tensors emitted by one VRNN step, each `[B, *]`.
#[derive(Debug, Clone)]
pub struct VrnnStep {
    pub h: Tensor,
    pub c: Tensor,
    pub encoder_mu: Tensor,
    pub encoder_sigma: Tensor,
    pub decoder_mu: Tensor,
    pub decoder_sigma: Tensor,
    pub prior_mu: Tensor,
    pub prior_sigma: Tensor,
    pub phi_x: Tensor,
    pub phi_z: Tensor,
}

/// [`VrnnStep`] fields stacked over time, each `[B, T, *]`.
#[derive(Debug, Clone)]
pub struct VrnnOutputs {
    pub h: Tensor,
    pub c: Tensor,
    pub encoder_mu: Tensor,
    pub encoder_sigma: Tensor,
    pub decoder_mu: Tensor,
    pub decoder_sigma: Tensor,
    pub prior_mu: Tensor,
    pub prior_sigma: Tensor,
    pub phi_x: Tensor,
    pub phi_z: Tensor,
}

#[derive(Debug)]
pub struct VrnnCell {
    phi_x: Linear,
    phi_z: Linear,
    prior: GaussianHead,
    encoder: GaussianHead,
    decoder: GaussianHead,
    rnn: LSTM,
    dims: VrnnDims,
}

impl VrnnCell {
    pub fn new(dims: VrnnDims, vb: VarBuilder) -> Result<Self> {
        let VrnnDims {
            x_dim,
            h_dim,
            z_dim,
        } = dims;
        Ok(Self {
            phi_x: linear(x_dim, h_dim, vb.pp("phi_x"))?,
            phi_z: linear(z_dim, h_dim, vb.pp("phi_z"))?,
            prior: GaussianHead::new(h_dim, h_dim, z_dim, vb.pp("prior"))?,
            encoder: GaussianHead::new(2 * h_dim, h_dim, z_dim, vb.pp("encoder"))?,
            decoder: GaussianHead::new(2 * h_dim, h_dim, x_dim, vb.pp("decoder"))?,
            rnn: lstm(2 * h_dim, h_dim, LSTMConfig::default(), vb.pp("lstm"))?,
            dims,
        })
    }

    pub fn dims(&self) -> VrnnDims {
        self.dims
    }

    pub fn zero_state(&self, batch: usize) -> Result<LSTMState> {
        self.rnn.zero_state(batch)
    }

    /// Advances one time step. `x_t` is `[B, x_dim]`.
    ///
    /// With `training` the latent is sampled by reparameterization;
    /// otherwise the encoder mean is used.
    pub fn step(
        &self,
        x_t: &Tensor,
        state: &LSTMState,
        training: bool,
    ) -> Result<(VrnnStep, LSTMState)> {
        let h = state.h();

        let phi_x = self.phi_x.forward(x_t)?.relu()?;
        let (prior_mu, prior_sigma) = self.prior.forward(h)?;
        let (encoder_mu, encoder_sigma) =
            self.encoder.forward(&Tensor::cat(&[&phi_x, h], D::Minus1)?)?;

        let z = if training {
            let noise = encoder_mu.randn_like(0.0, 1.0)?;
            (&encoder_mu + (&encoder_sigma * noise)?)?
        } else {
            encoder_mu.clone()
        };

        let phi_z = self.phi_z.forward(&z)?.relu()?;
        let (decoder_mu, decoder_sigma) =
            self.decoder.forward(&Tensor::cat(&[&phi_z, h], D::Minus1)?)?;

        let next = self
            .rnn
            .step(&Tensor::cat(&[&phi_x, &phi_z], D::Minus1)?, state)?;

        let step = VrnnStep {
            h: next.h().clone(),
            c: next.c().clone(),
            encoder_mu,
            encoder_sigma,
            decoder_mu,
            decoder_sigma,
            prior_mu,
            prior_sigma,
            phi_x,
            phi_z,
        };
        Ok((step, next))
    }

    /// Unrolls the cell over `[B, T, x_dim]` from a zero state.
    pub fn forward(&self, x: &Tensor, training: bool) -> Result<VrnnOutputs> {
        let (batch, seq_len, _) = x.dims3()?;
        if seq_len == 0 {
            candle_core::bail!("VrnnCell: empty sequence");
        }

        let mut state = self.zero_state(batch)?;
        let mut steps = Vec::with_capacity(seq_len);
        for t in 0..seq_len {
            let x_t = x.narrow(1, t, 1)?.squeeze(1)?.contiguous()?;
            let (step, next) = self.step(&x_t, &state, training)?;
            steps.push(step);
            state = next;
        }

        Ok(VrnnOutputs {
            h: stack_steps(&steps, |s| &s.h)?,
            c: stack_steps(&steps, |s| &s.c)?,
            encoder_mu: stack_steps(&steps, |s| &s.encoder_mu)?,
            encoder_sigma: stack_steps(&steps, |s| &s.encoder_sigma)?,
            decoder_mu: stack_steps(&steps, |s| &s.decoder_mu)?,
            decoder_sigma: stack_steps(&steps, |s| &s.decoder_sigma)?,
            prior_mu: stack_steps(&steps, |s| &s.prior_mu)?,
            prior_sigma: stack_steps(&steps, |s| &s.prior_sigma)?,
            phi_x: stack_steps(&steps, |s| &s.phi_x)?,
            phi_z: stack_steps(&steps, |s| &s.phi_z)?,
        })
    }
}

fn stack_steps(steps: &[VrnnStep], field: impl Fn(&VrnnStep) -> &Tensor) -> Result<Tensor> {
    let parts: Vec<&Tensor> = steps.iter().map(field).collect();
    Tensor::stack(&parts, 1)
}

/// `log(1 + e^x)`, computed as `max(x, 0) + log(1 + e^-|x|)` to avoid overflow.
pub fn softplus(x: &Tensor) -> Result<Tensor> {
    let tail = (x.abs()?.neg()?.exp()? + 1.0)?.log()?;
    x.relu()? + tail
}
