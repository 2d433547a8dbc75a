//! Complete models: a recurrent front end feeding the adaptation head.
//!
//! - [`LstmModel`]: LSTM baseline; loss = task (+ domain).
//! - [`VrnnModel`]: VRNN front end; loss = task + KL + NLL (+ domain), and
//!   the decoder distribution is returned for generating sample series.
//! - [`Model`]: either of the above, chosen by [`ModelConfig::kind`].

use candle_core::{DType, Device, IndexOp, Tensor};
use candle_nn::{VarBuilder, VarMap};
use vrada_core::{ModelConfig, ModelKind, VradaError, HIDDEN_DIM, LATENT_DIM, NUM_DOMAINS};

use crate::dense::Regularization;
use crate::domain::{DomainAdaptationHead, HeadInputs, HeadOptions, HeadOutputs};
use crate::losses::{gaussian_kl, gaussian_nll};
use crate::rnn::LstmEncoder;
use crate::summary::Summary;
use crate::vrnn::{VrnnCell, VrnnDims};

/// Inputs of one forward pass.
#[derive(Debug, Clone, Copy)]
pub struct ModelInputs<'a> {
    /// Time series, `[B, T, num_features]`.
    pub x: &'a Tensor,
    /// One-hot task labels, `[B, num_classes]`.
    pub y: &'a Tensor,
    /// One-hot domain labels, `[B, 2]`: `[1, 0]` source, `[0, 1]` target.
    pub domain: &'a Tensor,
    /// Gradient reversal coefficient.
    pub grl_lambda: f64,
    /// Dropout keep probability in `(0, 1]`.
    pub keep_prob: f64,
    pub training: bool,
}

impl ModelInputs<'_> {
    fn regularization(&self) -> Regularization {
        Regularization {
            keep_prob: self.keep_prob,
            training: self.training,
        }
    }

    fn head_inputs(&self) -> HeadInputs<'_> {
        HeadInputs {
            y: self.y,
            domain: self.domain,
            grl_lambda: self.grl_lambda,
            reg: self.regularization(),
        }
    }
}

/// Decoder distribution over the input series, `[B, T, num_features]` each.
#[derive(Debug, Clone)]
pub struct GeneratedSeries {
    pub decoder_mu: Tensor,
    pub decoder_sigma: Tensor,
}

/// Outputs of one forward pass.
#[derive(Debug, Clone)]
pub struct ModelOutputs {
    pub task_softmax: Tensor,
    pub domain_softmax: Tensor,
    /// Scalar objective to minimize.
    pub total_loss: Tensor,
    pub feature_extractor: Tensor,
    pub summaries: Vec<Summary>,
    /// `Some` for the VRNN model only.
    pub extra_outputs: Option<GeneratedSeries>,
}

fn head_options(config: &ModelConfig) -> HeadOptions {
    HeadOptions {
        adaptation: config.adaptation,
        batch_norm: config.batch_norm,
        two_domain_classifiers: config.two_domain_classifiers,
    }
}

/// Checks input shapes against the config before any tensor work.
fn validate_inputs(config: &ModelConfig, inputs: &ModelInputs<'_>) -> Result<(), VradaError> {
    let shape_err = |message: String| VradaError::ShapeMismatch { message };

    let (batch, seq_len, features) = inputs
        .x
        .dims3()
        .map_err(|e| shape_err(format!("x must be [batch, time, features]: {e}")))?;
    if batch == 0 || seq_len == 0 {
        return Err(shape_err(format!(
            "x must have non-empty batch and time dims, got {:?}",
            inputs.x.dims()
        )));
    }
    if features != config.num_features {
        return Err(shape_err(format!(
            "x has {features} features, model expects {}",
            config.num_features
        )));
    }
    if inputs.y.dims2().ok() != Some((batch, config.num_classes)) {
        return Err(shape_err(format!(
            "y must be [{batch}, {}], got {:?}",
            config.num_classes,
            inputs.y.dims()
        )));
    }
    if inputs.domain.dims2().ok() != Some((batch, NUM_DOMAINS)) {
        return Err(shape_err(format!(
            "domain must be [{batch}, {NUM_DOMAINS}], got {:?}",
            inputs.domain.dims()
        )));
    }
    if config.adaptation && inputs.training && batch < 2 {
        return Err(shape_err(format!(
            "adaptation training needs a source and a target half, got batch {batch}"
        )));
    }
    if !(inputs.keep_prob > 0.0 && inputs.keep_prob <= 1.0) {
        return Err(VradaError::InvalidConfig {
            message: format!("keep_prob must be in (0, 1], got {}", inputs.keep_prob),
        });
    }
    Ok(())
}

/// LSTM front end; the last step's hidden state feeds the head.
///
/// # Example
///
/// ```
/// use candle_core::{DType, Device, Tensor};
/// use candle_nn::VarMap;
/// use vrada_core::{ModelConfig, ModelKind};
/// use vrada_nn::models::{LstmModel, ModelInputs};
///
/// let device = Device::Cpu;
/// let var_map = VarMap::new();
/// let config = ModelConfig { kind: ModelKind::Lstm, num_features: 2, ..ModelConfig::default() };
/// let model = LstmModel::new_trainable(&var_map, &config, &device).unwrap();
///
/// let x = Tensor::zeros((4, 5, 2), DType::F32, &device).unwrap();
/// let y = Tensor::ones((4, 2), DType::F32, &device).unwrap();
/// let domain = Tensor::ones((4, 2), DType::F32, &device).unwrap();
/// let out = model
///     .forward(&ModelInputs { x: &x, y: &y, domain: &domain, grl_lambda: 1.0, keep_prob: 1.0, training: true })
///     .unwrap();
/// assert!(out.extra_outputs.is_none());
/// ```
#[derive(Debug)]
pub struct LstmModel {
    encoder: LstmEncoder,
    head: DomainAdaptationHead,
    config: ModelConfig,
}

impl LstmModel {
    /// Builds the model's variables under `vb`.
    ///
    /// # Errors
    ///
    /// Returns [`VradaError::InvalidConfig`] for an invalid config and
    /// [`VradaError::Internal`] if variable creation fails.
    pub fn new(config: &ModelConfig, vb: VarBuilder) -> Result<Self, VradaError> {
        config.validate()?;
        let map_err = |e: candle_core::Error| VradaError::Internal {
            message: format!("LstmModel::new: {e}"),
        };

        let encoder = LstmEncoder::new(config.num_features, HIDDEN_DIM, vb.pp("rnn_model"))
            .map_err(map_err)?;
        let head = DomainAdaptationHead::new(
            encoder.hidden_dim(),
            config.num_classes,
            head_options(config),
            vb,
        )
        .map_err(map_err)?;

        tracing::debug!(
            num_features = config.num_features,
            num_classes = config.num_classes,
            adaptation = config.adaptation,
            "built LSTM model"
        );
        Ok(Self {
            encoder,
            head,
            config: config.clone(),
        })
    }

    /// Builds a model whose parameters are tracked in `var_map`.
    pub fn new_trainable(
        var_map: &VarMap,
        config: &ModelConfig,
        device: &Device,
    ) -> Result<Self, VradaError> {
        Self::new(config, VarBuilder::from_varmap(var_map, DType::F32, device))
    }

    /// Runs the full graph for one batch.
    ///
    /// # Errors
    ///
    /// Returns [`VradaError::ShapeMismatch`] if inputs disagree with the
    /// config and [`VradaError::Internal`] if a tensor op fails.
    pub fn forward(&self, inputs: &ModelInputs<'_>) -> Result<ModelOutputs, VradaError> {
        validate_inputs(&self.config, inputs)?;
        let map_err = |e: candle_core::Error| VradaError::Internal {
            message: format!("LstmModel::forward: {e}"),
        };

        let rnn = self.encoder.forward(inputs.x).map_err(map_err)?;
        let seq_len = rnn.outputs.dim(1).map_err(map_err)?;
        let rnn_output = rnn.outputs.i((.., seq_len - 1)).map_err(map_err)?;

        let head = self
            .head
            .forward(&rnn_output, inputs.head_inputs())
            .map_err(map_err)?;

        let total_loss = if self.config.adaptation {
            (&head.task_loss + &head.domain_loss).map_err(map_err)?
        } else {
            head.task_loss.clone()
        };

        Ok(finish(head, total_loss, Vec::new(), None))
    }

    pub fn config(&self) -> &ModelConfig {
        &self.config
    }
}

/// VRNN front end; the last step's `phi_z` (or `h`) feeds the head.
#[derive(Debug)]
pub struct VrnnModel {
    cell: VrnnCell,
    head: DomainAdaptationHead,
    config: ModelConfig,
}

impl VrnnModel {
    /// Builds the model's variables under `vb`.
    ///
    /// # Errors
    ///
    /// Returns [`VradaError::InvalidConfig`] for an invalid config and
    /// [`VradaError::Internal`] if variable creation fails.
    pub fn new(config: &ModelConfig, vb: VarBuilder) -> Result<Self, VradaError> {
        config.validate()?;
        let map_err = |e: candle_core::Error| VradaError::Internal {
            message: format!("VrnnModel::new: {e}"),
        };

        let dims = VrnnDims {
            x_dim: config.num_features,
            h_dim: HIDDEN_DIM,
            z_dim: LATENT_DIM,
        };
        let cell = VrnnCell::new(dims, vb.pp("rnn_model")).map_err(map_err)?;
        // phi_z and h are both h_dim wide.
        let head = DomainAdaptationHead::new(
            dims.h_dim,
            config.num_classes,
            head_options(config),
            vb,
        )
        .map_err(map_err)?;

        tracing::debug!(
            num_features = config.num_features,
            num_classes = config.num_classes,
            adaptation = config.adaptation,
            use_z = config.use_z,
            "built VRNN model"
        );
        Ok(Self {
            cell,
            head,
            config: config.clone(),
        })
    }

    /// Builds a model whose parameters are tracked in `var_map`.
    pub fn new_trainable(
        var_map: &VarMap,
        config: &ModelConfig,
        device: &Device,
    ) -> Result<Self, VradaError> {
        Self::new(config, VarBuilder::from_varmap(var_map, DType::F32, device))
    }

    /// Runs the full graph for one batch.
    ///
    /// # Errors
    ///
    /// Returns [`VradaError::ShapeMismatch`] if inputs disagree with the
    /// config and [`VradaError::Internal`] if a tensor op fails.
    pub fn forward(&self, inputs: &ModelInputs<'_>) -> Result<ModelOutputs, VradaError> {
        validate_inputs(&self.config, inputs)?;
        let map_err = |e: candle_core::Error| VradaError::Internal {
            message: format!("VrnnModel::forward: {e}"),
        };
        let eps = self.config.eps;

        let vrnn = self.cell.forward(inputs.x, inputs.training).map_err(map_err)?;
        let seq_len = vrnn.h.dim(1).map_err(map_err)?;
        let last = if self.config.use_z { &vrnn.phi_z } else { &vrnn.h };
        let rnn_output = last.i((.., seq_len - 1)).map_err(map_err)?;

        let head = self
            .head
            .forward(&rnn_output, inputs.head_inputs())
            .map_err(map_err)?;

        let kl = gaussian_kl(
            &vrnn.encoder_mu,
            &vrnn.encoder_sigma,
            &vrnn.prior_mu,
            &vrnn.prior_sigma,
            eps,
        )
        .and_then(|t| t.mean_all())
        .map_err(map_err)?;
        let x = inputs.x.to_dtype(vrnn.decoder_mu.dtype()).map_err(map_err)?;
        let likelihood = gaussian_nll(&x, &vrnn.decoder_mu, &vrnn.decoder_sigma, eps)
            .and_then(|t| t.mean_all())
            .map_err(map_err)?;

        let mut total_loss = (&head.task_loss + &kl)
            .and_then(|t| t + &likelihood)
            .map_err(map_err)?;
        if self.config.adaptation {
            total_loss = (total_loss + &head.domain_loss).map_err(map_err)?;
        }

        let summaries = vec![
            Summary::scalar("loss/kl", &kl),
            Summary::scalar("loss/likelihood", &likelihood),
            Summary::histogram("outputs/phi_x", &vrnn.phi_x),
            Summary::histogram("outputs/phi_z", &vrnn.phi_z),
            Summary::histogram("encoder/mu", &vrnn.encoder_mu),
            Summary::histogram("encoder/sigma", &vrnn.encoder_sigma),
            Summary::histogram("decoder/mu", &vrnn.decoder_mu),
            Summary::histogram("decoder/sigma", &vrnn.decoder_sigma),
            Summary::histogram("prior/mu", &vrnn.prior_mu),
            Summary::histogram("prior/sigma", &vrnn.prior_sigma),
        ];

        let generated = GeneratedSeries {
            decoder_mu: vrnn.decoder_mu,
            decoder_sigma: vrnn.decoder_sigma,
        };
        Ok(finish(head, total_loss, summaries, Some(generated)))
    }

    pub fn config(&self) -> &ModelConfig {
        &self.config
    }
}

fn finish(
    head: HeadOutputs,
    total_loss: Tensor,
    extra_summaries: Vec<Summary>,
    extra_outputs: Option<GeneratedSeries>,
) -> ModelOutputs {
    let mut summaries = head.summaries;
    summaries.extend(extra_summaries);
    ModelOutputs {
        task_softmax: head.task_softmax,
        domain_softmax: head.domain_softmax,
        total_loss,
        feature_extractor: head.feature_extractor,
        summaries,
        extra_outputs,
    }
}

/// Either model kind behind one interface.
#[derive(Debug)]
pub enum Model {
    Lstm(LstmModel),
    Vrnn(VrnnModel),
}

impl Model {
    /// Builds the model selected by `config.kind`.
    pub fn new(config: &ModelConfig, vb: VarBuilder) -> Result<Self, VradaError> {
        match config.kind {
            ModelKind::Lstm => Ok(Self::Lstm(LstmModel::new(config, vb)?)),
            ModelKind::Vrnn => Ok(Self::Vrnn(VrnnModel::new(config, vb)?)),
        }
    }

    /// Builds a model whose parameters are tracked in `var_map`.
    pub fn new_trainable(
        var_map: &VarMap,
        config: &ModelConfig,
        device: &Device,
    ) -> Result<Self, VradaError> {
        Self::new(config, VarBuilder::from_varmap(var_map, DType::F32, device))
    }

    pub fn forward(&self, inputs: &ModelInputs<'_>) -> Result<ModelOutputs, VradaError> {
        match self {
            Self::Lstm(m) => m.forward(inputs),
            Self::Vrnn(m) => m.forward(inputs),
        }
    }

    pub fn config(&self) -> &ModelConfig {
        match self {
            Self::Lstm(m) => m.config(),
            Self::Vrnn(m) => m.config(),
        }
    }
}
