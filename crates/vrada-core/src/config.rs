//! Model configuration.
//!
//! A [`ModelConfig`] selects the recurrent front end (plain LSTM or VRNN) and
//! the options of the domain adaptation head. It is plain data so it can be
//! loaded from JSON by the training CLI.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::VradaError;
use crate::{DEFAULT_EPS, NUM_DOMAINS};

/// Which recurrent network feeds the feature extractor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ModelKind {
    /// Single-layer LSTM baseline, no generative objective.
    Lstm,
    /// Variational RNN with KL and reconstruction losses.
    Vrnn,
}

impl ModelKind {
    /// Returns the lowercase label used on the command line and in JSON.
    pub fn label(&self) -> &'static str {
        match self {
            Self::Lstm => "lstm",
            Self::Vrnn => "vrnn",
        }
    }
}

impl std::str::FromStr for ModelKind {
    type Err = VradaError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "lstm" => Ok(Self::Lstm),
            "vrnn" => Ok(Self::Vrnn),
            other => Err(VradaError::InvalidConfig {
                message: format!("unknown model kind '{other}', expected lstm or vrnn"),
            }),
        }
    }
}

/// Configuration for a domain-adversarial time-series model.
///
/// # Example
///
/// ```
/// use vrada_core::{ModelConfig, ModelKind};
///
/// let config = ModelConfig {
///     kind: ModelKind::Vrnn,
///     num_classes: 3,
///     num_features: 4,
///     ..ModelConfig::default()
/// };
/// assert!(config.validate().is_ok());
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelConfig {
    /// Recurrent front end.
    pub kind: ModelKind,

    /// Number of task classes.
    pub num_classes: usize,

    /// Features per time step of the input series.
    pub num_features: usize,

    /// Train the domain classifier and slice target rows out of the task loss.
    pub adaptation: bool,

    /// Batch-normalize every dense layer.
    pub batch_norm: bool,

    /// Add a second gradient-reversed domain classifier on the raw
    /// feature-extractor input.
    pub two_domain_classifiers: bool,

    /// VRNN only: feed the last `phi_z` (true) or the last `h` (false)
    /// into the feature extractor.
    pub use_z: bool,

    /// Floor applied to sigmas before `log` and division in the VRNN losses.
    pub eps: f64,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            kind: ModelKind::Vrnn,
            num_classes: 2,
            num_features: 1,
            adaptation: true,
            batch_norm: false,
            two_domain_classifiers: false,
            use_z: true,
            eps: DEFAULT_EPS,
        }
    }
}

impl ModelConfig {
    /// Checks that the dimensions are usable.
    ///
    /// # Errors
    ///
    /// Returns [`VradaError::InvalidConfig`] on the first offending field.
    pub fn validate(&self) -> Result<(), VradaError> {
        if self.num_classes < 2 {
            return Err(VradaError::InvalidConfig {
                message: format!("num_classes must be >= 2, got {}", self.num_classes),
            });
        }
        if self.num_features == 0 {
            return Err(VradaError::InvalidConfig {
                message: "num_features must be > 0".to_string(),
            });
        }
        if !(self.eps > 0.0 && self.eps.is_finite()) {
            return Err(VradaError::InvalidConfig {
                message: format!("eps must be a positive finite number, got {}", self.eps),
            });
        }
        Ok(())
    }

    /// Number of outputs of every domain classifier.
    pub fn num_domains(&self) -> usize {
        NUM_DOMAINS
    }

    /// Loads a config from a JSON file. Missing fields take their defaults.
    ///
    /// # Errors
    ///
    /// Returns [`VradaError::StorageError`] on I/O or parse failure and
    /// [`VradaError::InvalidConfig`] if the loaded values do not validate.
    pub fn load(path: &Path) -> Result<Self, VradaError> {
        let text = std::fs::read_to_string(path).map_err(|e| VradaError::StorageError {
            message: format!("failed to read {}: {e}", path.display()),
        })?;
        let config: Self = serde_json::from_str(&text).map_err(|e| VradaError::StorageError {
            message: format!("failed to parse {}: {e}", path.display()),
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Writes the config as pretty JSON.
    ///
    /// # Errors
    ///
    /// Returns [`VradaError::StorageError`] on serialization or I/O failure.
    pub fn save(&self, path: &Path) -> Result<(), VradaError> {
        let text = serde_json::to_string_pretty(self).map_err(|e| VradaError::StorageError {
            message: format!("failed to serialize config: {e}"),
        })?;
        std::fs::write(path, text).map_err(|e| VradaError::StorageError {
            message: format!("failed to write {}: {e}", path.display()),
        })
    }
}
