//! Error type shared by every VRADA crate.

use thiserror::Error;

/// Errors raised while building, running, or training VRADA models.
///
/// # Example
///
/// ```
/// use vrada_core::VradaError;
///
/// let err = VradaError::InvalidConfig {
///     message: "num_classes must be at least 2".to_string(),
/// };
/// assert!(err.to_string().contains("num_classes"));
/// ```
#[derive(Debug, Error)]
pub enum VradaError {
    /// Input tensors disagree with the model's expected shapes.
    #[error("shape mismatch: {message}")]
    ShapeMismatch { message: String },

    /// A configuration value is out of range or inconsistent.
    #[error("invalid config: {message}")]
    InvalidConfig { message: String },

    /// The training loop could not make progress.
    #[error("training error: {message}")]
    TrainError { message: String },

    /// Reading or writing configs, summaries, or weights failed.
    #[error("storage error: {message}")]
    StorageError { message: String },

    /// A tensor operation failed inside the model graph.
    #[error("internal error: {message}")]
    Internal { message: String },
}
