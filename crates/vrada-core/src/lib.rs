//! # vrada-core
//!
//! Shared, tensor-free types for the VRADA workspace.
//!
//! ## Key Components
//!
//! - [`ModelConfig`] / [`ModelKind`]: which recurrent front end to build and
//!   which adaptation options to enable
//! - [`VradaError`]: the error type every crate returns
//! - [`summary`]: serializable scalar and histogram summary records
//!
//! ## Architecture Rules
//!
//! - No tensor library here; `vrada-nn` owns all candle code.
//! - Depends only on `serde` and `thiserror`.

pub mod config;
pub mod error;
pub mod summary;

pub use config::{ModelConfig, ModelKind};
pub use error::VradaError;
pub use summary::{HistogramStats, SummaryKind, SummaryRecord, SummaryValue};

/// Domain classifiers always separate source from target.
pub const NUM_DOMAINS: usize = 2;

/// Width of every feature-extractor layer and of the recurrent state.
pub const HIDDEN_DIM: usize = 100;

/// Width of the hidden layers of the task and domain classifiers.
pub const CLASSIFIER_DIM: usize = 50;

/// Dimension of the VRNN latent variable.
pub const LATENT_DIM: usize = 100;

/// Dense layers in the feature extractor.
pub const FEATURE_LAYERS: usize = 3;

/// Dense layers in each classifier, the last one producing logits.
pub const CLASSIFIER_LAYERS: usize = 4;

/// Default floor for sigmas in the VRNN loss terms.
pub const DEFAULT_EPS: f64 = 1e-9;
