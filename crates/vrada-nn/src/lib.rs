//! # vrada-nn
//!
//! Model graphs for domain-adversarial time-series classification (VRADA),
//! built on candle's autodiff.
//!
//! ## Key Components
//!
//! - [`grl::flip_gradient`]: gradient reversal layer
//! - [`classifier::Classifier`]: four-layer task/domain classifier
//! - [`domain::DomainAdaptationHead`]: feature extractor + task classifier +
//!   gradient-reversed domain classifier(s), with losses and summaries
//! - [`rnn::LstmEncoder`]: single-layer LSTM front end
//! - [`vrnn::VrnnCell`]: variational recurrent cell (prior, encoder,
//!   decoder, LSTM recurrence)
//! - [`losses`]: soft-label cross entropy, Gaussian KL, Gaussian NLL
//! - [`models::LstmModel`] / [`models::VrnnModel`] / [`models::Model`]:
//!   complete graphs returning predictions, total loss, features, summary
//!   handles and, for the VRNN, the decoder distribution
//!
//! ## Architecture Rules
//!
//! - Layer code returns `candle_core::Result`; the public model API maps
//!   failures to [`VradaError`].
//! - Every model owns no optimizer state: callers train through the
//!   `VarMap` they passed in.
//! - Depends on `vrada-core` only within the workspace.

pub use vrada_core;

pub mod classifier;
pub mod dense;
pub mod domain;
pub mod grl;
pub mod losses;
pub mod models;
pub mod rnn;
pub mod summary;
pub mod vrnn;

pub use models::{GeneratedSeries, LstmModel, Model, ModelInputs, ModelOutputs, VrnnModel};
pub use summary::Summary;
pub use vrada_core::VradaError;
