//! # vrada-learn
//!
//! Reference training for VRADA models: synthetic source/target
//! time-series, annealing schedules, the adversarial training loop and a
//! JSON-lines summary sink.
//!
//! ## Key Components
//!
//! - [`synthetic::generate_domain_pair`]: labelled source and shifted target
//!   datasets
//! - [`schedule`]: GRL coefficient and learning rate annealing
//! - [`trainer::train`]: half-source/half-target batches, AdamW steps,
//!   periodic source and target accuracy
//! - [`summary_writer::SummaryWriter`]: one JSON object per summary record
//! - `train-vrada` binary: CLI over all of the above
//!
//! ## Architecture Rules
//!
//! - Model graphs live in `vrada-nn`; this crate only drives them.
//! - Data sampling is seeded through [`nn_rng::SimpleRng`] so runs are
//!   reproducible up to candle's own dropout and VRNN sampling noise.

pub mod nn_rng;
pub mod schedule;
pub mod summary_writer;
pub mod synthetic;
pub mod trainer;

pub use trainer::{train, EvalMetrics, TrainConfig, TrainResult};
