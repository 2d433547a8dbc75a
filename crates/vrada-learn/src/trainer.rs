//! Adversarial training loop for [`Model`].
//!
//! ## Training Algorithm
//!
//! Per step:
//! 1. Sample a batch whose first half is source and second half is target,
//!    with one-hot domain labels (source-only when adaptation is off)
//! 2. Anneal the GRL coefficient and, optionally, the learning rate
//! 3. Forward with `training = true`
//! 4. AdamW `backward_step` on the total loss
//! 5. At intervals, evaluate source and target accuracy with
//!    `training = false` and flush summaries

use std::path::Path;

use candle_core::{Device, Tensor, D};
use candle_nn::{Optimizer, VarMap};
use serde::{Deserialize, Serialize};
use vrada_core::{SummaryRecord, VradaError, NUM_DOMAINS};
use vrada_nn::{summary, Model, ModelInputs};

use crate::nn_rng::SimpleRng;
use crate::schedule;
use crate::summary_writer::SummaryWriter;
use crate::synthetic::SeriesDataset;

/// Configuration for [`train`].
///
/// # Example
///
/// ```
/// use vrada_learn::trainer::TrainConfig;
///
/// let config = TrainConfig::default();
/// assert_eq!(config.batch_size, 64);
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrainConfig {
    /// Optimizer steps (default: 1000).
    pub steps: usize,

    /// Rows per step; half source, half target under adaptation (default: 64).
    pub batch_size: usize,

    /// Initial AdamW learning rate (default: 1e-3).
    pub learning_rate: f64,

    /// AdamW weight decay (default: 0.0).
    pub weight_decay: f64,

    /// Dropout keep probability during training (default: 0.9).
    pub keep_prob: f64,

    /// Steepness of the GRL coefficient schedule (default: 10.0).
    pub grl_gamma: f64,

    /// Apply `lr0 / (1 + 10p)^0.75` annealing (default: true).
    pub anneal_learning_rate: bool,

    /// Steps between accuracy evaluations; 0 disables (default: 100).
    pub eval_interval: usize,

    /// Steps between summary records; 0 disables (default: 10).
    pub summary_interval: usize,

    /// Seed for batch sampling.
    pub seed: u64,
}

impl Default for TrainConfig {
    fn default() -> Self {
        Self {
            steps: 1000,
            batch_size: 64,
            learning_rate: 1e-3,
            weight_decay: 0.0,
            keep_prob: 0.9,
            grl_gamma: 10.0,
            anneal_learning_rate: true,
            eval_interval: 100,
            summary_interval: 10,
            seed: 42,
        }
    }
}

impl TrainConfig {
    /// Reads a JSON training config; missing fields take their defaults.
    ///
    /// # Errors
    ///
    /// Returns [`VradaError::StorageError`] on I/O or parse failure.
    pub fn load(path: &Path) -> Result<Self, VradaError> {
        let text = std::fs::read_to_string(path).map_err(|e| VradaError::StorageError {
            message: format!("failed to read {}: {e}", path.display()),
        })?;
        serde_json::from_str(&text).map_err(|e| VradaError::StorageError {
            message: format!("failed to parse {}: {e}", path.display()),
        })
    }
}

/// Accuracy measured at one evaluation point.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvalMetrics {
    pub step: usize,
    pub source_accuracy: f32,
    /// `None` when training source-only without target data.
    pub target_accuracy: Option<f32>,
}

/// Outcome of a training run.
#[derive(Debug, Clone)]
pub struct TrainResult {
    /// Total loss of the last step.
    pub final_loss: f32,

    /// Total loss per step.
    pub loss_history: Vec<f32>,

    pub evaluations: Vec<EvalMetrics>,

    pub steps_completed: usize,

    /// Summary records from the last recorded step.
    pub last_summaries: Vec<SummaryRecord>,
}

/// Trains `model` through the parameters in `var_map`.
///
/// # Errors
///
/// Returns [`VradaError::TrainError`] for empty datasets, inconsistent
/// shapes, a bad config or a non-finite loss, and propagates model and
/// summary writer errors.
///
/// # Example
///
/// ```no_run
/// use candle_core::Device;
/// use candle_nn::VarMap;
/// use vrada_core::ModelConfig;
/// use vrada_learn::synthetic::{generate_domain_pair, SyntheticConfig};
/// use vrada_learn::trainer::{train, TrainConfig};
/// use vrada_nn::Model;
///
/// let device = Device::Cpu;
/// let var_map = VarMap::new();
/// let data = SyntheticConfig::default();
/// let (source, target) = generate_domain_pair(&data).unwrap();
/// let config = ModelConfig {
///     num_classes: data.num_classes,
///     num_features: data.num_features,
///     ..ModelConfig::default()
/// };
/// let model = Model::new_trainable(&var_map, &config, &device).unwrap();
/// let result = train(&model, &var_map, &source, &target, &TrainConfig::default(), &device, None).unwrap();
/// assert!(result.final_loss.is_finite());
/// ```
pub fn train(
    model: &Model,
    var_map: &VarMap,
    source: &SeriesDataset,
    target: &SeriesDataset,
    config: &TrainConfig,
    device: &Device,
    mut writer: Option<&mut SummaryWriter>,
) -> Result<TrainResult, VradaError> {
    let adaptation = model.config().adaptation;
    validate(model, source, target, config)?;

    let map_err = |e: candle_core::Error| VradaError::Internal {
        message: format!("train: {e}"),
    };

    let mut optimizer = candle_nn::AdamW::new(
        var_map.all_vars(),
        candle_nn::ParamsAdamW {
            lr: config.learning_rate,
            weight_decay: config.weight_decay,
            ..Default::default()
        },
    )
    .map_err(map_err)?;

    tracing::info!(
        model = model.config().kind.label(),
        adaptation,
        steps = config.steps,
        batch_size = config.batch_size,
        "starting training"
    );

    let mut rng = SimpleRng::new(config.seed);
    let mut loss_history = Vec::with_capacity(config.steps);
    let mut evaluations = Vec::new();
    let mut last_summaries = Vec::new();

    for step in 0..config.steps {
        let progress = step as f64 / config.steps as f64;
        if config.anneal_learning_rate {
            optimizer.set_learning_rate(schedule::learning_rate(config.learning_rate, progress));
        }
        let grl_lambda = if adaptation {
            schedule::grl_lambda(progress, config.grl_gamma)
        } else {
            0.0
        };

        let (x, y, domain) =
            sample_batch(source, target, config.batch_size, adaptation, &mut rng, device)
                .map_err(map_err)?;
        let outputs = model.forward(&ModelInputs {
            x: &x,
            y: &y,
            domain: &domain,
            grl_lambda,
            keep_prob: config.keep_prob,
            training: true,
        })?;

        let loss = outputs.total_loss.to_vec0::<f32>().map_err(map_err)?;
        if !loss.is_finite() {
            tracing::warn!(step, loss, "non-finite loss, stopping");
            return Err(VradaError::TrainError {
                message: format!("non-finite loss {loss} at step {step}"),
            });
        }
        loss_history.push(loss);
        tracing::debug!(step, loss, grl_lambda, "step");

        optimizer.backward_step(&outputs.total_loss).map_err(map_err)?;

        let completed = step + 1;
        if config.summary_interval > 0 && completed % config.summary_interval == 0 {
            last_summaries = summary::record_all(&outputs.summaries, completed).map_err(map_err)?;
            if let Some(w) = writer.as_deref_mut() {
                w.write_all(&last_summaries)?;
            }
            tracing::debug!(step = completed, records = last_summaries.len(), "recorded summaries");
        }

        if config.eval_interval > 0 && completed % config.eval_interval == 0 {
            let metrics = EvalMetrics {
                step: completed,
                source_accuracy: evaluate(model, source, 0, config.batch_size, device)?,
                target_accuracy: if target.is_empty() {
                    None
                } else {
                    Some(evaluate(model, target, 1, config.batch_size, device)?)
                },
            };
            tracing::info!(
                step = completed,
                loss,
                source_accuracy = metrics.source_accuracy,
                target_accuracy = ?metrics.target_accuracy,
                "evaluation"
            );
            evaluations.push(metrics);
        }
    }

    if let Some(w) = writer.as_deref_mut() {
        w.flush()?;
    }

    let final_loss = loss_history.last().copied().unwrap_or(f32::NAN);
    tracing::info!(final_loss, steps = config.steps, "training finished");

    Ok(TrainResult {
        final_loss,
        loss_history,
        evaluations,
        steps_completed: config.steps,
        last_summaries,
    })
}

/// Fraction of `dataset` rows whose argmax prediction matches the label.
///
/// Runs with `training = false`, so every row is scored and the VRNN uses
/// its encoder mean. `domain_index` is 0 for source and 1 for target.
pub fn evaluate(
    model: &Model,
    dataset: &SeriesDataset,
    domain_index: usize,
    batch_size: usize,
    device: &Device,
) -> Result<f32, VradaError> {
    if dataset.is_empty() {
        return Err(VradaError::TrainError {
            message: "evaluate: empty dataset".to_string(),
        });
    }
    let map_err = |e: candle_core::Error| VradaError::Internal {
        message: format!("evaluate: {e}"),
    };

    let indices: Vec<usize> = (0..dataset.len()).collect();
    let mut correct = 0usize;
    for chunk in indices.chunks(batch_size.max(1)) {
        let (x, y) = dataset.gather(chunk, device).map_err(map_err)?;
        let domain = domain_labels(chunk.len(), |_| domain_index, device).map_err(map_err)?;
        let outputs = model.forward(&ModelInputs {
            x: &x,
            y: &y,
            domain: &domain,
            grl_lambda: 0.0,
            keep_prob: 1.0,
            training: false,
        })?;
        let predicted = outputs
            .task_softmax
            .argmax(D::Minus1)
            .and_then(|t| t.to_vec1::<u32>())
            .map_err(map_err)?;
        correct += predicted
            .iter()
            .zip(chunk)
            .filter(|(p, idx)| **p as usize == dataset.labels()[**idx])
            .count();
    }
    Ok(correct as f32 / dataset.len() as f32)
}

fn validate(
    model: &Model,
    source: &SeriesDataset,
    target: &SeriesDataset,
    config: &TrainConfig,
) -> Result<(), VradaError> {
    let model_config = model.config();
    let fail = |message: String| Err(VradaError::TrainError { message });

    if source.is_empty() || (model_config.adaptation && target.is_empty()) {
        return fail("empty source or target dataset".to_string());
    }
    if config.steps == 0 {
        return fail("steps must be positive".to_string());
    }
    let min_batch = if model_config.adaptation { 2 } else { 1 };
    if config.batch_size < min_batch {
        return fail(format!(
            "batch_size {} below minimum {min_batch}",
            config.batch_size
        ));
    }
    if !(config.keep_prob > 0.0 && config.keep_prob <= 1.0) {
        return fail(format!("keep_prob {} outside (0, 1]", config.keep_prob));
    }
    for (name, ds) in [("source", source), ("target", target)] {
        if ds.is_empty() {
            continue;
        }
        if ds.num_features() != model_config.num_features
            || ds.num_classes() != model_config.num_classes
        {
            return fail(format!(
                "{name} dataset has {} features / {} classes, model expects {} / {}",
                ds.num_features(),
                ds.num_classes(),
                model_config.num_features,
                model_config.num_classes
            ));
        }
    }
    if !target.is_empty() && source.seq_len() != target.seq_len() {
        return fail(format!(
            "source and target sequence lengths differ: {} vs {}",
            source.seq_len(),
            target.seq_len()
        ));
    }
    Ok(())
}

/// First `batch_size - batch_size / 2` rows from source, the rest from
/// target. The head labels rows `0..B/2` as source, which this covers.
fn sample_batch(
    source: &SeriesDataset,
    target: &SeriesDataset,
    batch_size: usize,
    adaptation: bool,
    rng: &mut SimpleRng,
    device: &Device,
) -> candle_core::Result<(Tensor, Tensor, Tensor)> {
    let num_target = if adaptation { batch_size / 2 } else { 0 };
    let num_source = batch_size - num_target;

    let source_idx: Vec<usize> = (0..num_source).map(|_| rng.next_index(source.len())).collect();
    let (xs, ys) = source.gather(&source_idx, device)?;
    let domain = domain_labels(batch_size, |i| usize::from(i >= num_source), device)?;
    if num_target == 0 {
        return Ok((xs, ys, domain));
    }

    let target_idx: Vec<usize> = (0..num_target).map(|_| rng.next_index(target.len())).collect();
    let (xt, yt) = target.gather(&target_idx, device)?;
    let x = Tensor::cat(&[&xs, &xt], 0)?;
    let y = Tensor::cat(&[&ys, &yt], 0)?;
    Ok((x, y, domain))
}

fn domain_labels(
    rows: usize,
    domain_of: impl Fn(usize) -> usize,
    device: &Device,
) -> candle_core::Result<Tensor> {
    let mut data = vec![0f32; rows * NUM_DOMAINS];
    for i in 0..rows {
        data[i * NUM_DOMAINS + domain_of(i)] = 1.0;
    }
    Tensor::from_vec(data, (rows, NUM_DOMAINS), device)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::synthetic::{generate_domain_pair, SyntheticConfig};
    use vrada_core::{ModelConfig, ModelKind};

    fn data() -> (SeriesDataset, SeriesDataset) {
        generate_domain_pair(&SyntheticConfig {
            num_samples: 24,
            seq_len: 6,
            num_features: 2,
            num_classes: 3,
            ..SyntheticConfig::default()
        })
        .unwrap()
    }

    fn model(var_map: &VarMap, kind: ModelKind, adaptation: bool) -> Model {
        let config = ModelConfig {
            kind,
            num_classes: 3,
            num_features: 2,
            adaptation,
            ..ModelConfig::default()
        };
        Model::new_trainable(var_map, &config, &Device::Cpu).unwrap()
    }

    #[test]
    fn batch_halves_are_source_then_target() {
        let (source, target) = data();
        let mut rng = SimpleRng::new(1);
        let (x, y, d) = sample_batch(&source, &target, 6, true, &mut rng, &Device::Cpu).unwrap();
        assert_eq!(x.dims(), &[6, 6, 2]);
        assert_eq!(y.dims(), &[6, 3]);
        let rows = d.to_vec2::<f32>().unwrap();
        for (i, row) in rows.iter().enumerate() {
            let expected = if i < 3 { vec![1.0, 0.0] } else { vec![0.0, 1.0] };
            assert_eq!(row, &expected);
        }
    }

    #[test]
    fn odd_batch_keeps_source_half_labelled() {
        let (source, target) = data();
        let mut rng = SimpleRng::new(1);
        let (_, _, d) = sample_batch(&source, &target, 5, true, &mut rng, &Device::Cpu).unwrap();
        let rows = d.to_vec2::<f32>().unwrap();
        let source_rows = rows.iter().filter(|r| r[0] == 1.0).count();
        assert_eq!(source_rows, 3);
    }

    #[test]
    fn no_adaptation_is_source_only() {
        let (source, target) = data();
        let mut rng = SimpleRng::new(1);
        let (_, _, d) = sample_batch(&source, &target, 4, false, &mut rng, &Device::Cpu).unwrap();
        assert!(d.to_vec2::<f32>().unwrap().iter().all(|r| r == &vec![1.0, 0.0]));
    }

    #[test]
    fn evaluate_returns_fraction() {
        let (source, _) = data();
        let var_map = VarMap::new();
        let m = model(&var_map, ModelKind::Lstm, true);
        let acc = evaluate(&m, &source, 0, 7, &Device::Cpu).unwrap();
        assert!((0.0..=1.0).contains(&acc));
    }

    #[test]
    fn rejects_bad_configs() {
        let (source, target) = data();
        let var_map = VarMap::new();
        let m = model(&var_map, ModelKind::Lstm, true);
        let device = Device::Cpu;

        let tiny_batch = TrainConfig {
            batch_size: 1,
            ..TrainConfig::default()
        };
        assert!(matches!(
            train(&m, &var_map, &source, &target, &tiny_batch, &device, None),
            Err(VradaError::TrainError { .. })
        ));

        let zero_steps = TrainConfig {
            steps: 0,
            ..TrainConfig::default()
        };
        assert!(train(&m, &var_map, &source, &target, &zero_steps, &device, None).is_err());

        let bad_keep = TrainConfig {
            keep_prob: 0.0,
            ..TrainConfig::default()
        };
        assert!(train(&m, &var_map, &source, &target, &bad_keep, &device, None).is_err());
    }

    #[test]
    fn rejects_mismatched_dataset() {
        let (source, target) = generate_domain_pair(&SyntheticConfig {
            num_samples: 8,
            seq_len: 4,
            num_features: 5,
            num_classes: 3,
            ..SyntheticConfig::default()
        })
        .unwrap();
        let var_map = VarMap::new();
        let m = model(&var_map, ModelKind::Vrnn, true);
        let err = train(&m, &var_map, &source, &target, &TrainConfig::default(), &Device::Cpu, None)
            .unwrap_err();
        assert!(err.to_string().contains("features"));
    }

    #[test]
    fn source_only_run_without_target_data() {
        let (source, _) = data();
        let empty_target = SeriesDataset::new(Vec::new(), Vec::new(), 6, 2, 3).unwrap();
        let var_map = VarMap::new();
        let m = model(&var_map, ModelKind::Lstm, false);
        let config = TrainConfig {
            steps: 2,
            batch_size: 4,
            eval_interval: 1,
            summary_interval: 0,
            ..TrainConfig::default()
        };
        let result =
            train(&m, &var_map, &source, &empty_target, &config, &Device::Cpu, None).unwrap();
        assert_eq!(result.evaluations.len(), 2);
        for metrics in &result.evaluations {
            assert!((0.0..=1.0).contains(&metrics.source_accuracy));
            assert_eq!(metrics.target_accuracy, None);
        }
    }

    #[test]
    fn adaptation_still_requires_target_data() {
        let (source, _) = data();
        let empty_target = SeriesDataset::new(Vec::new(), Vec::new(), 6, 2, 3).unwrap();
        let var_map = VarMap::new();
        let m = model(&var_map, ModelKind::Lstm, true);
        let result = train(
            &m,
            &var_map,
            &source,
            &empty_target,
            &TrainConfig::default(),
            &Device::Cpu,
            None,
        );
        assert!(matches!(result, Err(VradaError::TrainError { .. })));
    }

    #[test]
    fn train_config_json_fills_defaults() {
        let dir = std::env::temp_dir().join("vrada_learn_test_train_config");
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("train.json");
        std::fs::write(&path, r#"{"steps": 12, "keep_prob": 0.5}"#).unwrap();

        let config = TrainConfig::load(&path).unwrap();
        assert_eq!(config.steps, 12);
        assert_eq!(config.keep_prob, 0.5);
        assert_eq!(config.batch_size, TrainConfig::default().batch_size);

        std::fs::write(&path, "not json").unwrap();
        assert!(matches!(
            TrainConfig::load(&path),
            Err(VradaError::StorageError { .. })
        ));

        let _ = std::fs::remove_file(&path);
        let _ = std::fs::remove_dir(&dir);
    }

    #[test]
    fn short_run_records_history_and_evaluations() {
        let (source, target) = data();
        let var_map = VarMap::new();
        let m = model(&var_map, ModelKind::Vrnn, true);
        let config = TrainConfig {
            steps: 4,
            batch_size: 8,
            eval_interval: 2,
            summary_interval: 2,
            ..TrainConfig::default()
        };
        let result = train(&m, &var_map, &source, &target, &config, &Device::Cpu, None).unwrap();
        assert_eq!(result.loss_history.len(), 4);
        assert_eq!(result.steps_completed, 4);
        assert_eq!(result.evaluations.len(), 2);
        assert_eq!(result.evaluations[1].step, 4);
        assert!(result.final_loss.is_finite());
        assert_eq!(result.last_summaries.len(), 15);
        assert!(result.last_summaries.iter().all(|r| r.step == 4));
    }
}
