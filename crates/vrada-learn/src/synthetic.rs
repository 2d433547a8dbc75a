//! Synthetic source/target time-series datasets.
//!
//! Class `c` is a sinusoid with angular frequency `0.3 + 0.4·c` per step and
//! a random phase; each feature adds a fixed phase offset. The target domain
//! applies an affine shift to every value, so the labelling rule is shared
//! but the input distribution differs.

use candle_core::{Device, Tensor};
use serde::{Deserialize, Serialize};
use vrada_core::VradaError;

use crate::nn_rng::SimpleRng;

/// A labelled batch of sequences stored row-major as `[N, T, F]`.
#[derive(Debug, Clone)]
pub struct SeriesDataset {
    values: Vec<f32>,
    labels: Vec<usize>,
    seq_len: usize,
    num_features: usize,
    num_classes: usize,
}

impl SeriesDataset {
    /// Wraps raw values; `values.len()` must equal `labels.len() · T · F`.
    ///
    /// # Errors
    ///
    /// Returns [`VradaError::ShapeMismatch`] if the sizes disagree or a
    /// label is out of range.
    pub fn new(
        values: Vec<f32>,
        labels: Vec<usize>,
        seq_len: usize,
        num_features: usize,
        num_classes: usize,
    ) -> Result<Self, VradaError> {
        if values.len() != labels.len() * seq_len * num_features {
            return Err(VradaError::ShapeMismatch {
                message: format!(
                    "{} values for {} sequences of {seq_len}x{num_features}",
                    values.len(),
                    labels.len()
                ),
            });
        }
        if let Some(bad) = labels.iter().find(|&&l| l >= num_classes) {
            return Err(VradaError::ShapeMismatch {
                message: format!("label {bad} out of range for {num_classes} classes"),
            });
        }
        Ok(Self {
            values,
            labels,
            seq_len,
            num_features,
            num_classes,
        })
    }

    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    pub fn seq_len(&self) -> usize {
        self.seq_len
    }

    pub fn num_features(&self) -> usize {
        self.num_features
    }

    pub fn num_classes(&self) -> usize {
        self.num_classes
    }

    pub fn labels(&self) -> &[usize] {
        &self.labels
    }

    /// Gathers rows into `(x [n, T, F], y one-hot [n, C])`.
    pub fn gather(&self, indices: &[usize], device: &Device) -> candle_core::Result<(Tensor, Tensor)> {
        let row = self.seq_len * self.num_features;
        let mut xs = Vec::with_capacity(indices.len() * row);
        let mut ys = vec![0f32; indices.len() * self.num_classes];
        for (i, &idx) in indices.iter().enumerate() {
            xs.extend_from_slice(&self.values[idx * row..(idx + 1) * row]);
            ys[i * self.num_classes + self.labels[idx]] = 1.0;
        }
        let x = Tensor::from_vec(xs, (indices.len(), self.seq_len, self.num_features), device)?;
        let y = Tensor::from_vec(ys, (indices.len(), self.num_classes), device)?;
        Ok((x, y))
    }
}

/// Affine shift applied to target-domain values: `v · scale + offset`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DomainShift {
    pub offset: f32,
    pub scale: f32,
}

impl Default for DomainShift {
    fn default() -> Self {
        Self {
            offset: 0.5,
            scale: 1.5,
        }
    }
}

/// Parameters of [`generate_domain_pair`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyntheticConfig {
    /// Sequences per domain.
    pub num_samples: usize,
    pub seq_len: usize,
    pub num_features: usize,
    pub num_classes: usize,
    /// Standard deviation of additive Gaussian noise.
    pub noise: f32,
    pub target_shift: DomainShift,
    pub seed: u64,
}

impl Default for SyntheticConfig {
    fn default() -> Self {
        Self {
            num_samples: 256,
            seq_len: 20,
            num_features: 2,
            num_classes: 3,
            noise: 0.1,
            target_shift: DomainShift::default(),
            seed: 42,
        }
    }
}

/// Generates a labelled source dataset and a shifted target dataset.
///
/// # Errors
///
/// Returns [`VradaError::InvalidConfig`] if any dimension is zero or fewer
/// than two classes are requested.
///
/// # Example
///
/// ```
/// use vrada_learn::synthetic::{generate_domain_pair, SyntheticConfig};
///
/// let (source, target) = generate_domain_pair(&SyntheticConfig::default()).unwrap();
/// assert_eq!(source.len(), target.len());
/// ```
pub fn generate_domain_pair(
    config: &SyntheticConfig,
) -> Result<(SeriesDataset, SeriesDataset), VradaError> {
    if config.num_samples == 0 || config.seq_len == 0 || config.num_features == 0 {
        return Err(VradaError::InvalidConfig {
            message: "synthetic dataset dimensions must be non-zero".to_string(),
        });
    }
    if config.num_classes < 2 {
        return Err(VradaError::InvalidConfig {
            message: format!("need at least 2 classes, got {}", config.num_classes),
        });
    }

    let mut rng = SimpleRng::new(config.seed);
    let source = generate_domain(config, DomainShift { offset: 0.0, scale: 1.0 }, &mut rng)?;
    let target = generate_domain(config, config.target_shift, &mut rng)?;
    Ok((source, target))
}

fn generate_domain(
    config: &SyntheticConfig,
    shift: DomainShift,
    rng: &mut SimpleRng,
) -> Result<SeriesDataset, VradaError> {
    let mut values =
        Vec::with_capacity(config.num_samples * config.seq_len * config.num_features);
    let mut labels = Vec::with_capacity(config.num_samples);

    for i in 0..config.num_samples {
        let class = i % config.num_classes;
        let freq = 0.3 + 0.4 * class as f32;
        let phase = rng.next_f32_range(0.0, std::f32::consts::TAU);
        for t in 0..config.seq_len {
            for f in 0..config.num_features {
                let clean = (freq * t as f32 + phase + 0.7 * f as f32).sin();
                let noisy = clean + config.noise * rng.next_normal();
                values.push(noisy * shift.scale + shift.offset);
            }
        }
        labels.push(class);
    }

    SeriesDataset::new(
        values,
        labels,
        config.seq_len,
        config.num_features,
        config.num_classes,
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn small() -> SyntheticConfig {
        SyntheticConfig {
            num_samples: 30,
            seq_len: 8,
            num_features: 2,
            num_classes: 3,
            ..SyntheticConfig::default()
        }
    }

    #[test]
    fn balanced_labels() {
        let (source, target) = generate_domain_pair(&small()).unwrap();
        for ds in [&source, &target] {
            for c in 0..3 {
                assert_eq!(ds.labels().iter().filter(|&&l| l == c).count(), 10);
            }
        }
    }

    #[test]
    fn target_is_shifted() {
        let config = SyntheticConfig {
            num_samples: 300,
            ..small()
        };
        let (source, target) = generate_domain_pair(&config).unwrap();
        let device = Device::Cpu;
        let all: Vec<usize> = (0..source.len()).collect();
        let (xs, _) = source.gather(&all, &device).unwrap();
        let (xt, _) = target.gather(&all, &device).unwrap();
        let ms = xs.mean_all().unwrap().to_scalar::<f32>().unwrap();
        let mt = xt.mean_all().unwrap().to_scalar::<f32>().unwrap();
        assert!((mt - ms - 0.5).abs() < 0.15, "source mean {ms}, target mean {mt}");
    }

    #[test]
    fn gather_shapes_and_one_hot() {
        let (source, _) = generate_domain_pair(&small()).unwrap();
        let (x, y) = source.gather(&[0, 4, 5], &Device::Cpu).unwrap();
        assert_eq!(x.dims(), &[3, 8, 2]);
        let rows = y.to_vec2::<f32>().unwrap();
        assert_eq!(rows[0], vec![1.0, 0.0, 0.0]);
        assert_eq!(rows[1], vec![0.0, 1.0, 0.0]);
        assert_eq!(rows[2], vec![0.0, 0.0, 1.0]);
    }

    #[test]
    fn same_seed_same_data() {
        let (a, _) = generate_domain_pair(&small()).unwrap();
        let (b, _) = generate_domain_pair(&small()).unwrap();
        assert_eq!(a.values, b.values);
    }

    #[test]
    fn invalid_configs_rejected() {
        let zero = SyntheticConfig {
            seq_len: 0,
            ..small()
        };
        assert!(generate_domain_pair(&zero).is_err());
        let one_class = SyntheticConfig {
            num_classes: 1,
            ..small()
        };
        assert!(generate_domain_pair(&one_class).is_err());
    }

    #[test]
    fn dataset_rejects_bad_sizes() {
        assert!(SeriesDataset::new(vec![0.0; 5], vec![0, 1], 2, 1, 2).is_err());
        assert!(SeriesDataset::new(vec![0.0; 4], vec![0, 2], 2, 1, 2).is_err());
        assert!(SeriesDataset::new(vec![0.0; 4], vec![0, 1], 2, 1, 2).is_ok());
    }
}
