//! Materialized summary records.
//!
//! Models hand back summary *handles* (a name plus a live tensor). Once a
//! step has run, each handle is reduced to a [`SummaryRecord`], which is
//! plain data and serializes to one JSON object.

use serde::{Deserialize, Serialize};

/// Number of equal-width buckets in a histogram record.
pub const HISTOGRAM_BUCKETS: usize = 30;

/// Whether a summary is logged as a single value or a distribution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SummaryKind {
    Scalar,
    Histogram,
}

/// Value payload of a [`SummaryRecord`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SummaryValue {
    Scalar(f32),
    Histogram(HistogramStats),
}

/// A named summary value captured at a training step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SummaryRecord {
    pub step: usize,
    pub name: String,
    pub kind: SummaryKind,
    pub value: SummaryValue,
}

/// Distribution statistics of a tensor's values.
///
/// # Example
///
/// ```
/// use vrada_core::summary::HistogramStats;
///
/// let stats = HistogramStats::from_values(&[0.0, 1.0, 2.0, 3.0], 3);
/// assert_eq!(stats.count, 4);
/// assert_eq!(stats.min, 0.0);
/// assert_eq!(stats.max, 3.0);
/// assert_eq!(stats.buckets.iter().sum::<usize>(), 4);
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistogramStats {
    pub count: usize,
    pub min: f32,
    pub max: f32,
    pub mean: f32,
    pub std: f32,
    /// Left edge of every bucket; the last bucket is closed at `max`.
    pub bucket_edges: Vec<f32>,
    pub buckets: Vec<usize>,
}

impl HistogramStats {
    /// Builds histogram statistics over `values` using `num_buckets`
    /// equal-width buckets between the minimum and maximum.
    ///
    /// Non-finite values are skipped. An empty input yields zero counts and
    /// NaN moments.
    pub fn from_values(values: &[f32], num_buckets: usize) -> Self {
        let finite: Vec<f32> = values.iter().copied().filter(|v| v.is_finite()).collect();
        let num_buckets = num_buckets.max(1);

        if finite.is_empty() {
            return Self {
                count: 0,
                min: f32::NAN,
                max: f32::NAN,
                mean: f32::NAN,
                std: f32::NAN,
                bucket_edges: Vec::new(),
                buckets: Vec::new(),
            };
        }

        let min = finite.iter().copied().fold(f32::INFINITY, f32::min);
        let max = finite.iter().copied().fold(f32::NEG_INFINITY, f32::max);
        let n = finite.len() as f32;
        let mean = finite.iter().sum::<f32>() / n;
        let var = finite.iter().map(|v| (v - mean) * (v - mean)).sum::<f32>() / n;

        let width = (max - min) / num_buckets as f32;
        let bucket_edges = (0..num_buckets).map(|i| min + width * i as f32).collect();
        let mut buckets = vec![0usize; num_buckets];
        for v in &finite {
            let idx = if width > 0.0 {
                (((v - min) / width) as usize).min(num_buckets - 1)
            } else {
                0
            };
            buckets[idx] += 1;
        }

        Self {
            count: finite.len(),
            min,
            max,
            mean,
            std: var.sqrt(),
            bucket_edges,
            buckets,
        }
    }
}
