//! Summary handles returned by the model graphs.
//!
//! A [`Summary`] pairs a tag such as `loss/task_loss` with a detached tensor.
//! Call [`Summary::record`] after the step to turn it into a serializable
//! [`SummaryRecord`].

use candle_core::{DType, Result, Tensor};
use vrada_core::summary::HISTOGRAM_BUCKETS;
use vrada_core::{HistogramStats, SummaryKind, SummaryRecord, SummaryValue};

#[derive(Debug, Clone)]
pub struct Summary {
    pub name: String,
    pub kind: SummaryKind,
    pub tensor: Tensor,
}

impl Summary {
    /// Scalar summary; `tensor` must hold a single element.
    pub fn scalar(name: impl Into<String>, tensor: &Tensor) -> Self {
        Self {
            name: name.into(),
            kind: SummaryKind::Scalar,
            tensor: tensor.detach(),
        }
    }

    /// Histogram summary over every element of `tensor`.
    pub fn histogram(name: impl Into<String>, tensor: &Tensor) -> Self {
        Self {
            name: name.into(),
            kind: SummaryKind::Histogram,
            tensor: tensor.detach(),
        }
    }

    /// Copies the tensor to the host and reduces it to a record.
    pub fn record(&self, step: usize) -> Result<SummaryRecord> {
        let values = self
            .tensor
            .flatten_all()?
            .to_dtype(DType::F32)?
            .to_vec1::<f32>()?;
        let value = match self.kind {
            SummaryKind::Scalar => {
                if values.len() != 1 {
                    candle_core::bail!(
                        "scalar summary '{}' has {} elements",
                        self.name,
                        values.len()
                    );
                }
                SummaryValue::Scalar(values[0])
            }
            SummaryKind::Histogram => {
                SummaryValue::Histogram(HistogramStats::from_values(&values, HISTOGRAM_BUCKETS))
            }
        };
        Ok(SummaryRecord {
            step,
            name: self.name.clone(),
            kind: self.kind,
            value,
        })
    }
}

/// Records every summary in `summaries` at `step`.
pub fn record_all(summaries: &[Summary], step: usize) -> Result<Vec<SummaryRecord>> {
    summaries.iter().map(|s| s.record(step)).collect()
}
