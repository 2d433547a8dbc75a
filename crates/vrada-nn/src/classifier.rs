//! Four-layer classifier used for both task and domain prediction.

use candle_core::{Result, Tensor, D};
use candle_nn::VarBuilder;
use vrada_core::{CLASSIFIER_DIM, CLASSIFIER_LAYERS};

use crate::dense::{DenseStack, Regularization};

/// Logits and probabilities produced by a [`Classifier`].
#[derive(Debug, Clone)]
pub struct ClassifierOutput {
    /// Unscaled scores; feed these to the cross-entropy loss.
    pub logits: Tensor,
    /// `softmax(logits)` over the class dimension; use for prediction.
    pub softmax: Tensor,
}

/// `Linear(50) → … → Linear(num_classes)`, ReLU between layers, no
/// activation on the logits.
#[derive(Debug)]
pub struct Classifier {
    stack: DenseStack,
}

impl Classifier {
    /// Creates the four layers under `vb` (`layer_0` .. `layer_3`).
    ///
    /// The domain classifiers pass `num_classes = 2`.
    pub fn new(
        in_dim: usize,
        num_classes: usize,
        use_batch_norm: bool,
        vb: VarBuilder,
    ) -> Result<Self> {
        let stack = DenseStack::new(
            in_dim,
            CLASSIFIER_DIM,
            num_classes,
            CLASSIFIER_LAYERS,
            use_batch_norm,
            false,
            vb,
        )?;
        Ok(Self { stack })
    }

    /// Returns logits and class probabilities for `[B, in_dim]` inputs.
    pub fn forward(&self, x: &Tensor, reg: Regularization) -> Result<ClassifierOutput> {
        let logits = self.stack.forward(x, reg)?;
        let softmax = candle_nn::ops::softmax(&logits, D::Minus1)?;
        Ok(ClassifierOutput { logits, softmax })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use candle_core::{DType, Device};
    use candle_nn::VarMap;

    #[test]
    fn softmax_rows_sum_to_one() {
        let device = Device::Cpu;
        let var_map = VarMap::new();
        let vb = VarBuilder::from_varmap(&var_map, DType::F32, &device);
        let classifier = Classifier::new(12, 3, false, vb).unwrap();

        let x = Tensor::randn(0f32, 1f32, (7, 12), &device).unwrap();
        let out = classifier.forward(&x, Regularization::eval()).unwrap();
        assert_eq!(out.logits.dims(), &[7, 3]);
        assert_eq!(out.softmax.dims(), &[7, 3]);

        let sums = out.softmax.sum(D::Minus1).unwrap().to_vec1::<f32>().unwrap();
        for s in sums {
            assert!((s - 1.0).abs() < 1e-5, "row sum {s}");
        }
    }

    #[test]
    fn logits_are_finite_and_input_dependent() {
        let device = Device::Cpu;
        let var_map = VarMap::new();
        let vb = VarBuilder::from_varmap(&var_map, DType::F32, &device);
        let classifier = Classifier::new(4, 2, false, vb).unwrap();

        let x = Tensor::randn(0f32, 3f32, (64, 4), &device).unwrap();
        let out = classifier.forward(&x, Regularization::eval()).unwrap();
        let flat = out.logits.flatten_all().unwrap().to_vec1::<f32>().unwrap();
        assert!(flat.iter().all(|v| v.is_finite()));
        assert!(flat.windows(2).any(|w| w[0] != w[1]));
    }

    #[test]
    fn four_layers_are_created() {
        let device = Device::Cpu;
        let var_map = VarMap::new();
        let vb = VarBuilder::from_varmap(&var_map, DType::F32, &device);
        let _classifier = Classifier::new(5, 2, false, vb.pp("domain_classifier")).unwrap();

        let data = var_map.data().lock().unwrap();
        for i in 0..CLASSIFIER_LAYERS {
            assert!(data.contains_key(&format!(
                "domain_classifier.layer_{i}.fully_connected.weight"
            )));
        }
        assert!(!data.contains_key(&format!(
            "domain_classifier.layer_{CLASSIFIER_LAYERS}.fully_connected.weight"
        )));
    }
}
