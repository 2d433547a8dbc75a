//! Feature extractor with task and gradient-reversed domain classifiers.
//!
//! ```text
//!              ┌──────────────► task classifier ─────► task loss (source rows)
//! x ─► feature extractor
//!              └─► GRL(λ) ────► domain classifier ───► domain loss
//! x ─► GRL(λ) ─────────────────► domain classifier 2 ─► (optional, added)
//! ```

use candle_core::{Result, Tensor};
use candle_nn::VarBuilder;
use vrada_core::{FEATURE_LAYERS, HIDDEN_DIM, NUM_DOMAINS};

use crate::classifier::Classifier;
use crate::dense::{DenseStack, Regularization};
use crate::grl::flip_gradient;
use crate::losses::softmax_cross_entropy;
use crate::summary::Summary;

/// Options of the adaptation head.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HeadOptions {
    /// Drop the unlabelled target half of the batch from the task loss
    /// while training.
    pub adaptation: bool,
    pub batch_norm: bool,
    /// Add a second domain classifier on the extractor's input.
    pub two_domain_classifiers: bool,
}

impl Default for HeadOptions {
    fn default() -> Self {
        Self {
            adaptation: true,
            batch_norm: false,
            two_domain_classifiers: false,
        }
    }
}

/// Per-step inputs of the head besides the features.
#[derive(Debug, Clone, Copy)]
pub struct HeadInputs<'a> {
    /// One-hot task labels, `[B, num_classes]`.
    pub y: &'a Tensor,
    /// One-hot domain labels, `[B, 2]`.
    pub domain: &'a Tensor,
    pub grl_lambda: f64,
    pub reg: Regularization,
}

#[derive(Debug, Clone)]
pub struct HeadOutputs {
    /// `[B/2, C]` while training with adaptation, `[B, C]` otherwise.
    pub task_softmax: Tensor,
    pub domain_softmax: Tensor,
    pub task_loss: Tensor,
    pub domain_loss: Tensor,
    /// Output of the feature extractor, `[B, 100]`.
    pub feature_extractor: Tensor,
    pub summaries: Vec<Summary>,
}

#[derive(Debug)]
pub struct DomainAdaptationHead {
    feature_extractor: DenseStack,
    task_classifier: Classifier,
    domain_classifier: Classifier,
    domain_classifier2: Option<Classifier>,
    options: HeadOptions,
}

impl DomainAdaptationHead {
    /// Creates the head for `in_dim` inputs under the scopes
    /// `feature_extractor`, `task_classifier`, `domain_classifier` and
    /// optionally `domain_classifier2`.
    pub fn new(
        in_dim: usize,
        num_classes: usize,
        options: HeadOptions,
        vb: VarBuilder,
    ) -> Result<Self> {
        let feature_extractor = DenseStack::new(
            in_dim,
            HIDDEN_DIM,
            HIDDEN_DIM,
            FEATURE_LAYERS,
            options.batch_norm,
            true,
            vb.pp("feature_extractor"),
        )?;
        let task_classifier = Classifier::new(
            HIDDEN_DIM,
            num_classes,
            options.batch_norm,
            vb.pp("task_classifier"),
        )?;
        let domain_classifier = Classifier::new(
            HIDDEN_DIM,
            NUM_DOMAINS,
            options.batch_norm,
            vb.pp("domain_classifier"),
        )?;
        let domain_classifier2 = if options.two_domain_classifiers {
            Some(Classifier::new(
                in_dim,
                NUM_DOMAINS,
                options.batch_norm,
                vb.pp("domain_classifier2"),
            )?)
        } else {
            None
        };

        Ok(Self {
            feature_extractor,
            task_classifier,
            domain_classifier,
            domain_classifier2,
            options,
        })
    }

    pub fn options(&self) -> HeadOptions {
        self.options
    }

    /// Runs the head on `x` (`[B, in_dim]`).
    pub fn forward(&self, x: &Tensor, inputs: HeadInputs<'_>) -> Result<HeadOutputs> {
        let reg = inputs.reg;
        let features = self.feature_extractor.forward(x, reg)?;

        let task = self.task_classifier.forward(&features, reg)?;
        let domain = self
            .domain_classifier
            .forward(&flip_gradient(&features, inputs.grl_lambda)?, reg)?;

        // Target rows carry no task labels during adaptation training.
        let (task_logits, task_softmax, y) = if self.options.adaptation && reg.training {
            let half = features.dim(0)? / 2;
            // Models reject this earlier as a shape mismatch; this guards
            // direct use of the head.
            if half == 0 {
                candle_core::bail!("adaptation training needs at least 2 rows per batch");
            }
            (
                task.logits.narrow(0, 0, half)?,
                task.softmax.narrow(0, 0, half)?,
                inputs.y.narrow(0, 0, half)?,
            )
        } else {
            (task.logits, task.softmax, inputs.y.clone())
        };

        let task_loss = softmax_cross_entropy(&y, &task_logits)?.mean_all()?;
        let mut domain_loss = softmax_cross_entropy(inputs.domain, &domain.logits)?.mean_all()?;

        if let Some(classifier2) = &self.domain_classifier2 {
            let second = classifier2.forward(&flip_gradient(x, inputs.grl_lambda)?, reg)?;
            let loss2 = softmax_cross_entropy(inputs.domain, &second.logits)?.mean_all()?;
            domain_loss = (domain_loss + loss2)?;
        }

        let summaries = vec![
            Summary::scalar("loss/task_loss", &task_loss),
            Summary::scalar("loss/domain_loss", &domain_loss),
            Summary::histogram("outputs/feature_extractor", &features),
            Summary::histogram("outputs/task_classifier", &task_softmax),
            Summary::histogram("outputs/domain_classifier", &domain.softmax),
        ];

        Ok(HeadOutputs {
            task_softmax,
            domain_softmax: domain.softmax,
            task_loss,
            domain_loss,
            feature_extractor: features,
            summaries,
        })
    }
}
