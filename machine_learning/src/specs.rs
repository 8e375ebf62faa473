use std::num::NonZeroUsize;

use serde::{Deserialize, Serialize};

/// The specification for a `Flow`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FlowSpec {
    Affine {
        dim: usize,
    },
    BoundedAffine {
        /// The `(low, high)` bounds of every dimension.
        bounds: Vec<(f32, f32)>,
    },
}

/// The specification for the `Optimizer` trait.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OptimizerSpec {
    Adam {
        learning_rate: f32,
        beta1: f32,
        beta2: f32,
        epsilon: f32,
    },
    GradientDescent {
        learning_rate: f32,
    },
    GradientDescentWithMomentum {
        learning_rate: f32,
        momentum: f32,
    },
}

/// The specification for a `FlowTrainer`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrainerSpec {
    pub flow: FlowSpec,
    pub optimizer: OptimizerSpec,
    pub epochs: NonZeroUsize,
    pub batch_size: NonZeroUsize,
    #[serde(default = "default_train_fraction")]
    pub train_fraction: f32,
    #[serde(default)]
    pub report_every: Option<NonZeroUsize>,
    #[serde(default)]
    pub preview_samples: usize,
    #[serde(default)]
    pub seed: Option<u64>,
}

fn default_train_fraction() -> f32 {
    0.8
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn trainer_spec_from_json() {
        let json = r#"{
            "flow": { "bounded_affine": { "bounds": [[0.0, 1.0], [-2.0, 2.0]] } },
            "optimizer": { "adam": { "learning_rate": 0.01, "beta1": 0.9, "beta2": 0.999, "epsilon": 1e-8 } },
            "epochs": 20,
            "batch_size": 64
        }"#;

        let spec: TrainerSpec = serde_json::from_str(json).unwrap();

        assert!(matches!(spec.flow, FlowSpec::BoundedAffine { ref bounds } if bounds.len() == 2));
        assert!(matches!(spec.optimizer, OptimizerSpec::Adam { .. }));
        assert_eq!(spec.epochs.get(), 20);
        assert_eq!(spec.train_fraction, 0.8);
        assert!(spec.report_every.is_none());
        assert!(spec.seed.is_none());
    }

    #[test]
    fn zero_epochs_are_rejected() {
        let json = r#"{
            "flow": { "affine": { "dim": 1 } },
            "optimizer": { "gradient_descent": { "learning_rate": 0.1 } },
            "epochs": 0,
            "batch_size": 4
        }"#;

        assert!(serde_json::from_str::<TrainerSpec>(json).is_err());
    }
}
