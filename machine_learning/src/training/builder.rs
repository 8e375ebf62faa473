use rand::{SeedableRng, rngs::StdRng};

use super::{FlowTrainer, TrainerConfig};
use crate::{
    DensityModel, MlError, Result,
    arch::{
        flows::{AffineFlow, BoundedFlow, Flow},
        loss::WeightedNll,
    },
    optimization::{Adam, GradientDescent, GradientDescentWithMomentum, Optimizer},
    specs::{FlowSpec, OptimizerSpec, TrainerSpec},
};

/// The trainer resolved from a `TrainerSpec`.
pub type BuiltTrainer = FlowTrainer<Flow, Box<dyn Optimizer>, WeightedNll, StdRng>;

/// Builds `FlowTrainer`s given a specification.
#[derive(Default)]
pub struct TrainerBuilder;

impl TrainerBuilder {
    /// Creates a new `TrainerBuilder`.
    pub fn new() -> Self {
        Self
    }

    /// Builds a new `FlowTrainer` following a spec.
    ///
    /// # Arguments
    /// * `spec` - The specification for the trainer.
    ///
    /// # Returns
    /// The trainer, or an error if the spec holds values that can't be trained with.
    pub fn build(&self, spec: &TrainerSpec) -> Result<BuiltTrainer> {
        let flow = self.resolve_flow(&spec.flow)?;
        let optimizer = self.resolve_optimizer(spec.optimizer, flow.params().len())?;

        let config = TrainerConfig::new(spec.epochs, spec.batch_size)
            .with_train_fraction(spec.train_fraction)
            .with_report_every(spec.report_every)
            .with_preview_samples(spec.preview_samples);
        config.validate()?;

        let rng = self.generate_rng(spec.seed);

        Ok(FlowTrainer::new(
            flow,
            optimizer,
            WeightedNll::new(),
            config,
            rng,
        ))
    }

    fn resolve_flow(&self, spec: &FlowSpec) -> Result<Flow> {
        let flow = match spec {
            FlowSpec::Affine { dim } => {
                if *dim == 0 {
                    return Err(MlError::InvalidConfig("flow dimension must be positive".into()));
                }

                Flow::Affine(AffineFlow::new(*dim))
            }
            FlowSpec::BoundedAffine { bounds } => {
                if bounds.is_empty() {
                    return Err(MlError::InvalidConfig("flow needs at least one bound".into()));
                }

                let inner = AffineFlow::new(bounds.len());
                Flow::Bounded(BoundedFlow::new(inner, bounds)?)
            }
        };

        Ok(flow)
    }

    fn resolve_optimizer(&self, spec: OptimizerSpec, len: usize) -> Result<Box<dyn Optimizer>> {
        let optimizer: Box<dyn Optimizer> = match spec {
            OptimizerSpec::Adam {
                learning_rate,
                beta1,
                beta2,
                epsilon,
            } => {
                check_learning_rate(learning_rate)?;
                check_decay("beta1", beta1)?;
                check_decay("beta2", beta2)?;
                Box::new(Adam::new(len, learning_rate, beta1, beta2, epsilon))
            }
            OptimizerSpec::GradientDescent { learning_rate } => {
                check_learning_rate(learning_rate)?;
                Box::new(GradientDescent::new(learning_rate))
            }
            OptimizerSpec::GradientDescentWithMomentum {
                learning_rate,
                momentum,
            } => {
                check_learning_rate(learning_rate)?;
                check_decay("momentum", momentum)?;
                Box::new(GradientDescentWithMomentum::new(len, learning_rate, momentum))
            }
        };

        Ok(optimizer)
    }

    fn generate_rng(&self, seed: Option<u64>) -> StdRng {
        match seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_os_rng(),
        }
    }
}

fn check_learning_rate(learning_rate: f32) -> Result<()> {
    if !(learning_rate.is_finite() && learning_rate > 0.0) {
        return Err(MlError::InvalidConfig(format!(
            "learning rate must be positive, got {learning_rate}"
        )));
    }

    Ok(())
}

fn check_decay(name: &str, value: f32) -> Result<()> {
    if !(0.0..1.0).contains(&value) {
        return Err(MlError::InvalidConfig(format!(
            "{name} must be in [0, 1), got {value}"
        )));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use ml_core::DensityModel;

    use super::*;

    fn spec(json: &str) -> TrainerSpec {
        serde_json::from_str(json).unwrap()
    }

    #[test]
    fn builds_a_bounded_flow_with_adam() {
        let spec = spec(
            r#"{
                "flow": { "bounded_affine": { "bounds": [[0.0, 1.0], [0.0, 4.0]] } },
                "optimizer": { "adam": { "learning_rate": 0.05, "beta1": 0.9, "beta2": 0.999, "epsilon": 1e-8 } },
                "epochs": 3,
                "batch_size": 8,
                "seed": 7
            }"#,
        );

        let trainer = TrainerBuilder::new().build(&spec).unwrap();

        assert_eq!(trainer.model().dim(), 2);
        assert_eq!(trainer.model().kind(), "bounded_affine");
        assert_eq!(trainer.config().epochs(), 3);
    }

    #[test]
    fn rejects_a_non_positive_learning_rate() {
        let spec = spec(
            r#"{
                "flow": { "affine": { "dim": 1 } },
                "optimizer": { "gradient_descent": { "learning_rate": 0.0 } },
                "epochs": 1,
                "batch_size": 1
            }"#,
        );

        let err = TrainerBuilder::new().build(&spec).err().unwrap();
        assert!(matches!(err, MlError::InvalidConfig(_)));
    }

    #[test]
    fn rejects_a_zero_dimensional_flow() {
        let spec = spec(
            r#"{
                "flow": { "affine": { "dim": 0 } },
                "optimizer": { "gradient_descent": { "learning_rate": 0.1 } },
                "epochs": 1,
                "batch_size": 1
            }"#,
        );

        assert!(TrainerBuilder::new().build(&spec).is_err());
    }

    #[test]
    fn rejects_a_bad_train_fraction() {
        let spec = spec(
            r#"{
                "flow": { "affine": { "dim": 1 } },
                "optimizer": { "gradient_descent_with_momentum": { "learning_rate": 0.1, "momentum": 0.9 } },
                "epochs": 1,
                "batch_size": 1,
                "train_fraction": 1.0
            }"#,
        );

        assert!(TrainerBuilder::new().build(&spec).is_err());
    }
}
