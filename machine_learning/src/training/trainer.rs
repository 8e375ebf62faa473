use std::ops::Range;

use log::{debug, info, warn};
use ml_core::{DensityModel, Mode, Snapshot};
use rand::Rng;

use super::{LossHistory, TrainerConfig, TrainingOutcome};
use crate::{
    MlError, Result,
    arch::loss::LossFn,
    data::{Batches, SampleSource, Split},
    optimization::Optimizer,
    stats::{Moments, MomentsAccumulator},
};

/// Fits a density model to a weighted sample set, keeping the parameters with the lowest
/// validation loss.
pub struct FlowTrainer<M, O, L, R>
where
    M: DensityModel,
    O: Optimizer,
    L: LossFn,
    R: Rng,
{
    grad: Vec<f32>,
    model: M,
    optimizer: O,
    loss_fn: L,
    config: TrainerConfig,
    rng: R,
}

impl<M, O, L, R> FlowTrainer<M, O, L, R>
where
    M: DensityModel,
    O: Optimizer,
    L: LossFn,
    R: Rng,
{
    /// Creates a new `FlowTrainer`.
    ///
    /// # Arguments
    /// * `model` - The model to fit, its current parameters are the starting point.
    /// * `optimizer` - The update rule, sized for the model's parameters.
    /// * `loss_fn` - The objective computed for every batch.
    /// * `config` - The epoch count, batch size, split and reporting settings.
    /// * `rng` - The source of randomness for the progress previews.
    pub fn new(model: M, optimizer: O, loss_fn: L, config: TrainerConfig, rng: R) -> Self {
        Self {
            grad: vec![0.0; model.params().len()],
            model,
            optimizer,
            loss_fn,
            config,
            rng,
        }
    }

    pub fn model(&self) -> &M {
        &self.model
    }

    pub fn config(&self) -> &TrainerConfig {
        &self.config
    }

    /// Runs every epoch over `source` and consumes the trainer.
    ///
    /// The first `train_fraction` of the samples are used for the gradient steps and the
    /// rest for validation, both in their original order.
    ///
    /// # Arguments
    /// * `source` - The weighted samples.
    ///
    /// # Returns
    /// The final model, the best snapshot and the loss history, or the first error raised
    /// by the data, the model or the optimizer.
    pub fn train<S>(mut self, source: &S) -> Result<TrainingOutcome<M>>
    where
        S: SampleSource + ?Sized,
    {
        self.config.validate()?;

        if source.dim() != self.model.dim() {
            return Err(MlError::SizeMismatch {
                what: "point dimension",
                got: source.dim(),
                expected: self.model.dim(),
            });
        }

        let split = Split::new(source.len(), self.config.train_fraction())?;
        let epochs = self.config.epochs();

        info!(
            epochs = epochs,
            train = split.train().len(),
            validation = split.validation().len(),
            params = self.grad.len();
            "starting training"
        );

        let target = self.target_moments(source, split.train())?;
        let mut history = LossHistory::with_capacity(epochs);
        let mut best: Option<Snapshot> = None;

        for epoch in 0..epochs {
            let train_loss = self.train_epoch(epoch, source, split.train())?;
            let val_loss = self.validate_epoch(epoch, source, split.validation())?;
            history.push(train_loss, val_loss);

            debug!(epoch = epoch, train_loss = train_loss, val_loss = val_loss; "epoch finished");

            let improved = best
                .as_ref()
                .is_none_or(|snapshot| val_loss < snapshot.val_loss());

            if improved {
                debug!(epoch = epoch, val_loss = val_loss; "new best snapshot");
                best = Some(Snapshot::capture(&self.model, epoch, val_loss));
            }

            if self.config.should_report(epoch) {
                self.report(epoch, train_loss, val_loss, target.as_ref());
            }
        }

        let best = best.ok_or(MlError::InvalidInput("training ran no epochs"))?;

        info!(
            best_epoch = best.epoch(),
            best_val_loss = best.val_loss();
            "training finished"
        );

        Ok(TrainingOutcome {
            model: self.model,
            best,
            history,
        })
    }

    fn train_epoch<S>(&mut self, epoch: usize, source: &S, range: Range<usize>) -> Result<f32>
    where
        S: SampleSource + ?Sized,
    {
        self.model.set_mode(Mode::Train);

        let batches = Batches::new(source, range, self.config.batch_size())?;
        let num_batches = batches.len();
        let mut total = 0.0;

        for batch in batches {
            let batch = batch?;
            let log_prob = self.model.log_prob(batch.points())?;

            let loss = self.loss_fn.loss(log_prob.view(), batch.weights())?;
            check_finite(epoch, "training", loss)?;

            let d_log_prob = self.loss_fn.loss_prime(log_prob.view(), batch.weights())?;

            self.grad.fill(0.0);
            self.model
                .backward(batch.points(), d_log_prob.view(), &mut self.grad)?;
            self.optimizer
                .update_params(self.model.params_mut(), &self.grad)?;

            total += loss;
        }

        // NOTE: every batch counts the same, the last one included.
        Ok(total / num_batches as f32)
    }

    fn validate_epoch<S>(&mut self, epoch: usize, source: &S, range: Range<usize>) -> Result<f32>
    where
        S: SampleSource + ?Sized,
    {
        self.model.set_mode(Mode::Eval);

        let batches = Batches::new(source, range, self.config.batch_size())?;
        let num_batches = batches.len();
        let mut total = 0.0;

        for batch in batches {
            let batch = batch?;
            let log_prob = self.model.log_prob(batch.points())?;

            let loss = self.loss_fn.loss(log_prob.view(), batch.weights())?;
            check_finite(epoch, "validation", loss)?;

            total += loss;
        }

        Ok(total / num_batches as f32)
    }

    /// Computes the weighted moments of the training partition, only when they will be
    /// compared against previews.
    fn target_moments<S>(&self, source: &S, range: Range<usize>) -> Result<Option<Moments>>
    where
        S: SampleSource + ?Sized,
    {
        if self.config.report_every().is_none() || self.config.preview_samples() == 0 {
            return Ok(None);
        }

        let mut acc = MomentsAccumulator::new(source.dim());
        for batch in Batches::new(source, range, self.config.batch_size())? {
            let batch = batch?;
            acc.push(batch.points(), batch.weights());
        }

        Ok(acc.finish())
    }

    fn report(&mut self, epoch: usize, train_loss: f32, val_loss: f32, target: Option<&Moments>) {
        info!(
            epoch = epoch,
            epochs = self.config.epochs(),
            train_loss = train_loss,
            val_loss = val_loss;
            "training progress"
        );

        let Some(target) = target else {
            return;
        };

        let preview = self.model.sample(self.config.preview_samples(), &mut self.rng);
        let Some(generated) = Moments::of(preview.view()) else {
            warn!(epoch = epoch; "empty preview");
            return;
        };

        for d in 0..target.mean.len() {
            info!(
                dim = d,
                target_mean = target.mean[d],
                generated_mean = generated.mean[d],
                target_std = target.std[d],
                generated_std = generated.std[d];
                "preview"
            );
        }
    }
}

fn check_finite(epoch: usize, phase: &'static str, loss: f32) -> Result<()> {
    if !loss.is_finite() {
        return Err(MlError::NonFiniteLoss { epoch, phase, loss });
    }

    Ok(())
}
