use std::num::NonZeroUsize;

use crate::{MlError, Result};

/// Immutable bounds for a training invocation.
#[derive(Debug, Clone)]
pub struct TrainerConfig {
    epochs: NonZeroUsize,
    batch_size: NonZeroUsize,
    train_fraction: f32,
    report_every: Option<NonZeroUsize>,
    preview_samples: usize,
}

impl TrainerConfig {
    /// Creates a new training configuration that keeps 80% of the samples for training
    /// and doesn't report progress.
    ///
    /// # Args
    /// * `epochs` - Number of epochs to run.
    /// * `batch_size` - Maximum number of samples per batch.
    pub fn new(epochs: NonZeroUsize, batch_size: NonZeroUsize) -> Self {
        Self {
            epochs,
            batch_size,
            train_fraction: 0.8,
            report_every: None,
            preview_samples: 0,
        }
    }

    /// Sets the fraction of the samples, taken from the front, used for training.
    pub fn with_train_fraction(mut self, train_fraction: f32) -> Self {
        self.train_fraction = train_fraction;
        self
    }

    /// Logs progress every `report_every` epochs.
    pub fn with_report_every(mut self, report_every: Option<NonZeroUsize>) -> Self {
        self.report_every = report_every;
        self
    }

    /// Compares this many generated points against the training data on each report.
    pub fn with_preview_samples(mut self, preview_samples: usize) -> Self {
        self.preview_samples = preview_samples;
        self
    }

    pub fn epochs(&self) -> usize {
        self.epochs.get()
    }

    pub fn batch_size(&self) -> NonZeroUsize {
        self.batch_size
    }

    pub fn train_fraction(&self) -> f32 {
        self.train_fraction
    }

    pub fn report_every(&self) -> Option<NonZeroUsize> {
        self.report_every
    }

    pub fn preview_samples(&self) -> usize {
        self.preview_samples
    }

    /// Returns whether `epoch` falls on the reporting cadence.
    pub fn should_report(&self, epoch: usize) -> bool {
        self.report_every
            .is_some_and(|every| epoch % every.get() == 0)
    }

    /// Checks the values that can't be enforced by the types.
    pub fn validate(&self) -> Result<()> {
        if !(self.train_fraction > 0.0 && self.train_fraction < 1.0) {
            return Err(MlError::InvalidConfig(format!(
                "train fraction must be in (0, 1), got {}",
                self.train_fraction
            )));
        }

        Ok(())
    }
}
