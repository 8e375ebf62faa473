use ml_core::{DensityModel, Snapshot};
use serde::Serialize;

use crate::Result;

/// Per-epoch training and validation losses, in epoch order.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct LossHistory {
    train: Vec<f32>,
    val: Vec<f32>,
}

impl LossHistory {
    pub fn with_capacity(epochs: usize) -> Self {
        Self {
            train: Vec::with_capacity(epochs),
            val: Vec::with_capacity(epochs),
        }
    }

    /// Records the losses of the next epoch.
    pub fn push(&mut self, train_loss: f32, val_loss: f32) {
        self.train.push(train_loss);
        self.val.push(val_loss);
    }

    pub fn train(&self) -> &[f32] {
        &self.train
    }

    pub fn val(&self) -> &[f32] {
        &self.val
    }

    /// Returns the amount of recorded epochs.
    pub fn len(&self) -> usize {
        self.val.len()
    }

    pub fn is_empty(&self) -> bool {
        self.val.is_empty()
    }

    /// Returns the lowest validation loss seen so far.
    pub fn best_val_loss(&self) -> Option<f32> {
        self.best().map(|(_, loss)| loss)
    }

    /// Returns the first epoch with the lowest validation loss along with that loss.
    pub fn best(&self) -> Option<(usize, f32)> {
        self.val
            .iter()
            .copied()
            .enumerate()
            .fold(None, |best, (epoch, loss)| match best {
                Some((_, best_loss)) if loss >= best_loss => best,
                _ => Some((epoch, loss)),
            })
    }
}

/// The result of a training invocation.
#[derive(Debug, Clone)]
pub struct TrainingOutcome<M> {
    /// The model as it was after the last epoch.
    pub model: M,
    /// The parameters with the lowest validation loss.
    pub best: Snapshot,
    pub history: LossHistory,
}

impl<M: DensityModel> TrainingOutcome<M> {
    /// Returns the model with the best parameters restored.
    pub fn into_best_model(mut self) -> Result<M> {
        self.best.restore_into(&mut self.model)?;
        Ok(self.model)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn best_keeps_the_first_of_ties() {
        let mut history = LossHistory::with_capacity(4);
        history.push(3.0, 2.0);
        history.push(2.0, 1.0);
        history.push(1.0, 1.0);
        history.push(0.5, 1.5);

        assert_eq!(history.len(), 4);
        assert_eq!(history.best(), Some((1, 1.0)));
        assert_eq!(history.best_val_loss(), Some(1.0));
    }

    #[test]
    fn empty_history_has_no_best() {
        assert_eq!(LossHistory::default().best(), None);
    }
}
