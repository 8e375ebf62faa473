use ndarray::{Array1, ArrayView1};

use crate::Result;

/// A loss over the per-sample log-densities of a batch and their importance weights.
pub trait LossFn {
    /// Computes the scalar loss of a batch.
    ///
    /// # Arguments
    /// * `log_prob` - The log-density the model gives to each sample.
    /// * `weights` - The importance weight of each sample.
    fn loss(&self, log_prob: ArrayView1<f32>, weights: ArrayView1<f32>) -> Result<f32>;

    /// Computes the derivative of the loss with respect to each log-density.
    ///
    /// # Arguments
    /// * `log_prob` - The log-density the model gives to each sample.
    /// * `weights` - The importance weight of each sample.
    fn loss_prime(&self, log_prob: ArrayView1<f32>, weights: ArrayView1<f32>)
    -> Result<Array1<f32>>;
}
