use ndarray::{Array1, ArrayView1};

use super::LossFn;
use crate::{MlError, Result};

/// Importance-weighted negative log-likelihood.
///
/// `loss = -Σ(ℓ_i * w_i) / Σw_i`, so a batch dominated by near-zero weights moves the
/// parameters proportionally less. With unit weights it is the plain mean NLL.
#[derive(Debug, Default, Clone, Copy)]
pub struct WeightedNll;

impl WeightedNll {
    /// Returns a new `WeightedNll`.
    pub fn new() -> Self {
        Self
    }

    /// Validates the batch and returns the total weight.
    fn weight_sum(log_prob: ArrayView1<f32>, weights: ArrayView1<f32>) -> Result<f32> {
        if log_prob.len() != weights.len() {
            return Err(MlError::SizeMismatch {
                what: "weights",
                got: weights.len(),
                expected: log_prob.len(),
            });
        }

        let sum = weights.sum();
        if !(sum.is_finite() && sum > 0.0) {
            return Err(MlError::DegenerateWeights { sum });
        }

        Ok(sum)
    }
}

impl LossFn for WeightedNll {
    fn loss(&self, log_prob: ArrayView1<f32>, weights: ArrayView1<f32>) -> Result<f32> {
        let sum = Self::weight_sum(log_prob, weights)?;
        Ok(-log_prob.dot(&weights) / sum)
    }

    fn loss_prime(
        &self,
        log_prob: ArrayView1<f32>,
        weights: ArrayView1<f32>,
    ) -> Result<Array1<f32>> {
        let sum = Self::weight_sum(log_prob, weights)?;
        Ok(weights.mapv(|w| -w / sum))
    }
}
