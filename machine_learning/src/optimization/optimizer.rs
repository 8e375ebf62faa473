use crate::{MlError, Result};

/// Defines the strategy for updating model parameters based on calculated gradients.
pub trait Optimizer {
    /// Updates the parameters in place following the optimizer's learning rule.
    ///
    /// # Arguments
    /// * `params` - The parameters that are going to be modified.
    /// * `grad` - The gradient of the loss with respect to `params`.
    ///
    /// # Returns
    /// An error if there's a mismatch in the sizes of `params` and `grad`.
    fn update_params(&mut self, params: &mut [f32], grad: &[f32]) -> Result<()>;
}

impl<T: Optimizer + ?Sized> Optimizer for Box<T> {
    fn update_params(&mut self, params: &mut [f32], grad: &[f32]) -> Result<()> {
        (**self).update_params(params, grad)
    }
}

pub(super) fn check_sizes(params: &[f32], grad: &[f32], state: Option<usize>) -> Result<()> {
    if grad.len() != params.len() {
        return Err(MlError::SizeMismatch {
            what: "grad",
            got: grad.len(),
            expected: params.len(),
        });
    }

    match state {
        Some(len) if len != params.len() => Err(MlError::SizeMismatch {
            what: "optimizer state",
            got: len,
            expected: params.len(),
        }),
        _ => Ok(()),
    }
}
