use ml_core::{DensityModel, Mode};
use ndarray::{Array1, Array2, ArrayView1, ArrayView2, Axis, Zip};
use rand::Rng;

use crate::{MlError, Result};

/// Restricts an unbounded flow to a box `(low, high)`.
///
/// Points are mapped to the real line with `y = logit((x - low) / (high - low))`
/// before reaching the inner flow, and the log-Jacobian of that map is added to
/// the inner log-density. The map has no parameters, so gradients are the inner
/// flow's ones evaluated at `y`.
#[derive(Debug, Clone)]
pub struct BoundedFlow<F> {
    inner: F,
    low: Array1<f32>,
    high: Array1<f32>,
}

impl<F: DensityModel> BoundedFlow<F> {
    /// Creates a new `BoundedFlow`.
    ///
    /// # Arguments
    /// * `inner` - The flow over the unbounded space.
    /// * `bounds` - The `(low, high)` bounds of every dimension.
    ///
    /// # Errors
    /// Returns an error if there are not as many bounds as dimensions or if any bound
    /// is empty or not finite.
    pub fn new(inner: F, bounds: &[(f32, f32)]) -> Result<Self> {
        if bounds.len() != inner.dim() {
            return Err(MlError::SizeMismatch {
                what: "bounds",
                got: bounds.len(),
                expected: inner.dim(),
            });
        }

        for (i, &(low, high)) in bounds.iter().enumerate() {
            if !(low.is_finite() && high.is_finite() && low < high) {
                return Err(MlError::InvalidConfig(format!(
                    "dimension {i} has invalid bounds ({low}, {high})"
                )));
            }
        }

        let (low, high): (Vec<_>, Vec<_>) = bounds.iter().copied().unzip();

        Ok(Self {
            inner,
            low: Array1::from(low),
            high: Array1::from(high),
        })
    }

    pub fn inner(&self) -> &F {
        &self.inner
    }

    /// Maps bounded points to the unbounded space, returning them along with the
    /// log-Jacobian of the map for each point.
    fn unbound(&self, points: ArrayView2<f32>) -> Result<(Array2<f32>, Array1<f32>)> {
        let dim = self.inner.dim();
        if points.ncols() != dim {
            return Err(MlError::SizeMismatch {
                what: "point dimension",
                got: points.ncols(),
                expected: dim,
            });
        }

        let mut y = Array2::<f32>::zeros(points.raw_dim());
        let mut log_det = Array1::<f32>::zeros(points.nrows());

        for ((mut y_row, x_row), row_log_det) in y
            .axis_iter_mut(Axis(0))
            .zip(points.axis_iter(Axis(0)))
            .zip(log_det.iter_mut())
        {
            for (d, (y_d, &x)) in y_row.iter_mut().zip(x_row).enumerate() {
                let (low, high) = (self.low[d], self.high[d]);
                if !(x > low && x < high) {
                    return Err(MlError::OutOfSupport { dim: d, value: x });
                }

                let width = high - low;
                let u = (x - low) / width;
                *y_d = u.ln() - (-u).ln_1p();
                *row_log_det -= u.ln() + (-u).ln_1p() + width.ln();
            }
        }

        Ok((y, log_det))
    }
}

impl<F: DensityModel> DensityModel for BoundedFlow<F> {
    fn dim(&self) -> usize {
        self.inner.dim()
    }

    fn params(&self) -> &[f32] {
        self.inner.params()
    }

    fn params_mut(&mut self) -> &mut [f32] {
        self.inner.params_mut()
    }

    fn mode(&self) -> Mode {
        self.inner.mode()
    }

    fn set_mode(&mut self, mode: Mode) {
        self.inner.set_mode(mode);
    }

    fn log_prob(&self, points: ArrayView2<f32>) -> Result<Array1<f32>> {
        let (y, log_det) = self.unbound(points)?;
        Ok(self.inner.log_prob(y.view())? + log_det)
    }

    fn backward(
        &self,
        points: ArrayView2<f32>,
        d_log_prob: ArrayView1<f32>,
        grad: &mut [f32],
    ) -> Result<()> {
        let (y, _) = self.unbound(points)?;
        self.inner.backward(y.view(), d_log_prob, grad)
    }

    fn sample<R: Rng + ?Sized>(&self, n: usize, rng: &mut R) -> Array2<f32> {
        let mut x = self.inner.sample(n, rng);

        for mut row in x.axis_iter_mut(Axis(0)) {
            Zip::from(&mut row)
                .and(&self.low)
                .and(&self.high)
                .for_each(|x, &low, &high| {
                    // The sigmoid saturates in f32, keep samples inside the open box.
                    let v = low + (high - low) / (1.0 + (-*x).exp());
                    *x = v.clamp(low.next_up(), high.next_down());
                });
        }

        x
    }
}

#[cfg(test)]
mod tests {
    use approx::assert_abs_diff_eq;
    use ndarray::array;
    use rand::{SeedableRng, rngs::StdRng};

    use super::*;
    use crate::arch::flows::AffineFlow;

    #[test]
    fn log_prob_adds_the_logit_jacobian() {
        let flow = BoundedFlow::new(AffineFlow::new(1), &[(0.0, 2.0)]).unwrap();
        let points = array![[1.0]];

        // u = 0.5, y = 0, |dy/dx| = 1 / (u (1 - u) width) = 2.
        let log_prob = flow.log_prob(points.view()).unwrap();
        let inner = flow.inner().log_prob(array![[0.0]].view()).unwrap();

        assert_abs_diff_eq!(log_prob[0], inner[0] + 2.0f32.ln(), epsilon = 1e-6);
    }

    #[test]
    fn points_outside_the_bounds_fail() {
        let flow = BoundedFlow::new(AffineFlow::new(2), &[(0.0, 1.0), (-1.0, 1.0)]).unwrap();
        let points = array![[0.5, 0.0], [0.5, 1.0]];

        assert!(matches!(
            flow.log_prob(points.view()),
            Err(MlError::OutOfSupport { dim: 1, .. })
        ));
    }

    #[test]
    fn samples_stay_inside_the_bounds() {
        let inner = AffineFlow::with_params(&[0.0, 3.0], &[1.0, 0.5]).unwrap();
        let flow = BoundedFlow::new(inner, &[(-1.0, 1.0), (10.0, 20.0)]).unwrap();
        let mut rng = StdRng::seed_from_u64(3);

        let samples = flow.sample(1_000, &mut rng);

        for row in samples.axis_iter(Axis(0)) {
            assert!(row[0] > -1.0 && row[0] < 1.0);
            assert!(row[1] > 10.0 && row[1] < 20.0);
        }
    }

    #[test]
    fn saturated_samples_remain_in_support() {
        let inner = AffineFlow::with_params(&[200.0, -200.0], &[0.0, 0.0]).unwrap();
        let flow = BoundedFlow::new(inner, &[(0.0, 1.0), (0.0, 1.0)]).unwrap();
        let mut rng = StdRng::seed_from_u64(5);

        let samples = flow.sample(100, &mut rng);

        for row in samples.axis_iter(Axis(0)) {
            assert!(row[0] > 0.0 && row[0] < 1.0);
            assert!(row[1] > 0.0 && row[1] < 1.0);
        }
        assert!(flow.log_prob(samples.view()).is_ok());
    }

    #[test]
    fn invalid_bounds_are_rejected() {
        assert!(BoundedFlow::new(AffineFlow::new(1), &[(1.0, 1.0)]).is_err());
        assert!(BoundedFlow::new(AffineFlow::new(2), &[(0.0, 1.0)]).is_err());
    }

    #[test]
    fn backward_delegates_on_the_unbounded_points() {
        let flow = BoundedFlow::new(AffineFlow::new(1), &[(0.0, 4.0)]).unwrap();
        let points = array![[3.0]];
        let d = array![1.0];

        let mut grad = vec![0.0; 2];
        flow.backward(points.view(), d.view(), &mut grad).unwrap();

        // y = logit(0.75) = ln 3
        let y = 3.0f32.ln();
        assert_abs_diff_eq!(grad[0], y, epsilon = 1e-5);
        assert_abs_diff_eq!(grad[1], y * y - 1.0, epsilon = 1e-5);
    }
}
