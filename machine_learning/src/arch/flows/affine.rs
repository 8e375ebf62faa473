use std::f32::consts::PI;

use ml_core::{DensityModel, Mode};
use ndarray::{Array1, Array2, ArrayView1, ArrayView2, ArrayViewMut1, Axis};
use ndarray_rand::RandomExt;
use rand::Rng;
use rand_distr::StandardNormal;

use crate::{MlError, Result};

/// An elementwise affine normalizing flow onto a standard normal base.
///
/// Maps `x` to `z = (x - μ) * exp(-logσ)` dimension by dimension, so
/// `log p(x) = Σ_d [log N(z_d; 0, 1) - logσ_d]`.
///
/// The parameters are laid out as `[μ_0, ..., μ_{dim-1}, logσ_0, ..., logσ_{dim-1}]`.
#[derive(Debug, Clone)]
pub struct AffineFlow {
    dim: usize,
    params: Vec<f32>,
    mode: Mode,
}

impl AffineFlow {
    /// Creates a new `AffineFlow` initialized to the standard normal.
    ///
    /// # Arguments
    /// * `dim` - The dimension of the points.
    pub fn new(dim: usize) -> Self {
        Self {
            dim,
            params: vec![0.0; 2 * dim],
            mode: Mode::default(),
        }
    }

    /// Creates a new `AffineFlow` with the given location and log-scale.
    ///
    /// # Errors
    /// Returns `MlError::SizeMismatch` if `loc` and `log_scale` have different lengths.
    pub fn with_params(loc: &[f32], log_scale: &[f32]) -> Result<Self> {
        if loc.len() != log_scale.len() {
            return Err(MlError::SizeMismatch {
                what: "log_scale",
                got: log_scale.len(),
                expected: loc.len(),
            });
        }

        Ok(Self {
            dim: loc.len(),
            params: loc.iter().chain(log_scale).copied().collect(),
            mode: Mode::default(),
        })
    }

    pub fn loc(&self) -> ArrayView1<'_, f32> {
        ArrayView1::from(&self.params[..self.dim])
    }

    pub fn log_scale(&self) -> ArrayView1<'_, f32> {
        ArrayView1::from(&self.params[self.dim..])
    }

    /// Maps the points to the base space.
    fn normalize(&self, points: ArrayView2<f32>) -> Result<Array2<f32>> {
        if points.ncols() != self.dim {
            return Err(MlError::SizeMismatch {
                what: "point dimension",
                got: points.ncols(),
                expected: self.dim,
            });
        }

        let inv_scale = self.log_scale().mapv(|s| (-s).exp());
        Ok((&points - &self.loc()) * &inv_scale)
    }
}

impl DensityModel for AffineFlow {
    fn dim(&self) -> usize {
        self.dim
    }

    fn params(&self) -> &[f32] {
        &self.params
    }

    fn params_mut(&mut self) -> &mut [f32] {
        &mut self.params
    }

    fn mode(&self) -> Mode {
        self.mode
    }

    fn set_mode(&mut self, mode: Mode) {
        self.mode = mode;
    }

    fn log_prob(&self, points: ArrayView2<f32>) -> Result<Array1<f32>> {
        let z = self.normalize(points)?;
        let log_norm = -0.5 * self.dim as f32 * (2.0 * PI).ln() - self.log_scale().sum();

        Ok(z.map_axis(Axis(1), |row| log_norm - 0.5 * row.dot(&row)))
    }

    // With z = (x - μ) / σ:
    //   ∂ℓ/∂μ_d    = z_d / σ_d
    //   ∂ℓ/∂logσ_d = z_d² - 1
    fn backward(
        &self,
        points: ArrayView2<f32>,
        d_log_prob: ArrayView1<f32>,
        grad: &mut [f32],
    ) -> Result<()> {
        if d_log_prob.len() != points.nrows() {
            return Err(MlError::SizeMismatch {
                what: "log_prob derivative",
                got: d_log_prob.len(),
                expected: points.nrows(),
            });
        }

        if grad.len() != self.params.len() {
            return Err(MlError::SizeMismatch {
                what: "grad",
                got: grad.len(),
                expected: self.params.len(),
            });
        }

        let z = self.normalize(points)?;
        let inv_scale = self.log_scale().mapv(|s| (-s).exp());
        let d = d_log_prob.insert_axis(Axis(1));

        let (d_loc, d_log_scale) = grad.split_at_mut(self.dim);
        let mut d_loc = ArrayViewMut1::from(d_loc);
        let mut d_log_scale = ArrayViewMut1::from(d_log_scale);

        d_loc += &((&z * &d).sum_axis(Axis(0)) * &inv_scale);
        d_log_scale += &(z.mapv(|z| z * z - 1.0) * &d).sum_axis(Axis(0));

        Ok(())
    }

    fn sample<R: Rng + ?Sized>(&self, n: usize, rng: &mut R) -> Array2<f32> {
        let z = Array2::<f32>::random_using((n, self.dim), StandardNormal, rng);
        let scale = self.log_scale().mapv(f32::exp);

        z * &scale + &self.loc()
    }
}

#[cfg(test)]
mod tests {
    use approx::assert_abs_diff_eq;
    use ndarray::array;
    use rand::{SeedableRng, rngs::StdRng};

    use super::*;

    #[test]
    fn standard_normal_log_prob() {
        let flow = AffineFlow::new(2);
        let points = array![[0.0, 0.0], [1.0, -1.0]];

        let log_prob = flow.log_prob(points.view()).unwrap();
        let log_norm = -(2.0 * PI).ln();

        assert_abs_diff_eq!(log_prob[0], log_norm, epsilon = 1e-6);
        assert_abs_diff_eq!(log_prob[1], log_norm - 1.0, epsilon = 1e-6);
    }

    #[test]
    fn shifted_and_scaled_log_prob() {
        let flow = AffineFlow::with_params(&[1.0], &[2.0f32.ln()]).unwrap();
        let points = array![[3.0]];

        let log_prob = flow.log_prob(points.view()).unwrap();
        let expected = -0.5 * (2.0 * PI).ln() - 2.0f32.ln() - 0.5;

        assert_abs_diff_eq!(log_prob[0], expected, epsilon = 1e-6);
    }

    #[test]
    fn backward_matches_finite_differences() {
        let flow = AffineFlow::with_params(&[0.3, -0.2], &[0.1, -0.4]).unwrap();
        let points = array![[0.5, 1.0], [-1.0, 0.25], [2.0, -0.5]];
        let d = array![0.2, -0.7, 1.1];

        let mut grad = vec![0.0; 4];
        flow.backward(points.view(), d.view(), &mut grad).unwrap();

        let objective = |params: &[f32]| {
            let mut flow = flow.clone();
            flow.params_mut().copy_from_slice(params);
            flow.log_prob(points.view()).unwrap().dot(&d)
        };

        let eps = 1e-2;
        for i in 0..4 {
            let mut plus = flow.params().to_vec();
            let mut minus = flow.params().to_vec();
            plus[i] += eps;
            minus[i] -= eps;

            let numeric = (objective(&plus) - objective(&minus)) / (2.0 * eps);
            assert_abs_diff_eq!(grad[i], numeric, epsilon = 1e-2);
        }
    }

    #[test]
    fn backward_accumulates() {
        let flow = AffineFlow::new(1);
        let points = array![[1.0]];
        let d = array![1.0];

        let mut grad = vec![0.0; 2];
        flow.backward(points.view(), d.view(), &mut grad).unwrap();
        flow.backward(points.view(), d.view(), &mut grad).unwrap();

        assert_eq!(grad, [2.0, 0.0]);
    }

    #[test]
    fn samples_follow_the_parameters() {
        let flow = AffineFlow::with_params(&[5.0, -3.0], &[0.0, 1.0f32.ln()]).unwrap();
        let mut rng = StdRng::seed_from_u64(7);

        let samples = flow.sample(20_000, &mut rng);
        let mean = samples.mean_axis(Axis(0)).unwrap();

        assert_eq!(samples.dim(), (20_000, 2));
        assert_abs_diff_eq!(mean[0], 5.0, epsilon = 0.05);
        assert_abs_diff_eq!(mean[1], -3.0, epsilon = 0.05);
    }

    #[test]
    fn wrong_dimension_fails() {
        let flow = AffineFlow::new(2);
        let points = array![[1.0, 2.0, 3.0]];

        assert!(matches!(
            flow.log_prob(points.view()),
            Err(MlError::SizeMismatch { got: 3, expected: 2, .. })
        ));
    }
}
