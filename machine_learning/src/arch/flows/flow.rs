use ml_core::{DensityModel, Mode};
use ndarray::{Array1, Array2, ArrayView1, ArrayView2};
use rand::Rng;

use super::{AffineFlow, BoundedFlow};
use crate::Result;

/// A flow selected at runtime from a `FlowSpec`.
#[derive(Debug, Clone)]
pub enum Flow {
    Affine(AffineFlow),
    Bounded(BoundedFlow<AffineFlow>),
}
use Flow::*;

impl Flow {
    /// Returns a stable identifier for the flow kind.
    pub fn kind(&self) -> &'static str {
        match self {
            Affine(_) => "affine",
            Bounded(_) => "bounded_affine",
        }
    }
}

impl DensityModel for Flow {
    fn dim(&self) -> usize {
        match self {
            Affine(f) => f.dim(),
            Bounded(f) => f.dim(),
        }
    }

    fn params(&self) -> &[f32] {
        match self {
            Affine(f) => f.params(),
            Bounded(f) => f.params(),
        }
    }

    fn params_mut(&mut self) -> &mut [f32] {
        match self {
            Affine(f) => f.params_mut(),
            Bounded(f) => f.params_mut(),
        }
    }

    fn mode(&self) -> Mode {
        match self {
            Affine(f) => f.mode(),
            Bounded(f) => f.mode(),
        }
    }

    fn set_mode(&mut self, mode: Mode) {
        match self {
            Affine(f) => f.set_mode(mode),
            Bounded(f) => f.set_mode(mode),
        }
    }

    fn log_prob(&self, points: ArrayView2<f32>) -> Result<Array1<f32>> {
        match self {
            Affine(f) => f.log_prob(points),
            Bounded(f) => f.log_prob(points),
        }
    }

    fn backward(
        &self,
        points: ArrayView2<f32>,
        d_log_prob: ArrayView1<f32>,
        grad: &mut [f32],
    ) -> Result<()> {
        match self {
            Affine(f) => f.backward(points, d_log_prob, grad),
            Bounded(f) => f.backward(points, d_log_prob, grad),
        }
    }

    fn sample<R: Rng + ?Sized>(&self, n: usize, rng: &mut R) -> Array2<f32> {
        match self {
            Affine(f) => f.sample(n, rng),
            Bounded(f) => f.sample(n, rng),
        }
    }
}
