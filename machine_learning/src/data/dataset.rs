use std::ops::Range;

use ndarray::{Array1, Array2, ArrayView1, ArrayView2, Axis, CowArray, Ix1, Ix2, s};
use serde::{Deserialize, Serialize};

use crate::{MlError, Result};

/// Random access to a sequence of weighted points.
pub trait SampleSource {
    /// Returns the amount of samples.
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns the dimension of every point.
    fn dim(&self) -> usize;

    /// Reads the samples in `range`, keeping their order.
    ///
    /// # Errors
    /// Returns `MlError` if the range is out of bounds or the backing store fails.
    fn rows(&self, range: Range<usize>) -> Result<Batch<'_>>;
}

/// A contiguous slice of weighted points.
///
/// In-memory sources lend their rows, file-backed ones hand out freshly read copies.
#[derive(Debug, Clone)]
pub struct Batch<'a> {
    points: CowArray<'a, f32, Ix2>,
    weights: CowArray<'a, f32, Ix1>,
}

impl<'a> Batch<'a> {
    pub fn borrowed(points: ArrayView2<'a, f32>, weights: ArrayView1<'a, f32>) -> Self {
        Self {
            points: points.into(),
            weights: weights.into(),
        }
    }

    pub fn owned(points: Array2<f32>, weights: Array1<f32>) -> Self {
        Self {
            points: points.into(),
            weights: weights.into(),
        }
    }

    #[inline]
    pub fn points(&self) -> ArrayView2<'_, f32> {
        self.points.view()
    }

    #[inline]
    pub fn weights(&self) -> ArrayView1<'_, f32> {
        self.weights.view()
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.weights.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.weights.is_empty()
    }

    /// Takes ownership of the rows, copying them if they were borrowed.
    pub fn into_owned(self) -> (Array2<f32>, Array1<f32>) {
        (self.points.into_owned(), self.weights.into_owned())
    }
}

/// What to do with samples whose weight is too small to carry any signal.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WeightPolicy {
    /// Keep every sample.
    #[default]
    Keep,
    /// Drop samples whose weight is below the smallest positive normal `f32`.
    DropSubnormal,
}

/// An in-memory set of points with one importance weight per point.
#[derive(Debug, Clone)]
pub struct Dataset {
    points: Array2<f32>,
    weights: Array1<f32>,
}

impl Dataset {
    /// Creates a new dataset.
    ///
    /// # Arguments
    /// * `points` - A `(n, dim)` matrix, one point per row.
    /// * `weights` - The `n` importance weights.
    ///
    /// # Errors
    /// Returns an error if the amount of weights differs from the amount of points or
    /// if any weight is negative or not finite.
    pub fn new(points: Array2<f32>, weights: Array1<f32>) -> Result<Self> {
        if points.nrows() != weights.len() {
            return Err(MlError::SizeMismatch {
                what: "weights",
                got: weights.len(),
                expected: points.nrows(),
            });
        }

        check_weights(weights.view())?;
        Ok(Self { points, weights })
    }

    /// Creates a new dataset from a row-major buffer of points.
    ///
    /// # Arguments
    /// * `data` - The coordinates of every point, one point after the other.
    /// * `dim` - The dimension of the points.
    /// * `weights` - The importance weight of each point.
    pub fn from_flat(data: Vec<f32>, dim: usize, weights: Vec<f32>) -> Result<Self> {
        if dim == 0 || data.len() % dim != 0 {
            return Err(MlError::SizeMismatch {
                what: "flat points",
                got: data.len(),
                expected: weights.len() * dim,
            });
        }

        let points = Array2::from_shape_vec((data.len() / dim, dim), data)
            .map_err(|_| MlError::InvalidInput("points are not a (n, dim) matrix"))?;

        Self::new(points, Array1::from(weights))
    }

    /// Creates a new dataset where every point weighs 1.
    pub fn unweighted(points: Array2<f32>) -> Self {
        let weights = Array1::ones(points.nrows());
        Self { points, weights }
    }

    pub fn points(&self) -> ArrayView2<'_, f32> {
        self.points.view()
    }

    pub fn weights(&self) -> ArrayView1<'_, f32> {
        self.weights.view()
    }

    /// Applies a weight policy, keeping the order of the surviving samples.
    ///
    /// # Returns
    /// The filtered dataset.
    pub fn with_policy(self, policy: WeightPolicy) -> Self {
        match policy {
            WeightPolicy::Keep => self,
            WeightPolicy::DropSubnormal => {
                let keep: Vec<_> = self
                    .weights
                    .iter()
                    .enumerate()
                    .filter(|&(_, &w)| w >= f32::MIN_POSITIVE)
                    .map(|(i, _)| i)
                    .collect();

                Self {
                    points: self.points.select(Axis(0), &keep),
                    weights: self.weights.select(Axis(0), &keep),
                }
            }
        }
    }
}

impl SampleSource for Dataset {
    fn len(&self) -> usize {
        self.weights.len()
    }

    fn dim(&self) -> usize {
        self.points.ncols()
    }

    fn rows(&self, range: Range<usize>) -> Result<Batch<'_>> {
        check_range(&range, self.len())?;

        let points = self.points.slice(s![range.clone(), ..]);
        let weights = self.weights.slice(s![range]);
        Ok(Batch::borrowed(points, weights))
    }
}

/// Rejects negative and non-finite weights.
pub(super) fn check_weights(weights: ArrayView1<f32>) -> Result<()> {
    if weights.iter().any(|w| !(w.is_finite() && *w >= 0.0)) {
        return Err(MlError::InvalidInput(
            "weights must be finite and non-negative",
        ));
    }

    Ok(())
}

pub(super) fn check_range(range: &Range<usize>, len: usize) -> Result<()> {
    if range.start > range.end || range.end > len {
        return Err(MlError::SizeMismatch {
            what: "row range end",
            got: range.end,
            expected: len,
        });
    }

    Ok(())
}
