use ndarray::{Array1, ArrayView1, ArrayView2, Axis};

/// Per-dimension weighted mean and standard deviation of a set of points.
#[derive(Debug, Clone, PartialEq)]
pub struct Moments {
    pub mean: Array1<f32>,
    pub std: Array1<f32>,
}

/// Accumulates weighted first and second moments batch by batch.
#[derive(Debug, Clone)]
pub struct MomentsAccumulator {
    weight: f64,
    sum: Array1<f64>,
    sum_sq: Array1<f64>,
}

impl MomentsAccumulator {
    pub fn new(dim: usize) -> Self {
        Self {
            weight: 0.0,
            sum: Array1::zeros(dim),
            sum_sq: Array1::zeros(dim),
        }
    }

    /// Adds a batch of points with their weights.
    pub fn push(&mut self, points: ArrayView2<f32>, weights: ArrayView1<f32>) {
        for (row, &w) in points.axis_iter(Axis(0)).zip(weights) {
            let w = w as f64;
            self.weight += w;

            for ((s, sq), &x) in self.sum.iter_mut().zip(self.sum_sq.iter_mut()).zip(row) {
                let x = x as f64;
                *s += w * x;
                *sq += w * x * x;
            }
        }
    }

    /// Returns the accumulated moments, or `None` if nothing with weight was pushed.
    pub fn finish(&self) -> Option<Moments> {
        if self.weight <= 0.0 {
            return None;
        }

        let mean = &self.sum / self.weight;
        let var = (&self.sum_sq / self.weight - &mean * &mean).mapv(|v| v.max(0.0));

        Some(Moments {
            mean: mean.mapv(|m| m as f32),
            std: var.mapv(|v| v.sqrt() as f32),
        })
    }
}

impl Moments {
    /// Computes the unweighted moments of a set of points.
    pub fn of(points: ArrayView2<f32>) -> Option<Self> {
        let mut acc = MomentsAccumulator::new(points.ncols());
        acc.push(points, Array1::<f32>::ones(points.nrows()).view());
        acc.finish()
    }
}

#[cfg(test)]
mod tests {
    use approx::assert_abs_diff_eq;
    use ndarray::array;

    use super::*;

    #[test]
    fn weighted_moments() {
        let mut acc = MomentsAccumulator::new(1);
        acc.push(array![[0.0], [10.0]].view(), array![3.0, 1.0].view());
        acc.push(array![[100.0]].view(), array![0.0].view());

        let moments = acc.finish().unwrap();

        assert_abs_diff_eq!(moments.mean[0], 2.5, epsilon = 1e-6);
        assert_abs_diff_eq!(moments.std[0], 18.75f32.sqrt(), epsilon = 1e-5);
    }

    #[test]
    fn unweighted_moments() {
        let moments = Moments::of(array![[1.0, -1.0], [3.0, -1.0]].view()).unwrap();

        assert_eq!(moments.mean, array![2.0, -1.0]);
        assert_eq!(moments.std, array![1.0, 0.0]);
    }

    #[test]
    fn no_weight_has_no_moments() {
        assert!(MomentsAccumulator::new(2).finish().is_none());
    }
}
