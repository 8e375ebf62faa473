use std::ops::Range;

use crate::{MlError, Result};

/// Splits `total` samples into a training and a validation range.
///
/// Properties:
/// - The training range is the first `floor(total * train_fraction)` samples.
/// - Ranges are contiguous, disjoint and cover `[0..total)` in order.
///
/// # Errors
/// Returns an error if `train_fraction` is not strictly between 0 and 1 or if any of
/// the two ranges ends up empty.
pub fn split_range(total: usize, train_fraction: f32) -> Result<(Range<usize>, Range<usize>)> {
    if !(train_fraction > 0.0 && train_fraction < 1.0) {
        return Err(MlError::InvalidConfig(format!(
            "train fraction must be in (0, 1), got {train_fraction}"
        )));
    }

    let train_len = (total as f64 * train_fraction as f64).floor() as usize;

    if train_len == 0 {
        return Err(MlError::EmptyPartition { which: "training" });
    }

    if train_len == total {
        return Err(MlError::EmptyPartition { which: "validation" });
    }

    Ok((0..train_len, train_len..total))
}

/// The training and validation partitions of a sample source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Split {
    train: Range<usize>,
    validation: Range<usize>,
}

impl Split {
    /// Creates a new `Split` following `split_range`.
    pub fn new(total: usize, train_fraction: f32) -> Result<Self> {
        let (train, validation) = split_range(total, train_fraction)?;
        Ok(Self { train, validation })
    }

    #[inline]
    pub fn train(&self) -> Range<usize> {
        self.train.clone()
    }

    #[inline]
    pub fn validation(&self) -> Range<usize> {
        self.validation.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn split_is_disjoint_and_covers_everything() {
        for total in [2, 3, 10, 17, 101] {
            for fraction in [0.1, 0.5, 0.8, 0.95] {
                let Ok(split) = Split::new(total, fraction) else {
                    continue;
                };

                let (train, val) = (split.train(), split.validation());
                assert_eq!(train.start, 0);
                assert_eq!(train.end, val.start);
                assert_eq!(val.end, total);
                assert_eq!(train.len() + val.len(), total);

                let joined: Vec<_> = train.chain(val).collect();
                assert_eq!(joined, (0..total).collect::<Vec<_>>());
            }
        }
    }

    #[test]
    fn training_side_is_floored() {
        assert_eq!(split_range(10, 0.8).unwrap(), (0..8, 8..10));
        assert_eq!(split_range(7, 0.5).unwrap(), (0..3, 3..7));
    }

    #[test]
    fn empty_sides_fail() {
        assert!(matches!(
            split_range(3, 0.1),
            Err(MlError::EmptyPartition { which: "training" })
        ));
        assert!(matches!(
            split_range(1, 0.99),
            Err(MlError::EmptyPartition { .. })
        ));
    }

    #[test]
    fn fraction_out_of_range_fails() {
        assert!(matches!(split_range(10, 1.0), Err(MlError::InvalidConfig(_))));
        assert!(matches!(split_range(10, 0.0), Err(MlError::InvalidConfig(_))));
        assert!(split_range(10, f32::NAN).is_err());
    }
}
