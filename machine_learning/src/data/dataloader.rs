use std::{num::NonZeroUsize, ops::Range};

use super::dataset::{Batch, SampleSource, check_range};
use crate::Result;

/// Returns the amount of batches of at most `batch_size` samples needed to cover `len`.
#[inline]
pub fn num_batches(len: usize, batch_size: NonZeroUsize) -> usize {
    len.div_ceil(batch_size.get())
}

/// A single pass over a range of a sample source, in contiguous batches.
///
/// Every batch has `batch_size` samples except maybe the last one. A new pass needs
/// a new `Batches`.
#[derive(Debug)]
pub struct Batches<'a, S: ?Sized> {
    source: &'a S,
    cursor: usize,
    end: usize,
    batch_size: NonZeroUsize,
}

impl<'a, S: SampleSource + ?Sized> Batches<'a, S> {
    /// Creates a new `Batches` iterator.
    ///
    /// # Arguments
    /// * `source` - The samples to iterate.
    /// * `range` - The rows of `source` to go through.
    /// * `batch_size` - The maximum amount of samples per batch.
    ///
    /// # Errors
    /// Returns an error if `range` is out of the source's bounds.
    pub fn new(source: &'a S, range: Range<usize>, batch_size: NonZeroUsize) -> Result<Self> {
        check_range(&range, source.len())?;

        Ok(Self {
            source,
            cursor: range.start,
            end: range.end,
            batch_size,
        })
    }
}

impl<'a, S: SampleSource + ?Sized> Iterator for Batches<'a, S> {
    type Item = Result<Batch<'a>>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.cursor >= self.end {
            return None;
        }

        let end = (self.cursor + self.batch_size.get()).min(self.end);
        let batch = self.source.rows(self.cursor..end);

        self.cursor = end;
        Some(batch)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let n = num_batches(self.end.saturating_sub(self.cursor), self.batch_size);
        (n, Some(n))
    }
}

impl<S: SampleSource + ?Sized> ExactSizeIterator for Batches<'_, S> {}

#[cfg(test)]
mod tests {
    use ndarray::array;

    use super::*;
    use crate::data::Dataset;

    fn dataset(n: usize) -> Dataset {
        Dataset::from_flat(
            (0..n).map(|i| i as f32).collect(),
            1,
            (0..n).map(|i| (i as f32) + 100.0).collect(),
        )
        .unwrap()
    }

    #[test]
    fn batches_respect_range_and_batch_size() {
        let ds = dataset(10);
        let mut batches = Batches::new(&ds, 4..7, NonZeroUsize::new(2).unwrap()).unwrap();

        assert_eq!(batches.len(), 2);

        let b1 = batches.next().unwrap().unwrap();
        assert_eq!(b1.points(), array![[4.0], [5.0]]);
        assert_eq!(b1.weights(), array![104.0, 105.0]);

        let b2 = batches.next().unwrap().unwrap();
        assert_eq!(b2.points(), array![[6.0]]);

        assert!(batches.next().is_none());
    }

    #[test]
    fn batches_cover_the_partition() {
        let ds = dataset(23);

        for bs in 1..=25 {
            let batch_size = NonZeroUsize::new(bs).unwrap();
            let sizes: Vec<_> = Batches::new(&ds, 0..23, batch_size)
                .unwrap()
                .map(|b| b.unwrap().len())
                .collect();

            assert_eq!(sizes.len(), num_batches(23, batch_size));
            assert_eq!(sizes.len(), 23usize.div_ceil(bs));
            assert_eq!(sizes.iter().sum::<usize>(), 23);

            let (last, full) = sizes.split_last().unwrap();
            assert!(full.iter().all(|&s| s == bs));
            assert!(*last <= bs);
        }
    }

    #[test]
    fn out_of_bounds_range_fails() {
        let ds = dataset(3);
        assert!(Batches::new(&ds, 0..4, NonZeroUsize::new(2).unwrap()).is_err());
    }
}
