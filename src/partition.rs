//! Row range partitioning.
//!
//! [`partition`] splits the leading dimension of a dataset with `extent` rows into `nproc` disjoint, covering and monotonically increasing row ranges.
//! Worker `p` receives the half-open range
//! ```text
//! [ floor(p * extent / nproc), floor((p + 1) * extent / nproc) )
//! ```
//! so the end of one range is exactly the start of the next and every row in `[0, extent)` belongs to exactly one worker.
//! When `extent < nproc` some workers receive an empty range, which is a valid no-op for reads and writes.

use std::ops::Range;

use derive_more::Display;
use thiserror::Error;

/// A contiguous span of rows along the leading dimension of a dataset.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash, Display)]
#[display("[{start}, {end})")]
pub struct RowRange {
    start: u64,
    end: u64,
}

/// A partitioning error.
#[derive(Copy, Clone, Debug, Error, Eq, PartialEq)]
pub enum PartitionError {
    /// The number of workers is zero.
    #[error("the number of workers must be at least one")]
    ZeroWorkers,
    /// The rank is not less than the number of workers.
    #[error("rank {rank} is out of range for {nproc} workers")]
    RankOutOfRange {
        /// The rank.
        rank: usize,
        /// The number of workers.
        nproc: usize,
    },
}

impl RowRange {
    /// Create a new row range `[start, end)`.
    ///
    /// An `end` less than `start` is clamped to an empty range at `start`.
    #[must_use]
    pub fn new(start: u64, end: u64) -> Self {
        Self {
            start,
            end: end.max(start),
        }
    }

    /// The first row.
    #[must_use]
    pub const fn start(&self) -> u64 {
        self.start
    }

    /// One past the last row.
    #[must_use]
    pub const fn end_exc(&self) -> u64 {
        self.end
    }

    /// The last row, or [`None`] if the range is empty.
    #[must_use]
    pub fn end_inc(&self) -> Option<u64> {
        self.end.checked_sub(1).filter(|&end| end >= self.start)
    }

    /// The number of rows.
    #[must_use]
    pub const fn len(&self) -> u64 {
        self.end - self.start
    }

    /// Returns true if the range holds no rows.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.end == self.start
    }

    /// Returns true if `row` lies within the range.
    #[must_use]
    pub const fn contains(&self, row: u64) -> bool {
        row >= self.start && row < self.end
    }

    /// Convert to a [`Range<u64>`].
    #[must_use]
    pub const fn to_range(&self) -> Range<u64> {
        self.start..self.end
    }
}

impl From<RowRange> for Range<u64> {
    fn from(rows: RowRange) -> Self {
        rows.to_range()
    }
}

impl From<Range<u64>> for RowRange {
    fn from(range: Range<u64>) -> Self {
        Self::new(range.start, range.end)
    }
}

fn boundary(rank: usize, nproc: usize, extent: u64) -> u64 {
    let boundary = (rank as u128 * u128::from(extent)) / nproc as u128;
    // boundary <= extent, so this never truncates
    u64::try_from(boundary).unwrap_or(extent)
}

/// Return the rows of `extent` assigned to worker `rank` of `nproc`.
///
/// # Errors
/// Returns a [`PartitionError`] if `nproc` is zero or `rank >= nproc`.
pub fn partition(rank: usize, nproc: usize, extent: u64) -> Result<RowRange, PartitionError> {
    if nproc == 0 {
        return Err(PartitionError::ZeroWorkers);
    }
    if rank >= nproc {
        return Err(PartitionError::RankOutOfRange { rank, nproc });
    }
    Ok(RowRange::new(
        boundary(rank, nproc, extent),
        boundary(rank + 1, nproc, extent),
    ))
}

/// Iterate over the row ranges of every worker `0..nproc`.
///
/// # Errors
/// Returns [`PartitionError::ZeroWorkers`] if `nproc` is zero.
pub fn partitions(
    nproc: usize,
    extent: u64,
) -> Result<impl ExactSizeIterator<Item = RowRange>, PartitionError> {
    if nproc == 0 {
        return Err(PartitionError::ZeroWorkers);
    }
    Ok((0..nproc).map(move |rank| {
        RowRange::new(
            boundary(rank, nproc, extent),
            boundary(rank + 1, nproc, extent),
        )
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partition_even() {
        let rows = partition(3, 8, 128).unwrap();
        assert_eq!(rows.start(), 48);
        assert_eq!(rows.end_exc(), 64);
        assert_eq!(rows.end_inc(), Some(63));
        assert_eq!(rows.len(), 16);
        assert!(rows.contains(50));
        assert!(!rows.contains(64));
        assert_eq!(rows.to_string(), "[48, 64)");
    }

    #[test]
    fn partition_uneven() {
        let ranges: Vec<_> = partitions(3, 10).unwrap().map(|r| r.to_range()).collect();
        assert_eq!(ranges, vec![0..3, 3..6, 6..10]);
    }

    #[test]
    fn partition_fewer_rows_than_workers() {
        let ranges: Vec<_> = partitions(4, 2).unwrap().collect();
        assert_eq!(ranges.iter().filter(|r| r.is_empty()).count(), 2);
        assert_eq!(ranges.iter().map(RowRange::len).sum::<u64>(), 2);
        let empty = ranges.iter().find(|r| r.is_empty()).unwrap();
        assert_eq!(empty.end_inc(), None);
    }

    #[test]
    fn partition_zero_rows() {
        let rows = partition(0, 1, 0).unwrap();
        assert!(rows.is_empty());
        assert_eq!(rows.end_inc(), None);
    }

    #[test]
    fn partition_invalid() {
        assert_eq!(partition(0, 0, 10), Err(PartitionError::ZeroWorkers));
        assert_eq!(
            partition(4, 4, 10),
            Err(PartitionError::RankOutOfRange { rank: 4, nproc: 4 })
        );
        assert!(partitions(0, 10).is_err());
    }

    #[test]
    fn partition_large_extent() {
        let rows = partition(1, 2, u64::MAX).unwrap();
        assert_eq!(rows.start(), u64::MAX / 2);
        assert_eq!(rows.end_exc(), u64::MAX);
    }

    #[test]
    fn partition_coverage() {
        for nproc in 1..=16 {
            for nrows in 0..=1000 {
                let mut next = 0;
                for (rank, rows) in partitions(nproc, nrows).unwrap().enumerate() {
                    assert_eq!(rows, partition(rank, nproc, nrows).unwrap());
                    assert_eq!(rows.start(), next);
                    next = rows.end_exc();
                }
                assert_eq!(next, nrows);
            }
        }
    }
}
