//! Rectangular regions of a dataset.
//!
//! An [`ArraySubset`] is a start and shape in element coordinates.
//! Reads and writes are expressed as subsets, and the storage engine maps them to
//!  - byte ranges of a contiguous layout ([`ArraySubset::byte_ranges`]), or
//!  - the chunks they touch in a chunked layout ([`ArraySubset::chunks`]).

mod iterators;

pub use iterators::{Chunks, ChunksIterator};

use std::ops::Range;

use derive_more::Display;
use itertools::izip;
use thiserror::Error;

use crate::{
    byte_range::ByteRange,
    dataset::{ArrayIndices, ArrayShape},
};

use iterators::{ContiguousRuns, IndicesIterator};

/// A rectangular region with a `start` and `shape`.
#[derive(Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Debug, Display, Default)]
#[display("start {start:?} shape {shape:?}")]
pub struct ArraySubset {
    start: ArrayIndices,
    shape: ArrayShape,
}

/// Two operands disagree on the number of dimensions.
#[derive(Copy, Clone, Debug, Error, Eq, PartialEq)]
#[error("incompatible dimensionality {0}, expected {1}")]
pub struct IncompatibleDimensionalityError(usize, usize);

impl IncompatibleDimensionalityError {
    /// Create a new incompatible dimensionality error.
    #[must_use]
    pub const fn new(got: usize, expected: usize) -> Self {
        Self(got, expected)
    }
}

/// An array subset does not lie within an array shape.
#[derive(Clone, Debug, Error)]
#[error("array subset {0} is incompatible with array of shape {1:?}")]
pub struct IncompatibleArraySubsetAndShapeError(ArraySubset, ArrayShape);

impl IncompatibleArraySubsetAndShapeError {
    /// Create a new incompatible array subset and shape error.
    #[must_use]
    pub fn new(subset: ArraySubset, array_shape: ArrayShape) -> Self {
        Self(subset, array_shape)
    }
}

/// An error copying bytes between an array subset and its enclosing array.
#[derive(Clone, Debug, Error)]
pub enum ArrayStoreBytesError {
    /// The subset is outside the array.
    #[error(transparent)]
    InvalidArrayShape(#[from] IncompatibleArraySubsetAndShapeError),
    /// The subset bytes have the wrong length.
    #[error("expected subset bytes to have length {1}, got {0}")]
    InvalidSubsetBytes(usize, u64),
    /// The array bytes have the wrong length.
    #[error("expected array bytes to have length {1}, got {0}")]
    InvalidArrayBytes(usize, u64),
}

impl ArraySubset {
    /// Create an array subset with `shape` at the origin.
    #[must_use]
    pub fn new_with_shape(shape: ArrayShape) -> Self {
        Self {
            start: vec![0; shape.len()],
            shape,
        }
    }

    /// Create an array subset from a range per dimension.
    ///
    /// A range with `end < start` is empty.
    #[must_use]
    pub fn new_with_ranges(ranges: &[Range<u64>]) -> Self {
        let (start, shape) = ranges
            .iter()
            .map(|range| (range.start, range.end.saturating_sub(range.start)))
            .unzip();
        Self { start, shape }
    }

    /// Create an array subset from `start` and `shape`.
    ///
    /// # Errors
    /// Returns [`IncompatibleDimensionalityError`] if `start` and `shape` differ in length.
    pub fn new_with_start_shape(
        start: ArrayIndices,
        shape: ArrayShape,
    ) -> Result<Self, IncompatibleDimensionalityError> {
        if start.len() == shape.len() {
            Ok(Self { start, shape })
        } else {
            Err(IncompatibleDimensionalityError::new(
                start.len(),
                shape.len(),
            ))
        }
    }

    #[must_use]
    pub(crate) fn new_with_start_shape_unchecked(start: ArrayIndices, shape: ArrayShape) -> Self {
        debug_assert_eq!(start.len(), shape.len());
        Self { start, shape }
    }

    /// Subset from `start` up to `end` (exclusive), empty where `end <= start`.
    fn from_start_end(start: ArrayIndices, end: &[u64]) -> Self {
        let shape = std::iter::zip(&start, end)
            .map(|(&start, &end)| end.saturating_sub(start))
            .collect();
        Self { start, shape }
    }

    /// The start of the array subset.
    #[must_use]
    pub fn start(&self) -> &[u64] {
        &self.start
    }

    /// The shape of the array subset.
    #[must_use]
    pub fn shape(&self) -> &[u64] {
        &self.shape
    }

    /// The number of dimensions.
    #[must_use]
    pub fn dimensionality(&self) -> usize {
        self.start.len()
    }

    /// The exclusive end of the array subset.
    #[must_use]
    pub fn end_exc(&self) -> ArrayIndices {
        std::iter::zip(&self.start, &self.shape)
            .map(|(start, size)| start + size)
            .collect()
    }

    /// The inclusive end of the array subset, [`None`] if it is empty.
    #[must_use]
    pub fn end_inc(&self) -> Option<ArrayIndices> {
        (!self.is_empty()).then(|| {
            std::iter::zip(&self.start, &self.shape)
                .map(|(start, size)| start + size - 1)
                .collect()
        })
    }

    /// The product of the shape.
    #[must_use]
    pub fn num_elements(&self) -> u64 {
        self.shape.iter().product()
    }

    /// [`num_elements`](Self::num_elements) as a `usize`.
    ///
    /// # Panics
    /// Panics if the number of elements exceeds [`usize::MAX`].
    #[must_use]
    pub fn num_elements_usize(&self) -> usize {
        usize::try_from(self.num_elements()).unwrap()
    }

    /// Returns true if any extent is zero.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.shape.contains(&0)
    }

    /// Returns true if the array subset lies within an array of `array_shape`.
    #[must_use]
    pub fn inbounds(&self, array_shape: &[u64]) -> bool {
        self.dimensionality() == array_shape.len()
            && izip!(&self.start, &self.shape, array_shape).all(|(start, size, extent)| {
                start.checked_add(*size).is_some_and(|end| end <= *extent)
            })
    }

    /// The intersection of this array subset and `other`, possibly empty.
    ///
    /// # Errors
    /// Returns [`IncompatibleDimensionalityError`] if `other` has a different dimensionality.
    pub fn overlap(&self, other: &Self) -> Result<Self, IncompatibleDimensionalityError> {
        if other.dimensionality() != self.dimensionality() {
            return Err(IncompatibleDimensionalityError::new(
                other.dimensionality(),
                self.dimensionality(),
            ));
        }
        let start = std::iter::zip(&self.start, &other.start)
            .map(|(&a, &b)| a.max(b))
            .collect();
        let end: ArrayIndices = std::iter::zip(self.end_exc(), other.end_exc())
            .map(|(a, b)| a.min(b))
            .collect();
        Ok(Self::from_start_end(start, &end))
    }

    /// The array subset translated so that `origin` becomes the zero index.
    ///
    /// # Errors
    /// Returns [`IncompatibleDimensionalityError`] if `origin` has a different dimensionality.
    pub fn relative_to(&self, origin: &[u64]) -> Result<Self, IncompatibleDimensionalityError> {
        if origin.len() != self.dimensionality() {
            return Err(IncompatibleDimensionalityError::new(
                origin.len(),
                self.dimensionality(),
            ));
        }
        Ok(Self {
            start: std::iter::zip(&self.start, origin)
                .map(|(a, b)| a.saturating_sub(*b))
                .collect(),
            shape: self.shape.clone(),
        })
    }

    pub(crate) fn indices(&self) -> IndicesIterator {
        IndicesIterator::new(self.clone())
    }

    /// The chunks of a regular grid with `chunk_shape` that intersect this array subset.
    ///
    /// # Errors
    /// Returns [`IncompatibleDimensionalityError`] if `chunk_shape` has a different dimensionality.
    pub fn chunks(&self, chunk_shape: &[u64]) -> Result<Chunks, IncompatibleDimensionalityError> {
        Chunks::new(self, chunk_shape)
    }

    /// The byte ranges covered by this array subset in a row-major array of `array_shape` with `element_size` byte elements.
    ///
    /// Adjacent rows are merged when the subset spans the trailing dimensions.
    ///
    /// # Errors
    /// Returns [`IncompatibleArraySubsetAndShapeError`] if the subset is outside `array_shape`.
    pub fn byte_ranges(
        &self,
        array_shape: &[u64],
        element_size: usize,
    ) -> Result<Vec<ByteRange>, IncompatibleArraySubsetAndShapeError> {
        let element_size = element_size as u64;
        Ok(ContiguousRuns::new(self, array_shape)?
            .iter()
            .map(|(offset, length)| {
                ByteRange::FromStart(offset * element_size, Some(length * element_size))
            })
            .collect())
    }

    /// Copy the bytes of this array subset out of `bytes`, a row-major array of `array_shape`.
    ///
    /// # Errors
    /// Returns [`ArrayStoreBytesError`] if `bytes` does not match `array_shape` or the subset is outside it.
    ///
    /// # Panics
    /// Panics if a byte offset exceeds [`usize::MAX`].
    pub fn extract_bytes(
        &self,
        bytes: &[u8],
        array_shape: &[u64],
        element_size: usize,
    ) -> Result<Vec<u8>, ArrayStoreBytesError> {
        let element_size = element_size as u64;
        let array_size = array_shape.iter().product::<u64>() * element_size;
        if bytes.len() as u64 != array_size {
            return Err(ArrayStoreBytesError::InvalidArrayBytes(
                bytes.len(),
                array_size,
            ));
        }
        let runs = ContiguousRuns::new(self, array_shape)?;
        let mut subset_bytes =
            Vec::with_capacity(usize::try_from(self.num_elements() * element_size).unwrap());
        for (offset, length) in &runs {
            let run = byte_span(offset, length, element_size);
            subset_bytes.extend_from_slice(&bytes[run]);
        }
        Ok(subset_bytes)
    }

    /// Copy `subset_bytes`, the bytes of this array subset, into `array_bytes`, a row-major array of `array_shape`.
    ///
    /// # Errors
    /// Returns [`ArrayStoreBytesError`] if either buffer has the wrong length or the subset is outside `array_shape`.
    ///
    /// # Panics
    /// Panics if a byte offset exceeds [`usize::MAX`].
    pub fn store_bytes(
        &self,
        subset_bytes: &[u8],
        array_bytes: &mut [u8],
        array_shape: &[u64],
        element_size: usize,
    ) -> Result<(), ArrayStoreBytesError> {
        let element_size = element_size as u64;
        let subset_size = self.num_elements() * element_size;
        let array_size = array_shape.iter().product::<u64>() * element_size;
        if subset_bytes.len() as u64 != subset_size {
            return Err(ArrayStoreBytesError::InvalidSubsetBytes(
                subset_bytes.len(),
                subset_size,
            ));
        }
        if array_bytes.len() as u64 != array_size {
            return Err(ArrayStoreBytesError::InvalidArrayBytes(
                array_bytes.len(),
                array_size,
            ));
        }
        let mut remaining = subset_bytes;
        for (offset, length) in &ContiguousRuns::new(self, array_shape)? {
            let run = byte_span(offset, length, element_size);
            let (head, tail) = remaining.split_at(run.len());
            array_bytes[run].copy_from_slice(head);
            remaining = tail;
        }
        Ok(())
    }
}

/// The byte span of `length` elements at element `offset`.
fn byte_span(offset: u64, length: u64, element_size: u64) -> Range<usize> {
    let start = usize::try_from(offset * element_size).unwrap();
    let length = usize::try_from(length * element_size).unwrap();
    start..start + length
}

/// The row-major linear index of `indices` in an array of `array_shape`.
fn linear_index(indices: &[u64], array_shape: &[u64]) -> u64 {
    debug_assert_eq!(indices.len(), array_shape.len());
    std::iter::zip(indices, array_shape).fold(0, |index, (&i, &extent)| index * extent + i)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    #[allow(clippy::reversed_empty_ranges)]
    fn array_subset_construction() {
        assert!(ArraySubset::new_with_start_shape(vec![0, 0], vec![10, 10]).is_ok());
        assert!(ArraySubset::new_with_start_shape(vec![0, 0], vec![10]).is_err());
        let reversed = ArraySubset::new_with_ranges(&[3..1, 0..2]);
        assert_eq!(reversed.shape(), &[0, 2]);
        assert!(reversed.is_empty());
        assert_eq!(
            ArraySubset::new_with_shape(vec![2, 3]),
            ArraySubset::new_with_ranges(&[0..2, 0..3])
        );
    }

    #[test]
    fn array_subset_geometry() {
        let a = ArraySubset::new_with_ranges(&[1..5, 2..6]);
        let b = ArraySubset::new_with_ranges(&[3..6, 4..7]);
        assert_eq!(
            a.overlap(&b).unwrap(),
            ArraySubset::new_with_ranges(&[3..5, 4..6])
        );
        assert_eq!(
            a.relative_to(&[1, 1]).unwrap(),
            ArraySubset::new_with_ranges(&[0..4, 1..5])
        );
        assert!(a.relative_to(&[1, 1, 1]).is_err());
        assert!(a.overlap(&ArraySubset::new_with_ranges(&[0..1])).is_err());
        assert!(a.inbounds(&[10, 10]));
        assert!(!a.inbounds(&[2, 2]));
        assert!(!a.inbounds(&[10, 10, 10]));
        assert!(!ArraySubset::new_with_start_shape(vec![u64::MAX], vec![2])
            .unwrap()
            .inbounds(&[u64::MAX]));
        assert_eq!(a.end_exc(), vec![5, 6]);
        assert_eq!(a.end_inc(), Some(vec![4, 5]));
        assert_eq!(a.num_elements(), 16);
    }

    #[test]
    fn array_subset_disjoint_overlap() {
        let a = ArraySubset::new_with_ranges(&[0..2, 0..2]);
        let b = ArraySubset::new_with_ranges(&[4..6, 0..2]);
        let overlap = a.overlap(&b).unwrap();
        assert!(overlap.is_empty());
        assert_eq!(overlap.end_inc(), None);
    }

    #[test]
    fn array_subset_bytes() {
        let array_shape = vec![4, 4];
        let elements: Vec<u8> = (0..16).collect();
        let subset = ArraySubset::new_with_ranges(&[1..3, 1..3]);
        let bytes = subset.extract_bytes(&elements, &array_shape, 1).unwrap();
        assert_eq!(bytes, vec![5, 6, 9, 10]);

        let mut array = vec![0u8; 16];
        subset.store_bytes(&bytes, &mut array, &array_shape, 1).unwrap();
        assert_eq!(
            array,
            vec![0, 0, 0, 0, 0, 5, 6, 0, 0, 9, 10, 0, 0, 0, 0, 0]
        );

        assert!(subset.store_bytes(&bytes[1..], &mut array, &array_shape, 1).is_err());
        assert!(subset.extract_bytes(&elements[1..], &array_shape, 1).is_err());
        assert!(ArraySubset::new_with_ranges(&[3..5, 0..1])
            .extract_bytes(&elements, &array_shape, 1)
            .is_err());
    }

    #[test]
    fn array_subset_byte_ranges() {
        let subset = ArraySubset::new_with_ranges(&[1..3, 0..4]);
        assert_eq!(
            subset.byte_ranges(&[4, 4], 2).unwrap(),
            vec![ByteRange::FromStart(8, Some(16))]
        );
        let subset = ArraySubset::new_with_ranges(&[1..3, 1..3]);
        assert_eq!(
            subset.byte_ranges(&[4, 4], 4).unwrap(),
            vec![
                ByteRange::FromStart(20, Some(8)),
                ByteRange::FromStart(36, Some(8))
            ]
        );
    }

    #[test]
    fn array_subset_linear_index() {
        assert_eq!(linear_index(&[1, 2, 3], &[4, 5, 6]), 30 + 12 + 3);
        assert_eq!(linear_index(&[0], &[10]), 0);
        assert_eq!(linear_index(&[], &[]), 0);
    }
}
