use std::iter::FusedIterator;

use crate::dataset::{ArrayIndices, ArrayShape};

use super::{
    linear_index, ArraySubset, IncompatibleArraySubsetAndShapeError,
    IncompatibleDimensionalityError,
};

/// Element indices of an array subset in row-major order.
pub(crate) struct IndicesIterator {
    subset: ArraySubset,
    position: u64,
    length: u64,
}

impl IndicesIterator {
    pub(crate) fn new(subset: ArraySubset) -> Self {
        let length = subset.num_elements();
        Self {
            subset,
            position: 0,
            length,
        }
    }
}

impl Iterator for IndicesIterator {
    type Item = ArrayIndices;

    fn next(&mut self) -> Option<Self::Item> {
        if self.position >= self.length {
            return None;
        }
        let mut remainder = self.position;
        let mut indices = self.subset.start().to_vec();
        for (index, &extent) in indices.iter_mut().zip(self.subset.shape()).rev() {
            *index += remainder % extent;
            remainder /= extent;
        }
        self.position += 1;
        Some(indices)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = usize::try_from(self.length - self.position).unwrap_or(usize::MAX);
        (remaining, Some(remaining))
    }
}

impl ExactSizeIterator for IndicesIterator {}

impl FusedIterator for IndicesIterator {}

/// The runs of consecutive elements that make up an array subset of a row-major array.
///
/// Each run is `(linear element offset, element count)`.
/// Trailing dimensions spanned in full by the subset collapse into the run length.
pub(crate) struct ContiguousRuns {
    /// Start positions of the runs, over the leading dimensions that do not collapse.
    outer: ArraySubset,
    /// Start of the run within the collapsed trailing dimensions.
    inner_start: ArrayIndices,
    run_length: u64,
    array_shape: ArrayShape,
}

impl ContiguousRuns {
    pub(crate) fn new(
        subset: &ArraySubset,
        array_shape: &[u64],
    ) -> Result<Self, IncompatibleArraySubsetAndShapeError> {
        if !subset.inbounds(array_shape) {
            return Err(IncompatibleArraySubsetAndShapeError::new(
                subset.clone(),
                array_shape.to_vec(),
            ));
        }

        // walk in from the last dimension until the subset stops covering the array
        let mut run_length = 1;
        let mut split = subset.dimensionality();
        for (&size, &extent) in std::iter::zip(subset.shape(), array_shape).rev() {
            run_length *= size;
            split -= 1;
            if size != extent {
                break;
            }
        }

        let outer = if subset.is_empty() {
            ArraySubset::new_with_shape(vec![0])
        } else {
            ArraySubset::new_with_start_shape_unchecked(
                subset.start()[..split].to_vec(),
                subset.shape()[..split].to_vec(),
            )
        };
        Ok(Self {
            outer,
            inner_start: subset.start()[split..].to_vec(),
            run_length,
            array_shape: array_shape.to_vec(),
        })
    }

    pub(crate) fn iter(&self) -> impl Iterator<Item = (u64, u64)> + '_ {
        self.outer.indices().map(|mut indices| {
            indices.extend_from_slice(&self.inner_start);
            (linear_index(&indices, &self.array_shape), self.run_length)
        })
    }
}

impl<'a> IntoIterator for &'a ContiguousRuns {
    type Item = (u64, u64);
    type IntoIter = Box<dyn Iterator<Item = (u64, u64)> + 'a>;

    fn into_iter(self) -> Self::IntoIter {
        Box::new(self.iter())
    }
}

/// The chunks of a regular grid intersecting an array subset.
///
/// Chunks are visited in row-major order of their grid indices.
/// Every chunk has the full chunk shape, so chunks at the edge of the subset extend beyond it.
///
/// For a 4x3 array subset and 2x2 chunks, the items are
/// ```text
/// [0, 0]  start [0, 0] shape [2, 2]
/// [0, 1]  start [0, 2] shape [2, 2]
/// [1, 0]  start [2, 0] shape [2, 2]
/// [1, 1]  start [2, 2] shape [2, 2]
/// ```
#[derive(Debug, Clone)]
pub struct Chunks {
    grid_subset: ArraySubset,
    chunk_shape: ArrayShape,
}

impl Chunks {
    /// Create the chunks of `chunk_shape` intersecting `subset`.
    ///
    /// A zero chunk extent yields no chunks.
    ///
    /// # Errors
    /// Returns [`IncompatibleDimensionalityError`] if `chunk_shape` has a different dimensionality to `subset`.
    pub fn new(
        subset: &ArraySubset,
        chunk_shape: &[u64],
    ) -> Result<Self, IncompatibleDimensionalityError> {
        if subset.dimensionality() != chunk_shape.len() {
            return Err(IncompatibleDimensionalityError::new(
                chunk_shape.len(),
                subset.dimensionality(),
            ));
        }
        let grid_subset = match subset.end_inc() {
            Some(last) if !chunk_shape.contains(&0) => {
                let first_chunk = std::iter::zip(subset.start(), chunk_shape)
                    .map(|(start, chunk)| start / chunk)
                    .collect();
                let last_chunk: ArrayIndices = std::iter::zip(last, chunk_shape)
                    .map(|(last, chunk)| last / chunk + 1)
                    .collect();
                ArraySubset::from_start_end(first_chunk, &last_chunk)
            }
            _ => ArraySubset::new_with_shape(vec![0; subset.dimensionality()]),
        };
        Ok(Self {
            grid_subset,
            chunk_shape: chunk_shape.to_vec(),
        })
    }

    /// The chunk grid indices covered, as a subset of the chunk grid.
    #[must_use]
    pub fn grid_subset(&self) -> &ArraySubset {
        &self.grid_subset
    }

    /// The number of chunks.
    #[must_use]
    pub fn len(&self) -> usize {
        self.grid_subset.num_elements_usize()
    }

    /// Returns true if there are no chunks.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Iterate over `(chunk indices, chunk subset)` pairs.
    #[must_use]
    pub fn iter(&self) -> ChunksIterator<'_> {
        self.into_iter()
    }
}

impl<'a> IntoIterator for &'a Chunks {
    type Item = (ArrayIndices, ArraySubset);
    type IntoIter = ChunksIterator<'a>;

    fn into_iter(self) -> Self::IntoIter {
        ChunksIterator {
            grid_indices: self.grid_subset.indices(),
            chunk_shape: &self.chunk_shape,
        }
    }
}

/// An iterator over [`Chunks`].
pub struct ChunksIterator<'a> {
    grid_indices: IndicesIterator,
    chunk_shape: &'a [u64],
}

impl Iterator for ChunksIterator<'_> {
    type Item = (ArrayIndices, ArraySubset);

    fn next(&mut self) -> Option<Self::Item> {
        let chunk_indices = self.grid_indices.next()?;
        let start = std::iter::zip(&chunk_indices, self.chunk_shape)
            .map(|(index, chunk)| index * chunk)
            .collect();
        let chunk_subset =
            ArraySubset::new_with_start_shape_unchecked(start, self.chunk_shape.to_vec());
        Some((chunk_indices, chunk_subset))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.grid_indices.size_hint()
    }
}

impl ExactSizeIterator for ChunksIterator<'_> {}

impl FusedIterator for ChunksIterator<'_> {}
