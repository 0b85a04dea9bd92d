//! The regular chunk grid of a chunked dataset.
//!
//! Every chunk has the same shape.
//! Chunks at the upper edge of the dataset may extend beyond it, the elements outside of the dataset are stored as zeros.

use thiserror::Error;

use crate::array_subset::{ArraySubset, IncompatibleDimensionalityError};

use super::{ArrayIndices, ArrayShape};

/// An invalid chunk indices error.
#[derive(Debug, Error)]
#[error("chunk grid indices {0:?} are invalid for a chunk grid with shape {1:?}")]
pub struct InvalidChunkGridIndicesError(ArrayIndices, ArrayShape);

/// A regular chunk grid over a dataset.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegularChunkGrid {
    array_shape: ArrayShape,
    chunk_shape: ArrayShape,
    grid_shape: ArrayShape,
}

impl RegularChunkGrid {
    /// Create a new regular chunk grid with chunk shape `chunk_shape` over an array with `array_shape`.
    ///
    /// # Errors
    /// Returns [`IncompatibleDimensionalityError`] if `chunk_shape` and `array_shape` differ in dimensionality.
    pub fn new(
        array_shape: ArrayShape,
        chunk_shape: ArrayShape,
    ) -> Result<Self, IncompatibleDimensionalityError> {
        if array_shape.len() != chunk_shape.len() {
            return Err(IncompatibleDimensionalityError::new(
                chunk_shape.len(),
                array_shape.len(),
            ));
        }
        let grid_shape = std::iter::zip(&array_shape, &chunk_shape)
            .map(|(a, c)| if *c == 0 { 0 } else { a.div_ceil(*c) })
            .collect();
        Ok(Self {
            array_shape,
            chunk_shape,
            grid_shape,
        })
    }

    /// Return the chunk shape.
    #[must_use]
    pub fn chunk_shape(&self) -> &[u64] {
        &self.chunk_shape
    }

    /// Return the array shape.
    #[must_use]
    pub fn array_shape(&self) -> &[u64] {
        &self.array_shape
    }

    /// Return the number of chunks along each dimension.
    #[must_use]
    pub fn grid_shape(&self) -> &[u64] {
        &self.grid_shape
    }

    /// Return the dimensionality of the grid.
    #[must_use]
    pub fn dimensionality(&self) -> usize {
        self.chunk_shape.len()
    }

    /// Return the total number of chunks.
    #[must_use]
    pub fn num_chunks(&self) -> u64 {
        self.grid_shape.iter().product()
    }

    /// Return the number of elements in a chunk.
    #[must_use]
    pub fn chunk_num_elements(&self) -> u64 {
        self.chunk_shape.iter().product()
    }

    /// Check that `chunk_indices` address a chunk in the grid.
    ///
    /// # Errors
    /// Returns [`InvalidChunkGridIndicesError`] if the dimensionality does not match or an index is out of bounds.
    pub fn validate_chunk_indices(
        &self,
        chunk_indices: &[u64],
    ) -> Result<(), InvalidChunkGridIndicesError> {
        if chunk_indices.len() == self.grid_shape.len()
            && std::iter::zip(chunk_indices, &self.grid_shape).all(|(i, g)| i < g)
        {
            Ok(())
        } else {
            Err(InvalidChunkGridIndicesError(
                chunk_indices.to_vec(),
                self.grid_shape.clone(),
            ))
        }
    }

    /// Return the subset of the array covered by the chunk at `chunk_indices`.
    ///
    /// The subset always has the chunk shape, and may extend beyond the array.
    ///
    /// # Errors
    /// Returns [`InvalidChunkGridIndicesError`] if `chunk_indices` are invalid.
    pub fn chunk_subset(
        &self,
        chunk_indices: &[u64],
    ) -> Result<ArraySubset, InvalidChunkGridIndicesError> {
        self.validate_chunk_indices(chunk_indices)?;
        let start = std::iter::zip(chunk_indices, &self.chunk_shape)
            .map(|(i, c)| i * c)
            .collect();
        Ok(ArraySubset::new_with_start_shape_unchecked(
            start,
            self.chunk_shape.clone(),
        ))
    }

    /// Return the subset of the chunk grid holding every chunk that intersects `array_subset`.
    ///
    /// # Errors
    /// Returns [`IncompatibleDimensionalityError`] if `array_subset` does not match the grid dimensionality.
    pub fn chunks_in_array_subset(
        &self,
        array_subset: &ArraySubset,
    ) -> Result<ArraySubset, IncompatibleDimensionalityError> {
        Ok(array_subset.chunks(&self.chunk_shape)?.grid_subset().clone())
    }
}
