//! Dataset layout descriptors.
//!
//! A [`LayoutDescriptor`] fixes how a dataset is materialised in its file: the shape, the element [`DataType`] and the [`StorageMode`].

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::{
    array_subset::IncompatibleDimensionalityError,
    metadata::Metadata,
    plugin::PluginCreateError,
};

use super::{
    chunk_grid::RegularChunkGrid,
    codec::{codec_from_metadata, ChunkCodecTraits},
    ArrayShape, DataType,
};

/// How dataset elements are laid out in the file.
///
/// Serialised as `"contiguous"` or `{"chunked": {"chunk_shape": [...], "codec": ...}}`.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum StorageMode {
    /// A single row-major block of `product(shape) * element_size` bytes.
    Contiguous,
    /// A regular grid of chunks, each stored as an independently addressable, optionally encoded, blob.
    Chunked {
        /// The shape of every chunk.
        chunk_shape: ArrayShape,
        /// The codec applied to each chunk, if any.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        codec: Option<Metadata>,
    },
}

/// The layout of a dataset.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct LayoutDescriptor {
    shape: ArrayShape,
    data_type: DataType,
    storage: StorageMode,
}

/// An invalid layout error.
#[derive(Debug, Error)]
pub enum InvalidLayoutError {
    /// A dataset must have at least one dimension.
    #[error("a dataset must have at least one dimension")]
    ZeroDimensional,
    /// The chunk shape dimensionality does not match the dataset dimensionality.
    #[error("chunk shape dimensionality: {0}")]
    IncompatibleDimensionality(#[from] IncompatibleDimensionalityError),
    /// A chunk extent is zero or larger than the dataset extent.
    #[error("chunk extent {chunk} is invalid for dimension {dimension} with extent {extent}")]
    InvalidChunkDimension {
        /// The dimension.
        dimension: usize,
        /// The chunk extent.
        chunk: u64,
        /// The dataset extent.
        extent: u64,
    },
    /// The codec is not registered or its configuration is invalid.
    #[error("unsupported codec: {0}")]
    UnsupportedCodec(#[from] PluginCreateError),
    /// The size of the dataset in bytes cannot be represented.
    #[error("the dataset size in bytes exceeds {}", u64::MAX)]
    TooLarge,
}

impl LayoutDescriptor {
    /// Create a contiguous layout.
    #[must_use]
    pub fn new_contiguous(shape: ArrayShape, data_type: DataType) -> Self {
        Self {
            shape,
            data_type,
            storage: StorageMode::Contiguous,
        }
    }

    /// Create a chunked layout with an optional `codec`.
    #[must_use]
    pub fn new_chunked(
        shape: ArrayShape,
        data_type: DataType,
        chunk_shape: ArrayShape,
        codec: Option<Metadata>,
    ) -> Self {
        Self {
            shape,
            data_type,
            storage: StorageMode::Chunked { chunk_shape, codec },
        }
    }

    /// Return the dataset shape.
    #[must_use]
    pub fn shape(&self) -> &[u64] {
        &self.shape
    }

    /// Return the element data type.
    #[must_use]
    pub const fn data_type(&self) -> DataType {
        self.data_type
    }

    /// Return the storage mode.
    #[must_use]
    pub const fn storage(&self) -> &StorageMode {
        &self.storage
    }

    /// Return the dimensionality of the dataset.
    #[must_use]
    pub fn dimensionality(&self) -> usize {
        self.shape.len()
    }

    /// Return the number of elements in the dataset.
    #[must_use]
    pub fn num_elements(&self) -> u64 {
        self.shape.iter().product()
    }

    /// Return the size of the dataset in bytes when laid out contiguously.
    #[must_use]
    pub fn nbytes(&self) -> u64 {
        self.num_elements() * self.data_type.size() as u64
    }

    /// Return the chunk shape of a chunked layout.
    #[must_use]
    pub fn chunk_shape(&self) -> Option<&[u64]> {
        match &self.storage {
            StorageMode::Contiguous => None,
            StorageMode::Chunked { chunk_shape, .. } => Some(chunk_shape),
        }
    }

    /// Return the number of chunks along each dimension of a chunked layout.
    #[must_use]
    pub fn chunk_grid_shape(&self) -> Option<ArrayShape> {
        self.chunk_grid().map(|chunk_grid| chunk_grid.grid_shape().to_vec())
    }

    /// Return the chunk grid of a chunked layout.
    #[must_use]
    pub fn chunk_grid(&self) -> Option<RegularChunkGrid> {
        self.chunk_shape().and_then(|chunk_shape| {
            RegularChunkGrid::new(self.shape.clone(), chunk_shape.to_vec()).ok()
        })
    }

    /// Return the codec metadata of a chunked layout.
    #[must_use]
    pub fn codec(&self) -> Option<&Metadata> {
        match &self.storage {
            StorageMode::Contiguous => None,
            StorageMode::Chunked { codec, .. } => codec.as_ref(),
        }
    }

    /// Create the codec of a chunked layout.
    ///
    /// # Errors
    /// Returns [`PluginCreateError`] if the codec metadata is not associated with a registered codec or its configuration is invalid.
    pub fn create_codec(&self) -> Result<Option<Box<dyn ChunkCodecTraits>>, PluginCreateError> {
        self.codec().map(codec_from_metadata).transpose()
    }

    /// Validate the layout.
    ///
    /// Chunk extents must be at least 1 and no larger than the dataset extent.
    /// A zero-length dataset dimension accepts a chunk extent of 1.
    ///
    /// # Errors
    /// Returns [`InvalidLayoutError`] if the layout is invalid.
    pub fn validate(&self) -> Result<(), InvalidLayoutError> {
        if self.shape.is_empty() {
            return Err(InvalidLayoutError::ZeroDimensional);
        }
        self.shape
            .iter()
            .try_fold(self.data_type.size() as u64, |acc, &extent| acc.checked_mul(extent))
            .ok_or(InvalidLayoutError::TooLarge)?;

        if let StorageMode::Chunked { chunk_shape, .. } = &self.storage {
            if chunk_shape.len() != self.shape.len() {
                return Err(IncompatibleDimensionalityError::new(
                    chunk_shape.len(),
                    self.shape.len(),
                )
                .into());
            }
            for (dimension, (&chunk, &extent)) in
                std::iter::zip(chunk_shape, &self.shape).enumerate()
            {
                if chunk == 0 || chunk > extent.max(1) {
                    return Err(InvalidLayoutError::InvalidChunkDimension {
                        dimension,
                        chunk,
                        extent,
                    });
                }
            }
            self.create_codec()?;
        }
        Ok(())
    }
}
