use std::collections::HashSet;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::{
    byte_range::ByteRange,
    dataset::{ArrayIndices, InvalidLayoutError, LayoutDescriptor, StorageMode},
    storage::SUPERBLOCK_SIZE,
};

/// The version of the metadata document written by this crate.
pub const FORMAT_VERSION: u32 = 1;

/// The metadata document of a dataset file.
///
/// Serialised as JSON, for example:
/// ```json
/// {
///     "densefile_format": 1,
///     "name": "test",
///     "layout": {
///         "shape": [500, 10, 10],
///         "data_type": "float64",
///         "storage": {
///             "chunked": {
///                 "chunk_shape": [1, 4, 4],
///                 "codec": { "name": "deflate", "configuration": { "level": 6 } }
///             }
///         }
///     },
///     "chunks": [
///         { "indices": [0, 0, 0], "offset": 64, "stored_length": 91, "raw_length": 128 }
///     ]
/// }
/// ```
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct DatasetMetadata {
    /// The format version, see [`FORMAT_VERSION`].
    pub densefile_format: u32,
    /// The dataset name.
    pub name: String,
    /// The shape, data type and storage mode.
    pub layout: LayoutDescriptor,
    /// The file offset of the data region of a contiguous dataset.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data_offset: Option<u64>,
    /// The chunk directory of a chunked dataset, sorted by chunk indices.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub chunks: Vec<ChunkEntry>,
}

/// The location of an allocated chunk.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq, Hash)]
#[serde(deny_unknown_fields)]
pub struct ChunkEntry {
    /// The chunk grid indices.
    pub indices: ArrayIndices,
    /// The file offset of the stored chunk.
    pub offset: u64,
    /// The stored (possibly encoded) length of the chunk.
    pub stored_length: u64,
    /// The decoded length of the chunk.
    pub raw_length: u64,
}

impl ChunkEntry {
    /// The byte range of the stored chunk within the file.
    #[must_use]
    pub fn byte_range(&self) -> ByteRange {
        ByteRange::FromStart(self.offset, Some(self.stored_length))
    }
}

/// An inconsistent dataset metadata document.
#[derive(Debug, Error)]
pub enum DatasetMetadataError {
    /// The metadata document could not be parsed.
    #[error(transparent)]
    Json(#[from] serde_json::Error),
    /// An unsupported format version.
    #[error("unsupported format version {0}, expected {FORMAT_VERSION}")]
    UnsupportedFormat(u32),
    /// The layout is invalid.
    #[error(transparent)]
    InvalidLayout(#[from] InvalidLayoutError),
    /// A contiguous dataset is missing its data offset, or a chunked dataset has one.
    #[error("the data offset does not match the storage mode")]
    DataOffsetMismatch,
    /// The data region of a contiguous dataset lies beyond the end of the file.
    #[error("the data region {0} extends beyond the end of the file ({1} bytes)")]
    DataRegionOutOfBounds(ByteRange, u64),
    /// The data region of a contiguous dataset overlaps the superblock.
    #[error("the data region starts at {0}, inside the superblock")]
    DataRegionInSuperblock(u64),
    /// A chunk directory entry is inconsistent.
    #[error("invalid chunk directory entry for chunk {indices:?}: {reason}")]
    InvalidChunkEntry {
        /// The chunk grid indices.
        indices: ArrayIndices,
        /// Why the entry is invalid.
        reason: &'static str,
    },
}

impl DatasetMetadata {
    /// Create the metadata of a new contiguous dataset whose data region starts at `data_offset`.
    #[must_use]
    pub fn new_contiguous(name: String, layout: LayoutDescriptor, data_offset: u64) -> Self {
        Self {
            densefile_format: FORMAT_VERSION,
            name,
            layout,
            data_offset: Some(data_offset),
            chunks: vec![],
        }
    }

    /// Create the metadata of a new chunked dataset with an empty chunk directory.
    #[must_use]
    pub fn new_chunked(name: String, layout: LayoutDescriptor) -> Self {
        Self {
            densefile_format: FORMAT_VERSION,
            name,
            layout,
            data_offset: None,
            chunks: vec![],
        }
    }

    /// Serialise the metadata document.
    ///
    /// # Errors
    /// Returns a [`serde_json::Error`] if serialisation fails.
    pub fn to_bytes(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec(self)
    }

    /// Deserialise and validate a metadata document from a file of `file_len` bytes.
    ///
    /// # Errors
    /// Returns a [`DatasetMetadataError`] if the document cannot be parsed or is inconsistent.
    pub fn from_bytes(bytes: &[u8], file_len: u64) -> Result<Self, DatasetMetadataError> {
        let metadata: Self = serde_json::from_slice(bytes)?;
        metadata.validate(file_len)?;
        Ok(metadata)
    }

    /// Validate the metadata document against a file of `file_len` bytes.
    ///
    /// # Errors
    /// Returns a [`DatasetMetadataError`] if the document is inconsistent.
    pub fn validate(&self, file_len: u64) -> Result<(), DatasetMetadataError> {
        if self.densefile_format != FORMAT_VERSION {
            return Err(DatasetMetadataError::UnsupportedFormat(
                self.densefile_format,
            ));
        }
        self.layout.validate()?;

        match (self.layout.storage(), self.data_offset) {
            (StorageMode::Contiguous, Some(data_offset)) => {
                if !self.chunks.is_empty() {
                    return Err(DatasetMetadataError::DataOffsetMismatch);
                }
                if data_offset < SUPERBLOCK_SIZE {
                    return Err(DatasetMetadataError::DataRegionInSuperblock(data_offset));
                }
                let data_region = ByteRange::FromStart(data_offset, Some(self.layout.nbytes()));
                if !data_region.is_within(file_len) {
                    return Err(DatasetMetadataError::DataRegionOutOfBounds(
                        data_region,
                        file_len,
                    ));
                }
            }
            (StorageMode::Chunked { chunk_shape, .. }, None) => {
                let grid_shape = self.layout.chunk_grid_shape().unwrap_or_default();
                let raw_length = chunk_shape.iter().product::<u64>()
                    * self.layout.data_type().size() as u64;
                let mut seen = HashSet::with_capacity(self.chunks.len());
                for entry in &self.chunks {
                    let invalid = |reason| DatasetMetadataError::InvalidChunkEntry {
                        indices: entry.indices.clone(),
                        reason,
                    };
                    if entry.indices.len() != grid_shape.len()
                        || std::iter::zip(&entry.indices, &grid_shape).any(|(i, g)| i >= g)
                    {
                        return Err(invalid("indices outside of the chunk grid"));
                    }
                    if entry.raw_length != raw_length {
                        return Err(invalid("raw length does not match the chunk shape"));
                    }
                    if entry.offset < SUPERBLOCK_SIZE {
                        return Err(invalid("stored extent inside the superblock"));
                    }
                    if !entry.byte_range().is_within(file_len) {
                        return Err(invalid("stored extent beyond the end of the file"));
                    }
                    if !seen.insert(&entry.indices) {
                        return Err(invalid("duplicate entry"));
                    }
                }
            }
            _ => return Err(DatasetMetadataError::DataOffsetMismatch),
        }
        Ok(())
    }
}
