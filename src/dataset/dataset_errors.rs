use thiserror::Error;

use crate::{
    array_subset::{
        ArrayStoreBytesError, ArraySubset, IncompatibleArraySubsetAndShapeError,
        IncompatibleDimensionalityError,
    },
    partition::PartitionError,
    plugin::PluginCreateError,
    storage::StorageError,
};

use super::{
    chunk_grid::InvalidChunkGridIndicesError, codec::CodecError, ArrayShape, DataType,
    InvalidLayoutError,
};

/// Dataset errors.
#[derive(Debug, Error)]
pub enum DatasetError {
    /// A storage error.
    #[error(transparent)]
    StorageError(#[from] StorageError),
    /// An invalid layout.
    #[error(transparent)]
    InvalidLayout(#[from] InvalidLayoutError),
    /// A codec error.
    #[error(transparent)]
    CodecError(#[from] CodecError),
    /// Incompatible dimensionality.
    #[error(transparent)]
    IncompatibleDimensionalityError(#[from] IncompatibleDimensionalityError),
    /// An array subset incompatible with an array shape.
    #[error(transparent)]
    IncompatibleArraySubsetAndShape(#[from] IncompatibleArraySubsetAndShapeError),
    /// Invalid chunk grid indices.
    #[error(transparent)]
    InvalidChunkIndices(#[from] InvalidChunkGridIndicesError),
    /// Invalid partitioning.
    #[error(transparent)]
    PartitionError(#[from] PartitionError),
    /// The array subset is not within the bounds of the dataset.
    #[error("array subset {_0} is not compatible with dataset shape {_1:?}")]
    InvalidArraySubset(ArraySubset, ArrayShape),
    /// The row range is not within the bounds of the dataset.
    #[error("row range {_0}..{_1} is not within a dataset with {_2} rows")]
    InvalidRowRange(u64, u64, u64),
    /// An unexpected bytes input size.
    #[error("got bytes with size {_0:?}, expected {_1:?}")]
    InvalidBytesInputSize(usize, u64),
    /// The element type does not match the dataset data type.
    #[error("got element type {_0}, expected {_1}")]
    IncompatibleElementType(DataType, DataType),
    /// A chunk operation on a contiguous dataset.
    #[error("the dataset is not chunked")]
    NotChunked,
    /// A write on a dataset opened read-only.
    #[error("a write operation was attempted on a read only dataset")]
    ReadOnly,
    /// An operation on a closed dataset.
    #[error("the dataset is closed")]
    Closed,
    /// A collective operation failed on another worker.
    #[error("collective operation failed: {_0}")]
    Collective(String),
}

impl From<ArrayStoreBytesError> for DatasetError {
    fn from(err: ArrayStoreBytesError) -> Self {
        match err {
            ArrayStoreBytesError::InvalidSubsetBytes(got, expected) => {
                Self::InvalidBytesInputSize(got, expected)
            }
            ArrayStoreBytesError::InvalidArrayBytes(got, expected) => {
                Self::CodecError(CodecError::UnexpectedChunkDecodedSize(
                    got,
                    usize::try_from(expected).unwrap_or(usize::MAX),
                ))
            }
            ArrayStoreBytesError::InvalidArrayShape(err) => {
                Self::IncompatibleArraySubsetAndShape(err)
            }
        }
    }
}

impl From<PluginCreateError> for DatasetError {
    fn from(err: PluginCreateError) -> Self {
        Self::InvalidLayout(InvalidLayoutError::UnsupportedCodec(err))
    }
}
