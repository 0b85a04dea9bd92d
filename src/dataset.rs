//! Datasets.
//!
//! A dataset is a named, rectangular array with a fixed shape and element [`DataType`], stored in a single file.
//! Its [`LayoutDescriptor`] fixes how it is materialised in the file:
//!  - [`StorageMode::Contiguous`]: one row-major block of `product(shape) * element_size` bytes, or
//!  - [`StorageMode::Chunked`]: a regular grid of chunks, each stored as an independently addressable blob, optionally encoded by a [codec](codec).
//!
//! Use [`DatasetBuilder`] to create a new dataset, or [`Dataset::open`] for an existing one.
//! The documentation for [`Dataset`] details how to interact with datasets.

pub mod chunk_grid;
pub mod codec;
pub mod data_type;
mod dataset_builder;
mod dataset_collective;
mod dataset_errors;
#[cfg(feature = "ndarray")]
mod dataset_ndarray;
mod dataset_retrieve;
mod dataset_store;
mod element;
mod layout;

use std::{
    collections::BTreeMap,
    ops::Range,
    path::{Path, PathBuf},
    sync::Arc,
};

pub use self::{
    chunk_grid::{InvalidChunkGridIndicesError, RegularChunkGrid},
    codec::{ChunkCodecTraits, CodecError},
    data_type::DataType,
    dataset_builder::DatasetBuilder,
    dataset_errors::DatasetError,
    element::Element,
    layout::{InvalidLayoutError, LayoutDescriptor, StorageMode},
};

use rayon::iter::{IntoParallelIterator, ParallelIterator};

use crate::{
    array_subset::ArraySubset,
    collective::{Communicator, SingleProcess},
    config::global_config,
    metadata::{ChunkEntry, DatasetMetadata},
    partition::{partition, RowRange},
    storage::{StorageFile, SUPERBLOCK_SIZE},
};

use dataset_store::StagedChunk;

/// An ND index to an element in an array.
pub type ArrayIndices = Vec<u64>;

/// The shape of an array.
pub type ArrayShape = Vec<u64>;

/// The name given to a dataset if none is specified.
pub const DEFAULT_DATASET_NAME: &str = "data";

/// How a dataset file is opened.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum OpenMode {
    /// Reads only. Writes fail with [`DatasetError::ReadOnly`].
    ReadOnly,
    /// Reads and writes.
    ReadWrite,
}

/// A dataset in a single file.
///
/// ### Initialisation
/// A *new* dataset is created with a [`DatasetBuilder`] or [`Dataset::create`].
/// An *existing* dataset is opened with [`Dataset::open`].
///
/// Several workers cooperate on one file with the collective variants [`Dataset::create_collective`] and [`Dataset::open_collective`],
/// which take a [`Communicator`] shared by the group.
/// Each worker holds its own handle with its own file descriptor.
///
/// ### Methods
///  - Reads: [`retrieve_rows`](Dataset::retrieve_rows), [`retrieve_array_subset`](Dataset::retrieve_array_subset), [`retrieve_chunk`](Dataset::retrieve_chunk).
///  - Writes: [`store_rows`](Dataset::store_rows), [`store_array_subset`](Dataset::store_array_subset).
///  - Lifecycle: [`flush`](Dataset::flush), [`close`](Dataset::close).
///
/// The `retrieve` and `store` methods have multiple variants:
///   - The above variants store or retrieve data represented as little-endian bytes.
///   - Variants with an `_elements` suffix read and write elements of a matching [`Element`] type.
///   - With the `ndarray` feature, variants with an `_ndarray` suffix store or retrieve [`ndarray::Array`]s.
///
/// ### Collective and independent operations
/// Creating, opening, flushing and closing are collective: every worker of the group must issue them, in the same order.
/// Reads and writes are independent: each worker accesses its own region, typically its [`rank_rows`](Dataset::rank_rows).
/// Concurrent writes by different workers to overlapping elements have an undefined result.
///
/// ### Chunked writes
/// A write to a chunked dataset stages every chunk it touches in decoded form on the handle.
/// A chunk is staged from its committed content, or zeros if it has never been written, so elements never written read as zero.
/// Staged chunks are encoded and written at the next [`flush`](Dataset::flush) or [`close`](Dataset::close),
/// where chunks written by more than one worker are merged.
/// A rewritten chunk keeps its extent in the file unless its encoded size grew, in which case it is appended at the end.
///
/// A chunk directory update only becomes visible in the file when the metadata is committed by [`flush`](Dataset::flush) or [`close`](Dataset::close).
/// Dropping an open dataset closes it and logs a failure rather than panicking.
#[derive(Debug)]
pub struct Dataset {
    path: PathBuf,
    mode: OpenMode,
    storage: Option<StorageFile>,
    /// The committed metadata without the chunk directory.
    metadata: DatasetMetadata,
    codec: Option<Box<dyn ChunkCodecTraits>>,
    chunk_grid: Option<RegularChunkGrid>,
    directory: BTreeMap<ArrayIndices, ChunkEntry>,
    staged: BTreeMap<ArrayIndices, StagedChunk>,
    communicator: Arc<dyn Communicator>,
    /// The allocation cursor: chunk payloads and metadata documents are appended here.
    cursor: u64,
    /// The directory has changed since the metadata was last committed.
    dirty: bool,
}

/// Create a new dataset file and commit its initial metadata.
///
/// Returns the open file, its metadata, and the allocation cursor.
fn create_file(
    path: &Path,
    name: &str,
    layout: &LayoutDescriptor,
    overwrite: bool,
) -> Result<(StorageFile, DatasetMetadata, u64), DatasetError> {
    layout.validate()?;
    let (metadata, metadata_offset) = match layout.storage() {
        StorageMode::Contiguous => {
            let data_end = layout
                .nbytes()
                .checked_add(SUPERBLOCK_SIZE)
                .ok_or(InvalidLayoutError::TooLarge)?;
            let metadata =
                DatasetMetadata::new_contiguous(name.to_string(), layout.clone(), SUPERBLOCK_SIZE);
            (metadata, data_end)
        }
        StorageMode::Chunked { .. } => (
            DatasetMetadata::new_chunked(name.to_string(), layout.clone()),
            SUPERBLOCK_SIZE,
        ),
    };
    let storage = StorageFile::create(path, overwrite)?;
    // the contiguous data region reads as zeros until written
    storage.set_len(metadata_offset)?;
    let superblock = storage.commit_metadata(&metadata, metadata_offset)?;
    log::debug!(
        "created dataset {name} in {} with layout {}",
        path.display(),
        serde_json::to_string(layout).unwrap_or_default()
    );
    Ok((storage, metadata, superblock.metadata_end()))
}

/// Map `f` over `items`, across the [`rayon`] thread pool if [parallel codecs](crate::config::Config#parallel-codecs) are enabled.
fn map_maybe_parallel<I, O, F>(items: Vec<I>, f: F) -> Vec<O>
where
    I: Send,
    O: Send,
    F: Fn(I) -> O + Sync + Send,
{
    if items.len() > 1 && global_config().parallel_codecs() {
        items.into_par_iter().map(f).collect()
    } else {
        items.into_iter().map(f).collect()
    }
}

impl Dataset {
    /// Create a new dataset file at `path` with a single worker.
    ///
    /// The dataset is named [`DEFAULT_DATASET_NAME`], use a [`DatasetBuilder`] to choose a name.
    ///
    /// # Errors
    /// Returns a [`DatasetError`] if
    ///  - the layout is invalid,
    ///  - `path` exists and `overwrite` is false, or
    ///  - there is an underlying IO error.
    pub fn create(
        path: impl AsRef<Path>,
        layout: &LayoutDescriptor,
        overwrite: bool,
    ) -> Result<Self, DatasetError> {
        let (storage, metadata, cursor) =
            create_file(path.as_ref(), DEFAULT_DATASET_NAME, layout, overwrite)?;
        Self::new_with_parts(
            storage,
            metadata,
            cursor,
            OpenMode::ReadWrite,
            Arc::new(SingleProcess),
        )
    }

    /// Open the dataset file at `path` with a single worker.
    ///
    /// # Errors
    /// Returns a [`DatasetError`] if
    ///  - `path` does not exist,
    ///  - the superblock or metadata is corrupt, or
    ///  - there is an underlying IO error.
    pub fn open(path: impl AsRef<Path>, mode: OpenMode) -> Result<Self, DatasetError> {
        let path = path.as_ref();
        let storage = StorageFile::open(path, mode == OpenMode::ReadWrite)?;
        let (metadata, _) = storage.read_metadata()?;
        let cursor = storage.len()?;
        log::debug!("opened dataset {} in {} ({mode:?})", metadata.name, path.display());
        Self::new_with_parts(storage, metadata, cursor, mode, Arc::new(SingleProcess))
    }

    fn new_with_parts(
        storage: StorageFile,
        mut metadata: DatasetMetadata,
        cursor: u64,
        mode: OpenMode,
        communicator: Arc<dyn Communicator>,
    ) -> Result<Self, DatasetError> {
        let codec = metadata.layout.create_codec()?;
        let chunk_grid = metadata.layout.chunk_grid();
        let directory = std::mem::take(&mut metadata.chunks)
            .into_iter()
            .map(|entry| (entry.indices.clone(), entry))
            .collect();
        Ok(Self {
            path: storage.path().to_path_buf(),
            mode,
            storage: Some(storage),
            metadata,
            codec,
            chunk_grid,
            directory,
            staged: BTreeMap::new(),
            communicator,
            cursor,
            dirty: false,
        })
    }

    /// Return the dataset name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.metadata.name
    }

    /// Return the path of the dataset file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Return the open mode.
    #[must_use]
    pub const fn mode(&self) -> OpenMode {
        self.mode
    }

    /// Return the dataset shape.
    #[must_use]
    pub fn shape(&self) -> &[u64] {
        self.metadata.layout.shape()
    }

    /// Return the dimensionality of the dataset.
    #[must_use]
    pub fn dimensionality(&self) -> usize {
        self.shape().len()
    }

    /// Return the element data type.
    #[must_use]
    pub fn data_type(&self) -> DataType {
        self.metadata.layout.data_type()
    }

    /// Return the layout descriptor.
    #[must_use]
    pub fn layout(&self) -> &LayoutDescriptor {
        &self.metadata.layout
    }

    /// Return the size of the dataset in bytes, as if it were laid out contiguously.
    #[must_use]
    pub fn nbytes(&self) -> u64 {
        self.metadata.layout.nbytes()
    }

    /// Return the communicator of the group of workers sharing this dataset.
    #[must_use]
    pub fn communicator(&self) -> &Arc<dyn Communicator> {
        &self.communicator
    }

    /// Return the chunk grid of a chunked dataset.
    #[must_use]
    pub fn chunk_grid(&self) -> Option<&RegularChunkGrid> {
        self.chunk_grid.as_ref()
    }

    /// Return the number of chunks along each dimension of a chunked dataset.
    #[must_use]
    pub fn chunk_grid_shape(&self) -> Option<&[u64]> {
        self.chunk_grid.as_ref().map(RegularChunkGrid::grid_shape)
    }

    /// Returns true if the dataset has been closed.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.storage.is_none()
    }

    /// Return the rows of the leading dimension assigned to this worker by [`partition`].
    ///
    /// # Errors
    /// Returns [`DatasetError::PartitionError`] if the communicator reports an invalid rank or size.
    pub fn rank_rows(&self) -> Result<RowRange, DatasetError> {
        Ok(partition(
            self.communicator.rank(),
            self.communicator.size(),
            self.shape()[0],
        )?)
    }

    /// Return the subset of the chunk grid holding every chunk that intersects `array_subset`.
    ///
    /// # Errors
    /// Returns a [`DatasetError`] if the dataset is not chunked or `array_subset` has the wrong dimensionality.
    pub fn chunks_in_array_subset(
        &self,
        array_subset: &ArraySubset,
    ) -> Result<ArraySubset, DatasetError> {
        Ok(self.chunk_grid_or_err()?.chunks_in_array_subset(array_subset)?)
    }

    /// Return the committed location of the chunk at `chunk_indices`, or [`None`] if it has never been committed.
    ///
    /// # Errors
    /// Returns a [`DatasetError`] if the dataset is not chunked or `chunk_indices` are invalid.
    pub fn chunk_location(&self, chunk_indices: &[u64]) -> Result<Option<&ChunkEntry>, DatasetError> {
        self.chunk_grid_or_err()?
            .validate_chunk_indices(chunk_indices)?;
        Ok(self.directory.get(chunk_indices))
    }

    /// Commit staged chunks and write the chunk directory to the file.
    ///
    /// This is a collective operation.
    /// With several workers, chunks staged by each worker are merged and encoded, new or grown chunks are appended to the file at disjoint offsets,
    /// then the first worker commits the merged chunk directory.
    ///
    /// # Errors
    /// Returns a [`DatasetError`] if the dataset is closed, on an encoding or IO error, or if the flush failed on another worker.
    pub fn flush(&mut self) -> Result<(), DatasetError> {
        self.storage()?;
        if self.communicator.size() > 1 {
            self.flush_collective()?;
        } else {
            self.flush_local()?;
        }
        log::debug!(
            "flushed dataset {} ({} chunks committed)",
            self.path.display(),
            self.directory.len()
        );
        Ok(())
    }

    /// Flush and close the dataset.
    ///
    /// This is a collective operation.
    /// Closing a closed dataset is a no-op.
    /// Any other operation on a closed dataset fails with [`DatasetError::Closed`].
    ///
    /// # Errors
    /// Returns a [`DatasetError`] if flushing fails. The dataset is closed regardless.
    pub fn close(&mut self) -> Result<(), DatasetError> {
        if self.storage.is_none() {
            return Ok(());
        }
        let result = self.flush();
        self.storage = None;
        self.staged.clear();
        log::debug!("closed dataset {}", self.path.display());
        result
    }

    fn flush_local(&mut self) -> Result<(), DatasetError> {
        if self.mode == OpenMode::ReadOnly {
            return Ok(());
        }
        self.commit_staged_local()?;
        let storage = self.storage()?;
        if self.dirty {
            let superblock = storage.commit_metadata(&self.metadata_document(), self.cursor)?;
            self.cursor = superblock.metadata_end();
            self.dirty = false;
        } else if global_config().sync_metadata() {
            storage.sync()?;
        }
        Ok(())
    }

    /// The metadata document including the current chunk directory.
    fn metadata_document(&self) -> DatasetMetadata {
        let mut metadata = self.metadata.clone();
        metadata.chunks = self.directory.values().cloned().collect();
        metadata
    }

    fn storage(&self) -> Result<&StorageFile, DatasetError> {
        self.storage.as_ref().ok_or(DatasetError::Closed)
    }

    fn writable_storage(&self) -> Result<&StorageFile, DatasetError> {
        let storage = self.storage()?;
        if self.mode == OpenMode::ReadWrite {
            Ok(storage)
        } else {
            Err(DatasetError::ReadOnly)
        }
    }

    fn chunk_grid_or_err(&self) -> Result<&RegularChunkGrid, DatasetError> {
        self.chunk_grid.as_ref().ok_or(DatasetError::NotChunked)
    }

    /// The decoded size of a chunk in bytes.
    fn chunk_size_bytes(&self) -> usize {
        let num_elements = self
            .chunk_grid
            .as_ref()
            .map_or(0, RegularChunkGrid::chunk_num_elements);
        usize::try_from(num_elements).unwrap_or(usize::MAX) * self.data_type().size()
    }

    fn validate_array_subset(&self, array_subset: &ArraySubset) -> Result<(), DatasetError> {
        if array_subset.inbounds(self.shape()) {
            Ok(())
        } else {
            Err(DatasetError::InvalidArraySubset(
                array_subset.clone(),
                self.shape().to_vec(),
            ))
        }
    }

    /// The array subset of `rows` of the leading dimension, spanning all other dimensions.
    fn rows_subset(&self, rows: &Range<u64>) -> Result<ArraySubset, DatasetError> {
        let shape = self.shape();
        if rows.start > rows.end || rows.end > shape[0] {
            return Err(DatasetError::InvalidRowRange(
                rows.start, rows.end, shape[0],
            ));
        }
        let ranges: Vec<Range<u64>> = std::iter::once(rows.clone())
            .chain(shape[1..].iter().map(|&extent| 0..extent))
            .collect();
        Ok(ArraySubset::new_with_ranges(&ranges))
    }

    /// The decoded bytes of a committed chunk, or zeros if it has never been committed.
    fn committed_chunk_bytes(&self, chunk_indices: &[u64]) -> Result<Vec<u8>, DatasetError> {
        let chunk_size = self.chunk_size_bytes();
        let Some(entry) = self.directory.get(chunk_indices) else {
            return Ok(vec![0; chunk_size]);
        };
        let encoded = self.storage()?.read(entry.byte_range())?;
        let decoded = match &self.codec {
            Some(codec) => codec.decode(encoded, chunk_size)?,
            None => codec::check_decoded_size(encoded, chunk_size)?,
        };
        Ok(decoded)
    }

    /// The decoded bytes of a chunk, including staged writes.
    fn chunk_bytes(&self, chunk_indices: &[u64]) -> Result<Vec<u8>, DatasetError> {
        match self.staged.get(chunk_indices) {
            Some(staged) => Ok(staged.bytes.clone()),
            None => self.committed_chunk_bytes(chunk_indices),
        }
    }

    fn encode_chunk(&self, decoded: Vec<u8>) -> Result<Vec<u8>, CodecError> {
        match &self.codec {
            Some(codec) => codec.encode(decoded),
            None => Ok(decoded),
        }
    }
}

impl Drop for Dataset {
    fn drop(&mut self) {
        if self.storage.is_none() {
            return;
        }
        if std::thread::panicking() {
            // a collective close could block on workers that will never arrive
            log::warn!(
                "dataset {} dropped during a panic without being closed",
                self.path.display()
            );
            return;
        }
        if let Err(err) = self.close() {
            log::warn!("failed to close dataset {}: {err}", self.path.display());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chunked_dataset(dir: &tempfile::TempDir) -> Dataset {
        let layout = LayoutDescriptor::new_chunked(vec![6, 4], DataType::UInt16, vec![4, 3], None);
        Dataset::create(dir.path().join("chunked.dense"), &layout, false).unwrap()
    }

    #[test]
    fn dataset_introspection() {
        let dir = tempfile::tempdir().unwrap();
        let dataset = chunked_dataset(&dir);
        assert_eq!(dataset.name(), DEFAULT_DATASET_NAME);
        assert_eq!(dataset.shape(), &[6, 4]);
        assert_eq!(dataset.dimensionality(), 2);
        assert_eq!(dataset.data_type(), DataType::UInt16);
        assert_eq!(dataset.nbytes(), 48);
        assert_eq!(dataset.chunk_grid_shape(), Some([2, 2].as_slice()));
        assert_eq!(dataset.rank_rows().unwrap(), RowRange::new(0, 6));
        assert_eq!(
            dataset
                .chunks_in_array_subset(&ArraySubset::new_with_ranges(&[3..5, 0..2]))
                .unwrap(),
            ArraySubset::new_with_ranges(&[0..2, 0..1])
        );
        assert!(dataset.chunk_location(&[1, 1]).unwrap().is_none());
        assert!(dataset.chunk_location(&[2, 0]).is_err());
    }

    #[test]
    fn dataset_rows_subset() {
        let dir = tempfile::tempdir().unwrap();
        let dataset = chunked_dataset(&dir);
        assert_eq!(
            dataset.rows_subset(&(2..5)).unwrap(),
            ArraySubset::new_with_ranges(&[2..5, 0..4])
        );
        assert!(dataset.rows_subset(&(2..7)).is_err());
        #[allow(clippy::reversed_empty_ranges)]
        let reversed = 3..2;
        assert!(matches!(
            dataset.rows_subset(&reversed),
            Err(DatasetError::InvalidRowRange(3, 2, 6))
        ));
    }

    #[test]
    fn dataset_close_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let mut dataset = chunked_dataset(&dir);
        dataset.close().unwrap();
        assert!(dataset.is_closed());
        dataset.close().unwrap();
        assert!(matches!(dataset.flush(), Err(DatasetError::Closed)));
        assert!(matches!(
            dataset.retrieve_rows(0..1),
            Err(DatasetError::Closed)
        ));
    }

    #[test]
    fn dataset_contiguous_not_chunked() {
        let dir = tempfile::tempdir().unwrap();
        let layout = LayoutDescriptor::new_contiguous(vec![4], DataType::Int8);
        let dataset = Dataset::create(dir.path().join("contiguous.dense"), &layout, false).unwrap();
        assert!(dataset.chunk_grid().is_none());
        assert!(matches!(
            dataset.chunk_location(&[0]),
            Err(DatasetError::NotChunked)
        ));
        assert!(matches!(
            dataset.retrieve_chunk(&[0]),
            Err(DatasetError::NotChunked)
        ));
    }
}
