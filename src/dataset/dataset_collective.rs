use std::{
    collections::{btree_map::Entry, BTreeMap},
    path::{Path, PathBuf},
    sync::Arc,
};

use serde::{de::DeserializeOwned, Deserialize, Serialize};

use crate::{
    array_subset::ArraySubset,
    collective::{pack_frames, unpack_frames, Communicator},
    config::global_config,
    metadata::DatasetMetadata,
    storage::{StorageError, StorageFile},
};

use super::{
    create_file, ArrayIndices, ArrayShape, Dataset, DatasetError, LayoutDescriptor, OpenMode,
    StorageMode,
};

/// An error reported to the other workers of a group.
#[derive(Debug, Serialize, Deserialize)]
enum RemoteError {
    AlreadyExists(PathBuf),
    NotFound(PathBuf),
    Other(String),
}

impl From<&DatasetError> for RemoteError {
    fn from(err: &DatasetError) -> Self {
        match err {
            DatasetError::StorageError(StorageError::AlreadyExists(path)) => {
                Self::AlreadyExists(path.clone())
            }
            DatasetError::StorageError(StorageError::NotFound(path)) => {
                Self::NotFound(path.clone())
            }
            err => Self::Other(err.to_string()),
        }
    }
}

impl RemoteError {
    fn into_dataset_error(self, rank: usize) -> DatasetError {
        match self {
            Self::AlreadyExists(path) => StorageError::AlreadyExists(path).into(),
            Self::NotFound(path) => StorageError::NotFound(path).into(),
            Self::Other(message) => DatasetError::Collective(format!("rank {rank}: {message}")),
        }
    }
}

fn decode_outcome<T: DeserializeOwned>(rank: usize, bytes: &[u8]) -> Result<T, DatasetError> {
    match serde_json::from_slice::<Result<T, RemoteError>>(bytes) {
        Ok(Ok(value)) => Ok(value),
        Ok(Err(err)) => Err(err.into_dataset_error(rank)),
        Err(err) => Err(DatasetError::Collective(format!(
            "invalid message from rank {rank}: {err}"
        ))),
    }
}

fn encode_outcome<T: Serialize>(local: &Result<T, DatasetError>) -> Vec<u8> {
    let message = local.as_ref().map_err(RemoteError::from);
    serde_json::to_vec(&message).unwrap_or_default()
}

/// Share the outcome of a local step with every worker of the group.
///
/// Returns the values of every worker indexed by rank, or an error if the step failed on any worker.
/// A worker that failed returns its own error.
fn exchange<T: Serialize + DeserializeOwned>(
    communicator: &dyn Communicator,
    local: Result<T, DatasetError>,
) -> Result<Vec<T>, DatasetError> {
    let gathered = communicator.all_gather(encode_outcome(&local));
    local?;
    gathered
        .iter()
        .enumerate()
        .map(|(rank, bytes)| decode_outcome(rank, bytes))
        .collect()
}

/// Share the outcome of a step performed only by worker `root`.
///
/// `local` must be [`Some`] on `root` and [`None`] elsewhere.
fn broadcast_outcome<T: Serialize + DeserializeOwned>(
    communicator: &dyn Communicator,
    root: usize,
    local: Option<Result<T, DatasetError>>,
) -> Result<T, DatasetError> {
    let message = local.as_ref().map(encode_outcome).unwrap_or_default();
    let bytes = communicator.broadcast(root, message);
    match local {
        Some(local) => local,
        None => decode_outcome(root, &bytes),
    }
}

/// The regions of chunks staged by a worker, sent to the owners of those chunks.
#[derive(Debug, Serialize, Deserialize)]
struct StagedRegions {
    indices: ArrayIndices,
    regions: Vec<(ArrayIndices, ArrayShape)>,
}

impl Dataset {
    /// Create a new dataset file at `path`, collectively with every worker sharing `communicator`.
    ///
    /// The first worker creates the file and shares its metadata, then every other worker opens the file.
    ///
    /// # Errors
    /// Returns a [`DatasetError`] on every worker if
    ///  - the layout is invalid,
    ///  - `path` exists and `overwrite` is false, or
    ///  - there is an underlying IO error on any worker.
    pub fn create_collective(
        path: impl AsRef<Path>,
        layout: &LayoutDescriptor,
        overwrite: bool,
        communicator: Arc<dyn Communicator>,
    ) -> Result<Self, DatasetError> {
        Self::create_collective_named(
            path.as_ref(),
            super::DEFAULT_DATASET_NAME,
            layout,
            overwrite,
            communicator,
        )
    }

    pub(super) fn create_collective_named(
        path: &Path,
        name: &str,
        layout: &LayoutDescriptor,
        overwrite: bool,
        communicator: Arc<dyn Communicator>,
    ) -> Result<Self, DatasetError> {
        // every worker rejects an invalid layout without communicating
        layout.validate()?;
        let outcome = (communicator.rank() == 0)
            .then(|| create_file(path, name, layout, overwrite));
        Self::join_collective(path, OpenMode::ReadWrite, communicator, outcome)
    }

    /// Open the dataset file at `path`, collectively with every worker sharing `communicator`.
    ///
    /// The first worker reads and validates the metadata and shares it, then every other worker opens the file.
    ///
    /// # Errors
    /// Returns a [`DatasetError`] on every worker if
    ///  - `path` does not exist,
    ///  - the superblock or metadata is corrupt, or
    ///  - there is an underlying IO error on any worker.
    pub fn open_collective(
        path: impl AsRef<Path>,
        mode: OpenMode,
        communicator: Arc<dyn Communicator>,
    ) -> Result<Self, DatasetError> {
        let path = path.as_ref();
        let outcome = (communicator.rank() == 0).then(|| -> Result<_, DatasetError> {
            let storage = StorageFile::open(path, mode == OpenMode::ReadWrite)?;
            let (metadata, _) = storage.read_metadata()?;
            let cursor = storage.len()?;
            Ok((storage, metadata, cursor))
        });
        Self::join_collective(path, mode, communicator, outcome)
    }

    fn join_collective(
        path: &Path,
        mode: OpenMode,
        communicator: Arc<dyn Communicator>,
        root_outcome: Option<Result<(StorageFile, DatasetMetadata, u64), DatasetError>>,
    ) -> Result<Self, DatasetError> {
        let (storage, shared) = match root_outcome {
            Some(Ok((storage, metadata, cursor))) => (Some(storage), Some(Ok((metadata, cursor)))),
            Some(Err(err)) => (None, Some(Err(err))),
            None => (None, None),
        };
        let (metadata, cursor): (DatasetMetadata, u64) =
            broadcast_outcome(communicator.as_ref(), 0, shared)?;

        let opened = match storage {
            Some(storage) => Ok(storage),
            None => StorageFile::open(path, mode == OpenMode::ReadWrite).map_err(DatasetError::from),
        };
        let (storage, status) = match opened {
            Ok(storage) => (Some(storage), Ok(())),
            Err(err) => (None, Err(err)),
        };
        exchange(communicator.as_ref(), status)?;
        let storage = storage.ok_or(DatasetError::Closed)?;

        log::debug!(
            "rank {} of {} joined dataset {} in {} ({mode:?})",
            communicator.rank(),
            communicator.size(),
            metadata.name,
            path.display()
        );
        Self::new_with_parts(storage, metadata, cursor, mode, communicator)
    }

    /// Flush a dataset shared by several workers.
    ///
    /// Every step is matched by every worker, so that a failure on one worker fails the flush on all of them without blocking.
    pub(super) fn flush_collective(&mut self) -> Result<(), DatasetError> {
        let communicator = self.communicator.clone();
        let communicator = communicator.as_ref();
        let sync = global_config().sync_metadata();

        if let StorageMode::Contiguous = self.layout().storage() {
            let status = match self.mode {
                OpenMode::ReadWrite if sync => {
                    self.storage()
                        .and_then(|storage| storage.sync().map_err(DatasetError::from))
                }
                _ => self.storage().map(|_| ()),
            };
            exchange(communicator, status)?;
            communicator.barrier();
            return Ok(());
        }

        // find the chunks staged by more than one worker, owned by the lowest of them
        let staged_indices: Vec<ArrayIndices> = self.staged.keys().cloned().collect();
        let gathered = exchange(communicator, Ok(staged_indices))?;
        let mut owners: BTreeMap<ArrayIndices, usize> = BTreeMap::new();
        let mut shared = false;
        for (rank, indices) in gathered.into_iter().enumerate() {
            for chunk_indices in indices {
                match owners.entry(chunk_indices) {
                    Entry::Vacant(entry) => {
                        entry.insert(rank);
                    }
                    Entry::Occupied(_) => shared = true,
                }
            }
        }
        let merged = if shared {
            self.merge_shared_chunks(communicator, &owners)
        } else {
            Ok(())
        };

        // encode owned chunks and allocate each worker a disjoint extent after the cursor
        // for those that no longer fit where they were committed
        let staged = std::mem::take(&mut self.staged)
            .into_iter()
            .map(|(chunk_indices, staged)| (chunk_indices, staged.bytes))
            .collect();
        let encoded = merged.and_then(|()| self.encode_chunks(staged));
        let (encoded, encoded_size) = match encoded {
            Ok(encoded) => {
                let size = self.appended_size(&encoded);
                (encoded, Ok(size))
            }
            Err(err) => (vec![], Err(err)),
        };
        let sizes = exchange(communicator, encoded_size)?;
        let offset = self.cursor + sizes[..communicator.rank()].iter().sum::<u64>();

        let entries = self.write_chunks(offset, encoded).and_then(|entries| {
            if sync && !entries.is_empty() {
                self.storage()?.sync()?;
            }
            Ok(entries)
        });
        let entries = exchange(communicator, entries)?;
        self.cursor += sizes.iter().sum::<u64>();
        for entries in entries {
            self.insert_entries(entries);
        }

        // every worker holds the same directory, the first commits it
        if self.dirty {
            let outcome = (communicator.rank() == 0).then(|| -> Result<u64, DatasetError> {
                let superblock = self
                    .writable_storage()?
                    .commit_metadata(&self.metadata_document(), self.cursor)?;
                Ok(superblock.metadata_length)
            });
            let metadata_length = broadcast_outcome(communicator, 0, outcome)?;
            self.cursor += metadata_length;
            self.dirty = false;
        }
        communicator.barrier();
        Ok(())
    }

    /// Send the written regions of chunks owned by other workers to their owners, and apply those received.
    ///
    /// Afterwards, `staged` only holds chunks owned by this worker.
    fn merge_shared_chunks(
        &mut self,
        communicator: &dyn Communicator,
        owners: &BTreeMap<ArrayIndices, usize>,
    ) -> Result<(), DatasetError> {
        let rank = communicator.rank();
        let (owned, sent): (BTreeMap<_, _>, BTreeMap<_, _>) = std::mem::take(&mut self.staged)
            .into_iter()
            .partition(|(chunk_indices, _)| owners.get(chunk_indices) == Some(&rank));
        self.staged = owned;

        let header: Vec<StagedRegions> = sent
            .iter()
            .map(|(chunk_indices, staged)| StagedRegions {
                indices: chunk_indices.clone(),
                regions: staged
                    .written
                    .iter()
                    .map(|region| (region.start().to_vec(), region.shape().to_vec()))
                    .collect(),
            })
            .collect();
        let mut frames = vec![serde_json::to_vec(&header).unwrap_or_default()];
        frames.extend(sent.into_values().map(|staged| staged.bytes));
        let gathered = communicator.all_gather(pack_frames(&frames));

        let chunk_shape = self.chunk_grid_or_err()?.chunk_shape().to_vec();
        let element_size = self.data_type().size();
        for (sender, message) in gathered.iter().enumerate() {
            if sender == rank {
                continue;
            }
            let invalid = || DatasetError::Collective(format!("invalid staged chunks from rank {sender}"));
            let frames = unpack_frames(message).ok_or_else(invalid)?;
            let (header, chunks) = frames.split_first().ok_or_else(invalid)?;
            let header: Vec<StagedRegions> =
                serde_json::from_slice(header).map_err(|_| invalid())?;
            if header.len() != chunks.len() {
                return Err(invalid());
            }
            for (staged_regions, chunk_bytes) in std::iter::zip(header, chunks) {
                let Some(staged) = self.staged.get_mut(&staged_regions.indices) else {
                    continue;
                };
                for (start, shape) in staged_regions.regions {
                    let region = ArraySubset::new_with_start_shape(start, shape)?;
                    let region_bytes =
                        region.extract_bytes(chunk_bytes, &chunk_shape, element_size)?;
                    region.store_bytes(&region_bytes, &mut staged.bytes, &chunk_shape, element_size)?;
                    staged.written.push(region);
                }
            }
        }
        Ok(())
    }
}
