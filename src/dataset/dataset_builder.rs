use std::{path::Path, sync::Arc};

use crate::{collective::Communicator, metadata::Metadata};

use super::{
    codec::ChunkCodecTraits, ArrayShape, DataType, Dataset, DatasetError, LayoutDescriptor,
    DEFAULT_DATASET_NAME,
};

/// A [`Dataset`] builder.
///
/// The builder is initialised from a dataset shape and data type.
/// The dataset is contiguous unless a chunk shape is set, and chunks are stored without encoding unless a codec is set.
///
/// Use the methods in the dataset builder to change the configuration away from these defaults, and then build the dataset at a path with
///  - [`DatasetBuilder::create`] for a single worker, or
///  - [`DatasetBuilder::create_collective`] for a group of workers.
///
/// For example:
/// ```rust
/// # use densefile::dataset::{DataType, DatasetBuilder};
/// # let dir = tempfile::tempdir().unwrap();
/// let dataset = DatasetBuilder::new(vec![500, 10, 10], DataType::Float32)
///     .chunk_shape(vec![1, 4, 4])
///     .name("temperature")
///     .create(dir.path().join("temperature.dense"))?;
/// assert_eq!(dataset.chunk_grid_shape(), Some([500, 3, 3].as_slice()));
/// # Ok::<_, densefile::dataset::DatasetError>(())
/// ```
#[derive(Debug)]
pub struct DatasetBuilder {
    shape: ArrayShape,
    data_type: DataType,
    chunk_shape: Option<ArrayShape>,
    codec: Option<Metadata>,
    name: String,
    overwrite: bool,
}

impl DatasetBuilder {
    /// Create a new dataset builder for a dataset with `shape` and `data_type`.
    #[must_use]
    pub fn new(shape: ArrayShape, data_type: DataType) -> Self {
        Self {
            shape,
            data_type,
            chunk_shape: None,
            codec: None,
            name: DEFAULT_DATASET_NAME.to_string(),
            overwrite: false,
        }
    }

    /// Store the dataset as a regular grid of chunks with `chunk_shape`.
    pub fn chunk_shape(&mut self, chunk_shape: ArrayShape) -> &mut Self {
        self.chunk_shape = Some(chunk_shape);
        self
    }

    /// Encode chunks with `codec`.
    ///
    /// Has no effect on a contiguous dataset.
    pub fn codec(&mut self, codec: Box<dyn ChunkCodecTraits>) -> &mut Self {
        self.codec = Some(codec.create_metadata());
        self
    }

    /// Encode chunks with the codec described by `metadata`.
    ///
    /// The codec is resolved when the dataset is created.
    pub fn codec_metadata(&mut self, metadata: Metadata) -> &mut Self {
        self.codec = Some(metadata);
        self
    }

    /// Set the dataset name.
    pub fn name(&mut self, name: &str) -> &mut Self {
        name.clone_into(&mut self.name);
        self
    }

    /// Replace any existing file at the dataset path.
    pub fn overwrite(&mut self, overwrite: bool) -> &mut Self {
        self.overwrite = overwrite;
        self
    }

    /// Return the layout descriptor of the dataset.
    #[must_use]
    pub fn layout(&self) -> LayoutDescriptor {
        match &self.chunk_shape {
            Some(chunk_shape) => LayoutDescriptor::new_chunked(
                self.shape.clone(),
                self.data_type,
                chunk_shape.clone(),
                self.codec.clone(),
            ),
            None => LayoutDescriptor::new_contiguous(self.shape.clone(), self.data_type),
        }
    }

    /// Create the dataset at `path` with a single worker.
    ///
    /// # Errors
    /// Returns a [`DatasetError`] if the layout is invalid, the path exists and overwriting is disabled, or there is an underlying IO error.
    pub fn create(&self, path: impl AsRef<Path>) -> Result<Dataset, DatasetError> {
        let (storage, metadata, cursor) =
            super::create_file(path.as_ref(), &self.name, &self.layout(), self.overwrite)?;
        Dataset::new_with_parts(
            storage,
            metadata,
            cursor,
            super::OpenMode::ReadWrite,
            Arc::new(crate::collective::SingleProcess),
        )
    }

    /// Create the dataset at `path`, collectively with every worker sharing `communicator`.
    ///
    /// # Errors
    /// Returns a [`DatasetError`] on every worker if creation fails on any worker.
    pub fn create_collective(
        &self,
        path: impl AsRef<Path>,
        communicator: Arc<dyn Communicator>,
    ) -> Result<Dataset, DatasetError> {
        Dataset::create_collective_named(
            path.as_ref(),
            &self.name,
            &self.layout(),
            self.overwrite,
            communicator,
        )
    }
}

#[cfg(test)]
mod tests {
    use crate::{dataset::StorageMode, storage::StorageError};

    use super::*;

    #[test]
    fn dataset_builder_layout() {
        let mut builder = DatasetBuilder::new(vec![10, 10], DataType::Int64);
        assert_eq!(
            builder.layout(),
            LayoutDescriptor::new_contiguous(vec![10, 10], DataType::Int64)
        );
        builder
            .chunk_shape(vec![5, 5])
            .codec_metadata(Metadata::new("unknown"));
        assert!(matches!(
            builder.layout().storage(),
            StorageMode::Chunked { chunk_shape, codec: Some(_) } if chunk_shape == &[5, 5]
        ));

        let dir = tempfile::tempdir().unwrap();
        assert!(matches!(
            builder.create(dir.path().join("unknown.dense")),
            Err(DatasetError::InvalidLayout(_))
        ));
    }

    #[test]
    fn dataset_builder_name_overwrite() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("named.dense");
        let mut builder = DatasetBuilder::new(vec![4], DataType::UInt32);
        builder.name("counts");
        builder.create(&path).unwrap().close().unwrap();
        assert!(matches!(
            builder.create(&path),
            Err(DatasetError::StorageError(StorageError::AlreadyExists(_)))
        ));
        let dataset = builder.overwrite(true).create(&path).unwrap();
        assert_eq!(dataset.name(), "counts");
    }

    #[cfg(feature = "zstd")]
    #[test]
    fn dataset_builder_codec() {
        use crate::dataset::codec::zstd::ZstdCodec;

        let dir = tempfile::tempdir().unwrap();
        let mut dataset = DatasetBuilder::new(vec![64, 64], DataType::UInt16)
            .chunk_shape(vec![16, 64])
            .codec(Box::new(ZstdCodec::new(5, true)))
            .create(dir.path().join("zstd.dense"))
            .unwrap();
        dataset
            .store_rows_elements::<u16>(0..16, &[7; 16 * 64])
            .unwrap();
        dataset.flush().unwrap();
        let entry = dataset.chunk_location(&[0, 0]).unwrap().unwrap();
        assert!(entry.stored_length < entry.raw_length);
        assert_eq!(
            dataset.retrieve_rows_elements::<u16>(15..17).unwrap(),
            [vec![7; 64], vec![0; 64]].concat()
        );
    }
}
