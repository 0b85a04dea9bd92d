use std::ops::Range;

use crate::{
    array_subset::ArraySubset,
    byte_range::{coalesce_byte_ranges, ByteRange},
    storage::SUPERBLOCK_SIZE,
};

use super::{
    element::validate_element_type, map_maybe_parallel, Dataset, DatasetError, Element,
    StorageMode,
};

impl Dataset {
    /// Read and decode `rows` of the leading dimension, spanning all other dimensions, into its bytes.
    ///
    /// Elements that have never been written read as zero.
    /// An empty row range returns empty bytes.
    ///
    /// # Errors
    /// Returns a [`DatasetError`] if
    ///  - the dataset is closed,
    ///  - `rows` is not within the dataset, or
    ///  - there is a codec or underlying IO error.
    pub fn retrieve_rows(&self, rows: Range<u64>) -> Result<Vec<u8>, DatasetError> {
        let array_subset = self.rows_subset(&rows)?;
        self.retrieve_array_subset(&array_subset)
    }

    /// Read and decode `rows` of the leading dimension into a vector of its elements.
    ///
    /// # Errors
    /// Returns a [`DatasetError`] if the element type does not match the dataset data type, or any error condition of [`retrieve_rows`](Dataset::retrieve_rows).
    pub fn retrieve_rows_elements<T: Element>(
        &self,
        rows: Range<u64>,
    ) -> Result<Vec<T>, DatasetError> {
        validate_element_type::<T>(self.data_type())?;
        Ok(T::from_le_bytes(&self.retrieve_rows(rows)?))
    }

    /// Read and decode the `array_subset` of the dataset into its bytes.
    ///
    /// Only the chunks intersecting `array_subset` are read.
    ///
    /// # Errors
    /// Returns a [`DatasetError`] if
    ///  - the dataset is closed,
    ///  - `array_subset` is not within the dataset, or
    ///  - there is a codec or underlying IO error.
    pub fn retrieve_array_subset(&self, array_subset: &ArraySubset) -> Result<Vec<u8>, DatasetError> {
        self.storage()?;
        self.validate_array_subset(array_subset)?;
        if array_subset.is_empty() {
            return Ok(vec![]);
        }
        match self.layout().storage() {
            StorageMode::Contiguous => self.retrieve_contiguous(array_subset),
            StorageMode::Chunked { .. } => self.retrieve_chunked(array_subset),
        }
    }

    /// Read and decode the `array_subset` of the dataset into a vector of its elements.
    ///
    /// # Errors
    /// Returns a [`DatasetError`] if the element type does not match the dataset data type, or any error condition of [`retrieve_array_subset`](Dataset::retrieve_array_subset).
    pub fn retrieve_array_subset_elements<T: Element>(
        &self,
        array_subset: &ArraySubset,
    ) -> Result<Vec<T>, DatasetError> {
        validate_element_type::<T>(self.data_type())?;
        Ok(T::from_le_bytes(&self.retrieve_array_subset(array_subset)?))
    }

    /// Read and decode the chunk at `chunk_indices` into its bytes.
    ///
    /// The chunk is returned with its full chunk shape, including any region beyond the dataset bounds.
    /// A chunk that has never been written is all zeros.
    ///
    /// # Errors
    /// Returns a [`DatasetError`] if
    ///  - the dataset is closed or not chunked,
    ///  - `chunk_indices` are invalid, or
    ///  - there is a codec or underlying IO error.
    pub fn retrieve_chunk(&self, chunk_indices: &[u64]) -> Result<Vec<u8>, DatasetError> {
        self.chunk_grid_or_err()?
            .validate_chunk_indices(chunk_indices)?;
        self.storage()?;
        self.chunk_bytes(chunk_indices)
    }

    /// Read and decode the chunk at `chunk_indices` into a vector of its elements.
    ///
    /// # Errors
    /// Returns a [`DatasetError`] if the element type does not match the dataset data type, or any error condition of [`retrieve_chunk`](Dataset::retrieve_chunk).
    pub fn retrieve_chunk_elements<T: Element>(
        &self,
        chunk_indices: &[u64],
    ) -> Result<Vec<T>, DatasetError> {
        validate_element_type::<T>(self.data_type())?;
        Ok(T::from_le_bytes(&self.retrieve_chunk(chunk_indices)?))
    }

    fn retrieve_contiguous(&self, array_subset: &ArraySubset) -> Result<Vec<u8>, DatasetError> {
        let data_offset = self.metadata.data_offset.unwrap_or(SUPERBLOCK_SIZE);
        let byte_ranges: Vec<ByteRange> =
            coalesce_byte_ranges(&array_subset.byte_ranges(self.shape(), self.data_type().size())?)
                .into_iter()
                .map(|byte_range| {
                    ByteRange::FromStart(
                        data_offset + byte_range.start(0),
                        Some(byte_range.length(0)),
                    )
                })
                .collect();
        Ok(self.storage()?.read_byte_ranges(&byte_ranges)?.concat())
    }

    fn retrieve_chunked(&self, array_subset: &ArraySubset) -> Result<Vec<u8>, DatasetError> {
        let chunk_shape = self.chunk_grid_or_err()?.chunk_shape();
        let element_size = self.data_type().size();
        // a chunk never written reads as zeros, which the output already holds
        let chunks: Vec<_> = array_subset
            .chunks(chunk_shape)?
            .iter()
            .filter(|(chunk_indices, _)| {
                self.directory.contains_key(chunk_indices) || self.staged.contains_key(chunk_indices)
            })
            .collect();
        let decoded = map_maybe_parallel(chunks, |(chunk_indices, chunk_subset)| {
            self.chunk_bytes(&chunk_indices)
                .map(|chunk_bytes| (chunk_subset, chunk_bytes))
        });

        let mut output = vec![0; array_subset.num_elements_usize() * element_size];
        for decoded in decoded {
            let (chunk_subset, chunk_bytes) = decoded?;
            let overlap = array_subset.overlap(&chunk_subset)?;
            let region_bytes = overlap.relative_to(chunk_subset.start())?.extract_bytes(
                &chunk_bytes,
                chunk_shape,
                element_size,
            )?;
            overlap.relative_to(array_subset.start())?.store_bytes(
                &region_bytes,
                &mut output,
                array_subset.shape(),
                element_size,
            )?;
        }
        Ok(output)
    }
}

#[cfg(test)]
mod tests {
    use crate::dataset::{DataType, LayoutDescriptor, OpenMode};

    use super::*;

    #[test]
    fn retrieve_zero_fill() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("zeros.dense");
        for layout in [
            LayoutDescriptor::new_contiguous(vec![3, 3], DataType::Float32),
            LayoutDescriptor::new_chunked(vec![3, 3], DataType::Float32, vec![2, 2], None),
        ] {
            let dataset = Dataset::create(&path, &layout, true).unwrap();
            assert_eq!(
                dataset.retrieve_rows_elements::<f32>(0..3).unwrap(),
                vec![0.0; 9]
            );
            assert_eq!(dataset.retrieve_rows(1..1).unwrap(), Vec::<u8>::new());
        }
    }

    #[test]
    fn retrieve_chunk_full_shape() {
        let dir = tempfile::tempdir().unwrap();
        let layout = LayoutDescriptor::new_chunked(vec![3, 3], DataType::UInt8, vec![2, 2], None);
        let mut dataset = Dataset::create(dir.path().join("chunk.dense"), &layout, false).unwrap();
        dataset.store_rows(2..3, &[1, 2, 3]).unwrap();
        assert_eq!(dataset.retrieve_chunk(&[1, 1]).unwrap(), vec![3, 0, 0, 0]);
        assert_eq!(dataset.retrieve_chunk(&[1, 0]).unwrap(), vec![1, 2, 0, 0]);
        assert_eq!(dataset.retrieve_chunk(&[0, 0]).unwrap(), vec![0; 4]);
        assert!(matches!(
            dataset.retrieve_chunk(&[2, 0]),
            Err(DatasetError::InvalidChunkIndices(_))
        ));
    }

    #[test]
    fn retrieve_reopened() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("reopen.dense");
        let layout = LayoutDescriptor::new_chunked(vec![4, 2], DataType::Int16, vec![3, 1], None);
        let mut dataset = Dataset::create(&path, &layout, false).unwrap();
        dataset
            .store_rows_elements::<i16>(0..4, &[1, -1, 2, -2, 3, -3, 4, -4])
            .unwrap();
        dataset.close().unwrap();

        let dataset = Dataset::open(&path, OpenMode::ReadOnly).unwrap();
        assert_eq!(
            dataset
                .retrieve_array_subset_elements::<i16>(&ArraySubset::new_with_ranges(&[2..4, 1..2]))
                .unwrap(),
            vec![-3, -4]
        );
        assert!(matches!(
            dataset.retrieve_rows_elements::<u16>(0..1),
            Err(DatasetError::IncompatibleElementType(_, _))
        ));
    }
}
