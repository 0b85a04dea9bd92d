use std::ops::Range;

use crate::{
    array_subset::ArraySubset,
    byte_range::coalesce_byte_ranges,
    metadata::ChunkEntry,
    storage::SUPERBLOCK_SIZE,
};

use super::{
    element::validate_element_type, map_maybe_parallel, ArrayIndices, Dataset, DatasetError,
    Element, StorageMode,
};

/// A chunk with uncommitted writes, held in decoded form.
#[derive(Debug, Clone)]
pub(super) struct StagedChunk {
    /// The decoded chunk bytes.
    pub(super) bytes: Vec<u8>,
    /// The regions of the chunk written since it was staged, relative to the chunk origin.
    pub(super) written: Vec<ArraySubset>,
}

impl Dataset {
    /// Encode and store `bytes` in `rows` of the leading dimension, spanning all other dimensions.
    ///
    /// An empty row range is a no-op.
    ///
    /// # Errors
    /// Returns a [`DatasetError`] if
    ///  - the dataset is closed or read only,
    ///  - `rows` is not within the dataset,
    ///  - the length of `bytes` does not match the size of `rows`, or
    ///  - there is a codec or underlying IO error.
    pub fn store_rows(&mut self, rows: Range<u64>, bytes: &[u8]) -> Result<(), DatasetError> {
        let array_subset = self.rows_subset(&rows)?;
        self.store_array_subset(&array_subset, bytes)
    }

    /// Store `elements` in `rows` of the leading dimension.
    ///
    /// # Errors
    /// Returns a [`DatasetError`] if the element type does not match the dataset data type, or any error condition of [`store_rows`](Dataset::store_rows).
    pub fn store_rows_elements<T: Element>(
        &mut self,
        rows: Range<u64>,
        elements: &[T],
    ) -> Result<(), DatasetError> {
        validate_element_type::<T>(self.data_type())?;
        self.store_rows(rows, &T::into_le_bytes(elements))
    }

    /// Store `bytes` in `array_subset`.
    ///
    /// An empty array subset is a no-op.
    ///
    /// # Errors
    /// Returns a [`DatasetError`] if
    ///  - the dataset is closed or read only,
    ///  - `array_subset` is not within the dataset,
    ///  - the length of `bytes` does not match the size of `array_subset`, or
    ///  - there is a codec or underlying IO error.
    pub fn store_array_subset(
        &mut self,
        array_subset: &ArraySubset,
        bytes: &[u8],
    ) -> Result<(), DatasetError> {
        self.writable_storage()?;
        self.validate_array_subset(array_subset)?;
        let expected_size = array_subset.num_elements() * self.data_type().size() as u64;
        if bytes.len() as u64 != expected_size {
            return Err(DatasetError::InvalidBytesInputSize(
                bytes.len(),
                expected_size,
            ));
        }
        if array_subset.is_empty() {
            return Ok(());
        }
        match self.layout().storage() {
            StorageMode::Contiguous => self.store_contiguous(array_subset, bytes),
            StorageMode::Chunked { .. } => self.store_chunked(array_subset, bytes),
        }
    }

    /// Store `elements` in `array_subset`.
    ///
    /// # Errors
    /// Returns a [`DatasetError`] if the element type does not match the dataset data type, or any error condition of [`store_array_subset`](Dataset::store_array_subset).
    pub fn store_array_subset_elements<T: Element>(
        &mut self,
        array_subset: &ArraySubset,
        elements: &[T],
    ) -> Result<(), DatasetError> {
        validate_element_type::<T>(self.data_type())?;
        self.store_array_subset(array_subset, &T::into_le_bytes(elements))
    }

    fn store_contiguous(&self, array_subset: &ArraySubset, bytes: &[u8]) -> Result<(), DatasetError> {
        let storage = self.writable_storage()?;
        let data_offset = self.metadata.data_offset.unwrap_or(SUPERBLOCK_SIZE);
        let byte_ranges = coalesce_byte_ranges(
            &array_subset.byte_ranges(self.shape(), self.data_type().size())?,
        );
        let mut bytes = bytes;
        for byte_range in byte_ranges {
            let (head, tail) =
                bytes.split_at(usize::try_from(byte_range.length(0)).unwrap_or(usize::MAX));
            storage.write(data_offset + byte_range.start(0), head)?;
            bytes = tail;
        }
        Ok(())
    }

    fn store_chunked(&mut self, array_subset: &ArraySubset, bytes: &[u8]) -> Result<(), DatasetError> {
        let chunk_shape = self.chunk_grid_or_err()?.chunk_shape().to_vec();
        let element_size = self.data_type().size();
        for (chunk_indices, chunk_subset) in &array_subset.chunks(&chunk_shape)? {
            let overlap = array_subset.overlap(&chunk_subset)?;
            let region = overlap.relative_to(chunk_subset.start())?;
            let region_bytes = overlap.relative_to(array_subset.start())?.extract_bytes(
                bytes,
                array_subset.shape(),
                element_size,
            )?;
            if !self.staged.contains_key(&chunk_indices) {
                // a write covering the whole chunk does not need its previous content
                let bytes = if region.shape() == chunk_shape.as_slice() {
                    vec![0; self.chunk_size_bytes()]
                } else {
                    self.committed_chunk_bytes(&chunk_indices)?
                };
                self.staged.insert(
                    chunk_indices.clone(),
                    StagedChunk {
                        bytes,
                        written: vec![],
                    },
                );
            }
            if let Some(staged) = self.staged.get_mut(&chunk_indices) {
                region.store_bytes(&region_bytes, &mut staged.bytes, &chunk_shape, element_size)?;
                staged.written.push(region);
            }
        }
        Ok(())
    }

    /// Encode every staged chunk and write it to the file.
    ///
    /// The chunk directory is updated in memory, it is committed to the file on [`flush`](Dataset::flush).
    pub(super) fn commit_staged_local(&mut self) -> Result<(), DatasetError> {
        if self.staged.is_empty() {
            return Ok(());
        }
        let staged = std::mem::take(&mut self.staged)
            .into_iter()
            .map(|(chunk_indices, staged)| (chunk_indices, staged.bytes))
            .collect();
        let encoded = self.encode_chunks(staged)?;
        let entries = self.write_chunks(self.cursor, encoded)?;
        self.insert_entries(entries);
        Ok(())
    }

    /// Encode decoded chunks, in parallel if enabled.
    pub(super) fn encode_chunks(
        &self,
        chunks: Vec<(ArrayIndices, Vec<u8>)>,
    ) -> Result<Vec<(ArrayIndices, Vec<u8>)>, DatasetError> {
        let encoded = map_maybe_parallel(chunks, |(chunk_indices, bytes)| {
            self.encode_chunk(bytes)
                .map(|encoded| (chunk_indices, encoded))
        });
        Ok(encoded.into_iter().collect::<Result<Vec<_>, _>>()?)
    }

    /// The committed offset of a chunk if `stored_length` bytes fit in its existing extent.
    fn reusable_extent(&self, chunk_indices: &[u64], stored_length: u64) -> Option<u64> {
        self.directory
            .get(chunk_indices)
            .filter(|entry| stored_length <= entry.stored_length)
            .map(|entry| entry.offset)
    }

    /// The number of bytes [`write_chunks`](Dataset::write_chunks) appends for `encoded`.
    pub(super) fn appended_size(&self, encoded: &[(ArrayIndices, Vec<u8>)]) -> u64 {
        encoded
            .iter()
            .map(|(chunk_indices, bytes)| (chunk_indices, bytes.len() as u64))
            .filter(|(chunk_indices, length)| self.reusable_extent(chunk_indices, *length).is_none())
            .map(|(_, length)| length)
            .sum()
    }

    /// Write encoded chunks, returning their directory entries.
    ///
    /// A chunk that fits in its committed extent is rewritten in place.
    /// Other chunks are written back to back from `append_offset`.
    pub(super) fn write_chunks(
        &self,
        append_offset: u64,
        encoded: Vec<(ArrayIndices, Vec<u8>)>,
    ) -> Result<Vec<ChunkEntry>, DatasetError> {
        if encoded.is_empty() {
            return Ok(vec![]);
        }
        let storage = self.writable_storage()?;
        let raw_length = self.chunk_size_bytes() as u64;
        let mut append_offset = append_offset;
        let mut entries = Vec::with_capacity(encoded.len());
        for (indices, bytes) in encoded {
            let stored_length = bytes.len() as u64;
            let offset = match self.reusable_extent(&indices, stored_length) {
                Some(offset) => offset,
                None => {
                    let offset = append_offset;
                    append_offset += stored_length;
                    offset
                }
            };
            storage.write(offset, &bytes)?;
            log::trace!("wrote chunk {indices:?} ({stored_length} bytes) at {offset}");
            entries.push(ChunkEntry {
                indices,
                offset,
                stored_length,
                raw_length,
            });
        }
        Ok(entries)
    }

    /// Add chunk entries to the directory, replacing the entries of rewritten chunks.
    ///
    /// The extent of a chunk that outgrew it is not reclaimed.
    pub(super) fn insert_entries(&mut self, entries: Vec<ChunkEntry>) {
        for entry in entries {
            self.cursor = self.cursor.max(entry.offset + entry.stored_length);
            self.directory.insert(entry.indices.clone(), entry);
            self.dirty = true;
        }
    }
}
