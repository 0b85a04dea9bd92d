use std::ops::Range;

use crate::array_subset::ArraySubset;

use super::{Dataset, DatasetError, Element};

fn shape_to_usize(shape: &[u64]) -> Result<Vec<usize>, DatasetError> {
    shape
        .iter()
        .map(|&extent| usize::try_from(extent))
        .collect::<Result<_, _>>()
        .map_err(|_| DatasetError::InvalidLayout(super::InvalidLayoutError::TooLarge))
}

fn elements_to_ndarray<T>(shape: &[u64], elements: Vec<T>) -> Result<ndarray::ArrayD<T>, DatasetError> {
    let length = elements.len();
    ndarray::ArrayD::<T>::from_shape_vec(ndarray::IxDyn(&shape_to_usize(shape)?), elements)
        .map_err(|_| DatasetError::InvalidBytesInputSize(length, shape.iter().product()))
}

impl Dataset {
    /// Read and decode `rows` of the leading dimension into an [`ndarray::ArrayD`].
    ///
    /// # Errors
    /// Returns a [`DatasetError`] if the element type does not match the dataset data type, or any error condition of [`retrieve_rows`](Dataset::retrieve_rows).
    pub fn retrieve_rows_ndarray<T: Element>(
        &self,
        rows: Range<u64>,
    ) -> Result<ndarray::ArrayD<T>, DatasetError> {
        let array_subset = self.rows_subset(&rows)?;
        self.retrieve_array_subset_ndarray(&array_subset)
    }

    /// Read and decode the `array_subset` of the dataset into an [`ndarray::ArrayD`].
    ///
    /// # Errors
    /// Returns a [`DatasetError`] if the element type does not match the dataset data type, or any error condition of [`retrieve_array_subset`](Dataset::retrieve_array_subset).
    pub fn retrieve_array_subset_ndarray<T: Element>(
        &self,
        array_subset: &ArraySubset,
    ) -> Result<ndarray::ArrayD<T>, DatasetError> {
        let elements = self.retrieve_array_subset_elements::<T>(array_subset)?;
        elements_to_ndarray(array_subset.shape(), elements)
    }

    /// Read and decode the chunk at `chunk_indices` into an [`ndarray::ArrayD`] with the chunk shape.
    ///
    /// # Errors
    /// Returns a [`DatasetError`] if the element type does not match the dataset data type, or any error condition of [`retrieve_chunk`](Dataset::retrieve_chunk).
    pub fn retrieve_chunk_ndarray<T: Element>(
        &self,
        chunk_indices: &[u64],
    ) -> Result<ndarray::ArrayD<T>, DatasetError> {
        let elements = self.retrieve_chunk_elements::<T>(chunk_indices)?;
        let chunk_shape = self.chunk_grid_or_err()?.chunk_shape();
        elements_to_ndarray(chunk_shape, elements)
    }

    /// Store `rows_array` in the rows of the leading dimension starting at `start_row`.
    ///
    /// The array must span every other dimension of the dataset.
    ///
    /// # Errors
    /// Returns a [`DatasetError`] if the element type does not match the dataset data type, or any error condition of [`store_array_subset`](Dataset::store_array_subset).
    pub fn store_rows_ndarray<T: Element, TArray: Into<ndarray::Array<T, D>>, D: ndarray::Dimension>(
        &mut self,
        start_row: u64,
        rows_array: TArray,
    ) -> Result<(), DatasetError> {
        let mut subset_start = vec![0; self.dimensionality()];
        if let Some(start) = subset_start.first_mut() {
            *start = start_row;
        }
        self.store_array_subset_ndarray(&subset_start, rows_array)
    }

    /// Store `subset_array` in the subset of the dataset starting at `subset_start` with the shape of the array.
    ///
    /// # Errors
    /// Returns a [`DatasetError`] if
    ///  - the dimensionality of `subset_start` and `subset_array` differ,
    ///  - the element type does not match the dataset data type, or
    ///  - any error condition of [`store_array_subset`](Dataset::store_array_subset).
    pub fn store_array_subset_ndarray<
        T: Element,
        TArray: Into<ndarray::Array<T, D>>,
        D: ndarray::Dimension,
    >(
        &mut self,
        subset_start: &[u64],
        subset_array: TArray,
    ) -> Result<(), DatasetError> {
        let subset_array: ndarray::Array<T, D> = subset_array.into();
        let array_subset = ArraySubset::new_with_start_shape(
            subset_start.to_vec(),
            subset_array.shape().iter().map(|&extent| extent as u64).collect(),
        )?;
        let elements: Vec<T> = subset_array.iter().copied().collect();
        self.store_array_subset_elements(&array_subset, &elements)
    }
}
