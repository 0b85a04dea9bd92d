//! A rust library for partitioned access to dense multidimensional arrays stored in a single file.
//!
//! A file holds one named [`Dataset`](dataset::Dataset): a rectangular array with a fixed shape and element type, laid out either
//!  - contiguously (row-major, one block of `product(shape) * element_size` bytes), or
//!  - as a regular grid of chunks, each stored as an independently addressable and optionally compressed blob.
//!
//! Several independent workers can cooperate on one file.
//! Metadata operations (create, open, flush, close) are *collective*: every worker issues them through a [`Communicator`](collective::Communicator) and none returns until all have arrived.
//! Data operations are independent: each worker reads and writes its own [`partition`] of the leading dimension.
//!
//! ## Getting Started
//! - [`dataset::Dataset`] and [`dataset::DatasetBuilder`] are good places to start.
//! - [`partition::partition`] splits rows across workers.
//! - [`collective::ThreadCommunicator`] runs a group of workers on threads, standing in for an external launcher.
//!
//! ## Example
//! ```rust
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! use densefile::dataset::{DataType, DatasetBuilder, OpenMode, Dataset};
//! use densefile::array_subset::ArraySubset;
//! # let dir = tempfile::tempdir()?;
//! # let path = dir.path().join("example.dense");
//!
//! let mut dataset = DatasetBuilder::new(vec![8, 8], DataType::Float32)
//!     .chunk_shape(vec![4, 4])
//!     .create(&path)?;
//! dataset.store_rows_elements::<f32>(2..4, &[1.0; 16])?;
//! dataset.close()?;
//!
//! let dataset = Dataset::open(&path, OpenMode::ReadOnly)?;
//! let block: Vec<f32> = dataset.retrieve_array_subset_elements(&ArraySubset::new_with_ranges(&[1..3, 0..2]))?;
//! assert_eq!(block, vec![0.0, 0.0, 1.0, 1.0]);
//! # Ok(())
//! # }
//! ```
//!
//! ## Crate Features
//! #### Default
//!  - `ndarray`: [`ndarray`] utility functions for [`Dataset`](crate::dataset::Dataset).
//!  - Codecs: `deflate` (also provides `gzip`), `zstd`.
//!
//! ## Licence
//! `densefile` is licensed under either of
//!  - the Apache License, Version 2.0 <http://www.apache.org/licenses/LICENSE-2.0> or
//!  - the MIT license <http://opensource.org/licenses/MIT>, at your option.

#![warn(unused_variables)]
#![warn(dead_code)]
#![deny(missing_docs)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![deny(clippy::missing_panics_doc)]
#![cfg_attr(docsrs, feature(doc_auto_cfg))]

pub mod array_subset;
pub mod byte_range;
pub mod collective;
pub mod config;
pub mod dataset;
pub mod metadata;
pub mod partition;
pub mod plugin;
pub mod storage;
