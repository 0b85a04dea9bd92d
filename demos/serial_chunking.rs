//! Chunked writes and reads
//!
//! Creates a `float64` dataset of shape (nimgs, nrows, ncols) of random numbers and writes it to three files:
//! contiguous, chunked, and chunked with gzip compression.
//! Each file is then read one image corner `dataset[i, 0:ksize-1, 0:ksize-1]` at a time, and the read times are compared.
//!
//! Usage:
//! ```text
//! cargo run --release --example serial_chunking
//! ```

use std::time::Instant;

use densefile::{
    array_subset::ArraySubset,
    dataset::{codec::gzip::GzipCodec, DataType, Dataset, DatasetBuilder, OpenMode},
};
use rand::{rngs::SmallRng, Rng, SeedableRng};

// dataset dimensions
const NIMGS: u64 = 500;
const NROWS: u64 = 768;
const NCOLS: u64 = 1366;

// image corner dimensions, and the chunk size
const KSIZE: u64 = 200;

fn write_and_read(builder: &DatasetBuilder, path: &str) -> Result<f64, Box<dyn std::error::Error>> {
    let mut dataset = builder.create(path)?;
    let mut rng = SmallRng::seed_from_u64(746_574_366);
    let image_size = usize::try_from(NROWS * NCOLS)?;
    for i in 0..NIMGS {
        let image: Vec<f64> = (0..image_size).map(|_| rng.gen()).collect();
        dataset.store_rows_elements(i..i + 1, &image)?;
        // commit the chunks of each image rather than staging the whole dataset
        dataset.flush()?;
    }
    dataset.close()?;

    let dataset = Dataset::open(path, OpenMode::ReadOnly)?;
    let start = Instant::now();
    for i in 0..NIMGS {
        let tile = ArraySubset::new_with_ranges(&[i..i + 1, 0..KSIZE - 1, 0..KSIZE - 1]);
        let _tile: Vec<f64> = dataset.retrieve_array_subset_elements(&tile)?;
    }
    let elapsed = start.elapsed().as_secs_f64();
    drop(dataset);
    std::fs::remove_file(path)?;
    Ok(elapsed)
}

fn serial_chunking() -> Result<(), Box<dyn std::error::Error>> {
    let mut builder = DatasetBuilder::new(vec![NIMGS, NROWS, NCOLS], DataType::Float64);
    builder.name("test").overwrite(true);
    let elapsed = write_and_read(&builder, "test_contig.dense")?;
    println!(" contiguous dataset read in {elapsed} secs");

    builder.chunk_shape(vec![1, KSIZE, KSIZE]);
    let elapsed = write_and_read(&builder, "test_chunked.dense")?;
    println!(" chunked dataset ({:?}) read in {elapsed} secs", [1, KSIZE, KSIZE]);

    builder.codec(Box::new(GzipCodec::new(4)?));
    let elapsed = write_and_read(&builder, "test_compress.dense")?;
    println!(" chunked and compressed dataset ({:?}) read in {elapsed} secs", [1, KSIZE, KSIZE]);
    Ok(())
}

fn main() {
    if let Err(err) = serial_chunking() {
        println!("{}", err);
    }
}
