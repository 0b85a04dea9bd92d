//! Parallel write
//!
//! Creates a file with a single `float32` dataset of shape (nrows, ncols) and writes it cooperatively.
//! Each worker fills its own partition of the rows with uniform random numbers offset by `1000 * (rank + 1)`.
//!
//! Usage:
//! ```text
//! DENSEFILE_WORKERS=8 cargo run --example parallel_write
//! DENSEFILE_WORKERS=8 cargo run --example parallel_write -- 32 1000 mytest.dense
//! ```

use std::{sync::Arc, time::Instant};

use densefile::{
    collective::{Communicator, ThreadCommunicator},
    dataset::{DataType, DatasetBuilder},
};
use rand::{rngs::SmallRng, Rng, SeedableRng};

fn parallel_write() -> Result<(), Box<dyn std::error::Error>> {
    let args: Vec<String> = std::env::args().collect();
    let (nrows, ncols): (u64, u64) = if args.len() > 2 {
        (args[1].parse()?, args[2].parse()?)
    } else {
        (128, 10_000_000)
    };
    let path = args.get(3).map_or("test.dense", String::as_str);
    let workers: usize = std::env::var("DENSEFILE_WORKERS").map_or(Ok(8), |workers| workers.parse())?;

    let results = ThreadCommunicator::run_group(workers, |communicator| {
        let rank = communicator.rank();
        let mut rng = SmallRng::seed_from_u64(746_574_366 + rank as u64);
        let start = Instant::now();

        let mut dataset = DatasetBuilder::new(vec![nrows, ncols], DataType::Float32)
            .name("test")
            .overwrite(true)
            .create_collective(path, Arc::new(communicator))?;
        let rows = dataset.rank_rows()?;
        let offset = 1000.0 * (rank + 1) as f32;
        let elements: Vec<f32> = (0..rows.len() * ncols)
            .map(|_| rng.gen::<f32>() + offset)
            .collect();
        dataset.store_rows_elements(rows.to_range(), &elements)?;
        let nbytes = dataset.nbytes();
        dataset.close()?;

        Ok::<_, densefile::dataset::DatasetError>((nbytes, start.elapsed()))
    });

    let (nbytes, elapsed) = results.into_iter().next().ok_or("no workers")??;
    println!(" Dataset size: {} MB", nbytes as f64 / 1024f64.powi(2));
    println!(" Collective write time: {} seconds", elapsed.as_secs_f64());
    Ok(())
}

fn main() {
    if let Err(err) = parallel_write() {
        println!("{}", err);
    }
}
