//! Parallel read
//!
//! Reads the single dataset of shape (nrows, ncols) written by the `parallel_write` example.
//! Each worker reads its own partition of the rows.
//!
//! Usage:
//! ```text
//! DENSEFILE_WORKERS=8 cargo run --example parallel_read
//! DENSEFILE_WORKERS=8 cargo run --example parallel_read -- mytest.dense
//! ```

use std::{sync::Arc, time::Instant};

use densefile::{
    collective::ThreadCommunicator,
    dataset::{Dataset, OpenMode},
};

fn parallel_read() -> Result<(), Box<dyn std::error::Error>> {
    let path = std::env::args().nth(1).unwrap_or_else(|| "test.dense".to_string());
    let workers: usize = std::env::var("DENSEFILE_WORKERS").map_or(Ok(8), |workers| workers.parse())?;

    let results = ThreadCommunicator::run_group(workers, |communicator| {
        let start = Instant::now();
        let mut dataset = Dataset::open_collective(&path, OpenMode::ReadOnly, Arc::new(communicator))?;
        let rows = dataset.rank_rows()?;
        let _rows: Vec<u8> = dataset.retrieve_rows(rows.to_range())?;
        let nbytes = dataset.nbytes();
        dataset.close()?;
        Ok::<_, densefile::dataset::DatasetError>((nbytes, start.elapsed()))
    });

    let (nbytes, elapsed) = results.into_iter().next().ok_or("no workers")??;
    println!(" Dataset size: {} MB", nbytes as f64 / 1024f64.powi(2));
    println!(" Collective read time: {} seconds", elapsed.as_secs_f64());
    Ok(())
}

fn main() {
    if let Err(err) = parallel_read() {
        println!("{}", err);
    }
}
