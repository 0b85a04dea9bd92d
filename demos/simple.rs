//! Simple
//!
//! Up to 4 workers each write `rank + 1` to their element of a `uint32` dataset of shape (4,).
//!
//! Usage:
//! ```text
//! DENSEFILE_WORKERS=4 cargo run --example simple
//! ```

use std::sync::Arc;

use densefile::{
    array_subset::ArraySubset,
    collective::{Communicator, ThreadCommunicator},
    dataset::{DataType, DatasetBuilder},
};

fn simple() -> Result<(), Box<dyn std::error::Error>> {
    let workers: usize = std::env::var("DENSEFILE_WORKERS").map_or(Ok(4), |workers| workers.parse())?;
    if workers > 4 {
        println!(" *** error: number of workers should be <= 4");
        return Ok(());
    }

    let results = ThreadCommunicator::run_group(workers, |communicator| {
        let rank = communicator.rank() as u64;
        let mut dataset = DatasetBuilder::new(vec![4], DataType::UInt32)
            .name("test")
            .overwrite(true)
            .create_collective("simple_test.dense", Arc::new(communicator))?;
        dataset.store_array_subset_elements::<u32>(
            &ArraySubset::new_with_ranges(&[rank..rank + 1]),
            &[u32::try_from(rank + 1).unwrap_or(u32::MAX)],
        )?;
        dataset.close()
    });
    for result in results {
        result?;
    }
    Ok(())
}

fn main() {
    if let Err(err) = simple() {
        println!("{}", err);
    }
}
