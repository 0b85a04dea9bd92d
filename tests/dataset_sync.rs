use std::error::Error;

use densefile::{
    array_subset::ArraySubset,
    dataset::{DataType, Dataset, DatasetBuilder, DatasetError, LayoutDescriptor, OpenMode},
    metadata::Metadata,
    storage::StorageError,
};
use rand::{rngs::SmallRng, Rng, SeedableRng};

fn random_elements(len: u64, seed: u64) -> Vec<f64> {
    let mut rng = SmallRng::seed_from_u64(seed);
    (0..len).map(|_| rng.gen()).collect()
}

#[test]
fn dataset_contiguous_round_trip() -> Result<(), Box<dyn Error>> {
    let dir = tempfile::tempdir()?;
    let path = dir.path().join("contiguous.dense");
    let elements = random_elements(32 * 17, 746_574_366);

    let mut dataset = DatasetBuilder::new(vec![32, 17], DataType::Float64).create(&path)?;
    dataset.store_rows_elements(0..32, &elements)?;
    assert_eq!(dataset.retrieve_rows_elements::<f64>(0..32)?, elements);
    dataset.close()?;

    let dataset = Dataset::open(&path, OpenMode::ReadOnly)?;
    assert_eq!(dataset.retrieve_rows_elements::<f64>(0..32)?, elements);
    assert_eq!(
        dataset.retrieve_rows_elements::<f64>(5..7)?,
        elements[5 * 17..7 * 17].to_vec()
    );
    Ok(())
}

#[test]
fn dataset_chunked_matches_contiguous() -> Result<(), Box<dyn Error>> {
    let dir = tempfile::tempdir()?;
    let shape = vec![13, 9, 7];
    let elements = random_elements(13 * 9 * 7, 1);

    let mut builders = vec![];
    let mut builder = DatasetBuilder::new(shape.clone(), DataType::Float64);
    builders.push(builder.name("contiguous").layout());
    builder.chunk_shape(vec![4, 4, 3]);
    builders.push(builder.layout());
    #[cfg(feature = "deflate")]
    builders.push(
        builder
            .codec_metadata(Metadata::try_from(r#"{"name":"deflate","configuration":{"level":6}}"#)?)
            .layout(),
    );
    #[cfg(feature = "zstd")]
    builders.push(builder.codec_metadata(Metadata::new("zstd")).layout());

    let datasets = builders
        .iter()
        .enumerate()
        .map(|(i, layout)| {
            let mut dataset = Dataset::create(dir.path().join(format!("{i}.dense")), layout, false)?;
            dataset.store_array_subset_elements(&ArraySubset::new_with_shape(shape.clone()), &elements)?;
            dataset.close()?;
            Dataset::open(dir.path().join(format!("{i}.dense")), OpenMode::ReadOnly)
        })
        .collect::<Result<Vec<_>, _>>()?;

    for subset in [
        ArraySubset::new_with_ranges(&[0..13, 0..9, 0..7]),
        ArraySubset::new_with_ranges(&[3..9, 2..5, 1..7]),
        ArraySubset::new_with_ranges(&[12..13, 8..9, 6..7]),
        ArraySubset::new_with_ranges(&[4..4, 0..9, 0..7]),
    ] {
        let expected = datasets[0].retrieve_array_subset_elements::<f64>(&subset)?;
        assert_eq!(expected.len() as u64, subset.num_elements());
        for dataset in &datasets[1..] {
            assert_eq!(dataset.retrieve_array_subset_elements::<f64>(&subset)?, expected);
        }
    }
    Ok(())
}

#[test]
fn dataset_partial_chunk_zero_fill() -> Result<(), Box<dyn Error>> {
    let dir = tempfile::tempdir()?;
    let path = dir.path().join("zero_fill.dense");
    let layout = LayoutDescriptor::new_chunked(vec![8, 8], DataType::UInt32, vec![4, 4], None);
    let mut dataset = Dataset::create(&path, &layout, false)?;
    dataset.store_array_subset_elements::<u32>(&ArraySubset::new_with_ranges(&[1..2, 1..3]), &[5, 6])?;
    dataset.close()?;

    let dataset = Dataset::open(&path, OpenMode::ReadOnly)?;
    let chunk = dataset.retrieve_chunk_elements::<u32>(&[0, 0])?;
    let mut expected = vec![0; 16];
    expected[5] = 5;
    expected[6] = 6;
    assert_eq!(chunk, expected);
    assert!(dataset.chunk_location(&[1, 1])?.is_none());
    assert_eq!(dataset.retrieve_chunk_elements::<u32>(&[1, 1])?, vec![0; 16]);
    Ok(())
}

#[test]
fn dataset_image_corner_touches_one_chunk() -> Result<(), Box<dyn Error>> {
    let dir = tempfile::tempdir()?;
    let path = dir.path().join("images.dense");
    let mut dataset = DatasetBuilder::new(vec![500, 10, 10], DataType::Float32)
        .chunk_shape(vec![1, 4, 4])
        .create(&path)?;
    let image: Vec<f32> = (0..100u8).map(f32::from).collect();
    dataset.store_rows_elements(0..1, &image)?;

    let corner = ArraySubset::new_with_ranges(&[0..1, 0..3, 0..3]);
    assert_eq!(
        dataset.chunks_in_array_subset(&corner)?,
        ArraySubset::new_with_ranges(&[0..1, 0..1, 0..1])
    );
    assert_eq!(
        dataset.retrieve_array_subset_elements::<f32>(&corner)?,
        vec![0.0, 1.0, 2.0, 10.0, 11.0, 12.0, 20.0, 21.0, 22.0]
    );
    Ok(())
}

#[test]
fn dataset_close_idempotent() -> Result<(), Box<dyn Error>> {
    let dir = tempfile::tempdir()?;
    let path = dir.path().join("close.dense");
    let layout = LayoutDescriptor::new_chunked(vec![4, 4], DataType::Int64, vec![2, 2], None);
    let mut dataset = Dataset::create(&path, &layout, false)?;
    dataset.store_rows_elements::<i64>(0..1, &[1, 2, 3, 4])?;
    dataset.close()?;
    let bytes = std::fs::read(&path)?;
    dataset.close()?;
    drop(dataset);
    assert_eq!(std::fs::read(&path)?, bytes);
    Ok(())
}

#[test]
fn dataset_drop_commits() -> Result<(), Box<dyn Error>> {
    let dir = tempfile::tempdir()?;
    let path = dir.path().join("drop.dense");
    {
        let mut dataset = DatasetBuilder::new(vec![6], DataType::Int8)
            .chunk_shape(vec![4])
            .create(&path)?;
        dataset.store_rows_elements::<i8>(2..6, &[-1, -2, -3, -4])?;
    }
    let dataset = Dataset::open(&path, OpenMode::ReadOnly)?;
    assert_eq!(
        dataset.retrieve_rows_elements::<i8>(0..6)?,
        vec![0, 0, -1, -2, -3, -4]
    );
    Ok(())
}

#[test]
fn dataset_create_open_errors() -> Result<(), Box<dyn Error>> {
    let dir = tempfile::tempdir()?;
    let path = dir.path().join("errors.dense");
    let layout = LayoutDescriptor::new_contiguous(vec![4], DataType::UInt8);
    Dataset::create(&path, &layout, false)?.close()?;
    assert!(matches!(
        Dataset::create(&path, &layout, false),
        Err(DatasetError::StorageError(StorageError::AlreadyExists(_)))
    ));
    Dataset::create(&path, &layout, true)?;

    assert!(matches!(
        Dataset::open(dir.path().join("missing.dense"), OpenMode::ReadOnly),
        Err(DatasetError::StorageError(StorageError::NotFound(_)))
    ));

    let too_large_chunk = LayoutDescriptor::new_chunked(vec![4, 4], DataType::UInt8, vec![5, 4], None);
    assert!(matches!(
        Dataset::create(dir.path().join("invalid.dense"), &too_large_chunk, false),
        Err(DatasetError::InvalidLayout(_))
    ));
    let wrong_dimensionality = LayoutDescriptor::new_chunked(vec![4, 4], DataType::UInt8, vec![2], None);
    assert!(matches!(
        Dataset::create(dir.path().join("invalid.dense"), &wrong_dimensionality, false),
        Err(DatasetError::InvalidLayout(_))
    ));
    assert!(!dir.path().join("invalid.dense").exists());
    Ok(())
}

#[test]
fn dataset_read_only_and_closed() -> Result<(), Box<dyn Error>> {
    let dir = tempfile::tempdir()?;
    let path = dir.path().join("modes.dense");
    let layout = LayoutDescriptor::new_chunked(vec![4], DataType::UInt8, vec![2], None);
    Dataset::create(&path, &layout, false)?.close()?;

    let mut dataset = Dataset::open(&path, OpenMode::ReadOnly)?;
    assert!(matches!(dataset.store_rows(0..2, &[1, 2]), Err(DatasetError::ReadOnly)));
    assert_eq!(dataset.retrieve_rows(0..4)?, vec![0; 4]);
    dataset.close()?;
    assert!(matches!(dataset.retrieve_rows(0..4), Err(DatasetError::Closed)));
    assert!(matches!(dataset.retrieve_chunk(&[0]), Err(DatasetError::Closed)));

    let mut dataset = Dataset::open(&path, OpenMode::ReadWrite)?;
    dataset.store_rows(1..3, &[1, 2])?;
    dataset.close()?;
    assert!(matches!(dataset.store_rows(0..1, &[1]), Err(DatasetError::Closed)));
    assert_eq!(Dataset::open(&path, OpenMode::ReadOnly)?.retrieve_rows(0..4)?, vec![0, 1, 2, 0]);
    Ok(())
}
