use std::{
    error::Error,
    fs::OpenOptions,
    io::{Seek, SeekFrom, Write},
};

use densefile::{
    byte_range::ByteRange,
    dataset::{DataType, Dataset, DatasetBuilder, DatasetError, OpenMode},
    metadata::{DatasetMetadata, FORMAT_VERSION},
    storage::{StorageError, StorageFile, Superblock, SUPERBLOCK_SIZE},
};

fn corrupt(path: &std::path::Path, offset: u64, bytes: &[u8]) -> std::io::Result<()> {
    let mut file = OpenOptions::new().write(true).open(path)?;
    file.seek(SeekFrom::Start(offset))?;
    file.write_all(bytes)
}

fn assert_corrupt(path: &std::path::Path) {
    assert!(matches!(
        Dataset::open(path, OpenMode::ReadOnly),
        Err(DatasetError::StorageError(StorageError::CorruptMetadata(_)))
    ));
}

#[test]
fn file_contiguous_layout() -> Result<(), Box<dyn Error>> {
    let dir = tempfile::tempdir()?;
    let path = dir.path().join("contiguous.dense");
    let mut dataset = DatasetBuilder::new(vec![2, 3], DataType::UInt16)
        .name("test")
        .create(&path)?;
    dataset.store_rows_elements::<u16>(1..2, &[0x0102, 0x0304, 0x0506])?;
    dataset.close()?;

    // little-endian elements in row-major order directly after the superblock
    let bytes = std::fs::read(&path)?;
    assert_eq!(
        &bytes[SUPERBLOCK_SIZE as usize..SUPERBLOCK_SIZE as usize + 12],
        &[0, 0, 0, 0, 0, 0, 2, 1, 4, 3, 6, 5]
    );

    let storage = StorageFile::open(&path, false)?;
    let (metadata, superblock) = storage.read_metadata()?;
    assert_eq!(superblock.version, FORMAT_VERSION);
    assert_eq!(superblock.metadata_offset, SUPERBLOCK_SIZE + 12);
    assert_eq!(metadata.name, "test");
    assert_eq!(metadata.data_offset, Some(SUPERBLOCK_SIZE));
    assert!(metadata.chunks.is_empty());
    Ok(())
}

#[test]
fn file_chunk_directory() -> Result<(), Box<dyn Error>> {
    let dir = tempfile::tempdir()?;
    let path = dir.path().join("chunked.dense");
    let mut dataset = DatasetBuilder::new(vec![4, 4], DataType::UInt8)
        .chunk_shape(vec![2, 4])
        .create(&path)?;
    dataset.store_rows(2..4, &[9; 8])?;
    dataset.close()?;

    let storage = StorageFile::open(&path, false)?;
    let (metadata, superblock) = storage.read_metadata()?;
    assert_eq!(metadata.chunks.len(), 1);
    let entry = &metadata.chunks[0];
    assert_eq!(entry.indices, vec![1, 0]);
    assert_eq!(entry.raw_length, 8);
    assert_eq!(entry.stored_length, 8);
    assert!(entry.offset >= SUPERBLOCK_SIZE);
    assert!(entry.offset + entry.stored_length <= superblock.metadata_offset);
    assert_eq!(storage.read(entry.byte_range())?, vec![9; 8]);
    assert_eq!(superblock.metadata_end(), storage.len()?);
    Ok(())
}

#[test]
fn file_corrupt_superblock() -> Result<(), Box<dyn Error>> {
    let dir = tempfile::tempdir()?;
    let path = dir.path().join("corrupt.dense");
    DatasetBuilder::new(vec![4], DataType::Int32).create(&path)?.close()?;

    corrupt(&path, 0, b"NOTDENSE")?;
    assert_corrupt(&path);

    std::fs::write(&path, b"short")?;
    assert_corrupt(&path);
    Ok(())
}

#[test]
fn file_corrupt_metadata_document() -> Result<(), Box<dyn Error>> {
    let dir = tempfile::tempdir()?;
    let path = dir.path().join("checksum.dense");
    DatasetBuilder::new(vec![4], DataType::Int32).create(&path)?.close()?;
    let superblock = StorageFile::open(&path, false)?.read_superblock()?;

    // a flipped byte in the document fails the checksum
    corrupt(&path, superblock.metadata_offset, b"[")?;
    assert_corrupt(&path);
    Ok(())
}

#[test]
fn file_invalid_metadata_rejected() -> Result<(), Box<dyn Error>> {
    let dir = tempfile::tempdir()?;
    let path = dir.path().join("invalid.dense");
    DatasetBuilder::new(vec![4, 4], DataType::UInt8)
        .chunk_shape(vec![2, 2])
        .create(&path)?
        .close()?;

    // a well formed document whose chunk extent lies beyond the end of the file
    let storage = StorageFile::open(&path, true)?;
    let (mut metadata, superblock) = storage.read_metadata()?;
    let document = serde_json::to_vec(&serde_json::json!({
        "densefile_format": FORMAT_VERSION,
        "name": metadata.name,
        "layout": metadata.layout,
        "chunks": [{"indices": [0, 0], "offset": 1u64 << 40, "stored_length": 4, "raw_length": 4}]
    }))?;
    storage.commit_document(&document, superblock.metadata_end())?;
    drop(storage);
    assert_corrupt(&path);

    // a chunk extent overlapping the superblock
    let storage = StorageFile::open(&path, true)?;
    let document = serde_json::to_vec(&serde_json::json!({
        "densefile_format": FORMAT_VERSION,
        "name": metadata.name,
        "layout": metadata.layout,
        "chunks": [{"indices": [0, 0], "offset": 8, "stored_length": 4, "raw_length": 4}]
    }))?;
    let end = storage.len()?;
    storage.commit_document(&document, end)?;
    drop(storage);
    assert_corrupt(&path);

    // a valid document committed afterwards takes effect again
    let storage = StorageFile::open(&path, true)?;
    metadata.chunks.clear();
    let end = storage.len()?;
    storage.commit_metadata(&metadata, end)?;
    assert_eq!(storage.read_metadata()?.0, metadata);
    assert!(DatasetMetadata::from_bytes(&document, end).is_err());
    Ok(())
}

#[test]
fn file_superblock_round_trip() {
    let superblock = Superblock::new(b"{}", 128);
    let bytes = superblock.to_bytes();
    assert_eq!(bytes.len() as u64, SUPERBLOCK_SIZE);
    assert_eq!(Superblock::from_bytes(&bytes).unwrap(), superblock);
    assert_eq!(superblock.metadata_end(), 130);
    assert_eq!(
        ByteRange::FromStart(superblock.metadata_offset, Some(superblock.metadata_length)).to_range(0),
        128..130
    );
}
