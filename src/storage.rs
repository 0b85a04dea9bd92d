//! Single-file dataset storage.
//!
//! A dataset file is laid out as
//! ```text
//! [ superblock (64 bytes) | contiguous data region | chunk payloads and metadata documents, appended ... ]
//! ```
//! The [`Superblock`] at offset 0 points at the current [metadata document](crate::metadata::DatasetMetadata) and records its CRC32C checksum.
//!
//! Payloads and metadata documents are only ever appended, nothing previously written is moved.
//! A metadata commit writes the new document after everything else in the file and then repoints the superblock with a single 64-byte write,
//! so an interrupted commit leaves the previous metadata in effect.
//!
//! [`StorageFile`] performs positional reads and writes on an open file, logging each at the `trace` level.

use std::{
    fs::{File, OpenOptions},
    io::{Read, Seek, SeekFrom, Write},
    path::{Path, PathBuf},
};

use bytes::{Buf, BufMut, BytesMut};
use parking_lot::Mutex;
use thiserror::Error;

use crate::{
    byte_range::{ByteOffset, ByteRange},
    config::global_config,
    metadata::{DatasetMetadata, FORMAT_VERSION},
};

/// The size of the superblock, and the offset of the contiguous data region.
pub const SUPERBLOCK_SIZE: u64 = 64;

const MAGIC: &[u8; 8] = b"DENSEF\0\x01";

/// A storage error.
#[derive(Debug, Error)]
pub enum StorageError {
    /// An IO error.
    #[error(transparent)]
    IOError(#[from] std::io::Error),
    /// The file already exists and overwriting was not requested.
    #[error("{} already exists", .0.display())]
    AlreadyExists(PathBuf),
    /// The file does not exist.
    #[error("{} not found", .0.display())]
    NotFound(PathBuf),
    /// The superblock or metadata document is unreadable or inconsistent.
    #[error("corrupt metadata: {0}")]
    CorruptMetadata(String),
}

/// The superblock at the start of a dataset file.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct Superblock {
    /// The file format version.
    pub version: u32,
    /// The CRC32C checksum of the metadata document.
    pub checksum: u32,
    /// The file offset of the metadata document.
    pub metadata_offset: u64,
    /// The length of the metadata document.
    pub metadata_length: u64,
}

impl Superblock {
    /// Create a superblock pointing at the metadata document `document` written at `metadata_offset`.
    #[must_use]
    pub fn new(document: &[u8], metadata_offset: u64) -> Self {
        Self {
            version: FORMAT_VERSION,
            checksum: crc32c::crc32c(document),
            metadata_offset,
            metadata_length: document.len() as u64,
        }
    }

    /// The offset immediately after the metadata document.
    #[must_use]
    pub fn metadata_end(&self) -> u64 {
        self.metadata_offset + self.metadata_length
    }

    /// Encode the superblock.
    #[must_use]
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut bytes = BytesMut::with_capacity(SUPERBLOCK_SIZE as usize);
        bytes.put_slice(MAGIC);
        bytes.put_u32_le(self.version);
        bytes.put_u32_le(self.checksum);
        bytes.put_u64_le(self.metadata_offset);
        bytes.put_u64_le(self.metadata_length);
        bytes.resize(SUPERBLOCK_SIZE as usize, 0);
        bytes.to_vec()
    }

    /// Decode a superblock.
    ///
    /// # Errors
    /// Returns [`StorageError::CorruptMetadata`] if the bytes are not a superblock of a supported version.
    pub fn from_bytes(mut bytes: &[u8]) -> Result<Self, StorageError> {
        if bytes.len() < SUPERBLOCK_SIZE as usize {
            return Err(StorageError::CorruptMetadata(
                "the superblock is truncated".to_string(),
            ));
        }
        if &bytes[..MAGIC.len()] != MAGIC {
            return Err(StorageError::CorruptMetadata(
                "not a densefile (bad magic)".to_string(),
            ));
        }
        bytes.advance(MAGIC.len());
        let superblock = Self {
            version: bytes.get_u32_le(),
            checksum: bytes.get_u32_le(),
            metadata_offset: bytes.get_u64_le(),
            metadata_length: bytes.get_u64_le(),
        };
        if superblock.version != FORMAT_VERSION {
            return Err(StorageError::CorruptMetadata(format!(
                "unsupported format version {}",
                superblock.version
            )));
        }
        Ok(superblock)
    }
}

/// An open dataset file.
#[derive(Debug)]
pub struct StorageFile {
    path: PathBuf,
    file: Mutex<File>,
}

impl StorageFile {
    /// Create a new empty file at `path`.
    ///
    /// # Errors
    /// Returns [`StorageError::AlreadyExists`] if `path` exists and `overwrite` is false, or an IO error.
    pub fn create(path: &Path, overwrite: bool) -> Result<Self, StorageError> {
        let mut options = OpenOptions::new();
        options.read(true).write(true);
        if overwrite {
            options.create(true).truncate(true);
        } else {
            options.create_new(true);
        }
        let file = options.open(path).map_err(|err| match err.kind() {
            std::io::ErrorKind::AlreadyExists => StorageError::AlreadyExists(path.to_path_buf()),
            _ => StorageError::IOError(err),
        })?;
        log::trace!("create {}", path.display());
        Ok(Self {
            path: path.to_path_buf(),
            file: Mutex::new(file),
        })
    }

    /// Open the existing file at `path`.
    ///
    /// # Errors
    /// Returns [`StorageError::NotFound`] if `path` does not exist, or an IO error.
    pub fn open(path: &Path, writable: bool) -> Result<Self, StorageError> {
        let file = OpenOptions::new()
            .read(true)
            .write(writable)
            .open(path)
            .map_err(|err| match err.kind() {
                std::io::ErrorKind::NotFound => StorageError::NotFound(path.to_path_buf()),
                _ => StorageError::IOError(err),
            })?;
        log::trace!("open {} (writable: {writable})", path.display());
        Ok(Self {
            path: path.to_path_buf(),
            file: Mutex::new(file),
        })
    }

    /// Return the path of the file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Return the length of the file.
    ///
    /// # Errors
    /// Returns an IO error if the file metadata cannot be read.
    pub fn len(&self) -> Result<u64, StorageError> {
        Ok(self.file.lock().metadata()?.len())
    }

    /// Extend or truncate the file to `len` bytes. Extended bytes read as zero.
    ///
    /// # Errors
    /// Returns an IO error if the file cannot be resized.
    pub fn set_len(&self, len: u64) -> Result<(), StorageError> {
        log::trace!("set_len {len}");
        self.file.lock().set_len(len)?;
        Ok(())
    }

    /// Read `byte_range` of the file.
    ///
    /// # Errors
    /// Returns an IO error if the byte range extends beyond the end of the file.
    ///
    /// # Panics
    /// Panics if the byte range length exceeds `usize::MAX`.
    pub fn read(&self, byte_range: ByteRange) -> Result<Vec<u8>, StorageError> {
        let mut file = self.file.lock();
        let size = file.metadata()?.len();
        if !byte_range.is_within(size) {
            return Err(std::io::Error::new(
                std::io::ErrorKind::UnexpectedEof,
                format!("byte range {byte_range} is beyond the end of the file ({size} bytes)"),
            )
            .into());
        }
        let range = byte_range.to_range(size);
        log::trace!("read {}..{}", range.start, range.end);
        file.seek(SeekFrom::Start(range.start))?;
        let mut buffer = vec![0; usize::try_from(range.end - range.start).unwrap()];
        file.read_exact(&mut buffer)?;
        Ok(buffer)
    }

    /// Read multiple byte ranges of the file.
    ///
    /// # Errors
    /// See [`StorageFile::read`].
    pub fn read_byte_ranges(&self, byte_ranges: &[ByteRange]) -> Result<Vec<Vec<u8>>, StorageError> {
        byte_ranges
            .iter()
            .map(|byte_range| self.read(*byte_range))
            .collect()
    }

    /// Write `bytes` at `offset`, extending the file if needed.
    ///
    /// # Errors
    /// Returns an IO error if the write fails.
    pub fn write(&self, offset: ByteOffset, bytes: &[u8]) -> Result<(), StorageError> {
        log::trace!("write {}..{}", offset, offset + bytes.len() as u64);
        let mut file = self.file.lock();
        file.seek(SeekFrom::Start(offset))?;
        file.write_all(bytes)?;
        Ok(())
    }

    /// Flush written data to the storage device.
    ///
    /// # Errors
    /// Returns an IO error if syncing fails.
    pub fn sync(&self) -> Result<(), StorageError> {
        log::trace!("sync {}", self.path.display());
        self.file.lock().sync_data()?;
        Ok(())
    }

    /// Read the superblock.
    ///
    /// # Errors
    /// Returns [`StorageError::CorruptMetadata`] if the superblock is missing or invalid.
    pub fn read_superblock(&self) -> Result<Superblock, StorageError> {
        let bytes = match self.read(ByteRange::FromStart(0, Some(SUPERBLOCK_SIZE))) {
            Ok(bytes) => bytes,
            Err(StorageError::IOError(err)) if err.kind() == std::io::ErrorKind::UnexpectedEof => {
                return Err(StorageError::CorruptMetadata(
                    "the file is shorter than a superblock".to_string(),
                ))
            }
            Err(err) => return Err(err),
        };
        Superblock::from_bytes(&bytes)
    }

    /// Read and validate the metadata document the superblock points at.
    ///
    /// The checksum is verified if [`validate_checksums`](crate::config::Config#validate-checksums) is enabled.
    ///
    /// # Errors
    /// Returns [`StorageError::CorruptMetadata`] if the superblock or metadata document is invalid.
    pub fn read_metadata(&self) -> Result<(DatasetMetadata, Superblock), StorageError> {
        let superblock = self.read_superblock()?;
        let file_len = self.len()?;
        let metadata_range =
            ByteRange::FromStart(superblock.metadata_offset, Some(superblock.metadata_length));
        if superblock.metadata_offset < SUPERBLOCK_SIZE || !metadata_range.is_within(file_len) {
            return Err(StorageError::CorruptMetadata(format!(
                "the metadata document at {metadata_range} is outside of the file ({file_len} bytes)"
            )));
        }
        let document = self.read(metadata_range)?;
        if global_config().validate_checksums() && crc32c::crc32c(&document) != superblock.checksum
        {
            return Err(StorageError::CorruptMetadata(
                "the metadata document checksum does not match".to_string(),
            ));
        }
        let metadata = DatasetMetadata::from_bytes(&document, file_len)
            .map_err(|err| StorageError::CorruptMetadata(err.to_string()))?;
        Ok((metadata, superblock))
    }

    /// Commit a metadata document: write it at `offset` then repoint the superblock at it.
    ///
    /// Data is synced before and after the superblock is rewritten if [`sync_metadata`](crate::config::Config#sync-metadata) is enabled.
    ///
    /// # Errors
    /// Returns a [`StorageError`] if the metadata cannot be serialised or written.
    pub fn commit_metadata(
        &self,
        metadata: &DatasetMetadata,
        offset: ByteOffset,
    ) -> Result<Superblock, StorageError> {
        let document = metadata
            .to_bytes()
            .map_err(|err| StorageError::CorruptMetadata(err.to_string()))?;
        self.commit_document(&document, offset)
    }

    /// Commit an already serialised metadata document. See [`StorageFile::commit_metadata`].
    ///
    /// # Errors
    /// Returns a [`StorageError`] if the document cannot be written.
    pub fn commit_document(
        &self,
        document: &[u8],
        offset: ByteOffset,
    ) -> Result<Superblock, StorageError> {
        debug_assert!(offset >= SUPERBLOCK_SIZE);
        let sync = global_config().sync_metadata();
        let superblock = Superblock::new(document, offset);
        self.write(offset, document)?;
        if sync {
            self.sync()?;
        }
        self.write(0, &superblock.to_bytes())?;
        if sync {
            self.sync()?;
        }
        log::debug!(
            "committed {} byte metadata document at {} in {}",
            document.len(),
            offset,
            self.path.display()
        );
        Ok(superblock)
    }
}

#[cfg(test)]
mod tests {
    use crate::dataset::{DataType, LayoutDescriptor};

    use super::*;

    #[test]
    fn superblock_round_trip() {
        let superblock = Superblock::new(b"{}", 1024);
        let bytes = superblock.to_bytes();
        assert_eq!(bytes.len(), 64);
        assert_eq!(&bytes[..8], MAGIC);
        assert_eq!(Superblock::from_bytes(&bytes).unwrap(), superblock);
        assert_eq!(superblock.metadata_end(), 1026);
    }

    #[test]
    fn superblock_invalid() {
        let mut bytes = Superblock::new(b"{}", 64).to_bytes();
        assert!(Superblock::from_bytes(&bytes[..32]).is_err());
        bytes[8] = 9;
        assert!(matches!(
            Superblock::from_bytes(&bytes),
            Err(StorageError::CorruptMetadata(_))
        ));
        bytes[0] = b'X';
        assert!(matches!(
            Superblock::from_bytes(&bytes),
            Err(StorageError::CorruptMetadata(_))
        ));
    }

    #[test]
    fn storage_file_create_open() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("test.dense");
        let file = StorageFile::create(&path, false).unwrap();
        file.write(4, &[1, 2, 3]).unwrap();
        assert_eq!(file.len().unwrap(), 7);
        assert_eq!(
            file.read(ByteRange::FromStart(3, Some(3))).unwrap(),
            vec![0, 1, 2]
        );
        assert_eq!(file.read(ByteRange::FromEnd(0, Some(2))).unwrap(), vec![2, 3]);
        assert!(file.read(ByteRange::FromStart(5, Some(3))).is_err());
        drop(file);

        assert!(matches!(
            StorageFile::create(&path, false),
            Err(StorageError::AlreadyExists(_))
        ));
        assert!(matches!(
            StorageFile::open(&dir.path().join("missing.dense"), false),
            Err(StorageError::NotFound(_))
        ));

        let file = StorageFile::open(&path, false).unwrap();
        assert!(file.write(0, &[0]).is_err());
        assert!(matches!(
            file.read_superblock(),
            Err(StorageError::CorruptMetadata(_))
        ));

        let file = StorageFile::create(&path, true).unwrap();
        assert_eq!(file.len().unwrap(), 0);
    }

    #[test]
    fn storage_file_commit_metadata() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("test.dense");
        let file = StorageFile::create(&path, false).unwrap();
        let layout = LayoutDescriptor::new_contiguous(vec![4, 4], DataType::UInt16);
        let metadata =
            DatasetMetadata::new_contiguous("test".to_string(), layout, SUPERBLOCK_SIZE);
        file.set_len(SUPERBLOCK_SIZE + 32).unwrap();
        let superblock = file.commit_metadata(&metadata, SUPERBLOCK_SIZE + 32).unwrap();
        assert_eq!(file.len().unwrap(), superblock.metadata_end());

        let (metadata_read, superblock_read) = file.read_metadata().unwrap();
        assert_eq!(metadata_read, metadata);
        assert_eq!(superblock_read, superblock);

        // A torn document is detected by its checksum
        file.write(superblock.metadata_offset + 1, b"x").unwrap();
        assert!(matches!(
            file.read_metadata(),
            Err(StorageError::CorruptMetadata(_))
        ));
    }
}
