//! Chunk codecs.
//!
//! A codec reversibly transforms the raw bytes of a chunk, typically to compress it.
//! Each chunk is encoded independently, so reading one chunk never requires decoding its neighbours.
//!
//! Codecs are registered as [`CodecPlugin`]s and referenced in a [layout descriptor](super::LayoutDescriptor) by their [`Metadata`].
//! A new codec is added by implementing [`ChunkCodecTraits`] and submitting a [`CodecPlugin`] to [`inventory`].
//!
//! Built-in codecs:
//!  - `deflate`: a zlib stream (feature `deflate`),
//!  - `gzip`: a gzip stream (feature `deflate`),
//!  - `zstd`: a Zstandard frame (feature `zstd`).

#[cfg(feature = "deflate")]
pub mod deflate;
#[cfg(feature = "deflate")]
pub mod gzip;
#[cfg(feature = "zstd")]
pub mod zstd;

use thiserror::Error;

use crate::{
    metadata::Metadata,
    plugin::{Plugin, PluginCreateError},
};

/// A codec plugin.
pub type CodecPlugin = Plugin<Box<dyn ChunkCodecTraits>>;
inventory::collect!(CodecPlugin);

/// Create a codec from metadata.
///
/// # Errors
/// Returns [`PluginCreateError`] if the metadata is invalid or not associated with a registered codec plugin.
pub fn codec_from_metadata(
    metadata: &Metadata,
) -> Result<Box<dyn ChunkCodecTraits>, PluginCreateError> {
    for plugin in inventory::iter::<CodecPlugin> {
        if plugin.match_name(metadata.name()) {
            return plugin.create(metadata);
        }
    }
    Err(PluginCreateError::Unsupported {
        name: metadata.name().to_string(),
    })
}

/// Chunk codec traits.
pub trait ChunkCodecTraits: Send + Sync + core::fmt::Debug {
    /// Create the metadata identifying this codec and its configuration.
    fn create_metadata(&self) -> Metadata;

    /// Encode the raw bytes of a chunk.
    ///
    /// # Errors
    /// Returns [`CodecError`] if a codec fails.
    fn encode(&self, decoded_value: Vec<u8>) -> Result<Vec<u8>, CodecError>;

    /// Decode an encoded chunk, which must decode to exactly `decoded_size` bytes.
    ///
    /// # Errors
    /// Returns [`CodecError`] if a codec fails or the decoded size is unexpected.
    fn decode(&self, encoded_value: Vec<u8>, decoded_size: usize) -> Result<Vec<u8>, CodecError>;
}

/// A codec error.
#[derive(Debug, Error)]
pub enum CodecError {
    /// An IO error.
    #[error(transparent)]
    IOError(#[from] std::io::Error),
    /// The decoded size of a chunk did not match what was expected.
    #[error("the size of a decoded chunk is {_0}, expected {_1}")]
    UnexpectedChunkDecodedSize(usize, usize),
    /// Other
    #[error("{_0}")]
    Other(String),
}

impl From<&str> for CodecError {
    fn from(err: &str) -> Self {
        Self::Other(err.to_string())
    }
}

impl From<String> for CodecError {
    fn from(err: String) -> Self {
        Self::Other(err)
    }
}

/// Check the size of a decoded chunk.
pub(crate) fn check_decoded_size(decoded: Vec<u8>, decoded_size: usize) -> Result<Vec<u8>, CodecError> {
    if decoded.len() == decoded_size {
        Ok(decoded)
    } else {
        Err(CodecError::UnexpectedChunkDecodedSize(
            decoded.len(),
            decoded_size,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codec_unsupported() {
        let err = codec_from_metadata(&Metadata::new("lz4")).unwrap_err();
        assert!(matches!(err, PluginCreateError::Unsupported { name } if name == "lz4"));
    }

    #[cfg(feature = "deflate")]
    #[test]
    fn codec_invalid_configuration() {
        let metadata: Metadata = r#"{"name":"deflate","configuration":{"level":12}}"#
            .try_into()
            .unwrap();
        assert!(matches!(
            codec_from_metadata(&metadata),
            Err(PluginCreateError::ConfigurationInvalid(_))
        ));
    }

    #[test]
    fn codec_decoded_size() {
        assert!(check_decoded_size(vec![0; 4], 4).is_ok());
        assert!(matches!(
            check_decoded_size(vec![0; 3], 4),
            Err(CodecError::UnexpectedChunkDecodedSize(3, 4))
        ));
    }
}
