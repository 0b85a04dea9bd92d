use std::io::{Cursor, Read};

use flate2::bufread::{ZlibDecoder, ZlibEncoder};

use crate::{
    dataset::codec::{check_decoded_size, ChunkCodecTraits, CodecError, CodecPlugin},
    metadata::Metadata,
    plugin::PluginCreateError,
};

use super::{
    DeflateCodecConfiguration, DeflateCodecConfigurationV1, DeflateCompressionLevel,
    DeflateCompressionLevelError,
};

const IDENTIFIER: &str = "deflate";

// Register the codec.
inventory::submit! {
    CodecPlugin::new(IDENTIFIER, is_name_deflate, create_codec_deflate)
}

fn is_name_deflate(name: &str) -> bool {
    name.eq(IDENTIFIER) || name.eq("zlib")
}

fn create_codec_deflate(
    metadata: &Metadata,
) -> Result<Box<dyn ChunkCodecTraits>, PluginCreateError> {
    let configuration: DeflateCodecConfiguration = metadata.to_configuration()?;
    Ok(Box::new(DeflateCodec::new_with_configuration(
        &configuration,
    )))
}

/// A `deflate` codec implementation.
#[derive(Clone, Debug)]
pub struct DeflateCodec {
    compression_level: DeflateCompressionLevel,
}

impl DeflateCodec {
    /// Create a new `deflate` codec.
    ///
    /// # Errors
    /// Returns [`DeflateCompressionLevelError`] if `compression_level` is not valid.
    pub fn new(compression_level: u32) -> Result<Self, DeflateCompressionLevelError> {
        let compression_level: DeflateCompressionLevel = compression_level.try_into()?;
        Ok(Self { compression_level })
    }

    /// Create a new `deflate` codec from configuration.
    #[must_use]
    pub const fn new_with_configuration(configuration: &DeflateCodecConfiguration) -> Self {
        let DeflateCodecConfiguration::V1(configuration) = configuration;
        Self {
            compression_level: configuration.level,
        }
    }
}

impl ChunkCodecTraits for DeflateCodec {
    fn create_metadata(&self) -> Metadata {
        let configuration = DeflateCodecConfigurationV1::new(self.compression_level);
        Metadata::new_with_serializable_configuration(IDENTIFIER, &configuration)
            .unwrap_or_else(|_| Metadata::new(IDENTIFIER))
    }

    fn encode(&self, decoded_value: Vec<u8>) -> Result<Vec<u8>, CodecError> {
        let mut encoder = ZlibEncoder::new(
            Cursor::new(decoded_value),
            flate2::Compression::new(self.compression_level.as_u32()),
        );
        let mut out: Vec<u8> = Vec::new();
        encoder.read_to_end(&mut out)?;
        Ok(out)
    }

    fn decode(&self, encoded_value: Vec<u8>, decoded_size: usize) -> Result<Vec<u8>, CodecError> {
        // one byte past the decoded size is enough to detect an oversized chunk
        let decoder = ZlibDecoder::new(Cursor::new(encoded_value));
        let mut out: Vec<u8> = Vec::with_capacity(decoded_size);
        decoder.take(decoded_size as u64 + 1).read_to_end(&mut out)?;
        check_decoded_size(out, decoded_size)
    }
}
