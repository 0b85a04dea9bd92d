use zstd::zstd_safe;

use crate::{
    dataset::codec::{check_decoded_size, ChunkCodecTraits, CodecError, CodecPlugin},
    metadata::Metadata,
    plugin::PluginCreateError,
};

use super::{ZstdCodecConfiguration, ZstdCodecConfigurationV1, ZstdCompressionLevel};

const IDENTIFIER: &str = "zstd";

// Register the codec.
inventory::submit! {
    CodecPlugin::new(IDENTIFIER, is_name_zstd, create_codec_zstd)
}

fn is_name_zstd(name: &str) -> bool {
    name.eq(IDENTIFIER)
}

fn create_codec_zstd(metadata: &Metadata) -> Result<Box<dyn ChunkCodecTraits>, PluginCreateError> {
    let configuration: ZstdCodecConfiguration = metadata.to_configuration()?;
    Ok(Box::new(ZstdCodec::new_with_configuration(&configuration)))
}

/// A `zstd` codec implementation.
#[derive(Clone, Debug)]
pub struct ZstdCodec {
    compression: ZstdCompressionLevel,
    checksum: bool,
}

impl ZstdCodec {
    /// Create a new `zstd` codec. The compression level is clamped to -7..=22.
    #[must_use]
    pub fn new(compression: zstd_safe::CompressionLevel, checksum: bool) -> Self {
        Self {
            compression: ZstdCompressionLevel::new(compression),
            checksum,
        }
    }

    /// Create a new `zstd` codec from configuration.
    #[must_use]
    pub const fn new_with_configuration(configuration: &ZstdCodecConfiguration) -> Self {
        let ZstdCodecConfiguration::V1(configuration) = configuration;
        Self {
            compression: configuration.level,
            checksum: configuration.checksum,
        }
    }
}

impl ChunkCodecTraits for ZstdCodec {
    fn create_metadata(&self) -> Metadata {
        let configuration = ZstdCodecConfigurationV1::new(self.compression, self.checksum);
        Metadata::new_with_serializable_configuration(IDENTIFIER, &configuration)
            .unwrap_or_else(|_| Metadata::new(IDENTIFIER))
    }

    fn encode(&self, decoded_value: Vec<u8>) -> Result<Vec<u8>, CodecError> {
        let mut result = Vec::<u8>::new();
        let mut encoder = zstd::Encoder::new(&mut result, self.compression.as_i32())?;
        encoder.include_checksum(self.checksum)?;
        std::io::copy(&mut decoded_value.as_slice(), &mut encoder)?;
        encoder.finish()?;
        Ok(result)
    }

    fn decode(&self, encoded_value: Vec<u8>, decoded_size: usize) -> Result<Vec<u8>, CodecError> {
        let decoded = zstd::bulk::decompress(&encoded_value, decoded_size)?;
        check_decoded_size(decoded, decoded_size)
    }
}
