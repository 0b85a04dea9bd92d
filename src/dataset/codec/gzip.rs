//! The `gzip` chunk codec.
//!
//! Applies gzip (RFC 1952) compression to each chunk.
//! Configured with a [`DeflateCompressionLevel`].

use std::io::{Cursor, Read};

use flate2::bufread::{GzDecoder, GzEncoder};

use crate::{
    dataset::codec::{check_decoded_size, ChunkCodecTraits, CodecError, CodecPlugin},
    metadata::Metadata,
    plugin::PluginCreateError,
};

use super::deflate::{
    DeflateCodecConfiguration, DeflateCodecConfigurationV1, DeflateCompressionLevel,
    DeflateCompressionLevelError,
};

const IDENTIFIER: &str = "gzip";

// Register the codec.
inventory::submit! {
    CodecPlugin::new(IDENTIFIER, is_name_gzip, create_codec_gzip)
}

fn is_name_gzip(name: &str) -> bool {
    name.eq(IDENTIFIER)
}

fn create_codec_gzip(metadata: &Metadata) -> Result<Box<dyn ChunkCodecTraits>, PluginCreateError> {
    let configuration: DeflateCodecConfiguration = metadata.to_configuration()?;
    let DeflateCodecConfiguration::V1(configuration) = configuration;
    Ok(Box::new(GzipCodec {
        compression_level: configuration.level,
    }))
}

/// A `gzip` codec implementation.
#[derive(Clone, Debug)]
pub struct GzipCodec {
    compression_level: DeflateCompressionLevel,
}

impl GzipCodec {
    /// Create a new `gzip` codec.
    ///
    /// # Errors
    /// Returns [`DeflateCompressionLevelError`] if `compression_level` is not valid.
    pub fn new(compression_level: u32) -> Result<Self, DeflateCompressionLevelError> {
        let compression_level: DeflateCompressionLevel = compression_level.try_into()?;
        Ok(Self { compression_level })
    }
}

impl ChunkCodecTraits for GzipCodec {
    fn create_metadata(&self) -> Metadata {
        let configuration = DeflateCodecConfigurationV1::new(self.compression_level);
        Metadata::new_with_serializable_configuration(IDENTIFIER, &configuration)
            .unwrap_or_else(|_| Metadata::new(IDENTIFIER))
    }

    fn encode(&self, decoded_value: Vec<u8>) -> Result<Vec<u8>, CodecError> {
        let mut encoder = GzEncoder::new(
            Cursor::new(decoded_value),
            flate2::Compression::new(self.compression_level.as_u32()),
        );
        let mut out: Vec<u8> = Vec::new();
        encoder.read_to_end(&mut out)?;
        Ok(out)
    }

    fn decode(&self, encoded_value: Vec<u8>, decoded_size: usize) -> Result<Vec<u8>, CodecError> {
        let decoder = GzDecoder::new(Cursor::new(encoded_value));
        let mut out: Vec<u8> = Vec::with_capacity(decoded_size);
        decoder.take(decoded_size as u64 + 1).read_to_end(&mut out)?;
        check_decoded_size(out, decoded_size)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codec_gzip_round_trip() {
        let elements: Vec<u32> = (0..64).map(|i| i % 7).collect();
        let bytes = bytemuck::cast_slice::<u32, u8>(&elements).to_vec();

        let codec = GzipCodec::new(6).unwrap();
        let encoded = codec.encode(bytes.clone()).unwrap();
        // gzip member header
        assert_eq!(&encoded[..2], &[0x1f, 0x8b]);
        let decoded = codec.decode(encoded, bytes.len()).unwrap();
        assert_eq!(bytes, decoded);
    }

    #[test]
    fn codec_gzip_decode_bounded() {
        let codec = GzipCodec::new(9).unwrap();
        let encoded = codec.encode(vec![0; 1 << 20]).unwrap();
        assert!(matches!(
            codec.decode(encoded, 64),
            Err(CodecError::UnexpectedChunkDecodedSize(65, 64))
        ));
    }

    #[test]
    fn codec_gzip_corrupt() {
        let codec = GzipCodec::new(6).unwrap();
        assert!(codec.decode(vec![0, 1, 2, 3], 4).is_err());
    }
}
