//! The `deflate` chunk codec.
//!
//! Applies zlib (RFC 1950) compression to each chunk.

mod deflate_codec;
mod deflate_configuration;

pub use deflate_codec::DeflateCodec;
pub use deflate_configuration::{
    DeflateCodecConfiguration, DeflateCodecConfigurationV1, DeflateCompressionLevel,
    DeflateCompressionLevelError,
};

#[cfg(test)]
mod tests {
    use crate::dataset::codec::{codec_from_metadata, ChunkCodecTraits, CodecError};

    use super::*;

    const JSON_VALID: &str = r#"{
        "level": 5
    }"#;

    #[test]
    fn codec_deflate_round_trip() {
        let elements: Vec<u16> = (0..32).collect();
        let bytes = bytemuck::cast_slice::<u16, u8>(&elements).to_vec();

        let configuration: DeflateCodecConfiguration = serde_json::from_str(JSON_VALID).unwrap();
        let codec = DeflateCodec::new_with_configuration(&configuration);

        let encoded = codec.encode(bytes.clone()).unwrap();
        assert_ne!(encoded, bytes);
        let decoded = codec.decode(encoded, bytes.len()).unwrap();
        assert_eq!(bytes, decoded);
    }

    #[test]
    fn codec_deflate_compresses_zeros() {
        let codec = DeflateCodec::new(9).unwrap();
        let encoded = codec.encode(vec![0; 4096]).unwrap();
        assert!(encoded.len() < 64);
    }

    #[test]
    fn codec_deflate_decoded_size_mismatch() {
        let codec = DeflateCodec::new(1).unwrap();
        let encoded = codec.encode(vec![1; 16]).unwrap();
        assert!(matches!(
            codec.decode(encoded, 15),
            Err(CodecError::UnexpectedChunkDecodedSize(16, 15))
        ));
    }

    #[test]
    fn codec_deflate_decode_bounded() {
        let codec = DeflateCodec::new(9).unwrap();
        let encoded = codec.encode(vec![0; 1 << 20]).unwrap();
        assert!(matches!(
            codec.decode(encoded, 64),
            Err(CodecError::UnexpectedChunkDecodedSize(65, 64))
        ));
    }

    #[test]
    fn codec_deflate_metadata() {
        let codec = DeflateCodec::new(3).unwrap();
        let metadata = codec.create_metadata();
        assert_eq!(
            serde_json::to_string(&metadata).unwrap(),
            r#"{"name":"deflate","configuration":{"level":3}}"#
        );
        let codec = codec_from_metadata(&metadata).unwrap();
        assert_eq!(codec.create_metadata(), metadata);
    }

    #[test]
    fn codec_deflate_invalid_level() {
        assert!(DeflateCodec::new(10).is_err());
    }
}
