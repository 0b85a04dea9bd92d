//! The `zstd` chunk codec.
//!
//! Applies [Zstandard](https://tools.ietf.org/html/rfc8878) compression to each chunk.

mod zstd_codec;
mod zstd_configuration;

pub use zstd_codec::ZstdCodec;
pub use zstd_configuration::{
    ZstdCodecConfiguration, ZstdCodecConfigurationV1, ZstdCompressionLevel,
};

#[cfg(test)]
mod tests {
    use crate::dataset::codec::{codec_from_metadata, ChunkCodecTraits, CodecError};

    use super::*;

    const JSON_VALID: &str = r#"{
        "level": 22,
        "checksum": false
    }"#;

    #[test]
    fn codec_zstd_round_trip() {
        let elements: Vec<f64> = (0..128).map(f64::from).collect();
        let bytes = bytemuck::cast_slice::<f64, u8>(&elements).to_vec();

        let configuration: ZstdCodecConfiguration = serde_json::from_str(JSON_VALID).unwrap();
        let codec = ZstdCodec::new_with_configuration(&configuration);

        let encoded = codec.encode(bytes.clone()).unwrap();
        let decoded = codec.decode(encoded, bytes.len()).unwrap();
        assert_eq!(bytes, decoded);
    }

    #[test]
    fn codec_zstd_checksum() {
        let codec = ZstdCodec::new(3, true);
        let mut encoded = codec.encode(vec![7; 1000]).unwrap();
        let last = encoded.len() - 1;
        encoded[last] ^= 0xFF;
        assert!(codec.decode(encoded, 1000).is_err());
    }

    #[test]
    fn codec_zstd_decode_bounded() {
        let codec = ZstdCodec::new(3, false);
        let encoded = codec.encode(vec![0; 1 << 20]).unwrap();
        assert!(codec.decode(encoded.clone(), 64).is_err());
        assert!(matches!(
            codec.decode(encoded, 2 << 20),
            Err(CodecError::UnexpectedChunkDecodedSize(1_048_576, 2_097_152))
        ));
    }

    #[test]
    fn codec_zstd_metadata() {
        let metadata = ZstdCodec::new(-3, false).create_metadata();
        assert_eq!(
            serde_json::to_string(&metadata).unwrap(),
            r#"{"name":"zstd","configuration":{"level":-3,"checksum":false}}"#
        );
        let codec = codec_from_metadata(&metadata).unwrap();
        assert_eq!(codec.create_metadata(), metadata);
    }
}
