use derive_more::{Display, From};
use serde::{Deserialize, Serialize};

/// A wrapper to handle various versions of `zstd` codec configuration parameters.
#[derive(Serialize, Deserialize, Clone, Eq, PartialEq, Debug, Display, From)]
#[serde(untagged)]
pub enum ZstdCodecConfiguration {
    /// Version 1.0.
    V1(ZstdCodecConfigurationV1),
}

/// Configuration parameters for the `zstd` codec (version 1.0).
#[derive(Serialize, Deserialize, Clone, Eq, PartialEq, Debug, Display)]
#[serde(deny_unknown_fields)]
#[display("{}", serde_json::to_string(self).unwrap_or_default())]
pub struct ZstdCodecConfigurationV1 {
    /// The compression level.
    pub level: ZstdCompressionLevel,
    /// Whether to store a content checksum in each frame, verified when decoding.
    #[serde(default)]
    pub checksum: bool,
}

impl ZstdCodecConfigurationV1 {
    /// Create a new `zstd` codec configuration given a [`ZstdCompressionLevel`].
    #[must_use]
    pub const fn new(level: ZstdCompressionLevel, checksum: bool) -> Self {
        Self { level, checksum }
    }
}

/// A Zstd compression level. An integer from -7 to 22 which controls the speed and level of compression (has no impact on decoding).
///
/// A value of 0 indicates to use the default compression level.
/// Otherwise, a higher level is expected to achieve a higher compression ratio at the cost of lower speed.
#[derive(Serialize, Copy, Clone, Eq, PartialEq, Debug, Display)]
pub struct ZstdCompressionLevel(i32);

impl<'de> serde::Deserialize<'de> for ZstdCompressionLevel {
    fn deserialize<D: serde::Deserializer<'de>>(d: D) -> Result<Self, D::Error> {
        let number = serde_json::Number::deserialize(d)?;
        if let Some(number) = number.as_i64() {
            if (-7..=22).contains(&number) {
                #[allow(clippy::cast_possible_truncation)]
                return Ok(Self(number as i32));
            }
        }
        Err(serde::de::Error::custom(
            "Zstd compression level must be an integer between -7 and 22",
        ))
    }
}

impl ZstdCompressionLevel {
    /// Create a new zstd compression level, clamped to -7..=22.
    #[must_use]
    pub fn new(level: i32) -> Self {
        Self(level.clamp(-7, 22))
    }

    /// The underlying integer compression level.
    #[must_use]
    pub const fn as_i32(&self) -> i32 {
        self.0
    }
}
