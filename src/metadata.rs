//! Metadata.
//!
//! [`Metadata`] names a codec and optionally carries its JSON configuration, as it appears in a [layout descriptor](crate::dataset::LayoutDescriptor).
//! [`DatasetMetadata`] is the document persisted in a file describing its single dataset: name, shape, data type, storage mode and chunk directory.

mod dataset_metadata;

pub use dataset_metadata::{ChunkEntry, DatasetMetadata, DatasetMetadataError, FORMAT_VERSION};

use serde::{de::DeserializeOwned, ser::SerializeMap, Deserialize, Serialize};
use thiserror::Error;

/// A name with an optional configuration.
///
/// Serialised as just the name when there is no configuration:
/// ```json
/// "deflate"
/// ```
/// and otherwise as a map:
/// ```json
/// { "name": "deflate", "configuration": { "level": 6 } }
/// ```
#[derive(Clone, Eq, PartialEq, Debug)]
pub struct Metadata {
    name: String,
    configuration: Option<MetadataConfiguration>,
}

/// A JSON object holding a configuration.
pub type MetadataConfiguration = serde_json::Map<String, serde_json::Value>;

impl TryFrom<&str> for Metadata {
    type Error = serde_json::Error;

    fn try_from(json: &str) -> Result<Self, Self::Error> {
        serde_json::from_str(json)
    }
}

impl core::fmt::Display for Metadata {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match &self.configuration {
            Some(configuration) => write!(
                f,
                "{} {}",
                self.name,
                serde_json::Value::Object(configuration.clone())
            ),
            None => f.write_str(&self.name),
        }
    }
}

impl Serialize for Metadata {
    fn serialize<S: serde::Serializer>(&self, s: S) -> Result<S::Ok, S::Error> {
        match &self.configuration {
            Some(configuration) if !configuration.is_empty() => {
                let mut map = s.serialize_map(Some(2))?;
                map.serialize_entry("name", &self.name)?;
                map.serialize_entry("configuration", configuration)?;
                map.end()
            }
            _ => s.serialize_str(&self.name),
        }
    }
}

impl<'de> Deserialize<'de> for Metadata {
    fn deserialize<D: serde::Deserializer<'de>>(d: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(deny_unknown_fields)]
        struct NameConfiguration {
            name: String,
            #[serde(default)]
            configuration: Option<MetadataConfiguration>,
        }

        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Repr {
            Name(String),
            Map(NameConfiguration),
        }

        match Repr::deserialize(d).map_err(|_| {
            <D::Error as serde::de::Error>::custom(r#"expected "<name>" or {"name":"<name>","configuration":{...}}"#)
        })? {
            Repr::Name(name) => Ok(Self::new(&name)),
            Repr::Map(NameConfiguration {
                name,
                configuration,
            }) => Ok(Self {
                name,
                configuration,
            }),
        }
    }
}

impl Metadata {
    /// Create metadata with a `name` and no configuration.
    #[must_use]
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            configuration: None,
        }
    }

    /// Create metadata with a `name` and a `configuration` that serialises to a JSON object.
    ///
    /// # Errors
    /// Returns [`serde_json::Error`] if `configuration` does not serialise to a JSON object.
    pub fn new_with_serializable_configuration<TConfiguration: Serialize>(
        name: &str,
        configuration: &TConfiguration,
    ) -> Result<Self, serde_json::Error> {
        match serde_json::to_value(configuration)? {
            serde_json::Value::Object(configuration) => Ok(Self {
                name: name.to_string(),
                configuration: Some(configuration),
            }),
            _ => Err(serde::ser::Error::custom(
                "a configuration must serialise to a JSON object",
            )),
        }
    }

    /// Deserialise the configuration, treating a missing configuration as an empty object.
    ///
    /// # Errors
    /// Returns a [`ConfigurationInvalidError`] if the configuration does not deserialise to `TConfiguration`.
    pub fn to_configuration<TConfiguration: DeserializeOwned>(
        &self,
    ) -> Result<TConfiguration, ConfigurationInvalidError> {
        let configuration = self.configuration.clone().unwrap_or_default();
        serde_json::from_value(serde_json::Value::Object(configuration)).map_err(|_| {
            ConfigurationInvalidError {
                name: self.name.clone(),
                configuration: self.configuration.clone(),
            }
        })
    }

    /// The name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The configuration, if any.
    #[must_use]
    pub const fn configuration(&self) -> Option<&MetadataConfiguration> {
        self.configuration.as_ref()
    }
}

/// A configuration that does not match what its named codec accepts.
#[derive(Debug, Error)]
#[error("invalid configuration for {name}: {configuration:?}")]
pub struct ConfigurationInvalidError {
    name: String,
    configuration: Option<MetadataConfiguration>,
}

impl ConfigurationInvalidError {
    /// The name of the metadata with the invalid configuration.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }
}
