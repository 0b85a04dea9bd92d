//! Compile-time registration of codecs.
//!
//! A [`Plugin`] turns [`Metadata`] into an object, such as a [chunk codec](crate::dataset::codec).
//! Plugins are submitted with [`inventory`], so a [layout descriptor](crate::dataset::LayoutDescriptor) can name a codec that the storage engine resolves at runtime by matching names.

use thiserror::Error;

use crate::metadata::{ConfigurationInvalidError, Metadata};

/// A registered constructor of `TPlugin` objects from metadata.
pub struct Plugin<TPlugin> {
    identifier: &'static str,
    match_name_fn: fn(name: &str) -> bool,
    create_fn: fn(metadata: &Metadata) -> Result<TPlugin, PluginCreateError>,
}

/// An error creating an object from a plugin.
#[derive(Error, Debug)]
pub enum PluginCreateError {
    /// No registered plugin matches the metadata name.
    #[error("{name} is not supported")]
    Unsupported {
        /// The metadata name.
        name: String,
    },
    /// The metadata configuration was rejected.
    #[error(transparent)]
    ConfigurationInvalid(#[from] ConfigurationInvalidError),
    /// Other
    #[error("{_0}")]
    Other(String),
}

impl From<&str> for PluginCreateError {
    fn from(err: &str) -> Self {
        Self::Other(err.to_string())
    }
}

impl From<String> for PluginCreateError {
    fn from(err: String) -> Self {
        Self::Other(err)
    }
}

impl<TPlugin> Plugin<TPlugin> {
    /// Create a plugin for submission to [`inventory`].
    pub const fn new(
        identifier: &'static str,
        match_name_fn: fn(name: &str) -> bool,
        create_fn: fn(metadata: &Metadata) -> Result<TPlugin, PluginCreateError>,
    ) -> Self {
        Self {
            identifier,
            match_name_fn,
            create_fn,
        }
    }

    /// Create a `TPlugin` from `metadata`.
    ///
    /// # Errors
    /// Returns a [`PluginCreateError`] if the plugin rejects the metadata.
    pub fn create(&self, metadata: &Metadata) -> Result<TPlugin, PluginCreateError> {
        (self.create_fn)(metadata)
    }

    /// Returns true if the plugin handles metadata called `name`.
    #[must_use]
    pub fn match_name(&self, name: &str) -> bool {
        (self.match_name_fn)(name)
    }

    /// The plugin identifier.
    #[must_use]
    pub const fn identifier(&self) -> &'static str {
        self.identifier
    }
}
