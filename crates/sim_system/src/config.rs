//! Plugin configuration blocks.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::system::SystemError;

/// The configuration fragment a world description declares for one plugin.
///
/// The host never interprets it; it is handed verbatim to the system's
/// `configure` callback.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PluginConfig(serde_json::Value);

impl PluginConfig {
    /// Wrap a JSON value.
    #[must_use]
    pub fn new(value: serde_json::Value) -> Self {
        Self(value)
    }

    /// The raw JSON value.
    #[must_use]
    pub fn value(&self) -> &serde_json::Value {
        &self.0
    }

    /// Returns `true` for a missing (`null`) or empty-object block.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        match &self.0 {
            serde_json::Value::Null => true,
            serde_json::Value::Object(map) => map.is_empty(),
            _ => false,
        }
    }

    /// Look up a top-level key.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&serde_json::Value> {
        self.0.get(key)
    }

    /// Deserialize a top-level key into `T`. A missing key is `Ok(None)`.
    ///
    /// # Errors
    ///
    /// Returns [`SystemError::InvalidConfig`] if the key exists but has the
    /// wrong shape.
    pub fn get_as<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>, SystemError> {
        match self.0.get(key) {
            Some(value) => Ok(Some(serde_json::from_value(value.clone())?)),
            None => Ok(None),
        }
    }

    /// Deserialize the whole block into `T`.
    ///
    /// # Errors
    ///
    /// Returns [`SystemError::InvalidConfig`] if the block does not match `T`.
    pub fn parse<T: DeserializeOwned>(&self) -> Result<T, SystemError> {
        Ok(serde_json::from_value(self.0.clone())?)
    }
}

impl From<serde_json::Value> for PluginConfig {
    fn from(value: serde_json::Value) -> Self {
        Self(value)
    }
}
