//! System loader: maps plugin names to factories.
//!
//! World descriptions name their plugins by string. The loader resolves each
//! name to a factory that builds a fresh [`System`] instance, so one plugin
//! can be attached to many entities and many worlds.

use std::collections::BTreeMap;
use std::sync::Arc;

use tracing::debug;

use crate::system::{System, SystemError};

/// Builds a new instance of a system.
pub type SystemFactory = Arc<dyn Fn() -> Box<dyn System> + Send + Sync>;

/// Registry of all plugin factories known to the host.
#[derive(Clone, Default)]
pub struct SystemLoader {
    factories: BTreeMap<String, SystemFactory>,
}

impl std::fmt::Debug for SystemLoader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SystemLoader")
            .field("plugins", &self.factories.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl SystemLoader {
    /// Create an empty loader.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a factory under `name`, replacing any previous one.
    pub fn register<F>(&mut self, name: impl Into<String>, factory: F)
    where
        F: Fn() -> Box<dyn System> + Send + Sync + 'static,
    {
        let name = name.into();
        debug!(plugin = %name, "registered plugin factory");
        self.factories.insert(name, Arc::new(factory));
    }

    /// Builder-style [`SystemLoader::register`].
    #[must_use]
    pub fn with<F>(mut self, name: impl Into<String>, factory: F) -> Self
    where
        F: Fn() -> Box<dyn System> + Send + Sync + 'static,
    {
        self.register(name, factory);
        self
    }

    /// Build a new instance of the plugin called `name`.
    ///
    /// # Errors
    ///
    /// Returns [`SystemError::UnknownPlugin`] if nothing is registered under
    /// that name.
    pub fn instantiate(&self, name: &str) -> Result<Box<dyn System>, SystemError> {
        self.factories
            .get(name)
            .map(|factory| factory())
            .ok_or_else(|| SystemError::UnknownPlugin(name.to_string()))
    }

    /// Returns `true` if a factory is registered under `name`.
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.factories.contains_key(name)
    }

    /// Registered plugin names, sorted.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.factories.keys().map(String::as_str)
    }

    /// Number of registered factories.
    #[must_use]
    pub fn len(&self) -> usize {
        self.factories.len()
    }

    /// Returns `true` if no factories are registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.factories.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::system::Capabilities;

    struct Noop;

    impl System for Noop {
        fn name(&self) -> &str {
            "noop"
        }

        fn capabilities(&self) -> Capabilities {
            Capabilities::NONE
        }
    }

    #[test]
    fn test_register_and_instantiate() {
        let loader = SystemLoader::new().with("noop", || Box::new(Noop));
        assert!(loader.contains("noop"));
        assert_eq!(loader.len(), 1);
        let system = loader.instantiate("noop").unwrap();
        assert_eq!(system.name(), "noop");
    }

    #[test]
    fn test_unknown_plugin() {
        let loader = SystemLoader::new();
        assert!(loader.is_empty());
        assert!(matches!(
            loader.instantiate("physics"),
            Err(SystemError::UnknownPlugin(name)) if name == "physics"
        ));
    }

    #[test]
    fn test_reregister_replaces() {
        let mut loader = SystemLoader::new();
        loader.register("noop", || Box::new(Noop));
        loader.register("noop", || Box::new(Noop));
        assert_eq!(loader.names().collect::<Vec<_>>(), vec!["noop"]);
    }
}
