//! World descriptions.
//!
//! The host receives worlds as JSON: either a scene object holding a
//! `worlds` array or a single world object. Each world lists its step
//! configuration, its plugins, a tree of named entities (each with plugins
//! of its own) and the resource URIs it includes.
//!
//! ```json
//! {
//!   "worlds": [{
//!     "name": "shapes",
//!     "step_size": 0.001,
//!     "real_time_factor": 1.0,
//!     "plugins": [{ "name": "scene_broadcaster" }],
//!     "entities": [{
//!       "name": "box",
//!       "children": [{ "name": "link" }],
//!       "plugins": [{ "name": "set_model_state", "config": { "joints": [] } }]
//!     }],
//!     "includes": ["https://example.org/models/box"]
//!   }]
//! }
//! ```

use std::collections::BTreeSet;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use sim_system::PluginConfig;

use crate::error::WorldError;

/// Step size used when a world does not declare one, in seconds.
pub const DEFAULT_STEP_SIZE: f64 = 0.001;

fn default_step_size() -> f64 {
    DEFAULT_STEP_SIZE
}

fn default_real_time_factor() -> f64 {
    1.0
}

/// A set of worlds loaded from one source.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SceneDescription {
    /// The worlds, in load order.
    #[serde(default)]
    pub worlds: Vec<WorldDescription>,
}

/// One world.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorldDescription {
    /// World name.
    pub name: String,
    /// Simulated seconds advanced per step.
    #[serde(default = "default_step_size")]
    pub step_size: f64,
    /// Target ratio of simulated to wall-clock time. `<= 0` runs unthrottled.
    #[serde(default = "default_real_time_factor")]
    pub real_time_factor: f64,
    /// Plugins attached to the world entity.
    #[serde(default)]
    pub plugins: Vec<PluginDescription>,
    /// Top-level entities.
    #[serde(default)]
    pub entities: Vec<EntityDescription>,
    /// Resource URIs that must be fetched before the world is complete.
    #[serde(default)]
    pub includes: Vec<String>,
}

/// A named entity and its subtree.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EntityDescription {
    /// Entity name.
    pub name: String,
    /// Child entities.
    #[serde(default)]
    pub children: Vec<EntityDescription>,
    /// Plugins attached to this entity.
    #[serde(default)]
    pub plugins: Vec<PluginDescription>,
}

/// A plugin reference plus its verbatim configuration block.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PluginDescription {
    /// Name the plugin factory is registered under.
    pub name: String,
    /// Configuration handed to the plugin's `configure`.
    #[serde(default)]
    pub config: PluginConfig,
}

impl SceneDescription {
    /// A scene holding the built-in empty world.
    #[must_use]
    pub fn default_world(name: &str) -> Self {
        Self {
            worlds: vec![WorldDescription::new(name)],
        }
    }

    /// Parse a scene from JSON text. A bare world object is accepted as a
    /// one-world scene.
    ///
    /// # Errors
    ///
    /// Returns [`WorldError::Parse`] for malformed JSON and the validation
    /// errors of [`SceneDescription::validate`].
    pub fn from_json(text: &str) -> Result<Self, WorldError> {
        let value: serde_json::Value = serde_json::from_str(text)?;
        let scene = if value.get("worlds").is_some() {
            serde_json::from_value(value)?
        } else {
            Self {
                worlds: vec![serde_json::from_value(value)?],
            }
        };
        scene.validate()?;
        Ok(scene)
    }

    /// Read and parse a scene file.
    ///
    /// # Errors
    ///
    /// Returns [`WorldError::Io`] if the file cannot be read, otherwise the
    /// errors of [`SceneDescription::from_json`].
    pub fn from_file(path: &Path) -> Result<Self, WorldError> {
        let text = std::fs::read_to_string(path).map_err(|source| WorldError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json(&text)
    }

    /// Check every world and reject duplicate names.
    ///
    /// # Errors
    ///
    /// Returns the first problem found.
    pub fn validate(&self) -> Result<(), WorldError> {
        let mut seen = BTreeSet::new();
        for world in &self.worlds {
            world.validate()?;
            if !seen.insert(world.name.as_str()) {
                return Err(WorldError::DuplicateWorld(world.name.clone()));
            }
        }
        Ok(())
    }

    /// Names of all worlds, in order.
    #[must_use]
    pub fn world_names(&self) -> Vec<String> {
        self.worlds.iter().map(|w| w.name.clone()).collect()
    }

    /// Every include URI across all worlds, deduplicated, in first-seen order.
    #[must_use]
    pub fn includes(&self) -> Vec<String> {
        let mut seen = BTreeSet::new();
        self.worlds
            .iter()
            .flat_map(|w| w.includes.iter())
            .filter(|uri| seen.insert(uri.as_str()))
            .cloned()
            .collect()
    }
}

impl WorldDescription {
    /// An empty world with default step configuration.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            step_size: DEFAULT_STEP_SIZE,
            real_time_factor: default_real_time_factor(),
            plugins: Vec::new(),
            entities: Vec::new(),
            includes: Vec::new(),
        }
    }

    /// Set the step size in seconds.
    #[must_use]
    pub fn with_step_size(mut self, seconds: f64) -> Self {
        self.step_size = seconds;
        self
    }

    /// Set the real-time factor.
    #[must_use]
    pub fn with_real_time_factor(mut self, rtf: f64) -> Self {
        self.real_time_factor = rtf;
        self
    }

    /// Attach a world-level plugin.
    #[must_use]
    pub fn with_plugin(mut self, plugin: PluginDescription) -> Self {
        self.plugins.push(plugin);
        self
    }

    /// Add a top-level entity.
    #[must_use]
    pub fn with_entity(mut self, entity: EntityDescription) -> Self {
        self.entities.push(entity);
        self
    }

    /// Check the name and step size.
    ///
    /// # Errors
    ///
    /// [`WorldError::EmptyName`] or [`WorldError::InvalidStepSize`].
    pub fn validate(&self) -> Result<(), WorldError> {
        if self.name.is_empty() {
            return Err(WorldError::EmptyName);
        }
        self.step_duration().map(|_| ())
    }

    /// The step size as a [`Duration`].
    ///
    /// # Errors
    ///
    /// Returns [`WorldError::InvalidStepSize`] for zero, negative or
    /// non-finite step sizes, and for sizes that round to zero nanoseconds.
    pub fn step_duration(&self) -> Result<Duration, WorldError> {
        let invalid = || WorldError::InvalidStepSize {
            world: self.name.clone(),
            seconds: self.step_size,
        };
        if !(self.step_size.is_finite() && self.step_size > 0.0) {
            return Err(invalid());
        }
        match Duration::try_from_secs_f64(self.step_size) {
            Ok(step) if !step.is_zero() => Ok(step),
            _ => Err(invalid()),
        }
    }

    /// Wall-clock period per step implied by the real-time factor, or
    /// [`Duration::ZERO`] when unthrottled.
    #[must_use]
    pub fn update_period(&self) -> Duration {
        if !(self.real_time_factor.is_finite() && self.real_time_factor > 0.0) {
            return Duration::ZERO;
        }
        Duration::try_from_secs_f64(self.step_size / self.real_time_factor).unwrap_or(Duration::ZERO)
    }

    /// Total number of entities described, including nested children.
    #[must_use]
    pub fn entity_count(&self) -> usize {
        fn count(e: &EntityDescription) -> usize {
            1 + e.children.iter().map(count).sum::<usize>()
        }
        self.entities.iter().map(count).sum()
    }
}

impl EntityDescription {
    /// A childless, plugin-less entity.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    /// Add a child entity.
    #[must_use]
    pub fn with_child(mut self, child: EntityDescription) -> Self {
        self.children.push(child);
        self
    }

    /// Attach a plugin.
    #[must_use]
    pub fn with_plugin(mut self, plugin: PluginDescription) -> Self {
        self.plugins.push(plugin);
        self
    }
}

impl PluginDescription {
    /// Reference a plugin with an empty configuration block.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            config: PluginConfig::default(),
        }
    }

    /// Set the configuration block.
    #[must_use]
    pub fn with_config(mut self, config: impl Into<PluginConfig>) -> Self {
        self.config = config.into();
        self
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use serde_json::json;

    use super::*;

    const SHAPES: &str = r#"{
        "worlds": [{
            "name": "shapes",
            "step_size": 0.002,
            "plugins": [{ "name": "printer" }],
            "entities": [{
                "name": "box",
                "children": [{ "name": "link" }, { "name": "joint" }],
                "plugins": [{ "name": "set_model_state", "config": { "joint": "joint" } }]
            }],
            "includes": ["https://example.org/box", "https://example.org/box"]
        }]
    }"#;

    #[test]
    fn test_parse_scene() {
        let scene = SceneDescription::from_json(SHAPES).unwrap();
        assert_eq!(scene.world_names(), vec!["shapes"]);
        let world = &scene.worlds[0];
        assert_eq!(world.step_duration().unwrap(), Duration::from_millis(2));
        assert_eq!(world.real_time_factor, 1.0);
        assert_eq!(world.entity_count(), 3);
        assert_eq!(world.entities[0].plugins[0].config.get("joint"), Some(&json!("joint")));
        assert_eq!(scene.includes(), vec!["https://example.org/box"]);
    }

    #[test]
    fn test_bare_world_object() {
        let scene = SceneDescription::from_json(r#"{ "name": "empty" }"#).unwrap();
        assert_eq!(scene.worlds.len(), 1);
        assert_eq!(scene.worlds[0].step_size, DEFAULT_STEP_SIZE);
    }

    #[test]
    fn test_negative_step_rejected() {
        let err = SceneDescription::from_json(r#"{ "name": "rewind", "step_size": -0.001 }"#)
            .unwrap_err();
        assert!(matches!(err, WorldError::InvalidStepSize { .. }));
        let zero = WorldDescription::new("still").with_step_size(0.0);
        assert!(zero.validate().is_err());
    }

    #[test]
    fn test_sub_nanosecond_step_rejected() {
        let tiny = WorldDescription::new("tiny").with_step_size(1e-10);
        assert!(matches!(
            tiny.step_duration(),
            Err(WorldError::InvalidStepSize { .. })
        ));
        let one_ns = WorldDescription::new("fine").with_step_size(1e-9);
        assert_eq!(one_ns.step_duration().unwrap(), Duration::from_nanos(1));
    }

    #[test]
    fn test_duplicate_worlds_rejected() {
        let scene = SceneDescription {
            worlds: vec![WorldDescription::new("a"), WorldDescription::new("a")],
        };
        assert!(matches!(scene.validate(), Err(WorldError::DuplicateWorld(name)) if name == "a"));
    }

    #[test]
    fn test_malformed_json() {
        assert!(matches!(
            SceneDescription::from_json("{ not json"),
            Err(WorldError::Parse(_))
        ));
    }

    #[test]
    fn test_update_period_from_rtf() {
        let world = WorldDescription::new("w").with_step_size(0.01).with_real_time_factor(2.0);
        assert_eq!(world.update_period(), Duration::from_millis(5));
        let fast = world.with_real_time_factor(0.0);
        assert_eq!(fast.update_period(), Duration::ZERO);
    }

    #[test]
    fn test_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(SHAPES.as_bytes()).unwrap();
        let scene = SceneDescription::from_file(file.path()).unwrap();
        assert_eq!(scene.worlds[0].name, "shapes");

        let missing = SceneDescription::from_file(Path::new("/definitely/not/here.json"));
        assert!(matches!(missing, Err(WorldError::Io { .. })));
    }

    #[test]
    fn test_default_world() {
        let scene = SceneDescription::default_world("default");
        assert_eq!(scene.world_names(), vec!["default"]);
        assert!(scene.worlds[0].entities.is_empty());
    }
}
