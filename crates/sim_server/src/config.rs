//! Server configuration.

use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use sim_system::SystemLoader;
use sim_world::SceneDescription;

use crate::fetch::ResourceFetcher;

/// Where the server gets its worlds from. Selected explicitly, never
/// auto-detected.
#[derive(Debug, Clone, Default, PartialEq)]
pub enum WorldSource {
    /// Load the built-in empty world.
    #[default]
    None,
    /// A pre-built, in-memory scene.
    Description(SceneDescription),
    /// A literal JSON scene description.
    Literal(String),
    /// A file path, bare file name searched on the resource paths, or
    /// `http(s)://` URI handed to the fetcher.
    File(String),
}

impl fmt::Display for WorldSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::None => f.write_str("default world"),
            Self::Description(scene) => write!(f, "in-memory scene ({} worlds)", scene.worlds.len()),
            Self::Literal(_) => f.write_str("literal description"),
            Self::File(path) => write!(f, "file [{path}]"),
        }
    }
}

/// Configuration for a [`crate::Server`].
#[derive(Debug, Clone, Default)]
pub struct ServerConfig {
    source: WorldSource,
    update_period: Option<Duration>,
    download_in_parallel: bool,
    resource_cache: Option<PathBuf>,
    resource_paths: Vec<PathBuf>,
    loader: SystemLoader,
    fetcher: Option<Arc<dyn ResourceFetcher>>,
}

impl ServerConfig {
    /// Default configuration: the built-in empty world, no plugins.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Load worlds from an in-memory scene.
    #[must_use]
    pub fn with_description(mut self, scene: SceneDescription) -> Self {
        self.source = WorldSource::Description(scene);
        self
    }

    /// Load worlds from a literal JSON description.
    #[must_use]
    pub fn with_literal(mut self, text: impl Into<String>) -> Self {
        self.source = WorldSource::Literal(text.into());
        self
    }

    /// Load worlds from a file or URI.
    #[must_use]
    pub fn with_file(mut self, path: impl Into<String>) -> Self {
        self.source = WorldSource::File(path.into());
        self
    }

    /// Set the update rate in Hz. Non-positive rates leave the world's own
    /// real-time factor in charge.
    #[must_use]
    pub fn with_update_rate(mut self, hz: f64) -> Self {
        self.update_period = (hz.is_finite() && hz > 0.0)
            .then(|| Duration::try_from_secs_f64(1.0 / hz).ok())
            .flatten();
        self
    }

    /// Set the wall-clock period per step, overriding each world's
    /// real-time factor.
    #[must_use]
    pub fn with_update_period(mut self, period: Duration) -> Self {
        self.update_period = Some(period);
        self
    }

    /// Fetch world includes on a background thread.
    #[must_use]
    pub fn with_download_in_parallel(mut self, parallel: bool) -> Self {
        self.download_in_parallel = parallel;
        self
    }

    /// Directory fetched resources are cached in.
    #[must_use]
    pub fn with_resource_cache(mut self, dir: impl Into<PathBuf>) -> Self {
        self.resource_cache = Some(dir.into());
        self
    }

    /// Directories searched for world files ahead of the environment and
    /// install paths.
    #[must_use]
    pub fn with_resource_paths<I, P>(mut self, paths: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: Into<PathBuf>,
    {
        self.resource_paths.extend(paths.into_iter().map(Into::into));
        self
    }

    /// Plugin registry used to instantiate the systems worlds declare.
    #[must_use]
    pub fn with_loader(mut self, loader: SystemLoader) -> Self {
        self.loader = loader;
        self
    }

    /// Fetcher for remote worlds and includes.
    #[must_use]
    pub fn with_fetcher(mut self, fetcher: Arc<dyn ResourceFetcher>) -> Self {
        self.fetcher = Some(fetcher);
        self
    }

    /// The configured world source.
    #[must_use]
    pub fn source(&self) -> &WorldSource {
        &self.source
    }

    /// The update period override, if any.
    #[must_use]
    pub fn update_period(&self) -> Option<Duration> {
        self.update_period
    }

    /// Whether includes are fetched in the background.
    #[must_use]
    pub fn download_in_parallel(&self) -> bool {
        self.download_in_parallel
    }

    /// The resource cache directory, if set.
    #[must_use]
    pub fn resource_cache(&self) -> Option<&PathBuf> {
        self.resource_cache.as_ref()
    }

    /// Extra search directories.
    #[must_use]
    pub fn resource_paths(&self) -> &[PathBuf] {
        &self.resource_paths
    }

    /// The plugin registry.
    #[must_use]
    pub fn loader(&self) -> &SystemLoader {
        &self.loader
    }

    /// The configured fetcher, if any.
    #[must_use]
    pub fn fetcher(&self) -> Option<&Arc<dyn ResourceFetcher>> {
        self.fetcher.as_ref()
    }
}
