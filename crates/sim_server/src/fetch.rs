//! Remote resource fetching.
//!
//! The server never talks to the network itself. Worlds and includes given
//! as `http(s)://` URIs are handed to a [`ResourceFetcher`], which returns a
//! local path to the fetched file or directory.

use std::fmt;
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::error::ServerError;

/// Resolves remote URIs to local paths.
pub trait ResourceFetcher: fmt::Debug + Send + Sync {
    /// Fetch `uri` and return the local file or directory holding it.
    ///
    /// # Errors
    ///
    /// Returns [`ServerError::Fetch`] if the resource is unavailable.
    fn fetch(&self, uri: &str) -> Result<PathBuf, ServerError>;
}

/// Returns `true` for `http://` and `https://` URIs.
#[must_use]
pub fn is_remote(uri: &str) -> bool {
    uri.starts_with("http://") || uri.starts_with("https://")
}

/// Serves remote URIs from a local cache directory laid out as
/// `<cache>/<host>/<path>`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheFetcher {
    cache: PathBuf,
}

impl CacheFetcher {
    /// Serve from `cache`.
    #[must_use]
    pub fn new(cache: impl Into<PathBuf>) -> Self {
        Self {
            cache: cache.into(),
        }
    }

    /// `$HOME/.sim/resources`, or a directory under the system temp dir
    /// when `HOME` is unset.
    #[must_use]
    pub fn default_cache() -> PathBuf {
        std::env::var_os("HOME")
            .map(|home| PathBuf::from(home).join(".sim").join("resources"))
            .unwrap_or_else(|| std::env::temp_dir().join("sim_resources"))
    }

    /// The cache root.
    #[must_use]
    pub fn cache(&self) -> &Path {
        &self.cache
    }

    /// Where `uri` would live in the cache.
    #[must_use]
    pub fn cache_path(&self, uri: &str) -> Option<PathBuf> {
        let rest = uri
            .strip_prefix("https://")
            .or_else(|| uri.strip_prefix("http://"))?;
        let rest = rest.split(['?', '#']).next().unwrap_or(rest);
        let mut path = self.cache.clone();
        for segment in rest.split('/').filter(|s| !s.is_empty() && *s != "." && *s != "..") {
            path.push(segment);
        }
        Some(path)
    }
}

impl Default for CacheFetcher {
    fn default() -> Self {
        Self::new(Self::default_cache())
    }
}

impl ResourceFetcher for CacheFetcher {
    fn fetch(&self, uri: &str) -> Result<PathBuf, ServerError> {
        let path = self.cache_path(uri).ok_or_else(|| ServerError::Fetch {
            uri: uri.to_string(),
            reason: "not an http(s) URI".to_string(),
        })?;
        if !path.exists() {
            return Err(ServerError::Fetch {
                uri: uri.to_string(),
                reason: format!("not present in cache [{}]", self.cache.display()),
            });
        }
        debug!(uri, path = %path.display(), "resolved resource from cache");
        Ok(path)
    }
}

/// The description file a fetched resource points at: `path` itself if it
/// is a file, otherwise the first `.json` file (by name) inside it.
///
/// # Errors
///
/// [`ServerError::Io`] if the directory cannot be read, or
/// [`ServerError::NoDescription`] if it holds no `.json` file.
pub fn description_file(path: &Path) -> Result<PathBuf, ServerError> {
    if path.is_file() {
        return Ok(path.to_path_buf());
    }
    let entries = std::fs::read_dir(path).map_err(|source| ServerError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let mut candidates: Vec<PathBuf> = entries
        .filter_map(Result::ok)
        .map(|entry| entry.path())
        .filter(|p| p.is_file() && p.extension().is_some_and(|ext| ext == "json"))
        .collect();
    candidates.sort();
    candidates
        .into_iter()
        .next()
        .ok_or_else(|| ServerError::NoDescription(path.to_path_buf()))
}
