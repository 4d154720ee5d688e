//! Search paths for world and resource files.

use std::path::{Path, PathBuf};

use tracing::debug;

/// Environment variable listing extra resource directories, separated the
/// way the platform separates `PATH` entries.
pub const RESOURCE_PATH_ENV: &str = "SIM_RESOURCE_PATH";

/// Directory installed worlds are searched in last.
pub const WORLD_INSTALL_DIR: &str = match option_env!("SIM_WORLD_INSTALL_DIR") {
    Some(dir) => dir,
    None => "/usr/share/sim/worlds",
};

/// Ordered list of directories to search for resources, with an optional
/// fallback directory that is always searched last.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResourcePaths {
    paths: Vec<PathBuf>,
    fallback: Option<PathBuf>,
}

impl ResourcePaths {
    /// Empty search list.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Paths from [`RESOURCE_PATH_ENV`], with [`WORLD_INSTALL_DIR`] as the
    /// fallback.
    #[must_use]
    pub fn from_env() -> Self {
        let mut paths = Self::new().with_fallback(WORLD_INSTALL_DIR);
        if let Some(value) = std::env::var_os(RESOURCE_PATH_ENV) {
            paths.add_paths(std::env::split_paths(&value));
        }
        paths
    }

    /// Set the directory searched after every other path.
    #[must_use]
    pub fn with_fallback(mut self, dir: impl Into<PathBuf>) -> Self {
        let dir = dir.into();
        self.paths.retain(|p| *p != dir);
        self.fallback = Some(dir);
        self
    }

    /// Append directories not already present, ahead of the fallback.
    /// Empty entries are ignored.
    pub fn add_paths<I, P>(&mut self, paths: I)
    where
        I: IntoIterator<Item = P>,
        P: Into<PathBuf>,
    {
        for path in paths {
            let path = path.into();
            if path.as_os_str().is_empty()
                || self.paths.contains(&path)
                || self.fallback.as_ref() == Some(&path)
            {
                continue;
            }
            debug!(path = %path.display(), "added resource path");
            self.paths.push(path);
        }
    }

    /// Append the paths of `other` and adopt its fallback, if it has one.
    pub fn extend(&mut self, other: Self) {
        self.add_paths(other.paths);
        if let Some(fallback) = other.fallback {
            self.paths.retain(|p| *p != fallback);
            self.fallback = Some(fallback);
        }
    }

    /// The directories, in search order.
    #[must_use]
    pub fn paths(&self) -> Vec<PathBuf> {
        self.search_order().cloned().collect()
    }

    fn search_order(&self) -> impl Iterator<Item = &PathBuf> {
        self.paths.iter().chain(self.fallback.iter())
    }

    /// Locate `name`: as given if it exists, otherwise joined onto each
    /// search directory in order.
    #[must_use]
    pub fn find_file(&self, name: &str) -> Option<PathBuf> {
        let direct = Path::new(name);
        if direct.exists() {
            return Some(direct.to_path_buf());
        }
        if direct.is_absolute() {
            return None;
        }
        self.search_order()
            .map(|dir| dir.join(name))
            .find(|candidate| candidate.exists())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_add_paths_deduplicates() {
        let mut paths = ResourcePaths::new();
        paths.add_paths(["/a", "/b", "/a", ""]);
        assert_eq!(paths.paths(), vec![PathBuf::from("/a"), PathBuf::from("/b")]);
    }

    #[test]
    fn test_install_dir_is_last() {
        let mut paths = ResourcePaths::from_env();
        assert_eq!(paths.paths().last(), Some(&PathBuf::from(WORLD_INSTALL_DIR)));

        paths.add_paths(["/tmp/extra_worlds"]);
        let order = paths.paths();
        assert_eq!(order.last(), Some(&PathBuf::from(WORLD_INSTALL_DIR)));
        assert_eq!(order[order.len() - 2], PathBuf::from("/tmp/extra_worlds"));
    }

    #[test]
    fn test_fallback_searched_last() {
        let early = tempfile::tempdir().unwrap();
        let late = tempfile::tempdir().unwrap();
        std::fs::write(early.path().join("world.json"), "{}").unwrap();
        std::fs::write(late.path().join("world.json"), "{}").unwrap();

        let mut paths = ResourcePaths::new().with_fallback(late.path());
        paths.add_paths([early.path()]);
        assert_eq!(paths.find_file("world.json"), Some(early.path().join("world.json")));
    }

    #[test]
    fn test_extend_keeps_order() {
        let mut paths = ResourcePaths::new();
        paths.add_paths(["/config"]);
        let mut env = ResourcePaths::new().with_fallback("/install");
        env.add_paths(["/env"]);
        paths.extend(env);
        paths.add_paths(["/later"]);
        assert_eq!(
            paths.paths(),
            vec![
                PathBuf::from("/config"),
                PathBuf::from("/env"),
                PathBuf::from("/later"),
                PathBuf::from("/install"),
            ]
        );
    }

    #[test]
    fn test_find_file_in_search_dir() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("shapes.json"), "{}").unwrap();

        let mut paths = ResourcePaths::new();
        assert_eq!(paths.find_file("shapes.json"), None);
        paths.add_paths([dir.path()]);
        assert_eq!(paths.find_file("shapes.json"), Some(dir.path().join("shapes.json")));

        let absolute = dir.path().join("shapes.json");
        assert_eq!(paths.find_file(&absolute.to_string_lossy()), Some(absolute));
        assert_eq!(paths.find_file("/no/such/world.json"), None);
    }
}
