//! Host-controller error types.

use std::path::PathBuf;

use sim_world::WorldError;

/// Errors raised while resolving and loading worlds.
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    /// The world file could not be found on any resource path.
    #[error("failed to find world [{0}]")]
    WorldNotFound(String),

    /// The resolved source contained no worlds.
    #[error("there is no world available")]
    NoWorlds,

    /// The world description is invalid.
    #[error(transparent)]
    World(#[from] WorldError),

    /// A remote resource could not be fetched.
    #[error("failed to fetch [{uri}]: {reason}")]
    Fetch {
        /// The requested URI.
        uri: String,
        /// What went wrong.
        reason: String,
    },

    /// A fetched resource contained no description file.
    #[error("no description file found in [{0}]")]
    NoDescription(PathBuf),

    /// An included entity description could not be parsed.
    #[error("failed to parse include [{path}]: {source}")]
    Include {
        /// The description file.
        path: PathBuf,
        /// Underlying error.
        source: serde_json::Error,
    },

    /// A file or directory could not be read.
    #[error("failed to read [{path}]: {source}")]
    Io {
        /// The path that was read.
        path: PathBuf,
        /// Underlying error.
        source: std::io::Error,
    },

    /// A worker thread could not be spawned.
    #[error("failed to spawn thread: {0}")]
    Spawn(#[source] std::io::Error),
}
