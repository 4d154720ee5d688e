//! World-layer error types.

use std::path::PathBuf;

use sim_system::SystemError;

/// Errors in a world description.
#[derive(Debug, thiserror::Error)]
pub enum WorldError {
    /// Step sizes must be strictly positive; rewinding is not supported.
    #[error("world [{world}] has invalid step size {seconds}s; step size must be positive")]
    InvalidStepSize {
        /// The offending world.
        world: String,
        /// The configured step size in seconds.
        seconds: f64,
    },

    /// A world without a name cannot be addressed.
    #[error("world description has an empty name")]
    EmptyName,

    /// Two worlds in one scene share a name.
    #[error("duplicate world name [{0}]")]
    DuplicateWorld(String),

    /// The description text is not valid JSON for the world model.
    #[error("failed to parse world description: {0}")]
    Parse(#[from] serde_json::Error),

    /// The world file could not be read.
    #[error("failed to read world file [{path}]: {source}")]
    Io {
        /// Path that was read.
        path: PathBuf,
        /// Underlying error.
        source: std::io::Error,
    },
}

/// Errors returned by [`crate::WorldRunner`] commands.
#[derive(Debug, thiserror::Error)]
pub enum RunnerError {
    /// The system list cannot change while the world is stepping.
    #[error("cannot modify systems while world [{0}] is running")]
    Running(String),

    /// Loading or configuring a system failed.
    #[error(transparent)]
    System(#[from] SystemError),
}
