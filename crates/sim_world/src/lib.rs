//! # sim_world
//!
//! One simulated world: its description, its clock, and the
//! [`WorldRunner`] that steps it.
//!
//! - [`description`]: the JSON world model ([`SceneDescription`],
//!   [`WorldDescription`], [`EntityDescription`], [`PluginDescription`]).
//! - [`stopwatch`]: real-time / stop-time accounting.
//! - [`runner`]: the `Stopped`/`Running`/`Paused` stepping engine.
//! - [`error`]: world and runner error types.

pub mod description;
pub mod error;
pub mod runner;
pub mod stopwatch;

pub use description::{
    DEFAULT_STEP_SIZE, EntityDescription, PluginDescription, SceneDescription, WorldDescription,
};
pub use error::{RunnerError, WorldError};
pub use runner::{RunnerState, WorldRunner};
pub use stopwatch::Stopwatch;
