//! Per-step timing information handed to every system callback.

use std::time::Duration;

/// Information about the step being executed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UpdateInfo {
    /// Number of steps completed before this one.
    pub iterations: u64,
    /// Simulated time at the start of this step.
    pub sim_time: Duration,
    /// Wall-clock time the world has spent running (excluding pauses).
    pub real_time: Duration,
    /// Simulated duration this step advances. Zero while paused.
    pub dt: Duration,
    /// Whether the world is paused during this step.
    pub paused: bool,
}

impl UpdateInfo {
    /// Simulated time at the end of this step.
    #[must_use]
    pub fn end_time(&self) -> Duration {
        self.sim_time + self.dt
    }
}
