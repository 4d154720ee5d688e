//! Real-time accounting for a runner.
//!
//! A [`Stopwatch`] accumulates the wall-clock time spent running and the time
//! spent stopped (paused) since its first start.

use std::time::{Duration, Instant};

/// Start/stop wall clock with separate run and stop totals.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Stopwatch {
    running: bool,
    start_time: Option<Instant>,
    stop_time: Option<Instant>,
    stop_duration: Duration,
    run_duration: Duration,
}

impl Stopwatch {
    /// A stopwatch that has never been started.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Start the clock, optionally resetting it first.
    ///
    /// Returns `false` if it was already running.
    pub fn start(&mut self, reset: bool) -> bool {
        if reset {
            self.reset();
        }
        if self.running {
            return false;
        }
        let now = Instant::now();
        if let Some(stopped) = self.stop_time {
            self.stop_duration += now - stopped;
        }
        self.running = true;
        self.start_time = Some(now);
        true
    }

    /// Stop the clock. Returns `false` if it was not running.
    pub fn stop(&mut self) -> bool {
        if !self.running {
            return false;
        }
        let now = Instant::now();
        self.running = false;
        self.stop_time = Some(now);
        if let Some(started) = self.start_time {
            self.run_duration += now - started;
        }
        true
    }

    /// Returns `true` while the clock is running.
    #[must_use]
    pub fn running(&self) -> bool {
        self.running
    }

    /// Return to the never-started state.
    pub fn reset(&mut self) {
        *self = Self::default();
    }

    /// When the clock was last started.
    #[must_use]
    pub fn start_time(&self) -> Option<Instant> {
        self.start_time
    }

    /// When the clock was last stopped.
    #[must_use]
    pub fn stop_time(&self) -> Option<Instant> {
        self.stop_time
    }

    /// Total time spent running, including the current run.
    #[must_use]
    pub fn elapsed_run_time(&self) -> Duration {
        match (self.running, self.start_time) {
            (true, Some(started)) => self.run_duration + started.elapsed(),
            _ => self.run_duration,
        }
    }

    /// Total time spent stopped, including the current stop.
    #[must_use]
    pub fn elapsed_stop_time(&self) -> Duration {
        match (self.running, self.stop_time) {
            (false, Some(stopped)) => self.stop_duration + stopped.elapsed(),
            _ => self.stop_duration,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::thread;

    use super::*;

    #[test]
    fn test_never_started_is_zero() {
        let watch = Stopwatch::new();
        assert!(!watch.running());
        assert_eq!(watch.elapsed_run_time(), Duration::ZERO);
        assert_eq!(watch.elapsed_stop_time(), Duration::ZERO);
    }

    #[test]
    fn test_start_stop_accumulates() {
        let mut watch = Stopwatch::new();
        assert!(watch.start(false));
        assert!(!watch.start(false));
        thread::sleep(Duration::from_millis(5));
        assert!(watch.stop());
        assert!(!watch.stop());
        let run = watch.elapsed_run_time();
        assert!(run >= Duration::from_millis(5));

        thread::sleep(Duration::from_millis(5));
        assert!(watch.elapsed_stop_time() >= Duration::from_millis(5));
        // Run time does not grow while stopped.
        assert_eq!(watch.elapsed_run_time(), run);

        assert!(watch.start(false));
        let stopped = watch.elapsed_stop_time();
        assert!(stopped >= Duration::from_millis(5));
        // Stop time does not grow while running.
        thread::sleep(Duration::from_millis(2));
        assert_eq!(watch.elapsed_stop_time(), stopped);
    }

    #[test]
    fn test_reset() {
        let mut watch = Stopwatch::new();
        watch.start(false);
        watch.stop();
        watch.reset();
        assert_eq!(watch, Stopwatch::new());
        assert!(watch.start(true));
        assert!(watch.start_time().is_some());
        assert!(watch.stop_time().is_none());
    }
}
