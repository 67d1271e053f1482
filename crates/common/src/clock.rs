//! Clock and timing utilities for animation ticks.
//!
//! Every playback or capture run is anchored to a monotonic epoch recorded
//! when the run starts. Animation state works in floating-point
//! milliseconds since that epoch.

use std::time::{Duration, Instant};

/// A monotonic clock anchored to the start of a playback/capture run.
#[derive(Debug, Clone)]
pub struct SessionClock {
    /// The instant the run started.
    epoch: Instant,

    /// Wall-clock time at epoch (RFC 3339 string).
    epoch_wall: String,
}

impl SessionClock {
    /// Create a new clock anchored to now.
    pub fn start() -> Self {
        Self {
            epoch: Instant::now(),
            epoch_wall: chrono::Utc::now().to_rfc3339(),
        }
    }

    /// Milliseconds elapsed since the run started.
    pub fn elapsed_ms(&self) -> f64 {
        self.epoch.elapsed().as_secs_f64() * 1000.0
    }

    /// Wall-clock time at run start.
    pub fn epoch_wall(&self) -> &str {
        &self.epoch_wall
    }
}

/// Timestamp of frame `index` at a fixed frame rate, in milliseconds.
pub fn frame_time_ms(index: u64, fps: u32) -> f64 {
    index as f64 * 1000.0 / fps.max(1) as f64
}

/// Interval between frames at the given rate.
pub fn frame_interval(fps: u32) -> Duration {
    Duration::from_secs_f64(1.0 / fps.max(1) as f64)
}

/// Throttles a periodic action to a target rate.
#[derive(Debug)]
pub struct RateController {
    target_interval_ms: f64,
    last_tick_ms: Option<f64>,
}

impl RateController {
    /// Create a controller targeting the given Hz rate.
    pub fn new(target_hz: u32) -> Self {
        Self {
            target_interval_ms: 1000.0 / target_hz.max(1) as f64,
            last_tick_ms: None,
        }
    }

    /// Check if enough time has passed for the next tick.
    /// Returns true and updates internal state if ready.
    /// The first call always returns true.
    pub fn should_tick(&mut self, current_ms: f64) -> bool {
        match self.last_tick_ms {
            None => {
                self.last_tick_ms = Some(current_ms);
                true
            }
            Some(last) if current_ms >= last + self.target_interval_ms => {
                self.last_tick_ms = Some(current_ms);
                true
            }
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clock_elapsed() {
        let clock = SessionClock::start();
        assert!(clock.elapsed_ms() < 1000.0);
        assert!(!clock.epoch_wall().is_empty());
    }

    #[test]
    fn test_frame_time_at_24fps() {
        assert_eq!(frame_time_ms(0, 24), 0.0);
        assert!((frame_time_ms(24, 24) - 1000.0).abs() < 1e-9);
        assert!((frame_time_ms(1, 24) - 41.666_666).abs() < 1e-3);
    }

    #[test]
    fn test_frame_interval_guards_zero_fps() {
        assert_eq!(frame_interval(0), Duration::from_secs(1));
    }

    #[test]
    fn test_rate_controller() {
        let mut ctrl = RateController::new(10);
        assert!(ctrl.should_tick(0.0));
        assert!(!ctrl.should_tick(50.0));
        assert!(ctrl.should_tick(100.0));
    }
}
