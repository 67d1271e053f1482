//! Blink scheduling.
//!
//! A three-phase automaton driven by the frame tick:
//!
//! ```text
//!   Idle ──(now >= next_blink, eyes present)──► Closing
//!   Closing ──(progress reaches 1)──► Opening
//!   Opening ──(progress reaches 0)──► Idle   (schedules the next blink)
//! ```
//!
//! Closure progress moves linearly over `phase_ms` in each direction.
//! A small share of blinks is followed by a quick second blink, and the
//! end of a spoken phrase can pull the next blink forward.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};

/// Timing parameters for the blink automaton (all durations in ms).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BlinkTiming {
    /// Duration of the closing half, and again of the opening half.
    pub phase_ms: f64,
    pub min_interval_ms: f64,
    pub max_interval_ms: f64,
    /// Chance that a blink is immediately followed by a second one.
    pub double_blink_probability: f64,
    pub double_blink_delay_ms: f64,
    /// Chance that the end of speech pulls the next blink forward.
    pub post_speech_probability: f64,
    pub post_speech_min_ms: f64,
    pub post_speech_max_ms: f64,
}

impl Default for BlinkTiming {
    fn default() -> Self {
        Self {
            phase_ms: 80.0,
            min_interval_ms: 2000.0,
            max_interval_ms: 4000.0,
            double_blink_probability: 0.12,
            double_blink_delay_ms: 40.0,
            post_speech_probability: 0.6,
            post_speech_min_ms: 120.0,
            post_speech_max_ms: 340.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BlinkPhase {
    Idle,
    Closing,
    Opening,
}

/// Per-session blink state. Generic over the random source so tests can
/// seed it.
#[derive(Debug)]
pub struct BlinkStateMachine<R = StdRng> {
    timing: BlinkTiming,
    phase: BlinkPhase,
    progress: f64,
    next_blink_ms: f64,
    double_pending: bool,
    completed: u64,
    rng: R,
}

impl BlinkStateMachine<StdRng> {
    /// Start idle, with the first blink scheduled from `now_ms`.
    pub fn new(timing: BlinkTiming, now_ms: f64) -> Self {
        Self::with_rng(timing, now_ms, StdRng::from_entropy())
    }

    pub fn seeded(timing: BlinkTiming, now_ms: f64, seed: u64) -> Self {
        Self::with_rng(timing, now_ms, StdRng::seed_from_u64(seed))
    }
}

impl<R: Rng> BlinkStateMachine<R> {
    pub fn with_rng(timing: BlinkTiming, now_ms: f64, rng: R) -> Self {
        let mut machine = Self {
            timing,
            phase: BlinkPhase::Idle,
            progress: 0.0,
            next_blink_ms: now_ms,
            double_pending: false,
            completed: 0,
            rng,
        };
        machine.reset(now_ms);
        machine
    }

    /// Back to idle with a fresh schedule. Called at the start of every run.
    pub fn reset(&mut self, now_ms: f64) {
        self.phase = BlinkPhase::Idle;
        self.progress = 0.0;
        self.double_pending = false;
        self.next_blink_ms = now_ms + self.regular_interval();
    }

    /// Speech just ended. While idle with both eyes present, the next blink
    /// may be pulled forward. Returns whether it was.
    pub fn on_speech_end(&mut self, now_ms: f64, eyes_present: bool) -> bool {
        if self.phase != BlinkPhase::Idle || !eyes_present {
            return false;
        }
        if self.rng.gen::<f64>() >= self.timing.post_speech_probability {
            return false;
        }
        let t = &self.timing;
        let span = (t.post_speech_max_ms - t.post_speech_min_ms).max(0.0);
        self.next_blink_ms = now_ms + t.post_speech_min_ms + self.rng.gen::<f64>() * span;
        true
    }

    /// Advance by one tick and return the closure for this frame.
    ///
    /// A blink already in flight always completes; `eyes_present` only
    /// gates starting a new one.
    pub fn advance(&mut self, now_ms: f64, dt_ms: f64, eyes_present: bool) -> f64 {
        let step = if self.timing.phase_ms > 0.0 {
            dt_ms.max(0.0) / self.timing.phase_ms
        } else {
            1.0
        };

        match self.phase {
            BlinkPhase::Idle => {
                if eyes_present && now_ms >= self.next_blink_ms {
                    self.phase = BlinkPhase::Closing;
                    self.progress = 0.0;
                    if self.rng.gen::<f64>() < self.timing.double_blink_probability {
                        self.double_pending = true;
                    }
                    tracing::trace!(now_ms, double = self.double_pending, "Blink started");
                }
            }
            BlinkPhase::Closing => {
                self.progress = (self.progress + step).min(1.0);
                if self.progress >= 1.0 {
                    self.phase = BlinkPhase::Opening;
                }
            }
            BlinkPhase::Opening => {
                self.progress = (self.progress - step).max(0.0);
                if self.progress <= 0.0 {
                    self.finish_blink(now_ms);
                }
            }
        }

        self.progress
    }

    fn finish_blink(&mut self, now_ms: f64) {
        self.phase = BlinkPhase::Idle;
        self.completed += 1;
        if self.double_pending {
            self.double_pending = false;
            self.next_blink_ms = now_ms + self.timing.double_blink_delay_ms;
        } else {
            self.next_blink_ms = now_ms + self.regular_interval();
        }
        tracing::trace!(
            completed = self.completed,
            next_blink_ms = self.next_blink_ms,
            "Blink finished"
        );
    }

    fn regular_interval(&mut self) -> f64 {
        let t = &self.timing;
        let span = (t.max_interval_ms - t.min_interval_ms).max(0.0);
        t.min_interval_ms + self.rng.gen::<f64>() * span
    }

    /// Closure in `[0, 1]`; 0 is fully open.
    pub fn closure(&self) -> f64 {
        self.progress
    }

    pub fn phase(&self) -> BlinkPhase {
        self.phase
    }

    pub fn next_blink_ms(&self) -> f64 {
        self.next_blink_ms
    }

    pub fn double_pending(&self) -> bool {
        self.double_pending
    }

    /// Blinks completed since construction.
    pub fn completed_blinks(&self) -> u64 {
        self.completed
    }

    pub fn timing(&self) -> &BlinkTiming {
        &self.timing
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::mock::StepRng;

    /// Every draw is 0.0: always double-blinks, always reacts to speech.
    fn low_rng() -> StepRng {
        StepRng::new(0, 0)
    }

    /// Every draw is just under 1.0: never double-blinks.
    fn high_rng() -> StepRng {
        StepRng::new(u64::MAX, 0)
    }

    #[test]
    fn test_first_blink_scheduled_within_interval() {
        let machine = BlinkStateMachine::seeded(BlinkTiming::default(), 500.0, 1);
        let next = machine.next_blink_ms();
        assert!((2500.0..4500.0).contains(&next));
        assert_eq!(machine.phase(), BlinkPhase::Idle);
    }

    #[test]
    fn test_full_blink_cycle() {
        let mut m = BlinkStateMachine::with_rng(BlinkTiming::default(), 0.0, low_rng());
        assert_eq!(m.next_blink_ms(), 2000.0);

        assert_eq!(m.advance(1999.0, 16.0, true), 0.0);
        assert_eq!(m.phase(), BlinkPhase::Idle);

        m.advance(2000.0, 1.0, true);
        assert_eq!(m.phase(), BlinkPhase::Closing);
        assert!(m.double_pending());

        assert!((m.advance(2040.0, 40.0, true) - 0.5).abs() < 1e-12);
        assert_eq!(m.advance(2080.0, 40.0, true), 1.0);
        assert_eq!(m.phase(), BlinkPhase::Opening);
        assert!((m.advance(2120.0, 40.0, true) - 0.5).abs() < 1e-12);
        assert_eq!(m.advance(2160.0, 40.0, true), 0.0);

        assert_eq!(m.phase(), BlinkPhase::Idle);
        assert_eq!(m.completed_blinks(), 1);
        // Double blink: next one follows almost immediately.
        assert_eq!(m.next_blink_ms(), 2200.0);
        assert!(!m.double_pending());
    }

    #[test]
    fn test_single_blink_reschedules_regular_interval() {
        let mut m = BlinkStateMachine::with_rng(BlinkTiming::default(), 0.0, high_rng());
        let start = m.next_blink_ms();
        m.advance(start, 0.0, true);
        m.advance(start + 80.0, 80.0, true);
        m.advance(start + 160.0, 80.0, true);
        assert_eq!(m.phase(), BlinkPhase::Idle);
        assert!(!m.double_pending());
        assert!(m.next_blink_ms() >= start + 160.0 + 2000.0);
    }

    #[test]
    fn test_no_blink_without_eyes() {
        let mut m = BlinkStateMachine::seeded(BlinkTiming::default(), 0.0, 3);
        let mut now = 0.0;
        while now < 60_000.0 {
            now += 16.0;
            assert_eq!(m.advance(now, 16.0, false), 0.0);
        }
        assert_eq!(m.completed_blinks(), 0);
    }

    #[test]
    fn test_speech_end_pulls_blink_forward() {
        let mut m = BlinkStateMachine::with_rng(BlinkTiming::default(), 0.0, low_rng());
        assert!(m.on_speech_end(500.0, true));
        assert_eq!(m.next_blink_ms(), 620.0);
    }

    #[test]
    fn test_speech_end_ignored_mid_blink_or_without_eyes() {
        let mut m = BlinkStateMachine::with_rng(BlinkTiming::default(), 0.0, low_rng());
        assert!(!m.on_speech_end(100.0, false));
        assert_eq!(m.next_blink_ms(), 2000.0);

        m.advance(2000.0, 0.0, true);
        assert_eq!(m.phase(), BlinkPhase::Closing);
        assert!(!m.on_speech_end(2010.0, true));
    }

    #[test]
    fn test_speech_end_probability_miss() {
        let mut m = BlinkStateMachine::with_rng(BlinkTiming::default(), 0.0, high_rng());
        let before = m.next_blink_ms();
        assert!(!m.on_speech_end(100.0, true));
        assert_eq!(m.next_blink_ms(), before);
    }

    #[test]
    fn test_reset_returns_to_idle() {
        let mut m = BlinkStateMachine::with_rng(BlinkTiming::default(), 0.0, low_rng());
        m.advance(2000.0, 0.0, true);
        m.advance(2040.0, 40.0, true);
        m.reset(10_000.0);
        assert_eq!(m.phase(), BlinkPhase::Idle);
        assert_eq!(m.closure(), 0.0);
        assert!(!m.double_pending());
        assert_eq!(m.next_blink_ms(), 12_000.0);
    }

    #[test]
    fn test_large_tick_saturates() {
        let mut m = BlinkStateMachine::with_rng(BlinkTiming::default(), 0.0, high_rng());
        let start = m.next_blink_ms();
        m.advance(start, 0.0, true);
        assert_eq!(m.advance(start + 500.0, 500.0, true), 1.0);
        assert_eq!(m.advance(start + 1000.0, 500.0, true), 0.0);
        assert_eq!(m.completed_blinks(), 1);
    }
}
