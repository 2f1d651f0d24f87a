//! Speed-scalable logical clock
//!
//! A [`SharedClock`] is owned by a sync group (or privately by one window) and
//! read concurrently by the coordinator and the HTTP surface. All mutation
//! goes through its methods; nothing reaches into [`ClockState`] directly.
//!
//! Reading `ticks` while running extrapolates from the anchor:
//!
//! ```text
//! ticks = base_ticks + (now - epoch) * speed
//! ```
//!
//! Every mutation first re-anchors `base_ticks`/`epoch` to the current
//! extrapolated value, which is what keeps the clock continuous across
//! speed changes and pause/start cycles.

use parking_lot::Mutex;
use serde::Serialize;
use std::sync::Arc;
use std::time::Instant;
use tessera_common::timing::{scaled_elapsed_ticks, ticks_to_ms};

/// Raw clock fields, manipulated with explicit instants
#[derive(Debug, Clone, Copy)]
pub struct ClockState {
    epoch: Instant,
    base_ticks: i64,
    speed: f64,
    running: bool,
}

impl ClockState {
    pub fn new(now: Instant) -> Self {
        Self {
            epoch: now,
            base_ticks: 0,
            speed: 1.0,
            running: false,
        }
    }

    /// Tick value at `now`; frozen while paused
    pub fn ticks_at(&self, now: Instant) -> i64 {
        if !self.running {
            return self.base_ticks;
        }
        let elapsed = now.saturating_duration_since(self.epoch);
        self.base_ticks
            .saturating_add(scaled_elapsed_ticks(elapsed, self.speed))
    }

    fn reanchor(&mut self, now: Instant) {
        self.base_ticks = self.ticks_at(now);
        self.epoch = now;
    }

    pub fn start_at(&mut self, now: Instant) {
        if self.running {
            return;
        }
        self.epoch = now;
        self.running = true;
    }

    pub fn pause_at(&mut self, now: Instant) {
        if !self.running {
            return;
        }
        self.reanchor(now);
        self.running = false;
    }

    pub fn seek_at(&mut self, now: Instant, ticks: i64) {
        self.base_ticks = ticks;
        self.epoch = now;
    }

    pub fn set_speed_at(&mut self, now: Instant, speed: f64) {
        self.reanchor(now);
        self.speed = speed;
    }

    /// Zero the position and stop; speed is retained
    pub fn reset(&mut self, now: Instant) {
        self.base_ticks = 0;
        self.epoch = now;
        self.running = false;
    }

    pub fn speed(&self) -> f64 {
        self.speed
    }

    pub fn is_running(&self) -> bool {
        self.running
    }
}

/// Point-in-time view of a clock for status reporting
#[derive(Debug, Clone, Copy, Serialize)]
pub struct ClockSnapshot {
    pub ticks: i64,
    pub position_ms: i64,
    pub running: bool,
    pub speed: f64,
}

/// Thread-safe clock handle
///
/// Cloning shares the same underlying clock.
#[derive(Debug, Clone)]
pub struct SharedClock {
    inner: Arc<Mutex<ClockState>>,
}

impl Default for SharedClock {
    fn default() -> Self {
        Self::new()
    }
}

impl SharedClock {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(ClockState::new(Instant::now()))),
        }
    }

    pub fn ticks(&self) -> i64 {
        self.inner.lock().ticks_at(Instant::now())
    }

    pub fn position_ms(&self) -> i64 {
        ticks_to_ms(self.ticks())
    }

    pub fn start(&self) {
        self.inner.lock().start_at(Instant::now());
    }

    pub fn pause(&self) {
        self.inner.lock().pause_at(Instant::now());
    }

    pub fn seek(&self, ticks: i64) {
        self.inner.lock().seek_at(Instant::now(), ticks);
    }

    /// Change the rate; rejects negative and non-finite values
    pub fn set_speed(&self, speed: f64) -> bool {
        if !speed.is_finite() || speed < 0.0 {
            return false;
        }
        self.inner.lock().set_speed_at(Instant::now(), speed);
        true
    }

    pub fn reset(&self) {
        self.inner.lock().reset(Instant::now());
    }

    pub fn speed(&self) -> f64 {
        self.inner.lock().speed()
    }

    pub fn is_running(&self) -> bool {
        self.inner.lock().is_running()
    }

    pub fn snapshot(&self) -> ClockSnapshot {
        let state = self.inner.lock();
        let ticks = state.ticks_at(Instant::now());
        ClockSnapshot {
            ticks,
            position_ms: ticks_to_ms(ticks),
            running: state.is_running(),
            speed: state.speed(),
        }
    }

    /// True if both handles refer to the same clock
    pub fn same_clock(&self, other: &SharedClock) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tessera_common::timing::TICKS_PER_SECOND;

    #[test]
    fn test_paused_clock_is_frozen() {
        let t0 = Instant::now();
        let mut clock = ClockState::new(t0);
        clock.seek_at(t0, 42);
        assert_eq!(clock.ticks_at(t0 + Duration::from_secs(5)), 42);
    }

    #[test]
    fn test_running_clock_extrapolates_with_speed() {
        let t0 = Instant::now();
        let mut clock = ClockState::new(t0);
        clock.start_at(t0);
        assert_eq!(clock.ticks_at(t0 + Duration::from_secs(1)), TICKS_PER_SECOND);

        clock.set_speed_at(t0 + Duration::from_secs(1), 2.0);
        assert_eq!(
            clock.ticks_at(t0 + Duration::from_secs(2)),
            3 * TICKS_PER_SECOND
        );
    }

    #[test]
    fn test_set_speed_is_continuous() {
        let t0 = Instant::now();
        let mut clock = ClockState::new(t0);
        clock.start_at(t0);

        for (offset_ms, speed) in [(333, 0.5), (1234, 3.0), (1500, 0.0), (2700, 1.25)] {
            let at = t0 + Duration::from_millis(offset_ms);
            let before = clock.ticks_at(at);
            clock.set_speed_at(at, speed);
            assert_eq!(clock.ticks_at(at), before);
        }

        let at = t0 + Duration::from_millis(3100);
        clock.pause_at(at);
        let before = clock.ticks_at(at);
        clock.set_speed_at(at, 4.0);
        assert_eq!(clock.ticks_at(at), before);
        assert_eq!(clock.ticks_at(at + Duration::from_secs(1)), before);
    }

    #[test]
    fn test_pause_then_start_resumes_from_frozen_value() {
        let t0 = Instant::now();
        let mut clock = ClockState::new(t0);
        clock.start_at(t0);
        clock.pause_at(t0 + Duration::from_secs(2));
        clock.start_at(t0 + Duration::from_secs(10));
        assert_eq!(
            clock.ticks_at(t0 + Duration::from_secs(11)),
            3 * TICKS_PER_SECOND
        );
    }

    #[test]
    fn test_seek_while_running() {
        let t0 = Instant::now();
        let mut clock = ClockState::new(t0);
        clock.start_at(t0);
        clock.seek_at(t0 + Duration::from_secs(4), 100);
        assert_eq!(
            clock.ticks_at(t0 + Duration::from_secs(5)),
            100 + TICKS_PER_SECOND
        );
    }

    #[test]
    fn test_reset_zeroes_and_stops() {
        let t0 = Instant::now();
        let mut clock = ClockState::new(t0);
        clock.set_speed_at(t0, 2.0);
        clock.start_at(t0);
        clock.reset(t0 + Duration::from_secs(3));
        assert!(!clock.is_running());
        assert_eq!(clock.ticks_at(t0 + Duration::from_secs(9)), 0);
        assert_eq!(clock.speed(), 2.0);
    }

    #[test]
    fn test_shared_clock_rejects_invalid_speed() {
        let clock = SharedClock::new();
        assert!(!clock.set_speed(f64::NAN));
        assert!(!clock.set_speed(-1.0));
        assert!(clock.set_speed(1.5));
        assert_eq!(clock.speed(), 1.5);
    }

    #[test]
    fn test_shared_clock_clones_share_state() {
        let clock = SharedClock::new();
        let other = clock.clone();
        other.seek(5_000);
        assert_eq!(clock.ticks(), 5_000);
        assert!(clock.same_clock(&other));
        assert!(!clock.same_clock(&SharedClock::new()));
    }
}
