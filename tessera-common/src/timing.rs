//! Tick-based timing for the logical playback clock
//!
//! Tessera measures clock time in ticks of 100 nanoseconds (10,000,000 ticks
//! per second), the same resolution media engines commonly report positions
//! in. Three representations are used:
//!
//! 1. **Ticks (Internal)**: i64 values at 10 MHz, used by the shared clock and
//!    by `PositionChanged` engine events
//! 2. **Milliseconds (API)**: i64 values for seeks, persisted resume
//!    positions and the HTTP API
//! 3. **Durations**: `std::time::Duration` for wall-clock elapsed time
//!
//! # Conversion Flow
//!
//! ```text
//! Instant::now() - epoch  (Duration)
//!     ↓
//! scaled_elapsed_ticks()  → Clock ticks (i64)
//!     ↓
//! ticks_to_ms()           → Persistence / API (i64 ms)
//! ```
//!
//! # Examples
//!
//! ```rust
//! use tessera_common::timing::*;
//! use std::time::Duration;
//!
//! assert_eq!(ms_to_ticks(1500), 15_000_000);
//! assert_eq!(ticks_to_ms(15_000_000), 1500);
//! assert_eq!(duration_to_ticks(Duration::from_millis(2)), 20_000);
//! assert_eq!(scaled_elapsed_ticks(Duration::from_secs(1), 0.5), 5_000_000);
//! ```

use std::time::Duration;

/// Ticks per second: 10,000,000 (100 ns resolution)
pub const TICKS_PER_SECOND: i64 = 10_000_000;

/// Ticks per millisecond: 10,000
pub const TICKS_PER_MS: i64 = 10_000;

/// Convert milliseconds to ticks, saturating on overflow
pub fn ms_to_ticks(ms: i64) -> i64 {
    ms.saturating_mul(TICKS_PER_MS)
}

/// Convert ticks to milliseconds (truncating division)
pub fn ticks_to_ms(ticks: i64) -> i64 {
    ticks / TICKS_PER_MS
}

/// Convert a wall-clock duration to ticks, saturating at i64::MAX
pub fn duration_to_ticks(duration: Duration) -> i64 {
    let ticks = duration.as_nanos() / 100;
    i64::try_from(ticks).unwrap_or(i64::MAX)
}

/// Convert ticks to a wall-clock duration (negative values clamp to zero)
pub fn ticks_to_duration(ticks: i64) -> Duration {
    if ticks <= 0 {
        return Duration::ZERO;
    }
    Duration::from_nanos((ticks as u64).saturating_mul(100))
}

/// Elapsed wall-clock time scaled by a playback speed, in ticks
///
/// Rounds to the nearest tick so that re-anchoring a clock at an arbitrary
/// instant never drifts by more than half a tick.
pub fn scaled_elapsed_ticks(elapsed: Duration, speed: f64) -> i64 {
    let scaled = duration_to_ticks(elapsed) as f64 * speed;
    if scaled >= i64::MAX as f64 {
        i64::MAX
    } else {
        scaled.round() as i64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ms_tick_roundtrip() {
        for ms in [0, 1, 999, 1000, 3_600_000] {
            assert_eq!(ticks_to_ms(ms_to_ticks(ms)), ms);
        }
    }

    #[test]
    fn test_ticks_to_ms_truncates() {
        assert_eq!(ticks_to_ms(19_999), 1);
        assert_eq!(ticks_to_ms(9_999), 0);
    }

    #[test]
    fn test_ms_to_ticks_saturates() {
        assert_eq!(ms_to_ticks(i64::MAX), i64::MAX);
    }

    #[test]
    fn test_duration_conversions() {
        assert_eq!(duration_to_ticks(Duration::from_secs(1)), TICKS_PER_SECOND);
        assert_eq!(ticks_to_duration(TICKS_PER_SECOND), Duration::from_secs(1));
        assert_eq!(ticks_to_duration(-5), Duration::ZERO);
    }

    #[test]
    fn test_scaled_elapsed_ticks() {
        let one_second = Duration::from_secs(1);
        assert_eq!(scaled_elapsed_ticks(one_second, 1.0), TICKS_PER_SECOND);
        assert_eq!(scaled_elapsed_ticks(one_second, 2.0), 2 * TICKS_PER_SECOND);
        assert_eq!(scaled_elapsed_ticks(one_second, 0.0), 0);
        assert_eq!(scaled_elapsed_ticks(Duration::from_nanos(250), 1.0), 2);
        assert_eq!(scaled_elapsed_ticks(Duration::from_nanos(300), 0.5), 2);
    }
}
