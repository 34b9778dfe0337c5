//! Market-time-aware schedule clock.
//! Pilot in Command: mode selection
//! Mission: pick the right cadence for the hour without guessing at timezones.

use crate::models::{CycleMode, MarketState};
use chrono::{DateTime, Datelike, NaiveTime, Timelike, Utc, Weekday};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};

/// Session window boundaries, loaded from configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionWindows {
    pub premarket_start: NaiveTime,
    pub premarket_end: NaiveTime,
    pub regular_end: NaiveTime,
    pub afterhours_end: NaiveTime,
}

impl Default for SessionWindows {
    fn default() -> Self {
        Self {
            premarket_start: NaiveTime::from_hms_opt(4, 0, 0).unwrap(),
            premarket_end: NaiveTime::from_hms_opt(9, 30, 0).unwrap(),
            regular_end: NaiveTime::from_hms_opt(16, 0, 0).unwrap(),
            afterhours_end: NaiveTime::from_hms_opt(20, 0, 0).unwrap(),
        }
    }
}

impl SessionWindows {
    /// Classify a UTC timestamp against these windows, in `tz`'s local time.
    /// Lower bounds are inclusive, so 09:30 exactly is `Regular`.
    pub fn classify(&self, at: DateTime<Utc>, tz: Tz) -> MarketState {
        let local = at.with_timezone(&tz);
        if matches!(local.weekday(), Weekday::Sat | Weekday::Sun) {
            return MarketState::Weekend;
        }
        let t = local.time();
        if t >= self.premarket_start && t < self.premarket_end {
            MarketState::PreMarket
        } else if t >= self.premarket_end && t < self.regular_end {
            MarketState::Regular
        } else if t >= self.regular_end && t < self.afterhours_end {
            MarketState::AfterHours
        } else {
            MarketState::Weekend
        }
    }

    /// Mode selected for a given local time: weekends are minimal, the
    /// pre-market window is aggressive, otherwise normal or after-hours.
    pub fn mode_for(&self, at: DateTime<Utc>, tz: Tz) -> CycleMode {
        let local = at.with_timezone(&tz);
        if matches!(local.weekday(), Weekday::Sat | Weekday::Sun) {
            return CycleMode::Minimal;
        }
        let t = local.time();
        if t >= self.premarket_start && t < self.premarket_end {
            CycleMode::Aggressive
        } else if t >= self.premarket_end && t < self.regular_end {
            CycleMode::Normal
        } else if t >= self.regular_end && t < self.afterhours_end {
            CycleMode::Light
        } else {
            CycleMode::Minimal
        }
    }
}

/// Tick interval in seconds for a given mode.
pub fn tick_interval_secs(mode: CycleMode) -> u64 {
    match mode {
        CycleMode::Aggressive => 5 * 60,
        CycleMode::Normal => 30 * 60,
        CycleMode::Light => 60 * 60,
        CycleMode::Minimal => 240 * 60,
    }
}

/// Abstraction over "now", so tests can pin a specific instant instead of
/// depending on `Utc::now()` and real wall-clock weekday/hour arithmetic.
pub trait ScheduleClock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl ScheduleClock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// A clock fixed at construction time, for deterministic tests.
#[derive(Debug, Clone, Copy)]
pub struct FixedClock(pub DateTime<Utc>);

impl ScheduleClock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn ny() -> Tz {
        "America/New_York".parse().unwrap()
    }

    #[test]
    fn exactly_0930_is_regular_inclusive_lower_bound() {
        let windows = SessionWindows::default();
        // 2025-01-15 is a Wednesday; 09:30 ET == 14:30 UTC (EST, no DST).
        let at = Utc.with_ymd_and_hms(2025, 1, 15, 14, 30, 0).unwrap();
        assert_eq!(windows.classify(at, ny()), MarketState::Regular);
        assert_eq!(windows.mode_for(at, ny()), CycleMode::Normal);
    }

    #[test]
    fn premarket_window_selects_aggressive() {
        let windows = SessionWindows::default();
        let at = Utc.with_ymd_and_hms(2025, 1, 15, 12, 0, 0).unwrap(); // 07:00 ET
        assert_eq!(windows.mode_for(at, ny()), CycleMode::Aggressive);
        assert_eq!(tick_interval_secs(CycleMode::Aggressive), 300);
    }

    #[test]
    fn weekend_is_always_minimal() {
        let windows = SessionWindows::default();
        let at = Utc.with_ymd_and_hms(2025, 1, 18, 15, 0, 0).unwrap(); // Saturday
        assert_eq!(windows.mode_for(at, ny()), CycleMode::Minimal);
        assert_eq!(windows.classify(at, ny()), MarketState::Weekend);
    }

    #[test]
    fn after_close_selects_light() {
        let windows = SessionWindows::default();
        let at = Utc.with_ymd_and_hms(2025, 1, 15, 22, 0, 0).unwrap(); // 17:00 ET
        assert_eq!(windows.mode_for(at, ny()), CycleMode::Light);
    }
}
