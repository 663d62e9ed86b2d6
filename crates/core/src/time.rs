use chrono::{DateTime, Duration, FixedOffset, Local, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

/// A simple clock abstraction for deterministic time in services and tests.
#[derive(Debug, Clone, Copy, Default)]
pub enum Clock {
    #[default]
    Default,
    Fixed(DateTime<Utc>),
}

impl Clock {
    /// Returns a clock that uses the current system time.
    #[must_use]
    pub fn default_clock() -> Self {
        Self::Default
    }

    /// Returns a clock fixed at the given timestamp.
    #[must_use]
    pub fn fixed(at: DateTime<Utc>) -> Self {
        Self::Fixed(at)
    }

    /// Returns the current time according to the clock.
    #[must_use]
    pub fn now(&self) -> DateTime<Utc> {
        match self {
            Clock::Default => Utc::now(),
            Clock::Fixed(t) => *t,
        }
    }

    /// If this is a fixed clock, advance it by the given duration.
    ///
    /// Has no effect on `Clock::Default`.
    pub fn advance(&mut self, delta: Duration) {
        if let Clock::Fixed(t) = self {
            *t += delta;
        }
    }

    #[must_use]
    pub fn is_fixed(&self) -> bool {
        matches!(self, Clock::Fixed(_))
    }
}

/// Where one calendar day ends and the next begins.
///
/// Streaks count calendar days as the learner sees them, so the default is the
/// machine's local time zone. `Utc` and `Fixed` exist for servers and tests.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum DayBoundary {
    #[default]
    Local,
    Utc,
    /// Offset east of UTC, in seconds.
    Fixed(i32),
}

impl DayBoundary {
    /// Builds a fixed-offset boundary from minutes east of UTC.
    ///
    /// Returns `None` when the offset is outside ±24h.
    #[must_use]
    pub fn fixed_minutes(minutes: i32) -> Option<Self> {
        let seconds = minutes.checked_mul(60)?;
        FixedOffset::east_opt(seconds).map(|_| Self::Fixed(seconds))
    }

    /// Calendar date containing `at` under this boundary.
    #[must_use]
    pub fn day_of(&self, at: DateTime<Utc>) -> NaiveDate {
        match self {
            DayBoundary::Local => at.with_timezone(&Local).date_naive(),
            DayBoundary::Utc => at.date_naive(),
            DayBoundary::Fixed(seconds) => match FixedOffset::east_opt(*seconds) {
                Some(offset) => at.with_timezone(&offset).date_naive(),
                None => at.date_naive(),
            },
        }
    }

    /// Whole calendar days from `earlier` to `later`; negative when `later` is behind.
    #[must_use]
    pub fn days_between(&self, earlier: DateTime<Utc>, later: DateTime<Utc>) -> i64 {
        (self.day_of(later) - self.day_of(earlier)).num_days()
    }
}

/// Deterministic timestamp for tests and examples (2023-11-14T22:13:20Z).
pub const FIXED_TEST_TIMESTAMP: i64 = 1_700_000_000;

/// Returns a deterministic `DateTime<Utc>` for tests and doc examples.
///
/// # Panics
///
/// Panics if the fixed timestamp cannot be represented.
#[must_use]
pub fn fixed_now() -> DateTime<Utc> {
    DateTime::<Utc>::from_timestamp(FIXED_TEST_TIMESTAMP, 0)
        .expect("fixed timestamp should be valid")
}

/// Returns a `Clock` fixed at the deterministic test timestamp.
#[must_use]
pub fn fixed_clock() -> Clock {
    Clock::fixed(fixed_now())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fixed_clock_advances() {
        let mut clock = fixed_clock();
        clock.advance(Duration::hours(3));
        assert_eq!(clock.now(), fixed_now() + Duration::hours(3));
    }

    #[test]
    fn default_clock_ignores_advance() {
        let mut clock = Clock::default_clock();
        clock.advance(Duration::days(1));
        assert!(!clock.is_fixed());
    }

    #[test]
    fn utc_boundary_counts_midnights_not_hours() {
        // 22:13 UTC; two hours later is already the next UTC day.
        let start = fixed_now();
        let b = DayBoundary::Utc;
        assert_eq!(b.days_between(start, start + Duration::hours(1)), 0);
        assert_eq!(b.days_between(start, start + Duration::hours(2)), 1);
        assert_eq!(b.days_between(start, start - Duration::days(1)), -1);
    }

    #[test]
    fn fixed_offset_shifts_the_day() {
        let start = fixed_now();
        // UTC+2: 22:13 UTC is already 00:13 on the following day.
        let east = DayBoundary::fixed_minutes(120).unwrap();
        assert_eq!(east.day_of(start), DayBoundary::Utc.day_of(start).succ_opt().unwrap());
    }

    #[test]
    fn fixed_minutes_rejects_out_of_range() {
        assert!(DayBoundary::fixed_minutes(25 * 60).is_none());
        assert!(DayBoundary::fixed_minutes(-90).is_some());
    }
}
