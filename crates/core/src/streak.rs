use chrono::{DateTime, Utc};

use crate::time::DayBoundary;

/// Computes daily activity streaks at calendar-day granularity.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StreakTracker {
    boundary: DayBoundary,
}

impl StreakTracker {
    #[must_use]
    pub fn new(boundary: DayBoundary) -> Self {
        Self { boundary }
    }

    #[must_use]
    pub fn boundary(&self) -> DayBoundary {
        self.boundary
    }

    /// New streak after an XP-awarding event at `now`.
    ///
    /// - no previous activity: 1
    /// - same calendar day (or `now` behind the last activity): unchanged, min 1
    /// - next calendar day: previous + 1
    /// - any larger gap: restarts at 1
    ///
    /// Only call this for events that award XP; the caller then sets
    /// `last_activity_at = now`.
    #[must_use]
    pub fn update(
        &self,
        prev_streak: u32,
        prev_last_activity: Option<DateTime<Utc>>,
        now: DateTime<Utc>,
    ) -> u32 {
        let Some(last) = prev_last_activity else {
            return 1;
        };

        match self.boundary.days_between(last, now) {
            // Clock skew counts as the same day; never decrement.
            d if d <= 0 => prev_streak.max(1),
            1 => prev_streak.max(1).saturating_add(1),
            _ => 1,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::time::fixed_now;
    use chrono::Duration;

    fn tracker() -> StreakTracker {
        StreakTracker::new(DayBoundary::Utc)
    }

    #[test]
    fn first_activity_starts_at_one() {
        assert_eq!(tracker().update(0, None, fixed_now()), 1);
        assert_eq!(tracker().update(9, None, fixed_now()), 1);
    }

    #[test]
    fn streak_continuity() {
        let day_n = fixed_now();
        let t = tracker();
        assert_eq!(t.update(5, Some(day_n), day_n), 5);
        assert_eq!(t.update(5, Some(day_n), day_n + Duration::days(1)), 6);
        assert_eq!(t.update(5, Some(day_n), day_n + Duration::days(3)), 1);
    }

    #[test]
    fn same_day_preserves_minimum_of_one() {
        let now = fixed_now();
        assert_eq!(tracker().update(0, Some(now), now), 1);
    }

    #[test]
    fn next_day_from_zero_counts_from_one() {
        let now = fixed_now();
        assert_eq!(tracker().update(0, Some(now), now + Duration::days(1)), 2);
    }

    #[test]
    fn clock_skew_is_treated_as_same_day() {
        let now = fixed_now();
        assert_eq!(tracker().update(4, Some(now), now - Duration::days(2)), 4);
    }

    #[test]
    fn calendar_days_not_24_hour_windows() {
        // 22:13 → 00:13 next UTC day: only two hours apart but consecutive days.
        let now = fixed_now();
        assert_eq!(tracker().update(3, Some(now), now + Duration::hours(2)), 4);
        // 22:13 → 21:13 two days later (47h): a broken streak.
        assert_eq!(tracker().update(3, Some(now), now + Duration::hours(47)), 1);
    }

    #[test]
    fn saturates_instead_of_overflowing() {
        let now = fixed_now();
        assert_eq!(
            tracker().update(u32::MAX, Some(now), now + Duration::days(1)),
            u32::MAX
        );
    }
}
