use chrono::{DateTime, Datelike, TimeZone, Utc};

/// A federation competition year: July 1st through June 30th of the following
/// calendar year. Season boundaries decide how aggressively a feed window is
/// retried.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Season {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl Season {
    pub fn current() -> Self {
        Self::current_at(Utc::now())
    }

    /// The season in progress at `now`.
    pub fn current_at(now: DateTime<Utc>) -> Self {
        let start_year = if now.month() >= 7 {
            now.year()
        } else {
            now.year() - 1
        };
        Self::for_start_year(start_year)
    }

    /// The most recently completed season at `now`, used for historical
    /// backfill windows.
    pub fn last_finished_at(now: DateTime<Utc>) -> Self {
        let current = Self::current_at(now);
        Self::for_start_year(current.start.year() - 1)
    }

    fn for_start_year(year: i32) -> Self {
        let start = Utc.with_ymd_and_hms(year, 7, 1, 0, 0, 0).single();
        let end = Utc.with_ymd_and_hms(year + 1, 6, 30, 23, 59, 59).single();
        // Both timestamps are fixed calendar dates; they always resolve.
        Self {
            start: start.expect("season start is a valid date"),
            end: end.expect("season end is a valid date"),
        }
    }

    /// Whether a feed query window lies within this season. An open-ended
    /// window counts as in-season when its lower bound does.
    pub fn contains_window(
        &self,
        after: DateTime<Utc>,
        before: Option<DateTime<Utc>>,
    ) -> bool {
        let lower_ok = after >= self.start;
        let upper_ok = before.map_or(true, |b| b <= self.end);
        lower_ok && upper_ok
    }
}
