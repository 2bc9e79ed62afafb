//! Clock-of-day values for schedule comparisons.
//!
//! GTFS timepoints describe a service day that extends past midnight, so
//! `25:30:00` is a valid time. A [`ClockTime`] built from such a string
//! knows which service day it belongs to; one built from a wall clock does
//! not (after midnight the wall clock may belong to the previous service
//! day), and the comparison operators compensate for that.

use chrono::Timelike;

use crate::error::{Error, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClockTime {
    pub hours: u32,
    pub minutes: u32,
    pub seconds: u32,
    uncertain_day: bool,
}

impl ClockTime {
    /// Parses a schedule timepoint `HH:MM:SS`, where `HH` may exceed 23.
    /// The result is certain of its service day.
    pub fn from_schedule(timepoint: &str) -> Result<Self> {
        let mut parts = timepoint.split(':');
        let mut field = || -> Result<u32> {
            parts
                .next()
                .and_then(|p| p.parse().ok())
                .ok_or_else(|| Error::InvalidTime(timepoint.to_string()))
        };

        let hours = field()?;
        let minutes = field()?;
        let seconds = field()?;
        if parts.next().is_some() || minutes > 59 || seconds > 59 {
            return Err(Error::InvalidTime(timepoint.to_string()));
        }

        Ok(Self {
            hours,
            minutes,
            seconds,
            uncertain_day: false,
        })
    }

    /// Captures the clock of a wall-time instant, modulo 24 h. The result
    /// is uncertain of its service day.
    pub fn from_instant<Tz: chrono::TimeZone>(instant: &chrono::DateTime<Tz>) -> Self {
        Self {
            hours: instant.hour(),
            minutes: instant.minute(),
            seconds: instant.second(),
            uncertain_day: true,
        }
    }

    pub fn total_seconds(&self) -> i64 {
        i64::from(self.hours) * 3600 + i64::from(self.minutes) * 60 + i64::from(self.seconds)
    }

    /// Whether this schedule time lies after `other`.
    ///
    /// Fails when `self` is a wall-clock time: only a schedule time can
    /// anchor the midnight-rollover adjustment.
    pub fn is_after(&self, other: &ClockTime) -> Result<bool> {
        Ok(self.total_seconds() > self.adjusted_other(other)?)
    }

    /// Signed seconds from `other` to this schedule time (`self − other`).
    pub fn seconds_since(&self, other: &ClockTime) -> Result<i64> {
        Ok(self.total_seconds() - self.adjusted_other(other)?)
    }

    fn adjusted_other(&self, other: &ClockTime) -> Result<i64> {
        if self.uncertain_day {
            return Err(Error::UncertainComparison);
        }

        let mut other_seconds = other.total_seconds();
        // A post-midnight wall clock read against a 24h+ timepoint belongs
        // to the next calendar day of the same service day.
        if other.uncertain_day && self.hours >= 24 && other.hours <= 3 {
            other_seconds += 86_400;
        }
        Ok(other_seconds)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn wall(h: u32, m: u32, s: u32) -> ClockTime {
        let instant = chrono::Utc.with_ymd_and_hms(2024, 3, 1, h, m, s).unwrap();
        ClockTime::from_instant(&instant)
    }

    #[test]
    fn parses_past_24h() {
        let t = ClockTime::from_schedule("25:30:00").unwrap();
        assert_eq!((t.hours, t.minutes, t.seconds), (25, 30, 0));
        assert_eq!(t.total_seconds(), 91_800);
    }

    #[test]
    fn seconds_come_from_the_third_field() {
        let t = ClockTime::from_schedule("06:15:42").unwrap();
        assert_eq!(t.seconds, 42);
        assert_eq!(t.total_seconds(), 6 * 3600 + 15 * 60 + 42);
    }

    #[test]
    fn rejects_malformed_strings() {
        for bad in ["25:30", "aa:bb:cc", "10:75:00", "10:00:99", "1:2:3:4", ""] {
            assert!(ClockTime::from_schedule(bad).is_err(), "accepted {bad:?}");
        }
    }

    #[test]
    fn after_applies_midnight_rollover() {
        // Trip ends 25:10:00, wall clock reads 00:30:00: the wall clock is
        // still within the same service day, so the trip end is in the future.
        let end = ClockTime::from_schedule("25:10:00").unwrap();
        assert!(end.is_after(&wall(0, 30, 0)).unwrap());
    }

    #[test]
    fn after_without_rollover_for_daytime_clock() {
        let end = ClockTime::from_schedule("11:30:00").unwrap();
        assert!(!end.is_after(&wall(11, 45, 0)).unwrap());
        assert!(end.is_after(&wall(11, 15, 0)).unwrap());
    }

    #[test]
    fn since_is_signed() {
        let end = ClockTime::from_schedule("11:30:00").unwrap();
        assert_eq!(end.seconds_since(&wall(11, 29, 30)).unwrap(), 30);
        assert_eq!(end.seconds_since(&wall(12, 10, 0)).unwrap(), -2400);
    }

    #[test]
    fn since_with_rollover() {
        let end = ClockTime::from_schedule("24:05:00").unwrap();
        // 00:10 wall clock is 5 minutes past the 24:05 end.
        assert_eq!(end.seconds_since(&wall(0, 10, 0)).unwrap(), -300);
    }

    #[test]
    fn uncertain_left_operand_is_an_error() {
        let schedule = ClockTime::from_schedule("11:30:00").unwrap();
        assert!(matches!(
            wall(11, 0, 0).is_after(&schedule),
            Err(Error::UncertainComparison)
        ));
        assert!(matches!(
            wall(11, 0, 0).seconds_since(&schedule),
            Err(Error::UncertainComparison)
        ));
    }
}
