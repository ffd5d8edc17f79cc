//! Calendar fields of epoch timestamps, in UTC.

use arrow::error::ArrowError;
use chrono::{DateTime, Datelike, Timelike, Utc};

const MICROS_PER_SECOND: i64 = 1_000_000;
const MILLIS_PER_SECOND: i64 = 1_000;

/// Whole seconds of an epoch-millisecond timestamp, rounding toward
/// negative infinity.
pub fn millis_to_seconds(ts: i64) -> i64 {
    ts.div_euclid(MILLIS_PER_SECOND)
}

/// Calendar breakdown of a `start_time`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Calendar {
    /// `start_time` in microseconds since the epoch.
    pub micros: i64,
    pub hour: i32,
    pub day: i32,
    /// ISO 8601 week of year.
    pub week: i32,
    pub month: i32,
    pub year: i32,
    /// 1 = Sunday through 7 = Saturday.
    pub weekday: i32,
}

impl Calendar {
    /// Break down a whole-second epoch timestamp.
    pub fn from_seconds(seconds: i64) -> Result<Self, ArrowError> {
        let time: DateTime<Utc> = DateTime::from_timestamp(seconds, 0).ok_or_else(|| {
            ArrowError::ComputeError(format!("timestamp {seconds}s is out of range"))
        })?;

        Ok(Self {
            micros: seconds * MICROS_PER_SECOND,
            hour: time.hour() as i32,
            day: time.day() as i32,
            week: time.iso_week().week() as i32,
            month: time.month() as i32,
            year: time.year(),
            weekday: time.weekday().number_from_sunday() as i32,
        })
    }

    /// Break down a `start_time` given in microseconds.
    pub fn from_micros(micros: i64) -> Result<Self, ArrowError> {
        Self::from_seconds(micros.div_euclid(MICROS_PER_SECOND))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_millis_floor_division() {
        assert_eq!(millis_to_seconds(1541121934796), 1541121934);
        assert_eq!(millis_to_seconds(1000), 1);
        assert_eq!(millis_to_seconds(999), 0);
        assert_eq!(millis_to_seconds(-1), -1);
    }

    #[test]
    fn test_calendar_of_play_event() {
        // 2018-11-02 01:25:34 UTC, a Friday in ISO week 44
        let calendar = Calendar::from_seconds(1541121934).unwrap();

        assert_eq!(calendar.micros, 1_541_121_934_000_000);
        assert_eq!(calendar.hour, 1);
        assert_eq!(calendar.day, 2);
        assert_eq!(calendar.week, 44);
        assert_eq!(calendar.month, 11);
        assert_eq!(calendar.year, 2018);
        assert_eq!(calendar.weekday, 6);
    }

    #[test]
    fn test_iso_week_crosses_year_boundary() {
        // 2018-12-31 is a Monday in ISO week 1 of 2019
        let calendar = Calendar::from_seconds(1546214400).unwrap();
        assert_eq!(calendar.year, 2018);
        assert_eq!(calendar.week, 1);
        assert_eq!(calendar.weekday, 2);
    }

    #[test]
    fn test_sunday_is_day_one() {
        // 2018-11-04 12:00:00 UTC
        let calendar = Calendar::from_seconds(1541332800).unwrap();
        assert_eq!(calendar.weekday, 1);
    }

    #[test]
    fn test_round_trip_through_micros() {
        let calendar = Calendar::from_seconds(1541121934).unwrap();
        assert_eq!(Calendar::from_micros(calendar.micros).unwrap(), calendar);
    }

    #[test]
    fn test_out_of_range() {
        assert!(Calendar::from_seconds(i64::MAX / 1000).is_err());
    }
}
