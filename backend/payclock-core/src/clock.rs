// src/clock.rs

use chrono::{NaiveDate, NaiveDateTime, NaiveTime, Timelike, Utc};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Boundary format for wall-clock times, e.g. "09:05 AM".
pub const TIME_OF_DAY_FORMAT: &str = "%I:%M %p";

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Invalid time of day '{input}': expected \"HH:MM AM/PM\"")]
pub struct TimeParseError {
    pub input: String,
}

/// A wall-clock time with minute precision, stored as minutes since midnight.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct TimeOfDay(u32);

impl TimeOfDay {
    pub const MINUTES_PER_DAY: u32 = 24 * 60;

    pub fn from_hm(hour: u32, minute: u32) -> Option<Self> {
        (hour < 24 && minute < 60).then(|| Self(hour * 60 + minute))
    }

    pub fn minutes_since_midnight(self) -> u32 {
        self.0
    }

    /// Signed difference `self - other` in whole minutes.
    pub fn minutes_after(self, other: TimeOfDay) -> i64 {
        i64::from(self.0) - i64::from(other.0)
    }
}

impl From<NaiveTime> for TimeOfDay {
    // Seconds are dropped, the same way the clock string is captured.
    fn from(time: NaiveTime) -> Self {
        Self(time.hour() * 60 + time.minute())
    }
}

impl FromStr for TimeOfDay {
    type Err = TimeParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        NaiveTime::parse_from_str(s.trim(), TIME_OF_DAY_FORMAT)
            .map(TimeOfDay::from)
            .map_err(|_| TimeParseError {
                input: s.to_string(),
            })
    }
}

impl TryFrom<String> for TimeOfDay {
    type Error = TimeParseError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<TimeOfDay> for String {
    fn from(value: TimeOfDay) -> Self {
        value.to_string()
    }
}

impl fmt::Display for TimeOfDay {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let hour = self.0 / 60;
        let minute = self.0 % 60;
        let suffix = if hour >= 12 { "PM" } else { "AM" };
        let hour12 = match hour % 12 {
            0 => 12,
            h => h,
        };
        write!(f, "{:02}:{:02} {}", hour12, minute, suffix)
    }
}

/// Source of "now" in the business timezone.
pub trait Clock: Send + Sync {
    fn now(&self) -> NaiveDateTime;

    fn today(&self) -> NaiveDate {
        self.now().date()
    }

    fn time_of_day(&self) -> TimeOfDay {
        TimeOfDay::from(self.now().time())
    }
}

/// Wall clock for a fixed IANA zone.
#[derive(Debug, Clone)]
pub struct ZonedClock {
    tz: Tz,
}

impl ZonedClock {
    pub fn new(tz: Tz) -> Self {
        Self { tz }
    }

    pub fn timezone(&self) -> Tz {
        self.tz
    }
}

impl Clock for ZonedClock {
    fn now(&self) -> NaiveDateTime {
        Utc::now().with_timezone(&self.tz).naive_local()
    }
}

#[cfg(test)]
pub use test_clock::TestClock;

#[cfg(test)]
mod test_clock {
    use super::Clock;
    use chrono::{Duration, NaiveDateTime};
    use std::sync::{Arc, Mutex};

    #[derive(Clone)]
    pub struct TestClock {
        current_time: Arc<Mutex<NaiveDateTime>>,
    }

    impl TestClock {
        pub fn new(datetime_str: &str) -> Self {
            let dt = NaiveDateTime::parse_from_str(datetime_str, "%Y-%m-%d %H:%M:%S")
                .expect("Failed to parse datetime string in TestClock::new");
            Self {
                current_time: Arc::new(Mutex::new(dt)),
            }
        }

        pub fn set_time(&self, datetime_str: &str) {
            *self.current_time.lock().unwrap() =
                NaiveDateTime::parse_from_str(datetime_str, "%Y-%m-%d %H:%M:%S")
                    .expect("Failed to parse datetime string in TestClock::set_time");
        }

        pub fn advance(&self, duration: Duration) {
            *self.current_time.lock().unwrap() += duration;
        }
    }

    impl Clock for TestClock {
        fn now(&self) -> NaiveDateTime {
            *self.current_time.lock().unwrap()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_and_formats_twelve_hour_times() {
        let t: TimeOfDay = "09:05 AM".parse().unwrap();
        assert_eq!(t.minutes_since_midnight(), 9 * 60 + 5);
        assert_eq!(t.to_string(), "09:05 AM");

        let noon: TimeOfDay = "12:00 PM".parse().unwrap();
        assert_eq!(noon.minutes_since_midnight(), 12 * 60);
        assert_eq!(noon.to_string(), "12:00 PM");

        let midnight: TimeOfDay = "12:30 AM".parse().unwrap();
        assert_eq!(midnight.minutes_since_midnight(), 30);
        assert_eq!(midnight.to_string(), "12:30 AM");

        let evening: TimeOfDay = " 06:20 PM ".parse().unwrap();
        assert_eq!(evening.to_string(), "06:20 PM");
    }

    #[test]
    fn rejects_malformed_times() {
        for bad in ["", "9", "25:00 AM", "09:60 AM", "09:00", "nine AM"] {
            let err = bad.parse::<TimeOfDay>().unwrap_err();
            assert_eq!(err.input, bad);
        }
    }

    #[test]
    fn serializes_as_boundary_string() {
        let t = TimeOfDay::from_hm(18, 0).unwrap();
        assert_eq!(serde_json::to_string(&t).unwrap(), "\"06:00 PM\"");
        let back: TimeOfDay = serde_json::from_str("\"06:00 PM\"").unwrap();
        assert_eq!(back, t);
        assert!(serde_json::from_str::<TimeOfDay>("\"18:00\"").is_err());
    }

    #[test]
    fn minutes_after_is_signed() {
        let nine = TimeOfDay::from_hm(9, 0).unwrap();
        let ten_past = TimeOfDay::from_hm(9, 10).unwrap();
        assert_eq!(ten_past.minutes_after(nine), 10);
        assert_eq!(nine.minutes_after(ten_past), -10);
    }

    #[test]
    fn test_clock_drives_today_and_time_of_day() {
        let clock = TestClock::new("2024-03-04 08:59:40");
        assert_eq!(clock.today(), NaiveDate::from_ymd_opt(2024, 3, 4).unwrap());
        assert_eq!(clock.time_of_day().to_string(), "08:59 AM");

        clock.advance(chrono::Duration::hours(10));
        assert_eq!(clock.time_of_day().to_string(), "06:59 PM");

        clock.set_time("2024-03-05 07:00:00");
        assert_eq!(clock.today(), NaiveDate::from_ymd_opt(2024, 3, 5).unwrap());
    }
}
