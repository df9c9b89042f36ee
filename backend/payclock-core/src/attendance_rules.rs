// src/attendance_rules.rs

use serde::{Deserialize, Serialize};

use crate::clock::TimeOfDay;

pub const DEFAULT_TOLERANCE_MINUTES: u32 = 5;

/// Which clock event is being classified. Only the label of the outcome depends on it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClockDirection {
    TimeIn,
    TimeOut,
}

/// Outcome of comparing an actual clock event against the schedule.
///
/// Serialized as `{"label": "Late", "hours": 0, "minutes": 5}`; `Ontime` carries no
/// magnitude.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "label")]
pub enum ClockStatus {
    Ontime,
    Late { hours: u32, minutes: u32 },
    Undertime { hours: u32, minutes: u32 },
    Overtime { hours: u32, minutes: u32 },
}

impl ClockStatus {
    pub fn label(&self) -> &'static str {
        match self {
            ClockStatus::Ontime => "Ontime",
            ClockStatus::Late { .. } => "Late",
            ClockStatus::Undertime { .. } => "Undertime",
            ClockStatus::Overtime { .. } => "Overtime",
        }
    }

    pub fn magnitude(&self) -> Option<(u32, u32)> {
        match *self {
            ClockStatus::Ontime => None,
            ClockStatus::Late { hours, minutes }
            | ClockStatus::Undertime { hours, minutes }
            | ClockStatus::Overtime { hours, minutes } => Some((hours, minutes)),
        }
    }
}

/// Splits a minute count into whole hours and remaining minutes.
pub fn split_minutes(total: u32) -> (u32, u32) {
    (total / 60, total % 60)
}

#[derive(Debug, Clone, Copy)]
pub struct ClockClassifier {
    tolerance_minutes: u32,
}

impl Default for ClockClassifier {
    fn default() -> Self {
        Self::new(DEFAULT_TOLERANCE_MINUTES)
    }
}

impl ClockClassifier {
    pub fn new(tolerance_minutes: u32) -> Self {
        Self { tolerance_minutes }
    }

    pub fn tolerance_minutes(&self) -> u32 {
        self.tolerance_minutes
    }

    /// Classifies `actual` against `scheduled` (same calendar day).
    ///
    /// Anything within the tolerance window, in either direction, is `Ontime`. Beyond
    /// it the magnitude reported is the distance past the window, so a 09:10 clock-in
    /// against 09:00 with a 5 minute window is 5 minutes late.
    pub fn classify(
        &self,
        direction: ClockDirection,
        scheduled: TimeOfDay,
        actual: TimeOfDay,
    ) -> ClockStatus {
        let diff = actual.minutes_after(scheduled);
        let tolerance = i64::from(self.tolerance_minutes);

        if diff.abs() <= tolerance {
            return ClockStatus::Ontime;
        }

        // |diff| < one day, so the excess always fits in u32.
        let excess = u32::try_from(diff.abs() - tolerance).unwrap_or(u32::MAX);
        let (hours, minutes) = split_minutes(excess);

        match (direction, diff > 0) {
            (ClockDirection::TimeIn, true) => ClockStatus::Late { hours, minutes },
            (ClockDirection::TimeOut, true) => ClockStatus::Overtime { hours, minutes },
            (_, false) => ClockStatus::Undertime { hours, minutes },
        }
    }

    pub fn classify_time_in(&self, scheduled: TimeOfDay, actual: TimeOfDay) -> ClockStatus {
        self.classify(ClockDirection::TimeIn, scheduled, actual)
    }

    pub fn classify_time_out(&self, scheduled: TimeOfDay, actual: TimeOfDay) -> ClockStatus {
        self.classify(ClockDirection::TimeOut, scheduled, actual)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn t(s: &str) -> TimeOfDay {
        s.parse().unwrap()
    }

    #[test]
    fn within_tolerance_is_always_ontime() {
        let classifier = ClockClassifier::default();
        let scheduled = t("09:00 AM");
        for offset in -5i64..=5 {
            let minutes = i64::from(scheduled.minutes_since_midnight()) + offset;
            let actual =
                TimeOfDay::from_hm((minutes / 60) as u32, (minutes % 60) as u32).unwrap();
            assert_eq!(
                classifier.classify_time_in(scheduled, actual),
                ClockStatus::Ontime,
                "time-in offset {}",
                offset
            );
            assert_eq!(
                classifier.classify_time_out(scheduled, actual),
                ClockStatus::Ontime,
                "time-out offset {}",
                offset
            );
        }
    }

    #[test]
    fn late_clock_in_reports_minutes_past_window() {
        let classifier = ClockClassifier::default();
        assert_eq!(
            classifier.classify_time_in(t("09:00 AM"), t("09:10 AM")),
            ClockStatus::Late {
                hours: 0,
                minutes: 5
            }
        );
        assert_eq!(
            classifier.classify_time_in(t("09:00 AM"), t("10:20 AM")),
            ClockStatus::Late {
                hours: 1,
                minutes: 15
            }
        );
    }

    #[test]
    fn early_clock_in_is_undertime() {
        let classifier = ClockClassifier::default();
        assert_eq!(
            classifier.classify_time_in(t("09:00 AM"), t("08:30 AM")),
            ClockStatus::Undertime {
                hours: 0,
                minutes: 25
            }
        );
    }

    #[test]
    fn late_clock_out_is_overtime_and_early_is_undertime() {
        let classifier = ClockClassifier::default();
        assert_eq!(
            classifier.classify_time_out(t("06:00 PM"), t("06:20 PM")),
            ClockStatus::Overtime {
                hours: 0,
                minutes: 15
            }
        );
        assert_eq!(
            classifier.classify_time_out(t("06:00 PM"), t("04:00 PM")),
            ClockStatus::Undertime {
                hours: 1,
                minutes: 55
            }
        );
    }

    #[test]
    fn tolerance_is_configurable() {
        let strict = ClockClassifier::new(0);
        assert_eq!(
            strict.classify_time_in(t("09:00 AM"), t("09:01 AM")),
            ClockStatus::Late {
                hours: 0,
                minutes: 1
            }
        );
    }

    #[test]
    fn status_serializes_with_label_tag() {
        let late = ClockStatus::Late {
            hours: 0,
            minutes: 5,
        };
        assert_eq!(
            serde_json::to_value(late).unwrap(),
            serde_json::json!({"label": "Late", "hours": 0, "minutes": 5})
        );
        assert_eq!(
            serde_json::to_value(ClockStatus::Ontime).unwrap(),
            serde_json::json!({"label": "Ontime"})
        );
        assert_eq!(late.label(), "Late");
        assert_eq!(late.magnitude(), Some((0, 5)));
        assert_eq!(ClockStatus::Ontime.magnitude(), None);
    }
}
