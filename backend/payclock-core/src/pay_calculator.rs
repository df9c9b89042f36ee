// src/pay_calculator.rs

use rust_decimal::prelude::*;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::attendance_rules::{split_minutes, ClockStatus};
use crate::clock::TimeOfDay;

/// Money is kept to centavos; every formula result is rounded once, here.
pub fn round_money(amount: Decimal) -> Decimal {
    amount.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero)
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkDuration {
    pub hours: u32,
    pub minutes: u32,
}

impl WorkDuration {
    pub fn from_minutes(total: u32) -> Self {
        let (hours, minutes) = split_minutes(total);
        Self { hours, minutes }
    }

    /// Elapsed time between two same-day clock times. Shifts crossing midnight are not
    /// supported; an end before the start yields zero.
    pub fn between(start: TimeOfDay, end: TimeOfDay) -> Self {
        let elapsed = end.minutes_after(start);
        if elapsed < 0 {
            warn!(
                "Clock-out {} is before clock-in {}; recording zero duration",
                end, start
            );
            return Self::default();
        }
        Self::from_minutes(u32::try_from(elapsed).unwrap_or(0))
    }

    pub fn total_minutes(&self) -> u32 {
        self.hours * 60 + self.minutes
    }

    /// Adds durations and normalizes minutes into hours.
    pub fn sum<'a>(durations: impl IntoIterator<Item = &'a WorkDuration>) -> Self {
        Self::from_minutes(durations.into_iter().map(WorkDuration::total_minutes).sum())
    }
}

/// Monetary outcome of one attendance day.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttendanceAmount {
    pub late: Decimal,
    pub overtime: Decimal,
    pub netpay: Decimal,
}

/// `rate * hours + (rate / 60) * minutes`, unrounded.
fn hourly_value(rate: Decimal, hours: u32, minutes: u32) -> Decimal {
    rate * Decimal::from(hours) + (rate / dec!(60)) * Decimal::from(minutes)
}

/// Pay for a block of time at an hourly rate.
pub fn pay_for(rate: Decimal, hours: u32, minutes: u32) -> Decimal {
    round_money(hourly_value(rate, hours, minutes))
}

/// Computes the day's amounts.
///
/// `late` is the value of the late magnitude when the time-in was late; `overtime` the
/// value of the overtime magnitude when the time-out ran over. `netpay` is the elapsed
/// time at the rate plus overtime. `late` is reported but not subtracted.
pub fn compute_amount(
    rate: Decimal,
    time_in_status: &ClockStatus,
    time_out_status: &ClockStatus,
    elapsed: WorkDuration,
) -> AttendanceAmount {
    let late = match time_in_status {
        ClockStatus::Late { hours, minutes } => pay_for(rate, *hours, *minutes),
        _ => Decimal::ZERO,
    };
    let overtime = match time_out_status {
        ClockStatus::Overtime { hours, minutes } => pay_for(rate, *hours, *minutes),
        _ => Decimal::ZERO,
    };
    let netpay = pay_for(rate, elapsed.hours, elapsed.minutes) + overtime;

    AttendanceAmount {
        late,
        overtime,
        netpay,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn t(s: &str) -> TimeOfDay {
        s.parse().unwrap()
    }

    #[test]
    fn duration_between_same_day_times() {
        assert_eq!(
            WorkDuration::between(t("09:03 AM"), t("06:20 PM")),
            WorkDuration {
                hours: 9,
                minutes: 17
            }
        );
        assert_eq!(
            WorkDuration::between(t("09:00 AM"), t("09:00 AM")),
            WorkDuration::default()
        );
    }

    #[test]
    fn duration_never_goes_negative() {
        assert_eq!(
            WorkDuration::between(t("10:00 PM"), t("02:00 AM")),
            WorkDuration::default()
        );
    }

    #[test]
    fn durations_sum_with_minute_carry() {
        let days = [
            WorkDuration {
                hours: 8,
                minutes: 45,
            },
            WorkDuration {
                hours: 7,
                minutes: 30,
            },
        ];
        assert_eq!(
            WorkDuration::sum(&days),
            WorkDuration {
                hours: 16,
                minutes: 15
            }
        );
    }

    #[test]
    fn ontime_day_has_only_base_pay() {
        let amount = compute_amount(
            dec!(100),
            &ClockStatus::Ontime,
            &ClockStatus::Ontime,
            WorkDuration {
                hours: 9,
                minutes: 0,
            },
        );
        assert_eq!(amount.late, Decimal::ZERO);
        assert_eq!(amount.overtime, Decimal::ZERO);
        assert_eq!(amount.netpay, dec!(900));
    }

    #[test]
    fn overtime_is_added_to_netpay() {
        // rate 100/hr, 10h20m elapsed, one hour of overtime past the window
        let amount = compute_amount(
            dec!(100),
            &ClockStatus::Ontime,
            &ClockStatus::Overtime {
                hours: 1,
                minutes: 0,
            },
            WorkDuration {
                hours: 10,
                minutes: 20,
            },
        );
        assert_eq!(amount.overtime, dec!(100));
        assert_eq!(amount.netpay, dec!(1000) + dec!(33.33) + dec!(100));
    }

    #[test]
    fn late_is_reported_but_not_subtracted() {
        let amount = compute_amount(
            dec!(60),
            &ClockStatus::Late {
                hours: 0,
                minutes: 30,
            },
            &ClockStatus::Undertime {
                hours: 0,
                minutes: 10,
            },
            WorkDuration {
                hours: 8,
                minutes: 0,
            },
        );
        assert_eq!(amount.late, dec!(30));
        assert_eq!(amount.overtime, Decimal::ZERO);
        assert_eq!(amount.netpay, dec!(480));
    }

    #[test]
    fn fractional_rates_round_to_centavos() {
        assert_eq!(pay_for(dec!(100), 0, 30), dec!(50.00));
        assert_eq!(pay_for(dec!(57.5), 1, 7), dec!(64.21));
    }
}
