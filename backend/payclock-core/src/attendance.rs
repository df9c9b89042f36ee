// src/attendance.rs

use serde::Deserialize;
use std::sync::Arc;
use tracing::{info, warn};

use crate::attendance_rules::ClockClassifier;
use crate::clock::{Clock, TimeOfDay};
use crate::error::{ConflictKind, ServiceError, ALREADY_TIMED_IN, ALREADY_TIMED_OUT, NOT_TIMED_IN};
use crate::models::*;
use crate::pay_calculator::{compute_amount, AttendanceAmount, WorkDuration};
use crate::payroll::PayrollService;
use crate::registry::Registry;
use crate::store::{RecordStore, StoreError};

#[derive(Debug, Clone, Deserialize)]
pub struct ClockRequest {
    pub username: String,
    pub password: String,
}

/// Clock-in / clock-out state machine: no record, timed in, complete. One record per
/// employee per calendar day in the business timezone.
pub struct AttendanceService {
    store: Arc<dyn RecordStore>,
    clock: Arc<dyn Clock>,
    registry: Arc<Registry>,
    payroll: Arc<PayrollService>,
    classifier: ClockClassifier,
}

impl AttendanceService {
    pub fn new(
        store: Arc<dyn RecordStore>,
        clock: Arc<dyn Clock>,
        registry: Arc<Registry>,
        payroll: Arc<PayrollService>,
        classifier: ClockClassifier,
    ) -> Self {
        Self {
            store,
            clock,
            registry,
            payroll,
            classifier,
        }
    }

    pub async fn time_in(&self, req: &ClockRequest) -> Result<AttendanceRecord, ServiceError> {
        let employee = self.registry.authenticate(&req.username, &req.password).await?;
        let (position, schedule) = match (&employee.position, employee.schedule) {
            (Some(position), Some(schedule)) => (position.clone(), schedule),
            _ => {
                warn!("Clock-in refused, not hired yet: Emp={}", employee.id);
                return Err(ServiceError::validation(
                    "position",
                    "The account has no position or schedule yet.",
                ));
            }
        };

        let now = self.clock.now();
        let time = TimeOfDay::from(now.time());
        let status = self.classifier.classify_time_in(schedule.timein, time);
        let headcount = self.registry.headcount().await?;

        let record = AttendanceRecord {
            id: new_record_id(),
            employee_id: employee.id.clone(),
            position: position.clone(),
            schedule,
            timein: ClockEvent { time, status },
            timeout: None,
            duration: WorkDuration::default(),
            amount: AttendanceAmount::default(),
            payed: false,
            date: now.date(),
            extra: AttendanceExtra {
                employees: headcount,
            },
            created: now,
            updated: now,
        };

        let record = match self.store.insert_attendance(record).await {
            Ok(record) => record,
            Err(StoreError::Duplicate { .. }) => {
                warn!("Duplicate clock-in: Emp={}, Date={}", employee.id, now.date());
                return Err(ServiceError::conflict(ConflictKind::Timein, ALREADY_TIMED_IN));
            }
            Err(e) => return Err(e.into()),
        };
        info!(
            "Clock-in: Emp={}, Date={}, Time={}, Status={}",
            record.employee_id,
            record.date,
            record.timein.time,
            record.timein.status.label()
        );

        self.payroll
            .ensure_open_cycle(&employee.id, position, schedule)
            .await?;
        Ok(record)
    }

    pub async fn time_out(&self, req: &ClockRequest) -> Result<AttendanceRecord, ServiceError> {
        let employee = self.registry.authenticate(&req.username, &req.password).await?;

        let now = self.clock.now();
        let record = self
            .store
            .attendance_for_day(&employee.id, now.date())
            .await?
            .ok_or_else(|| {
                warn!("Clock-out without clock-in: Emp={}, Date={}", employee.id, now.date());
                ServiceError::conflict(ConflictKind::Timeout, NOT_TIMED_IN)
            })?;
        if record.is_complete() {
            warn!("Duplicate clock-out: Emp={}, Date={}", employee.id, record.date);
            return Err(ServiceError::conflict(ConflictKind::Timeout, ALREADY_TIMED_OUT));
        }

        // Classified against the schedule captured at clock-in.
        let time = TimeOfDay::from(now.time());
        let status = self.classifier.classify_time_out(record.schedule.timeout, time);
        let duration = WorkDuration::between(record.timein.time, time);
        let amount = compute_amount(record.position.rate, &record.timein.status, &status, duration);

        let completed = self
            .store
            .complete_attendance(&record.id, ClockEvent { time, status }, duration, amount, now)
            .await
            .map_err(|e| match e {
                StoreError::ConditionFailed { .. } => {
                    ServiceError::conflict(ConflictKind::Timeout, ALREADY_TIMED_OUT)
                }
                other => other.into(),
            })?;
        info!(
            "Clock-out: Emp={}, Date={}, Time={}, Status={}, Worked={}h{}m, Netpay={}",
            completed.employee_id,
            completed.date,
            time,
            status.label(),
            duration.hours,
            duration.minutes,
            amount.netpay
        );
        Ok(completed)
    }

    pub async fn records(&self) -> Result<Vec<AttendanceRecord>, ServiceError> {
        Ok(self.store.attendance_records().await?)
    }
}
