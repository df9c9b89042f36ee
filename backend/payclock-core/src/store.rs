// src/store.rs

use async_trait::async_trait;
use chrono::{NaiveDate, NaiveDateTime};
use std::collections::HashMap;
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::debug;

use crate::models::*;
use crate::pay_calculator::{AttendanceAmount, WorkDuration};

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    #[error("Duplicate {collection} record for key '{key}'")]
    Duplicate {
        collection: &'static str,
        key: String,
    },

    #[error("{collection} record '{id}' not found")]
    NotFound { collection: &'static str, id: String },

    #[error("Conditional write on {collection} record '{id}' rejected: {reason}")]
    ConditionFailed {
        collection: &'static str,
        id: String,
        reason: String,
    },

    #[error("Record store unavailable: {0}")]
    Unavailable(String),
}

const EMPLOYEES: &str = "employees";
const POSITIONS: &str = "positions";
const SCHEDULES: &str = "schedules";
const LEAVE_TYPES: &str = "leave_types";
const DEDUCTIONS: &str = "deductions";
const ATTENDANCE: &str = "attendance";
const PAYROLLS: &str = "payrolls";
const LEAVES: &str = "leaves";

fn not_found(collection: &'static str, id: &str) -> StoreError {
    StoreError::NotFound {
        collection,
        id: id.to_string(),
    }
}

/// Document store used by the services.
///
/// Every uniqueness or state-transition rule is enforced here, inside a single
/// conditional write, so two racing requests cannot both pass an existence check.
#[async_trait]
pub trait RecordStore: Send + Sync {
    // Employees

    /// Fails with `Duplicate` when the username is taken.
    async fn insert_employee(&self, employee: Employee) -> Result<Employee, StoreError>;
    async fn update_employee(&self, employee: Employee) -> Result<Employee, StoreError>;
    async fn employee(&self, id: &str) -> Result<Option<Employee>, StoreError>;
    async fn employee_by_username(&self, username: &str) -> Result<Option<Employee>, StoreError>;
    async fn employees(&self) -> Result<Vec<Employee>, StoreError>;
    /// Adds `delta` to the employee's leave limit, refusing to go below zero.
    /// Returns the new limit.
    async fn adjust_leave_limit(&self, employee_id: &str, delta: i64) -> Result<u32, StoreError>;

    // Reference data

    async fn insert_position(&self, entry: PositionEntry) -> Result<PositionEntry, StoreError>;
    async fn position(&self, id: &str) -> Result<Option<PositionEntry>, StoreError>;
    async fn positions(&self) -> Result<Vec<PositionEntry>, StoreError>;
    async fn delete_position(&self, id: &str) -> Result<(), StoreError>;

    async fn insert_schedule(&self, entry: ScheduleEntry) -> Result<ScheduleEntry, StoreError>;
    async fn schedule(&self, id: &str) -> Result<Option<ScheduleEntry>, StoreError>;
    async fn schedules(&self) -> Result<Vec<ScheduleEntry>, StoreError>;
    async fn delete_schedule(&self, id: &str) -> Result<(), StoreError>;

    /// Fails with `Duplicate` when the name is taken.
    async fn insert_leave_type(&self, leave_type: LeaveType) -> Result<LeaveType, StoreError>;
    async fn leave_type_by_name(&self, name: &str) -> Result<Option<LeaveType>, StoreError>;
    async fn leave_types(&self) -> Result<Vec<LeaveType>, StoreError>;
    async fn delete_leave_type(&self, id: &str) -> Result<(), StoreError>;

    async fn insert_deduction(&self, deduction: Deduction) -> Result<Deduction, StoreError>;
    async fn deductions(&self) -> Result<Vec<Deduction>, StoreError>;
    async fn delete_deduction(&self, id: &str) -> Result<(), StoreError>;

    // Attendance

    /// Fails with `Duplicate` when the employee already has a record for that date.
    async fn insert_attendance(
        &self,
        record: AttendanceRecord,
    ) -> Result<AttendanceRecord, StoreError>;
    async fn attendance_for_day(
        &self,
        employee_id: &str,
        date: NaiveDate,
    ) -> Result<Option<AttendanceRecord>, StoreError>;
    /// Fills in the time-out side of a record that has none yet.
    async fn complete_attendance(
        &self,
        id: &str,
        timeout: ClockEvent,
        duration: WorkDuration,
        amount: AttendanceAmount,
        updated: NaiveDateTime,
    ) -> Result<AttendanceRecord, StoreError>;
    async fn attendance_for_employee(
        &self,
        employee_id: &str,
    ) -> Result<Vec<AttendanceRecord>, StoreError>;
    async fn attendance_records(&self) -> Result<Vec<AttendanceRecord>, StoreError>;

    // Payroll

    /// Creates `cycle` unless the employee already has an open one. Returns the
    /// created cycle, or `None` when one was already open.
    async fn open_payroll_if_absent(
        &self,
        cycle: PayrollCycle,
    ) -> Result<Option<PayrollCycle>, StoreError>;
    async fn open_payroll_for(&self, employee_id: &str)
        -> Result<Option<PayrollCycle>, StoreError>;
    async fn payroll(&self, id: &str) -> Result<Option<PayrollCycle>, StoreError>;
    /// Newest first.
    async fn payrolls(&self) -> Result<Vec<PayrollCycle>, StoreError>;
    /// Replaces a still-open cycle with its paid version and marks every embedded
    /// attendance record as payed, all or nothing.
    async fn settle_payroll(&self, closed: PayrollCycle) -> Result<PayrollCycle, StoreError>;

    // Leave

    /// Inserts the request and takes `quota_cost` days from the employee's limit in the
    /// same step.
    async fn insert_leave(
        &self,
        leave: LeaveRequest,
        quota_cost: u32,
    ) -> Result<LeaveRequest, StoreError>;
    async fn leave(&self, id: &str) -> Result<Option<LeaveRequest>, StoreError>;
    /// Newest first.
    async fn leaves(&self) -> Result<Vec<LeaveRequest>, StoreError>;
    async fn leaves_for(&self, employee_id: &str) -> Result<Vec<LeaveRequest>, StoreError>;
    /// Stores `updated` only if the stored request is still in `expected` status, and
    /// applies `quota_delta` to the owner's limit in the same step.
    async fn transition_leave(
        &self,
        expected: LeaveStatus,
        updated: LeaveRequest,
        quota_delta: i64,
    ) -> Result<LeaveRequest, StoreError>;
}

// --- In-memory implementation ---

#[derive(Default)]
struct Collections {
    employees: HashMap<RecordId, Employee>,
    positions: HashMap<RecordId, PositionEntry>,
    schedules: HashMap<RecordId, ScheduleEntry>,
    leave_types: HashMap<RecordId, LeaveType>,
    deductions: HashMap<RecordId, Deduction>,
    attendance: HashMap<RecordId, AttendanceRecord>,
    attendance_by_day: HashMap<(RecordId, NaiveDate), RecordId>,
    payrolls: HashMap<RecordId, PayrollCycle>,
    open_payroll_by_employee: HashMap<RecordId, RecordId>,
    leaves: HashMap<RecordId, LeaveRequest>,
}

impl Collections {
    fn apply_limit_delta(&mut self, employee_id: &str, delta: i64) -> Result<u32, StoreError> {
        let employee = self
            .employees
            .get_mut(employee_id)
            .ok_or_else(|| not_found(EMPLOYEES, employee_id))?;
        let new_limit = i64::from(employee.limit) + delta;
        let new_limit = u32::try_from(new_limit).map_err(|_| StoreError::ConditionFailed {
            collection: EMPLOYEES,
            id: employee_id.to_string(),
            reason: format!(
                "leave limit {} cannot be adjusted by {}",
                employee.limit, delta
            ),
        })?;
        employee.limit = new_limit;
        Ok(new_limit)
    }
}

/// Process-local store. One lock guards all collections, which makes each trait
/// method a single atomic step.
#[derive(Default)]
pub struct InMemoryStore {
    inner: Mutex<Collections>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl RecordStore for InMemoryStore {
    async fn insert_employee(&self, employee: Employee) -> Result<Employee, StoreError> {
        let mut db = self.inner.lock().await;
        if db
            .employees
            .values()
            .any(|e| e.username == employee.username)
        {
            return Err(StoreError::Duplicate {
                collection: EMPLOYEES,
                key: employee.username,
            });
        }
        db.employees.insert(employee.id.clone(), employee.clone());
        Ok(employee)
    }

    async fn update_employee(&self, employee: Employee) -> Result<Employee, StoreError> {
        let mut db = self.inner.lock().await;
        let slot = db
            .employees
            .get_mut(&employee.id)
            .ok_or_else(|| not_found(EMPLOYEES, &employee.id))?;
        *slot = employee.clone();
        Ok(employee)
    }

    async fn employee(&self, id: &str) -> Result<Option<Employee>, StoreError> {
        Ok(self.inner.lock().await.employees.get(id).cloned())
    }

    async fn employee_by_username(&self, username: &str) -> Result<Option<Employee>, StoreError> {
        Ok(self
            .inner
            .lock()
            .await
            .employees
            .values()
            .find(|e| e.username == username)
            .cloned())
    }

    async fn employees(&self) -> Result<Vec<Employee>, StoreError> {
        let mut all: Vec<Employee> = self.inner.lock().await.employees.values().cloned().collect();
        all.sort_by(|a, b| b.created.cmp(&a.created));
        Ok(all)
    }

    async fn adjust_leave_limit(&self, employee_id: &str, delta: i64) -> Result<u32, StoreError> {
        let mut db = self.inner.lock().await;
        db.apply_limit_delta(employee_id, delta)
    }

    async fn insert_position(&self, entry: PositionEntry) -> Result<PositionEntry, StoreError> {
        let mut db = self.inner.lock().await;
        db.positions.insert(entry.id.clone(), entry.clone());
        Ok(entry)
    }

    async fn position(&self, id: &str) -> Result<Option<PositionEntry>, StoreError> {
        Ok(self.inner.lock().await.positions.get(id).cloned())
    }

    async fn positions(&self) -> Result<Vec<PositionEntry>, StoreError> {
        let mut all: Vec<PositionEntry> =
            self.inner.lock().await.positions.values().cloned().collect();
        all.sort_by(|a, b| a.position.title.cmp(&b.position.title));
        Ok(all)
    }

    async fn delete_position(&self, id: &str) -> Result<(), StoreError> {
        let mut db = self.inner.lock().await;
        db.positions
            .remove(id)
            .map(|_| ())
            .ok_or_else(|| not_found(POSITIONS, id))
    }

    async fn insert_schedule(&self, entry: ScheduleEntry) -> Result<ScheduleEntry, StoreError> {
        let mut db = self.inner.lock().await;
        db.schedules.insert(entry.id.clone(), entry.clone());
        Ok(entry)
    }

    async fn schedule(&self, id: &str) -> Result<Option<ScheduleEntry>, StoreError> {
        Ok(self.inner.lock().await.schedules.get(id).cloned())
    }

    async fn schedules(&self) -> Result<Vec<ScheduleEntry>, StoreError> {
        let mut all: Vec<ScheduleEntry> =
            self.inner.lock().await.schedules.values().cloned().collect();
        all.sort_by_key(|s| (s.schedule.timein, s.schedule.timeout));
        Ok(all)
    }

    async fn delete_schedule(&self, id: &str) -> Result<(), StoreError> {
        let mut db = self.inner.lock().await;
        db.schedules
            .remove(id)
            .map(|_| ())
            .ok_or_else(|| not_found(SCHEDULES, id))
    }

    async fn insert_leave_type(&self, leave_type: LeaveType) -> Result<LeaveType, StoreError> {
        let mut db = self.inner.lock().await;
        if db
            .leave_types
            .values()
            .any(|t| t.name.eq_ignore_ascii_case(&leave_type.name))
        {
            return Err(StoreError::Duplicate {
                collection: LEAVE_TYPES,
                key: leave_type.name,
            });
        }
        db.leave_types
            .insert(leave_type.id.clone(), leave_type.clone());
        Ok(leave_type)
    }

    async fn leave_type_by_name(&self, name: &str) -> Result<Option<LeaveType>, StoreError> {
        Ok(self
            .inner
            .lock()
            .await
            .leave_types
            .values()
            .find(|t| t.name == name)
            .cloned())
    }

    async fn leave_types(&self) -> Result<Vec<LeaveType>, StoreError> {
        let mut all: Vec<LeaveType> =
            self.inner.lock().await.leave_types.values().cloned().collect();
        all.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(all)
    }

    async fn delete_leave_type(&self, id: &str) -> Result<(), StoreError> {
        let mut db = self.inner.lock().await;
        db.leave_types
            .remove(id)
            .map(|_| ())
            .ok_or_else(|| not_found(LEAVE_TYPES, id))
    }

    async fn insert_deduction(&self, deduction: Deduction) -> Result<Deduction, StoreError> {
        let mut db = self.inner.lock().await;
        db.deductions.insert(deduction.id.clone(), deduction.clone());
        Ok(deduction)
    }

    async fn deductions(&self) -> Result<Vec<Deduction>, StoreError> {
        let mut all: Vec<Deduction> =
            self.inner.lock().await.deductions.values().cloned().collect();
        all.sort_by(|a, b| a.title.cmp(&b.title));
        Ok(all)
    }

    async fn delete_deduction(&self, id: &str) -> Result<(), StoreError> {
        let mut db = self.inner.lock().await;
        db.deductions
            .remove(id)
            .map(|_| ())
            .ok_or_else(|| not_found(DEDUCTIONS, id))
    }

    async fn insert_attendance(
        &self,
        record: AttendanceRecord,
    ) -> Result<AttendanceRecord, StoreError> {
        let mut db = self.inner.lock().await;
        let day_key = (record.employee_id.clone(), record.date);
        if db.attendance_by_day.contains_key(&day_key) {
            debug!(
                "Rejecting second attendance record for Emp={}, Date={}",
                record.employee_id, record.date
            );
            return Err(StoreError::Duplicate {
                collection: ATTENDANCE,
                key: format!("{}/{}", record.employee_id, record.date),
            });
        }
        db.attendance_by_day.insert(day_key, record.id.clone());
        db.attendance.insert(record.id.clone(), record.clone());
        Ok(record)
    }

    async fn attendance_for_day(
        &self,
        employee_id: &str,
        date: NaiveDate,
    ) -> Result<Option<AttendanceRecord>, StoreError> {
        let db = self.inner.lock().await;
        Ok(db
            .attendance_by_day
            .get(&(employee_id.to_string(), date))
            .and_then(|id| db.attendance.get(id))
            .cloned())
    }

    async fn complete_attendance(
        &self,
        id: &str,
        timeout: ClockEvent,
        duration: WorkDuration,
        amount: AttendanceAmount,
        updated: NaiveDateTime,
    ) -> Result<AttendanceRecord, StoreError> {
        let mut db = self.inner.lock().await;
        let record = db
            .attendance
            .get_mut(id)
            .ok_or_else(|| not_found(ATTENDANCE, id))?;
        if record.timeout.is_some() {
            return Err(StoreError::ConditionFailed {
                collection: ATTENDANCE,
                id: id.to_string(),
                reason: "record already has a time-out".to_string(),
            });
        }
        if record.payed {
            return Err(StoreError::ConditionFailed {
                collection: ATTENDANCE,
                id: id.to_string(),
                reason: "record has already been paid out".to_string(),
            });
        }
        record.timeout = Some(timeout);
        record.duration = duration;
        record.amount = amount;
        record.updated = updated;
        Ok(record.clone())
    }

    async fn attendance_for_employee(
        &self,
        employee_id: &str,
    ) -> Result<Vec<AttendanceRecord>, StoreError> {
        let mut found: Vec<AttendanceRecord> = self
            .inner
            .lock()
            .await
            .attendance
            .values()
            .filter(|a| a.employee_id == employee_id)
            .cloned()
            .collect();
        found.sort_by_key(|a| a.date);
        Ok(found)
    }

    async fn attendance_records(&self) -> Result<Vec<AttendanceRecord>, StoreError> {
        let mut all: Vec<AttendanceRecord> =
            self.inner.lock().await.attendance.values().cloned().collect();
        all.sort_by(|a, b| b.created.cmp(&a.created));
        Ok(all)
    }

    async fn open_payroll_if_absent(
        &self,
        cycle: PayrollCycle,
    ) -> Result<Option<PayrollCycle>, StoreError> {
        let mut db = self.inner.lock().await;
        if db.open_payroll_by_employee.contains_key(&cycle.employee_id) {
            return Ok(None);
        }
        db.open_payroll_by_employee
            .insert(cycle.employee_id.clone(), cycle.id.clone());
        db.payrolls.insert(cycle.id.clone(), cycle.clone());
        Ok(Some(cycle))
    }

    async fn open_payroll_for(
        &self,
        employee_id: &str,
    ) -> Result<Option<PayrollCycle>, StoreError> {
        let db = self.inner.lock().await;
        Ok(db
            .open_payroll_by_employee
            .get(employee_id)
            .and_then(|id| db.payrolls.get(id))
            .cloned())
    }

    async fn payroll(&self, id: &str) -> Result<Option<PayrollCycle>, StoreError> {
        Ok(self.inner.lock().await.payrolls.get(id).cloned())
    }

    async fn payrolls(&self) -> Result<Vec<PayrollCycle>, StoreError> {
        let mut all: Vec<PayrollCycle> =
            self.inner.lock().await.payrolls.values().cloned().collect();
        all.sort_by(|a, b| b.created.cmp(&a.created));
        Ok(all)
    }

    async fn settle_payroll(&self, closed: PayrollCycle) -> Result<PayrollCycle, StoreError> {
        let mut db = self.inner.lock().await;

        let stored = db
            .payrolls
            .get(&closed.id)
            .ok_or_else(|| not_found(PAYROLLS, &closed.id))?;
        if !stored.is_open() {
            return Err(StoreError::ConditionFailed {
                collection: PAYROLLS,
                id: closed.id.clone(),
                reason: "cycle is already paid".to_string(),
            });
        }
        // Validate every attendance flag before writing anything.
        for att in &closed.attendances {
            match db.attendance.get(&att.id) {
                None => return Err(not_found(ATTENDANCE, &att.id)),
                Some(existing) if existing.payed => {
                    return Err(StoreError::ConditionFailed {
                        collection: ATTENDANCE,
                        id: att.id.clone(),
                        reason: "record has already been paid out".to_string(),
                    })
                }
                Some(_) => {}
            }
        }

        let updated = closed.updated;
        for att in &closed.attendances {
            if let Some(existing) = db.attendance.get_mut(&att.id) {
                existing.payed = true;
                existing.updated = updated;
            }
        }
        db.open_payroll_by_employee.remove(&closed.employee_id);
        db.payrolls.insert(closed.id.clone(), closed.clone());
        Ok(closed)
    }

    async fn insert_leave(
        &self,
        leave: LeaveRequest,
        quota_cost: u32,
    ) -> Result<LeaveRequest, StoreError> {
        let mut db = self.inner.lock().await;
        if quota_cost > 0 {
            db.apply_limit_delta(&leave.employee_id, -i64::from(quota_cost))?;
        } else if !db.employees.contains_key(&leave.employee_id) {
            return Err(not_found(EMPLOYEES, &leave.employee_id));
        }
        db.leaves.insert(leave.id.clone(), leave.clone());
        Ok(leave)
    }

    async fn leave(&self, id: &str) -> Result<Option<LeaveRequest>, StoreError> {
        Ok(self.inner.lock().await.leaves.get(id).cloned())
    }

    async fn leaves(&self) -> Result<Vec<LeaveRequest>, StoreError> {
        let mut all: Vec<LeaveRequest> = self.inner.lock().await.leaves.values().cloned().collect();
        all.sort_by(|a, b| b.created.cmp(&a.created));
        Ok(all)
    }

    async fn leaves_for(&self, employee_id: &str) -> Result<Vec<LeaveRequest>, StoreError> {
        let mut found: Vec<LeaveRequest> = self
            .inner
            .lock()
            .await
            .leaves
            .values()
            .filter(|l| l.employee_id == employee_id)
            .cloned()
            .collect();
        found.sort_by(|a, b| b.created.cmp(&a.created));
        Ok(found)
    }

    async fn transition_leave(
        &self,
        expected: LeaveStatus,
        updated: LeaveRequest,
        quota_delta: i64,
    ) -> Result<LeaveRequest, StoreError> {
        let mut db = self.inner.lock().await;
        let current = db
            .leaves
            .get(&updated.id)
            .ok_or_else(|| not_found(LEAVES, &updated.id))?
            .status;
        if current != expected {
            return Err(StoreError::ConditionFailed {
                collection: LEAVES,
                id: updated.id.clone(),
                reason: format!("expected status {:?}, found {:?}", expected, current),
            });
        }
        if quota_delta != 0 {
            db.apply_limit_delta(&updated.employee_id, quota_delta)?;
        }
        db.leaves.insert(updated.id.clone(), updated.clone());
        Ok(updated)
    }
}
