// src/models.rs

use chrono::{NaiveDate, NaiveDateTime};
use rand::{distributions::Alphanumeric, thread_rng, Rng};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::attendance_rules::ClockStatus;
use crate::clock::TimeOfDay;
use crate::pay_calculator::{AttendanceAmount, WorkDuration};

pub type RecordId = String;

pub const DEFAULT_LEAVE_LIMIT: u32 = 15;

/// Generates a fresh document id.
pub fn new_record_id() -> RecordId {
    thread_rng()
        .sample_iter(&Alphanumeric)
        .take(24)
        .map(|c| char::from(c).to_ascii_lowercase())
        .collect()
}

// --- Reference data ---

/// Position title and hourly rate, as snapshotted onto attendance and payroll.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Position {
    pub title: String,
    pub rate: Decimal,
}

/// Scheduled time-in and time-out, as snapshotted onto attendance and payroll.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Schedule {
    pub timein: TimeOfDay,
    pub timeout: TimeOfDay,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PositionEntry {
    pub id: RecordId,
    #[serde(flatten)]
    pub position: Position,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScheduleEntry {
    pub id: RecordId,
    #[serde(flatten)]
    pub schedule: Schedule,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LeaveType {
    pub id: RecordId,
    pub name: String,
    pub payed: bool,
}

/// Flat amount subtracted from every payout at close time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Deduction {
    pub id: RecordId,
    pub title: String,
    pub amount: Decimal,
}

// --- Employees ---

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EmployeeRole {
    User,
    Employee,
    Admin,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EmployeeStatus {
    Active,
    Inactive,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Employee {
    pub id: RecordId,
    pub name: String,
    pub email: String,
    pub username: String,
    #[serde(skip_serializing)]
    pub password_hash: String,
    /// Remaining paid-leave days for the year.
    pub limit: u32,
    pub position: Option<Position>,
    pub schedule: Option<Schedule>,
    pub role: EmployeeRole,
    pub status: EmployeeStatus,
    pub hired_date: Option<NaiveDate>,
    pub contract_end_date: Option<NaiveDate>,
    pub created: NaiveDateTime,
    pub updated: NaiveDateTime,
}

// --- Attendance ---

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClockEvent {
    pub time: TimeOfDay,
    pub status: ClockStatus,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttendanceExtra {
    /// Number of hired employees at clock-in time.
    pub employees: u32,
}

/// One employee's day. Created at clock-in, completed once at clock-out, flagged
/// `payed` when the payroll cycle that includes it closes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttendanceRecord {
    pub id: RecordId,
    pub employee_id: RecordId,
    pub position: Position,
    pub schedule: Schedule,
    pub timein: ClockEvent,
    pub timeout: Option<ClockEvent>,
    pub duration: WorkDuration,
    pub amount: AttendanceAmount,
    pub payed: bool,
    pub date: NaiveDate,
    pub extra: AttendanceExtra,
    pub created: NaiveDateTime,
    pub updated: NaiveDateTime,
}

impl AttendanceRecord {
    pub fn is_complete(&self) -> bool {
        self.timeout.is_some()
    }
}

// --- Payroll ---

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PayrollStatus {
    Open,
    Paid,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PayrollAmount {
    pub pay: Decimal,
    pub overtime: Decimal,
    pub grosspay: Decimal,
    pub leaves: Decimal,
    pub deductions: Decimal,
    pub netpay: Decimal,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PayrollCycle {
    pub id: RecordId,
    pub employee_id: RecordId,
    pub position: Position,
    pub schedule: Schedule,
    pub amount: PayrollAmount,
    pub duration: WorkDuration,
    pub attendances: Vec<AttendanceRecord>,
    pub leaves: Vec<LeaveRequest>,
    pub deductions: Vec<Deduction>,
    pub status: PayrollStatus,
    pub created: NaiveDateTime,
    pub updated: NaiveDateTime,
    pub paid_at: Option<NaiveDateTime>,
}

impl PayrollCycle {
    pub fn open(
        employee_id: RecordId,
        position: Position,
        schedule: Schedule,
        now: NaiveDateTime,
    ) -> Self {
        Self {
            id: new_record_id(),
            employee_id,
            position,
            schedule,
            amount: PayrollAmount::default(),
            duration: WorkDuration::default(),
            attendances: Vec::new(),
            leaves: Vec::new(),
            deductions: Vec::new(),
            status: PayrollStatus::Open,
            created: now,
            updated: now,
            paid_at: None,
        }
    }

    pub fn is_open(&self) -> bool {
        self.status == PayrollStatus::Open
    }
}

// --- Leave ---

/// Uploaded file reference, as returned by the blob store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileRef {
    pub url: String,
    pub name: String,
    pub size: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LeaveStatus {
    Waiting,
    Approved,
    Rejected,
    Cancelled,
}

impl LeaveStatus {
    pub fn is_terminal(self) -> bool {
        self != LeaveStatus::Waiting
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LeaveApproval {
    pub by: RecordId,
    pub date: NaiveDateTime,
    pub file: FileRef,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LeaveRejection {
    pub by: RecordId,
    pub date: NaiveDateTime,
    pub message: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LeaveCancellation {
    pub date: NaiveDateTime,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LeaveRequest {
    pub id: RecordId,
    pub employee_id: RecordId,
    #[serde(rename = "type")]
    pub leave_type: String,
    pub from: NaiveDate,
    pub to: NaiveDate,
    pub days: u32,
    /// Copied from the leave type at submission.
    pub payed: bool,
    pub file: FileRef,
    pub status: LeaveStatus,
    pub approved: Option<LeaveApproval>,
    pub rejected: Option<LeaveRejection>,
    pub cancelled: Option<LeaveCancellation>,
    pub created: NaiveDateTime,
    pub updated: NaiveDateTime,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn record_ids_are_unique_lowercase_alphanumerics() {
        let a = new_record_id();
        let b = new_record_id();
        assert_eq!(a.len(), 24);
        assert!(a.chars().all(|c| c.is_ascii_lowercase() || c.is_ascii_digit()));
        assert_ne!(a, b);
    }

    #[test]
    fn password_hash_is_never_serialized() {
        let now = NaiveDate::from_ymd_opt(2024, 1, 1)
            .unwrap()
            .and_hms_opt(8, 0, 0)
            .unwrap();
        let employee = Employee {
            id: "e1".into(),
            name: "Ana".into(),
            email: "ana@example.com".into(),
            username: "ana".into(),
            password_hash: "secret-digest".into(),
            limit: DEFAULT_LEAVE_LIMIT,
            position: None,
            schedule: None,
            role: EmployeeRole::User,
            status: EmployeeStatus::Active,
            hired_date: None,
            contract_end_date: None,
            created: now,
            updated: now,
        };
        let json = serde_json::to_value(&employee).unwrap();
        assert!(json.get("password_hash").is_none());
        assert_eq!(json["role"], "User");
    }

    #[test]
    fn leave_request_uses_type_field_name() {
        let now = NaiveDate::from_ymd_opt(2024, 1, 1)
            .unwrap()
            .and_hms_opt(8, 0, 0)
            .unwrap();
        let leave = LeaveRequest {
            id: "l1".into(),
            employee_id: "e1".into(),
            leave_type: "Sick Leave".into(),
            from: now.date(),
            to: now.date(),
            days: 1,
            payed: true,
            file: FileRef {
                url: "https://files.example.com/cert.pdf".into(),
                name: "cert.pdf".into(),
                size: 1024,
            },
            status: LeaveStatus::Waiting,
            approved: None,
            rejected: None,
            cancelled: None,
            created: now,
            updated: now,
        };
        let json = serde_json::to_value(&leave).unwrap();
        assert_eq!(json["type"], "Sick Leave");
        assert_eq!(json["status"], "waiting");
    }
}
