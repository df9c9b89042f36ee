// src/leave.rs

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{error, info, warn};
use url::Url;

use crate::clock::Clock;
use crate::config::QuotaMode;
use crate::error::{ConflictKind, ServiceError};
use crate::models::*;
use crate::notifier::{
    deliver, leave_approved, leave_rejected, DeliveryPolicy, EmailMessage, NotificationOutcome,
    Notifier,
};
use crate::store::{RecordStore, StoreError};

pub const MISSING_FILE: &str = "Please attach file.";

#[derive(Debug, Clone, Copy)]
pub struct LeaveRules {
    /// Longest allowed span, in inclusive calendar days.
    pub max_leave_days: u32,
    pub quota_mode: QuotaMode,
}

impl Default for LeaveRules {
    fn default() -> Self {
        Self {
            max_leave_days: DEFAULT_LEAVE_LIMIT,
            quota_mode: QuotaMode::DecrementOnSubmit,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct LeaveSubmission {
    pub employee_id: RecordId,
    #[serde(rename = "type")]
    pub leave_type: String,
    pub from: NaiveDate,
    pub to: NaiveDate,
    pub file: Option<FileRef>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ApproveRequest {
    pub by: RecordId,
    pub file: Option<FileRef>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RejectRequest {
    pub by: RecordId,
    #[serde(default)]
    pub message: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CancelRequest {
    pub employee_id: RecordId,
}

/// A decided leave and what happened to the employee's email.
#[derive(Debug, Clone, Serialize)]
pub struct LeaveDecision {
    #[serde(flatten)]
    pub leave: LeaveRequest,
    pub notification: NotificationOutcome,
}

/// Number of calendar days from `from` to `to`, both included.
pub fn inclusive_days(from: NaiveDate, to: NaiveDate) -> Result<u32, ServiceError> {
    let span = (to - from).num_days();
    if span < 0 {
        return Err(ServiceError::validation(
            "to",
            "The leave end date is before its start date.",
        ));
    }
    u32::try_from(span + 1)
        .map_err(|_| ServiceError::validation("to", "The leave span is too long."))
}

fn require_file(file: Option<FileRef>) -> Result<FileRef, ServiceError> {
    let file = file.ok_or_else(|| ServiceError::validation("file", MISSING_FILE))?;
    match Url::parse(&file.url) {
        Ok(url) if url.scheme() == "https" || url.scheme() == "http" => Ok(file),
        _ => Err(ServiceError::validation(
            "file",
            "The attached file link is invalid.",
        )),
    }
}

fn terminal_conflict(leave: &LeaveRequest) -> ServiceError {
    let status = match leave.status {
        LeaveStatus::Waiting => "waiting",
        LeaveStatus::Approved => "approved",
        LeaveStatus::Rejected => "rejected",
        LeaveStatus::Cancelled => "cancelled",
    };
    ServiceError::conflict(
        ConflictKind::Leave,
        format!("This leave is already {}.", status),
    )
}

pub struct LeaveService {
    store: Arc<dyn RecordStore>,
    clock: Arc<dyn Clock>,
    notifier: Arc<dyn Notifier>,
    delivery: DeliveryPolicy,
    rules: LeaveRules,
}

impl LeaveService {
    pub fn new(
        store: Arc<dyn RecordStore>,
        clock: Arc<dyn Clock>,
        notifier: Arc<dyn Notifier>,
        delivery: DeliveryPolicy,
        rules: LeaveRules,
    ) -> Self {
        Self {
            store,
            clock,
            notifier,
            delivery,
            rules,
        }
    }

    async fn employee(&self, id: &str) -> Result<Employee, ServiceError> {
        self.store
            .employee(id)
            .await?
            .ok_or_else(|| ServiceError::not_found("Employee", id))
    }

    async fn admin(&self, id: &str) -> Result<Employee, ServiceError> {
        let actor = self.employee(id).await?;
        if actor.role != EmployeeRole::Admin {
            warn!("Leave decision refused, not an admin: Actor={}", id);
            return Err(ServiceError::Forbidden(
                "Only administrators can decide on leave requests.".to_string(),
            ));
        }
        Ok(actor)
    }

    async fn waiting_leave(&self, id: &str) -> Result<LeaveRequest, ServiceError> {
        let leave = self
            .store
            .leave(id)
            .await?
            .ok_or_else(|| ServiceError::not_found("Leave", id))?;
        if leave.status.is_terminal() {
            warn!("Leave already decided: Leave={}, Status={:?}", id, leave.status);
            return Err(terminal_conflict(&leave));
        }
        Ok(leave)
    }

    async fn store_transition(
        &self,
        updated: LeaveRequest,
        quota_delta: i64,
    ) -> Result<LeaveRequest, ServiceError> {
        let id = updated.id.clone();
        self.store
            .transition_leave(LeaveStatus::Waiting, updated, quota_delta)
            .await
            .map_err(|e| match e {
                StoreError::ConditionFailed { collection: "leaves", .. } => {
                    warn!("Concurrent leave decision rejected: Leave={}", id);
                    ServiceError::conflict(ConflictKind::Leave, "This leave was already decided.")
                }
                other => other.into(),
            })
    }

    async fn notify(&self, employee_id: &str, build: impl FnOnce(&Employee) -> EmailMessage) -> NotificationOutcome {
        match self.store.employee(employee_id).await {
            Ok(Some(employee)) => {
                deliver(self.notifier.as_ref(), &build(&employee), &self.delivery).await
            }
            Ok(None) => NotificationOutcome::Failed {
                attempts: 0,
                last_error: "employee not found".to_string(),
            },
            Err(e) => {
                error!("Leave email skipped, employee lookup failed: {}", e);
                NotificationOutcome::Failed {
                    attempts: 0,
                    last_error: e.to_string(),
                }
            }
        }
    }

    pub async fn submit(&self, submission: LeaveSubmission) -> Result<LeaveRequest, ServiceError> {
        let file = require_file(submission.file)?;
        let days = inclusive_days(submission.from, submission.to)?;
        if days > self.rules.max_leave_days {
            return Err(ServiceError::validation(
                "days",
                format!("{} days maximum per year.", self.rules.max_leave_days),
            ));
        }

        let employee = self.employee(&submission.employee_id).await?;
        let leave_type = self
            .store
            .leave_type_by_name(&submission.leave_type)
            .await?
            .ok_or_else(|| {
                ServiceError::validation(
                    "type",
                    format!("Unknown leave type '{}'.", submission.leave_type),
                )
            })?;

        let quota_cost = match self.rules.quota_mode {
            QuotaMode::DecrementOnSubmit => days,
            QuotaMode::Advisory => 0,
        };
        let insufficient = || {
            ServiceError::validation(
                "limit",
                format!("Only {} leave day(s) remaining.", employee.limit),
            )
        };
        if quota_cost > employee.limit {
            return Err(insufficient());
        }

        let now = self.clock.now();
        let leave = LeaveRequest {
            id: new_record_id(),
            employee_id: employee.id.clone(),
            leave_type: leave_type.name,
            from: submission.from,
            to: submission.to,
            days,
            payed: leave_type.payed,
            file,
            status: LeaveStatus::Waiting,
            approved: None,
            rejected: None,
            cancelled: None,
            created: now,
            updated: now,
        };

        let leave = match self.store.insert_leave(leave, quota_cost).await {
            Ok(leave) => leave,
            Err(StoreError::ConditionFailed { collection: "employees", .. }) => {
                return Err(insufficient())
            }
            Err(e) => return Err(e.into()),
        };
        info!(
            "Leave submitted: Emp={}, Leave={}, Type={}, From={}, To={}, Days={}, QuotaTaken={}",
            leave.employee_id, leave.id, leave.leave_type, leave.from, leave.to, leave.days, quota_cost
        );
        Ok(leave)
    }

    pub async fn approve(&self, id: &str, req: ApproveRequest) -> Result<LeaveDecision, ServiceError> {
        let file = require_file(req.file)?;
        let actor = self.admin(&req.by).await?;
        let mut leave = self.waiting_leave(id).await?;

        let now = self.clock.now();
        leave.status = LeaveStatus::Approved;
        leave.approved = Some(LeaveApproval {
            by: actor.id.clone(),
            date: now,
            file,
        });
        leave.updated = now;

        let leave = self.store_transition(leave, 0).await?;
        info!("Leave approved: Emp={}, Leave={}, By={}", leave.employee_id, leave.id, actor.id);

        let notification = self.notify(&leave.employee_id, |e| leave_approved(e, &leave)).await;
        Ok(LeaveDecision { leave, notification })
    }

    pub async fn reject(&self, id: &str, req: RejectRequest) -> Result<LeaveDecision, ServiceError> {
        let actor = self.admin(&req.by).await?;
        let mut leave = self.waiting_leave(id).await?;

        let now = self.clock.now();
        leave.status = LeaveStatus::Rejected;
        leave.rejected = Some(LeaveRejection {
            by: actor.id.clone(),
            date: now,
            message: req.message.trim().to_string(),
        });
        leave.updated = now;

        let restored = match self.rules.quota_mode {
            QuotaMode::DecrementOnSubmit => i64::from(leave.days),
            QuotaMode::Advisory => 0,
        };
        let leave = self.store_transition(leave, restored).await?;
        info!(
            "Leave rejected: Emp={}, Leave={}, By={}, Restored={}",
            leave.employee_id, leave.id, actor.id, restored
        );

        let notification = self.notify(&leave.employee_id, |e| leave_rejected(e, &leave)).await;
        Ok(LeaveDecision { leave, notification })
    }

    /// Withdraws a waiting request. The owner's limit is left as it is.
    pub async fn cancel(&self, id: &str, req: CancelRequest) -> Result<LeaveRequest, ServiceError> {
        let mut leave = self.waiting_leave(id).await?;
        if leave.employee_id != req.employee_id {
            warn!("Leave cancel refused, not the owner: Leave={}, Actor={}", id, req.employee_id);
            return Err(ServiceError::Forbidden(
                "Only the requester can cancel a leave.".to_string(),
            ));
        }

        let now = self.clock.now();
        leave.status = LeaveStatus::Cancelled;
        leave.cancelled = Some(LeaveCancellation { date: now });
        leave.updated = now;

        let leave = self.store_transition(leave, 0).await?;
        info!("Leave cancelled: Emp={}, Leave={}", leave.employee_id, leave.id);
        Ok(leave)
    }

    pub async fn leaves(&self) -> Result<Vec<LeaveRequest>, ServiceError> {
        Ok(self.store.leaves().await?)
    }

    pub async fn leaves_for(&self, employee_id: &str) -> Result<Vec<LeaveRequest>, ServiceError> {
        Ok(self.store.leaves_for(employee_id).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
    }

    #[test]
    fn spans_count_both_ends() {
        assert_eq!(inclusive_days(d("2024-03-04"), d("2024-03-04")).unwrap(), 1);
        assert_eq!(inclusive_days(d("2024-03-01"), d("2024-03-15")).unwrap(), 15);
        assert_eq!(inclusive_days(d("2024-02-28"), d("2024-03-01")).unwrap(), 3);
        assert!(inclusive_days(d("2024-03-05"), d("2024-03-04")).is_err());
    }

    #[test]
    fn files_need_a_web_link() {
        assert!(matches!(
            require_file(None),
            Err(ServiceError::Validation { field: "file", .. })
        ));
        let bad = FileRef {
            url: "not a url".into(),
            name: "x.pdf".into(),
            size: 1,
        };
        assert!(require_file(Some(bad)).is_err());
        let good = FileRef {
            url: "https://files.example.com/x.pdf".into(),
            name: "x.pdf".into(),
            size: 1,
        };
        assert!(require_file(Some(good)).is_ok());
    }
}
