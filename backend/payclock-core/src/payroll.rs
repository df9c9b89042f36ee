// src/payroll.rs

use chrono::NaiveDateTime;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::Serialize;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

use crate::clock::Clock;
use crate::error::{ConflictKind, ServiceError};
use crate::models::*;
use crate::notifier::{deliver, payout_statement, DeliveryPolicy, NotificationOutcome, Notifier};
use crate::pay_calculator::{round_money, WorkDuration};
use crate::store::{RecordStore, StoreError};

const ALREADY_PAID: &str = "This payroll has already been paid.";

#[derive(Debug, Clone, Copy)]
pub struct PayrollRules {
    /// Flat credit per approved paid leave day.
    pub leave_day_rate: Decimal,
    pub include_leave_credit_in_netpay: bool,
}

impl Default for PayrollRules {
    fn default() -> Self {
        Self {
            leave_day_rate: dec!(470),
            include_leave_credit_in_netpay: false,
        }
    }
}

/// Rolls the gathered records up into the cycle's totals and snapshots.
///
/// `pay` is the sum of attendance net pay (which already carries overtime) and
/// `grosspay` adds the overtime sum on top of it. Leave credit is always computed but
/// only reaches net pay when the rules say so.
pub fn summarize(
    rules: &PayrollRules,
    cycle: &PayrollCycle,
    attendances: Vec<AttendanceRecord>,
    leaves: Vec<LeaveRequest>,
    deductions: Vec<Deduction>,
) -> PayrollCycle {
    let pay: Decimal = attendances.iter().map(|a| a.amount.netpay).sum();
    let overtime: Decimal = attendances.iter().map(|a| a.amount.overtime).sum();
    let leave_days: u32 = leaves.iter().map(|l| l.days).sum();
    let leave_credit = rules.leave_day_rate * Decimal::from(leave_days);
    let deducted: Decimal = deductions.iter().map(|d| d.amount).sum();

    let grosspay = pay + overtime;
    let mut netpay = grosspay - deducted;
    if rules.include_leave_credit_in_netpay {
        netpay += leave_credit;
    }

    let mut summary = cycle.clone();
    summary.amount = PayrollAmount {
        pay: round_money(pay),
        overtime: round_money(overtime),
        grosspay: round_money(grosspay),
        leaves: round_money(leave_credit),
        deductions: round_money(deducted),
        netpay: round_money(netpay),
    };
    summary.duration = WorkDuration::sum(attendances.iter().map(|a| &a.duration));
    summary.attendances = attendances;
    summary.leaves = leaves;
    summary.deductions = deductions;
    summary
}

/// Result of a close: the paid cycle and what happened to the payout email.
#[derive(Debug, Clone, Serialize)]
pub struct PayrollClose {
    #[serde(flatten)]
    pub cycle: PayrollCycle,
    pub notification: NotificationOutcome,
}

pub struct PayrollService {
    store: Arc<dyn RecordStore>,
    clock: Arc<dyn Clock>,
    notifier: Arc<dyn Notifier>,
    delivery: DeliveryPolicy,
    rules: PayrollRules,
}

impl PayrollService {
    pub fn new(
        store: Arc<dyn RecordStore>,
        clock: Arc<dyn Clock>,
        notifier: Arc<dyn Notifier>,
        delivery: DeliveryPolicy,
        rules: PayrollRules,
    ) -> Self {
        Self {
            store,
            clock,
            notifier,
            delivery,
            rules,
        }
    }

    /// Opens a cycle for the employee unless one is already open. Returns whether a
    /// new cycle was created.
    pub async fn ensure_open_cycle(
        &self,
        employee_id: &str,
        position: Position,
        schedule: Schedule,
    ) -> Result<bool, ServiceError> {
        let candidate = PayrollCycle::open(employee_id.to_string(), position, schedule, self.clock.now());
        match self.store.open_payroll_if_absent(candidate).await? {
            Some(opened) => {
                info!("Opened payroll cycle: Emp={}, Cycle={}", employee_id, opened.id);
                Ok(true)
            }
            None => {
                debug!("Payroll cycle already open: Emp={}", employee_id);
                Ok(false)
            }
        }
    }

    pub async fn cycles(&self) -> Result<Vec<PayrollCycle>, ServiceError> {
        Ok(self.store.payrolls().await?)
    }

    async fn open_cycle(&self, cycle_id: &str) -> Result<PayrollCycle, ServiceError> {
        let cycle = self
            .store
            .payroll(cycle_id)
            .await?
            .ok_or_else(|| ServiceError::not_found("Payroll", cycle_id))?;
        if !cycle.is_open() {
            warn!("Payroll already paid: Cycle={}", cycle_id);
            return Err(ServiceError::conflict(ConflictKind::Payroll, ALREADY_PAID));
        }
        Ok(cycle)
    }

    async fn compute(&self, cycle: &PayrollCycle) -> Result<PayrollCycle, ServiceError> {
        let employee_id = cycle.employee_id.as_str();

        let attendances: Vec<AttendanceRecord> = self
            .store
            .attendance_for_employee(employee_id)
            .await?
            .into_iter()
            .filter(|a| !a.payed && a.is_complete())
            .collect();

        // A leave is credited once: skip those already embedded in a paid cycle.
        let settled: HashSet<RecordId> = self
            .store
            .payrolls()
            .await?
            .into_iter()
            .filter(|p| p.employee_id == employee_id && !p.is_open())
            .flat_map(|p| p.leaves.into_iter().map(|l| l.id))
            .collect();
        let leaves: Vec<LeaveRequest> = self
            .store
            .leaves_for(employee_id)
            .await?
            .into_iter()
            .filter(|l| l.status == LeaveStatus::Approved && l.payed && !settled.contains(&l.id))
            .collect();

        let deductions = self.store.deductions().await?;

        Ok(summarize(&self.rules, cycle, attendances, leaves, deductions))
    }

    /// Computes what closing the cycle now would pay, without persisting anything.
    pub async fn preview(&self, cycle_id: &str) -> Result<PayrollCycle, ServiceError> {
        let cycle = self.open_cycle(cycle_id).await?;
        self.compute(&cycle).await
    }

    /// Pays out an open cycle. The close and the attendance `payed` flags are written
    /// together; the payout email is sent afterwards and its failure is only reported.
    pub async fn close(&self, cycle_id: &str) -> Result<PayrollClose, ServiceError> {
        let cycle = self.open_cycle(cycle_id).await?;
        let mut closed = self.compute(&cycle).await?;

        let now: NaiveDateTime = self.clock.now();
        closed.status = PayrollStatus::Paid;
        closed.updated = now;
        closed.paid_at = Some(now);

        let closed = self.store.settle_payroll(closed).await.map_err(|e| match e {
            StoreError::ConditionFailed { .. } => {
                warn!("Concurrent payroll close rejected: Cycle={}", cycle_id);
                ServiceError::conflict(ConflictKind::Payroll, ALREADY_PAID)
            }
            other => other.into(),
        })?;
        info!(
            "Payroll closed: Emp={}, Cycle={}, Days={}, Netpay={}",
            closed.employee_id,
            closed.id,
            closed.attendances.len(),
            closed.amount.netpay
        );

        let notification = match self.store.employee(&closed.employee_id).await {
            Ok(Some(employee)) => {
                let message = payout_statement(&employee, &closed, now.date());
                deliver(self.notifier.as_ref(), &message, &self.delivery).await
            }
            Ok(None) => {
                error!("Payout email skipped, employee missing: Emp={}", closed.employee_id);
                NotificationOutcome::Failed {
                    attempts: 0,
                    last_error: "employee not found".to_string(),
                }
            }
            Err(e) => {
                error!("Payout email skipped, employee lookup failed: {}", e);
                NotificationOutcome::Failed {
                    attempts: 0,
                    last_error: e.to_string(),
                }
            }
        };

        Ok(PayrollClose {
            cycle: closed,
            notification,
        })
    }
}
