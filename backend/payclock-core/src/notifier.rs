// src/notifier.rs

use async_trait::async_trait;
use chrono::NaiveDate;
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE};
use reqwest::Client;
use rust_decimal::Decimal;
use serde::Serialize;
use serde_json::json;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, error, info, warn};
use url::Url;

use crate::models::{Employee, LeaveRequest, PayrollCycle};
use crate::pay_calculator::round_money;

pub const SENDGRID_ENDPOINT: &str = "https://api.sendgrid.com/v3/mail/send";

pub const PAYOUT_SUBJECT: &str = "Payroll Report";
pub const LEAVE_APPROVED_SUBJECT: &str = "Your Leave is Approved!";
pub const LEAVE_REJECTED_SUBJECT: &str = "Your Leave is Rejected";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EmailMessage {
    pub to: String,
    pub subject: String,
    pub html: String,
}

#[derive(Error, Debug)]
pub enum NotifyError {
    #[error("HTTP request failed")]
    Request(#[from] reqwest::Error),

    #[error("Invalid provider endpoint")]
    Endpoint(#[from] url::ParseError),

    #[error("Email provider rejected message: Status={status}, Message='{message}'")]
    Rejected { status: u16, message: String },

    #[error("Notification send timed out after {0:?}")]
    Timeout(Duration),

    #[error("Notification transport unavailable: {0}")]
    Unavailable(String),
}

/// Outbound email channel. Sends are fire-and-forget from the caller's point of view;
/// see [`deliver`] for the retry wrapper the services use.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send(&self, message: &EmailMessage) -> Result<(), NotifyError>;
}

// --- SendGrid ---

pub struct SendGridNotifier {
    http_client: Client,
    endpoint: Url,
    api_key: String,
    from: String,
}

impl SendGridNotifier {
    pub fn new(api_key: String, from: String) -> Result<Self, NotifyError> {
        Self::with_endpoint(SENDGRID_ENDPOINT, api_key, from)
    }

    pub fn with_endpoint(endpoint: &str, api_key: String, from: String) -> Result<Self, NotifyError> {
        let http_client = Client::builder().timeout(Duration::from_secs(30)).build()?;
        Ok(Self {
            http_client,
            endpoint: Url::parse(endpoint)?,
            api_key,
            from,
        })
    }

    fn payload(&self, message: &EmailMessage) -> serde_json::Value {
        json!({
            "personalizations": [{ "to": [{ "email": message.to }] }],
            "from": { "email": self.from },
            "subject": message.subject,
            "content": [{ "type": "text/html", "value": message.html }],
        })
    }
}

#[async_trait]
impl Notifier for SendGridNotifier {
    async fn send(&self, message: &EmailMessage) -> Result<(), NotifyError> {
        debug!("POST {} To={}", self.endpoint, message.to);
        let response = self
            .http_client
            .post(self.endpoint.clone())
            .header(AUTHORIZATION, format!("Bearer {}", self.api_key))
            .header(CONTENT_TYPE, "application/json")
            .json(&self.payload(message))
            .send()
            .await?;

        let status = response.status();
        if status.is_success() {
            return Ok(());
        }
        let body = response
            .text()
            .await
            .unwrap_or_else(|e| format!("Failed to read error body: {}", e));
        Err(NotifyError::Rejected {
            status: status.as_u16(),
            message: body,
        })
    }
}

// --- Log-only ---

/// Used when no provider key is configured: messages are written to the log.
#[derive(Debug, Clone, Default)]
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn send(&self, message: &EmailMessage) -> Result<(), NotifyError> {
        info!(
            "Email (not sent, no provider configured): To={}, Subject='{}', {} bytes",
            message.to,
            message.subject,
            message.html.len()
        );
        Ok(())
    }
}

// --- Delivery ---

#[derive(Debug, Clone, Copy)]
pub struct DeliveryPolicy {
    pub timeout: Duration,
    pub attempts: u32,
    pub backoff: Duration,
}

impl Default for DeliveryPolicy {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(10),
            attempts: 3,
            backoff: Duration::from_millis(250),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "result", rename_all = "lowercase")]
pub enum NotificationOutcome {
    Delivered { attempts: u32 },
    Failed { attempts: u32, last_error: String },
}

impl NotificationOutcome {
    pub fn is_delivered(&self) -> bool {
        matches!(self, NotificationOutcome::Delivered { .. })
    }
}

/// Sends `message`, bounding each attempt by the policy timeout and retrying with a
/// linear back-off. Never fails: the outcome is returned for the caller to report.
pub async fn deliver(
    notifier: &dyn Notifier,
    message: &EmailMessage,
    policy: &DeliveryPolicy,
) -> NotificationOutcome {
    let attempts = policy.attempts.max(1);
    let mut last_error = String::new();

    for attempt in 1..=attempts {
        let result = match tokio::time::timeout(policy.timeout, notifier.send(message)).await {
            Ok(sent) => sent,
            Err(_) => Err(NotifyError::Timeout(policy.timeout)),
        };
        match result {
            Ok(()) => {
                info!(
                    "Notification delivered: To={}, Subject='{}', Attempt={}",
                    message.to, message.subject, attempt
                );
                return NotificationOutcome::Delivered { attempts: attempt };
            }
            Err(e) => {
                warn!(
                    "Notification attempt {}/{} failed: To={}, Error={}",
                    attempt, attempts, message.to, e
                );
                last_error = e.to_string();
                if attempt < attempts {
                    tokio::time::sleep(policy.backoff * attempt).await;
                }
            }
        }
    }

    error!(
        "Giving up on notification: To={}, Subject='{}', LastError={}",
        message.to, message.subject, last_error
    );
    NotificationOutcome::Failed {
        attempts,
        last_error,
    }
}

// --- Templates ---

/// Formats an amount as pesos with thousands separators, e.g. `₱12,345.60`.
pub fn format_peso(amount: Decimal) -> String {
    let rounded = round_money(amount);
    let negative = rounded.is_sign_negative() && !rounded.is_zero();
    let text = format!("{:.2}", rounded.abs());
    let (whole, cents) = text.split_once('.').unwrap_or((text.as_str(), "00"));

    let mut grouped = String::with_capacity(whole.len() + whole.len() / 3);
    for (i, ch) in whole.chars().enumerate() {
        if i > 0 && (whole.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(ch);
    }
    format!("{}₱{}.{}", if negative { "-" } else { "" }, grouped, cents)
}

fn escape_html(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

pub fn payout_statement(employee: &Employee, cycle: &PayrollCycle, paid_on: NaiveDate) -> EmailMessage {
    let headers = [
        "Date",
        "Name",
        "Position",
        "Rate",
        "Schedule",
        "Pay",
        "Leave",
        "Overtime",
        "Gross Pay",
        "Deduction",
        "Net Pay",
    ];
    let amount = &cycle.amount;
    let cells = [
        paid_on.format("%B %d, %Y").to_string(),
        escape_html(&employee.name),
        escape_html(&cycle.position.title),
        format_peso(cycle.position.rate),
        format!("{} - {}", cycle.schedule.timein, cycle.schedule.timeout),
        format_peso(amount.pay),
        format_peso(amount.leaves),
        format_peso(amount.overtime),
        format_peso(amount.grosspay),
        format_peso(amount.deductions),
        format_peso(amount.netpay),
    ];

    let header_row: String = headers.iter().map(|h| format!("<th>{}</th>", h)).collect();
    let value_row: String = cells.iter().map(|c| format!("<td>{}</td>", c)).collect();
    let html = format!(
        "<h2>Payroll Report</h2>\
         <p>Hi {}, your pay for {} day(s) ({}h {}m) has been released.</p>\
         <table border=\"1\" cellpadding=\"6\"><thead><tr>{}</tr></thead><tbody><tr>{}</tr></tbody></table>",
        escape_html(&employee.name),
        cycle.attendances.len(),
        cycle.duration.hours,
        cycle.duration.minutes,
        header_row,
        value_row
    );

    EmailMessage {
        to: employee.email.clone(),
        subject: PAYOUT_SUBJECT.to_string(),
        html,
    }
}

pub fn leave_approved(employee: &Employee, leave: &LeaveRequest) -> EmailMessage {
    let download = leave
        .approved
        .as_ref()
        .map(|a| {
            format!(
                "<p><a href=\"{}\">Download {}</a></p>",
                escape_html(&a.file.url),
                escape_html(&a.file.name)
            )
        })
        .unwrap_or_default();
    let html = format!(
        "<h2>Your Leave is Approved!</h2>\
         <p>Hi {}, your {} from {} to {} ({} day(s)) has been approved.</p>{}",
        escape_html(&employee.name),
        escape_html(&leave.leave_type),
        leave.from,
        leave.to,
        leave.days,
        download
    );
    EmailMessage {
        to: employee.email.clone(),
        subject: LEAVE_APPROVED_SUBJECT.to_string(),
        html,
    }
}

pub fn leave_rejected(employee: &Employee, leave: &LeaveRequest) -> EmailMessage {
    let reason = leave
        .rejected
        .as_ref()
        .map(|r| format!("<p>Reason: {}</p>", escape_html(&r.message)))
        .unwrap_or_default();
    let html = format!(
        "<h2>Your Leave is Rejected</h2>\
         <p>Hi {}, your {} from {} to {} has been rejected. {} day(s) were returned to your leave balance.</p>{}",
        escape_html(&employee.name),
        escape_html(&leave.leave_type),
        leave.from,
        leave.to,
        leave.days,
        reason
    );
    EmailMessage {
        to: employee.email.clone(),
        subject: LEAVE_REJECTED_SUBJECT.to_string(),
        html,
    }
}

#[cfg(test)]
pub use mock::MockNotifier;

#[cfg(test)]
mod mock {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::{Arc, Mutex};

    #[derive(Clone, Default)]
    pub struct MockNotifier {
        sent: Arc<Mutex<Vec<EmailMessage>>>,
        failures_remaining: Arc<AtomicU32>,
    }

    impl MockNotifier {
        pub fn new() -> Self {
            Self::default()
        }

        /// Makes the next `count` sends fail.
        pub fn fail_next(&self, count: u32) {
            self.failures_remaining.store(count, Ordering::SeqCst);
        }

        pub fn sent(&self) -> Vec<EmailMessage> {
            self.sent.lock().unwrap().clone()
        }

        pub fn count_with_subject(&self, subject: &str) -> usize {
            self.sent
                .lock()
                .unwrap()
                .iter()
                .filter(|m| m.subject == subject)
                .count()
        }

        pub fn expect_message(&self, to: &str, subject: &str) -> EmailMessage {
            let sent = self.sent();
            sent.iter()
                .find(|m| m.to == to && m.subject == subject)
                .cloned()
                .unwrap_or_else(|| {
                    panic!(
                        "Expected email to {} with subject '{}' not found in {:?}",
                        to, subject, sent
                    )
                })
        }
    }

    #[async_trait]
    impl Notifier for MockNotifier {
        async fn send(&self, message: &EmailMessage) -> Result<(), NotifyError> {
            let remaining = self.failures_remaining.load(Ordering::SeqCst);
            if remaining > 0 {
                self.failures_remaining.store(remaining - 1, Ordering::SeqCst);
                return Err(NotifyError::Unavailable("mock failure".into()));
            }
            debug!("Mock email sent: {:?}", message);
            self.sent.lock().unwrap().push(message.clone());
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn message() -> EmailMessage {
        EmailMessage {
            to: "ana@example.com".into(),
            subject: PAYOUT_SUBJECT.into(),
            html: "<p>hi</p>".into(),
        }
    }

    fn quick_policy(attempts: u32) -> DeliveryPolicy {
        DeliveryPolicy {
            timeout: Duration::from_millis(200),
            attempts,
            backoff: Duration::from_millis(1),
        }
    }

    struct SlowNotifier;

    #[async_trait]
    impl Notifier for SlowNotifier {
        async fn send(&self, _message: &EmailMessage) -> Result<(), NotifyError> {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok(())
        }
    }

    #[test]
    fn formats_pesos_with_grouping() {
        assert_eq!(format_peso(dec!(0)), "₱0.00");
        assert_eq!(format_peso(dec!(470)), "₱470.00");
        assert_eq!(format_peso(dec!(1234.5)), "₱1,234.50");
        assert_eq!(format_peso(dec!(1234567.891)), "₱1,234,567.89");
        assert_eq!(format_peso(dec!(-250)), "-₱250.00");
    }

    #[test]
    fn sendgrid_payload_shape() {
        let notifier =
            SendGridNotifier::new("key".into(), "payroll@example.com".into()).unwrap();
        let payload = notifier.payload(&message());
        assert_eq!(payload["personalizations"][0]["to"][0]["email"], "ana@example.com");
        assert_eq!(payload["from"]["email"], "payroll@example.com");
        assert_eq!(payload["content"][0]["type"], "text/html");
    }

    #[tokio::test]
    async fn deliver_retries_until_success() {
        let notifier = MockNotifier::new();
        notifier.fail_next(2);
        let outcome = deliver(&notifier, &message(), &quick_policy(3)).await;
        assert_eq!(outcome, NotificationOutcome::Delivered { attempts: 3 });
        assert_eq!(notifier.sent().len(), 1);
    }

    #[tokio::test]
    async fn deliver_reports_failure_after_last_attempt() {
        let notifier = MockNotifier::new();
        notifier.fail_next(5);
        let outcome = deliver(&notifier, &message(), &quick_policy(2)).await;
        assert!(!outcome.is_delivered());
        assert!(matches!(outcome, NotificationOutcome::Failed { attempts: 2, .. }));
        assert!(notifier.sent().is_empty());
    }

    #[tokio::test]
    async fn deliver_times_out_slow_sends() {
        let outcome = deliver(&SlowNotifier, &message(), &quick_policy(1)).await;
        match outcome {
            NotificationOutcome::Failed { last_error, .. } => {
                assert!(last_error.contains("timed out"))
            }
            other => panic!("unexpected outcome {:?}", other),
        }
    }
}
