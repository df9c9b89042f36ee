// src/config.rs

use chrono_tz::Tz;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::Deserialize;
use std::time::Duration;
use thiserror::Error;

use crate::attendance_rules::{ClockClassifier, DEFAULT_TOLERANCE_MINUTES};
use crate::leave::LeaveRules;
use crate::models::DEFAULT_LEAVE_LIMIT;
use crate::notifier::DeliveryPolicy;
use crate::payroll::PayrollRules;

pub const ENV_PREFIX: &str = "PAYCLOCK_";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read environment: {0}")]
    Env(#[from] envy::Error),

    #[error("Unknown timezone '{0}'")]
    Timezone(String),
}

/// When a leave request's days come out of the employee's yearly limit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QuotaMode {
    /// Days are taken at submission and given back on rejection.
    DecrementOnSubmit,
    /// The limit is informational only and never changes.
    Advisory,
}

fn default_server_host() -> String {
    "127.0.0.1".to_string()
}
fn default_server_port() -> u16 {
    3000
}
fn default_timezone() -> String {
    "Asia/Manila".to_string()
}
fn default_tolerance() -> u32 {
    DEFAULT_TOLERANCE_MINUTES
}
fn default_max_leave_days() -> u32 {
    DEFAULT_LEAVE_LIMIT
}
fn default_leave_day_rate() -> Decimal {
    dec!(470)
}
fn default_quota_mode() -> QuotaMode {
    QuotaMode::DecrementOnSubmit
}
fn default_email_from() -> String {
    "payroll@localhost".to_string()
}
fn default_notify_timeout_secs() -> u64 {
    10
}
fn default_notify_attempts() -> u32 {
    3
}

#[derive(Debug, Deserialize, Clone)]
pub struct AppConfig {
    // Server
    #[serde(default = "default_server_host")]
    pub server_host: String,
    #[serde(default = "default_server_port")]
    pub server_port: u16,
    pub cert_path: Option<String>,
    pub key_path: Option<String>,

    // Business rules
    #[serde(default = "default_timezone")]
    pub timezone: String,
    #[serde(default = "default_tolerance")]
    pub clock_tolerance_minutes: u32,
    #[serde(default = "default_max_leave_days")]
    pub max_leave_days: u32,
    #[serde(
        default = "default_leave_day_rate",
        with = "rust_decimal::serde::str"
    )]
    pub leave_day_rate: Decimal,
    #[serde(default = "default_quota_mode")]
    pub leave_quota_mode: QuotaMode,
    #[serde(default)]
    pub include_leave_credit_in_netpay: bool,

    // Email
    pub sendgrid_api_key: Option<String>,
    #[serde(default = "default_email_from")]
    pub email_from: String,
    #[serde(default = "default_notify_timeout_secs")]
    pub notify_timeout_secs: u64,
    #[serde(default = "default_notify_attempts")]
    pub notify_attempts: u32,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            server_host: default_server_host(),
            server_port: default_server_port(),
            cert_path: None,
            key_path: None,
            timezone: default_timezone(),
            clock_tolerance_minutes: default_tolerance(),
            max_leave_days: default_max_leave_days(),
            leave_day_rate: default_leave_day_rate(),
            leave_quota_mode: default_quota_mode(),
            include_leave_credit_in_netpay: false,
            sendgrid_api_key: None,
            email_from: default_email_from(),
            notify_timeout_secs: default_notify_timeout_secs(),
            notify_attempts: default_notify_attempts(),
        }
    }
}

impl AppConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        // Load .env file if it exists
        dotenv::dotenv().ok();
        Self::from_vars(std::env::vars())
    }

    /// Parses `PAYCLOCK_*` pairs; anything without the prefix is ignored.
    pub fn from_vars<I>(vars: I) -> Result<Self, ConfigError>
    where
        I: IntoIterator<Item = (String, String)>,
    {
        let config: AppConfig = envy::prefixed(ENV_PREFIX).from_iter(vars)?;
        config.timezone()?;
        Ok(config)
    }

    pub fn timezone(&self) -> Result<Tz, ConfigError> {
        self.timezone
            .parse::<Tz>()
            .map_err(|_| ConfigError::Timezone(self.timezone.clone()))
    }

    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.server_host, self.server_port)
    }

    pub fn tls_paths(&self) -> Option<(&str, &str)> {
        match (&self.cert_path, &self.key_path) {
            (Some(cert), Some(key)) => Some((cert.as_str(), key.as_str())),
            _ => None,
        }
    }

    pub fn clock_classifier(&self) -> ClockClassifier {
        ClockClassifier::new(self.clock_tolerance_minutes)
    }

    pub fn payroll_rules(&self) -> PayrollRules {
        PayrollRules {
            leave_day_rate: self.leave_day_rate,
            include_leave_credit_in_netpay: self.include_leave_credit_in_netpay,
        }
    }

    pub fn leave_rules(&self) -> LeaveRules {
        LeaveRules {
            max_leave_days: self.max_leave_days,
            quota_mode: self.leave_quota_mode,
        }
    }

    pub fn delivery_policy(&self) -> DeliveryPolicy {
        DeliveryPolicy {
            timeout: Duration::from_secs(self.notify_timeout_secs),
            attempts: self.notify_attempts,
            ..DeliveryPolicy::default()
        }
    }
}
