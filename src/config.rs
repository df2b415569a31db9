//! Engine configuration.
//!
//! Loaded once at startup from JSON. Anything malformed here (bad window
//! times, an inverted window, an unknown payment method) is fatal before the
//! scheduler starts.
//!
//! ```json
//! {
//!   "periods": [{ "start": "05:59", "end": "06:10" }],
//!   "interval": 100,
//!   "pay_type": "wechat",
//!   "address": "home",
//!   "success_hold_secs": 180
//! }
//! ```

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::context::PaymentMethod;
use crate::retry::{StatusRetryPolicy, DEFAULT_RETRY_CAP};
use crate::window::ActiveWindow;

/// Configuration errors. All of them abort startup.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse config: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("failed to parse {field} time ({value}) of period {index}: {source}")]
    InvalidTime {
        index: usize,
        field: &'static str,
        value: String,
        #[source]
        source: chrono::ParseError,
    },
    #[error("period {index} must start before it ends ({start} - {end})")]
    EmptyWindow { index: usize, start: String, end: String },
    #[error("unrecognized payment method: {0}")]
    UnknownPaymentMethod(String),
}

/// Raw `{start, end}` pair as written in the file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PeriodSpec {
    pub start: String,
    pub end: String,
}

fn default_interval() -> u64 {
    100
}

fn default_success_hold() -> u64 {
    180
}

fn default_retry_cap() -> u32 {
    DEFAULT_RETRY_CAP
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Config {
    /// Daily active windows; empty means "run once, now".
    #[serde(default)]
    pub periods: Vec<PeriodSpec>,
    /// Congestion back-off in milliseconds.
    #[serde(default = "default_interval")]
    pub interval: u64,
    /// `alipay`/`支付宝` or `wechat`/`微信`; WeChat when absent.
    #[serde(default)]
    pub pay_type: Option<String>,
    /// Label of the delivery address to use when the account has several.
    #[serde(default)]
    pub address: Option<String>,
    /// How long to hold after a placed order so it can be paid.
    #[serde(default = "default_success_hold")]
    pub success_hold_secs: u64,
    #[serde(default = "default_retry_cap")]
    pub retry_cap: u32,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            periods: Vec::new(),
            interval: default_interval(),
            pay_type: None,
            address: None,
            success_hold_secs: default_success_hold(),
            retry_cap: default_retry_cap(),
        }
    }
}

impl Config {
    pub fn from_json_str(raw: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(raw)?)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)
            .map_err(|source| ConfigError::Read { path: path.to_path_buf(), source })?;
        let config = Self::from_json_str(&raw)?;
        config.validate()?;
        Ok(config)
    }

    /// Check everything that can be checked without the network.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.windows()?;
        self.payment_method()?;
        Ok(())
    }

    /// Parse every configured period.
    pub fn windows(&self) -> Result<Vec<ActiveWindow>, ConfigError> {
        self.periods
            .iter()
            .enumerate()
            .map(|(idx, p)| ActiveWindow::parse(idx, &p.start, &p.end))
            .collect()
    }

    pub fn payment_method(&self) -> Result<PaymentMethod, ConfigError> {
        match self.pay_type.as_deref() {
            None | Some("") => Ok(PaymentMethod::default()),
            Some(raw) => PaymentMethod::parse(raw)
                .ok_or_else(|| ConfigError::UnknownPaymentMethod(raw.to_string())),
        }
    }

    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval)
    }

    pub fn success_hold(&self) -> Duration {
        Duration::from_secs(self.success_hold_secs)
    }

    /// Retry policy described by this configuration, with the production sleeper.
    pub fn retry_policy(&self) -> StatusRetryPolicy {
        StatusRetryPolicy::builder().interval(self.interval()).cap(self.retry_cap).build()
    }
}
