//! Remote authority contract.
//!
//! The agent only depends on the request/response shapes below. The HTTP
//! binding lives in [`http`]; tests substitute an in-memory fake.

pub mod http;

#[cfg(test)]
pub mod fake;

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::RemoteError;
use crate::schedule::Schedule;

pub use http::HttpAuthority;

/// Compliance report sent after every lock transition
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusReport {
    pub imei: String,
    pub is_locked: bool,
    /// Epoch milliseconds
    pub last_checked: i64,
    pub battery_level: u8,
    pub is_online: bool,
}

/// Liveness ping carrying the device's own clock reading
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HeartbeatRecord {
    pub imei: String,
    /// Epoch milliseconds when the record was built
    pub timestamp: i64,
    /// Device wall clock, epoch milliseconds
    pub device_time: i64,
    pub status: &'static str,
}

impl HeartbeatRecord {
    pub fn new(imei: &str, device_time: DateTime<Utc>) -> Self {
        let millis = device_time.timestamp_millis();
        Self {
            imei: imei.to_string(),
            timestamp: millis,
            device_time: millis,
            status: "active",
        }
    }
}

/// Server's answer to a heartbeat
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HeartbeatAck {
    #[serde(default)]
    pub success: bool,

    #[serde(default, deserialize_with = "server_time::deserialize")]
    pub server_time: Option<DateTime<Utc>>,

    #[serde(default)]
    pub drift_warning: bool,
}

/// Remote resolution of an uninstall request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UninstallStatus {
    Pending,
    Approved,
    Denied,
}

impl UninstallStatus {
    /// Unknown strings are treated as still pending
    pub fn parse(value: &str) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "approved" => Self::Approved,
            "denied" | "rejected" => Self::Denied,
            _ => Self::Pending,
        }
    }
}

impl fmt::Display for UninstallStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Pending => "pending",
            Self::Approved => "approved",
            Self::Denied => "denied",
        };
        f.write_str(s)
    }
}

#[async_trait]
pub trait RemoteAuthority: Send + Sync {
    async fn fetch_schedules(&self, device_id: &str) -> Result<Vec<Schedule>, RemoteError>;

    async fn report_status(&self, device_id: &str, report: &StatusReport) -> Result<(), RemoteError>;

    async fn heartbeat(&self, record: &HeartbeatRecord) -> Result<HeartbeatAck, RemoteError>;

    async fn update_timezone(&self, device_id: &str, timezone: &str) -> Result<(), RemoteError>;

    /// Returns the new request id
    async fn create_uninstall_request(&self, device_id: &str) -> Result<String, RemoteError>;

    async fn poll_uninstall_status(&self, request_id: &str) -> Result<UninstallStatus, RemoteError>;

    /// `Ok(false)` is a rejected code, not an error
    async fn validate_secret_code(&self, device_id: &str, code: &str) -> Result<bool, RemoteError>;
}

/// `serverTime` arrives either as epoch milliseconds or as an RFC 3339 string
mod server_time {
    use super::*;
    use serde::Deserializer;

    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Millis(i64),
        Text(String),
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<DateTime<Utc>>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = Option::<Raw>::deserialize(deserializer)?;
        Ok(raw.and_then(|raw| match raw {
            Raw::Millis(ms) => Utc.timestamp_millis_opt(ms).single(),
            Raw::Text(text) => DateTime::parse_from_rfc3339(&text)
                .ok()
                .map(|dt| dt.with_timezone(&Utc)),
        }))
    }
}
