//! Request and response bodies for the adwatchd HTTP contract

use adwatch_util::{Amount, SessionId};
use chrono::{DateTime, Local, NaiveDate};
use serde::{Deserialize, Serialize};

use crate::API_VERSION;

/// Returned by a successful start
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StartWatchResponse {
    pub session_id: SessionId,
    pub started_at: DateTime<Local>,
    /// Seconds the ad must be watched before completing
    pub duration: u32,
}

/// Body of a third-party complete. Both fields are validated by the engine
/// so that a missing field is reported in the regular error envelope.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ClaimedCompletionRequest {
    /// RFC 3339 timestamp at which the caller started showing the ad
    #[serde(default)]
    pub started_at: Option<String>,
    /// Seconds the caller claims the ad was on screen
    #[serde(default)]
    pub duration_watched: Option<i64>,
}

/// Returned by a successful complete
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompleteWatchResponse {
    pub earned: Amount,
    pub elapsed_secs: u64,
    pub message: String,
}

/// Ledger balance as of its last credit
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EarningsView {
    pub total_earned: Amount,
    pub today_earned: Amount,
    /// `None` until the first credit
    pub last_updated: Option<NaiveDate>,
}

impl EarningsView {
    pub fn empty() -> Self {
        Self {
            total_earned: Amount::ZERO,
            today_earned: Amount::ZERO,
            last_updated: None,
        }
    }
}

/// Error envelope: every failure response has exactly this shape
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorBody {
    pub error: ErrorInfo,
}

/// Error information
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorInfo {
    pub code: ErrorCode,
    pub message: String,
    /// Seconds until the rejected action may succeed, for countdowns
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retry_after_secs: Option<u64>,
}

impl ErrorInfo {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            retry_after_secs: None,
        }
    }

    pub fn with_retry_after(mut self, secs: u64) -> Self {
        self.retry_after_secs = Some(secs);
        self
    }
}

/// Error codes for the protocol
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    Unauthenticated,
    InvalidRequest,
    AdNotFound,
    NoActiveSession,
    DurationNotMet,
    CooldownActive,
    RateLimited,
    Conflict,
    InternalError,
}

/// Service health
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthStatus {
    pub api_version: u32,
    pub status: String,
    pub store_healthy: bool,
    pub session_mode: String,
}

impl HealthStatus {
    pub fn new(store_healthy: bool, session_mode: &str) -> Self {
        Self {
            api_version: API_VERSION,
            status: if store_healthy { "healthy" } else { "degraded" }.to_string(),
            store_healthy,
            session_mode: session_mode.to_string(),
        }
    }
}
