//! Engine errors

use adwatch_store::StoreError;
use adwatch_util::{AdId, Amount, format_hours_minutes, format_minutes_seconds};
use std::time::Duration;
use thiserror::Error;

/// Broad category of a [`CoreError`], used to pick a response status
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    NotFound,
    ValidationFailure,
    PolicyViolation,
    ConcurrencyConflict,
    Internal,
}

/// Errors returned by the watch engine
#[derive(Debug, Error)]
pub enum CoreError {
    #[error("Ad not found or inactive")]
    AdNotFound(AdId),

    #[error("{0}")]
    Validation(String),

    #[error("Amount must be positive, got {0}")]
    InvalidAmount(Amount),

    #[error("You must start viewing first")]
    NoActiveSession(AdId),

    #[error("You must view the full duration")]
    DurationNotMet { required: Duration, elapsed: Duration },

    #[error("You can view this ad again after {}.", hours_minutes(.remaining))]
    CooldownActive { remaining: Duration },

    #[error("You can watch more ads after {}.", minutes_seconds(.remaining))]
    RateLimited { remaining: Duration },

    #[error("Storage stayed busy after {attempts} attempts")]
    Conflict { attempts: u32 },

    #[error("Storage error: {0}")]
    Store(#[from] StoreError),
}

fn hours_minutes(d: &Duration) -> String {
    format_hours_minutes(*d)
}

fn minutes_seconds(d: &Duration) -> String {
    format_minutes_seconds(*d)
}

impl CoreError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            CoreError::AdNotFound(_) => ErrorKind::NotFound,
            CoreError::Validation(_) | CoreError::InvalidAmount(_) => ErrorKind::ValidationFailure,
            CoreError::NoActiveSession(_)
            | CoreError::DurationNotMet { .. }
            | CoreError::CooldownActive { .. }
            | CoreError::RateLimited { .. } => ErrorKind::PolicyViolation,
            CoreError::Conflict { .. } => ErrorKind::ConcurrencyConflict,
            CoreError::Store(_) => ErrorKind::Internal,
        }
    }

    /// Time until the rejected action may succeed
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            CoreError::CooldownActive { remaining } | CoreError::RateLimited { remaining } => {
                Some(*remaining)
            }
            CoreError::DurationNotMet { required, elapsed } => Some(required.saturating_sub(*elapsed)),
            _ => None,
        }
    }

    /// Short machine-readable reason, used in audit records
    pub fn reason(&self) -> &'static str {
        match self {
            CoreError::AdNotFound(_) => "ad_not_found",
            CoreError::Validation(_) => "invalid_request",
            CoreError::InvalidAmount(_) => "invalid_amount",
            CoreError::NoActiveSession(_) => "no_active_session",
            CoreError::DurationNotMet { .. } => "duration_not_met",
            CoreError::CooldownActive { .. } => "cooldown_active",
            CoreError::RateLimited { .. } => "rate_limited",
            CoreError::Conflict { .. } => "conflict",
            CoreError::Store(_) => "store_error",
        }
    }
}

pub type CoreResult<T> = Result<T, CoreError>;
