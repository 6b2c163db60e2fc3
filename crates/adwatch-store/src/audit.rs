//! Audit event types

use adwatch_util::{AdId, Amount, SessionId, UserId};
use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};

/// Types of audit events
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AuditEventType {
    /// Service started
    ServiceStarted,

    /// Service stopped
    ServiceStopped,

    /// Configured catalog written to the store
    CatalogSynced { ad_count: usize, deactivated: usize },

    /// Watch session opened
    WatchStarted {
        session_id: SessionId,
        user_id: UserId,
        ad_id: AdId,
        mode: String,
    },

    /// Start or complete rejected by a watch rule
    WatchDenied {
        user_id: UserId,
        ad_id: AdId,
        reason: String,
    },

    /// View recorded and ledger credited
    WatchCredited {
        user_id: UserId,
        ad_id: AdId,
        earned: Amount,
        elapsed_secs: u64,
    },
}

/// Full audit event with metadata
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEvent {
    /// Unique event ID
    pub id: i64,

    /// Event timestamp
    pub timestamp: DateTime<Local>,

    /// Event type and details
    pub event: AuditEventType,
}

impl AuditEvent {
    pub fn new(event: AuditEventType) -> Self {
        Self::at(adwatch_util::now(), event)
    }

    /// Event stamped with an explicit time
    pub fn at(timestamp: DateTime<Local>, event: AuditEventType) -> Self {
        Self {
            id: 0, // Will be set by store
            timestamp,
            event,
        }
    }
}
