//! Store trait definitions

use adwatch_api::Ad;
use adwatch_util::{AdId, Amount, SessionId, UserId, WindowActivity};
use chrono::{DateTime, Local, NaiveDate};
use std::collections::HashSet;

use crate::{AuditEvent, StoreResult};

/// Main store trait
pub trait Store: Send + Sync {
    // Audit log

    /// Append an audit event
    fn append_audit(&self, event: AuditEvent) -> StoreResult<()>;

    /// Get recent audit events, newest first
    fn get_recent_audits(&self, limit: usize) -> StoreResult<Vec<AuditEvent>>;

    // Catalog

    /// Upsert every configured ad and mark ads missing from `ads` inactive.
    /// Rows are never deleted so that view history keeps its references.
    fn sync_catalog(&self, ads: &[Ad]) -> StoreResult<CatalogSync>;

    /// Get an ad regardless of status
    fn get_ad(&self, id: AdId) -> StoreResult<Option<Ad>>;

    /// All active ads, ordered by ID
    fn list_active_ads(&self) -> StoreResult<Vec<Ad>>;

    // Watch sessions

    /// Replace any open session for the same (user, ad) with `session`
    fn open_session(&self, session: &WatchSession) -> StoreResult<()>;

    /// The open session for (user, ad), if any
    fn find_open_session(&self, user_id: &UserId, ad_id: AdId)
    -> StoreResult<Option<WatchSession>>;

    // View history

    /// Most recent view of `ad_id` by `user_id` at or after `since`
    fn last_view_since(
        &self,
        user_id: &UserId,
        ad_id: AdId,
        since: DateTime<Local>,
    ) -> StoreResult<Option<DateTime<Local>>>;

    /// Views by `user_id` at or after `since`, with the oldest of them
    fn window_activity(&self, user_id: &UserId, since: DateTime<Local>)
    -> StoreResult<WindowActivity>;

    /// Ads viewed by `user_id` at or after `since`
    fn viewed_ad_ids_since(
        &self,
        user_id: &UserId,
        since: DateTime<Local>,
    ) -> StoreResult<HashSet<AdId>>;

    /// Close the session, append the view and credit the ledger in one
    /// transaction. Nothing is written unless the outcome is `Credited`.
    fn record_completion(&self, completion: &Completion) -> StoreResult<CompletionOutcome>;

    // Earnings

    /// Ledger row as of the last credit
    fn get_earnings(&self, user_id: &UserId) -> StoreResult<Option<EarningRecord>>;

    // Health

    /// Check if store is healthy
    fn is_healthy(&self) -> bool;
}

/// Result of a catalog sync
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CatalogSync {
    pub upserted: usize,
    pub deactivated: usize,
}

/// One watch attempt in durable mode
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WatchSession {
    pub session_id: SessionId,
    pub user_id: UserId,
    pub ad_id: AdId,
    pub started_at: DateTime<Local>,
    pub is_completed: bool,
}

impl WatchSession {
    pub fn new(user_id: UserId, ad_id: AdId, started_at: DateTime<Local>) -> Self {
        Self {
            session_id: SessionId::new(),
            user_id,
            ad_id,
            started_at,
            is_completed: false,
        }
    }
}

/// Per-user running balance
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EarningRecord {
    pub user_id: UserId,
    pub total_earned: Amount,
    pub today_earned: Amount,
    pub last_updated: NaiveDate,
}

/// Everything needed to credit one completed view
#[derive(Debug, Clone)]
pub struct Completion {
    pub user_id: UserId,
    pub ad_id: AdId,
    pub amount: Amount,
    pub viewed_at: DateTime<Local>,
    /// Durable session to close. `None` when no session row backs the view.
    pub session_id: Option<SessionId>,
    /// Any view of this ad by this user at or after this instant means the
    /// view was already credited.
    pub cooldown_since: DateTime<Local>,
    /// Start of the per-user rate-limit window
    pub rate_limit_since: DateTime<Local>,
    /// Views allowed at or after `rate_limit_since`
    pub rate_limit_max: u32,
}

/// Outcome of [`Store::record_completion`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CompletionOutcome {
    Credited(EarningRecord),
    /// A racing request credited this (user, ad) first
    AlreadyCredited { last_viewed_at: DateTime<Local> },
    /// The session was completed or replaced in the meantime
    SessionGone,
    /// Racing completions filled the user's rate-limit window first
    RateLimited(WindowActivity),
}
