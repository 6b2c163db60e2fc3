//! Watch session tracking
//!
//! A watch attempt needs a trusted start time between `start` and
//! `complete`. Where that time comes from depends on the caller:
//! - [`DurableSessions`]: one database row per attempt
//! - [`EphemeralSessions`]: an in-memory entry with a TTL, for anonymous flows
//! - [`ClaimedTiming`]: trusted integrations report the timing themselves

use adwatch_api::{ClaimedCompletionRequest, SessionMode};
use adwatch_store::{Store, WatchSession};
use adwatch_util::{AdId, SessionId, UserId, remaining_until, saturating_add};
use chrono::{DateTime, Local};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing::debug;

use crate::retry::retry_on_conflict;
use crate::{CoreError, CoreResult};

/// The acting caller
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Viewer {
    pub user_id: UserId,
    /// Opaque per-client key for ephemeral sessions
    pub client_token: Option<String>,
}

impl Viewer {
    pub fn new(user_id: impl Into<UserId>) -> Self {
        Self {
            user_id: user_id.into(),
            client_token: None,
        }
    }

    pub fn with_client_token(mut self, token: impl Into<String>) -> Self {
        self.client_token = Some(token.into());
        self
    }
}

/// A newly started attempt
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StartedWatch {
    pub session_id: SessionId,
    pub started_at: DateTime<Local>,
}

/// An attempt claimed for completion
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedWatch {
    pub session_id: SessionId,
    pub started_at: DateTime<Local>,
    pub elapsed: Duration,
    /// Whether `session_id` names a store row that completion must close
    pub persisted: bool,
}

/// Session-storage strategy used by the watch engine
pub trait SessionTracker: Send + Sync {
    fn mode(&self) -> SessionMode;

    /// Record the start of an attempt, replacing any earlier open one
    fn begin(&self, viewer: &Viewer, ad_id: AdId, now: DateTime<Local>)
    -> CoreResult<StartedWatch>;

    /// Claim the open attempt and measure it. Trackers that hold the attempt
    /// themselves give it up here; [`SessionTracker::restore`] hands it back
    /// if the completion is then rejected.
    fn resolve(
        &self,
        viewer: &Viewer,
        ad_id: AdId,
        claim: Option<&ClaimedCompletionRequest>,
        now: DateTime<Local>,
    ) -> CoreResult<ResolvedWatch>;

    /// Undo [`SessionTracker::resolve`] after a rejected completion
    fn restore(&self, _viewer: &Viewer, _ad_id: AdId, _resolved: &ResolvedWatch) {}
}

/// Sessions kept as store rows. No expiry: an abandoned session stays open
/// until the next start replaces it.
pub struct DurableSessions {
    store: Arc<dyn Store>,
    max_attempts: u32,
}

impl DurableSessions {
    pub fn new(store: Arc<dyn Store>, max_attempts: u32) -> Self {
        Self {
            store,
            max_attempts,
        }
    }
}

impl SessionTracker for DurableSessions {
    fn mode(&self) -> SessionMode {
        SessionMode::Durable
    }

    fn begin(
        &self,
        viewer: &Viewer,
        ad_id: AdId,
        now: DateTime<Local>,
    ) -> CoreResult<StartedWatch> {
        let session = WatchSession::new(viewer.user_id.clone(), ad_id, now);
        retry_on_conflict(self.max_attempts, "start", || {
            self.store.open_session(&session)
        })?;

        Ok(StartedWatch {
            session_id: session.session_id,
            started_at: session.started_at,
        })
    }

    fn resolve(
        &self,
        viewer: &Viewer,
        ad_id: AdId,
        _claim: Option<&ClaimedCompletionRequest>,
        now: DateTime<Local>,
    ) -> CoreResult<ResolvedWatch> {
        let session = self
            .store
            .find_open_session(&viewer.user_id, ad_id)?
            .ok_or(CoreError::NoActiveSession(ad_id))?;

        // The row is closed by the completion transaction, not here
        Ok(ResolvedWatch {
            elapsed: remaining_until(now, session.started_at),
            session_id: session.session_id,
            started_at: session.started_at,
            persisted: true,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
enum EphemeralKey {
    Token(String, AdId),
    User(UserId, AdId),
}

impl EphemeralKey {
    fn for_viewer(viewer: &Viewer, ad_id: AdId) -> Self {
        match &viewer.client_token {
            Some(token) => EphemeralKey::Token(token.clone(), ad_id),
            None => EphemeralKey::User(viewer.user_id.clone(), ad_id),
        }
    }
}

#[derive(Debug, Clone)]
struct EphemeralEntry {
    session_id: SessionId,
    user_id: UserId,
    started_at: DateTime<Local>,
    expires_at: DateTime<Local>,
}

/// In-memory sessions keyed by (client token, ad), falling back to the user
/// when no token is sent. Entries expire after the configured TTL and are
/// pruned on every start.
pub struct EphemeralSessions {
    ttl: Duration,
    entries: Mutex<HashMap<EphemeralKey, EphemeralEntry>>,
}

impl EphemeralSessions {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            entries: Mutex::new(HashMap::new()),
        }
    }

    fn entries(&self) -> std::sync::MutexGuard<'_, HashMap<EphemeralKey, EphemeralEntry>> {
        // Entries are plain data; a panicked holder cannot leave them torn
        self.entries.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Number of live entries at `now`
    pub fn len(&self, now: DateTime<Local>) -> usize {
        self.entries().values().filter(|e| e.expires_at > now).count()
    }

    pub fn is_empty(&self, now: DateTime<Local>) -> bool {
        self.len(now) == 0
    }
}

impl SessionTracker for EphemeralSessions {
    fn mode(&self) -> SessionMode {
        SessionMode::Ephemeral
    }

    fn begin(
        &self,
        viewer: &Viewer,
        ad_id: AdId,
        now: DateTime<Local>,
    ) -> CoreResult<StartedWatch> {
        let mut entries = self.entries();

        let before = entries.len();
        entries.retain(|_, e| e.expires_at > now);
        let pruned = before - entries.len();
        if pruned > 0 {
            debug!(pruned, "Pruned expired ephemeral sessions");
        }

        let entry = EphemeralEntry {
            session_id: SessionId::new(),
            user_id: viewer.user_id.clone(),
            started_at: now,
            expires_at: saturating_add(now, self.ttl),
        };
        let started = StartedWatch {
            session_id: entry.session_id.clone(),
            started_at: now,
        };
        entries.insert(EphemeralKey::for_viewer(viewer, ad_id), entry);

        Ok(started)
    }

    fn resolve(
        &self,
        viewer: &Viewer,
        ad_id: AdId,
        _claim: Option<&ClaimedCompletionRequest>,
        now: DateTime<Local>,
    ) -> CoreResult<ResolvedWatch> {
        let key = EphemeralKey::for_viewer(viewer, ad_id);
        let mut entries = self.entries();

        let entry = match entries.remove(&key) {
            Some(entry) if entry.expires_at <= now => {
                debug!(user_id = %viewer.user_id, ad_id = %ad_id, "Ephemeral session expired");
                None
            }
            Some(entry) if entry.user_id != viewer.user_id => {
                // Token belongs to someone else; leave it for its owner
                entries.insert(key, entry);
                None
            }
            other => other,
        };

        let entry = entry.ok_or(CoreError::NoActiveSession(ad_id))?;

        Ok(ResolvedWatch {
            session_id: entry.session_id,
            started_at: entry.started_at,
            elapsed: remaining_until(now, entry.started_at),
            persisted: false,
        })
    }

    fn restore(&self, viewer: &Viewer, ad_id: AdId, resolved: &ResolvedWatch) {
        let entry = EphemeralEntry {
            session_id: resolved.session_id.clone(),
            user_id: viewer.user_id.clone(),
            started_at: resolved.started_at,
            expires_at: saturating_add(resolved.started_at, self.ttl),
        };

        // A start issued in the meantime wins
        self.entries()
            .entry(EphemeralKey::for_viewer(viewer, ad_id))
            .or_insert(entry);
    }
}

/// Timing reported by a trusted integration. Nothing is stored between start
/// and complete; the credited duration is the larger of the claimed watch time
/// and the wall-clock time since the claimed start.
#[derive(Debug, Default)]
pub struct ClaimedTiming;

impl ClaimedTiming {
    pub fn new() -> Self {
        Self
    }

    fn parse_claim(
        claim: Option<&ClaimedCompletionRequest>,
    ) -> CoreResult<(DateTime<Local>, Duration)> {
        let claim = claim.ok_or_else(|| {
            CoreError::Validation("started_at and duration_watched are required".into())
        })?;

        let started_at = claim
            .started_at
            .as_deref()
            .ok_or_else(|| CoreError::Validation("started_at is required".into()))?;
        let started_at = DateTime::parse_from_rfc3339(started_at)
            .map_err(|e| {
                CoreError::Validation(format!(
                    "started_at must be an RFC 3339 timestamp: {}",
                    e
                ))
            })?
            .with_timezone(&Local);

        let watched = claim
            .duration_watched
            .ok_or_else(|| CoreError::Validation("duration_watched is required".into()))?;
        let watched = u64::try_from(watched).map_err(|_| {
            CoreError::Validation(format!(
                "duration_watched must not be negative, got {}",
                watched
            ))
        })?;

        Ok((started_at, Duration::from_secs(watched)))
    }
}

impl SessionTracker for ClaimedTiming {
    fn mode(&self) -> SessionMode {
        SessionMode::ClaimedTiming
    }

    fn begin(
        &self,
        _viewer: &Viewer,
        _ad_id: AdId,
        now: DateTime<Local>,
    ) -> CoreResult<StartedWatch> {
        Ok(StartedWatch {
            session_id: SessionId::new(),
            started_at: now,
        })
    }

    fn resolve(
        &self,
        _viewer: &Viewer,
        _ad_id: AdId,
        claim: Option<&ClaimedCompletionRequest>,
        now: DateTime<Local>,
    ) -> CoreResult<ResolvedWatch> {
        let (started_at, watched) = Self::parse_claim(claim)?;

        // A start time in the future counts as zero wall-clock time
        let since_start = remaining_until(now, started_at);

        Ok(ResolvedWatch {
            session_id: SessionId::new(),
            started_at,
            elapsed: watched.max(since_start),
            persisted: false,
        })
    }
}
