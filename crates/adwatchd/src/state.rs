//! Shared application state

use adwatch_api::SessionMode;
use adwatch_config::Policy;
use adwatch_core::{ClaimedTiming, DurableSessions, EphemeralSessions, SessionTracker, WatchEngine};
use adwatch_store::Store;
use chrono::{DateTime, Local};
use std::sync::Arc;

/// Source of the current time for request handling
pub type Clock = Arc<dyn Fn() -> DateTime<Local> + Send + Sync>;

/// State shared by every handler
pub struct AppState {
    /// Engine behind the `/watch` routes, using the configured session mode
    pub primary: WatchEngine,

    /// Engine behind the `/view` routes, trusting caller-reported timing
    pub claimed: WatchEngine,

    clock: Clock,
}

impl AppState {
    pub fn new(primary: WatchEngine, claimed: WatchEngine) -> Self {
        Self {
            primary,
            claimed,
            clock: Arc::new(adwatch_util::now),
        }
    }

    /// Build both engines over one store from a loaded policy
    pub fn from_policy(policy: &Policy, store: Arc<dyn Store>) -> Self {
        let watch = policy.watch;

        let sessions: Box<dyn SessionTracker> = match policy.service.session_mode {
            SessionMode::Ephemeral => Box::new(EphemeralSessions::new(watch.ephemeral_session_ttl)),
            SessionMode::Durable | SessionMode::ClaimedTiming => Box::new(DurableSessions::new(
                store.clone(),
                watch.max_conflict_retries,
            )),
        };

        let primary = WatchEngine::new(store.clone(), watch, sessions);
        let claimed = WatchEngine::new(store, watch, Box::new(ClaimedTiming::new()));

        Self::new(primary, claimed)
    }

    /// Replace the clock, e.g. with a fixed time in tests
    pub fn with_clock(mut self, clock: Clock) -> Self {
        self.clock = clock;
        self
    }

    pub fn now(&self) -> DateTime<Local> {
        (self.clock)()
    }
}
