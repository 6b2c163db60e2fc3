//! Watch engine: start -> complete -> credit

use adwatch_api::{
    Ad, ClaimedCompletionRequest, CompleteWatchResponse, EarningsView, SessionMode,
    StartWatchResponse,
};
use adwatch_config::WatchPolicy;
use adwatch_store::{AuditEvent, AuditEventType, Completion, CompletionOutcome, Store};
use adwatch_util::{AdId, UserId};
use chrono::{DateTime, Local};
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::{
    CoreError, CoreResult, EarningLedger, ErrorKind, ResolvedWatch, SessionTracker, ViewHistory,
    Viewer,
};

/// The watch engine. Every call takes the current time explicitly; the
/// engine keeps no state of its own beyond what its session tracker holds.
pub struct WatchEngine {
    store: Arc<dyn Store>,
    policy: WatchPolicy,
    history: ViewHistory,
    ledger: EarningLedger,
    sessions: Box<dyn SessionTracker>,
}

impl WatchEngine {
    pub fn new(
        store: Arc<dyn Store>,
        policy: WatchPolicy,
        sessions: Box<dyn SessionTracker>,
    ) -> Self {
        info!(
            session_mode = sessions.mode().as_str(),
            cooldown_secs = policy.cooldown.period.as_secs(),
            rate_limit = policy.rate_limit.max_events,
            "Watch engine initialized"
        );

        Self {
            history: ViewHistory::new(store.clone(), policy),
            ledger: EarningLedger::new(store.clone(), policy.max_conflict_retries),
            store,
            policy,
            sessions,
        }
    }

    pub fn mode(&self) -> SessionMode {
        self.sessions.mode()
    }

    pub fn is_healthy(&self) -> bool {
        self.store.is_healthy()
    }

    /// Active ads the user may watch now
    pub fn list_watchable(&self, user_id: &UserId, now: DateTime<Local>) -> CoreResult<Vec<Ad>> {
        self.history.watchable_ads(user_id, now)
    }

    /// Every active ad, for third-party integrations
    pub fn third_party_catalog(&self) -> CoreResult<Vec<Ad>> {
        Ok(self.store.list_active_ads()?)
    }

    /// Earnings as of the last credit
    pub fn earnings(&self, user_id: &UserId) -> CoreResult<EarningsView> {
        self.ledger.balance(user_id)
    }

    fn active_ad(&self, ad_id: AdId) -> CoreResult<Ad> {
        match self.store.get_ad(ad_id)? {
            Some(ad) if ad.is_active() => Ok(ad),
            _ => Err(CoreError::AdNotFound(ad_id)),
        }
    }

    fn audit(&self, now: DateTime<Local>, event: AuditEventType) {
        if let Err(e) = self.store.append_audit(AuditEvent::at(now, event)) {
            warn!(error = %e, "Failed to append audit event");
        }
    }

    fn audit_denial(&self, viewer: &Viewer, ad_id: AdId, err: &CoreError, now: DateTime<Local>) {
        if err.kind() != ErrorKind::PolicyViolation {
            return;
        }

        debug!(
            user_id = %viewer.user_id,
            ad_id = %ad_id,
            reason = err.reason(),
            "Watch denied"
        );

        self.audit(
            now,
            AuditEventType::WatchDenied {
                user_id: viewer.user_id.clone(),
                ad_id,
                reason: err.reason().to_string(),
            },
        );
    }

    /// Begin watching an ad. Cooldown is checked before the rate limit.
    pub fn start(
        &self,
        viewer: &Viewer,
        ad_id: AdId,
        now: DateTime<Local>,
    ) -> CoreResult<StartWatchResponse> {
        let ad = self.active_ad(ad_id)?;

        if let Err(e) = self.history.check_gates(&viewer.user_id, ad_id, now) {
            self.audit_denial(viewer, ad_id, &e, now);
            return Err(e);
        }

        let started = self.sessions.begin(viewer, ad_id, now)?;

        info!(
            session_id = %started.session_id,
            user_id = %viewer.user_id,
            ad_id = %ad_id,
            mode = self.mode().as_str(),
            "Watch started"
        );

        self.audit(
            now,
            AuditEventType::WatchStarted {
                session_id: started.session_id.clone(),
                user_id: viewer.user_id.clone(),
                ad_id,
                mode: self.mode().as_str().to_string(),
            },
        );

        Ok(StartWatchResponse {
            session_id: started.session_id,
            started_at: started.started_at,
            duration: ad.duration_secs,
        })
    }

    /// Finish watching an ad and credit its reward. The view, the ledger
    /// credit and the session close are written together or not at all.
    pub fn complete(
        &self,
        viewer: &Viewer,
        ad_id: AdId,
        claim: Option<&ClaimedCompletionRequest>,
        now: DateTime<Local>,
    ) -> CoreResult<CompleteWatchResponse> {
        let ad = self.active_ad(ad_id)?;
        let resolved = self.sessions.resolve(viewer, ad_id, claim, now)?;

        match self.credit_view(viewer, &ad, &resolved, now) {
            Ok(response) => Ok(response),
            Err(e) => {
                if !matches!(e, CoreError::NoActiveSession(_)) {
                    self.sessions.restore(viewer, ad_id, &resolved);
                }
                self.audit_denial(viewer, ad_id, &e, now);
                Err(e)
            }
        }
    }

    fn credit_view(
        &self,
        viewer: &Viewer,
        ad: &Ad,
        resolved: &ResolvedWatch,
        now: DateTime<Local>,
    ) -> CoreResult<CompleteWatchResponse> {
        let required = ad.required_duration();
        if resolved.elapsed < required {
            return Err(CoreError::DurationNotMet {
                required,
                elapsed: resolved.elapsed,
            });
        }

        self.history.check_gates(&viewer.user_id, ad.id, now)?;

        let completion = Completion {
            user_id: viewer.user_id.clone(),
            ad_id: ad.id,
            amount: ad.reward,
            viewed_at: now,
            session_id: resolved.persisted.then(|| resolved.session_id.clone()),
            cooldown_since: self.policy.cooldown.window_start(now),
            rate_limit_since: self.policy.rate_limit.window_start(now),
            rate_limit_max: self.policy.rate_limit.max_events,
        };

        let outcome = self.ledger.credit(&completion)?;

        let record = match outcome {
            CompletionOutcome::Credited(record) => record,
            CompletionOutcome::AlreadyCredited { last_viewed_at } => {
                let remaining = self
                    .policy
                    .cooldown
                    .remaining(last_viewed_at, now)
                    .unwrap_or_default();
                return Err(CoreError::CooldownActive { remaining });
            }
            CompletionOutcome::SessionGone => return Err(CoreError::NoActiveSession(ad.id)),
            CompletionOutcome::RateLimited(activity) => {
                let remaining = self
                    .policy
                    .rate_limit
                    .retry_after(activity, now)
                    .unwrap_or_default();
                return Err(CoreError::RateLimited { remaining });
            }
        };

        let elapsed_secs = resolved.elapsed.as_secs();

        info!(
            user_id = %viewer.user_id,
            ad_id = %ad.id,
            earned = %ad.reward,
            elapsed_secs,
            total = %record.total_earned,
            "Watch credited"
        );

        self.audit(
            now,
            AuditEventType::WatchCredited {
                user_id: viewer.user_id.clone(),
                ad_id: ad.id,
                earned: ad.reward,
                elapsed_secs,
            },
        );

        Ok(CompleteWatchResponse {
            earned: ad.reward,
            elapsed_secs,
            message: format!("You earned {} USD", ad.reward),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{ClaimedTiming, DurableSessions, EphemeralSessions};
    use adwatch_api::{AdCategory, AdStatus};
    use adwatch_store::SqliteStore;
    use adwatch_util::Amount;
    use chrono::TimeZone;
    use std::time::Duration;

    fn t0() -> DateTime<Local> {
        Local.with_ymd_and_hms(2025, 12, 26, 10, 0, 0).unwrap()
    }

    fn secs(s: i64) -> DateTime<Local> {
        t0() + chrono::Duration::seconds(s)
    }

    fn ad(id: i64, status: AdStatus) -> Ad {
        Ad {
            id: AdId::new(id),
            title: format!("Ad {}", id),
            category: AdCategory::Video,
            reward: "0.5000".parse().unwrap(),
            duration_secs: 30,
            max_show: 1,
            status,
            note: None,
        }
    }

    fn store() -> Arc<SqliteStore> {
        let store = Arc::new(SqliteStore::in_memory().unwrap());
        let mut ads: Vec<Ad> = (1..=12).map(|id| ad(id, AdStatus::Active)).collect();
        ads.push(ad(99, AdStatus::Inactive));
        store.sync_catalog(&ads).unwrap();
        store
    }

    fn durable(store: Arc<SqliteStore>) -> WatchEngine {
        WatchEngine::new(
            store.clone(),
            WatchPolicy::default(),
            Box::new(DurableSessions::new(store, 3)),
        )
    }

    #[test]
    fn test_watch_scenario() {
        let engine = durable(store());
        let viewer = Viewer::new("u1");
        let ad_id = AdId::new(1);

        let started = engine.start(&viewer, ad_id, t0()).unwrap();
        assert_eq!(started.duration, 30);
        assert_eq!(started.started_at, t0());

        let err = engine.complete(&viewer, ad_id, None, secs(10)).unwrap_err();
        assert!(matches!(err, CoreError::DurationNotMet { .. }));
        assert_eq!(engine.earnings(&viewer.user_id).unwrap(), EarningsView::empty());

        let done = engine.complete(&viewer, ad_id, None, secs(31)).unwrap();
        assert_eq!(done.earned.to_string(), "0.5000");
        assert_eq!(done.elapsed_secs, 31);
        assert_eq!(done.message, "You earned 0.5000 USD");

        let err = engine.start(&viewer, ad_id, secs(61)).unwrap_err();
        assert_eq!(
            err.to_string(),
            "You can view this ad again after 23h 59m."
        );

        let earnings = engine.earnings(&viewer.user_id).unwrap();
        assert_eq!(earnings.total_earned.to_string(), "0.5000");
        assert_eq!(earnings.today_earned.to_string(), "0.5000");
        assert_eq!(earnings.last_updated, Some(t0().date_naive()));
    }

    #[test]
    fn test_complete_twice_credits_once() {
        let engine = durable(store());
        let viewer = Viewer::new("u1");

        engine.start(&viewer, AdId::new(1), t0()).unwrap();
        engine.complete(&viewer, AdId::new(1), None, secs(31)).unwrap();

        let err = engine
            .complete(&viewer, AdId::new(1), None, secs(32))
            .unwrap_err();
        assert!(matches!(err, CoreError::NoActiveSession(_)));

        let earnings = engine.earnings(&viewer.user_id).unwrap();
        assert_eq!(earnings.total_earned.to_string(), "0.5000");
    }

    #[test]
    fn test_unknown_and_inactive_ads() {
        let engine = durable(store());
        let viewer = Viewer::new("u1");

        assert!(matches!(
            engine.start(&viewer, AdId::new(404), t0()),
            Err(CoreError::AdNotFound(_))
        ));
        assert!(matches!(
            engine.start(&viewer, AdId::new(99), t0()),
            Err(CoreError::AdNotFound(_))
        ));
        assert!(matches!(
            engine.complete(&viewer, AdId::new(99), None, t0()),
            Err(CoreError::AdNotFound(_))
        ));
    }

    #[test]
    fn test_complete_without_start() {
        let engine = durable(store());
        let err = engine
            .complete(&Viewer::new("u1"), AdId::new(1), None, t0())
            .unwrap_err();
        assert!(matches!(err, CoreError::NoActiveSession(_)));
    }

    #[test]
    fn test_rate_limit_blocks_eleventh_start() {
        let engine = durable(store());
        let viewer = Viewer::new("u1");

        for i in 0..10 {
            let ad_id = AdId::new(i + 1);
            let begin = secs(i * 40);
            engine.start(&viewer, ad_id, begin).unwrap();
            engine
                .complete(&viewer, ad_id, None, begin + chrono::Duration::seconds(31))
                .unwrap();
        }

        let now = secs(400);
        let err = engine.start(&viewer, AdId::new(11), now).unwrap_err();
        match err {
            CoreError::RateLimited { remaining } => {
                // Oldest view at +31s leaves the window at +1831s
                assert_eq!(remaining, Duration::from_secs(1831 - 400));
            }
            other => panic!("unexpected {:?}", other),
        }

        assert!(engine.start(&viewer, AdId::new(11), secs(1832)).is_ok());
    }

    #[test]
    fn test_racing_completions_stay_within_rate_limit() {
        let engine = durable(store());
        let viewer = Viewer::new("u1");

        for i in 0..9 {
            let ad_id = AdId::new(i + 1);
            engine.start(&viewer, ad_id, secs(i * 40)).unwrap();
            engine
                .complete(&viewer, ad_id, None, secs(i * 40 + 31))
                .unwrap();
        }

        // Nine views in the window: every start below passes the gate
        let racing = [10, 11, 12].map(AdId::new);
        for ad_id in racing {
            engine.start(&viewer, ad_id, secs(400)).unwrap();
        }

        let (engine, viewer) = (&engine, &viewer);
        let results: Vec<_> = std::thread::scope(|s| {
            let handles: Vec<_> = racing
                .iter()
                .map(|&ad_id| s.spawn(move || engine.complete(viewer, ad_id, None, secs(440))))
                .collect();
            handles.into_iter().map(|h| h.join().unwrap()).collect()
        });

        assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 1);
        for err in results.into_iter().filter_map(Result::err) {
            assert!(matches!(err, CoreError::RateLimited { .. }), "{:?}", err);
        }

        let window = engine.store.window_activity(&viewer.user_id, t0()).unwrap();
        assert_eq!(window.count, 10);
        let earnings = engine.earnings(&viewer.user_id).unwrap();
        assert_eq!(earnings.total_earned.to_string(), "5.0000");
    }

    #[test]
    fn test_racing_completions_of_one_session_credit_once() {
        let engine = durable(store());
        let viewer = Viewer::new("u1");
        engine.start(&viewer, AdId::new(1), t0()).unwrap();

        let (engine, viewer) = (&engine, &viewer);
        let results: Vec<_> = std::thread::scope(|s| {
            let handles: Vec<_> = (0..4)
                .map(|_| s.spawn(move || engine.complete(viewer, AdId::new(1), None, secs(31))))
                .collect();
            handles.into_iter().map(|h| h.join().unwrap()).collect()
        });

        assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 1);
        for err in results.into_iter().filter_map(Result::err) {
            assert!(
                matches!(
                    err,
                    CoreError::NoActiveSession(_) | CoreError::CooldownActive { .. }
                ),
                "{:?}",
                err
            );
        }

        let earnings = engine.earnings(&viewer.user_id).unwrap();
        assert_eq!(earnings.total_earned.to_string(), "0.5000");
    }

    #[test]
    fn test_racing_starts_leave_one_open_session() {
        let store = store();
        let engine = durable(store.clone());
        let viewer = Viewer::new("u1");

        let (engine, viewer) = (&engine, &viewer);
        let started: Vec<_> = std::thread::scope(|s| {
            let handles: Vec<_> = (0..4)
                .map(|_| s.spawn(move || engine.start(viewer, AdId::new(1), t0()).unwrap()))
                .collect();
            handles.into_iter().map(|h| h.join().unwrap()).collect()
        });

        let open = store
            .find_open_session(&viewer.user_id, AdId::new(1))
            .unwrap()
            .unwrap();
        assert!(started.iter().any(|s| s.session_id == open.session_id));

        engine.complete(&viewer, AdId::new(1), None, secs(31)).unwrap();
        assert!(
            store
                .find_open_session(&viewer.user_id, AdId::new(1))
                .unwrap()
                .is_none()
        );
        let err = engine
            .complete(&viewer, AdId::new(1), None, secs(32))
            .unwrap_err();
        assert!(matches!(err, CoreError::NoActiveSession(_)));
    }

    #[test]
    fn test_watchable_list_hides_viewed_ads() {
        let engine = durable(store());
        let viewer = Viewer::new("u1");

        assert_eq!(engine.list_watchable(&viewer.user_id, t0()).unwrap().len(), 12);

        engine.start(&viewer, AdId::new(1), t0()).unwrap();
        engine.complete(&viewer, AdId::new(1), None, secs(31)).unwrap();

        let ads = engine.list_watchable(&viewer.user_id, secs(60)).unwrap();
        assert_eq!(ads.len(), 11);
        assert!(ads.iter().all(|a| a.id != AdId::new(1)));

        // Back after the cooldown
        let later = secs(32 + 24 * 3600);
        assert_eq!(engine.list_watchable(&viewer.user_id, later).unwrap().len(), 12);

        // Third-party catalog ignores history
        assert_eq!(engine.third_party_catalog().unwrap().len(), 12);
    }

    #[test]
    fn test_ephemeral_session_survives_early_complete() {
        let store = store();
        let engine = WatchEngine::new(
            store,
            WatchPolicy::default(),
            Box::new(EphemeralSessions::new(Duration::from_secs(3600))),
        );
        let viewer = Viewer::new("u1").with_client_token("tab-1");

        engine.start(&viewer, AdId::new(1), t0()).unwrap();
        assert!(matches!(
            engine.complete(&viewer, AdId::new(1), None, secs(5)),
            Err(CoreError::DurationNotMet { .. })
        ));

        let done = engine.complete(&viewer, AdId::new(1), None, secs(30)).unwrap();
        assert_eq!(done.elapsed_secs, 30);

        assert!(matches!(
            engine.complete(&viewer, AdId::new(1), None, secs(31)),
            Err(CoreError::NoActiveSession(_))
        ));
    }

    #[test]
    fn test_claimed_timing_respects_cooldown() {
        let store = store();
        let engine = WatchEngine::new(
            store,
            WatchPolicy::default(),
            Box::new(ClaimedTiming::new()),
        );
        let viewer = Viewer::new("partner-user");
        let claim = ClaimedCompletionRequest {
            started_at: Some(t0().to_rfc3339()),
            duration_watched: Some(30),
        };

        let started = engine.start(&viewer, AdId::new(1), t0()).unwrap();
        assert_eq!(started.duration, 30);

        engine
            .complete(&viewer, AdId::new(1), Some(&claim), secs(5))
            .unwrap();

        // No session bookkeeping: a replayed claim hits the cooldown
        let err = engine
            .complete(&viewer, AdId::new(1), Some(&claim), secs(6))
            .unwrap_err();
        assert!(matches!(err, CoreError::CooldownActive { .. }));

        let earnings = engine.earnings(&viewer.user_id).unwrap();
        assert_eq!(earnings.total_earned.to_string(), "0.5000");
    }

    #[test]
    fn test_claimed_timing_short_claim_rejected() {
        let engine = WatchEngine::new(
            store(),
            WatchPolicy::default(),
            Box::new(ClaimedTiming::new()),
        );
        let claim = ClaimedCompletionRequest {
            started_at: Some(secs(20).to_rfc3339()),
            duration_watched: Some(10),
        };

        let err = engine
            .complete(&Viewer::new("u1"), AdId::new(1), Some(&claim), secs(25))
            .unwrap_err();
        assert!(matches!(err, CoreError::DurationNotMet { .. }));
    }

    #[test]
    fn test_denials_are_audited() {
        let store = store();
        let engine = durable(store.clone());
        let viewer = Viewer::new("u1");

        engine.start(&viewer, AdId::new(1), t0()).unwrap();
        let _ = engine.complete(&viewer, AdId::new(1), None, secs(1));

        let events = store.get_recent_audits(10).unwrap();
        assert!(matches!(
            &events[0].event,
            AuditEventType::WatchDenied { reason, .. } if reason == "duration_not_met"
        ));
        assert!(matches!(events[1].event, AuditEventType::WatchStarted { .. }));
    }

    #[test]
    fn test_daily_reset_through_engine() {
        let engine = durable(store());
        let viewer = Viewer::new("u1");

        engine.start(&viewer, AdId::new(1), t0()).unwrap();
        engine.complete(&viewer, AdId::new(1), None, secs(31)).unwrap();

        let tomorrow = Local.with_ymd_and_hms(2025, 12, 27, 9, 0, 0).unwrap();
        engine.start(&viewer, AdId::new(2), tomorrow).unwrap();
        engine
            .complete(
                &viewer,
                AdId::new(2),
                None,
                tomorrow + chrono::Duration::seconds(30),
            )
            .unwrap();

        let earnings = engine.earnings(&viewer.user_id).unwrap();
        assert_eq!(earnings.total_earned, Amount::from_units(10_000));
        assert_eq!(earnings.today_earned, Amount::from_units(5_000));
    }
}
