//! View history rules: cooldown, rate limit, watchable ads

use adwatch_api::Ad;
use adwatch_config::WatchPolicy;
use adwatch_store::Store;
use adwatch_util::{AdId, UserId};
use chrono::{DateTime, Local};
use std::sync::Arc;
use tracing::debug;

use crate::{CoreError, CoreResult};

/// Read side of the view history. Views are appended only by the atomic
/// completion in the store, together with the ledger credit.
pub struct ViewHistory {
    store: Arc<dyn Store>,
    policy: WatchPolicy,
}

impl ViewHistory {
    pub fn new(store: Arc<dyn Store>, policy: WatchPolicy) -> Self {
        Self { store, policy }
    }

    /// Last view of `ad_id` by `user_id` still inside the cooldown period
    pub fn has_recent_view(
        &self,
        user_id: &UserId,
        ad_id: AdId,
        now: DateTime<Local>,
    ) -> CoreResult<Option<DateTime<Local>>> {
        let since = self.policy.cooldown.window_start(now);
        Ok(self.store.last_view_since(user_id, ad_id, since)?)
    }

    /// Number of views by `user_id` inside the current rate-limit window
    pub fn count_recent(&self, user_id: &UserId, now: DateTime<Local>) -> CoreResult<u32> {
        let since = self.policy.rate_limit.window_start(now);
        Ok(self.store.window_activity(user_id, since)?.count)
    }

    pub fn check_cooldown(
        &self,
        user_id: &UserId,
        ad_id: AdId,
        now: DateTime<Local>,
    ) -> CoreResult<()> {
        let Some(last_viewed_at) = self.has_recent_view(user_id, ad_id, now)? else {
            return Ok(());
        };

        match self.policy.cooldown.remaining(last_viewed_at, now) {
            Some(remaining) => {
                debug!(user_id = %user_id, ad_id = %ad_id, remaining_secs = remaining.as_secs(), "Cooldown active");
                Err(CoreError::CooldownActive { remaining })
            }
            None => Ok(()),
        }
    }

    pub fn check_rate_limit(&self, user_id: &UserId, now: DateTime<Local>) -> CoreResult<()> {
        let since = self.policy.rate_limit.window_start(now);
        let activity = self.store.window_activity(user_id, since)?;

        match self.policy.rate_limit.retry_after(activity, now) {
            Some(remaining) => {
                debug!(
                    user_id = %user_id,
                    views = activity.count,
                    remaining_secs = remaining.as_secs(),
                    "Rate limit reached"
                );
                Err(CoreError::RateLimited { remaining })
            }
            None => Ok(()),
        }
    }

    /// Cooldown first, then rate limit
    pub fn check_gates(
        &self,
        user_id: &UserId,
        ad_id: AdId,
        now: DateTime<Local>,
    ) -> CoreResult<()> {
        self.check_cooldown(user_id, ad_id, now)?;
        self.check_rate_limit(user_id, now)
    }

    /// Active ads the user has not viewed inside the cooldown period
    pub fn watchable_ads(&self, user_id: &UserId, now: DateTime<Local>) -> CoreResult<Vec<Ad>> {
        let since = self.policy.cooldown.window_start(now);
        let viewed = self.store.viewed_ad_ids_since(user_id, since)?;

        Ok(self
            .store
            .list_active_ads()?
            .into_iter()
            .filter(|ad| !viewed.contains(&ad.id))
            .collect())
    }
}
