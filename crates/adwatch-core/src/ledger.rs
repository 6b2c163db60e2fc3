//! Per-user earnings ledger

use adwatch_api::EarningsView;
use adwatch_store::{Completion, CompletionOutcome, Store};
use adwatch_util::{Amount, UserId};
use std::sync::Arc;
use tracing::debug;

use crate::retry::retry_on_conflict;
use crate::{CoreError, CoreResult};

/// Running balance per user. `today` restarts whenever a credit lands on a
/// different calendar date than the previous one.
pub struct EarningLedger {
    store: Arc<dyn Store>,
    max_attempts: u32,
}

impl EarningLedger {
    pub fn new(store: Arc<dyn Store>, max_attempts: u32) -> Self {
        Self {
            store,
            max_attempts,
        }
    }

    /// Reject amounts that would not grow the balance
    pub fn ensure_creditable(amount: Amount) -> CoreResult<()> {
        if amount.is_positive() {
            Ok(())
        } else {
            Err(CoreError::InvalidAmount(amount))
        }
    }

    /// Record a completed view and credit its reward on the calendar day
    /// of `viewed_at`. The session close and the view row commit together
    /// with the ledger update.
    pub fn credit(&self, completion: &Completion) -> CoreResult<CompletionOutcome> {
        Self::ensure_creditable(completion.amount)?;

        let outcome = retry_on_conflict(self.max_attempts, "credit", || {
            self.store.record_completion(completion)
        })?;

        if let CompletionOutcome::Credited(record) = &outcome {
            debug!(
                user_id = %completion.user_id,
                amount = %completion.amount,
                total = %record.total_earned,
                "Credited"
            );
        }
        Ok(outcome)
    }

    /// Balance as of the last credit. Users who never earned get zeros.
    pub fn balance(&self, user_id: &UserId) -> CoreResult<EarningsView> {
        let view = match self.store.get_earnings(user_id)? {
            Some(record) => EarningsView {
                total_earned: record.total_earned,
                today_earned: record.today_earned,
                last_updated: Some(record.last_updated),
            },
            None => EarningsView::empty(),
        };

        Ok(view)
    }
}
