//! Bounded retry for storage write conflicts

use adwatch_store::{StoreError, StoreResult};
use std::time::Duration;
use tracing::{error, warn};

use crate::{CoreError, CoreResult};

const BACKOFF_STEP: Duration = Duration::from_millis(10);

/// Run `op` until it stops failing with [`StoreError::Conflict`], at most
/// `max_attempts` times. Other errors are returned immediately.
pub(crate) fn retry_on_conflict<T>(
    max_attempts: u32,
    operation: &'static str,
    mut op: impl FnMut() -> StoreResult<T>,
) -> CoreResult<T> {
    let max_attempts = max_attempts.max(1);
    let mut attempt = 1;

    loop {
        match op() {
            Ok(value) => return Ok(value),
            Err(StoreError::Conflict(message)) if attempt < max_attempts => {
                warn!(operation, attempt, max_attempts, error = %message, "Write conflict, retrying");
                std::thread::sleep(BACKOFF_STEP * attempt);
                attempt += 1;
            }
            Err(StoreError::Conflict(message)) => {
                error!(operation, attempts = attempt, error = %message, "Write conflict persisted");
                return Err(CoreError::Conflict { attempts: attempt });
            }
            Err(e) => return Err(e.into()),
        }
    }
}
