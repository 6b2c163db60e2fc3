//! Watch-window arithmetic
//!
//! Both anti-abuse rules are derived from view history rather than from
//! in-memory buckets, so the service can run several request handlers over
//! one database. This module holds only the time math; callers supply the
//! facts read from storage.

use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::{remaining_until, saturating_add, saturating_sub};

/// Per-(user, ad) re-watch cooldown
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cooldown {
    pub period: Duration,
}

impl Cooldown {
    pub fn new(period: Duration) -> Self {
        Self { period }
    }

    /// Earliest `viewed_at` that still holds the cooldown at `now`
    pub fn window_start(&self, now: DateTime<Local>) -> DateTime<Local> {
        saturating_sub(now, self.period)
    }

    /// Remaining wait if a view at `last_viewed_at` still blocks `now`
    pub fn remaining(
        &self,
        last_viewed_at: DateTime<Local>,
        now: DateTime<Local>,
    ) -> Option<Duration> {
        if last_viewed_at < self.window_start(now) {
            return None;
        }
        Some(remaining_until(saturating_add(last_viewed_at, self.period), now))
    }
}

/// Views logged by one user inside a sliding window
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WindowActivity {
    pub count: u32,
    pub oldest: Option<DateTime<Local>>,
}

impl WindowActivity {
    pub const EMPTY: WindowActivity = WindowActivity {
        count: 0,
        oldest: None,
    };
}

/// Sliding-window cap on credited views per user
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct WindowLimit {
    /// Maximum views allowed inside one window
    pub max_events: u32,
    /// Length of the window
    pub window: Duration,
}

impl WindowLimit {
    pub fn new(max_events: u32, window: Duration) -> Self {
        Self { max_events, window }
    }

    /// Earliest `viewed_at` that still counts against the window at `now`
    pub fn window_start(&self, now: DateTime<Local>) -> DateTime<Local> {
        saturating_sub(now, self.window)
    }

    /// Remaining wait until the oldest counted view leaves the window,
    /// or `None` when another view is allowed.
    pub fn retry_after(&self, activity: WindowActivity, now: DateTime<Local>) -> Option<Duration> {
        if activity.count < self.max_events {
            return None;
        }
        let oldest = activity.oldest?;
        Some(remaining_until(saturating_add(oldest, self.window), now))
    }
}
