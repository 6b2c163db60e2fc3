//! Validated policy structures

use crate::schema::{RawConfig, RawServiceConfig, RawWatchPolicy};
use crate::validation::{convert_ad, parse_listen_addr, parse_session_mode};
use adwatch_api::{Ad, SessionMode};
use adwatch_util::{Cooldown, WindowLimit, default_data_dir};
use std::net::{Ipv4Addr, SocketAddr};
use std::path::PathBuf;
use std::time::Duration;

/// Default HTTP listen address
pub const DEFAULT_LISTEN_ADDR: SocketAddr =
    SocketAddr::new(std::net::IpAddr::V4(Ipv4Addr::LOCALHOST), 8080);

/// Validated policy ready for use by the watch engine
#[derive(Debug, Clone)]
pub struct Policy {
    /// Service configuration
    pub service: ServiceConfig,

    /// Watch rules
    pub watch: WatchPolicy,

    /// Ad catalog
    pub ads: Vec<Ad>,
}

impl Policy {
    /// Convert from raw config. Call only after [`crate::validate_config`]
    /// returned no errors; invalid ads are skipped.
    pub fn from_raw(raw: RawConfig) -> Self {
        let ads = raw.ads.iter().filter_map(|a| convert_ad(a).ok()).collect();

        Self {
            service: ServiceConfig::from_raw(raw.service),
            watch: WatchPolicy::from_raw(&raw.watch),
            ads,
        }
    }
}

/// Service configuration
#[derive(Debug, Clone)]
pub struct ServiceConfig {
    pub listen_addr: SocketAddr,
    pub data_dir: PathBuf,
    pub session_mode: SessionMode,
}

impl ServiceConfig {
    fn from_raw(raw: RawServiceConfig) -> Self {
        Self {
            listen_addr: raw
                .listen_addr
                .as_deref()
                .and_then(|a| parse_listen_addr(a).ok())
                .unwrap_or(DEFAULT_LISTEN_ADDR),
            data_dir: raw.data_dir.unwrap_or_else(default_data_dir),
            session_mode: raw
                .session_mode
                .as_deref()
                .and_then(|m| parse_session_mode(m).ok())
                .unwrap_or_default(),
        }
    }
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            listen_addr: DEFAULT_LISTEN_ADDR,
            data_dir: default_data_dir(),
            session_mode: SessionMode::Durable,
        }
    }
}

/// Rules applied by the watch engine
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WatchPolicy {
    /// Per-(user, ad) re-watch cooldown
    pub cooldown: Cooldown,

    /// Per-user cap on credited views
    pub rate_limit: WindowLimit,

    /// Lifetime of an ephemeral session entry
    pub ephemeral_session_ttl: Duration,

    /// Attempts for a transaction that hits lock contention
    pub max_conflict_retries: u32,
}

impl WatchPolicy {
    pub const DEFAULT_COOLDOWN: Duration = Duration::from_secs(24 * 60 * 60);
    pub const DEFAULT_RATE_LIMIT_VIEWS: u32 = 10;
    pub const DEFAULT_RATE_LIMIT_WINDOW: Duration = Duration::from_secs(30 * 60);
    pub const DEFAULT_EPHEMERAL_TTL: Duration = Duration::from_secs(60 * 60);
    pub const DEFAULT_CONFLICT_RETRIES: u32 = 3;

    fn from_raw(raw: &RawWatchPolicy) -> Self {
        let defaults = Self::default();

        Self {
            cooldown: raw
                .cooldown_seconds
                .map(|s| Cooldown::new(Duration::from_secs(s)))
                .unwrap_or(defaults.cooldown),
            rate_limit: WindowLimit::new(
                raw.rate_limit_max_views
                    .unwrap_or(defaults.rate_limit.max_events),
                raw.rate_limit_window_seconds
                    .map(Duration::from_secs)
                    .unwrap_or(defaults.rate_limit.window),
            ),
            ephemeral_session_ttl: raw
                .ephemeral_session_ttl_seconds
                .map(Duration::from_secs)
                .unwrap_or(defaults.ephemeral_session_ttl),
            max_conflict_retries: raw
                .max_conflict_retries
                .unwrap_or(defaults.max_conflict_retries),
        }
    }
}

impl Default for WatchPolicy {
    fn default() -> Self {
        Self {
            cooldown: Cooldown::new(Self::DEFAULT_COOLDOWN),
            rate_limit: WindowLimit::new(
                Self::DEFAULT_RATE_LIMIT_VIEWS,
                Self::DEFAULT_RATE_LIMIT_WINDOW,
            ),
            ephemeral_session_ttl: Self::DEFAULT_EPHEMERAL_TTL,
            max_conflict_retries: Self::DEFAULT_CONFLICT_RETRIES,
        }
    }
}
