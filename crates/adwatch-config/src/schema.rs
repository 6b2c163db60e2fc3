//! Raw configuration schema (as parsed from TOML)

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Raw configuration as parsed from TOML
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RawConfig {
    /// Config schema version
    pub config_version: u32,

    /// Service-level settings
    #[serde(default)]
    pub service: RawServiceConfig,

    /// Watch rules
    #[serde(default)]
    pub watch: RawWatchPolicy,

    /// Ad catalog
    #[serde(default)]
    pub ads: Vec<RawAd>,
}

/// Service-level settings
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct RawServiceConfig {
    /// HTTP listen address (default: 127.0.0.1:8080)
    pub listen_addr: Option<String>,

    /// Data directory for the store
    pub data_dir: Option<PathBuf>,

    /// "durable" or "ephemeral"
    pub session_mode: Option<String>,
}

/// Watch rules. Every field falls back to the built-in default.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct RawWatchPolicy {
    /// Re-watch cooldown per (user, ad), in seconds
    pub cooldown_seconds: Option<u64>,

    /// Views allowed per user inside one rate-limit window
    pub rate_limit_max_views: Option<u32>,

    /// Rate-limit window, in seconds
    pub rate_limit_window_seconds: Option<u64>,

    /// Lifetime of an ephemeral session, in seconds
    pub ephemeral_session_ttl_seconds: Option<u64>,

    /// Attempts for a storage transaction that hits lock contention
    pub max_conflict_retries: Option<u32>,
}

/// Raw ad definition
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RawAd {
    /// Stable catalog ID
    pub id: i64,

    pub title: String,

    /// "visit", "short", "video", "offerwall" or "cpi"
    pub category: String,

    /// Decimal string with at most four fractional digits, e.g. "0.5000"
    pub reward: String,

    /// Required watch time
    pub duration_seconds: u32,

    /// Reserved, not enforced
    pub max_show: Option<u32>,

    /// "active" (default) or "inactive"
    pub status: Option<String>,

    pub note: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_catalog_entry() {
        let toml_str = r#"
            config_version = 1

            [[ads]]
            id = 1
            title = "Intro video"
            category = "video"
            reward = "0.5000"
            duration_seconds = 30
        "#;

        let config: RawConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(config.ads.len(), 1);
        assert_eq!(config.ads[0].id, 1);
        assert!(config.ads[0].status.is_none());
    }

    #[test]
    fn parse_watch_overrides() {
        let toml_str = r#"
            config_version = 1

            [service]
            listen_addr = "0.0.0.0:9000"
            session_mode = "ephemeral"

            [watch]
            cooldown_seconds = 3600
            rate_limit_max_views = 5
        "#;

        let config: RawConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(config.watch.cooldown_seconds, Some(3600));
        assert_eq!(config.watch.rate_limit_max_views, Some(5));
        assert!(config.watch.rate_limit_window_seconds.is_none());
        assert_eq!(config.service.session_mode.as_deref(), Some("ephemeral"));
    }
}
