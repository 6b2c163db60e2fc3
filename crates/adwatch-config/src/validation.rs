//! Configuration validation

use crate::schema::{RawAd, RawConfig, RawServiceConfig, RawWatchPolicy};
use adwatch_api::{Ad, AdCategory, AdStatus, SessionMode};
use adwatch_util::{AdId, Amount};
use std::collections::HashSet;
use std::net::SocketAddr;
use thiserror::Error;

/// Validation error
#[derive(Debug, Clone, Error)]
pub enum ValidationError {
    #[error("Ad {ad_id}: {message}")]
    AdError { ad_id: i64, message: String },

    #[error("Duplicate ad ID: {0}")]
    DuplicateAdId(i64),

    #[error("Invalid listen address '{value}': {message}")]
    InvalidListenAddr { value: String, message: String },

    #[error("Unknown session mode '{0}' (expected \"durable\" or \"ephemeral\")")]
    InvalidSessionMode(String),

    #[error("Watch policy: {0}")]
    WatchPolicyError(String),
}

/// Longest cooldown, rate-limit window or session TTL accepted from config
pub const MAX_WATCH_PERIOD_SECS: u64 = 366 * 24 * 3600;

/// Validate a raw configuration
pub fn validate_config(config: &RawConfig) -> Vec<ValidationError> {
    let mut errors = Vec::new();

    errors.extend(validate_service(&config.service));
    errors.extend(validate_watch(&config.watch));

    let mut seen_ids = HashSet::new();
    for ad in &config.ads {
        if !seen_ids.insert(ad.id) {
            errors.push(ValidationError::DuplicateAdId(ad.id));
        }
    }

    for ad in &config.ads {
        if let Err(ad_errors) = convert_ad(ad) {
            errors.extend(ad_errors);
        }
    }

    errors
}

fn validate_service(service: &RawServiceConfig) -> Vec<ValidationError> {
    let mut errors = Vec::new();

    if let Some(addr) = &service.listen_addr {
        if let Err(e) = parse_listen_addr(addr) {
            errors.push(e);
        }
    }

    if let Some(mode) = &service.session_mode {
        if let Err(e) = parse_session_mode(mode) {
            errors.push(e);
        }
    }

    errors
}

fn validate_watch(watch: &RawWatchPolicy) -> Vec<ValidationError> {
    let mut errors = Vec::new();

    let zero_checks = [
        ("cooldown_seconds", watch.cooldown_seconds),
        ("rate_limit_window_seconds", watch.rate_limit_window_seconds),
        (
            "ephemeral_session_ttl_seconds",
            watch.ephemeral_session_ttl_seconds,
        ),
        (
            "rate_limit_max_views",
            watch.rate_limit_max_views.map(u64::from),
        ),
        (
            "max_conflict_retries",
            watch.max_conflict_retries.map(u64::from),
        ),
    ];

    for (field, value) in zero_checks {
        if value == Some(0) {
            errors.push(ValidationError::WatchPolicyError(format!(
                "{} must be greater than zero",
                field
            )));
        }
    }

    let period_checks = [
        ("cooldown_seconds", watch.cooldown_seconds),
        ("rate_limit_window_seconds", watch.rate_limit_window_seconds),
        (
            "ephemeral_session_ttl_seconds",
            watch.ephemeral_session_ttl_seconds,
        ),
    ];

    for (field, value) in period_checks {
        if let Some(secs) = value.filter(|&secs| secs > MAX_WATCH_PERIOD_SECS) {
            errors.push(ValidationError::WatchPolicyError(format!(
                "{} must be at most {} (got {})",
                field, MAX_WATCH_PERIOD_SECS, secs
            )));
        }
    }

    errors
}

/// Parse a listen address such as `127.0.0.1:8080`
pub fn parse_listen_addr(value: &str) -> Result<SocketAddr, ValidationError> {
    value
        .parse()
        .map_err(|e: std::net::AddrParseError| ValidationError::InvalidListenAddr {
            value: value.to_string(),
            message: e.to_string(),
        })
}

/// Parse the configured session mode. Claimed timing is selected per route,
/// never globally.
pub fn parse_session_mode(value: &str) -> Result<SessionMode, ValidationError> {
    match value.to_lowercase().as_str() {
        "durable" => Ok(SessionMode::Durable),
        "ephemeral" => Ok(SessionMode::Ephemeral),
        other => Err(ValidationError::InvalidSessionMode(other.to_string())),
    }
}

/// Convert a raw ad into a catalog entry, collecting every problem found
pub fn convert_ad(raw: &RawAd) -> Result<Ad, Vec<ValidationError>> {
    let mut errors = Vec::new();
    let mut fail = |message: String| {
        errors.push(ValidationError::AdError {
            ad_id: raw.id,
            message,
        })
    };

    if raw.title.trim().is_empty() {
        fail("title cannot be empty".into());
    }

    if raw.duration_seconds == 0 {
        fail("duration_seconds must be greater than zero".into());
    }

    let category = raw
        .category
        .parse::<AdCategory>()
        .map_err(|e| fail(e.to_string()))
        .ok();

    let status = match raw.status.as_deref() {
        None => Some(AdStatus::Active),
        Some(s) => s.parse::<AdStatus>().map_err(|e| fail(e.to_string())).ok(),
    };

    let reward = match raw.reward.parse::<Amount>() {
        Ok(amount) if amount.is_positive() => Some(amount),
        Ok(amount) => {
            fail(format!("reward must be positive, got {}", amount));
            None
        }
        Err(e) => {
            fail(e.to_string());
            None
        }
    };

    match (category, status, reward) {
        (Some(category), Some(status), Some(reward)) if errors.is_empty() => Ok(Ad {
            id: AdId::new(raw.id),
            title: raw.title.trim().to_string(),
            category,
            reward,
            duration_secs: raw.duration_seconds,
            max_show: raw.max_show.unwrap_or(1),
            status,
            note: raw.note.clone(),
        }),
        _ => Err(errors),
    }
}
