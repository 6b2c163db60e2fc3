//! Shared types for the adwatchd API

use adwatch_util::{AdId, Amount};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

/// Returned when a stored enum tag is not recognised
#[derive(Debug, Clone, Error)]
#[error("Unknown {kind} '{value}'")]
pub struct UnknownTag {
    pub kind: &'static str,
    pub value: String,
}

/// Ad category
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AdCategory {
    Visit,
    Short,
    Video,
    Offerwall,
    Cpi,
}

impl AdCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            AdCategory::Visit => "visit",
            AdCategory::Short => "short",
            AdCategory::Video => "video",
            AdCategory::Offerwall => "offerwall",
            AdCategory::Cpi => "cpi",
        }
    }
}

impl fmt::Display for AdCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AdCategory {
    type Err = UnknownTag;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "visit" => Ok(AdCategory::Visit),
            "short" => Ok(AdCategory::Short),
            "video" => Ok(AdCategory::Video),
            "offerwall" => Ok(AdCategory::Offerwall),
            "cpi" => Ok(AdCategory::Cpi),
            other => Err(UnknownTag {
                kind: "ad category",
                value: other.to_string(),
            }),
        }
    }
}

/// Whether an ad may currently be watched
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AdStatus {
    Active,
    Inactive,
}

impl AdStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            AdStatus::Active => "active",
            AdStatus::Inactive => "inactive",
        }
    }
}

impl FromStr for AdStatus {
    type Err = UnknownTag;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "active" => Ok(AdStatus::Active),
            "inactive" => Ok(AdStatus::Inactive),
            other => Err(UnknownTag {
                kind: "ad status",
                value: other.to_string(),
            }),
        }
    }
}

/// Catalog entry. Read-only to the watch engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ad {
    pub id: AdId,
    pub title: String,
    pub category: AdCategory,
    /// Credited on every completed view
    pub reward: Amount,
    /// Required watch time in seconds
    #[serde(rename = "duration")]
    pub duration_secs: u32,
    /// Reserved. Carried through the catalog, never enforced.
    pub max_show: u32,
    pub status: AdStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
}

impl Ad {
    pub fn is_active(&self) -> bool {
        self.status == AdStatus::Active
    }

    pub fn required_duration(&self) -> Duration {
        Duration::from_secs(u64::from(self.duration_secs))
    }
}

/// How watch-session start times are held between start and complete
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionMode {
    /// One database row per attempt
    #[default]
    Durable,
    /// Short-lived in-memory entry keyed by client token
    Ephemeral,
    /// Caller reports start time and watched duration
    ClaimedTiming,
}

impl SessionMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionMode::Durable => "durable",
            SessionMode::Ephemeral => "ephemeral",
            SessionMode::ClaimedTiming => "claimed_timing",
        }
    }
}
