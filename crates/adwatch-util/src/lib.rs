//! Shared utilities for adwatchd
//!
//! This crate provides:
//! - ID types (UserId, AdId, SessionId)
//! - Fixed-point money (Amount)
//! - Clock access with mock time support
//! - Cooldown and sliding-window limit arithmetic
//! - Default paths for config and data directories

mod amount;
mod ids;
mod paths;
mod rate_limit;
mod time;

pub use amount::*;
pub use ids::*;
pub use paths::*;
pub use rate_limit::*;
pub use time::*;
