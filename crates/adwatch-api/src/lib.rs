//! Wire types for adwatchd
//!
//! This crate defines the stable contract between adwatchd and its callers:
//! - Catalog types (ads, categories, status)
//! - Watch request and response bodies
//! - The single structured error envelope
//! - Versioning

mod messages;
mod types;

pub use messages::*;
pub use types::*;

/// Current API version
pub const API_VERSION: u32 = 1;
