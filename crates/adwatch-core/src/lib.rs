//! Watch engine for adwatchd
//!
//! This crate holds the rules of the service:
//! - Watch session tracking (durable, ephemeral, claimed timing)
//! - Cooldown and rate-limit checks against view history
//! - The earnings ledger
//! - The start -> complete -> credit state machine

mod engine;
mod error;
mod history;
mod ledger;
mod retry;
mod session;

pub use engine::*;
pub use error::*;
pub use history::*;
pub use ledger::*;
pub use session::*;
