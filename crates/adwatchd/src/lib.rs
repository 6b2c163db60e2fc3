//! adwatchd HTTP service
//!
//! Wires the watch engine to an axum router:
//! - Shared application state and clock
//! - Caller identity from request headers
//! - Handlers for the watch, catalog and earnings routes
//! - The structured error envelope

mod error;
mod extract;
mod handlers;
mod routes;
mod state;

pub use error::*;
pub use extract::*;
pub use routes::*;
pub use state::*;
