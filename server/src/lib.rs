//! HTTP API over the loopdesk services.

pub mod auth;
pub mod error;
pub mod handlers;
pub mod response;
pub mod router;
pub mod state;
pub mod telemetry;

pub use router::build_router;
pub use state::AppState;
