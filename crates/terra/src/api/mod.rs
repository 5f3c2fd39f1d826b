//! HTTP API module.
//!
//! Provides the chat relay endpoint and the health check.

mod error;
pub mod handlers;
mod routes;
mod state;

pub use error::{ApiError, ApiResult, RELAY_FAILURE_MESSAGE};
pub use routes::create_router;
pub use state::AppState;
