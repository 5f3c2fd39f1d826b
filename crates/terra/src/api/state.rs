//! Application state shared across handlers.

use std::sync::Arc;

use crate::upstream::UpstreamClient;

/// Application state shared across all handlers.
///
/// The relay is stateless across calls; this only carries the immutable
/// pieces built once at startup.
#[derive(Clone, Debug)]
pub struct AppState {
    /// Client for the upstream chat-completion endpoint.
    pub upstream: Arc<UpstreamClient>,
    /// Origins allowed by the CORS layer. Empty means same-origin only.
    pub cors_origins: Vec<String>,
}

impl AppState {
    /// Create new application state.
    pub fn new(upstream: UpstreamClient, cors_origins: Vec<String>) -> Self {
        Self {
            upstream: Arc::new(upstream),
            cors_origins,
        }
    }
}
