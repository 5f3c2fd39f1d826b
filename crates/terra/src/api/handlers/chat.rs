//! Chat relay handler.

use axum::{Json, extract::State};
use serde_json::Value;
use tracing::{debug, error, info, instrument};

use terra_protocol::ChatRequest;

use crate::api::error::ApiResult;
use crate::api::state::AppState;

/// Relay one message sequence to the upstream completion endpoint.
///
/// The relay is authoritative for model and sampling parameters: anything
/// the client sent besides `messages` is discarded. On success the raw
/// upstream JSON is returned unmodified; extraction is the client's job.
/// Every failure collapses into one 500 shape so upstream detail never
/// leaks to the client.
#[instrument(skip(state, request), fields(turns = request.messages.len()))]
pub async fn proxy_completion(
    State(state): State<AppState>,
    Json(request): Json<ChatRequest>,
) -> ApiResult<Json<Value>> {
    if request.has_overrides() {
        debug!("ignoring client-supplied model/sampling overrides");
    }

    let turns = request.messages.len();
    match state.upstream.complete(request.messages).await {
        Ok(body) => {
            info!(turns, "completion relayed");
            Ok(Json(body))
        }
        Err(err) => {
            error!(turns, error = %err, "failed to fetch AI response");
            Err(err.into())
        }
    }
}
