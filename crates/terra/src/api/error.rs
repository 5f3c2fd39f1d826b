//! API errors.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use thiserror::Error;

use terra_protocol::ErrorBody;

use crate::upstream::UpstreamError;

/// The one message clients ever see for a relay failure. Upstream detail
/// (status, endpoint, credential) stays server-side.
pub const RELAY_FAILURE_MESSAGE: &str = "Failed to fetch AI response";

/// API errors.
#[derive(Debug, Error)]
pub enum ApiError {
    /// Any failure while fetching the upstream completion.
    #[error("failed to fetch AI response: {0}")]
    Upstream(#[from] UpstreamError),
}

pub type ApiResult<T> = Result<T, ApiError>;

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let Self::Upstream(_) = self;
        let body = Json(ErrorBody {
            error: RELAY_FAILURE_MESSAGE.to_string(),
        });
        (StatusCode::INTERNAL_SERVER_ERROR, body).into_response()
    }
}
