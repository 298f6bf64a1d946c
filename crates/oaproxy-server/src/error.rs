//! API error type that maps [`Error`] variants to HTTP responses.

use axum::{
    Json,
    body::Body,
    http::{StatusCode, header},
    response::{IntoResponse, Response},
};
use oaproxy_types::Error;
use serde_json::json;

/// Wrapper around [`Error`] that implements [`IntoResponse`] with the
/// OpenAI-style error object.
pub struct ApiError(pub Error);

fn classify(error: &Error) -> (StatusCode, &'static str) {
    match error {
        Error::InvalidRequest(_) => (StatusCode::BAD_REQUEST, "invalid_request_error"),
        Error::NeedsLogin | Error::AuthExpired | Error::RefreshFailed(_) => {
            (StatusCode::UNAUTHORIZED, "authentication_error")
        }
        Error::AuthCodeRejected(_) => (StatusCode::BAD_GATEWAY, "authentication_error"),
        Error::Unreachable(_) => (StatusCode::BAD_GATEWAY, "server_error"),
        Error::Upstream { .. }
        | Error::Store(_)
        | Error::Config(_)
        | Error::Serialization(_) => (StatusCode::INTERNAL_SERVER_ERROR, "server_error"),
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        match self.0 {
            // Upstream statuses and bodies pass through untouched so clients
            // see exactly what Anthropic said (e.g. a 429 with retry-after).
            Error::Upstream {
                status,
                body,
                retry_after,
            } => {
                let status =
                    StatusCode::from_u16(status).unwrap_or(StatusCode::BAD_GATEWAY);
                let mut builder = Response::builder()
                    .status(status)
                    .header(header::CONTENT_TYPE, "application/json");
                if let Some(retry_after) = retry_after {
                    builder = builder.header(header::RETRY_AFTER, retry_after);
                }
                match builder.body(Body::from(body)) {
                    Ok(resp) => resp,
                    Err(_) => StatusCode::BAD_GATEWAY.into_response(),
                }
            }
            error => {
                let (status, error_type) = classify(&error);
                (
                    status,
                    Json(json!({
                        "error": {
                            "message": error.to_string(),
                            "type": error_type,
                        }
                    })),
                )
                    .into_response()
            }
        }
    }
}

impl From<Error> for ApiError {
    fn from(e: Error) -> Self {
        Self(e)
    }
}
