//! Inference handlers: the translated OpenAI endpoint and the native
//! Anthropic passthrough.

use axum::{
    Json,
    body::{Body, Bytes},
    extract::State,
    http::{HeaderMap, StatusCode, header},
    response::{IntoResponse, Response},
};
use futures_util::StreamExt as _;
use oaproxy_translate::{anthropic_to_openai, bridge_stream, openai_to_anthropic};
use oaproxy_types::{ChatCompletionRequest, Error};
use serde_json::Value;
use std::sync::Arc;

use crate::{AppState, error::ApiError};

fn client_beta(headers: &HeaderMap) -> Option<&str> {
    headers.get("anthropic-beta").and_then(|v| v.to_str().ok())
}

/// Handles `POST /v1/chat/completions`.
///
/// Translates the OpenAI request into the Anthropic Messages shape, forwards
/// it, and returns either a translated JSON completion or an SSE stream of
/// translated chunks.
///
/// # Errors
///
/// Returns [`ApiError`] on malformed payloads, missing credentials, or
/// upstream failures.
pub async fn chat_completions(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Response, ApiError> {
    // Parsed by hand so even malformed bodies get the OpenAI error shape.
    let request: ChatCompletionRequest =
        serde_json::from_slice(&body).map_err(|e| Error::InvalidRequest(e.to_string()))?;

    let translated = openai_to_anthropic(request, &state.request_defaults())?;
    let beta = client_beta(&headers);

    if translated.stream {
        let upstream = state.upstream.send_stream(&translated, beta).await?;
        let bytes = upstream
            .bytes_stream()
            .map(|chunk| chunk.map_err(|e| Error::Unreachable(e.to_string())));
        let frames = bridge_stream(bytes, translated.model);
        Ok(Response::builder()
            .status(StatusCode::OK)
            .header(header::CONTENT_TYPE, "text/event-stream")
            .header(header::CACHE_CONTROL, "no-cache")
            .header(header::CONNECTION, "keep-alive")
            .body(Body::from_stream(frames))
            .expect("valid response"))
    } else {
        let response = state.upstream.send_nonstream(&translated, beta).await?;
        Ok(Json(anthropic_to_openai(&response, &translated.model)).into_response())
    }
}

/// Handles `POST /v1/messages` — Anthropic native format passthrough.
///
/// The body is forwarded verbatim with the same bearer acquisition and 401
/// retry as the translated path; the upstream status, content type, and body
/// are mirrored back, including non-2xx responses.
///
/// # Errors
///
/// Returns [`ApiError`] only for auth and transport failures; upstream HTTP
/// errors pass through as responses.
pub async fn messages_passthrough(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Response, ApiError> {
    let body: Value =
        serde_json::from_slice(&body).map_err(|e| Error::InvalidRequest(e.to_string()))?;
    let stream = body
        .get("stream")
        .and_then(Value::as_bool)
        .unwrap_or(false);

    let upstream = state
        .upstream
        .forward(&body, stream, client_beta(&headers))
        .await?;

    let status = upstream.status();
    let content_type = upstream.headers().get(header::CONTENT_TYPE).cloned();
    let mut builder = Response::builder().status(status);
    if let Some(content_type) = content_type {
        builder = builder.header(header::CONTENT_TYPE, content_type);
    }

    if stream && status.is_success() {
        let bytes = upstream
            .bytes_stream()
            .map(|chunk| chunk.map_err(std::io::Error::other));
        Ok(builder
            .header(header::CACHE_CONTROL, "no-cache")
            .body(Body::from_stream(bytes))
            .expect("valid response"))
    } else {
        let bytes = upstream
            .bytes()
            .await
            .map_err(|e| Error::Unreachable(e.to_string()))?;
        Ok(builder.body(Body::from(bytes)).expect("valid response"))
    }
}
