//! Login, code exchange, and status routes.

use axum::{
    Json,
    body::Bytes,
    extract::State,
    http::{HeaderMap, header},
    response::Html,
};
use chrono::{DateTime, Utc};
use oaproxy_auth::PkceSession;
use oaproxy_types::Error;
use serde::Deserialize;
use serde_json::{Value, json};
use std::sync::Arc;

use crate::{AppState, error::ApiError};

#[derive(Debug, Deserialize)]
struct ExchangeBody {
    code: String,
}

/// Handles `GET /auth/login`.
///
/// Starts a PKCE session (superseding any pending one) and returns a page
/// with the authorize URL and a paste-the-code form. Headless setups can
/// copy the URL from the page or use the CLI instead.
pub async fn login(State(state): State<Arc<AppState>>) -> Html<String> {
    let session = PkceSession::generate();
    let authorize_url = state.oauth.authorize_url(&session);
    *state.login.lock().await = Some(session);

    Html(format!(
        r#"<!doctype html>
<html>
<head><title>Connect Anthropic account</title></head>
<body>
<h1>Connect your Anthropic account</h1>
<p>1. Open <a href="{authorize_url}" target="_blank">this authorization page</a> and approve access.</p>
<p>2. Paste the code you are given (it looks like <code>code#state</code>) below.</p>
<form method="post" action="/auth/exchange">
  <input type="text" name="code" size="80" autocomplete="off">
  <button type="submit">Exchange</button>
</form>
</body>
</html>
"#
    ))
}

/// Handles `POST /auth/exchange`.
///
/// Accepts `{"code": "..."}` JSON or a `code=...` form post; the value may
/// carry a `#state` fragment. Consumes the pending login session exactly
/// once.
///
/// # Errors
///
/// 400 when no login is pending, the body is malformed, or the state does
/// not match; 502 when the token endpoint rejects the code.
pub async fn exchange(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<Value>, ApiError> {
    let code = parse_exchange_body(&headers, &body)?;

    let session = state
        .login
        .lock()
        .await
        .take()
        .ok_or_else(|| Error::InvalidRequest("no login in progress; start at /auth/login".into()))?;

    let credential = state.oauth.exchange(&session, &code).await?;
    state.credentials.install(credential).await?;
    Ok(Json(json!({"ok": true})))
}

fn parse_exchange_body(headers: &HeaderMap, body: &Bytes) -> Result<String, ApiError> {
    let content_type = headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("");
    let parsed: ExchangeBody = if content_type.contains("json") {
        serde_json::from_slice(body)
            .map_err(|e| Error::InvalidRequest(format!("invalid exchange body: {e}")))?
    } else {
        serde_urlencoded::from_bytes(body)
            .map_err(|e| Error::InvalidRequest(format!("invalid exchange body: {e}")))?
    };
    if parsed.code.trim().is_empty() {
        return Err(Error::InvalidRequest("'code' must not be empty".into()).into());
    }
    Ok(parsed.code)
}

/// Handles `GET /auth/status`. Never returns token material.
pub async fn status(State(state): State<Arc<AppState>>) -> Json<Value> {
    let status = state.credentials.status().await;
    let expires_at = status
        .expires_at
        .and_then(|secs| DateTime::<Utc>::from_timestamp(secs as i64, 0))
        .map(|dt| dt.to_rfc3339());
    Json(json!({
        "present": status.present,
        "expires_at": expires_at,
        "expired": status.expired,
    }))
}
