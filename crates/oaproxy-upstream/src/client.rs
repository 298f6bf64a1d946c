//! Anthropic Messages API client.
//!
//! Attaches the bearer and the `anthropic-*` headers, and applies the 401
//! policy: on the first 401 the cached token is invalidated and the request
//! retried exactly once with a freshly refreshed bearer; a second 401
//! surfaces as an auth failure. Other non-2xx statuses are preserved for
//! passthrough.

use oaproxy_auth::CredentialManager;
use oaproxy_types::{Error, MessagesResponse, Result};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;

/// User-Agent the OAuth credential expects to see.
const USER_AGENT: &str = "claude-cli/1.0.113 (external, cli)";

/// Endpoint and header configuration for the upstream.
#[derive(Debug, Clone)]
pub struct UpstreamSettings {
    /// Base URL for the Messages API.
    pub api_base: String,
    /// Value of the `anthropic-version` header.
    pub anthropic_version: String,
    /// Comma-joined value of the `anthropic-beta` header.
    pub anthropic_beta: String,
    /// Connect timeout. No total deadline is set so streaming responses are
    /// never cut off mid-flight.
    pub connect_timeout: Duration,
}

/// HTTP client for `POST {api_base}/v1/messages`.
pub struct UpstreamClient {
    http: reqwest::Client,
    credentials: Arc<CredentialManager>,
    settings: UpstreamSettings,
}

impl UpstreamClient {
    /// Build the client with the configured connect timeout.
    ///
    /// # Errors
    ///
    /// [`Error::Config`] if the underlying HTTP client cannot be constructed.
    pub fn new(credentials: Arc<CredentialManager>, settings: UpstreamSettings) -> Result<Self> {
        let http = reqwest::Client::builder()
            .connect_timeout(settings.connect_timeout)
            .build()
            .map_err(|e| Error::Config(e.to_string()))?;
        Ok(Self {
            http,
            credentials,
            settings,
        })
    }

    fn messages_url(&self) -> String {
        format!(
            "{}/v1/messages",
            self.settings.api_base.trim_end_matches('/')
        )
    }

    /// Merge client-supplied beta flags into the configured list,
    /// first-occurrence order preserved, duplicates dropped.
    fn beta_header(&self, client_beta: Option<&str>) -> String {
        let mut betas: Vec<&str> = self
            .settings
            .anthropic_beta
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .collect();
        if let Some(extra) = client_beta {
            for beta in extra.split(',').map(str::trim).filter(|s| !s.is_empty()) {
                if !betas.contains(&beta) {
                    betas.push(beta);
                }
            }
        }
        betas.join(",")
    }

    async fn post<B>(
        &self,
        body: &B,
        token: &str,
        stream: bool,
        client_beta: Option<&str>,
    ) -> Result<reqwest::Response>
    where
        B: Serialize + Sync + ?Sized,
    {
        let accept = if stream {
            "text/event-stream"
        } else {
            "application/json"
        };
        let resp = self
            .http
            .post(self.messages_url())
            .header("authorization", format!("Bearer {token}"))
            .header("anthropic-version", &self.settings.anthropic_version)
            .header("anthropic-beta", self.beta_header(client_beta))
            .header("anthropic-dangerous-direct-browser-access", "true")
            .header("x-app", "cli")
            .header("user-agent", USER_AGENT)
            .header("content-type", "application/json")
            .header("accept", accept)
            .json(body)
            .send()
            .await
            .map_err(|e| Error::Unreachable(e.to_string()))?;

        if let Some(id) = resp
            .headers()
            .get("request-id")
            .and_then(|v| v.to_str().ok())
        {
            tracing::debug!(status = %resp.status(), request_id = %id, "upstream response");
        }
        Ok(resp)
    }

    /// Send a request under the 401 policy and hand back the raw response,
    /// whatever its status.
    ///
    /// # Errors
    ///
    /// [`Error::NeedsLogin`] when no bearer can be produced,
    /// [`Error::AuthExpired`] when the upstream rejects a refreshed bearer,
    /// [`Error::Unreachable`] on transport failure.
    pub async fn forward<B>(
        &self,
        body: &B,
        stream: bool,
        client_beta: Option<&str>,
    ) -> Result<reqwest::Response>
    where
        B: Serialize + Sync + ?Sized,
    {
        let token = self.credentials.current().await?;
        let resp = self.post(body, &token, stream, client_beta).await?;
        if resp.status() != reqwest::StatusCode::UNAUTHORIZED {
            return Ok(resp);
        }

        tracing::info!("upstream returned 401; refreshing token and retrying once");
        self.credentials.invalidate().await;
        let token = self.credentials.current().await?;
        let resp = self.post(body, &token, stream, client_beta).await?;
        if resp.status() == reqwest::StatusCode::UNAUTHORIZED {
            return Err(Error::AuthExpired);
        }
        Ok(resp)
    }

    /// Non-streaming call, parsed into the typed response shape.
    ///
    /// # Errors
    ///
    /// [`Error::Upstream`] for non-2xx statuses (status, body, and
    /// `retry-after` preserved), plus everything [`forward`] can return.
    ///
    /// [`forward`]: Self::forward
    pub async fn send_nonstream<B>(
        &self,
        body: &B,
        client_beta: Option<&str>,
    ) -> Result<MessagesResponse>
    where
        B: Serialize + Sync + ?Sized,
    {
        let resp = self.forward(body, false, client_beta).await?;
        let resp = error_for_status(resp).await?;
        resp.json()
            .await
            .map_err(|e| Error::Unreachable(format!("invalid upstream response body: {e}")))
    }

    /// Streaming call; the caller consumes the SSE byte stream.
    ///
    /// # Errors
    ///
    /// Same as [`send_nonstream`].
    ///
    /// [`send_nonstream`]: Self::send_nonstream
    pub async fn send_stream<B>(
        &self,
        body: &B,
        client_beta: Option<&str>,
    ) -> Result<reqwest::Response>
    where
        B: Serialize + Sync + ?Sized,
    {
        let resp = self.forward(body, true, client_beta).await?;
        error_for_status(resp).await
    }
}

async fn error_for_status(resp: reqwest::Response) -> Result<reqwest::Response> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }
    let retry_after = resp
        .headers()
        .get("retry-after")
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);
    let body = resp.text().await.unwrap_or_default();
    Err(Error::Upstream {
        status: status.as_u16(),
        body,
        retry_after,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{
        Json, Router,
        http::{HeaderMap, StatusCode},
        routing::post,
    };
    use oaproxy_auth::{OAuthClient, OAuthSettings};
    use oaproxy_store::InMemoryTokenStore;
    use oaproxy_types::{Credential, unix_now};
    use serde_json::{Value, json};
    use std::sync::atomic::{AtomicUsize, Ordering};

    async fn spawn(app: Router) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{addr}")
    }

    fn credential(access: &str, expires_at: u64) -> Credential {
        Credential {
            access_token: access.into(),
            refresh_token: "R".into(),
            expires_at,
        }
    }

    fn client_for(base: &str, cred: Credential) -> UpstreamClient {
        let oauth = Arc::new(OAuthClient::new(
            reqwest::Client::new(),
            OAuthSettings {
                auth_base: base.into(),
                client_id: "client".into(),
                redirect_uri: "https://example.invalid/callback".into(),
                scope: "user:inference".into(),
            },
        ));
        let store = Arc::new(InMemoryTokenStore::with_credential(cred));
        let credentials = Arc::new(CredentialManager::new(store, oauth));
        UpstreamClient::new(
            credentials,
            UpstreamSettings {
                api_base: base.into(),
                anthropic_version: "2023-06-01".into(),
                anthropic_beta: "oauth-2025-04-20,claude-code-20250219".into(),
                connect_timeout: Duration::from_secs(5),
            },
        )
        .unwrap()
    }

    fn pong_body() -> Value {
        json!({
            "content": [{"type": "text", "text": "pong"}],
            "stop_reason": "end_turn",
            "usage": {"input_tokens": 10, "output_tokens": 1}
        })
    }

    #[tokio::test]
    async fn test_nonstream_success_with_required_headers() {
        let app = Router::new().route(
            "/v1/messages",
            post(|headers: HeaderMap, Json(body): Json<Value>| async move {
                assert_eq!(
                    headers.get("authorization").unwrap().to_str().unwrap(),
                    "Bearer live"
                );
                assert_eq!(
                    headers.get("anthropic-version").unwrap().to_str().unwrap(),
                    "2023-06-01"
                );
                assert!(
                    headers
                        .get("anthropic-beta")
                        .unwrap()
                        .to_str()
                        .unwrap()
                        .contains("oauth-2025-04-20")
                );
                assert_eq!(body["model"], "claude-sonnet-4-0");
                Json(pong_body())
            }),
        );
        let base = spawn(app).await;
        let client = client_for(&base, credential("live", unix_now() + 3600));

        let resp = client
            .send_nonstream(&json!({"model": "claude-sonnet-4-0", "messages": []}), None)
            .await
            .unwrap();
        assert_eq!(resp.usage.input_tokens, 10);
        assert_eq!(resp.stop_reason.as_deref(), Some("end_turn"));
    }

    #[tokio::test]
    async fn test_expired_credential_transparently_refreshed() {
        // A single inbound call with a stale credential: refresh once, then
        // exactly one messages call that carries the fresh bearer.
        let messages = Arc::new(AtomicUsize::new(0));
        let messages_for_handler = messages.clone();
        let app = Router::new()
            .route(
                "/v1/oauth/token",
                post(|| async {
                    Json(json!({
                        "access_token": "fresh",
                        "refresh_token": "R2",
                        "expires_in": 3600
                    }))
                }),
            )
            .route(
                "/v1/messages",
                post(move |headers: HeaderMap| {
                    let messages = messages_for_handler.clone();
                    async move {
                        messages.fetch_add(1, Ordering::SeqCst);
                        assert_eq!(
                            headers.get("authorization").unwrap().to_str().unwrap(),
                            "Bearer fresh"
                        );
                        Json(pong_body())
                    }
                }),
            );
        let base = spawn(app).await;
        let client = client_for(&base, credential("stale", unix_now().saturating_sub(10)));

        client
            .send_nonstream(&json!({"model": "m", "messages": []}), None)
            .await
            .unwrap();
        assert_eq!(messages.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_401_retried_once_with_refreshed_bearer() {
        let messages = Arc::new(AtomicUsize::new(0));
        let messages_for_handler = messages.clone();
        let app = Router::new()
            .route(
                "/v1/oauth/token",
                post(|| async {
                    Json(json!({
                        "access_token": "fresh",
                        "refresh_token": "R2",
                        "expires_in": 3600
                    }))
                }),
            )
            .route(
                "/v1/messages",
                post(move |headers: HeaderMap| {
                    let messages = messages_for_handler.clone();
                    async move {
                        let call = messages.fetch_add(1, Ordering::SeqCst);
                        if call == 0 {
                            // Revoked-but-unexpired bearer.
                            (StatusCode::UNAUTHORIZED, Json(json!({"error": "revoked"})))
                        } else {
                            assert_eq!(
                                headers.get("authorization").unwrap().to_str().unwrap(),
                                "Bearer fresh"
                            );
                            (StatusCode::OK, Json(pong_body()))
                        }
                    }
                }),
            );
        let base = spawn(app).await;
        let client = client_for(&base, credential("revoked", unix_now() + 3600));

        let resp = client
            .send_nonstream(&json!({"model": "m", "messages": []}), None)
            .await
            .unwrap();
        assert_eq!(resp.usage.output_tokens, 1);
        assert_eq!(messages.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_second_401_surfaces_auth_expired() {
        let app = Router::new()
            .route(
                "/v1/oauth/token",
                post(|| async {
                    Json(json!({
                        "access_token": "fresh",
                        "refresh_token": "R2",
                        "expires_in": 3600
                    }))
                }),
            )
            .route(
                "/v1/messages",
                post(|| async { (StatusCode::UNAUTHORIZED, Json(json!({"error": "nope"}))) }),
            );
        let base = spawn(app).await;
        let client = client_for(&base, credential("bad", unix_now() + 3600));

        let err = client
            .send_nonstream(&json!({"model": "m"}), None)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::AuthExpired));
    }

    #[tokio::test]
    async fn test_refresh_failure_means_no_upstream_call() {
        let messages = Arc::new(AtomicUsize::new(0));
        let messages_for_handler = messages.clone();
        let app = Router::new()
            .route(
                "/v1/oauth/token",
                post(|| async { (StatusCode::BAD_REQUEST, Json(json!({"error": "invalid_grant"}))) }),
            )
            .route(
                "/v1/messages",
                post(move || {
                    let messages = messages_for_handler.clone();
                    async move {
                        messages.fetch_add(1, Ordering::SeqCst);
                        Json(pong_body())
                    }
                }),
            );
        let base = spawn(app).await;
        let client = client_for(&base, credential("stale", unix_now().saturating_sub(10)));

        let err = client
            .send_nonstream(&json!({"model": "m"}), None)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::NeedsLogin));
        assert_eq!(messages.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_429_passed_through_with_retry_after() {
        let app = Router::new().route(
            "/v1/messages",
            post(|| async {
                (
                    StatusCode::TOO_MANY_REQUESTS,
                    [("retry-after", "30")],
                    Json(json!({"error": {"type": "rate_limit_error"}})),
                )
            }),
        );
        let base = spawn(app).await;
        let client = client_for(&base, credential("live", unix_now() + 3600));

        let err = client
            .send_nonstream(&json!({"model": "m"}), None)
            .await
            .unwrap_err();
        match err {
            Error::Upstream {
                status,
                body,
                retry_after,
            } => {
                assert_eq!(status, 429);
                assert!(body.contains("rate_limit_error"));
                assert_eq!(retry_after.as_deref(), Some("30"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn test_client_beta_header_merged() {
        let app = Router::new().route(
            "/v1/messages",
            post(|headers: HeaderMap| async move {
                let beta = headers.get("anthropic-beta").unwrap().to_str().unwrap();
                assert_eq!(
                    beta,
                    "oauth-2025-04-20,claude-code-20250219,context-1m-2025-08-07"
                );
                Json(pong_body())
            }),
        );
        let base = spawn(app).await;
        let client = client_for(&base, credential("live", unix_now() + 3600));

        client
            .send_nonstream(
                &json!({"model": "m"}),
                // One duplicate, one new flag.
                Some("claude-code-20250219, context-1m-2025-08-07"),
            )
            .await
            .unwrap();
    }
}
