//! HTTP gateway layer — axum router, route handlers, and error mapping.
//!
//! Exposes an OpenAI-compatible `/v1/chat/completions` endpoint, a native
//! `/v1/messages` passthrough, the login routes, a `/v1/models` listing, and
//! `/healthz`. Inbound `Authorization` headers are not validated; the server
//! binds to loopback only.

pub mod auth_routes;
pub mod chat;
pub mod error;
pub mod models;

pub use error::ApiError;

use axum::{
    Json, Router,
    extract::Request,
    middleware::{self, Next},
    response::Response,
    routing::{get, post},
};
use oaproxy_auth::{CredentialManager, OAuthClient, OAuthSettings, PkceSession};
use oaproxy_config::Config;
use oaproxy_translate::RequestDefaults;
use oaproxy_types::{Result, TokenStore};
use oaproxy_upstream::{UpstreamClient, UpstreamSettings};
use serde_json::{Value, json};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;

/// Shared application state passed to all route handlers.
pub struct AppState {
    /// Gateway configuration.
    pub config: Arc<Config>,
    /// Credential cache and refresh scheduler.
    pub credentials: Arc<CredentialManager>,
    /// OAuth endpoint client for the login routes.
    pub oauth: Arc<OAuthClient>,
    /// Anthropic Messages client.
    pub upstream: UpstreamClient,
    /// Single login slot; starting a new login replaces a pending session.
    pub login: Mutex<Option<PkceSession>>,
}

impl AppState {
    /// Wire up the state from configuration and a token store.
    ///
    /// # Errors
    ///
    /// Propagates upstream client construction failures.
    pub fn new(config: Config, store: Arc<dyn TokenStore>) -> Result<Arc<Self>> {
        let oauth = Arc::new(OAuthClient::new(
            reqwest::Client::new(),
            OAuthSettings {
                auth_base: config.auth_base.clone(),
                client_id: config.client_id.clone(),
                redirect_uri: config.redirect_uri.clone(),
                scope: config.scope.clone(),
            },
        ));
        let credentials = Arc::new(CredentialManager::new(store, oauth.clone()));
        let upstream = UpstreamClient::new(
            credentials.clone(),
            UpstreamSettings {
                api_base: config.api_base.clone(),
                anthropic_version: config.anthropic_version.clone(),
                anthropic_beta: config.anthropic_beta.clone(),
                connect_timeout: Duration::from_secs(config.connect_timeout_secs),
            },
        )?;
        Ok(Arc::new(Self {
            config: Arc::new(config),
            credentials,
            oauth,
            upstream,
            login: Mutex::new(None),
        }))
    }

    pub(crate) fn request_defaults(&self) -> RequestDefaults {
        RequestDefaults {
            model: self.config.default_model.clone(),
            max_tokens: self.config.default_max_tokens,
        }
    }
}

/// Build the full axum router.
///
/// Routes:
/// - GET  /healthz
/// - GET  /auth/login
/// - POST /auth/exchange
/// - GET  /auth/status
/// - POST /v1/chat/completions
/// - POST /v1/messages
/// - GET  /v1/models
pub fn make_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/auth/login", get(auth_routes::login))
        .route("/auth/exchange", post(auth_routes::exchange))
        .route("/auth/status", get(auth_routes::status))
        .route("/v1/chat/completions", post(chat::chat_completions))
        .route("/v1/messages", post(chat::messages_passthrough))
        .route("/v1/models", get(models::list_models))
        .layer(middleware::from_fn(log_requests))
        .with_state(state)
}

async fn healthz() -> Json<Value> {
    Json(json!({"ok": true}))
}

/// Logs method, path, status, and elapsed time for every request. Bodies and
/// auth material are never logged.
async fn log_requests(request: Request, next: Next) -> Response {
    let method = request.method().clone();
    let path = request.uri().path().to_string();
    let start = std::time::Instant::now();
    let response = next.run(request).await;
    tracing::info!(
        %method,
        path,
        status = response.status().as_u16(),
        elapsed_ms = start.elapsed().as_millis() as u64,
        "handled request"
    );
    response
}
