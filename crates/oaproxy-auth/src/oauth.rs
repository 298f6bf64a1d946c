//! OAuth 2.0 Authorization Code + PKCE (S256) flow against the Anthropic
//! OAuth endpoints.
//!
//! The redirect URI is an Anthropic-hosted page that displays the code for
//! the user to paste back, so no local callback listener is needed and the
//! pasted value may arrive as `code#state`.

use crate::pkce::PkceSession;
use oaproxy_types::{Credential, Error, Result};
use serde::Deserialize;

/// OAuth endpoint and client configuration. All values come from the gateway
/// configuration; nothing secret is compiled in.
#[derive(Debug, Clone)]
pub struct OAuthSettings {
    /// Base URL serving `/oauth/authorize` and `/v1/oauth/token`.
    pub auth_base: String,
    /// Public OAuth client identifier.
    pub client_id: String,
    /// Redirect URI registered to the client id.
    pub redirect_uri: String,
    /// Space-joined scope string.
    pub scope: String,
}

/// Client for the authorize-URL / code-exchange / refresh operations.
pub struct OAuthClient {
    http: reqwest::Client,
    settings: OAuthSettings,
}

/// Token endpoint success payload.
#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    refresh_token: String,
    #[serde(default = "default_expires_in")]
    expires_in: u64,
}

fn default_expires_in() -> u64 {
    3600
}

impl TokenResponse {
    fn into_credential(self) -> Credential {
        Credential::from_expires_in(self.access_token, self.refresh_token, self.expires_in)
    }
}

impl OAuthClient {
    pub fn new(http: reqwest::Client, settings: OAuthSettings) -> Self {
        Self { http, settings }
    }

    fn token_url(&self) -> String {
        format!("{}/v1/oauth/token", self.settings.auth_base.trim_end_matches('/'))
    }

    /// Build the browser authorization URL for a login session.
    #[must_use]
    pub fn authorize_url(&self, session: &PkceSession) -> String {
        let query = serde_urlencoded::to_string([
            ("code", "true"),
            ("client_id", self.settings.client_id.as_str()),
            ("response_type", "code"),
            ("redirect_uri", self.settings.redirect_uri.as_str()),
            ("scope", self.settings.scope.as_str()),
            ("code_challenge", session.challenge.as_str()),
            ("code_challenge_method", "S256"),
            ("state", session.state.as_str()),
        ])
        .expect("static query pairs encode");
        format!(
            "{}/oauth/authorize?{query}",
            self.settings.auth_base.trim_end_matches('/')
        )
    }

    /// Exchange a pasted authorization code for a credential.
    ///
    /// The pasted value may be `code#state`; when the fragment is present its
    /// state must match the session's.
    ///
    /// # Errors
    ///
    /// [`Error::InvalidRequest`] on a state mismatch, [`Error::AuthCodeRejected`]
    /// when the token endpoint answers non-2xx.
    pub async fn exchange(&self, session: &PkceSession, pasted: &str) -> Result<Credential> {
        let (code, state) = split_pasted_code(pasted);
        if let Some(state) = state {
            if state != session.state {
                return Err(Error::InvalidRequest(
                    "state in pasted code does not match the login session".into(),
                ));
            }
        }

        let body = serde_json::json!({
            "grant_type": "authorization_code",
            "code": code,
            "redirect_uri": self.settings.redirect_uri,
            "client_id": self.settings.client_id,
            "code_verifier": session.verifier,
        });

        let resp = self
            .http
            .post(self.token_url())
            .header("content-type", "application/json")
            .json(&body)
            .send()
            .await
            .map_err(|e| Error::Unreachable(e.to_string()))?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(Error::AuthCodeRejected(format!("{status}: {body}")));
        }

        let token: TokenResponse = resp
            .json()
            .await
            .map_err(|e| Error::AuthCodeRejected(format!("unparseable token response: {e}")))?;
        Ok(token.into_credential())
    }

    /// Mint a fresh credential from a refresh token.
    ///
    /// # Errors
    ///
    /// [`Error::RefreshFailed`] when the token endpoint answers non-2xx.
    pub async fn refresh(&self, refresh_token: &str) -> Result<Credential> {
        let body = serde_json::json!({
            "grant_type": "refresh_token",
            "refresh_token": refresh_token,
            "client_id": self.settings.client_id,
        });

        let resp = self
            .http
            .post(self.token_url())
            .header("content-type", "application/json")
            .json(&body)
            .send()
            .await
            .map_err(|e| Error::Unreachable(e.to_string()))?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(Error::RefreshFailed(format!("{status}: {body}")));
        }

        let token: TokenResponse = resp
            .json()
            .await
            .map_err(|e| Error::RefreshFailed(format!("unparseable token response: {e}")))?;
        Ok(token.into_credential())
    }
}

/// Split the user-pasted value into `(code, state)`. The Anthropic callback
/// page renders the two joined with `#`.
fn split_pasted_code(pasted: &str) -> (&str, Option<&str>) {
    let pasted = pasted.trim();
    match pasted.split_once('#') {
        Some((code, state)) => (code, Some(state)),
        None => (pasted, None),
    }
}
