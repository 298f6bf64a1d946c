//! Unified error type for the oaproxy workspace.

use thiserror::Error;

/// Enumerates all error kinds that can occur across oaproxy crates.
#[derive(Debug, Error)]
pub enum Error {
    /// Client payload missing or ill-formed.
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// No usable credential: nothing stored, or the refresh grant failed.
    #[error("not authenticated; open /auth/login to connect an Anthropic account")]
    NeedsLogin,

    /// The token endpoint rejected the authorization code exchange.
    #[error("authorization code rejected: {0}")]
    AuthCodeRejected(String),

    /// The token endpoint rejected the refresh grant.
    #[error("token refresh failed: {0}")]
    RefreshFailed(String),

    /// The upstream returned 401 even after a forced refresh.
    #[error("upstream rejected a freshly refreshed credential; re-authenticate via /auth/login")]
    AuthExpired,

    /// Non-2xx from the upstream other than the retried 401. The status and
    /// body are preserved so they can be passed through to the client.
    #[error("upstream error: status {status}")]
    Upstream {
        status: u16,
        body: String,
        retry_after: Option<String>,
    },

    /// Network-level failure reaching the upstream.
    #[error("upstream unreachable: {0}")]
    Unreachable(String),

    /// Credential file could not be read, written, or parsed.
    #[error("credential store error: {0}")]
    Store(String),

    /// Configuration loading or validation error.
    #[error("configuration error: {0}")]
    Config(String),

    /// JSON serialization or deserialization error.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl Error {
    /// Returns `true` if the caller should be redirected to the login flow.
    #[must_use]
    pub fn needs_login(&self) -> bool {
        matches!(self, Self::NeedsLogin | Self::AuthExpired)
    }
}

/// Convenience alias used throughout the workspace.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_needs_login_mentions_login_route() {
        let msg = Error::NeedsLogin.to_string();
        assert!(msg.contains("/auth/login"));
    }

    #[test]
    fn test_auth_expired_mentions_login_route() {
        assert!(Error::AuthExpired.to_string().contains("/auth/login"));
    }

    #[test]
    fn test_upstream_display_includes_status() {
        let err = Error::Upstream {
            status: 429,
            body: "rate limited".into(),
            retry_after: Some("30".into()),
        };
        assert!(err.to_string().contains("429"));
    }

    #[test]
    fn test_serialization_error_conversion() {
        let json_err = serde_json::from_str::<serde_json::Value>("not json").unwrap_err();
        let err: Error = json_err.into();
        assert!(matches!(err, Error::Serialization(_)));
    }

    #[test]
    fn test_needs_login_helper() {
        assert!(Error::NeedsLogin.needs_login());
        assert!(Error::AuthExpired.needs_login());
        assert!(!Error::InvalidRequest("x".into()).needs_login());
    }
}
