//! The persisted OAuth credential and its expiry logic.

use serde::{Deserialize, Serialize};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Seconds shaved off the advertised token lifetime so a bearer is retired
/// locally before the upstream starts rejecting it.
const EXPIRY_SKEW_SECS: u64 = 60;

/// The access/refresh token pair with its absolute expiry instant.
///
/// All three fields travel together; this is exactly the JSON shape written
/// to the token file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credential {
    pub access_token: String,
    pub refresh_token: String,
    /// Unix seconds, already skew-adjusted at issuance.
    pub expires_at: u64,
}

impl Credential {
    /// Build a credential from a token-endpoint response, converting the
    /// relative `expires_in` into an absolute skew-adjusted instant.
    #[must_use]
    pub fn from_expires_in(
        access_token: impl Into<String>,
        refresh_token: impl Into<String>,
        expires_in: u64,
    ) -> Self {
        Self {
            access_token: access_token.into(),
            refresh_token: refresh_token.into(),
            expires_at: unix_now() + expires_in.saturating_sub(EXPIRY_SKEW_SECS),
        }
    }

    /// Whether the bearer should no longer be presented upstream.
    #[must_use]
    pub fn is_expired(&self) -> bool {
        unix_now() >= self.expires_at
    }
}

/// Current wall-clock time as unix seconds.
#[must_use]
pub fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or(Duration::ZERO)
        .as_secs()
}
