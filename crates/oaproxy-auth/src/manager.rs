//! Credential lifecycle manager.
//!
//! Serves valid bearers to the upstream client, refreshing transparently.
//! The cache lock is held across the refresh await, so at most one refresh is
//! in flight: concurrent callers queue on the lock and, once the winner has
//! installed a fresh credential, find it valid and return without issuing
//! their own refresh.

use crate::OAuthClient;
use oaproxy_types::{Credential, Error, Result, TokenStore};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;

/// After a failed refresh, callers inside this window fail fast instead of
/// re-hitting the token endpoint.
const FAIL_FAST_WINDOW: Duration = Duration::from_secs(5);

/// In-memory cache of the current credential plus refresh bookkeeping.
#[derive(Default)]
struct Cache {
    credential: Option<Credential>,
    /// Whether the store has been consulted since startup.
    primed: bool,
    last_failure: Option<Instant>,
}

/// Owns the current credential and its refresh schedule.
pub struct CredentialManager {
    store: Arc<dyn TokenStore>,
    oauth: Arc<OAuthClient>,
    cache: Mutex<Cache>,
}

/// Secret-free snapshot for `/auth/status`.
#[derive(Debug, Clone, Copy)]
pub struct CredentialStatus {
    pub present: bool,
    pub expires_at: Option<u64>,
    pub expired: bool,
}

impl CredentialManager {
    pub fn new(store: Arc<dyn TokenStore>, oauth: Arc<OAuthClient>) -> Self {
        Self {
            store,
            oauth,
            cache: Mutex::new(Cache::default()),
        }
    }

    /// Return a bearer valid for use right now, refreshing if necessary.
    ///
    /// # Errors
    ///
    /// [`Error::NeedsLogin`] when no credential is stored or the refresh
    /// grant was rejected.
    pub async fn current(&self) -> Result<String> {
        let mut cache = self.cache.lock().await;
        self.prime(&mut cache).await;

        let Some(credential) = cache.credential.clone() else {
            return Err(Error::NeedsLogin);
        };
        if !credential.is_expired() {
            return Ok(credential.access_token);
        }

        if let Some(failed_at) = cache.last_failure {
            if failed_at.elapsed() < FAIL_FAST_WINDOW {
                return Err(Error::NeedsLogin);
            }
        }

        match self.oauth.refresh(&credential.refresh_token).await {
            Ok(fresh) => {
                cache.last_failure = None;
                cache.credential = Some(fresh.clone());
                if let Err(e) = self.store.save(&fresh).await {
                    tracing::warn!(error = %e, "failed to persist refreshed credential");
                }
                tracing::info!("access token refreshed");
                Ok(fresh.access_token)
            }
            Err(e) => {
                tracing::warn!(error = %e, "token refresh failed");
                cache.last_failure = Some(Instant::now());
                Err(Error::NeedsLogin)
            }
        }
    }

    /// Replace the cached credential and persist it.
    ///
    /// # Errors
    ///
    /// Propagates store failures; the cache is updated regardless.
    pub async fn install(&self, credential: Credential) -> Result<()> {
        let mut cache = self.cache.lock().await;
        cache.primed = true;
        cache.last_failure = None;
        cache.credential = Some(credential.clone());
        self.store.save(&credential).await
    }

    /// Mark the cached access token expired so the next [`current`] call is
    /// forced through a refresh. Called after an upstream 401.
    ///
    /// [`current`]: Self::current
    pub async fn invalidate(&self) {
        let mut cache = self.cache.lock().await;
        if let Some(credential) = cache.credential.as_mut() {
            credential.expires_at = 0;
        }
        cache.last_failure = None;
    }

    /// Drop the credential from cache and storage.
    ///
    /// # Errors
    ///
    /// Propagates store failures.
    pub async fn clear(&self) -> Result<()> {
        let mut cache = self.cache.lock().await;
        cache.primed = true;
        cache.credential = None;
        cache.last_failure = None;
        self.store.clear().await
    }

    /// Presence and expiry without exposing token material.
    pub async fn status(&self) -> CredentialStatus {
        let mut cache = self.cache.lock().await;
        self.prime(&mut cache).await;
        match &cache.credential {
            None => CredentialStatus {
                present: false,
                expires_at: None,
                expired: false,
            },
            Some(c) => CredentialStatus {
                present: true,
                expires_at: Some(c.expires_at),
                expired: c.is_expired(),
            },
        }
    }

    async fn prime(&self, cache: &mut Cache) {
        if cache.primed {
            return;
        }
        cache.primed = true;
        match self.store.load().await {
            Ok(credential) => cache.credential = credential,
            // A corrupt store reads as "not logged in" rather than an outage.
            Err(e) => tracing::warn!(error = %e, "ignoring unreadable credential store"),
        }
    }
}
