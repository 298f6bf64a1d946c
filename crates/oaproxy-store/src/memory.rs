//! In-memory credential store behind a `Mutex`.

use async_trait::async_trait;
use oaproxy_types::{Credential, Result, TokenStore};
use std::sync::Mutex;

/// An in-memory [`TokenStore`] for testing and ephemeral use.
pub struct InMemoryTokenStore {
    slot: Mutex<Option<Credential>>,
}

impl InMemoryTokenStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self {
            slot: Mutex::new(None),
        }
    }

    /// Creates a store pre-seeded with a credential.
    #[must_use]
    pub fn with_credential(credential: Credential) -> Self {
        Self {
            slot: Mutex::new(Some(credential)),
        }
    }
}

impl Default for InMemoryTokenStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl TokenStore for InMemoryTokenStore {
    async fn load(&self) -> Result<Option<Credential>> {
        Ok(self.slot.lock().unwrap().clone())
    }

    async fn save(&self, credential: &Credential) -> Result<()> {
        *self.slot.lock().unwrap() = Some(credential.clone());
        Ok(())
    }

    async fn clear(&self) -> Result<()> {
        *self.slot.lock().unwrap() = None;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(access: &str) -> Credential {
        Credential {
            access_token: access.into(),
            refresh_token: "r".into(),
            expires_at: 4_000_000_000,
        }
    }

    #[tokio::test]
    async fn test_save_and_load() {
        let store = InMemoryTokenStore::new();
        store.save(&sample("tok")).await.unwrap();
        assert_eq!(store.load().await.unwrap().unwrap().access_token, "tok");
    }

    #[tokio::test]
    async fn test_load_empty() {
        let store = InMemoryTokenStore::new();
        assert!(store.load().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_overwrite() {
        let store = InMemoryTokenStore::new();
        store.save(&sample("first")).await.unwrap();
        store.save(&sample("second")).await.unwrap();
        assert_eq!(store.load().await.unwrap().unwrap().access_token, "second");
    }

    #[tokio::test]
    async fn test_clear() {
        let store = InMemoryTokenStore::with_credential(sample("tok"));
        store.clear().await.unwrap();
        assert!(store.load().await.unwrap().is_none());
    }
}
