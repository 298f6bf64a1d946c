//! Cross-crate traits.

use crate::{Credential, error::Result};
use async_trait::async_trait;

/// Durable storage for the single user's OAuth credential.
///
/// Implementations must make saves atomic: a concurrent `load` observes
/// either the previous credential or the new one, never a partial write.
#[async_trait]
pub trait TokenStore: Send + Sync {
    /// Load the stored credential, if any. A corrupt store is an error,
    /// not `None`.
    async fn load(&self) -> Result<Option<Credential>>;

    /// Persist the credential.
    async fn save(&self, credential: &Credential) -> Result<()>;

    /// Remove the stored credential. Removing a missing credential succeeds.
    async fn clear(&self) -> Result<()>;
}
