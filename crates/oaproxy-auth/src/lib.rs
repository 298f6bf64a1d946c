//! OAuth PKCE authentication and credential lifecycle management.

pub mod manager;
pub mod oauth;
pub mod pkce;

pub use manager::{CredentialManager, CredentialStatus};
pub use oauth::{OAuthClient, OAuthSettings};
pub use pkce::PkceSession;
