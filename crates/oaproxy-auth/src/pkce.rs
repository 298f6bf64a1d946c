//! PKCE (Proof Key for Code Exchange) material and login-state generation.

use base64::{Engine as _, engine::general_purpose::URL_SAFE_NO_PAD};
use rand::RngCore as _;
use sha2::{Digest, Sha256};

/// Ephemeral, process-local state for a single login attempt.
///
/// Created when a login starts, consumed exactly once by the code exchange.
/// Starting a new login supersedes any pending session.
#[derive(Debug, Clone)]
pub struct PkceSession {
    /// 43-char URL-safe random string from a cryptographic source.
    pub verifier: String,
    /// Unpadded BASE64URL of SHA-256(verifier).
    pub challenge: String,
    /// Random nonce echoed back by the authorization server.
    pub state: String,
}

impl PkceSession {
    /// Generate fresh PKCE material and a state nonce.
    #[must_use]
    pub fn generate() -> Self {
        let mut bytes = [0u8; 32];
        rand::thread_rng().fill_bytes(&mut bytes);
        let verifier = URL_SAFE_NO_PAD.encode(bytes);
        let challenge = challenge_for(&verifier);
        Self {
            verifier,
            challenge,
            state: random_state(),
        }
    }
}

/// S256 code challenge for a verifier.
pub(crate) fn challenge_for(verifier: &str) -> String {
    URL_SAFE_NO_PAD.encode(Sha256::digest(verifier.as_bytes()))
}

/// Random `state` parameter: 32 lowercase hex chars.
fn random_state() -> String {
    let mut bytes = [0u8; 16];
    rand::thread_rng().fill_bytes(&mut bytes);
    bytes.iter().fold(String::with_capacity(32), |mut s, b| {
        use std::fmt::Write as _;
        let _ = write!(s, "{b:02x}");
        s
    })
}
