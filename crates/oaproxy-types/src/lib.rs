//! Core types and traits for the oaproxy workspace.
//!
//! This crate defines the shared abstractions used across all layers of the
//! gateway: the error taxonomy, the persisted OAuth credential, the wire
//! types for both chat APIs, and the token-store trait.

pub mod chat;
pub mod credential;
pub mod error;
pub mod traits;

pub use chat::{
    ChatCompletionRequest, ChatMessage, ContentBlock, Message, MessagesRequest, MessagesResponse,
    ResponseBlock, Role, Usage,
};
pub use credential::{Credential, unix_now};
pub use error::{Error, Result};
pub use traits::TokenStore;
