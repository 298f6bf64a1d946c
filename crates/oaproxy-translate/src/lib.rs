//! Translators between the OpenAI Chat Completions schema and the Anthropic
//! Messages schema.
//!
//! The request and response translators are pure functions; the stream
//! bridge adapts an upstream SSE byte stream into OpenAI streaming chunks.

pub mod anthropic_to_openai;
pub mod openai_to_anthropic;
pub mod stream;

pub use anthropic_to_openai::{anthropic_to_openai, map_finish_reason};
pub use openai_to_anthropic::{RequestDefaults, openai_to_anthropic};
pub use stream::bridge_stream;

/// Fresh completion id in the OpenAI style: `chatcmpl-` plus 24 random
/// alphanumeric characters.
#[must_use]
pub fn completion_id() -> String {
    use rand::Rng as _;
    use rand::distributions::Alphanumeric;
    let suffix: String = rand::thread_rng()
        .sample_iter(Alphanumeric)
        .take(24)
        .map(char::from)
        .collect();
    format!("chatcmpl-{suffix}")
}
