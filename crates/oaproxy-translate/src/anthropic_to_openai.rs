//! Translates non-streaming Anthropic responses into OpenAI chat
//! completions.

use crate::completion_id;
use oaproxy_types::{MessagesResponse, ResponseBlock, unix_now};
use serde_json::{Value, json};

/// Maps an Anthropic `stop_reason` to an OpenAI `finish_reason`.
/// `end_turn`, `stop_sequence`, and an absent reason all read as `stop`.
#[must_use]
pub fn map_finish_reason(stop_reason: Option<&str>) -> &'static str {
    match stop_reason {
        Some("max_tokens") => "length",
        Some("tool_use") => "tool_calls",
        _ => "stop",
    }
}

/// Build an OpenAI `chat.completion` body from an Anthropic response.
///
/// Text blocks are concatenated in order; other block types are skipped.
/// `model` echoes the client's requested model.
#[must_use]
pub fn anthropic_to_openai(response: &MessagesResponse, model: &str) -> Value {
    let text: String = response
        .content
        .iter()
        .filter_map(|block| match block {
            ResponseBlock::Text { text } => Some(text.as_str()),
            ResponseBlock::Other => None,
        })
        .collect();

    let prompt_tokens = response.usage.input_tokens;
    let completion_tokens = response.usage.output_tokens;

    json!({
        "id": completion_id(),
        "object": "chat.completion",
        "created": unix_now(),
        "model": model,
        "choices": [{
            "index": 0,
            "message": {"role": "assistant", "content": text},
            "finish_reason": map_finish_reason(response.stop_reason.as_deref()),
        }],
        "usage": {
            "prompt_tokens": prompt_tokens,
            "completion_tokens": completion_tokens,
            "total_tokens": prompt_tokens + completion_tokens,
        },
    })
}
