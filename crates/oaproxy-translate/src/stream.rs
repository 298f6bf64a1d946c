//! Streaming conversion (SSE).
//!
//! Anthropic streams `/v1/messages` responses as typed SSE events
//! (`message_start`, `content_block_delta`, `message_delta`, ...). OpenAI
//! clients expect `data: {json}` chunks and a terminal `data: [DONE]`. This
//! module reads the upstream byte stream, reassembles SSE frames across
//! arbitrary chunk boundaries, and emits fully formatted OpenAI frames.

use crate::{anthropic_to_openai::map_finish_reason, completion_id};
use async_stream::try_stream;
use bytes::Bytes;
use futures_core::Stream;
use futures_util::StreamExt as _;
use oaproxy_types::{Error, Result, unix_now};
use serde::Deserialize;
use serde_json::{Value, json};

const DONE_FRAME: &str = "data: [DONE]\n\n";

/// Anthropic SSE event payloads. Unrecognized event types fall through to
/// `Other` and are dropped.
#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum StreamEvent {
    MessageStart {
        #[serde(default)]
        message: StartedMessage,
    },
    ContentBlockStart {},
    ContentBlockDelta {
        delta: DeltaPayload,
    },
    ContentBlockStop {},
    MessageDelta {
        #[serde(default)]
        delta: MessageDeltaPayload,
        #[serde(default)]
        usage: Option<DeltaUsage>,
    },
    MessageStop {},
    Ping {},
    #[serde(other)]
    Other,
}

#[derive(Debug, Default, Deserialize)]
struct StartedMessage {
    #[serde(default)]
    model: String,
    #[serde(default)]
    usage: StartUsage,
}

#[derive(Debug, Clone, Copy, Default, Deserialize)]
struct StartUsage {
    #[serde(default)]
    input_tokens: u64,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum DeltaPayload {
    TextDelta { text: String },
    #[serde(other)]
    Other,
}

#[derive(Debug, Default, Deserialize)]
struct MessageDeltaPayload {
    #[serde(default)]
    stop_reason: Option<String>,
}

#[derive(Debug, Clone, Copy, Default, Deserialize)]
struct DeltaUsage {
    #[serde(default)]
    output_tokens: u64,
}

/// Convert an upstream Anthropic SSE byte stream into OpenAI streaming
/// frames, ending with `data: [DONE]`.
///
/// Every emitted chunk shares one id, creation time, and model. `model`
/// echoes the client's request; a non-empty model on `message_start`
/// overrides it. A transport error after the first chunk is reported in-band
/// as a final annotated chunk, since the HTTP status is already committed.
pub fn bridge_stream<S>(upstream: S, model: String) -> impl Stream<Item = Result<String>> + Send
where
    S: Stream<Item = Result<Bytes>> + Unpin + Send + 'static,
{
    try_stream! {
        let id = completion_id();
        let created = unix_now();
        let mut model = model;
        let mut upstream = upstream;
        let mut buffer = String::new();
        let mut primed = false;
        let mut stop_reason: Option<String> = None;
        let mut input_tokens = 0u64;
        let mut output_tokens = 0u64;
        let mut finished = false;

        'read: while let Some(chunk) = upstream.next().await {
            let bytes = match chunk {
                Ok(bytes) => bytes,
                Err(e) => {
                    yield error_chunk(&id, created, &model, &e);
                    yield DONE_FRAME.to_string();
                    finished = true;
                    break 'read;
                }
            };
            buffer.push_str(&String::from_utf8_lossy(&bytes));

            while let Some((frame, rest)) = split_frame(&buffer) {
                buffer = rest;
                let Some(data) = event_data(&frame) else {
                    continue;
                };
                let Ok(event) = serde_json::from_str::<StreamEvent>(&data) else {
                    continue;
                };
                match event {
                    StreamEvent::MessageStart { message } => {
                        if !message.model.is_empty() {
                            model = message.model;
                        }
                        input_tokens = message.usage.input_tokens;
                        if !primed {
                            primed = true;
                            yield chunk_frame(
                                &id,
                                created,
                                &model,
                                json!({"role": "assistant", "content": ""}),
                                None,
                                None,
                            );
                        }
                    }
                    StreamEvent::ContentBlockDelta {
                        delta: DeltaPayload::TextDelta { text },
                        ..
                    } => {
                        yield chunk_frame(&id, created, &model, json!({"content": text}), None, None);
                    }
                    StreamEvent::MessageDelta { delta, usage } => {
                        if delta.stop_reason.is_some() {
                            stop_reason = delta.stop_reason;
                        }
                        if let Some(usage) = usage {
                            output_tokens = usage.output_tokens;
                        }
                    }
                    StreamEvent::MessageStop {} => {
                        yield chunk_frame(
                            &id,
                            created,
                            &model,
                            json!({}),
                            Some(map_finish_reason(stop_reason.as_deref())),
                            Some((input_tokens, output_tokens)),
                        );
                        yield DONE_FRAME.to_string();
                        finished = true;
                        // Anything after message_stop is ignored.
                        break 'read;
                    }
                    StreamEvent::ContentBlockStart { .. }
                    | StreamEvent::ContentBlockStop { .. }
                    | StreamEvent::ContentBlockDelta { .. }
                    | StreamEvent::Ping {}
                    | StreamEvent::Other => {}
                }
            }
        }

        if !finished {
            // Upstream closed without message_stop; terminate the client
            // stream properly anyway.
            yield chunk_frame(
                &id,
                created,
                &model,
                json!({}),
                Some(map_finish_reason(stop_reason.as_deref())),
                Some((input_tokens, output_tokens)),
            );
            yield DONE_FRAME.to_string();
        }
    }
}

fn chunk_frame(
    id: &str,
    created: u64,
    model: &str,
    delta: Value,
    finish_reason: Option<&str>,
    usage: Option<(u64, u64)>,
) -> String {
    let mut payload = json!({
        "id": id,
        "object": "chat.completion.chunk",
        "created": created,
        "model": model,
        "choices": [{"index": 0, "delta": delta, "finish_reason": finish_reason}],
    });
    if let Some((input, output)) = usage {
        payload["usage"] = json!({
            "prompt_tokens": input,
            "completion_tokens": output,
            "total_tokens": input + output,
        });
    }
    format!("data: {payload}\n\n")
}

fn error_chunk(id: &str, created: u64, model: &str, error: &Error) -> String {
    let payload = json!({
        "id": id,
        "object": "chat.completion.chunk",
        "created": created,
        "model": model,
        "choices": [{"index": 0, "delta": {}, "finish_reason": "stop"}],
        "error": {"message": error.to_string(), "type": "upstream_error"},
    });
    format!("data: {payload}\n\n")
}

/// Split the buffer at the first blank line into a complete SSE frame and
/// the remainder. Returns `None` while the frame is still incomplete.
fn split_frame(buffer: &str) -> Option<(String, String)> {
    let lf = buffer.find("\n\n");
    let crlf = buffer.find("\r\n\r\n");
    match (lf, crlf) {
        (Some(a), Some(b)) if b < a => Some((buffer[..b].to_string(), buffer[b + 4..].to_string())),
        (Some(a), _) => Some((buffer[..a].to_string(), buffer[a + 2..].to_string())),
        (None, Some(b)) => Some((buffer[..b].to_string(), buffer[b + 4..].to_string())),
        (None, None) => None,
    }
}

/// Concatenate every `data:` line of a frame with `\n`, per the SSE spec.
fn event_data(frame: &str) -> Option<String> {
    let mut out: Option<String> = None;
    for line in frame.lines() {
        if let Some(rest) = line.strip_prefix("data:") {
            let rest = rest.strip_prefix(' ').unwrap_or(rest);
            match &mut out {
                None => out = Some(rest.to_string()),
                Some(joined) => {
                    joined.push('\n');
                    joined.push_str(rest);
                }
            }
        }
    }
    out
}
