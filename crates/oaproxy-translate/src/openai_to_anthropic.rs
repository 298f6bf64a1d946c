//! Translates OpenAI chat completion requests into Anthropic Messages
//! requests.

use oaproxy_types::{
    ChatCompletionRequest, ContentBlock, Error, Message, MessagesRequest, Result, Role,
};

/// Values substituted when the caller omits them.
#[derive(Debug, Clone)]
pub struct RequestDefaults {
    /// Model used when the request carries none.
    pub model: String,
    /// Token ceiling used when the request carries none; the Anthropic API
    /// requires one.
    pub max_tokens: u32,
}

/// Translate an inbound OpenAI request into the Anthropic Messages shape.
///
/// System messages anywhere in the sequence are folded, in order, into the
/// top-level `system` string (joined with blank lines). The remaining
/// messages keep their relative order and each becomes a single text block.
///
/// # Errors
///
/// [`Error::InvalidRequest`] when the model resolves to empty, `messages` is
/// empty, a role other than system/user/assistant appears, the first
/// non-system message is not from the user, or `max_tokens` is zero.
pub fn openai_to_anthropic(
    request: ChatCompletionRequest,
    defaults: &RequestDefaults,
) -> Result<MessagesRequest> {
    let model = if request.model.is_empty() {
        defaults.model.clone()
    } else {
        request.model
    };
    if model.is_empty() {
        return Err(Error::InvalidRequest("'model' must not be empty".into()));
    }
    if request.messages.is_empty() {
        return Err(Error::InvalidRequest("'messages' must not be empty".into()));
    }

    let mut system_parts: Vec<String> = Vec::new();
    let mut messages: Vec<Message> = Vec::new();
    for message in request.messages {
        let role = match message.role.as_str() {
            "system" => {
                system_parts.push(message.content);
                continue;
            }
            "user" => Role::User,
            "assistant" => Role::Assistant,
            other => {
                return Err(Error::InvalidRequest(format!(
                    "unsupported message role '{other}'"
                )));
            }
        };
        messages.push(Message {
            role,
            content: vec![ContentBlock::Text {
                text: message.content,
            }],
        });
    }

    if messages.is_empty() {
        return Err(Error::InvalidRequest(
            "at least one user message is required".into(),
        ));
    }
    if messages[0].role != Role::User {
        return Err(Error::InvalidRequest(
            "the first non-system message must have role 'user'".into(),
        ));
    }

    let max_tokens = request
        .max_tokens
        .or(request.max_completion_tokens)
        .unwrap_or(defaults.max_tokens);
    if max_tokens == 0 {
        return Err(Error::InvalidRequest(
            "'max_tokens' must be a positive integer".into(),
        ));
    }

    Ok(MessagesRequest {
        model,
        system: if system_parts.is_empty() {
            None
        } else {
            Some(system_parts.join("\n\n"))
        },
        messages,
        max_tokens,
        temperature: request.temperature,
        top_p: request.top_p,
        stream: request.stream,
    })
}
