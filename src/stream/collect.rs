//! Fold decoded event streams into complete responses.

use futures_util::{Stream, StreamExt};

use super::{AgentMessage, AgentStreamEvent, ChatStreamEvent, StreamItem};
use crate::error::SdkError;

/// Fully assembled chat completion.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChatCompletion {
    pub content: String,
    pub role: String,
    pub finish_reason: Option<String>,
    /// Whether the stream ended with an explicit `[DONE]` marker.
    pub finished: bool,
}

/// Text streamed for one agent message id.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MessageText {
    pub message_id: Option<String>,
    pub text: String,
}

/// Fully assembled agent reply.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AgentReply {
    /// Streamed text grouped by message id, in order of first appearance.
    pub parts: Vec<MessageText>,
    /// Last complete message the agent sent, if any.
    pub message: Option<AgentMessage>,
    pub thinking: Vec<String>,
}

impl AgentReply {
    /// Concatenation of every streamed chunk, in arrival order per message.
    #[must_use]
    pub fn streamed_text(&self) -> String {
        self.parts.iter().map(|part| part.text.as_str()).collect()
    }

    /// The final message content when one was sent, else the streamed text.
    #[must_use]
    pub fn final_text(&self) -> String {
        match &self.message {
            Some(message) if !message.content.is_empty() => message.content.clone(),
            _ => self.streamed_text(),
        }
    }

    fn push_chunk(&mut self, chunk: String, message_id: Option<String>) {
        if let Some(part) = self
            .parts
            .iter_mut()
            .find(|part| part.message_id == message_id)
        {
            part.text.push_str(&chunk);
            return;
        }
        self.parts.push(MessageText {
            message_id,
            text: chunk,
        });
    }
}

/// Drain a chat event stream into a [`ChatCompletion`].
///
/// # Errors
///
/// Propagates the first stream-level error (transport failure, truncation
/// under the report policy, oversized frame).
pub async fn collect_chat<S>(stream: S) -> Result<ChatCompletion, SdkError>
where
    S: Stream<Item = StreamItem<ChatStreamEvent>>,
{
    futures_util::pin_mut!(stream);
    let mut completion = ChatCompletion {
        role: "assistant".to_string(),
        ..ChatCompletion::default()
    };
    while let Some(item) = stream.next().await {
        match item? {
            ChatStreamEvent::Delta { content, role } => {
                completion.content.push_str(&content);
                completion.role = role;
            }
            ChatStreamEvent::Finish { reason } => {
                completion.finish_reason = reason;
                completion.finished = true;
                break;
            }
        }
    }
    Ok(completion)
}

/// Drain an agent event stream into an [`AgentReply`].
///
/// # Errors
///
/// Returns [`SdkError::Application`] when the platform sends an `error`
/// event, and propagates stream-level errors.
pub async fn collect_agent<S>(stream: S) -> Result<AgentReply, SdkError>
where
    S: Stream<Item = StreamItem<AgentStreamEvent>>,
{
    futures_util::pin_mut!(stream);
    let mut reply = AgentReply::default();
    while let Some(item) = stream.next().await {
        match item? {
            AgentStreamEvent::Chunk { chunk, message_id } => reply.push_chunk(chunk, message_id),
            AgentStreamEvent::Message(message) => reply.message = Some(message),
            AgentStreamEvent::Thinking { message } => reply.thinking.push(message),
            AgentStreamEvent::Error { message } => return Err(SdkError::Application(message)),
            AgentStreamEvent::Done => break,
        }
    }
    Ok(reply)
}
