//! Blank-line-delimited named-event grammar used by agent chat streaming.
//!
//! A block is a run of lines terminated by `\n\n`. `event: <name>` sets the
//! event name (default `message`), every `data: <fragment>` line appends to
//! the payload. The concatenated payload is parsed as JSON according to the
//! event name.

use serde::{Deserialize, Serialize};
use smallvec::SmallVec;

use super::{FrameError, FrameGrammar};

const EVENT_PREFIX: &str = "event: ";
const DATA_PREFIX: &str = "data: ";
const DEFAULT_EVENT: &str = "message";

/// Complete structured message sent by an agent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentMessage {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub role: Option<String>,
    #[serde(default)]
    pub content: String,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

/// Event decoded from an agent chat stream.
#[derive(Debug, Clone, PartialEq)]
pub enum AgentStreamEvent {
    /// Text fragment of the message identified by `message_id`.
    Chunk {
        chunk: String,
        message_id: Option<String>,
    },
    Message(AgentMessage),
    /// Interim status while the agent works.
    Thinking { message: String },
    /// Error reported by the platform inside the stream. Terminal.
    Error { message: String },
    /// End of stream, explicit or synthesized. Terminal.
    Done,
}

#[derive(Debug, Deserialize)]
struct ChunkWire {
    chunk: String,
    #[serde(default, rename = "messageId")]
    message_id: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ThinkingWire {
    #[serde(alias = "content")]
    message: String,
}

#[derive(Debug, Deserialize)]
struct ErrorWire {
    #[serde(alias = "error")]
    message: String,
}

/// Grammar for one agent chat stream.
#[derive(Debug, Default)]
pub struct BlockGrammar;

impl BlockGrammar {
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

impl FrameGrammar for BlockGrammar {
    type Event = AgentStreamEvent;
    const DELIMITER: &'static str = "\n\n";
    const NAME: &'static str = "block";

    fn parse_frame(&mut self, frame: &str) -> Result<Option<AgentStreamEvent>, FrameError> {
        let mut name: Option<&str> = None;
        let mut fragments: SmallVec<[&str; 4]> = SmallVec::new();
        for line in frame.split('\n') {
            let line = line.strip_suffix('\r').unwrap_or(line);
            if let Some(value) = line.strip_prefix(EVENT_PREFIX) {
                name = Some(value.trim());
            } else if let Some(value) = line.strip_prefix(DATA_PREFIX) {
                fragments.push(value);
            }
        }

        if name.is_none() && fragments.is_empty() {
            return Ok(None);
        }
        let name = name.unwrap_or(DEFAULT_EVENT);
        if name == "done" {
            return Ok(Some(AgentStreamEvent::Done));
        }
        if fragments.is_empty() {
            return Err(FrameError::MissingData(name.to_string()));
        }
        let payload = fragments.concat();

        let event = match name {
            "chunk" => {
                let wire: ChunkWire = serde_json::from_str(&payload)?;
                AgentStreamEvent::Chunk {
                    chunk: wire.chunk,
                    message_id: wire.message_id,
                }
            }
            "message" => AgentStreamEvent::Message(serde_json::from_str(&payload)?),
            "thinking" => {
                let wire: ThinkingWire = serde_json::from_str(&payload)?;
                AgentStreamEvent::Thinking {
                    message: wire.message,
                }
            }
            "error" => {
                let wire: ErrorWire = serde_json::from_str(&payload)?;
                AgentStreamEvent::Error {
                    message: wire.message,
                }
            }
            other => return Err(FrameError::UnknownEvent(other.to_string())),
        };
        Ok(Some(event))
    }

    fn is_terminal(event: &AgentStreamEvent) -> bool {
        matches!(event, AgentStreamEvent::Done | AgentStreamEvent::Error { .. })
    }

    fn on_source_end(&mut self) -> Option<AgentStreamEvent> {
        Some(AgentStreamEvent::Done)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(block: &str) -> Result<Option<AgentStreamEvent>, FrameError> {
        BlockGrammar::new().parse_frame(block)
    }

    #[test]
    fn test_chunk_block() {
        let event = parse("event: chunk\ndata: {\"chunk\":\"He\",\"messageId\":\"m1\"}")
            .unwrap()
            .unwrap();
        assert_eq!(
            event,
            AgentStreamEvent::Chunk {
                chunk: "He".to_string(),
                message_id: Some("m1".to_string()),
            }
        );
    }

    #[test]
    fn test_data_fragments_are_concatenated() {
        let event = parse("event: chunk\ndata: {\"chunk\":\ndata: \"split\"}")
            .unwrap()
            .unwrap();
        assert_eq!(
            event,
            AgentStreamEvent::Chunk {
                chunk: "split".to_string(),
                message_id: None,
            }
        );
    }

    #[test]
    fn test_default_event_is_message() {
        let event = parse("data: {\"id\":\"m9\",\"role\":\"assistant\",\"content\":\"Hello\",\"tokens\":4}")
            .unwrap()
            .unwrap();
        let AgentStreamEvent::Message(message) = event else {
            panic!("expected a message event");
        };
        assert_eq!(message.id.as_deref(), Some("m9"));
        assert_eq!(message.content, "Hello");
        assert_eq!(message.extra.get("tokens"), Some(&serde_json::json!(4)));
    }

    #[test]
    fn test_thinking_accepts_content_alias() {
        let event = parse("event: thinking\ndata: {\"content\":\"searching\"}")
            .unwrap()
            .unwrap();
        assert_eq!(
            event,
            AgentStreamEvent::Thinking {
                message: "searching".to_string()
            }
        );
    }

    #[test]
    fn test_error_and_done_are_terminal() {
        let error = parse("event: error\ndata: {\"message\":\"quota exceeded\"}")
            .unwrap()
            .unwrap();
        assert!(BlockGrammar::is_terminal(&error));
        let done = parse("event: done\ndata: {}").unwrap().unwrap();
        assert_eq!(done, AgentStreamEvent::Done);
        assert!(BlockGrammar::is_terminal(&done));
        assert!(!BlockGrammar::is_terminal(&AgentStreamEvent::Thinking {
            message: String::new()
        }));
    }

    #[test]
    fn test_done_without_data() {
        assert_eq!(parse("event: done").unwrap(), Some(AgentStreamEvent::Done));
    }

    #[test]
    fn test_empty_and_comment_blocks() {
        assert!(parse("").unwrap().is_none());
        assert!(parse(": heartbeat").unwrap().is_none());
    }

    #[test]
    fn test_malformed_blocks() {
        assert!(matches!(
            parse("event: chunk\ndata: {oops"),
            Err(FrameError::Json(_))
        ));
        assert!(matches!(
            parse("event: chunk"),
            Err(FrameError::MissingData(_))
        ));
        assert!(matches!(
            parse("event: telemetry\ndata: {}"),
            Err(FrameError::UnknownEvent(_))
        ));
    }

    #[test]
    fn test_source_end_synthesizes_done() {
        assert_eq!(
            BlockGrammar::new().on_source_end(),
            Some(AgentStreamEvent::Done)
        );
    }
}
