//! Newline-delimited `data:` grammar used by chat completion streaming.
//!
//! Each transmitted unit is `data: {json}\n`; the literal `data: [DONE]`
//! line ends the stream. Lines without the `data: ` prefix (including the
//! blank separators most servers emit) are ignored.

use serde::Deserialize;

use super::{FrameError, FrameGrammar};

const DATA_PREFIX: &str = "data: ";
const DONE_MARKER: &str = "[DONE]";
const DEFAULT_ROLE: &str = "assistant";

/// Event decoded from a chat completion stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChatStreamEvent {
    /// Partial assistant text.
    Delta { content: String, role: String },
    /// Terminal marker. `reason` is the last `finish_reason` the stream
    /// reported, if any.
    Finish { reason: Option<String> },
}

impl ChatStreamEvent {
    #[must_use]
    pub fn delta_text(&self) -> Option<&str> {
        match self {
            ChatStreamEvent::Delta { content, .. } => Some(content),
            ChatStreamEvent::Finish { .. } => None,
        }
    }
}

#[derive(Debug, Deserialize)]
struct ChatChunkWire {
    #[serde(default)]
    choices: Vec<ChoiceWire>,
}

#[derive(Debug, Deserialize)]
struct ChoiceWire {
    #[serde(default)]
    delta: Option<DeltaWire>,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct DeltaWire {
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    role: Option<String>,
}

/// Grammar state for one chat completion stream.
#[derive(Debug)]
pub struct LineGrammar {
    role: String,
    finish_reason: Option<String>,
}

impl LineGrammar {
    #[must_use]
    pub fn new() -> Self {
        Self {
            role: DEFAULT_ROLE.to_string(),
            finish_reason: None,
        }
    }
}

impl Default for LineGrammar {
    fn default() -> Self {
        Self::new()
    }
}

impl FrameGrammar for LineGrammar {
    type Event = ChatStreamEvent;
    const DELIMITER: &'static str = "\n";
    const NAME: &'static str = "line";

    fn parse_frame(&mut self, frame: &str) -> Result<Option<ChatStreamEvent>, FrameError> {
        let line = frame.strip_suffix('\r').unwrap_or(frame);
        let Some(payload) = line.strip_prefix(DATA_PREFIX) else {
            return Ok(None);
        };
        if payload.trim() == DONE_MARKER {
            return Ok(Some(ChatStreamEvent::Finish {
                reason: self.finish_reason.take(),
            }));
        }

        let chunk: ChatChunkWire = serde_json::from_str(payload)?;
        let Some(choice) = chunk.choices.into_iter().next() else {
            return Ok(None);
        };
        if let Some(reason) = choice.finish_reason {
            self.finish_reason = Some(reason);
        }
        let delta = choice.delta.unwrap_or_default();
        if let Some(role) = delta.role {
            self.role = role;
        }
        match delta.content {
            Some(content) if !content.is_empty() => Ok(Some(ChatStreamEvent::Delta {
                content,
                role: self.role.clone(),
            })),
            _ => Ok(None),
        }
    }

    fn is_terminal(event: &ChatStreamEvent) -> bool {
        matches!(event, ChatStreamEvent::Finish { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(grammar: &mut LineGrammar, line: &str) -> Option<ChatStreamEvent> {
        grammar.parse_frame(line).expect("frame should parse")
    }

    #[test]
    fn test_delta_line() {
        let mut grammar = LineGrammar::new();
        let event = parse(
            &mut grammar,
            r#"data: {"choices":[{"delta":{"content":"Hi"}}]}"#,
        );
        assert_eq!(
            event,
            Some(ChatStreamEvent::Delta {
                content: "Hi".to_string(),
                role: "assistant".to_string(),
            })
        );
    }

    #[test]
    fn test_role_is_remembered() {
        let mut grammar = LineGrammar::new();
        assert!(parse(&mut grammar, r#"data: {"choices":[{"delta":{"role":"tool"}}]}"#).is_none());
        let event = parse(
            &mut grammar,
            r#"data: {"choices":[{"delta":{"content":"x"}}]}"#,
        );
        assert_eq!(
            event,
            Some(ChatStreamEvent::Delta {
                content: "x".to_string(),
                role: "tool".to_string(),
            })
        );
    }

    #[test]
    fn test_done_carries_finish_reason() {
        let mut grammar = LineGrammar::new();
        assert!(parse(
            &mut grammar,
            r#"data: {"choices":[{"delta":{},"finish_reason":"stop"}]}"#
        )
        .is_none());
        let event = parse(&mut grammar, "data: [DONE]\r").unwrap();
        assert_eq!(
            event,
            ChatStreamEvent::Finish {
                reason: Some("stop".to_string())
            }
        );
        assert!(LineGrammar::is_terminal(&event));
    }

    #[test]
    fn test_non_data_lines_are_ignored() {
        let mut grammar = LineGrammar::new();
        assert!(parse(&mut grammar, "").is_none());
        assert!(parse(&mut grammar, ": keep-alive").is_none());
        assert!(parse(&mut grammar, "event: ping").is_none());
        assert!(parse(&mut grammar, "data:[DONE]").is_none());
    }

    #[test]
    fn test_invalid_json_is_an_error() {
        let mut grammar = LineGrammar::new();
        let err = grammar.parse_frame("data: {not json}").unwrap_err();
        assert!(matches!(err, FrameError::Json(_)));
    }

    #[test]
    fn test_usage_only_chunk_yields_nothing() {
        let mut grammar = LineGrammar::new();
        assert!(parse(
            &mut grammar,
            r#"data: {"choices":[],"usage":{"total_tokens":3}}"#
        )
        .is_none());
    }
}
