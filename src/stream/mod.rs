//! Incremental decoding of streamed platform responses.
//!
//! Response bodies arrive as arbitrary byte chunks. [`FrameDecoder`] turns
//! them into UTF-8 text, cuts the text into frames on a grammar-specific
//! delimiter and maps each complete frame to a typed event. [`EventStream`]
//! drives a decoder from an async byte source and exposes the events as a
//! pull-based [`futures_util::Stream`].
//!
//! Two grammars are provided:
//! - [`LineGrammar`]: `data: {json}\n` lines terminated by `data: [DONE]`
//!   (chat completion streaming).
//! - [`BlockGrammar`]: `event:`/`data:` blocks separated by a blank line
//!   (agent chat streaming).

pub mod block;
pub mod collect;
mod decoder;
mod event_stream;
pub mod line;
mod utf8;

pub use block::{AgentMessage, AgentStreamEvent, BlockGrammar};
pub use collect::{collect_agent, collect_chat, AgentReply, ChatCompletion};
pub use decoder::{DecodeStats, FrameDecoder};
pub use event_stream::{agent_event_stream, chat_event_stream, EventStream};
pub use line::{ChatStreamEvent, LineGrammar};

use serde::{Deserialize, Serialize};

use crate::error::SdkError;

/// Default ceiling for a single pending frame (1 MiB).
pub const DEFAULT_MAX_FRAME_BYTES: usize = 1_048_576;

/// One decoded item: a typed event, or a stream-level failure.
pub type StreamItem<E> = Result<E, SdkError>;

/// Frame-level parse failure. Never surfaced to consumers: the frame is
/// dropped and decoding continues.
#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    #[error("invalid JSON payload: {0}")]
    Json(#[from] serde_json::Error),
    #[error("unknown event name `{0}`")]
    UnknownEvent(String),
    #[error("event `{0}` carries no data")]
    MissingData(String),
}

/// Wire grammar plugged into the generic [`FrameDecoder`].
pub trait FrameGrammar {
    type Event;

    /// Frame delimiter searched for in the decode buffer.
    const DELIMITER: &'static str;

    /// Short label used in logs.
    const NAME: &'static str;

    /// Map one complete frame (delimiter excluded) to an event.
    ///
    /// `Ok(None)` means the frame carries nothing for the consumer (blank
    /// separators, comments, foreign prefixes).
    ///
    /// # Errors
    ///
    /// Returns [`FrameError`] when the frame is structurally invalid; the
    /// decoder drops such frames.
    fn parse_frame(&mut self, frame: &str) -> Result<Option<Self::Event>, FrameError>;

    /// Whether no further events may follow `event`.
    fn is_terminal(event: &Self::Event) -> bool;

    /// Event synthesized when the source ends without a terminal event.
    fn on_source_end(&mut self) -> Option<Self::Event> {
        None
    }
}

/// What to do with an unterminated frame left in the buffer at end of stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TrailingPolicy {
    /// Drop it silently (a warning is logged).
    #[default]
    Discard,
    /// Yield [`SdkError::Truncated`] before the stream ends.
    Report,
}

/// Per-decoder tuning.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DecoderOptions {
    pub max_frame_bytes: usize,
    pub trailing_policy: TrailingPolicy,
}

impl Default for DecoderOptions {
    fn default() -> Self {
        Self {
            max_frame_bytes: DEFAULT_MAX_FRAME_BYTES,
            trailing_policy: TrailingPolicy::Discard,
        }
    }
}

/// Decoder lifecycle.
///
/// `AwaitingChunk -> ScanningBuffer -> EmittingFrame -> ScanningBuffer`,
/// back to `AwaitingChunk` when no delimiter is left, `Flush` once the source
/// is exhausted and `Terminated` after a terminal event or the flush.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecoderState {
    AwaitingChunk,
    ScanningBuffer,
    EmittingFrame,
    Flush,
    Terminated,
}
