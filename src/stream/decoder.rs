use memchr::memmem;

use super::utf8::Utf8Carry;
use super::{DecoderOptions, DecoderState, FrameGrammar, StreamItem, TrailingPolicy};
use crate::error::SdkError;

/// Counters collected over one stream consumption.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DecodeStats {
    pub bytes_received: u64,
    pub frames_parsed: u64,
    pub frames_dropped: u64,
    pub events_emitted: u64,
}

/// Synchronous, push-driven frame decoder.
///
/// Feed it raw body chunks as they arrive; complete frames are mapped through
/// the grammar and appended to the caller's output buffer. After every call
/// the internal buffer holds at most one incomplete trailing frame.
pub struct FrameDecoder<G: FrameGrammar> {
    grammar: G,
    options: DecoderOptions,
    text: Utf8Carry,
    buffer: String,
    scan_from: usize,
    state: DecoderState,
    stats: DecodeStats,
}

impl<G: FrameGrammar> FrameDecoder<G> {
    #[must_use]
    pub fn new(grammar: G, options: DecoderOptions) -> Self {
        Self {
            grammar,
            options,
            text: Utf8Carry::default(),
            buffer: String::with_capacity(4096),
            scan_from: 0,
            state: DecoderState::AwaitingChunk,
            stats: DecodeStats::default(),
        }
    }

    #[must_use]
    pub fn state(&self) -> DecoderState {
        self.state
    }

    #[must_use]
    pub fn is_terminated(&self) -> bool {
        self.state == DecoderState::Terminated
    }

    #[must_use]
    pub fn stats(&self) -> DecodeStats {
        self.stats
    }

    /// Bytes held back: decoded text of the partial frame plus any split
    /// UTF-8 sequence.
    #[must_use]
    pub fn buffered_len(&self) -> usize {
        self.buffer.len() + self.text.pending_len()
    }

    /// Decode one chunk and emit every frame it completes.
    ///
    /// Does nothing once the decoder has terminated.
    pub fn feed_bytes(&mut self, bytes: &[u8], out: &mut Vec<StreamItem<G::Event>>) {
        if self.is_terminated() {
            return;
        }
        self.stats.bytes_received += bytes.len() as u64;
        self.state = DecoderState::ScanningBuffer;
        self.text.decode_into(bytes, &mut self.buffer);
        self.drain_frames(out);
        if self.is_terminated() {
            return;
        }

        if self.buffer.len() > self.options.max_frame_bytes {
            tracing::warn!(
                grammar = G::NAME,
                buffered = self.buffer.len(),
                limit = self.options.max_frame_bytes,
                "stream frame exceeds buffer limit, terminating"
            );
            out.push(Err(SdkError::FrameTooLarge {
                limit: self.options.max_frame_bytes,
            }));
            self.terminate();
            return;
        }
        self.state = DecoderState::AwaitingChunk;
    }

    /// Signal that the source is exhausted.
    ///
    /// Handles any leftover partial frame according to the trailing policy,
    /// then lets the grammar synthesize a closing event.
    pub fn finish(&mut self, out: &mut Vec<StreamItem<G::Event>>) {
        if self.is_terminated() {
            return;
        }
        self.state = DecoderState::Flush;

        let pending_bytes = if self.buffer.trim().is_empty() {
            self.text.discard()
        } else {
            self.buffer.len() + self.text.discard()
        };
        if pending_bytes > 0 {
            tracing::warn!(
                grammar = G::NAME,
                pending_bytes,
                "stream ended inside an unterminated frame"
            );
            if self.options.trailing_policy == TrailingPolicy::Report {
                out.push(Err(SdkError::Truncated { pending_bytes }));
            }
        }

        if let Some(event) = self.grammar.on_source_end() {
            self.stats.events_emitted += 1;
            out.push(Ok(event));
        }
        self.terminate();
    }

    /// Stop decoding without flushing, e.g. after a transport failure.
    pub fn abort(&mut self) {
        self.terminate();
    }

    fn terminate(&mut self) {
        self.buffer.clear();
        self.scan_from = 0;
        self.text.discard();
        self.state = DecoderState::Terminated;
    }

    fn drain_frames(&mut self, out: &mut Vec<StreamItem<G::Event>>) {
        let delimiter = G::DELIMITER.as_bytes();
        let mut consumed = 0usize;
        let mut search_from = self.scan_from;

        while let Some(rel) = memmem::find(&self.buffer.as_bytes()[search_from..], delimiter) {
            let frame_end = search_from + rel;
            let frame = &self.buffer[consumed..frame_end];
            consumed = frame_end + delimiter.len();
            search_from = consumed;

            self.state = DecoderState::EmittingFrame;
            match self.grammar.parse_frame(frame) {
                Ok(Some(event)) => {
                    self.stats.frames_parsed += 1;
                    self.stats.events_emitted += 1;
                    let terminal = G::is_terminal(&event);
                    out.push(Ok(event));
                    if terminal {
                        tracing::debug!(grammar = G::NAME, "terminal event received");
                        self.terminate();
                        return;
                    }
                }
                Ok(None) => {}
                Err(err) => {
                    self.stats.frames_dropped += 1;
                    tracing::debug!(grammar = G::NAME, error = %err, "dropping malformed frame");
                }
            }
            self.state = DecoderState::ScanningBuffer;
        }

        if consumed > 0 {
            self.buffer.drain(..consumed);
        }
        // A delimiter may straddle the next chunk boundary.
        self.scan_from = self
            .buffer
            .len()
            .saturating_sub(delimiter.len().saturating_sub(1));
    }
}
