use std::collections::VecDeque;
use std::pin::Pin;
use std::task::{ready, Context, Poll};
use std::time::Instant;

use bytes::Bytes;
use futures_util::Stream;
use pin_project_lite::pin_project;

use super::decoder::FrameDecoder;
use super::{BlockGrammar, DecoderOptions, FrameGrammar, LineGrammar, StreamItem};
use crate::error::SdkError;
use crate::observability::log_stream_complete;

pin_project! {
    /// Pull-based event stream over a response body.
    ///
    /// The byte source is dropped as soon as the decoder terminates, and
    /// dropping the stream early drops the source with it, which closes the
    /// underlying connection.
    pub struct EventStream<S, G: FrameGrammar> {
        #[pin]
        source: Option<S>,
        decoder: FrameDecoder<G>,
        pending: VecDeque<StreamItem<G::Event>>,
        scratch: Vec<StreamItem<G::Event>>,
        started: Instant,
    }
}

impl<S, G: FrameGrammar> std::fmt::Debug for EventStream<S, G> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventStream")
            .field("source_released", &self.source.is_none())
            .field("pending", &self.pending.len())
            .finish_non_exhaustive()
    }
}

impl<S, E, G> EventStream<S, G>
where
    S: Stream<Item = Result<Bytes, E>>,
    E: std::fmt::Display,
    G: FrameGrammar,
{
    pub fn new(source: S, grammar: G, options: DecoderOptions) -> Self {
        Self {
            source: Some(source),
            decoder: FrameDecoder::new(grammar, options),
            pending: VecDeque::with_capacity(8),
            scratch: Vec::with_capacity(8),
            started: Instant::now(),
        }
    }

    /// Whether the byte source has been released.
    #[must_use]
    pub fn is_source_released(&self) -> bool {
        self.source.is_none()
    }

    #[must_use]
    pub fn decoder(&self) -> &FrameDecoder<G> {
        &self.decoder
    }
}

impl<S, E, G> Stream for EventStream<S, G>
where
    S: Stream<Item = Result<Bytes, E>>,
    E: std::fmt::Display,
    G: FrameGrammar,
{
    type Item = StreamItem<G::Event>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let mut this = self.project();
        loop {
            if let Some(item) = this.pending.pop_front() {
                return Poll::Ready(Some(item));
            }
            let Some(source) = this.source.as_mut().as_pin_mut() else {
                return Poll::Ready(None);
            };

            match ready!(source.poll_next(cx)) {
                Some(Ok(bytes)) => this.decoder.feed_bytes(&bytes, this.scratch),
                Some(Err(err)) => {
                    tracing::warn!(grammar = G::NAME, error = %err, "stream body read failed");
                    this.decoder.abort();
                    this.scratch.push(Err(SdkError::Transport(err.to_string())));
                }
                None => this.decoder.finish(this.scratch),
            }
            this.pending.extend(this.scratch.drain(..));

            if this.decoder.is_terminated() {
                this.source.set(None);
                log_stream_complete(G::NAME, &this.decoder.stats(), this.started.elapsed());
            }
        }
    }
}

/// Decode a chat completion body (`data:` lines).
pub fn chat_event_stream<S, E>(source: S, options: DecoderOptions) -> EventStream<S, LineGrammar>
where
    S: Stream<Item = Result<Bytes, E>>,
    E: std::fmt::Display,
{
    EventStream::new(source, LineGrammar::new(), options)
}

/// Decode an agent chat body (`event:`/`data:` blocks).
pub fn agent_event_stream<S, E>(source: S, options: DecoderOptions) -> EventStream<S, BlockGrammar>
where
    S: Stream<Item = Result<Bytes, E>>,
    E: std::fmt::Display,
{
    EventStream::new(source, BlockGrammar::new(), options)
}
