//! Line splitting for server-sent event bodies.
//!
//! A response body arrives as arbitrary byte chunks; a single `data:` line may
//! be split across several of them, and one chunk may hold many lines. This
//! module buffers bytes until a full line is available and hands each line to
//! [`decode_line`](crate::events::decode_line).
//!
//! The resulting stream ends in one of three ways:
//!
//! - `data: [DONE]`, or the body closing after `message_stop`: clean close
//! - the body closing before any terminal event: one `Err(Error::Stream)`
//! - the interrupt flag being raised: one `Err(Error::Interrupted)`
//!
//! Nothing is yielded after a terminal error.

use crate::events::{SseLine, StreamEvent, decode_line};
use crate::interrupt::InterruptHandle;
use crate::{Error, Result};
use bytes::Bytes;
use futures::stream::{self, Fuse, Stream, StreamExt};
use std::pin::Pin;

/// Raw response body chunks
pub type ByteStream = Pin<Box<dyn Stream<Item = Result<Bytes>> + Send>>;

/// Decoded stream events
pub type EventStream = Pin<Box<dyn Stream<Item = Result<StreamEvent>> + Send>>;

/// Text fragments forwarded as they arrive
pub type TextStream = Pin<Box<dyn Stream<Item = Result<String>> + Send>>;

struct LineState {
    body: Fuse<ByteStream>,
    buffer: Vec<u8>,
    interrupt: InterruptHandle,
    saw_terminal: bool,
    finished: bool,
}

impl LineState {
    /// Take the next complete line out of the buffer.
    fn next_line(&mut self) -> Option<String> {
        let pos = self.buffer.iter().position(|b| *b == b'\n')?;
        let line: Vec<u8> = self.buffer.drain(..=pos).collect();
        Some(String::from_utf8_lossy(&line).into_owned())
    }

    /// Whatever is left once the body has closed.
    fn remainder(&mut self) -> Option<String> {
        if self.buffer.is_empty() {
            return None;
        }
        let line = std::mem::take(&mut self.buffer);
        Some(String::from_utf8_lossy(&line).into_owned())
    }

    /// Classify a line. `Some` means the stream has something to yield or is
    /// done; `None` means keep reading.
    fn handle(&mut self, line: &str) -> Option<Option<Result<StreamEvent>>> {
        match decode_line(line) {
            SseLine::Skip => None,
            SseLine::Done => {
                log::debug!("Stream finished with [DONE]");
                self.finished = true;
                Some(None)
            }
            SseLine::Event(event) => {
                if event.is_terminal() {
                    self.saw_terminal = true;
                }
                Some(Some(Ok(event)))
            }
        }
    }
}

/// Decode a byte stream into stream events.
///
/// `interrupt` is checked before every item and raced against every body
/// read, so a stalled body does not delay it. Once raised the stream yields
/// [`Error::Interrupted`] and ends, dropping `body` along with any buffered
/// partial line.
pub fn decode_stream(body: ByteStream, interrupt: InterruptHandle) -> EventStream {
    let state = LineState {
        body: body.fuse(),
        buffer: Vec::new(),
        interrupt,
        saw_terminal: false,
        finished: false,
    };

    let events = stream::unfold(state, |mut state| async move {
        loop {
            if state.finished {
                return None;
            }

            if state.interrupt.is_interrupted() {
                log::debug!("Stream interrupted, discarding {} buffered bytes", state.buffer.len());
                state.finished = true;
                state.buffer.clear();
                return Some((Err(Error::Interrupted), state));
            }

            if let Some(line) = state.next_line() {
                match state.handle(&line) {
                    Some(Some(item)) => return Some((item, state)),
                    Some(None) => return None,
                    None => continue,
                }
            }

            let next = tokio::select! {
                biased;
                _ = state.interrupt.interrupted() => None,
                chunk = state.body.next() => Some(chunk),
            };
            let Some(next) = next else {
                continue;
            };

            match next {
                Some(Ok(chunk)) => state.buffer.extend_from_slice(&chunk),
                Some(Err(e)) => {
                    state.finished = true;
                    return Some((Err(e), state));
                }
                None => {
                    if let Some(line) = state.remainder() {
                        match state.handle(&line) {
                            Some(Some(item)) => return Some((item, state)),
                            Some(None) => return None,
                            None => {}
                        }
                    }

                    state.finished = true;
                    if state.saw_terminal {
                        return None;
                    }
                    return Some((
                        Err(Error::stream("connection closed before message_stop")),
                        state,
                    ));
                }
            }
        }
    });

    Box::pin(events)
}

/// Adapt a `reqwest` body into a [`ByteStream`].
pub fn body_stream(response: reqwest::Response) -> ByteStream {
    Box::pin(response.bytes_stream().map(|chunk| chunk.map_err(Error::from)))
}
