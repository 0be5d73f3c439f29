//! Stream frame decoder.
//!
//! Turns the raw bytes of a streamed chat response into ordered text deltas.
//! The body is a sequence of event blocks separated by a blank line
//! (`"\n\n"`); each block carries its payload after a literal `data:` marker:
//!
//! ```text
//! data: Hello\n\n
//! data:  world\n\n
//! data: [DONE]\n\n
//! ```
//!
//! Network reads do not line up with blocks, or even with UTF-8 character
//! boundaries, so both the text decoding and the frame splitting carry state
//! between chunks. The payload is kept byte for byte, including the space
//! after the colon: the backend emits `data: {chunk}` and the reconstructed
//! text depends on that spacing.

use std::collections::VecDeque;

use futures::stream::{self, Stream, StreamExt};

use crate::error::TransportError;

/// Separator between event blocks.
pub const FRAME_SEPARATOR: &str = "\n\n";

/// Marker preceding a block's payload.
pub const DATA_MARKER: &str = "data:";

/// Control payload marking the end of generation.
pub const DONE_SENTINEL: &str = "[DONE]";

/// Incremental UTF-8 decoder.
///
/// Holds back an incomplete trailing multi-byte sequence until the next chunk
/// completes it. Invalid sequences become U+FFFD.
#[derive(Debug, Default)]
struct Utf8Carry {
    pending: Vec<u8>,
}

impl Utf8Carry {
    fn decode(&mut self, chunk: &[u8], out: &mut String) {
        self.pending.extend_from_slice(chunk);
        let mut consumed = 0;
        loop {
            match std::str::from_utf8(&self.pending[consumed..]) {
                Ok(valid) => {
                    out.push_str(valid);
                    consumed = self.pending.len();
                    break;
                }
                Err(err) => {
                    let valid_up_to = consumed + err.valid_up_to();
                    // valid_up_to bytes were just checked as UTF-8
                    out.push_str(&String::from_utf8_lossy(&self.pending[consumed..valid_up_to]));
                    match err.error_len() {
                        Some(len) => {
                            out.push(char::REPLACEMENT_CHARACTER);
                            consumed = valid_up_to + len;
                        }
                        None => {
                            consumed = valid_up_to;
                            break;
                        }
                    }
                }
            }
        }
        self.pending.drain(..consumed);
    }

    fn pending_len(&self) -> usize {
        self.pending.len()
    }
}

/// Push-style decoder from byte chunks to text deltas.
#[derive(Debug, Default)]
pub struct FrameDecoder {
    utf8: Utf8Carry,
    carry: String,
    // Prefix of `carry` already searched for a separator.
    scanned: usize,
}

impl FrameDecoder {
    /// Create a decoder with empty buffers.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed one chunk and return the deltas completed by it, in order.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<String> {
        self.utf8.decode(chunk, &mut self.carry);

        let mut deltas = Vec::new();
        let mut start = 0;
        let mut from = self.scanned;
        while let Some(offset) = self.carry[from..].find(FRAME_SEPARATOR) {
            let end = from + offset;
            if let Some(delta) = parse_frame(&self.carry[start..end]) {
                deltas.push(delta.to_string());
            }
            start = end + FRAME_SEPARATOR.len();
            from = start;
        }
        self.carry.drain(..start);
        // A trailing '\n' may be the first half of the next separator.
        self.scanned = if self.carry.ends_with('\n') {
            self.carry.len() - 1
        } else {
            self.carry.len()
        };
        deltas
    }

    /// Bytes and characters held back waiting for more input.
    #[must_use]
    pub fn buffered_len(&self) -> usize {
        self.carry.len() + self.utf8.pending_len()
    }

    /// End of input: drop any unterminated trailing frame.
    ///
    /// Returns how many buffered bytes were discarded.
    pub fn finish(&mut self) -> usize {
        let dropped = self.buffered_len();
        if dropped > 0 {
            tracing::debug!(dropped, "discarding unterminated trailing frame");
        }
        self.carry.clear();
        self.scanned = 0;
        self.utf8.pending.clear();
        dropped
    }
}

/// Extract the delta carried by one complete frame.
///
/// Returns `None` for frames without a `data:` marker and for the `[DONE]`
/// sentinel (compared after trimming).
#[must_use]
pub fn parse_frame(frame: &str) -> Option<&str> {
    let Some(index) = frame.find(DATA_MARKER) else {
        tracing::trace!(len = frame.len(), "skipping frame without data marker");
        return None;
    };
    let payload = &frame[index + DATA_MARKER.len()..];
    if payload.trim() == DONE_SENTINEL {
        tracing::trace!("done sentinel received");
        return None;
    }
    Some(payload)
}

/// Decode a byte stream into a lazy stream of deltas.
///
/// Deltas are yielded in arrival order. A read error is yielded once, after
/// every delta completed before it, and ends the stream. Normal end of input
/// discards any unterminated trailing frame.
pub fn decode_stream<S>(bytes: S) -> impl Stream<Item = Result<String, TransportError>>
where
    S: Stream<Item = Result<Vec<u8>, TransportError>> + Unpin,
{
    let state = (bytes, FrameDecoder::new(), VecDeque::new(), false);
    stream::unfold(state, |(mut bytes, mut decoder, mut ready, done)| async move {
        loop {
            if let Some(delta) = ready.pop_front() {
                return Some((Ok(delta), (bytes, decoder, ready, done)));
            }
            if done {
                return None;
            }
            match bytes.next().await {
                Some(Ok(chunk)) => ready.extend(decoder.push(&chunk)),
                Some(Err(err)) => return Some((Err(err), (bytes, decoder, ready, true))),
                None => {
                    decoder.finish();
                    return None;
                }
            }
        }
    })
}
