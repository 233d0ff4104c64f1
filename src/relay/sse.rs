// src/relay/sse.rs
//! Incremental SSE frame decoding
//!
//! Workers answer `POST /run` with `text/event-stream` where every frame
//! is `data: <json>` terminated by a blank line. The decoder reassembles
//! arbitrary byte chunks into frames and deserializes each payload into a
//! [`StreamEvent`]. Buffering is bounded by the largest single frame: a
//! chunk that does not complete a frame stays in the buffer, completed
//! frames are split off as soon as they are emitted.

use crate::relay::event::StreamEvent;
use crate::utils::errors::{HostError, Result};
use bytes::{Bytes, BytesMut};
use futures::Stream;
use http_body_util::BodyExt;
use hyper::body::Body;
use std::collections::VecDeque;

/// Incremental decoder from SSE bytes to typed stream events
#[derive(Debug, Default)]
pub struct SseDecoder {
    buf: BytesMut,
}

impl SseDecoder {
    /// Create an empty decoder
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed one chunk, returning every event completed by it, in order
    ///
    /// Events are emitted only for complete frames; a partial frame stays
    /// buffered until a later chunk finishes it. A frame whose payload is
    /// not valid JSON fails the whole stream with [`HostError::Relay`].
    pub fn feed(&mut self, chunk: &[u8]) -> Result<Vec<StreamEvent>> {
        self.buf.extend_from_slice(chunk);

        let mut events = Vec::new();
        while let Some(frame_len) = find_frame_end(&self.buf) {
            let frame = self.buf.split_to(frame_len);
            if let Some(payload) = data_payload(&frame) {
                let event = serde_json::from_str(&payload).map_err(|e| {
                    HostError::Relay(format!("undecodable frame payload: {e}"))
                })?;
                events.push(event);
            }
        }

        Ok(events)
    }

    /// Bytes held for a not-yet-complete frame
    pub fn buffered(&self) -> usize {
        self.buf.len()
    }

    /// True when no partial frame is buffered
    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }
}

/// Length of the first complete frame (including its blank-line
/// terminator), if one is buffered
fn find_frame_end(buf: &[u8]) -> Option<usize> {
    let mut i = 0;
    while i < buf.len() {
        // A frame ends at an empty line: \n\n or \r\n\r\n (and mixes).
        if buf[i] == b'\n' {
            let rest = &buf[i + 1..];
            if rest.first() == Some(&b'\n') {
                return Some(i + 2);
            }
            if rest.len() >= 2 && rest[0] == b'\r' && rest[1] == b'\n' {
                return Some(i + 3);
            }
        }
        i += 1;
    }
    None
}

/// Concatenated `data:` payload of one frame, or `None` for frames that
/// carry no data lines (comments, other SSE fields)
fn data_payload(frame: &[u8]) -> Option<String> {
    let text = String::from_utf8_lossy(frame);
    let mut payload = String::new();
    for line in text.lines() {
        if let Some(rest) = line.strip_prefix("data:") {
            if !payload.is_empty() {
                payload.push('\n');
            }
            payload.push_str(rest.strip_prefix(' ').unwrap_or(rest));
        }
    }

    if payload.is_empty() {
        None
    } else {
        Some(payload)
    }
}

/// Adapt a streaming HTTP body into a lazy, forward-only sequence of
/// decoded stream events
pub fn event_stream<B>(body: B) -> impl Stream<Item = Result<StreamEvent>>
where
    B: Body<Data = Bytes> + Unpin,
    B::Error: std::fmt::Display,
{
    futures::stream::try_unfold(
        (body, SseDecoder::new(), VecDeque::new()),
        |(mut body, mut decoder, mut pending)| async move {
            loop {
                if let Some(event) = pending.pop_front() {
                    return Ok(Some((event, (body, decoder, pending))));
                }

                match body.frame().await {
                    None => return Ok(None),
                    Some(Err(e)) => {
                        return Err(HostError::Relay(format!("worker stream failed: {e}")))
                    }
                    Some(Ok(frame)) => {
                        if let Ok(data) = frame.into_data() {
                            pending.extend(decoder.feed(&data)?);
                        }
                    }
                }
            }
        },
    )
}
