// src/relay/mod.rs
//! Streaming relay between workers and callers
//!
//! A run's response body is either forwarded as raw flushed chunks (the
//! dispatch endpoint's passthrough mode) or decoded into typed events:
//!
//! - **event**: the `StreamEvent` union carried by each SSE frame, with
//!   the terminal `end` event closing every run
//! - **sse**: incremental frame decoding bounded by one frame of memory,
//!   plus the body-to-event-stream adapter
//!
//! The relay never buffers a whole response and never restarts a stream.

pub mod event;
pub mod sse;

// Re-export commonly used types
pub use event::{EndEvent, StreamEvent};
pub use sse::{event_stream, SseDecoder};
