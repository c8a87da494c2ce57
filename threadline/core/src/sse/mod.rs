//! Event Frame Decoding
//!
//! Turns the raw bytes of a chat or replay response into discrete
//! `id` / `event` / `data` records.
//!
//! # Usage
//!
//! ```ignore
//! use threadline_core::sse::{decode_stream, DEFAULT_MAX_FRAME_BYTES};
//!
//! let frames = decode_stream(response.bytes_stream(), DEFAULT_MAX_FRAME_BYTES);
//! while let Some(frame) = frames.next().await {
//!     // classify with ChatEvent::from_frame
//! }
//! ```

mod decoder;

pub use decoder::{
    decode_stream, DecodeError, FrameStream, SseDecoder, SseFrame, DEFAULT_MAX_FRAME_BYTES,
};
