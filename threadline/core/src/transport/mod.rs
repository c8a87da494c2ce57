//! Chat Service Transport
//!
//! Abstracted access to the chat service through a common trait.
//!
//! # Available Transports
//!
//! - **Http**: the real service (`reqwest`, streamed body)
//! - **Scripted**: canned byte chunks, for tests and offline decoding
//!
//! # Usage
//!
//! ```ignore
//! use threadline_core::transport::{ChatTransport, HttpTransport};
//!
//! let transport = HttpTransport::new("http://localhost:8000", "user-1")?;
//! let frames = transport.stream_chat(&request).await?;
//! ```

mod http;
mod scripted;
mod traits;

pub use http::{HttpTransport, USER_ID_HEADER};
pub use scripted::{encode_frame, Script, ScriptedTransport};
pub use traits::{ChatRequest, ChatTransport, HistoryMessage, TransportError};
