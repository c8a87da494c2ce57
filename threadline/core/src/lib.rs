//! Threadline Core - Streaming Chat Reconciliation Engine
//!
//! This crate rebuilds a structured, chronologically ordered transcript from a
//! chat service's server-sent event stream. It handles live generation and
//! history replay with the same pipeline, tolerates duplicated delivery, and
//! keeps segment order correct even when updates are applied late, in batches.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────┐
//! │                        Chat Service                              │
//! │         POST /api/v1/chat/stream    GET /threads/{id}/replay     │
//! └───────────────┬──────────────────────────────┬───────────────────┘
//!                 │ bytes                        │ bytes
//! ┌───────────────┼──────────────────────────────┼───────────────────┐
//! │               ▼                              ▼                   │
//! │  ┌─────────────────────────────────────────────────────────────┐ │
//! │  │  transport (ChatTransport) ──▶ sse (SseDecoder) ──▶ events  │ │
//! │  └──────────────────────────────┬──────────────────────────────┘ │
//! │                                 │ ChatEvent                      │
//! │          ┌──────────────────────┴──────────────────────┐         │
//! │          ▼                                             ▼         │
//! │  ┌───────────────┐                           ┌────────────────┐  │
//! │  │  Coordinator  │                           │     Replay     │  │
//! │  │  (live turns) │                           │  (history)     │  │
//! │  └───────┬───────┘                           └───────┬────────┘  │
//! │          └──────────────────┬────────────────────────┘           │
//! │                             ▼                                    │
//! │  ┌─────────────────────────────────────────────────────────────┐ │
//! │  │ Turn: ordering ledger ─▶ assembler ─▶ segments + processes  │ │
//! │  └─────────────────────────────────────────────────────────────┘ │
//! │                             │                                    │
//! │                   Transcript / TranscriptUpdate                  │
//! └─────────────────────────────┼────────────────────────────────────┘
//!                               ▼
//!                        rendering layer
//! ```
//!
//! # Key Types
//!
//! - [`TurnCoordinator`]: sends messages and drives live turns
//! - [`ReplayReconciler`]: rebuilds turns from a thread's history
//! - [`Transcript`]: the published, ordered list of turns
//! - [`Turn`]: one user message and the assistant's response
//! - [`Segment`]: an ordered unit of a response (text or marker)
//! - [`ChatTransport`]: the seam to the chat service
//!
//! # Quick Start
//!
//! ```ignore
//! use std::sync::Arc;
//! use threadline_core::{
//!     config::load_config, CoordinatorConfig, HttpTransport, SendOptions, TurnCoordinator,
//! };
//! use tokio::sync::mpsc;
//!
//! let config = load_config()?;
//! let transport = Arc::new(HttpTransport::from_config(&config)?);
//! let (tx, mut rx) = mpsc::channel(256);
//! let mut coordinator = TurnCoordinator::new(transport, CoordinatorConfig::from(&config), tx);
//!
//! let outcome = coordinator.send_message("Summarize my watchlist", SendOptions::default()).await?;
//! ```
//!
//! # Module Overview
//!
//! - [`sse`]: byte stream to `id` / `event` / `data` frames
//! - [`events`]: typed chat events and their classification
//! - [`ordering`]: per-turn position counter and de-duplication guards
//! - [`process`]: reasoning, tool-call and task-list trackers
//! - [`segments`]: segment types and render order
//! - [`assembler`]: event to deferred update, update to segment list
//! - [`turn`]: turn lifecycle
//! - [`transcript`]: ordered turns and published updates
//! - [`coordinator`]: live turn driver
//! - [`replay`]: history reconciliation
//! - [`session`]: process-wide session flags
//! - [`transport`]: chat service access
//! - [`config`]: TOML / environment configuration

#![deny(missing_docs)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod assembler;
pub mod config;
pub mod coordinator;
pub mod events;
pub mod ids;
pub mod ordering;
pub mod process;
pub mod replay;
pub mod segments;
pub mod session;
pub mod sse;
pub mod transcript;
pub mod transport;
pub mod turn;

// Re-exports for convenience
pub use assembler::{ProcessChange, TurnUpdate};
pub use config::{ConfigError, ConfigOverrides, ConfigSource, ThreadlineConfig};
pub use coordinator::{
    AbortHandle, CoordinatorConfig, CoordinatorError, SendOptions, TurnCoordinator, TurnOutcome,
    UpdateBatch,
};
pub use events::{ChatEvent, ContentEvent, ControlEvent, EventKind};
pub use ids::{ThreadId, TurnId, WorkspaceId, NEW_THREAD_SENTINEL};
pub use ordering::{OrderingLedger, Position};
pub use process::{
    ProcessRecord, ProcessTracker, ReasoningProcess, TaskListProcess, ToolCallProcess,
    TurnProcesses,
};
pub use replay::{ReplayReconciler, ReplaySummary};
pub use segments::{render_blocks, MarkerKey, OrderingError, RenderBlock, Segment};
pub use session::SessionState;
pub use sse::{decode_stream, DecodeError, SseDecoder, SseFrame};
pub use transcript::{Transcript, TranscriptEntry, TranscriptUpdate};
pub use transport::{
    ChatRequest, ChatTransport, HttpTransport, Script, ScriptedTransport, TransportError,
};
pub use turn::{AssistantResponse, Role, Turn, TurnError, TurnStatus};
