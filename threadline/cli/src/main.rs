//! Threadline CLI
//!
//! Talks to a chat service from the terminal: send a message and watch the
//! response stream in, replay a thread's history, or reconcile a captured
//! event stream offline.
//!
//! # Usage
//!
//! ```bash
//! # Start a new thread
//! threadline send "What moved the market today?"
//!
//! # Continue an existing thread (its history is replayed first)
//! threadline send --thread t-42 "And tomorrow?"
//!
//! # Show a thread's history
//! threadline replay t-42
//!
//! # Reconcile a captured SSE stream
//! threadline decode capture.sse --json
//!
//! # With verbose logging
//! RUST_LOG=debug threadline send "hi"
//! ```
//!
//! # Environment Variables
//!
//! - `THREADLINE_BASE_URL`: Chat service base URL
//! - `THREADLINE_USER_ID`: Value of the `X-User-Id` header
//! - `THREADLINE_WORKSPACE`: Workspace identifier
//! - `THREADLINE_BATCH_SIZE`: Updates applied per flush
//! - `THREADLINE_TIMEOUT`: Replay request timeout in seconds
//! - `RUST_LOG`: Log level (trace, debug, info, warn, error)
//!
//! # Signals
//!
//! - SIGINT: Cancel the in-flight turn (a second SIGINT exits)

mod render;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tokio::signal;
use tokio::sync::mpsc;
use tracing::{info, warn};

use threadline_core::config::{default_config_path, load_config_from_path};
use threadline_core::transport::{Script, ScriptedTransport};
use threadline_core::{
    ChatEvent, ConfigOverrides, ControlEvent, CoordinatorConfig, HttpTransport, ReplayReconciler,
    SendOptions, SessionState, SseDecoder, ThreadId, ThreadlineConfig, Transcript,
    TranscriptUpdate, TurnCoordinator,
};

/// Thread id used for offline decoding
const LOCAL_THREAD: &str = "local";

/// User text shown for a captured live stream, which carries none
const CAPTURED_PROMPT: &str = "(captured stream)";

#[derive(Debug, Parser)]
#[command(name = "threadline", version, about = "Streaming chat reconciliation client")]
struct Cli {
    /// Config file (defaults to the user config directory)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Chat service base URL
    #[arg(long, global = true)]
    base_url: Option<String>,

    /// User identifier sent with every request
    #[arg(long, global = true)]
    user_id: Option<String>,

    /// Workspace identifier
    #[arg(long, global = true)]
    workspace: Option<String>,

    /// Updates applied per flush
    #[arg(long, global = true)]
    batch_size: Option<usize>,

    /// Print turns as JSON
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Send a message and stream the response
    Send {
        /// Message text
        message: String,
        /// Continue this thread instead of starting a new one
        #[arg(long)]
        thread: Option<String>,
        /// Ask the service for a plan before acting
        #[arg(long)]
        plan: bool,
    },
    /// Start a new thread with the guided onboarding turn
    Onboard,
    /// Print a thread's history
    Replay {
        /// Thread identifier
        thread: String,
    },
    /// Reconcile a captured event stream file
    Decode {
        /// File holding raw SSE bytes
        file: PathBuf,
    },
}

impl Cli {
    fn overrides(&self) -> ConfigOverrides {
        ConfigOverrides {
            base_url: self.base_url.clone(),
            user_id: self.user_id.clone(),
            workspace_id: self.workspace.clone(),
            apply_batch_size: self.batch_size,
            plan_mode: None,
        }
    }

    fn load_config(&self) -> anyhow::Result<ThreadlineConfig> {
        let path = self.config.clone().or_else(default_config_path);
        let mut config = load_config_from_path(path).context("failed to load configuration")?;
        self.overrides().apply(&mut config);
        config.validate().context("invalid configuration")?;
        Ok(config)
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("threadline=info".parse()?)
                .add_directive("threadline_core=info".parse()?),
        )
        .with_target(true)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match &cli.command {
        Command::Send {
            message,
            thread,
            plan,
        } => {
            let config = cli.load_config()?;
            let options = SendOptions {
                plan_mode: plan.then_some(true),
                additional_context: None,
            };
            send(&config, thread.clone(), message, options, cli.json).await
        }
        Command::Onboard => {
            let config = cli.load_config()?;
            onboard(&config, cli.json).await
        }
        Command::Replay { thread } => {
            let config = cli.load_config()?;
            replay(&config, thread, cli.json).await
        }
        Command::Decode { file } => decode(file, cli.json).await,
    }
}

fn print_transcript(transcript: &Transcript, json: bool) -> anyhow::Result<()> {
    if json {
        let turns: Vec<_> = transcript.turns().iter().map(render::turn_json).collect();
        println!("{}", serde_json::to_string_pretty(&turns)?);
    } else {
        for turn in transcript.turns() {
            print!("{}", render::turn_text(turn));
        }
    }
    Ok(())
}

/// Log published updates until the coordinator is dropped
fn spawn_update_logger(mut rx: mpsc::Receiver<TranscriptUpdate>) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(update) = rx.recv().await {
            match update {
                TranscriptUpdate::TurnStarted(turn) => info!(turn_id = %turn.id, "turn started"),
                TranscriptUpdate::TurnUpdated(turn) => {
                    tracing::debug!(
                        turn_id = %turn.id,
                        segments = turn.response.segments.len(),
                        "turn updated"
                    );
                }
                TranscriptUpdate::ThreadAssigned { thread_id } => {
                    info!(thread_id = %thread_id, "thread assigned");
                }
                TranscriptUpdate::TurnFinished { turn_id, status } => {
                    info!(turn_id = %turn_id, status = %status, "turn finished");
                }
                TranscriptUpdate::TurnFailed { turn_id, message } => {
                    warn!(turn_id = %turn_id, message = %message, "turn failed");
                }
                TranscriptUpdate::ReplayLoaded { thread_id, turns } => {
                    info!(thread_id = %thread_id, turns, "history loaded");
                }
            }
        }
    })
}

fn coordinator(
    config: &ThreadlineConfig,
) -> anyhow::Result<(TurnCoordinator<HttpTransport>, tokio::task::JoinHandle<()>)> {
    let transport = Arc::new(HttpTransport::from_config(config)?);
    let (tx, rx) = mpsc::channel(256);
    let logger = spawn_update_logger(rx);
    let coordinator = TurnCoordinator::new(transport, CoordinatorConfig::from(config), tx);
    Ok((coordinator, logger))
}

async fn send(
    config: &ThreadlineConfig,
    thread: Option<String>,
    message: &str,
    options: SendOptions,
    json: bool,
) -> anyhow::Result<()> {
    let (coordinator, logger) = coordinator(config)?;
    let mut coordinator = match thread {
        Some(id) => coordinator.with_thread(ThreadId::from(id)),
        None => coordinator,
    };

    coordinator
        .load_history()
        .await
        .context("failed to load thread history")?;

    let abort = coordinator.abort_handle();
    let outcome = {
        let send = coordinator.send_message(message, options);
        tokio::pin!(send);
        tokio::select! {
            outcome = &mut send => outcome?,
            _ = signal::ctrl_c() => {
                abort.abort();
                info!("cancelling, press Ctrl-C again to exit");
                tokio::select! {
                    outcome = &mut send => outcome?,
                    _ = signal::ctrl_c() => std::process::exit(130),
                }
            }
        }
    };

    print_transcript(coordinator.transcript(), json)?;
    if let ThreadId::Assigned(id) = coordinator.thread_id() {
        eprintln!("thread: {id}");
    }
    drop(coordinator);
    let _ = logger.await;

    if !outcome.is_complete() {
        anyhow::bail!(
            "turn failed: {}",
            outcome.error.as_deref().unwrap_or("unknown error")
        );
    }
    Ok(())
}

async fn onboard(config: &ThreadlineConfig, json: bool) -> anyhow::Result<()> {
    let session = SessionState::init();
    let (mut coordinator, logger) = coordinator(config)?;

    let context = serde_json::json!({ "flow": "onboarding", "client": "threadline-cli" });
    match coordinator.start_onboarding(&session, context).await? {
        Some(outcome) if !outcome.is_complete() => {
            warn!(error = ?outcome.error, "onboarding turn failed");
        }
        Some(_) => {}
        None => info!("onboarding already ran"),
    }

    print_transcript(coordinator.transcript(), json)?;
    drop(coordinator);
    let _ = logger.await;
    Ok(())
}

async fn replay(config: &ThreadlineConfig, thread: &str, json: bool) -> anyhow::Result<()> {
    let (coordinator, logger) = coordinator(config)?;
    let mut coordinator = coordinator.with_thread(ThreadId::from(thread.to_string()));

    let summary = coordinator.load_history().await?;
    if !summary.found {
        eprintln!("thread {thread} has no history");
    }
    print_transcript(coordinator.transcript(), json)?;
    drop(coordinator);
    let _ = logger.await;
    Ok(())
}

async fn decode(file: &PathBuf, json: bool) -> anyhow::Result<()> {
    let bytes = tokio::fs::read(file)
        .await
        .with_context(|| format!("failed to read {}", file.display()))?;

    let transcript = reconcile_capture(bytes).await?;
    print_transcript(&transcript, json)
}

/// Whether a capture is a persisted feed rather than one live response
///
/// Only persisted feeds carry `user_message` events.
fn is_replay_feed(bytes: &[u8]) -> bool {
    let mut decoder = SseDecoder::new();
    decoder.push(bytes);
    decoder.finish().into_iter().flatten().any(|frame| {
        matches!(
            ChatEvent::from_frame(&frame),
            Ok(Some(ChatEvent::Control(ControlEvent::UserMessage(_))))
        )
    })
}

/// Rebuild the transcript a captured stream describes
///
/// A persisted feed goes through replay. A live `/chat/stream` capture is
/// played through a coordinator as the response to one implicit message.
async fn reconcile_capture(bytes: Vec<u8>) -> anyhow::Result<Transcript> {
    if is_replay_feed(&bytes) {
        let transport =
            ScriptedTransport::new().with_replay(LOCAL_THREAD, Script::Stream(vec![bytes]));
        let mut transcript = Transcript::default();
        let summary = ReplayReconciler::replay(&transport, LOCAL_THREAD, &mut transcript).await?;
        info!(
            turns = summary.turns_touched,
            applied = summary.updates_applied,
            duplicates = summary.duplicates_dropped,
            orphaned = summary.orphaned_events,
            "decoded persisted feed"
        );
        return Ok(transcript);
    }

    let transport = Arc::new(ScriptedTransport::new().with_chat(Script::Stream(vec![bytes])));
    let (tx, _) = mpsc::channel(1);
    let mut coordinator = TurnCoordinator::new(transport, CoordinatorConfig::default(), tx);
    let outcome = coordinator
        .send_message(CAPTURED_PROMPT, SendOptions::default())
        .await?;
    info!(status = %outcome.status, "decoded live capture");
    Ok(coordinator.transcript().clone())
}
