//! Turn events and the handlers that observe them.
//!
//! The [`TurnController`](super::controller::TurnController) reports every
//! step of a turn through [`TurnEvent`] variants. Callers implement
//! [`EventHandler`] to log, render diagnostics or collect metrics.
//!
//! | Handler | Use case |
//! |---------|----------|
//! | [`NoopHandler`] | Tests and silent runs |
//! | [`LoggingHandler`] | Structured logging via `tracing` |
//! | [`FnEventHandler`] | Quick closures for simple callbacks |

use tracing::{debug, info, warn};

use crate::agent::state::{ContextField, HistoryEntry};
use crate::context::compression::CompressionStats;
use crate::error::{CallStage, ModelCallError, TurnError};

// ── Events ─────────────────────────────────────────────────────────

/// Events emitted by the controller.
#[derive(Debug)]
pub enum TurnEvent<'a> {
    /// A journey was seeded and the first reply generated.
    JourneyStarted { seed_chars: usize },
    /// Seeding was refused because required fields are empty.
    MissingInfo { fields: &'a [ContextField] },
    /// An operation was refused without touching the model.
    Rejected { error: &'a TurnError },
    /// The working transcript was below the compression gate.
    CompressionSkipped { chars: usize },
    /// The compression pass finished.
    Compressed { stats: &'a CompressionStats },
    /// The compression output lacked its delimiter and was carried forward
    /// in fallback markers.
    CompressionDegraded { payload_chars: usize },
    /// An assistant reply was produced.
    Reply { turn: u32, text: &'a str },
    /// A model call failed; the state was left unchanged.
    ModelCallFailed {
        stage: CallStage,
        error: &'a ModelCallError,
    },
    /// A context variable was updated.
    ContextUpdated {
        field: ContextField,
        disconnected: &'a [ContextField],
    },
    /// An outcome was appended to the history record.
    OutcomeRecorded { entry: &'a HistoryEntry },
}

/// Handler for turn events.
///
/// The default implementation ignores every event.
pub trait EventHandler: Send + Sync {
    fn on_event(&self, event: &TurnEvent<'_>) {
        let _ = event;
    }
}

/// Ignores every event.
pub struct NoopHandler;
impl EventHandler for NoopHandler {}

/// An event handler backed by a closure.
///
/// ```
/// use acbud_rs::agent::events::{EventHandler, FnEventHandler, TurnEvent};
///
/// let handler = FnEventHandler::new(|event| {
///     if let TurnEvent::Reply { text, .. } = event {
///         println!("{text}");
///     }
/// });
/// handler.on_event(&TurnEvent::Reply { turn: 1, text: "hi" });
/// ```
pub struct FnEventHandler<F>(F)
where
    F: Fn(&TurnEvent<'_>) + Send + Sync;

impl<F> FnEventHandler<F>
where
    F: Fn(&TurnEvent<'_>) + Send + Sync,
{
    pub fn new(f: F) -> Self {
        Self(f)
    }
}

impl<F> EventHandler for FnEventHandler<F>
where
    F: Fn(&TurnEvent<'_>) + Send + Sync,
{
    fn on_event(&self, event: &TurnEvent<'_>) {
        (self.0)(event)
    }
}

/// Logs every event through `tracing`.
pub struct LoggingHandler;

impl EventHandler for LoggingHandler {
    fn on_event(&self, event: &TurnEvent<'_>) {
        match event {
            TurnEvent::JourneyStarted { seed_chars } => {
                info!("Journey started ({seed_chars} char seed)");
            }
            TurnEvent::MissingInfo { fields } => {
                let keys: Vec<&str> = fields.iter().map(|f| f.key()).collect();
                info!("Journey not started, missing: {}", keys.join(", "));
            }
            TurnEvent::Rejected { error } => {
                info!("Request rejected: {error}");
            }
            TurnEvent::CompressionSkipped { chars } => {
                debug!("Compression skipped ({chars} chars)");
            }
            TurnEvent::Compressed { stats } => {
                debug!("Compressed: {}", stats.to_log_string());
            }
            TurnEvent::CompressionDegraded { payload_chars } => {
                warn!("Compression output missing <prompt>; carrying {payload_chars} chars in fallback markers");
            }
            TurnEvent::Reply { turn, text } => {
                info!("Turn {turn} reply ({} chars)", text.len());
            }
            TurnEvent::ModelCallFailed { stage, error } => {
                warn!("{stage} call failed: {error}");
            }
            TurnEvent::ContextUpdated {
                field,
                disconnected,
            } => {
                if disconnected.is_empty() {
                    info!("Updated {field}");
                } else {
                    let keys: Vec<&str> = disconnected.iter().map(|f| f.key()).collect();
                    info!("Updated {field}; out of date: {}", keys.join(", "));
                }
            }
            TurnEvent::OutcomeRecorded { entry } => {
                info!("Recorded outcome ({} effectiveness)", entry.effectiveness);
            }
        }
    }
}
