//! Convenience re-exports for common `acbud-rs` types.
//!
//! ```ignore
//! use acbud_rs::prelude::*;
//! ```
//!
//! Pulls in the client, the controller with its config and state types, the
//! event handlers and the invoker trait. Compression internals and the retry
//! policy are left out; import those from their modules directly.

// ── Core types ──────────────────────────────────────────────────────
pub use crate::{ClientOptions, OpenRouterClient};

// ── Conversation runtime ────────────────────────────────────────────
pub use crate::agent::{
    BuddyConfig, ContextField, ContextVariables, ConversationState, Effectiveness,
    EventHandler, FnEventHandler, JourneyStatus, LoggingHandler, NoopHandler, Reply,
    SessionStore, TemplateSet, TurnController, TurnEvent, TurnOutcome,
};

// ── Model boundary ──────────────────────────────────────────────────
pub use crate::api::{ModelInvoker, ModelRequest, ScriptedInvoker};

// ── Errors ──────────────────────────────────────────────────────────
pub use crate::error::{ModelCallError, TurnError};
