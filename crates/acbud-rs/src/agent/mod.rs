//! Conversation runtime: the [`TurnController`] state machine and the types
//! it threads between turns.
//!
//! - [`controller::TurnController`]: seeds journeys and runs
//!   compress-then-generate turns. Start here.
//! - [`config::BuddyConfig`]: model, token limits, template set and
//!   compression settings.
//! - [`state`]: [`ConversationState`], context variables, timeline and
//!   history record.
//! - [`template`]: [`TemplateSet`] with the built-in accountability seed.
//! - [`events`]: [`EventHandler`] trait and [`TurnEvent`] enum for
//!   observing turns.
//! - [`session`]: [`SessionStore`] serializing access per conversation.

pub mod config;
pub mod controller;
pub mod events;
pub mod session;
pub mod state;
pub mod template;

pub use config::BuddyConfig;
pub use controller::{Reply, TurnController, TurnOutcome};
pub use events::{EventHandler, FnEventHandler, LoggingHandler, NoopHandler, TurnEvent};
pub use session::{SessionError, SessionStore};
pub use state::{
    ContextField, ContextVariables, ConversationState, Effectiveness, HistoryEntry,
    HistoryRecord, JourneyRecord, JourneyStatus, Timeline,
};
pub use template::{TemplateError, TemplateSet};
