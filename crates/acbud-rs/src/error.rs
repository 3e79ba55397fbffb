//! Error taxonomy for the conversation engine.
//!
//! None of these are fatal. The [`TurnController`](crate::agent::controller::TurnController)
//! converts each of them into a user-visible [`Reply`](crate::agent::controller::Reply)
//! and hands back the last-known-good conversation state.

use std::fmt;
use std::time::Duration;

use crate::agent::state::ContextField;

/// Required context variables were absent when seeding a journey.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("missing required field(s): {}", field_list(.missing))]
pub struct ValidationError {
    pub missing: Vec<ContextField>,
}

/// The generative-model call failed.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ModelCallError {
    #[error("model service credentials are not configured: {0}")]
    MissingCredentials(String),

    #[error("request failed: {0}")]
    Network(String),

    #[error("model call timed out after {0:?}")]
    Timeout(Duration),

    #[error("model service HTTP {status}: {body}")]
    Http { status: u16, body: String },

    #[error("model service error: {0}")]
    Api(String),

    #[error("malformed model response: {0}")]
    Malformed(String),

    #[error("model returned an empty response")]
    Empty,
}

/// The compression response lacked the opening `<prompt>` delimiter.
///
/// Degraded, never fatal: the compression stage wraps the raw output in
/// fallback markers and carries on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("compression output did not contain the opening <prompt> delimiter")]
pub struct CompressionFormatError;

/// An operation was requested in a state that does not allow it.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ControllerMisuseError {
    #[error("the journey is already active")]
    AlreadyActive,

    #[error("the journey has not been started")]
    NotStarted,

    #[error("the message is empty")]
    EmptyMessage,

    #[error("invalid value for {field}: {reason}")]
    InvalidUpdate { field: ContextField, reason: String },
}

/// Which model call of a turn failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallStage {
    /// First assistant output generated from the seed prompt.
    Seed,
    /// The compression pass of a follow-up turn.
    Compression,
    /// The reply generated from the compressed context.
    Generation,
}

impl fmt::Display for CallStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CallStage::Seed => write!(f, "seed"),
            CallStage::Compression => write!(f, "compression"),
            CallStage::Generation => write!(f, "generation"),
        }
    }
}

/// Any failure of a controller operation.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TurnError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("{stage} call failed: {source}")]
    ModelCall {
        stage: CallStage,
        #[source]
        source: ModelCallError,
    },

    #[error(transparent)]
    Misuse(#[from] ControllerMisuseError),
}

impl TurnError {
    pub(crate) fn model(stage: CallStage) -> impl FnOnce(ModelCallError) -> Self {
        move |source| TurnError::ModelCall { stage, source }
    }
}

fn field_list(fields: &[ContextField]) -> String {
    fields
        .iter()
        .map(|f| f.key())
        .collect::<Vec<_>>()
        .join(", ")
}
