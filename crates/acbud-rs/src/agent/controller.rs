//! The turn controller: seeds journeys and runs compress-then-generate turns.
//!
//! [`TurnController`] never mutates a [`ConversationState`] in place. Every
//! operation reads the caller's state and returns a [`TurnOutcome`] holding
//! the next state and a [`Reply`] to show the user. On any failure the
//! returned state is a clone of the input, so a failed model call never loses
//! conversation history.
//!
//! A follow-up turn runs strictly in this order:
//!
//! 1. Working transcript = compact context, pending amendments and the user
//!    message, newline-separated.
//! 2. The compression stage reduces it to a payload.
//! 3. The generation call sees the payload alone.
//! 4. Compact context = payload + output; the display transcript grows by the
//!    turn input and output.
//!
//! Each `*` operation has a `try_*` twin that returns the typed error instead
//! of a reply.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::agent::config::BuddyConfig;
use crate::agent::events::{EventHandler, NoopHandler, TurnEvent};
use crate::agent::state::{
    ContextField, ContextVariables, ConversationState, Effectiveness, HistoryEntry, JourneyRecord,
    TIMESTAMP_FORMAT,
};
use crate::api::invoker::{ModelInvoker, ModelRequest};
use crate::error::{CallStage, ControllerMisuseError, ModelCallError, TurnError};

/// Notice returned when a journey is started twice.
pub const ALREADY_ACTIVE_NOTICE: &str =
    "Your accountability session is already active. Please continue with your conversation.";

/// Notice returned when a message arrives before the journey starts.
pub const NOT_STARTED_NOTICE: &str = "Please start your journey by entering your goal, \
     your desired outcome and your obstacles before sending messages.";

const EMPTY_MESSAGE_NOTICE: &str = "Please type a message first.";

// ── Reply ──────────────────────────────────────────────────────────

/// What the user sees after an operation.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Reply {
    /// Model output for a seed or follow-up turn.
    Assistant { text: String },
    /// Seeding was refused; the listed fields must be provided.
    MissingInfo {
        fields: Vec<ContextField>,
        text: String,
    },
    /// Informational message produced without a model call.
    Notice { text: String },
    /// A model call failed; the conversation is unchanged.
    Error { text: String },
}

impl Reply {
    pub fn text(&self) -> &str {
        match self {
            Reply::Assistant { text }
            | Reply::MissingInfo { text, .. }
            | Reply::Notice { text }
            | Reply::Error { text } => text,
        }
    }

    pub fn is_assistant(&self) -> bool {
        matches!(self, Reply::Assistant { .. })
    }

    fn for_error(error: &TurnError) -> Self {
        match error {
            TurnError::Validation(v) => Reply::MissingInfo {
                fields: v.missing.clone(),
                text: request_info_text(&v.missing),
            },
            TurnError::ModelCall { source, .. } => Reply::Error {
                text: format!("API call error: {source}. Your conversation was not changed."),
            },
            TurnError::Misuse(ControllerMisuseError::AlreadyActive) => Reply::Notice {
                text: ALREADY_ACTIVE_NOTICE.into(),
            },
            TurnError::Misuse(ControllerMisuseError::NotStarted) => Reply::Notice {
                text: NOT_STARTED_NOTICE.into(),
            },
            TurnError::Misuse(ControllerMisuseError::EmptyMessage) => Reply::Notice {
                text: EMPTY_MESSAGE_NOTICE.into(),
            },
            TurnError::Misuse(misuse @ ControllerMisuseError::InvalidUpdate { .. }) => {
                Reply::Notice {
                    text: format!("Could not apply the update: {misuse}."),
                }
            }
        }
    }
}

/// `<request_info>` block asking for every missing field.
fn request_info_text(fields: &[ContextField]) -> String {
    let wanted: Vec<&str> = fields.iter().map(|f| f.describe()).collect();
    let list = match wanted.split_last() {
        Some((last, rest)) if !rest.is_empty() => format!("{} and {last}", rest.join(", ")),
        Some((last, _)) => (*last).to_string(),
        None => String::new(),
    };
    format!("<request_info>\nPlease tell me {list} so we can start your journey.\n</request_info>")
}

/// The next state and the reply for one operation.
#[derive(Debug, Clone, PartialEq)]
pub struct TurnOutcome {
    pub state: ConversationState,
    pub reply: Reply,
}

// ── TurnController ─────────────────────────────────────────────────

/// Orchestrates seeding, turns and journey updates against a
/// [`ModelInvoker`].
///
/// Holds no conversation state of its own; one controller can serve many
/// conversations.
pub struct TurnController<'a> {
    invoker: &'a dyn ModelInvoker,
    config: BuddyConfig,
    event_handler: &'a dyn EventHandler,
    clock: fn() -> DateTime<Utc>,
}

impl<'a> TurnController<'a> {
    pub fn new(invoker: &'a dyn ModelInvoker, config: BuddyConfig) -> Self {
        Self {
            invoker,
            config,
            event_handler: &NoopHandler,
            clock: Utc::now,
        }
    }

    pub fn with_event_handler(mut self, handler: &'a dyn EventHandler) -> Self {
        self.event_handler = handler;
        self
    }

    /// Override the time source used for timeline and history stamps.
    pub fn with_clock(mut self, clock: fn() -> DateTime<Utc>) -> Self {
        self.clock = clock;
        self
    }

    pub fn config(&self) -> &BuddyConfig {
        &self.config
    }

    // ── Start journey ──

    /// Seed a new journey. Returns the input state unchanged with a
    /// notice if the journey is already active.
    pub async fn start_journey(
        &self,
        state: &ConversationState,
        variables: ContextVariables,
    ) -> TurnOutcome {
        match self.try_start_journey(state, variables).await {
            Ok((state, text)) => TurnOutcome {
                state,
                reply: Reply::Assistant { text },
            },
            Err(e) => self.recover(state, &e),
        }
    }

    pub async fn try_start_journey(
        &self,
        state: &ConversationState,
        variables: ContextVariables,
    ) -> Result<(ConversationState, String), TurnError> {
        let result = self.seed(state, variables).await;
        self.report(&result);
        result
    }

    async fn seed(
        &self,
        state: &ConversationState,
        variables: ContextVariables,
    ) -> Result<(ConversationState, String), TurnError> {
        if state.is_active() {
            return Err(ControllerMisuseError::AlreadyActive.into());
        }
        let variables = variables.normalized();
        variables.validate()?;

        let now = (self.clock)();
        let journey = JourneyRecord::new(variables, now);
        let seed = self.config.templates.render_seed(&journey, now)?;

        let request = self.config.generation_request(seed.as_str());
        let output = self
            .generate(&request)
            .await
            .map_err(TurnError::model(CallStage::Seed))?;

        self.event_handler.on_event(&TurnEvent::JourneyStarted {
            seed_chars: seed.chars().count(),
        });
        let next = ConversationState::seeded(journey, &seed, &output);
        self.event_handler.on_event(&TurnEvent::Reply {
            turn: next.turn(),
            text: &output,
        });
        Ok((next, output))
    }

    // ── Submit turn ──

    /// Run one compress-then-generate turn.
    pub async fn submit_turn(&self, state: &ConversationState, message: &str) -> TurnOutcome {
        match self.try_submit_turn(state, message).await {
            Ok((state, text)) => TurnOutcome {
                state,
                reply: Reply::Assistant { text },
            },
            Err(e) => self.recover(state, &e),
        }
    }

    pub async fn try_submit_turn(
        &self,
        state: &ConversationState,
        message: &str,
    ) -> Result<(ConversationState, String), TurnError> {
        let result = self.turn(state, message).await;
        self.report(&result);
        result
    }

    async fn turn(
        &self,
        state: &ConversationState,
        message: &str,
    ) -> Result<(ConversationState, String), TurnError> {
        if !state.is_active() {
            return Err(ControllerMisuseError::NotStarted.into());
        }
        let message = message.trim();
        if message.is_empty() {
            return Err(ControllerMisuseError::EmptyMessage.into());
        }

        let turn_input = turn_input(state.pending_amendments(), message);
        let working = format!("{}\n{turn_input}", state.context());

        let compression = self
            .config
            .compressor()
            .compress(self.invoker, &working, &self.config.model)
            .await
            .map_err(TurnError::model(CallStage::Compression))?;

        if compression.skipped {
            self.event_handler.on_event(&TurnEvent::CompressionSkipped {
                chars: compression.stats.before.chars,
            });
        } else {
            if compression.degraded {
                self.event_handler.on_event(&TurnEvent::CompressionDegraded {
                    payload_chars: compression.stats.after.chars,
                });
            }
            self.event_handler.on_event(&TurnEvent::Compressed {
                stats: &compression.stats,
            });
        }

        let request = self.config.generation_request(compression.payload.as_str());
        let output = self
            .generate(&request)
            .await
            .map_err(TurnError::model(CallStage::Generation))?;

        let next = state.advanced(&compression.payload, &turn_input, &output);
        self.event_handler.on_event(&TurnEvent::Reply {
            turn: next.turn(),
            text: &output,
        });
        Ok((next, output))
    }

    // ── Journey updates ──

    /// Apply a user-confirmed change to one context variable. The change
    /// reaches the model on the next turn.
    pub fn update_context(
        &self,
        state: &ConversationState,
        field: ContextField,
        value: &str,
    ) -> TurnOutcome {
        match self.try_update_context(state, field, value) {
            Ok(next) => {
                let text = update_notice(&next, field);
                TurnOutcome {
                    state: next,
                    reply: Reply::Notice { text },
                }
            }
            Err(e) => self.recover(state, &e),
        }
    }

    pub fn try_update_context(
        &self,
        state: &ConversationState,
        field: ContextField,
        value: &str,
    ) -> Result<ConversationState, TurnError> {
        let result = self.apply_update(state, field, value);
        if let Err(e) = &result {
            self.event_handler.on_event(&TurnEvent::Rejected { error: e });
        }
        result
    }

    fn apply_update(
        &self,
        state: &ConversationState,
        field: ContextField,
        value: &str,
    ) -> Result<ConversationState, TurnError> {
        let mut journey = active_journey(state)?;
        if value.trim().is_empty() && ContextField::REQUIRED.contains(&field) {
            return Err(ControllerMisuseError::InvalidUpdate {
                field,
                reason: "value must not be empty".into(),
            }
            .into());
        }

        let now = (self.clock)();
        journey.variables.apply(field, value);
        journey.timeline.stamp(field, now);
        let disconnected = journey.timeline.disconnected_fields();

        let mut amendment = format!(
            "<context_update>\n{}: {}\n</context_update>\n<timeline>\n{}\n</timeline>",
            field.label(),
            journey.variables.value_of(field),
            journey
                .timeline
                .render(now, journey.variables.name.as_deref())
        );
        if !disconnected.is_empty() {
            let labels: Vec<&str> = disconnected.iter().map(|f| f.label()).collect();
            amendment.push_str(&format!(
                "\n<timeline_update_request>\nThe goal was updated at {} but these variables predate it: {}.\n</timeline_update_request>",
                now.format(TIMESTAMP_FORMAT),
                labels.join(", ")
            ));
        }

        self.event_handler.on_event(&TurnEvent::ContextUpdated {
            field,
            disconnected: &disconnected,
        });
        Ok(state.amended(journey, amendment))
    }

    /// Append how well a plan worked against an obstacle to the history
    /// record. The updated history reaches the model on the next turn.
    pub fn record_outcome(
        &self,
        state: &ConversationState,
        obstacle: &str,
        plan: &str,
        effectiveness: Effectiveness,
    ) -> TurnOutcome {
        match self.try_record_outcome(state, obstacle, plan, effectiveness) {
            Ok((next, entry)) => TurnOutcome {
                state: next,
                reply: Reply::Notice {
                    text: format!("Recorded: {}", entry.render()),
                },
            },
            Err(e) => self.recover(state, &e),
        }
    }

    pub fn try_record_outcome(
        &self,
        state: &ConversationState,
        obstacle: &str,
        plan: &str,
        effectiveness: Effectiveness,
    ) -> Result<(ConversationState, HistoryEntry), TurnError> {
        let result = self.append_outcome(state, obstacle, plan, effectiveness);
        if let Err(e) = &result {
            self.event_handler.on_event(&TurnEvent::Rejected { error: e });
        }
        result
    }

    fn append_outcome(
        &self,
        state: &ConversationState,
        obstacle: &str,
        plan: &str,
        effectiveness: Effectiveness,
    ) -> Result<(ConversationState, HistoryEntry), TurnError> {
        let mut journey = active_journey(state)?;
        for (field, value) in [(ContextField::Obstacles, obstacle), (ContextField::Plans, plan)] {
            if value.trim().is_empty() {
                return Err(ControllerMisuseError::InvalidUpdate {
                    field,
                    reason: "value must not be empty".into(),
                }
                .into());
            }
        }

        let entry = HistoryEntry {
            recorded_at: (self.clock)(),
            obstacle: obstacle.trim().to_string(),
            plan: plan.trim().to_string(),
            effectiveness,
        };
        journey.history.push(entry.clone());
        let amendment = format!(
            "<cumulative_history>\n{}\n</cumulative_history>",
            journey.history.render()
        );

        self.event_handler
            .on_event(&TurnEvent::OutcomeRecorded { entry: &entry });
        Ok((state.amended(journey, amendment), entry))
    }

    // ── Helpers ──

    /// One generation call. Output is trimmed; blank output is an error.
    async fn generate(&self, request: &ModelRequest) -> Result<String, ModelCallError> {
        let output = self.invoker.invoke(request).await?;
        let output = output.trim();
        if output.is_empty() {
            return Err(ModelCallError::Empty);
        }
        Ok(output.to_string())
    }

    fn report<T>(&self, result: &Result<T, TurnError>) {
        let Err(error) = result else {
            return;
        };
        match error {
            TurnError::Validation(v) => {
                self.event_handler
                    .on_event(&TurnEvent::MissingInfo { fields: &v.missing });
            }
            TurnError::ModelCall { stage, source } => {
                self.event_handler.on_event(&TurnEvent::ModelCallFailed {
                    stage: *stage,
                    error: source,
                });
            }
            TurnError::Misuse(_) => {
                self.event_handler.on_event(&TurnEvent::Rejected { error });
            }
        }
    }

    fn recover(&self, state: &ConversationState, error: &TurnError) -> TurnOutcome {
        TurnOutcome {
            state: state.clone(),
            reply: Reply::for_error(error),
        }
    }
}

fn active_journey(state: &ConversationState) -> Result<JourneyRecord, TurnError> {
    match state.journey() {
        Some(journey) if state.is_active() => Ok(journey.clone()),
        _ => Err(ControllerMisuseError::NotStarted.into()),
    }
}

/// Pending amendments followed by the user message.
fn turn_input(pending: &[String], message: &str) -> String {
    if pending.is_empty() {
        message.to_string()
    } else {
        format!("{}\n{message}", pending.join("\n"))
    }
}

fn update_notice(state: &ConversationState, field: ContextField) -> String {
    let stale = state
        .journey()
        .map(|j| j.timeline.disconnected_fields())
        .unwrap_or_default();
    if stale.is_empty() {
        format!("Updated your {}.", field.label())
    } else {
        let labels: Vec<&str> = stale.iter().map(|f| f.label()).collect();
        format!(
            "Updated your {}. These may need to be aligned with it: {}.",
            field.label(),
            labels.join(", ")
        )
    }
}
