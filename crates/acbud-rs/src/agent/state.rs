//! Conversation state and the journey record it carries.
//!
//! [`ConversationState`] is the single value threaded between turns. It is
//! never mutated in place by callers: the
//! [`TurnController`](super::controller::TurnController) reads one and returns
//! the next. The journey record inside it tracks the user's
//! [`ContextVariables`], a [`Timeline`] of when each of them last changed, and
//! the append-only [`HistoryRecord`] of how well past plans worked.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::ValidationError;

/// Timestamp format used in rendered timelines.
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

// ── ContextField ───────────────────────────────────────────────────

/// One of the user-editable context variables.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum ContextField {
    Goal,
    Outcome,
    Obstacles,
    Plans,
    Name,
}

impl ContextField {
    /// Fields that must be non-empty before a journey can start.
    pub const REQUIRED: [ContextField; 3] = [
        ContextField::Goal,
        ContextField::Outcome,
        ContextField::Obstacles,
    ];

    /// Fields that must be re-aligned after the goal changes.
    pub const GOAL_DEPENDENTS: [ContextField; 3] = [
        ContextField::Outcome,
        ContextField::Obstacles,
        ContextField::Plans,
    ];

    /// Machine-readable key.
    pub fn key(&self) -> &'static str {
        match self {
            ContextField::Goal => "goal",
            ContextField::Outcome => "outcome",
            ContextField::Obstacles => "obstacles",
            ContextField::Plans => "plans",
            ContextField::Name => "name",
        }
    }

    /// Label used inside the prompt template.
    pub fn label(&self) -> &'static str {
        match self {
            ContextField::Goal => "wish/goal",
            ContextField::Outcome => "outcome/visualization/motivation",
            ContextField::Obstacles => "obstacles",
            ContextField::Plans => "plan",
            ContextField::Name => "name",
        }
    }

    /// Human phrasing used when asking the user for the field.
    pub fn describe(&self) -> &'static str {
        match self {
            ContextField::Goal => "your goal or wish",
            ContextField::Outcome => "your desired outcome or motivation",
            ContextField::Obstacles => "the obstacles in your way",
            ContextField::Plans => "your plan steps",
            ContextField::Name => "your name",
        }
    }
}

impl fmt::Display for ContextField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}

impl FromStr for ContextField {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "goal" | "wish" => Ok(ContextField::Goal),
            "outcome" | "motivation" => Ok(ContextField::Outcome),
            "obstacles" | "obstacle" => Ok(ContextField::Obstacles),
            "plans" | "plan" => Ok(ContextField::Plans),
            "name" => Ok(ContextField::Name),
            other => Err(format!(
                "unknown field '{other}' (expected goal, outcome, obstacles, plans or name)"
            )),
        }
    }
}

// ── ContextVariables ───────────────────────────────────────────────

/// The user's goal, motivation, obstacles and approved plan steps.
#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq, Eq)]
pub struct ContextVariables {
    pub goal: String,
    pub outcome: String,
    pub obstacles: String,
    #[serde(default)]
    pub plans: Vec<String>,
    #[serde(default)]
    pub name: Option<String>,
}

impl ContextVariables {
    pub fn new(
        goal: impl Into<String>,
        outcome: impl Into<String>,
        obstacles: impl Into<String>,
    ) -> Self {
        Self {
            goal: goal.into(),
            outcome: outcome.into(),
            obstacles: obstacles.into(),
            plans: Vec::new(),
            name: None,
        }
    }

    pub fn with_plans(mut self, plans: Vec<String>) -> Self {
        self.plans = plans;
        self
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Required fields that are empty after trimming, in template order.
    pub fn missing_fields(&self) -> Vec<ContextField> {
        ContextField::REQUIRED
            .into_iter()
            .filter(|f| match f {
                ContextField::Goal => self.goal.trim().is_empty(),
                ContextField::Outcome => self.outcome.trim().is_empty(),
                ContextField::Obstacles => self.obstacles.trim().is_empty(),
                _ => false,
            })
            .collect()
    }

    /// Fail with every missing required field.
    pub fn validate(&self) -> Result<(), ValidationError> {
        let missing = self.missing_fields();
        if missing.is_empty() {
            Ok(())
        } else {
            Err(ValidationError { missing })
        }
    }

    /// Copy with surrounding whitespace removed and blank plan steps and
    /// names dropped.
    pub fn normalized(&self) -> Self {
        Self {
            goal: self.goal.trim().to_string(),
            outcome: self.outcome.trim().to_string(),
            obstacles: self.obstacles.trim().to_string(),
            plans: self
                .plans
                .iter()
                .map(|p| p.trim().to_string())
                .filter(|p| !p.is_empty())
                .collect(),
            name: self
                .name
                .as_deref()
                .map(str::trim)
                .filter(|n| !n.is_empty())
                .map(str::to_string),
        }
    }

    /// Overwrite one field from user-supplied text.
    pub fn apply(&mut self, field: ContextField, value: &str) {
        let value = value.trim();
        match field {
            ContextField::Goal => self.goal = value.to_string(),
            ContextField::Outcome => self.outcome = value.to_string(),
            ContextField::Obstacles => self.obstacles = value.to_string(),
            ContextField::Plans => self.plans = parse_plan_steps(value),
            ContextField::Name => {
                self.name = (!value.is_empty()).then(|| value.to_string());
            }
        }
    }

    /// The current value of `field`, rendered as text.
    pub fn value_of(&self, field: ContextField) -> String {
        match field {
            ContextField::Goal => self.goal.clone(),
            ContextField::Outcome => self.outcome.clone(),
            ContextField::Obstacles => self.obstacles.clone(),
            ContextField::Plans => render_plan_steps(&self.plans),
            ContextField::Name => self.name.clone().unwrap_or_default(),
        }
    }
}

/// Split free text into plan steps: one per line, or `;`-separated.
/// A list marker (`1.`, `2)`, `-`, `*`) followed by whitespace is stripped;
/// anything else, including leading digits, is kept as written.
pub fn parse_plan_steps(text: &str) -> Vec<String> {
    text.split(['\n', ';'])
        .map(|line| strip_list_marker(line.trim()).to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

fn strip_list_marker(line: &str) -> &str {
    let after_digits = line.trim_start_matches(|c: char| c.is_ascii_digit());
    let rest = if after_digits.len() < line.len() {
        after_digits.strip_prefix(['.', ')'])
    } else {
        line.strip_prefix(['-', '*'])
    };
    match rest {
        Some(rest) if rest.starts_with(char::is_whitespace) => rest.trim_start(),
        _ => line,
    }
}

/// Numbered list, one step per line.
pub fn render_plan_steps(plans: &[String]) -> String {
    plans
        .iter()
        .enumerate()
        .map(|(i, p)| format!("{}. {p}", i + 1))
        .collect::<Vec<_>>()
        .join("\n")
}

// ── Timeline ───────────────────────────────────────────────────────

/// Last-update timestamp per context variable.
#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq, Eq)]
pub struct Timeline {
    pub goal: Option<DateTime<Utc>>,
    pub outcome: Option<DateTime<Utc>>,
    pub obstacles: Option<DateTime<Utc>>,
    pub plans: Option<DateTime<Utc>>,
    pub name: Option<DateTime<Utc>>,
}

impl Timeline {
    /// Timeline for a freshly seeded journey: every field that has a value is
    /// stamped with `at`.
    pub fn seeded(variables: &ContextVariables, at: DateTime<Utc>) -> Self {
        let mut timeline = Self::default();
        timeline.stamp(ContextField::Goal, at);
        timeline.stamp(ContextField::Outcome, at);
        timeline.stamp(ContextField::Obstacles, at);
        if !variables.plans.is_empty() {
            timeline.stamp(ContextField::Plans, at);
        }
        if variables.name.is_some() {
            timeline.stamp(ContextField::Name, at);
        }
        timeline
    }

    pub fn last_update(&self, field: ContextField) -> Option<DateTime<Utc>> {
        match field {
            ContextField::Goal => self.goal,
            ContextField::Outcome => self.outcome,
            ContextField::Obstacles => self.obstacles,
            ContextField::Plans => self.plans,
            ContextField::Name => self.name,
        }
    }

    pub fn stamp(&mut self, field: ContextField, at: DateTime<Utc>) {
        let slot = match field {
            ContextField::Goal => &mut self.goal,
            ContextField::Outcome => &mut self.outcome,
            ContextField::Obstacles => &mut self.obstacles,
            ContextField::Plans => &mut self.plans,
            ContextField::Name => &mut self.name,
        };
        *slot = Some(at);
    }

    /// Dependent fields last updated before the goal was.
    ///
    /// Fields that were never set are not reported; an empty plan is handled
    /// by the template asking for suggestions.
    pub fn disconnected_fields(&self) -> Vec<ContextField> {
        let Some(goal_at) = self.goal else {
            return Vec::new();
        };
        ContextField::GOAL_DEPENDENTS
            .into_iter()
            .filter(|f| self.last_update(*f).is_some_and(|at| at < goal_at))
            .collect()
    }

    /// Render the `<timeline>` body.
    pub fn render(&self, now: DateTime<Utc>, name: Option<&str>) -> String {
        let mut lines = Vec::new();
        for field in [
            ContextField::Goal,
            ContextField::Outcome,
            ContextField::Obstacles,
            ContextField::Plans,
        ] {
            if let Some(at) = self.last_update(field) {
                lines.push(format!(
                    "Last update to {}: {}",
                    field.label(),
                    at.format(TIMESTAMP_FORMAT)
                ));
            }
        }
        lines.push(format!(
            "Current time and date: {}",
            now.format(TIMESTAMP_FORMAT)
        ));
        if let Some(name) = name {
            lines.push(format!("User's name: {name}"));
        }
        lines.join("\n")
    }
}

// ── HistoryRecord ──────────────────────────────────────────────────

/// How well a plan worked against an obstacle.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Effectiveness {
    Low,
    Moderate,
    High,
}

impl fmt::Display for Effectiveness {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Effectiveness::Low => write!(f, "low"),
            Effectiveness::Moderate => write!(f, "moderate"),
            Effectiveness::High => write!(f, "high"),
        }
    }
}

impl FromStr for Effectiveness {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "low" => Ok(Effectiveness::Low),
            "moderate" | "medium" => Ok(Effectiveness::Moderate),
            "high" => Ok(Effectiveness::High),
            other => Err(format!(
                "unknown effectiveness '{other}' (expected low, moderate or high)"
            )),
        }
    }
}

/// One "if I see this obstacle I will do this plan" outcome.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct HistoryEntry {
    pub recorded_at: DateTime<Utc>,
    pub obstacle: String,
    pub plan: String,
    pub effectiveness: Effectiveness,
}

impl HistoryEntry {
    /// `2023-05-02, "If I see cravings, I will drink tea", effectiveness: moderate`
    pub fn render(&self) -> String {
        format!(
            "{}, \"If I see {}, I will {}\", effectiveness: {}",
            self.recorded_at.format("%Y-%m-%d"),
            self.obstacle,
            self.plan,
            self.effectiveness
        )
    }
}

/// Append-only accountability ledger.
#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq, Eq)]
pub struct HistoryRecord {
    entries: Vec<HistoryEntry>,
}

impl HistoryRecord {
    pub fn push(&mut self, entry: HistoryEntry) {
        self.entries.push(entry);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Entries rated `high`, most recent first.
    pub fn effective_plans(&self) -> impl Iterator<Item = &HistoryEntry> {
        self.entries
            .iter()
            .rev()
            .filter(|e| e.effectiveness == Effectiveness::High)
    }

    /// Render the `<cumulative_history>` body, one entry per line.
    pub fn render(&self) -> String {
        self.entries
            .iter()
            .map(HistoryEntry::render)
            .collect::<Vec<_>>()
            .join("\n")
    }
}

// ── JourneyRecord ──────────────────────────────────────────────────

/// Context variables with their timeline and history.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct JourneyRecord {
    pub variables: ContextVariables,
    pub timeline: Timeline,
    pub history: HistoryRecord,
}

impl JourneyRecord {
    pub fn new(variables: ContextVariables, at: DateTime<Utc>) -> Self {
        let timeline = Timeline::seeded(&variables, at);
        Self {
            variables,
            timeline,
            history: HistoryRecord::default(),
        }
    }
}

// ── ConversationState ──────────────────────────────────────────────

/// Position of a conversation in the turn state machine.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, Default, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum JourneyStatus {
    #[default]
    Unstarted,
    Active,
}

/// The authoritative snapshot threaded between turns.
///
/// Fields are only readable from outside the crate. New values come from the
/// [`TurnController`](super::controller::TurnController).
///
/// `Deserialize` exists so front ends can persist a conversation and hand it
/// back later. Only deserialize text produced by serializing a state the
/// controller returned; a hand-built state is not checked and the controller
/// will continue from whatever context it claims.
#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq, Eq)]
pub struct ConversationState {
    status: JourneyStatus,
    /// Current (possibly compressed) context fed to the next turn.
    context: String,
    /// Full uncompressed transcript, for display only.
    transcript: String,
    turn: u32,
    journey: Option<JourneyRecord>,
    /// User-confirmed amendments the next turn must carry to the model.
    pending: Vec<String>,
}

impl ConversationState {
    pub(crate) fn seeded(journey: JourneyRecord, seed: &str, output: &str) -> Self {
        let text = format!("{seed}\n{output}");
        Self {
            status: JourneyStatus::Active,
            context: text.clone(),
            transcript: text,
            turn: 1,
            journey: Some(journey),
            pending: Vec::new(),
        }
    }

    /// The state after one successful follow-up turn.
    pub(crate) fn advanced(&self, payload: &str, turn_input: &str, output: &str) -> Self {
        Self {
            status: JourneyStatus::Active,
            context: format!("{payload}\n{output}"),
            transcript: format!("{}\n{turn_input}\n{output}", self.transcript),
            turn: self.turn + 1,
            journey: self.journey.clone(),
            pending: Vec::new(),
        }
    }

    /// Copy with a new journey record and an extra pending amendment.
    pub(crate) fn amended(&self, journey: JourneyRecord, amendment: String) -> Self {
        let mut next = self.clone();
        next.journey = Some(journey);
        next.pending.push(amendment);
        next
    }

    pub fn status(&self) -> JourneyStatus {
        self.status
    }

    pub fn is_active(&self) -> bool {
        self.status == JourneyStatus::Active
    }

    pub fn context(&self) -> &str {
        &self.context
    }

    pub fn transcript(&self) -> &str {
        &self.transcript
    }

    pub fn turn(&self) -> u32 {
        self.turn
    }

    pub fn journey(&self) -> Option<&JourneyRecord> {
        self.journey.as_ref()
    }

    pub fn pending_amendments(&self) -> &[String] {
        &self.pending
    }
}
