//! REST API endpoint handlers.
//!
//! Every handler runs one controller operation through the
//! [`SessionStore`], which holds the conversation's lock for the whole
//! operation.

use std::sync::Arc;

use acbud_rs::agent::config::BuddyConfig;
use acbud_rs::agent::controller::{Reply, TurnController, TurnOutcome};
use acbud_rs::agent::events::LoggingHandler;
use acbud_rs::agent::session::{SessionError, SessionStore};
use acbud_rs::agent::state::{
    ContextField, ContextVariables, Effectiveness, JourneyRecord, JourneyStatus,
};
use acbud_rs::api::ModelInvoker;
use acbud_rs::context::TextSize;
use axum::Json;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::{Deserialize, Serialize};

/// Shared application state passed to all handlers via axum's `State` extractor.
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<SessionStore>,
    pub invoker: Arc<dyn ModelInvoker>,
    pub buddy: Arc<BuddyConfig>,
}

impl AppState {
    fn controller(&self) -> TurnController<'_> {
        TurnController::new(self.invoker.as_ref(), BuddyConfig::clone(&self.buddy))
            .with_event_handler(&LoggingHandler)
    }
}

// ── Errors ─────────────────────────────────────────────────────────

/// Session lookup failure rendered as a JSON error.
pub struct ApiError(SessionError);

impl From<SessionError> for ApiError {
    fn from(e: SessionError) -> Self {
        Self(e)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match self.0 {
            SessionError::NotFound(_) => StatusCode::NOT_FOUND,
        };
        (
            status,
            Json(serde_json::json!({ "error": self.0.to_string() })),
        )
            .into_response()
    }
}

// ── Responses ──────────────────────────────────────────────────────

/// Body returned by every conversation operation.
#[derive(Serialize, Debug)]
pub struct TurnResponse {
    #[serde(flatten)]
    pub reply: Reply,
    pub turn: u32,
    pub status: JourneyStatus,
    pub pending_amendments: usize,
}

impl TurnResponse {
    fn from_outcome(outcome: TurnOutcome) -> (StatusCode, Json<Self>) {
        let status = match outcome.reply {
            Reply::Error { .. } => StatusCode::BAD_GATEWAY,
            _ => StatusCode::OK,
        };
        let body = Self {
            turn: outcome.state.turn(),
            status: outcome.state.status(),
            pending_amendments: outcome.state.pending_amendments().len(),
            reply: outcome.reply,
        };
        (status, Json(body))
    }
}

/// Diagnostic view of one conversation.
#[derive(Serialize, Debug)]
pub struct SessionView {
    pub session_id: String,
    pub status: JourneyStatus,
    pub turn: u32,
    pub context: String,
    pub transcript: String,
    pub context_size: TextSize,
    pub transcript_size: TextSize,
    pub pending_amendments: Vec<String>,
    pub journey: Option<JourneyRecord>,
}

#[derive(Serialize, Debug)]
pub struct CreatedSession {
    pub session_id: String,
}

// ── Requests ───────────────────────────────────────────────────────

/// Request body for POST /api/sessions/{id}/journey.
#[derive(Deserialize, Debug)]
pub struct JourneyRequest {
    #[serde(default)]
    pub goal: String,
    #[serde(default)]
    pub outcome: String,
    #[serde(default)]
    pub obstacles: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub plans: Vec<String>,
}

impl From<JourneyRequest> for ContextVariables {
    fn from(body: JourneyRequest) -> Self {
        let vars =
            ContextVariables::new(body.goal, body.outcome, body.obstacles).with_plans(body.plans);
        match body.name {
            Some(name) => vars.with_name(name),
            None => vars,
        }
    }
}

/// Request body for POST /api/sessions/{id}/turns.
#[derive(Deserialize, Debug)]
pub struct TurnRequest {
    pub message: String,
}

/// Request body for POST /api/sessions/{id}/updates.
#[derive(Deserialize, Debug)]
pub struct UpdateRequest {
    pub field: ContextField,
    pub value: String,
}

/// Request body for POST /api/sessions/{id}/history.
#[derive(Deserialize, Debug)]
pub struct HistoryRequest {
    pub obstacle: String,
    pub plan: String,
    pub effectiveness: Effectiveness,
}

// ── Handlers ───────────────────────────────────────────────────────

/// POST /api/sessions: Create an empty conversation.
pub async fn create_session(State(app): State<AppState>) -> (StatusCode, Json<CreatedSession>) {
    let session_id = app.store.create();
    (StatusCode::CREATED, Json(CreatedSession { session_id }))
}

/// GET /api/sessions/{id}: Diagnostic view.
pub async fn get_session(
    State(app): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<SessionView>, ApiError> {
    let state = app.store.snapshot(&id).await?;
    Ok(Json(SessionView {
        session_id: id,
        status: state.status(),
        turn: state.turn(),
        context_size: TextSize::of(state.context()),
        transcript_size: TextSize::of(state.transcript()),
        context: state.context().to_string(),
        transcript: state.transcript().to_string(),
        pending_amendments: state.pending_amendments().to_vec(),
        journey: state.journey().cloned(),
    }))
}

/// DELETE /api/sessions/{id}: Drop a conversation.
pub async fn delete_session(
    State(app): State<AppState>,
    Path(id): Path<String>,
) -> Result<StatusCode, ApiError> {
    app.store.remove(&id)?;
    Ok(StatusCode::NO_CONTENT)
}

/// POST /api/sessions/{id}/journey: Seed the journey.
pub async fn post_journey(
    State(app): State<AppState>,
    Path(id): Path<String>,
    Json(body): Json<JourneyRequest>,
) -> Result<(StatusCode, Json<TurnResponse>), ApiError> {
    let controller = app.controller();
    let outcome = app
        .store
        .start_journey(&id, &controller, body.into())
        .await?;
    Ok(TurnResponse::from_outcome(outcome))
}

/// POST /api/sessions/{id}/turns: Send a message.
pub async fn post_turn(
    State(app): State<AppState>,
    Path(id): Path<String>,
    Json(body): Json<TurnRequest>,
) -> Result<(StatusCode, Json<TurnResponse>), ApiError> {
    let controller = app.controller();
    let outcome = app
        .store
        .submit_turn(&id, &controller, &body.message)
        .await?;
    Ok(TurnResponse::from_outcome(outcome))
}

/// POST /api/sessions/{id}/updates: Change one context variable.
pub async fn post_update(
    State(app): State<AppState>,
    Path(id): Path<String>,
    Json(body): Json<UpdateRequest>,
) -> Result<(StatusCode, Json<TurnResponse>), ApiError> {
    let controller = app.controller();
    let outcome = app
        .store
        .update_context(&id, &controller, body.field, &body.value)
        .await?;
    Ok(TurnResponse::from_outcome(outcome))
}

/// POST /api/sessions/{id}/history: Record how well a plan worked.
pub async fn post_history(
    State(app): State<AppState>,
    Path(id): Path<String>,
    Json(body): Json<HistoryRequest>,
) -> Result<(StatusCode, Json<TurnResponse>), ApiError> {
    let controller = app.controller();
    let outcome = app
        .store
        .record_outcome(
            &id,
            &controller,
            &body.obstacle,
            &body.plan,
            body.effectiveness,
        )
        .await?;
    Ok(TurnResponse::from_outcome(outcome))
}
