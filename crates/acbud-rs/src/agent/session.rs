//! In-memory conversation store for front ends serving many users.
//!
//! The controller itself is stateless. [`SessionStore`] maps conversation
//! ids to their current [`ConversationState`] and holds a per-conversation
//! async lock for the whole duration of an operation, so two submissions on
//! the same conversation run one after the other while different
//! conversations proceed in parallel.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::SystemTime;

use tracing::debug;

use crate::agent::controller::{TurnController, TurnOutcome};
use crate::agent::state::{ContextField, ContextVariables, ConversationState, Effectiveness};

/// Lookup failure in a [`SessionStore`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SessionError {
    #[error("unknown conversation '{0}'")]
    NotFound(String),
}

/// Generate a unique conversation id.
pub fn generate_session_id() -> String {
    let ts = SystemTime::now()
        .duration_since(SystemTime::UNIX_EPOCH)
        .unwrap_or_default()
        .as_nanos();
    static COUNTER: AtomicU64 = AtomicU64::new(0);
    let count = COUNTER.fetch_add(1, Ordering::Relaxed);
    format!("cv-{ts:x}-{count:04x}")
}

type Slot = Arc<tokio::sync::Mutex<ConversationState>>;

/// Conversation id to state, one async lock per conversation.
#[derive(Debug, Default)]
pub struct SessionStore {
    sessions: Mutex<HashMap<String, Slot>>,
}

impl SessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an empty conversation and return its id.
    pub fn create(&self) -> String {
        let id = generate_session_id();
        self.lock_map().insert(id.clone(), Slot::default());
        debug!("Created conversation {id}");
        id
    }

    /// Copy of the current state. Waits for any in-flight operation.
    pub async fn snapshot(&self, id: &str) -> Result<ConversationState, SessionError> {
        let slot = self.slot(id)?;
        let state = slot.lock().await;
        Ok(state.clone())
    }

    /// Drop a conversation. Operations already holding its lock finish
    /// against the detached state.
    pub fn remove(&self, id: &str) -> Result<(), SessionError> {
        self.lock_map()
            .remove(id)
            .map(|_| debug!("Removed conversation {id}"))
            .ok_or_else(|| SessionError::NotFound(id.to_string()))
    }

    pub fn contains(&self, id: &str) -> bool {
        self.lock_map().contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.lock_map().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock_map().is_empty()
    }

    pub async fn start_journey(
        &self,
        id: &str,
        controller: &TurnController<'_>,
        variables: ContextVariables,
    ) -> Result<TurnOutcome, SessionError> {
        let slot = self.slot(id)?;
        let mut state = slot.lock().await;
        let outcome = controller.start_journey(&state, variables).await;
        *state = outcome.state.clone();
        Ok(outcome)
    }

    pub async fn submit_turn(
        &self,
        id: &str,
        controller: &TurnController<'_>,
        message: &str,
    ) -> Result<TurnOutcome, SessionError> {
        let slot = self.slot(id)?;
        let mut state = slot.lock().await;
        let outcome = controller.submit_turn(&state, message).await;
        *state = outcome.state.clone();
        Ok(outcome)
    }

    pub async fn update_context(
        &self,
        id: &str,
        controller: &TurnController<'_>,
        field: ContextField,
        value: &str,
    ) -> Result<TurnOutcome, SessionError> {
        let slot = self.slot(id)?;
        let mut state = slot.lock().await;
        let outcome = controller.update_context(&state, field, value);
        *state = outcome.state.clone();
        Ok(outcome)
    }

    pub async fn record_outcome(
        &self,
        id: &str,
        controller: &TurnController<'_>,
        obstacle: &str,
        plan: &str,
        effectiveness: Effectiveness,
    ) -> Result<TurnOutcome, SessionError> {
        let slot = self.slot(id)?;
        let mut state = slot.lock().await;
        let outcome = controller.record_outcome(&state, obstacle, plan, effectiveness);
        *state = outcome.state.clone();
        Ok(outcome)
    }

    fn slot(&self, id: &str) -> Result<Slot, SessionError> {
        self.lock_map()
            .get(id)
            .cloned()
            .ok_or_else(|| SessionError::NotFound(id.to_string()))
    }

    fn lock_map(&self) -> std::sync::MutexGuard<'_, HashMap<String, Slot>> {
        self.sessions.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::config::BuddyConfig;
    use crate::api::scripted::ScriptedInvoker;
    use std::time::Duration;

    #[test]
    fn session_ids_unique() {
        let a = generate_session_id();
        let b = generate_session_id();
        assert_ne!(a, b);
        assert!(a.starts_with("cv-"));
    }

    #[tokio::test]
    async fn create_snapshot_remove() {
        let store = SessionStore::new();
        let id = store.create();
        assert_eq!(store.len(), 1);
        assert_eq!(
            store.snapshot(&id).await.unwrap(),
            ConversationState::default()
        );

        store.remove(&id).unwrap();
        assert!(store.is_empty());
        assert_eq!(
            store.snapshot(&id).await,
            Err(SessionError::NotFound(id.clone()))
        );
        assert!(store.remove(&id).is_err());
    }

    #[tokio::test]
    async fn unknown_session_is_not_found() {
        let store = SessionStore::new();
        let invoker = ScriptedInvoker::new();
        let ctrl = TurnController::new(&invoker, BuddyConfig::default());
        let err = store.submit_turn("cv-missing", &ctrl, "hi").await.unwrap_err();
        assert_eq!(err, SessionError::NotFound("cv-missing".into()));
        assert_eq!(invoker.call_count(), 0);
    }

    #[tokio::test]
    async fn stores_state_between_operations() {
        let store = SessionStore::new();
        let invoker = ScriptedInvoker::new().with_reply("Welcome!");
        let ctrl = TurnController::new(&invoker, BuddyConfig::default());
        let id = store.create();

        let outcome = store
            .start_journey(&id, &ctrl, ContextVariables::new("g", "o", "x"))
            .await
            .unwrap();
        assert!(outcome.reply.is_assistant());
        assert!(store.snapshot(&id).await.unwrap().is_active());

        store
            .update_context(&id, &ctrl, ContextField::Name, "Sarah")
            .await
            .unwrap();
        store
            .record_outcome(&id, &ctrl, "cravings", "tea", Effectiveness::High)
            .await
            .unwrap();
        let state = store.snapshot(&id).await.unwrap();
        assert_eq!(state.pending_amendments().len(), 2);
        assert_eq!(
            state.journey().unwrap().variables.name.as_deref(),
            Some("Sarah")
        );
    }

    #[tokio::test]
    async fn concurrent_turns_on_one_session_serialize() {
        let store = SessionStore::new();
        let invoker = ScriptedInvoker::new()
            .with_delay(Duration::from_millis(5))
            .with_reply("Welcome!");
        let ctrl = TurnController::new(&invoker, BuddyConfig::default());
        let id = store.create();
        store
            .start_journey(&id, &ctrl, ContextVariables::new("g", "o", "x"))
            .await
            .unwrap();

        for i in 0..4 {
            invoker.push_reply(format!("<prompt>c{i}</prompt>"));
            invoker.push_reply(format!("reply {i}"));
        }

        let (a, b, c, d) = tokio::join!(
            store.submit_turn(&id, &ctrl, "one"),
            store.submit_turn(&id, &ctrl, "two"),
            store.submit_turn(&id, &ctrl, "three"),
            store.submit_turn(&id, &ctrl, "four"),
        );
        for outcome in [a, b, c, d] {
            assert!(outcome.unwrap().reply.is_assistant());
        }

        let state = store.snapshot(&id).await.unwrap();
        assert_eq!(state.turn(), 5);
        for msg in ["one", "two", "three", "four"] {
            assert!(state.transcript().contains(&format!("\n{msg}\n")));
        }
    }
}
