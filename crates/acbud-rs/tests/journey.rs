//! End-to-end journey flows through the public API with a scripted model.

use acbud_rs::agent::controller::ALREADY_ACTIVE_NOTICE;
use acbud_rs::context::compression::COMPRESSION_PREAMBLE;
use acbud_rs::prelude::*;

fn vars() -> ContextVariables {
    ContextVariables::new("Run a 5K", "Feel strong", "No time").with_name("Sarah")
}

#[tokio::test]
async fn multi_turn_journey_carries_only_compressed_context() {
    let invoker = ScriptedInvoker::new()
        .with_reply("Welcome back, Sarah! <suggested_plan>1. Run 10 minutes</suggested_plan>")
        .with_reply("<prompt># Compressed\n## Goal: 5K</prompt>")
        .with_reply("Two runs is great progress!")
        .with_reply("<prompt># Compressed v2</prompt>")
        .with_reply("Keep it up.");
    let controller = TurnController::new(&invoker, BuddyConfig::new("m"));

    let start = controller
        .start_journey(&ConversationState::default(), vars())
        .await;
    assert!(start.reply.text().starts_with("Welcome back, Sarah!"));

    let t1 = controller
        .submit_turn(&start.state, "I ran twice this week")
        .await;
    assert_eq!(t1.reply.text(), "Two runs is great progress!");

    let t2 = controller.submit_turn(&t1.state, "Sore legs today").await;
    assert_eq!(t2.reply.text(), "Keep it up.");

    let requests = invoker.requests();
    assert_eq!(requests.len(), 5);
    // The second compression sees the first turn's payload, never the seed.
    assert_eq!(
        requests[3].prompt,
        format!(
            "{COMPRESSION_PREAMBLE}\n<prompt># Compressed\n## Goal: 5K</prompt>\nTwo runs is great progress!\nSore legs today"
        )
    );
    assert_eq!(requests[4].prompt, "<prompt># Compressed v2</prompt>");

    let state = t2.state;
    assert_eq!(state.turn(), 3);
    assert_eq!(state.context(), "<prompt># Compressed v2</prompt>\nKeep it up.");
    assert!(state.transcript().starts_with(&requests[0].prompt));
    assert!(
        state
            .transcript()
            .ends_with("I ran twice this week\nTwo runs is great progress!\nSore legs today\nKeep it up.")
    );
}

#[tokio::test]
async fn failures_and_misuse_never_lose_state() {
    let invoker = ScriptedInvoker::new()
        .with_reply("Welcome!")
        .with_error(ModelCallError::Http {
            status: 500,
            body: "oops".into(),
        });
    let controller = TurnController::new(&invoker, BuddyConfig::default());

    let start = controller
        .start_journey(&ConversationState::default(), vars())
        .await;
    let state = start.state;

    let again = controller.start_journey(&state, vars()).await;
    assert_eq!(again.state, state);
    assert_eq!(again.reply, Reply::Notice { text: ALREADY_ACTIVE_NOTICE.into() });

    let failed = controller.submit_turn(&state, "hello").await;
    assert_eq!(failed.state, state);
    assert!(matches!(failed.reply, Reply::Error { .. }));
}

#[tokio::test]
async fn state_and_reply_serialize_for_front_ends() {
    let invoker = ScriptedInvoker::new().with_reply("Welcome!");
    let controller = TurnController::new(&invoker, BuddyConfig::default());
    let outcome = controller
        .start_journey(&ConversationState::default(), vars())
        .await;

    let reply = serde_json::to_value(&outcome.reply).unwrap();
    assert_eq!(reply["kind"], "assistant");
    assert_eq!(reply["text"], "Welcome!");

    let json = serde_json::to_string(&outcome.state).unwrap();
    let restored: ConversationState = serde_json::from_str(&json).unwrap();
    assert_eq!(restored, outcome.state);
    assert_eq!(restored.status(), JourneyStatus::Active);
}
