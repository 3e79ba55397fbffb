//! OpenRouter client transport tests.
//!
//! Each test serves a chat completions endpoint from a local axum router on a
//! random port and points the client at it.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::{Duration, Instant};

use acbud_rs::api::RetryConfig;
use acbud_rs::prelude::*;
use axum::Router;
use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::post;

const COMPLETION: &str =
    r#"{"choices":[{"message":{"content":"  Keep going!  "},"finish_reason":"stop"}]}"#;

type Script = (Arc<AtomicUsize>, Arc<Vec<u16>>);

/// Serve `router` on port 0 and return the chat endpoint URL.
async fn serve(router: Router) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move { axum::serve(listener, router).await.unwrap() });
    format!("http://{addr}/chat/completions")
}

/// Endpoint that answers with `statuses` in order, then with a completion.
/// Returns the URL and the hit counter.
async fn scripted_endpoint(statuses: Vec<u16>) -> (String, Arc<AtomicUsize>) {
    let hits = Arc::new(AtomicUsize::new(0));
    let router = Router::new()
        .route(
            "/chat/completions",
            post(|State((hits, statuses)): State<Script>| async move {
                let n = hits.fetch_add(1, Ordering::SeqCst);
                match statuses.get(n) {
                    Some(&status) => (
                        StatusCode::from_u16(status).unwrap(),
                        "upstream refused".to_string(),
                    ),
                    None => (StatusCode::OK, COMPLETION.to_string()),
                }
            }),
        )
        .with_state((hits.clone(), Arc::new(statuses)));
    (serve(router).await, hits)
}

fn client(endpoint: String, timeout: Duration, retries: u32) -> OpenRouterClient {
    let options = ClientOptions {
        endpoint,
        timeout,
        retry: RetryConfig {
            initial_delay: Duration::from_millis(10),
            ..RetryConfig::with_retries(retries)
        },
        ..Default::default()
    };
    OpenRouterClient::with_options("test-key", options).unwrap()
}

fn request() -> ModelRequest {
    ModelRequest {
        model: "test-model".into(),
        system: "You are a buddy.".into(),
        prompt: "I ran twice this week".into(),
        max_tokens: 50,
        temperature: 0.0,
    }
}

#[tokio::test]
async fn success_returns_trimmed_text() {
    let (endpoint, hits) = scripted_endpoint(vec![]).await;
    let client = client(endpoint, Duration::from_secs(5), 0);

    let text = client.invoke(&request()).await.unwrap();
    assert_eq!(text, "Keep going!");
    assert_eq!(hits.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn hanging_endpoint_times_out() {
    let router = Router::new().route(
        "/chat/completions",
        post(|| async {
            tokio::time::sleep(Duration::from_secs(30)).await;
            COMPLETION
        }),
    );
    let endpoint = serve(router).await;
    let timeout = Duration::from_millis(200);
    let client = client(endpoint, timeout, 0);

    let start = Instant::now();
    let err = client.complete(&request()).await.unwrap_err();
    assert_eq!(err, ModelCallError::Timeout(timeout));
    assert!(start.elapsed() < Duration::from_secs(5));
}

#[tokio::test]
async fn transient_status_is_retried_within_budget() {
    let (endpoint, hits) = scripted_endpoint(vec![503]).await;
    let client = client(endpoint, Duration::from_secs(5), 1);

    let text = client.complete(&request()).await.unwrap();
    assert_eq!(text, "Keep going!");
    assert_eq!(hits.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn retries_stop_when_budget_is_spent() {
    let (endpoint, hits) = scripted_endpoint(vec![429, 503, 502]).await;
    let client = client(endpoint, Duration::from_secs(5), 1);

    let err = client.complete(&request()).await.unwrap_err();
    assert!(matches!(err, ModelCallError::Http { status: 503, .. }));
    assert_eq!(hits.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn permanent_status_is_attempted_once() {
    let (endpoint, hits) = scripted_endpoint(vec![401]).await;
    let client = client(endpoint, Duration::from_secs(5), 3);

    let err = client.complete(&request()).await.unwrap_err();
    assert_eq!(
        err,
        ModelCallError::Http {
            status: 401,
            body: "upstream refused".into()
        }
    );
    assert_eq!(hits.load(Ordering::SeqCst), 1);
}
