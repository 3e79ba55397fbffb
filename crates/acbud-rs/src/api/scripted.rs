//! A [`ModelInvoker`] that replays canned responses.
//!
//! Used by tests and offline demos. Every request is recorded so callers can
//! assert on exactly what was sent to the "model".

use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::Duration;

use crate::api::invoker::{InvokeFuture, ModelInvoker, ModelRequest};
use crate::error::ModelCallError;

/// Replays queued responses in order, one per call.
///
/// Once the queue is empty every call fails with [`ModelCallError::Api`].
///
/// # Example
///
/// ```
/// use acbud_rs::api::{ModelInvoker, ModelRequest, ScriptedInvoker};
///
/// let invoker = ScriptedInvoker::new().with_reply("Hello!");
/// let request = ModelRequest {
///     model: "m".into(),
///     system: String::new(),
///     prompt: "hi".into(),
///     max_tokens: 10,
///     temperature: 0.0,
/// };
/// let rt = tokio::runtime::Runtime::new().unwrap();
/// let out = rt.block_on(invoker.invoke(&request)).unwrap();
/// assert_eq!(out, "Hello!");
/// assert_eq!(invoker.requests()[0].prompt, "hi");
/// ```
#[derive(Debug, Default)]
pub struct ScriptedInvoker {
    responses: Mutex<VecDeque<Result<String, ModelCallError>>>,
    requests: Mutex<Vec<ModelRequest>>,
    delay: Option<Duration>,
}

impl ScriptedInvoker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a successful response.
    pub fn with_reply(self, text: impl Into<String>) -> Self {
        self.push_reply(text);
        self
    }

    /// Queue a failure.
    pub fn with_error(self, error: ModelCallError) -> Self {
        self.push_error(error);
        self
    }

    /// Sleep this long inside every call before answering.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn push_reply(&self, text: impl Into<String>) {
        self.lock_responses().push_back(Ok(text.into()));
    }

    pub fn push_error(&self, error: ModelCallError) {
        self.lock_responses().push_back(Err(error));
    }

    /// Every request received so far, oldest first.
    pub fn requests(&self) -> Vec<ModelRequest> {
        self.requests
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    pub fn call_count(&self) -> usize {
        self.requests.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    /// Number of responses still queued.
    pub fn remaining(&self) -> usize {
        self.lock_responses().len()
    }

    fn lock_responses(&self) -> std::sync::MutexGuard<'_, VecDeque<Result<String, ModelCallError>>> {
        self.responses.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl ModelInvoker for ScriptedInvoker {
    fn invoke<'a>(&'a self, request: &'a ModelRequest) -> InvokeFuture<'a> {
        Box::pin(async move {
            self.requests
                .lock()
                .unwrap_or_else(|e| e.into_inner())
                .push(request.clone());
            if let Some(delay) = self.delay {
                tokio::time::sleep(delay).await;
            }
            self.lock_responses().pop_front().unwrap_or_else(|| {
                Err(ModelCallError::Api(
                    "scripted invoker has no responses left".into(),
                ))
            })
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(prompt: &str) -> ModelRequest {
        ModelRequest {
            model: "m".into(),
            system: "s".into(),
            prompt: prompt.into(),
            max_tokens: 10,
            temperature: 0.0,
        }
    }

    #[tokio::test]
    async fn replays_in_order_and_records() {
        let invoker = ScriptedInvoker::new()
            .with_reply("one")
            .with_error(ModelCallError::Empty)
            .with_reply("three");

        assert_eq!(invoker.invoke(&request("a")).await.unwrap(), "one");
        assert_eq!(
            invoker.invoke(&request("b")).await,
            Err(ModelCallError::Empty)
        );
        assert_eq!(invoker.invoke(&request("c")).await.unwrap(), "three");

        let prompts: Vec<String> = invoker.requests().into_iter().map(|r| r.prompt).collect();
        assert_eq!(prompts, vec!["a", "b", "c"]);
        assert_eq!(invoker.remaining(), 0);
    }

    #[tokio::test]
    async fn exhausted_script_fails() {
        let invoker = ScriptedInvoker::new();
        let err = invoker.invoke(&request("x")).await.unwrap_err();
        assert!(matches!(err, ModelCallError::Api(_)));
        assert_eq!(invoker.call_count(), 1);
    }
}
