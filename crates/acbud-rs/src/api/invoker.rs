//! The generative-model contract.
//!
//! A [`ModelInvoker`] turns one [`ModelRequest`] into text or a
//! [`ModelCallError`]. It never panics past the caller and never retries
//! without bound; the controller decides what a failure means for the user.

use std::future::Future;
use std::pin::Pin;

use crate::error::ModelCallError;

/// Boxed future returned by [`ModelInvoker::invoke`].
pub type InvokeFuture<'a> = Pin<Box<dyn Future<Output = Result<String, ModelCallError>> + Send + 'a>>;

/// One call to the generative-text service.
#[derive(Debug, Clone, PartialEq)]
pub struct ModelRequest {
    /// Model identifier, e.g. `"anthropic/claude-3-haiku"`.
    pub model: String,
    /// System role text.
    pub system: String,
    /// The full prompt sent as the single user message.
    pub prompt: String,
    pub max_tokens: u32,
    pub temperature: f32,
}

/// Sends a prompt to a generative model and returns its text.
///
/// Output is not assumed to be deterministic. Implementations must bound
/// each call with a timeout.
///
/// # Example
///
/// ```ignore
/// struct Echo;
///
/// impl ModelInvoker for Echo {
///     fn invoke<'a>(&'a self, request: &'a ModelRequest) -> InvokeFuture<'a> {
///         Box::pin(async move { Ok(request.prompt.clone()) })
///     }
/// }
/// ```
pub trait ModelInvoker: Send + Sync {
    /// Run the request. Uses a boxed future so the trait stays object-safe.
    fn invoke<'a>(&'a self, request: &'a ModelRequest) -> InvokeFuture<'a>;
}
