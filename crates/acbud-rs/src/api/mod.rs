//! Model boundary: the invoker contract, retry policy, and a scripted invoker.
//!
//! - [`invoker`]: the [`ModelInvoker`] trait and [`ModelRequest`]. The
//!   [`OpenRouterClient`](crate::OpenRouterClient) implements it for the hosted
//!   service.
//! - [`retry`]: transient error detection (429, 5xx, network timeouts) with
//!   bounded exponential backoff. Never retries 400/401 errors.
//! - [`scripted`]: [`ScriptedInvoker`], a queue of canned responses for tests
//!   and offline runs.

pub mod invoker;
pub mod retry;
pub mod scripted;

pub use invoker::{InvokeFuture, ModelInvoker, ModelRequest};
pub use retry::RetryConfig;
pub use scripted::ScriptedInvoker;
