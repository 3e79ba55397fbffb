//! HTTP front end for the acbud accountability buddy.
//!
//! `acbud-web` exposes the conversation engine as a small JSON API on top of
//! axum. Conversations live in a [`SessionStore`]; each request builds a
//! [`TurnController`](acbud_rs::agent::controller::TurnController) over the
//! shared [`ModelInvoker`] and runs one operation under the conversation's
//! lock.
//!
//! # Quick start
//!
//! ```ignore
//! use std::sync::Arc;
//! use acbud_rs::prelude::*;
//! use acbud_web::{WebConfig, spawn_web};
//!
//! let client = OpenRouterClient::new(std::env::var("OPENROUTER_KEY")?)?;
//! let (addr, _store) = spawn_web(Arc::new(client), BuddyConfig::default(), WebConfig::default()).await?;
//! println!("API: http://{addr}/api/sessions");
//! ```
//!
//! # Endpoints
//!
//! | Method | Path | Body |
//! |--------|------|------|
//! | `POST` | `/api/sessions` | none, returns `{session_id}` |
//! | `POST` | `/api/sessions/{id}/journey` | `{goal, outcome, obstacles, name?, plans?}` |
//! | `POST` | `/api/sessions/{id}/turns` | `{message}` |
//! | `POST` | `/api/sessions/{id}/updates` | `{field, value}` |
//! | `POST` | `/api/sessions/{id}/history` | `{obstacle, plan, effectiveness}` |
//! | `GET` | `/api/sessions/{id}` | diagnostic view |
//! | `DELETE` | `/api/sessions/{id}` | |
//!
//! Operations answer with `{kind, text, turn, status, pending_amendments}`
//! where `kind` is `assistant`, `missing_info`, `notice` or `error`. Unknown
//! conversation ids answer 404.

mod api;
mod server;

pub use api::{SessionView, TurnResponse};

use std::net::SocketAddr;
use std::sync::Arc;

use acbud_rs::agent::config::BuddyConfig;
use acbud_rs::agent::session::SessionStore;
use acbud_rs::api::ModelInvoker;

/// Configuration for the web server.
pub struct WebConfig {
    /// Address to bind to. Default: `127.0.0.1:3001`.
    pub bind_addr: SocketAddr,
    /// Allow cross-origin requests from any origin. Default: `true`.
    pub cors: bool,
}

impl Default for WebConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([127, 0, 0, 1], 3001)),
            cors: true,
        }
    }
}

/// Spawn the web server on a Tokio task.
///
/// Returns the bound address and the session store backing the API. The
/// server runs until the Tokio runtime shuts down.
pub async fn spawn_web(
    invoker: Arc<dyn ModelInvoker>,
    buddy: BuddyConfig,
    config: WebConfig,
) -> std::io::Result<(SocketAddr, Arc<SessionStore>)> {
    let store = Arc::new(SessionStore::new());
    let app = api::AppState {
        store: store.clone(),
        invoker,
        buddy: Arc::new(buddy),
    };
    let router = server::build_router(app, config.cors);
    let addr = server::start_server(router, config.bind_addr).await?;
    Ok((addr, store))
}
