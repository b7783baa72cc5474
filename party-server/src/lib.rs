pub mod command;
pub mod config;
pub mod engine;
pub mod interpreter;
pub mod notifier;
pub mod repository;
pub mod session;
pub mod webhook;

use std::sync::Arc;

use axum::{response::Json, routing::get, Router};
use serde_json::{json, Value};
use tower::ServiceBuilder;
use tower_http::trace::TraceLayer;

pub use engine::{Outcome, PartyService};
pub use interpreter::Dispatcher;
pub use notifier::{HttpNotifier, LogNotifier, Notifier};
pub use repository::{InMemoryRepository, RecordStore, SqliteRepository};
pub use session::{SessionId, SessionStore};

pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

pub struct AppState {
    pub service: Arc<PartyService>,
    pub dispatcher: Arc<Dispatcher>,
    pub webhook_secret: String,
}

async fn health_check() -> Json<Value> {
    Json(json!({
        "status": "healthy",
        "service": "party-finder",
        "version": version(),
    }))
}

/// The full HTTP surface: health check plus the signed interaction endpoint.
pub fn app_router(app_state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .merge(webhook::webhook_router(app_state.clone()))
        .layer(ServiceBuilder::new().layer(TraceLayer::new_for_http()))
        .with_state(app_state)
}
