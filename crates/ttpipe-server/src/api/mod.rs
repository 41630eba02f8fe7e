//! HTTP routes.

mod health;
mod jobs;
mod settings;
mod sse;

use axum::routing::{get, post, put};
use axum::Router;
use tower_http::trace::TraceLayer;

use crate::state::AppState;

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health::health))
        .route("/api/v1/jobs", post(jobs::enqueue))
        .route("/api/v1/documents/:document_id/events", get(sse::document_events))
        .route(
            "/api/v1/llm/settings",
            put(settings::put_settings)
                .get(settings::get_settings)
                .delete(settings::delete_settings),
        )
        .route("/api/v1/llm/settings/extend", post(settings::extend_session))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
}
