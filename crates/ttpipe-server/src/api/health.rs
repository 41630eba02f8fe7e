use axum::extract::State;
use axum::Json;
use serde_json::{json, Value};

use crate::state::AppState;

pub async fn health(State(state): State<AppState>) -> Json<Value> {
    Json(json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
        "totalSinks": state.hub.total_sinks(),
        "inFlight": state.queue.in_flight(),
        "ocrAvailable": ttpipe::collaborators::OCR_AVAILABLE,
    }))
}
