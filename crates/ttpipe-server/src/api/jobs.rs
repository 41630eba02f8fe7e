use std::path::PathBuf;

use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;
use serde::{Deserialize, Serialize};
use tracing::info;

use ttpipe::sanitize::redact_path;
use ttpipe::{JobQueue, PipelineJob};

use crate::error::ApiError;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EnqueueRequest {
    pub document_id: String,
    pub file_path: PathBuf,
    #[serde(default)]
    pub session_id: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EnqueueResponse {
    pub document_id: String,
    pub status: &'static str,
    pub events_url: String,
}

/// POST /api/v1/jobs
pub async fn enqueue(
    State(state): State<AppState>,
    Json(request): Json<EnqueueRequest>,
) -> Result<(StatusCode, Json<EnqueueResponse>), ApiError> {
    let is_file = tokio::fs::metadata(&request.file_path)
        .await
        .map(|m| m.is_file())
        .unwrap_or(false);
    if !is_file {
        return Err(ApiError::BadRequest(format!(
            "File not found: {}",
            redact_path(&request.file_path)
        )));
    }

    let mut job = PipelineJob::new(request.document_id, request.file_path)?;
    if let Some(session_id) = request.session_id {
        job = job.with_session(session_id);
    }
    let document_id = job.document_id.clone();

    state.queue.enqueue(job).await?;
    info!(document_id = %document_id, "Job accepted");

    Ok((
        StatusCode::ACCEPTED,
        Json(EnqueueResponse {
            events_url: format!("/api/v1/documents/{}/events", document_id),
            document_id,
            status: "queued",
        }),
    ))
}

#[cfg(test)]
mod tests {
    use crate::api::{router, test_support};
    use axum::body::Body;
    use axum::http::{header, Request, StatusCode};
    use serde_json::json;
    use tower::ServiceExt;

    fn post(body: serde_json::Value) -> Request<Body> {
        Request::post("/api/v1/jobs")
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    #[tokio::test]
    async fn test_enqueue_accepts_existing_file() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("upload.png");
        std::fs::write(&file, b"not really a png").unwrap();

        let response = router(test_support::state())
            .oneshot(post(json!({ "documentId": "doc-1", "filePath": file })))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::ACCEPTED);
        let body = test_support::body_json(response).await;
        assert_eq!(body["documentId"], "doc-1");
        assert_eq!(body["eventsUrl"], "/api/v1/documents/doc-1/events");
    }

    #[tokio::test]
    async fn test_enqueue_rejects_missing_file() {
        let response = router(test_support::state())
            .oneshot(post(json!({
                "documentId": "doc-1",
                "filePath": "/nonexistent/dir/upload.png"
            })))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body = test_support::body_json(response).await;
        let message = body["error"].as_str().unwrap();
        assert!(message.contains("upload.png"));
        assert!(!message.contains("/nonexistent"));
    }

    #[tokio::test]
    async fn test_enqueue_rejects_blank_document_id() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("upload.png");
        std::fs::write(&file, b"x").unwrap();

        let response = router(test_support::state())
            .oneshot(post(json!({ "documentId": " ", "filePath": file })))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }
}
