use std::convert::Infallible;
use std::time::Duration;

use axum::extract::{Path, State};
use axum::response::sse::{Event, KeepAlive, Sse};
use futures::Stream;
use tracing::debug;

use ttpipe::broadcast::SinkId;
use ttpipe::{BroadcastHub, ChannelSink};

use crate::error::ApiError;
use crate::state::AppState;

/// Unregisters the sink when the response stream is dropped.
struct Subscription {
    hub: BroadcastHub,
    document_id: String,
    id: SinkId,
}

impl Drop for Subscription {
    fn drop(&mut self) {
        debug!("SSE client for {} gone", self.document_id);
        self.hub.unsubscribe(&self.document_id, self.id);
    }
}

/// GET /api/v1/documents/:document_id/events
///
/// The first frame is always `connected`. The stream ends once the hub
/// closes the sink after the document's terminal event.
pub async fn document_events(
    State(state): State<AppState>,
    Path(document_id): Path<String>,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>>>, ApiError> {
    let (sink, mut rx) = ChannelSink::new();
    let id = state
        .hub
        .subscribe(&document_id, sink)
        .map_err(|e| ApiError::Internal(e.to_string()))?;
    debug!("SSE client subscribed to {}", document_id);

    let subscription = Subscription {
        hub: state.hub.clone(),
        document_id,
        id,
    };

    let stream = async_stream::stream! {
        let _subscription = subscription;
        while let Some(payload) = rx.recv().await {
            yield Ok::<_, Infallible>(Event::default().data(payload));
        }
    };

    Ok(Sse::new(stream).keep_alive(
        KeepAlive::new()
            .interval(Duration::from_secs(15))
            .text("keep-alive"),
    ))
}

#[cfg(test)]
mod tests {
    use crate::api::{router, test_support};
    use axum::body::Body;
    use axum::http::{header, Request, StatusCode};
    use http_body_util::BodyExt;
    use tower::ServiceExt;
    use ttpipe::{ErrorDetails, ProcessingEvent};

    #[tokio::test]
    async fn test_stream_starts_with_connected_and_ends_after_terminal() {
        let state = test_support::state();
        let hub = state.hub.clone();

        let response = router(state)
            .oneshot(
                Request::get("/api/v1/documents/doc-9/events")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers()[header::CONTENT_TYPE],
            "text/event-stream"
        );
        assert_eq!(hub.sink_count("doc-9"), 1);

        hub.emit("doc-9", &ProcessingEvent::progress("Compressing image", 15));
        hub.emit(
            "doc-9",
            &ProcessingEvent::error("Compressing image failed: boom", ErrorDetails::default()),
        );

        // Completes once the hub closes the sink after its grace period
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        let text = String::from_utf8(bytes.to_vec()).unwrap();
        let frames: Vec<&str> = text.split("\n\n").filter(|f| f.starts_with("data:")).collect();

        assert_eq!(frames.len(), 3);
        assert!(frames[0].contains(r#""type":"connected""#));
        assert!(frames[0].contains(r#""documentId":"doc-9""#));
        assert!(frames[1].contains(r#""type":"progress""#));
        assert!(frames[2].contains(r#""type":"error""#));
        assert_eq!(hub.sink_count("doc-9"), 0);
    }
}
