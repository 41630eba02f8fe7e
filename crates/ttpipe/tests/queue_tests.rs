//! Pipeline jobs driven through the in-memory queue.

mod common;

use std::sync::Arc;
use std::time::Duration;

use common::{FlakyExtractor, ScriptedOcr, TestHarness};
use ttpipe::config::QueueConfig;
use ttpipe::queue::JobQueue;
use ttpipe::{MemoryJobQueue, PipelineJob, ProcessingEvent};

fn queue_config(concurrency: usize, timeout_ms: u64) -> QueueConfig {
    QueueConfig {
        concurrency,
        timeout_ms,
        ..QueueConfig::default()
    }
}

#[tokio::test]
async fn test_job_exceeding_timeout_reports_current_stage() {
    let harness = TestHarness::new();
    let pipeline = Arc::new(harness.pipeline(
        Arc::new(ScriptedOcr::slow(Duration::from_secs(5))),
        None,
    ));
    let queue = MemoryJobQueue::start(&queue_config(1, 200), pipeline.clone());
    let sink = harness.subscribe("doc-slow");

    let job = PipelineJob::new("doc-slow", harness.write_png("slow.png")).unwrap();
    queue.enqueue(job).await.unwrap();
    queue.shutdown().await;

    match sink.terminal_events().as_slice() {
        [ProcessingEvent::Error { error_details, .. }] => {
            assert_eq!(error_details.hint, "timeout");
            assert_eq!(error_details.step, "OCRExtracting");
        }
        other => panic!("expected a single error event, got {:?}", other),
    }
    assert!(!sink.kinds().contains(&"complete"));
    assert_eq!(queue.snapshot().timed_out, 1);
    assert_eq!(pipeline.active_documents(), 0);

    harness.wait_for_close().await;
    assert_eq!(harness.hub.sink_count("doc-slow"), 0);
}

#[tokio::test]
async fn test_timed_out_job_removes_its_intermediates() {
    let harness = TestHarness::new();
    let pipeline = Arc::new(harness.pipeline(
        Arc::new(ScriptedOcr::slow(Duration::from_secs(5))),
        None,
    ));
    let queue = MemoryJobQueue::start(&queue_config(1, 200), pipeline);
    let sink = harness.subscribe("doc-stuck");

    let job = PipelineJob::new("doc-stuck", harness.write_png("stuck.png")).unwrap();
    queue.enqueue(job).await.unwrap();
    queue.shutdown().await;

    assert_eq!(sink.terminal_events().len(), 1);
    assert_eq!(harness.upload_dir_files(), vec!["stuck.png".to_string()]);
}

#[tokio::test]
async fn test_every_queued_document_completes_once() {
    let harness = TestHarness::new();
    let pipeline = Arc::new(harness.pipeline(
        Arc::new(ScriptedOcr::with_confidence(0.4)),
        Some(Arc::new(FlakyExtractor::succeeding())),
    ));
    let queue = MemoryJobQueue::start(&queue_config(2, 30_000), pipeline);

    let ids: Vec<String> = (0..5).map(|i| format!("doc-{}", i)).collect();
    let sinks: Vec<_> = ids.iter().map(|id| harness.subscribe(id)).collect();
    for id in &ids {
        let path = harness.write_png(&format!("{}.png", id));
        queue.enqueue(PipelineJob::new(id.as_str(), path).unwrap()).await.unwrap();
    }
    queue.shutdown().await;

    for (id, sink) in ids.iter().zip(&sinks) {
        let terminal = sink.terminal_events();
        assert_eq!(terminal.len(), 1, "{} terminal events", id);
        assert_eq!(terminal[0].kind(), "complete", "{}", id);
        let percentages = sink.percentages();
        assert!(percentages.windows(2).all(|w| w[0] <= w[1]), "{}", id);
    }

    let snapshot = queue.snapshot();
    assert_eq!(snapshot.completed, 5);
    assert_eq!(snapshot.failed, 0);
    assert_eq!(snapshot.in_flight, 0);
}
