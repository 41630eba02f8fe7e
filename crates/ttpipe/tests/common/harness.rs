//! Test harness wiring a pipeline to fakes inside a temp directory.

#![allow(dead_code)]

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use tempfile::TempDir;

use ttpipe::collaborators::{
    ExtractorRegistry, OcrEngine, SqliteRepository, TimetableValidator, VisionExtractor,
};
use ttpipe::db::Database;
use ttpipe::queue::RetryPolicy;
use ttpipe::{BroadcastHub, Collaborators, FeatureConverter, Pipeline, PipelineConfig, Provider};

use super::fakes::{PassThrough, RecordingSink};

/// Grace period used by test hubs; short so tests can wait it out.
pub const GRACE: Duration = Duration::from_millis(50);

pub struct TestHarness {
    temp_dir: TempDir,
    pub hub: BroadcastHub,
    pub db: Database,
    pub config: PipelineConfig,
}

impl TestHarness {
    pub fn new() -> Self {
        let mut config = PipelineConfig::default();
        config.retry = RetryPolicy::new(3, Duration::from_millis(1));
        config.default_provider = Provider::Claude;

        Self {
            temp_dir: TempDir::new().expect("Failed to create temp directory"),
            hub: BroadcastHub::new(GRACE),
            db: Database::open_in_memory().expect("Failed to open database"),
            config,
        }
    }

    /// File names currently in the upload directory, sorted.
    pub fn upload_dir_files(&self) -> Vec<String> {
        let mut names: Vec<String> = std::fs::read_dir(self.temp_dir.path())
            .expect("Failed to list upload directory")
            .filter_map(|entry| entry.ok())
            .map(|entry| entry.file_name().to_string_lossy().into_owned())
            .collect();
        names.sort();
        names
    }

    /// Writes an opaque PNG upload and returns its path.
    pub fn write_png(&self, name: &str) -> PathBuf {
        let path = self.temp_dir.path().join(name);
        image::RgbImage::from_fn(32, 16, |x, _| {
            if x % 4 == 0 {
                image::Rgb([0, 0, 0])
            } else {
                image::Rgb([255, 255, 255])
            }
        })
        .save(&path)
        .expect("Failed to write fixture");
        path
    }

    pub fn collaborators(
        &self,
        ocr: Arc<dyn OcrEngine>,
        extractor: Option<Arc<dyn VisionExtractor>>,
    ) -> Collaborators {
        let mut extractors = ExtractorRegistry::new();
        if let Some(extractor) = extractor {
            extractors.register(extractor);
        }
        Collaborators {
            converter: FeatureConverter::default(),
            compressor: Arc::new(PassThrough),
            preprocessor: Arc::new(PassThrough),
            ocr,
            extractors,
            validator: Arc::new(TimetableValidator),
            repository: Arc::new(SqliteRepository::new(self.db.clone())),
        }
    }

    pub fn pipeline(
        &self,
        ocr: Arc<dyn OcrEngine>,
        extractor: Option<Arc<dyn VisionExtractor>>,
    ) -> Pipeline {
        Pipeline::new(
            self.config.clone(),
            self.collaborators(ocr, extractor),
            self.hub.clone(),
        )
    }

    pub fn subscribe(&self, document_id: &str) -> Arc<RecordingSink> {
        let sink = Arc::new(RecordingSink::default());
        self.hub
            .subscribe(document_id, sink.clone())
            .expect("Failed to subscribe");
        sink
    }

    /// Waits until the hub's deferred close has run.
    pub async fn wait_for_close(&self) {
        tokio::time::sleep(GRACE * 3).await;
    }
}
