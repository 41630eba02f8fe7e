#![allow(dead_code)]

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use secrecy::ExposeSecret;
use serde_json::json;

use ttpipe::broadcast::SinkError;
use ttpipe::collaborators::{
    CompressionOutput, ExtractionRequest, ImageCompressor, ImagePreprocessor, OcrEngine,
    OcrOutput, OcrWord, ProgressFn, VisionExtractor,
};
use ttpipe::{CollaboratorError, Encoding, EventSink, ProcessingEvent, Provider};

/// Hands the input straight back.
pub struct PassThrough;

#[async_trait]
impl ImageCompressor for PassThrough {
    async fn compress(
        &self,
        input: &Path,
        _encoding: Encoding,
    ) -> Result<CompressionOutput, CollaboratorError> {
        let size = std::fs::metadata(input).map(|m| m.len()).unwrap_or(0);
        Ok(CompressionOutput {
            path: input.to_path_buf(),
            original_size: size,
            compressed_size: size,
        })
    }
}

#[async_trait]
impl ImagePreprocessor for PassThrough {
    async fn preprocess(&self, input: &Path) -> Result<PathBuf, CollaboratorError> {
        Ok(input.to_path_buf())
    }
}

/// OCR returning a fixed confidence, optionally after a delay.
pub struct ScriptedOcr {
    pub confidence: f64,
    pub delay: Duration,
}

impl ScriptedOcr {
    pub fn with_confidence(confidence: f64) -> Self {
        Self {
            confidence,
            delay: Duration::ZERO,
        }
    }

    pub fn slow(delay: Duration) -> Self {
        Self {
            confidence: 0.95,
            delay,
        }
    }
}

#[async_trait]
impl OcrEngine for ScriptedOcr {
    async fn recognize(&self, _image: &Path) -> Result<OcrOutput, CollaboratorError> {
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        Ok(OcrOutput::from_words(
            "Monday 09:00 10:00 Maths".to_string(),
            vec![
                OcrWord {
                    text: "Monday".to_string(),
                    confidence: self.confidence,
                },
                OcrWord {
                    text: "Maths".to_string(),
                    confidence: self.confidence,
                },
            ],
        ))
    }
}

/// Vision extractor that fails a scripted number of times before answering.
pub struct FlakyExtractor {
    failures_left: AtomicU32,
    failure: CollaboratorError,
    pub calls: AtomicU32,
    pub last_credential: Mutex<Option<String>>,
    pub last_model: Mutex<Option<String>>,
    delay: Duration,
}

impl FlakyExtractor {
    pub fn succeeding() -> Self {
        Self::failing(0, CollaboratorError::unavailable("claude", "unused"))
    }

    pub fn failing(times: u32, failure: CollaboratorError) -> Self {
        Self {
            failures_left: AtomicU32::new(times),
            failure,
            calls: AtomicU32::new(0),
            last_credential: Mutex::new(None),
            last_model: Mutex::new(None),
            delay: Duration::ZERO,
        }
    }

    /// Sleeps for `delay` on every call, like a slow provider.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn always_failing(failure: CollaboratorError) -> Self {
        Self::failing(u32::MAX, failure)
    }

    pub fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl VisionExtractor for FlakyExtractor {
    fn provider(&self) -> Provider {
        Provider::Claude
    }

    fn default_model(&self) -> &str {
        "claude-test"
    }

    async fn extract(
        &self,
        request: &ExtractionRequest,
        progress: ProgressFn<'_>,
    ) -> Result<serde_json::Value, CollaboratorError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        *self.last_credential.lock().unwrap() = request
            .credential
            .as_ref()
            .map(|c| c.expose_secret().to_string());
        *self.last_model.lock().unwrap() = request.model.clone();

        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }

        let remaining = self.failures_left.load(Ordering::SeqCst);
        if remaining > 0 {
            self.failures_left.store(remaining - 1, Ordering::SeqCst);
            return Err(self.failure.clone());
        }

        progress(25);
        progress(50);
        progress(100);
        Ok(json!({
            "teacher": "Ms Example",
            "timeblocks": [
                { "day": "Monday", "name": "Maths", "startTime": "09:00", "endTime": "10:00" },
                { "day": "Tuesday", "name": "Art", "startTime": "13:15", "endTime": "14:45" }
            ]
        }))
    }
}

/// Sink that keeps every event it receives.
#[derive(Default)]
pub struct RecordingSink {
    events: Mutex<Vec<ProcessingEvent>>,
    closed: AtomicBool,
}

impl RecordingSink {
    pub fn events(&self) -> Vec<ProcessingEvent> {
        self.events.lock().unwrap().clone()
    }

    pub fn kinds(&self) -> Vec<&'static str> {
        self.events().iter().map(ProcessingEvent::kind).collect()
    }

    /// Steps of the `progress` events, in order.
    pub fn steps(&self) -> Vec<String> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                ProcessingEvent::Progress { step, .. } => Some(step),
                _ => None,
            })
            .collect()
    }

    pub fn percentages(&self) -> Vec<u8> {
        self.events().iter().filter_map(ProcessingEvent::percentage).collect()
    }

    pub fn terminal_events(&self) -> Vec<ProcessingEvent> {
        self.events().into_iter().filter(|e| e.is_terminal()).collect()
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

impl EventSink for RecordingSink {
    fn write(&self, payload: &str) -> Result<(), SinkError> {
        if self.is_closed() {
            return Err(SinkError::Closed);
        }
        let event = serde_json::from_str(payload).map_err(|e| SinkError::Serialize(e.to_string()))?;
        self.events.lock().unwrap().push(event);
        Ok(())
    }

    fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }
}
