use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use secrecy::SecretString;
use tracing::{debug, info, info_span, warn, Instrument};

use crate::broadcast::{BroadcastHub, ErrorDetails};
use crate::collaborators::{
    ClaudeExtractor, ContrastPreprocessor, ExtractionRequest, ExtractionResult, ExtractionSource,
    ExtractionValidator, ExtractorRegistry, ImageCompressor, ImagePreprocessor, OcrEngine,
    ResizingCompressor, ResultRepository, SaveOutcome, SqliteRepository, TesseractOcr,
    TimetableValidator,
};
use crate::config::Config;
use crate::converter::FeatureConverter;
use crate::db::Database;
use crate::error::CollaboratorError;
use crate::queue::{retry, Exhausted, JobError, JobHandler, PipelineJob};
use crate::sanitize;
use crate::session::{SessionSettings, SessionStore};

use super::config::PipelineConfig;
use super::context::{PipelineContext, ScratchFiles};
use super::error::{PipelineError, StageFailure};
use super::gate::QualityGate;
use super::progress::{HubProgress, ProgressReporter, ProgressUpdate};
use super::stage::Stage;

/// The external capabilities one pipeline run calls out to.
pub struct Collaborators {
    pub converter: FeatureConverter,
    pub compressor: Arc<dyn ImageCompressor>,
    pub preprocessor: Arc<dyn ImagePreprocessor>,
    pub ocr: Arc<dyn OcrEngine>,
    pub extractors: ExtractorRegistry,
    pub validator: Arc<dyn ExtractionValidator>,
    pub repository: Arc<dyn ResultRepository>,
}

impl Collaborators {
    /// Default implementations wired from configuration.
    pub fn from_config(
        config: &Config,
        db: Database,
        api_key: Option<SecretString>,
    ) -> Result<Self, CollaboratorError> {
        let claude = ClaudeExtractor::new(&config.ai, api_key)?;
        Ok(Self {
            converter: FeatureConverter::from_config(&config.conversion),
            compressor: Arc::new(ResizingCompressor::from_config(&config.compression)),
            preprocessor: Arc::new(ContrastPreprocessor::from_config(&config.ocr)),
            ocr: Arc::new(TesseractOcr::from_config(&config.ocr)),
            extractors: ExtractorRegistry::new().with(Arc::new(claude)),
            validator: Arc::new(TimetableValidator),
            repository: Arc::new(SqliteRepository::new(db)),
        })
    }
}

/// Runs documents through convert, compress, preprocess, OCR, quality gate,
/// optional AI extraction, validation and persistence, publishing progress
/// on the hub as it goes.
pub struct Pipeline {
    config: PipelineConfig,
    gate: QualityGate,
    collaborators: Collaborators,
    hub: BroadcastHub,
    sessions: Option<Arc<SessionStore>>,
    active: Mutex<HashMap<String, Arc<HubProgress>>>,
}

impl Pipeline {
    pub fn new(config: PipelineConfig, collaborators: Collaborators, hub: BroadcastHub) -> Self {
        Self {
            gate: QualityGate::new(config.quality_threshold),
            config,
            collaborators,
            hub,
            sessions: None,
            active: Mutex::new(HashMap::new()),
        }
    }

    /// Lets jobs carrying a session id pick their AI provider and keeps
    /// that session alive across AI extraction.
    pub fn with_sessions(mut self, sessions: Arc<SessionStore>) -> Self {
        self.sessions = Some(sessions);
        self
    }

    pub fn hub(&self) -> &BroadcastHub {
        &self.hub
    }

    /// Documents currently being processed.
    pub fn active_documents(&self) -> usize {
        self.active().len()
    }

    fn active(&self) -> MutexGuard<'_, HashMap<String, Arc<HubProgress>>> {
        self.active.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn release(&self, document_id: &str, progress: &Arc<HubProgress>) {
        let mut active = self.active();
        if active
            .get(document_id)
            .is_some_and(|tracked| Arc::ptr_eq(tracked, progress))
        {
            active.remove(document_id);
        }
    }

    /// Processes one job to completion or failure. Exactly one terminal
    /// update reaches `progress`.
    pub async fn run(
        &self,
        job: &PipelineJob,
        progress: &dyn ProgressReporter,
    ) -> (Result<SaveOutcome, StageFailure>, PipelineContext) {
        self.run_tracked(job, progress, ScratchFiles::default()).await
    }

    async fn run_tracked(
        &self,
        job: &PipelineJob,
        progress: &dyn ProgressReporter,
        scratch: ScratchFiles,
    ) -> (Result<SaveOutcome, StageFailure>, PipelineContext) {
        let span = info_span!("pipeline",
            document_id = %job.document_id,
            filename = %sanitize::redact_path(&job.file_path),
        );
        let mut ctx = PipelineContext::with_scratch(job.clone(), scratch);

        let result = self.run_stages(&mut ctx, progress).instrument(span).await;

        match &result {
            Ok(outcome) => {
                info!(
                    document_id = %job.document_id,
                    timetable_id = %outcome.timetable_id,
                    validated = outcome.validated,
                    "Pipeline completed"
                );
                let data = ctx
                    .extraction
                    .as_ref()
                    .map(|e| e.data.clone())
                    .unwrap_or(serde_json::Value::Null);
                progress.report(ProgressUpdate::Completed {
                    outcome: outcome.clone(),
                    data,
                });
                self.audit(&job.document_id, "Completed", "ok", Some(&outcome.timetable_id))
                    .await;
            }
            Err(failure) => {
                let hint = failure.error.hint();
                warn!(
                    document_id = %job.document_id,
                    stage = failure.stage.as_str(),
                    attempts = failure.attempts,
                    "Pipeline failed: {}",
                    hint
                );
                progress.report(ProgressUpdate::Failed {
                    error: failure.client_message(),
                    details: ErrorDetails {
                        provider: ctx.provider.map(|p| p.to_string()),
                        model: ctx.model.clone(),
                        step: failure.stage.as_str().to_string(),
                        hint: hint.clone(),
                    },
                });
                self.audit(&job.document_id, "Failed", failure.stage.as_str(), Some(&hint))
                    .await;
            }
        }

        (result, ctx)
    }

    async fn run_stages(
        &self,
        ctx: &mut PipelineContext,
        progress: &dyn ProgressReporter,
    ) -> Result<SaveOutcome, StageFailure> {
        let document_id = ctx.job.document_id.clone();
        let doc = document_id.as_str();

        // Converting
        progress.report(ProgressUpdate::entering(Stage::Converting));
        let input = &ctx.job.file_path;
        let preferred = self.config.preferred_encoding;
        let converted = self
            .stage(Stage::Converting, doc, move || {
                let converter = self.collaborators.converter.clone();
                let input = input.clone();
                async move {
                    tokio::task::spawn_blocking(move || converter.convert(&input, preferred))
                        .await
                        .map_err(|e| PipelineError::TaskFailed(e.to_string()))?
                        .map_err(PipelineError::from)
                }
            })
            .await?;
        info!(
            format = %converted.original_format,
            encoding = %converted.final_encoding,
            "Converted to standard format"
        );
        let encoding = converted.final_encoding;
        let converted_path = converted.path.clone();
        ctx.track(&converted_path);
        ctx.converted = Some(converted);

        // Compressing
        progress.report(ProgressUpdate::entering(Stage::Compressing));
        let compressor = &self.collaborators.compressor;
        let source = &converted_path;
        let compressed = self
            .stage(Stage::Compressing, doc, move || async move {
                compressor
                    .compress(source, encoding)
                    .await
                    .map_err(PipelineError::from)
            })
            .await?;
        debug!(
            original_size = compressed.original_size,
            compressed_size = compressed.compressed_size,
            "Compressed image"
        );
        ctx.track(&compressed.path);
        ctx.compressed = Some(compressed);
        let working_image = ctx.working_image();

        // Preprocessing
        progress.report(ProgressUpdate::entering(Stage::Preprocessing));
        let preprocessor = &self.collaborators.preprocessor;
        let source = &working_image;
        let preprocessed = self
            .stage(Stage::Preprocessing, doc, move || async move {
                preprocessor
                    .preprocess(source)
                    .await
                    .map_err(PipelineError::from)
            })
            .await?;
        ctx.track(&preprocessed);
        ctx.preprocessed = Some(preprocessed.clone());

        // OCRExtracting
        progress.report(ProgressUpdate::entering(Stage::OcrExtracting));
        let ocr = &self.collaborators.ocr;
        let source = &preprocessed;
        let ocr_output = self
            .stage(Stage::OcrExtracting, doc, move || async move {
                ocr.recognize(source).await.map_err(PipelineError::from)
            })
            .await?;
        info!(
            confidence = ocr_output.confidence,
            words = ocr_output.words.len(),
            "OCR finished"
        );

        // QualityGate
        progress.report(ProgressUpdate::entering(Stage::QualityGate));
        let settings = self
            .session_settings(&ctx.job)
            .await
            .map_err(|error| StageFailure {
                stage: Stage::QualityGate,
                error,
                attempts: 1,
            })?;
        let provider = settings
            .as_ref()
            .map_or(self.config.default_provider, |s| s.provider);
        let extractor = provider
            .is_ai()
            .then(|| self.collaborators.extractors.get(provider))
            .flatten();
        let model = settings
            .as_ref()
            .and_then(|s| s.model.clone())
            .or_else(|| extractor.as_ref().map(|e| e.default_model().to_string()))
            .or_else(|| self.config.default_model.clone());

        let decision = self.gate.decide(ocr_output.confidence, extractor.is_some());
        info!(route = decision.route.as_str(), "{}", decision.reason);
        self.audit(
            doc,
            Stage::QualityGate.as_str(),
            decision.route.as_str(),
            Some(&decision.reason),
        )
        .await;
        if provider.is_ai() {
            ctx.provider = Some(provider);
            ctx.model = model.clone();
        }
        let use_ai = decision.route.uses_ai();
        ctx.gate = Some(decision);

        // AIExtracting, low confidence only
        let extraction = match extractor.filter(|_| use_ai) {
            Some(extractor) => {
                progress.report(ProgressUpdate::entering(Stage::AiExtracting));
                self.keep_session_alive(&ctx.job).await;

                let request = ExtractionRequest {
                    image_path: working_image.clone(),
                    model: model.clone(),
                    credential: settings.as_ref().and_then(|s| s.credential.clone()),
                };
                let on_progress = move |pct: u8| {
                    progress.report(ProgressUpdate::Stage {
                        stage: Stage::AiExtracting,
                        percentage: Stage::ai_percentage(pct),
                    })
                };
                let (extractor_ref, request_ref, on_progress_ref) =
                    (&extractor, &request, &on_progress);
                let data = self
                    .stage(Stage::AiExtracting, doc, move || async move {
                        extractor_ref
                            .extract(request_ref, on_progress_ref)
                            .await
                            .map_err(PipelineError::from)
                    })
                    .await?;

                ExtractionResult {
                    data,
                    source: ExtractionSource::Ai(provider),
                    model,
                }
            }
            None => ExtractionResult::from_ocr(&ocr_output),
        };
        ctx.settings = settings;
        ctx.ocr = Some(ocr_output);

        // Validating
        progress.report(ProgressUpdate::entering(Stage::Validating));
        let validator = &self.collaborators.validator;
        let extracted = &extraction;
        let report = self
            .stage(Stage::Validating, doc, move || async move {
                validator
                    .validate(extracted)
                    .await
                    .map_err(PipelineError::from)
            })
            .await?;
        if !report.valid {
            warn!(issues = ?report.issues, "Extraction did not pass validation");
        }
        let validated = report.valid;
        ctx.validation = Some(report);

        // Persisting
        progress.report(ProgressUpdate::entering(Stage::Persisting));
        let repository = &self.collaborators.repository;
        let outcome = self
            .stage(Stage::Persisting, doc, move || async move {
                repository
                    .save(doc, extracted, validated)
                    .await
                    .map_err(PipelineError::from)
            })
            .await?;

        ctx.extraction = Some(extraction);
        ctx.outcome = Some(outcome.clone());
        Ok(outcome)
    }

    /// Runs one stage under the retry policy and records its outcome.
    async fn stage<T, F, Fut>(
        &self,
        stage: Stage,
        document_id: &str,
        op: F,
    ) -> Result<T, StageFailure>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, PipelineError>>,
    {
        let started = Instant::now();
        let result = retry(
            &self.config.retry,
            stage.as_str(),
            PipelineError::is_retryable,
            op,
        )
        .instrument(info_span!("stage", stage = stage.as_str()))
        .await;
        let elapsed_ms = started.elapsed().as_millis() as u64;

        match result {
            Ok(value) => {
                debug!(stage = stage.as_str(), elapsed_ms, "Stage finished");
                self.audit(document_id, stage.as_str(), "ok", Some(&format!("{}ms", elapsed_ms)))
                    .await;
                Ok(value)
            }
            Err(Exhausted { error, attempts }) => {
                self.audit(
                    document_id,
                    stage.as_str(),
                    "failed",
                    Some(&sanitize::client_safe(&error.to_string())),
                )
                .await;
                Err(StageFailure {
                    stage,
                    error,
                    attempts,
                })
            }
        }
    }

    async fn session_settings(
        &self,
        job: &PipelineJob,
    ) -> Result<Option<SessionSettings>, PipelineError> {
        match (&self.sessions, job.session_id.as_deref()) {
            (Some(store), Some(session_id)) => Ok(store.get_settings(session_id).await?),
            _ => Ok(None),
        }
    }

    async fn keep_session_alive(&self, job: &PipelineJob) {
        if let (Some(store), Some(session_id)) = (&self.sessions, job.session_id.as_deref()) {
            if !store.extend(session_id, None).await {
                debug!(
                    "Session {} was not extended before AI extraction",
                    sanitize::hash_id(session_id)
                );
            }
        }
    }

    async fn audit(&self, document_id: &str, stage: &str, outcome: &str, detail: Option<&str>) {
        if let Err(e) = self
            .collaborators
            .repository
            .record_audit(document_id, stage, outcome, detail)
            .await
        {
            debug!("Dropped audit record for {}: {}", stage, e);
        }
    }
}

/// Removes whatever a run left behind when `handle` is dropped mid-run, as
/// on a queue timeout.
struct ScratchGuard {
    files: ScratchFiles,
    armed: bool,
}

impl Drop for ScratchGuard {
    fn drop(&mut self) {
        if self.armed {
            self.files.remove_all();
        }
    }
}

#[async_trait]
impl JobHandler for Pipeline {
    async fn handle(&self, job: &PipelineJob) -> Result<(), JobError> {
        let progress = Arc::new(HubProgress::new(job.document_id.clone(), self.hub.clone()));
        {
            let mut active = self.active();
            if active.contains_key(&job.document_id) {
                warn!(
                    document_id = %job.document_id,
                    "Document already in flight; dropping duplicate delivery"
                );
                return Ok(());
            }
            active.insert(job.document_id.clone(), Arc::clone(&progress));
        }

        let scratch = ScratchFiles::default();
        let _leftovers = ScratchGuard {
            files: scratch.clone(),
            armed: self.config.cleanup_intermediates,
        };
        let (result, ctx) = self.run_tracked(job, progress.as_ref(), scratch).await;

        self.release(&job.document_id, &progress);
        if self.config.cleanup_intermediates {
            ctx.cleanup().await;
        }

        result.map(|_| ()).map_err(|failure| JobError {
            document_id: job.document_id.clone(),
            stage: failure.stage.as_str().to_string(),
            message: failure.client_message(),
        })
    }

    async fn timed_out(&self, job: &PipelineJob, limit: Duration) {
        let tracked = self.active().remove(&job.document_id);
        let progress = tracked
            .unwrap_or_else(|| Arc::new(HubProgress::new(job.document_id.clone(), self.hub.clone())));
        let stage = progress.current_stage().unwrap_or(Stage::Converting);

        let failure = StageFailure {
            stage,
            error: PipelineError::QueueTimeout {
                timeout_ms: limit.as_millis() as u64,
            },
            attempts: 1,
        };
        progress.report(ProgressUpdate::Failed {
            error: failure.client_message(),
            details: ErrorDetails {
                provider: None,
                model: None,
                step: stage.as_str().to_string(),
                hint: failure.error.hint(),
            },
        });
        self.audit(&job.document_id, "Failed", "timeout", Some(stage.as_str()))
            .await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::broadcast::{EventSink, ProcessingEvent, SinkError};
    use crate::collaborators::{CompressionOutput, OcrOutput, OcrWord, ValidationReport};
    use crate::converter::Encoding;
    use crate::session::Provider;
    use std::path::{Path, PathBuf};
    use std::sync::atomic::{AtomicU32, Ordering};

    struct PassThrough;

    #[async_trait]
    impl ImageCompressor for PassThrough {
        async fn compress(
            &self,
            input: &Path,
            _encoding: Encoding,
        ) -> Result<CompressionOutput, CollaboratorError> {
            Ok(CompressionOutput {
                path: input.to_path_buf(),
                original_size: 1,
                compressed_size: 1,
            })
        }
    }

    #[async_trait]
    impl ImagePreprocessor for PassThrough {
        async fn preprocess(&self, input: &Path) -> Result<PathBuf, CollaboratorError> {
            Ok(input.to_path_buf())
        }
    }

    struct FixedOcr(f64);

    #[async_trait]
    impl OcrEngine for FixedOcr {
        async fn recognize(&self, _image: &Path) -> Result<OcrOutput, CollaboratorError> {
            Ok(OcrOutput::from_words(
                "Monday 9:00 Maths".to_string(),
                vec![OcrWord {
                    text: "Maths".to_string(),
                    confidence: self.0,
                }],
            ))
        }
    }

    struct AcceptAll;

    #[async_trait]
    impl ExtractionValidator for AcceptAll {
        async fn validate(
            &self,
            _extraction: &ExtractionResult,
        ) -> Result<ValidationReport, CollaboratorError> {
            Ok(ValidationReport {
                valid: true,
                issues: vec![],
            })
        }
    }

    #[derive(Default)]
    struct CountingRepository {
        saves: AtomicU32,
    }

    #[async_trait]
    impl ResultRepository for CountingRepository {
        async fn save(
            &self,
            document_id: &str,
            _extraction: &ExtractionResult,
            validated: bool,
        ) -> Result<SaveOutcome, CollaboratorError> {
            self.saves.fetch_add(1, Ordering::SeqCst);
            Ok(SaveOutcome {
                timetable_id: format!("tt-{}", document_id),
                validated,
            })
        }
    }

    #[derive(Default)]
    struct Recorder(Mutex<Vec<ProcessingEvent>>);

    impl EventSink for Recorder {
        fn write(&self, payload: &str) -> Result<(), SinkError> {
            let event = serde_json::from_str(payload).map_err(|_| SinkError::Closed)?;
            self.0.lock().unwrap().push(event);
            Ok(())
        }

        fn close(&self) {}
    }

    impl Recorder {
        fn steps(&self) -> Vec<String> {
            self.0
                .lock()
                .unwrap()
                .iter()
                .filter_map(|e| match e {
                    ProcessingEvent::Progress { step, .. } => Some(step.clone()),
                    _ => None,
                })
                .collect()
        }
    }

    fn png_fixture(dir: &Path) -> PathBuf {
        let path = dir.join("timetable.png");
        image::RgbImage::from_pixel(8, 8, image::Rgb([255, 255, 255]))
            .save(&path)
            .unwrap();
        path
    }

    fn pipeline(confidence: f64, repository: Arc<CountingRepository>) -> Pipeline {
        let mut config = PipelineConfig::default();
        config.retry = crate::queue::RetryPolicy::none();
        config.default_provider = Provider::Tesseract;
        let collaborators = Collaborators {
            converter: FeatureConverter::default(),
            compressor: Arc::new(PassThrough),
            preprocessor: Arc::new(PassThrough),
            ocr: Arc::new(FixedOcr(confidence)),
            extractors: ExtractorRegistry::new(),
            validator: Arc::new(AcceptAll),
            repository,
        };
        Pipeline::new(config, collaborators, BroadcastHub::new(Duration::from_secs(60)))
    }

    #[tokio::test]
    async fn test_low_confidence_without_provider_goes_ocr_only() {
        let dir = tempfile::tempdir().unwrap();
        let input = png_fixture(dir.path());
        let repository = Arc::new(CountingRepository::default());
        let pipeline = pipeline(0.3, repository.clone());
        let sink = Arc::new(Recorder::default());
        pipeline.hub().subscribe("doc-1", sink.clone()).unwrap();

        let job = PipelineJob::new("doc-1", &input).unwrap();
        pipeline.handle(&job).await.unwrap();

        let steps = sink.steps();
        assert!(!steps.iter().any(|s| s == "AI extraction"));
        assert_eq!(steps.last().map(String::as_str), Some("Saving results"));
        assert_eq!(repository.saves.load(Ordering::SeqCst), 1);
        assert!(input.exists());
        // only the upload is left behind
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 1);
        assert_eq!(pipeline.active_documents(), 0);
    }

    #[tokio::test]
    async fn test_missing_input_fails_at_converting() {
        let repository = Arc::new(CountingRepository::default());
        let pipeline = pipeline(0.9, repository.clone());
        let sink = Arc::new(Recorder::default());
        pipeline.hub().subscribe("doc-2", sink.clone()).unwrap();

        let job = PipelineJob::new("doc-2", "/nonexistent/ttpipe/upload.png").unwrap();
        let err = pipeline.handle(&job).await.unwrap_err();
        assert_eq!(err.stage, "Converting");

        let events = sink.0.lock().unwrap();
        match events.last() {
            Some(ProcessingEvent::Error {
                error,
                error_details,
            }) => {
                assert_eq!(error_details.step, "Converting");
                assert_eq!(error_details.hint, "unsupported input");
                assert!(!error.contains("/nonexistent"));
            }
            other => panic!("expected error event, got {:?}", other),
        }
        assert_eq!(repository.saves.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_timed_out_reports_current_stage() {
        let pipeline = pipeline(0.9, Arc::new(CountingRepository::default()));
        let sink = Arc::new(Recorder::default());
        pipeline.hub().subscribe("doc-3", sink.clone()).unwrap();

        let progress = Arc::new(HubProgress::new("doc-3", pipeline.hub().clone()));
        progress.report(ProgressUpdate::entering(Stage::OcrExtracting));
        pipeline
            .active()
            .insert("doc-3".to_string(), Arc::clone(&progress));

        let job = PipelineJob::new("doc-3", "/tmp/unused.png").unwrap();
        pipeline.timed_out(&job, Duration::from_millis(600_000)).await;

        let events = sink.0.lock().unwrap();
        match events.last() {
            Some(ProcessingEvent::Error { error_details, .. }) => {
                assert_eq!(error_details.step, "OCRExtracting");
                assert_eq!(error_details.hint, "timeout");
            }
            other => panic!("expected error event, got {:?}", other),
        }
        assert_eq!(pipeline.active_documents(), 0);
    }
}
