use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};

use log::debug;

use crate::collaborators::{
    CompressionOutput, ExtractionResult, OcrOutput, SaveOutcome, ValidationReport,
};
use crate::converter::ConversionOutput;
use crate::queue::PipelineJob;
use crate::sanitize::redact_path;
use crate::session::{Provider, SessionSettings};

use super::gate::QualityGateDecision;

/// Intermediate files written by one run. Clones share the list, so a holder
/// outside the run can still remove them after the run future is dropped.
#[derive(Debug, Clone, Default)]
pub struct ScratchFiles(Arc<Mutex<Vec<PathBuf>>>);

impl ScratchFiles {
    fn files(&self) -> MutexGuard<'_, Vec<PathBuf>> {
        self.0.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn track(&self, path: &Path) {
        let mut files = self.files();
        if !files.iter().any(|f| f == path) {
            files.push(path.to_path_buf());
        }
    }

    pub fn paths(&self) -> Vec<PathBuf> {
        let mut paths = self.files().clone();
        paths.sort();
        paths
    }

    /// Empties the list, handing back what was on it.
    fn take(&self) -> Vec<PathBuf> {
        std::mem::take(&mut *self.files())
    }

    /// Blocking removal for callers that cannot await, e.g. `Drop`.
    pub fn remove_all(&self) {
        for path in self.take() {
            if let Err(e) = std::fs::remove_file(&path) {
                debug!("Could not remove {}: {}", redact_path(&path), e);
            }
        }
    }
}

/// Everything one run has produced so far. Each field is filled by the stage
/// of the same name.
pub struct PipelineContext {
    pub job: PipelineJob,
    pub converted: Option<ConversionOutput>,
    pub compressed: Option<CompressionOutput>,
    pub preprocessed: Option<PathBuf>,
    pub ocr: Option<OcrOutput>,
    pub settings: Option<SessionSettings>,
    /// AI provider and model in effect for this run.
    pub provider: Option<Provider>,
    pub model: Option<String>,
    pub gate: Option<QualityGateDecision>,
    pub extraction: Option<ExtractionResult>,
    pub validation: Option<ValidationReport>,
    pub outcome: Option<SaveOutcome>,
    scratch: ScratchFiles,
}

impl PipelineContext {
    pub fn new(job: PipelineJob) -> Self {
        Self::with_scratch(job, ScratchFiles::default())
    }

    /// Records intermediates into `scratch` instead of a private list.
    pub fn with_scratch(job: PipelineJob, scratch: ScratchFiles) -> Self {
        Self {
            job,
            converted: None,
            compressed: None,
            preprocessed: None,
            ocr: None,
            settings: None,
            provider: None,
            model: None,
            gate: None,
            extraction: None,
            validation: None,
            outcome: None,
            scratch,
        }
    }

    /// Image the later stages should read: the compressed file if there is
    /// one, else the converted file, else the upload itself.
    pub fn working_image(&self) -> PathBuf {
        self.compressed
            .as_ref()
            .map(|c| c.path.clone())
            .or_else(|| self.converted.as_ref().map(|c| c.path.clone()))
            .unwrap_or_else(|| self.job.file_path.clone())
    }

    /// Marks `path` as an intermediate of this run. The upload is never
    /// tracked.
    pub fn track(&self, path: &Path) {
        if path != self.job.file_path {
            self.scratch.track(path);
        }
    }

    pub fn intermediates(&self) -> Vec<PathBuf> {
        self.scratch.paths()
    }

    /// Removes intermediate files. Failures are logged and ignored.
    pub async fn cleanup(&self) {
        for path in self.scratch.take() {
            if let Err(e) = tokio::fs::remove_file(&path).await {
                debug!("Could not remove {}: {}", redact_path(&path), e);
            }
        }
    }
}
