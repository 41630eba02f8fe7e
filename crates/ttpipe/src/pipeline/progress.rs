use std::sync::{Mutex, MutexGuard};

use crate::broadcast::{BroadcastHub, ErrorDetails, ProcessingEvent};
use crate::collaborators::SaveOutcome;

use super::stage::Stage;

/// Updates the pipeline reports while it runs.
#[derive(Debug, Clone, PartialEq)]
pub enum ProgressUpdate {
    Stage {
        stage: Stage,
        percentage: u8,
    },
    Completed {
        outcome: SaveOutcome,
        data: serde_json::Value,
    },
    Failed {
        error: String,
        details: ErrorDetails,
    },
}

impl ProgressUpdate {
    /// The update announcing the start of `stage`.
    pub fn entering(stage: Stage) -> Self {
        Self::Stage {
            stage,
            percentage: stage.percentage(),
        }
    }
}

pub trait ProgressReporter: Send + Sync {
    fn report(&self, update: ProgressUpdate);

    /// Last stage reported, if any.
    fn current_stage(&self) -> Option<Stage>;
}

/// Reporter that discards everything.
pub struct NoopProgress;

impl ProgressReporter for NoopProgress {
    fn report(&self, _update: ProgressUpdate) {}

    fn current_stage(&self) -> Option<Stage> {
        None
    }
}

#[derive(Default)]
struct TrackerState {
    last_percentage: u8,
    stage: Option<Stage>,
    terminated: bool,
}

/// Publishes one document's progress on the broadcast hub.
///
/// Percentages never go backwards and nothing is published after the first
/// terminal update, whatever the caller reports.
pub struct HubProgress {
    document_id: String,
    hub: BroadcastHub,
    state: Mutex<TrackerState>,
}

impl HubProgress {
    pub fn new(document_id: impl Into<String>, hub: BroadcastHub) -> Self {
        Self {
            document_id: document_id.into(),
            hub,
            state: Mutex::new(TrackerState::default()),
        }
    }

    pub fn document_id(&self) -> &str {
        &self.document_id
    }

    pub fn is_terminated(&self) -> bool {
        self.lock().terminated
    }

    fn lock(&self) -> MutexGuard<'_, TrackerState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl ProgressReporter for HubProgress {
    fn report(&self, update: ProgressUpdate) {
        // Emit under the lock so concurrent reporters cannot interleave
        let mut state = self.lock();
        if state.terminated {
            return;
        }

        let event = match update {
            ProgressUpdate::Stage { stage, percentage } => {
                let percentage = percentage.min(100).max(state.last_percentage);
                state.last_percentage = percentage;
                state.stage = Some(stage);
                ProcessingEvent::progress(stage.label(), percentage)
            }
            ProgressUpdate::Completed { outcome, data } => {
                state.terminated = true;
                state.last_percentage = 100;
                ProcessingEvent::complete(outcome, data)
            }
            ProgressUpdate::Failed { error, details } => {
                state.terminated = true;
                ProcessingEvent::error(error, details)
            }
        };

        self.hub.emit(&self.document_id, &event);
    }

    fn current_stage(&self) -> Option<Stage> {
        self.lock().stage
    }
}
