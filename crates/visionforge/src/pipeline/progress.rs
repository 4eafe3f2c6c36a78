use std::sync::Arc;

use tokio::sync::broadcast;

use crate::broadcast::job_progress::{JobProgressEvent, JobProgressTracker};
use crate::model::{Stage, StageStatus};

/// Events emitted by the pipeline while a job runs.
#[derive(Debug, Clone, PartialEq)]
pub enum ProgressEvent {
    Stage {
        stage: Stage,
        status: StageStatus,
        message: String,
    },
    Completed {
        video_url: String,
    },
    Failed {
        stage: Stage,
        error: String,
    },
    Cancelled {
        at_stage: Option<Stage>,
    },
}

pub trait ProgressReporter: Send + Sync {
    fn report(&self, event: ProgressEvent);
}

/// No-op reporter for unit tests.
pub struct NoopProgress;

impl ProgressReporter for NoopProgress {
    fn report(&self, _event: ProgressEvent) {}
}

/// Bridges pipeline events to the broadcast channel.
pub struct BroadcastProgress {
    tracker: JobProgressTracker,
}

impl BroadcastProgress {
    pub fn new(job_id: &str, topic: &str, sender: Arc<broadcast::Sender<JobProgressEvent>>) -> Self {
        Self {
            tracker: JobProgressTracker::new(job_id, topic, sender),
        }
    }
}

impl ProgressReporter for BroadcastProgress {
    fn report(&self, event: ProgressEvent) {
        match event {
            ProgressEvent::Stage {
                stage,
                status,
                message,
            } => self.tracker.stage_update(stage, status, &message),
            ProgressEvent::Completed { video_url } => self.tracker.completed(&video_url),
            ProgressEvent::Failed { stage, error } => self.tracker.failed(stage, &error),
            ProgressEvent::Cancelled { at_stage } => self.tracker.cancelled(at_stage),
        }
    }
}
