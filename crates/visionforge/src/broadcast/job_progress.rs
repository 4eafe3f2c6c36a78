//! Job progress broadcaster for real-time job status streaming.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use crate::model::{JobStatus, Stage, StageStatus};

/// Progress event for a job.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobProgressEvent {
    /// Unique job identifier.
    pub job_id: String,
    /// Topic the video is about.
    pub topic: String,
    /// Stage the event refers to, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stage: Option<Stage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stage_status: Option<StageStatus>,
    /// Overall job status.
    pub job_status: JobStatus,
    /// Human-readable message describing current activity.
    pub message: String,
    /// Timestamp of this event.
    pub timestamp: DateTime<Utc>,
    /// Error message (set on failure).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// URL of the published video (set on success).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub video_url: Option<String>,
}

impl JobProgressEvent {
    /// Creates a job-level event with no stage attached.
    pub fn new(job_id: &str, topic: &str, job_status: JobStatus, message: &str) -> Self {
        Self {
            job_id: job_id.to_string(),
            topic: topic.to_string(),
            stage: None,
            stage_status: None,
            job_status,
            message: message.to_string(),
            timestamp: Utc::now(),
            error: None,
            video_url: None,
        }
    }

    /// Creates a stage transition event for a running job.
    pub fn stage(
        job_id: &str,
        topic: &str,
        stage: Stage,
        stage_status: StageStatus,
        message: &str,
    ) -> Self {
        Self {
            stage: Some(stage),
            stage_status: Some(stage_status),
            ..Self::new(job_id, topic, JobStatus::Running, message)
        }
    }

    /// Creates a completion event.
    pub fn completed(job_id: &str, topic: &str, video_url: &str) -> Self {
        Self {
            video_url: Some(video_url.to_string()),
            ..Self::new(
                job_id,
                topic,
                JobStatus::Succeeded,
                "Video published successfully",
            )
        }
    }

    /// Creates a failure event.
    pub fn failed(job_id: &str, topic: &str, stage: Stage, error: &str) -> Self {
        Self {
            stage: Some(stage),
            stage_status: Some(StageStatus::FailedTerminal),
            error: Some(error.to_string()),
            ..Self::new(job_id, topic, JobStatus::Failed, "Generation failed")
        }
    }

    /// Creates a cancellation event.
    pub fn cancelled(job_id: &str, topic: &str, at_stage: Option<Stage>) -> Self {
        Self {
            stage: at_stage,
            ..Self::new(job_id, topic, JobStatus::Cancelled, "Job cancelled")
        }
    }
}

/// Broadcasts job progress events for streaming.
#[derive(Clone)]
pub struct JobProgressBroadcaster {
    sender: Arc<broadcast::Sender<JobProgressEvent>>,
}

impl JobProgressBroadcaster {
    /// Creates a new job progress broadcaster with the specified channel capacity.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self {
            sender: Arc::new(sender),
        }
    }

    /// Sends a progress event to all subscribers.
    pub fn send(&self, event: JobProgressEvent) {
        // No active receivers is fine
        let _ = self.sender.send(event);
    }

    /// Creates a new subscriber for progress events.
    pub fn subscribe(&self) -> broadcast::Receiver<JobProgressEvent> {
        self.sender.subscribe()
    }

    /// Creates a tracker for a job and announces it as queued.
    pub fn start_job(&self, job_id: &str, topic: &str) -> JobProgressTracker {
        let tracker = JobProgressTracker::new(job_id, topic, Arc::clone(&self.sender));
        tracker.send(JobProgressEvent::new(
            job_id,
            topic,
            JobStatus::Queued,
            "Job queued for generation",
        ));
        tracker
    }

    /// Gets the inner sender for creating trackers.
    pub fn sender(&self) -> Arc<broadcast::Sender<JobProgressEvent>> {
        Arc::clone(&self.sender)
    }
}

impl Default for JobProgressBroadcaster {
    fn default() -> Self {
        Self::new(100)
    }
}

/// Tracks progress for a single job.
pub struct JobProgressTracker {
    job_id: String,
    topic: String,
    sender: Arc<broadcast::Sender<JobProgressEvent>>,
}

impl JobProgressTracker {
    pub fn new(job_id: &str, topic: &str, sender: Arc<broadcast::Sender<JobProgressEvent>>) -> Self {
        Self {
            job_id: job_id.to_string(),
            topic: topic.to_string(),
            sender,
        }
    }

    fn send(&self, event: JobProgressEvent) {
        let _ = self.sender.send(event);
    }

    pub fn stage_update(&self, stage: Stage, status: StageStatus, message: &str) {
        self.send(JobProgressEvent::stage(
            &self.job_id,
            &self.topic,
            stage,
            status,
            message,
        ));
    }

    pub fn completed(&self, video_url: &str) {
        self.send(JobProgressEvent::completed(
            &self.job_id,
            &self.topic,
            video_url,
        ));
    }

    pub fn failed(&self, stage: Stage, error: &str) {
        self.send(JobProgressEvent::failed(
            &self.job_id,
            &self.topic,
            stage,
            error,
        ));
    }

    pub fn cancelled(&self, at_stage: Option<Stage>) {
        self.send(JobProgressEvent::cancelled(
            &self.job_id,
            &self.topic,
            at_stage,
        ));
    }
}
