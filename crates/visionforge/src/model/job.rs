//! Jobs, their requests, and terminal outcomes.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::stage::{Stage, StageStates};
use crate::transcode::Container;

/// Overall status of a job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Queued,
    Running,
    Succeeded,
    Failed,
    Cancelled,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Queued => "queued",
            JobStatus::Running => "running",
            JobStatus::Succeeded => "succeeded",
            JobStatus::Failed => "failed",
            JobStatus::Cancelled => "cancelled",
        }
    }

    pub fn parse(s: &str) -> Option<JobStatus> {
        match s {
            "queued" => Some(JobStatus::Queued),
            "running" => Some(JobStatus::Running),
            "succeeded" => Some(JobStatus::Succeeded),
            "failed" => Some(JobStatus::Failed),
            "cancelled" => Some(JobStatus::Cancelled),
            _ => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            JobStatus::Succeeded | JobStatus::Failed | JobStatus::Cancelled
        )
    }
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Per-job options supplied with the request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobConfig {
    /// Voices available to the narration stage. Empty means the configured
    /// default voice; more than one enables multi-voice narration.
    #[serde(default)]
    pub voices: Vec<String>,
    #[serde(default)]
    pub rag_enabled: bool,
    /// Overrides the configured container when set.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output_format: Option<Container>,
    /// Visual style appended to image prompts.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub style: Option<String>,
    #[serde(default = "default_language")]
    pub language: String,
}

fn default_language() -> String {
    "en".to_string()
}

impl Default for JobConfig {
    fn default() -> Self {
        Self {
            voices: Vec::new(),
            rag_enabled: false,
            output_format: None,
            style: None,
            language: default_language(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobRequest {
    pub topic: String,
    #[serde(default)]
    pub config: JobConfig,
}

impl JobRequest {
    pub fn new(topic: impl Into<String>) -> Self {
        Self {
            topic: topic.into(),
            config: JobConfig::default(),
        }
    }

    pub fn with_config(mut self, config: JobConfig) -> Self {
        self.config = config;
        self
    }
}

/// Category of a terminal failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    Validation,
    DependencyGap,
    TransientService,
    ServiceRejected,
    Publish,
}

/// Terminal error summary: the failing stage and why.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobFailure {
    pub stage: Stage,
    pub kind: FailureKind,
    pub message: String,
    /// Whether submitting the same request again may succeed.
    pub retryable_by_resubmission: bool,
}

/// A published artifact and where it can be fetched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PublishedAsset {
    pub key: String,
    pub url: String,
    pub content_type: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SceneManifest {
    pub index: usize,
    pub start_secs: f64,
    pub end_secs: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub audio_url: Option<String>,
}

/// Everything a successful job produced.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssetManifest {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    pub final_video: PublishedAsset,
    pub total_duration_secs: f64,
    pub scenes: Vec<SceneManifest>,
    /// Non-fatal degradations encountered along the way.
    #[serde(default)]
    pub warnings: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum JobOutcome {
    Succeeded(AssetManifest),
    Failed(JobFailure),
    Cancelled {
        #[serde(skip_serializing_if = "Option::is_none")]
        at_stage: Option<Stage>,
    },
}

impl JobOutcome {
    pub fn status(&self) -> JobStatus {
        match self {
            JobOutcome::Succeeded(_) => JobStatus::Succeeded,
            JobOutcome::Failed(_) => JobStatus::Failed,
            JobOutcome::Cancelled { .. } => JobStatus::Cancelled,
        }
    }

    pub fn manifest(&self) -> Option<&AssetManifest> {
        match self {
            JobOutcome::Succeeded(manifest) => Some(manifest),
            _ => None,
        }
    }

    pub fn failure(&self) -> Option<&JobFailure> {
        match self {
            JobOutcome::Failed(failure) => Some(failure),
            _ => None,
        }
    }
}

/// One end-to-end generation request and its progress.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Job {
    pub id: String,
    pub topic: String,
    pub config: JobConfig,
    pub status: JobStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub current_stage: Option<Stage>,
    pub stages: StageStates,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub outcome: Option<JobOutcome>,
}

impl Job {
    pub fn new(request: JobRequest) -> Self {
        let now = Utc::now();
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            topic: request.topic,
            config: request.config,
            status: JobStatus::Queued,
            current_stage: None,
            stages: StageStates::new(),
            created_at: now,
            updated_at: now,
            outcome: None,
        }
    }

    pub fn request(&self) -> JobRequest {
        JobRequest {
            topic: self.topic.clone(),
            config: self.config.clone(),
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// Records the terminal outcome and moves the job to the matching status.
    pub fn finish(&mut self, outcome: JobOutcome) {
        self.status = outcome.status();
        self.outcome = Some(outcome);
        self.updated_at = Utc::now();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_job_is_queued() {
        let job = Job::new(JobRequest::new("Photosynthesis"));
        assert_eq!(job.status, JobStatus::Queued);
        assert!(job.current_stage.is_none());
        assert!(job.outcome.is_none());
        assert_eq!(job.config.language, "en");
        assert!(uuid::Uuid::parse_str(&job.id).is_ok());
    }

    #[test]
    fn test_job_ids_are_unique() {
        let a = Job::new(JobRequest::new("a"));
        let b = Job::new(JobRequest::new("a"));
        assert_ne!(a.id, b.id);
    }

    #[test]
    fn test_finish_sets_status_from_outcome() {
        let mut job = Job::new(JobRequest::new("Tides"));
        job.finish(JobOutcome::Failed(JobFailure {
            stage: Stage::ImageGeneration,
            kind: FailureKind::TransientService,
            message: "timed out".to_string(),
            retryable_by_resubmission: true,
        }));

        assert_eq!(job.status, JobStatus::Failed);
        assert!(job.is_terminal());
        let failure = job.outcome.as_ref().and_then(JobOutcome::failure).unwrap();
        assert_eq!(failure.stage, Stage::ImageGeneration);
    }

    #[test]
    fn test_status_round_trip() {
        for status in [
            JobStatus::Queued,
            JobStatus::Running,
            JobStatus::Succeeded,
            JobStatus::Failed,
            JobStatus::Cancelled,
        ] {
            assert_eq!(JobStatus::parse(status.as_str()), Some(status));
        }
        assert!(!JobStatus::Running.is_terminal());
    }

    #[test]
    fn test_request_defaults_from_json() {
        let request: JobRequest = serde_json::from_str(r#"{"topic":"Volcanoes"}"#).unwrap();
        assert_eq!(request.config, JobConfig::default());

        let request: JobRequest = serde_json::from_str(
            r#"{"topic":"Volcanoes","config":{"voices":["nova","echo"],"ragEnabled":true,"outputFormat":"webm"}}"#,
        )
        .unwrap();
        assert!(request.config.rag_enabled);
        assert_eq!(request.config.voices.len(), 2);
        assert_eq!(request.config.output_format, Some(Container::Webm));
    }

    #[test]
    fn test_outcome_serializes_with_status_tag() {
        let outcome = JobOutcome::Cancelled {
            at_stage: Some(Stage::NarrationSynthesis),
        };
        let json = serde_json::to_value(&outcome).unwrap();
        assert_eq!(json["status"], "cancelled");
        assert_eq!(json["at_stage"], "narration_synthesis");
    }
}
