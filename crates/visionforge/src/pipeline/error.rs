use thiserror::Error;

use crate::model::{FailureKind, JobFailure, Stage, TransitionError};
use crate::services::{ServiceError, ServiceErrorKind};

/// Why a stage ended in `failed_terminal`.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum StageError {
    /// Per-scene assets are missing or unusable entering assembly.
    #[error("Missing upstream data: {0}")]
    DependencyGap(String),

    #[error("{0}")]
    Service(#[from] ServiceError),

    #[error("Publishing the final video failed: {0}")]
    Publish(String),

    #[error("Invalid stage transition: {0}")]
    Transition(#[from] TransitionError),

    #[error("Failed to prepare '{path}': {reason}")]
    Workspace { path: String, reason: String },
}

impl StageError {
    pub fn kind(&self) -> FailureKind {
        match self {
            StageError::DependencyGap(_) | StageError::Transition(_) => FailureKind::DependencyGap,
            StageError::Service(e) => match e.kind {
                ServiceErrorKind::Malformed => FailureKind::Validation,
                ServiceErrorKind::Rejected => FailureKind::ServiceRejected,
                _ => FailureKind::TransientService,
            },
            StageError::Workspace { .. } => FailureKind::TransientService,
            StageError::Publish(_) => FailureKind::Publish,
        }
    }

    /// Whether submitting the same request again may succeed. Gaps and
    /// outright rejections will repeat; everything else may not.
    pub fn retryable_by_resubmission(&self) -> bool {
        !matches!(
            self.kind(),
            FailureKind::DependencyGap | FailureKind::ServiceRejected
        )
    }

    pub fn to_failure(&self, stage: Stage) -> JobFailure {
        JobFailure {
            stage,
            kind: self.kind(),
            message: self.to_string(),
            retryable_by_resubmission: self.retryable_by_resubmission(),
        }
    }
}

/// Non-fatal degradations recorded on the job's manifest.
#[derive(Debug, Clone, PartialEq)]
pub enum PipelineWarning {
    RetrievalDegraded { source: String, error: String },
    ImageReuseFailed { error: String },
    IntermediateUploadFailed { key: String, error: String },
}

impl std::fmt::Display for PipelineWarning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PipelineWarning::RetrievalDegraded { source, error } => {
                write!(f, "{} retrieval unavailable: {}", source, error)
            }
            PipelineWarning::ImageReuseFailed { error } => {
                write!(f, "image reuse lookup failed: {}", error)
            }
            PipelineWarning::IntermediateUploadFailed { key, error } => {
                write!(f, "upload of {} failed: {}", key, error)
            }
        }
    }
}
