//! Stage adapters. Each stage turns the previous stage's output into its
//! own by driving one kind of collaborator; sequencing and job state stay in
//! [`crate::pipeline`].

pub mod assemble;
pub mod images;
pub mod narration;
pub mod prompts;
pub mod publish;
pub mod retrieval;
pub mod script;

use std::path::Path;

use crate::pipeline::StageError;
use crate::services::ServiceError;

/// Reduces per-scene failures to the one with the lowest scene index,
/// prefixing its message with that index.
pub(crate) fn first_scene_failure(failures: Vec<(usize, ServiceError)>) -> Option<StageError> {
    failures
        .into_iter()
        .min_by_key(|(index, _)| *index)
        .map(|(index, err)| {
            StageError::Service(ServiceError::new(
                err.kind,
                format!("scene {}: {}", index, err.message),
            ))
        })
}

/// Creates a scratch directory for a stage.
pub(crate) async fn ensure_dir(path: &Path) -> Result<(), StageError> {
    tokio::fs::create_dir_all(path)
        .await
        .map_err(|e| StageError::Workspace {
            path: path.display().to_string(),
            reason: e.to_string(),
        })
}
