use std::path::PathBuf;
use std::time::Duration;

use crate::config::schema::{ImageConfig, RetrievalConfig, VideoConfig};
use crate::config::Config;

use super::retry::RetryPolicy;

/// Retry policy for each collaborator.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicies {
    pub text: RetryPolicy,
    pub search: RetryPolicy,
    pub image: RetryPolicy,
    pub speech: RetryPolicy,
    pub transcode: RetryPolicy,
    pub upload: RetryPolicy,
}

/// Runtime view of [`Config`] used by the pipeline.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Per-job scratch directories live under `<output_directory>/work`.
    pub output_directory: PathBuf,
    /// Maximum outstanding scene calls per job.
    pub scene_limit: usize,
    pub retries: RetryPolicies,
    pub job_retry_budget: u32,
    pub retrieval: RetrievalConfig,
    pub images: ImageConfig,
    pub default_voice: String,
    pub video: VideoConfig,
}

impl PipelineConfig {
    pub fn from_config(config: &Config) -> Self {
        let timeouts = &config.timeouts;
        let base = |secs: u64| RetryPolicy::from_config(&config.retry, Duration::from_secs(secs));

        Self {
            output_directory: PathBuf::from(&config.output_directory),
            scene_limit: config.concurrency.scene_limit.max(1),
            retries: RetryPolicies {
                text: base(timeouts.text_secs),
                search: base(timeouts.search_secs),
                image: base(timeouts.image_secs),
                speech: base(timeouts.speech_secs),
                transcode: base(timeouts.transcode_secs)
                    .with_max_retries(config.retry.transcode_retries),
                upload: base(timeouts.upload_secs).with_max_retries(config.retry.publish_retries),
            },
            job_retry_budget: config.retry.job_retry_budget,
            retrieval: config.retrieval.clone(),
            images: config.images.clone(),
            default_voice: config.narration.default_voice.clone(),
            video: config.video.clone(),
        }
    }

    /// Scratch directory for one job.
    pub fn work_dir(&self, job_id: &str) -> PathBuf {
        self.output_directory.join("work").join(job_id)
    }
}
