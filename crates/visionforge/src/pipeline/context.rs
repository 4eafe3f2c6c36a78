use std::path::PathBuf;
use std::sync::Arc;

use tokio::sync::Semaphore;

use crate::model::{Asset, AssetManifest, JobRequest, SceneSlots, Script, Timeline};
use crate::stages::retrieval::ContextSnippet;
use crate::transcode::TranscodeRequest;

use super::config::PipelineConfig;
use super::error::PipelineWarning;
use super::retry::RetryBudget;

pub struct PipelineContext {
    // Input
    pub job_id: String,
    pub request: JobRequest,
    pub work_dir: PathBuf,

    // Retrieval result, possibly empty
    pub snippets: Vec<ContextSnippet>,

    // Script generation result; fixes the scene count for every later stage
    pub script: Option<Script>,

    // One prompt per scene, index-aligned with the script
    pub prompts: Vec<String>,

    // Fan-out results, sized to the script once it exists
    pub images: SceneSlots<Asset>,
    pub audio: SceneSlots<Asset>,

    // Assembly results
    pub timeline: Option<Timeline>,
    pub transcode_request: Option<TranscodeRequest>,
    pub video: Option<Asset>,

    // Publishing result
    pub manifest: Option<AssetManifest>,

    // Non-fatal warnings
    pub warnings: Vec<PipelineWarning>,

    // Shared by every scene task of this job
    pub scene_limiter: Arc<Semaphore>,
    pub retry_budget: Arc<RetryBudget>,
}

impl PipelineContext {
    pub fn new(job_id: impl Into<String>, request: JobRequest, config: &PipelineConfig) -> Self {
        let job_id = job_id.into();
        Self {
            work_dir: config.work_dir(&job_id),
            job_id,
            request,
            snippets: Vec::new(),
            script: None,
            prompts: Vec::new(),
            images: SceneSlots::new(0),
            audio: SceneSlots::new(0),
            timeline: None,
            transcode_request: None,
            video: None,
            manifest: None,
            warnings: Vec::new(),
            scene_limiter: Arc::new(Semaphore::new(config.scene_limit)),
            retry_budget: Arc::new(RetryBudget::new(config.job_retry_budget)),
        }
    }

    pub fn scene_count(&self) -> usize {
        self.script.as_ref().map(Script::len).unwrap_or(0)
    }
}
