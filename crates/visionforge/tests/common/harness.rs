//! Test harness for isolated pipeline runs.
//!
//! The `TestHarness` struct provides:
//! - A temporary output directory with a local object store under it
//! - Pipeline construction from a `Config` and a set of fakes
//! - Single-job execution with the resulting job snapshot

#![allow(dead_code)]

use std::path::{Path, PathBuf};
use std::sync::atomic::AtomicBool;
use std::sync::Arc;

use tempfile::TempDir;

use visionforge::broadcast::JobStore;
use visionforge::config::Config;
use visionforge::model::{Job, JobOutcome, JobRequest};
use visionforge::pipeline::{NoopProgress, Pipeline, PipelineConfig, PipelineContext};
use visionforge::storage::LocalObjectStorage;

use super::builders::ConfigBuilder;
use super::fakes::Fakes;

/// Result of running one job through the harness.
pub struct RunResult {
    pub outcome: JobOutcome,
    pub job: Job,
    pub context: PipelineContext,
}

pub struct TestHarness {
    temp_dir: TempDir,
    pub output_dir: PathBuf,
    pub published_dir: PathBuf,
    pub config: Config,
    pub store: Arc<JobStore>,
}

impl TestHarness {
    pub fn new() -> Self {
        Self::with_config(ConfigBuilder::new())
    }

    /// Uses `builder`, pointing its output directory into the temp dir.
    pub fn with_config(builder: ConfigBuilder) -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let output_dir = temp_dir.path().join("output");
        let published_dir = temp_dir.path().join("published");
        std::fs::create_dir_all(&output_dir).expect("Failed to create output dir");

        let config = builder
            .output_directory(&output_dir.to_string_lossy())
            .build();

        Self {
            temp_dir,
            output_dir,
            published_dir,
            config,
            store: Arc::new(JobStore::new()),
        }
    }

    pub fn temp_path(&self) -> &Path {
        self.temp_dir.path()
    }

    pub fn pipeline_config(&self) -> Arc<PipelineConfig> {
        Arc::new(PipelineConfig::from_config(&self.config))
    }

    pub fn storage(&self) -> Arc<LocalObjectStorage> {
        Arc::new(LocalObjectStorage::new(&self.published_dir, "https://cdn.test"))
    }

    pub fn pipeline(&self, fakes: &Fakes) -> Pipeline {
        Pipeline::new(self.pipeline_config(), fakes.collaborators(self.storage()))
    }

    /// Runs one job to completion.
    pub async fn run(&self, fakes: &Fakes, request: JobRequest) -> RunResult {
        let pipeline = self.pipeline(fakes);
        let handle = self.store.create(request.clone());
        let ctx = PipelineContext::new(handle.id(), request, pipeline.config());
        let cancel = AtomicBool::new(false);

        let (outcome, context) = pipeline.run(ctx, &handle, &cancel, &NoopProgress).await;
        let job = handle.snapshot().expect("job missing from store");

        RunResult {
            outcome,
            job,
            context,
        }
    }
}
