//! Builder patterns for creating test data programmatically.

#![allow(dead_code)]

use serde_json::json;

use visionforge::config::{Config, PromptMode};

/// Builder for creating `Config` instances with fast retries.
pub struct ConfigBuilder {
    config: Config,
}

impl ConfigBuilder {
    /// Create a new builder with defaults suited to tests: millisecond
    /// backoff without jitter.
    pub fn new() -> Self {
        let mut config = Config::new("/tmp/visionforge-test");
        config.retry.initial_backoff_ms = 1;
        config.retry.max_backoff_ms = 4;
        config.retry.jitter = false;
        config.video.width = 640;
        config.video.height = 360;
        Self { config }
    }

    pub fn output_directory(mut self, path: &str) -> Self {
        self.config.output_directory = path.to_string();
        self
    }

    pub fn scene_limit(mut self, limit: usize) -> Self {
        self.config.concurrency.scene_limit = limit;
        self
    }

    pub fn max_retries(mut self, retries: u32) -> Self {
        self.config.retry.max_retries = retries;
        self
    }

    pub fn job_retry_budget(mut self, budget: u32) -> Self {
        self.config.retry.job_retry_budget = budget;
        self
    }

    pub fn max_concurrent_jobs(mut self, jobs: usize) -> Self {
        self.config.worker.max_concurrent_jobs = jobs;
        self
    }

    pub fn prompt_mode(mut self, mode: PromptMode) -> Self {
        self.config.images.prompt_mode = mode;
        self
    }

    pub fn web_search(mut self, enabled: bool) -> Self {
        self.config.retrieval.web_search = enabled;
        self
    }

    pub fn build(self) -> Config {
        self.config
    }
}

impl Default for ConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Builder for the JSON script a text generator returns.
pub struct ScriptBuilder {
    title: Option<String>,
    scenes: Vec<serde_json::Value>,
}

impl ScriptBuilder {
    pub fn new() -> Self {
        Self {
            title: None,
            scenes: Vec::new(),
        }
    }

    pub fn title(mut self, title: &str) -> Self {
        self.title = Some(title.to_string());
        self
    }

    pub fn scene(mut self, narration: &str, description: &str) -> Self {
        self.scenes.push(json!({
            "narration": narration,
            "description": description,
        }));
        self
    }

    pub fn voiced_scene(mut self, narration: &str, description: &str, voice: &str) -> Self {
        self.scenes.push(json!({
            "narration": narration,
            "description": description,
            "voice": voice,
        }));
        self
    }

    /// `count` numbered scenes.
    pub fn scenes(mut self, count: usize) -> Self {
        for i in 0..count {
            self = self.scene(
                &format!("Narration for part {}.", i + 1),
                &format!("Illustration of part {}", i + 1),
            );
        }
        self
    }

    pub fn to_json(&self) -> String {
        json!({
            "title": self.title,
            "scenes": self.scenes,
        })
        .to_string()
    }
}

impl Default for ScriptBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// The three-scene photosynthesis script used across tests.
pub fn photosynthesis_script() -> String {
    ScriptBuilder::new()
        .title("Photosynthesis")
        .scene(
            "Plants capture sunlight with chlorophyll.",
            "A green leaf glowing in sunlight",
        )
        .scene(
            "Water and carbon dioxide become glucose.",
            "A diagram of a chloroplast",
        )
        .scene(
            "Oxygen is released into the air.",
            "Bubbles rising from an aquatic plant",
        )
        .to_json()
}
