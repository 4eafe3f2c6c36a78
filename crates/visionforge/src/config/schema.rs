use serde::{Deserialize, Serialize};

use crate::transcode::{Container, MotionStyle};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub version: String,
    /// Root for per-job scratch files and the local object store.
    pub output_directory: String,
    /// SQLite archive of finished jobs. Jobs live only in memory when unset.
    #[serde(default)]
    pub database_path: Option<String>,
    #[serde(default)]
    pub worker: WorkerConfig,
    #[serde(default)]
    pub concurrency: ConcurrencyConfig,
    #[serde(default)]
    pub retry: RetryConfig,
    #[serde(default)]
    pub timeouts: TimeoutConfig,
    #[serde(default)]
    pub retrieval: RetrievalConfig,
    #[serde(default)]
    pub images: ImageConfig,
    #[serde(default)]
    pub narration: NarrationConfig,
    #[serde(default)]
    pub video: VideoConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub retention: RetentionConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl Config {
    /// A config with every section at its default.
    pub fn new(output_directory: impl Into<String>) -> Self {
        Self {
            version: "1.0".to_string(),
            output_directory: output_directory.into(),
            database_path: None,
            worker: WorkerConfig::default(),
            concurrency: ConcurrencyConfig::default(),
            retry: RetryConfig::default(),
            timeouts: TimeoutConfig::default(),
            retrieval: RetrievalConfig::default(),
            images: ImageConfig::default(),
            narration: NarrationConfig::default(),
            video: VideoConfig::default(),
            storage: StorageConfig::default(),
            retention: RetentionConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerConfig {
    #[serde(default = "default_max_concurrent_jobs")]
    pub max_concurrent_jobs: usize,
}

fn default_max_concurrent_jobs() -> usize {
    2
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            max_concurrent_jobs: default_max_concurrent_jobs(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConcurrencyConfig {
    /// Maximum outstanding per-scene calls within one job.
    #[serde(default = "default_scene_limit")]
    pub scene_limit: usize,
}

fn default_scene_limit() -> usize {
    4
}

impl Default for ConcurrencyConfig {
    fn default() -> Self {
        Self {
            scene_limit: default_scene_limit(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_initial_backoff_ms")]
    pub initial_backoff_ms: u64,
    #[serde(default = "default_max_backoff_ms")]
    pub max_backoff_ms: u64,
    #[serde(default = "default_true")]
    pub jitter: bool,
    /// Total retries shared by every call within one job.
    #[serde(default = "default_job_retry_budget")]
    pub job_retry_budget: u32,
    #[serde(default = "default_transcode_retries")]
    pub transcode_retries: u32,
    /// Attempts made to upload the final video before the job fails.
    #[serde(default = "default_max_retries")]
    pub publish_retries: u32,
}

fn default_max_retries() -> u32 {
    3
}

fn default_initial_backoff_ms() -> u64 {
    500
}

fn default_max_backoff_ms() -> u64 {
    8_000
}

fn default_true() -> bool {
    true
}

fn default_job_retry_budget() -> u32 {
    24
}

fn default_transcode_retries() -> u32 {
    2
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            initial_backoff_ms: default_initial_backoff_ms(),
            max_backoff_ms: default_max_backoff_ms(),
            jitter: true,
            job_retry_budget: default_job_retry_budget(),
            transcode_retries: default_transcode_retries(),
            publish_retries: default_max_retries(),
        }
    }
}

/// Per-call timeouts, in seconds.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimeoutConfig {
    #[serde(default = "default_text_secs")]
    pub text_secs: u64,
    #[serde(default = "default_search_secs")]
    pub search_secs: u64,
    #[serde(default = "default_image_secs")]
    pub image_secs: u64,
    #[serde(default = "default_speech_secs")]
    pub speech_secs: u64,
    #[serde(default = "default_transcode_secs")]
    pub transcode_secs: u64,
    #[serde(default = "default_upload_secs")]
    pub upload_secs: u64,
}

fn default_text_secs() -> u64 {
    90
}

fn default_search_secs() -> u64 {
    15
}

fn default_image_secs() -> u64 {
    120
}

fn default_speech_secs() -> u64 {
    60
}

fn default_transcode_secs() -> u64 {
    900
}

fn default_upload_secs() -> u64 {
    120
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            text_secs: default_text_secs(),
            search_secs: default_search_secs(),
            image_secs: default_image_secs(),
            speech_secs: default_speech_secs(),
            transcode_secs: default_transcode_secs(),
            upload_secs: default_upload_secs(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrievalConfig {
    #[serde(default = "default_max_snippets")]
    pub max_snippets: usize,
    #[serde(default = "default_vector_top_k")]
    pub vector_top_k: usize,
    #[serde(default = "default_knowledge_namespace")]
    pub namespace: String,
    #[serde(default = "default_true")]
    pub web_search: bool,
    #[serde(default = "default_web_max_results")]
    pub web_max_results: usize,
}

fn default_max_snippets() -> usize {
    8
}

fn default_vector_top_k() -> usize {
    5
}

fn default_knowledge_namespace() -> String {
    "knowledge".to_string()
}

fn default_web_max_results() -> usize {
    5
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            max_snippets: default_max_snippets(),
            vector_top_k: default_vector_top_k(),
            namespace: default_knowledge_namespace(),
            web_search: true,
            web_max_results: default_web_max_results(),
        }
    }
}

/// How image prompts are derived from scenes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PromptMode {
    /// Pure transform of each scene's description and narration.
    #[default]
    Template,
    /// One extra text-generation call producing all prompts at once.
    Generated,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImageConfig {
    #[serde(default = "default_image_size")]
    pub size: String,
    #[serde(default = "default_image_style")]
    pub style: String,
    #[serde(default)]
    pub prompt_mode: PromptMode,
    /// Similarity at or above which a previously generated image is reused.
    /// Reuse is disabled when unset.
    #[serde(default)]
    pub reuse_threshold: Option<f32>,
    #[serde(default = "default_reuse_namespace")]
    pub reuse_namespace: String,
}

fn default_image_size() -> String {
    "1792x1024".to_string()
}

fn default_image_style() -> String {
    "educational illustration".to_string()
}

fn default_reuse_namespace() -> String {
    "image-prompts".to_string()
}

impl Default for ImageConfig {
    fn default() -> Self {
        Self {
            size: default_image_size(),
            style: default_image_style(),
            prompt_mode: PromptMode::Template,
            reuse_threshold: None,
            reuse_namespace: default_reuse_namespace(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NarrationConfig {
    #[serde(default = "default_voice")]
    pub default_voice: String,
}

fn default_voice() -> String {
    "alloy".to_string()
}

impl Default for NarrationConfig {
    fn default() -> Self {
        Self {
            default_voice: default_voice(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VideoConfig {
    #[serde(default = "default_width")]
    pub width: u32,
    #[serde(default = "default_height")]
    pub height: u32,
    #[serde(default = "default_fps")]
    pub fps: u32,
    #[serde(default)]
    pub container: Container,
    #[serde(default)]
    pub motion: MotionStyle,
    /// Path or name of the ffmpeg executable.
    #[serde(default = "default_ffmpeg_path")]
    pub ffmpeg_path: String,
}

fn default_width() -> u32 {
    1920
}

fn default_height() -> u32 {
    1080
}

fn default_fps() -> u32 {
    30
}

fn default_ffmpeg_path() -> String {
    "ffmpeg".to_string()
}

impl Default for VideoConfig {
    fn default() -> Self {
        Self {
            width: default_width(),
            height: default_height(),
            fps: default_fps(),
            container: Container::default(),
            motion: MotionStyle::default(),
            ffmpeg_path: default_ffmpeg_path(),
        }
    }
}

/// Settings for the bundled local-filesystem object store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Directory uploads are copied into. Defaults to `<output_directory>/published`.
    #[serde(default)]
    pub root: Option<String>,
    #[serde(default = "default_base_url")]
    pub base_url: String,
}

fn default_base_url() -> String {
    "file://".to_string()
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            root: None,
            base_url: default_base_url(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetentionConfig {
    /// How long a finished job stays queryable.
    #[serde(default = "default_ttl_secs")]
    pub ttl_secs: u64,
    #[serde(default = "default_sweep_interval_secs")]
    pub sweep_interval_secs: u64,
}

fn default_ttl_secs() -> u64 {
    3_600
}

fn default_sweep_interval_secs() -> u64 {
    60
}

impl Default for RetentionConfig {
    fn default() -> Self {
        Self {
            ttl_secs: default_ttl_secs(),
            sweep_interval_secs: default_sweep_interval_secs(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
    #[serde(default)]
    pub json: bool,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}
