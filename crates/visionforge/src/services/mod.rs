//! Interfaces to the external collaborators the pipeline drives.
//!
//! Every trait is object safe and returns [`ServiceError`] so the pipeline
//! can decide between retrying and failing from the error kind alone.

mod error;

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::model::AssetLocation;
use crate::transcode::TranscodeRequest;

pub use error::{ServiceError, ServiceErrorKind};

// ─── Text generation ───

#[derive(Debug, Clone, PartialEq)]
pub struct TextRequest {
    pub prompt: String,
    /// Retrieved context, already rendered for the prompt.
    pub context: Option<String>,
    pub temperature: f32,
    /// Ask the service to answer with a JSON object.
    pub json_output: bool,
}

#[async_trait]
pub trait TextGenerator: Send + Sync {
    async fn generate(&self, request: &TextRequest) -> Result<String, ServiceError>;
}

// ─── Retrieval ───

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VectorMatch {
    pub id: String,
    pub score: f32,
    pub text: String,
    #[serde(default)]
    pub metadata: HashMap<String, String>,
}

/// Embedding plus similarity search over a vector index.
#[async_trait]
pub trait VectorSearch: Send + Sync {
    async fn query(
        &self,
        namespace: &str,
        text: &str,
        top_k: usize,
    ) -> Result<Vec<VectorMatch>, ServiceError>;

    async fn upsert(
        &self,
        namespace: &str,
        id: &str,
        text: &str,
        metadata: HashMap<String, String>,
    ) -> Result<(), ServiceError>;
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WebResult {
    pub title: String,
    pub url: String,
    pub content: String,
    pub score: f32,
}

#[async_trait]
pub trait WebSearch: Send + Sync {
    async fn search(&self, query: &str, max_results: usize)
        -> Result<Vec<WebResult>, ServiceError>;
}

// ─── Media ───

#[derive(Debug, Clone, PartialEq)]
pub struct ImageRequest {
    pub scene_index: usize,
    pub prompt: String,
    pub size: String,
    pub style: String,
    /// Scratch directory for services that write files locally.
    pub output_dir: PathBuf,
}

#[derive(Debug, Clone, PartialEq)]
pub struct GeneratedImage {
    pub location: AssetLocation,
}

#[async_trait]
pub trait ImageGenerator: Send + Sync {
    async fn generate(&self, request: &ImageRequest) -> Result<GeneratedImage, ServiceError>;
}

#[derive(Debug, Clone, PartialEq)]
pub struct SpeechRequest {
    pub scene_index: usize,
    pub text: String,
    pub voice: String,
    pub output_dir: PathBuf,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SynthesizedAudio {
    pub location: AssetLocation,
    /// Measured length of the clip in seconds.
    pub duration_secs: f64,
}

#[async_trait]
pub trait SpeechSynthesizer: Send + Sync {
    async fn synthesize(&self, request: &SpeechRequest) -> Result<SynthesizedAudio, ServiceError>;
}

/// Encodes an ordered segment list into one video file.
#[async_trait]
pub trait Transcoder: Send + Sync {
    /// Writes the video into `work_dir` and returns its path.
    async fn transcode(
        &self,
        request: &TranscodeRequest,
        work_dir: &Path,
    ) -> Result<PathBuf, ServiceError>;
}

// ─── Storage ───

#[async_trait]
pub trait ObjectStorage: Send + Sync {
    /// Stores `local` under `key` and returns a durable URL for it.
    async fn upload(
        &self,
        local: &Path,
        key: &str,
        content_type: &str,
    ) -> Result<String, ServiceError>;
}

/// The full set of collaborators one pipeline talks to. Retrieval sources
/// are optional; the others are required.
#[derive(Clone)]
pub struct Collaborators {
    pub text: Arc<dyn TextGenerator>,
    pub vector: Option<Arc<dyn VectorSearch>>,
    pub web: Option<Arc<dyn WebSearch>>,
    pub images: Arc<dyn ImageGenerator>,
    pub speech: Arc<dyn SpeechSynthesizer>,
    pub transcoder: Arc<dyn Transcoder>,
    pub storage: Arc<dyn ObjectStorage>,
}

impl std::fmt::Debug for Collaborators {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Collaborators")
            .field("vector", &self.vector.is_some())
            .field("web", &self.web.is_some())
            .finish_non_exhaustive()
    }
}
