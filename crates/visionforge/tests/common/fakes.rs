//! Fake collaborators with call recording and failure injection.

#![allow(dead_code)]

use std::collections::{HashMap, VecDeque};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;

use visionforge::model::AssetLocation;
use visionforge::services::{
    Collaborators, GeneratedImage, ImageGenerator, ImageRequest, ObjectStorage, ServiceError,
    SpeechRequest, SpeechSynthesizer, SynthesizedAudio, TextGenerator, TextRequest, Transcoder,
    VectorMatch, VectorSearch, WebResult, WebSearch,
};
use visionforge::transcode::TranscodeRequest;

// ── Text ──

/// Replays queued responses in order, repeating the last one.
pub struct FakeText {
    responses: Mutex<VecDeque<Result<String, ServiceError>>>,
    last: Mutex<Result<String, ServiceError>>,
    pub requests: Mutex<Vec<TextRequest>>,
}

impl FakeText {
    pub fn new(response: impl Into<String>) -> Self {
        Self::sequence(vec![Ok(response.into())])
    }

    pub fn sequence(responses: Vec<Result<String, ServiceError>>) -> Self {
        let mut responses: VecDeque<_> = responses.into();
        let last = responses
            .back()
            .cloned()
            .unwrap_or_else(|| Err(ServiceError::unavailable("no response scripted")));
        if responses.len() == 1 {
            responses.clear();
        }
        Self {
            responses: Mutex::new(responses),
            last: Mutex::new(last),
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn calls(&self) -> usize {
        self.requests.lock().unwrap().len()
    }
}

#[async_trait]
impl TextGenerator for FakeText {
    async fn generate(&self, request: &TextRequest) -> Result<String, ServiceError> {
        self.requests.lock().unwrap().push(request.clone());
        match self.responses.lock().unwrap().pop_front() {
            Some(response) => response,
            None => self.last.lock().unwrap().clone(),
        }
    }
}

// ── Retrieval ──

pub struct FakeVector {
    pub matches: Vec<VectorMatch>,
    pub fail: bool,
    pub upserts: Mutex<Vec<(String, String)>>,
}

impl FakeVector {
    pub fn with_texts(texts: &[(&str, f32)]) -> Self {
        Self {
            matches: texts
                .iter()
                .enumerate()
                .map(|(i, (text, score))| VectorMatch {
                    id: format!("doc-{}", i),
                    score: *score,
                    text: text.to_string(),
                    metadata: HashMap::new(),
                })
                .collect(),
            fail: false,
            upserts: Mutex::new(Vec::new()),
        }
    }

    pub fn failing() -> Self {
        Self {
            matches: Vec::new(),
            fail: true,
            upserts: Mutex::new(Vec::new()),
        }
    }
}

#[async_trait]
impl VectorSearch for FakeVector {
    async fn query(
        &self,
        _namespace: &str,
        _text: &str,
        top_k: usize,
    ) -> Result<Vec<VectorMatch>, ServiceError> {
        if self.fail {
            return Err(ServiceError::unavailable("index offline"));
        }
        Ok(self.matches.iter().take(top_k).cloned().collect())
    }

    async fn upsert(
        &self,
        namespace: &str,
        id: &str,
        _text: &str,
        _metadata: HashMap<String, String>,
    ) -> Result<(), ServiceError> {
        self.upserts
            .lock()
            .unwrap()
            .push((namespace.to_string(), id.to_string()));
        Ok(())
    }
}

pub struct FakeWeb {
    pub results: Vec<WebResult>,
}

#[async_trait]
impl WebSearch for FakeWeb {
    async fn search(&self, _query: &str, max_results: usize) -> Result<Vec<WebResult>, ServiceError> {
        Ok(self.results.iter().take(max_results).cloned().collect())
    }
}

// ── Images ──

/// Writes a small PNG-named file per scene. `fail_scene` always fails.
pub struct FakeImages {
    pub fail_scene: Option<usize>,
    pub calls: Mutex<Vec<usize>>,
}

impl FakeImages {
    pub fn new() -> Self {
        Self {
            fail_scene: None,
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn failing_on(scene: usize) -> Self {
        Self {
            fail_scene: Some(scene),
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn calls_for(&self, scene: usize) -> usize {
        self.calls.lock().unwrap().iter().filter(|s| **s == scene).count()
    }

    pub fn total_calls(&self) -> usize {
        self.calls.lock().unwrap().len()
    }
}

#[async_trait]
impl ImageGenerator for FakeImages {
    async fn generate(&self, request: &ImageRequest) -> Result<GeneratedImage, ServiceError> {
        self.calls.lock().unwrap().push(request.scene_index);
        if self.fail_scene == Some(request.scene_index) {
            return Err(ServiceError::transport("connection reset"));
        }
        let path = request
            .output_dir
            .join(format!("scene-{:03}.png", request.scene_index));
        write_file(&path, request.prompt.as_bytes()).await?;
        Ok(GeneratedImage {
            location: AssetLocation::Local(path),
        })
    }
}

// ── Speech ──

/// Writes an MP3-named file per scene and tracks how many calls are
/// outstanding at once.
pub struct FakeSpeech {
    pub durations: Vec<f64>,
    pub delay: Duration,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
    pub completed: Mutex<Vec<usize>>,
    pub voices: Mutex<Vec<(usize, String)>>,
}

impl FakeSpeech {
    pub fn new(durations: Vec<f64>) -> Self {
        Self {
            durations,
            delay: Duration::ZERO,
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
            completed: Mutex::new(Vec::new()),
            voices: Mutex::new(Vec::new()),
        }
    }

    /// Later scenes finish first.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    pub fn voice_for(&self, scene: usize) -> Option<String> {
        self.voices
            .lock()
            .unwrap()
            .iter()
            .find(|(s, _)| *s == scene)
            .map(|(_, v)| v.clone())
    }
}

#[async_trait]
impl SpeechSynthesizer for FakeSpeech {
    async fn synthesize(&self, request: &SpeechRequest) -> Result<SynthesizedAudio, ServiceError> {
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        self.voices
            .lock()
            .unwrap()
            .push((request.scene_index, request.voice.clone()));

        if !self.delay.is_zero() {
            let scenes = self.durations.len().max(1) as u32;
            let remaining = scenes.saturating_sub(request.scene_index as u32);
            tokio::time::sleep(self.delay * remaining).await;
        }

        let path = request
            .output_dir
            .join(format!("scene-{:03}.mp3", request.scene_index));
        let result = write_file(&path, request.text.as_bytes()).await;

        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        result?;
        self.completed.lock().unwrap().push(request.scene_index);

        Ok(SynthesizedAudio {
            location: AssetLocation::Local(path),
            duration_secs: self.durations.get(request.scene_index).copied().unwrap_or(1.0),
        })
    }
}

// ── Transcoder ──

/// Writes the canonical request as the "video" and records every request.
pub struct FakeTranscoder {
    pub requests: Mutex<Vec<Vec<u8>>>,
}

impl FakeTranscoder {
    pub fn new() -> Self {
        Self {
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn calls(&self) -> usize {
        self.requests.lock().unwrap().len()
    }
}

#[async_trait]
impl Transcoder for FakeTranscoder {
    async fn transcode(
        &self,
        request: &TranscodeRequest,
        work_dir: &Path,
    ) -> Result<PathBuf, ServiceError> {
        let bytes = request
            .canonical_bytes()
            .map_err(|e| ServiceError::malformed(e.to_string()))?;
        self.requests.lock().unwrap().push(bytes.clone());
        let path = work_dir.join(request.output_file_name());
        write_file(&path, &bytes).await?;
        Ok(path)
    }
}

async fn write_file(path: &Path, content: &[u8]) -> Result<(), ServiceError> {
    tokio::fs::write(path, content)
        .await
        .map_err(|e| ServiceError::transport(e.to_string()))
}

// ── Bundle ──

/// The fakes one pipeline run talks to.
pub struct Fakes {
    pub text: Arc<FakeText>,
    pub vector: Option<Arc<FakeVector>>,
    pub web: Option<Arc<FakeWeb>>,
    pub images: Arc<FakeImages>,
    pub speech: Arc<FakeSpeech>,
    pub transcoder: Arc<FakeTranscoder>,
}

impl Fakes {
    /// Fakes answering with `script_json` and narration of the given
    /// durations.
    pub fn new(script_json: String, durations: Vec<f64>) -> Self {
        Self {
            text: Arc::new(FakeText::new(script_json)),
            vector: None,
            web: None,
            images: Arc::new(FakeImages::new()),
            speech: Arc::new(FakeSpeech::new(durations)),
            transcoder: Arc::new(FakeTranscoder::new()),
        }
    }

    pub fn with_images(mut self, images: FakeImages) -> Self {
        self.images = Arc::new(images);
        self
    }

    pub fn with_speech(mut self, speech: FakeSpeech) -> Self {
        self.speech = Arc::new(speech);
        self
    }

    pub fn with_text(mut self, text: FakeText) -> Self {
        self.text = Arc::new(text);
        self
    }

    pub fn with_vector(mut self, vector: FakeVector) -> Self {
        self.vector = Some(Arc::new(vector));
        self
    }

    pub fn with_web(mut self, web: FakeWeb) -> Self {
        self.web = Some(Arc::new(web));
        self
    }

    pub fn collaborators(&self, storage: Arc<dyn ObjectStorage>) -> Collaborators {
        Collaborators {
            text: self.text.clone(),
            vector: self
                .vector
                .clone()
                .map(|v| v as Arc<dyn VectorSearch>),
            web: self.web.clone().map(|w| w as Arc<dyn WebSearch>),
            images: self.images.clone(),
            speech: self.speech.clone(),
            transcoder: self.transcoder.clone(),
            storage,
        }
    }
}
