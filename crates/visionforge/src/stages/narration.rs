//! Per-scene narration synthesis.

use std::path::Path;

use futures_util::future::join_all;
use tokio::sync::Semaphore;
use tracing::info;

use crate::model::{Asset, Scene, SceneSlots, Script};
use crate::pipeline::retry::Retrier;
use crate::pipeline::StageError;
use crate::services::{ServiceError, SpeechRequest, SpeechSynthesizer, SynthesizedAudio};

use super::first_scene_failure;

/// A clip must report a finite, positive duration to be placed on the
/// timeline.
pub fn check_duration(audio: &SynthesizedAudio) -> Result<(), ServiceError> {
    if audio.duration_secs.is_finite() && audio.duration_secs > 0.0 {
        Ok(())
    } else {
        Err(ServiceError::malformed(format!(
            "audio duration {} is not positive",
            audio.duration_secs
        )))
    }
}

pub struct NarrationSynthesizer<'a> {
    pub speech: &'a dyn SpeechSynthesizer,
    pub default_voice: &'a str,
    pub retrier: Retrier<'a>,
    pub limiter: &'a Semaphore,
    pub output_dir: &'a Path,
}

impl NarrationSynthesizer<'_> {
    pub async fn synthesize(&self, script: &Script) -> Result<SceneSlots<Asset>, StageError> {
        let results = join_all(script.scenes().iter().map(|scene| self.synthesize_scene(scene))).await;

        let mut slots = SceneSlots::new(script.len());
        let mut failures = Vec::new();
        for (index, result) in results {
            match result {
                Ok(asset) => {
                    if let Err(e) = slots.insert(index, asset) {
                        return Err(StageError::DependencyGap(e.to_string()));
                    }
                }
                Err(e) => failures.push((index, e)),
            }
        }

        if let Some(err) = first_scene_failure(failures) {
            return Err(err);
        }
        info!(clips = slots.len(), "Narration synthesized");
        Ok(slots)
    }

    async fn synthesize_scene(&self, scene: &Scene) -> (usize, Result<Asset, ServiceError>) {
        let index = scene.index;
        let _permit = match self.limiter.acquire().await {
            Ok(permit) => permit,
            Err(_) => {
                return (
                    index,
                    Err(ServiceError::unavailable("scene limiter closed")),
                )
            }
        };

        let request = SpeechRequest {
            scene_index: index,
            text: scene.narration.clone(),
            voice: scene
                .voice
                .clone()
                .unwrap_or_else(|| self.default_voice.to_string()),
            output_dir: self.output_dir.to_path_buf(),
        };
        let label = format!("speech[{}]", index);
        let result = self
            .retrier
            .run(&label, || async {
                let audio = self.speech.synthesize(&request).await?;
                check_duration(&audio)?;
                Ok(audio)
            })
            .await
            .map(|audio| Asset::audio(index, audio.location, audio.duration_secs));
        (index, result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{AssetLocation, SceneDraft, ScriptDraft};
    use crate::pipeline::retry::{NoRetryObserver, RetryBudget, RetryPolicy};
    use async_trait::async_trait;
    use std::path::PathBuf;
    use std::sync::Mutex;
    use std::time::Duration;

    struct FakeSpeech {
        durations: Vec<f64>,
        voices: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl SpeechSynthesizer for FakeSpeech {
        async fn synthesize(&self, request: &SpeechRequest) -> Result<SynthesizedAudio, ServiceError> {
            self.voices.lock().unwrap().push(request.voice.clone());
            Ok(SynthesizedAudio {
                location: AssetLocation::Local(PathBuf::from(format!(
                    "/tmp/scene-{}.mp3",
                    request.scene_index
                ))),
                duration_secs: self.durations[request.scene_index],
            })
        }
    }

    fn script(n: usize) -> Script {
        let draft = ScriptDraft {
            title: None,
            scenes: (0..n)
                .map(|i| SceneDraft {
                    narration: format!("Line {}", i),
                    description: "d".to_string(),
                    voice: None,
                })
                .collect(),
        };
        Script::from_draft(draft, |i, _| (i == 0).then(|| "echo".to_string()))
    }

    fn policy() -> RetryPolicy {
        RetryPolicy {
            max_retries: 1,
            initial_backoff: Duration::from_millis(1),
            max_backoff: Duration::from_millis(2),
            jitter: false,
            call_timeout: Duration::from_secs(5),
        }
    }

    #[test]
    fn test_check_duration() {
        let audio = |d: f64| SynthesizedAudio {
            location: AssetLocation::Local(PathBuf::from("/a.mp3")),
            duration_secs: d,
        };
        assert!(check_duration(&audio(1.5)).is_ok());
        assert!(check_duration(&audio(0.0)).is_err());
        assert!(check_duration(&audio(f64::NAN)).is_err());
    }

    #[tokio::test]
    async fn test_synthesize_uses_scene_voice_or_default() {
        let speech = FakeSpeech {
            durations: vec![2.0, 3.5],
            voices: Mutex::new(Vec::new()),
        };
        let policy = policy();
        let budget = RetryBudget::new(4);
        let limiter = Semaphore::new(1);
        let narrator = NarrationSynthesizer {
            speech: &speech,
            default_voice: "alloy",
            retrier: Retrier::new(&policy, &budget, &NoRetryObserver),
            limiter: &limiter,
            output_dir: Path::new("/tmp"),
        };

        let slots = narrator.synthesize(&script(2)).await.unwrap();
        assert_eq!(slots.get(1).unwrap().duration_secs, Some(3.5));
        let mut voices = speech.voices.lock().unwrap().clone();
        voices.sort();
        assert_eq!(voices, vec!["alloy", "echo"]);
    }

    #[tokio::test]
    async fn test_zero_duration_clip_fails_after_retry() {
        let speech = FakeSpeech {
            durations: vec![2.0, 0.0],
            voices: Mutex::new(Vec::new()),
        };
        let policy = policy();
        let budget = RetryBudget::new(4);
        let limiter = Semaphore::new(2);
        let narrator = NarrationSynthesizer {
            speech: &speech,
            default_voice: "alloy",
            retrier: Retrier::new(&policy, &budget, &NoRetryObserver),
            limiter: &limiter,
            output_dir: Path::new("/tmp"),
        };

        let err = narrator.synthesize(&script(2)).await.unwrap_err();
        assert_eq!(err.kind(), crate::model::FailureKind::Validation);
        assert!(err.to_string().contains("scene 1"));
        assert_eq!(speech.voices.lock().unwrap().len(), 3);
    }
}
