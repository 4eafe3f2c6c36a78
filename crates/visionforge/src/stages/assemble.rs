//! Timeline assembly: synchronize scenes against narration, then transcode.

use std::path::{Path, PathBuf};

use tracing::info;

use crate::model::{Asset, AssetLocation, SceneSlots, Timeline};
use crate::pipeline::retry::Retrier;
use crate::pipeline::StageError;
use crate::sanitize;
use crate::services::{ServiceError, Transcoder};
use crate::transcode::{MotionStyle, OutputParams, TranscodeRequest};

/// Builds the timeline. Any gap is terminal: retrying assembly cannot
/// produce an asset an upstream stage failed to deliver.
pub fn build_timeline(
    scene_count: usize,
    images: &SceneSlots<Asset>,
    audio: &SceneSlots<Asset>,
) -> Result<Timeline, StageError> {
    Timeline::build(scene_count, images, audio).map_err(|e| StageError::DependencyGap(e.to_string()))
}

/// The transcoder must leave a non-empty file behind.
async fn check_output(path: &Path) -> Result<(), ServiceError> {
    match tokio::fs::metadata(path).await {
        Ok(meta) if meta.len() > 0 => Ok(()),
        Ok(_) => Err(ServiceError::process_failed(format!(
            "transcoder produced an empty file at {}",
            sanitize::redact_path(path)
        ))),
        Err(e) => Err(ServiceError::process_failed(format!(
            "transcoder output {} is missing: {}",
            sanitize::redact_path(path),
            e
        ))),
    }
}

pub struct Assembler<'a> {
    pub transcoder: &'a dyn Transcoder,
    pub retrier: Retrier<'a>,
    pub output: OutputParams,
    pub motion: MotionStyle,
    pub work_dir: &'a Path,
}

impl Assembler<'_> {
    /// Transcodes the timeline into one video. Every attempt sends the same
    /// request.
    pub async fn assemble(
        &self,
        job_id: &str,
        timeline: &Timeline,
    ) -> Result<(TranscodeRequest, Asset), StageError> {
        let request = TranscodeRequest::from_timeline(job_id, timeline, self.output, self.motion);
        let work_dir = self.work_dir;

        let path: PathBuf = self
            .retrier
            .run("transcode", || async {
                let path = self.transcoder.transcode(&request, work_dir).await?;
                check_output(&path).await?;
                Ok(path)
            })
            .await?;

        info!(
            segments = request.segments.len(),
            duration_secs = timeline.total_secs(),
            output = %sanitize::redact_path(&path),
            "Video assembled"
        );
        let video = Asset::video(AssetLocation::Local(path), timeline.total_secs());
        Ok((request, video))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::FailureKind;
    use crate::pipeline::retry::{NoRetryObserver, RetryBudget, RetryPolicy};
    use crate::services::ServiceErrorKind;
    use crate::transcode::Container;
    use async_trait::async_trait;
    use std::sync::Mutex;
    use std::time::Duration;

    fn slots(n: usize, audio: bool) -> SceneSlots<Asset> {
        let mut slots = SceneSlots::new(n);
        for i in 0..n {
            let location = AssetLocation::Local(PathBuf::from(format!("/tmp/{}", i)));
            let asset = if audio {
                Asset::audio(i, location, 1.0 + i as f64)
            } else {
                Asset::image(i, location)
            };
            slots.insert(i, asset).unwrap();
        }
        slots
    }

    fn output() -> OutputParams {
        OutputParams {
            width: 640,
            height: 360,
            fps: 24,
            container: Container::Mp4,
        }
    }

    fn policy(max_retries: u32) -> RetryPolicy {
        RetryPolicy {
            max_retries,
            initial_backoff: Duration::from_millis(1),
            max_backoff: Duration::from_millis(2),
            jitter: false,
            call_timeout: Duration::from_secs(5),
        }
    }

    /// Fails `failures` times, then writes `content` as the output.
    struct FlakyTranscoder {
        failures: Mutex<u32>,
        content: &'static [u8],
        requests: Mutex<Vec<Vec<u8>>>,
    }

    #[async_trait]
    impl Transcoder for FlakyTranscoder {
        async fn transcode(
            &self,
            request: &TranscodeRequest,
            work_dir: &Path,
        ) -> Result<PathBuf, ServiceError> {
            self.requests
                .lock()
                .unwrap()
                .push(request.canonical_bytes().unwrap());
            {
                let mut failures = self.failures.lock().unwrap();
                if *failures > 0 {
                    *failures -= 1;
                    return Err(ServiceError::process_failed("exit status 1"));
                }
            }
            let path = work_dir.join(request.output_file_name());
            std::fs::write(&path, self.content).unwrap();
            Ok(path)
        }
    }

    #[test]
    fn test_gap_is_dependency_gap() {
        let mut audio = SceneSlots::new(2);
        audio
            .insert(0, Asset::audio(0, AssetLocation::Local(PathBuf::from("/a")), 1.0))
            .unwrap();
        let err = build_timeline(2, &slots(2, false), &audio).unwrap_err();
        assert_eq!(err.kind(), FailureKind::DependencyGap);
        assert!(!err.retryable_by_resubmission());
    }

    #[tokio::test]
    async fn test_retries_send_identical_requests() {
        let dir = tempfile::tempdir().unwrap();
        let transcoder = FlakyTranscoder {
            failures: Mutex::new(2),
            content: b"video",
            requests: Mutex::new(Vec::new()),
        };
        let policy = policy(2);
        let budget = RetryBudget::new(5);
        let assembler = Assembler {
            transcoder: &transcoder,
            retrier: Retrier::new(&policy, &budget, &NoRetryObserver),
            output: output(),
            motion: MotionStyle::Cycle,
            work_dir: dir.path(),
        };
        let timeline = build_timeline(3, &slots(3, false), &slots(3, true)).unwrap();

        let (request, video) = assembler.assemble("job-1", &timeline).await.unwrap();
        assert_eq!(request.segments.len(), 3);
        assert_eq!(video.duration_secs, Some(6.0));
        assert_eq!(
            video.location.local_path(),
            Some(dir.path().join("job-1.mp4").as_path())
        );

        let requests = transcoder.requests.lock().unwrap();
        assert_eq!(requests.len(), 3);
        assert!(requests.windows(2).all(|w| w[0] == w[1]));
    }

    #[tokio::test]
    async fn test_empty_output_is_retried_then_terminal() {
        let dir = tempfile::tempdir().unwrap();
        let transcoder = FlakyTranscoder {
            failures: Mutex::new(0),
            content: b"",
            requests: Mutex::new(Vec::new()),
        };
        let policy = policy(1);
        let budget = RetryBudget::new(5);
        let assembler = Assembler {
            transcoder: &transcoder,
            retrier: Retrier::new(&policy, &budget, &NoRetryObserver),
            output: output(),
            motion: MotionStyle::Static,
            work_dir: dir.path(),
        };
        let timeline = build_timeline(1, &slots(1, false), &slots(1, true)).unwrap();

        let err = assembler.assemble("job-2", &timeline).await.unwrap_err();
        assert!(matches!(err, StageError::Service(ref e) if e.kind == ServiceErrorKind::ProcessFailed));
        assert_eq!(transcoder.requests.lock().unwrap().len(), 2);
    }
}
