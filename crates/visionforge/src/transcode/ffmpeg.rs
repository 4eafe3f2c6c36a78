use std::fmt::Write as _;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::process::Command;
use tracing::{debug, info};

use super::{Container, TranscodeRequest, TranscodeSegment};
use crate::services::{ServiceError, Transcoder};

/// Lines of ffmpeg stderr kept in error messages.
const STDERR_TAIL_LINES: usize = 8;

/// [`Transcoder`] backed by the ffmpeg executable: one encode per segment,
/// then a stream-copy concat of the segments in order.
#[derive(Debug, Clone)]
pub struct FfmpegTranscoder {
    program: String,
}

impl FfmpegTranscoder {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
        }
    }

    pub fn segment_args(
        &self,
        request: &TranscodeRequest,
        segment: &TranscodeSegment,
        output: &Path,
    ) -> Vec<String> {
        let params = &request.output;
        let frames = segment.frames(params.fps);
        let filter = segment
            .motion
            .filter(frames, params.fps, params.width, params.height)
            .unwrap_or_else(|| fit_filter(params.width, params.height));

        let mut args: Vec<String> = vec![
            "-y".into(),
            "-loop".into(),
            "1".into(),
            "-i".into(),
            segment.image.as_input(),
            "-i".into(),
            segment.audio.as_input(),
            "-vf".into(),
            filter,
            "-t".into(),
            format!("{:.3}", segment.duration_secs),
            "-r".into(),
            params.fps.to_string(),
        ];
        args.extend(codec_args(params.container));
        args.push("-shortest".into());
        args.push(output.display().to_string());
        args
    }

    pub fn concat_args(&self, list_file: &Path, output: &Path) -> Vec<String> {
        vec![
            "-y".into(),
            "-f".into(),
            "concat".into(),
            "-safe".into(),
            "0".into(),
            "-i".into(),
            list_file.display().to_string(),
            "-c".into(),
            "copy".into(),
            output.display().to_string(),
        ]
    }

    async fn run(&self, args: &[String]) -> Result<(), ServiceError> {
        debug!(program = %self.program, args = ?args, "Running ffmpeg");
        let output = Command::new(&self.program)
            .args(args)
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| {
                ServiceError::process_failed(format!("failed to start {}: {}", self.program, e))
            })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            let tail: Vec<&str> = stderr.lines().rev().take(STDERR_TAIL_LINES).collect();
            let tail: Vec<&str> = tail.into_iter().rev().collect();
            return Err(ServiceError::process_failed(format!(
                "ffmpeg exited with {}: {}",
                output.status,
                tail.join(" | ")
            )));
        }
        Ok(())
    }
}

#[async_trait]
impl Transcoder for FfmpegTranscoder {
    async fn transcode(
        &self,
        request: &TranscodeRequest,
        work_dir: &Path,
    ) -> Result<PathBuf, ServiceError> {
        if request.segments.is_empty() {
            return Err(ServiceError::rejected("no segments to transcode"));
        }

        let segment_dir = work_dir.join("segments");
        tokio::fs::create_dir_all(&segment_dir).await.map_err(|e| {
            ServiceError::process_failed(format!(
                "failed to create {}: {}",
                segment_dir.display(),
                e
            ))
        })?;

        let extension = request.output.container.extension();
        let mut list = String::new();
        for segment in &request.segments {
            let path = segment_dir.join(format!(
                "segment-{:03}.{}",
                segment.scene_index, extension
            ));
            self.run(&self.segment_args(request, segment, &path)).await?;
            let _ = writeln!(list, "file '{}'", path.display());
        }

        let list_file = segment_dir.join("segments.txt");
        tokio::fs::write(&list_file, list).await.map_err(|e| {
            ServiceError::process_failed(format!(
                "failed to write {}: {}",
                list_file.display(),
                e
            ))
        })?;

        let output = work_dir.join(request.output_file_name());
        self.run(&self.concat_args(&list_file, &output)).await?;

        info!(
            segments = request.segments.len(),
            output = %output.display(),
            "Concatenated video segments"
        );
        Ok(output)
    }
}

/// Scales the image into the frame and letterboxes the remainder.
fn fit_filter(width: u32, height: u32) -> String {
    format!(
        "scale={w}:{h}:force_original_aspect_ratio=decrease,pad={w}:{h}:(ow-iw)/2:(oh-ih)/2,setsar=1",
        w = width,
        h = height
    )
}

fn codec_args(container: Container) -> Vec<String> {
    let args: &[&str] = match container {
        Container::Mp4 | Container::Mkv => &[
            "-c:v", "libx264", "-preset", "medium", "-crf", "23", "-pix_fmt", "yuv420p", "-c:a",
            "aac", "-b:a", "192k",
        ],
        Container::Webm => &[
            "-c:v",
            "libvpx-vp9",
            "-b:v",
            "0",
            "-crf",
            "32",
            "-pix_fmt",
            "yuv420p",
            "-c:a",
            "libopus",
            "-b:a",
            "128k",
        ],
    };
    args.iter().map(|s| s.to_string()).collect()
}
