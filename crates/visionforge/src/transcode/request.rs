use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use super::{Container, MotionEffect, MotionStyle};
use crate::model::{AssetLocation, Timeline};

/// Global encoding parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OutputParams {
    pub width: u32,
    pub height: u32,
    pub fps: u32,
    pub container: Container,
}

/// One image held for the length of its narration clip.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TranscodeSegment {
    pub scene_index: usize,
    pub image: AssetLocation,
    pub audio: AssetLocation,
    pub duration_secs: f64,
    pub motion: MotionEffect,
}

impl TranscodeSegment {
    /// Frame count covering the segment, rounded up so the visual never
    /// ends before the audio.
    pub fn frames(&self, fps: u32) -> u64 {
        (self.duration_secs * f64::from(fps)).ceil().max(1.0) as u64
    }
}

/// Ordered segments plus output parameters: the whole transcoder input.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TranscodeRequest {
    pub job_id: String,
    pub segments: Vec<TranscodeSegment>,
    pub output: OutputParams,
}

impl TranscodeRequest {
    pub fn from_timeline(
        job_id: &str,
        timeline: &Timeline,
        output: OutputParams,
        motion: MotionStyle,
    ) -> Self {
        let segments = timeline
            .entries()
            .iter()
            .map(|entry| TranscodeSegment {
                scene_index: entry.scene_index,
                image: entry.image.clone(),
                audio: entry.audio.clone(),
                duration_secs: entry.duration_secs(),
                motion: MotionEffect::for_scene(motion, entry.scene_index),
            })
            .collect();

        Self {
            job_id: job_id.to_string(),
            segments,
            output,
        }
    }

    /// Stable serialized form. Equal requests always produce equal bytes.
    pub fn canonical_bytes(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec(self)
    }

    pub fn total_secs(&self) -> f64 {
        self.segments.iter().map(|s| s.duration_secs).sum()
    }

    /// File name of the assembled video.
    pub fn output_file_name(&self) -> PathBuf {
        PathBuf::from(format!("{}.{}", self.job_id, self.output.container.extension()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Asset, SceneSlots};

    fn timeline(durations: &[f64]) -> Timeline {
        let mut images = SceneSlots::new(durations.len());
        let mut audio = SceneSlots::new(durations.len());
        for (i, d) in durations.iter().enumerate() {
            images
                .insert(i, Asset::image(i, AssetLocation::Remote(format!("https://img/{}.png", i))))
                .unwrap();
            audio
                .insert(
                    i,
                    Asset::audio(i, AssetLocation::Local(PathBuf::from(format!("/a/{}.mp3", i))), *d),
                )
                .unwrap();
        }
        Timeline::build(durations.len(), &images, &audio).unwrap()
    }

    fn params() -> OutputParams {
        OutputParams {
            width: 1920,
            height: 1080,
            fps: 30,
            container: Container::Mp4,
        }
    }

    #[test]
    fn test_rebuilding_gives_identical_bytes() {
        let t = timeline(&[2.5, 3.75, 1.0]);
        let first = TranscodeRequest::from_timeline("job-1", &t, params(), MotionStyle::Cycle);
        let second = TranscodeRequest::from_timeline("job-1", &t, params(), MotionStyle::Cycle);
        assert_eq!(
            first.canonical_bytes().unwrap(),
            second.canonical_bytes().unwrap()
        );
    }

    #[test]
    fn test_segments_follow_timeline_order() {
        let t = timeline(&[1.0, 2.0, 3.0]);
        let request = TranscodeRequest::from_timeline("job-1", &t, params(), MotionStyle::Static);
        let indices: Vec<_> = request.segments.iter().map(|s| s.scene_index).collect();
        assert_eq!(indices, vec![0, 1, 2]);
        assert_eq!(request.segments[2].duration_secs, 3.0);
        assert!((request.total_secs() - t.total_secs()).abs() < 1e-9);
    }

    #[test]
    fn test_frames_round_up() {
        let segment = TranscodeSegment {
            scene_index: 0,
            image: AssetLocation::Remote("i".into()),
            audio: AssetLocation::Remote("a".into()),
            duration_secs: 2.01,
            motion: MotionEffect::Static,
        };
        assert_eq!(segment.frames(30), 61);
    }

    #[test]
    fn test_output_file_name_uses_container() {
        let t = timeline(&[1.0]);
        let mut output = params();
        output.container = Container::Webm;
        let request = TranscodeRequest::from_timeline("abc", &t, output, MotionStyle::Static);
        assert_eq!(request.output_file_name(), PathBuf::from("abc.webm"));
    }
}
