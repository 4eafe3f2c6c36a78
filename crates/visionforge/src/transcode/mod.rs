//! Transcoder input model and the bundled FFmpeg adapter.

mod ffmpeg;
mod motion;
mod request;

use serde::{Deserialize, Serialize};

pub use ffmpeg::FfmpegTranscoder;
pub use motion::MotionEffect;
pub use request::{OutputParams, TranscodeRequest, TranscodeSegment};

/// Output container format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Container {
    #[default]
    Mp4,
    Webm,
    Mkv,
}

impl Container {
    pub fn extension(&self) -> &'static str {
        match self {
            Container::Mp4 => "mp4",
            Container::Webm => "webm",
            Container::Mkv => "mkv",
        }
    }

    pub fn mime_type(&self) -> &'static str {
        match self {
            Container::Mp4 => "video/mp4",
            Container::Webm => "video/webm",
            Container::Mkv => "video/x-matroska",
        }
    }
}

impl std::fmt::Display for Container {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.extension())
    }
}

/// How still images are animated over their segment.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MotionStyle {
    /// Every image is held still.
    #[default]
    Static,
    /// Scenes rotate through zoom and pan effects by index.
    Cycle,
}
