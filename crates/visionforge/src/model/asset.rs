use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AssetKind {
    Image,
    Audio,
    Video,
}

impl AssetKind {
    /// Directory segment used in object keys.
    pub fn key_segment(&self) -> &'static str {
        match self {
            AssetKind::Image => "images",
            AssetKind::Audio => "audio",
            AssetKind::Video => "videos",
        }
    }

    pub fn default_extension(&self) -> &'static str {
        match self {
            AssetKind::Image => "png",
            AssetKind::Audio => "mp3",
            AssetKind::Video => "mp4",
        }
    }
}

/// Where an asset's bytes live.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum AssetLocation {
    Local(PathBuf),
    Remote(String),
}

impl AssetLocation {
    pub fn local_path(&self) -> Option<&Path> {
        match self {
            AssetLocation::Local(path) => Some(path),
            AssetLocation::Remote(_) => None,
        }
    }

    pub fn remote_url(&self) -> Option<&str> {
        match self {
            AssetLocation::Local(_) => None,
            AssetLocation::Remote(url) => Some(url),
        }
    }

    /// String form accepted as an ffmpeg input (path or URL).
    pub fn as_input(&self) -> String {
        match self {
            AssetLocation::Local(path) => path.display().to_string(),
            AssetLocation::Remote(url) => url.clone(),
        }
    }

    /// File extension of the underlying path or URL, if any.
    pub fn extension(&self) -> Option<String> {
        match self {
            AssetLocation::Local(path) => {
                path.extension().map(|e| e.to_string_lossy().to_lowercase())
            }
            AssetLocation::Remote(url) => {
                let path = url.split(['?', '#']).next().unwrap_or(url);
                let last = path.rsplit('/').next()?;
                let (_, ext) = last.rsplit_once('.')?;
                (!ext.is_empty()).then(|| ext.to_lowercase())
            }
        }
    }
}

/// A produced artifact. Audio carries its measured duration, the final
/// video carries the whole timeline duration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Asset {
    pub kind: AssetKind,
    /// `None` for the assembled video.
    pub scene_index: Option<usize>,
    pub location: AssetLocation,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration_secs: Option<f64>,
}

impl Asset {
    pub fn image(scene_index: usize, location: AssetLocation) -> Self {
        Self {
            kind: AssetKind::Image,
            scene_index: Some(scene_index),
            location,
            duration_secs: None,
        }
    }

    pub fn audio(scene_index: usize, location: AssetLocation, duration_secs: f64) -> Self {
        Self {
            kind: AssetKind::Audio,
            scene_index: Some(scene_index),
            location,
            duration_secs: Some(duration_secs),
        }
    }

    pub fn video(location: AssetLocation, duration_secs: f64) -> Self {
        Self {
            kind: AssetKind::Video,
            scene_index: None,
            location,
            duration_secs: Some(duration_secs),
        }
    }
}
