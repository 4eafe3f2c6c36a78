use serde::{Deserialize, Serialize};

use super::MotionStyle;

const ZOOM_INTENSITY: f64 = 0.5;
const PAN_ZOOM: f64 = 1.2;

/// Camera motion applied to one still image.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MotionEffect {
    Static,
    ZoomIn,
    ZoomOut,
    PanLeft,
    PanRight,
    PanUp,
    PanDown,
}

const CYCLE: [MotionEffect; 6] = [
    MotionEffect::ZoomIn,
    MotionEffect::PanRight,
    MotionEffect::ZoomOut,
    MotionEffect::PanDown,
    MotionEffect::PanLeft,
    MotionEffect::PanUp,
];

impl MotionEffect {
    /// Picks the effect for a scene. Deterministic so that retries hand the
    /// transcoder identical input.
    pub fn for_scene(style: MotionStyle, scene_index: usize) -> Self {
        match style {
            MotionStyle::Static => MotionEffect::Static,
            MotionStyle::Cycle => CYCLE[scene_index % CYCLE.len()],
        }
    }

    /// Video filter rendering this effect over `frames` frames, or `None`
    /// when the image is only scaled to the output size.
    pub fn filter(&self, frames: u64, fps: u32, width: u32, height: u32) -> Option<String> {
        let frames = frames.max(1);
        let center_x = "iw/2-(iw/zoom/2)";
        let center_y = "ih/2-(ih/zoom/2)";
        let (z, x, y) = match self {
            MotionEffect::Static => return None,
            MotionEffect::ZoomIn => (
                format!("1+({}*sin(PI/2*on/{}))", ZOOM_INTENSITY, frames),
                center_x.to_string(),
                center_y.to_string(),
            ),
            MotionEffect::ZoomOut => (
                format!("1+{}-({}*sin(PI/2*on/{}))", ZOOM_INTENSITY, ZOOM_INTENSITY, frames),
                center_x.to_string(),
                center_y.to_string(),
            ),
            MotionEffect::PanRight => (
                PAN_ZOOM.to_string(),
                format!("max(0,min(iw-(iw/zoom),iw*(on/{})))", frames),
                center_y.to_string(),
            ),
            MotionEffect::PanLeft => (
                PAN_ZOOM.to_string(),
                format!("max(0,min(iw-(iw/zoom),iw*(1-on/{})))", frames),
                center_y.to_string(),
            ),
            MotionEffect::PanDown => (
                PAN_ZOOM.to_string(),
                center_x.to_string(),
                format!("max(0,min(ih-(ih/zoom),ih*(on/{})))", frames),
            ),
            MotionEffect::PanUp => (
                PAN_ZOOM.to_string(),
                center_x.to_string(),
                format!("max(0,min(ih-(ih/zoom),ih*(1-on/{})))", frames),
            ),
        };

        Some(format!(
            "zoompan=z='{}':x='{}':y='{}':d={}:s={}x{}:fps={}",
            z, x, y, frames, width, height, fps
        ))
    }
}
