//! Audio-driven timeline computation.
//!
//! Each scene occupies `[start, end)` where `start` is the running sum of
//! the preceding scenes' audio durations. Images never influence timing.

use serde::Serialize;
use thiserror::Error;

use super::asset::{Asset, AssetLocation};
use super::slots::SceneSlots;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum TimelineError {
    #[error(
        "scene assets incomplete (expected {expected} scenes; missing images {missing_images:?}, missing audio {missing_audio:?})"
    )]
    Incomplete {
        expected: usize,
        missing_images: Vec<usize>,
        missing_audio: Vec<usize>,
    },

    #[error("audio for scene {index} has unusable duration {duration}")]
    InvalidDuration { index: usize, duration: f64 },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TimelineEntry {
    pub scene_index: usize,
    pub start_secs: f64,
    pub end_secs: f64,
    pub image: AssetLocation,
    pub audio: AssetLocation,
}

impl TimelineEntry {
    pub fn duration_secs(&self) -> f64 {
        self.end_secs - self.start_secs
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Timeline {
    entries: Vec<TimelineEntry>,
    total_secs: f64,
}

impl Timeline {
    /// Builds the timeline for `scene_count` scenes. Both arenas must hold
    /// exactly one asset for every index, and every audio asset a positive,
    /// finite duration.
    pub fn build(
        scene_count: usize,
        images: &SceneSlots<Asset>,
        audio: &SceneSlots<Asset>,
    ) -> Result<Self, TimelineError> {
        let missing_images = missing_for(scene_count, images);
        let missing_audio = missing_for(scene_count, audio);
        if scene_count == 0 || !missing_images.is_empty() || !missing_audio.is_empty() {
            return Err(TimelineError::Incomplete {
                expected: scene_count,
                missing_images,
                missing_audio,
            });
        }

        let mut entries = Vec::with_capacity(scene_count);
        let mut cursor = 0.0_f64;
        for index in 0..scene_count {
            let (Some(image), Some(clip)) = (images.get(index), audio.get(index)) else {
                return Err(TimelineError::Incomplete {
                    expected: scene_count,
                    missing_images: images.missing(),
                    missing_audio: audio.missing(),
                });
            };
            let duration = clip.duration_secs.unwrap_or(0.0);
            if !duration.is_finite() || duration <= 0.0 {
                return Err(TimelineError::InvalidDuration { index, duration });
            }

            let start = cursor;
            let end = start + duration;
            entries.push(TimelineEntry {
                scene_index: index,
                start_secs: start,
                end_secs: end,
                image: image.location.clone(),
                audio: clip.location.clone(),
            });
            cursor = end;
        }

        Ok(Self {
            entries,
            total_secs: cursor,
        })
    }

    pub fn entries(&self) -> &[TimelineEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn total_secs(&self) -> f64 {
        self.total_secs
    }
}

/// Missing indices in `0..scene_count`, counting a length mismatch as a gap.
fn missing_for(scene_count: usize, slots: &SceneSlots<Asset>) -> Vec<usize> {
    (0..scene_count.max(slots.len()))
        .filter(|&index| index >= scene_count || slots.get(index).is_none())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn arenas(durations: &[f64]) -> (SceneSlots<Asset>, SceneSlots<Asset>) {
        let mut images = SceneSlots::new(durations.len());
        let mut audio = SceneSlots::new(durations.len());
        for (i, d) in durations.iter().enumerate() {
            images
                .insert(
                    i,
                    Asset::image(i, AssetLocation::Local(PathBuf::from(format!("/img/{}.png", i)))),
                )
                .unwrap();
            audio
                .insert(
                    i,
                    Asset::audio(
                        i,
                        AssetLocation::Local(PathBuf::from(format!("/aud/{}.mp3", i))),
                        *d,
                    ),
                )
                .unwrap();
        }
        (images, audio)
    }

    #[test]
    fn test_entries_are_contiguous_from_zero() {
        let durations = [3.2, 4.75, 1.05, 6.0, 2.5];
        let (images, audio) = arenas(&durations);
        let timeline = Timeline::build(durations.len(), &images, &audio).unwrap();

        assert_eq!(timeline.len(), durations.len());
        assert_eq!(timeline.entries()[0].start_secs, 0.0);
        for pair in timeline.entries().windows(2) {
            assert_eq!(pair[0].end_secs, pair[1].start_secs);
            assert!(pair[0].start_secs < pair[1].start_secs);
        }
        for (i, entry) in timeline.entries().iter().enumerate() {
            assert_eq!(entry.scene_index, i);
        }
    }

    #[test]
    fn test_total_equals_sum_of_durations() {
        let durations = [0.1, 0.2, 0.3, 7.123456789, 11.0];
        let (images, audio) = arenas(&durations);
        let timeline = Timeline::build(durations.len(), &images, &audio).unwrap();

        let sum: f64 = durations.iter().sum();
        assert!((timeline.total_secs() - sum).abs() < 1e-9);
        assert_eq!(
            timeline.total_secs(),
            timeline.entries().last().unwrap().end_secs
        );
    }

    #[test]
    fn test_single_scene_spans_whole_video() {
        let (images, audio) = arenas(&[9.5]);
        let timeline = Timeline::build(1, &images, &audio).unwrap();
        let entry = &timeline.entries()[0];
        assert_eq!(entry.start_secs, 0.0);
        assert_eq!(entry.end_secs, 9.5);
        assert_eq!(timeline.total_secs(), 9.5);
    }

    #[test]
    fn test_missing_audio_is_incomplete() {
        let (images, _) = arenas(&[1.0, 2.0, 3.0]);
        let mut audio = SceneSlots::new(3);
        audio
            .insert(0, Asset::audio(0, AssetLocation::Remote("a".into()), 1.0))
            .unwrap();

        let err = Timeline::build(3, &images, &audio).unwrap_err();
        assert_eq!(
            err,
            TimelineError::Incomplete {
                expected: 3,
                missing_images: vec![],
                missing_audio: vec![1, 2],
            }
        );
    }

    #[test]
    fn test_length_mismatch_is_incomplete() {
        let (images, audio) = arenas(&[1.0, 2.0]);
        let err = Timeline::build(3, &images, &audio).unwrap_err();
        assert!(matches!(err, TimelineError::Incomplete { .. }));
    }

    #[test]
    fn test_zero_duration_rejected() {
        let (images, audio) = arenas(&[1.0, 0.0]);
        let err = Timeline::build(2, &images, &audio).unwrap_err();
        assert_eq!(
            err,
            TimelineError::InvalidDuration {
                index: 1,
                duration: 0.0
            }
        );
    }

    #[test]
    fn test_images_follow_audio_timing() {
        let (images, audio) = arenas(&[2.0, 5.0]);
        let timeline = Timeline::build(2, &images, &audio).unwrap();
        let second = &timeline.entries()[1];
        assert_eq!(second.duration_secs(), 5.0);
        assert_eq!(
            second.image,
            AssetLocation::Local(PathBuf::from("/img/1.png"))
        );
    }
}
