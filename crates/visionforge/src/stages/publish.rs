//! Publishing: the final video is mandatory, per-scene assets are
//! best-effort.

use std::path::Path;
use std::time::Duration;

use futures_util::future::join_all;
use tracing::{info, warn};

use crate::model::{
    Asset, AssetKind, AssetLocation, AssetManifest, PublishedAsset, SceneManifest, Timeline,
};
use crate::pipeline::retry::Retrier;
use crate::pipeline::{PipelineWarning, StageError};
use crate::sanitize;
use crate::services::{ObjectStorage, ServiceError};
use crate::transcode::Container;

/// Object key for an asset: `<job>/<kind>/scene-NNN.<ext>` for scene assets,
/// `<job>/videos/<job>.<ext>` for the final video.
pub fn object_key(job_id: &str, kind: AssetKind, scene_index: Option<usize>, ext: &str) -> String {
    match scene_index {
        Some(index) => format!(
            "{}/{}/scene-{:03}.{}",
            job_id,
            kind.key_segment(),
            index,
            ext
        ),
        None => format!("{}/{}/{}.{}", job_id, kind.key_segment(), job_id, ext),
    }
}

/// Turns a best-effort upload result into an optional URL, recording the
/// failure as a warning.
fn settle(
    result: Result<String, (String, ServiceError)>,
    warnings: &mut Vec<PipelineWarning>,
) -> Option<String> {
    match result {
        Ok(url) => Some(url),
        Err((key, e)) => {
            warn!(key = %key, error = %e, "Intermediate upload failed");
            warnings.push(PipelineWarning::IntermediateUploadFailed {
                key,
                error: e.to_string(),
            });
            None
        }
    }
}

fn content_type_for(path: &Path) -> String {
    mime_guess::from_path(path)
        .first_or_octet_stream()
        .essence_str()
        .to_string()
}

pub struct Publisher<'a> {
    pub storage: &'a dyn ObjectStorage,
    /// Policy for the final video upload.
    pub retrier: Retrier<'a>,
    /// Per-attempt limit for intermediate uploads.
    pub upload_timeout: Duration,
}

impl Publisher<'_> {
    pub async fn publish(
        &self,
        job_id: &str,
        title: Option<&str>,
        timeline: &Timeline,
        video: &Asset,
        container: Container,
    ) -> Result<(AssetManifest, Vec<PipelineWarning>), StageError> {
        let final_video = self.publish_video(job_id, video, container).await?;

        let mut warnings = Vec::new();
        let mut scenes = Vec::with_capacity(timeline.len());
        let uploads = join_all(timeline.entries().iter().map(|entry| async move {
            let image = self
                .publish_intermediate(job_id, AssetKind::Image, entry.scene_index, &entry.image)
                .await;
            let audio = self
                .publish_intermediate(job_id, AssetKind::Audio, entry.scene_index, &entry.audio)
                .await;
            (entry, image, audio)
        }))
        .await;

        for (entry, image, audio) in uploads {
            scenes.push(SceneManifest {
                index: entry.scene_index,
                start_secs: entry.start_secs,
                end_secs: entry.end_secs,
                image_url: settle(image, &mut warnings),
                audio_url: settle(audio, &mut warnings),
            });
        }

        info!(
            url = %sanitize::redact_url(&final_video.url),
            scenes = scenes.len(),
            failed_intermediates = warnings.len(),
            "Published"
        );

        let manifest = AssetManifest {
            title: title.map(str::to_string),
            final_video,
            total_duration_secs: timeline.total_secs(),
            scenes,
            warnings: Vec::new(),
        };
        Ok((manifest, warnings))
    }

    async fn publish_video(
        &self,
        job_id: &str,
        video: &Asset,
        container: Container,
    ) -> Result<PublishedAsset, StageError> {
        let key = object_key(job_id, AssetKind::Video, None, container.extension());
        let content_type = container.mime_type();

        let url = match &video.location {
            AssetLocation::Remote(url) => url.clone(),
            AssetLocation::Local(path) => self
                .retrier
                .run("upload_video", || self.storage.upload(path, &key, content_type))
                .await
                .map_err(|e| StageError::Publish(e.to_string()))?,
        };

        Ok(PublishedAsset {
            key,
            url,
            content_type: content_type.to_string(),
        })
    }

    /// Uploads one scene asset once. Remote assets are already addressable
    /// and are not copied. Errors carry the object key.
    async fn publish_intermediate(
        &self,
        job_id: &str,
        kind: AssetKind,
        scene_index: usize,
        location: &AssetLocation,
    ) -> Result<String, (String, ServiceError)> {
        let path = match location {
            AssetLocation::Remote(url) => return Ok(url.clone()),
            AssetLocation::Local(path) => path,
        };

        let ext = location
            .extension()
            .unwrap_or_else(|| kind.default_extension().to_string());
        let key = object_key(job_id, kind, Some(scene_index), &ext);
        let content_type = content_type_for(path);

        match tokio::time::timeout(
            self.upload_timeout,
            self.storage.upload(path, &key, &content_type),
        )
        .await
        {
            Ok(Ok(url)) => Ok(url),
            Ok(Err(e)) => Err((key, e)),
            Err(_) => Err((key, ServiceError::timeout(self.upload_timeout))),
        }
    }
}
