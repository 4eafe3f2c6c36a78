//! Per-scene image production with optional reuse by prompt similarity.

use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;

use futures_util::future::join_all;
use sha2::{Digest, Sha256};
use tokio::sync::Semaphore;
use tracing::{debug, info, warn};

use crate::config::ImageConfig;
use crate::model::{Asset, AssetLocation, SceneSlots};
use crate::pipeline::retry::Retrier;
use crate::pipeline::{PipelineWarning, StageError};
use crate::sanitize;
use crate::services::{ImageGenerator, ImageRequest, ServiceError, VectorSearch};

use super::first_scene_failure;

fn hex_encode(bytes: &[u8]) -> String {
    const HEX_CHARS: &[u8; 16] = b"0123456789abcdef";
    let mut result = String::with_capacity(bytes.len() * 2);
    for &byte in bytes {
        result.push(HEX_CHARS[(byte >> 4) as usize] as char);
        result.push(HEX_CHARS[(byte & 0x0f) as usize] as char);
    }
    result
}

/// Stable index id for a prompt.
pub fn prompt_id(prompt: &str) -> String {
    hex_encode(&Sha256::digest(prompt.trim().as_bytes()))
}

pub struct ImageProducer<'a> {
    pub generator: &'a dyn ImageGenerator,
    /// Index of previously generated images. Reuse is off when `None`.
    pub reuse_index: Option<&'a dyn VectorSearch>,
    pub config: &'a ImageConfig,
    pub style: &'a str,
    pub retrier: Retrier<'a>,
    pub lookup_timeout: Duration,
    pub limiter: &'a Semaphore,
    pub output_dir: &'a Path,
}

struct SceneResult {
    index: usize,
    image: Result<Asset, ServiceError>,
    warnings: Vec<PipelineWarning>,
}

impl ImageProducer<'_> {
    /// Produces one image per prompt. Scenes run concurrently within the
    /// limiter; every scene is awaited before the result is decided, and the
    /// lowest failing index is reported.
    pub async fn produce(
        &self,
        prompts: &[String],
    ) -> Result<(SceneSlots<Asset>, Vec<PipelineWarning>), StageError> {
        let results = join_all(
            prompts
                .iter()
                .enumerate()
                .map(|(index, prompt)| self.produce_scene(index, prompt)),
        )
        .await;

        let mut slots = SceneSlots::new(prompts.len());
        let mut warnings = Vec::new();
        let mut failures = Vec::new();
        for result in results {
            warnings.extend(result.warnings);
            match result.image {
                Ok(asset) => {
                    if let Err(e) = slots.insert(result.index, asset) {
                        return Err(StageError::DependencyGap(e.to_string()));
                    }
                }
                Err(e) => failures.push((result.index, e)),
            }
        }

        if let Some(err) = first_scene_failure(failures) {
            return Err(err);
        }
        info!(images = slots.len(), "Images produced");
        Ok((slots, warnings))
    }

    async fn produce_scene(&self, index: usize, prompt: &str) -> SceneResult {
        let mut warnings = Vec::new();
        let _permit = match self.limiter.acquire().await {
            Ok(permit) => permit,
            Err(_) => {
                return SceneResult {
                    index,
                    image: Err(ServiceError::unavailable("scene limiter closed")),
                    warnings,
                }
            }
        };

        match self.lookup(prompt).await {
            Ok(Some(location)) => {
                debug!(scene = index, "Reusing previously generated image");
                return SceneResult {
                    index,
                    image: Ok(Asset::image(index, location)),
                    warnings,
                };
            }
            Ok(None) => {}
            Err(e) => {
                warn!(scene = index, error = %e, "Image reuse lookup failed");
                warnings.push(PipelineWarning::ImageReuseFailed {
                    error: e.to_string(),
                });
            }
        }

        let request = ImageRequest {
            scene_index: index,
            prompt: prompt.to_string(),
            size: self.config.size.clone(),
            style: self.style.to_string(),
            output_dir: self.output_dir.to_path_buf(),
        };
        let label = format!("image[{}]", index);
        let image = match self
            .retrier
            .run(&label, || self.generator.generate(&request))
            .await
        {
            Ok(generated) => generated,
            Err(e) => {
                return SceneResult {
                    index,
                    image: Err(e),
                    warnings,
                }
            }
        };

        if let Err(e) = self.remember(prompt, &image.location).await {
            warn!(scene = index, error = %e, "Failed to index generated image");
            warnings.push(PipelineWarning::ImageReuseFailed {
                error: e.to_string(),
            });
        }

        SceneResult {
            index,
            image: Ok(Asset::image(index, image.location)),
            warnings,
        }
    }

    /// Looks for an earlier image whose prompt is similar enough.
    async fn lookup(&self, prompt: &str) -> Result<Option<AssetLocation>, ServiceError> {
        let (Some(index), Some(threshold)) = (self.reuse_index, self.config.reuse_threshold)
        else {
            return Ok(None);
        };

        let matches = tokio::time::timeout(
            self.lookup_timeout,
            index.query(&self.config.reuse_namespace, prompt, 1),
        )
        .await
        .map_err(|_| ServiceError::timeout(self.lookup_timeout))??;

        Ok(matches
            .into_iter()
            .next()
            .filter(|m| m.score >= threshold)
            .and_then(|m| m.metadata.get("image_url").cloned())
            .map(AssetLocation::Remote))
    }

    /// Indexes a newly generated remote image so later jobs can reuse it.
    async fn remember(&self, prompt: &str, location: &AssetLocation) -> Result<(), ServiceError> {
        let (Some(index), Some(_), Some(url)) = (
            self.reuse_index,
            self.config.reuse_threshold,
            location.remote_url(),
        ) else {
            return Ok(());
        };

        let metadata = HashMap::from([
            ("image_url".to_string(), url.to_string()),
            ("prompt".to_string(), sanitize::truncate(prompt, 500)),
        ]);
        tokio::time::timeout(
            self.lookup_timeout,
            index.upsert(
                &self.config.reuse_namespace,
                &prompt_id(prompt),
                prompt,
                metadata,
            ),
        )
        .await
        .map_err(|_| ServiceError::timeout(self.lookup_timeout))?
    }
}
