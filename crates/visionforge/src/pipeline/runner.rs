use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::sync::Semaphore;
use tracing::{debug, info, info_span, warn, Instrument, Span};

use crate::broadcast::JobHandle;
use crate::model::{Asset, AssetManifest, JobOutcome, SceneSlots, Script, Stage, StageStatus};
use crate::sanitize;
use crate::services::{Collaborators, ServiceError};
use crate::stages::assemble::{build_timeline, Assembler};
use crate::stages::ensure_dir;
use crate::stages::images::ImageProducer;
use crate::stages::narration::NarrationSynthesizer;
use crate::stages::prompts::PromptDeriver;
use crate::stages::publish::Publisher;
use crate::stages::retrieval::Retrieval;
use crate::stages::script::ScriptWriter;
use crate::transcode::OutputParams;

use super::config::PipelineConfig;
use super::context::PipelineContext;
use super::error::{PipelineWarning, StageError};
use super::progress::{ProgressEvent, ProgressReporter};
use super::retry::{Retrier, RetryBudget, RetryObserver};

/// Why a run stopped before publishing.
#[derive(Debug)]
enum Halt {
    Failed(Stage, StageError),
    /// Cancellation observed before `Stage` was started.
    Cancelled(Option<Stage>),
}

fn stage_span(stage: Stage) -> Span {
    info_span!("stage", stage = stage.as_str())
}

/// Everything a stage needs to record its progress on the job.
struct RunEnv<'a> {
    job: &'a JobHandle,
    cancel: &'a AtomicBool,
    progress: &'a dyn ProgressReporter,
    budget: &'a RetryBudget,
    limiter: &'a Semaphore,
}

impl<'a> RunEnv<'a> {
    /// Starts `stage` unless the job was cancelled.
    fn enter(&self, stage: Stage, message: &str) -> Result<(), Halt> {
        if self.cancel.load(Ordering::Acquire) {
            info!(stage = stage.as_str(), "Cancellation observed, not starting stage");
            return Err(Halt::Cancelled(Some(stage)));
        }
        self.job
            .begin_stage(stage)
            .map_err(|e| Halt::Failed(stage, e.into()))?;
        debug!(stage = stage.as_str(), "Stage started");
        self.progress.report(ProgressEvent::Stage {
            stage,
            status: StageStatus::Running,
            message: message.to_string(),
        });
        Ok(())
    }

    /// Records a stage result on the job.
    fn settle<T>(&self, stage: Stage, result: Result<T, StageError>, message: &str) -> Result<T, Halt> {
        match result {
            Ok(value) => {
                self.job
                    .complete_stage(stage)
                    .map_err(|e| Halt::Failed(stage, e.into()))?;
                self.progress.report(ProgressEvent::Stage {
                    stage,
                    status: StageStatus::Succeeded,
                    message: message.to_string(),
                });
                Ok(value)
            }
            Err(err) => Err(self.fail(stage, err)),
        }
    }

    fn fail(&self, stage: Stage, err: StageError) -> Halt {
        warn!(stage = stage.as_str(), error = %err, "Stage failed");
        if let Err(e) = self.job.fail_stage(stage, &err.to_string()) {
            warn!(stage = stage.as_str(), error = %e, "Could not record stage failure");
        }
        Halt::Failed(stage, err)
    }

    fn observer(&self, stage: Stage) -> StageObserver<'a> {
        StageObserver {
            stage,
            job: self.job,
            progress: self.progress,
        }
    }
}

/// Mirrors collaborator retries into the stage state machine.
struct StageObserver<'a> {
    stage: Stage,
    job: &'a JobHandle,
    progress: &'a dyn ProgressReporter,
}

impl RetryObserver for StageObserver<'_> {
    fn retry_scheduled(&self, label: &str, attempt: u32, error: &ServiceError) {
        let message = format!("{} attempt {} failed: {}", label, attempt, error);
        if let Err(e) = self.job.record_retry(self.stage, &message) {
            warn!(stage = self.stage.as_str(), error = %e, "Could not record retry");
        }
        self.progress.report(ProgressEvent::Stage {
            stage: self.stage,
            status: StageStatus::FailedRetryable,
            message,
        });
    }

    fn retry_started(&self, label: &str, attempt: u32) {
        if let Err(e) = self.job.resume_stage(self.stage) {
            warn!(stage = self.stage.as_str(), error = %e, "Could not resume stage");
        }
        self.progress.report(ProgressEvent::Stage {
            stage: self.stage,
            status: StageStatus::Running,
            message: format!("Retrying {} (attempt {})", label, attempt),
        });
    }
}

struct Visuals {
    prompts: Vec<String>,
    images: SceneSlots<Asset>,
    warnings: Vec<PipelineWarning>,
}

pub struct Pipeline {
    config: Arc<PipelineConfig>,
    services: Collaborators,
}

impl Pipeline {
    pub fn new(config: Arc<PipelineConfig>, services: Collaborators) -> Self {
        Self { config, services }
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Runs every stage for one job and records the outcome through `job`.
    /// Returns the outcome together with the context holding intermediate
    /// results.
    pub async fn run(
        &self,
        mut ctx: PipelineContext,
        job: &JobHandle,
        cancel: &AtomicBool,
        progress: &dyn ProgressReporter,
    ) -> (JobOutcome, PipelineContext) {
        let span = info_span!("pipeline",
            job_id = %ctx.job_id,
            topic = %sanitize::short(&ctx.request.topic),
        );

        let outcome = async {
            job.mark_running();
            match self.run_stages(&mut ctx, job, cancel, progress).await {
                Ok(manifest) => {
                    info!(
                        duration_secs = manifest.total_duration_secs,
                        warnings = manifest.warnings.len(),
                        "Job succeeded"
                    );
                    progress.report(ProgressEvent::Completed {
                        video_url: manifest.final_video.url.clone(),
                    });
                    JobOutcome::Succeeded(manifest)
                }
                Err(Halt::Failed(stage, err)) => {
                    let failure = err.to_failure(stage);
                    warn!(stage = stage.as_str(), error = %failure.message, "Job failed");
                    progress.report(ProgressEvent::Failed {
                        stage,
                        error: failure.message.clone(),
                    });
                    JobOutcome::Failed(failure)
                }
                Err(Halt::Cancelled(at_stage)) => {
                    info!(at_stage = ?at_stage, "Job cancelled");
                    progress.report(ProgressEvent::Cancelled { at_stage });
                    JobOutcome::Cancelled { at_stage }
                }
            }
        }
        .instrument(span)
        .await;

        job.finish(outcome.clone());
        (outcome, ctx)
    }

    async fn run_stages(
        &self,
        ctx: &mut PipelineContext,
        job: &JobHandle,
        cancel: &AtomicBool,
        progress: &dyn ProgressReporter,
    ) -> Result<AssetManifest, Halt> {
        let config = &*self.config;
        let budget = Arc::clone(&ctx.retry_budget);
        let limiter = Arc::clone(&ctx.scene_limiter);
        let env = RunEnv {
            job,
            cancel,
            progress,
            budget: &budget,
            limiter: &limiter,
        };
        let request = ctx.request.clone();
        let options = &request.config;

        // Step 1: Retrieval (best-effort, never fails)
        env.enter(Stage::Retrieval, "Gathering context...")?;
        {
            let observer = env.observer(Stage::Retrieval);
            let retrieval = Retrieval {
                vector: self.services.vector.as_deref(),
                web: self.services.web.as_deref(),
                config: &config.retrieval,
                retrier: Retrier::new(&config.retries.search, env.budget, &observer),
            };
            let (snippets, warnings) = retrieval
                .retrieve(&request.topic, options.rag_enabled)
                .instrument(stage_span(Stage::Retrieval))
                .await;
            ctx.snippets = snippets;
            ctx.warnings.extend(warnings);
        }
        env.settle(Stage::Retrieval, Ok(()), "Context ready")?;

        // Step 2: Script
        env.enter(Stage::ScriptGeneration, "Writing script...")?;
        let result = {
            let observer = env.observer(Stage::ScriptGeneration);
            let writer = ScriptWriter {
                text: &*self.services.text,
                retrier: Retrier::new(&config.retries.text, env.budget, &observer),
                default_voice: &config.default_voice,
            };
            writer
                .write(
                    &request.topic,
                    &options.language,
                    options.style.as_deref(),
                    &options.voices,
                    &ctx.snippets,
                )
                .instrument(stage_span(Stage::ScriptGeneration))
                .await
        };
        let script = env.settle(Stage::ScriptGeneration, result, "Script ready")?;
        ctx.script = Some(script.clone());
        ctx.images = SceneSlots::new(script.len());
        ctx.audio = SceneSlots::new(script.len());

        // Step 3+4 alongside step 5: both producers always run to a
        // determinate state before the job moves on.
        let style = options
            .style
            .clone()
            .unwrap_or_else(|| config.images.style.clone());
        let images_dir = ctx.work_dir.join("images");
        let audio_dir = ctx.work_dir.join("audio");
        let (visuals, narration) = tokio::join!(
            self.visual_branch(&env, &script, &style, &images_dir),
            self.narration_branch(&env, &script, &audio_dir),
        );

        let (visuals, audio) = match (visuals, narration) {
            (Err(halt @ Halt::Failed(..)), _) | (_, Err(halt @ Halt::Failed(..))) => {
                return Err(halt)
            }
            (Err(halt), _) | (_, Err(halt)) => return Err(halt),
            (Ok(visuals), Ok(audio)) => (visuals, audio),
        };
        ctx.prompts = visuals.prompts;
        ctx.images = visuals.images;
        ctx.audio = audio;
        ctx.warnings.extend(visuals.warnings);

        // Step 6: Timeline + transcode
        env.enter(Stage::TimelineAssembly, "Assembling video...")?;
        let timeline = build_timeline(script.len(), &ctx.images, &ctx.audio)
            .map_err(|e| env.fail(Stage::TimelineAssembly, e))?;
        ctx.timeline = Some(timeline.clone());

        let container = options.output_format.unwrap_or(config.video.container);
        let result = {
            let observer = env.observer(Stage::TimelineAssembly);
            let assembler = Assembler {
                transcoder: &*self.services.transcoder,
                retrier: Retrier::new(&config.retries.transcode, env.budget, &observer),
                output: OutputParams {
                    width: config.video.width,
                    height: config.video.height,
                    fps: config.video.fps,
                    container,
                },
                motion: config.video.motion,
                work_dir: &ctx.work_dir,
            };
            async {
                ensure_dir(&ctx.work_dir).await?;
                assembler.assemble(&ctx.job_id, &timeline).await
            }
            .instrument(stage_span(Stage::TimelineAssembly))
            .await
        };
        let (transcode_request, video) =
            env.settle(Stage::TimelineAssembly, result, "Video assembled")?;
        ctx.transcode_request = Some(transcode_request);
        ctx.video = Some(video.clone());

        // Step 7: Publish
        env.enter(Stage::Publishing, "Publishing...")?;
        let result = {
            let observer = env.observer(Stage::Publishing);
            let publisher = Publisher {
                storage: &*self.services.storage,
                retrier: Retrier::new(&config.retries.upload, env.budget, &observer),
                upload_timeout: config.retries.upload.call_timeout,
            };
            publisher
                .publish(&ctx.job_id, script.title(), &timeline, &video, container)
                .instrument(stage_span(Stage::Publishing))
                .await
        };
        let (mut manifest, warnings) = env.settle(Stage::Publishing, result, "Published")?;
        ctx.warnings.extend(warnings);

        manifest.warnings = ctx.warnings.iter().map(ToString::to_string).collect();
        ctx.manifest = Some(manifest.clone());
        Ok(manifest)
    }

    /// Prompt derivation followed by image generation.
    async fn visual_branch(
        &self,
        env: &RunEnv<'_>,
        script: &Script,
        style: &str,
        dir: &Path,
    ) -> Result<Visuals, Halt> {
        let config = &*self.config;

        env.enter(Stage::PromptDerivation, "Deriving image prompts...")?;
        let result = {
            let observer = env.observer(Stage::PromptDerivation);
            let deriver = PromptDeriver {
                text: &*self.services.text,
                retrier: Retrier::new(&config.retries.text, env.budget, &observer),
                mode: config.images.prompt_mode,
            };
            deriver
                .derive(script, style)
                .instrument(stage_span(Stage::PromptDerivation))
                .await
        };
        let prompts = env.settle(Stage::PromptDerivation, result, "Image prompts ready")?;

        env.enter(Stage::ImageGeneration, "Generating images...")?;
        let result = {
            let observer = env.observer(Stage::ImageGeneration);
            let producer = ImageProducer {
                generator: &*self.services.images,
                reuse_index: self.services.vector.as_deref(),
                config: &config.images,
                style,
                retrier: Retrier::new(&config.retries.image, env.budget, &observer),
                lookup_timeout: config.retries.search.call_timeout,
                limiter: env.limiter,
                output_dir: dir,
            };
            async {
                ensure_dir(dir).await?;
                producer.produce(&prompts).await
            }
            .instrument(stage_span(Stage::ImageGeneration))
            .await
        };
        let (images, warnings) = env.settle(Stage::ImageGeneration, result, "Images ready")?;

        Ok(Visuals {
            prompts,
            images,
            warnings,
        })
    }

    async fn narration_branch(
        &self,
        env: &RunEnv<'_>,
        script: &Script,
        dir: &Path,
    ) -> Result<SceneSlots<Asset>, Halt> {
        let config = &*self.config;

        env.enter(Stage::NarrationSynthesis, "Synthesizing narration...")?;
        let result = {
            let observer = env.observer(Stage::NarrationSynthesis);
            let narrator = NarrationSynthesizer {
                speech: &*self.services.speech,
                default_voice: &config.default_voice,
                retrier: Retrier::new(&config.retries.speech, env.budget, &observer),
                limiter: env.limiter,
                output_dir: dir,
            };
            async {
                ensure_dir(dir).await?;
                narrator.synthesize(script).await
            }
            .instrument(stage_span(Stage::NarrationSynthesis))
            .await
        };
        env.settle(Stage::NarrationSynthesis, result, "Narration ready")
    }
}
