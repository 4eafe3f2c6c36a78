pub mod broadcast;
pub mod config;
pub mod db;
pub mod error;
pub mod model;
pub mod pipeline;
pub mod sanitize;
pub mod services;
pub mod stages;
pub mod storage;
pub mod telemetry;
pub mod transcode;
pub mod worker;

pub use broadcast::{JobHandle, JobProgressBroadcaster, JobProgressEvent, JobStore};
pub use config::{load_config, load_config_from_str, Config};
pub use error::{ConfigError, Result, StorageError, VisionForgeError, WorkerError};
pub use model::{Job, JobConfig, JobOutcome, JobRequest, JobStatus, Stage, StageStatus};
pub use pipeline::{Pipeline, PipelineConfig, PipelineContext};
pub use services::{Collaborators, ServiceError, ServiceErrorKind};
pub use storage::LocalObjectStorage;
pub use transcode::FfmpegTranscoder;
pub use worker::WorkerPool;
