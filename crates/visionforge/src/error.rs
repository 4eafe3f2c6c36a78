use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum VisionForgeError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Worker error: {0}")]
    Worker(#[from] WorkerError),

    #[error("Database error: {0}")]
    Database(#[from] crate::db::DatabaseError),
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file '{path}': {source}")]
    ReadFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config JSON: {0}")]
    ParseJson(#[from] serde_json::Error),

    #[error("Config validation failed: {message}")]
    Validation { message: String },

    #[error("Schema validation failed: {errors}")]
    SchemaValidation { errors: String },
}

#[derive(Error, Debug)]
pub enum StorageError {
    #[error("Failed to create directory '{path}': {source}")]
    CreateDirectory {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to write file '{path}': {source}")]
    WriteFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to copy file from '{from}' to '{to}': {source}")]
    CopyFile {
        from: PathBuf,
        to: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Source file does not exist: {0}")]
    MissingSource(PathBuf),

    #[error("Invalid object key '{key}': {reason}")]
    InvalidKey { key: String, reason: String },
}

#[derive(Error, Debug)]
pub enum WorkerError {
    #[error("Worker pool is shutting down")]
    ShuttingDown,

    #[error("Unknown job: {0}")]
    UnknownJob(String),

    #[error("Job {0} already finished")]
    AlreadyFinished(String),

    #[error("Job task failed: {0}")]
    TaskFailed(String),
}

pub type Result<T> = std::result::Result<T, VisionForgeError>;
