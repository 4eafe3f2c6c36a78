use std::path::Path;

use crate::config::schema::Config;
use crate::error::ConfigError;

const SCHEMA_JSON: &str = include_str!("../../../../schema/config-v1.json");

pub fn load_config<P: AsRef<Path>>(path: P) -> Result<Config, ConfigError> {
    let path = path.as_ref();
    let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadFile {
        path: path.to_path_buf(),
        source: e,
    })?;

    load_config_from_str(&content)
}

pub fn load_config_from_str(content: &str) -> Result<Config, ConfigError> {
    let json_value: serde_json::Value = serde_json::from_str(content)?;

    validate_schema(&json_value)?;

    let config: Config = serde_json::from_value(json_value)?;

    validate_config(&config)?;

    Ok(config)
}

fn validate_schema(json_value: &serde_json::Value) -> Result<(), ConfigError> {
    let schema: serde_json::Value =
        serde_json::from_str(SCHEMA_JSON).map_err(|e| ConfigError::Validation {
            message: format!("Invalid embedded schema JSON: {}", e),
        })?;

    let validator = jsonschema::validator_for(&schema).map_err(|e| ConfigError::Validation {
        message: format!("Failed to compile JSON schema: {}", e),
    })?;

    let error_messages: Vec<String> = validator
        .iter_errors(json_value)
        .map(|e| e.to_string())
        .collect();
    if !error_messages.is_empty() {
        return Err(ConfigError::SchemaValidation {
            errors: error_messages.join("; "),
        });
    }

    Ok(())
}

fn validate_config(config: &Config) -> Result<(), ConfigError> {
    if config.version != "1.0" {
        return Err(ConfigError::Validation {
            message: format!("Unsupported config version: {}", config.version),
        });
    }

    if config.output_directory.trim().is_empty() {
        return Err(validation("output_directory must not be empty"));
    }
    if config.worker.max_concurrent_jobs == 0 {
        return Err(validation("worker.max_concurrent_jobs must be at least 1"));
    }
    if config.concurrency.scene_limit == 0 {
        return Err(validation("concurrency.scene_limit must be at least 1"));
    }
    if config.retry.initial_backoff_ms > config.retry.max_backoff_ms {
        return Err(validation(
            "retry.initial_backoff_ms must not exceed retry.max_backoff_ms",
        ));
    }
    if config.narration.default_voice.trim().is_empty() {
        return Err(validation("narration.default_voice must not be empty"));
    }
    if let Some(threshold) = config.images.reuse_threshold {
        if !(0.0..=1.0).contains(&threshold) {
            return Err(validation("images.reuse_threshold must be within [0, 1]"));
        }
    }
    if config.video.width % 2 != 0 || config.video.height % 2 != 0 {
        return Err(validation("video.width and video.height must be even"));
    }

    let timeouts = &config.timeouts;
    for (name, secs) in [
        ("text_secs", timeouts.text_secs),
        ("search_secs", timeouts.search_secs),
        ("image_secs", timeouts.image_secs),
        ("speech_secs", timeouts.speech_secs),
        ("transcode_secs", timeouts.transcode_secs),
        ("upload_secs", timeouts.upload_secs),
    ] {
        if secs == 0 {
            return Err(ConfigError::Validation {
                message: format!("timeouts.{} must be greater than zero", name),
            });
        }
    }

    Ok(())
}

fn validation(message: &str) -> ConfigError {
    ConfigError::Validation {
        message: message.to_string(),
    }
}
