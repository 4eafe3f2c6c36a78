pub mod loader;
pub mod schema;

pub use loader::{load_config, load_config_from_str};
pub use schema::{
    ConcurrencyConfig, Config, ImageConfig, LoggingConfig, NarrationConfig, PromptMode,
    RetentionConfig, RetrievalConfig, RetryConfig, StorageConfig, TimeoutConfig, VideoConfig,
    WorkerConfig,
};
