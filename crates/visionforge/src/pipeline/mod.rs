pub mod config;
pub mod context;
pub mod error;
pub mod progress;
pub mod retry;
pub mod runner;

pub use config::{PipelineConfig, RetryPolicies};
pub use context::PipelineContext;
pub use error::{PipelineWarning, StageError};
pub use progress::{BroadcastProgress, NoopProgress, ProgressEvent, ProgressReporter};
pub use retry::{NoRetryObserver, Retrier, RetryBudget, RetryObserver, RetryPolicy};
pub use runner::Pipeline;
