//! Job state and real-time progress streaming.
//!
//! `JobStore` owns every job's state; `JobProgressBroadcaster` fans progress
//! events out to any number of subscribers.

pub mod job_progress;
pub mod job_store;

pub use job_progress::{JobProgressBroadcaster, JobProgressEvent, JobProgressTracker};
pub use job_store::{JobCounts, JobHandle, JobStore};
