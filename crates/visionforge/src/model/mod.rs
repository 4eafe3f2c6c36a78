pub mod asset;
pub mod job;
pub mod script;
pub mod slots;
pub mod stage;
pub mod timeline;

pub use asset::{Asset, AssetKind, AssetLocation};
pub use job::{
    AssetManifest, FailureKind, Job, JobConfig, JobFailure, JobOutcome, JobRequest, JobStatus,
    PublishedAsset, SceneManifest,
};
pub use script::{Scene, SceneDraft, Script, ScriptDraft};
pub use slots::{SceneSlots, SlotError};
pub use stage::{Stage, StageState, StageStates, StageStatus, TransitionError};
pub use timeline::{Timeline, TimelineEntry, TimelineError};
