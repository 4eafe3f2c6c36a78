//! Pipeline stages and the per-stage state machine.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// One step of the generation pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Retrieval,
    ScriptGeneration,
    PromptDerivation,
    ImageGeneration,
    NarrationSynthesis,
    TimelineAssembly,
    Publishing,
}

impl Stage {
    pub const ALL: [Stage; 7] = [
        Stage::Retrieval,
        Stage::ScriptGeneration,
        Stage::PromptDerivation,
        Stage::ImageGeneration,
        Stage::NarrationSynthesis,
        Stage::TimelineAssembly,
        Stage::Publishing,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Retrieval => "retrieval",
            Stage::ScriptGeneration => "script_generation",
            Stage::PromptDerivation => "prompt_derivation",
            Stage::ImageGeneration => "image_generation",
            Stage::NarrationSynthesis => "narration_synthesis",
            Stage::TimelineAssembly => "timeline_assembly",
            Stage::Publishing => "publishing",
        }
    }

    pub fn parse(s: &str) -> Option<Stage> {
        Stage::ALL.into_iter().find(|stage| stage.as_str() == s)
    }

    /// Stages that must have succeeded before this one may run.
    pub fn dependencies(&self) -> &'static [Stage] {
        match self {
            Stage::Retrieval => &[],
            Stage::ScriptGeneration => &[Stage::Retrieval],
            Stage::PromptDerivation => &[Stage::ScriptGeneration],
            Stage::ImageGeneration => &[Stage::PromptDerivation],
            Stage::NarrationSynthesis => &[Stage::ScriptGeneration],
            Stage::TimelineAssembly => &[Stage::ImageGeneration, Stage::NarrationSynthesis],
            Stage::Publishing => &[Stage::TimelineAssembly],
        }
    }
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageStatus {
    Pending,
    Running,
    Succeeded,
    FailedRetryable,
    FailedTerminal,
}

impl StageStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            StageStatus::Pending => "pending",
            StageStatus::Running => "running",
            StageStatus::Succeeded => "succeeded",
            StageStatus::FailedRetryable => "failed_retryable",
            StageStatus::FailedTerminal => "failed_terminal",
        }
    }

    pub fn is_finished(&self) -> bool {
        matches!(self, StageStatus::Succeeded | StageStatus::FailedTerminal)
    }

    fn can_transition_to(&self, next: StageStatus) -> bool {
        use StageStatus::*;
        matches!(
            (self, next),
            (Pending, Running)
                | (Running, Succeeded)
                | (Running, FailedRetryable)
                | (Running, FailedTerminal)
                | (FailedRetryable, Running)
                | (FailedRetryable, FailedTerminal)
        )
    }
}

impl std::fmt::Display for StageStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransitionError {
    #[error("stage {stage} cannot move from {from} to {to}")]
    Invalid {
        stage: Stage,
        from: StageStatus,
        to: StageStatus,
    },

    #[error("stage {stage} cannot start before {dependency} has succeeded")]
    DependencyNotMet { stage: Stage, dependency: Stage },
}

/// Bookkeeping for a single stage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StageState {
    pub status: StageStatus,
    /// Retries scheduled for calls made by this stage.
    pub retries: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
}

impl Default for StageState {
    fn default() -> Self {
        Self {
            status: StageStatus::Pending,
            retries: 0,
            started_at: None,
            finished_at: None,
            last_error: None,
        }
    }
}

/// Status of every stage of one job. Enforces the transition table and
/// the dependency rule on entry to `Running`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StageStates(BTreeMap<Stage, StageState>);

impl Default for StageStates {
    fn default() -> Self {
        Self(
            Stage::ALL
                .into_iter()
                .map(|stage| (stage, StageState::default()))
                .collect(),
        )
    }
}

impl StageStates {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn status(&self, stage: Stage) -> StageStatus {
        self.0
            .get(&stage)
            .map(|s| s.status)
            .unwrap_or(StageStatus::Pending)
    }

    pub fn get(&self, stage: Stage) -> Option<&StageState> {
        self.0.get(&stage)
    }

    pub fn iter(&self) -> impl Iterator<Item = (Stage, &StageState)> {
        self.0.iter().map(|(stage, state)| (*stage, state))
    }

    /// Moves `stage` to `next`, validating the transition.
    pub fn transition(&mut self, stage: Stage, next: StageStatus) -> Result<(), TransitionError> {
        let current = self.status(stage);
        if !current.can_transition_to(next) {
            return Err(TransitionError::Invalid {
                stage,
                from: current,
                to: next,
            });
        }

        if next == StageStatus::Running {
            if let Some(dependency) = stage
                .dependencies()
                .iter()
                .find(|dep| self.status(**dep) != StageStatus::Succeeded)
            {
                return Err(TransitionError::DependencyNotMet {
                    stage,
                    dependency: *dependency,
                });
            }
        }

        let now = Utc::now();
        let state = self.0.entry(stage).or_default();
        match next {
            StageStatus::Running => {
                if state.started_at.is_none() {
                    state.started_at = Some(now);
                }
            }
            StageStatus::FailedRetryable => state.retries += 1,
            StageStatus::Succeeded | StageStatus::FailedTerminal => state.finished_at = Some(now),
            StageStatus::Pending => {}
        }
        state.status = next;
        Ok(())
    }

    /// Records a scheduled retry. Scene calls running in parallel may report
    /// retries while the stage is already `FailedRetryable`; those only bump
    /// the counter.
    pub fn record_retry(&mut self, stage: Stage) -> Result<(), TransitionError> {
        if self.status(stage) == StageStatus::FailedRetryable {
            self.0.entry(stage).or_default().retries += 1;
            return Ok(());
        }
        self.transition(stage, StageStatus::FailedRetryable)
    }

    /// Moves a stage back to `Running` when a retry starts. No-op if it is
    /// already running.
    pub fn resume(&mut self, stage: Stage) -> Result<(), TransitionError> {
        if self.status(stage) == StageStatus::Running {
            return Ok(());
        }
        self.transition(stage, StageStatus::Running)
    }

    /// Records the most recent error seen by a stage.
    pub fn set_error(&mut self, stage: Stage, error: impl Into<String>) {
        self.0.entry(stage).or_default().last_error = Some(error.into());
    }
}
