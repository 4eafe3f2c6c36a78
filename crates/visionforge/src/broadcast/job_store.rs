//! Job store: live jobs in memory, optionally archived to SQLite.
//!
//! Jobs are created through [`JobStore::create`], which hands out the one
//! [`JobHandle`] allowed to mutate that job. Everything else only reads.

use std::collections::HashMap;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::db::job_repo::{self, JobFilter, JobRow};
use crate::db::{Database, DatabaseError};
use crate::model::{
    FailureKind, Job, JobFailure, JobOutcome, JobRequest, JobStatus, Stage, StageStatus,
    TransitionError,
};

// ─── Helpers ────────────────────────────────────────────────────────────────

fn parse_timestamp(s: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|e| {
            log::warn!("parse_timestamp: failed to parse '{}': {}", s, e);
            Utc::now()
        })
}

fn format_timestamp(dt: DateTime<Utc>) -> String {
    dt.to_rfc3339()
}

fn to_json<T: Serialize>(value: &T, column: &'static str) -> Result<String, DatabaseError> {
    serde_json::to_string(value).map_err(|source| DatabaseError::Json { column, source })
}

fn from_json<T: DeserializeOwned>(text: &str, column: &'static str) -> Result<T, DatabaseError> {
    serde_json::from_str(text).map_err(|source| DatabaseError::Json { column, source })
}

/// Converts a job into its archive row.
pub fn job_to_row(job: &Job) -> Result<JobRow, DatabaseError> {
    let outcome_json = job
        .outcome
        .as_ref()
        .map(|o| to_json(o, "outcome_json"))
        .transpose()?;
    let error = job
        .outcome
        .as_ref()
        .and_then(JobOutcome::failure)
        .map(|f| format!("{}: {}", f.stage, f.message));

    Ok(JobRow {
        id: job.id.clone(),
        topic: job.topic.clone(),
        status: job.status.as_str().to_string(),
        current_stage: job.current_stage.map(|s| s.as_str().to_string()),
        config_json: to_json(&job.config, "config_json")?,
        stages_json: to_json(&job.stages, "stages_json")?,
        outcome_json,
        error,
        created_at: format_timestamp(job.created_at),
        updated_at: format_timestamp(job.updated_at),
        completed_at: job
            .is_terminal()
            .then(|| format_timestamp(job.updated_at)),
    })
}

/// Rebuilds a job from its archive row.
///
/// A row that never reached a terminal status belongs to a process that
/// stopped mid-run; it is reported as failed so readers never see a job
/// that will not progress.
pub fn job_from_row(row: &JobRow) -> Result<Job, DatabaseError> {
    let status = JobStatus::parse(&row.status).unwrap_or_else(|| {
        log::warn!(
            "Unknown job status '{}' for job {}, treating as failed",
            row.status,
            row.id
        );
        JobStatus::Failed
    });
    let current_stage = row.current_stage.as_deref().and_then(Stage::parse);
    let outcome: Option<JobOutcome> = row
        .outcome_json
        .as_deref()
        .map(|text| from_json(text, "outcome_json"))
        .transpose()?;

    let mut job = Job {
        id: row.id.clone(),
        topic: row.topic.clone(),
        config: from_json(&row.config_json, "config_json")?,
        status,
        current_stage,
        stages: from_json(&row.stages_json, "stages_json")?,
        created_at: parse_timestamp(&row.created_at),
        updated_at: parse_timestamp(&row.updated_at),
        outcome,
    };

    if !job.is_terminal() || job.outcome.is_none() {
        job.status = JobStatus::Failed;
        job.outcome = Some(JobOutcome::Failed(JobFailure {
            stage: current_stage.unwrap_or(Stage::Retrieval),
            kind: FailureKind::TransientService,
            message: "job was interrupted before it finished".to_string(),
            retryable_by_resubmission: true,
        }));
    }

    Ok(job)
}

// ─── JobStore ───────────────────────────────────────────────────────────────

/// Number of cached jobs in each status.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct JobCounts {
    pub queued: usize,
    pub running: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub cancelled: usize,
}

/// Persistent job store backed by rusqlite.
///
/// Uses `std::sync::RwLock` for both database handle and cache.
pub struct JobStore {
    /// Database handle (clone is cheap, inner `Arc`).
    db: RwLock<Option<Database>>,
    /// Live and recently finished jobs.
    cache: RwLock<HashMap<String, Job>>,
}

impl JobStore {
    pub fn new() -> Self {
        Self {
            db: RwLock::new(None),
            cache: RwLock::new(HashMap::new()),
        }
    }

    /// Attaches the archive. Every later state change is persisted.
    pub fn set_database(&self, db: Database) {
        let mut guard = match self.db.write() {
            Ok(g) => g,
            Err(poisoned) => {
                log::warn!("Job store DB lock was poisoned, recovering");
                poisoned.into_inner()
            }
        };
        *guard = Some(db);
    }

    /// Gets a cloned database handle if available.
    pub fn get_database(&self) -> Option<Database> {
        let guard = match self.db.read() {
            Ok(g) => g,
            Err(poisoned) => {
                log::warn!("Job store DB lock was poisoned, recovering");
                poisoned.into_inner()
            }
        };
        guard.clone()
    }

    fn read_cache(&self) -> RwLockReadGuard<'_, HashMap<String, Job>> {
        match self.cache.read() {
            Ok(guard) => guard,
            Err(poisoned) => {
                log::warn!("Job store cache lock was poisoned, recovering");
                poisoned.into_inner()
            }
        }
    }

    fn write_cache(&self) -> RwLockWriteGuard<'_, HashMap<String, Job>> {
        match self.cache.write() {
            Ok(guard) => guard,
            Err(poisoned) => {
                log::warn!("Job store cache lock was poisoned, recovering");
                poisoned.into_inner()
            }
        }
    }

    /// Registers a new queued job and returns its writer handle.
    pub fn create(self: &Arc<Self>, request: JobRequest) -> JobHandle {
        let job = Job::new(request);
        let job_id = job.id.clone();
        self.persist(&job);
        self.write_cache().insert(job_id.clone(), job);

        JobHandle {
            store: Arc::clone(self),
            job_id,
        }
    }

    /// Applies `f` to a cached job, then persists the result.
    fn modify<R>(&self, job_id: &str, f: impl FnOnce(&mut Job) -> R) -> Option<R> {
        let (result, snapshot) = {
            let mut cache = self.write_cache();
            let job = cache.get_mut(job_id)?;
            let result = f(job);
            job.updated_at = Utc::now();
            (result, job.clone())
        };
        self.persist(&snapshot);
        Some(result)
    }

    fn persist(&self, job: &Job) {
        if let Some(db) = self.get_database() {
            if let Err(e) = job_to_row(job).and_then(|row| job_repo::upsert(&db, &row)) {
                log::error!("Failed to persist job {} to database: {}", job.id, e);
            }
        }
    }

    /// Returns a job by ID (from cache).
    pub fn get(&self, job_id: &str) -> Option<Job> {
        self.read_cache().get(job_id).cloned()
    }

    /// Returns a job by ID, checking cache then database.
    pub fn get_with_fallback(&self, job_id: &str) -> Option<Job> {
        if let Some(job) = self.get(job_id) {
            return Some(job);
        }
        let db = self.get_database()?;
        match job_repo::find_by_id(&db, job_id) {
            Ok(Some(row)) => match job_from_row(&row) {
                Ok(job) => Some(job),
                Err(e) => {
                    log::error!("Archived job {} is unreadable: {}", job_id, e);
                    None
                }
            },
            Ok(None) => None,
            Err(e) => {
                log::error!("Failed to look up job {}: {}", job_id, e);
                None
            }
        }
    }

    /// Returns all cached jobs, newest first.
    pub fn get_all(&self) -> Vec<Job> {
        let mut jobs: Vec<Job> = self.read_cache().values().cloned().collect();
        jobs.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        jobs
    }

    /// Returns archived jobs, newest first, falling back to the cache.
    pub fn query(&self, filter: &JobFilter) -> Result<(Vec<Job>, u64), DatabaseError> {
        if let Some(db) = self.get_database() {
            let (rows, total) = job_repo::query(&db, filter)?;
            let jobs = rows
                .iter()
                .map(job_from_row)
                .collect::<Result<Vec<_>, _>>()?;
            return Ok((jobs, total));
        }

        let mut jobs = self.get_all();
        if let Some(ref status) = filter.status {
            jobs.retain(|j| j.status.as_str() == status);
        }
        let total = jobs.len() as u64;
        let offset = filter.offset.unwrap_or(0) as usize;
        let limit = filter.limit.unwrap_or(100) as usize;
        Ok((jobs.into_iter().skip(offset).take(limit).collect(), total))
    }

    /// Removes a job from the cache, returning it.
    pub fn remove(&self, job_id: &str) -> Option<Job> {
        self.write_cache().remove(job_id)
    }

    /// Evicts finished jobs last updated more than `ttl` ago, from the cache
    /// and the archive. Running jobs are never evicted. Returns the number
    /// of cached jobs removed.
    pub fn evict_expired(&self, ttl: chrono::Duration) -> usize {
        let cutoff = Utc::now() - ttl;
        let removed = {
            let mut cache = self.write_cache();
            let before = cache.len();
            cache.retain(|_, job| !(job.is_terminal() && job.updated_at < cutoff));
            before - cache.len()
        };

        if let Some(db) = self.get_database() {
            if let Err(e) = job_repo::delete_finished_before(&db, &format_timestamp(cutoff)) {
                log::error!("Failed to delete expired jobs from database: {}", e);
            }
        }

        if removed > 0 {
            log::info!("Evicted {} expired job(s)", removed);
        }
        removed
    }

    /// Returns the count of cached jobs by status.
    pub fn counts(&self) -> JobCounts {
        let mut counts = JobCounts::default();
        for job in self.read_cache().values() {
            match job.status {
                JobStatus::Queued => counts.queued += 1,
                JobStatus::Running => counts.running += 1,
                JobStatus::Succeeded => counts.succeeded += 1,
                JobStatus::Failed => counts.failed += 1,
                JobStatus::Cancelled => counts.cancelled += 1,
            }
        }
        counts
    }
}

impl Default for JobStore {
    fn default() -> Self {
        Self::new()
    }
}

// ─── JobHandle ──────────────────────────────────────────────────────────────

/// Exclusive writer for one job. Not `Clone`: whoever holds it owns the
/// job's state.
pub struct JobHandle {
    store: Arc<JobStore>,
    job_id: String,
}

impl JobHandle {
    pub fn id(&self) -> &str {
        &self.job_id
    }

    /// Current state of the job.
    pub fn snapshot(&self) -> Option<Job> {
        self.store.get(&self.job_id)
    }

    pub fn mark_running(&self) {
        self.store.modify(&self.job_id, |job| {
            if job.status == JobStatus::Queued {
                job.status = JobStatus::Running;
            }
        });
    }

    /// Moves `stage` to running and makes it the job's current stage.
    pub fn begin_stage(&self, stage: Stage) -> Result<(), TransitionError> {
        self.apply(|job| {
            job.stages.transition(stage, StageStatus::Running)?;
            job.current_stage = Some(stage);
            Ok(())
        })
    }

    /// Marks `stage` succeeded, first resuming it if a retry was pending.
    pub fn complete_stage(&self, stage: Stage) -> Result<(), TransitionError> {
        self.apply(|job| {
            job.stages.resume(stage)?;
            job.stages.transition(stage, StageStatus::Succeeded)
        })
    }

    /// Marks `stage` terminally failed with `error`.
    pub fn fail_stage(&self, stage: Stage, error: &str) -> Result<(), TransitionError> {
        self.apply(|job| {
            job.stages.set_error(stage, error);
            job.current_stage = Some(stage);
            job.stages.transition(stage, StageStatus::FailedTerminal)
        })
    }

    pub fn record_retry(&self, stage: Stage, error: &str) -> Result<(), TransitionError> {
        self.apply(|job| {
            job.stages.set_error(stage, error);
            job.stages.record_retry(stage)
        })
    }

    pub fn resume_stage(&self, stage: Stage) -> Result<(), TransitionError> {
        self.apply(|job| job.stages.resume(stage))
    }

    pub fn status_of(&self, stage: Stage) -> StageStatus {
        self.snapshot()
            .map(|job| job.stages.status(stage))
            .unwrap_or(StageStatus::Pending)
    }

    /// Records the terminal outcome.
    pub fn finish(&self, outcome: JobOutcome) {
        self.store.modify(&self.job_id, |job| job.finish(outcome));
    }

    fn apply(
        &self,
        f: impl FnOnce(&mut Job) -> Result<(), TransitionError>,
    ) -> Result<(), TransitionError> {
        self.store.modify(&self.job_id, f).unwrap_or_else(|| {
            log::warn!("Job {} is no longer in the store", self.job_id);
            Ok(())
        })
    }
}

impl std::fmt::Debug for JobHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JobHandle")
            .field("job_id", &self.job_id)
            .finish()
    }
}
