use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use log::{debug, error, info, warn};
use tokio::sync::{broadcast, Semaphore};
use tokio::task::JoinHandle;

use crate::broadcast::{JobHandle, JobProgressBroadcaster, JobProgressEvent, JobStore};
use crate::error::WorkerError;
use crate::model::{Job, JobOutcome, JobRequest};
use crate::pipeline::{BroadcastProgress, NoopProgress, Pipeline, PipelineContext};

/// Bookkeeping for a submitted job.
struct Submitted {
    cancel: Arc<AtomicBool>,
    task: Option<JoinHandle<()>>,
}

/// Runs jobs on Tokio tasks, at most `max_concurrent_jobs` at a time. Must be
/// used from within a Tokio runtime.
pub struct WorkerPool {
    pipeline: Arc<Pipeline>,
    store: Arc<JobStore>,
    slots: Arc<Semaphore>,
    jobs: Arc<Mutex<HashMap<String, Submitted>>>,
    shutdown: Arc<AtomicBool>,
    progress: Option<JobProgressBroadcaster>,
    sweeper: Mutex<Option<JoinHandle<()>>>,
}

impl WorkerPool {
    pub fn new(pipeline: Arc<Pipeline>, store: Arc<JobStore>, max_concurrent_jobs: usize) -> Self {
        let max_concurrent_jobs = max_concurrent_jobs.max(1);
        info!("Started worker pool with {} job slots", max_concurrent_jobs);

        Self {
            pipeline,
            store,
            slots: Arc::new(Semaphore::new(max_concurrent_jobs)),
            jobs: Arc::new(Mutex::new(HashMap::new())),
            shutdown: Arc::new(AtomicBool::new(false)),
            progress: None,
            sweeper: Mutex::new(None),
        }
    }

    /// Streams progress of every job through `broadcaster`.
    pub fn with_progress(mut self, broadcaster: JobProgressBroadcaster) -> Self {
        self.progress = Some(broadcaster);
        self
    }

    pub fn store(&self) -> &Arc<JobStore> {
        &self.store
    }

    /// Queues a job and returns its ID.
    pub fn submit(&self, request: JobRequest) -> Result<String, WorkerError> {
        if self.is_shutdown() {
            return Err(WorkerError::ShuttingDown);
        }

        let handle = self.store.create(request.clone());
        let job_id = handle.id().to_string();
        let cancel = Arc::new(AtomicBool::new(false));

        let sender = self.progress.as_ref().map(|broadcaster| {
            broadcaster.start_job(&job_id, &request.topic);
            broadcaster.sender()
        });

        let task = tokio::spawn(run_job(
            Arc::clone(&self.pipeline),
            Arc::clone(&self.slots),
            handle,
            request,
            Arc::clone(&cancel),
            sender,
        ));

        self.jobs().insert(
            job_id.clone(),
            Submitted {
                cancel,
                task: Some(task),
            },
        );
        debug!("Submitted job {}", job_id);
        Ok(job_id)
    }

    /// Current state of a job, including archived jobs.
    pub fn status(&self, job_id: &str) -> Option<Job> {
        self.store.get_with_fallback(job_id)
    }

    /// Requests cancellation. The job stops before its next stage.
    pub fn cancel(&self, job_id: &str) -> Result<(), WorkerError> {
        let job = self
            .store
            .get(job_id)
            .ok_or_else(|| WorkerError::UnknownJob(job_id.to_string()))?;
        if job.is_terminal() {
            return Err(WorkerError::AlreadyFinished(job_id.to_string()));
        }

        match self.jobs().get(job_id) {
            Some(submitted) => {
                submitted.cancel.store(true, Ordering::Release);
                info!("Cancellation requested for job {}", job_id);
                Ok(())
            }
            None => Err(WorkerError::UnknownJob(job_id.to_string())),
        }
    }

    /// Waits for a job to reach a terminal state and returns it. The job
    /// stays in the store until retention evicts it.
    pub async fn wait(&self, job_id: &str) -> Result<Job, WorkerError> {
        let task = self.jobs().get_mut(job_id).and_then(|s| s.task.take());

        if let Some(task) = task {
            let joined = task.await;
            self.jobs().remove(job_id);
            joined.map_err(|e| WorkerError::TaskFailed(e.to_string()))?;
        }

        self.store
            .get_with_fallback(job_id)
            .ok_or_else(|| WorkerError::UnknownJob(job_id.to_string()))
    }

    /// Rejects further submissions and cancels queued and running jobs at
    /// their next stage boundary.
    pub fn shutdown(&self) {
        info!("Shutting down worker pool...");
        self.shutdown.store(true, Ordering::Release);
        for submitted in self.jobs().values() {
            submitted.cancel.store(true, Ordering::Release);
        }
        if let Some(sweeper) = self.sweeper_slot().take() {
            sweeper.abort();
        }
    }

    pub fn is_shutdown(&self) -> bool {
        self.shutdown.load(Ordering::Acquire)
    }

    /// Number of jobs the pool still holds a cancel flag or task for.
    pub fn tracked_jobs(&self) -> usize {
        self.jobs().len()
    }

    /// Periodically evicts finished jobs older than `ttl` and forgets their
    /// pool entries. Replaces any previously started sweeper.
    pub fn start_retention_sweeper(&self, ttl: Duration, interval: Duration) {
        let store = Arc::clone(&self.store);
        let jobs = Arc::clone(&self.jobs);
        let ttl = match chrono::Duration::from_std(ttl) {
            Ok(ttl) => ttl,
            Err(e) => {
                warn!("Retention TTL out of range, sweeper not started: {}", e);
                return;
            }
        };
        let interval = interval.max(Duration::from_millis(10));

        let task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                let removed = store.evict_expired(ttl);
                if removed > 0 {
                    debug!("Retention sweep removed {} job(s)", removed);
                }
                lock_jobs(&jobs).retain(|job_id, _| store.get(job_id).is_some());
            }
        });

        if let Some(previous) = self.sweeper_slot().replace(task) {
            previous.abort();
        }
    }

    fn jobs(&self) -> MutexGuard<'_, HashMap<String, Submitted>> {
        lock_jobs(&self.jobs)
    }

    fn sweeper_slot(&self) -> MutexGuard<'_, Option<JoinHandle<()>>> {
        match self.sweeper.lock() {
            Ok(guard) => guard,
            Err(poisoned) => {
                warn!("Worker pool sweeper lock was poisoned, recovering");
                poisoned.into_inner()
            }
        }
    }
}

impl Drop for WorkerPool {
    fn drop(&mut self) {
        if let Some(sweeper) = self.sweeper_slot().take() {
            sweeper.abort();
        }
    }
}

fn lock_jobs(jobs: &Mutex<HashMap<String, Submitted>>) -> MutexGuard<'_, HashMap<String, Submitted>> {
    match jobs.lock() {
        Ok(guard) => guard,
        Err(poisoned) => {
            warn!("Worker pool job table lock was poisoned, recovering");
            poisoned.into_inner()
        }
    }
}

async fn run_job(
    pipeline: Arc<Pipeline>,
    slots: Arc<Semaphore>,
    handle: JobHandle,
    request: JobRequest,
    cancel: Arc<AtomicBool>,
    sender: Option<Arc<broadcast::Sender<JobProgressEvent>>>,
) {
    let _permit = match slots.acquire_owned().await {
        Ok(permit) => permit,
        Err(e) => {
            error!("Job slot unavailable for {}: {}", handle.id(), e);
            handle.finish(JobOutcome::Cancelled { at_stage: None });
            return;
        }
    };
    debug!("Job {} acquired a slot", handle.id());

    let topic = request.topic.clone();
    let ctx = PipelineContext::new(handle.id(), request, pipeline.config());
    let (outcome, _ctx) = match sender {
        Some(sender) => {
            let progress = BroadcastProgress::new(handle.id(), &topic, sender);
            pipeline.run(ctx, &handle, &cancel, &progress).await
        }
        None => pipeline.run(ctx, &handle, &cancel, &NoopProgress).await,
    };

    debug!("Job {} finished with status {:?}", handle.id(), outcome.status());
}
