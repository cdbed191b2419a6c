use super::runner::JobRunner;
use crate::core::error::RelayError;
use crate::core::types::{Job, JobState};
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::JoinHandle;
use tracing::{debug, error, warn};

/// Process-lifetime job counters. Jobs themselves are never stored.
#[derive(Debug, Default)]
pub struct JobStats {
    accepted: AtomicU64,
    rejected: AtomicU64,
    running: AtomicU64,
    succeeded: AtomicU64,
    failed: AtomicU64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct JobStatsSnapshot {
    pub accepted: u64,
    pub rejected: u64,
    pub running: u64,
    pub succeeded: u64,
    pub failed: u64,
}

impl JobStats {
    pub fn snapshot(&self) -> JobStatsSnapshot {
        JobStatsSnapshot {
            accepted: self.accepted.load(Ordering::Relaxed),
            rejected: self.rejected.load(Ordering::Relaxed),
            running: self.running.load(Ordering::Relaxed),
            succeeded: self.succeeded.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
        }
    }
}

/// Decrements `running` however the job task ends, unwinding included.
struct RunningGuard(Arc<JobStats>);

impl RunningGuard {
    fn enter(stats: Arc<JobStats>) -> Self {
        stats.running.fetch_add(1, Ordering::Relaxed);
        Self(stats)
    }
}

impl Drop for RunningGuard {
    fn drop(&mut self) {
        self.0.running.fetch_sub(1, Ordering::Relaxed);
    }
}

/// Hands accepted jobs to background tasks, at most `max_concurrent` of
/// which hold a browser at any moment. Up to `max_queued` more wait for a
/// permit; anything past that is turned away.
pub struct Dispatcher {
    runner: Arc<JobRunner>,
    permits: Arc<Semaphore>,
    // Held from acceptance until the job is terminal.
    admission: Arc<Semaphore>,
    capacity: usize,
    stats: Arc<JobStats>,
}

impl Dispatcher {
    pub fn new(runner: JobRunner, max_concurrent: usize, max_queued: usize) -> Self {
        let max_concurrent = max_concurrent.max(1);
        let capacity = max_concurrent + max_queued;
        Self {
            runner: Arc::new(runner),
            permits: Arc::new(Semaphore::new(max_concurrent)),
            admission: Arc::new(Semaphore::new(capacity)),
            capacity,
            stats: Arc::new(JobStats::default()),
        }
    }

    pub fn stats(&self) -> JobStatsSnapshot {
        self.stats.snapshot()
    }

    /// Spawn `job` and return immediately. The returned handle resolves once
    /// the job is terminal; callers on the request path just drop it.
    ///
    /// Fails with [`RelayError::Overloaded`] when the backlog is full; the
    /// job is then never started. The job runs in its own task, so a panic
    /// inside it is contained and counted as a failure.
    pub fn dispatch(&self, job: Job) -> Result<JoinHandle<()>, RelayError> {
        let Ok(admitted) = self.admission.clone().try_acquire_owned() else {
            self.stats.rejected.fetch_add(1, Ordering::Relaxed);
            warn!("job {} rejected: {} jobs already in flight", job.id, self.capacity);
            return Err(RelayError::Overloaded(self.capacity));
        };
        self.stats.accepted.fetch_add(1, Ordering::Relaxed);
        let job_id = job.id.clone();

        let runner = self.runner.clone();
        let permits = self.permits.clone();
        let stats = self.stats.clone();
        let task = tokio::spawn(async move {
            let Ok(_permit) = permits.acquire_owned().await else {
                error!("job {}: dispatcher closed before it could run", job.id);
                return None;
            };
            let _running = RunningGuard::enter(stats);
            Some(runner.run(job).await.state)
        });

        let stats = self.stats.clone();
        Ok(tokio::spawn(async move {
            let _admitted = admitted;
            let succeeded = match task.await {
                Ok(Some(JobState::Succeeded)) => true,
                Ok(Some(state)) => {
                    debug!("job {} ended as {:?}", job_id, state);
                    false
                }
                Ok(None) => false,
                Err(e) if e.is_panic() => {
                    error!("💥 job {} panicked; server unaffected", job_id);
                    false
                }
                Err(e) => {
                    error!("job {} task aborted: {}", job_id, e);
                    false
                }
            };
            let counter = if succeeded { &stats.succeeded } else { &stats.failed };
            counter.fetch_add(1, Ordering::Relaxed);
        }))
    }
}
