use crate::core::error::RelayError;
use crate::core::types::{Job, JobState};
use crate::notify::{FailureReport, JobReport, Notifier, SuccessReport};
use crate::scraping::PageExtractor;
use crate::text::chunk;
use std::sync::Arc;
use tracing::{error, info, warn};

/// Runs one job end to end: extract, chunk, deliver.
///
/// Failures are terminal. A failed job gets one best-effort failure report;
/// if that report cannot be delivered either, it is only logged.
pub struct JobRunner {
    extractor: PageExtractor,
    notifier: Arc<dyn Notifier>,
    chunk_limit: usize,
}

impl JobRunner {
    pub fn new(extractor: PageExtractor, notifier: Arc<dyn Notifier>, chunk_limit: usize) -> Self {
        Self {
            extractor,
            notifier,
            chunk_limit: chunk_limit.max(1),
        }
    }

    /// Drive `job` to a terminal state and hand it back.
    pub async fn run(&self, mut job: Job) -> Job {
        if !job.start() {
            warn!("job {} is {:?}, not pending; skipping", job.id, job.state);
            return job;
        }
        let url = job.target_url.to_string();
        info!("▶️ job {} started: {}", job.id, url);

        let result = match self.extractor.extract(&url).await {
            Ok(result) => result,
            Err(e) => return self.fail(job, e).await,
        };

        let chunks = chunk(&result.visible_text, self.chunk_limit);
        let report = JobReport::Success(SuccessReport {
            job_id: job.id.clone(),
            result,
            chunks,
        });

        if let Err(e) = self.notifier.deliver(&report).await {
            return self.fail(job, RelayError::from(e)).await;
        }

        let JobReport::Success(SuccessReport { result, .. }) = report else {
            return job;
        };
        job.succeed(result);
        info!("✅ job {} succeeded in {}ms", job.id, job.elapsed_millis());
        job
    }

    async fn fail(&self, mut job: Job, err: RelayError) -> Job {
        job.fail(err.to_string());
        error!("❌ job {} failed ({}): {}", job.id, err.kind(), err);

        let report = JobReport::Failure(FailureReport {
            job_id: job.id.clone(),
            url: job.target_url.to_string(),
            elapsed_millis: job.elapsed_millis(),
            error_kind: err.kind(),
            error: err.to_string(),
        });
        if let Err(e) = self.notifier.deliver(&report).await {
            error!("job {}: failure report could not be delivered: {}", job.id, e);
        }
        debug_assert_eq!(job.state, JobState::Failed);
        job
    }
}
