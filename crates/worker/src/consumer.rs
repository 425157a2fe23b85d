//! Queue consumers
//!
//! Long-lived poll loops pulling grant/revoke jobs from the durable queue
//! under a bounded concurrency budget. A slow invite-creation call for one
//! subscription never blocks the others up to the concurrency limit.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Semaphore;

use channelgate_access::{
    AccessError, AccessExecutor, AccessResult, GrantAccessPayload, JobFailure, JobQueue, QueueJob,
    RevokeAccessPayload, GRANT_QUEUE, REVOKE_QUEUE,
};

/// Idle delay between polls when the queue is drained or saturated
const POLL_INTERVAL: Duration = Duration::from_secs(5);

/// Pull jobs from one queue forever, spawning each onto its own task
pub async fn run_consumer(
    queue: JobQueue,
    executor: AccessExecutor,
    queue_name: &'static str,
    concurrency: usize,
) {
    let semaphore = Arc::new(Semaphore::new(concurrency));
    tracing::info!(
        queue = queue_name,
        concurrency = concurrency,
        "Queue consumer started"
    );

    loop {
        let available = semaphore.available_permits();
        if available == 0 {
            tokio::time::sleep(POLL_INTERVAL).await;
            continue;
        }

        let jobs = match queue.claim_batch(queue_name, available as i64).await {
            Ok(jobs) => jobs,
            Err(e) => {
                tracing::error!(queue = queue_name, error = %e, "Failed to claim jobs");
                tokio::time::sleep(POLL_INTERVAL).await;
                continue;
            }
        };

        if jobs.is_empty() {
            tokio::time::sleep(POLL_INTERVAL).await;
            continue;
        }

        for job in jobs {
            let permit = match semaphore.clone().acquire_owned().await {
                Ok(permit) => permit,
                // Semaphore closed: shutting down
                Err(_) => return,
            };
            let queue = queue.clone();
            let executor = executor.clone();
            tokio::spawn(async move {
                let _permit = permit;
                process_job(&queue, &executor, &job).await;
            });
        }
    }
}

async fn process_job(queue: &JobQueue, executor: &AccessExecutor, job: &QueueJob) {
    match dispatch(executor, job).await {
        Ok(()) => {
            if let Err(e) = queue.complete(&job.id).await {
                tracing::error!(job_id = %job.id, error = %e, "Failed to mark job completed");
            } else {
                tracing::info!(job_id = %job.id, queue = %job.queue, "Job completed");
            }
        }
        Err(e) => {
            match queue.fail(job, &e.to_string()).await {
                Ok(JobFailure::Retried { delay_secs }) => {
                    tracing::warn!(
                        job_id = %job.id,
                        attempts = job.attempts,
                        retry_in_secs = delay_secs,
                        error = %e,
                        "Job failed, retry scheduled"
                    );
                }
                Ok(JobFailure::DeadLettered) => {
                    tracing::error!(
                        job_id = %job.id,
                        attempts = job.attempts,
                        error = %e,
                        "Job dead-lettered"
                    );
                }
                Err(fail_err) => {
                    // The stuck-claim timeout will make the job claimable again
                    tracing::error!(
                        job_id = %job.id,
                        error = %fail_err,
                        original_error = %e,
                        "Failed to record job failure"
                    );
                }
            }
        }
    }
}

async fn dispatch(executor: &AccessExecutor, job: &QueueJob) -> AccessResult<()> {
    match job.queue.as_str() {
        GRANT_QUEUE => {
            let payload: GrantAccessPayload = serde_json::from_value(job.payload.clone())
                .map_err(|e| AccessError::PayloadInvalid(format!("grant payload: {}", e)))?;
            executor.handle_grant_job(&payload).await
        }
        REVOKE_QUEUE => {
            let payload: RevokeAccessPayload = serde_json::from_value(job.payload.clone())
                .map_err(|e| AccessError::PayloadInvalid(format!("revoke payload: {}", e)))?;
            executor.handle_revoke_job(&payload).await
        }
        other => {
            tracing::warn!(job_id = %job.id, queue = %other, "Unknown queue name, dropping job");
            Ok(())
        }
    }
}
