//! Durable job queue for external access side effects
//!
//! Postgres-backed, at-least-once work queue with two logical queues
//! (grant-access, revoke-access), per-job retry with exponential backoff,
//! and a dead-letter table for jobs that exhaust their budget.
//!
//! Job ids are deterministic (`grant:{sub}:{channel}`, `revoke:{sub}:{reason}`)
//! and double as the primary key, so re-enqueuing the same logical operation
//! is an idempotent upsert rather than a duplicate. The id format is an
//! external contract relied on by operator replay tooling.

use serde::{Deserialize, Serialize};
use sqlx::{FromRow, PgPool};
use time::OffsetDateTime;
use uuid::Uuid;

use channelgate_shared::{PaymentProvider, RevokeReason};

use crate::config::AccessConfig;
use crate::error::{AccessError, AccessResult};

/// Queue name for per-channel grant jobs
pub const GRANT_QUEUE: &str = "grant_access";
/// Queue name for per-subscription revoke jobs
pub const REVOKE_QUEUE: &str = "revoke_access";

/// A `processing` claim older than this is considered abandoned (worker
/// crash) and becomes claimable again.
const PROCESSING_TIMEOUT_MINUTES: i32 = 30;

/// Payload of a grant job: one subscription+channel pair
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GrantAccessPayload {
    pub subscription_id: Uuid,
    pub channel_id: Uuid,
    pub customer_id: Uuid,
    pub provider: PaymentProvider,
}

/// Payload of a revoke job: fans out to all channels of the subscription
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RevokeAccessPayload {
    pub subscription_id: Uuid,
    pub reason: RevokeReason,
}

/// Deterministic id for a grant job
pub fn grant_job_id(subscription_id: Uuid, channel_id: Uuid) -> String {
    format!("grant:{}:{}", subscription_id, channel_id)
}

/// Deterministic id for a revoke job
pub fn revoke_job_id(subscription_id: Uuid, reason: RevokeReason) -> String {
    format!("revoke:{}:{}", subscription_id, reason)
}

/// A claimed job as handed to the executor
#[derive(Debug, Clone, FromRow)]
pub struct QueueJob {
    pub id: String,
    pub queue: String,
    pub payload: serde_json::Value,
    pub attempts: i32,
    pub max_attempts: i32,
}

/// A dead-lettered job awaiting manual inspection or replay
#[derive(Debug, Clone, Serialize, FromRow)]
pub struct DeadJob {
    pub id: String,
    pub queue: String,
    pub payload: serde_json::Value,
    pub attempts: i32,
    pub last_error: Option<String>,
    pub failed_at: OffsetDateTime,
}

/// Outcome of reporting a job failure
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobFailure {
    /// Scheduled for another attempt after the given delay (seconds)
    Retried { delay_secs: i64 },
    /// Retry budget exhausted, moved to the dead-letter table
    DeadLettered,
}

/// Durable queue handle. Explicitly constructed and injected; no ambient
/// connection state.
#[derive(Clone)]
pub struct JobQueue {
    pool: PgPool,
    max_attempts: i32,
    backoff_base_secs: i64,
}

impl JobQueue {
    pub fn new(pool: PgPool, config: &AccessConfig) -> Self {
        Self {
            pool,
            max_attempts: config.job_max_attempts,
            backoff_base_secs: config.job_backoff_base_secs,
        }
    }

    /// Enqueue a grant job for one subscription+channel pair
    pub async fn enqueue_grant_access(&self, payload: &GrantAccessPayload) -> AccessResult<String> {
        let id = grant_job_id(payload.subscription_id, payload.channel_id);
        let value = serde_json::to_value(payload)
            .map_err(|e| AccessError::PayloadInvalid(e.to_string()))?;
        self.enqueue(GRANT_QUEUE, &id, value).await?;
        Ok(id)
    }

    /// Enqueue a revoke job for a whole subscription
    pub async fn enqueue_revoke_access(
        &self,
        payload: &RevokeAccessPayload,
    ) -> AccessResult<String> {
        let id = revoke_job_id(payload.subscription_id, payload.reason);
        let value = serde_json::to_value(payload)
            .map_err(|e| AccessError::PayloadInvalid(e.to_string()))?;
        self.enqueue(REVOKE_QUEUE, &id, value).await?;
        Ok(id)
    }

    /// Idempotent upsert by job id. A completed or failed job with the same
    /// id is reset to pending; an in-flight `processing` job is left alone,
    /// which is the dedup the callers rely on.
    async fn enqueue(&self, queue: &str, id: &str, payload: serde_json::Value) -> AccessResult<()> {
        sqlx::query(
            r#"
            INSERT INTO access_jobs (id, queue, payload, status, attempts, max_attempts, next_attempt_at)
            VALUES ($1, $2, $3, 'pending', 0, $4, NOW())
            ON CONFLICT (id) DO UPDATE SET
                payload = EXCLUDED.payload,
                status = 'pending',
                attempts = 0,
                max_attempts = EXCLUDED.max_attempts,
                last_error = NULL,
                next_attempt_at = NOW(),
                completed_at = NULL,
                updated_at = NOW()
            WHERE access_jobs.status <> 'processing'
            "#,
        )
        .bind(id)
        .bind(queue)
        .bind(&payload)
        .bind(self.max_attempts)
        .execute(&self.pool)
        .await?;

        tracing::debug!(job_id = %id, queue = %queue, "Job enqueued");
        Ok(())
    }

    /// Claim up to `limit` due jobs for exclusive processing.
    ///
    /// Uses `FOR UPDATE SKIP LOCKED` so concurrent workers never double-claim.
    /// Stuck `processing` claims past the timeout are reclaimed, covering a
    /// worker crash mid-job.
    pub async fn claim_batch(&self, queue: &str, limit: i64) -> AccessResult<Vec<QueueJob>> {
        let jobs: Vec<QueueJob> = sqlx::query_as(
            r#"
            UPDATE access_jobs
            SET status = 'processing', attempts = attempts + 1,
                claimed_at = NOW(), updated_at = NOW()
            WHERE id IN (
                SELECT id FROM access_jobs
                WHERE queue = $1
                  AND next_attempt_at <= NOW()
                  AND (status IN ('pending', 'failed')
                       OR (status = 'processing'
                           AND claimed_at < NOW() - ($3 || ' minutes')::INTERVAL))
                ORDER BY next_attempt_at ASC
                LIMIT $2
                FOR UPDATE SKIP LOCKED
            )
            RETURNING id, queue, payload, attempts, max_attempts
            "#,
        )
        .bind(queue)
        .bind(limit)
        .bind(PROCESSING_TIMEOUT_MINUTES)
        .fetch_all(&self.pool)
        .await?;

        Ok(jobs)
    }

    /// Mark a job as successfully completed
    pub async fn complete(&self, job_id: &str) -> AccessResult<()> {
        sqlx::query(
            r#"
            UPDATE access_jobs
            SET status = 'completed', completed_at = NOW(), updated_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(job_id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Record a failed attempt: schedule a retry with exponential backoff,
    /// or move the job to the dead-letter table once the budget is spent.
    pub async fn fail(&self, job: &QueueJob, error: &str) -> AccessResult<JobFailure> {
        if job.attempts >= job.max_attempts {
            let mut tx = self.pool.begin().await?;

            sqlx::query(
                r#"
                INSERT INTO access_jobs_dead (id, queue, payload, attempts, last_error)
                VALUES ($1, $2, $3, $4, $5)
                ON CONFLICT (id) DO UPDATE SET
                    payload = EXCLUDED.payload,
                    attempts = EXCLUDED.attempts,
                    last_error = EXCLUDED.last_error,
                    failed_at = NOW()
                "#,
            )
            .bind(&job.id)
            .bind(&job.queue)
            .bind(&job.payload)
            .bind(job.attempts)
            .bind(error)
            .execute(&mut *tx)
            .await?;

            sqlx::query("DELETE FROM access_jobs WHERE id = $1")
                .bind(&job.id)
                .execute(&mut *tx)
                .await?;

            tx.commit().await?;

            tracing::error!(
                job_id = %job.id,
                queue = %job.queue,
                attempts = job.attempts,
                error = %error,
                "Job exhausted retries, moved to dead-letter queue"
            );
            return Ok(JobFailure::DeadLettered);
        }

        let delay_secs = self.backoff_delay_secs(job.attempts);
        sqlx::query(
            r#"
            UPDATE access_jobs
            SET status = 'failed', last_error = $2,
                next_attempt_at = NOW() + ($3 || ' seconds')::INTERVAL,
                updated_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(&job.id)
        .bind(error)
        .bind(delay_secs)
        .execute(&self.pool)
        .await?;

        tracing::warn!(
            job_id = %job.id,
            queue = %job.queue,
            attempts = job.attempts,
            max_attempts = job.max_attempts,
            retry_in_secs = delay_secs,
            error = %error,
            "Job failed, will retry"
        );
        Ok(JobFailure::Retried { delay_secs })
    }

    /// Delay before the attempt after `attempt` failed: base * 2^(attempt-1)
    pub fn backoff_delay_secs(&self, attempt: i32) -> i64 {
        let shift = (attempt - 1).clamp(0, 16) as u32;
        self.backoff_base_secs.saturating_mul(1_i64 << shift)
    }

    /// Replay a dead-lettered grant job onto the primary queue
    pub async fn replay_grant_access(&self, job_id: &str) -> AccessResult<()> {
        self.replay(GRANT_QUEUE, job_id).await
    }

    /// Replay a dead-lettered revoke job onto the primary queue
    pub async fn replay_revoke_access(&self, job_id: &str) -> AccessResult<()> {
        self.replay(REVOKE_QUEUE, job_id).await
    }

    /// Replay: re-validate the payload against the enqueue schema, remove any
    /// live job under the same id (replay wins over a stale in-flight
    /// attempt), re-enqueue pending, and drop the DLQ row, all in one
    /// transaction.
    async fn replay(&self, queue: &str, job_id: &str) -> AccessResult<()> {
        let mut tx = self.pool.begin().await?;

        let dead: Option<DeadJob> = sqlx::query_as(
            r#"
            SELECT id, queue, payload, attempts, last_error, failed_at
            FROM access_jobs_dead
            WHERE id = $1 AND queue = $2
            FOR UPDATE
            "#,
        )
        .bind(job_id)
        .bind(queue)
        .fetch_optional(&mut *tx)
        .await?;

        let dead = dead.ok_or_else(|| {
            AccessError::NotFound(format!("Dead-letter job not found: {}", job_id))
        })?;

        validate_payload(queue, &dead.payload)?;

        sqlx::query("DELETE FROM access_jobs WHERE id = $1")
            .bind(job_id)
            .execute(&mut *tx)
            .await?;

        sqlx::query(
            r#"
            INSERT INTO access_jobs (id, queue, payload, status, attempts, max_attempts, next_attempt_at)
            VALUES ($1, $2, $3, 'pending', 0, $4, NOW())
            "#,
        )
        .bind(&dead.id)
        .bind(&dead.queue)
        .bind(&dead.payload)
        .bind(self.max_attempts)
        .execute(&mut *tx)
        .await?;

        sqlx::query("DELETE FROM access_jobs_dead WHERE id = $1")
            .bind(job_id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;

        tracing::info!(job_id = %job_id, queue = %queue, "Dead-letter job replayed");
        Ok(())
    }

    /// List dead-lettered jobs for operator inspection
    pub async fn dead_letter_jobs(
        &self,
        queue: Option<&str>,
        limit: i64,
    ) -> AccessResult<Vec<DeadJob>> {
        let jobs: Vec<DeadJob> = match queue {
            Some(q) => {
                sqlx::query_as(
                    r#"
                    SELECT id, queue, payload, attempts, last_error, failed_at
                    FROM access_jobs_dead
                    WHERE queue = $1
                    ORDER BY failed_at DESC
                    LIMIT $2
                    "#,
                )
                .bind(q)
                .bind(limit)
                .fetch_all(&self.pool)
                .await?
            }
            None => {
                sqlx::query_as(
                    r#"
                    SELECT id, queue, payload, attempts, last_error, failed_at
                    FROM access_jobs_dead
                    ORDER BY failed_at DESC
                    LIMIT $1
                    "#,
                )
                .bind(limit)
                .fetch_all(&self.pool)
                .await?
            }
        };
        Ok(jobs)
    }

    /// Purge completed jobs older than the retention window (maintenance)
    pub async fn purge_completed(&self, retention_days: i32) -> AccessResult<u64> {
        let result = sqlx::query(
            r#"
            DELETE FROM access_jobs
            WHERE status = 'completed'
              AND completed_at < NOW() - ($1 || ' days')::INTERVAL
            "#,
        )
        .bind(retention_days)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }
}

/// Validate a payload against the schema used for fresh enqueue
fn validate_payload(queue: &str, payload: &serde_json::Value) -> AccessResult<()> {
    match queue {
        GRANT_QUEUE => serde_json::from_value::<GrantAccessPayload>(payload.clone())
            .map(|_| ())
            .map_err(|e| AccessError::PayloadInvalid(format!("grant payload: {}", e))),
        REVOKE_QUEUE => serde_json::from_value::<RevokeAccessPayload>(payload.clone())
            .map(|_| ())
            .map_err(|e| AccessError::PayloadInvalid(format!("revoke payload: {}", e))),
        other => Err(AccessError::PayloadInvalid(format!(
            "unknown queue: {}",
            other
        ))),
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;

    fn queue_with_defaults() -> JobQueue {
        // Pool is lazy: fine for tests that never touch the database
        let pool = PgPool::connect_lazy("postgres://localhost/unused").unwrap();
        JobQueue::new(pool, &AccessConfig::default())
    }

    #[test]
    fn test_job_id_formats_are_stable() {
        let sub = Uuid::parse_str("00000000-0000-0000-0000-000000000001").unwrap();
        let ch = Uuid::parse_str("00000000-0000-0000-0000-000000000002").unwrap();

        assert_eq!(
            grant_job_id(sub, ch),
            "grant:00000000-0000-0000-0000-000000000001:00000000-0000-0000-0000-000000000002"
        );
        assert_eq!(
            revoke_job_id(sub, RevokeReason::PaymentFailed),
            "revoke:00000000-0000-0000-0000-000000000001:payment_failed"
        );
        assert_eq!(
            revoke_job_id(sub, RevokeReason::Canceled),
            "revoke:00000000-0000-0000-0000-000000000001:canceled"
        );
    }

    #[test]
    fn test_backoff_schedule_spans_retry_window() {
        let queue = queue_with_defaults();

        // 5min base, doubling per attempt
        assert_eq!(queue.backoff_delay_secs(1), 300);
        assert_eq!(queue.backoff_delay_secs(2), 600);
        assert_eq!(queue.backoff_delay_secs(3), 1_200);
        assert_eq!(queue.backoff_delay_secs(9), 76_800);

        // Total wait across the default 10-attempt budget lands in the
        // 1.5-2 day window before the DLQ
        let total: i64 = (1..10).map(|a| queue.backoff_delay_secs(a)).sum();
        assert!(total > 36 * 3600, "total backoff {}s too short", total);
        assert!(total < 48 * 3600, "total backoff {}s too long", total);
    }

    #[test]
    fn test_payload_validation_per_queue() {
        let grant = serde_json::json!({
            "subscription_id": Uuid::new_v4(),
            "channel_id": Uuid::new_v4(),
            "customer_id": Uuid::new_v4(),
            "provider": "stripe",
        });
        assert!(validate_payload(GRANT_QUEUE, &grant).is_ok());
        // A grant payload is not a valid revoke payload
        assert!(validate_payload(REVOKE_QUEUE, &grant).is_err());

        let revoke = serde_json::json!({
            "subscription_id": Uuid::new_v4(),
            "reason": "refund",
        });
        assert!(validate_payload(REVOKE_QUEUE, &revoke).is_ok());
        assert!(validate_payload("unknown", &revoke).is_err());
    }

    #[tokio::test]
    #[ignore] // Requires database
    async fn test_enqueue_dedups_by_job_id() {
        let url = std::env::var("DATABASE_URL").expect("DATABASE_URL required");
        let pool = PgPool::connect(&url).await.unwrap();
        let queue = JobQueue::new(pool.clone(), &AccessConfig::default());

        let payload = GrantAccessPayload {
            subscription_id: Uuid::new_v4(),
            channel_id: Uuid::new_v4(),
            customer_id: Uuid::new_v4(),
            provider: PaymentProvider::Stripe,
        };

        let id1 = queue.enqueue_grant_access(&payload).await.unwrap();
        let id2 = queue.enqueue_grant_access(&payload).await.unwrap();
        assert_eq!(id1, id2);

        let count: (i64,) =
            sqlx::query_as("SELECT COUNT(*) FROM access_jobs WHERE id = $1")
                .bind(&id1)
                .fetch_one(&pool)
                .await
                .unwrap();
        assert_eq!(count.0, 1);
    }

    #[tokio::test]
    #[ignore] // Requires database
    async fn test_replay_round_trip() {
        let url = std::env::var("DATABASE_URL").expect("DATABASE_URL required");
        let pool = PgPool::connect(&url).await.unwrap();
        let queue = JobQueue::new(pool.clone(), &AccessConfig::default());

        let payload = GrantAccessPayload {
            subscription_id: Uuid::new_v4(),
            channel_id: Uuid::new_v4(),
            customer_id: Uuid::new_v4(),
            provider: PaymentProvider::Stripe,
        };
        let job_id = grant_job_id(payload.subscription_id, payload.channel_id);

        sqlx::query(
            "INSERT INTO access_jobs_dead (id, queue, payload, attempts, last_error)
             VALUES ($1, $2, $3, 10, 'boom')",
        )
        .bind(&job_id)
        .bind(GRANT_QUEUE)
        .bind(serde_json::to_value(&payload).unwrap())
        .execute(&pool)
        .await
        .unwrap();

        queue.replay_grant_access(&job_id).await.unwrap();

        let live: (String,) =
            sqlx::query_as("SELECT status FROM access_jobs WHERE id = $1")
                .bind(&job_id)
                .fetch_one(&pool)
                .await
                .unwrap();
        assert_eq!(live.0, "pending");

        let dead: Option<(String,)> =
            sqlx::query_as("SELECT id FROM access_jobs_dead WHERE id = $1")
                .bind(&job_id)
                .fetch_optional(&pool)
                .await
                .unwrap();
        assert!(dead.is_none());
    }
}
