//! Scheduled reconciliation sweeps
//!
//! Safety net for access that should have ended but was never driven there
//! by an event: missed webhooks, crashed workers, and time-based expiry with
//! no triggering event at all. Sweeps are read-then-act and tolerate rows
//! that already moved on between the two phases, because the state machine
//! is idempotent for a given target state.

use sqlx::PgPool;
use uuid::Uuid;

use channelgate_shared::RevokeReason;

use crate::entitlements::EntitlementStore;
use crate::error::AccessResult;
use crate::lifecycle::AccessLifecycle;
use crate::queue::JobQueue;

/// Per-sweep batch cap; anything beyond it is picked up next cycle
const SWEEP_BATCH_LIMIT: i64 = 500;

/// Outcome counters for one sweep run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepStats {
    pub scanned: usize,
    pub affected: usize,
    pub errors: usize,
}

/// The scheduled reconciliation sweeps
#[derive(Clone)]
pub struct ReconciliationSweeps {
    pool: PgPool,
    lifecycle: AccessLifecycle,
    entitlements: EntitlementStore,
    queue: JobQueue,
}

impl ReconciliationSweeps {
    pub fn new(pool: PgPool, lifecycle: AccessLifecycle, queue: JobQueue) -> Self {
        Self {
            entitlements: EntitlementStore::new(pool.clone()),
            pool,
            lifecycle,
            queue,
        }
    }

    /// Revoke entitlements whose expiry passed. Rows are independent: one
    /// failure is counted and logged, never fatal to the sweep.
    pub async fn expire_entitlements(&self) -> AccessResult<SweepStats> {
        let due = self.entitlements.due_for_expiry(SWEEP_BATCH_LIMIT).await?;
        let mut stats = SweepStats {
            scanned: due.len(),
            ..SweepStats::default()
        };

        for entitlement_id in due {
            match self.entitlements.expire_one(entitlement_id).await {
                Ok(true) => stats.affected += 1,
                // Already revoked by the time we acted
                Ok(false) => {}
                Err(e) => {
                    stats.errors += 1;
                    tracing::error!(
                        entitlement_id = %entitlement_id,
                        error = %e,
                        "Failed to expire entitlement"
                    );
                }
            }
        }

        tracing::info!(
            scanned = stats.scanned,
            affected = stats.affected,
            errors = stats.errors,
            "Expired-entitlements sweep complete"
        );
        Ok(stats)
    }

    /// Revoke granted channel access whose subscription has run out: a
    /// lapsed period on a terminal subscription, or a one-time plan whose
    /// fixed duration has passed. Grouped by subscription, driven through
    /// the ordinary revoke path.
    pub async fn expire_channel_access(&self) -> AccessResult<SweepStats> {
        let subscription_ids: Vec<(Uuid,)> = sqlx::query_as(
            r#"
            SELECT DISTINCT ca.subscription_id
            FROM channel_access ca
            JOIN subscriptions s ON s.id = ca.subscription_id
            JOIN plans p ON p.id = s.plan_id
            WHERE ca.status = 'granted'
              AND (
                (s.current_period_end < NOW() AND s.status IN ('canceled', 'expired'))
                OR (p.kind = 'one_time'
                    AND p.access_duration_days IS NOT NULL
                    AND s.started_at IS NOT NULL
                    AND s.started_at + (p.access_duration_days || ' days')::INTERVAL < NOW())
              )
            LIMIT $1
            "#,
        )
        .bind(SWEEP_BATCH_LIMIT)
        .fetch_all(&self.pool)
        .await?;

        let mut stats = SweepStats {
            scanned: subscription_ids.len(),
            ..SweepStats::default()
        };

        for (subscription_id,) in subscription_ids {
            match self
                .lifecycle
                .handle_payment_failure(subscription_id, RevokeReason::Expired)
                .await
            {
                Ok(_) => stats.affected += 1,
                Err(e) => {
                    stats.errors += 1;
                    tracing::error!(
                        subscription_id = %subscription_id,
                        error = %e,
                        "Failed to expire channel access"
                    );
                }
            }
        }

        tracing::info!(
            scanned = stats.scanned,
            affected = stats.affected,
            errors = stats.errors,
            "Expired-channel-access sweep complete"
        );
        Ok(stats)
    }

    /// Drive subscriptions whose grace window lapsed through the full revoke
    /// transition the event path never delivered.
    pub async fn expire_grace_periods(&self) -> AccessResult<SweepStats> {
        let subscription_ids: Vec<(Uuid,)> = sqlx::query_as(
            r#"
            SELECT id FROM subscriptions
            WHERE grace_until IS NOT NULL AND grace_until <= NOW()
            ORDER BY grace_until ASC
            LIMIT $1
            "#,
        )
        .bind(SWEEP_BATCH_LIMIT)
        .fetch_all(&self.pool)
        .await?;

        let mut stats = SweepStats {
            scanned: subscription_ids.len(),
            ..SweepStats::default()
        };

        for (subscription_id,) in subscription_ids {
            // Re-enters the revoke path; the lapsed window falls through to
            // the full revoke and clears grace_until
            match self
                .lifecycle
                .handle_payment_failure(subscription_id, RevokeReason::PaymentFailed)
                .await
            {
                Ok(_) => stats.affected += 1,
                Err(e) => {
                    stats.errors += 1;
                    tracing::error!(
                        subscription_id = %subscription_id,
                        error = %e,
                        "Failed to expire grace period"
                    );
                }
            }
        }

        tracing::info!(
            scanned = stats.scanned,
            affected = stats.affected,
            errors = stats.errors,
            "Grace-expiry sweep complete"
        );
        Ok(stats)
    }

    /// Maintenance: purge completed queue jobs past the retention window
    pub async fn purge_completed_jobs(&self, retention_days: i32) -> AccessResult<u64> {
        let purged = self.queue.purge_completed(retention_days).await?;
        if purged > 0 {
            tracing::info!(purged = purged, retention_days = retention_days, "Purged completed jobs");
        }
        Ok(purged)
    }
}
