//! Access state machine
//!
//! Decides, from a subscription + its plan + its channel links + existing
//! access rows, which rows must be created, transitioned, or revoked, and
//! which external jobs realize the decision.
//!
//! The machine is split into a pure decide phase (`plan_grant`,
//! `plan_revoke`) returning a value describing the transitions, and an apply
//! phase that executes the storage transaction, then enqueues jobs, then
//! fires notifications, each independently fault-isolated. The transaction
//! never contains external I/O.

use sqlx::PgPool;
use time::{Duration, OffsetDateTime};
use uuid::Uuid;

use channelgate_shared::{
    Channel, ChannelAccess, ChannelAccessStatus, Customer, EntitlementType, PaymentProvider, Plan,
    RevokeReason, Subscription, SubscriptionStatus,
};

use crate::audit::{AuditEntry, AuditLogger};
use crate::config::AccessConfig;
use crate::entitlements::{self, channel_access_key, NewEntitlement};
use crate::error::{AccessError, AccessResult};
use crate::notify::NotificationService;
use crate::queue::{GrantAccessPayload, JobQueue, RevokeAccessPayload};

// =============================================================================
// Decide phase
// =============================================================================

/// Planned transitions for one payment-success signal
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GrantPlan {
    /// Access ids mid-grace to flip back to granted in place; the invite was
    /// never torn down, so no external job is needed
    pub reinstate: Vec<Uuid>,
    /// Channels to upsert to pending, each backed by one grant job
    pub upsert_channels: Vec<Uuid>,
    /// Entitlements to create for first-time access rows
    pub entitlements: Vec<NewEntitlement>,
    /// Channels already granted, left untouched
    pub already_granted: usize,
}

impl GrantPlan {
    pub fn is_noop(&self) -> bool {
        self.reinstate.is_empty() && self.upsert_channels.is_empty()
    }
}

/// Decide what a payment success means for every channel linked to the plan
pub fn plan_grant(
    subscription: &Subscription,
    plan: &Plan,
    channel_ids: &[Uuid],
    existing: &[ChannelAccess],
    now: OffsetDateTime,
) -> GrantPlan {
    let mut out = GrantPlan::default();

    for &channel_id in channel_ids {
        let current = existing.iter().find(|a| a.channel_id == channel_id);

        match current.map(|a| a.status) {
            // Replayed event on healthy access
            Some(ChannelAccessStatus::Granted) => out.already_granted += 1,
            // Payment recovered inside the grace window
            Some(ChannelAccessStatus::RevokePending) => {
                if let Some(access) = current {
                    out.reinstate.push(access.id);
                }
            }
            // No row, or pending, or fully revoked: (re)issue access
            Some(ChannelAccessStatus::Pending)
            | Some(ChannelAccessStatus::Revoked)
            | None => {
                out.upsert_channels.push(channel_id);
                if current.is_none() {
                    out.entitlements.push(NewEntitlement {
                        subscription_id: subscription.id,
                        customer_id: subscription.customer_id,
                        entitlement_key: channel_access_key(channel_id),
                        entitlement_type: EntitlementType::ChannelAccess,
                        resource_id: Some(channel_id),
                        expires_at: plan
                            .access_duration_days
                            .map(|days| now + Duration::days(days as i64)),
                    });
                }
            }
        }
    }

    out
}

/// Planned outcome of a revoke signal
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RevokeDecision {
    /// An unexpired grace window is already open; repeated failure
    /// notifications are a no-op
    AlreadyInGrace,
    /// First payment failure: demote rows, stamp the window, touch nothing
    /// external
    EnterGrace {
        grace_until: OffsetDateTime,
        access_ids: Vec<Uuid>,
    },
    /// Tear access down for real
    FullRevoke { access_ids: Vec<Uuid> },
}

/// Decide how a revoke signal applies, honoring the grace policy
pub fn plan_revoke(
    subscription: &Subscription,
    existing: &[ChannelAccess],
    reason: RevokeReason,
    grace_period_days: i64,
    now: OffsetDateTime,
) -> RevokeDecision {
    if reason == RevokeReason::PaymentFailed {
        match subscription.grace_until {
            // Window still open: idempotent re-entry
            Some(grace_until) if grace_until > now => return RevokeDecision::AlreadyInGrace,
            // Window lapsed: fall through to the full revoke below
            Some(_) => {}
            // Open a fresh window; external state stays untouched
            None => {
                let access_ids = existing
                    .iter()
                    .filter(|a| {
                        matches!(
                            a.status,
                            ChannelAccessStatus::Pending | ChannelAccessStatus::Granted
                        )
                    })
                    .map(|a| a.id)
                    .collect();
                return RevokeDecision::EnterGrace {
                    grace_until: now + Duration::days(grace_period_days),
                    access_ids,
                };
            }
        }
    }

    let access_ids = existing
        .iter()
        .filter(|a| {
            matches!(
                a.status,
                ChannelAccessStatus::Pending
                    | ChannelAccessStatus::Granted
                    | ChannelAccessStatus::RevokePending
            )
        })
        .map(|a| a.id)
        .collect();
    RevokeDecision::FullRevoke { access_ids }
}

/// Terminal subscription status stamped by the revoke path itself.
///
/// Event-driven reasons (canceled, refund) get their status from the event
/// ingestor; the time-driven ones have no triggering event, so the state
/// machine stamps them here.
pub fn terminal_status_for(reason: RevokeReason) -> Option<SubscriptionStatus> {
    match reason {
        RevokeReason::Expired => Some(SubscriptionStatus::Expired),
        RevokeReason::PaymentFailed => Some(SubscriptionStatus::Canceled),
        RevokeReason::Canceled | RevokeReason::Refund => None,
    }
}

// =============================================================================
// Apply phase
// =============================================================================

/// Result of a grant invocation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GrantSummary {
    pub channels: usize,
    pub reinstated: usize,
    pub jobs_enqueued: usize,
    pub already_granted: usize,
}

/// Result of a revoke invocation
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RevokeOutcome {
    /// Grace window already open, nothing changed
    NoOp,
    GraceEntered { grace_until: OffsetDateTime },
    Revoked { channels: usize, job_enqueued: bool },
}

/// Everything the state machine needs to know about one subscription
#[derive(Debug, Clone)]
pub struct SubscriptionContext {
    pub subscription: Subscription,
    pub plan: Plan,
    pub customer: Customer,
    pub channels: Vec<Channel>,
    pub accesses: Vec<ChannelAccess>,
}

/// The access state machine. Owned component with its collaborators
/// injected; no ambient singletons.
#[derive(Clone)]
pub struct AccessLifecycle {
    pool: PgPool,
    queue: JobQueue,
    audit: AuditLogger,
    notify: NotificationService,
    config: AccessConfig,
}

impl AccessLifecycle {
    pub fn new(
        pool: PgPool,
        queue: JobQueue,
        audit: AuditLogger,
        notify: NotificationService,
        config: AccessConfig,
    ) -> Self {
        Self {
            pool,
            queue,
            audit,
            notify,
            config,
        }
    }

    /// Load the subscription with its plan, customer, linked channels, and
    /// existing access rows
    pub async fn load_context(&self, subscription_id: Uuid) -> AccessResult<SubscriptionContext> {
        let subscription: Option<Subscription> = sqlx::query_as(
            r#"
            SELECT id, organization_id, customer_id, plan_id, status, external_id,
                   current_period_start, current_period_end, started_at, canceled_at,
                   ended_at, grace_until, last_payment_failed_at, metadata
            FROM subscriptions
            WHERE id = $1
            "#,
        )
        .bind(subscription_id)
        .fetch_optional(&self.pool)
        .await?;

        let subscription = subscription
            .ok_or_else(|| AccessError::SubscriptionNotFound(subscription_id.to_string()))?;

        let plan: Plan = sqlx::query_as(
            r#"
            SELECT id, organization_id, name, price_cents, currency, kind, access_duration_days
            FROM plans
            WHERE id = $1
            "#,
        )
        .bind(subscription.plan_id)
        .fetch_one(&self.pool)
        .await?;

        let customer: Customer = sqlx::query_as(
            r#"
            SELECT id, organization_id, telegram_user_id, email
            FROM customers
            WHERE id = $1
            "#,
        )
        .bind(subscription.customer_id)
        .fetch_one(&self.pool)
        .await?;

        let channels: Vec<Channel> = sqlx::query_as(
            r#"
            SELECT c.id, c.organization_id, c.provider, c.telegram_chat_id, c.title, c.invite_link
            FROM channels c
            JOIN plan_channels pc ON pc.channel_id = c.id
            WHERE pc.plan_id = $1
            "#,
        )
        .bind(subscription.plan_id)
        .fetch_all(&self.pool)
        .await?;

        let accesses: Vec<ChannelAccess> = sqlx::query_as(
            r#"
            SELECT id, subscription_id, channel_id, customer_id, status, granted_at,
                   revoked_at, revoke_reason, invite_id, created_at, updated_at
            FROM channel_access
            WHERE subscription_id = $1
            "#,
        )
        .bind(subscription_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(SubscriptionContext {
            subscription,
            plan,
            customer,
            channels,
            accesses,
        })
    }

    /// Payment succeeded: make every linked channel converge on granted
    /// access, queuing the external work that realizes it.
    pub async fn handle_payment_success(
        &self,
        subscription_id: Uuid,
        provider: PaymentProvider,
    ) -> AccessResult<GrantSummary> {
        let ctx = self.load_context(subscription_id).await?;
        let now = OffsetDateTime::now_utc();
        let channel_ids: Vec<Uuid> = ctx.channels.iter().map(|c| c.id).collect();
        let plan = plan_grant(&ctx.subscription, &ctx.plan, &channel_ids, &ctx.accesses, now);

        let mut tx = self.pool.begin().await?;

        if !plan.reinstate.is_empty() {
            sqlx::query(
                r#"
                UPDATE channel_access
                SET status = 'granted', revoked_at = NULL, revoke_reason = NULL,
                    updated_at = NOW()
                WHERE id = ANY($1) AND status = 'revoke_pending'
                "#,
            )
            .bind(&plan.reinstate)
            .execute(&mut *tx)
            .await?;
        }

        for &channel_id in &plan.upsert_channels {
            sqlx::query(
                r#"
                INSERT INTO channel_access (subscription_id, channel_id, customer_id, status)
                VALUES ($1, $2, $3, 'pending')
                ON CONFLICT (subscription_id, channel_id) DO UPDATE SET
                    status = 'pending', revoked_at = NULL, revoke_reason = NULL,
                    updated_at = NOW()
                "#,
            )
            .bind(subscription_id)
            .bind(channel_id)
            .bind(ctx.subscription.customer_id)
            .execute(&mut *tx)
            .await?;
        }

        for ent in &plan.entitlements {
            entitlements::create_in_tx(&mut *tx, ent).await?;
        }

        // Recovery closes any open grace window
        sqlx::query(
            r#"
            UPDATE subscriptions
            SET grace_until = NULL, updated_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(subscription_id)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;

        // Jobs are enqueued after commit; a failed enqueue is logged, not
        // fatal; the gap is caught by reconciliation or manual replay
        let mut jobs_enqueued = 0;
        for &channel_id in &plan.upsert_channels {
            let payload = GrantAccessPayload {
                subscription_id,
                channel_id,
                customer_id: ctx.subscription.customer_id,
                provider,
            };
            match self.queue.enqueue_grant_access(&payload).await {
                Ok(_) => jobs_enqueued += 1,
                Err(e) => {
                    tracing::error!(
                        subscription_id = %subscription_id,
                        channel_id = %channel_id,
                        error = %e,
                        "Failed to enqueue grant job"
                    );
                }
            }
        }

        let summary = GrantSummary {
            channels: channel_ids.len(),
            reinstated: plan.reinstate.len(),
            jobs_enqueued,
            already_granted: plan.already_granted,
        };

        self.audit
            .record_best_effort(
                AuditEntry::new(ctx.subscription.organization_id, "access.grant")
                    .resource("subscription", subscription_id.to_string())
                    .metadata(serde_json::json!({
                        "provider": provider,
                        "channels": summary.channels,
                        "jobs_enqueued": summary.jobs_enqueued,
                        "reinstated": summary.reinstated,
                    })),
            )
            .await;

        tracing::info!(
            subscription_id = %subscription_id,
            channels = summary.channels,
            jobs_enqueued = summary.jobs_enqueued,
            reinstated = summary.reinstated,
            "Payment success applied"
        );

        Ok(summary)
    }

    /// Payment failed, subscription canceled, refund issued, or access
    /// expired: demote or tear down access, honoring the grace policy for
    /// recoverable failures.
    pub async fn handle_payment_failure(
        &self,
        subscription_id: Uuid,
        reason: RevokeReason,
    ) -> AccessResult<RevokeOutcome> {
        let ctx = self.load_context(subscription_id).await?;
        let now = OffsetDateTime::now_utc();
        let decision = plan_revoke(
            &ctx.subscription,
            &ctx.accesses,
            reason,
            self.config.grace_period_days,
            now,
        );

        match decision {
            RevokeDecision::AlreadyInGrace => {
                tracing::info!(
                    subscription_id = %subscription_id,
                    grace_until = ?ctx.subscription.grace_until,
                    "Payment failure inside open grace window, no-op"
                );
                Ok(RevokeOutcome::NoOp)
            }
            RevokeDecision::EnterGrace {
                grace_until,
                access_ids,
            } => {
                self.enter_grace(&ctx, grace_until, &access_ids).await?;
                Ok(RevokeOutcome::GraceEntered { grace_until })
            }
            RevokeDecision::FullRevoke { access_ids } => {
                let outcome = self.full_revoke(&ctx, reason, &access_ids).await?;
                Ok(outcome)
            }
        }
    }

    async fn enter_grace(
        &self,
        ctx: &SubscriptionContext,
        grace_until: OffsetDateTime,
        access_ids: &[Uuid],
    ) -> AccessResult<()> {
        let subscription_id = ctx.subscription.id;

        let mut tx = self.pool.begin().await?;

        if !access_ids.is_empty() {
            sqlx::query(
                r#"
                UPDATE channel_access
                SET status = 'revoke_pending', updated_at = NOW()
                WHERE id = ANY($1) AND status IN ('pending', 'granted')
                "#,
            )
            .bind(access_ids)
            .execute(&mut *tx)
            .await?;
        }

        sqlx::query(
            r#"
            UPDATE subscriptions
            SET grace_until = $2, last_payment_failed_at = NOW(), updated_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(subscription_id)
        .bind(grace_until)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;

        self.audit
            .record_best_effort(
                AuditEntry::new(ctx.subscription.organization_id, "access.grace_entered")
                    .resource("subscription", subscription_id.to_string())
                    .metadata(serde_json::json!({
                        "grace_until": grace_until.unix_timestamp(),
                        "channels": access_ids.len(),
                    })),
            )
            .await;

        // One customer-visible notice per grace entry; failure never blocks
        // the transition
        if let Err(e) = self
            .notify
            .send_payment_failed(&ctx.customer, grace_until)
            .await
        {
            tracing::warn!(
                subscription_id = %subscription_id,
                error = %e,
                "Payment-failed notification error"
            );
        }

        tracing::info!(
            subscription_id = %subscription_id,
            grace_until = %grace_until,
            channels = access_ids.len(),
            "Entered grace period"
        );
        Ok(())
    }

    async fn full_revoke(
        &self,
        ctx: &SubscriptionContext,
        reason: RevokeReason,
        access_ids: &[Uuid],
    ) -> AccessResult<RevokeOutcome> {
        let subscription_id = ctx.subscription.id;

        let mut tx = self.pool.begin().await?;

        if !access_ids.is_empty() {
            sqlx::query(
                r#"
                UPDATE channel_access
                SET status = 'revoked', revoked_at = NOW(), revoke_reason = $2,
                    updated_at = NOW()
                WHERE id = ANY($1) AND status IN ('pending', 'granted', 'revoke_pending')
                "#,
            )
            .bind(access_ids)
            .bind(reason)
            .execute(&mut *tx)
            .await?;
        }

        entitlements::revoke_all_in_tx(&mut *tx, subscription_id, reason).await?;

        match terminal_status_for(reason) {
            Some(status) => {
                sqlx::query(
                    r#"
                    UPDATE subscriptions
                    SET grace_until = NULL, status = $2,
                        ended_at = COALESCE(ended_at, NOW()), updated_at = NOW()
                    WHERE id = $1
                    "#,
                )
                .bind(subscription_id)
                .bind(status)
                .execute(&mut *tx)
                .await?;
            }
            None => {
                sqlx::query(
                    r#"
                    UPDATE subscriptions
                    SET grace_until = NULL, updated_at = NOW()
                    WHERE id = $1
                    "#,
                )
                .bind(subscription_id)
                .execute(&mut *tx)
                .await?;
            }
        }

        tx.commit().await?;

        // Exactly one revoke job per subscription; the executor fans out to
        // every channel. Enqueue failure is logged, not fatal.
        let payload = RevokeAccessPayload {
            subscription_id,
            reason,
        };
        let job_enqueued = match self.queue.enqueue_revoke_access(&payload).await {
            Ok(_) => true,
            Err(e) => {
                tracing::error!(
                    subscription_id = %subscription_id,
                    reason = %reason,
                    error = %e,
                    "Failed to enqueue revoke job"
                );
                false
            }
        };

        self.audit
            .record_best_effort(
                AuditEntry::new(ctx.subscription.organization_id, "access.revoke")
                    .resource("subscription", subscription_id.to_string())
                    .metadata(serde_json::json!({
                        "reason": reason,
                        "channels": access_ids.len(),
                        "job_enqueued": job_enqueued,
                    })),
            )
            .await;

        tracing::info!(
            subscription_id = %subscription_id,
            reason = %reason,
            channels = access_ids.len(),
            job_enqueued = job_enqueued,
            "Access revoked"
        );

        Ok(RevokeOutcome::Revoked {
            channels: access_ids.len(),
            job_enqueued,
        })
    }
}
