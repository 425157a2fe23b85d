// Test code patterns (expected in test files):
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! ChannelGate Access Lifecycle Engine
//!
//! Keeps three loosely-coupled facts consistent under asynchronous,
//! retryable, partially-failing operations: payment-provider state, internal
//! subscription state, and actual Telegram channel membership.
//!
//! ## Components
//!
//! - **Ingestors** (`webhooks`, `stars`): normalize provider events,
//!   deduplicate by (provider, external id), and invoke the state machine
//! - **State machine** (`lifecycle`): decides grants/revokes per channel,
//!   including the grace-period policy for payment retries
//! - **Queue** (`queue`): durable at-least-once job queue with retry,
//!   backoff, and a dead-letter queue with replay
//! - **Executor** (`executor`): performs the Telegram-side invite and
//!   membership work and reconciles storage to match
//! - **Sweeps** (`sweeps`): hourly reconciliation for time-based expiry the
//!   event path cannot deliver

pub mod audit;
pub mod config;
pub mod entitlements;
pub mod error;
pub mod executor;
pub mod lifecycle;
pub mod notify;
pub mod queue;
pub mod stars;
pub mod sweeps;
pub mod telegram;
pub mod webhooks;

#[cfg(test)]
mod edge_case_tests;

// Audit
pub use audit::{ActorType, AuditEntry, AuditLogger};

// Config
pub use config::AccessConfig;

// Entitlements
pub use entitlements::{channel_access_key, EntitlementStore, NewEntitlement};

// Error
pub use error::{AccessError, AccessResult};

// Executor
pub use executor::AccessExecutor;

// Lifecycle
pub use lifecycle::{
    plan_grant, plan_revoke, AccessLifecycle, GrantPlan, GrantSummary, RevokeDecision,
    RevokeOutcome, SubscriptionContext,
};

// Notifications
pub use notify::NotificationService;

// Queue
pub use queue::{
    grant_job_id, revoke_job_id, DeadJob, GrantAccessPayload, JobFailure, JobQueue, QueueJob,
    RevokeAccessPayload, GRANT_QUEUE, REVOKE_QUEUE,
};

// Stars
pub use stars::{
    build_invoice_payload, parse_invoice_payload, stars_amount_for_price, StarsPayment,
    StarsPaymentHandler,
};

// Sweeps
pub use sweeps::{ReconciliationSweeps, SweepStats};

// Telegram
pub use telegram::{TelegramClient, TelegramConfig, TelegramError};

// Webhooks
pub use webhooks::{verify_signature, DomainEffect, NormalizedEvent, StripeWebhookHandler};

use sqlx::PgPool;

/// The assembled access engine: every component explicitly constructed and
/// injected, opened once at startup.
#[derive(Clone)]
pub struct AccessService {
    pub lifecycle: AccessLifecycle,
    pub queue: JobQueue,
    pub executor: AccessExecutor,
    pub webhooks: StripeWebhookHandler,
    pub stars: StarsPaymentHandler,
    pub sweeps: ReconciliationSweeps,
    pub audit: AuditLogger,
    pub notify: NotificationService,
}

impl AccessService {
    /// Create the service from environment variables
    pub fn from_env(pool: PgPool) -> AccessResult<Self> {
        let config = AccessConfig::from_env()?;
        let telegram = TelegramClient::from_env()?;
        let webhook_secret = std::env::var("STRIPE_WEBHOOK_SECRET")
            .map_err(|_| AccessError::Config("STRIPE_WEBHOOK_SECRET not set".to_string()))?;
        Ok(Self::new(pool, config, telegram, webhook_secret))
    }

    /// Create the service with explicit configuration
    pub fn new(
        pool: PgPool,
        config: AccessConfig,
        telegram: TelegramClient,
        stripe_webhook_secret: String,
    ) -> Self {
        let queue = JobQueue::new(pool.clone(), &config);
        let audit = AuditLogger::new(pool.clone());
        let notify = NotificationService::new(telegram.clone());
        let lifecycle = AccessLifecycle::new(
            pool.clone(),
            queue.clone(),
            audit.clone(),
            notify.clone(),
            config.clone(),
        );
        let executor = AccessExecutor::new(
            pool.clone(),
            telegram,
            notify.clone(),
            config.clone(),
        );
        let webhooks =
            StripeWebhookHandler::new(pool.clone(), lifecycle.clone(), stripe_webhook_secret);
        let stars = StarsPaymentHandler::new(pool.clone(), lifecycle.clone(), config.clone());
        let sweeps = ReconciliationSweeps::new(pool, lifecycle.clone(), queue.clone());

        Self {
            lifecycle,
            queue,
            executor,
            webhooks,
            stars,
            sweeps,
            audit,
            notify,
        }
    }
}
