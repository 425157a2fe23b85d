//! External access executor
//!
//! Consumes grant/revoke jobs, talks to the Telegram Bot API, and records
//! the outcome transactionally. External calls always happen before the
//! transaction that commits their result, so a transaction never waits on
//! the network.
//!
//! Best-effort sub-steps (revoking an already-dead invite, kicking an
//! absent member, notifications) swallow permanent platform errors;
//! network-class errors re-throw so the queue applies its retry policy.

use sqlx::{FromRow, PgPool};
use time::{Duration, OffsetDateTime};
use uuid::Uuid;

use channelgate_shared::{Customer, InviteStatus, PROVIDER_TELEGRAM};

use crate::config::AccessConfig;
use crate::error::{AccessError, AccessResult};
use crate::notify::NotificationService;
use crate::queue::{GrantAccessPayload, RevokeAccessPayload};
use crate::telegram::{invite_hash, TelegramClient, TelegramError};

/// Swallow permanent platform errors in a best-effort step, re-throwing
/// anything a retry could fix
fn swallow_permanent<T>(
    result: Result<T, TelegramError>,
    context: &str,
) -> AccessResult<Option<T>> {
    match result {
        Ok(value) => Ok(Some(value)),
        Err(e) if e.is_retryable() => Err(AccessError::Telegram(e)),
        Err(e) => {
            tracing::warn!(context = context, error = %e, "Permanent platform error, skipping step");
            Ok(None)
        }
    }
}

#[derive(Debug, FromRow)]
struct GrantTarget {
    access_id: Uuid,
    invite_id: Option<Uuid>,
    channel_id: Uuid,
    provider: String,
    telegram_chat_id: Option<i64>,
    title: String,
    customer_id: Uuid,
    organization_id: Uuid,
    telegram_user_id: Option<i64>,
    email: Option<String>,
}

#[derive(Debug, FromRow)]
struct RevokeTarget {
    access_id: Uuid,
    invite_id: Option<Uuid>,
    channel_id: Uuid,
    provider: String,
    telegram_chat_id: Option<i64>,
    title: String,
    customer_id: Uuid,
    organization_id: Uuid,
    telegram_user_id: Option<i64>,
    email: Option<String>,
    invite_link: Option<String>,
    invite_status: Option<InviteStatus>,
}

/// Executes the platform-side half of grant/revoke jobs
#[derive(Clone)]
pub struct AccessExecutor {
    pool: PgPool,
    telegram: TelegramClient,
    notify: NotificationService,
    config: AccessConfig,
}

impl AccessExecutor {
    pub fn new(
        pool: PgPool,
        telegram: TelegramClient,
        notify: NotificationService,
        config: AccessConfig,
    ) -> Self {
        Self {
            pool,
            telegram,
            notify,
            config,
        }
    }

    /// Issue an invite link for one subscription+channel pair
    pub async fn handle_grant_job(&self, payload: &GrantAccessPayload) -> AccessResult<()> {
        let target: Option<GrantTarget> = sqlx::query_as(
            r#"
            SELECT ca.id AS access_id, ca.invite_id,
                   ch.id AS channel_id, ch.provider, ch.telegram_chat_id, ch.title,
                   cu.id AS customer_id, cu.organization_id, cu.telegram_user_id, cu.email
            FROM channel_access ca
            JOIN channels ch ON ch.id = ca.channel_id
            JOIN customers cu ON cu.id = ca.customer_id
            WHERE ca.subscription_id = $1 AND ca.channel_id = $2
            "#,
        )
        .bind(payload.subscription_id)
        .bind(payload.channel_id)
        .fetch_optional(&self.pool)
        .await?;

        // The domain model may have moved on since the job was queued;
        // nothing to do is success, not an error
        let Some(target) = target else {
            tracing::info!(
                subscription_id = %payload.subscription_id,
                channel_id = %payload.channel_id,
                "Grant job target missing, skipping"
            );
            return Ok(());
        };

        let Some(chat_id) = target
            .telegram_chat_id
            .filter(|_| target.provider == PROVIDER_TELEGRAM)
        else {
            tracing::info!(
                channel_id = %target.channel_id,
                provider = %target.provider,
                "Channel is not an executable Telegram channel, skipping"
            );
            return Ok(());
        };

        // A stale invite for this access is revoked best-effort first; the
        // link is moot either way once we issue a new one
        let prior: Option<(Uuid, String)> = match target.invite_id {
            Some(invite_id) => {
                sqlx::query_as(
                    r#"
                    SELECT id, invite_link FROM telegram_invites
                    WHERE id = $1 AND status = 'active'
                    "#,
                )
                .bind(invite_id)
                .fetch_optional(&self.pool)
                .await?
            }
            None => None,
        };

        if let Some((_, prior_link)) = &prior {
            swallow_permanent(
                self.telegram.revoke_invite_link(chat_id, prior_link).await,
                "revoke stale invite",
            )?;
        }

        let now = OffsetDateTime::now_utc();
        let expires_at = self
            .config
            .invite_ttl_seconds
            .map(|ttl| now + Duration::seconds(ttl));
        let invite = self
            .telegram
            .create_invite_link(
                chat_id,
                expires_at.map(|t| t.unix_timestamp()),
                self.config.invite_max_uses,
            )
            .await
            .map_err(AccessError::Telegram)?;

        let mut tx = self.pool.begin().await?;

        if let Some((prior_id, _)) = &prior {
            sqlx::query(
                r#"
                UPDATE telegram_invites
                SET status = 'expired', revoked_reason = 'superseded'
                WHERE id = $1 AND status = 'active'
                "#,
            )
            .bind(prior_id)
            .execute(&mut *tx)
            .await?;
        }

        let invite_id: (Uuid,) = sqlx::query_as(
            r#"
            INSERT INTO telegram_invites (
                channel_id, invite_link, invite_hash, status, expires_at, max_uses
            )
            VALUES ($1, $2, $3, 'active', $4, $5)
            RETURNING id
            "#,
        )
        .bind(target.channel_id)
        .bind(&invite.invite_link)
        .bind(invite_hash(&invite.invite_link))
        .bind(expires_at)
        .bind(self.config.invite_max_uses)
        .fetch_one(&mut *tx)
        .await?;

        sqlx::query(
            r#"
            UPDATE channel_access
            SET status = 'granted', granted_at = NOW(), invite_id = $2,
                revoked_at = NULL, revoke_reason = NULL, updated_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(target.access_id)
        .bind(invite_id.0)
        .execute(&mut *tx)
        .await?;

        sqlx::query("UPDATE channels SET invite_link = $2 WHERE id = $1")
            .bind(target.channel_id)
            .bind(&invite.invite_link)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;

        let customer = Customer {
            id: target.customer_id,
            organization_id: target.organization_id,
            telegram_user_id: target.telegram_user_id,
            email: target.email.clone(),
        };
        let _ = self
            .notify
            .send_payment_confirmation(&customer, &target.title, &invite.invite_link)
            .await;

        tracing::info!(
            subscription_id = %payload.subscription_id,
            channel_id = %target.channel_id,
            access_id = %target.access_id,
            "Access granted"
        );
        Ok(())
    }

    /// Tear down access for every channel of a subscription. One job fans
    /// out across all rows; a hard error aborts the whole job and the queue
    /// retries it in full, which is safe because every step is an
    /// idempotent re-check.
    pub async fn handle_revoke_job(&self, payload: &RevokeAccessPayload) -> AccessResult<()> {
        let targets: Vec<RevokeTarget> = sqlx::query_as(
            r#"
            SELECT ca.id AS access_id, ca.invite_id,
                   ch.id AS channel_id, ch.provider, ch.telegram_chat_id, ch.title,
                   cu.id AS customer_id, cu.organization_id, cu.telegram_user_id, cu.email,
                   inv.invite_link, inv.status AS invite_status
            FROM channel_access ca
            JOIN channels ch ON ch.id = ca.channel_id
            JOIN customers cu ON cu.id = ca.customer_id
            LEFT JOIN telegram_invites inv ON inv.id = ca.invite_id
            WHERE ca.subscription_id = $1
            "#,
        )
        .bind(payload.subscription_id)
        .fetch_all(&self.pool)
        .await?;

        if targets.is_empty() {
            tracing::info!(
                subscription_id = %payload.subscription_id,
                "Revoke job found no access rows, skipping"
            );
            return Ok(());
        }

        for target in &targets {
            let Some(chat_id) = target
                .telegram_chat_id
                .filter(|_| target.provider == PROVIDER_TELEGRAM)
            else {
                tracing::debug!(
                    channel_id = %target.channel_id,
                    provider = %target.provider,
                    "Skipping non-Telegram channel in revoke fan-out"
                );
                continue;
            };

            if target.invite_status == Some(InviteStatus::Active) {
                if let Some(link) = &target.invite_link {
                    swallow_permanent(
                        self.telegram.revoke_invite_link(chat_id, link).await,
                        "revoke invite",
                    )?;
                }
            }

            // Ban then immediately unban: removes the member without
            // blocking a future rejoin
            if let Some(user_id) = target.telegram_user_id {
                let banned = swallow_permanent(
                    self.telegram.ban_chat_member(chat_id, user_id).await,
                    "ban member",
                )?;
                if banned.is_some() {
                    swallow_permanent(
                        self.telegram.unban_chat_member(chat_id, user_id).await,
                        "unban member",
                    )?;
                }
            }

            let customer = Customer {
                id: target.customer_id,
                organization_id: target.organization_id,
                telegram_user_id: target.telegram_user_id,
                email: target.email.clone(),
            };
            let _ = self
                .notify
                .send_access_revoked(&customer, &target.title, payload.reason)
                .await;

            let mut tx = self.pool.begin().await?;

            sqlx::query(
                r#"
                UPDATE channel_access
                SET status = 'revoked', revoked_at = COALESCE(revoked_at, NOW()),
                    revoke_reason = COALESCE(revoke_reason, $2), updated_at = NOW()
                WHERE id = $1
                "#,
            )
            .bind(target.access_id)
            .bind(payload.reason)
            .execute(&mut *tx)
            .await?;

            if let Some(invite_id) = target.invite_id {
                sqlx::query(
                    r#"
                    UPDATE telegram_invites
                    SET status = 'revoked', revoked_at = COALESCE(revoked_at, NOW()),
                        revoked_reason = $2
                    WHERE id = $1 AND status <> 'revoked'
                    "#,
                )
                .bind(invite_id)
                .bind(payload.reason.as_str())
                .execute(&mut *tx)
                .await?;
            }

            sqlx::query("UPDATE channels SET invite_link = NULL WHERE id = $1")
                .bind(target.channel_id)
                .execute(&mut *tx)
                .await?;

            tx.commit().await?;
        }

        tracing::info!(
            subscription_id = %payload.subscription_id,
            reason = %payload.reason,
            channels = targets.len(),
            "Access revoked on platform"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;

    #[test]
    fn test_swallow_permanent_passes_success() {
        let result: Result<u8, TelegramError> = Ok(7);
        assert_eq!(swallow_permanent(result, "test").unwrap(), Some(7));
    }

    #[test]
    fn test_swallow_permanent_swallows_permission_errors() {
        let result: Result<(), TelegramError> = Err(TelegramError::Api {
            code: 403,
            description: "CHAT_ADMIN_REQUIRED".to_string(),
        });
        assert_eq!(swallow_permanent(result, "test").unwrap(), None);
    }

    #[test]
    fn test_swallow_permanent_rethrows_transient_errors() {
        let network: Result<(), TelegramError> =
            Err(TelegramError::Network("timeout".to_string()));
        assert!(matches!(
            swallow_permanent(network, "test"),
            Err(AccessError::Telegram(_))
        ));

        let rate_limited: Result<(), TelegramError> = Err(TelegramError::Api {
            code: 429,
            description: "Too Many Requests".to_string(),
        });
        assert!(matches!(
            swallow_permanent(rate_limited, "test"),
            Err(AccessError::Telegram(_))
        ));
    }
}
