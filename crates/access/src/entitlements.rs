//! Entitlement bookkeeping
//!
//! Platform-agnostic access-grant records keyed by (subscription, key),
//! used for time-based expiry independent of the Telegram-specific rows.
//! Creation and revocation run inside the caller's transaction so a grant
//! or revoke is all-or-nothing; the expiry sweep works row-by-row on the
//! pool because one bad row must not block the rest.

use sqlx::{PgConnection, PgPool};
use time::OffsetDateTime;
use uuid::Uuid;

use channelgate_shared::{EntitlementType, RevokeReason};

use crate::error::AccessResult;

/// Entitlement key for a channel-access grant
pub fn channel_access_key(channel_id: Uuid) -> String {
    format!("channel_access_{}", channel_id)
}

/// A pending entitlement insert, produced by the grant planner
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewEntitlement {
    pub subscription_id: Uuid,
    pub customer_id: Uuid,
    pub entitlement_key: String,
    pub entitlement_type: EntitlementType,
    pub resource_id: Option<Uuid>,
    pub expires_at: Option<OffsetDateTime>,
}

/// Insert an entitlement inside the caller's transaction. Conflicts on
/// (subscription, key) are ignored: replays must not duplicate rows.
pub async fn create_in_tx(conn: &mut PgConnection, ent: &NewEntitlement) -> AccessResult<()> {
    sqlx::query(
        r#"
        INSERT INTO entitlements (
            subscription_id, customer_id, entitlement_key,
            entitlement_type, resource_id, expires_at
        )
        VALUES ($1, $2, $3, $4, $5, $6)
        ON CONFLICT (subscription_id, entitlement_key) DO NOTHING
        "#,
    )
    .bind(ent.subscription_id)
    .bind(ent.customer_id)
    .bind(&ent.entitlement_key)
    .bind(ent.entitlement_type)
    .bind(ent.resource_id)
    .bind(ent.expires_at)
    .execute(conn)
    .await?;
    Ok(())
}

/// Revoke every non-revoked entitlement of a subscription inside the
/// caller's transaction. Returns how many rows transitioned.
pub async fn revoke_all_in_tx(
    conn: &mut PgConnection,
    subscription_id: Uuid,
    reason: RevokeReason,
) -> AccessResult<u64> {
    let result = sqlx::query(
        r#"
        UPDATE entitlements
        SET revoked_at = NOW(), revoke_reason = $2
        WHERE subscription_id = $1 AND revoked_at IS NULL
        "#,
    )
    .bind(subscription_id)
    .bind(reason)
    .execute(conn)
    .await?;
    Ok(result.rows_affected())
}

/// Entitlement queries that run outside a grant/revoke transaction
#[derive(Clone)]
pub struct EntitlementStore {
    pool: PgPool,
}

impl EntitlementStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Ids of entitlements whose expiry has passed and that are not revoked
    pub async fn due_for_expiry(&self, limit: i64) -> AccessResult<Vec<Uuid>> {
        let rows: Vec<(Uuid,)> = sqlx::query_as(
            r#"
            SELECT id FROM entitlements
            WHERE expires_at <= NOW() AND revoked_at IS NULL
            ORDER BY expires_at ASC
            LIMIT $1
            "#,
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(|(id,)| id).collect())
    }

    /// Revoke one entitlement as expired. Re-checks revoked_at so a row that
    /// moved on since the sweep's read phase is a no-op.
    pub async fn expire_one(&self, entitlement_id: Uuid) -> AccessResult<bool> {
        let result = sqlx::query(
            r#"
            UPDATE entitlements
            SET revoked_at = NOW(), revoke_reason = 'expired'
            WHERE id = $1 AND revoked_at IS NULL
            "#,
        )
        .bind(entitlement_id)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;

    #[test]
    fn test_channel_access_key_format() {
        let channel_id = Uuid::parse_str("00000000-0000-0000-0000-0000000000ab").unwrap();
        assert_eq!(
            channel_access_key(channel_id),
            "channel_access_00000000-0000-0000-0000-0000000000ab"
        );
    }
}
