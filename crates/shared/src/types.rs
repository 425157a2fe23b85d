//! Common domain types used across ChannelGate
//!
//! Row structs map 1:1 onto the Postgres schema in `migrations/`. Status
//! enums are stored as lowercase VARCHAR so that operator tooling can query
//! them without a Postgres enum type.

use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use time::OffsetDateTime;
use uuid::Uuid;

/// Channel provider value for Telegram channels.
/// Channels carry a free-form provider column; only this value is executable
/// by the access executor, everything else is skipped as not-ours.
pub const PROVIDER_TELEGRAM: &str = "telegram";

// =============================================================================
// Enums
// =============================================================================

/// Commercial state of a subscription
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "VARCHAR", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum SubscriptionStatus {
    Incomplete,
    Active,
    PastDue,
    Canceled,
    Expired,
}

impl std::fmt::Display for SubscriptionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            SubscriptionStatus::Incomplete => "incomplete",
            SubscriptionStatus::Active => "active",
            SubscriptionStatus::PastDue => "past_due",
            SubscriptionStatus::Canceled => "canceled",
            SubscriptionStatus::Expired => "expired",
        };
        write!(f, "{}", s)
    }
}

impl SubscriptionStatus {
    /// Terminal states never transition back to active
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Canceled | Self::Expired)
    }
}

/// Per-channel access state for one subscription
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "VARCHAR", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum ChannelAccessStatus {
    /// Row exists, grant job queued, invite not yet issued
    Pending,
    /// Invite issued, customer holds access
    Granted,
    /// Payment failed, inside the grace window; external state untouched
    RevokePending,
    /// Access torn down
    Revoked,
}

impl std::fmt::Display for ChannelAccessStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ChannelAccessStatus::Pending => "pending",
            ChannelAccessStatus::Granted => "granted",
            ChannelAccessStatus::RevokePending => "revoke_pending",
            ChannelAccessStatus::Revoked => "revoked",
        };
        write!(f, "{}", s)
    }
}

/// Lifecycle of an issued invite link
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "VARCHAR", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum InviteStatus {
    Active,
    /// Superseded by a newer invite; kept for audit trail
    Expired,
    Revoked,
}

impl std::fmt::Display for InviteStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            InviteStatus::Active => "active",
            InviteStatus::Expired => "expired",
            InviteStatus::Revoked => "revoked",
        };
        write!(f, "{}", s)
    }
}

/// Kind of access-grant record tracked for expiry bookkeeping
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "VARCHAR", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum EntitlementType {
    ChannelAccess,
}

impl std::fmt::Display for EntitlementType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EntitlementType::ChannelAccess => write!(f, "channel_access"),
        }
    }
}

/// Payment provider an event or subscription settles through
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "VARCHAR", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum PaymentProvider {
    Stripe,
    TelegramStars,
}

impl std::fmt::Display for PaymentProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            PaymentProvider::Stripe => "stripe",
            PaymentProvider::TelegramStars => "telegram_stars",
        };
        write!(f, "{}", s)
    }
}

/// Why access is being demoted or torn down.
///
/// The reason is part of the revoke job id (`revoke:{sub}:{reason}`), so the
/// string forms below are a stable external contract.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "VARCHAR", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum RevokeReason {
    PaymentFailed,
    Canceled,
    Refund,
    Expired,
}

impl RevokeReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            RevokeReason::PaymentFailed => "payment_failed",
            RevokeReason::Canceled => "canceled",
            RevokeReason::Refund => "refund",
            RevokeReason::Expired => "expired",
        }
    }
}

impl std::fmt::Display for RevokeReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for RevokeReason {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "payment_failed" => Ok(Self::PaymentFailed),
            "canceled" => Ok(Self::Canceled),
            "refund" => Ok(Self::Refund),
            "expired" => Ok(Self::Expired),
            other => Err(format!("Unknown revoke reason: {}", other)),
        }
    }
}

/// Billing model of a plan
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "VARCHAR", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum PlanKind {
    Recurring,
    OneTime,
}

// =============================================================================
// Row types
// =============================================================================

/// A customer's commercial relationship to a plan
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Subscription {
    pub id: Uuid,
    pub organization_id: Uuid,
    pub customer_id: Uuid,
    pub plan_id: Uuid,
    pub status: SubscriptionStatus,
    /// Provider-side id (Stripe subscription/session id, Stars invoice id)
    pub external_id: Option<String>,
    pub current_period_start: Option<OffsetDateTime>,
    pub current_period_end: Option<OffsetDateTime>,
    pub started_at: Option<OffsetDateTime>,
    pub canceled_at: Option<OffsetDateTime>,
    pub ended_at: Option<OffsetDateTime>,
    /// Open grace window after a payment failure; at most one at a time
    pub grace_until: Option<OffsetDateTime>,
    pub last_payment_failed_at: Option<OffsetDateTime>,
    pub metadata: serde_json::Value,
}

/// A sellable plan. Pricing is read-only here; the commerce layer owns CRUD.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Plan {
    pub id: Uuid,
    pub organization_id: Uuid,
    pub name: String,
    pub price_cents: i64,
    pub currency: String,
    pub kind: PlanKind,
    /// Fixed access duration for one-time plans; None = governed by the
    /// subscription period
    pub access_duration_days: Option<i32>,
}

/// A sellable Telegram channel. The commerce layer owns CRUD.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Channel {
    pub id: Uuid,
    pub organization_id: Uuid,
    pub provider: String,
    pub telegram_chat_id: Option<i64>,
    pub title: String,
    /// Cached latest invite link, cleared on revoke
    pub invite_link: Option<String>,
}

/// An end customer. The commerce layer owns CRUD.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Customer {
    pub id: Uuid,
    pub organization_id: Uuid,
    pub telegram_user_id: Option<i64>,
    pub email: Option<String>,
}

/// One subscription's access right to one channel.
/// Unique on (subscription_id, channel_id); never deleted, only transitioned.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct ChannelAccess {
    pub id: Uuid,
    pub subscription_id: Uuid,
    pub channel_id: Uuid,
    pub customer_id: Uuid,
    pub status: ChannelAccessStatus,
    pub granted_at: Option<OffsetDateTime>,
    pub revoked_at: Option<OffsetDateTime>,
    pub revoke_reason: Option<RevokeReason>,
    /// Owns the referenced TelegramInvite exclusively
    pub invite_id: Option<Uuid>,
    pub created_at: OffsetDateTime,
    pub updated_at: OffsetDateTime,
}

/// Platform-agnostic access-grant record used for expiry bookkeeping
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Entitlement {
    pub id: Uuid,
    pub subscription_id: Uuid,
    pub customer_id: Uuid,
    pub entitlement_key: String,
    pub entitlement_type: EntitlementType,
    pub resource_id: Option<Uuid>,
    pub expires_at: Option<OffsetDateTime>,
    pub revoked_at: Option<OffsetDateTime>,
    pub revoke_reason: Option<RevokeReason>,
    pub created_at: OffsetDateTime,
}

/// One issued invite link scoped to a channel
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct TelegramInvite {
    pub id: Uuid,
    pub channel_id: Uuid,
    pub invite_link: String,
    pub invite_hash: Option<String>,
    pub status: InviteStatus,
    pub expires_at: Option<OffsetDateTime>,
    pub max_uses: Option<i32>,
    pub revoked_at: Option<OffsetDateTime>,
    pub revoked_reason: Option<String>,
    pub created_at: OffsetDateTime,
}

/// Idempotency + audit record for an inbound provider event.
/// Unique on (provider, external_id); processed_at = NULL means the event was
/// received but its side effects have not been fully applied yet.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct PaymentEventRecord {
    pub id: Uuid,
    pub organization_id: Uuid,
    pub subscription_id: Option<Uuid>,
    pub provider: PaymentProvider,
    pub event_type: String,
    pub external_id: String,
    pub payload: serde_json::Value,
    pub occurred_at: OffsetDateTime,
    pub processed_at: Option<OffsetDateTime>,
    pub created_at: OffsetDateTime,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn test_revoke_reason_round_trip() {
        for reason in [
            RevokeReason::PaymentFailed,
            RevokeReason::Canceled,
            RevokeReason::Refund,
            RevokeReason::Expired,
        ] {
            assert_eq!(RevokeReason::from_str(reason.as_str()), Ok(reason));
        }
        assert!(RevokeReason::from_str("chargeback").is_err());
    }

    #[test]
    fn test_subscription_status_display() {
        assert_eq!(SubscriptionStatus::PastDue.to_string(), "past_due");
        assert_eq!(SubscriptionStatus::Active.to_string(), "active");
        assert!(SubscriptionStatus::Expired.is_terminal());
        assert!(!SubscriptionStatus::PastDue.is_terminal());
    }

    #[test]
    fn test_channel_access_status_display() {
        assert_eq!(
            ChannelAccessStatus::RevokePending.to_string(),
            "revoke_pending"
        );
    }
}
