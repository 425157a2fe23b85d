//! Stripe webhook handling
//!
//! Normalizes Stripe events into the engine's canonical event set, resolves
//! which organization/subscription they belong to, deduplicates by
//! (provider, event id), and hands off to the access state machine exactly
//! once per distinct provider event.

use hmac::{Hmac, Mac};
use sha2::Sha256;
use sqlx::PgPool;
use stripe::{Event, EventObject, EventType};
use time::OffsetDateTime;
use uuid::Uuid;

use channelgate_shared::{PaymentProvider, RevokeReason, SubscriptionStatus};

use crate::error::{AccessError, AccessResult};
use crate::lifecycle::{AccessLifecycle, RevokeOutcome};

type HmacSha256 = Hmac<Sha256>;

/// Signature timestamp tolerance (seconds)
const SIGNATURE_TOLERANCE_SECS: i64 = 300;

/// Metadata key spellings used for the subscription id over the years;
/// all of them are still tried on inbound events
const SUBSCRIPTION_METADATA_KEYS: [&str; 3] = ["subscription_id", "subscriptionId", "sub_id"];
/// Historical metadata key spellings for the organization id
const ORGANIZATION_METADATA_KEYS: [&str; 3] = ["organization_id", "organizationId", "org_id"];

// =============================================================================
// Event mapping
// =============================================================================

/// The canonical event set; everything outside this allow-list is accepted
/// and discarded. Keeping the mapping enum-keyed makes it exhaustively
/// checkable.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NormalizedEvent {
    CheckoutCompleted,
    SubscriptionCreated,
    SubscriptionUpdated,
    SubscriptionCanceled,
    InvoicePaid,
    InvoicePaymentFailed,
    ChargeRefunded,
}

/// Which state machine entry point an event drives
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DomainEffect {
    Grant,
    Revoke(RevokeReason),
}

impl NormalizedEvent {
    /// Map a Stripe event type onto the allow-list
    pub fn from_event_type(event_type: &EventType) -> Option<Self> {
        match event_type {
            EventType::CheckoutSessionCompleted => Some(Self::CheckoutCompleted),
            EventType::CustomerSubscriptionCreated => Some(Self::SubscriptionCreated),
            EventType::CustomerSubscriptionUpdated => Some(Self::SubscriptionUpdated),
            EventType::CustomerSubscriptionDeleted => Some(Self::SubscriptionCanceled),
            EventType::InvoicePaid => Some(Self::InvoicePaid),
            EventType::InvoicePaymentFailed => Some(Self::InvoicePaymentFailed),
            EventType::ChargeRefunded => Some(Self::ChargeRefunded),
            _ => None,
        }
    }

    pub fn effect(&self) -> DomainEffect {
        match self {
            Self::CheckoutCompleted
            | Self::SubscriptionCreated
            | Self::SubscriptionUpdated
            | Self::InvoicePaid => DomainEffect::Grant,
            Self::SubscriptionCanceled => DomainEffect::Revoke(RevokeReason::Canceled),
            Self::InvoicePaymentFailed => DomainEffect::Revoke(RevokeReason::PaymentFailed),
            Self::ChargeRefunded => DomainEffect::Revoke(RevokeReason::Refund),
        }
    }

    /// Subscription status stamped after the domain effect is applied
    pub fn subscription_status(&self) -> SubscriptionStatus {
        match self.effect() {
            DomainEffect::Grant => SubscriptionStatus::Active,
            DomainEffect::Revoke(RevokeReason::Canceled) => SubscriptionStatus::Canceled,
            DomainEffect::Revoke(RevokeReason::PaymentFailed) => SubscriptionStatus::PastDue,
            DomainEffect::Revoke(RevokeReason::Refund) => SubscriptionStatus::Expired,
            DomainEffect::Revoke(RevokeReason::Expired) => SubscriptionStatus::Expired,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::CheckoutCompleted => "checkout_completed",
            Self::SubscriptionCreated => "subscription_created",
            Self::SubscriptionUpdated => "subscription_updated",
            Self::SubscriptionCanceled => "subscription_canceled",
            Self::InvoicePaid => "invoice_paid",
            Self::InvoicePaymentFailed => "invoice_payment_failed",
            Self::ChargeRefunded => "charge_refunded",
        }
    }
}

// =============================================================================
// Signature verification
// =============================================================================

/// Verify a Stripe signature header against the raw, unparsed body.
///
/// Manual verification (t=/v1= header parse + HMAC-SHA256 over "{t}.{body}")
/// to stay independent of the async-stripe API version pinned for the event
/// types. `now_unix` is injected so the tolerance window is testable.
pub fn verify_signature(
    payload: &str,
    signature_header: &str,
    webhook_secret: &str,
    now_unix: i64,
) -> AccessResult<()> {
    let mut timestamp: Option<i64> = None;
    let mut v1_signature: Option<String> = None;

    for part in signature_header.split(',') {
        let kv: Vec<&str> = part.splitn(2, '=').collect();
        if kv.len() == 2 {
            match kv[0] {
                "t" => timestamp = kv[1].parse().ok(),
                "v1" => v1_signature = Some(kv[1].to_string()),
                _ => {}
            }
        }
    }

    let timestamp = timestamp.ok_or(AccessError::SignatureInvalid)?;
    let v1_signature = v1_signature.ok_or(AccessError::SignatureInvalid)?;

    if (now_unix - timestamp).abs() > SIGNATURE_TOLERANCE_SECS {
        tracing::warn!(
            timestamp = timestamp,
            now = now_unix,
            "Webhook timestamp outside tolerance"
        );
        return Err(AccessError::SignatureInvalid);
    }

    let secret_key = webhook_secret
        .strip_prefix("whsec_")
        .unwrap_or(webhook_secret);
    let signed_payload = format!("{}.{}", timestamp, payload);

    let mut mac = HmacSha256::new_from_slice(secret_key.as_bytes())
        .map_err(|_| AccessError::SignatureInvalid)?;
    mac.update(signed_payload.as_bytes());
    let computed = hex::encode(mac.finalize().into_bytes());

    if computed != v1_signature {
        return Err(AccessError::SignatureInvalid);
    }

    Ok(())
}

// =============================================================================
// Handler
// =============================================================================

/// References pulled out of the raw event object before any lookups
#[derive(Debug, Default)]
struct EventRefs {
    metadata: std::collections::HashMap<String, String>,
    provider_subscription_id: Option<String>,
    provider_session_id: Option<String>,
    invoice_id: Option<String>,
    period_start: Option<i64>,
    period_end: Option<i64>,
}

/// Resolved ownership of an event
#[derive(Debug, Clone, Copy)]
struct EventContext {
    organization_id: Uuid,
    subscription_id: Option<Uuid>,
}

/// Webhook handler for Stripe events
#[derive(Clone)]
pub struct StripeWebhookHandler {
    pool: PgPool,
    lifecycle: AccessLifecycle,
    webhook_secret: String,
}

impl StripeWebhookHandler {
    pub fn new(pool: PgPool, lifecycle: AccessLifecycle, webhook_secret: String) -> Self {
        Self {
            pool,
            lifecycle,
            webhook_secret,
        }
    }

    /// Verify and parse a Stripe webhook from its raw body. Verification
    /// always happens before any parse attempt.
    pub fn verify_event(&self, payload: &str, signature_header: &str) -> AccessResult<Event> {
        let now = OffsetDateTime::now_utc().unix_timestamp();
        verify_signature(payload, signature_header, &self.webhook_secret, now)?;

        let event: Event = serde_json::from_str(payload).map_err(|e| {
            tracing::error!(parse_error = %e, "Failed to parse verified webhook body");
            AccessError::PayloadInvalid(format!("event body: {}", e))
        })?;
        Ok(event)
    }

    /// Handle a verified Stripe event
    pub async fn handle_event(&self, event: Event) -> AccessResult<()> {
        let event_id = event.id.to_string();

        let Some(normalized) = NormalizedEvent::from_event_type(&event.type_) else {
            // Accepted but meaningless for access: log and exit
            tracing::info!(
                event_type = %event.type_,
                event_id = %event_id,
                "Unhandled Stripe event type, no side effect"
            );
            return Ok(());
        };

        let refs = extract_refs(&event);
        let Some(ctx) = self.resolve_context(&refs).await? else {
            // Without an organization there is no actor to apply effects to
            tracing::warn!(
                event_type = %event.type_,
                event_id = %event_id,
                "Dropping event: no organization resolvable"
            );
            return Ok(());
        };

        let occurred_at = OffsetDateTime::from_unix_timestamp(event.created)
            .unwrap_or_else(|_| OffsetDateTime::now_utc());
        let normalized_payload = serde_json::json!({
            "event_type": normalized.as_str(),
            "stripe_event_type": event.type_.to_string(),
            "provider_subscription_id": refs.provider_subscription_id,
            "session_id": refs.provider_session_id,
            "invoice_id": refs.invoice_id,
        });

        let Some(record_id) = self
            .claim_event(&ctx, normalized, &event_id, occurred_at, &normalized_payload)
            .await?
        else {
            tracing::info!(
                event_id = %event_id,
                event_type = %normalized.as_str(),
                "Duplicate webhook delivery, already processed"
            );
            return Ok(());
        };

        // Side effects before the processed_at write: a crash in between
        // causes at worst an idempotent replay of the effect
        if let Some(subscription_id) = ctx.subscription_id {
            let status = match normalized.effect() {
                DomainEffect::Grant => {
                    self.lifecycle
                        .handle_payment_success(subscription_id, PaymentProvider::Stripe)
                        .await?;
                    Some(normalized.subscription_status())
                }
                DomainEffect::Revoke(reason) => {
                    let outcome = self
                        .lifecycle
                        .handle_payment_failure(subscription_id, reason)
                        .await?;
                    match outcome {
                        // Grace lapsed mid-failure: the revoke path already
                        // stamped a terminal status, don't regress it
                        RevokeOutcome::Revoked { .. }
                            if reason == RevokeReason::PaymentFailed =>
                        {
                            None
                        }
                        _ => Some(normalized.subscription_status()),
                    }
                }
            };

            self.sync_subscription(subscription_id, normalized, status, &refs)
                .await?;
        } else {
            tracing::warn!(
                event_id = %event_id,
                event_type = %normalized.as_str(),
                organization_id = %ctx.organization_id,
                "Event recorded without a resolvable subscription, no effect applied"
            );
        }

        sqlx::query(
            r#"
            UPDATE payment_events
            SET processed_at = NOW(),
                subscription_id = COALESCE($2, subscription_id),
                payload = $3
            WHERE id = $1
            "#,
        )
        .bind(record_id)
        .bind(ctx.subscription_id)
        .bind(&normalized_payload)
        .execute(&self.pool)
        .await?;

        tracing::info!(
            event_id = %event_id,
            event_type = %normalized.as_str(),
            subscription_id = ?ctx.subscription_id,
            "Stripe event processed"
        );
        Ok(())
    }

    /// Resolve the (organization, subscription?) pair an event belongs to.
    /// Returns None when no organization can be determined, which callers
    /// treat as a safe drop.
    async fn resolve_context(&self, refs: &EventRefs) -> AccessResult<Option<EventContext>> {
        // (a) explicit metadata, trying every historical key spelling
        let metadata_subscription = SUBSCRIPTION_METADATA_KEYS
            .iter()
            .find_map(|key| refs.metadata.get(*key))
            .and_then(|raw| Uuid::parse_str(raw).ok());
        let metadata_organization = ORGANIZATION_METADATA_KEYS
            .iter()
            .find_map(|key| refs.metadata.get(*key))
            .and_then(|raw| Uuid::parse_str(raw).ok());

        if let Some(subscription_id) = metadata_subscription {
            let organization_id = match metadata_organization {
                Some(org) => Some(org),
                None => self.organization_of(subscription_id).await?,
            };
            if let Some(organization_id) = organization_id {
                return Ok(Some(EventContext {
                    organization_id,
                    subscription_id: Some(subscription_id),
                }));
            }
        }

        // (b) lookup by the provider's own subscription/session id
        for external in [&refs.provider_subscription_id, &refs.provider_session_id]
            .into_iter()
            .flatten()
        {
            let row: Option<(Uuid, Uuid)> = sqlx::query_as(
                "SELECT id, organization_id FROM subscriptions WHERE external_id = $1",
            )
            .bind(external)
            .fetch_optional(&self.pool)
            .await?;
            if let Some((subscription_id, organization_id)) = row {
                return Ok(Some(EventContext {
                    organization_id,
                    subscription_id: Some(subscription_id),
                }));
            }
        }

        // (c) refund with no direct link: associated invoice -> subscription
        if let Some(invoice_id) = &refs.invoice_id {
            let row: Option<(Option<Uuid>, Uuid)> = sqlx::query_as(
                r#"
                SELECT subscription_id, organization_id
                FROM payment_events
                WHERE provider = 'stripe'
                  AND payload->>'invoice_id' = $1
                  AND subscription_id IS NOT NULL
                ORDER BY occurred_at DESC
                LIMIT 1
                "#,
            )
            .bind(invoice_id)
            .fetch_optional(&self.pool)
            .await?;
            if let Some((subscription_id, organization_id)) = row {
                return Ok(Some(EventContext {
                    organization_id,
                    subscription_id,
                }));
            }
        }

        // Organization known but subscription not: still processable as a
        // recorded event
        if let Some(organization_id) = metadata_organization {
            return Ok(Some(EventContext {
                organization_id,
                subscription_id: None,
            }));
        }

        Ok(None)
    }

    async fn organization_of(&self, subscription_id: Uuid) -> AccessResult<Option<Uuid>> {
        let row: Option<(Uuid,)> =
            sqlx::query_as("SELECT organization_id FROM subscriptions WHERE id = $1")
                .bind(subscription_id)
                .fetch_optional(&self.pool)
                .await?;
        Ok(row.map(|(org,)| org))
    }

    /// Dedup by (provider, external id). Returns the record id to process,
    /// or None when the event was already fully applied. An existing record
    /// without processed_at (crash after create) is resumed, not duplicated.
    async fn claim_event(
        &self,
        ctx: &EventContext,
        normalized: NormalizedEvent,
        event_id: &str,
        occurred_at: OffsetDateTime,
        payload: &serde_json::Value,
    ) -> AccessResult<Option<Uuid>> {
        let inserted: Option<(Uuid,)> = sqlx::query_as(
            r#"
            INSERT INTO payment_events (
                organization_id, subscription_id, provider, event_type,
                external_id, payload, occurred_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            ON CONFLICT (provider, external_id) DO NOTHING
            RETURNING id
            "#,
        )
        .bind(ctx.organization_id)
        .bind(ctx.subscription_id)
        .bind(PaymentProvider::Stripe)
        .bind(normalized.as_str())
        .bind(event_id)
        .bind(payload)
        .bind(occurred_at)
        .fetch_optional(&self.pool)
        .await?;

        if let Some((id,)) = inserted {
            return Ok(Some(id));
        }

        let existing: Option<(Uuid, Option<OffsetDateTime>)> = sqlx::query_as(
            r#"
            SELECT id, processed_at FROM payment_events
            WHERE provider = $1 AND external_id = $2
            "#,
        )
        .bind(PaymentProvider::Stripe)
        .bind(event_id)
        .fetch_optional(&self.pool)
        .await?;

        match existing {
            Some((_, Some(_))) => Ok(None),
            Some((id, None)) => Ok(Some(id)),
            None => Err(AccessError::Internal(format!(
                "payment event vanished during claim: {}",
                event_id
            ))),
        }
    }

    /// Stamp the subscription status matching the applied effect and sync
    /// provider-side period fields carried by subscription events
    async fn sync_subscription(
        &self,
        subscription_id: Uuid,
        normalized: NormalizedEvent,
        status: Option<SubscriptionStatus>,
        refs: &EventRefs,
    ) -> AccessResult<()> {
        if let Some(status) = status {
            let canceled = status == SubscriptionStatus::Canceled
                && normalized == NormalizedEvent::SubscriptionCanceled;
            sqlx::query(
                r#"
                UPDATE subscriptions
                SET status = $2,
                    started_at = CASE WHEN $3 THEN COALESCE(started_at, NOW()) ELSE started_at END,
                    canceled_at = CASE WHEN $4 THEN COALESCE(canceled_at, NOW()) ELSE canceled_at END,
                    updated_at = NOW()
                WHERE id = $1
                "#,
            )
            .bind(subscription_id)
            .bind(status)
            .bind(status == SubscriptionStatus::Active)
            .bind(canceled)
            .execute(&self.pool)
            .await?;
        }

        if let (Some(start), Some(end)) = (refs.period_start, refs.period_end) {
            let period_start = OffsetDateTime::from_unix_timestamp(start)
                .map_err(|e| AccessError::PayloadInvalid(format!("period start: {}", e)))?;
            let period_end = OffsetDateTime::from_unix_timestamp(end)
                .map_err(|e| AccessError::PayloadInvalid(format!("period end: {}", e)))?;
            sqlx::query(
                r#"
                UPDATE subscriptions
                SET current_period_start = $2, current_period_end = $3,
                    external_id = COALESCE(external_id, $4), updated_at = NOW()
                WHERE id = $1
                "#,
            )
            .bind(subscription_id)
            .bind(period_start)
            .bind(period_end)
            .bind(&refs.provider_subscription_id)
            .execute(&self.pool)
            .await?;
        }

        Ok(())
    }
}

/// Pull ids and metadata out of the event object without touching storage
fn extract_refs(event: &Event) -> EventRefs {
    let mut refs = EventRefs::default();

    match &event.data.object {
        EventObject::Subscription(subscription) => {
            refs.metadata = subscription.metadata.clone();
            refs.provider_subscription_id = Some(subscription.id.to_string());
            refs.period_start = Some(subscription.current_period_start);
            refs.period_end = Some(subscription.current_period_end);
        }
        EventObject::CheckoutSession(session) => {
            if let Some(metadata) = &session.metadata {
                refs.metadata = metadata.clone();
            }
            refs.provider_session_id = Some(session.id.to_string());
            refs.provider_subscription_id = match &session.subscription {
                Some(stripe::Expandable::Id(id)) => Some(id.to_string()),
                Some(stripe::Expandable::Object(s)) => Some(s.id.to_string()),
                None => None,
            };
        }
        EventObject::Invoice(invoice) => {
            if let Some(metadata) = &invoice.metadata {
                refs.metadata = metadata.clone();
            }
            refs.invoice_id = Some(invoice.id.to_string());
            refs.provider_subscription_id = match &invoice.subscription {
                Some(stripe::Expandable::Id(id)) => Some(id.to_string()),
                Some(stripe::Expandable::Object(s)) => Some(s.id.to_string()),
                None => None,
            };
        }
        EventObject::Charge(charge) => {
            refs.metadata = charge.metadata.clone();
            refs.invoice_id = match &charge.invoice {
                Some(stripe::Expandable::Id(id)) => Some(id.to_string()),
                Some(stripe::Expandable::Object(inv)) => Some(inv.id.to_string()),
                None => None,
            };
        }
        _ => {}
    }

    refs
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;

    #[test]
    fn test_event_allow_list_mapping() {
        assert_eq!(
            NormalizedEvent::from_event_type(&EventType::CheckoutSessionCompleted),
            Some(NormalizedEvent::CheckoutCompleted)
        );
        assert_eq!(
            NormalizedEvent::from_event_type(&EventType::CustomerSubscriptionDeleted),
            Some(NormalizedEvent::SubscriptionCanceled)
        );
        assert_eq!(
            NormalizedEvent::from_event_type(&EventType::InvoicePaymentFailed),
            Some(NormalizedEvent::InvoicePaymentFailed)
        );
        // Outside the allow-list: accepted upstream, but produces no effect
        assert_eq!(
            NormalizedEvent::from_event_type(&EventType::CustomerCreated),
            None
        );
        assert_eq!(
            NormalizedEvent::from_event_type(&EventType::InvoiceFinalized),
            None
        );
    }

    #[test]
    fn test_effect_and_status_mapping() {
        assert_eq!(NormalizedEvent::InvoicePaid.effect(), DomainEffect::Grant);
        assert_eq!(
            NormalizedEvent::SubscriptionCanceled.effect(),
            DomainEffect::Revoke(RevokeReason::Canceled)
        );
        assert_eq!(
            NormalizedEvent::InvoicePaymentFailed.effect(),
            DomainEffect::Revoke(RevokeReason::PaymentFailed)
        );
        assert_eq!(
            NormalizedEvent::ChargeRefunded.effect(),
            DomainEffect::Revoke(RevokeReason::Refund)
        );

        assert_eq!(
            NormalizedEvent::InvoicePaid.subscription_status(),
            SubscriptionStatus::Active
        );
        assert_eq!(
            NormalizedEvent::InvoicePaymentFailed.subscription_status(),
            SubscriptionStatus::PastDue
        );
        assert_eq!(
            NormalizedEvent::ChargeRefunded.subscription_status(),
            SubscriptionStatus::Expired
        );
    }

    fn sign(payload: &str, secret: &str, timestamp: i64) -> String {
        let signed_payload = format!("{}.{}", timestamp, payload);
        let mut mac = HmacSha256::new_from_slice(secret.as_bytes()).unwrap();
        mac.update(signed_payload.as_bytes());
        format!("t={},v1={}", timestamp, hex::encode(mac.finalize().into_bytes()))
    }

    #[test]
    fn test_signature_accepts_valid_header() {
        let payload = r#"{"id":"evt_1"}"#;
        let secret = "whsec_testsecret";
        let now = 1_700_000_000;
        let header = sign(payload, "testsecret", now);

        assert!(verify_signature(payload, &header, secret, now).is_ok());
    }

    #[test]
    fn test_signature_rejects_tampered_body() {
        let secret = "whsec_testsecret";
        let now = 1_700_000_000;
        let header = sign(r#"{"id":"evt_1"}"#, "testsecret", now);

        let result = verify_signature(r#"{"id":"evt_2"}"#, &header, secret, now);
        assert!(matches!(result, Err(AccessError::SignatureInvalid)));
    }

    #[test]
    fn test_signature_rejects_stale_timestamp() {
        let payload = r#"{"id":"evt_1"}"#;
        let secret = "whsec_testsecret";
        let signed_at = 1_700_000_000;
        let header = sign(payload, "testsecret", signed_at);

        let result = verify_signature(
            payload,
            &header,
            secret,
            signed_at + SIGNATURE_TOLERANCE_SECS + 1,
        );
        assert!(matches!(result, Err(AccessError::SignatureInvalid)));
    }

    #[test]
    fn test_signature_rejects_missing_parts() {
        let result = verify_signature("{}", "t=123", "whsec_x", 123);
        assert!(matches!(result, Err(AccessError::SignatureInvalid)));

        let result = verify_signature("{}", "v1=abc", "whsec_x", 123);
        assert!(matches!(result, Err(AccessError::SignatureInvalid)));
    }

    #[tokio::test]
    #[ignore] // Requires database
    async fn test_event_dedup_key_is_unique() {
        let url = std::env::var("DATABASE_URL").expect("DATABASE_URL required");
        let pool = sqlx::PgPool::connect(&url).await.unwrap();

        let org_id: (Uuid,) =
            sqlx::query_as("INSERT INTO organizations (name) VALUES ('dedup-test') RETURNING id")
                .fetch_one(&pool)
                .await
                .unwrap();
        let external_id = format!("evt_{}", Uuid::new_v4());

        // Same (provider, external_id) delivered twice: exactly one row
        for _ in 0..2 {
            sqlx::query(
                r#"
                INSERT INTO payment_events (
                    organization_id, provider, event_type, external_id, payload, occurred_at
                )
                VALUES ($1, 'stripe', 'invoice_paid', $2, '{}', NOW())
                ON CONFLICT (provider, external_id) DO NOTHING
                "#,
            )
            .bind(org_id.0)
            .bind(&external_id)
            .execute(&pool)
            .await
            .unwrap();
        }

        let count: (i64,) = sqlx::query_as(
            "SELECT COUNT(*) FROM payment_events WHERE provider = 'stripe' AND external_id = $1",
        )
        .bind(&external_id)
        .fetch_one(&pool)
        .await
        .unwrap();
        assert_eq!(count.0, 1);
    }

    #[test]
    fn test_metadata_key_spellings() {
        for key in SUBSCRIPTION_METADATA_KEYS {
            let mut refs = EventRefs::default();
            refs.metadata
                .insert(key.to_string(), Uuid::new_v4().to_string());
            let found = SUBSCRIPTION_METADATA_KEYS
                .iter()
                .find_map(|k| refs.metadata.get(*k));
            assert!(found.is_some(), "key {} not picked up", key);
        }
    }
}
