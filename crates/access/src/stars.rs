//! Telegram Stars payment handling
//!
//! Stars payments arrive as typed in-app payloads rather than signed
//! webhooks. Authenticity comes from the opaque invoice payload minted at
//! invoice-generation time, and integrity from re-deriving the expected
//! star amount from the plan price. Idempotency uses the same
//! (provider, external id) dedup as the card path, keyed by the payment
//! charge id.

use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use time::OffsetDateTime;
use uuid::Uuid;

use channelgate_shared::{PaymentProvider, Plan, SubscriptionStatus};

use crate::config::AccessConfig;
use crate::error::{AccessError, AccessResult};
use crate::lifecycle::AccessLifecycle;

/// Allowed drift between the paid and expected star amounts
const AMOUNT_TOLERANCE: i64 = 1;

/// A successful Stars payment as relayed by the bot layer
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StarsPayment {
    /// Telegram's payment charge id; the dedup key
    pub telegram_payment_charge_id: String,
    /// Opaque payload minted when the invoice was generated
    pub invoice_payload: String,
    /// Stars actually paid
    pub total_amount: i64,
    /// Paying Telegram user
    pub telegram_user_id: i64,
}

/// Mint the opaque invoice payload carried through the payment flow
pub fn build_invoice_payload(subscription_id: Uuid, expected_amount: i64) -> String {
    format!("{}:{}", subscription_id, expected_amount)
}

/// Parse an invoice payload back into (subscription id, expected amount)
pub fn parse_invoice_payload(payload: &str) -> AccessResult<(Uuid, i64)> {
    let (sub, amount) = payload
        .split_once(':')
        .ok_or_else(|| AccessError::PayloadInvalid("malformed invoice payload".to_string()))?;
    let subscription_id = Uuid::parse_str(sub)
        .map_err(|_| AccessError::PayloadInvalid("invalid subscription id".to_string()))?;
    let expected_amount: i64 = amount
        .parse()
        .map_err(|_| AccessError::PayloadInvalid("invalid amount".to_string()))?;
    Ok((subscription_id, expected_amount))
}

/// Convert a plan price to stars at the configured rate, rounding up so the
/// charge never undercuts the price
pub fn stars_amount_for_price(price_cents: i64, rate_cents_per_star: i64) -> i64 {
    (price_cents + rate_cents_per_star - 1) / rate_cents_per_star
}

/// Handler for in-app Stars payments
#[derive(Clone)]
pub struct StarsPaymentHandler {
    pool: PgPool,
    lifecycle: AccessLifecycle,
    config: AccessConfig,
}

impl StarsPaymentHandler {
    pub fn new(pool: PgPool, lifecycle: AccessLifecycle, config: AccessConfig) -> Self {
        Self {
            pool,
            lifecycle,
            config,
        }
    }

    /// Apply a successful Stars payment: verify the amount against the plan
    /// price, dedup by charge id, then drive the grant path.
    pub async fn handle_successful_payment(&self, payment: StarsPayment) -> AccessResult<()> {
        let (subscription_id, payload_amount) = parse_invoice_payload(&payment.invoice_payload)?;

        let plan: Option<Plan> = sqlx::query_as(
            r#"
            SELECT p.id, p.organization_id, p.name, p.price_cents, p.currency, p.kind,
                   p.access_duration_days
            FROM plans p
            JOIN subscriptions s ON s.plan_id = p.id
            WHERE s.id = $1
            "#,
        )
        .bind(subscription_id)
        .fetch_optional(&self.pool)
        .await?;

        let plan = plan
            .ok_or_else(|| AccessError::SubscriptionNotFound(subscription_id.to_string()))?;

        // Verify the paid amount against the price-derived expectation, not
        // just the payload echo: a mismatch is a payment-integrity error and
        // creates no PaymentEvent
        let expected = stars_amount_for_price(plan.price_cents, self.config.stars_rate_cents);
        if (payment.total_amount - expected).abs() > AMOUNT_TOLERANCE {
            tracing::warn!(
                subscription_id = %subscription_id,
                expected = expected,
                received = payment.total_amount,
                payload_amount = payload_amount,
                "Stars payment amount mismatch"
            );
            return Err(AccessError::AmountMismatch {
                expected,
                received: payment.total_amount,
            });
        }

        let organization_id: (Uuid,) =
            sqlx::query_as("SELECT organization_id FROM subscriptions WHERE id = $1")
                .bind(subscription_id)
                .fetch_one(&self.pool)
                .await?;

        let payload = serde_json::json!({
            "event_type": "stars_payment",
            "charge_id": payment.telegram_payment_charge_id,
            "total_amount": payment.total_amount,
            "telegram_user_id": payment.telegram_user_id,
        });

        let inserted: Option<(Uuid,)> = sqlx::query_as(
            r#"
            INSERT INTO payment_events (
                organization_id, subscription_id, provider, event_type,
                external_id, payload, occurred_at
            )
            VALUES ($1, $2, $3, 'stars_payment', $4, $5, NOW())
            ON CONFLICT (provider, external_id) DO NOTHING
            RETURNING id
            "#,
        )
        .bind(organization_id.0)
        .bind(subscription_id)
        .bind(PaymentProvider::TelegramStars)
        .bind(&payment.telegram_payment_charge_id)
        .bind(&payload)
        .fetch_optional(&self.pool)
        .await?;

        let record_id = match inserted {
            Some((id,)) => id,
            None => {
                let existing: Option<(Uuid, Option<OffsetDateTime>)> = sqlx::query_as(
                    r#"
                    SELECT id, processed_at FROM payment_events
                    WHERE provider = $1 AND external_id = $2
                    "#,
                )
                .bind(PaymentProvider::TelegramStars)
                .bind(&payment.telegram_payment_charge_id)
                .fetch_optional(&self.pool)
                .await?;

                match existing {
                    Some((_, Some(_))) => {
                        tracing::info!(
                            charge_id = %payment.telegram_payment_charge_id,
                            "Duplicate Stars payment, already processed"
                        );
                        return Ok(());
                    }
                    Some((id, None)) => id,
                    None => {
                        return Err(AccessError::Internal(format!(
                            "payment event vanished during claim: {}",
                            payment.telegram_payment_charge_id
                        )))
                    }
                }
            }
        };

        self.lifecycle
            .handle_payment_success(subscription_id, PaymentProvider::TelegramStars)
            .await?;

        sqlx::query(
            r#"
            UPDATE subscriptions
            SET status = $2, started_at = COALESCE(started_at, NOW()), updated_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(subscription_id)
        .bind(SubscriptionStatus::Active)
        .execute(&self.pool)
        .await?;

        sqlx::query("UPDATE payment_events SET processed_at = NOW() WHERE id = $1")
            .bind(record_id)
            .execute(&self.pool)
            .await?;

        tracing::info!(
            subscription_id = %subscription_id,
            charge_id = %payment.telegram_payment_charge_id,
            stars = payment.total_amount,
            "Stars payment processed"
        );
        Ok(())
    }
}
