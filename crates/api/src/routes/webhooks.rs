//! Payment provider endpoints

use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::Json;

use channelgate_access::StarsPayment;

use crate::error::ApiError;
use crate::state::AppState;

/// Handle Stripe webhook events. The signature is verified against the raw
/// body before anything is parsed.
pub async fn stripe_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: String,
) -> Result<StatusCode, ApiError> {
    tracing::info!(body_len = body.len(), "Stripe webhook received");

    let signature = headers
        .get("stripe-signature")
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| {
            tracing::warn!("Stripe webhook missing signature header");
            ApiError::BadRequest("Missing Stripe signature".to_string())
        })?;

    let event = state
        .access
        .webhooks
        .verify_event(&body, signature)
        .map_err(|e| {
            tracing::warn!(error = %e, "Stripe webhook verification failed");
            ApiError::from(e)
        })?;

    tracing::info!(
        event_type = %event.type_,
        event_id = %event.id,
        "Stripe webhook event verified"
    );

    state.access.webhooks.handle_event(event).await?;

    Ok(StatusCode::OK)
}

/// Handle a successful Telegram Stars payment relayed by the bot layer
pub async fn stars_payment(
    State(state): State<AppState>,
    Json(payment): Json<StarsPayment>,
) -> Result<StatusCode, ApiError> {
    tracing::info!(
        charge_id = %payment.telegram_payment_charge_id,
        stars = payment.total_amount,
        "Stars payment received"
    );

    state.access.stars.handle_successful_payment(payment).await?;

    Ok(StatusCode::OK)
}
