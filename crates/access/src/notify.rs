//! Customer notifications for access lifecycle events
//!
//! Sends Telegram direct messages for payment and access transitions.
//! All sends are fire-and-forget: `Ok(true)` means delivered, `Ok(false)`
//! means the send failed or the customer has no reachable Telegram account.
//! Callers never fail an access transition because of a notification.

use channelgate_shared::{Customer, RevokeReason};

use crate::error::AccessResult;
use crate::telegram::TelegramClient;

/// Notification dispatch for access lifecycle events
#[derive(Clone)]
pub struct NotificationService {
    telegram: TelegramClient,
}

impl NotificationService {
    pub fn new(telegram: TelegramClient) -> Self {
        Self { telegram }
    }

    async fn send_dm(&self, customer: &Customer, text: &str) -> AccessResult<bool> {
        let Some(user_id) = customer.telegram_user_id else {
            tracing::debug!(
                customer_id = %customer.id,
                "Customer has no Telegram account, skipping notification"
            );
            return Ok(false);
        };

        match self.telegram.send_message(user_id, text).await {
            Ok(()) => Ok(true),
            Err(e) => {
                tracing::warn!(
                    customer_id = %customer.id,
                    error = %e,
                    "Failed to send customer notification - non-fatal"
                );
                Ok(false)
            }
        }
    }

    /// Confirm a successful payment and hand over the invite link
    pub async fn send_payment_confirmation(
        &self,
        customer: &Customer,
        channel_title: &str,
        invite_link: &str,
    ) -> AccessResult<bool> {
        let text = format!(
            "Payment received! Here is your invite link for {}:\n{}",
            channel_title, invite_link
        );
        self.send_dm(customer, &text).await
    }

    /// Warn about a failed payment and the grace deadline
    pub async fn send_payment_failed(
        &self,
        customer: &Customer,
        grace_until: time::OffsetDateTime,
    ) -> AccessResult<bool> {
        let deadline = grace_until
            .format(&time::format_description::well_known::Rfc3339)
            .unwrap_or_else(|_| grace_until.to_string());
        let text = format!(
            "We couldn't process your payment. Please update your payment method \
             before {} to keep your channel access.",
            deadline
        );
        self.send_dm(customer, &text).await
    }

    /// Notify that a subscription was canceled
    pub async fn send_subscription_canceled(
        &self,
        customer: &Customer,
        channel_title: &str,
    ) -> AccessResult<bool> {
        let text = format!(
            "Your subscription was canceled and your access to {} has ended.",
            channel_title
        );
        self.send_dm(customer, &text).await
    }

    /// Notify that access was revoked, with the reason
    pub async fn send_access_revoked(
        &self,
        customer: &Customer,
        channel_title: &str,
        reason: RevokeReason,
    ) -> AccessResult<bool> {
        let text = match reason {
            RevokeReason::Canceled => {
                return self.send_subscription_canceled(customer, channel_title).await;
            }
            RevokeReason::Refund => format!(
                "Your payment was refunded and your access to {} has been removed.",
                channel_title
            ),
            RevokeReason::Expired => format!(
                "Your access to {} has expired. You can purchase a new subscription at any time.",
                channel_title
            ),
            RevokeReason::PaymentFailed => format!(
                "Your access to {} was removed because the payment could not be collected.",
                channel_title
            ),
        };
        self.send_dm(customer, &text).await
    }
}
