//! CancelSubscriptionHandler - flags the subscription to lapse at
//! period end and mirrors the resulting status locally.
//!
//! If the processor rejects the update the current status decides the
//! outcome: a terminal subscription (already canceled upstream) is
//! mirrored locally as if the cancel had succeeded, while a live one
//! re-raises the failure.

use std::sync::Arc;

use crate::domain::billing::{BillingError, SubscriptionStatus};
use crate::domain::foundation::{Timestamp, UserId};
use crate::ports::{EntitlementStore, PaymentGateway, StatusWrite, Subscription};

/// Command to cancel the caller's subscription.
#[derive(Debug, Clone)]
pub struct CancelSubscriptionCommand {
    pub user_id: UserId,
}

/// Result of a cancellation request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CancelOutcome {
    pub status: SubscriptionStatus,
    pub cancel_at_period_end: bool,
}

pub struct CancelSubscriptionHandler {
    store: Arc<dyn EntitlementStore>,
    gateway: Arc<dyn PaymentGateway>,
}

impl CancelSubscriptionHandler {
    pub fn new(store: Arc<dyn EntitlementStore>, gateway: Arc<dyn PaymentGateway>) -> Self {
        Self { store, gateway }
    }

    pub async fn handle(
        &self,
        cmd: CancelSubscriptionCommand,
    ) -> Result<CancelOutcome, BillingError> {
        let record = self
            .store
            .find_by_user(&cmd.user_id)
            .await
            .map_err(BillingError::from)?
            .ok_or_else(|| BillingError::EntitlementNotFound(cmd.user_id.clone()))?;

        let subscription_id = record.stripe_subscription_id.clone().ok_or_else(|| {
            BillingError::SubscriptionNotFound("no active subscription".to_string())
        })?;

        tracing::info!(
            user_id = %cmd.user_id,
            subscription_id = %subscription_id,
            "Requesting cancel at period end"
        );

        let subscription = match self
            .gateway
            .set_cancel_at_period_end(&subscription_id)
            .await
        {
            Ok(subscription) => subscription,
            Err(update_err) => {
                // The processor restricts updates on subscriptions in
                // some states. Re-fetch and let the status decide.
                tracing::warn!(
                    subscription_id = %subscription_id,
                    error = %update_err,
                    "Cancel update rejected; checking current status"
                );

                let current = self
                    .gateway
                    .get_subscription(&subscription_id)
                    .await
                    .map_err(BillingError::from)?
                    .ok_or_else(|| {
                        BillingError::SubscriptionNotFound(subscription_id.clone())
                    })?;

                if !current.status.is_terminal() {
                    return Err(BillingError::from(update_err));
                }
                // Already dead upstream: mirror that instead of failing.
                current
            }
        };

        self.mirror(&cmd.user_id, &subscription).await?;

        Ok(CancelOutcome {
            status: subscription.status,
            cancel_at_period_end: subscription.cancel_at_period_end || subscription.status.is_terminal(),
        })
    }

    async fn mirror(
        &self,
        user_id: &UserId,
        subscription: &Subscription,
    ) -> Result<(), BillingError> {
        self.store
            .update_status(&StatusWrite {
                user_id: user_id.clone(),
                status: subscription.status,
                current_period_end: subscription
                    .current_period_end
                    .and_then(Timestamp::from_unix_seconds),
                cancel_at_period_end: Some(true),
            })
            .await
            .map_err(BillingError::from)
    }
}
