//! ActivationReconciler - the single write path from processor state to
//! the entitlement record.
//!
//! Every activation/renewal path (webhook delivery, manual sync,
//! payment-intent fallback) funnels into `apply_activation`. It is an
//! idempotent upsert, not an increment: calling it any number of times
//! with equivalent inputs yields the same entitlement record, which is
//! what makes racing writers safe without locks.

use std::sync::Arc;

use crate::domain::billing::{BillingError, BillingPeriod, Plan};
use crate::domain::foundation::{Timestamp, UserId};
use crate::ports::{ActivationWrite, EntitlementStore, Subscription};

/// Translates a processor subscription object into the entitlement
/// activation write.
pub struct ActivationReconciler {
    store: Arc<dyn EntitlementStore>,
}

impl ActivationReconciler {
    pub fn new(store: Arc<dyn EntitlementStore>) -> Self {
        Self { store }
    }

    /// Apply a subscription activation to the entitlement record.
    ///
    /// Writes processor ids, tier, status, period end, cancel flag, the
    /// tier-derived credit ceiling, and resets `credits_used`. Sets
    /// `welcome_offer_used` only when `is_promo` (the store keeps the
    /// flag monotonic). Store failure is fatal; there is no partial
    /// success for an activation.
    pub async fn apply_activation(
        &self,
        user_id: &UserId,
        subscription: &Subscription,
        plan: Plan,
        period: Option<BillingPeriod>,
        is_promo: bool,
    ) -> Result<(), BillingError> {
        let tier = plan.tier();

        // Invalid/zero/negative period ends normalize to null.
        let period_end = subscription
            .current_period_end
            .and_then(Timestamp::from_unix_seconds);

        tracing::info!(
            user_id = %user_id,
            subscription_id = %subscription.id,
            tier = %tier,
            status = %subscription.status,
            billing_period = ?period.map(|p| p.as_str()),
            promo = is_promo,
            "Reconciling subscription into entitlement record"
        );

        let write = ActivationWrite {
            user_id: user_id.clone(),
            customer_id: subscription.customer_id.clone(),
            subscription_id: subscription.id.clone(),
            tier,
            status: subscription.status,
            current_period_end: period_end,
            cancel_at_period_end: subscription.cancel_at_period_end,
            credits_total: tier.credit_ceiling(),
            mark_offer_used: is_promo,
        };

        self.store.apply_activation(&write).await.map_err(|e| {
            tracing::error!(
                user_id = %user_id,
                subscription_id = %subscription.id,
                error = %e,
                "Activation write failed"
            );
            BillingError::from(e)
        })
    }
}
