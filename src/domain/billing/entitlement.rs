//! The entitlement record: what a user is allowed to do right now.
//!
//! One row per user, owned exclusively by this subsystem. The payment
//! processor is the system of record for money; this record is the
//! system of record for access. Rows are created at first contact and
//! never deleted; `free` is the terminal/default tier, not row absence.

use serde::{Deserialize, Serialize};

use crate::domain::foundation::{Timestamp, UserId};

use super::{SubscriptionStatus, SubscriptionTier};

/// Local entitlement record for a single user.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Entitlement {
    pub user_id: UserId,

    /// What the user may do. Derived from processor state only through
    /// the reconciler.
    pub tier: SubscriptionTier,

    /// Mirror of the processor's subscription status.
    pub status: SubscriptionStatus,

    /// Tier-derived credit ceiling for the current period.
    pub credits_total: i64,

    /// Credits consumed this period. Reset to zero on every successful
    /// activation; incremented elsewhere by the extraction pipeline.
    pub credits_used: i64,

    /// Processor customer reference. Once set, never cleared.
    pub stripe_customer_id: Option<String>,

    /// Processor subscription reference. Cleared on cancellation.
    pub stripe_subscription_id: Option<String>,

    /// End of the current billing period.
    pub current_period_end: Option<Timestamp>,

    /// Whether the subscription is set to lapse at period end.
    pub cancel_at_period_end: bool,

    /// Monotonic false→true; set only on successful promo-priced
    /// activation and never reverted.
    pub welcome_offer_used: bool,

    /// Immutable; drives welcome-offer eligibility.
    pub account_created_at: Timestamp,

    pub updated_at: Timestamp,
}

impl Entitlement {
    /// Creates the default record at first contact after sign-up.
    pub fn new_free(user_id: UserId, now: Timestamp) -> Self {
        Self {
            user_id,
            tier: SubscriptionTier::Free,
            status: SubscriptionStatus::Canceled,
            credits_total: SubscriptionTier::Free.credit_ceiling(),
            credits_used: 0,
            stripe_customer_id: None,
            stripe_subscription_id: None,
            current_period_end: None,
            cancel_at_period_end: false,
            welcome_offer_used: false,
            account_created_at: now,
            updated_at: now,
        }
    }

    /// Credits still available this period.
    pub fn credits_remaining(&self) -> i64 {
        (self.credits_total - self.credits_used).max(0)
    }
}
