//! Entitlement store port.
//!
//! The entitlement record is the only shared mutable resource in the
//! engine. Every write is a single keyed upsert; last-write-wins is
//! acceptable because all writers derive their payload from the
//! current, authoritative processor-side subscription object.

use async_trait::async_trait;

use crate::domain::billing::{Entitlement, SubscriptionStatus, SubscriptionTier};
use crate::domain::foundation::{DomainError, Timestamp, UserId};

/// Payload for the reconciler's idempotent activation upsert.
///
/// Applying the same write any number of times yields the same row.
#[derive(Debug, Clone)]
pub struct ActivationWrite {
    pub user_id: UserId,
    pub customer_id: String,
    pub subscription_id: String,
    pub tier: SubscriptionTier,
    pub status: SubscriptionStatus,
    pub current_period_end: Option<Timestamp>,
    pub cancel_at_period_end: bool,
    pub credits_total: i64,
    /// Set `welcome_offer_used` to true. The store must keep the flag
    /// monotonic: a later write with `false` never reverts it.
    pub mark_offer_used: bool,
}

/// Payload for status-only mirror writes.
///
/// Used for non-active subscription updates and payment failures;
/// deliberately cannot touch tier or credits, so a transient past_due
/// never downgrades a user's quota mid-cycle.
#[derive(Debug, Clone)]
pub struct StatusWrite {
    pub user_id: UserId,
    pub status: SubscriptionStatus,
    pub current_period_end: Option<Timestamp>,
    /// None leaves the stored flag untouched.
    pub cancel_at_period_end: Option<bool>,
}

/// Port for the single-row-per-user entitlement table.
#[async_trait]
pub trait EntitlementStore: Send + Sync {
    /// Find the record for a user.
    async fn find_by_user(&self, user_id: &UserId) -> Result<Option<Entitlement>, DomainError>;

    /// Find the record owning a processor customer id.
    async fn find_by_customer(
        &self,
        customer_id: &str,
    ) -> Result<Option<Entitlement>, DomainError>;

    /// Create the initial free-tier record at first contact.
    async fn create(&self, record: &Entitlement) -> Result<(), DomainError>;

    /// Persist a newly provisioned processor customer id.
    async fn set_customer_id(
        &self,
        user_id: &UserId,
        customer_id: &str,
    ) -> Result<(), DomainError>;

    /// The single idempotent activation write (tier, credits, ids,
    /// period, offer flag). Resets `credits_used` to zero.
    async fn apply_activation(&self, write: &ActivationWrite) -> Result<(), DomainError>;

    /// Mirror status/period/cancel-flag without touching tier/credits.
    async fn update_status(&self, write: &StatusWrite) -> Result<(), DomainError>;

    /// Downgrade to the free tier: clear the subscription reference,
    /// set status canceled, reset credits to the free allotment. The
    /// customer id is kept.
    async fn downgrade_to_free(&self, user_id: &UserId) -> Result<(), DomainError>;
}
