//! Side-channel payment intent lookup port.
//!
//! A small append-only record keyed by processor customer id, written
//! by the checkout flow when it discovers a payment intent and read by
//! the polling client when the processor could not return a usable
//! client secret synchronously. Most-recent-wins; never authoritative
//! for entitlement.

use async_trait::async_trait;

use crate::domain::foundation::{DomainError, Timestamp};

/// One recorded payment intent for a customer.
#[derive(Debug, Clone, PartialEq)]
pub struct IntentRecord {
    pub payment_intent_id: String,
    pub client_secret: Option<String>,
    pub created_at: Timestamp,
}

/// Port for the side-channel intent table.
#[async_trait]
pub trait IntentLookup: Send + Sync {
    /// Most recent intent recorded for this customer, if any.
    async fn latest_for_customer(
        &self,
        customer_id: &str,
    ) -> Result<Option<IntentRecord>, DomainError>;

    /// Append an intent record for this customer.
    async fn record(&self, customer_id: &str, record: &IntentRecord) -> Result<(), DomainError>;
}
