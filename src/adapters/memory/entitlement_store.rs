//! In-Memory Entitlement Store Adapter
//!
//! Keeps entitlement records in a map keyed by user id. Useful for
//! testing and development; implements the same upsert semantics as the
//! Postgres adapter, including offer-flag monotonicity.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::domain::billing::{Entitlement, SubscriptionStatus, SubscriptionTier};
use crate::domain::foundation::{DomainError, ErrorCode, Timestamp, UserId};
use crate::ports::{ActivationWrite, EntitlementStore, StatusWrite};

/// In-memory entitlement table.
#[derive(Debug, Clone, Default)]
pub struct InMemoryEntitlementStore {
    records: Arc<RwLock<HashMap<String, Entitlement>>>,
}

impl InMemoryEntitlementStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a store seeded with one record.
    pub async fn with_record(record: Entitlement) -> Self {
        let store = Self::new();
        store
            .records
            .write()
            .await
            .insert(record.user_id.as_str().to_string(), record);
        store
    }

    /// Snapshot a record for assertions.
    pub async fn get(&self, user_id: &UserId) -> Option<Entitlement> {
        self.records.read().await.get(user_id.as_str()).cloned()
    }

    fn missing(user_id: &UserId) -> DomainError {
        DomainError::new(ErrorCode::EntitlementNotFound, "No entitlement record")
            .with_detail("user_id", user_id.as_str())
    }
}

#[async_trait]
impl EntitlementStore for InMemoryEntitlementStore {
    async fn find_by_user(&self, user_id: &UserId) -> Result<Option<Entitlement>, DomainError> {
        Ok(self.records.read().await.get(user_id.as_str()).cloned())
    }

    async fn find_by_customer(
        &self,
        customer_id: &str,
    ) -> Result<Option<Entitlement>, DomainError> {
        Ok(self
            .records
            .read()
            .await
            .values()
            .find(|r| r.stripe_customer_id.as_deref() == Some(customer_id))
            .cloned())
    }

    async fn create(&self, record: &Entitlement) -> Result<(), DomainError> {
        let mut records = self.records.write().await;
        if records.contains_key(record.user_id.as_str()) {
            return Err(DomainError::new(
                ErrorCode::DatabaseError,
                "Entitlement record already exists",
            ));
        }
        records.insert(record.user_id.as_str().to_string(), record.clone());
        Ok(())
    }

    async fn set_customer_id(
        &self,
        user_id: &UserId,
        customer_id: &str,
    ) -> Result<(), DomainError> {
        let mut records = self.records.write().await;
        let record = records
            .get_mut(user_id.as_str())
            .ok_or_else(|| Self::missing(user_id))?;
        record.stripe_customer_id = Some(customer_id.to_string());
        record.updated_at = Timestamp::now();
        Ok(())
    }

    async fn apply_activation(&self, write: &ActivationWrite) -> Result<(), DomainError> {
        let mut records = self.records.write().await;
        let record = records
            .get_mut(write.user_id.as_str())
            .ok_or_else(|| Self::missing(&write.user_id))?;

        record.stripe_customer_id = Some(write.customer_id.clone());
        record.stripe_subscription_id = Some(write.subscription_id.clone());
        record.tier = write.tier;
        record.status = write.status;
        record.current_period_end = write.current_period_end;
        record.cancel_at_period_end = write.cancel_at_period_end;
        record.credits_total = write.credits_total;
        record.credits_used = 0;
        // Monotonic: never reverts to false.
        record.welcome_offer_used = record.welcome_offer_used || write.mark_offer_used;
        record.updated_at = Timestamp::now();
        Ok(())
    }

    async fn update_status(&self, write: &StatusWrite) -> Result<(), DomainError> {
        let mut records = self.records.write().await;
        let record = records
            .get_mut(write.user_id.as_str())
            .ok_or_else(|| Self::missing(&write.user_id))?;

        record.status = write.status;
        record.current_period_end = write.current_period_end;
        if let Some(flag) = write.cancel_at_period_end {
            record.cancel_at_period_end = flag;
        }
        record.updated_at = Timestamp::now();
        Ok(())
    }

    async fn downgrade_to_free(&self, user_id: &UserId) -> Result<(), DomainError> {
        let mut records = self.records.write().await;
        let record = records
            .get_mut(user_id.as_str())
            .ok_or_else(|| Self::missing(user_id))?;

        record.tier = SubscriptionTier::Free;
        record.status = SubscriptionStatus::Canceled;
        record.stripe_subscription_id = None;
        record.credits_total = SubscriptionTier::Free.credit_ceiling();
        record.credits_used = 0;
        record.updated_at = Timestamp::now();
        Ok(())
    }
}
