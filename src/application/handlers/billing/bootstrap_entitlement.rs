//! BootstrapEntitlementHandler - creates the default free-tier record
//! at first contact after identity-provider sign-up.
//!
//! Idempotent: an existing record is returned unchanged, and a lost
//! creation race resolves to the winner's row. `account_created_at` is
//! set exactly once here and drives welcome-offer eligibility.

use std::sync::Arc;

use crate::domain::billing::{BillingError, Entitlement};
use crate::domain::foundation::{Timestamp, UserId};
use crate::ports::EntitlementStore;

pub struct BootstrapEntitlementHandler {
    store: Arc<dyn EntitlementStore>,
}

impl BootstrapEntitlementHandler {
    pub fn new(store: Arc<dyn EntitlementStore>) -> Self {
        Self { store }
    }

    pub async fn handle(&self, user_id: &UserId) -> Result<Entitlement, BillingError> {
        if let Some(existing) = self
            .store
            .find_by_user(user_id)
            .await
            .map_err(BillingError::from)?
        {
            return Ok(existing);
        }

        let record = Entitlement::new_free(user_id.clone(), Timestamp::now());
        match self.store.create(&record).await {
            Ok(()) => {
                tracing::info!(user_id = %user_id, "Created entitlement record");
                Ok(record)
            }
            Err(create_err) => {
                // Two first-contact requests can race; the winner's row
                // is the answer.
                if let Some(existing) = self
                    .store
                    .find_by_user(user_id)
                    .await
                    .map_err(BillingError::from)?
                {
                    return Ok(existing);
                }
                Err(BillingError::from(create_err))
            }
        }
    }
}
