//! CustomerProvisioner - ensures a processor-side customer exists for a
//! local user.
//!
//! A stale stored customer id (deleted/invalid upstream) falls through
//! to creation; the external reference may be stale but the local user
//! is not. Persisting a newly created id happens before the caller sees
//! success: an orphaned processor customer is recoverable, a local
//! record with no way to find its processor identity is not.

use std::sync::Arc;

use crate::domain::billing::BillingError;
use crate::domain::foundation::UserId;
use crate::ports::{CreateCustomerRequest, EntitlementStore, PaymentGateway};

pub struct CustomerProvisioner {
    store: Arc<dyn EntitlementStore>,
    gateway: Arc<dyn PaymentGateway>,
}

impl CustomerProvisioner {
    pub fn new(store: Arc<dyn EntitlementStore>, gateway: Arc<dyn PaymentGateway>) -> Self {
        Self { store, gateway }
    }

    /// Returns a live processor customer id for this user, creating and
    /// persisting one when needed.
    pub async fn get_or_create(
        &self,
        user_id: &UserId,
        email: &str,
        existing_customer_id: Option<&str>,
    ) -> Result<String, BillingError> {
        if let Some(customer_id) = existing_customer_id {
            match self.gateway.get_customer(customer_id).await {
                Ok(Some(customer)) => return Ok(customer.id),
                Ok(None) => {
                    tracing::warn!(
                        user_id = %user_id,
                        customer_id = %customer_id,
                        "Stored customer missing or deleted upstream; creating a new one"
                    );
                }
                Err(e) => {
                    tracing::warn!(
                        user_id = %user_id,
                        customer_id = %customer_id,
                        error = %e,
                        "Customer retrieval failed; falling through to creation"
                    );
                }
            }
        }

        let customer = self
            .gateway
            .create_customer(CreateCustomerRequest {
                user_id: user_id.clone(),
                email: email.to_string(),
            })
            .await
            .map_err(BillingError::from)?;

        tracing::info!(
            user_id = %user_id,
            customer_id = %customer.id,
            "Created processor customer"
        );

        // Persist before reporting success; failure here is fatal.
        self.store
            .set_customer_id(user_id, &customer.id)
            .await
            .map_err(|e| {
                tracing::error!(
                    user_id = %user_id,
                    customer_id = %customer.id,
                    error = %e,
                    "Failed to persist new customer id"
                );
                BillingError::from(e)
            })?;

        Ok(customer.id)
    }
}
