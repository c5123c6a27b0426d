//! In-Memory Intent Lookup Adapter
//!
//! Append-only intent records per customer, most-recent-wins read.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::domain::foundation::DomainError;
use crate::ports::{IntentLookup, IntentRecord};

/// In-memory side-channel intent table.
#[derive(Debug, Clone, Default)]
pub struct InMemoryIntentLookup {
    records: Arc<RwLock<HashMap<String, Vec<IntentRecord>>>>,
}

impl InMemoryIntentLookup {
    /// Create an empty lookup.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of records stored for a customer.
    pub async fn count_for(&self, customer_id: &str) -> usize {
        self.records
            .read()
            .await
            .get(customer_id)
            .map(Vec::len)
            .unwrap_or(0)
    }
}

#[async_trait]
impl IntentLookup for InMemoryIntentLookup {
    async fn latest_for_customer(
        &self,
        customer_id: &str,
    ) -> Result<Option<IntentRecord>, DomainError> {
        Ok(self
            .records
            .read()
            .await
            .get(customer_id)
            .and_then(|records| {
                records
                    .iter()
                    .max_by_key(|r| r.created_at.as_unix_seconds())
                    .cloned()
            }))
    }

    async fn record(&self, customer_id: &str, record: &IntentRecord) -> Result<(), DomainError> {
        self.records
            .write()
            .await
            .entry(customer_id.to_string())
            .or_default()
            .push(record.clone());
        Ok(())
    }
}
