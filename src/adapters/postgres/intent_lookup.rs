//! PostgreSQL implementation of IntentLookup.
//!
//! Append-only `stripe_intents` table, read most-recent-first per
//! customer. Rows have a short effective lifetime and are never
//! authoritative for entitlement.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;

use crate::domain::foundation::{DomainError, ErrorCode, Timestamp};
use crate::ports::{IntentLookup, IntentRecord};

/// PostgreSQL implementation of the IntentLookup port.
pub struct PostgresIntentLookup {
    pool: PgPool,
}

impl PostgresIntentLookup {
    /// Creates a new lookup with the given connection pool.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(Debug, sqlx::FromRow)]
struct IntentRow {
    payment_intent_id: String,
    client_secret: Option<String>,
    created_at: DateTime<Utc>,
}

impl From<IntentRow> for IntentRecord {
    fn from(row: IntentRow) -> Self {
        IntentRecord {
            payment_intent_id: row.payment_intent_id,
            client_secret: row.client_secret,
            created_at: Timestamp::from_datetime(row.created_at),
        }
    }
}

#[async_trait]
impl IntentLookup for PostgresIntentLookup {
    async fn latest_for_customer(
        &self,
        customer_id: &str,
    ) -> Result<Option<IntentRecord>, DomainError> {
        let row: Option<IntentRow> = sqlx::query_as(
            r#"
            SELECT payment_intent_id, client_secret, created_at
            FROM stripe_intents
            WHERE customer_id = $1
            ORDER BY created_at DESC
            LIMIT 1
            "#,
        )
        .bind(customer_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| {
            DomainError::new(
                ErrorCode::DatabaseError,
                format!("Failed to load latest intent: {}", e),
            )
        })?;

        Ok(row.map(IntentRecord::from))
    }

    async fn record(&self, customer_id: &str, record: &IntentRecord) -> Result<(), DomainError> {
        sqlx::query(
            r#"
            INSERT INTO stripe_intents (customer_id, payment_intent_id, client_secret, created_at)
            VALUES ($1, $2, $3, $4)
            "#,
        )
        .bind(customer_id)
        .bind(&record.payment_intent_id)
        .bind(&record.client_secret)
        .bind(*record.created_at.as_datetime())
        .execute(&self.pool)
        .await
        .map_err(|e| {
            DomainError::new(
                ErrorCode::DatabaseError,
                format!("Failed to record intent: {}", e),
            )
        })?;

        Ok(())
    }
}
