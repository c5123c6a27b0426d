//! PostgreSQL implementation of EntitlementStore.
//!
//! One row per user in the `entitlements` table, written exclusively
//! through keyed single-row updates. The offer flag's monotonicity is
//! enforced in SQL (`welcome_offer_used OR $n`) so racing writers
//! cannot revert it.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;

use crate::domain::billing::{Entitlement, SubscriptionStatus, SubscriptionTier};
use crate::domain::foundation::{DomainError, ErrorCode, Timestamp, UserId};
use crate::ports::{ActivationWrite, EntitlementStore, StatusWrite};

/// PostgreSQL implementation of the EntitlementStore port.
pub struct PostgresEntitlementStore {
    pool: PgPool,
}

impl PostgresEntitlementStore {
    /// Creates a new store with the given connection pool.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

/// Database row representation of an entitlement record.
#[derive(Debug, sqlx::FromRow)]
struct EntitlementRow {
    user_id: String,
    subscription_tier: String,
    subscription_status: String,
    credits_total: i64,
    credits_used: i64,
    stripe_customer_id: Option<String>,
    stripe_subscription_id: Option<String>,
    subscription_current_period_end: Option<DateTime<Utc>>,
    subscription_cancel_at_period_end: bool,
    welcome_offer_used: bool,
    account_created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<EntitlementRow> for Entitlement {
    type Error = DomainError;

    fn try_from(row: EntitlementRow) -> Result<Self, Self::Error> {
        let tier = SubscriptionTier::parse(&row.subscription_tier).ok_or_else(|| {
            DomainError::new(
                ErrorCode::DatabaseError,
                format!("Invalid tier value: {}", row.subscription_tier),
            )
        })?;

        Ok(Entitlement {
            user_id: UserId::new(row.user_id).map_err(|e| {
                DomainError::new(ErrorCode::DatabaseError, format!("Invalid user_id: {}", e))
            })?,
            tier,
            status: SubscriptionStatus::parse(&row.subscription_status),
            credits_total: row.credits_total,
            credits_used: row.credits_used,
            stripe_customer_id: row.stripe_customer_id,
            stripe_subscription_id: row.stripe_subscription_id,
            current_period_end: row
                .subscription_current_period_end
                .map(Timestamp::from_datetime),
            cancel_at_period_end: row.subscription_cancel_at_period_end,
            welcome_offer_used: row.welcome_offer_used,
            account_created_at: Timestamp::from_datetime(row.account_created_at),
            updated_at: Timestamp::from_datetime(row.updated_at),
        })
    }
}

const SELECT_COLUMNS: &str = r#"
    SELECT user_id, subscription_tier, subscription_status, credits_total,
           credits_used, stripe_customer_id, stripe_subscription_id,
           subscription_current_period_end, subscription_cancel_at_period_end,
           welcome_offer_used, account_created_at, updated_at
    FROM entitlements
"#;

fn db_error(context: &str, e: sqlx::Error) -> DomainError {
    DomainError::new(ErrorCode::DatabaseError, format!("{}: {}", context, e))
}

fn not_found(user_id: &UserId) -> DomainError {
    DomainError::new(ErrorCode::EntitlementNotFound, "No entitlement record")
        .with_detail("user_id", user_id.as_str())
}

#[async_trait]
impl EntitlementStore for PostgresEntitlementStore {
    async fn find_by_user(&self, user_id: &UserId) -> Result<Option<Entitlement>, DomainError> {
        let row: Option<EntitlementRow> =
            sqlx::query_as(&format!("{} WHERE user_id = $1", SELECT_COLUMNS))
                .bind(user_id.as_str())
                .fetch_optional(&self.pool)
                .await
                .map_err(|e| db_error("Failed to load entitlement", e))?;

        row.map(Entitlement::try_from).transpose()
    }

    async fn find_by_customer(
        &self,
        customer_id: &str,
    ) -> Result<Option<Entitlement>, DomainError> {
        let row: Option<EntitlementRow> =
            sqlx::query_as(&format!("{} WHERE stripe_customer_id = $1", SELECT_COLUMNS))
                .bind(customer_id)
                .fetch_optional(&self.pool)
                .await
                .map_err(|e| db_error("Failed to load entitlement by customer", e))?;

        row.map(Entitlement::try_from).transpose()
    }

    async fn create(&self, record: &Entitlement) -> Result<(), DomainError> {
        sqlx::query(
            r#"
            INSERT INTO entitlements (
                user_id, subscription_tier, subscription_status, credits_total,
                credits_used, stripe_customer_id, stripe_subscription_id,
                subscription_current_period_end, subscription_cancel_at_period_end,
                welcome_offer_used, account_created_at, updated_at
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
            "#,
        )
        .bind(record.user_id.as_str())
        .bind(record.tier.as_str())
        .bind(record.status.as_str())
        .bind(record.credits_total)
        .bind(record.credits_used)
        .bind(&record.stripe_customer_id)
        .bind(&record.stripe_subscription_id)
        .bind(record.current_period_end.map(|t| *t.as_datetime()))
        .bind(record.cancel_at_period_end)
        .bind(record.welcome_offer_used)
        .bind(*record.account_created_at.as_datetime())
        .bind(*record.updated_at.as_datetime())
        .execute(&self.pool)
        .await
        .map_err(|e| {
            if let sqlx::Error::Database(db_err) = &e {
                if db_err.constraint() == Some("entitlements_pkey") {
                    return DomainError::new(
                        ErrorCode::DatabaseError,
                        "Entitlement record already exists",
                    );
                }
            }
            db_error("Failed to create entitlement", e)
        })?;

        Ok(())
    }

    async fn set_customer_id(
        &self,
        user_id: &UserId,
        customer_id: &str,
    ) -> Result<(), DomainError> {
        let result = sqlx::query(
            r#"
            UPDATE entitlements SET
                stripe_customer_id = $2,
                updated_at = NOW()
            WHERE user_id = $1
            "#,
        )
        .bind(user_id.as_str())
        .bind(customer_id)
        .execute(&self.pool)
        .await
        .map_err(|e| db_error("Failed to persist customer id", e))?;

        if result.rows_affected() == 0 {
            return Err(not_found(user_id));
        }
        Ok(())
    }

    async fn apply_activation(&self, write: &ActivationWrite) -> Result<(), DomainError> {
        let result = sqlx::query(
            r#"
            UPDATE entitlements SET
                stripe_customer_id = $2,
                stripe_subscription_id = $3,
                subscription_tier = $4,
                subscription_status = $5,
                subscription_current_period_end = $6,
                subscription_cancel_at_period_end = $7,
                credits_total = $8,
                credits_used = 0,
                welcome_offer_used = welcome_offer_used OR $9,
                updated_at = NOW()
            WHERE user_id = $1
            "#,
        )
        .bind(write.user_id.as_str())
        .bind(&write.customer_id)
        .bind(&write.subscription_id)
        .bind(write.tier.as_str())
        .bind(write.status.as_str())
        .bind(write.current_period_end.map(|t| *t.as_datetime()))
        .bind(write.cancel_at_period_end)
        .bind(write.credits_total)
        .bind(write.mark_offer_used)
        .execute(&self.pool)
        .await
        .map_err(|e| db_error("Failed to apply activation", e))?;

        if result.rows_affected() == 0 {
            return Err(not_found(&write.user_id));
        }
        Ok(())
    }

    async fn update_status(&self, write: &StatusWrite) -> Result<(), DomainError> {
        let result = sqlx::query(
            r#"
            UPDATE entitlements SET
                subscription_status = $2,
                subscription_current_period_end = $3,
                subscription_cancel_at_period_end = COALESCE($4, subscription_cancel_at_period_end),
                updated_at = NOW()
            WHERE user_id = $1
            "#,
        )
        .bind(write.user_id.as_str())
        .bind(write.status.as_str())
        .bind(write.current_period_end.map(|t| *t.as_datetime()))
        .bind(write.cancel_at_period_end)
        .execute(&self.pool)
        .await
        .map_err(|e| db_error("Failed to update status", e))?;

        if result.rows_affected() == 0 {
            return Err(not_found(&write.user_id));
        }
        Ok(())
    }

    async fn downgrade_to_free(&self, user_id: &UserId) -> Result<(), DomainError> {
        let free_credits = SubscriptionTier::Free.credit_ceiling();
        let result = sqlx::query(
            r#"
            UPDATE entitlements SET
                subscription_tier = 'free',
                subscription_status = 'canceled',
                stripe_subscription_id = NULL,
                credits_total = $2,
                credits_used = 0,
                updated_at = NOW()
            WHERE user_id = $1
            "#,
        )
        .bind(user_id.as_str())
        .bind(free_credits)
        .execute(&self.pool)
        .await
        .map_err(|e| db_error("Failed to downgrade entitlement", e))?;

        if result.rows_affected() == 0 {
            return Err(not_found(user_id));
        }
        Ok(())
    }
}
