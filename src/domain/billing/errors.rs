//! Billing error taxonomy.
//!
//! Every failure in the reconciliation engine maps to one of these
//! variants, with HTTP status mapping and an explicit operator-alert
//! flag. The load-bearing distinction: an unattributable money event
//! (missing metadata, unknown price) is fatal and must alert, while an
//! event known to be irrelevant is skipped without error.

use axum::http::StatusCode;
use thiserror::Error;

use crate::domain::foundation::{DomainError, ErrorCode, UserId};

/// Errors from billing operations.
#[derive(Debug, Clone, Error)]
pub enum BillingError {
    /// User-correctable input problem (bad plan, bad period).
    #[error("Validation failed for '{field}': {message}")]
    Validation { field: String, message: String },

    /// No entitlement record exists for this user.
    #[error("No entitlement record for user {0}")]
    EntitlementNotFound(UserId),

    /// No subscription to act on (cancel/sync without one).
    #[error("Subscription not found: {0}")]
    SubscriptionNotFound(String),

    /// A money event arrived without the metadata needed to attribute
    /// it to a user. Never swallowed; delivery must be retried and
    /// operators alerted.
    #[error("Missing required metadata: {0}")]
    MissingMetadata(&'static str),

    /// A money event referenced a price id outside the catalog.
    #[error("Price id not in catalog: {0}")]
    UnknownPrice(String),

    /// A price mapping is absent from deployment configuration.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// The client-secret poll exhausted its timeout. Recoverable; the
    /// caller should offer a retry.
    #[error("Timed out polling for payment intent secret")]
    PollTimeout,

    /// Webhook signature verification failed.
    #[error("Invalid webhook signature")]
    InvalidSignature,

    /// Failed to parse a webhook payload.
    #[error("Parse error: {0}")]
    Parse(String),

    /// Payment processor API failure.
    #[error("Upstream payment processor error: {0}")]
    Upstream(String),

    /// Entitlement store failure.
    #[error("Database error: {0}")]
    Database(String),
}

impl BillingError {
    pub fn validation(field: impl Into<String>, message: impl Into<String>) -> Self {
        BillingError::Validation {
            field: field.into(),
            message: message.into(),
        }
    }

    pub fn configuration(message: impl Into<String>) -> Self {
        BillingError::Configuration(message.into())
    }

    pub fn upstream(message: impl Into<String>) -> Self {
        BillingError::Upstream(message.into())
    }

    pub fn database(message: impl Into<String>) -> Self {
        BillingError::Database(message.into())
    }

    /// Returns true if this error represents an unattributable money
    /// event or a deployment defect that operators must see.
    pub fn alerts_operators(&self) -> bool {
        matches!(
            self,
            BillingError::MissingMetadata(_)
                | BillingError::UnknownPrice(_)
                | BillingError::Configuration(_)
        )
    }

    /// Maps the error to an HTTP status code.
    ///
    /// For webhook deliveries the status also controls the processor's
    /// retry behavior: 2xx acknowledges, 4xx drops, 5xx retries.
    pub fn status_code(&self) -> StatusCode {
        match self {
            BillingError::Validation { .. } | BillingError::Parse(_) => StatusCode::BAD_REQUEST,

            BillingError::InvalidSignature => StatusCode::UNAUTHORIZED,

            BillingError::EntitlementNotFound(_) | BillingError::SubscriptionNotFound(_) => {
                StatusCode::NOT_FOUND
            }

            BillingError::PollTimeout => StatusCode::REQUEST_TIMEOUT,

            // Fatal classes; 5xx so webhook deliveries are retried.
            BillingError::MissingMetadata(_)
            | BillingError::UnknownPrice(_)
            | BillingError::Configuration(_)
            | BillingError::Upstream(_)
            | BillingError::Database(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<DomainError> for BillingError {
    fn from(err: DomainError) -> Self {
        match err.code {
            ErrorCode::EntitlementNotFound => match UserId::new(
                err.details
                    .get("user_id")
                    .cloned()
                    .unwrap_or_else(|| "unknown".to_string()),
            ) {
                Ok(user_id) => BillingError::EntitlementNotFound(user_id),
                Err(_) => BillingError::database(err.to_string()),
            },
            ErrorCode::SubscriptionNotFound => BillingError::SubscriptionNotFound(err.message),
            ErrorCode::ConfigurationError => BillingError::Configuration(err.message),
            ErrorCode::ExternalServiceError => BillingError::Upstream(err.message),
            _ => BillingError::Database(err.to_string()),
        }
    }
}
