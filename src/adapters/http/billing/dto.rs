//! HTTP DTOs (Data Transfer Objects) for billing endpoints.
//!
//! These types define the JSON request/response structure for the
//! billing API. They are the boundary between HTTP and the application
//! layer.

use serde::{Deserialize, Serialize};

use crate::application::handlers::billing::{CancelOutcome, CheckoutOutcome, SyncOutcome};
use crate::domain::billing::{welcome_offer, Entitlement};
use crate::domain::foundation::Timestamp;
use crate::ports::IntentRecord;

// ════════════════════════════════════════════════════════════════════════════════
// Request DTOs
// ════════════════════════════════════════════════════════════════════════════════

/// Request to start a checkout attempt.
#[derive(Debug, Clone, Deserialize)]
pub struct CreateCheckoutRequest {
    /// Plan to purchase ("starter" or "pro").
    pub plan: String,
    /// Billing period ("monthly" or "yearly").
    pub billing_period: String,
    /// Email for the processor customer.
    pub email: String,
    /// Client-generated token, one per checkout attempt.
    pub idempotency_token: String,
}

/// Request to sync a subscription after client-side confirmation.
#[derive(Debug, Clone, Deserialize)]
pub struct SyncSubscriptionRequest {
    pub subscription_id: String,
}

/// Query parameters for the side-channel intent read.
#[derive(Debug, Clone, Deserialize)]
pub struct LatestIntentParams {
    pub customer_id: String,
}

// ════════════════════════════════════════════════════════════════════════════════
// Response DTOs
// ════════════════════════════════════════════════════════════════════════════════

/// Response for checkout initiation.
#[derive(Debug, Clone, Serialize)]
pub struct CheckoutResponse {
    pub subscription_id: String,
    pub customer_id: String,
    pub client_secret: Option<String>,
    pub needs_polling: bool,
}

impl From<CheckoutOutcome> for CheckoutResponse {
    fn from(outcome: CheckoutOutcome) -> Self {
        Self {
            subscription_id: outcome.subscription_id,
            customer_id: outcome.customer_id,
            client_secret: outcome.client_secret,
            needs_polling: outcome.needs_polling,
        }
    }
}

/// Response for a sync call. `success: false` with a pending status is
/// a normal outcome, not an error.
#[derive(Debug, Clone, Serialize)]
pub struct SyncResponse {
    pub success: bool,
    pub status: String,
}

impl From<SyncOutcome> for SyncResponse {
    fn from(outcome: SyncOutcome) -> Self {
        Self {
            success: outcome.success,
            status: outcome.status.as_str().to_string(),
        }
    }
}

/// Response for a cancellation request.
#[derive(Debug, Clone, Serialize)]
pub struct CancelResponse {
    pub status: String,
    pub cancel_at_period_end: bool,
}

impl From<CancelOutcome> for CancelResponse {
    fn from(outcome: CancelOutcome) -> Self {
        Self {
            status: outcome.status.as_str().to_string(),
            cancel_at_period_end: outcome.cancel_at_period_end,
        }
    }
}

/// Entitlement view for the UI.
#[derive(Debug, Clone, Serialize)]
pub struct EntitlementResponse {
    pub user_id: String,
    pub tier: String,
    pub status: String,
    pub credits_total: i64,
    pub credits_used: i64,
    pub credits_remaining: i64,
    pub subscription_current_period_end: Option<String>,
    pub subscription_cancel_at_period_end: bool,
    pub welcome_offer_used: bool,
    /// Recomputed server-side; the client never asserts this.
    pub welcome_offer_active: bool,
    pub account_created_at: String,
}

impl EntitlementResponse {
    pub fn from_record(record: Entitlement, now: Timestamp) -> Self {
        let welcome_offer_active = welcome_offer::is_offer_active(
            Some(record.account_created_at),
            record.welcome_offer_used,
            now,
        );
        Self {
            user_id: record.user_id.to_string(),
            tier: record.tier.as_str().to_string(),
            status: record.status.as_str().to_string(),
            credits_total: record.credits_total,
            credits_used: record.credits_used,
            credits_remaining: record.credits_remaining(),
            subscription_current_period_end: record
                .current_period_end
                .map(|t| t.as_datetime().to_rfc3339()),
            subscription_cancel_at_period_end: record.cancel_at_period_end,
            welcome_offer_used: record.welcome_offer_used,
            welcome_offer_active,
            account_created_at: record.account_created_at.as_datetime().to_rfc3339(),
        }
    }
}

/// Response for the side-channel intent read.
#[derive(Debug, Clone, Serialize)]
pub struct LatestIntentResponse {
    pub payment_intent_id: Option<String>,
    pub client_secret: Option<String>,
    pub created_at: Option<String>,
}

impl From<Option<IntentRecord>> for LatestIntentResponse {
    fn from(record: Option<IntentRecord>) -> Self {
        match record {
            Some(record) => Self {
                payment_intent_id: Some(record.payment_intent_id),
                client_secret: record.client_secret,
                created_at: Some(record.created_at.as_datetime().to_rfc3339()),
            },
            None => Self {
                payment_intent_id: None,
                client_secret: None,
                created_at: None,
            },
        }
    }
}

/// Acknowledgment body for webhook deliveries.
#[derive(Debug, Clone, Serialize)]
pub struct WebhookAckResponse {
    pub received: bool,
}

// ════════════════════════════════════════════════════════════════════════════════
// Error Response DTO
// ════════════════════════════════════════════════════════════════════════════════

/// Standard error response for API errors.
#[derive(Debug, Clone, Serialize)]
pub struct ErrorResponse {
    /// Error code for programmatic handling.
    pub error_code: String,
    /// Human-readable error message.
    pub message: String,
}

impl ErrorResponse {
    /// Create a new error response.
    pub fn new(error_code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            error_code: error_code.into(),
            message: message.into(),
        }
    }
}
