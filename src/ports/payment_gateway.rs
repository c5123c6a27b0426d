//! Payment gateway port for the external payment processor.
//!
//! Defines the contract the reconciliation engine needs from Stripe:
//! customer and subscription lifecycle, invoice settlement, and webhook
//! verification. Implementations must be safe to retry; the engine
//! assumes every call can race a concurrent webhook delivery.

use std::collections::HashMap;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::domain::billing::{
    BillingError, BillingPeriod, Plan, StripeEvent, SubscriptionStatus,
};
use crate::domain::foundation::UserId;

/// Port for payment processor integrations.
#[async_trait]
pub trait PaymentGateway: Send + Sync {
    /// Create a customer in the payment system.
    async fn create_customer(
        &self,
        request: CreateCustomerRequest,
    ) -> Result<Customer, GatewayError>;

    /// Get a customer by provider id.
    ///
    /// Returns `Ok(None)` when the customer is missing or deleted
    /// upstream; callers fall through to creation in that case.
    async fn get_customer(&self, customer_id: &str) -> Result<Option<Customer>, GatewayError>;

    /// Create a subscription with `default_incomplete` payment behavior
    /// and the full metadata set the webhook path later depends on.
    async fn create_subscription(
        &self,
        request: CreateSubscriptionRequest,
    ) -> Result<Subscription, GatewayError>;

    /// Get a subscription with price, latest invoice, and payment
    /// intent expanded.
    async fn get_subscription(
        &self,
        subscription_id: &str,
    ) -> Result<Option<Subscription>, GatewayError>;

    /// List the customer's incomplete subscriptions (single-flight
    /// recovery sweep).
    async fn list_incomplete_subscriptions(
        &self,
        customer_id: &str,
    ) -> Result<Vec<Subscription>, GatewayError>;

    /// Retrieve an invoice with its payment intent expanded.
    async fn get_invoice(&self, invoice_id: &str) -> Result<Option<Invoice>, GatewayError>;

    /// Attempt to pay an open invoice, optionally with an explicit
    /// payment method.
    async fn pay_invoice(
        &self,
        invoice_id: &str,
        payment_method: Option<&str>,
    ) -> Result<Invoice, GatewayError>;

    /// List the customer's card payment methods, most recent first.
    async fn list_card_payment_methods(
        &self,
        customer_id: &str,
        limit: u32,
    ) -> Result<Vec<PaymentMethodRef>, GatewayError>;

    /// Flag the subscription to cancel at period end.
    async fn set_cancel_at_period_end(
        &self,
        subscription_id: &str,
    ) -> Result<Subscription, GatewayError>;

    /// Verify a webhook signature and parse the event envelope.
    async fn verify_webhook(
        &self,
        payload: &[u8],
        signature: &str,
    ) -> Result<StripeEvent, GatewayError>;
}

/// Request to create a customer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateCustomerRequest {
    /// Internal user id (stored as metadata).
    pub user_id: UserId,

    /// Customer email address.
    pub email: String,
}

/// Customer in the payment system.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Customer {
    /// Provider's customer id.
    pub id: String,

    /// Customer email.
    pub email: Option<String>,

    /// When the customer was created (provider timestamp).
    pub created: i64,
}

/// Request to create a subscription.
///
/// Carries the purchase intent as typed fields; the adapter writes them
/// redundantly into subscription metadata, the only channel by which
/// later independently-delivered webhooks can recover business intent.
#[derive(Debug, Clone)]
pub struct CreateSubscriptionRequest {
    pub customer_id: String,
    pub price_id: String,
    pub user_id: UserId,
    pub plan: Plan,
    pub period: BillingPeriod,
    pub offer_applied: bool,
    /// Client-generated single-flight token, echoed in metadata so
    /// duplicate attempts can be matched processor-side.
    pub idempotency_token: Option<String>,
}

/// Subscription in the payment system, with the expansions the
/// reconciliation engine needs already resolved.
#[derive(Debug, Clone, Default)]
pub struct Subscription {
    pub id: String,
    pub customer_id: String,
    pub status: SubscriptionStatus,

    /// Price id of the first item, when expanded.
    pub price_id: Option<String>,

    /// Epoch seconds; the adapter falls back to the item-level value
    /// when the top-level field is absent. May be 0/absent for
    /// incomplete subscriptions.
    pub current_period_end: Option<i64>,

    pub cancel_at_period_end: bool,

    /// Subscription metadata (userId, plan, billingPeriod, ...).
    pub metadata: HashMap<String, String>,

    /// Latest invoice, when expanded.
    pub latest_invoice: Option<Invoice>,
}

impl Subscription {
    /// Metadata lookup helper.
    pub fn metadata_value(&self, key: &str) -> Option<&str> {
        self.metadata.get(key).map(String::as_str)
    }
}

/// Invoice in the payment system.
#[derive(Debug, Clone, Default)]
pub struct Invoice {
    pub id: String,

    /// Processor invoice status string ("open", "paid", ...).
    pub status: String,

    /// Payment method attached to the invoice, if any.
    pub payment_method: Option<String>,

    /// Payment intent, when expanded.
    pub payment_intent: Option<PaymentIntent>,

    pub amount_paid: i64,
}

impl Invoice {
    pub fn is_open(&self) -> bool {
        self.status == "open"
    }
}

/// Payment intent attached to an invoice.
#[derive(Debug, Clone)]
pub struct PaymentIntent {
    pub id: String,
    pub client_secret: Option<String>,
    pub status: String,
}

/// Reference to a stored payment method.
#[derive(Debug, Clone)]
pub struct PaymentMethodRef {
    pub id: String,
}

/// Errors from payment gateway operations.
#[derive(Debug, Clone)]
pub struct GatewayError {
    /// Error code for categorization.
    pub code: GatewayErrorCode,

    /// Human-readable message.
    pub message: String,

    /// Whether the operation can be retried.
    pub retryable: bool,
}

impl GatewayError {
    /// Create a new gateway error.
    pub fn new(code: GatewayErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            retryable: code.is_retryable(),
        }
    }

    /// Create a network error.
    pub fn network(message: impl Into<String>) -> Self {
        Self::new(GatewayErrorCode::NetworkError, message)
    }

    /// Create a provider API error.
    pub fn provider(message: impl Into<String>) -> Self {
        Self::new(GatewayErrorCode::ProviderError, message)
    }

    /// Create a not found error.
    pub fn not_found(resource: &str) -> Self {
        Self::new(GatewayErrorCode::NotFound, format!("{} not found", resource))
    }

    /// Create an invalid webhook error.
    pub fn invalid_webhook(message: impl Into<String>) -> Self {
        Self::new(GatewayErrorCode::InvalidWebhook, message)
    }
}

impl std::fmt::Display for GatewayError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.code, self.message)
    }
}

impl std::error::Error for GatewayError {}

impl From<GatewayError> for BillingError {
    fn from(err: GatewayError) -> Self {
        match err.code {
            GatewayErrorCode::NotFound => BillingError::SubscriptionNotFound(err.message),
            GatewayErrorCode::InvalidWebhook => BillingError::InvalidSignature,
            _ => BillingError::Upstream(err.message),
        }
    }
}

/// Gateway error codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GatewayErrorCode {
    /// Network connectivity issue.
    NetworkError,

    /// API authentication failed.
    AuthenticationError,

    /// Card was declined.
    CardDeclined,

    /// Resource not found.
    NotFound,

    /// Rate limit exceeded.
    RateLimitExceeded,

    /// Invalid webhook signature or payload.
    InvalidWebhook,

    /// Provider API error.
    ProviderError,
}

impl GatewayErrorCode {
    /// Check if this error type is typically retryable.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            GatewayErrorCode::NetworkError | GatewayErrorCode::RateLimitExceeded
        )
    }
}

impl std::fmt::Display for GatewayErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            GatewayErrorCode::NetworkError => "network_error",
            GatewayErrorCode::AuthenticationError => "authentication_error",
            GatewayErrorCode::CardDeclined => "card_declined",
            GatewayErrorCode::NotFound => "not_found",
            GatewayErrorCode::RateLimitExceeded => "rate_limit_exceeded",
            GatewayErrorCode::InvalidWebhook => "invalid_webhook",
            GatewayErrorCode::ProviderError => "provider_error",
        };
        write!(f, "{}", s)
    }
}
