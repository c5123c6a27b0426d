//! Stripe payment gateway adapter.
//!
//! Implements the `PaymentGateway` trait against the Stripe HTTP API.
//! Handles customer and subscription lifecycle, invoice settlement,
//! and webhook verification.
//!
//! # Security
//!
//! - HMAC-SHA256 signature verification with constant-time comparison
//! - Timestamp validation (5-minute window) for replay attack prevention
//! - Secrets handled via `secrecy::SecretString`

use async_trait::async_trait;
use hmac::{Hmac, Mac};
use secrecy::{ExposeSecret, SecretString};
use sha2::Sha256;
use subtle::ConstantTimeEq;

use crate::domain::billing::StripeEvent;
use crate::ports::{
    CreateCustomerRequest, CreateSubscriptionRequest, Customer, GatewayError, GatewayErrorCode,
    Invoice, PaymentGateway, PaymentMethodRef, Subscription,
};

use super::wire::{
    hex_encode, SignatureHeader, WireCustomer, WireInvoice, WireList, WirePaymentMethod,
    WireSubscription,
};

type HmacSha256 = Hmac<Sha256>;

/// Maximum age for webhook events (5 minutes).
const MAX_TIMESTAMP_AGE_SECS: i64 = 300;

/// Clock skew tolerance for future timestamps (60 seconds).
const MAX_FUTURE_TOLERANCE_SECS: i64 = 60;

/// Expansions requested on every subscription retrieve.
const SUBSCRIPTION_EXPANSIONS: [(&str, &str); 2] = [
    ("expand[]", "items.data.price"),
    ("expand[]", "latest_invoice.payment_intent"),
];

/// Stripe API configuration.
#[derive(Clone)]
pub struct StripeConfig {
    /// Stripe secret API key (sk_live_... or sk_test_...).
    api_key: SecretString,

    /// Webhook signing secret (whsec_...).
    webhook_secret: SecretString,

    /// Base URL for the Stripe API (default: https://api.stripe.com).
    api_base_url: String,

    /// Whether to reject test-mode events (production).
    require_livemode: bool,
}

impl StripeConfig {
    /// Create a new Stripe configuration.
    pub fn new(api_key: impl Into<String>, webhook_secret: impl Into<String>) -> Self {
        Self {
            api_key: SecretString::new(api_key.into()),
            webhook_secret: SecretString::new(webhook_secret.into()),
            api_base_url: "https://api.stripe.com".to_string(),
            require_livemode: false,
        }
    }

    /// Set a custom API base URL (for testing).
    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.api_base_url = url.into();
        self
    }

    /// Require livemode events in production.
    pub fn with_require_livemode(mut self, require: bool) -> Self {
        self.require_livemode = require;
        self
    }
}

/// Stripe payment gateway adapter.
pub struct StripeGateway {
    config: StripeConfig,
    http_client: reqwest::Client,
}

impl StripeGateway {
    /// Create a new Stripe gateway with the given configuration.
    pub fn new(config: StripeConfig) -> Self {
        Self {
            config,
            http_client: reqwest::Client::new(),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.config.api_base_url, path)
    }

    async fn check_status(response: reqwest::Response) -> Result<reqwest::Response, GatewayError> {
        if response.status().is_success() {
            return Ok(response);
        }
        let status = response.status();
        let error_text = response.text().await.unwrap_or_default();
        tracing::error!(status = %status, error = %error_text, "Stripe API call failed");
        let code = match status.as_u16() {
            404 => GatewayErrorCode::NotFound,
            401 | 403 => GatewayErrorCode::AuthenticationError,
            429 => GatewayErrorCode::RateLimitExceeded,
            _ => GatewayErrorCode::ProviderError,
        };
        Err(GatewayError::new(
            code,
            format!("Stripe API error: {}", error_text),
        ))
    }

    async fn parse_json<T: serde::de::DeserializeOwned>(
        response: reqwest::Response,
    ) -> Result<T, GatewayError> {
        response
            .json()
            .await
            .map_err(|e| GatewayError::provider(format!("Failed to parse Stripe response: {}", e)))
    }

    /// Verify webhook signature using HMAC-SHA256.
    ///
    /// Constant-time comparison; timestamps outside the replay window
    /// are rejected before any MAC work.
    fn verify_signature(
        &self,
        payload: &[u8],
        header: &SignatureHeader,
    ) -> Result<(), GatewayError> {
        let now = chrono::Utc::now().timestamp();
        let age = now - header.timestamp;

        if age > MAX_TIMESTAMP_AGE_SECS {
            tracing::warn!(
                event_timestamp = header.timestamp,
                current_time = now,
                age_secs = age,
                "Webhook event too old - possible replay attack"
            );
            return Err(GatewayError::invalid_webhook(format!(
                "Event too old ({} seconds)",
                age
            )));
        }

        if age < -MAX_FUTURE_TOLERANCE_SECS {
            tracing::warn!(
                event_timestamp = header.timestamp,
                current_time = now,
                "Webhook event from future - clock skew or manipulation"
            );
            return Err(GatewayError::invalid_webhook("Event timestamp in future"));
        }

        let signed_payload = format!("{}.{}", header.timestamp, String::from_utf8_lossy(payload));

        let mut mac =
            HmacSha256::new_from_slice(self.config.webhook_secret.expose_secret().as_bytes())
                .expect("HMAC can take key of any size");

        mac.update(signed_payload.as_bytes());
        let expected = mac.finalize().into_bytes();

        let expected_bytes: &[u8] = expected.as_slice();
        let provided_bytes: &[u8] = &header.v1_signature;

        if expected_bytes.ct_eq(provided_bytes).unwrap_u8() != 1 {
            tracing::warn!(
                expected_signature = hex_encode(expected_bytes),
                "Invalid webhook signature"
            );
            return Err(GatewayError::invalid_webhook("Invalid signature"));
        }

        Ok(())
    }

    /// Parse a verified payload into the event envelope.
    fn parse_event(&self, payload: &[u8]) -> Result<StripeEvent, GatewayError> {
        let event: StripeEvent = serde_json::from_slice(payload).map_err(|e| {
            tracing::warn!(error = %e, "Failed to parse webhook payload");
            GatewayError::invalid_webhook(format!("Invalid JSON: {}", e))
        })?;

        if self.config.require_livemode && !event.livemode {
            tracing::warn!(
                event_id = %event.id,
                "Rejected test mode event in production"
            );
            return Err(GatewayError::invalid_webhook(
                "Test mode events not allowed in production",
            ));
        }

        Ok(event)
    }
}

#[async_trait]
impl PaymentGateway for StripeGateway {
    async fn create_customer(
        &self,
        request: CreateCustomerRequest,
    ) -> Result<Customer, GatewayError> {
        let params = vec![
            ("email", request.email.clone()),
            ("metadata[userId]", request.user_id.to_string()),
        ];

        let response = self
            .http_client
            .post(self.url("/v1/customers"))
            .basic_auth(self.config.api_key.expose_secret(), Option::<&str>::None)
            .form(&params)
            .send()
            .await
            .map_err(|e| GatewayError::network(e.to_string()))?;

        let response = Self::check_status(response).await?;
        let customer: WireCustomer = Self::parse_json(response).await?;
        Ok(customer.into())
    }

    async fn get_customer(&self, customer_id: &str) -> Result<Option<Customer>, GatewayError> {
        let response = self
            .http_client
            .get(self.url(&format!("/v1/customers/{}", customer_id)))
            .basic_auth(self.config.api_key.expose_secret(), Option::<&str>::None)
            .send()
            .await
            .map_err(|e| GatewayError::network(e.to_string()))?;

        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(None);
        }

        let response = Self::check_status(response).await?;
        let customer: WireCustomer = Self::parse_json(response).await?;

        if customer.deleted {
            return Ok(None);
        }
        Ok(Some(customer.into()))
    }

    async fn create_subscription(
        &self,
        request: CreateSubscriptionRequest,
    ) -> Result<Subscription, GatewayError> {
        let mut params = vec![
            ("customer", request.customer_id.clone()),
            ("items[0][price]", request.price_id.clone()),
            ("collection_method", "charge_automatically".to_string()),
            ("payment_behavior", "default_incomplete".to_string()),
            (
                "payment_settings[save_default_payment_method]",
                "on_subscription".to_string(),
            ),
            ("expand[]", "items.data.price".to_string()),
            ("expand[]", "latest_invoice.payment_intent".to_string()),
            // Metadata is the only channel by which later webhooks can
            // recover business intent; set all of it.
            ("metadata[userId]", request.user_id.to_string()),
            ("metadata[plan]", request.plan.to_string()),
            ("metadata[billingPeriod]", request.period.to_string()),
            (
                "metadata[offerApplied]",
                (if request.offer_applied { "true" } else { "false" }).to_string(),
            ),
        ];

        if let Some(token) = &request.idempotency_token {
            params.push(("metadata[idempotencyKey]", token.clone()));
        }

        let response = self
            .http_client
            .post(self.url("/v1/subscriptions"))
            .basic_auth(self.config.api_key.expose_secret(), Option::<&str>::None)
            .form(&params)
            .send()
            .await
            .map_err(|e| GatewayError::network(e.to_string()))?;

        let response = Self::check_status(response).await?;
        let subscription: WireSubscription = Self::parse_json(response).await?;
        Ok(subscription.into())
    }

    async fn get_subscription(
        &self,
        subscription_id: &str,
    ) -> Result<Option<Subscription>, GatewayError> {
        let response = self
            .http_client
            .get(self.url(&format!("/v1/subscriptions/{}", subscription_id)))
            .basic_auth(self.config.api_key.expose_secret(), Option::<&str>::None)
            .query(&SUBSCRIPTION_EXPANSIONS)
            .send()
            .await
            .map_err(|e| GatewayError::network(e.to_string()))?;

        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(None);
        }

        let response = Self::check_status(response).await?;
        let subscription: WireSubscription = Self::parse_json(response).await?;
        Ok(Some(subscription.into()))
    }

    async fn list_incomplete_subscriptions(
        &self,
        customer_id: &str,
    ) -> Result<Vec<Subscription>, GatewayError> {
        let response = self
            .http_client
            .get(self.url("/v1/subscriptions"))
            .basic_auth(self.config.api_key.expose_secret(), Option::<&str>::None)
            .query(&[
                ("customer", customer_id),
                ("status", "incomplete"),
                ("limit", "5"),
            ])
            .send()
            .await
            .map_err(|e| GatewayError::network(e.to_string()))?;

        let response = Self::check_status(response).await?;
        let list: WireList<WireSubscription> = Self::parse_json(response).await?;
        Ok(list.data.into_iter().map(Subscription::from).collect())
    }

    async fn get_invoice(&self, invoice_id: &str) -> Result<Option<Invoice>, GatewayError> {
        let response = self
            .http_client
            .get(self.url(&format!("/v1/invoices/{}", invoice_id)))
            .basic_auth(self.config.api_key.expose_secret(), Option::<&str>::None)
            .query(&[("expand[]", "payment_intent")])
            .send()
            .await
            .map_err(|e| GatewayError::network(e.to_string()))?;

        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(None);
        }

        let response = Self::check_status(response).await?;
        let invoice: WireInvoice = Self::parse_json(response).await?;
        Ok(Some(invoice.into()))
    }

    async fn pay_invoice(
        &self,
        invoice_id: &str,
        payment_method: Option<&str>,
    ) -> Result<Invoice, GatewayError> {
        let mut params: Vec<(&str, String)> = Vec::new();
        if let Some(pm) = payment_method {
            params.push(("payment_method", pm.to_string()));
        }

        let response = self
            .http_client
            .post(self.url(&format!("/v1/invoices/{}/pay", invoice_id)))
            .basic_auth(self.config.api_key.expose_secret(), Option::<&str>::None)
            .form(&params)
            .send()
            .await
            .map_err(|e| GatewayError::network(e.to_string()))?;

        let response = Self::check_status(response).await?;
        let invoice: WireInvoice = Self::parse_json(response).await?;
        Ok(invoice.into())
    }

    async fn list_card_payment_methods(
        &self,
        customer_id: &str,
        limit: u32,
    ) -> Result<Vec<PaymentMethodRef>, GatewayError> {
        let limit = limit.to_string();
        let response = self
            .http_client
            .get(self.url("/v1/payment_methods"))
            .basic_auth(self.config.api_key.expose_secret(), Option::<&str>::None)
            .query(&[
                ("customer", customer_id),
                ("type", "card"),
                ("limit", limit.as_str()),
            ])
            .send()
            .await
            .map_err(|e| GatewayError::network(e.to_string()))?;

        let response = Self::check_status(response).await?;
        let list: WireList<WirePaymentMethod> = Self::parse_json(response).await?;
        Ok(list.data.into_iter().map(PaymentMethodRef::from).collect())
    }

    async fn set_cancel_at_period_end(
        &self,
        subscription_id: &str,
    ) -> Result<Subscription, GatewayError> {
        let response = self
            .http_client
            .post(self.url(&format!("/v1/subscriptions/{}", subscription_id)))
            .basic_auth(self.config.api_key.expose_secret(), Option::<&str>::None)
            .form(&[("cancel_at_period_end", "true")])
            .send()
            .await
            .map_err(|e| GatewayError::network(e.to_string()))?;

        let response = Self::check_status(response).await?;
        let subscription: WireSubscription = Self::parse_json(response).await?;
        Ok(subscription.into())
    }

    async fn verify_webhook(
        &self,
        payload: &[u8],
        signature: &str,
    ) -> Result<StripeEvent, GatewayError> {
        let header = SignatureHeader::parse(signature).map_err(|e| {
            tracing::warn!(error = %e, "Failed to parse Stripe-Signature header");
            GatewayError::invalid_webhook(e.to_string())
        })?;

        self.verify_signature(payload, &header)?;

        let event = self.parse_event(payload)?;

        tracing::info!(
            event_id = %event.id,
            event_type = %event.event_type,
            "Webhook signature verified"
        );

        Ok(event)
    }
}
