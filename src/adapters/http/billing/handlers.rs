//! HTTP handlers for billing endpoints.
//!
//! These handlers connect Axum routes to the application layer command
//! handlers.

use std::sync::Arc;

use axum::extract::{Json, Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;

use crate::application::handlers::billing::{
    BootstrapEntitlementHandler, CancelSubscriptionCommand, CancelSubscriptionHandler,
    CreateCheckoutCommand, CreateCheckoutHandler, ProcessWebhookCommand, ProcessWebhookHandler,
    SyncSubscriptionCommand, SyncSubscriptionHandler,
};
use crate::domain::billing::{BillingError, PriceCatalog};
use crate::domain::foundation::{Timestamp, UserId};
use crate::ports::{EntitlementStore, IntentLookup, PaymentGateway};

use super::dto::{
    CancelResponse, CheckoutResponse, CreateCheckoutRequest, EntitlementResponse, ErrorResponse,
    LatestIntentParams, LatestIntentResponse, SyncResponse, SyncSubscriptionRequest,
    WebhookAckResponse,
};

// ════════════════════════════════════════════════════════════════════════════════
// Application State
// ════════════════════════════════════════════════════════════════════════════════

/// Shared application state containing all billing dependencies.
///
/// Cloned per request; dependencies are Arc-wrapped. The checkout
/// handler is long-lived because it owns the in-process single-flight
/// guard; the other handlers are constructed on demand.
#[derive(Clone)]
pub struct BillingAppState {
    pub entitlement_store: Arc<dyn EntitlementStore>,
    pub payment_gateway: Arc<dyn PaymentGateway>,
    pub intent_lookup: Arc<dyn IntentLookup>,
    pub price_catalog: Arc<PriceCatalog>,
    pub checkout_handler: Arc<CreateCheckoutHandler>,
}

impl BillingAppState {
    pub fn new(
        entitlement_store: Arc<dyn EntitlementStore>,
        payment_gateway: Arc<dyn PaymentGateway>,
        intent_lookup: Arc<dyn IntentLookup>,
        price_catalog: Arc<PriceCatalog>,
    ) -> Self {
        let checkout_handler = Arc::new(CreateCheckoutHandler::new(
            entitlement_store.clone(),
            payment_gateway.clone(),
            intent_lookup.clone(),
            price_catalog.clone(),
        ));
        Self {
            entitlement_store,
            payment_gateway,
            intent_lookup,
            price_catalog,
            checkout_handler,
        }
    }

    pub fn bootstrap_handler(&self) -> BootstrapEntitlementHandler {
        BootstrapEntitlementHandler::new(self.entitlement_store.clone())
    }

    pub fn sync_handler(&self) -> SyncSubscriptionHandler {
        SyncSubscriptionHandler::new(
            self.entitlement_store.clone(),
            self.payment_gateway.clone(),
            self.price_catalog.clone(),
        )
    }

    pub fn cancel_handler(&self) -> CancelSubscriptionHandler {
        CancelSubscriptionHandler::new(
            self.entitlement_store.clone(),
            self.payment_gateway.clone(),
        )
    }

    pub fn webhook_handler(&self) -> ProcessWebhookHandler {
        ProcessWebhookHandler::new(
            self.entitlement_store.clone(),
            self.payment_gateway.clone(),
            self.price_catalog.clone(),
        )
    }
}

// ════════════════════════════════════════════════════════════════════════════════
// User Context
// ════════════════════════════════════════════════════════════════════════════════

/// Authenticated user context extracted from the request.
///
/// Token validation belongs to the identity provider; by the time a
/// request reaches this service the gateway has resolved the user and
/// forwards the stable id in a header.
#[derive(Debug, Clone)]
pub struct AuthenticatedUser {
    pub user_id: UserId,
}

/// Rejection type for AuthenticatedUser extraction.
pub struct AuthenticationRequired;

impl IntoResponse for AuthenticationRequired {
    fn into_response(self) -> axum::response::Response {
        let error = ErrorResponse::new("AUTHENTICATION_REQUIRED", "Authentication is required");
        (StatusCode::UNAUTHORIZED, Json(error)).into_response()
    }
}

#[async_trait::async_trait]
impl<S> axum::extract::FromRequestParts<S> for AuthenticatedUser
where
    S: Send + Sync,
{
    type Rejection = AuthenticationRequired;

    async fn from_request_parts(
        parts: &mut axum::http::request::Parts,
        _state: &S,
    ) -> Result<Self, Self::Rejection> {
        let user_id = parts
            .headers
            .get("X-User-Id")
            .and_then(|v| v.to_str().ok())
            .and_then(|s| UserId::new(s).ok())
            .ok_or(AuthenticationRequired)?;

        Ok(AuthenticatedUser { user_id })
    }
}

// ════════════════════════════════════════════════════════════════════════════════
// Handlers
// ════════════════════════════════════════════════════════════════════════════════

/// GET /api/billing/entitlement - Current user's entitlement record
pub async fn get_entitlement(
    State(state): State<BillingAppState>,
    user: AuthenticatedUser,
) -> Result<impl IntoResponse, BillingApiError> {
    let record = state
        .entitlement_store
        .find_by_user(&user.user_id)
        .await
        .map_err(BillingError::from)?
        .ok_or(BillingError::EntitlementNotFound(user.user_id))?;

    let response = EntitlementResponse::from_record(record, Timestamp::now());
    Ok(Json(response))
}

/// POST /api/billing/bootstrap - Create the default free-tier record
pub async fn bootstrap_entitlement(
    State(state): State<BillingAppState>,
    user: AuthenticatedUser,
) -> Result<impl IntoResponse, BillingApiError> {
    let handler = state.bootstrap_handler();
    let record = handler.handle(&user.user_id).await?;

    let response = EntitlementResponse::from_record(record, Timestamp::now());
    Ok((StatusCode::CREATED, Json(response)))
}

/// POST /api/billing/checkout - Start a checkout attempt
pub async fn create_checkout(
    State(state): State<BillingAppState>,
    user: AuthenticatedUser,
    Json(request): Json<CreateCheckoutRequest>,
) -> Result<impl IntoResponse, BillingApiError> {
    let cmd = CreateCheckoutCommand {
        user_id: user.user_id,
        email: request.email,
        plan: request.plan,
        billing_period: request.billing_period,
        idempotency_token: request.idempotency_token,
    };

    let outcome = state.checkout_handler.handle(cmd).await?;
    Ok(Json(CheckoutResponse::from(outcome)))
}

/// POST /api/billing/sync - Reconcile a subscription on demand
pub async fn sync_subscription(
    State(state): State<BillingAppState>,
    user: AuthenticatedUser,
    Json(request): Json<SyncSubscriptionRequest>,
) -> Result<impl IntoResponse, BillingApiError> {
    let handler = state.sync_handler();
    let cmd = SyncSubscriptionCommand {
        user_id: user.user_id,
        subscription_id: request.subscription_id,
    };

    let outcome = handler.handle(cmd).await?;
    Ok(Json(SyncResponse::from(outcome)))
}

/// POST /api/billing/cancel - Cancel at period end
pub async fn cancel_subscription(
    State(state): State<BillingAppState>,
    user: AuthenticatedUser,
) -> Result<impl IntoResponse, BillingApiError> {
    let handler = state.cancel_handler();
    let outcome = handler
        .handle(CancelSubscriptionCommand {
            user_id: user.user_id,
        })
        .await?;

    Ok(Json(CancelResponse::from(outcome)))
}

/// GET /api/billing/latest-intent - Side-channel intent read
pub async fn latest_intent(
    State(state): State<BillingAppState>,
    _user: AuthenticatedUser,
    Query(params): Query<LatestIntentParams>,
) -> Result<impl IntoResponse, BillingApiError> {
    let record = state
        .intent_lookup
        .latest_for_customer(&params.customer_id)
        .await
        .map_err(BillingError::from)?;

    Ok(Json(LatestIntentResponse::from(record)))
}

/// POST /api/webhooks/stripe - Handle Stripe webhook events
pub async fn handle_stripe_webhook(
    State(state): State<BillingAppState>,
    headers: axum::http::HeaderMap,
    body: axum::body::Bytes,
) -> Result<impl IntoResponse, BillingApiError> {
    let signature = headers
        .get("Stripe-Signature")
        .and_then(|v| v.to_str().ok())
        .ok_or(BillingError::InvalidSignature)?;

    let handler = state.webhook_handler();
    let cmd = ProcessWebhookCommand {
        payload: body.to_vec(),
        signature: signature.to_string(),
    };

    // Skipped events still acknowledge with 200 so the processor does
    // not retry deliveries we will never act on.
    handler.handle(cmd).await?;

    Ok(Json(WebhookAckResponse { received: true }))
}

// ════════════════════════════════════════════════════════════════════════════════
// Error Handling
// ════════════════════════════════════════════════════════════════════════════════

/// API error type that converts billing errors to HTTP responses.
pub struct BillingApiError(BillingError);

impl From<BillingError> for BillingApiError {
    fn from(err: BillingError) -> Self {
        Self(err)
    }
}

impl BillingApiError {
    fn error_code(&self) -> &'static str {
        match &self.0 {
            BillingError::Validation { .. } => "VALIDATION_FAILED",
            BillingError::EntitlementNotFound(_) => "ENTITLEMENT_NOT_FOUND",
            BillingError::SubscriptionNotFound(_) => "SUBSCRIPTION_NOT_FOUND",
            BillingError::MissingMetadata(_) => "MISSING_METADATA",
            BillingError::UnknownPrice(_) => "UNKNOWN_PRICE",
            BillingError::Configuration(_) => "CONFIGURATION_ERROR",
            BillingError::PollTimeout => "POLL_TIMEOUT",
            BillingError::InvalidSignature => "INVALID_SIGNATURE",
            BillingError::Parse(_) => "PARSE_ERROR",
            BillingError::Upstream(_) => "UPSTREAM_ERROR",
            BillingError::Database(_) => "INTERNAL_ERROR",
        }
    }
}

impl IntoResponse for BillingApiError {
    fn into_response(self) -> axum::response::Response {
        let status = self.0.status_code();
        let body = ErrorResponse::new(self.error_code(), self.0.to_string());
        (status, Json(body)).into_response()
    }
}
