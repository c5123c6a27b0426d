//! Axum router configuration for billing endpoints.

use axum::{
    routing::{get, post},
    Router,
};

use super::handlers::{
    bootstrap_entitlement, cancel_subscription, create_checkout, get_entitlement,
    handle_stripe_webhook, latest_intent, sync_subscription, BillingAppState,
};

/// Create the billing API router.
///
/// # Routes (require authentication)
///
/// - `GET /entitlement` - Current user's entitlement record
/// - `GET /latest-intent` - Side-channel payment intent read
/// - `POST /bootstrap` - Create the default free-tier record
/// - `POST /checkout` - Start a checkout attempt
/// - `POST /sync` - Reconcile a subscription on demand
/// - `POST /cancel` - Cancel at period end
pub fn billing_routes() -> Router<BillingAppState> {
    Router::new()
        .route("/entitlement", get(get_entitlement))
        .route("/latest-intent", get(latest_intent))
        .route("/bootstrap", post(bootstrap_entitlement))
        .route("/checkout", post(create_checkout))
        .route("/sync", post(sync_subscription))
        .route("/cancel", post(cancel_subscription))
}

/// Create the Stripe webhook router.
///
/// Separate from the billing routes because webhooks carry no user
/// authentication; they are verified via signature.
///
/// # Routes
/// - `POST /stripe` - Handle Stripe webhooks
pub fn webhook_routes() -> Router<BillingAppState> {
    Router::new().route("/stripe", post(handle_stripe_webhook))
}

/// Create the complete billing module router.
///
/// Suitable for mounting at `/api`:
///
/// ```ignore
/// let app = Router::new()
///     .nest("/api", billing_router())
///     .with_state(app_state);
/// ```
pub fn billing_router() -> Router<BillingAppState> {
    Router::new()
        .nest("/billing", billing_routes())
        .nest("/webhooks", webhook_routes())
}
