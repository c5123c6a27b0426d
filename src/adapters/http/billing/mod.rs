//! HTTP adapter for billing endpoints.
//!
//! Exposes the reconciliation engine via REST API:
//! - `GET /api/billing/entitlement` - Current user's entitlement record
//! - `GET /api/billing/latest-intent` - Side-channel payment intent read
//! - `POST /api/billing/bootstrap` - Create the default free-tier record
//! - `POST /api/billing/checkout` - Start a checkout attempt
//! - `POST /api/billing/sync` - Reconcile a subscription on demand
//! - `POST /api/billing/cancel` - Cancel at period end
//! - `POST /api/webhooks/stripe` - Handle Stripe webhooks

pub mod dto;
pub mod handlers;
pub mod routes;

pub use handlers::{AuthenticatedUser, BillingApiError, BillingAppState};
pub use routes::{billing_router, billing_routes, webhook_routes};
