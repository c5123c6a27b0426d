//! Billing command handlers.
//!
//! One handler per operation, each taking its ports as `Arc<dyn _>`
//! dependencies. Every path that derives entitlement state from a
//! processor subscription funnels into the `ActivationReconciler`.

mod bootstrap_entitlement;
mod cancel_subscription;
mod create_checkout;
mod poll_intent;
mod process_webhook;
mod provision_customer;
mod reconciler;
mod sync_subscription;

pub use bootstrap_entitlement::BootstrapEntitlementHandler;
pub use cancel_subscription::{
    CancelOutcome, CancelSubscriptionCommand, CancelSubscriptionHandler,
};
pub use create_checkout::{CheckoutOutcome, CreateCheckoutCommand, CreateCheckoutHandler};
pub use poll_intent::{IntentPoller, PollOutcome};
pub use process_webhook::{ProcessWebhookCommand, ProcessWebhookHandler, WebhookOutcome};
pub use provision_customer::CustomerProvisioner;
pub use reconciler::ActivationReconciler;
pub use sync_subscription::{SyncOutcome, SyncSubscriptionCommand, SyncSubscriptionHandler};
