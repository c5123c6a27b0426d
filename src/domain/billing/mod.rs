//! Billing domain module.
//!
//! Pure types and logic for the subscription state reconciliation
//! engine: tiers, purchasable plans, the price catalog, welcome-offer
//! eligibility, the entitlement record, and webhook event
//! classification. No I/O lives here.
//!
//! # Module Structure
//!
//! - `entitlement` - the local entitlement record
//! - `errors` - billing error taxonomy
//! - `plan` - purchasable plans and billing periods
//! - `price_catalog` - (plan, period, promo) ⇄ price id mapping
//! - `stripe_event` - webhook event envelope and classification
//! - `subscription_status` - processor status vocabulary
//! - `tier` - entitlement tiers and credit ceilings
//! - `welcome_offer` - promo eligibility resolver

mod entitlement;
mod errors;
mod plan;
mod price_catalog;
mod stripe_event;
mod subscription_status;
mod tier;
pub mod welcome_offer;

pub use entitlement::Entitlement;
pub use errors::BillingError;
pub use plan::{BillingPeriod, Plan, PlanSelection};
pub use price_catalog::{PlanPrices, PriceCatalog};
pub use stripe_event::{
    BillingEventKind, InvoiceObject, PaymentIntentObject, PriceObject, StripeEvent,
    StripeEventData, SubscriptionItemList, SubscriptionItemObject, SubscriptionObject,
};
pub use subscription_status::SubscriptionStatus;
pub use tier::{SubscriptionTier, UNLIMITED_CREDITS};

#[cfg(test)]
pub use stripe_event::StripeEventBuilder;
