//! Ports - Interfaces for external dependencies.
//!
//! Following hexagonal architecture, ports define the contracts between
//! the domain and the outside world. Adapters implement these ports.
//!
//! - `EntitlementStore` - single-row-per-user entitlement table
//! - `PaymentGateway` - payment processor (customer/subscription/
//!   invoice lifecycle, webhook verification)
//! - `IntentLookup` - side-channel payment intent records for polling

mod entitlement_store;
mod intent_lookup;
mod payment_gateway;

pub use entitlement_store::{ActivationWrite, EntitlementStore, StatusWrite};
pub use intent_lookup::{IntentLookup, IntentRecord};
pub use payment_gateway::{
    CreateCustomerRequest, CreateSubscriptionRequest, Customer, GatewayError, GatewayErrorCode,
    Invoice, PaymentGateway, PaymentIntent, PaymentMethodRef, Subscription,
};
