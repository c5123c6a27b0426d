//! PostgreSQL adapters - Database implementations for storage ports.
//!
//! - `PostgresEntitlementStore` - single-row-per-user entitlement table
//! - `PostgresIntentLookup` - side-channel payment intent records

mod entitlement_store;
mod intent_lookup;

pub use entitlement_store::PostgresEntitlementStore;
pub use intent_lookup::PostgresIntentLookup;
