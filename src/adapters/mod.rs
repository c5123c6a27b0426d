//! Adapters - Implementations of port interfaces.
//!
//! Adapters connect the domain to external systems:
//! - `http` - Axum REST API
//! - `memory` - In-memory stores for testing and development
//! - `postgres` - PostgreSQL-backed persistence
//! - `stripe` - Stripe payment gateway and webhook verification

pub mod http;
pub mod memory;
pub mod postgres;
pub mod stripe;
