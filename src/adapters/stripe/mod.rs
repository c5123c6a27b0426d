//! Stripe payment gateway adapter.
//!
//! Implements the `PaymentGateway` port for Stripe integration,
//! including:
//! - Customer management
//! - Subscription lifecycle and invoice settlement
//! - Webhook signature verification
//!
//! # Security
//!
//! - Webhook signatures use HMAC-SHA256 with constant-time comparison
//! - Timestamps are validated to prevent replay attacks (5-minute window)
//! - All secrets are handled via `secrecy::SecretString`

mod gateway;
mod wire;

pub use gateway::{StripeConfig, StripeGateway};
pub use wire::{hex_encode, SignatureHeader, SignatureParseError};
