//! Docsift - Document Extraction Platform Billing Backend
//!
//! This crate implements the subscription state reconciliation engine:
//! it keeps the locally persisted entitlement record (tier, credit
//! quota, renewal date) convergent with the payment processor, which
//! remains the system of record for money movement.

pub mod adapters;
pub mod application;
pub mod config;
pub mod domain;
pub mod ports;
