//! Application layer - Commands, Queries, and Handlers.
//!
//! This layer orchestrates domain operations and coordinates between
//! ports. Command handlers own the write paths; all entitlement writes
//! derived from processor state go through the reconciler.

pub mod handlers;
