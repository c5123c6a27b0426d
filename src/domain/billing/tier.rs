//! Subscription tier definitions.
//!
//! Represents the entitlement levels available in Docsift.

use serde::{Deserialize, Serialize};

/// Sentinel value stored for tiers with unlimited credits.
///
/// The entitlement row keeps an integer ceiling, so "unlimited" is
/// persisted as a value no real usage can reach.
pub const UNLIMITED_CREDITS: i64 = 999_999;

/// Subscription tier.
///
/// Determines the monthly credit ceiling and feature access.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SubscriptionTier {
    /// Default tier for every account. Never removed; cancellation
    /// returns a user here rather than deleting their record.
    Free,

    /// Entry paid tier.
    Starter,

    /// Full-featured paid tier.
    Pro,

    /// Unlimited credits, managed plans.
    Enterprise,
}

impl SubscriptionTier {
    /// Returns true if this tier is a paid tier.
    pub fn is_paid(&self) -> bool {
        !matches!(self, SubscriptionTier::Free)
    }

    /// Returns the monthly credit ceiling for this tier.
    pub fn credit_ceiling(&self) -> i64 {
        match self {
            SubscriptionTier::Free => 500,
            SubscriptionTier::Starter => 1_500,
            SubscriptionTier::Pro => 5_000,
            SubscriptionTier::Enterprise => UNLIMITED_CREDITS,
        }
    }

    /// Returns the display name for this tier.
    pub fn display_name(&self) -> &'static str {
        match self {
            SubscriptionTier::Free => "Free",
            SubscriptionTier::Starter => "Starter",
            SubscriptionTier::Pro => "Pro",
            SubscriptionTier::Enterprise => "Enterprise",
        }
    }

    /// Returns the lowercase identifier used in storage and API payloads.
    pub fn as_str(&self) -> &'static str {
        match self {
            SubscriptionTier::Free => "free",
            SubscriptionTier::Starter => "starter",
            SubscriptionTier::Pro => "pro",
            SubscriptionTier::Enterprise => "enterprise",
        }
    }

    /// Parses a stored tier identifier.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "free" => Some(SubscriptionTier::Free),
            "starter" => Some(SubscriptionTier::Starter),
            "pro" => Some(SubscriptionTier::Pro),
            "enterprise" => Some(SubscriptionTier::Enterprise),
            _ => None,
        }
    }
}

impl std::fmt::Display for SubscriptionTier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
