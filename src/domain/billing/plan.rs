//! Purchasable plan and billing period definitions.
//!
//! A `Plan` is a tier a user can buy through self-serve checkout.
//! Enterprise is provisioned out of band, so it is deliberately not a
//! `Plan` even though it is a `SubscriptionTier`.

use serde::{Deserialize, Serialize};

use super::SubscriptionTier;

/// Self-serve purchasable plan.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Plan {
    Starter,
    Pro,
}

impl Plan {
    /// Maps the plan to its entitlement tier.
    pub fn tier(&self) -> SubscriptionTier {
        match self {
            Plan::Starter => SubscriptionTier::Starter,
            Plan::Pro => SubscriptionTier::Pro,
        }
    }

    /// Returns the lowercase identifier used in metadata and storage.
    pub fn as_str(&self) -> &'static str {
        match self {
            Plan::Starter => "starter",
            Plan::Pro => "pro",
        }
    }

    /// Parses a plan identifier.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "starter" => Some(Plan::Starter),
            "pro" => Some(Plan::Pro),
            _ => None,
        }
    }
}

impl std::fmt::Display for Plan {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Billing period for a purchasable plan.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BillingPeriod {
    Monthly,
    Yearly,
}

impl BillingPeriod {
    /// Returns the lowercase identifier used in metadata and storage.
    pub fn as_str(&self) -> &'static str {
        match self {
            BillingPeriod::Monthly => "monthly",
            BillingPeriod::Yearly => "yearly",
        }
    }

    /// Parses a billing period identifier.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "monthly" => Some(BillingPeriod::Monthly),
            "yearly" => Some(BillingPeriod::Yearly),
            _ => None,
        }
    }
}

impl std::fmt::Display for BillingPeriod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A fully resolved purchase intent: what was (or is being) bought.
///
/// Recovered from a bare price id by the webhook processor, since the
/// price id is the only provider-supplied fact that can be trusted for
/// what the user paid for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlanSelection {
    pub plan: Plan,
    pub period: BillingPeriod,
    pub promo: bool,
}
