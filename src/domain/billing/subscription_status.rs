//! Subscription status vocabulary, mirroring the payment processor's.

use serde::{Deserialize, Serialize};

/// Subscription status as reported by the payment processor.
///
/// The local entitlement record mirrors this verbatim; tier and credits
/// are only ever derived from it through the reconciler.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubscriptionStatus {
    Active,
    Trialing,
    Incomplete,
    IncompleteExpired,
    PastDue,
    Canceled,
    Unpaid,
    Paused,
    /// Status string this version does not recognize. Preserved so a
    /// new processor status never breaks parsing.
    Unknown,
}

impl SubscriptionStatus {
    /// Parses a processor status string.
    pub fn parse(s: &str) -> Self {
        match s {
            "active" => Self::Active,
            "trialing" => Self::Trialing,
            "incomplete" => Self::Incomplete,
            "incomplete_expired" => Self::IncompleteExpired,
            "past_due" => Self::PastDue,
            "canceled" => Self::Canceled,
            "unpaid" => Self::Unpaid,
            "paused" => Self::Paused,
            _ => Self::Unknown,
        }
    }

    /// Returns the processor's string form.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Trialing => "trialing",
            Self::Incomplete => "incomplete",
            Self::IncompleteExpired => "incomplete_expired",
            Self::PastDue => "past_due",
            Self::Canceled => "canceled",
            Self::Unpaid => "unpaid",
            Self::Paused => "paused",
            Self::Unknown => "unknown",
        }
    }

    /// True for statuses under which an activation may be reconciled.
    pub fn grants_entitlement(&self) -> bool {
        matches!(self, Self::Active | Self::Trialing)
    }

    /// True for statuses the processor will never move out of.
    ///
    /// A cancel request against a terminal subscription is mirrored
    /// locally instead of being treated as an upstream failure.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Canceled | Self::IncompleteExpired)
    }
}

impl Default for SubscriptionStatus {
    fn default() -> Self {
        SubscriptionStatus::Incomplete
    }
}

impl std::fmt::Display for SubscriptionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_roundtrips_known_statuses() {
        for status in [
            SubscriptionStatus::Active,
            SubscriptionStatus::Trialing,
            SubscriptionStatus::Incomplete,
            SubscriptionStatus::IncompleteExpired,
            SubscriptionStatus::PastDue,
            SubscriptionStatus::Canceled,
            SubscriptionStatus::Unpaid,
            SubscriptionStatus::Paused,
        ] {
            assert_eq!(SubscriptionStatus::parse(status.as_str()), status);
        }
    }

    #[test]
    fn parse_maps_unrecognized_to_unknown() {
        assert_eq!(
            SubscriptionStatus::parse("some_future_status"),
            SubscriptionStatus::Unknown
        );
    }

    #[test]
    fn only_active_and_trialing_grant_entitlement() {
        assert!(SubscriptionStatus::Active.grants_entitlement());
        assert!(SubscriptionStatus::Trialing.grants_entitlement());
        assert!(!SubscriptionStatus::Incomplete.grants_entitlement());
        assert!(!SubscriptionStatus::PastDue.grants_entitlement());
        assert!(!SubscriptionStatus::Canceled.grants_entitlement());
    }

    #[test]
    fn terminal_statuses() {
        assert!(SubscriptionStatus::Canceled.is_terminal());
        assert!(SubscriptionStatus::IncompleteExpired.is_terminal());
        assert!(!SubscriptionStatus::Active.is_terminal());
        assert!(!SubscriptionStatus::PastDue.is_terminal());
    }

    #[test]
    fn serializes_snake_case() {
        let json = serde_json::to_string(&SubscriptionStatus::PastDue).unwrap();
        assert_eq!(json, "\"past_due\"");
    }
}
