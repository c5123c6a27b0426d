//! Welcome offer eligibility resolver.
//!
//! The offer is a one-time discount available for 48 hours after
//! account creation. Eligibility is always recomputed server-side from
//! persisted fields; a client-asserted promo flag is never trusted
//! because it affects price.

use chrono::Duration;

use crate::domain::foundation::Timestamp;

/// Offer window: 48 hours from account creation.
pub const OFFER_WINDOW_HOURS: i64 = 48;

/// Returns true if the welcome offer is active for this account.
///
/// Active iff the offer was never used AND the account creation time is
/// known AND less than 48 hours have elapsed. A missing creation
/// timestamp fails closed.
pub fn is_offer_active(
    account_created_at: Option<Timestamp>,
    offer_used: bool,
    now: Timestamp,
) -> bool {
    if offer_used {
        return false;
    }
    let Some(created_at) = account_created_at else {
        return false;
    };
    now.duration_since(&created_at) < Duration::hours(OFFER_WINDOW_HOURS)
}

/// Time remaining in the offer window, clamped to zero once elapsed.
pub fn remaining(account_created_at: Timestamp, now: Timestamp) -> Duration {
    let expires_at = account_created_at.add_hours(OFFER_WINDOW_HOURS);
    let left = expires_at.duration_since(&now);
    if left < Duration::zero() {
        Duration::zero()
    } else {
        left
    }
}
