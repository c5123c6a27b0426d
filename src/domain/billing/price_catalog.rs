//! Price catalog: (plan, billing period, promo) ⇄ Stripe price id.
//!
//! `plan_from_price_id` must stay the exact left inverse of `resolve`
//! for every configured combination; the webhook processor depends on
//! it to recover purchase intent from the only provider-supplied fact
//! it can trust.

use super::{BillingError, BillingPeriod, Plan, PlanSelection};

/// Configured price ids for one plan across periods and promo states.
#[derive(Debug, Clone, Default)]
pub struct PlanPrices {
    pub monthly: Option<String>,
    pub monthly_promo: Option<String>,
    pub yearly: Option<String>,
    pub yearly_promo: Option<String>,
}

/// Pure mapping between plan selections and provider price ids.
///
/// No I/O; built once from configuration at startup.
#[derive(Debug, Clone, Default)]
pub struct PriceCatalog {
    starter: PlanPrices,
    pro: PlanPrices,
}

impl PriceCatalog {
    pub fn new(starter: PlanPrices, pro: PlanPrices) -> Self {
        Self { starter, pro }
    }

    fn entry(&self, plan: Plan, period: BillingPeriod, promo: bool) -> &Option<String> {
        let prices = match plan {
            Plan::Starter => &self.starter,
            Plan::Pro => &self.pro,
        };
        match (period, promo) {
            (BillingPeriod::Monthly, false) => &prices.monthly,
            (BillingPeriod::Monthly, true) => &prices.monthly_promo,
            (BillingPeriod::Yearly, false) => &prices.yearly,
            (BillingPeriod::Yearly, true) => &prices.yearly_promo,
        }
    }

    /// Resolves the price id for a plan selection.
    ///
    /// A missing entry is a deployment defect, not a user error.
    pub fn resolve(
        &self,
        plan: Plan,
        period: BillingPeriod,
        promo: bool,
    ) -> Result<&str, BillingError> {
        self.entry(plan, period, promo)
            .as_deref()
            .ok_or_else(|| {
                BillingError::configuration(format!(
                    "no price id configured for {} {} (promo: {})",
                    plan, period, promo
                ))
            })
    }

    /// Recovers the plan selection from a bare price id.
    ///
    /// Returns `None` for price ids outside the catalog.
    pub fn plan_from_price_id(&self, price_id: &str) -> Option<PlanSelection> {
        for plan in [Plan::Starter, Plan::Pro] {
            for period in [BillingPeriod::Monthly, BillingPeriod::Yearly] {
                for promo in [false, true] {
                    if self.entry(plan, period, promo).as_deref() == Some(price_id) {
                        return Some(PlanSelection {
                            plan,
                            period,
                            promo,
                        });
                    }
                }
            }
        }
        None
    }
}
