//! Payment configuration (Stripe)

use serde::Deserialize;

use crate::domain::billing::{PlanPrices, PriceCatalog};

use super::error::ValidationError;

/// Payment configuration (Stripe)
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PaymentConfig {
    /// Stripe secret API key
    pub stripe_api_key: String,

    /// Stripe webhook signing secret
    pub stripe_webhook_secret: String,

    /// Reject test-mode webhook events (production)
    #[serde(default)]
    pub require_livemode: bool,

    /// Stripe price ids per plan, period, and promo state
    pub price_starter_monthly: Option<String>,
    pub price_starter_monthly_promo: Option<String>,
    pub price_starter_yearly: Option<String>,
    pub price_starter_yearly_promo: Option<String>,
    pub price_pro_monthly: Option<String>,
    pub price_pro_monthly_promo: Option<String>,
    pub price_pro_yearly: Option<String>,
    pub price_pro_yearly_promo: Option<String>,
}

impl PaymentConfig {
    /// Check if using Stripe test mode
    pub fn is_test_mode(&self) -> bool {
        self.stripe_api_key.starts_with("sk_test_")
    }

    /// Check if using Stripe live mode
    pub fn is_live_mode(&self) -> bool {
        self.stripe_api_key.starts_with("sk_live_")
    }

    /// Build the price catalog from the configured ids
    pub fn price_catalog(&self) -> PriceCatalog {
        PriceCatalog::new(
            PlanPrices {
                monthly: self.price_starter_monthly.clone(),
                monthly_promo: self.price_starter_monthly_promo.clone(),
                yearly: self.price_starter_yearly.clone(),
                yearly_promo: self.price_starter_yearly_promo.clone(),
            },
            PlanPrices {
                monthly: self.price_pro_monthly.clone(),
                monthly_promo: self.price_pro_monthly_promo.clone(),
                yearly: self.price_pro_yearly.clone(),
                yearly_promo: self.price_pro_yearly_promo.clone(),
            },
        )
    }

    /// Validate payment configuration
    ///
    /// Fails fast on startup rather than at resolve time: a missing
    /// price id is a deployment defect.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.stripe_api_key.is_empty() {
            return Err(ValidationError::MissingRequired("STRIPE_API_KEY"));
        }
        if self.stripe_webhook_secret.is_empty() {
            return Err(ValidationError::MissingRequired("STRIPE_WEBHOOK_SECRET"));
        }

        // Verify key prefixes for safety
        if !self.stripe_api_key.starts_with("sk_") {
            return Err(ValidationError::InvalidStripeKey);
        }
        if !self.stripe_webhook_secret.starts_with("whsec_") {
            return Err(ValidationError::InvalidStripeWebhookSecret);
        }

        let required = [
            ("PRICE_STARTER_MONTHLY", &self.price_starter_monthly),
            (
                "PRICE_STARTER_MONTHLY_PROMO",
                &self.price_starter_monthly_promo,
            ),
            ("PRICE_STARTER_YEARLY", &self.price_starter_yearly),
            (
                "PRICE_STARTER_YEARLY_PROMO",
                &self.price_starter_yearly_promo,
            ),
            ("PRICE_PRO_MONTHLY", &self.price_pro_monthly),
            ("PRICE_PRO_MONTHLY_PROMO", &self.price_pro_monthly_promo),
            ("PRICE_PRO_YEARLY", &self.price_pro_yearly),
            ("PRICE_PRO_YEARLY_PROMO", &self.price_pro_yearly_promo),
        ];
        for (name, value) in required {
            if value.as_deref().map_or(true, str::is_empty) {
                return Err(ValidationError::MissingPriceId(name));
            }
        }

        Ok(())
    }
}
