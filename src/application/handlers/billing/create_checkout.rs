//! CreateCheckoutHandler - orchestrates one checkout attempt.
//!
//! Validates the requested plan, recomputes welcome-offer eligibility
//! server-side from the persisted record (a client-asserted promo flag
//! is never trusted), resolves the price, provisions a processor
//! customer, and creates the subscription with `default_incomplete`
//! payment behavior.
//!
//! Duplicate invocations bearing the same client-generated idempotency
//! token within a short window are collapsed into one logical request:
//! an in-process guard serializes them and replays the first result,
//! and a processor-side sweep of incomplete subscriptions recovers the
//! original subscription if the guard's memory is gone. The guard is a
//! UX-level duplicate-click shield, not a distributed lock.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::Mutex;

use crate::domain::billing::{welcome_offer, BillingError, BillingPeriod, Plan, PriceCatalog};
use crate::domain::foundation::{Timestamp, UserId};
use crate::ports::{
    CreateSubscriptionRequest, EntitlementStore, IntentLookup, IntentRecord, PaymentGateway,
    Subscription,
};

use super::provision_customer::CustomerProvisioner;

/// Metadata key carrying the single-flight token on the subscription.
const IDEMPOTENCY_METADATA_KEY: &str = "idempotencyKey";

/// How long a finished checkout result is replayed for its token.
const REUSE_WINDOW: Duration = Duration::from_secs(600);

/// Command to start a checkout attempt.
///
/// Plan and period arrive as raw strings so that unknown values map to
/// a user-correctable validation error rather than a parse failure.
#[derive(Debug, Clone)]
pub struct CreateCheckoutCommand {
    pub user_id: UserId,
    pub email: String,
    pub plan: String,
    pub billing_period: String,
    /// Client-generated, one per checkout attempt.
    pub idempotency_token: String,
}

/// Result of a checkout attempt.
#[derive(Debug, Clone)]
pub struct CheckoutOutcome {
    pub subscription_id: String,
    pub customer_id: String,
    /// Payment confirmation secret, when the processor returned one
    /// synchronously.
    pub client_secret: Option<String>,
    /// True when the caller must poll the side channel for the secret.
    pub needs_polling: bool,
}

struct InFlightEntry {
    started: Instant,
    cell: Arc<Mutex<Option<CheckoutOutcome>>>,
}

pub struct CreateCheckoutHandler {
    store: Arc<dyn EntitlementStore>,
    gateway: Arc<dyn PaymentGateway>,
    intents: Arc<dyn IntentLookup>,
    catalog: Arc<PriceCatalog>,
    in_flight: Mutex<HashMap<String, InFlightEntry>>,
}

impl CreateCheckoutHandler {
    pub fn new(
        store: Arc<dyn EntitlementStore>,
        gateway: Arc<dyn PaymentGateway>,
        intents: Arc<dyn IntentLookup>,
        catalog: Arc<PriceCatalog>,
    ) -> Self {
        Self {
            store,
            gateway,
            intents,
            catalog,
            in_flight: Mutex::new(HashMap::new()),
        }
    }

    pub async fn handle(&self, cmd: CreateCheckoutCommand) -> Result<CheckoutOutcome, BillingError> {
        let plan = Plan::parse(&cmd.plan)
            .ok_or_else(|| BillingError::validation("plan", "must be 'starter' or 'pro'"))?;
        let period = BillingPeriod::parse(&cmd.billing_period).ok_or_else(|| {
            BillingError::validation("billing_period", "must be 'monthly' or 'yearly'")
        })?;
        if cmd.idempotency_token.is_empty() {
            return Err(BillingError::validation(
                "idempotency_token",
                "must not be empty",
            ));
        }

        // Single-flight: one cell per token; duplicates wait on the
        // first call's lock and replay its outcome.
        let cell = {
            let mut in_flight = self.in_flight.lock().await;
            in_flight.retain(|_, entry| entry.started.elapsed() < REUSE_WINDOW);
            in_flight
                .entry(cmd.idempotency_token.clone())
                .or_insert_with(|| InFlightEntry {
                    started: Instant::now(),
                    cell: Arc::new(Mutex::new(None)),
                })
                .cell
                .clone()
        };

        let mut slot = cell.lock().await;
        if let Some(outcome) = slot.as_ref() {
            tracing::info!(
                user_id = %cmd.user_id,
                idempotency_token = %cmd.idempotency_token,
                subscription_id = %outcome.subscription_id,
                "Duplicate checkout call; replaying first result"
            );
            return Ok(outcome.clone());
        }

        let outcome = self.create(&cmd, plan, period).await?;
        *slot = Some(outcome.clone());
        Ok(outcome)
    }

    async fn create(
        &self,
        cmd: &CreateCheckoutCommand,
        plan: Plan,
        period: BillingPeriod,
    ) -> Result<CheckoutOutcome, BillingError> {
        let record = self
            .store
            .find_by_user(&cmd.user_id)
            .await
            .map_err(BillingError::from)?
            .ok_or_else(|| BillingError::EntitlementNotFound(cmd.user_id.clone()))?;

        // Eligibility is recomputed from persisted fields only.
        let promo = welcome_offer::is_offer_active(
            Some(record.account_created_at),
            record.welcome_offer_used,
            Timestamp::now(),
        );

        let price_id = self.catalog.resolve(plan, period, promo)?.to_string();

        tracing::info!(
            user_id = %cmd.user_id,
            plan = %plan,
            billing_period = %period,
            promo,
            "Starting checkout"
        );

        let provisioner = CustomerProvisioner::new(self.store.clone(), self.gateway.clone());
        let customer_id = provisioner
            .get_or_create(&cmd.user_id, &cmd.email, record.stripe_customer_id.as_deref())
            .await?;

        // Processor-side recovery sweep: an earlier attempt with this
        // token may already have created the subscription.
        let subscription = match self
            .find_existing_attempt(&customer_id, &cmd.idempotency_token)
            .await
        {
            Some(existing) => {
                tracing::info!(
                    user_id = %cmd.user_id,
                    subscription_id = %existing.id,
                    "Reusing incomplete subscription from a previous attempt"
                );
                // Re-fetch for the invoice/payment-intent expansions.
                self.gateway
                    .get_subscription(&existing.id)
                    .await
                    .map_err(BillingError::from)?
                    .unwrap_or(existing)
            }
            None => self
                .gateway
                .create_subscription(CreateSubscriptionRequest {
                    customer_id: customer_id.clone(),
                    price_id,
                    user_id: cmd.user_id.clone(),
                    plan,
                    period,
                    offer_applied: promo,
                    idempotency_token: Some(cmd.idempotency_token.clone()),
                })
                .await
                .map_err(BillingError::from)?,
        };

        self.resolve_secret(&customer_id, subscription).await
    }

    async fn find_existing_attempt(
        &self,
        customer_id: &str,
        idempotency_token: &str,
    ) -> Option<Subscription> {
        match self.gateway.list_incomplete_subscriptions(customer_id).await {
            Ok(subscriptions) => subscriptions.into_iter().find(|s| {
                s.metadata_value(IDEMPOTENCY_METADATA_KEY) == Some(idempotency_token)
            }),
            Err(e) => {
                // The sweep is best-effort; creation proceeds.
                tracing::warn!(
                    customer_id = %customer_id,
                    error = %e,
                    "Could not list incomplete subscriptions"
                );
                None
            }
        }
    }

    /// Extract a client secret, with one deterministic invoice re-fetch
    /// when the creation response lacked it. No finalize/pay attempts
    /// here; that is the manual sync path's job.
    async fn resolve_secret(
        &self,
        customer_id: &str,
        subscription: Subscription,
    ) -> Result<CheckoutOutcome, BillingError> {
        let invoice_id = subscription.latest_invoice.as_ref().map(|i| i.id.clone());
        let mut payment_intent = subscription
            .latest_invoice
            .as_ref()
            .and_then(|i| i.payment_intent.clone());

        if payment_intent.as_ref().and_then(|pi| pi.client_secret.as_ref()).is_none() {
            if let Some(invoice_id) = &invoice_id {
                tracing::debug!(
                    subscription_id = %subscription.id,
                    invoice_id = %invoice_id,
                    "Client secret missing; retrieving invoice"
                );
                match self.gateway.get_invoice(invoice_id).await {
                    Ok(Some(invoice)) => {
                        if invoice.payment_intent.is_some() {
                            payment_intent = invoice.payment_intent;
                        }
                    }
                    Ok(None) => {}
                    Err(e) => {
                        tracing::warn!(
                            invoice_id = %invoice_id,
                            error = %e,
                            "Invoice re-fetch failed"
                        );
                    }
                }
            }
        }

        // Feed the side channel with whatever intent we discovered so
        // the polling client has something to find.
        if let Some(pi) = &payment_intent {
            let record = IntentRecord {
                payment_intent_id: pi.id.clone(),
                client_secret: pi.client_secret.clone(),
                created_at: Timestamp::now(),
            };
            if let Err(e) = self.intents.record(customer_id, &record).await {
                tracing::warn!(
                    customer_id = %customer_id,
                    payment_intent_id = %pi.id,
                    error = %e,
                    "Failed to record intent in side channel"
                );
            }
        }

        let client_secret = payment_intent.and_then(|pi| pi.client_secret);
        let needs_polling = client_secret.is_none();

        tracing::info!(
            subscription_id = %subscription.id,
            customer_id = %customer_id,
            has_client_secret = client_secret.is_some(),
            needs_polling,
            "Checkout created"
        );

        Ok(CheckoutOutcome {
            subscription_id: subscription.id,
            customer_id: customer_id.to_string(),
            client_secret,
            needs_polling,
        })
    }
}
