//! ProcessWebhookHandler - drives the reconciler from asynchronous
//! processor notifications.
//!
//! Each event kind is handled idempotently; deliveries may be
//! duplicated, delayed, or reordered. Activation always re-fetches the
//! current subscription with its price expanded rather than trusting
//! event payload fields, which self-corrects most ordering anomalies.
//!
//! The one failure-handling decision everything else hangs on:
//! silently ignoring an unattributable money event is not acceptable
//! (`MissingMetadata`/`UnknownPrice` are fatal and alert), while
//! silently ignoring events known to be irrelevant is required to
//! avoid noise (`WebhookOutcome::Skipped`).

use std::sync::Arc;

use crate::domain::billing::{
    BillingError, BillingEventKind, InvoiceObject, PaymentIntentObject, PlanSelection,
    PriceCatalog, StripeEvent, SubscriptionObject,
};
use crate::domain::foundation::{Timestamp, UserId};
use crate::ports::{EntitlementStore, PaymentGateway, StatusWrite, Subscription};

use super::reconciler::ActivationReconciler;

/// Metadata key that attributes processor objects to a local user.
const USER_ID_KEY: &str = "userId";

/// Command to process one webhook delivery.
#[derive(Debug, Clone)]
pub struct ProcessWebhookCommand {
    /// Raw request body, exactly as signed.
    pub payload: Vec<u8>,
    /// Stripe-Signature header value.
    pub signature: String,
}

/// Result of processing a delivery.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WebhookOutcome {
    /// The event drove a state change (or an idempotent re-apply).
    Processed,
    /// The event was irrelevant and acknowledged without action.
    Skipped(&'static str),
}

pub struct ProcessWebhookHandler {
    store: Arc<dyn EntitlementStore>,
    gateway: Arc<dyn PaymentGateway>,
    catalog: Arc<PriceCatalog>,
    reconciler: ActivationReconciler,
}

impl ProcessWebhookHandler {
    pub fn new(
        store: Arc<dyn EntitlementStore>,
        gateway: Arc<dyn PaymentGateway>,
        catalog: Arc<PriceCatalog>,
    ) -> Self {
        let reconciler = ActivationReconciler::new(store.clone());
        Self {
            store,
            gateway,
            catalog,
            reconciler,
        }
    }

    /// Verify, classify, and handle one delivery.
    pub async fn handle(&self, cmd: ProcessWebhookCommand) -> Result<WebhookOutcome, BillingError> {
        let event = self
            .gateway
            .verify_webhook(&cmd.payload, &cmd.signature)
            .await
            .map_err(BillingError::from)?;

        self.process(event).await
    }

    /// Handle an already-verified event.
    pub async fn process(&self, event: StripeEvent) -> Result<WebhookOutcome, BillingError> {
        let kind = event.kind();
        tracing::info!(
            event_id = %event.id,
            event_type = %event.event_type,
            "Processing webhook event"
        );

        let outcome = match kind {
            BillingEventKind::InvoicePaymentSucceeded => {
                self.on_invoice_payment_succeeded(&event).await
            }
            BillingEventKind::InvoicePaymentFailed => self.on_invoice_payment_failed(&event).await,
            BillingEventKind::SubscriptionUpdated => self.on_subscription_updated(&event).await,
            BillingEventKind::SubscriptionDeleted => self.on_subscription_deleted(&event).await,
            BillingEventKind::PaymentIntentSucceeded => {
                self.on_payment_intent_succeeded(&event).await
            }
            BillingEventKind::Unhandled => {
                tracing::debug!(
                    event_id = %event.id,
                    event_type = %event.event_type,
                    "Unhandled event type; acknowledging"
                );
                Ok(WebhookOutcome::Skipped("unhandled event type"))
            }
        };

        if let Err(e) = &outcome {
            if e.alerts_operators() {
                tracing::error!(
                    event_id = %event.id,
                    event_type = %event.event_type,
                    error = %e,
                    "Unattributable money event; operator attention required"
                );
            }
        }

        outcome
    }

    // ── invoice.payment_succeeded ───────────────────────────────────

    async fn on_invoice_payment_succeeded(
        &self,
        event: &StripeEvent,
    ) -> Result<WebhookOutcome, BillingError> {
        let invoice: InvoiceObject = event
            .deserialize_object()
            .map_err(|e| BillingError::Parse(format!("invoice object: {}", e)))?;

        let Some(subscription_id) = invoice.subscription.clone() else {
            // One-off invoices have no subscription; nothing to do.
            tracing::debug!(
                event_id = %event.id,
                invoice_id = %invoice.id,
                "Invoice without subscription reference; skipping"
            );
            return Ok(WebhookOutcome::Skipped("invoice without subscription"));
        };

        let subscription = self.fetch_subscription(&subscription_id).await?;

        // Attribution: subscription metadata first, invoice metadata as
        // the fallback. A paid invoice with neither is fatal.
        let user_id = subscription
            .metadata_value(USER_ID_KEY)
            .or_else(|| invoice.metadata_value(USER_ID_KEY))
            .map(str::to_string)
            .ok_or(BillingError::MissingMetadata("userId"))?;
        let user_id = UserId::new(user_id)
            .map_err(|_| BillingError::MissingMetadata("userId"))?;

        let selection = self.require_selection(&subscription)?;

        self.reconciler
            .apply_activation(
                &user_id,
                &subscription,
                selection.plan,
                Some(selection.period),
                selection.promo,
            )
            .await?;

        Ok(WebhookOutcome::Processed)
    }

    // ── invoice.payment_failed ──────────────────────────────────────

    async fn on_invoice_payment_failed(
        &self,
        event: &StripeEvent,
    ) -> Result<WebhookOutcome, BillingError> {
        let invoice: InvoiceObject = event
            .deserialize_object()
            .map_err(|e| BillingError::Parse(format!("invoice object: {}", e)))?;

        if invoice.subscription.is_none() {
            return Ok(WebhookOutcome::Skipped("invoice without subscription"));
        }
        let Some(customer_id) = invoice.customer.as_deref() else {
            return Ok(WebhookOutcome::Skipped("invoice without customer"));
        };

        let Some(record) = self
            .store
            .find_by_customer(customer_id)
            .await
            .map_err(BillingError::from)?
        else {
            tracing::warn!(
                event_id = %event.id,
                customer_id = %customer_id,
                "Payment failure for unknown customer; skipping"
            );
            return Ok(WebhookOutcome::Skipped("unknown customer"));
        };

        tracing::info!(
            user_id = %record.user_id,
            invoice_id = %invoice.id,
            "Invoice payment failed; marking past_due"
        );

        // Status only. A payment failure must not downgrade quota.
        self.store
            .update_status(&StatusWrite {
                user_id: record.user_id.clone(),
                status: crate::domain::billing::SubscriptionStatus::PastDue,
                current_period_end: record.current_period_end,
                cancel_at_period_end: None,
            })
            .await
            .map_err(BillingError::from)?;

        Ok(WebhookOutcome::Processed)
    }

    // ── customer.subscription.updated ───────────────────────────────

    async fn on_subscription_updated(
        &self,
        event: &StripeEvent,
    ) -> Result<WebhookOutcome, BillingError> {
        let object: SubscriptionObject = event
            .deserialize_object()
            .map_err(|e| BillingError::Parse(format!("subscription object: {}", e)))?;

        let user_id = object
            .metadata_value(USER_ID_KEY)
            .map(str::to_string)
            .ok_or(BillingError::MissingMetadata("userId"))?;
        let user_id = UserId::new(user_id)
            .map_err(|_| BillingError::MissingMetadata("userId"))?;

        if object.parsed_status().grants_entitlement() {
            // Re-fetch with price expanded; the event payload is not
            // trusted for what the user bought.
            let subscription = self.fetch_subscription(&object.id).await?;
            let selection = self.require_selection(&subscription)?;

            self.reconciler
                .apply_activation(
                    &user_id,
                    &subscription,
                    selection.plan,
                    Some(selection.period),
                    selection.promo,
                )
                .await?;
        } else {
            // Non-active statuses mirror status/period/cancel-flag and
            // deliberately leave tier and credits alone: a transient
            // past_due must not downgrade quota mid-cycle.
            tracing::info!(
                user_id = %user_id,
                subscription_id = %object.id,
                status = %object.status,
                "Mirroring non-active subscription status"
            );
            self.store
                .update_status(&StatusWrite {
                    user_id: user_id.clone(),
                    status: object.parsed_status(),
                    current_period_end: object
                        .effective_period_end()
                        .and_then(Timestamp::from_unix_seconds),
                    cancel_at_period_end: Some(object.cancel_at_period_end),
                })
                .await
                .map_err(BillingError::from)?;
        }

        Ok(WebhookOutcome::Processed)
    }

    // ── customer.subscription.deleted ───────────────────────────────

    async fn on_subscription_deleted(
        &self,
        event: &StripeEvent,
    ) -> Result<WebhookOutcome, BillingError> {
        let object: SubscriptionObject = event
            .deserialize_object()
            .map_err(|e| BillingError::Parse(format!("subscription object: {}", e)))?;

        let user_id = object
            .metadata_value(USER_ID_KEY)
            .map(str::to_string)
            .ok_or(BillingError::MissingMetadata("userId"))?;
        let user_id = UserId::new(user_id)
            .map_err(|_| BillingError::MissingMetadata("userId"))?;

        tracing::info!(
            user_id = %user_id,
            subscription_id = %object.id,
            "Subscription deleted; downgrading to free tier"
        );

        self.store
            .downgrade_to_free(&user_id)
            .await
            .map_err(BillingError::from)?;

        Ok(WebhookOutcome::Processed)
    }

    // ── payment_intent.succeeded ────────────────────────────────────

    async fn on_payment_intent_succeeded(
        &self,
        event: &StripeEvent,
    ) -> Result<WebhookOutcome, BillingError> {
        let intent: PaymentIntentObject = event
            .deserialize_object()
            .map_err(|e| BillingError::Parse(format!("payment intent object: {}", e)))?;

        // Most payment intents are unrelated to the subscription
        // fallback flow and are expected to lack this metadata.
        let (Some(user_id), Some(subscription_id), Some(_plan)) = (
            intent.metadata_value(USER_ID_KEY),
            intent.metadata_value("subscriptionId"),
            intent.metadata_value("plan"),
        ) else {
            tracing::debug!(
                event_id = %event.id,
                payment_intent_id = %intent.id,
                "Payment intent without subscription fallback metadata; skipping"
            );
            return Ok(WebhookOutcome::Skipped(
                "payment intent without fallback metadata",
            ));
        };

        let user_id = UserId::new(user_id.to_string())
            .map_err(|_| BillingError::MissingMetadata("userId"))?;

        let subscription = self.fetch_subscription(subscription_id).await?;
        let selection = self.require_selection(&subscription)?;

        self.reconciler
            .apply_activation(
                &user_id,
                &subscription,
                selection.plan,
                Some(selection.period),
                selection.promo,
            )
            .await?;

        Ok(WebhookOutcome::Processed)
    }

    // ── helpers ─────────────────────────────────────────────────────

    async fn fetch_subscription(
        &self,
        subscription_id: &str,
    ) -> Result<Subscription, BillingError> {
        self.gateway
            .get_subscription(subscription_id)
            .await
            .map_err(BillingError::from)?
            .ok_or_else(|| {
                // 5xx so the delivery is retried; the subscription may
                // not be readable yet due to eventual consistency.
                BillingError::upstream(format!(
                    "subscription {} not retrievable",
                    subscription_id
                ))
            })
    }

    fn require_selection(
        &self,
        subscription: &Subscription,
    ) -> Result<PlanSelection, BillingError> {
        let price_id = subscription
            .price_id
            .as_deref()
            .ok_or(BillingError::MissingMetadata("price"))?;
        self.catalog
            .plan_from_price_id(price_id)
            .ok_or_else(|| BillingError::UnknownPrice(price_id.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::memory::InMemoryEntitlementStore;
    use crate::domain::billing::{
        Entitlement, PlanPrices, StripeEventBuilder, SubscriptionStatus, SubscriptionTier,
    };
    use crate::ports::{
        CreateCustomerRequest, CreateSubscriptionRequest, Customer, GatewayError, Invoice,
        PaymentMethodRef,
    };
    use async_trait::async_trait;
    use serde_json::json;

    // ════════════════════════════════════════════════════════════════
    // Mock Gateway
    // ════════════════════════════════════════════════════════════════

    struct MockGateway {
        subscription: Option<Subscription>,
    }

    impl MockGateway {
        fn with_subscription(subscription: Subscription) -> Self {
            Self {
                subscription: Some(subscription),
            }
        }

        fn empty() -> Self {
            Self { subscription: None }
        }
    }

    #[async_trait]
    impl PaymentGateway for MockGateway {
        async fn create_customer(
            &self,
            _request: CreateCustomerRequest,
        ) -> Result<Customer, GatewayError> {
            Err(GatewayError::provider("not used"))
        }

        async fn get_customer(
            &self,
            _customer_id: &str,
        ) -> Result<Option<Customer>, GatewayError> {
            Ok(None)
        }

        async fn create_subscription(
            &self,
            _request: CreateSubscriptionRequest,
        ) -> Result<Subscription, GatewayError> {
            Err(GatewayError::provider("not used"))
        }

        async fn get_subscription(
            &self,
            _subscription_id: &str,
        ) -> Result<Option<Subscription>, GatewayError> {
            Ok(self.subscription.clone())
        }

        async fn list_incomplete_subscriptions(
            &self,
            _customer_id: &str,
        ) -> Result<Vec<Subscription>, GatewayError> {
            Ok(vec![])
        }

        async fn get_invoice(&self, _invoice_id: &str) -> Result<Option<Invoice>, GatewayError> {
            Ok(None)
        }

        async fn pay_invoice(
            &self,
            _invoice_id: &str,
            _payment_method: Option<&str>,
        ) -> Result<Invoice, GatewayError> {
            Err(GatewayError::provider("not used"))
        }

        async fn list_card_payment_methods(
            &self,
            _customer_id: &str,
            _limit: u32,
        ) -> Result<Vec<PaymentMethodRef>, GatewayError> {
            Ok(vec![])
        }

        async fn set_cancel_at_period_end(
            &self,
            _subscription_id: &str,
        ) -> Result<Subscription, GatewayError> {
            Err(GatewayError::provider("not used"))
        }

        async fn verify_webhook(
            &self,
            _payload: &[u8],
            _signature: &str,
        ) -> Result<StripeEvent, GatewayError> {
            Err(GatewayError::invalid_webhook("not used"))
        }
    }

    // ════════════════════════════════════════════════════════════════
    // Test Helpers
    // ════════════════════════════════════════════════════════════════

    fn user() -> UserId {
        UserId::new("user_1").unwrap()
    }

    fn catalog() -> Arc<PriceCatalog> {
        Arc::new(PriceCatalog::new(
            PlanPrices {
                monthly: Some("price_starter_m".into()),
                monthly_promo: Some("price_starter_m_promo".into()),
                yearly: Some("price_starter_y".into()),
                yearly_promo: Some("price_starter_y_promo".into()),
            },
            PlanPrices {
                monthly: Some("price_pro_m".into()),
                monthly_promo: Some("price_pro_m_promo".into()),
                yearly: Some("price_pro_y".into()),
                yearly_promo: Some("price_pro_y_promo".into()),
            },
        ))
    }

    fn fetched_subscription(price_id: &str, with_user_metadata: bool) -> Subscription {
        let mut sub = Subscription {
            id: "sub_1".to_string(),
            customer_id: "cus_1".to_string(),
            status: SubscriptionStatus::Active,
            price_id: Some(price_id.to_string()),
            current_period_end: Some(1_706_745_600),
            cancel_at_period_end: false,
            ..Default::default()
        };
        if with_user_metadata {
            sub.metadata
                .insert(USER_ID_KEY.to_string(), "user_1".to_string());
        }
        sub
    }

    async fn seeded_store() -> Arc<InMemoryEntitlementStore> {
        let store =
            InMemoryEntitlementStore::with_record(Entitlement::new_free(user(), Timestamp::now()))
                .await;
        store.set_customer_id(&user(), "cus_1").await.unwrap();
        Arc::new(store)
    }

    fn processor(
        store: Arc<InMemoryEntitlementStore>,
        gateway: MockGateway,
    ) -> ProcessWebhookHandler {
        ProcessWebhookHandler::new(store, Arc::new(gateway), catalog())
    }

    fn invoice_event(subscription: Option<&str>) -> StripeEvent {
        let mut object = json!({
            "id": "in_1",
            "customer": "cus_1",
            "status": "paid"
        });
        if let Some(sub) = subscription {
            object["subscription"] = json!(sub);
        }
        StripeEventBuilder::new()
            .event_type("invoice.payment_succeeded")
            .object(object)
            .build()
    }

    fn subscription_updated_event(status: &str, with_user: bool) -> StripeEvent {
        let mut object = json!({
            "id": "sub_1",
            "customer": "cus_1",
            "status": status,
            "current_period_end": 1706745600,
            "cancel_at_period_end": true,
        });
        if with_user {
            object["metadata"] = json!({"userId": "user_1"});
        }
        StripeEventBuilder::new()
            .event_type("customer.subscription.updated")
            .object(object)
            .build()
    }

    // ════════════════════════════════════════════════════════════════
    // invoice.payment_succeeded
    // ════════════════════════════════════════════════════════════════

    #[tokio::test]
    async fn paid_invoice_activates_tier_from_price() {
        let store = seeded_store().await;
        let gateway =
            MockGateway::with_subscription(fetched_subscription("price_pro_y_promo", true));
        let handler = processor(store.clone(), gateway);

        let outcome = handler.process(invoice_event(Some("sub_1"))).await.unwrap();

        assert_eq!(outcome, WebhookOutcome::Processed);
        let record = store.get(&user()).await.unwrap();
        assert_eq!(record.tier, SubscriptionTier::Pro);
        assert_eq!(record.credits_used, 0);
        assert_eq!(record.credits_total, 5_000);
        assert!(record.welcome_offer_used);
        assert_eq!(record.stripe_subscription_id.as_deref(), Some("sub_1"));
    }

    #[tokio::test]
    async fn paid_invoice_without_subscription_is_skipped() {
        let store = seeded_store().await;
        let handler = processor(store.clone(), MockGateway::empty());

        let outcome = handler.process(invoice_event(None)).await.unwrap();

        assert!(matches!(outcome, WebhookOutcome::Skipped(_)));
        // Record untouched.
        assert_eq!(
            store.get(&user()).await.unwrap().tier,
            SubscriptionTier::Free
        );
    }

    #[tokio::test]
    async fn paid_invoice_without_user_attribution_is_fatal() {
        let store = seeded_store().await;
        let gateway =
            MockGateway::with_subscription(fetched_subscription("price_pro_y_promo", false));
        let handler = processor(store, gateway);

        let result = handler.process(invoice_event(Some("sub_1"))).await;

        assert!(matches!(result, Err(BillingError::MissingMetadata("userId"))));
    }

    #[tokio::test]
    async fn paid_invoice_falls_back_to_invoice_metadata_for_user() {
        let store = seeded_store().await;
        let gateway =
            MockGateway::with_subscription(fetched_subscription("price_starter_m", false));
        let handler = processor(store.clone(), gateway);

        let event = StripeEventBuilder::new()
            .event_type("invoice.payment_succeeded")
            .object(json!({
                "id": "in_1",
                "customer": "cus_1",
                "subscription": "sub_1",
                "metadata": {"userId": "user_1"}
            }))
            .build();

        let outcome = handler.process(event).await.unwrap();
        assert_eq!(outcome, WebhookOutcome::Processed);
        assert_eq!(
            store.get(&user()).await.unwrap().tier,
            SubscriptionTier::Starter
        );
    }

    #[tokio::test]
    async fn paid_invoice_with_unknown_price_is_fatal() {
        let store = seeded_store().await;
        let gateway =
            MockGateway::with_subscription(fetched_subscription("price_not_in_catalog", true));
        let handler = processor(store, gateway);

        let result = handler.process(invoice_event(Some("sub_1"))).await;

        assert!(matches!(result, Err(BillingError::UnknownPrice(_))));
    }

    #[tokio::test]
    async fn duplicate_paid_invoice_deliveries_are_idempotent() {
        let store = seeded_store().await;
        let gateway = MockGateway::with_subscription(fetched_subscription("price_pro_m", true));
        let handler = processor(store.clone(), gateway);

        handler.process(invoice_event(Some("sub_1"))).await.unwrap();
        let first = store.get(&user()).await.unwrap();
        handler.process(invoice_event(Some("sub_1"))).await.unwrap();
        let second = store.get(&user()).await.unwrap();

        assert_eq!(first.tier, second.tier);
        assert_eq!(first.credits_total, second.credits_total);
        assert_eq!(first.credits_used, second.credits_used);
    }

    // ════════════════════════════════════════════════════════════════
    // customer.subscription.updated
    // ════════════════════════════════════════════════════════════════

    #[tokio::test]
    async fn past_due_update_does_not_touch_tier_or_credits() {
        let store = seeded_store().await;
        // Seed an active pro entitlement first.
        let gateway = MockGateway::with_subscription(fetched_subscription("price_pro_m", true));
        let handler = processor(store.clone(), gateway);
        handler.process(invoice_event(Some("sub_1"))).await.unwrap();

        let handler = processor(
            store.clone(),
            MockGateway::empty(), // must not be consulted for non-active updates
        );
        let outcome = handler
            .process(subscription_updated_event("past_due", true))
            .await
            .unwrap();

        assert_eq!(outcome, WebhookOutcome::Processed);
        let record = store.get(&user()).await.unwrap();
        assert_eq!(record.status, SubscriptionStatus::PastDue);
        assert!(record.cancel_at_period_end);
        // Tier and quota survive the transient failure state.
        assert_eq!(record.tier, SubscriptionTier::Pro);
        assert_eq!(record.credits_total, 5_000);
    }

    #[tokio::test]
    async fn active_update_refetches_and_reconciles() {
        let store = seeded_store().await;
        let gateway =
            MockGateway::with_subscription(fetched_subscription("price_starter_y", true));
        let handler = processor(store.clone(), gateway);

        let outcome = handler
            .process(subscription_updated_event("active", true))
            .await
            .unwrap();

        assert_eq!(outcome, WebhookOutcome::Processed);
        let record = store.get(&user()).await.unwrap();
        assert_eq!(record.tier, SubscriptionTier::Starter);
        assert_eq!(record.credits_total, 1_500);
    }

    #[tokio::test]
    async fn subscription_update_without_user_metadata_is_fatal() {
        let store = seeded_store().await;
        let handler = processor(store, MockGateway::empty());

        let result = handler
            .process(subscription_updated_event("past_due", false))
            .await;

        assert!(matches!(result, Err(BillingError::MissingMetadata("userId"))));
    }

    // ════════════════════════════════════════════════════════════════
    // customer.subscription.deleted
    // ════════════════════════════════════════════════════════════════

    #[tokio::test]
    async fn deletion_downgrades_pro_user_to_free() {
        let store = seeded_store().await;
        let gateway = MockGateway::with_subscription(fetched_subscription("price_pro_m", true));
        let handler = processor(store.clone(), gateway);
        handler.process(invoice_event(Some("sub_1"))).await.unwrap();

        let event = StripeEventBuilder::new()
            .event_type("customer.subscription.deleted")
            .object(json!({
                "id": "sub_1",
                "customer": "cus_1",
                "status": "canceled",
                "metadata": {"userId": "user_1"}
            }))
            .build();

        let handler = processor(store.clone(), MockGateway::empty());
        let outcome = handler.process(event).await.unwrap();

        assert_eq!(outcome, WebhookOutcome::Processed);
        let record = store.get(&user()).await.unwrap();
        assert_eq!(record.tier, SubscriptionTier::Free);
        assert_eq!(record.status, SubscriptionStatus::Canceled);
        assert!(record.stripe_subscription_id.is_none());
        assert_eq!(record.credits_total, 500);
        assert_eq!(record.credits_used, 0);
        // Customer reference is never cleared.
        assert_eq!(record.stripe_customer_id.as_deref(), Some("cus_1"));
    }

    #[tokio::test]
    async fn deletion_without_user_metadata_is_fatal() {
        let store = seeded_store().await;
        let handler = processor(store, MockGateway::empty());

        let event = StripeEventBuilder::new()
            .event_type("customer.subscription.deleted")
            .object(json!({
                "id": "sub_1",
                "customer": "cus_1",
                "status": "canceled"
            }))
            .build();

        let result = handler.process(event).await;
        assert!(matches!(result, Err(BillingError::MissingMetadata("userId"))));
    }

    // ════════════════════════════════════════════════════════════════
    // payment_intent.succeeded
    // ════════════════════════════════════════════════════════════════

    #[tokio::test]
    async fn payment_intent_with_fallback_metadata_reconciles() {
        let store = seeded_store().await;
        let gateway = MockGateway::with_subscription(fetched_subscription("price_pro_m", true));
        let handler = processor(store.clone(), gateway);

        let event = StripeEventBuilder::new()
            .event_type("payment_intent.succeeded")
            .object(json!({
                "id": "pi_1",
                "metadata": {
                    "userId": "user_1",
                    "subscriptionId": "sub_1",
                    "plan": "pro"
                }
            }))
            .build();

        let outcome = handler.process(event).await.unwrap();
        assert_eq!(outcome, WebhookOutcome::Processed);
        assert_eq!(
            store.get(&user()).await.unwrap().tier,
            SubscriptionTier::Pro
        );
    }

    #[tokio::test]
    async fn unrelated_payment_intent_is_skipped_not_errored() {
        let store = seeded_store().await;
        let handler = processor(store, MockGateway::empty());

        let event = StripeEventBuilder::new()
            .event_type("payment_intent.succeeded")
            .object(json!({"id": "pi_random", "metadata": {}}))
            .build();

        let outcome = handler.process(event).await.unwrap();
        assert!(matches!(outcome, WebhookOutcome::Skipped(_)));
    }

    // ════════════════════════════════════════════════════════════════
    // invoice.payment_failed
    // ════════════════════════════════════════════════════════════════

    #[tokio::test]
    async fn payment_failure_writes_past_due_status_only() {
        let store = seeded_store().await;
        let gateway = MockGateway::with_subscription(fetched_subscription("price_pro_m", true));
        let handler = processor(store.clone(), gateway);
        handler.process(invoice_event(Some("sub_1"))).await.unwrap();
        let before = store.get(&user()).await.unwrap();

        let event = StripeEventBuilder::new()
            .event_type("invoice.payment_failed")
            .object(json!({
                "id": "in_2",
                "customer": "cus_1",
                "subscription": "sub_1",
                "status": "open"
            }))
            .build();

        let handler = processor(store.clone(), MockGateway::empty());
        let outcome = handler.process(event).await.unwrap();

        assert_eq!(outcome, WebhookOutcome::Processed);
        let after = store.get(&user()).await.unwrap();
        assert_eq!(after.status, SubscriptionStatus::PastDue);
        assert_eq!(after.tier, before.tier);
        assert_eq!(after.credits_total, before.credits_total);
        assert_eq!(after.current_period_end, before.current_period_end);
    }

    #[tokio::test]
    async fn payment_failure_for_unknown_customer_is_skipped() {
        let store = Arc::new(InMemoryEntitlementStore::new());
        let handler = processor(store, MockGateway::empty());

        let event = StripeEventBuilder::new()
            .event_type("invoice.payment_failed")
            .object(json!({
                "id": "in_2",
                "customer": "cus_stranger",
                "subscription": "sub_x"
            }))
            .build();

        let outcome = handler.process(event).await.unwrap();
        assert!(matches!(outcome, WebhookOutcome::Skipped(_)));
    }

    // ════════════════════════════════════════════════════════════════
    // Classification
    // ════════════════════════════════════════════════════════════════

    #[tokio::test]
    async fn unknown_event_types_are_acknowledged_and_skipped() {
        let store = seeded_store().await;
        let handler = processor(store, MockGateway::empty());

        let event = StripeEventBuilder::new()
            .event_type("charge.refunded")
            .object(json!({"id": "ch_1"}))
            .build();

        let outcome = handler.process(event).await.unwrap();
        assert_eq!(outcome, WebhookOutcome::Skipped("unhandled event type"));
    }

    #[tokio::test]
    async fn malformed_object_is_a_parse_error() {
        let store = seeded_store().await;
        let handler = processor(store, MockGateway::empty());

        // Subscription object without an id.
        let event = StripeEventBuilder::new()
            .event_type("customer.subscription.updated")
            .object(json!({"customer": "cus_1"}))
            .build();

        let result = handler.process(event).await;
        assert!(matches!(result, Err(BillingError::Parse(_))));
    }
}
