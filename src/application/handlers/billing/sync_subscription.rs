//! SyncSubscriptionHandler - on-demand reconciliation to close the
//! webhook latency gap.
//!
//! Called by the client right after payment confirmation: "is this done
//! yet, and if not, can you finish it." Attempts to settle an open
//! invoice, then re-checks status and reconciles if the subscription
//! became active. A subscription that is still pending (3-D Secure,
//! processing) returns `success: false` as a normal outcome, not an
//! error; payment attempts race webhook-driven reconciliation safely
//! because the reconciler is an idempotent upsert.

use std::sync::Arc;

use crate::domain::billing::{BillingError, PriceCatalog, SubscriptionStatus};
use crate::domain::foundation::UserId;
use crate::ports::{EntitlementStore, PaymentGateway, Subscription};

use super::reconciler::ActivationReconciler;

/// Command to sync one subscription.
#[derive(Debug, Clone)]
pub struct SyncSubscriptionCommand {
    pub user_id: UserId,
    pub subscription_id: String,
}

/// Result of a sync call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncOutcome {
    /// True when the subscription is active and the entitlement record
    /// was updated.
    pub success: bool,
    /// Processor status at the end of the call.
    pub status: SubscriptionStatus,
}

pub struct SyncSubscriptionHandler {
    gateway: Arc<dyn PaymentGateway>,
    catalog: Arc<PriceCatalog>,
    reconciler: ActivationReconciler,
}

impl SyncSubscriptionHandler {
    pub fn new(
        store: Arc<dyn EntitlementStore>,
        gateway: Arc<dyn PaymentGateway>,
        catalog: Arc<PriceCatalog>,
    ) -> Self {
        Self {
            gateway,
            catalog,
            reconciler: ActivationReconciler::new(store),
        }
    }

    pub async fn handle(&self, cmd: SyncSubscriptionCommand) -> Result<SyncOutcome, BillingError> {
        if cmd.subscription_id.is_empty() {
            return Err(BillingError::validation(
                "subscription_id",
                "must not be empty",
            ));
        }

        tracing::info!(
            user_id = %cmd.user_id,
            subscription_id = %cmd.subscription_id,
            "Syncing subscription"
        );

        let mut subscription = self.fetch(&cmd.subscription_id).await?;

        if matches!(
            subscription.status,
            SubscriptionStatus::Incomplete | SubscriptionStatus::PastDue
        ) {
            if let Some(invoice) = subscription.latest_invoice.clone().filter(|i| i.is_open()) {
                self.try_pay_invoice(&subscription, &invoice.id, invoice.payment_method.as_deref())
                    .await;

                // Re-check regardless of how the attempt went; a
                // concurrent webhook-driven path may have settled it.
                subscription = self.fetch(&cmd.subscription_id).await?;
            }
        }

        if subscription.status.grants_entitlement() {
            let price_id = subscription
                .price_id
                .as_deref()
                .ok_or(BillingError::MissingMetadata("price"))?;
            let selection = self
                .catalog
                .plan_from_price_id(price_id)
                .ok_or_else(|| BillingError::UnknownPrice(price_id.to_string()))?;

            self.reconciler
                .apply_activation(
                    &cmd.user_id,
                    &subscription,
                    selection.plan,
                    Some(selection.period),
                    selection.promo,
                )
                .await?;

            return Ok(SyncOutcome {
                success: true,
                status: subscription.status,
            });
        }

        tracing::info!(
            user_id = %cmd.user_id,
            subscription_id = %cmd.subscription_id,
            status = %subscription.status,
            "Subscription not active yet"
        );

        Ok(SyncOutcome {
            success: false,
            status: subscription.status,
        })
    }

    async fn fetch(&self, subscription_id: &str) -> Result<Subscription, BillingError> {
        self.gateway
            .get_subscription(subscription_id)
            .await
            .map_err(BillingError::from)?
            .ok_or_else(|| BillingError::SubscriptionNotFound(subscription_id.to_string()))
    }

    /// Best-effort invoice settlement. Prefers the payment method on
    /// the invoice; otherwise attaches the customer's most recent card.
    /// Failure is logged and swallowed; the subsequent status check
    /// decides the outcome.
    async fn try_pay_invoice(
        &self,
        subscription: &Subscription,
        invoice_id: &str,
        invoice_payment_method: Option<&str>,
    ) {
        let payment_method = match invoice_payment_method {
            Some(pm) => Some(pm.to_string()),
            None => {
                tracing::debug!(
                    invoice_id = %invoice_id,
                    customer_id = %subscription.customer_id,
                    "No payment method on invoice; listing customer cards"
                );
                match self
                    .gateway
                    .list_card_payment_methods(&subscription.customer_id, 1)
                    .await
                {
                    Ok(methods) => methods.into_iter().next().map(|m| m.id),
                    Err(e) => {
                        tracing::warn!(
                            customer_id = %subscription.customer_id,
                            error = %e,
                            "Listing payment methods failed"
                        );
                        None
                    }
                }
            }
        };

        let Some(payment_method) = payment_method else {
            tracing::warn!(
                invoice_id = %invoice_id,
                customer_id = %subscription.customer_id,
                "Cannot pay invoice: no payment method available"
            );
            return;
        };

        match self
            .gateway
            .pay_invoice(invoice_id, Some(&payment_method))
            .await
        {
            Ok(_) => {
                tracing::info!(invoice_id = %invoice_id, "Invoice paid");
            }
            Err(e) => {
                tracing::warn!(
                    invoice_id = %invoice_id,
                    error = %e,
                    "Invoice pay attempt failed; proceeding to status re-check"
                );
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::memory::InMemoryEntitlementStore;
    use crate::domain::billing::{
        Entitlement, PlanPrices, StripeEvent, SubscriptionTier,
    };
    use crate::domain::foundation::Timestamp;
    use crate::ports::{
        CreateCustomerRequest, CreateSubscriptionRequest, Customer, GatewayError, Invoice,
        PaymentMethodRef,
    };
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
    use std::sync::Mutex as StdMutex;

    // ════════════════════════════════════════════════════════════════
    // Mock Gateway
    // ════════════════════════════════════════════════════════════════

    struct MockGateway {
        initial: Option<Subscription>,
        after_pay: Option<Subscription>,
        cards: Vec<PaymentMethodRef>,
        fail_pay: bool,
        paid: AtomicBool,
        pay_calls: AtomicU32,
        pay_methods_used: StdMutex<Vec<Option<String>>>,
    }

    impl MockGateway {
        fn new(initial: Option<Subscription>) -> Self {
            Self {
                initial,
                after_pay: None,
                cards: vec![],
                fail_pay: false,
                paid: AtomicBool::new(false),
                pay_calls: AtomicU32::new(0),
                pay_methods_used: StdMutex::new(Vec::new()),
            }
        }

        fn with_after_pay(mut self, subscription: Subscription) -> Self {
            self.after_pay = Some(subscription);
            self
        }

        fn with_cards(mut self, cards: Vec<&str>) -> Self {
            self.cards = cards
                .into_iter()
                .map(|id| PaymentMethodRef { id: id.to_string() })
                .collect();
            self
        }

        fn failing_pay(mut self) -> Self {
            self.fail_pay = true;
            self
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
            if self.paid.load(Ordering::SeqCst) {
                if let Some(after) = &self.after_pay {
                    return Ok(Some(after.clone()));
                }
            }
            Ok(self.initial.clone())
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
            invoice_id: &str,
            payment_method: Option<&str>,
        ) -> Result<Invoice, GatewayError> {
            self.pay_calls.fetch_add(1, Ordering::SeqCst);
            self.pay_methods_used
                .lock()
                .unwrap()
                .push(payment_method.map(String::from));
            if self.fail_pay {
                return Err(GatewayError::provider("card declined"));
            }
            self.paid.store(true, Ordering::SeqCst);
            Ok(Invoice {
                id: invoice_id.to_string(),
                status: "paid".to_string(),
                payment_method: payment_method.map(String::from),
                payment_intent: None,
                amount_paid: 2_900,
            })
        }

        async fn list_card_payment_methods(
            &self,
            _customer_id: &str,
            limit: u32,
        ) -> Result<Vec<PaymentMethodRef>, GatewayError> {
            Ok(self.cards.iter().take(limit as usize).cloned().collect())
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
                ..Default::default()
            },
            PlanPrices {
                monthly: Some("price_pro_m".into()),
                ..Default::default()
            },
        ))
    }

    fn active_subscription(price_id: &str) -> Subscription {
        Subscription {
            id: "sub_1".to_string(),
            customer_id: "cus_1".to_string(),
            status: SubscriptionStatus::Active,
            price_id: Some(price_id.to_string()),
            current_period_end: Some(1_706_745_600),
            ..Default::default()
        }
    }

    fn incomplete_subscription(invoice_payment_method: Option<&str>) -> Subscription {
        Subscription {
            id: "sub_1".to_string(),
            customer_id: "cus_1".to_string(),
            status: SubscriptionStatus::Incomplete,
            price_id: Some("price_pro_m".to_string()),
            latest_invoice: Some(Invoice {
                id: "in_1".to_string(),
                status: "open".to_string(),
                payment_method: invoice_payment_method.map(String::from),
                payment_intent: None,
                amount_paid: 0,
            }),
            ..Default::default()
        }
    }

    async fn seeded_store() -> Arc<InMemoryEntitlementStore> {
        Arc::new(
            InMemoryEntitlementStore::with_record(Entitlement::new_free(user(), Timestamp::now()))
                .await,
        )
    }

    fn command() -> SyncSubscriptionCommand {
        SyncSubscriptionCommand {
            user_id: user(),
            subscription_id: "sub_1".to_string(),
        }
    }

    // ════════════════════════════════════════════════════════════════
    // Already Active
    // ════════════════════════════════════════════════════════════════

    #[tokio::test]
    async fn active_subscription_reconciles_and_succeeds() {
        let store = seeded_store().await;
        let gateway = Arc::new(MockGateway::new(Some(active_subscription("price_pro_m"))));
        let handler = SyncSubscriptionHandler::new(store.clone(), gateway.clone(), catalog());

        let outcome = handler.handle(command()).await.unwrap();

        assert!(outcome.success);
        assert_eq!(outcome.status, SubscriptionStatus::Active);
        assert_eq!(
            store.get(&user()).await.unwrap().tier,
            SubscriptionTier::Pro
        );
        // No payment attempt for an already-active subscription.
        assert_eq!(gateway.pay_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn active_subscription_with_unknown_price_is_fatal() {
        let store = seeded_store().await;
        let gateway = Arc::new(MockGateway::new(Some(active_subscription("price_mystery"))));
        let handler = SyncSubscriptionHandler::new(store, gateway, catalog());

        let result = handler.handle(command()).await;
        assert!(matches!(result, Err(BillingError::UnknownPrice(_))));
    }

    // ════════════════════════════════════════════════════════════════
    // Open Invoice Settlement
    // ════════════════════════════════════════════════════════════════

    #[tokio::test]
    async fn pays_open_invoice_with_invoice_payment_method() {
        let store = seeded_store().await;
        let gateway = Arc::new(
            MockGateway::new(Some(incomplete_subscription(Some("pm_on_invoice"))))
                .with_after_pay(active_subscription("price_pro_m")),
        );
        let handler = SyncSubscriptionHandler::new(store.clone(), gateway.clone(), catalog());

        let outcome = handler.handle(command()).await.unwrap();

        assert!(outcome.success);
        assert_eq!(gateway.pay_calls.load(Ordering::SeqCst), 1);
        assert_eq!(
            gateway.pay_methods_used.lock().unwrap()[0].as_deref(),
            Some("pm_on_invoice")
        );
        assert_eq!(
            store.get(&user()).await.unwrap().tier,
            SubscriptionTier::Pro
        );
    }

    #[tokio::test]
    async fn falls_back_to_customer_card_when_invoice_has_no_method() {
        let store = seeded_store().await;
        let gateway = Arc::new(
            MockGateway::new(Some(incomplete_subscription(None)))
                .with_cards(vec!["pm_card_newest"])
                .with_after_pay(active_subscription("price_pro_m")),
        );
        let handler = SyncSubscriptionHandler::new(store, gateway.clone(), catalog());

        let outcome = handler.handle(command()).await.unwrap();

        assert!(outcome.success);
        assert_eq!(
            gateway.pay_methods_used.lock().unwrap()[0].as_deref(),
            Some("pm_card_newest")
        );
    }

    #[tokio::test]
    async fn zero_cards_returns_not_active_without_throwing() {
        let store = seeded_store().await;
        let gateway = Arc::new(MockGateway::new(Some(incomplete_subscription(None))));
        let handler = SyncSubscriptionHandler::new(store.clone(), gateway.clone(), catalog());

        let outcome = handler.handle(command()).await.unwrap();

        assert!(!outcome.success);
        assert_eq!(outcome.status, SubscriptionStatus::Incomplete);
        // No pay attempt was possible.
        assert_eq!(gateway.pay_calls.load(Ordering::SeqCst), 0);
        // Entitlement untouched.
        assert_eq!(
            store.get(&user()).await.unwrap().tier,
            SubscriptionTier::Free
        );
    }

    #[tokio::test]
    async fn failed_pay_attempt_degrades_to_not_active() {
        let store = seeded_store().await;
        let gateway = Arc::new(
            MockGateway::new(Some(incomplete_subscription(Some("pm_1")))).failing_pay(),
        );
        let handler = SyncSubscriptionHandler::new(store, gateway.clone(), catalog());

        let outcome = handler.handle(command()).await.unwrap();

        assert!(!outcome.success);
        assert_eq!(gateway.pay_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn past_due_with_open_invoice_also_attempts_payment() {
        let store = seeded_store().await;
        let mut sub = incomplete_subscription(Some("pm_1"));
        sub.status = SubscriptionStatus::PastDue;
        let gateway = Arc::new(
            MockGateway::new(Some(sub)).with_after_pay(active_subscription("price_starter_m")),
        );
        let handler = SyncSubscriptionHandler::new(store.clone(), gateway.clone(), catalog());

        let outcome = handler.handle(command()).await.unwrap();

        assert!(outcome.success);
        assert_eq!(
            store.get(&user()).await.unwrap().tier,
            SubscriptionTier::Starter
        );
    }

    // ════════════════════════════════════════════════════════════════
    // Edge Cases
    // ════════════════════════════════════════════════════════════════

    #[tokio::test]
    async fn missing_subscription_is_not_found() {
        let store = seeded_store().await;
        let gateway = Arc::new(MockGateway::new(None));
        let handler = SyncSubscriptionHandler::new(store, gateway, catalog());

        let result = handler.handle(command()).await;
        assert!(matches!(result, Err(BillingError::SubscriptionNotFound(_))));
    }

    #[tokio::test]
    async fn empty_subscription_id_is_a_validation_error() {
        let store = seeded_store().await;
        let gateway = Arc::new(MockGateway::new(None));
        let handler = SyncSubscriptionHandler::new(store, gateway, catalog());

        let mut cmd = command();
        cmd.subscription_id = String::new();

        let result = handler.handle(cmd).await;
        assert!(matches!(result, Err(BillingError::Validation { .. })));
    }

    #[tokio::test]
    async fn pending_3ds_returns_not_active_as_normal_outcome() {
        let store = seeded_store().await;
        // Incomplete, but the invoice is not open (payment processing).
        let mut sub = incomplete_subscription(None);
        sub.latest_invoice.as_mut().unwrap().status = "paid".to_string();
        let gateway = Arc::new(MockGateway::new(Some(sub)));
        let handler = SyncSubscriptionHandler::new(store, gateway.clone(), catalog());

        let outcome = handler.handle(command()).await.unwrap();

        assert!(!outcome.success);
        assert_eq!(gateway.pay_calls.load(Ordering::SeqCst), 0);
    }
}
