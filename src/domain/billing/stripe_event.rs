//! Stripe webhook event envelope and classification.
//!
//! Only fields relevant to reconciliation are captured. Event kinds are
//! a closed enum: a new processor event type lands in `Unhandled` and is
//! acknowledged without processing, never silently misrouted.

use serde::{Deserialize, Serialize};

/// Stripe webhook event (simplified).
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StripeEvent {
    /// Unique identifier for the event (evt_xxx format).
    pub id: String,

    /// Type of event (e.g., "invoice.payment_succeeded").
    #[serde(rename = "type")]
    pub event_type: String,

    /// Time at which the event was created (Unix timestamp).
    pub created: i64,

    /// Object containing event-specific data.
    pub data: StripeEventData,

    /// Whether this is a live mode event (vs test mode).
    pub livemode: bool,
}

/// Container for event-specific data.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StripeEventData {
    /// The object that triggered the event (polymorphic per event type).
    pub object: serde_json::Value,

    /// Previous values for updated attributes (update events only).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub previous_attributes: Option<serde_json::Value>,
}

impl StripeEvent {
    /// Parse the event type into a known enum variant.
    pub fn kind(&self) -> BillingEventKind {
        BillingEventKind::from_type(&self.event_type)
    }

    /// Attempts to deserialize the data object as the specified type.
    pub fn deserialize_object<T: serde::de::DeserializeOwned>(
        &self,
    ) -> Result<T, serde_json::Error> {
        serde_json::from_value(self.data.object.clone())
    }
}

/// The webhook event kinds this engine acts on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BillingEventKind {
    /// Invoice paid; the primary activation/renewal signal.
    InvoicePaymentSucceeded,
    /// Invoice payment failed; status-only write.
    InvoicePaymentFailed,
    /// Subscription changed (status, period, cancel flag).
    SubscriptionUpdated,
    /// Subscription ended; downgrade to free.
    SubscriptionDeleted,
    /// Payment intent confirmed; fallback activation path for flows
    /// that bypass standard invoice webhooks.
    PaymentIntentSucceeded,
    /// Known-irrelevant or unrecognized event. Acknowledged, skipped.
    Unhandled,
}

impl BillingEventKind {
    /// Classify a processor event type string.
    pub fn from_type(s: &str) -> Self {
        match s {
            "invoice.payment_succeeded" => Self::InvoicePaymentSucceeded,
            "invoice.payment_failed" => Self::InvoicePaymentFailed,
            "customer.subscription.updated" => Self::SubscriptionUpdated,
            "customer.subscription.deleted" => Self::SubscriptionDeleted,
            "payment_intent.succeeded" => Self::PaymentIntentSucceeded,
            _ => Self::Unhandled,
        }
    }

    /// The processor's event type string.
    pub fn as_type(&self) -> &'static str {
        match self {
            Self::InvoicePaymentSucceeded => "invoice.payment_succeeded",
            Self::InvoicePaymentFailed => "invoice.payment_failed",
            Self::SubscriptionUpdated => "customer.subscription.updated",
            Self::SubscriptionDeleted => "customer.subscription.deleted",
            Self::PaymentIntentSucceeded => "payment_intent.succeeded",
            Self::Unhandled => "unhandled",
        }
    }
}

/// Invoice object as delivered inside webhook events.
#[derive(Debug, Clone, Deserialize)]
pub struct InvoiceObject {
    pub id: String,
    #[serde(default)]
    pub customer: Option<String>,
    #[serde(default)]
    pub subscription: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub metadata: std::collections::HashMap<String, String>,
}

impl InvoiceObject {
    pub fn metadata_value(&self, key: &str) -> Option<&str> {
        self.metadata.get(key).map(String::as_str)
    }
}

/// Subscription object as delivered inside webhook events.
#[derive(Debug, Clone, Deserialize)]
pub struct SubscriptionObject {
    pub id: String,
    pub customer: String,
    pub status: String,
    #[serde(default)]
    pub current_period_end: Option<i64>,
    #[serde(default)]
    pub cancel_at_period_end: bool,
    #[serde(default)]
    pub metadata: std::collections::HashMap<String, String>,
    #[serde(default)]
    pub items: Option<SubscriptionItemList>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct SubscriptionItemList {
    #[serde(default)]
    pub data: Vec<SubscriptionItemObject>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SubscriptionItemObject {
    #[serde(default)]
    pub current_period_end: Option<i64>,
    #[serde(default)]
    pub price: Option<PriceObject>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PriceObject {
    pub id: String,
}

impl SubscriptionObject {
    /// Period end, falling back to the first item when the top-level
    /// field is absent (newer API versions report it per item).
    pub fn effective_period_end(&self) -> Option<i64> {
        self.current_period_end.or_else(|| {
            self.items
                .as_ref()
                .and_then(|items| items.data.first())
                .and_then(|item| item.current_period_end)
        })
    }

    /// Price id of the first item, when expanded.
    pub fn price_id(&self) -> Option<&str> {
        self.items
            .as_ref()
            .and_then(|items| items.data.first())
            .and_then(|item| item.price.as_ref())
            .map(|price| price.id.as_str())
    }

    pub fn metadata_value(&self, key: &str) -> Option<&str> {
        self.metadata.get(key).map(String::as_str)
    }

    pub fn parsed_status(&self) -> super::SubscriptionStatus {
        super::SubscriptionStatus::parse(&self.status)
    }
}

/// Payment intent object as delivered inside webhook events.
#[derive(Debug, Clone, Deserialize)]
pub struct PaymentIntentObject {
    pub id: String,
    #[serde(default)]
    pub metadata: std::collections::HashMap<String, String>,
}

impl PaymentIntentObject {
    pub fn metadata_value(&self, key: &str) -> Option<&str> {
        self.metadata.get(key).map(String::as_str)
    }
}

/// Builder for creating test StripeEvent instances.
#[cfg(test)]
pub struct StripeEventBuilder {
    id: String,
    event_type: String,
    created: i64,
    object: serde_json::Value,
    livemode: bool,
}

#[cfg(test)]
impl Default for StripeEventBuilder {
    fn default() -> Self {
        Self {
            id: "evt_test_123".to_string(),
            event_type: "invoice.payment_succeeded".to_string(),
            created: 1_704_067_200,
            object: serde_json::json!({}),
            livemode: false,
        }
    }
}

#[cfg(test)]
impl StripeEventBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn id(mut self, id: impl Into<String>) -> Self {
        self.id = id.into();
        self
    }

    pub fn event_type(mut self, event_type: impl Into<String>) -> Self {
        self.event_type = event_type.into();
        self
    }

    pub fn object(mut self, object: serde_json::Value) -> Self {
        self.object = object;
        self
    }

    pub fn build(self) -> StripeEvent {
        StripeEvent {
            id: self.id,
            event_type: self.event_type,
            created: self.created,
            data: StripeEventData {
                object: self.object,
                previous_attributes: None,
            },
            livemode: self.livemode,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn deserialize_minimal_event() {
        let json = r#"{
            "id": "evt_1234567890",
            "type": "invoice.payment_succeeded",
            "created": 1704067200,
            "data": {
                "object": {}
            },
            "livemode": false
        }"#;

        let event: StripeEvent = serde_json::from_str(json).unwrap();

        assert_eq!(event.id, "evt_1234567890");
        assert_eq!(event.event_type, "invoice.payment_succeeded");
        assert_eq!(event.created, 1704067200);
        assert!(!event.livemode);
    }

    #[test]
    fn deserialize_event_with_previous_attributes() {
        let json = r#"{
            "id": "evt_update_123",
            "type": "customer.subscription.updated",
            "created": 1704067200,
            "data": {
                "object": {"status": "active"},
                "previous_attributes": {"status": "past_due"}
            },
            "livemode": true
        }"#;

        let event: StripeEvent = serde_json::from_str(json).unwrap();

        assert!(event.livemode);
        let prev = event.data.previous_attributes.unwrap();
        assert_eq!(prev["status"], "past_due");
    }

    #[test]
    fn kind_classifies_the_five_handled_types() {
        let cases = [
            ("invoice.payment_succeeded", BillingEventKind::InvoicePaymentSucceeded),
            ("invoice.payment_failed", BillingEventKind::InvoicePaymentFailed),
            ("customer.subscription.updated", BillingEventKind::SubscriptionUpdated),
            ("customer.subscription.deleted", BillingEventKind::SubscriptionDeleted),
            ("payment_intent.succeeded", BillingEventKind::PaymentIntentSucceeded),
        ];
        for (type_str, expected) in cases {
            let event = StripeEventBuilder::new().event_type(type_str).build();
            assert_eq!(event.kind(), expected);
        }
    }

    #[test]
    fn kind_maps_unknown_types_to_unhandled() {
        let event = StripeEventBuilder::new()
            .event_type("charge.dispute.created")
            .build();
        assert_eq!(event.kind(), BillingEventKind::Unhandled);
    }

    #[test]
    fn event_kind_type_string_roundtrip() {
        let kinds = [
            BillingEventKind::InvoicePaymentSucceeded,
            BillingEventKind::InvoicePaymentFailed,
            BillingEventKind::SubscriptionUpdated,
            BillingEventKind::SubscriptionDeleted,
            BillingEventKind::PaymentIntentSucceeded,
        ];
        for kind in kinds {
            assert_eq!(BillingEventKind::from_type(kind.as_type()), kind);
        }
    }

    #[test]
    fn deserialize_object_to_custom_type() {
        #[derive(Debug, Deserialize)]
        struct Invoice {
            id: String,
            subscription: Option<String>,
        }

        let event = StripeEventBuilder::new()
            .object(json!({
                "id": "in_abc123",
                "subscription": "sub_xyz789"
            }))
            .build();

        let invoice: Invoice = event.deserialize_object().unwrap();
        assert_eq!(invoice.id, "in_abc123");
        assert_eq!(invoice.subscription.as_deref(), Some("sub_xyz789"));
    }

    #[test]
    fn subscription_object_uses_item_level_period_end_fallback() {
        let json = json!({
            "id": "sub_1",
            "customer": "cus_1",
            "status": "active",
            "items": {
                "data": [{
                    "current_period_end": 1706745600,
                    "price": {"id": "price_pro_m"}
                }]
            }
        });
        let sub: SubscriptionObject = serde_json::from_value(json).unwrap();

        assert_eq!(sub.effective_period_end(), Some(1706745600));
        assert_eq!(sub.price_id(), Some("price_pro_m"));
    }

    #[test]
    fn subscription_object_prefers_top_level_period_end() {
        let json = json!({
            "id": "sub_1",
            "customer": "cus_1",
            "status": "active",
            "current_period_end": 1700000000,
            "items": {
                "data": [{"current_period_end": 1706745600}]
            }
        });
        let sub: SubscriptionObject = serde_json::from_value(json).unwrap();

        assert_eq!(sub.effective_period_end(), Some(1700000000));
    }

    #[test]
    fn invoice_object_tolerates_missing_optional_fields() {
        let json = json!({"id": "in_1"});
        let invoice: InvoiceObject = serde_json::from_value(json).unwrap();

        assert!(invoice.subscription.is_none());
        assert!(invoice.customer.is_none());
        assert!(invoice.metadata_value("userId").is_none());
    }

    #[test]
    fn deserialize_object_fails_for_wrong_type() {
        #[derive(Debug, Deserialize)]
        struct Invoice {
            #[allow(dead_code)]
            amount_due: i64,
        }

        let event = StripeEventBuilder::new()
            .object(json!({"id": "in_test"}))
            .build();

        let result: Result<Invoice, _> = event.deserialize_object();
        assert!(result.is_err());
    }
}
