//! Stripe-specific wire types.
//!
//! These types represent Stripe API objects as they arrive in API
//! responses, plus the `Stripe-Signature` header format. They parse
//! the provider's JSON accurately and convert into the gateway port's
//! value types.

use serde::{Deserialize, Serialize};

use crate::domain::billing::SubscriptionStatus;
use crate::ports::{Customer, Invoice, PaymentIntent, PaymentMethodRef, Subscription};

// ════════════════════════════════════════════════════════════════════════════════
// Signature Parsing
// ════════════════════════════════════════════════════════════════════════════════

/// Error parsing the Stripe-Signature header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SignatureParseError {
    /// Header is empty or missing.
    MissingHeader,
    /// Missing timestamp component (t=...).
    MissingTimestamp,
    /// Missing v1 signature component.
    MissingV1Signature,
    /// Invalid timestamp format.
    InvalidTimestamp,
    /// Invalid signature format (not valid hex).
    InvalidSignatureFormat,
}

impl std::fmt::Display for SignatureParseError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::MissingHeader => write!(f, "Missing Stripe-Signature header"),
            Self::MissingTimestamp => write!(f, "Missing timestamp (t=) in signature"),
            Self::MissingV1Signature => write!(f, "Missing v1 signature in header"),
            Self::InvalidTimestamp => write!(f, "Invalid timestamp format"),
            Self::InvalidSignatureFormat => write!(f, "Invalid signature format (not valid hex)"),
        }
    }
}

impl std::error::Error for SignatureParseError {}

/// Parsed Stripe-Signature header components.
///
/// The header format is: `t=timestamp,v1=signature[,v0=legacy_signature]`
#[derive(Debug, Clone)]
pub struct SignatureHeader {
    /// Unix timestamp when Stripe generated the event.
    pub timestamp: i64,

    /// Primary v1 signature (HMAC-SHA256, hex-encoded).
    pub v1_signature: Vec<u8>,
}

impl SignatureHeader {
    /// Parse a Stripe-Signature header into components.
    pub fn parse(header: &str) -> Result<Self, SignatureParseError> {
        if header.is_empty() {
            return Err(SignatureParseError::MissingHeader);
        }

        let mut timestamp: Option<i64> = None;
        let mut v1_signature: Option<Vec<u8>> = None;

        for part in header.split(',') {
            let (key, value) = part
                .split_once('=')
                .ok_or(SignatureParseError::MissingTimestamp)?;

            match key.trim() {
                "t" => {
                    timestamp = Some(
                        value
                            .trim()
                            .parse()
                            .map_err(|_| SignatureParseError::InvalidTimestamp)?,
                    );
                }
                "v1" => {
                    v1_signature = Some(
                        hex_decode(value.trim())
                            .ok_or(SignatureParseError::InvalidSignatureFormat)?,
                    );
                }
                _ => {
                    // Ignore unknown fields for forward compatibility
                }
            }
        }

        Ok(Self {
            timestamp: timestamp.ok_or(SignatureParseError::MissingTimestamp)?,
            v1_signature: v1_signature.ok_or(SignatureParseError::MissingV1Signature)?,
        })
    }
}

/// Decode a hex string to bytes.
fn hex_decode(hex: &str) -> Option<Vec<u8>> {
    let hex = hex.trim();
    if hex.len() % 2 != 0 {
        return None;
    }

    let mut bytes = Vec::with_capacity(hex.len() / 2);
    for i in (0..hex.len()).step_by(2) {
        let byte = u8::from_str_radix(&hex[i..i + 2], 16).ok()?;
        bytes.push(byte);
    }
    Some(bytes)
}

/// Encode bytes to hex string.
pub fn hex_encode(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{:02x}", b)).collect()
}

// ════════════════════════════════════════════════════════════════════════════════
// Expandable References
// ════════════════════════════════════════════════════════════════════════════════

/// A field that is either a bare id or an expanded object, depending on
/// the `expand[]` parameters of the request.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(untagged)]
pub enum Expandable<T> {
    Id(String),
    Object(T),
}

impl<T> Expandable<T> {
    pub fn as_object(&self) -> Option<&T> {
        match self {
            Expandable::Id(_) => None,
            Expandable::Object(obj) => Some(obj),
        }
    }

    pub fn into_object(self) -> Option<T> {
        match self {
            Expandable::Id(_) => None,
            Expandable::Object(obj) => Some(obj),
        }
    }
}

// ════════════════════════════════════════════════════════════════════════════════
// Stripe Object Types
// ════════════════════════════════════════════════════════════════════════════════

/// Stripe Customer object.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct WireCustomer {
    /// Unique customer identifier (cus_...).
    pub id: String,

    /// Customer email address.
    pub email: Option<String>,

    /// Unix timestamp of creation.
    #[serde(default)]
    pub created: i64,

    /// Whether the customer has been deleted.
    #[serde(default)]
    pub deleted: bool,
}

impl From<WireCustomer> for Customer {
    fn from(wire: WireCustomer) -> Self {
        Customer {
            id: wire.id,
            email: wire.email,
            created: wire.created,
        }
    }
}

/// Stripe Subscription object.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct WireSubscription {
    /// Unique subscription identifier (sub_...).
    pub id: String,

    /// Customer id owning this subscription.
    pub customer: String,

    /// Subscription status string.
    pub status: String,

    /// Current period end (Unix timestamp). Newer API versions omit
    /// this at the top level and report it per item.
    #[serde(default)]
    pub current_period_end: Option<i64>,

    /// Whether subscription cancels at period end.
    #[serde(default)]
    pub cancel_at_period_end: bool,

    /// Custom metadata.
    #[serde(default)]
    pub metadata: std::collections::HashMap<String, String>,

    /// Subscription items (price/quantity pairs).
    #[serde(default)]
    pub items: WireSubscriptionItems,

    /// Latest invoice, expandable.
    #[serde(default)]
    pub latest_invoice: Option<Expandable<WireInvoice>>,
}

/// Subscription items container.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct WireSubscriptionItems {
    #[serde(default)]
    pub data: Vec<WireSubscriptionItem>,
}

/// Single subscription item.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct WireSubscriptionItem {
    pub id: String,

    pub price: WirePrice,

    /// Item-level period end fallback.
    #[serde(default)]
    pub current_period_end: Option<i64>,
}

/// Stripe Price object (embedded in subscription items).
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct WirePrice {
    pub id: String,

    /// Unit amount in cents.
    #[serde(default)]
    pub unit_amount: Option<i64>,
}

impl From<WireSubscription> for Subscription {
    fn from(wire: WireSubscription) -> Self {
        let period_end = wire.current_period_end.or_else(|| {
            wire.items
                .data
                .first()
                .and_then(|item| item.current_period_end)
        });
        let price_id = wire.items.data.first().map(|item| item.price.id.clone());
        let latest_invoice = wire
            .latest_invoice
            .and_then(Expandable::into_object)
            .map(Invoice::from);

        Subscription {
            id: wire.id,
            customer_id: wire.customer,
            status: SubscriptionStatus::parse(&wire.status),
            price_id,
            current_period_end: period_end,
            cancel_at_period_end: wire.cancel_at_period_end,
            metadata: wire.metadata,
            latest_invoice,
        }
    }
}

/// Stripe Invoice object.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct WireInvoice {
    /// Unique invoice identifier (in_...).
    pub id: String,

    /// Invoice status (draft, open, paid, void, uncollectible).
    #[serde(default)]
    pub status: Option<String>,

    /// Amount paid in cents.
    #[serde(default)]
    pub amount_paid: i64,

    /// Payment method used for this invoice, expandable.
    #[serde(default)]
    pub payment_method: Option<Expandable<WirePaymentMethod>>,

    /// Payment intent, expandable.
    #[serde(default)]
    pub payment_intent: Option<Expandable<WirePaymentIntent>>,
}

impl From<WireInvoice> for Invoice {
    fn from(wire: WireInvoice) -> Self {
        let payment_method = wire.payment_method.map(|pm| match pm {
            Expandable::Id(id) => id,
            Expandable::Object(obj) => obj.id,
        });
        let payment_intent = wire.payment_intent.and_then(|pi| match pi {
            // An unexpanded reference still identifies the intent; the
            // secret is just not available from this response.
            Expandable::Id(id) => Some(PaymentIntent {
                id,
                client_secret: None,
                status: String::new(),
            }),
            Expandable::Object(obj) => Some(PaymentIntent {
                id: obj.id,
                client_secret: obj.client_secret,
                status: obj.status.unwrap_or_default(),
            }),
        });

        Invoice {
            id: wire.id,
            status: wire.status.unwrap_or_default(),
            payment_method,
            payment_intent,
            amount_paid: wire.amount_paid,
        }
    }
}

/// Stripe PaymentIntent object.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct WirePaymentIntent {
    pub id: String,

    #[serde(default)]
    pub client_secret: Option<String>,

    #[serde(default)]
    pub status: Option<String>,
}

/// Stripe PaymentMethod object.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct WirePaymentMethod {
    pub id: String,
}

impl From<WirePaymentMethod> for PaymentMethodRef {
    fn from(wire: WirePaymentMethod) -> Self {
        PaymentMethodRef { id: wire.id }
    }
}

/// Generic Stripe list container.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct WireList<T> {
    #[serde(default)]
    pub data: Vec<T>,
}
