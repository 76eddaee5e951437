//! Payment gateway events.
//!
//! Deliveries share one envelope, `{ id, type, created, data }`. Each known
//! `type` has its own `data` shape; a known type whose data does not parse
//! is rejected rather than defaulted. Unknown types are carried through so
//! they can be acknowledged.

use chrono::{NaiveDate, NaiveTime};
use common::{CustomerId, Money, ProductId, ReservationId};
use rust_decimal::Decimal;
use serde::{Deserialize, Deserializer, de::DeserializeOwned};
use thiserror::Error;

pub const PAYMENT_SUCCEEDED: &str = "payment_succeeded";
pub const PAYMENT_FAILED: &str = "payment_failed";
pub const PAYMENT_CANCELED: &str = "payment_canceled";
pub const CHECKOUT_COMPLETED: &str = "checkout_completed";

/// Longest tour a checkout may book, in hours.
pub const MAX_DURATION_HOURS: u32 = 24;

/// Errors parsing a delivery body.
#[derive(Debug, Error)]
pub enum EventParseError {
    #[error("invalid envelope: {0}")]
    Envelope(#[source] serde_json::Error),

    #[error("invalid {kind} data: {source}")]
    Data {
        kind: &'static str,
        #[source]
        source: serde_json::Error,
    },

    #[error("invalid {kind} data: {reason}")]
    Invalid { kind: &'static str, reason: String },
}

#[derive(Debug, Deserialize)]
struct Envelope {
    id: String,
    #[serde(rename = "type")]
    kind: String,
    created: i64,
    data: serde_json::Value,
}

/// A delivery from the payment gateway.
#[derive(Debug, Clone, PartialEq)]
pub struct WebhookEvent {
    pub id: String,
    /// Unix seconds at which the gateway created the event.
    pub created: i64,
    pub payment: PaymentEvent,
}

/// Payment event, by kind.
#[derive(Debug, Clone, PartialEq)]
pub enum PaymentEvent {
    PaymentSucceeded(PaymentSucceeded),
    PaymentFailed(PaymentClosed),
    PaymentCanceled(PaymentClosed),
    CheckoutCompleted(CheckoutCompleted),
    Unknown { kind: String },
}

impl PaymentEvent {
    /// Event kind as sent by the gateway.
    pub fn kind(&self) -> &str {
        match self {
            PaymentEvent::PaymentSucceeded(_) => PAYMENT_SUCCEEDED,
            PaymentEvent::PaymentFailed(_) => PAYMENT_FAILED,
            PaymentEvent::PaymentCanceled(_) => PAYMENT_CANCELED,
            PaymentEvent::CheckoutCompleted(_) => CHECKOUT_COMPLETED,
            PaymentEvent::Unknown { kind } => kind,
        }
    }

    /// Kind label for metrics, with every unknown kind folded into one.
    pub fn metric_kind(&self) -> &'static str {
        match self {
            PaymentEvent::PaymentSucceeded(_) => PAYMENT_SUCCEEDED,
            PaymentEvent::PaymentFailed(_) => PAYMENT_FAILED,
            PaymentEvent::PaymentCanceled(_) => PAYMENT_CANCELED,
            PaymentEvent::CheckoutCompleted(_) => CHECKOUT_COMPLETED,
            PaymentEvent::Unknown { .. } => "unknown",
        }
    }
}

/// Money captured for a reservation.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct PaymentSucceeded {
    pub transaction_id: String,
    pub reservation_id: ReservationId,
    /// Captured amount in minor units.
    pub amount: i64,
    pub currency: String,
}

/// A payment attempt that failed or was canceled.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct PaymentClosed {
    pub transaction_id: String,
    #[serde(default)]
    pub reservation_id: Option<ReservationId>,
    /// Attempted amount in minor units.
    #[serde(default)]
    pub amount: Option<i64>,
    #[serde(default)]
    pub currency: Option<String>,
}

/// A completed checkout carrying the full booking.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct CheckoutCompleted {
    pub session_id: String,
    pub transaction_id: String,
    /// Captured amount in minor units.
    pub amount_total: i64,
    pub currency: String,
    pub reservation: CheckoutReservation,
}

/// Booking details submitted at checkout.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct CheckoutReservation {
    pub product_id: ProductId,
    pub customer_id: CustomerId,
    pub travel_date: NaiveDate,
    #[serde(deserialize_with = "clock_time")]
    pub start_time: NaiveTime,
    pub party_size: u32,
    pub duration_hours: u32,
    /// Quoted price in major units. Defaults to the captured amount less
    /// extras.
    #[serde(default)]
    pub quoted_price: Option<Decimal>,
    /// Extras in major units.
    #[serde(default)]
    pub extras_total: Option<Decimal>,
}

impl CheckoutReservation {
    /// Quoted price and extras total for a checkout of `amount_total` minor units.
    pub fn amounts(&self, amount_total: i64) -> (Money, Money) {
        let extras = Money::new(self.extras_total.unwrap_or_default());
        let quoted = match self.quoted_price {
            Some(price) => Money::new(price),
            None => Money::from_minor_units(amount_total) - extras,
        };
        (quoted, extras)
    }
}

/// Accepts `HH:MM` as well as `HH:MM:SS`.
fn clock_time<'de, D>(deserializer: D) -> Result<NaiveTime, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = String::deserialize(deserializer)?;
    NaiveTime::parse_from_str(&raw, "%H:%M")
        .or_else(|_| NaiveTime::parse_from_str(&raw, "%H:%M:%S"))
        .map_err(|_| serde::de::Error::custom(format!("invalid start time '{raw}'")))
}

/// Parses a raw delivery body.
pub fn parse_event(raw: &[u8]) -> Result<WebhookEvent, EventParseError> {
    let envelope: Envelope = serde_json::from_slice(raw).map_err(EventParseError::Envelope)?;

    let payment = match envelope.kind.as_str() {
        PAYMENT_SUCCEEDED => {
            let data: PaymentSucceeded = parse_data(PAYMENT_SUCCEEDED, envelope.data)?;
            require_transaction(PAYMENT_SUCCEEDED, &data.transaction_id)?;
            if data.amount < 0 {
                return Err(invalid(PAYMENT_SUCCEEDED, "negative amount"));
            }
            PaymentEvent::PaymentSucceeded(data)
        }
        PAYMENT_FAILED => {
            let data: PaymentClosed = parse_data(PAYMENT_FAILED, envelope.data)?;
            require_transaction(PAYMENT_FAILED, &data.transaction_id)?;
            PaymentEvent::PaymentFailed(data)
        }
        PAYMENT_CANCELED => {
            let data: PaymentClosed = parse_data(PAYMENT_CANCELED, envelope.data)?;
            require_transaction(PAYMENT_CANCELED, &data.transaction_id)?;
            PaymentEvent::PaymentCanceled(data)
        }
        CHECKOUT_COMPLETED => {
            let data: CheckoutCompleted = parse_data(CHECKOUT_COMPLETED, envelope.data)?;
            require_transaction(CHECKOUT_COMPLETED, &data.transaction_id)?;
            if data.amount_total < 0 {
                return Err(invalid(CHECKOUT_COMPLETED, "negative amount_total"));
            }
            if data.reservation.party_size == 0 {
                return Err(invalid(CHECKOUT_COMPLETED, "party_size must be positive"));
            }
            if data.reservation.duration_hours > MAX_DURATION_HOURS {
                return Err(invalid(
                    CHECKOUT_COMPLETED,
                    &format!("duration_hours must be at most {MAX_DURATION_HOURS}"),
                ));
            }
            require_minor_units("quoted_price", data.reservation.quoted_price)?;
            require_minor_units("extras_total", data.reservation.extras_total)?;
            let (quoted, extras) = data.reservation.amounts(data.amount_total);
            if quoted.is_negative() || extras.is_negative() {
                return Err(invalid(CHECKOUT_COMPLETED, "negative price"));
            }
            PaymentEvent::CheckoutCompleted(data)
        }
        _ => PaymentEvent::Unknown {
            kind: envelope.kind,
        },
    };

    Ok(WebhookEvent {
        id: envelope.id,
        created: envelope.created,
        payment,
    })
}

fn parse_data<T: DeserializeOwned>(
    kind: &'static str,
    data: serde_json::Value,
) -> Result<T, EventParseError> {
    serde_json::from_value(data).map_err(|source| EventParseError::Data { kind, source })
}

/// Checkout amounts must convert to whole minor units so the captured
/// amount can be compared exactly.
fn require_minor_units(field: &str, amount: Option<Decimal>) -> Result<(), EventParseError> {
    let Some(amount) = amount else {
        return Ok(());
    };
    Money::new(amount)
        .to_minor_units()
        .map(|_| ())
        .map_err(|e| invalid(CHECKOUT_COMPLETED, &format!("{field}: {e}")))
}

fn require_transaction(kind: &'static str, transaction_id: &str) -> Result<(), EventParseError> {
    if transaction_id.trim().is_empty() {
        return Err(invalid(kind, "empty transaction_id"));
    }
    Ok(())
}

fn invalid(kind: &'static str, reason: &str) -> EventParseError {
    EventParseError::Invalid {
        kind,
        reason: reason.to_string(),
    }
}
