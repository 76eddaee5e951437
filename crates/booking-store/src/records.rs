//! Persistent records.

use chrono::{DateTime, NaiveDate, NaiveTime, Timelike, Utc};
use common::{CustomerId, Money, PaymentId, ProductId, ReservationId};
use serde::{Deserialize, Serialize};

use crate::status::{PaymentStatus, ReservationStatus};

/// A reservation of a product for a party on a date.
///
/// Created by checkout in `PendingPayment`; only payment reconciliation
/// mutates it afterwards. Never deleted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reservation {
    pub id: ReservationId,
    pub product_id: ProductId,
    pub customer_id: CustomerId,
    pub travel_date: NaiveDate,
    pub start_time: NaiveTime,
    /// Product duration at the time of booking, in whole hours.
    pub duration_hours: u32,
    pub party_size: u32,
    pub quoted_price: Money,
    pub extras_total: Money,
    pub status: ReservationStatus,
    pub created_at: DateTime<Utc>,
    /// Set exactly once, on entry to `Confirmed`.
    pub confirmed_at: Option<DateTime<Utc>>,
}

impl Reservation {
    /// Amount the gateway is expected to capture: quoted price plus extras.
    pub fn expected_amount(&self) -> Money {
        self.quoted_price + self.extras_total
    }

    /// Start of the trip, with the travel date and start time read as UTC.
    pub fn starts_at(&self) -> DateTime<Utc> {
        self.travel_date.and_time(self.start_time).and_utc()
    }

    /// Capacity slot this reservation occupies.
    pub fn slot_key(&self) -> SlotKey {
        SlotKey {
            product_id: self.product_id.clone(),
            travel_date: self.travel_date,
            start_time: self.start_time,
        }
    }
}

/// A payment against a reservation, unique per gateway transaction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentRecord {
    pub id: PaymentId,
    pub reservation_id: ReservationId,
    /// Gateway transaction identifier; the idempotency key for upserts.
    pub transaction_id: String,
    pub amount: Money,
    pub currency: String,
    pub status: PaymentStatus,
    pub paid_at: Option<DateTime<Utc>>,
}

/// Desired state of the payment record for a transaction.
///
/// Applied as an upsert keyed on `transaction_id`: the first writer creates
/// the row, later writers update it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PaymentUpsert {
    pub reservation_id: ReservationId,
    pub transaction_id: String,
    pub amount: Money,
    pub currency: String,
    pub status: PaymentStatus,
    /// Kept from the first successful write; later upserts never overwrite it.
    pub paid_at: Option<DateTime<Utc>>,
}

/// Composite key of a bookable slot.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SlotKey {
    pub product_id: ProductId,
    pub travel_date: NaiveDate,
    pub start_time: NaiveTime,
}

impl SlotKey {
    /// Derives the slot end label by adding whole hours to the start hour.
    ///
    /// Minutes are dropped and there is no wrap past midnight: a 09:30 start
    /// with a 3 hour duration ends at `"12:00"`, a 22:00 start with a
    /// 4 hour duration ends at `"26:00"`. Downstream calendar consumers
    /// read this label as-is.
    ///
    /// Returns `None` if the end hour overflows.
    pub fn end_time_label(&self, duration_hours: u32) -> Option<String> {
        let end_hour = self.start_time.hour().checked_add(duration_hours)?;
        Some(format!("{end_hour:02}:00"))
    }
}

impl std::fmt::Display for SlotKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}@{} {}",
            self.product_id,
            self.travel_date,
            self.start_time.format("%H:%M")
        )
    }
}

/// Booked-vs-available capacity for a slot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CapacitySlot {
    pub key: SlotKey,
    pub end_time: String,
    pub max_slots: u32,
    pub booked_slots: u32,
}

impl CapacitySlot {
    /// Returns true once every slot is booked.
    pub fn is_full(&self) -> bool {
        self.booked_slots >= self.max_slots
    }
}

/// A reservation's request to occupy one unit of a slot.
///
/// A reservation is counted against a slot at most once.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SlotClaim {
    pub reservation_id: ReservationId,
    pub key: SlotKey,
    pub end_time: String,
}

/// How a slot increment treats `max_slots`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CapacityPolicy {
    /// Increment only while `booked_slots < max_slots`.
    #[default]
    Enforce,

    /// Always increment, allowing `booked_slots` past `max_slots`.
    Unconditional,
}

impl std::str::FromStr for CapacityPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "enforce" => Ok(CapacityPolicy::Enforce),
            "unconditional" => Ok(CapacityPolicy::Unconditional),
            other => Err(format!("unknown capacity policy '{other}'")),
        }
    }
}

/// Aggregate booking statistics for a customer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CustomerStats {
    pub customer_id: CustomerId,
    pub total_bookings: u64,
    pub total_spent: Money,
    /// Creation time of the most recent reservation counted.
    pub last_booking_at: Option<DateTime<Utc>>,
}

/// A payment whose captured amount differs from the reservation total.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AmountDiscrepancy {
    pub reservation_id: ReservationId,
    pub transaction_id: String,
    pub expected_minor: i64,
    pub observed_minor: i64,
    pub currency: String,
    pub recorded_at: DateTime<Utc>,
}
