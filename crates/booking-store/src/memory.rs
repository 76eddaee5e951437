use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common::{CustomerId, Money, PaymentId, ReservationId};
use tokio::sync::RwLock;

use crate::{
    AmountDiscrepancy, CapacityPolicy, CapacitySlot, CustomerStats, PaymentRecord, PaymentUpsert,
    Reservation, ReservationStatus, Result, SlotClaim, SlotKey, StoreError,
    store::{BookingStore, CaptureRecord, SlotReservation, StatusChange},
};

#[derive(Debug, Default)]
struct MemoryState {
    reservations: HashMap<ReservationId, Reservation>,
    payments: HashMap<String, PaymentRecord>,
    slots: BTreeMap<SlotKey, CapacitySlot>,
    slot_claims: HashSet<ReservationId>,
    customers: HashMap<CustomerId, CustomerStats>,
    discrepancies: Vec<AmountDiscrepancy>,
}

/// In-memory booking store for tests and local runs.
///
/// All tables live behind one lock, so every trait method is atomic with
/// respect to concurrent callers, matching the guarantees of the
/// PostgreSQL implementation.
#[derive(Debug, Clone, Default)]
pub struct InMemoryBookingStore {
    state: Arc<RwLock<MemoryState>>,
    fail_on_reserve_slot: Arc<AtomicBool>,
    fail_on_upsert_payment: Arc<AtomicBool>,
}

impl InMemoryBookingStore {
    /// Creates a new empty in-memory store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes `reserve_slot` fail as if the database were unreachable.
    pub fn set_fail_on_reserve_slot(&self, fail: bool) {
        self.fail_on_reserve_slot.store(fail, Ordering::SeqCst);
    }

    /// Makes `upsert_payment` and `record_capture` fail as if the database
    /// were unreachable.
    pub fn set_fail_on_upsert_payment(&self, fail: bool) {
        self.fail_on_upsert_payment.store(fail, Ordering::SeqCst);
    }

    /// Returns the number of payment records.
    pub async fn payment_count(&self) -> usize {
        self.state.read().await.payments.len()
    }

    /// Returns the number of reservations.
    pub async fn reservation_count(&self) -> usize {
        self.state.read().await.reservations.len()
    }

    /// Overwrites a slot's capacity, creating it if needed.
    pub async fn set_slot_capacity(&self, key: SlotKey, end_time: &str, max_slots: u32) {
        let mut state = self.state.write().await;
        state
            .slots
            .entry(key.clone())
            .and_modify(|slot| slot.max_slots = max_slots)
            .or_insert(CapacitySlot {
                key,
                end_time: end_time.to_string(),
                max_slots,
                booked_slots: 0,
            });
    }

    fn apply_upsert(state: &mut MemoryState, upsert: PaymentUpsert) -> PaymentRecord {
        state
            .payments
            .entry(upsert.transaction_id.clone())
            .and_modify(|record| {
                record.amount = upsert.amount;
                record.currency = upsert.currency.clone();
                record.status = upsert.status;
                record.paid_at = record.paid_at.or(upsert.paid_at);
            })
            .or_insert_with(|| PaymentRecord {
                id: PaymentId::new(),
                reservation_id: upsert.reservation_id,
                transaction_id: upsert.transaction_id.clone(),
                amount: upsert.amount,
                currency: upsert.currency.clone(),
                status: upsert.status,
                paid_at: upsert.paid_at,
            })
            .clone()
    }

    fn injected_failure(flag: &AtomicBool, operation: &str) -> Result<()> {
        if flag.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable(format!(
                "injected failure in {operation}"
            )));
        }
        Ok(())
    }
}

#[async_trait]
impl BookingStore for InMemoryBookingStore {
    async fn insert_reservation(&self, reservation: &Reservation) -> Result<bool> {
        let mut state = self.state.write().await;
        if state.reservations.contains_key(&reservation.id) {
            return Ok(false);
        }
        state
            .reservations
            .insert(reservation.id, reservation.clone());
        Ok(true)
    }

    async fn get_reservation(&self, id: ReservationId) -> Result<Option<Reservation>> {
        Ok(self.state.read().await.reservations.get(&id).cloned())
    }

    async fn transition_reservation(
        &self,
        id: ReservationId,
        to: ReservationStatus,
        at: DateTime<Utc>,
    ) -> Result<StatusChange> {
        let mut state = self.state.write().await;
        let Some(reservation) = state.reservations.get_mut(&id) else {
            return Ok(StatusChange::NotFound);
        };

        if reservation.status == to {
            return Ok(StatusChange::Unchanged(reservation.clone()));
        }
        if !reservation.status.can_transition_to(to) {
            return Ok(StatusChange::Rejected(reservation.clone()));
        }

        reservation.status = to;
        if to == ReservationStatus::Confirmed && reservation.confirmed_at.is_none() {
            reservation.confirmed_at = Some(at);
        }
        Ok(StatusChange::Applied(reservation.clone()))
    }

    async fn find_payment(&self, transaction_id: &str) -> Result<Option<PaymentRecord>> {
        Ok(self.state.read().await.payments.get(transaction_id).cloned())
    }

    async fn upsert_payment(&self, upsert: PaymentUpsert) -> Result<PaymentRecord> {
        Self::injected_failure(&self.fail_on_upsert_payment, "upsert_payment")?;

        let mut state = self.state.write().await;
        if !state.reservations.contains_key(&upsert.reservation_id) {
            return Err(StoreError::ReservationNotFound(upsert.reservation_id));
        }

        Ok(Self::apply_upsert(&mut state, upsert))
    }

    async fn record_capture(&self, upsert: PaymentUpsert) -> Result<CaptureRecord> {
        Self::injected_failure(&self.fail_on_upsert_payment, "record_capture")?;

        let mut state = self.state.write().await;
        let Some(reservation) = state.reservations.get(&upsert.reservation_id) else {
            return Err(StoreError::ReservationNotFound(upsert.reservation_id));
        };
        if reservation.status != ReservationStatus::Confirmed {
            return Ok(CaptureRecord::NotConfirmed(reservation.clone()));
        }
        Ok(CaptureRecord::Recorded(Self::apply_upsert(&mut state, upsert)))
    }

    async fn reserve_slot(
        &self,
        claim: SlotClaim,
        policy: CapacityPolicy,
    ) -> Result<SlotReservation> {
        Self::injected_failure(&self.fail_on_reserve_slot, "reserve_slot")?;

        let mut guard = self.state.write().await;
        let state = &mut *guard;

        if state.slot_claims.contains(&claim.reservation_id) {
            let slot = state.slots.get(&claim.key).cloned().ok_or_else(|| {
                StoreError::CorruptRecord {
                    table: "slot_claims",
                    reason: format!("claim without slot {}", claim.key),
                }
            })?;
            return Ok(SlotReservation::AlreadyClaimed(slot));
        }

        let outcome = match state.slots.get_mut(&claim.key) {
            None => {
                let slot = CapacitySlot {
                    key: claim.key.clone(),
                    end_time: claim.end_time.clone(),
                    max_slots: 1,
                    booked_slots: 1,
                };
                state.slots.insert(claim.key.clone(), slot.clone());
                SlotReservation::Reserved(slot)
            }
            Some(slot) if policy == CapacityPolicy::Enforce && slot.is_full() => {
                return Ok(SlotReservation::CapacityExceeded(slot.clone()));
            }
            Some(slot) => {
                slot.booked_slots += 1;
                SlotReservation::Reserved(slot.clone())
            }
        };

        state.slot_claims.insert(claim.reservation_id);
        Ok(outcome)
    }

    async fn get_slot(&self, key: &SlotKey) -> Result<Option<CapacitySlot>> {
        Ok(self.state.read().await.slots.get(key).cloned())
    }

    async fn record_customer_booking(
        &self,
        customer_id: CustomerId,
        amount: Money,
        booked_at: DateTime<Utc>,
    ) -> Result<bool> {
        let mut state = self.state.write().await;
        let stats = state
            .customers
            .entry(customer_id)
            .or_insert_with(|| CustomerStats {
                customer_id,
                total_bookings: 0,
                total_spent: Money::zero(),
                last_booking_at: None,
            });

        if stats.last_booking_at.is_some_and(|last| last >= booked_at) {
            return Ok(false);
        }

        stats.total_bookings += 1;
        stats.total_spent += amount;
        stats.last_booking_at = Some(booked_at);
        Ok(true)
    }

    async fn get_customer_stats(&self, customer_id: CustomerId) -> Result<Option<CustomerStats>> {
        Ok(self.state.read().await.customers.get(&customer_id).cloned())
    }

    async fn record_discrepancy(&self, discrepancy: &AmountDiscrepancy) -> Result<bool> {
        let mut state = self.state.write().await;
        if state
            .discrepancies
            .iter()
            .any(|d| d.transaction_id == discrepancy.transaction_id)
        {
            return Ok(false);
        }
        state.discrepancies.push(discrepancy.clone());
        Ok(true)
    }

    async fn list_discrepancies(&self) -> Result<Vec<AmountDiscrepancy>> {
        let mut discrepancies = self.state.read().await.discrepancies.clone();
        discrepancies.sort_by_key(|d| d.recorded_at);
        Ok(discrepancies)
    }
}
