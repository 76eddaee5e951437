use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common::{CustomerId, Money, PaymentId, ProductId, ReservationId};
use rust_decimal::Decimal;
use sqlx::{PgPool, Row, postgres::PgRow};
use uuid::Uuid;

use crate::{
    AmountDiscrepancy, CapacityPolicy, CapacitySlot, CustomerStats, PaymentRecord, PaymentUpsert,
    Reservation, ReservationStatus, Result, SlotClaim, SlotKey, StoreError,
    store::{BookingStore, CaptureRecord, SlotReservation, StatusChange},
};

const RESERVATION_COLUMNS: &str = "id, product_id, customer_id, travel_date, start_time, \
    duration_hours, party_size, quoted_price, extras_total, status, created_at, confirmed_at";

const PAYMENT_COLUMNS: &str =
    "id, reservation_id, transaction_id, amount, currency, status, paid_at";

const SLOT_COLUMNS: &str =
    "product_id, travel_date, start_time, end_time, max_slots, booked_slots";

/// PostgreSQL-backed booking store.
///
/// Conditional transitions, payment upserts and slot increments are each a
/// single statement (or a single transaction), so concurrent webhook
/// deliveries rely on row locks and unique constraints rather than on
/// application-side ordering.
#[derive(Clone)]
pub struct PostgresBookingStore {
    pool: PgPool,
}

impl PostgresBookingStore {
    /// Creates a new PostgreSQL booking store.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Gets a reference to the underlying connection pool.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Runs the database migrations.
    pub async fn run_migrations(&self) -> Result<()> {
        sqlx::migrate!("../../migrations").run(&self.pool).await?;
        Ok(())
    }

    fn to_u32(table: &'static str, column: &str, value: i32) -> Result<u32> {
        u32::try_from(value).map_err(|_| StoreError::CorruptRecord {
            table,
            reason: format!("negative {column}: {value}"),
        })
    }

    fn to_i32(table: &'static str, column: &str, value: u32) -> Result<i32> {
        i32::try_from(value).map_err(|_| StoreError::CorruptRecord {
            table,
            reason: format!("{column} out of range: {value}"),
        })
    }

    fn row_to_reservation(row: PgRow) -> Result<Reservation> {
        let status: String = row.try_get("status")?;

        Ok(Reservation {
            id: ReservationId::from_uuid(row.try_get::<Uuid, _>("id")?),
            product_id: ProductId::new(row.try_get::<String, _>("product_id")?),
            customer_id: CustomerId::from_uuid(row.try_get::<Uuid, _>("customer_id")?),
            travel_date: row.try_get("travel_date")?,
            start_time: row.try_get("start_time")?,
            duration_hours: Self::to_u32(
                "reservations",
                "duration_hours",
                row.try_get("duration_hours")?,
            )?,
            party_size: Self::to_u32("reservations", "party_size", row.try_get("party_size")?)?,
            quoted_price: Money::new(row.try_get::<Decimal, _>("quoted_price")?),
            extras_total: Money::new(row.try_get::<Decimal, _>("extras_total")?),
            status: status.parse()?,
            created_at: row.try_get("created_at")?,
            confirmed_at: row.try_get("confirmed_at")?,
        })
    }

    fn row_to_payment(row: PgRow) -> Result<PaymentRecord> {
        let status: String = row.try_get("status")?;

        Ok(PaymentRecord {
            id: PaymentId::from_uuid(row.try_get::<Uuid, _>("id")?),
            reservation_id: ReservationId::from_uuid(row.try_get::<Uuid, _>("reservation_id")?),
            transaction_id: row.try_get("transaction_id")?,
            amount: Money::new(row.try_get::<Decimal, _>("amount")?),
            currency: row.try_get("currency")?,
            status: status.parse()?,
            paid_at: row.try_get("paid_at")?,
        })
    }

    fn row_to_slot(row: PgRow) -> Result<CapacitySlot> {
        Ok(CapacitySlot {
            key: SlotKey {
                product_id: ProductId::new(row.try_get::<String, _>("product_id")?),
                travel_date: row.try_get("travel_date")?,
                start_time: row.try_get("start_time")?,
            },
            end_time: row.try_get("end_time")?,
            max_slots: Self::to_u32("capacity_slots", "max_slots", row.try_get("max_slots")?)?,
            booked_slots: Self::to_u32(
                "capacity_slots",
                "booked_slots",
                row.try_get("booked_slots")?,
            )?,
        })
    }

    fn row_to_discrepancy(row: PgRow) -> Result<AmountDiscrepancy> {
        Ok(AmountDiscrepancy {
            reservation_id: ReservationId::from_uuid(row.try_get::<Uuid, _>("reservation_id")?),
            transaction_id: row.try_get("transaction_id")?,
            expected_minor: row.try_get("expected_minor")?,
            observed_minor: row.try_get("observed_minor")?,
            currency: row.try_get("currency")?,
            recorded_at: row.try_get("recorded_at")?,
        })
    }

    async fn fetch_slot<'e, E>(executor: E, key: &SlotKey) -> Result<Option<CapacitySlot>>
    where
        E: sqlx::PgExecutor<'e>,
    {
        let row = sqlx::query(&format!(
            "SELECT {SLOT_COLUMNS} FROM capacity_slots \
             WHERE product_id = $1 AND travel_date = $2 AND start_time = $3"
        ))
        .bind(key.product_id.as_str())
        .bind(key.travel_date)
        .bind(key.start_time)
        .fetch_optional(executor)
        .await?;

        row.map(Self::row_to_slot).transpose()
    }
}

#[async_trait]
impl BookingStore for PostgresBookingStore {
    async fn insert_reservation(&self, reservation: &Reservation) -> Result<bool> {
        let result = sqlx::query(
            r#"
            INSERT INTO reservations (id, product_id, customer_id, travel_date, start_time,
                duration_hours, party_size, quoted_price, extras_total, status, created_at,
                confirmed_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
            ON CONFLICT (id) DO NOTHING
            "#,
        )
        .bind(reservation.id.as_uuid())
        .bind(reservation.product_id.as_str())
        .bind(reservation.customer_id.as_uuid())
        .bind(reservation.travel_date)
        .bind(reservation.start_time)
        .bind(Self::to_i32(
            "reservations",
            "duration_hours",
            reservation.duration_hours,
        )?)
        .bind(Self::to_i32(
            "reservations",
            "party_size",
            reservation.party_size,
        )?)
        .bind(reservation.quoted_price.amount())
        .bind(reservation.extras_total.amount())
        .bind(reservation.status.as_str())
        .bind(reservation.created_at)
        .bind(reservation.confirmed_at)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    async fn get_reservation(&self, id: ReservationId) -> Result<Option<Reservation>> {
        let row = sqlx::query(&format!(
            "SELECT {RESERVATION_COLUMNS} FROM reservations WHERE id = $1"
        ))
        .bind(id.as_uuid())
        .fetch_optional(&self.pool)
        .await?;

        row.map(Self::row_to_reservation).transpose()
    }

    async fn transition_reservation(
        &self,
        id: ReservationId,
        to: ReservationStatus,
        at: DateTime<Utc>,
    ) -> Result<StatusChange> {
        let allowed_from: Vec<&'static str> = ReservationStatus::predecessors_of(to)
            .iter()
            .map(ReservationStatus::as_str)
            .collect();

        let updated = sqlx::query(&format!(
            r#"
            UPDATE reservations
            SET status = $2,
                confirmed_at = CASE WHEN $2 = 'confirmed'
                                    THEN COALESCE(confirmed_at, $3)
                                    ELSE confirmed_at END
            WHERE id = $1 AND status = ANY($4)
            RETURNING {RESERVATION_COLUMNS}
            "#
        ))
        .bind(id.as_uuid())
        .bind(to.as_str())
        .bind(at)
        .bind(&allowed_from)
        .fetch_optional(&self.pool)
        .await?;

        if let Some(row) = updated {
            return Ok(StatusChange::Applied(Self::row_to_reservation(row)?));
        }

        match self.get_reservation(id).await? {
            None => Ok(StatusChange::NotFound),
            Some(current) if current.status == to => Ok(StatusChange::Unchanged(current)),
            Some(current) => Ok(StatusChange::Rejected(current)),
        }
    }

    async fn find_payment(&self, transaction_id: &str) -> Result<Option<PaymentRecord>> {
        let row = sqlx::query(&format!(
            "SELECT {PAYMENT_COLUMNS} FROM payments WHERE transaction_id = $1"
        ))
        .bind(transaction_id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(Self::row_to_payment).transpose()
    }

    async fn upsert_payment(&self, upsert: PaymentUpsert) -> Result<PaymentRecord> {
        let row = sqlx::query(&format!(
            r#"
            INSERT INTO payments (id, reservation_id, transaction_id, amount, currency, status, paid_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            ON CONFLICT (transaction_id) DO UPDATE SET
                amount = EXCLUDED.amount,
                currency = EXCLUDED.currency,
                status = EXCLUDED.status,
                paid_at = COALESCE(payments.paid_at, EXCLUDED.paid_at)
            RETURNING {PAYMENT_COLUMNS}
            "#
        ))
        .bind(PaymentId::new().as_uuid())
        .bind(upsert.reservation_id.as_uuid())
        .bind(&upsert.transaction_id)
        .bind(upsert.amount.amount())
        .bind(&upsert.currency)
        .bind(upsert.status.as_str())
        .bind(upsert.paid_at)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| {
            if let sqlx::Error::Database(ref db_err) = e
                && db_err.is_foreign_key_violation()
            {
                return StoreError::ReservationNotFound(upsert.reservation_id);
            }
            StoreError::Database(e)
        })?;

        Self::row_to_payment(row)
    }

    async fn record_capture(&self, upsert: PaymentUpsert) -> Result<CaptureRecord> {
        // FOR SHARE holds the reservation row until the upsert commits, so a
        // concurrent cancel either lands first and blocks the write or waits.
        let row = sqlx::query(&format!(
            r#"
            WITH confirmed AS (
                SELECT id FROM reservations
                WHERE id = $2 AND status = $8
                FOR SHARE
            )
            INSERT INTO payments (id, reservation_id, transaction_id, amount, currency, status, paid_at)
            SELECT $1, confirmed.id, $3, $4, $5, $6, $7 FROM confirmed
            ON CONFLICT (transaction_id) DO UPDATE SET
                amount = EXCLUDED.amount,
                currency = EXCLUDED.currency,
                status = EXCLUDED.status,
                paid_at = COALESCE(payments.paid_at, EXCLUDED.paid_at)
            RETURNING {PAYMENT_COLUMNS}
            "#
        ))
        .bind(PaymentId::new().as_uuid())
        .bind(upsert.reservation_id.as_uuid())
        .bind(&upsert.transaction_id)
        .bind(upsert.amount.amount())
        .bind(&upsert.currency)
        .bind(upsert.status.as_str())
        .bind(upsert.paid_at)
        .bind(ReservationStatus::Confirmed.as_str())
        .fetch_optional(&self.pool)
        .await?;

        if let Some(row) = row {
            return Ok(CaptureRecord::Recorded(Self::row_to_payment(row)?));
        }

        match self.get_reservation(upsert.reservation_id).await? {
            Some(reservation) => Ok(CaptureRecord::NotConfirmed(reservation)),
            None => Err(StoreError::ReservationNotFound(upsert.reservation_id)),
        }
    }

    async fn reserve_slot(
        &self,
        claim: SlotClaim,
        policy: CapacityPolicy,
    ) -> Result<SlotReservation> {
        let key = &claim.key;
        let mut tx = self.pool.begin().await?;

        let claimed = sqlx::query(
            r#"
            INSERT INTO slot_claims (reservation_id, product_id, travel_date, start_time)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (reservation_id) DO NOTHING
            "#,
        )
        .bind(claim.reservation_id.as_uuid())
        .bind(key.product_id.as_str())
        .bind(key.travel_date)
        .bind(key.start_time)
        .execute(&mut *tx)
        .await?
        .rows_affected()
            == 1;

        if !claimed {
            let slot = Self::fetch_slot(&mut *tx, key)
                .await?
                .ok_or_else(|| StoreError::CorruptRecord {
                    table: "slot_claims",
                    reason: format!("claim without slot {key}"),
                })?;
            tx.commit().await?;
            return Ok(SlotReservation::AlreadyClaimed(slot));
        }

        let capacity_guard = match policy {
            CapacityPolicy::Enforce => "WHERE capacity_slots.booked_slots < capacity_slots.max_slots",
            CapacityPolicy::Unconditional => "",
        };

        let incremented = sqlx::query(&format!(
            r#"
            INSERT INTO capacity_slots (product_id, travel_date, start_time, end_time, max_slots, booked_slots)
            VALUES ($1, $2, $3, $4, 1, 1)
            ON CONFLICT (product_id, travel_date, start_time) DO UPDATE SET
                booked_slots = capacity_slots.booked_slots + 1
            {capacity_guard}
            RETURNING {SLOT_COLUMNS}
            "#
        ))
        .bind(key.product_id.as_str())
        .bind(key.travel_date)
        .bind(key.start_time)
        .bind(&claim.end_time)
        .fetch_optional(&mut *tx)
        .await?;

        match incremented {
            Some(row) => {
                let slot = Self::row_to_slot(row)?;
                tx.commit().await?;
                Ok(SlotReservation::Reserved(slot))
            }
            None => {
                // Drop the claim so a later capacity raise can admit this reservation.
                tx.rollback().await?;
                let slot = Self::fetch_slot(&self.pool, key).await?.ok_or_else(|| {
                    StoreError::CorruptRecord {
                        table: "capacity_slots",
                        reason: format!("conflicting slot vanished {key}"),
                    }
                })?;
                Ok(SlotReservation::CapacityExceeded(slot))
            }
        }
    }

    async fn get_slot(&self, key: &SlotKey) -> Result<Option<CapacitySlot>> {
        Self::fetch_slot(&self.pool, key).await
    }

    async fn record_customer_booking(
        &self,
        customer_id: CustomerId,
        amount: Money,
        booked_at: DateTime<Utc>,
    ) -> Result<bool> {
        let updated = sqlx::query(
            r#"
            INSERT INTO customer_stats (customer_id, total_bookings, total_spent, last_booking_at)
            VALUES ($1, 1, $2, $3)
            ON CONFLICT (customer_id) DO UPDATE SET
                total_bookings = customer_stats.total_bookings + 1,
                total_spent = customer_stats.total_spent + EXCLUDED.total_spent,
                last_booking_at = EXCLUDED.last_booking_at
            WHERE customer_stats.last_booking_at IS NULL
               OR customer_stats.last_booking_at < EXCLUDED.last_booking_at
            "#,
        )
        .bind(customer_id.as_uuid())
        .bind(amount.amount())
        .bind(booked_at)
        .execute(&self.pool)
        .await?;

        Ok(updated.rows_affected() == 1)
    }

    async fn get_customer_stats(&self, customer_id: CustomerId) -> Result<Option<CustomerStats>> {
        let row = sqlx::query(
            r#"
            SELECT customer_id, total_bookings, total_spent, last_booking_at
            FROM customer_stats
            WHERE customer_id = $1
            "#,
        )
        .bind(customer_id.as_uuid())
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(row) => {
                let total_bookings: i64 = row.try_get("total_bookings")?;
                Ok(Some(CustomerStats {
                    customer_id: CustomerId::from_uuid(row.try_get::<Uuid, _>("customer_id")?),
                    total_bookings: u64::try_from(total_bookings).map_err(|_| {
                        StoreError::CorruptRecord {
                            table: "customer_stats",
                            reason: format!("negative total_bookings: {total_bookings}"),
                        }
                    })?,
                    total_spent: Money::new(row.try_get::<Decimal, _>("total_spent")?),
                    last_booking_at: row.try_get("last_booking_at")?,
                }))
            }
            None => Ok(None),
        }
    }

    async fn record_discrepancy(&self, discrepancy: &AmountDiscrepancy) -> Result<bool> {
        let result = sqlx::query(
            r#"
            INSERT INTO payment_discrepancies
                (transaction_id, reservation_id, expected_minor, observed_minor, currency, recorded_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            ON CONFLICT (transaction_id) DO NOTHING
            "#,
        )
        .bind(&discrepancy.transaction_id)
        .bind(discrepancy.reservation_id.as_uuid())
        .bind(discrepancy.expected_minor)
        .bind(discrepancy.observed_minor)
        .bind(&discrepancy.currency)
        .bind(discrepancy.recorded_at)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    async fn list_discrepancies(&self) -> Result<Vec<AmountDiscrepancy>> {
        let rows = sqlx::query(
            r#"
            SELECT transaction_id, reservation_id, expected_minor, observed_minor, currency, recorded_at
            FROM payment_discrepancies
            ORDER BY recorded_at ASC
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(Self::row_to_discrepancy).collect()
    }
}
