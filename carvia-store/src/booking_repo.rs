use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{PgPool, Postgres, Transaction};
use uuid::Uuid;

use carvia_domain::booking::{Booking, BookingStatus, BookingWithCar, CarSummary, NewBooking};
use carvia_domain::error::LedgerError;
use carvia_domain::repository::BookingStore;

/// Postgres-backed booking store. Conflict safety comes from the serializable
/// transaction around the overlap check and the insert; the `FOR UPDATE` on
/// matching rows makes concurrent creators queue instead of racing past each
/// other's check.
pub struct PgBookingStore {
    pool: PgPool,
}

impl PgBookingStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

// Internal struct for type-safe querying
#[derive(sqlx::FromRow)]
struct BookingCarRow {
    id: Uuid,
    user_id: Uuid,
    car_id: Uuid,
    pickup_time: DateTime<Utc>,
    dropoff_time: DateTime<Utc>,
    total_price_cents: i64,
    currency: String,
    status: String,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    car_name: String,
    car_images: Vec<String>,
}

impl BookingCarRow {
    fn into_booking_with_car(self) -> Result<BookingWithCar, LedgerError> {
        let car = CarSummary {
            id: self.car_id,
            name: self.car_name,
            image: self.car_images.into_iter().next(),
        };
        let booking = Booking {
            id: self.id,
            user_id: self.user_id,
            car_id: self.car_id,
            pickup_time: self.pickup_time,
            dropoff_time: self.dropoff_time,
            total_price_cents: self.total_price_cents,
            currency: self.currency,
            status: parse_status(&self.status)?,
            created_at: self.created_at,
            updated_at: self.updated_at,
        };
        Ok(BookingWithCar { booking, car })
    }
}

fn parse_status(s: &str) -> Result<BookingStatus, LedgerError> {
    BookingStatus::parse(s)
        .ok_or_else(|| LedgerError::internal(format!("unknown booking status in store: {s}")))
}

/// Translate sqlx failures into the ledger taxonomy. Serialization failures
/// (40001) and lock timeouts (55P03) mean another creator won the race, so
/// both map to `Conflict` and the caller may retry.
fn map_db_error(err: sqlx::Error) -> LedgerError {
    if let sqlx::Error::Database(db) = &err {
        match db.code().as_deref() {
            Some("40001") => {
                return LedgerError::conflict("Car not available for selected dates")
            }
            Some("55P03") => {
                return LedgerError::conflict("Booking lock wait timed out, please retry")
            }
            Some("57014") => return LedgerError::internal("Booking transaction timed out"),
            _ => {}
        }
    }
    LedgerError::internal(err.to_string())
}

async fn bound_transaction_time(tx: &mut Transaction<'_, Postgres>) -> Result<(), sqlx::Error> {
    // Bounded wait for row locks and overall transaction duration; exceeding
    // either surfaces as 55P03 / 57014 and the transaction rolls back whole.
    sqlx::query("SET LOCAL lock_timeout = '5s'")
        .execute(&mut **tx)
        .await?;
    sqlx::query("SET LOCAL statement_timeout = '10s'")
        .execute(&mut **tx)
        .await?;
    Ok(())
}

const BOOKING_WITH_CAR_COLUMNS: &str = "b.id, b.user_id, b.car_id, b.pickup_time, b.dropoff_time, \
     b.total_price_cents, b.currency, b.status, b.created_at, b.updated_at, \
     c.name AS car_name, c.images AS car_images";

#[async_trait]
impl BookingStore for PgBookingStore {
    async fn insert_if_available(&self, booking: NewBooking) -> Result<Booking, LedgerError> {
        let mut tx = self.pool.begin().await.map_err(map_db_error)?;

        sqlx::query("SET TRANSACTION ISOLATION LEVEL SERIALIZABLE")
            .execute(&mut *tx)
            .await
            .map_err(map_db_error)?;
        bound_transaction_time(&mut tx).await.map_err(map_db_error)?;

        // Half-open overlap: existing [pickup, dropoff) intersects the
        // requested window iff pickup < $2 AND dropoff > $3. Touching
        // endpoints do not match.
        let conflicts: Vec<Uuid> = sqlx::query_scalar(
            r#"
            SELECT id
            FROM bookings
            WHERE car_id = $1
              AND status <> 'cancelled'
              AND pickup_time < $2
              AND dropoff_time > $3
            FOR UPDATE
            "#,
        )
        .bind(booking.car_id)
        .bind(booking.dropoff_time)
        .bind(booking.pickup_time)
        .fetch_all(&mut *tx)
        .await
        .map_err(map_db_error)?;

        if !conflicts.is_empty() {
            tx.rollback().await.ok();
            return Err(LedgerError::conflict("Car not available for selected dates"));
        }

        let now = Utc::now();
        let row = Booking {
            id: Uuid::new_v4(),
            user_id: booking.user_id,
            car_id: booking.car_id,
            pickup_time: booking.pickup_time,
            dropoff_time: booking.dropoff_time,
            total_price_cents: booking.total_price_cents,
            currency: booking.currency,
            status: BookingStatus::Confirmed,
            created_at: now,
            updated_at: now,
        };

        sqlx::query(
            r#"
            INSERT INTO bookings
                (id, user_id, car_id, pickup_time, dropoff_time,
                 total_price_cents, currency, status, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            "#,
        )
        .bind(row.id)
        .bind(row.user_id)
        .bind(row.car_id)
        .bind(row.pickup_time)
        .bind(row.dropoff_time)
        .bind(row.total_price_cents)
        .bind(&row.currency)
        .bind(row.status.as_str())
        .bind(row.created_at)
        .bind(row.updated_at)
        .execute(&mut *tx)
        .await
        .map_err(map_db_error)?;

        tx.commit().await.map_err(map_db_error)?;

        Ok(row)
    }

    async fn list_for_user(&self, user_id: Uuid) -> Result<Vec<BookingWithCar>, LedgerError> {
        let rows: Vec<BookingCarRow> = sqlx::query_as(&format!(
            r#"
            SELECT {BOOKING_WITH_CAR_COLUMNS}
            FROM bookings b
            JOIN cars c ON c.id = b.car_id
            WHERE b.user_id = $1
            ORDER BY b.created_at DESC
            "#
        ))
        .bind(user_id)
        .fetch_all(&self.pool)
        .await
        .map_err(map_db_error)?;

        rows.into_iter().map(|r| r.into_booking_with_car()).collect()
    }

    async fn find_for_user(
        &self,
        id: Uuid,
        user_id: Uuid,
    ) -> Result<Option<BookingWithCar>, LedgerError> {
        let row: Option<BookingCarRow> = sqlx::query_as(&format!(
            r#"
            SELECT {BOOKING_WITH_CAR_COLUMNS}
            FROM bookings b
            JOIN cars c ON c.id = b.car_id
            WHERE b.id = $1 AND b.user_id = $2
            "#
        ))
        .bind(id)
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(map_db_error)?;

        row.map(|r| r.into_booking_with_car()).transpose()
    }

    async fn cancel(
        &self,
        id: Uuid,
        user_id: Uuid,
    ) -> Result<Option<BookingWithCar>, LedgerError> {
        // Guarded single-statement flip; zero rows means absent, foreign or
        // already terminal, and callers cannot distinguish those.
        let row: Option<BookingCarRow> = sqlx::query_as(
            r#"
            WITH updated AS (
                UPDATE bookings
                SET status = 'cancelled', updated_at = NOW()
                WHERE id = $1 AND user_id = $2 AND status = 'confirmed'
                RETURNING id, user_id, car_id, pickup_time, dropoff_time,
                          total_price_cents, currency, status, created_at, updated_at
            )
            SELECT u.id, u.user_id, u.car_id, u.pickup_time, u.dropoff_time,
                   u.total_price_cents, u.currency, u.status, u.created_at, u.updated_at,
                   c.name AS car_name, c.images AS car_images
            FROM updated u
            JOIN cars c ON c.id = u.car_id
            "#,
        )
        .bind(id)
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(map_db_error)?;

        row.map(|r| r.into_booking_with_car()).transpose()
    }

    async fn unavailable_cars(
        &self,
        car_ids: &[Uuid],
        pickup: DateTime<Utc>,
        dropoff: DateTime<Utc>,
    ) -> Result<Vec<Uuid>, LedgerError> {
        // Advisory read: no locks taken, same overlap predicate as the
        // create path.
        let busy: Vec<Uuid> = sqlx::query_scalar(
            r#"
            SELECT DISTINCT car_id
            FROM bookings
            WHERE car_id = ANY($1)
              AND status <> 'cancelled'
              AND pickup_time < $2
              AND dropoff_time > $3
            "#,
        )
        .bind(car_ids.to_vec())
        .bind(dropoff)
        .bind(pickup)
        .fetch_all(&self.pool)
        .await
        .map_err(map_db_error)?;

        Ok(busy)
    }
}
