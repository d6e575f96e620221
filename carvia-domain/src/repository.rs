use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use chrono::{DateTime, Utc};

use crate::booking::{Booking, BookingWithCar, NewBooking};
use crate::error::LedgerError;

/// Repository trait for booking persistence. `insert_if_available` is the
/// only write path that creates rows and must perform the overlap check and
/// the insert as one atomic unit.
#[async_trait]
pub trait BookingStore: Send + Sync {
    /// Atomically verify no non-cancelled booking for the same car overlaps
    /// `[pickup, dropoff)` and insert the new row with status `confirmed`.
    /// Fails with `Conflict` when an overlap exists.
    async fn insert_if_available(&self, booking: NewBooking) -> Result<Booking, LedgerError>;

    /// All bookings for a user, newest-created first, with car display fields.
    async fn list_for_user(&self, user_id: Uuid) -> Result<Vec<BookingWithCar>, LedgerError>;

    /// A single booking scoped by id AND owner.
    async fn find_for_user(
        &self,
        id: Uuid,
        user_id: Uuid,
    ) -> Result<Option<BookingWithCar>, LedgerError>;

    /// Flip a `confirmed` booking owned by `user_id` to `cancelled`. Returns
    /// `None` when the row is absent, foreign-owned, or not `confirmed` --
    /// callers cannot tell which.
    async fn cancel(&self, id: Uuid, user_id: Uuid)
        -> Result<Option<BookingWithCar>, LedgerError>;

    /// Among `car_ids`, the distinct cars with a non-cancelled booking
    /// overlapping the window. Non-locking read.
    async fn unavailable_cars(
        &self,
        car_ids: &[Uuid],
        pickup: DateTime<Utc>,
        dropoff: DateTime<Utc>,
    ) -> Result<Vec<Uuid>, LedgerError>;
}

/// Active-car projection returned by the catalog collaborator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActiveCar {
    pub id: Uuid,
    pub name: String,
    pub image: Option<String>,
    pub price_per_day_cents: i64,
    pub currency: String,
}

/// Car lookup collaborator. May be an in-process store query or a remote
/// catalog client; the ledger does not depend on which.
#[async_trait]
pub trait CarLookup: Send + Sync {
    /// Resolve a car restricted to active ones.
    async fn get_active_car(&self, car_id: Uuid) -> Result<Option<ActiveCar>, LedgerError>;
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum BookingEventKind {
    Confirmed,
    Cancelled,
}

impl BookingEventKind {
    pub fn topic(&self) -> &'static str {
        match self {
            BookingEventKind::Confirmed => "booking.confirmed",
            BookingEventKind::Cancelled => "booking.cancelled",
        }
    }
}

/// Post-booking notification payload. Delivery is best-effort.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BookingEvent {
    pub kind: BookingEventKind,
    pub user_id: Uuid,
    pub booking_id: Uuid,
    pub car_name: String,
}

/// Notification collaborator. Failures must be swallowed by callers; a lost
/// notification never fails the booking operation that produced it.
#[async_trait]
pub trait BookingNotifier: Send + Sync {
    async fn notify(&self, event: BookingEvent) -> Result<(), LedgerError>;
}
