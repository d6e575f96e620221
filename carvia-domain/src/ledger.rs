use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use chrono::Utc;
use tracing::{info, warn};
use uuid::Uuid;

use crate::booking::{
    AvailabilityRequest, BookingWithCar, CarSummary, CreateBookingRequest, NewBooking,
};
use crate::error::LedgerError;
use crate::pricing;
use crate::repository::{BookingEvent, BookingEventKind, BookingNotifier, BookingStore, CarLookup};

/// The booking ledger: authoritative owner of reservations per car.
///
/// Concurrency correctness lives entirely in the store's
/// `insert_if_available`; the ledger itself holds no locks, so any number of
/// service instances can share one store.
pub struct BookingLedger {
    store: Arc<dyn BookingStore>,
    cars: Arc<dyn CarLookup>,
    notifier: Arc<dyn BookingNotifier>,
}

impl BookingLedger {
    pub fn new(
        store: Arc<dyn BookingStore>,
        cars: Arc<dyn CarLookup>,
        notifier: Arc<dyn BookingNotifier>,
    ) -> Self {
        Self {
            store,
            cars,
            notifier,
        }
    }

    /// Create a booking after a conflict check against all non-cancelled
    /// reservations for the car.
    ///
    /// The car lookup runs before the store transaction so a possibly-remote
    /// catalog call never extends row lock hold time; the transaction
    /// re-validates only availability.
    pub async fn create_booking(
        &self,
        user_id: Uuid,
        req: &CreateBookingRequest,
    ) -> Result<BookingWithCar, LedgerError> {
        let now = Utc::now();
        if req.pickup_time <= now {
            return Err(LedgerError::validation("Pickup time must be in the future"));
        }
        if req.dropoff_time <= req.pickup_time {
            return Err(LedgerError::validation(
                "Dropoff time must be after pickup time",
            ));
        }

        let car = self
            .cars
            .get_active_car(req.car_id)
            .await?
            .ok_or_else(|| LedgerError::not_found("Car not found or inactive"))?;

        let total = pricing::total_price_cents(
            req.pickup_time,
            req.dropoff_time,
            car.price_per_day_cents,
        );

        let booking = self
            .store
            .insert_if_available(NewBooking {
                user_id,
                car_id: car.id,
                pickup_time: req.pickup_time,
                dropoff_time: req.dropoff_time,
                total_price_cents: total,
                currency: car.currency.clone(),
            })
            .await?;

        info!(booking_id = %booking.id, car_id = %car.id, "booking confirmed");

        self.emit(BookingEvent {
            kind: BookingEventKind::Confirmed,
            user_id,
            booking_id: booking.id,
            car_name: car.name.clone(),
        })
        .await;

        Ok(BookingWithCar {
            booking,
            car: CarSummary {
                id: car.id,
                name: car.name,
                image: car.image,
            },
        })
    }

    pub async fn get_user_bookings(
        &self,
        user_id: Uuid,
    ) -> Result<Vec<BookingWithCar>, LedgerError> {
        self.store.list_for_user(user_id).await
    }

    pub async fn get_booking(
        &self,
        id: Uuid,
        user_id: Uuid,
    ) -> Result<BookingWithCar, LedgerError> {
        self.store
            .find_for_user(id, user_id)
            .await?
            .ok_or_else(|| LedgerError::not_found("Booking not found"))
    }

    /// Cancel a `confirmed` booking owned by the caller. Absent, foreign and
    /// already-terminal bookings are indistinguishable to the caller.
    pub async fn cancel_booking(
        &self,
        id: Uuid,
        user_id: Uuid,
    ) -> Result<BookingWithCar, LedgerError> {
        let cancelled = self
            .store
            .cancel(id, user_id)
            .await?
            .ok_or_else(|| LedgerError::not_found("Booking not found or cannot be cancelled"))?;

        info!(booking_id = %id, "booking cancelled");

        self.emit(BookingEvent {
            kind: BookingEventKind::Cancelled,
            user_id,
            booking_id: id,
            car_name: cancelled.car.name.clone(),
        })
        .await;

        Ok(cancelled)
    }

    /// Advisory availability for a set of cars over a window. Non-locking:
    /// a concurrent create can still win the race and the create path redoes
    /// its own conflict check.
    pub async fn check_availability(
        &self,
        req: &AvailabilityRequest,
    ) -> Result<HashMap<Uuid, bool>, LedgerError> {
        if req.dropoff_time <= req.pickup_time {
            return Err(LedgerError::validation(
                "Dropoff time must be after pickup time",
            ));
        }
        if req.car_ids.is_empty() {
            return Ok(HashMap::new());
        }

        let busy: HashSet<Uuid> = self
            .store
            .unavailable_cars(&req.car_ids, req.pickup_time, req.dropoff_time)
            .await?
            .into_iter()
            .collect();

        Ok(req
            .car_ids
            .iter()
            .map(|id| (*id, !busy.contains(id)))
            .collect())
    }

    async fn emit(&self, event: BookingEvent) {
        if let Err(e) = self.notifier.notify(event).await {
            warn!("failed to publish booking event: {}", e);
        }
    }
}
