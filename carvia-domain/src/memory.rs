//! In-memory collaborator implementations backing the test suites and local
//! development without Postgres or Kafka.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::booking::{intervals_overlap, Booking, BookingStatus, BookingWithCar, CarSummary, NewBooking};
use crate::error::LedgerError;
use crate::repository::{ActiveCar, BookingEvent, BookingNotifier, BookingStore, CarLookup};

#[derive(Default)]
struct Inner {
    bookings: Vec<Booking>,
    cars: HashMap<Uuid, ActiveCar>,
}

/// Single-process booking store and car catalog. The conflict check and the
/// insert run under one mutex guard, giving the same atomicity the Postgres
/// store gets from its serializable transaction.
#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
    availability_queries: AtomicUsize,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_car(&self, name: &str, price_per_day_cents: i64) -> Uuid {
        let id = Uuid::new_v4();
        self.inner.lock().unwrap().cars.insert(
            id,
            ActiveCar {
                id,
                name: name.to_string(),
                image: None,
                price_per_day_cents,
                currency: "USD".to_string(),
            },
        );
        id
    }

    /// How many availability reads hit the store.
    pub fn availability_queries(&self) -> usize {
        self.availability_queries.load(Ordering::SeqCst)
    }

    fn summary(inner: &Inner, car_id: Uuid) -> CarSummary {
        inner
            .cars
            .get(&car_id)
            .map(|c| CarSummary {
                id: c.id,
                name: c.name.clone(),
                image: c.image.clone(),
            })
            .unwrap_or(CarSummary {
                id: car_id,
                name: String::new(),
                image: None,
            })
    }
}

#[async_trait]
impl BookingStore for MemoryStore {
    async fn insert_if_available(&self, booking: NewBooking) -> Result<Booking, LedgerError> {
        let mut inner = self.inner.lock().unwrap();

        let conflict = inner.bookings.iter().any(|b| {
            b.car_id == booking.car_id
                && b.status != BookingStatus::Cancelled
                && intervals_overlap(
                    b.pickup_time,
                    b.dropoff_time,
                    booking.pickup_time,
                    booking.dropoff_time,
                )
        });
        if conflict {
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
        inner.bookings.push(row.clone());
        Ok(row)
    }

    async fn list_for_user(&self, user_id: Uuid) -> Result<Vec<BookingWithCar>, LedgerError> {
        let inner = self.inner.lock().unwrap();
        let mut rows: Vec<&Booking> = inner
            .bookings
            .iter()
            .filter(|b| b.user_id == user_id)
            .collect();
        rows.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(rows
            .into_iter()
            .map(|b| BookingWithCar {
                booking: b.clone(),
                car: Self::summary(&inner, b.car_id),
            })
            .collect())
    }

    async fn find_for_user(
        &self,
        id: Uuid,
        user_id: Uuid,
    ) -> Result<Option<BookingWithCar>, LedgerError> {
        let inner = self.inner.lock().unwrap();
        Ok(inner
            .bookings
            .iter()
            .find(|b| b.id == id && b.user_id == user_id)
            .map(|b| BookingWithCar {
                booking: b.clone(),
                car: Self::summary(&inner, b.car_id),
            }))
    }

    async fn cancel(
        &self,
        id: Uuid,
        user_id: Uuid,
    ) -> Result<Option<BookingWithCar>, LedgerError> {
        let mut inner = self.inner.lock().unwrap();
        let car_ids: HashMap<Uuid, CarSummary> = inner
            .cars
            .values()
            .map(|c| {
                (
                    c.id,
                    CarSummary {
                        id: c.id,
                        name: c.name.clone(),
                        image: c.image.clone(),
                    },
                )
            })
            .collect();

        let row = inner.bookings.iter_mut().find(|b| {
            b.id == id && b.user_id == user_id && b.status == BookingStatus::Confirmed
        });
        Ok(row.map(|b| {
            b.status = BookingStatus::Cancelled;
            b.updated_at = Utc::now();
            BookingWithCar {
                booking: b.clone(),
                car: car_ids.get(&b.car_id).cloned().unwrap_or(CarSummary {
                    id: b.car_id,
                    name: String::new(),
                    image: None,
                }),
            }
        }))
    }

    async fn unavailable_cars(
        &self,
        car_ids: &[Uuid],
        pickup: DateTime<Utc>,
        dropoff: DateTime<Utc>,
    ) -> Result<Vec<Uuid>, LedgerError> {
        self.availability_queries.fetch_add(1, Ordering::SeqCst);
        let inner = self.inner.lock().unwrap();
        let mut busy: Vec<Uuid> = inner
            .bookings
            .iter()
            .filter(|b| {
                car_ids.contains(&b.car_id)
                    && b.status != BookingStatus::Cancelled
                    && intervals_overlap(b.pickup_time, b.dropoff_time, pickup, dropoff)
            })
            .map(|b| b.car_id)
            .collect();
        busy.sort();
        busy.dedup();
        Ok(busy)
    }
}

#[async_trait]
impl CarLookup for MemoryStore {
    async fn get_active_car(&self, car_id: Uuid) -> Result<Option<ActiveCar>, LedgerError> {
        Ok(self.inner.lock().unwrap().cars.get(&car_id).cloned())
    }
}

/// Records every event it is asked to deliver.
#[derive(Default)]
pub struct RecordingNotifier {
    events: Mutex<Vec<BookingEvent>>,
}

impl RecordingNotifier {
    pub fn events(&self) -> Vec<BookingEvent> {
        self.events.lock().unwrap().clone()
    }
}

#[async_trait]
impl BookingNotifier for RecordingNotifier {
    async fn notify(&self, event: BookingEvent) -> Result<(), LedgerError> {
        self.events.lock().unwrap().push(event);
        Ok(())
    }
}

/// Always fails delivery; used to prove notification failures stay swallowed.
pub struct FailingNotifier;

#[async_trait]
impl BookingNotifier for FailingNotifier {
    async fn notify(&self, _event: BookingEvent) -> Result<(), LedgerError> {
        Err(LedgerError::internal("notifier unavailable"))
    }
}
