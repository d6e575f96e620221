use serde::{Deserialize, Serialize};
use uuid::Uuid;
use chrono::{DateTime, Utc};

/// Booking lifecycle status. Rows are never deleted; a booking leaves the
/// active set only by moving to a terminal status.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum BookingStatus {
    Confirmed,
    Cancelled,
    Completed,
}

impl BookingStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            BookingStatus::Confirmed => "confirmed",
            BookingStatus::Cancelled => "cancelled",
            BookingStatus::Completed => "completed",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "confirmed" => Some(BookingStatus::Confirmed),
            "cancelled" => Some(BookingStatus::Cancelled),
            "completed" => Some(BookingStatus::Completed),
            _ => None,
        }
    }

    /// Only `confirmed` bookings may transition; terminal states stay put.
    pub fn can_cancel(&self) -> bool {
        matches!(self, BookingStatus::Confirmed)
    }
}

impl std::fmt::Display for BookingStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A reservation in the ledger. `car_id` is a foreign reference; the ledger
/// never writes car data.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Booking {
    pub id: Uuid,
    pub user_id: Uuid,
    pub car_id: Uuid,
    pub pickup_time: DateTime<Utc>,
    pub dropoff_time: DateTime<Utc>,
    pub total_price_cents: i64,
    pub currency: String,
    pub status: BookingStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Minimal car display fields joined into booking reads.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CarSummary {
    pub id: Uuid,
    pub name: String,
    pub image: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BookingWithCar {
    #[serde(flatten)]
    pub booking: Booking,
    pub car: CarSummary,
}

/// Insert payload for the conflict-checked create. Price is computed by the
/// ledger before the transaction opens.
#[derive(Debug, Clone)]
pub struct NewBooking {
    pub user_id: Uuid,
    pub car_id: Uuid,
    pub pickup_time: DateTime<Utc>,
    pub dropoff_time: DateTime<Utc>,
    pub total_price_cents: i64,
    pub currency: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateBookingRequest {
    pub car_id: Uuid,
    pub pickup_time: DateTime<Utc>,
    pub dropoff_time: DateTime<Utc>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AvailabilityRequest {
    pub car_ids: Vec<Uuid>,
    pub pickup_time: DateTime<Utc>,
    pub dropoff_time: DateTime<Utc>,
}

/// Half-open interval overlap: `[a_start, a_end)` intersects
/// `[b_start, b_end)` iff `a_start < b_end AND b_start < a_end`.
/// Touching endpoints do not conflict.
pub fn intervals_overlap(
    a_start: DateTime<Utc>,
    a_end: DateTime<Utc>,
    b_start: DateTime<Utc>,
    b_end: DateTime<Utc>,
) -> bool {
    a_start < b_end && b_start < a_end
}
