use chrono::{DateTime, Utc};

/// Number of billable days for a rental window: whole elapsed hours divided
/// by 24, rounded up. A 24h rental is 1 day, 25h is 2.
pub fn rental_days(pickup: DateTime<Utc>, dropoff: DateTime<Utc>) -> i64 {
    let hours = (dropoff - pickup).num_hours();
    (hours + 23) / 24
}

/// Total price in minor currency units, fixed at creation time from the
/// car's price at that moment.
pub fn total_price_cents(
    pickup: DateTime<Utc>,
    dropoff: DateTime<Utc>,
    price_per_day_cents: i64,
) -> i64 {
    rental_days(pickup, dropoff) * price_per_day_cents
}
