use async_trait::async_trait;
use sqlx::PgPool;
use uuid::Uuid;

use carvia_domain::error::LedgerError;
use carvia_domain::repository::{ActiveCar, CarLookup};

/// In-process car lookup over the catalog read model. A single fast point
/// query; deployments with a remote catalog service swap in their own
/// `CarLookup` client instead.
pub struct PgCarLookup {
    pool: PgPool,
}

impl PgCarLookup {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(sqlx::FromRow)]
struct CarRow {
    id: Uuid,
    name: String,
    images: Vec<String>,
    price_per_day_cents: i64,
    currency: String,
}

#[async_trait]
impl CarLookup for PgCarLookup {
    async fn get_active_car(&self, car_id: Uuid) -> Result<Option<ActiveCar>, LedgerError> {
        let row: Option<CarRow> = sqlx::query_as(
            r#"
            SELECT id, name, images, price_per_day_cents, currency
            FROM cars
            WHERE id = $1 AND is_active = TRUE
            "#,
        )
        .bind(car_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| LedgerError::internal(e.to_string()))?;

        Ok(row.map(|r| ActiveCar {
            id: r.id,
            name: r.name,
            image: r.images.into_iter().next(),
            price_per_day_cents: r.price_per_day_cents,
            currency: r.currency,
        }))
    }
}
