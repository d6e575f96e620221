use std::net::SocketAddr;
use std::sync::Arc;

use carvia_api::{app, state::{AppState, AuthConfig}};
use carvia_domain::BookingLedger;
use carvia_store::{DbClient, EventProducer, KafkaNotifier, PgBookingStore, PgCarLookup};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "carvia_api=debug,tower_http=debug,axum::rejection=trace".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = carvia_store::app_config::Config::load().expect("Failed to load config");
    tracing::info!("Starting Carvia booking API on port {}", config.server.port);

    let db = DbClient::new(&config.database.url, config.database.max_connections)
        .await
        .expect("Failed to connect to Postgres");
    db.migrate().await.expect("Failed to run migrations");

    let kafka = EventProducer::new(&config.kafka.brokers)
        .expect("Failed to create Kafka producer");

    let ledger = BookingLedger::new(
        Arc::new(PgBookingStore::new(db.pool.clone())),
        Arc::new(PgCarLookup::new(db.pool.clone())),
        Arc::new(KafkaNotifier::new(kafka)),
    );

    let app_state = AppState {
        ledger: Arc::new(ledger),
        auth: AuthConfig {
            secret: config.auth.jwt_secret.clone(),
        },
    };

    let app = app(app_state);

    let addr = SocketAddr::from(([0, 0, 0, 0], config.server.port));
    tracing::info!("Listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await.unwrap();
    axum::serve(listener, app).await.unwrap();
}
