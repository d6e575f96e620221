use std::sync::Arc;
use carvia_domain::BookingLedger;

#[derive(Clone)]
pub struct AuthConfig {
    pub secret: String,
}

#[derive(Clone)]
pub struct AppState {
    pub ledger: Arc<BookingLedger>,
    pub auth: AuthConfig,
}
