use cinema_booking::{BookingService, HubHandle};
use std::sync::Arc;

#[derive(Clone)]
pub struct AuthConfig {
    pub secret: String,
}

#[derive(Clone)]
pub struct AppState {
    pub bookings: Arc<BookingService>,
    pub hub: HubHandle,
    pub auth: AuthConfig,
}
