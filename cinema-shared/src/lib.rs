pub mod models;

pub use models::events::{BookingEvent, EventType};
pub use models::messages::{HubMessage, MessageKind, Topic};
