use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::fmt;

/// Lifecycle event types carried on the booking event bus.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EventType {
    BookingSuccess,
    BookingTimeout,
    SeatReleased,
    SystemError,
    LockFail,
}

impl EventType {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventType::BookingSuccess => "BOOKING_SUCCESS",
            EventType::BookingTimeout => "BOOKING_TIMEOUT",
            EventType::SeatReleased => "SEAT_RELEASED",
            EventType::SystemError => "SYSTEM_ERROR",
            EventType::LockFail => "LOCK_FAIL",
        }
    }

    /// Events that observers of a screening are told about directly.
    pub fn is_notification(&self) -> bool {
        matches!(self, EventType::BookingSuccess | EventType::SeatReleased)
    }
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A transient `{type, payload}` message. Never stored as an entity of its own;
/// the audit trail keeps a copy as a side effect.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BookingEvent {
    #[serde(rename = "type")]
    pub event_type: EventType,
    pub payload: Value,
    pub occurred_at: i64,
}

impl BookingEvent {
    pub fn new(event_type: EventType, payload: Value) -> Self {
        Self {
            event_type,
            payload,
            occurred_at: Utc::now().timestamp(),
        }
    }

    pub fn booking_success(
        screening_id: &str,
        user_id: &str,
        booking_id: &str,
        seat_row: u32,
        seat_col: u32,
    ) -> Self {
        Self::new(
            EventType::BookingSuccess,
            json!({
                "screening_id": screening_id,
                "user_id": user_id,
                "booking_id": booking_id,
                "seat_row": seat_row,
                "seat_col": seat_col,
            }),
        )
    }

    pub fn booking_timeout(booking_id: &str, screening_id: &str, seat_row: u32, seat_col: u32) -> Self {
        Self::new(
            EventType::BookingTimeout,
            json!({
                "booking_id": booking_id,
                "screening_id": screening_id,
                "seat_row": seat_row,
                "seat_col": seat_col,
            }),
        )
    }

    pub fn seat_released(screening_id: &str, seat_row: u32, seat_col: u32) -> Self {
        Self::new(
            EventType::SeatReleased,
            json!({
                "screening_id": screening_id,
                "seat_row": seat_row,
                "seat_col": seat_col,
            }),
        )
    }

    pub fn lock_failed(screening_id: &str, seat_row: u32, seat_col: u32, error: &str) -> Self {
        Self::new(
            EventType::LockFail,
            json!({
                "screening_id": screening_id,
                "row": seat_row,
                "col": seat_col,
                "error": error,
            }),
        )
    }

    /// The screening this event concerns, if the payload names one.
    pub fn screening_id(&self) -> Option<&str> {
        self.payload.get("screening_id").and_then(Value::as_str)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_wire_shape() {
        let event = BookingEvent::seat_released("scr-1", 2, 3);
        let wire = serde_json::to_value(&event).unwrap();

        assert_eq!(wire["type"], "SEAT_RELEASED");
        assert_eq!(wire["payload"]["screening_id"], "scr-1");
        assert_eq!(wire["payload"]["seat_col"], 3);
    }

    #[test]
    fn test_notification_filter() {
        assert!(EventType::BookingSuccess.is_notification());
        assert!(EventType::SeatReleased.is_notification());
        assert!(!EventType::BookingTimeout.is_notification());
        assert!(!EventType::LockFail.is_notification());
    }

    #[test]
    fn test_screening_id_lookup() {
        let event = BookingEvent::booking_success("scr-9", "user-a", "b-1", 0, 0);
        assert_eq!(event.screening_id(), Some("scr-9"));

        let bare = BookingEvent::new(EventType::SystemError, serde_json::json!({"error": "boom"}));
        assert_eq!(bare.screening_id(), None);
    }
}
