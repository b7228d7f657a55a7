use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::fmt;

use super::events::BookingEvent;

pub const ADMIN_ROOM: &str = "admin";

/// A named room on the broadcast hub.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Topic(String);

impl Topic {
    pub fn screening(screening_id: &str) -> Self {
        Self(format!("screening:{}", screening_id))
    }

    pub fn admin() -> Self {
        Self(ADMIN_ROOM.to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Topic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MessageKind {
    SeatUpdate,
    Notification,
    Refresh,
}

/// Envelope delivered to realtime observers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HubMessage {
    #[serde(rename = "type")]
    pub kind: MessageKind,
    pub payload: Value,
}

impl HubMessage {
    /// State snapshot of one seat.
    pub fn seat_update<T: Serialize>(seat: &T) -> Result<Self, serde_json::Error> {
        Ok(Self {
            kind: MessageKind::SeatUpdate,
            payload: serde_json::to_value(seat)?,
        })
    }

    /// Discrete lifecycle event, shaped for toast-style display.
    pub fn notification(event: &BookingEvent) -> Self {
        Self {
            kind: MessageKind::Notification,
            payload: json!({
                "eventType": event.event_type,
                "payload": event.payload,
            }),
        }
    }

    pub fn refresh() -> Self {
        Self {
            kind: MessageKind::Refresh,
            payload: Value::Null,
        }
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}
