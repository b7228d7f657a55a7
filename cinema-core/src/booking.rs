use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use crate::lock::LockToken;
use crate::seat::SeatId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BookingStatus {
    Pending,
    Confirmed,
    Timeout,
    Cancelled,
}

impl BookingStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            BookingStatus::Pending => "PENDING",
            BookingStatus::Confirmed => "CONFIRMED",
            BookingStatus::Timeout => "TIMEOUT",
            BookingStatus::Cancelled => "CANCELLED",
        }
    }
}

impl fmt::Display for BookingStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BookingStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "PENDING" => Ok(BookingStatus::Pending),
            "CONFIRMED" => Ok(BookingStatus::Confirmed),
            "TIMEOUT" => Ok(BookingStatus::Timeout),
            "CANCELLED" => Ok(BookingStatus::Cancelled),
            other => Err(format!("unknown booking status: {}", other)),
        }
    }
}

/// Durable record of one booking attempt.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Booking {
    pub id: Uuid,
    pub screening_id: String,
    pub user_id: String,
    pub seat_row: u32,
    pub seat_col: u32,
    pub status: BookingStatus,
    /// Token that was live when the booking was created.
    pub lock_id: LockToken,
    pub created_at: DateTime<Utc>,
    pub confirmed_at: Option<DateTime<Utc>>,
}

impl Booking {
    pub fn pending(seat: &SeatId, user_id: &str, lock_id: LockToken) -> Self {
        Self {
            id: Uuid::new_v4(),
            screening_id: seat.screening_id.clone(),
            user_id: user_id.to_string(),
            seat_row: seat.row,
            seat_col: seat.col,
            status: BookingStatus::Pending,
            lock_id,
            created_at: Utc::now(),
            confirmed_at: None,
        }
    }

    pub fn seat(&self) -> SeatId {
        SeatId::new(self.screening_id.clone(), self.seat_row, self.seat_col)
    }

    pub fn is_pending(&self) -> bool {
        self.status == BookingStatus::Pending
    }
}

/// Equality/range predicates accepted by `BookingRepository::find_by_filter`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BookingFilter {
    pub screening_id: Option<String>,
    pub status: Option<BookingStatus>,
    /// Strictly older than this instant.
    pub created_before: Option<DateTime<Utc>>,
}

impl BookingFilter {
    pub fn for_screening(screening_id: &str) -> Self {
        Self {
            screening_id: Some(screening_id.to_string()),
            ..Self::default()
        }
    }

    /// Pending bookings created before `cutoff`, i.e. past their lock window.
    pub fn stale_pending(cutoff: DateTime<Utc>) -> Self {
        Self {
            status: Some(BookingStatus::Pending),
            created_before: Some(cutoff),
            ..Self::default()
        }
    }

    pub fn matches(&self, booking: &Booking) -> bool {
        self.screening_id.as_deref().map_or(true, |id| booking.screening_id == id)
            && self.status.map_or(true, |s| booking.status == s)
            && self.created_before.map_or(true, |t| booking.created_at < t)
    }
}
