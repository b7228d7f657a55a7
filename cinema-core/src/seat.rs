use serde::{Deserialize, Serialize};
use std::fmt;

use crate::booking::{Booking, BookingStatus};
use crate::lock::LockToken;

const LOCK_KEY_PREFIX: &str = "seat_lock:";

/// Composite key addressing one reservable cell.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SeatId {
    pub screening_id: String,
    pub row: u32,
    pub col: u32,
}

impl SeatId {
    pub fn new(screening_id: impl Into<String>, row: u32, col: u32) -> Self {
        Self {
            screening_id: screening_id.into(),
            row,
            col,
        }
    }

    pub fn lock_key(&self) -> String {
        format!("{}{}:{}:{}", LOCK_KEY_PREFIX, self.screening_id, self.row, self.col)
    }
}

impl fmt::Display for SeatId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}({},{})", self.screening_id, self.row, self.col)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SeatStatus {
    Available,
    Locked,
    Booked,
}

/// Derived state of a seat. Never stored.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SeatView {
    Available,
    Locked { token: LockToken, user_id: String },
    Booked { user_id: String },
}

impl SeatView {
    /// Resolves a seat from the bookings of its screening and the lock's live token.
    ///
    /// A confirmed booking wins regardless of lock state. A pending booking only
    /// counts as a lock while its stored token is still the live one, so expired
    /// or reassigned locks fall back to `Available` without touching the store.
    pub fn resolve<'a, I>(bookings: I, row: u32, col: u32, live_owner: Option<&LockToken>) -> SeatView
    where
        I: IntoIterator<Item = &'a Booking>,
    {
        let mut locked = None;
        for booking in bookings {
            if booking.seat_row != row || booking.seat_col != col {
                continue;
            }
            match booking.status {
                BookingStatus::Confirmed => {
                    return SeatView::Booked {
                        user_id: booking.user_id.clone(),
                    }
                }
                BookingStatus::Pending if locked.is_none() && Some(&booking.lock_id) == live_owner => {
                    locked = Some(SeatView::Locked {
                        token: booking.lock_id.clone(),
                        user_id: booking.user_id.clone(),
                    });
                }
                _ => {}
            }
        }
        locked.unwrap_or(SeatView::Available)
    }

    pub fn status(&self) -> SeatStatus {
        match self {
            SeatView::Available => SeatStatus::Available,
            SeatView::Locked { .. } => SeatStatus::Locked,
            SeatView::Booked { .. } => SeatStatus::Booked,
        }
    }
}

/// Wire shape of one seat, as sent to observers and HTTP callers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Seat {
    pub row: u32,
    pub col: u32,
    pub status: SeatStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub lock_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
}

impl Seat {
    pub fn new(row: u32, col: u32, view: &SeatView) -> Self {
        let (lock_id, user_id) = match view {
            SeatView::Available => (None, None),
            SeatView::Locked { token, user_id } => (Some(token.to_string()), Some(user_id.clone())),
            SeatView::Booked { user_id } => (None, Some(user_id.clone())),
        };
        Self {
            row,
            col,
            status: view.status(),
            lock_id,
            user_id,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pending(row: u32, col: u32, user: &str) -> Booking {
        Booking::pending(&SeatId::new("scr", row, col), user, LockToken::generate())
    }

    #[test]
    fn test_lock_key_format() {
        assert_eq!(SeatId::new("abc", 2, 3).lock_key(), "seat_lock:abc:2:3");
    }

    #[test]
    fn test_no_bookings_is_available() {
        let view = SeatView::resolve(std::iter::empty(), 0, 0, None);
        assert_eq!(view, SeatView::Available);
    }

    #[test]
    fn test_pending_with_live_token_is_locked() {
        let booking = pending(1, 1, "user-a");
        let live = booking.lock_id.clone();
        let view = SeatView::resolve([&booking], 1, 1, Some(&live));

        assert_eq!(
            view,
            SeatView::Locked {
                token: live,
                user_id: "user-a".into()
            }
        );
    }

    #[test]
    fn test_pending_with_stale_token_is_available() {
        let booking = pending(1, 1, "user-a");
        let other = LockToken::generate();

        assert_eq!(SeatView::resolve([&booking], 1, 1, Some(&other)), SeatView::Available);
        assert_eq!(SeatView::resolve([&booking], 1, 1, None), SeatView::Available);
    }

    #[test]
    fn test_confirmed_is_booked_regardless_of_lock() {
        let mut confirmed = pending(0, 5, "user-b");
        confirmed.status = BookingStatus::Confirmed;
        let newer = pending(0, 5, "user-c");
        let live = newer.lock_id.clone();

        let view = SeatView::resolve([&newer, &confirmed], 0, 5, Some(&live));
        assert_eq!(view, SeatView::Booked { user_id: "user-b".into() });
    }

    #[test]
    fn test_other_seats_are_ignored() {
        let mut confirmed = pending(3, 3, "user-a");
        confirmed.status = BookingStatus::Confirmed;
        assert_eq!(SeatView::resolve([&confirmed], 3, 4, None), SeatView::Available);
    }

    #[test]
    fn test_seat_wire_shape() {
        let seat = Seat::new(2, 3, &SeatView::Booked { user_id: "u".into() });
        let wire = serde_json::to_value(&seat).unwrap();

        assert_eq!(wire["status"], "BOOKED");
        assert_eq!(wire["user_id"], "u");
        assert!(wire.get("lock_id").is_none());
    }
}
