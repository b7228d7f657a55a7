use chrono::{DateTime, Utc};
use cinema_core::repository::BookingRepository;
use cinema_core::{Booking, BookingFilter, BookingStatus, LockToken, Screening, Seat, SeatId, SeatView, StoreResult};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

use crate::deadline::bounded;
use crate::lock_manager::SeatLockManager;

/// A seat currently held by a live lock.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SeatLockInfo {
    pub row: u32,
    pub col: u32,
    pub user_id: String,
    pub booking_id: Uuid,
    pub locked_at: DateTime<Utc>,
    pub unlocks_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SeatBookedInfo {
    pub row: u32,
    pub col: u32,
    pub user_id: String,
    pub booked_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SeatDetails {
    pub locked: Vec<SeatLockInfo>,
    pub booked: Vec<SeatBookedInfo>,
}

/// Computes seat views on demand: one booking scan per screening plus one
/// lock lookup per seat that has a pending booking.
#[derive(Clone)]
pub struct SeatViewer {
    bookings: Arc<dyn BookingRepository>,
    locks: SeatLockManager,
    op_timeout: Duration,
}

impl SeatViewer {
    pub fn new(bookings: Arc<dyn BookingRepository>, locks: SeatLockManager, op_timeout: Duration) -> Self {
        Self {
            bookings,
            locks,
            op_timeout,
        }
    }

    async fn screening_bookings(&self, screening_id: &str) -> StoreResult<Vec<Booking>> {
        let filter = BookingFilter::for_screening(screening_id);
        bounded(self.op_timeout, self.bookings.find_by_filter(&filter)).await
    }

    pub async fn compute(&self, seat: &SeatId) -> StoreResult<SeatView> {
        let bookings = self.screening_bookings(&seat.screening_id).await?;
        let on_seat: Vec<&Booking> = bookings
            .iter()
            .filter(|b| b.seat_row == seat.row && b.seat_col == seat.col)
            .collect();

        let booked = on_seat.iter().any(|b| b.status == BookingStatus::Confirmed);
        let pending = on_seat.iter().any(|b| b.is_pending());
        let live = if pending && !booked {
            self.locks.current_owner(seat).await?
        } else {
            None
        };

        Ok(SeatView::resolve(on_seat, seat.row, seat.col, live.as_ref()))
    }

    pub async fn compute_seat(&self, seat: &SeatId) -> StoreResult<Seat> {
        let view = self.compute(seat).await?;
        Ok(Seat::new(seat.row, seat.col, &view))
    }

    /// Live owners for every seat of the screening that has a pending booking.
    async fn live_owners(&self, screening_id: &str, bookings: &[Booking]) -> StoreResult<HashMap<(u32, u32), LockToken>> {
        let mut owners = HashMap::new();
        for booking in bookings.iter().filter(|b| b.is_pending()) {
            let cell = (booking.seat_row, booking.seat_col);
            if owners.contains_key(&cell) {
                continue;
            }
            let seat = SeatId::new(screening_id, cell.0, cell.1);
            if let Some(token) = self.locks.current_owner(&seat).await? {
                owners.insert(cell, token);
            }
        }
        Ok(owners)
    }

    /// Whole grid, row-major.
    pub async fn seat_map(&self, screening: &Screening) -> StoreResult<Vec<Vec<Seat>>> {
        let bookings = self.screening_bookings(&screening.id).await?;
        let owners = self.live_owners(&screening.id, &bookings).await?;

        let mut by_cell: HashMap<(u32, u32), Vec<&Booking>> = HashMap::new();
        for booking in &bookings {
            by_cell.entry((booking.seat_row, booking.seat_col)).or_default().push(booking);
        }

        let grid = (0..screening.rows)
            .map(|row| {
                (0..screening.cols)
                    .map(|col| {
                        let view = match by_cell.get(&(row, col)) {
                            Some(cell) => SeatView::resolve(cell.iter().copied(), row, col, owners.get(&(row, col))),
                            None => SeatView::Available,
                        };
                        Seat::new(row, col, &view)
                    })
                    .collect()
            })
            .collect();
        Ok(grid)
    }

    /// Who holds or owns which seat, and since when.
    pub async fn seat_details(&self, screening: &Screening) -> StoreResult<SeatDetails> {
        let bookings = self.screening_bookings(&screening.id).await?;
        let owners = self.live_owners(&screening.id, &bookings).await?;
        let ttl = self.locks.ttl_span();

        let mut details = SeatDetails::default();
        for booking in &bookings {
            match booking.status {
                BookingStatus::Confirmed => details.booked.push(SeatBookedInfo {
                    row: booking.seat_row,
                    col: booking.seat_col,
                    user_id: booking.user_id.clone(),
                    booked_at: booking.confirmed_at.unwrap_or(booking.created_at),
                }),
                BookingStatus::Pending
                    if owners.get(&(booking.seat_row, booking.seat_col)) == Some(&booking.lock_id) =>
                {
                    details.locked.push(SeatLockInfo {
                        row: booking.seat_row,
                        col: booking.seat_col,
                        user_id: booking.user_id.clone(),
                        booking_id: booking.id,
                        locked_at: booking.created_at,
                        unlocks_at: ttl
                            .and_then(|ttl| booking.created_at.checked_add_signed(ttl))
                            .unwrap_or(DateTime::<Utc>::MAX_UTC),
                    })
                }
                _ => {}
            }
        }
        Ok(details)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration as ChronoDuration;
    use crate::lock_manager::Acquire;
    use cinema_core::SeatStatus;
    use cinema_store::memory::{InMemoryBookings, InMemorySeatLocks};

    struct Fixture {
        bookings: Arc<InMemoryBookings>,
        locks: Arc<InMemorySeatLocks>,
        manager: SeatLockManager,
        viewer: SeatViewer,
    }

    fn fixture() -> Fixture {
        let bookings = Arc::new(InMemoryBookings::new());
        let locks = Arc::new(InMemorySeatLocks::new());
        let manager = SeatLockManager::new(locks.clone(), Duration::from_secs(300), Duration::from_secs(1));
        let viewer = SeatViewer::new(bookings.clone(), manager.clone(), Duration::from_secs(1));
        Fixture {
            bookings,
            locks,
            manager,
            viewer,
        }
    }

    fn screening(rows: u32, cols: u32) -> Screening {
        Screening {
            id: "scr".into(),
            movie_id: "m".into(),
            movie_name: "Movie".into(),
            screen_at: Utc::now(),
            rows,
            cols,
            created_at: Utc::now(),
        }
    }

    async fn hold(f: &Fixture, seat: &SeatId, user: &str) -> Booking {
        let Acquire::Acquired(token) = f.manager.acquire(seat).await.unwrap() else {
            panic!("seat should be free");
        };
        let booking = Booking::pending(seat, user, token);
        f.bookings.insert(&booking).await.unwrap();
        booking
    }

    #[tokio::test]
    async fn test_view_follows_lock_liveness() {
        let f = fixture();
        let seat = SeatId::new("scr", 1, 2);
        assert_eq!(f.viewer.compute(&seat).await.unwrap(), SeatView::Available);

        let booking = hold(&f, &seat, "user-a").await;
        assert_eq!(
            f.viewer.compute(&seat).await.unwrap(),
            SeatView::Locked {
                token: booking.lock_id.clone(),
                user_id: "user-a".into()
            }
        );

        f.locks.force_expire(&seat).await;
        assert_eq!(f.viewer.compute(&seat).await.unwrap(), SeatView::Available);
    }

    #[tokio::test]
    async fn test_seat_map_marks_each_cell() {
        let f = fixture();
        let locked = hold(&f, &SeatId::new("scr", 0, 1), "user-a").await;
        let booked = hold(&f, &SeatId::new("scr", 1, 0), "user-b").await;
        f.bookings
            .update_status_if(booked.id, BookingStatus::Pending, BookingStatus::Confirmed, Some(Utc::now()))
            .await
            .unwrap();

        let map = f.viewer.seat_map(&screening(2, 2)).await.unwrap();
        assert_eq!(map.len(), 2);
        assert_eq!(map[0][0].status, SeatStatus::Available);
        assert_eq!(map[0][1].status, SeatStatus::Locked);
        assert_eq!(map[0][1].lock_id.as_deref(), Some(locked.lock_id.as_str()));
        assert_eq!(map[1][0].status, SeatStatus::Booked);
        assert_eq!(map[1][1].status, SeatStatus::Available);
    }

    #[tokio::test]
    async fn test_seat_details_lists_live_locks_and_bookings() {
        let f = fixture();
        let locked = hold(&f, &SeatId::new("scr", 0, 0), "user-a").await;
        let stale = hold(&f, &SeatId::new("scr", 0, 1), "user-b").await;
        f.locks.force_expire(&stale.seat()).await;

        let details = f.viewer.seat_details(&screening(2, 2)).await.unwrap();
        assert_eq!(details.locked.len(), 1);
        assert_eq!(details.locked[0].booking_id, locked.id);
        assert_eq!(
            details.locked[0].unlocks_at - details.locked[0].locked_at,
            ChronoDuration::seconds(300)
        );
        assert!(details.booked.is_empty());
    }
}
