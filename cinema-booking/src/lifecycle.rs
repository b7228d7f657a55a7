use chrono::Utc;
use cinema_core::repository::{BookingRepository, ScreeningRepository};
use cinema_core::{
    Booking, BookingError, BookingResult, BookingStatus, LockToken, Screening, Seat, SeatId, SeatView, StoreError,
};
use cinema_shared::{BookingEvent, HubMessage, Topic};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::deadline::bounded;
use crate::hub::HubHandle;
use crate::lock_manager::{Acquire, SeatLockManager};
use crate::notifier::EventNotifier;
use crate::seat_view::{SeatDetails, SeatViewer};

/// What the caller needs to come back and confirm.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LockHandle {
    pub token: LockToken,
    pub expires_in_seconds: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Reservation {
    pub booking_id: Uuid,
    pub lock: LockHandle,
}

/// Releases a just-acquired lock if the reservation that took it never
/// finishes, including when the request future is dropped mid-flight.
struct ReleaseGuard {
    locks: SeatLockManager,
    seat: SeatId,
    token: LockToken,
    armed: bool,
}

impl ReleaseGuard {
    fn new(locks: SeatLockManager, seat: SeatId, token: LockToken) -> Self {
        Self {
            locks,
            seat,
            token,
            armed: true,
        }
    }

    fn disarm(mut self) {
        self.armed = false;
    }

    /// Compensate inline. A failure here is logged only; the caller is about
    /// to surface the original error. Stays armed until the release returns,
    /// so a cancellation mid-release still hands the lock back.
    async fn release_now(mut self) {
        let released = self.locks.release(&self.seat, &self.token).await;
        self.armed = false;
        match released {
            Ok(_) => debug!("Compensated: released lock on {}", self.seat),
            Err(e) => warn!("Compensating release of {} failed: {}", self.seat, e),
        }
    }
}

impl Drop for ReleaseGuard {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            return;
        };
        let locks = self.locks.clone();
        let seat = self.seat.clone();
        let token = self.token.clone();
        runtime.spawn(async move {
            if let Err(e) = locks.release(&seat, &token).await {
                warn!("Release of {} after abandoned reservation failed: {}", seat, e);
            }
        });
    }
}

/// Booking lifecycle controller: reserve and confirm.
///
/// Both entry points are single-attempt and never wait for a lock to free up.
pub struct BookingService {
    screenings: Arc<dyn ScreeningRepository>,
    bookings: Arc<dyn BookingRepository>,
    locks: SeatLockManager,
    viewer: SeatViewer,
    hub: HubHandle,
    notifier: EventNotifier,
    op_timeout: Duration,
}

impl BookingService {
    pub fn new(
        screenings: Arc<dyn ScreeningRepository>,
        bookings: Arc<dyn BookingRepository>,
        locks: SeatLockManager,
        hub: HubHandle,
        notifier: EventNotifier,
        op_timeout: Duration,
    ) -> Self {
        let viewer = SeatViewer::new(bookings.clone(), locks.clone(), op_timeout);
        Self {
            screenings,
            bookings,
            locks,
            viewer,
            hub,
            notifier,
            op_timeout,
        }
    }

    pub fn viewer(&self) -> &SeatViewer {
        &self.viewer
    }

    async fn load_screening(&self, screening_id: &str) -> BookingResult<Screening> {
        bounded(self.op_timeout, self.screenings.get_screening(screening_id))
            .await?
            .ok_or_else(|| BookingError::NotFound(format!("screening {}", screening_id)))
    }

    pub async fn reserve(&self, screening_id: &str, row: u32, col: u32, user_id: &str) -> BookingResult<Reservation> {
        let screening = self.load_screening(screening_id).await?;
        let seat = screening.seat(row, col)?;

        let token = match self.locks.acquire(&seat).await {
            Ok(Acquire::Acquired(token)) => token,
            Ok(Acquire::AlreadyHeld) => {
                debug!("Seat {} already held, {} must pick another", seat, user_id);
                return Err(BookingError::Conflict);
            }
            Err(e) => {
                warn!("Lock acquire for {} failed: {}", seat, e);
                self.notifier
                    .emit(BookingEvent::lock_failed(&seat.screening_id, seat.row, seat.col, &e.to_string()))
                    .await;
                return Err(e.into());
            }
        };
        let guard = ReleaseGuard::new(self.locks.clone(), seat.clone(), token.clone());

        let booking = Booking::pending(&seat, user_id, token.clone());
        if let Err(e) = bounded(self.op_timeout, self.bookings.insert(&booking)).await {
            guard.release_now().await;
            return Err(match e {
                // Lock was free but a live booking still sits on the seat
                // (confirmed, or pending and not yet swept).
                StoreError::Duplicate(_) => BookingError::Conflict,
                other => other.into(),
            });
        }
        guard.disarm();

        info!("Seat {} locked for {} (booking {})", seat, user_id, booking.id);
        self.broadcast_seat(&seat).await;

        Ok(Reservation {
            booking_id: booking.id,
            lock: LockHandle {
                token,
                expires_in_seconds: self.locks.ttl().as_secs(),
            },
        })
    }

    pub async fn confirm(&self, booking_id: Uuid, user_id: &str) -> BookingResult<Booking> {
        let booking = bounded(self.op_timeout, self.bookings.find_by_id(booking_id))
            .await?
            .ok_or_else(|| BookingError::NotFound(format!("booking {}", booking_id)))?;

        if booking.user_id != user_id {
            return Err(BookingError::Forbidden("not your booking".to_string()));
        }
        if !booking.is_pending() {
            return Err(BookingError::AlreadyFinalized { status: booking.status });
        }

        // The stored token must still be the live owner; otherwise the lock
        // lapsed (or was reassigned) since the reservation.
        let seat = booking.seat();
        let live = self.locks.current_owner(&seat).await?;
        if live.as_ref() != Some(&booking.lock_id) {
            info!("Lock on {} expired before booking {} was confirmed", seat, booking.id);
            return Err(BookingError::LockExpired);
        }

        let confirmed_at = Utc::now();
        let applied = bounded(
            self.op_timeout,
            self.bookings
                .update_status_if(booking.id, BookingStatus::Pending, BookingStatus::Confirmed, Some(confirmed_at)),
        )
        .await?;
        if !applied {
            // Lost the race to the sweeper (or an external cancel).
            let status = bounded(self.op_timeout, self.bookings.find_by_id(booking.id))
                .await?
                .map_or(BookingStatus::Timeout, |b| b.status);
            return Err(BookingError::AlreadyFinalized { status });
        }

        match self.locks.release(&seat, &booking.lock_id).await {
            Ok(true) => {}
            Ok(false) => debug!("Lock on {} already gone at confirm", seat),
            Err(e) => warn!("Releasing lock on {} after confirm failed: {}", seat, e),
        }

        info!("Booking {} confirmed for {}", booking.id, user_id);
        self.notifier
            .emit(BookingEvent::booking_success(
                &booking.screening_id,
                user_id,
                &booking.id.to_string(),
                booking.seat_row,
                booking.seat_col,
            ))
            .await;
        self.broadcast_seat(&seat).await;

        Ok(Booking {
            status: BookingStatus::Confirmed,
            confirmed_at: Some(confirmed_at),
            ..booking
        })
    }

    pub async fn compute_seat_view(&self, screening_id: &str, row: u32, col: u32) -> BookingResult<SeatView> {
        let screening = self.load_screening(screening_id).await?;
        let seat = screening.seat(row, col)?;
        Ok(self.viewer.compute(&seat).await?)
    }

    pub async fn seat_map(&self, screening_id: &str) -> BookingResult<Vec<Vec<Seat>>> {
        let screening = self.load_screening(screening_id).await?;
        Ok(self.viewer.seat_map(&screening).await?)
    }

    pub async fn seat_details(&self, screening_id: &str) -> BookingResult<SeatDetails> {
        let screening = self.load_screening(screening_id).await?;
        Ok(self.viewer.seat_details(&screening).await?)
    }

    /// Recomputes a seat and pushes it to the screening's room. The mutation
    /// already happened, so failures are only logged.
    async fn broadcast_seat(&self, seat: &SeatId) {
        broadcast_seat(&self.viewer, &self.hub, seat).await;
    }
}

pub(crate) async fn broadcast_seat(viewer: &SeatViewer, hub: &HubHandle, seat: &SeatId) {
    let view = match viewer.compute_seat(seat).await {
        Ok(view) => view,
        Err(e) => {
            warn!("Could not recompute {} for broadcast: {}", seat, e);
            return;
        }
    };
    match HubMessage::seat_update(&view) {
        Ok(message) => {
            hub.publish(&Topic::screening(&seat.screening_id), &message);
        }
        Err(e) => warn!("Could not encode seat update for {}: {}", seat, e),
    }
}
