use chrono::{DateTime, Utc};
use cinema_core::repository::BookingRepository;
use cinema_core::{Booking, BookingFilter, BookingStatus, StoreResult};
use cinema_shared::{BookingEvent, HubMessage, Topic};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};

use crate::deadline::bounded;
use crate::hub::HubHandle;
use crate::lifecycle::broadcast_seat;
use crate::lock_manager::SeatLockManager;
use crate::notifier::EventNotifier;
use crate::seat_view::SeatViewer;

/// Outcome counts for one pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepReport {
    pub examined: usize,
    pub timed_out: usize,
    /// Confirmed or cancelled between the scan and the update.
    pub already_final: usize,
    pub failed: usize,
}

enum Outcome {
    TimedOut,
    AlreadyFinal,
}

/// Moves pending bookings older than the lock TTL to TIMEOUT and frees their
/// seats. The conditional status update is what keeps it from clobbering a
/// confirm that lands concurrently.
pub struct ReconciliationSweeper {
    bookings: Arc<dyn BookingRepository>,
    locks: SeatLockManager,
    viewer: SeatViewer,
    hub: HubHandle,
    notifier: EventNotifier,
    interval: Duration,
    op_timeout: Duration,
}

impl ReconciliationSweeper {
    pub fn new(
        bookings: Arc<dyn BookingRepository>,
        locks: SeatLockManager,
        hub: HubHandle,
        notifier: EventNotifier,
        interval: Duration,
        op_timeout: Duration,
    ) -> Self {
        let viewer = SeatViewer::new(bookings.clone(), locks.clone(), op_timeout);
        Self {
            bookings,
            locks,
            viewer,
            hub,
            notifier,
            interval,
            op_timeout,
        }
    }

    /// Sweeps once per interval until `shutdown` flips. A failed pass is
    /// logged and retried on the next tick.
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) {
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // First tick fires immediately; skip it so startup is not a sweep.
        ticker.tick().await;
        info!("Reconciliation sweeper running every {:?}", self.interval);

        loop {
            tokio::select! {
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
                _ = ticker.tick() => {
                    if let Err(e) = self.sweep_once().await {
                        error!("Sweep pass failed: {}", e);
                    }
                }
            }
        }
        info!("Reconciliation sweeper stopped");
    }

    pub async fn sweep_once(&self) -> StoreResult<SweepReport> {
        self.sweep_at(Utc::now()).await
    }

    /// One pass with `now` as the reference time.
    pub async fn sweep_at(&self, now: DateTime<Utc>) -> StoreResult<SweepReport> {
        // A TTL reaching past the calendar's range means nothing is stale yet.
        let Some(cutoff) = self.locks.ttl_span().and_then(|ttl| now.checked_sub_signed(ttl)) else {
            return Ok(SweepReport::default());
        };
        let filter = BookingFilter::stale_pending(cutoff);
        let stale = bounded(self.op_timeout, self.bookings.find_by_filter(&filter)).await?;

        let mut report = SweepReport {
            examined: stale.len(),
            ..SweepReport::default()
        };
        for booking in &stale {
            match self.expire(booking).await {
                Ok(Outcome::TimedOut) => report.timed_out += 1,
                Ok(Outcome::AlreadyFinal) => report.already_final += 1,
                Err(e) => {
                    warn!("Could not time out booking {}: {}", booking.id, e);
                    report.failed += 1;
                }
            }
        }

        if report.examined > 0 {
            info!(
                "Sweep: {} stale, {} timed out, {} already final, {} failed",
                report.examined, report.timed_out, report.already_final, report.failed
            );
        }
        Ok(report)
    }

    async fn expire(&self, booking: &Booking) -> StoreResult<Outcome> {
        let seat = booking.seat();

        // Usually the TTL already removed it.
        if let Err(e) = self.locks.release(&seat, &booking.lock_id).await {
            debug!("Lock release for stale booking {} failed: {}", booking.id, e);
        }

        let applied = bounded(
            self.op_timeout,
            self.bookings
                .update_status_if(booking.id, BookingStatus::Pending, BookingStatus::Timeout, None),
        )
        .await?;
        if !applied {
            debug!("Booking {} left PENDING before the sweep reached it", booking.id);
            return Ok(Outcome::AlreadyFinal);
        }

        info!("Booking {} timed out, seat {} released", booking.id, seat);
        self.notifier
            .emit(BookingEvent::booking_timeout(
                &booking.id.to_string(),
                &booking.screening_id,
                booking.seat_row,
                booking.seat_col,
            ))
            .await;
        self.notifier
            .emit(BookingEvent::seat_released(&booking.screening_id, booking.seat_row, booking.seat_col))
            .await;
        broadcast_seat(&self.viewer, &self.hub, &seat).await;
        self.hub.publish(&Topic::admin(), &HubMessage::refresh());
        Ok(Outcome::TimedOut)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hub::Hub;
    use chrono::Duration as ChronoDuration;
    use cinema_core::{LockToken, SeatId};
    use cinema_store::memory::{InMemoryAudit, InMemoryBookings, InMemoryEventBus, InMemorySeatLocks};

    fn sweeper(bookings: Arc<InMemoryBookings>, ttl: Duration) -> ReconciliationSweeper {
        let (hub, _task) = Hub::spawn(16, 16);
        let locks = SeatLockManager::new(Arc::new(InMemorySeatLocks::new()), ttl, Duration::from_secs(1));
        let notifier = EventNotifier::new(
            Arc::new(InMemoryEventBus::default()),
            Arc::new(InMemoryAudit::new()),
            hub.clone(),
            Duration::from_secs(1),
        );
        ReconciliationSweeper::new(bookings, locks, hub, notifier, Duration::from_secs(30), Duration::from_secs(1))
    }

    #[tokio::test]
    async fn test_unrepresentable_ttl_sweeps_nothing() {
        let bookings = Arc::new(InMemoryBookings::new());
        let booking = Booking::pending(&SeatId::new("scr", 0, 0), "u", LockToken::generate());
        bookings.insert(&booking).await.unwrap();
        bookings.backdate(booking.id, Utc::now() - ChronoDuration::days(3650)).await;

        let report = sweeper(bookings.clone(), Duration::MAX).sweep_once().await.unwrap();
        assert_eq!(report, SweepReport::default());
        assert_eq!(bookings.all().await[0].status, BookingStatus::Pending);
    }

    #[tokio::test]
    async fn test_stale_booking_is_timed_out() {
        let bookings = Arc::new(InMemoryBookings::new());
        let booking = Booking::pending(&SeatId::new("scr", 0, 0), "u", LockToken::generate());
        bookings.insert(&booking).await.unwrap();
        bookings.backdate(booking.id, Utc::now() - ChronoDuration::seconds(301)).await;

        let report = sweeper(bookings.clone(), Duration::from_secs(300)).sweep_once().await.unwrap();
        assert_eq!(report.timed_out, 1);
        assert_eq!(bookings.all().await[0].status, BookingStatus::Timeout);
    }
}
