//! Seat-reservation concurrency control: per-seat locks, the booking
//! lifecycle layered on them, the reconciliation sweep, the realtime hub and
//! event fan-out.

mod deadline;
pub mod hub;
pub mod lifecycle;
pub mod lock_manager;
pub mod notifier;
pub mod seat_view;
pub mod sweeper;

pub use hub::{Hub, HubClosed, HubHandle, Payload, SubscriberId, Subscription};
pub use lifecycle::{BookingService, LockHandle, Reservation};
pub use lock_manager::{Acquire, SeatLockManager};
pub use notifier::EventNotifier;
pub use seat_view::{SeatBookedInfo, SeatDetails, SeatLockInfo, SeatViewer};
pub use sweeper::{ReconciliationSweeper, SweepReport};

use cinema_core::events::EventBus;
use cinema_core::repository::{AuditRepository, BookingRepository, ScreeningRepository};
use cinema_core::SeatLockStore;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;

/// Tunables for the engine. Lock TTL doubles as the sweeper's staleness cutoff.
#[derive(Debug, Clone)]
pub struct Settings {
    pub lock_ttl: Duration,
    pub sweep_interval: Duration,
    pub store_timeout: Duration,
    pub hub_queue_capacity: usize,
    pub subscriber_queue_capacity: usize,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            lock_ttl: Duration::from_secs(300),
            sweep_interval: Duration::from_secs(30),
            store_timeout: Duration::from_millis(3000),
            hub_queue_capacity: 256,
            subscriber_queue_capacity: 256,
        }
    }
}

/// The external stores the engine talks to.
#[derive(Clone)]
pub struct Collaborators {
    pub screenings: Arc<dyn ScreeningRepository>,
    pub bookings: Arc<dyn BookingRepository>,
    pub locks: Arc<dyn SeatLockStore>,
    pub audit: Arc<dyn AuditRepository>,
    pub bus: Arc<dyn EventBus>,
}

/// Everything wired together. The notifier and sweeper are returned unstarted
/// so the caller owns their tasks and shutdown.
pub struct BookingEngine {
    pub service: Arc<BookingService>,
    pub hub: HubHandle,
    pub hub_task: JoinHandle<()>,
    pub notifier: EventNotifier,
    pub sweeper: ReconciliationSweeper,
}

impl BookingEngine {
    /// Spawns the hub, so it must be called inside a tokio runtime.
    pub fn start(collaborators: Collaborators, settings: &Settings) -> Self {
        let Collaborators {
            screenings,
            bookings,
            locks,
            audit,
            bus,
        } = collaborators;

        let (hub, hub_task) = Hub::spawn(settings.hub_queue_capacity, settings.subscriber_queue_capacity);
        let locks = SeatLockManager::new(locks, settings.lock_ttl, settings.store_timeout);
        let notifier = EventNotifier::new(bus, audit, hub.clone(), settings.store_timeout);

        let service = BookingService::new(
            screenings,
            bookings.clone(),
            locks.clone(),
            hub.clone(),
            notifier.clone(),
            settings.store_timeout,
        );
        let sweeper = ReconciliationSweeper::new(
            bookings,
            locks,
            hub.clone(),
            notifier.clone(),
            settings.sweep_interval,
            settings.store_timeout,
        );

        Self {
            service: Arc::new(service),
            hub,
            hub_task,
            notifier,
            sweeper,
        }
    }
}
