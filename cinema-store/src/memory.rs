//! In-process implementations of every store contract.
//!
//! Used by the single-process dev mode (event bus) and by tests across the
//! workspace. Each store can be switched to "unavailable" to exercise the
//! transient-failure paths.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use cinema_core::events::{Delivery, EventBus, EventSubscription};
use cinema_core::repository::{AuditRepository, BookingRepository, ScreeningRepository};
use cinema_core::{
    Booking, BookingFilter, BookingStatus, LockToken, Screening, SeatId, SeatLockStore, StoreError,
    StoreResult,
};
use cinema_shared::BookingEvent;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::sync::{broadcast, Mutex};
use tokio::time::Instant;
use tracing::warn;
use uuid::Uuid;

fn check_available(flag: &AtomicBool, store: &str) -> StoreResult<()> {
    if flag.load(Ordering::SeqCst) {
        return Err(StoreError::Unavailable(format!("{} offline", store)));
    }
    Ok(())
}

// ============================================================================
// Seat locks
// ============================================================================

/// Lock store with TTL measured on the tokio clock, so paused-time tests can
/// advance past expiry.
#[derive(Default)]
pub struct InMemorySeatLocks {
    entries: Mutex<HashMap<SeatId, (LockToken, Instant)>>,
    unavailable: AtomicBool,
}

impl InMemorySeatLocks {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// Drops a lock regardless of owner, as if its TTL had fired.
    pub async fn force_expire(&self, seat: &SeatId) {
        self.entries.lock().await.remove(seat);
    }

    /// Remaining lifetime of a live lock.
    pub async fn ttl(&self, seat: &SeatId) -> Option<Duration> {
        let now = Instant::now();
        let entries = self.entries.lock().await;
        entries
            .get(seat)
            .filter(|(_, deadline)| *deadline > now)
            .map(|(_, deadline)| *deadline - now)
    }
}

#[async_trait]
impl SeatLockStore for InMemorySeatLocks {
    async fn set_if_absent(&self, seat: &SeatId, token: &LockToken, ttl: Duration) -> StoreResult<bool> {
        check_available(&self.unavailable, "lock store")?;
        let now = Instant::now();
        let mut entries = self.entries.lock().await;
        if let Some((_, deadline)) = entries.get(seat) {
            if *deadline > now {
                return Ok(false);
            }
        }
        entries.insert(seat.clone(), (token.clone(), now + ttl));
        Ok(true)
    }

    async fn compare_and_delete(&self, seat: &SeatId, token: &LockToken) -> StoreResult<bool> {
        check_available(&self.unavailable, "lock store")?;
        let now = Instant::now();
        let mut entries = self.entries.lock().await;
        match entries.get(seat) {
            Some((owner, deadline)) if owner == token && *deadline > now => {
                entries.remove(seat);
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn compare_and_expire(&self, seat: &SeatId, token: &LockToken, ttl: Duration) -> StoreResult<bool> {
        check_available(&self.unavailable, "lock store")?;
        let now = Instant::now();
        let mut entries = self.entries.lock().await;
        match entries.get_mut(seat) {
            Some((owner, deadline)) if owner == token && *deadline > now => {
                *deadline = now + ttl;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn get(&self, seat: &SeatId) -> StoreResult<Option<LockToken>> {
        check_available(&self.unavailable, "lock store")?;
        let now = Instant::now();
        let entries = self.entries.lock().await;
        Ok(entries
            .get(seat)
            .filter(|(_, deadline)| *deadline > now)
            .map(|(token, _)| token.clone()))
    }
}

// ============================================================================
// Booking records
// ============================================================================

#[derive(Default)]
pub struct InMemoryBookings {
    rows: Mutex<HashMap<Uuid, Booking>>,
    unavailable: AtomicBool,
}

impl InMemoryBookings {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// Rewrites a booking's creation time, e.g. to age it past the lock TTL.
    pub async fn backdate(&self, id: Uuid, created_at: DateTime<Utc>) {
        if let Some(booking) = self.rows.lock().await.get_mut(&id) {
            booking.created_at = created_at;
        }
    }

    pub async fn all(&self) -> Vec<Booking> {
        self.rows.lock().await.values().cloned().collect()
    }
}

#[async_trait]
impl BookingRepository for InMemoryBookings {
    async fn insert(&self, booking: &Booking) -> StoreResult<()> {
        check_available(&self.unavailable, "booking store")?;
        let mut rows = self.rows.lock().await;
        let live_on_seat = rows.values().any(|b| {
            b.screening_id == booking.screening_id
                && b.seat_row == booking.seat_row
                && b.seat_col == booking.seat_col
                && matches!(b.status, BookingStatus::Pending | BookingStatus::Confirmed)
        });
        if live_on_seat || rows.contains_key(&booking.id) {
            return Err(StoreError::Duplicate(format!("live booking exists for {}", booking.seat())));
        }
        rows.insert(booking.id, booking.clone());
        Ok(())
    }

    async fn find_by_id(&self, id: Uuid) -> StoreResult<Option<Booking>> {
        check_available(&self.unavailable, "booking store")?;
        Ok(self.rows.lock().await.get(&id).cloned())
    }

    async fn find_by_filter(&self, filter: &BookingFilter) -> StoreResult<Vec<Booking>> {
        check_available(&self.unavailable, "booking store")?;
        let rows = self.rows.lock().await;
        let mut found: Vec<Booking> = rows.values().filter(|b| filter.matches(b)).cloned().collect();
        found.sort_by_key(|b| b.created_at);
        Ok(found)
    }

    async fn update_status_if(
        &self,
        id: Uuid,
        expected: BookingStatus,
        next: BookingStatus,
        confirmed_at: Option<DateTime<Utc>>,
    ) -> StoreResult<bool> {
        check_available(&self.unavailable, "booking store")?;
        let mut rows = self.rows.lock().await;
        match rows.get_mut(&id) {
            Some(booking) if booking.status == expected => {
                booking.status = next;
                if confirmed_at.is_some() {
                    booking.confirmed_at = confirmed_at;
                }
                Ok(true)
            }
            _ => Ok(false),
        }
    }
}

// ============================================================================
// Screenings
// ============================================================================

#[derive(Default)]
pub struct InMemoryScreenings {
    rows: Mutex<HashMap<String, Screening>>,
}

impl InMemoryScreenings {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn add(&self, screening: Screening) {
        self.rows.lock().await.insert(screening.id.clone(), screening);
    }
}

#[async_trait]
impl ScreeningRepository for InMemoryScreenings {
    async fn get_screening(&self, id: &str) -> StoreResult<Option<Screening>> {
        Ok(self.rows.lock().await.get(id).cloned())
    }
}

// ============================================================================
// Audit trail
// ============================================================================

#[derive(Default)]
pub struct InMemoryAudit {
    entries: Mutex<Vec<(String, Value)>>,
    unavailable: AtomicBool,
}

impl InMemoryAudit {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    pub async fn entries(&self) -> Vec<(String, Value)> {
        self.entries.lock().await.clone()
    }
}

#[async_trait]
impl AuditRepository for InMemoryAudit {
    async fn insert_audit(&self, event: &str, payload: &Value) -> StoreResult<()> {
        check_available(&self.unavailable, "audit store")?;
        self.entries.lock().await.push((event.to_string(), payload.clone()));
        Ok(())
    }
}

// ============================================================================
// Event bus
// ============================================================================

/// Single-process event bus on a tokio broadcast channel.
#[derive(Clone)]
pub struct InMemoryEventBus {
    tx: broadcast::Sender<BookingEvent>,
}

impl InMemoryEventBus {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    pub fn receiver_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl Default for InMemoryEventBus {
    fn default() -> Self {
        Self::new(256)
    }
}

#[async_trait]
impl EventBus for InMemoryEventBus {
    async fn publish(&self, event: &BookingEvent) -> StoreResult<()> {
        // No receivers just means nobody is listening yet.
        let _ = self.tx.send(event.clone());
        Ok(())
    }

    /// One process, so both deliveries see every event.
    async fn subscribe(&self, _delivery: Delivery) -> StoreResult<Box<dyn EventSubscription>> {
        Ok(Box::new(BroadcastSubscription { rx: self.tx.subscribe() }))
    }
}

struct BroadcastSubscription {
    rx: broadcast::Receiver<BookingEvent>,
}

#[async_trait]
impl EventSubscription for BroadcastSubscription {
    async fn recv(&mut self) -> Option<BookingEvent> {
        loop {
            match self.rx.recv().await {
                Ok(event) => return Some(event),
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!("Event subscriber lagged, {} events skipped", skipped);
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cinema_shared::EventType;

    #[tokio::test(start_paused = true)]
    async fn test_lock_expires_on_tokio_clock() {
        let locks = InMemorySeatLocks::new();
        let seat = SeatId::new("scr", 0, 0);
        let token = LockToken::generate();

        assert!(locks.set_if_absent(&seat, &token, Duration::from_secs(5)).await.unwrap());
        assert!(!locks
            .set_if_absent(&seat, &LockToken::generate(), Duration::from_secs(5))
            .await
            .unwrap());

        tokio::time::advance(Duration::from_secs(6)).await;
        assert_eq!(locks.get(&seat).await.unwrap(), None);
        assert!(!locks.compare_and_delete(&seat, &token).await.unwrap());
        assert!(locks
            .set_if_absent(&seat, &LockToken::generate(), Duration::from_secs(5))
            .await
            .unwrap());
    }

    #[tokio::test]
    async fn test_unavailable_lock_store_errors_instead_of_absent() {
        let locks = InMemorySeatLocks::new();
        locks.set_unavailable(true);
        let result = locks.get(&SeatId::new("scr", 0, 0)).await;
        assert!(matches!(result, Err(StoreError::Unavailable(_))));
    }

    #[tokio::test]
    async fn test_second_live_booking_on_seat_is_duplicate() {
        let bookings = InMemoryBookings::new();
        let seat = SeatId::new("scr", 1, 2);
        let first = Booking::pending(&seat, "a", LockToken::generate());
        bookings.insert(&first).await.unwrap();

        let second = Booking::pending(&seat, "b", LockToken::generate());
        assert!(matches!(bookings.insert(&second).await, Err(StoreError::Duplicate(_))));

        // Once the first is finalized as TIMEOUT the seat is free again.
        assert!(bookings
            .update_status_if(first.id, BookingStatus::Pending, BookingStatus::Timeout, None)
            .await
            .unwrap());
        bookings.insert(&second).await.unwrap();
    }

    #[tokio::test]
    async fn test_conditional_update_applies_once() {
        let bookings = InMemoryBookings::new();
        let booking = Booking::pending(&SeatId::new("scr", 0, 0), "a", LockToken::generate());
        bookings.insert(&booking).await.unwrap();

        let now = Utc::now();
        assert!(bookings
            .update_status_if(booking.id, BookingStatus::Pending, BookingStatus::Confirmed, Some(now))
            .await
            .unwrap());
        assert!(!bookings
            .update_status_if(booking.id, BookingStatus::Pending, BookingStatus::Timeout, None)
            .await
            .unwrap());

        let stored = bookings.find_by_id(booking.id).await.unwrap().unwrap();
        assert_eq!(stored.status, BookingStatus::Confirmed);
        assert_eq!(stored.confirmed_at, Some(now));
    }

    #[tokio::test]
    async fn test_event_bus_delivers_to_subscribers() {
        let bus = InMemoryEventBus::default();
        let mut sub = bus.subscribe(Delivery::Fanout).await.unwrap();

        bus.publish(&BookingEvent::seat_released("scr", 0, 1)).await.unwrap();
        let event = sub.recv().await.unwrap();
        assert_eq!(event.event_type, EventType::SeatReleased);
    }
}
