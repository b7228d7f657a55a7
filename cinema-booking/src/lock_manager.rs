use chrono::Duration as ChronoDuration;
use cinema_core::{LockToken, SeatId, SeatLockStore, StoreResult};
use std::sync::Arc;
use std::time::Duration;

use crate::deadline::bounded;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Acquire {
    Acquired(LockToken),
    /// Someone else owns the seat right now. Not an error.
    AlreadyHeld,
}

/// Best-effort distributed mutex, one lock per seat.
///
/// All exclusion is delegated to the store's atomic primitives; nothing here
/// holds in-process state. Store failures surface as errors and are never
/// read as "no lock".
#[derive(Clone)]
pub struct SeatLockManager {
    store: Arc<dyn SeatLockStore>,
    ttl: Duration,
    op_timeout: Duration,
}

impl SeatLockManager {
    pub fn new(store: Arc<dyn SeatLockStore>, ttl: Duration, op_timeout: Duration) -> Self {
        Self { store, ttl, op_timeout }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// The TTL as a calendar span; `None` if it does not fit one.
    pub fn ttl_span(&self) -> Option<ChronoDuration> {
        ChronoDuration::from_std(self.ttl).ok()
    }

    pub async fn acquire(&self, seat: &SeatId) -> StoreResult<Acquire> {
        let token = LockToken::generate();
        let set = bounded(self.op_timeout, self.store.set_if_absent(seat, &token, self.ttl)).await?;
        Ok(if set { Acquire::Acquired(token) } else { Acquire::AlreadyHeld })
    }

    /// Deletes the lock only while `token` still owns it.
    pub async fn release(&self, seat: &SeatId, token: &LockToken) -> StoreResult<bool> {
        bounded(self.op_timeout, self.store.compare_and_delete(seat, token)).await
    }

    /// Resets the expiry to `ttl`, with the same ownership check as `release`.
    pub async fn extend(&self, seat: &SeatId, token: &LockToken, ttl: Duration) -> StoreResult<bool> {
        bounded(self.op_timeout, self.store.compare_and_expire(seat, token, ttl)).await
    }

    pub async fn current_owner(&self, seat: &SeatId) -> StoreResult<Option<LockToken>> {
        bounded(self.op_timeout, self.store.get(seat)).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cinema_core::StoreError;
    use cinema_store::memory::InMemorySeatLocks;

    fn manager(locks: Arc<InMemorySeatLocks>) -> SeatLockManager {
        SeatLockManager::new(locks, Duration::from_secs(300), Duration::from_secs(1))
    }

    #[test]
    fn test_ttl_span_does_not_truncate() {
        let locks = manager(Arc::new(InMemorySeatLocks::new()));
        assert_eq!(locks.ttl_span(), Some(ChronoDuration::seconds(300)));

        let huge = SeatLockManager::new(Arc::new(InMemorySeatLocks::new()), Duration::MAX, Duration::from_secs(1));
        assert_eq!(huge.ttl_span(), None);
    }

    #[tokio::test]
    async fn test_acquire_is_exclusive() {
        let locks = manager(Arc::new(InMemorySeatLocks::new()));
        let seat = SeatId::new("scr", 2, 3);

        let first = locks.acquire(&seat).await.unwrap();
        let Acquire::Acquired(token) = first else {
            panic!("first acquire should win");
        };
        assert_eq!(locks.acquire(&seat).await.unwrap(), Acquire::AlreadyHeld);
        assert_eq!(locks.current_owner(&seat).await.unwrap(), Some(token));
    }

    #[tokio::test]
    async fn test_release_requires_matching_token() {
        let locks = manager(Arc::new(InMemorySeatLocks::new()));
        let seat = SeatId::new("scr", 0, 0);
        let Acquire::Acquired(token) = locks.acquire(&seat).await.unwrap() else {
            panic!("acquire should win");
        };

        assert!(!locks.release(&seat, &LockToken::generate()).await.unwrap());
        assert!(locks.current_owner(&seat).await.unwrap().is_some());
        assert!(locks.release(&seat, &token).await.unwrap());
        assert!(!locks.release(&seat, &token).await.unwrap());
        assert_eq!(locks.current_owner(&seat).await.unwrap(), None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_extend_is_ownership_checked() {
        let store = Arc::new(InMemorySeatLocks::new());
        let locks = manager(store.clone());
        let seat = SeatId::new("scr", 1, 1);
        let Acquire::Acquired(token) = locks.acquire(&seat).await.unwrap() else {
            panic!("acquire should win");
        };

        assert!(!locks
            .extend(&seat, &LockToken::generate(), Duration::from_secs(900))
            .await
            .unwrap());
        assert!(locks.extend(&seat, &token, Duration::from_secs(900)).await.unwrap());
        assert!(store.ttl(&seat).await.unwrap() > Duration::from_secs(300));
    }

    #[tokio::test]
    async fn test_store_failure_is_not_absence() {
        let store = Arc::new(InMemorySeatLocks::new());
        let locks = manager(store.clone());
        store.set_unavailable(true);

        let seat = SeatId::new("scr", 0, 0);
        assert!(matches!(locks.current_owner(&seat).await, Err(StoreError::Unavailable(_))));
        assert!(matches!(locks.acquire(&seat).await, Err(StoreError::Unavailable(_))));
    }
}
