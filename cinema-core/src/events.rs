use async_trait::async_trait;
use cinema_shared::BookingEvent;

use crate::error::StoreResult;

/// How a subscription shares events with other processes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    /// One subscriber across all processes sees each event (audit trail).
    Shared,
    /// Every process sees every event (observer notifications).
    Fanout,
}

/// Shared pub/sub transport for lifecycle events.
#[async_trait]
pub trait EventBus: Send + Sync {
    async fn publish(&self, event: &BookingEvent) -> StoreResult<()>;

    async fn subscribe(&self, delivery: Delivery) -> StoreResult<Box<dyn EventSubscription>>;
}

#[async_trait]
pub trait EventSubscription: Send {
    /// Next decodable event; `None` once the transport is closed.
    async fn recv(&mut self) -> Option<BookingEvent>;
}
