use cinema_core::events::{Delivery, EventBus, EventSubscription};
use cinema_core::repository::AuditRepository;
use cinema_core::StoreResult;
use cinema_shared::{BookingEvent, HubMessage, Topic};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::deadline::bounded;
use crate::hub::HubHandle;

/// Fans lifecycle events out: onto the shared bus, and from the bus into the
/// audit trail and topic-scoped notifications.
///
/// Auditing consumes a shared subscription so each event is recorded once
/// across processes. Notifications consume a fanout subscription so observers
/// attached to any process hear about every event.
///
/// Nothing here can fail the operation that produced the event.
#[derive(Clone)]
pub struct EventNotifier {
    bus: Arc<dyn EventBus>,
    audit: Arc<dyn AuditRepository>,
    hub: HubHandle,
    op_timeout: Duration,
}

impl EventNotifier {
    pub fn new(bus: Arc<dyn EventBus>, audit: Arc<dyn AuditRepository>, hub: HubHandle, op_timeout: Duration) -> Self {
        Self {
            bus,
            audit,
            hub,
            op_timeout,
        }
    }

    /// Publishes to the bus. If the bus is down the event is handled locally
    /// so the audit trail still sees it.
    pub async fn emit(&self, event: BookingEvent) {
        match bounded(self.op_timeout, self.bus.publish(&event)).await {
            Ok(()) => debug!("Emitted {}", event.event_type),
            Err(e) => {
                warn!("Event bus publish of {} failed, handling locally: {}", event.event_type, e);
                self.handle(&event).await;
            }
        }
    }

    /// Audit, then notify observers for the events they care about.
    pub async fn handle(&self, event: &BookingEvent) {
        self.record(event).await;
        self.notify(event);
    }

    async fn record(&self, event: &BookingEvent) {
        if let Err(e) = bounded(self.op_timeout, self.audit.insert_audit(event.event_type.as_str(), &event.payload)).await {
            warn!("Audit insert for {} failed: {}", event.event_type, e);
        }
    }

    fn notify(&self, event: &BookingEvent) {
        if !event.event_type.is_notification() {
            return;
        }
        match event.screening_id() {
            Some(screening_id) => {
                self.hub.publish(&Topic::screening(screening_id), &HubMessage::notification(event));
            }
            None => warn!("{} event without screening_id, not broadcast", event.event_type),
        }
    }

    /// Subscribes to the bus and spawns the consumer loop, which runs until
    /// the bus closes or `shutdown` flips. A bus that cannot be subscribed to
    /// fails here, before anything is spawned.
    pub async fn start(self, shutdown: watch::Receiver<bool>) -> StoreResult<JoinHandle<()>> {
        let audits = self.bus.subscribe(Delivery::Shared).await?;
        let notices = self.bus.subscribe(Delivery::Fanout).await?;
        info!("Event notifier listening for booking events");
        Ok(tokio::spawn(self.consume(audits, notices, shutdown)))
    }

    async fn consume(
        self,
        mut audits: Box<dyn EventSubscription>,
        mut notices: Box<dyn EventSubscription>,
        mut shutdown: watch::Receiver<bool>,
    ) {
        loop {
            tokio::select! {
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
                event = audits.recv() => match event {
                    Some(event) => self.record(&event).await,
                    None => {
                        error!("Event bus closed, audit trail stopped");
                        break;
                    }
                },
                event = notices.recv() => match event {
                    Some(event) => self.notify(&event),
                    None => {
                        error!("Event bus closed, notifications stopped");
                        break;
                    }
                },
            }
        }

        info!("Event notifier stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hub::Hub;
    use async_trait::async_trait;
    use cinema_core::StoreError;
    use cinema_store::memory::{InMemoryAudit, InMemoryEventBus};

    struct DownBus;

    #[async_trait]
    impl EventBus for DownBus {
        async fn publish(&self, _event: &BookingEvent) -> StoreResult<()> {
            Err(StoreError::Unavailable("bus offline".into()))
        }

        async fn subscribe(&self, _delivery: Delivery) -> StoreResult<Box<dyn EventSubscription>> {
            Err(StoreError::Unavailable("bus offline".into()))
        }
    }

    #[tokio::test]
    async fn test_handle_audits_and_notifies_screening() {
        let (hub, _task) = Hub::spawn(16, 16);
        let audit = Arc::new(InMemoryAudit::new());
        let notifier = EventNotifier::new(
            Arc::new(InMemoryEventBus::default()),
            audit.clone(),
            hub.clone(),
            Duration::from_secs(1),
        );
        let mut room = hub.register(Topic::screening("scr")).await.unwrap();

        notifier.handle(&BookingEvent::booking_success("scr", "u", "b-1", 2, 3)).await;

        let entries = audit.entries().await;
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].0, "BOOKING_SUCCESS");
        let msg = room.recv().await.unwrap();
        assert!(msg.contains("NOTIFICATION"));
        assert!(msg.contains("BOOKING_SUCCESS"));
    }

    #[tokio::test]
    async fn test_timeout_event_is_audited_but_not_broadcast() {
        let (hub, _task) = Hub::spawn(16, 16);
        let audit = Arc::new(InMemoryAudit::new());
        let notifier = EventNotifier::new(
            Arc::new(InMemoryEventBus::default()),
            audit.clone(),
            hub.clone(),
            Duration::from_secs(1),
        );
        let topic = Topic::screening("scr");
        let mut room = hub.register(topic.clone()).await.unwrap();

        notifier.handle(&BookingEvent::booking_timeout("b-1", "scr", 0, 0)).await;

        hub.subscriber_count(&topic).await.unwrap();
        assert!(room.try_recv().is_none());
        assert_eq!(audit.entries().await.len(), 1);
    }

    #[tokio::test]
    async fn test_audit_failure_is_swallowed() {
        let (hub, _task) = Hub::spawn(16, 16);
        let audit = Arc::new(InMemoryAudit::new());
        audit.set_unavailable(true);
        let notifier = EventNotifier::new(Arc::new(DownBus), audit.clone(), hub, Duration::from_secs(1));

        // Neither the bus nor the audit store is up; emit still returns.
        notifier.emit(BookingEvent::seat_released("scr", 0, 0)).await;
        assert!(audit.entries().await.is_empty());
    }

    #[tokio::test]
    async fn test_loop_audits_once_and_notifies_once() {
        let (hub, _task) = Hub::spawn(16, 16);
        let audit = Arc::new(InMemoryAudit::new());
        let bus = Arc::new(InMemoryEventBus::default());
        let notifier = EventNotifier::new(bus.clone(), audit.clone(), hub.clone(), Duration::from_secs(1));
        let topic = Topic::screening("scr");
        let mut room = hub.register(topic.clone()).await.unwrap();
        let (stop, shutdown) = watch::channel(false);

        let task = notifier.clone().start(shutdown).await.unwrap();
        assert_eq!(bus.receiver_count(), 2);
        notifier.emit(BookingEvent::seat_released("scr", 1, 1)).await;

        let msg = room.recv().await.unwrap();
        assert!(msg.contains("SEAT_RELEASED"));
        while audit.entries().await.is_empty() {
            tokio::task::yield_now().await;
        }
        stop.send(true).unwrap();
        task.await.unwrap();

        hub.subscriber_count(&topic).await.unwrap();
        assert!(room.try_recv().is_none());
        let entries = audit.entries().await;
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].0, "SEAT_RELEASED");
    }

    #[tokio::test]
    async fn test_start_fails_when_bus_cannot_subscribe() {
        let (hub, _task) = Hub::spawn(16, 16);
        let notifier = EventNotifier::new(
            Arc::new(DownBus),
            Arc::new(InMemoryAudit::new()),
            hub,
            Duration::from_secs(1),
        );
        let (_stop, shutdown) = watch::channel(false);

        let result = notifier.start(shutdown).await;
        assert!(matches!(result, Err(StoreError::Unavailable(_))));
    }
}
