use async_trait::async_trait;
use cinema_core::events::{Delivery, EventBus, EventSubscription};
use cinema_core::{StoreError, StoreResult};
use cinema_shared::BookingEvent;
use rdkafka::config::ClientConfig;
use rdkafka::consumer::{Consumer, StreamConsumer};
use rdkafka::message::Message;
use rdkafka::producer::{FutureProducer, FutureRecord};
use rdkafka::util::Timeout;
use std::time::Duration;
use uuid::Uuid;
use tracing::{debug, error, warn};

/// Booking events over a Kafka topic, for deployments with more than one process.
#[derive(Clone)]
pub struct KafkaEventBus {
    producer: FutureProducer,
    brokers: String,
    topic: String,
    group_id: String,
}

impl KafkaEventBus {
    pub fn new(brokers: &str, topic: &str, group_id: &str) -> Result<Self, rdkafka::error::KafkaError> {
        let producer: FutureProducer = ClientConfig::new()
            .set("bootstrap.servers", brokers)
            .set("message.timeout.ms", "5000")
            .create()?;

        Ok(Self {
            producer,
            brokers: brokers.to_string(),
            topic: topic.to_string(),
            group_id: group_id.to_string(),
        })
    }
}

#[async_trait]
impl EventBus for KafkaEventBus {
    async fn publish(&self, event: &BookingEvent) -> StoreResult<()> {
        let payload = serde_json::to_string(event).map_err(StoreError::corrupt)?;
        let key = event.screening_id().unwrap_or_default();
        let record = FutureRecord::to(&self.topic).key(key).payload(&payload);

        match self.producer.send(record, Timeout::After(Duration::from_secs(0))).await {
            Ok(_) => {
                debug!("Sent {} to {}", event.event_type, self.topic);
                Ok(())
            }
            Err((e, _msg)) => {
                error!("Failed to send {} to {}: {}", event.event_type, self.topic, e);
                Err(StoreError::unavailable(e))
            }
        }
    }

    async fn subscribe(&self, delivery: Delivery) -> StoreResult<Box<dyn EventSubscription>> {
        let group_id = consumer_group(&self.group_id, delivery);
        let consumer: StreamConsumer = ClientConfig::new()
            .set("bootstrap.servers", &self.brokers)
            .set("group.id", &group_id)
            .set("enable.auto.commit", "true")
            .set("auto.offset.reset", "latest")
            .create()
            .map_err(StoreError::unavailable)?;

        consumer
            .subscribe(&[self.topic.as_str()])
            .map_err(StoreError::unavailable)?;
        debug!("Subscribed to {} as {}", self.topic, group_id);

        Ok(Box::new(KafkaSubscription { consumer }))
    }
}

/// Shared subscribers split the topic between processes; a fanout
/// subscriber gets a group of its own so it sees every event.
fn consumer_group(group_id: &str, delivery: Delivery) -> String {
    match delivery {
        Delivery::Shared => group_id.to_string(),
        Delivery::Fanout => format!("{}-{}", group_id, Uuid::new_v4()),
    }
}

struct KafkaSubscription {
    consumer: StreamConsumer,
}

fn decode_event<M: Message>(message: &M) -> Option<BookingEvent> {
    match message.payload_view::<str>() {
        Some(Ok(payload)) => match serde_json::from_str::<BookingEvent>(payload) {
            Ok(event) => Some(event),
            Err(e) => {
                warn!("Skipping undecodable booking event: {}", e);
                None
            }
        },
        Some(Err(e)) => {
            warn!("Skipping non-UTF8 booking event: {}", e);
            None
        }
        None => {
            warn!("Skipping empty booking event");
            None
        }
    }
}

#[async_trait]
impl EventSubscription for KafkaSubscription {
    async fn recv(&mut self) -> Option<BookingEvent> {
        loop {
            let received = match self.consumer.recv().await {
                Ok(m) => Ok(decode_event(&m)),
                Err(e) => Err(e),
            };
            match received {
                Ok(Some(event)) => return Some(event),
                Ok(None) => {}
                Err(e) => {
                    // The consumer reconnects on its own; back off briefly.
                    error!("Kafka error: {}", e);
                    tokio::time::sleep(Duration::from_millis(500)).await;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fanout_groups_are_unique_per_subscriber() {
        assert_eq!(consumer_group("cinema-notifier", Delivery::Shared), "cinema-notifier");

        let first = consumer_group("cinema-notifier", Delivery::Fanout);
        let second = consumer_group("cinema-notifier", Delivery::Fanout);
        assert!(first.starts_with("cinema-notifier-"));
        assert_ne!(first, second);
    }
}
