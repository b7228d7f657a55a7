//! Realtime broadcast hub.
//!
//! One task owns every room. Callers talk to it through [`HubHandle`], which
//! only ever enqueues commands, so the registries need no locking. Each
//! subscriber gets a bounded outbound queue; when it is full the message is
//! dropped for that subscriber alone.

use cinema_shared::{HubMessage, Topic};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Serialized message, shared by every subscriber of a topic.
pub type Payload = Arc<str>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriberId(u64);

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("broadcast hub has shut down")]
pub struct HubClosed;

enum Command {
    Register {
        id: SubscriberId,
        topic: Topic,
        tx: mpsc::Sender<Payload>,
    },
    Unregister {
        id: SubscriberId,
    },
    Publish {
        topic: Topic,
        payload: Payload,
    },
    TopicCount {
        reply: oneshot::Sender<usize>,
    },
    SubscriberCount {
        topic: Topic,
        reply: oneshot::Sender<usize>,
    },
}

/// Cheap, cloneable front door to the hub task.
#[derive(Clone)]
pub struct HubHandle {
    commands: mpsc::Sender<Command>,
    next_id: Arc<AtomicU64>,
    subscriber_capacity: usize,
}

impl HubHandle {
    /// Joins `topic`, creating it if this is its first subscriber.
    pub async fn register(&self, topic: Topic) -> Result<Subscription, HubClosed> {
        let id = SubscriberId(self.next_id.fetch_add(1, Ordering::Relaxed));
        let (tx, rx) = mpsc::channel(self.subscriber_capacity);
        self.commands
            .send(Command::Register {
                id,
                topic: topic.clone(),
                tx,
            })
            .await
            .map_err(|_| HubClosed)?;

        Ok(Subscription {
            id,
            topic,
            rx,
            commands: self.commands.clone(),
        })
    }

    /// Leaves whatever topic the subscriber is in. Unknown ids are ignored.
    pub async fn unregister(&self, id: SubscriberId) {
        let _ = self.commands.send(Command::Unregister { id }).await;
    }

    /// Enqueues a message for every subscriber of `topic` without waiting for
    /// delivery. Returns `false` if the message was dropped because the
    /// dispatch queue is saturated or the hub is gone.
    pub fn publish(&self, topic: &Topic, message: &HubMessage) -> bool {
        let payload: Payload = match message.to_json() {
            Ok(json) => Arc::from(json),
            Err(e) => {
                warn!("Hub: failed to serialize message for {}: {}", topic, e);
                return false;
            }
        };

        match self.commands.try_send(Command::Publish {
            topic: topic.clone(),
            payload,
        }) {
            Ok(()) => true,
            Err(TrySendError::Full(_)) => {
                warn!("Hub: dispatch queue full, dropping message for {}", topic);
                false
            }
            Err(TrySendError::Closed(_)) => {
                warn!("Hub: closed, dropping message for {}", topic);
                false
            }
        }
    }

    pub async fn topic_count(&self) -> Result<usize, HubClosed> {
        let (reply, rx) = oneshot::channel();
        self.commands
            .send(Command::TopicCount { reply })
            .await
            .map_err(|_| HubClosed)?;
        rx.await.map_err(|_| HubClosed)
    }

    /// Also acts as a barrier: every command enqueued before it has been
    /// processed once it returns.
    pub async fn subscriber_count(&self, topic: &Topic) -> Result<usize, HubClosed> {
        let (reply, rx) = oneshot::channel();
        self.commands
            .send(Command::SubscriberCount {
                topic: topic.clone(),
                reply,
            })
            .await
            .map_err(|_| HubClosed)?;
        rx.await.map_err(|_| HubClosed)
    }
}

/// One observer's membership of a topic plus its outbound queue.
///
/// Dropping it leaves the topic.
pub struct Subscription {
    id: SubscriberId,
    topic: Topic,
    rx: mpsc::Receiver<Payload>,
    commands: mpsc::Sender<Command>,
}

impl Subscription {
    pub fn id(&self) -> SubscriberId {
        self.id
    }

    pub fn topic(&self) -> &Topic {
        &self.topic
    }

    /// Next message; `None` once unregistered or the hub stops.
    pub async fn recv(&mut self) -> Option<Payload> {
        self.rx.recv().await
    }

    pub fn try_recv(&mut self) -> Option<Payload> {
        self.rx.try_recv().ok()
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        let id = self.id;
        match self.commands.try_send(Command::Unregister { id }) {
            Ok(()) | Err(TrySendError::Closed(_)) => {}
            // Leaving must not be lost to a busy queue, or a quiet topic would
            // never be torn down. Wait for room off the caller's path.
            Err(TrySendError::Full(command)) => {
                let Ok(runtime) = tokio::runtime::Handle::try_current() else {
                    return;
                };
                let commands = self.commands.clone();
                runtime.spawn(async move {
                    let _ = commands.send(command).await;
                });
            }
        }
    }
}

/// Sole owner of the room registries.
pub struct Hub {
    rooms: HashMap<Topic, HashMap<SubscriberId, mpsc::Sender<Payload>>>,
    members: HashMap<SubscriberId, Topic>,
}

impl Hub {
    /// Starts the dispatch loop. The loop ends once every handle (and every
    /// subscription) has been dropped.
    pub fn spawn(dispatch_capacity: usize, subscriber_capacity: usize) -> (HubHandle, JoinHandle<()>) {
        let (commands, rx) = mpsc::channel(dispatch_capacity.max(1));
        let hub = Hub {
            rooms: HashMap::new(),
            members: HashMap::new(),
        };
        let task = tokio::spawn(hub.run(rx));
        let handle = HubHandle {
            commands,
            next_id: Arc::new(AtomicU64::new(1)),
            subscriber_capacity: subscriber_capacity.max(1),
        };
        (handle, task)
    }

    async fn run(mut self, mut rx: mpsc::Receiver<Command>) {
        info!("Broadcast hub started");
        while let Some(command) = rx.recv().await {
            match command {
                Command::Register { id, topic, tx } => self.register(id, topic, tx),
                Command::Unregister { id } => self.unregister(id),
                Command::Publish { topic, payload } => self.dispatch(&topic, payload),
                Command::TopicCount { reply } => {
                    let _ = reply.send(self.rooms.len());
                }
                Command::SubscriberCount { topic, reply } => {
                    let _ = reply.send(self.rooms.get(&topic).map_or(0, HashMap::len));
                }
            }
        }
        info!("Broadcast hub stopped");
    }

    fn register(&mut self, id: SubscriberId, topic: Topic, tx: mpsc::Sender<Payload>) {
        debug!("Hub: subscriber {:?} joined {}", id, topic);
        self.rooms.entry(topic.clone()).or_default().insert(id, tx);
        self.members.insert(id, topic);
    }

    fn unregister(&mut self, id: SubscriberId) {
        let Some(topic) = self.members.remove(&id) else {
            return;
        };
        if let Some(room) = self.rooms.get_mut(&topic) {
            room.remove(&id);
            if room.is_empty() {
                self.rooms.remove(&topic);
                debug!("Hub: topic {} torn down", topic);
            }
        }
    }

    fn dispatch(&mut self, topic: &Topic, payload: Payload) {
        let Some(room) = self.rooms.get(topic) else {
            return;
        };

        let mut gone = Vec::new();
        for (id, tx) in room {
            match tx.try_send(payload.clone()) {
                Ok(()) => {}
                Err(TrySendError::Full(_)) => {
                    debug!("Hub: subscriber {:?} on {} is slow, message dropped", id, topic);
                }
                Err(TrySendError::Closed(_)) => gone.push(*id),
            }
        }
        for id in gone {
            self.unregister(id);
        }
    }
}
