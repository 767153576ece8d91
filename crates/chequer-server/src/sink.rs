//! Broadcast sink: per-race fan-out of encoded stream frames.
//!
//! Producers publish [`StreamMessage`]s for a race; the sink encodes each once
//! and pushes the text to every subscriber of that race. Publishing happens
//! under one lock, so all subscribers observe a race's frames in the order
//! they were published.
//!
//! Each subscriber owns a bounded queue. A subscriber whose queue is full or
//! whose receiver is gone is removed; its connection then sees the end of its
//! queue and closes, and the viewer reconnects to a fresh snapshot.
//!
//! The most recent full snapshot of each race is cached and queued first for
//! every new subscriber, so a viewer joining mid-stream can initialise state
//! without waiting for the next tick.

use std::{
    collections::HashMap,
    sync::{Arc, Mutex, MutexGuard, PoisonError},
};

use chequer_proto::StreamMessage;
use tokio::sync::mpsc::{self, error::TrySendError};

use crate::{
    error::ServerError,
    registry::{SubscriberId, SubscriptionRegistry},
};

/// One encoded text frame, shared by all subscribers it is sent to.
pub type Frame = Arc<str>;

/// Frames a subscriber may have queued before it is dropped.
pub const SUBSCRIBER_BUFFER: usize = 256;

#[derive(Debug, Default)]
struct SinkState {
    registry: SubscriptionRegistry,
    senders: HashMap<SubscriberId, mpsc::Sender<Frame>>,
    /// Race ID → latest full snapshot frame
    latest: HashMap<String, Frame>,
    next_id: SubscriberId,
}

impl SinkState {
    fn remove(&mut self, subscriber: SubscriberId) {
        self.registry.unsubscribe(subscriber);
        self.senders.remove(&subscriber);
    }
}

/// Shared handle to the sink.
#[derive(Debug, Clone, Default)]
pub struct BroadcastSink {
    inner: Arc<Mutex<SinkState>>,
}

impl BroadcastSink {
    /// Create an empty sink.
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, SinkState> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Join the fan-out set of `race_id`.
    ///
    /// If the race already produced a snapshot, it is the first frame queued.
    pub fn subscribe(&self, race_id: &str) -> Subscription {
        let (sender, receiver) = mpsc::channel(SUBSCRIBER_BUFFER);
        let mut state = self.state();

        let id = state.next_id;
        state.next_id += 1;

        if let Some(latest) = state.latest.get(race_id) {
            // Fresh queue, cannot be full.
            let _ = sender.try_send(Arc::clone(latest));
        }
        state.registry.subscribe(id, race_id);
        state.senders.insert(id, sender);

        tracing::debug!(race_id, subscriber = id, "subscribed");

        Subscription { id, race_id: race_id.to_string(), receiver, sink: self.clone() }
    }

    /// Leave the fan-out set. Idempotent.
    pub fn unsubscribe(&self, subscriber: SubscriberId) {
        let mut state = self.state();
        if let Some(race_id) = state.registry.race_of(subscriber) {
            tracing::debug!(race_id, subscriber, "unsubscribed");
        }
        state.remove(subscriber);
    }

    /// Encode `message` and queue it for every subscriber of `race_id`.
    ///
    /// Returns the number of subscribers the frame was queued for.
    ///
    /// # Errors
    ///
    /// - `ServerError::Protocol` if the message cannot be encoded; nothing is
    ///   sent in that case
    pub fn publish(&self, race_id: &str, message: &StreamMessage) -> Result<usize, ServerError> {
        let frame: Frame = message.to_json()?.into();
        let mut state = self.state();

        if message.is_snapshot() {
            state.latest.insert(race_id.to_string(), Arc::clone(&frame));
        }

        let subscribers: Vec<_> = state.registry.subscribers_of(race_id).collect();
        let mut delivered = 0;
        let mut failed = Vec::new();

        for subscriber in subscribers {
            let Some(sender) = state.senders.get(&subscriber) else { continue };
            match sender.try_send(Arc::clone(&frame)) {
                Ok(()) => delivered += 1,
                Err(TrySendError::Full(_)) => {
                    tracing::warn!(race_id, subscriber, "subscriber lagging, dropping it");
                    failed.push(subscriber);
                },
                Err(TrySendError::Closed(_)) => {
                    tracing::warn!(race_id, subscriber, "subscriber gone, dropping it");
                    failed.push(subscriber);
                },
            }
        }

        for subscriber in failed {
            state.remove(subscriber);
        }

        Ok(delivered)
    }

    /// Latest full snapshot frame published for `race_id`.
    pub fn latest(&self, race_id: &str) -> Option<Frame> {
        self.state().latest.get(race_id).cloned()
    }

    /// Number of subscribers of `race_id`.
    pub fn subscriber_count(&self, race_id: &str) -> usize {
        self.state().registry.race_subscriber_count(race_id)
    }
}

/// A subscriber's end of the fan-out. Unsubscribes when dropped.
#[derive(Debug)]
pub struct Subscription {
    id: SubscriberId,
    race_id: String,
    receiver: mpsc::Receiver<Frame>,
    sink: BroadcastSink,
}

impl Subscription {
    /// Subscriber handle.
    pub fn id(&self) -> SubscriberId {
        self.id
    }

    /// Race this subscription follows.
    pub fn race_id(&self) -> &str {
        &self.race_id
    }

    /// Next frame. `None` once the sink has dropped this subscriber.
    pub async fn recv(&mut self) -> Option<Frame> {
        self.receiver.recv().await
    }

    /// Next frame if one is already queued.
    pub fn try_recv(&mut self) -> Option<Frame> {
        self.receiver.try_recv().ok()
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.sink.unsubscribe(self.id);
    }
}
