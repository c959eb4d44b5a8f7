use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};

use tracing::trace;

use crate::Message;

const LOG_TARGET: &str = "comments::pubsub";

/// A named broadcast endpoint.
///
/// Obtained from [`crate::Registry::channel`], which guarantees the same
/// name always resolves to the same underlying set of subscribers - two
/// calls with the same name are the same channel, per the spec's "process-
/// wide channel registry" design.
pub(crate) type Envelope = (Arc<str>, Message);

#[derive(Clone)]
pub struct Channel {
    name: Arc<str>,
    subscribers: Arc<Mutex<BTreeMap<u64, tokio::sync::mpsc::UnboundedSender<Envelope>>>>,
}

impl Channel {
    pub(crate) fn new(name: Arc<str>) -> Self {
        Self {
            name,
            subscribers: Arc::new(Mutex::new(BTreeMap::new())),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Registers a new subscriber queue, returning an id used to
    /// [`Self::unsubscribe`] it later.
    pub(crate) fn subscribe(&self, id: u64, tx: tokio::sync::mpsc::UnboundedSender<Envelope>) {
        self.subscribers.lock().expect("poisoned").insert(id, tx);
    }

    pub(crate) fn unsubscribe(&self, id: u64) {
        self.subscribers.lock().expect("poisoned").remove(&id);
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.lock().expect("poisoned").len()
    }

    /// Delivers `msg` to every currently subscribed consumer.
    ///
    /// Non-blocking to the publisher: each consumer has its own unbounded
    /// queue, so a slow or stalled consumer never backpressures this call.
    /// A subscriber whose queue has been dropped (consumer gone without
    /// unsubscribing) is pruned lazily on the next publish.
    pub fn publish(&self, msg: impl Into<Message>) {
        let msg = msg.into();
        let mut subscribers = self.subscribers.lock().expect("poisoned");
        let before = subscribers.len();
        subscribers.retain(|_, tx| tx.send((self.name.clone(), msg.clone())).is_ok());
        trace!(
            target: LOG_TARGET,
            channel = %self.name,
            delivered = subscribers.len(),
            pruned = before - subscribers.len(),
            "Published message"
        );
    }
}
