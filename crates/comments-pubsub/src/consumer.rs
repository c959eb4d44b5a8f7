use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use async_trait::async_trait;
use comments_util_error::BoxedError;
use tokio::sync::{mpsc, Mutex, Notify};
use tracing::warn;

use crate::{Channel, Envelope, Message, Registry};

const LOG_TARGET: &str = "comments::pubsub";

fn next_consumer_id() -> u64 {
    static NEXT: AtomicU64 = AtomicU64::new(0);
    NEXT.fetch_add(1, Ordering::Relaxed)
}

/// Reacts to messages delivered on the channels a [`Consumer`] is subscribed
/// to. A handler failure is logged and the message is dropped - it never
/// terminates the consumer.
#[async_trait]
pub trait MessageHandler: Send + Sync {
    async fn on_message(&self, channel: &str, message: Message) -> Result<(), BoxedError>;
}

/// Owns a FIFO queue and a set of channel subscriptions.
///
/// Subscribing registers this consumer's queue with the named [`Channel`]
/// (via the process-wide [`Registry`]); [`Self::run`] then drains that queue
/// serially, handing each message to a [`MessageHandler`] one at a time.
pub struct Consumer {
    id: u64,
    tx: mpsc::UnboundedSender<Envelope>,
    rx: Mutex<mpsc::UnboundedReceiver<Envelope>>,
    subscriptions: std::sync::Mutex<Vec<Channel>>,
    stopping: AtomicBool,
    stop_notify: Notify,
}

impl Default for Consumer {
    fn default() -> Self {
        Self::new()
    }
}

impl Consumer {
    pub fn new() -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        Self {
            id: next_consumer_id(),
            tx,
            rx: Mutex::new(rx),
            subscriptions: std::sync::Mutex::new(Vec::new()),
            stopping: AtomicBool::new(false),
            stop_notify: Notify::new(),
        }
    }

    /// Subscribes to the named channel, creating it in the global registry
    /// on first use.
    pub fn subscribe(&self, channel_name: impl AsRef<str>) {
        let channel = Registry::global().channel(channel_name);
        channel.subscribe(self.id, self.tx.clone());
        self.subscriptions.lock().expect("poisoned").push(channel);
    }

    pub fn unsubscribe(&self, channel_name: impl AsRef<str>) {
        let channel_name = channel_name.as_ref();
        let mut subscriptions = self.subscriptions.lock().expect("poisoned");
        subscriptions.retain(|ch| {
            if ch.name() == channel_name {
                ch.unsubscribe(self.id);
                false
            } else {
                true
            }
        });
    }

    fn unsubscribe_all(&self) {
        let mut subscriptions = self.subscriptions.lock().expect("poisoned");
        for channel in subscriptions.drain(..) {
            channel.unsubscribe(self.id);
        }
    }

    /// Serially dequeues messages and hands them to `handler`, until
    /// [`Self::stop`] is called and the queue is drained.
    pub async fn run(&self, handler: &dyn MessageHandler) {
        let mut rx = self.rx.lock().await;
        loop {
            let next = if self.stopping.load(Ordering::Acquire) {
                rx.try_recv().ok()
            } else {
                tokio::select! {
                    biased;
                    envelope = rx.recv() => envelope,
                    () = self.stop_notify.notified() => {
                        rx.try_recv().ok()
                    }
                }
            };
            let Some((channel, message)) = next else {
                if self.stopping.load(Ordering::Acquire) {
                    break;
                }
                continue;
            };
            if let Err(err) = handler.on_message(&channel, message).await {
                warn!(
                    target: LOG_TARGET,
                    channel = %channel,
                    err = %err,
                    "Message handler failed"
                );
            }
        }
    }

    /// Unsubscribes from every channel and lets [`Self::run`] drain whatever
    /// is already queued before it returns.
    pub fn stop(&self) {
        self.unsubscribe_all();
        self.stopping.store(true, Ordering::Release);
        self.stop_notify.notify_waiters();
    }
}
