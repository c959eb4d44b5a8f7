use std::sync::Arc;

use tracing::warn;

use crate::consumer::{Consumer, MessageHandler};
use crate::Message;

const LOG_TARGET: &str = "comments::pubsub";
const DEFAULT_CAPACITY: usize = 3;

/// A [`Consumer`] that hands each message to its own task instead of
/// awaiting the handler inline, bounded by a semaphore so at most *N*
/// handlers run concurrently.
///
/// This is what the report builder subscribes with: it needs to service
/// several build requests at once without letting one slow build stall
/// every other channel's delivery.
pub struct BackgroundConsumer {
    consumer: Arc<Consumer>,
    permits: Arc<tokio::sync::Semaphore>,
}

struct BoundedHandler<H> {
    inner: Arc<H>,
    permits: Arc<tokio::sync::Semaphore>,
}

#[async_trait::async_trait]
impl<H> MessageHandler for BoundedHandler<H>
where
    H: MessageHandler + 'static,
{
    async fn on_message(
        &self,
        channel: &str,
        message: Message,
    ) -> Result<(), comments_util_error::BoxedError> {
        let permit = self
            .permits
            .clone()
            .acquire_owned()
            .await
            .expect("semaphore never closed");
        let inner = self.inner.clone();
        let channel = channel.to_owned();
        tokio::spawn(async move {
            let _permit = permit;
            if let Err(err) = inner.on_message(&channel, message).await {
                warn!(
                    target: LOG_TARGET,
                    channel = %channel,
                    err = %err,
                    "Background handler failed"
                );
            }
        });
        Ok(())
    }
}

impl BackgroundConsumer {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            consumer: Arc::new(Consumer::new()),
            permits: Arc::new(tokio::sync::Semaphore::new(capacity)),
        }
    }

    pub fn subscribe(&self, channel_name: impl AsRef<str>) {
        self.consumer.subscribe(channel_name);
    }

    pub fn unsubscribe(&self, channel_name: impl AsRef<str>) {
        self.consumer.unsubscribe(channel_name);
    }

    /// Drives dispatch until [`Self::stop`] is called. Each message is
    /// handed off to `handler` on its own task as soon as a permit is free;
    /// the dispatch loop itself never blocks on a handler's work, only on
    /// acquiring a permit.
    pub async fn run<H>(&self, handler: Arc<H>)
    where
        H: MessageHandler + 'static,
    {
        let bounded = BoundedHandler {
            inner: handler,
            permits: self.permits.clone(),
        };
        self.consumer.run(&bounded).await;
    }

    pub fn stop(&self) {
        self.consumer.stop();
    }
}

impl Default for BackgroundConsumer {
    fn default() -> Self {
        Self::new()
    }
}
