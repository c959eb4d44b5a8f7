use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::Mutex;

use crate::{Consumer, Message, MessageHandler, Registry};

struct Recorder {
    seen: Mutex<Vec<Message>>,
}

impl Recorder {
    fn new() -> Arc<Self> {
        Arc::new(Self {
            seen: Mutex::new(Vec::new()),
        })
    }
}

#[async_trait]
impl MessageHandler for Recorder {
    async fn on_message(&self, _channel: &str, message: Message) -> Result<(), comments_util_error::BoxedError> {
        self.seen.lock().await.push(message);
        Ok(())
    }
}

#[test_log::test(tokio::test(flavor = "multi_thread"))]
async fn fan_out_delivers_to_every_subscriber() {
    let channel_name = format!("test-fanout-{}", uid());
    let consumer_a = Arc::new(Consumer::new());
    let consumer_b = Arc::new(Consumer::new());
    consumer_a.subscribe(&channel_name);
    consumer_b.subscribe(&channel_name);

    Registry::global().channel(&channel_name).publish(Message::from(42));

    let recorder_a = Recorder::new();
    let recorder_b = Recorder::new();

    let task_a = tokio::spawn({
        let consumer_a = consumer_a.clone();
        let recorder_a = recorder_a.clone();
        async move { consumer_a.run(&*recorder_a).await }
    });
    let task_b = tokio::spawn({
        let consumer_b = consumer_b.clone();
        let recorder_b = recorder_b.clone();
        async move { consumer_b.run(&*recorder_b).await }
    });

    // Give both consumers a chance to drain their one queued message, then
    // stop them (run() only returns once stop() has been called).
    tokio::task::yield_now().await;
    consumer_a.stop();
    consumer_b.stop();
    task_a.await.unwrap();
    task_b.await.unwrap();

    assert_eq!(*recorder_a.seen.lock().await, vec![Message::from(42)]);
    assert_eq!(*recorder_b.seen.lock().await, vec![Message::from(42)]);
}

#[test_log::test(tokio::test(flavor = "multi_thread"))]
async fn single_consumer_sees_fifo_order() {
    let channel_name = format!("test-fifo-{}", uid());
    let consumer = Arc::new(Consumer::new());
    consumer.subscribe(&channel_name);

    let channel = Registry::global().channel(&channel_name);
    for n in 0..5 {
        channel.publish(Message::from(n));
    }

    let recorder = Recorder::new();
    let task = tokio::spawn({
        let consumer = consumer.clone();
        let recorder = recorder.clone();
        async move { consumer.run(&*recorder).await }
    });

    tokio::task::yield_now().await;
    consumer.stop();
    task.await.unwrap();

    let seen: Vec<i64> = recorder
        .seen
        .lock()
        .await
        .iter()
        .map(|m| m.as_i64().unwrap())
        .collect();
    assert_eq!(seen, vec![0, 1, 2, 3, 4]);
}

#[test_log::test(tokio::test(flavor = "multi_thread"))]
async fn unsubscribe_stops_delivery() {
    let channel_name = format!("test-unsub-{}", uid());
    let consumer = Arc::new(Consumer::new());
    consumer.subscribe(&channel_name);
    consumer.unsubscribe(&channel_name);

    assert_eq!(Registry::global().channel(&channel_name).subscriber_count(), 0);
}

fn uid() -> u64 {
    use std::sync::atomic::{AtomicU64, Ordering};
    static NEXT: AtomicU64 = AtomicU64::new(0);
    NEXT.fetch_add(1, Ordering::Relaxed)
}
