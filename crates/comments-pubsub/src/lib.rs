//! In-process pub/sub fabric: named broadcast channels, a process-wide
//! registry, and two consumer flavors (serial and bounded-parallel).
//!
//! This is the glue the report pipeline is built on: the download
//! orchestrator and report builder wake each other up by publishing on named
//! channels, and a [`BackgroundConsumer`] drains the build-request channel
//! with bounded concurrency.
//!
//! Delivery is non-blocking to the publisher, unbounded, at-least-once
//! within the process lifetime and not ordered across channels - see
//! `DESIGN.md` for how this generalizes the original single-threaded
//! assumption to a concurrency-safe registry.

mod background_consumer;
mod channel;
mod consumer;
#[cfg(test)]
mod consumer_tests;
mod registry;

pub use background_consumer::BackgroundConsumer;
pub use channel::Channel;
pub(crate) use channel::Envelope;
pub use consumer::{Consumer, MessageHandler};
pub use registry::Registry;

/// The payload type carried by every channel. Kept as a dynamic JSON value
/// (rather than a generic parameter) so a single process-wide [`Registry`]
/// can hold channels of unrelated purpose (report build requests, per-report
/// completion signals, ...) without needing one registry per message type.
pub type Message = serde_json::Value;
