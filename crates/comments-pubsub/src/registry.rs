use std::collections::HashMap;
use std::sync::{Arc, OnceLock, RwLock};

use crate::Channel;

/// Process-wide map from channel name to [`Channel`], with lazy insert.
///
/// The original design note calls for "a rw-lock around the registry,
/// fine-grained locking around each channel's subscriber set" once the
/// single-threaded-cooperative assumption is dropped; that's exactly what
/// this is - a `RwLock<HashMap<..>>` guarding channel lookup/creation, with
/// each [`Channel`]'s own subscriber set behind its own `Mutex` so a publish
/// on one channel never contends with a lookup on another.
#[derive(Default)]
pub struct Registry {
    channels: RwLock<HashMap<Arc<str>, Channel>>,
}

impl Registry {
    fn new() -> Self {
        Self::default()
    }

    /// The process-wide registry instance.
    pub fn global() -> &'static Registry {
        static REGISTRY: OnceLock<Registry> = OnceLock::new();
        REGISTRY.get_or_init(Registry::new)
    }

    /// Returns the channel for `name`, creating it on first use.
    ///
    /// Two calls with the same name always return handles to the same
    /// underlying subscriber set.
    pub fn channel(&self, name: impl AsRef<str>) -> Channel {
        let name = name.as_ref();
        if let Some(ch) = self.channels.read().expect("poisoned").get(name) {
            return ch.clone();
        }
        let mut channels = self.channels.write().expect("poisoned");
        channels
            .entry(Arc::from(name))
            .or_insert_with_key(|name| Channel::new(name.clone()))
            .clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn same_name_is_same_channel() {
        let registry = Registry::new();
        let a = registry.channel("xml-dl-request");
        let b = registry.channel("xml-dl-request");
        let (tx, _rx) = tokio::sync::mpsc::unbounded_channel::<crate::Envelope>();
        a.subscribe(1, tx);
        assert_eq!(b.subscriber_count(), 1);
    }

    #[test]
    fn different_names_are_different_channels() {
        let registry = Registry::new();
        let a = registry.channel("a");
        let b = registry.channel("b");
        assert_ne!(a.name(), b.name());
    }
}
