use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

static NEXT_SUBSCRIPTION_ID: AtomicU64 = AtomicU64::new(1);

/// What a reader sees for a key.
#[derive(Debug, Clone, PartialEq)]
pub enum KeyState {
    /// The store has not been hydrated and nothing wrote this key yet.
    Loading,
    /// Confirmed to hold no value.
    Absent,
    Present(Value),
}

impl KeyState {
    pub fn is_loading(&self) -> bool {
        matches!(self, KeyState::Loading)
    }

    pub fn value(&self) -> Option<&Value> {
        match self {
            KeyState::Present(value) => Some(value),
            _ => None,
        }
    }

    pub fn into_value(self) -> Option<Value> {
        match self {
            KeyState::Present(value) => Some(value),
            _ => None,
        }
    }
}

/// Handle returned by `connect`, passed back to `disconnect`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriptionId(pub u64);

impl SubscriptionId {
    fn next() -> Self {
        SubscriptionId(NEXT_SUBSCRIPTION_ID.fetch_add(1, Ordering::SeqCst))
    }
}

impl std::fmt::Display for SubscriptionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "sub_{}", self.0)
    }
}

pub type StoreCallback = Arc<dyn Fn(&str, &KeyState) + Send + Sync>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum SubscriptionTarget {
    Key(String),
    Collection(String),
}

impl SubscriptionTarget {
    fn matches(&self, key: &str) -> bool {
        match self {
            SubscriptionTarget::Key(target) => target == key,
            SubscriptionTarget::Collection(prefix) => key.starts_with(prefix.as_str()),
        }
    }
}

struct Subscriber {
    target: SubscriptionTarget,
    callback: StoreCallback,
}

/// Connected subscribers, keyed by id.
#[derive(Default)]
pub(crate) struct SubscriberRegistry {
    subscribers: HashMap<SubscriptionId, Subscriber>,
}

impl SubscriberRegistry {
    pub(crate) fn register(
        &mut self,
        target: SubscriptionTarget,
        callback: StoreCallback,
    ) -> SubscriptionId {
        let id = SubscriptionId::next();
        self.subscribers.insert(id, Subscriber { target, callback });
        id
    }

    pub(crate) fn remove(&mut self, id: SubscriptionId) -> bool {
        self.subscribers.remove(&id).is_some()
    }

    pub(crate) fn len(&self) -> usize {
        self.subscribers.len()
    }

    /// Callbacks interested in `key`, ordered by subscription id.
    pub(crate) fn callbacks_for(&self, key: &str) -> Vec<StoreCallback> {
        let mut matching: Vec<(&SubscriptionId, &Subscriber)> = self
            .subscribers
            .iter()
            .filter(|(_, subscriber)| subscriber.target.matches(key))
            .collect();
        matching.sort_by_key(|(id, _)| **id);
        matching
            .into_iter()
            .map(|(_, subscriber)| subscriber.callback.clone())
            .collect()
    }

    /// Exact keys with a direct subscriber.
    pub(crate) fn subscribed_keys(&self) -> Vec<String> {
        self.subscribers
            .values()
            .filter_map(|subscriber| match &subscriber.target {
                SubscriptionTarget::Key(key) => Some(key.clone()),
                SubscriptionTarget::Collection(_) => None,
            })
            .collect()
    }
}
