// ============================================================================
// Local Mirror Store
// ============================================================================
//
// Process-wide key/value mirror of server state. Handles are cheap clones of
// one shared store and are passed explicitly to whoever needs them.
//
// - writes to one key are applied in submission order under a single lock
// - subscriber callbacks run after the lock is released, in the same order
//   the writes were applied, so callbacks may write back into the store
// - multi-key writes are not atomic for readers of other keys
//
// ============================================================================

use super::subscription::{
    KeyState, StoreCallback, SubscriberRegistry, SubscriptionId, SubscriptionTarget,
};
use crate::connection::config::StorePolicy;
use crate::core::{MirrorError, Result, merge_values, strip_nulls};
use crate::keys::validate_key;
use crate::update::{KeyWrite, UpdateOperation};
use serde_json::{Map, Value};
use std::collections::{BTreeMap, HashSet, VecDeque};
use std::sync::{Arc, Mutex, RwLock};
use tokio::sync::watch;
use tracing::debug;

struct StoreState {
    values: BTreeMap<String, Value>,
    ready: bool,
    /// Keys written before `init`; reads of these are no longer "loading".
    touched: HashSet<String>,
}

impl StoreState {
    fn state_of(&self, key: &str) -> KeyState {
        match self.values.get(key) {
            Some(value) => KeyState::Present(value.clone()),
            None if self.ready || self.touched.contains(key) => KeyState::Absent,
            None => KeyState::Loading,
        }
    }

    /// Apply one key write, returning the new state when it changed.
    fn apply(&mut self, key: &str, write: KeyWrite<'_>) -> Option<KeyState> {
        if !self.ready {
            self.touched.insert(key.to_string());
        }

        let previous = self.values.get(key);
        let next = match write {
            KeyWrite::Replace(Value::Null) => None,
            KeyWrite::Replace(value) => Some(strip_nulls(value)),
            KeyWrite::Merge(patch) => merge_values(previous, patch),
        };

        if previous == next.as_ref() {
            return None;
        }

        match next {
            Some(value) => {
                self.values.insert(key.to_string(), value.clone());
                Some(KeyState::Present(value))
            }
            None => {
                self.values.remove(key);
                Some(KeyState::Absent)
            }
        }
    }
}

#[derive(Default)]
struct NotifyQueue {
    pending: VecDeque<(String, KeyState)>,
    draining: bool,
}

struct StoreShared {
    state: RwLock<StoreState>,
    subscribers: Mutex<SubscriberRegistry>,
    notifications: Mutex<NotifyQueue>,
    policy: StorePolicy,
}

/// Handle to the local mirror store.
#[derive(Clone)]
pub struct MirrorStore {
    shared: Arc<StoreShared>,
}

impl MirrorStore {
    /// Create an empty store. Reads return `KeyState::Loading` until `init`.
    pub fn new(policy: StorePolicy) -> Self {
        Self {
            shared: Arc::new(StoreShared {
                state: RwLock::new(StoreState {
                    values: BTreeMap::new(),
                    ready: false,
                    touched: HashSet::new(),
                }),
                subscribers: Mutex::new(SubscriberRegistry::default()),
                notifications: Mutex::new(NotifyQueue::default()),
                policy,
            }),
        }
    }

    /// Create a store that is already hydrated with `initial`.
    pub fn with_state(policy: StorePolicy, initial: Map<String, Value>) -> Result<Self> {
        let store = Self::new(policy);
        store.init(initial)?;
        Ok(store)
    }

    pub fn policy(&self) -> &StorePolicy {
        &self.shared.policy
    }

    /// Hydrate the store and mark it ready. Subscribers connected while the
    /// store was loading receive their first value here.
    pub fn init(&self, initial: Map<String, Value>) -> Result<()> {
        for key in initial.keys() {
            validate_key(key)?;
        }

        let subscribed = self.shared.subscribers.lock()?.subscribed_keys();
        {
            let mut state = self.shared.state.write()?;
            for (key, value) in &initial {
                state.apply(key, KeyWrite::Replace(value));
            }
            state.ready = true;
            state.touched.clear();

            let mut announce: Vec<String> = state.values.keys().cloned().collect();
            announce.extend(subscribed);
            announce.sort();
            announce.dedup();

            let mut queue = self.shared.notifications.lock()?;
            for key in announce {
                let current = state.state_of(&key);
                queue.pending.push_back((key, current));
            }
        }

        debug!(keys = initial.len(), "mirror store initialized");
        self.drain_notifications()
    }

    pub fn is_ready(&self) -> Result<bool> {
        Ok(self.shared.state.read()?.ready)
    }

    /// Current state of `key`.
    pub fn get(&self, key: &str) -> Result<KeyState> {
        Ok(self.shared.state.read()?.state_of(key))
    }

    /// Current value of `key`, if present.
    pub fn value(&self, key: &str) -> Result<Option<Value>> {
        Ok(self.get(key)?.into_value())
    }

    /// Every present member of a collection, keyed by full key.
    pub fn get_collection(&self, prefix: &str) -> Result<BTreeMap<String, Value>> {
        let state = self.shared.state.read()?;
        Ok(state
            .values
            .range(prefix.to_string()..)
            .take_while(|(key, _)| key.starts_with(prefix))
            .map(|(key, value)| (key.clone(), value.clone()))
            .collect())
    }

    /// Number of present keys.
    pub fn len(&self) -> Result<usize> {
        Ok(self.shared.state.read()?.values.len())
    }

    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.len()? == 0)
    }

    /// Full copy of the present values.
    pub fn snapshot(&self) -> Result<BTreeMap<String, Value>> {
        Ok(self.shared.state.read()?.values.clone())
    }

    /// Subscribe to one key. The callback is invoked right away with the
    /// current state when the store is ready, then on every change.
    pub fn connect<F>(&self, key: &str, callback: F) -> Result<SubscriptionId>
    where
        F: Fn(&str, &KeyState) + Send + Sync + 'static,
    {
        validate_key(key)?;
        let callback: StoreCallback = Arc::new(callback);
        let id = self
            .shared
            .subscribers
            .lock()?
            .register(SubscriptionTarget::Key(key.to_string()), callback.clone());

        let current = self.get(key)?;
        if !current.is_loading() {
            callback(key, &current);
        }
        Ok(id)
    }

    /// Subscribe to every member of a collection. The callback is invoked for
    /// each present member right away, then per member on every change.
    pub fn connect_collection<F>(&self, prefix: &str, callback: F) -> Result<SubscriptionId>
    where
        F: Fn(&str, &KeyState) + Send + Sync + 'static,
    {
        validate_key(prefix)?;
        let callback: StoreCallback = Arc::new(callback);
        let id = self.shared.subscribers.lock()?.register(
            SubscriptionTarget::Collection(prefix.to_string()),
            callback.clone(),
        );

        for (key, value) in self.get_collection(prefix)? {
            callback(&key, &KeyState::Present(value));
        }
        Ok(id)
    }

    /// Subscribe to one key through a watch channel.
    pub fn watch(&self, key: &str) -> Result<(SubscriptionId, watch::Receiver<KeyState>)> {
        let (tx, rx) = watch::channel(self.get(key)?);
        let id = self.connect(key, move |_, state| {
            tx.send_replace(state.clone());
        })?;
        Ok((id, rx))
    }

    /// Remove a subscription. Returns false when it was not connected.
    pub fn disconnect(&self, id: SubscriptionId) -> Result<bool> {
        Ok(self.shared.subscribers.lock()?.remove(id))
    }

    pub fn subscriber_count(&self) -> Result<usize> {
        Ok(self.shared.subscribers.lock()?.len())
    }

    pub fn set(&self, key: &str, value: Value) -> Result<()> {
        self.apply(&UpdateOperation::set(key, value))
    }

    pub fn merge(&self, key: &str, patch: Value) -> Result<()> {
        self.apply(&UpdateOperation::merge(key, patch))
    }

    pub fn merge_collection(&self, prefix: &str, entries: Map<String, Value>) -> Result<()> {
        self.apply(&UpdateOperation::MergeCollection {
            key: prefix.to_string(),
            value: entries,
        })
    }

    pub fn multi_set(&self, entries: Map<String, Value>) -> Result<()> {
        self.apply(&UpdateOperation::MultiSet { value: entries })
    }

    /// Apply one update operation.
    pub fn apply(&self, op: &UpdateOperation) -> Result<()> {
        self.apply_all(std::slice::from_ref(op))
    }

    /// Apply operations in order. Every operation is validated before any is applied.
    pub fn apply_all(&self, ops: &[UpdateOperation]) -> Result<()> {
        for op in ops {
            op.validate()?;
        }
        if ops.is_empty() {
            return Ok(());
        }

        {
            let mut state = self.shared.state.write()?;
            let mut changed = Vec::new();
            for op in ops {
                for (key, write) in op.key_writes() {
                    if let Some(next) = state.apply(key, write) {
                        changed.push((key.to_string(), next));
                    }
                }
            }

            if !changed.is_empty() {
                self.shared.notifications.lock()?.pending.extend(changed);
            }
        }

        self.drain_notifications()
    }

    /// Remove every key except the configured preserved ones (logout teardown).
    pub fn clear(&self) -> Result<()> {
        let preserved: HashSet<&str> = self
            .shared
            .policy
            .keys_to_preserve_on_clear
            .iter()
            .map(String::as_str)
            .collect();

        let removed = {
            let mut state = self.shared.state.write()?;
            let doomed: Vec<String> = state
                .values
                .keys()
                .filter(|key| !preserved.contains(key.as_str()))
                .cloned()
                .collect();
            for key in &doomed {
                state.values.remove(key);
            }
            state.ready = true;

            let mut queue = self.shared.notifications.lock()?;
            queue
                .pending
                .extend(doomed.iter().map(|key| (key.clone(), KeyState::Absent)));
            doomed.len()
        };

        debug!(removed, preserved = preserved.len(), "mirror store cleared");
        self.drain_notifications()
    }

    /// Deliver queued notifications. Only one caller drains at a time; writes
    /// made from inside a callback are queued and delivered by the same loop.
    fn drain_notifications(&self) -> Result<()> {
        {
            let mut queue = self.shared.notifications.lock()?;
            if queue.draining {
                return Ok(());
            }
            queue.draining = true;
        }

        loop {
            let next = {
                let mut queue = self.shared.notifications.lock()?;
                match queue.pending.pop_front() {
                    Some(next) => next,
                    None => {
                        queue.draining = false;
                        return Ok(());
                    }
                }
            };

            let (key, state) = next;
            let callbacks = match self.shared.subscribers.lock() {
                Ok(registry) => registry.callbacks_for(&key),
                Err(err) => {
                    self.shared.notifications.lock()?.draining = false;
                    return Err(MirrorError::from(err));
                }
            };
            for callback in callbacks {
                callback(&key, &state);
            }
        }
    }
}

impl std::fmt::Debug for MirrorStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let keys = self
            .shared
            .state
            .read()
            .map(|state| state.values.len())
            .unwrap_or_default();
        f.debug_struct("MirrorStore").field("keys", &keys).finish()
    }
}
