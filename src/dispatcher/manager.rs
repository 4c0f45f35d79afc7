// ============================================================================
// Command Dispatcher
// ============================================================================
//
// Writes are applied optimistically to the mirror store, queued, and sent
// one at a time by a single worker task. When a write settles its success or
// failure branch is applied and every waiter receives the settlement.
//
// Reads wait until no write is queued or in flight, so a read response can
// never be overwritten by the settlement of an older write.
//
// ============================================================================

use super::request::{
    CommandKind, CommandRequest, FailureKind, RefetchCommand, Settlement, WriteMode, WriteOptions,
};
use super::transport::Transport;
use crate::connection::config::DispatcherPolicy;
use crate::core::{MirrorError, Result};
use crate::storage::MirrorStore;
use crate::update::{Branch, UpdateOperation, UpdateTriple};
use serde::Serialize;
use serde_json::Value;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::{Notify, oneshot, watch};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
struct Activity {
    /// Writes queued or in flight.
    outstanding: usize,
    offline: bool,
    closed: bool,
}

struct QueuedWrite {
    entry_id: u64,
    request: CommandRequest,
    options: WriteOptions,
    /// Triples folded into this request, oldest first.
    triples: Vec<UpdateTriple>,
    waiters: Vec<oneshot::Sender<Settlement>>,
    /// Writers still applying updates for this entry. The worker does not
    /// send a held entry.
    holds: usize,
}

impl QueuedWrite {
    fn conflict_key(&self) -> Option<(String, Value)> {
        match &self.options.mode {
            WriteMode::NoDuplicates { conflict_field } => self
                .request
                .params
                .get(conflict_field)
                .map(|value| (conflict_field.clone(), value.clone())),
            WriteMode::Standard => None,
        }
    }

    /// Success settles only the request that was sent, the newest one.
    /// Failure unwinds every folded triple newest first, so the oldest
    /// captured values win.
    fn settlement_ops(&self, branch: Branch) -> Vec<&UpdateOperation> {
        match branch {
            Branch::Failure => unwind_ops(&self.triples),
            _ => self
                .triples
                .last()
                .map(|t| t.branch(branch).iter().collect())
                .unwrap_or_default(),
        }
    }
}

/// Where a new write landed in the queue.
enum Enqueued {
    Queued { entry_id: u64 },
    /// Folded into a queued write whose earlier triples are now superseded.
    Folded {
        entry_id: u64,
        superseded: Vec<UpdateTriple>,
    },
}

impl Enqueued {
    fn entry_id(&self) -> u64 {
        match self {
            Enqueued::Queued { entry_id } | Enqueued::Folded { entry_id, .. } => *entry_id,
        }
    }

    fn superseded(&self) -> &[UpdateTriple] {
        match self {
            Enqueued::Queued { .. } => &[],
            Enqueued::Folded { superseded, .. } => superseded,
        }
    }
}

fn unwind_ops(triples: &[UpdateTriple]) -> Vec<&UpdateOperation> {
    triples.iter().rev().flat_map(|t| t.failure.iter()).collect()
}

#[derive(Default)]
struct Counters {
    enqueued: AtomicU64,
    coalesced: AtomicU64,
    sent: AtomicU64,
    succeeded: AtomicU64,
    failed: AtomicU64,
    abandoned: AtomicU64,
    reads: AtomicU64,
}

/// Point-in-time dispatcher statistics
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DispatcherStats {
    pub enqueued: u64,
    pub coalesced: u64,
    pub sent: u64,
    pub succeeded: u64,
    pub failed: u64,
    pub abandoned: u64,
    pub reads: u64,
    pub queued: usize,
    pub outstanding: usize,
    pub offline: bool,
}

/// Resolves once the write it was returned for has settled.
#[derive(Debug)]
pub struct WriteHandle {
    request_id: Uuid,
    receiver: oneshot::Receiver<Settlement>,
}

impl WriteHandle {
    pub fn request_id(&self) -> Uuid {
        self.request_id
    }

    pub async fn settled(self) -> Result<Settlement> {
        self.receiver
            .await
            .map_err(|_| MirrorError::DispatcherClosed)
    }
}

struct DispatcherShared {
    store: MirrorStore,
    transport: Arc<dyn Transport>,
    policy: DispatcherPolicy,
    queue: Mutex<VecDeque<QueuedWrite>>,
    wake: Notify,
    activity: watch::Sender<Activity>,
    counters: Counters,
    next_entry_id: AtomicU64,
}

enum NextStep {
    Send(QueuedWrite),
    Wait,
    AbandonAndStop,
    Stop,
}

/// Serial command dispatcher bound to one mirror store.
#[derive(Clone)]
pub struct CommandDispatcher {
    shared: Arc<DispatcherShared>,
    worker: Arc<Mutex<Option<JoinHandle<()>>>>,
}

impl CommandDispatcher {
    /// Spawn the worker task. Must be called inside a Tokio runtime.
    pub fn start(store: MirrorStore, transport: Arc<dyn Transport>, policy: DispatcherPolicy) -> Self {
        let (activity, _) = watch::channel(Activity::default());
        let shared = Arc::new(DispatcherShared {
            store,
            transport,
            policy,
            queue: Mutex::new(VecDeque::new()),
            wake: Notify::new(),
            activity,
            counters: Counters::default(),
            next_entry_id: AtomicU64::new(1),
        });

        let worker = tokio::spawn(DispatcherShared::run(shared.clone()));
        info!("command dispatcher started");

        Self {
            shared,
            worker: Arc::new(Mutex::new(Some(worker))),
        }
    }

    pub fn store(&self) -> &MirrorStore {
        &self.shared.store
    }

    /// Apply `triple.optimistic` now and queue `command` for sending.
    pub fn write(&self, command: &str, params: Value, triple: UpdateTriple) -> Result<WriteHandle> {
        self.write_with_options(command, params, triple, WriteOptions::default())
    }

    pub fn write_with_options(
        &self,
        command: &str,
        params: Value,
        triple: UpdateTriple,
        options: WriteOptions,
    ) -> Result<WriteHandle> {
        let shared = &self.shared;
        if shared.activity.borrow().closed {
            return Err(MirrorError::DispatcherClosed);
        }
        ensure_object_params(command, &params)?;
        triple.validate_operations()?;

        let request = CommandRequest::new(CommandKind::Write, command, params);
        let request_id = request.request_id;
        let (sender, receiver) = oneshot::channel();
        let own = triple.clone();
        let entry = QueuedWrite {
            entry_id: 0,
            request,
            options,
            triples: vec![triple],
            waiters: vec![sender],
            holds: 0,
        };

        let enqueued = {
            let mut queue = shared.queue.lock()?;
            let enqueued = shared.enqueue(&mut queue, entry)?;
            if let Enqueued::Queued { .. } = enqueued {
                shared.activity.send_modify(|a| a.outstanding += 1);
            }
            enqueued
        };
        let coalesced = matches!(enqueued, Enqueued::Folded { .. });

        // Subscribers may dispatch from their callbacks, so the queue lock
        // is not held while the store is updated. The entry stays held until
        // then. A superseded write is rolled back before the newer optimistic
        // branch lands, leaving only what the newer write covers.
        let rollback: Vec<UpdateOperation> =
            unwind_ops(enqueued.superseded()).into_iter().cloned().collect();
        let applied = shared
            .store
            .apply_all(&rollback)
            .and_then(|_| shared.store.apply_all(&own.optimistic));

        if !shared.release(enqueued.entry_id())? {
            // Abandoned while held: its failure branches ran before the
            // optimistic branch above landed.
            let mut triples = enqueued.superseded().to_vec();
            triples.push(own);
            shared.apply_logged(unwind_ops(&triples), command, "failure");
        }
        applied?;

        shared.counters.enqueued.fetch_add(1, Ordering::Relaxed);
        if coalesced {
            shared.counters.coalesced.fetch_add(1, Ordering::Relaxed);
            debug!(command, %request_id, "write folded into queued request");
        } else {
            debug!(command, %request_id, "write queued");
        }
        shared.wake.notify_one();

        Ok(WriteHandle {
            request_id,
            receiver,
        })
    }

    /// Send a read once the write queue is drained and apply its updates.
    pub async fn read(&self, command: &str, params: Value) -> Result<Settlement> {
        self.shared
            .read(command, params, UpdateTriple::default())
            .await
    }

    /// Like `read`, with an optimistic branch applied before waiting and a
    /// success or failure branch applied after the response.
    pub async fn read_with_updates(
        &self,
        command: &str,
        params: Value,
        triple: UpdateTriple,
    ) -> Result<Settlement> {
        self.shared.read(command, params, triple).await
    }

    /// While offline the worker sends nothing; queued writes stay queued.
    pub fn set_offline(&self, offline: bool) {
        self.shared.activity.send_modify(|a| a.offline = offline);
        info!(offline, "dispatcher connectivity changed");
        if !offline {
            self.shared.wake.notify_one();
        }
    }

    pub fn is_offline(&self) -> bool {
        self.shared.activity.borrow().offline
    }

    /// Drop every queued, unsent write and apply its failure branch.
    pub fn abandon_pending(&self) -> Result<usize> {
        self.shared.abandon_pending()
    }

    /// Stop accepting writes, send what is queued (or abandon it when
    /// offline), and wait for the worker to exit.
    pub async fn shutdown(&self) -> Result<()> {
        self.shared.activity.send_modify(|a| a.closed = true);
        self.shared.wake.notify_one();

        let worker = self.worker.lock()?.take();
        if let Some(worker) = worker {
            worker
                .await
                .map_err(|e| MirrorError::Transport(format!("dispatcher worker failed: {}", e)))?;
            info!("command dispatcher stopped");
        }
        Ok(())
    }

    pub fn stats(&self) -> DispatcherStats {
        let shared = &self.shared;
        let activity = *shared.activity.borrow();
        let queued = shared.queue.lock().map(|q| q.len()).unwrap_or(0);
        let counters = &shared.counters;

        DispatcherStats {
            enqueued: counters.enqueued.load(Ordering::Relaxed),
            coalesced: counters.coalesced.load(Ordering::Relaxed),
            sent: counters.sent.load(Ordering::Relaxed),
            succeeded: counters.succeeded.load(Ordering::Relaxed),
            failed: counters.failed.load(Ordering::Relaxed),
            abandoned: counters.abandoned.load(Ordering::Relaxed),
            reads: counters.reads.load(Ordering::Relaxed),
            queued,
            outstanding: activity.outstanding,
            offline: activity.offline,
        }
    }
}

impl DispatcherShared {
    /// Queue `entry`, or fold it into a queued no-duplicates write of the
    /// same command and conflict value. Either way the entry is held once.
    fn enqueue(&self, queue: &mut VecDeque<QueuedWrite>, entry: QueuedWrite) -> Result<Enqueued> {
        let QueuedWrite {
            request,
            options,
            triples,
            waiters,
            ..
        } = entry;

        if let Some(existing) = self.fold_target(queue, &request, &options) {
            let superseded = existing.triples.clone();
            existing.request = request;
            existing.options = options;
            existing.triples.extend(triples);
            existing.waiters.extend(waiters);
            existing.holds += 1;
            return Ok(Enqueued::Folded {
                entry_id: existing.entry_id,
                superseded,
            });
        }

        if queue.len() >= self.policy.max_queue_len {
            return Err(MirrorError::QueueFull(queue.len()));
        }

        let entry_id = self.next_entry_id.fetch_add(1, Ordering::Relaxed);
        queue.push_back(QueuedWrite {
            entry_id,
            request,
            options,
            triples,
            waiters,
            holds: 1,
        });
        Ok(Enqueued::Queued { entry_id })
    }

    fn fold_target<'q>(
        &self,
        queue: &'q mut VecDeque<QueuedWrite>,
        request: &CommandRequest,
        options: &WriteOptions,
    ) -> Option<&'q mut QueuedWrite> {
        if !self.policy.coalesce_no_duplicates {
            return None;
        }
        let WriteMode::NoDuplicates { conflict_field } = &options.mode else {
            return None;
        };
        let value = request.params.get(conflict_field)?;

        queue.iter_mut().find(|queued| {
            queued.request.command == request.command
                && queued.conflict_key().as_ref().is_some_and(|(field, queued_value)| {
                    field == conflict_field && queued_value == value
                })
        })
    }

    /// Drop one hold on the entry and wake the worker. Returns false when the
    /// entry was abandoned meanwhile.
    fn release(&self, entry_id: u64) -> Result<bool> {
        let found = {
            let mut queue = self.queue.lock()?;
            match queue.iter_mut().find(|queued| queued.entry_id == entry_id) {
                Some(queued) => {
                    queued.holds = queued.holds.saturating_sub(1);
                    true
                }
                None => false,
            }
        };
        self.wake.notify_one();
        Ok(found)
    }

    async fn run(shared: Arc<Self>) {
        loop {
            match shared.next_step() {
                NextStep::Send(entry) => shared.process(entry).await,
                NextStep::Wait => shared.wake.notified().await,
                NextStep::AbandonAndStop => {
                    if let Err(e) = shared.abandon_pending() {
                        error!("failed to abandon queued writes: {}", e);
                    }
                    break;
                }
                NextStep::Stop => break,
            }
        }
    }

    fn next_step(&self) -> NextStep {
        let activity = *self.activity.borrow();
        let mut queue = match self.queue.lock() {
            Ok(queue) => queue,
            Err(e) => {
                error!("dispatcher queue poisoned: {}", e);
                return NextStep::Stop;
            }
        };

        if activity.offline {
            return if activity.closed {
                NextStep::AbandonAndStop
            } else {
                NextStep::Wait
            };
        }

        if queue.front().is_some_and(|entry| entry.holds > 0) {
            return NextStep::Wait;
        }

        match queue.pop_front() {
            Some(entry) => NextStep::Send(entry),
            None if activity.closed => NextStep::Stop,
            None => NextStep::Wait,
        }
    }

    async fn process(self: &Arc<Self>, entry: QueuedWrite) {
        let command = entry.request.command.clone();
        self.counters.sent.fetch_add(1, Ordering::Relaxed);
        debug!(%command, request_id = %entry.request.request_id, folded = entry.triples.len(), "sending write");

        let settlement = match self.transport.send(&entry.request).await {
            Ok(response) => {
                self.apply_logged(response.updates.iter(), &command, "server");
                self.apply_logged(entry.settlement_ops(Branch::Success), &command, "success");
                self.counters.succeeded.fetch_add(1, Ordering::Relaxed);
                Settlement::Succeeded
            }
            Err(err) => {
                warn!(%command, "write failed: {}", err);
                self.apply_logged(err.server_updates().iter(), &command, "server");
                self.apply_logged(entry.settlement_ops(Branch::Failure), &command, "failure");
                self.counters.failed.fetch_add(1, Ordering::Relaxed);
                Settlement::Failed(err.kind())
            }
        };

        self.activity
            .send_modify(|a| a.outstanding = a.outstanding.saturating_sub(1));
        for waiter in entry.waiters {
            let _ = waiter.send(settlement);
        }

        if settlement == Settlement::Failed(FailureKind::Conflict) {
            if let Some(RefetchCommand { command, params }) = entry.options.refetch_on_conflict {
                let shared = self.clone();
                tokio::spawn(async move {
                    let refetch = shared.read(&command, params, UpdateTriple::default());
                    if let Err(e) = refetch.await {
                        warn!(%command, "refetch after conflict failed: {}", e);
                    }
                });
            }
        }
    }

    async fn read(&self, command: &str, params: Value, triple: UpdateTriple) -> Result<Settlement> {
        ensure_object_params(command, &params)?;
        triple.validate_operations()?;
        self.store.apply_all(&triple.optimistic)?;

        let mut activity = self.activity.subscribe();
        let state = *activity
            .wait_for(|a| a.outstanding == 0 || a.offline || a.closed)
            .await
            .map_err(|_| MirrorError::DispatcherClosed)?;

        if state.closed || state.offline {
            debug!(command, "read not sent, dispatcher is offline or closed");
            self.store.apply_all(&triple.failure)?;
            return if state.closed {
                Err(MirrorError::DispatcherClosed)
            } else {
                Ok(Settlement::Failed(FailureKind::Network))
            };
        }

        self.counters.reads.fetch_add(1, Ordering::Relaxed);
        let request = CommandRequest::new(CommandKind::Read, command, params);
        debug!(command, request_id = %request.request_id, "sending read");

        match self.transport.send(&request).await {
            Ok(response) => {
                self.store.apply_all(&response.updates)?;
                self.store.apply_all(&triple.success)?;
                Ok(Settlement::Succeeded)
            }
            Err(err) => {
                warn!(command, "read failed: {}", err);
                self.store.apply_all(err.server_updates())?;
                self.store.apply_all(&triple.failure)?;
                Ok(Settlement::Failed(err.kind()))
            }
        }
    }

    fn abandon_pending(&self) -> Result<usize> {
        let drained: Vec<QueuedWrite> = self.queue.lock()?.drain(..).collect();
        let count = drained.len();

        for entry in drained {
            let command = entry.request.command.clone();
            self.apply_logged(entry.settlement_ops(Branch::Failure), &command, "failure");
            self.counters.abandoned.fetch_add(1, Ordering::Relaxed);
            self.activity
                .send_modify(|a| a.outstanding = a.outstanding.saturating_sub(1));
            for waiter in entry.waiters {
                let _ = waiter.send(Settlement::Failed(FailureKind::Abandoned));
            }
        }

        if count > 0 {
            info!(count, "abandoned queued writes");
        }
        Ok(count)
    }

    fn apply_logged<'a>(
        &self,
        ops: impl IntoIterator<Item = &'a UpdateOperation>,
        command: &str,
        branch: &str,
    ) {
        let ops: Vec<UpdateOperation> = ops.into_iter().cloned().collect();
        if ops.is_empty() {
            return;
        }
        if let Err(e) = self.store.apply_all(&ops) {
            error!(command, branch, "failed to apply settlement updates: {}", e);
        }
    }
}

fn ensure_object_params(command: &str, params: &Value) -> Result<()> {
    if params.is_object() {
        Ok(())
    } else {
        Err(MirrorError::InvalidParams(format!(
            "params of '{}' must be a JSON object",
            command
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connection::config::StorePolicy;
    use crate::dispatcher::scripted::ScriptedTransport;
    use crate::dispatcher::transport::TransportError;
    use serde_json::json;

    fn setup() -> (MirrorStore, Arc<ScriptedTransport>, CommandDispatcher) {
        let store = MirrorStore::new(StorePolicy::default());
        store.init(serde_json::Map::new()).unwrap();
        let transport = Arc::new(ScriptedTransport::new());
        let dispatcher =
            CommandDispatcher::start(store.clone(), transport.clone(), DispatcherPolicy::default());
        (store, transport, dispatcher)
    }

    fn rename_triple(name: &str, previous: &str) -> UpdateTriple {
        UpdateTriple::builder()
            .optimistic(UpdateOperation::merge(
                "policy_1",
                json!({"name": name, "pendingFields": {"name": "update"}}),
            ))
            .success(UpdateOperation::merge(
                "policy_1",
                json!({"pendingFields": {"name": null}}),
            ))
            .failure(UpdateOperation::merge(
                "policy_1",
                json!({"name": previous, "pendingFields": {"name": null}}),
            ))
            .build()
            .unwrap()
    }

    #[tokio::test]
    async fn test_optimistic_then_success() {
        let (store, transport, dispatcher) = setup();
        transport.pause();

        let handle = dispatcher
            .write("RenamePolicy", json!({"policyID": "1"}), rename_triple("New", "Old"))
            .unwrap();
        transport.wait_for_requests(1).await;
        assert_eq!(
            store.value("policy_1").unwrap().unwrap()["pendingFields"]["name"],
            json!("update")
        );

        transport.resume();
        assert_eq!(handle.settled().await.unwrap(), Settlement::Succeeded);
        let policy = store.value("policy_1").unwrap().unwrap();
        assert_eq!(policy["name"], json!("New"));
        assert!(policy["pendingFields"].get("name").is_none());
    }

    #[tokio::test]
    async fn test_failure_reverts() {
        let (store, transport, dispatcher) = setup();
        transport.fail_with("RenamePolicy", TransportError::validation("taken"));

        let settlement = dispatcher
            .write("RenamePolicy", json!({"policyID": "1"}), rename_triple("New", "Old"))
            .unwrap()
            .settled()
            .await
            .unwrap();

        assert_eq!(settlement, Settlement::Failed(FailureKind::Validation));
        assert_eq!(store.value("policy_1").unwrap().unwrap()["name"], json!("Old"));
        assert_eq!(dispatcher.stats().failed, 1);
    }

    #[tokio::test]
    async fn test_no_duplicates_folds_queued_writes() {
        let (store, transport, dispatcher) = setup();
        dispatcher.set_offline(true);

        let options = WriteOptions::no_duplicates("policyID");
        let first = dispatcher
            .write_with_options(
                "RenamePolicy",
                json!({"policyID": "1", "name": "A"}),
                rename_triple("A", "Old"),
                options.clone(),
            )
            .unwrap();
        let second = dispatcher
            .write_with_options(
                "RenamePolicy",
                json!({"policyID": "1", "name": "B"}),
                rename_triple("B", "A"),
                options,
            )
            .unwrap();
        assert_eq!(dispatcher.stats().queued, 1);

        transport.fail_with("RenamePolicy", TransportError::Network("down".into()));
        dispatcher.set_offline(false);

        assert_eq!(
            first.settled().await.unwrap(),
            Settlement::Failed(FailureKind::Network)
        );
        assert_eq!(
            second.settled().await.unwrap(),
            Settlement::Failed(FailureKind::Network)
        );
        // Newest failure branch first, so the oldest value wins
        assert_eq!(store.value("policy_1").unwrap().unwrap()["name"], json!("Old"));

        let requests = transport.requests();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].params["name"], json!("B"));
    }

    #[tokio::test]
    async fn test_abandon_pending_applies_failure() {
        let (store, _transport, dispatcher) = setup();
        dispatcher.set_offline(true);

        let handle = dispatcher
            .write("RenamePolicy", json!({"policyID": "1"}), rename_triple("New", "Old"))
            .unwrap();
        assert_eq!(dispatcher.abandon_pending().unwrap(), 1);
        assert_eq!(
            handle.settled().await.unwrap(),
            Settlement::Failed(FailureKind::Abandoned)
        );
        assert_eq!(store.value("policy_1").unwrap().unwrap()["name"], json!("Old"));
        assert_eq!(dispatcher.stats().outstanding, 0);
    }

    #[tokio::test]
    async fn test_queue_full() {
        let store = MirrorStore::new(StorePolicy::default());
        store.init(serde_json::Map::new()).unwrap();
        let transport = Arc::new(ScriptedTransport::new());
        let policy = DispatcherPolicy {
            max_queue_len: 1,
            coalesce_no_duplicates: true,
        };
        let dispatcher = CommandDispatcher::start(store, transport, policy);
        dispatcher.set_offline(true);

        dispatcher
            .write("RenamePolicy", json!({}), rename_triple("A", "Old"))
            .unwrap();
        let err = dispatcher
            .write("RenamePolicy", json!({}), rename_triple("B", "A"))
            .unwrap_err();
        assert!(matches!(err, MirrorError::QueueFull(1)));
    }

    #[tokio::test]
    async fn test_folding_rolls_back_superseded_write() {
        let (store, transport, dispatcher) = setup();
        dispatcher.set_offline(true);

        let options = WriteOptions::no_duplicates("policyID");
        let recolor = UpdateTriple::builder()
            .optimistic(UpdateOperation::merge(
                "policy_1",
                json!({"name": "A", "color": "red"}),
            ))
            .failure(UpdateOperation::merge(
                "policy_1",
                json!({"name": "Old", "color": null}),
            ))
            .build()
            .unwrap();
        let first = dispatcher
            .write_with_options("RenamePolicy", json!({"policyID": "1"}), recolor, options.clone())
            .unwrap();
        let second = dispatcher
            .write_with_options(
                "RenamePolicy",
                json!({"policyID": "1"}),
                rename_triple("B", "A"),
                options,
            )
            .unwrap();

        let policy = store.value("policy_1").unwrap().unwrap();
        assert_eq!(policy["name"], json!("B"));
        assert!(policy.get("color").is_none());

        dispatcher.set_offline(false);
        assert_eq!(first.settled().await.unwrap(), Settlement::Succeeded);
        assert_eq!(second.settled().await.unwrap(), Settlement::Succeeded);
        assert_eq!(transport.requests().len(), 1);

        let policy = store.value("policy_1").unwrap().unwrap();
        assert_eq!(policy["name"], json!("B"));
        assert!(policy.get("color").is_none());
        assert!(policy["pendingFields"].get("name").is_none());
    }

    #[tokio::test]
    async fn test_standard_write_is_never_folded() {
        let (_store, transport, dispatcher) = setup();
        dispatcher.set_offline(true);

        dispatcher
            .write("RenamePolicy", json!({"policyID": "1"}), rename_triple("A", "Old"))
            .unwrap();
        dispatcher
            .write_with_options(
                "RenamePolicy",
                json!({"policyID": "1"}),
                rename_triple("B", "A"),
                WriteOptions::no_duplicates("policyID"),
            )
            .unwrap();
        assert_eq!(dispatcher.stats().queued, 2);
        assert_eq!(dispatcher.stats().coalesced, 0);

        dispatcher.set_offline(false);
        transport.wait_for_requests(2).await;
    }

    #[tokio::test]
    async fn test_folding_is_allowed_on_a_full_queue() {
        let store = MirrorStore::new(StorePolicy::default());
        store.init(serde_json::Map::new()).unwrap();
        let transport = Arc::new(ScriptedTransport::new());
        let policy = DispatcherPolicy {
            max_queue_len: 1,
            coalesce_no_duplicates: true,
        };
        let dispatcher = CommandDispatcher::start(store.clone(), transport, policy);
        dispatcher.set_offline(true);

        let options = WriteOptions::no_duplicates("policyID");
        dispatcher
            .write_with_options(
                "RenamePolicy",
                json!({"policyID": "1"}),
                rename_triple("A", "Old"),
                options.clone(),
            )
            .unwrap();
        dispatcher
            .write_with_options(
                "RenamePolicy",
                json!({"policyID": "1"}),
                rename_triple("B", "A"),
                options,
            )
            .unwrap();

        assert_eq!(dispatcher.stats().queued, 1);
        assert_eq!(store.value("policy_1").unwrap().unwrap()["name"], json!("B"));
    }

    #[tokio::test]
    async fn test_shutdown_rejects_new_writes() {
        let (_store, _transport, dispatcher) = setup();
        dispatcher.shutdown().await.unwrap();

        let err = dispatcher
            .write("RenamePolicy", json!({}), UpdateTriple::default())
            .unwrap_err();
        assert!(matches!(err, MirrorError::DispatcherClosed));
    }

    #[tokio::test]
    async fn test_params_must_be_an_object() {
        let (store, _transport, dispatcher) = setup();

        let err = dispatcher
            .write("RenamePolicy", json!(["1"]), rename_triple("New", "Old"))
            .unwrap_err();
        assert!(matches!(err, MirrorError::InvalidParams(_)));
        assert!(store.value("policy_1").unwrap().is_none());
    }
}
