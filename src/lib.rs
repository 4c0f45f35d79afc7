// ============================================================================
// Mirror Store Library
// ============================================================================
//
// A local key-value mirror of server state, update triples that describe
// optimistic/success/failure mutations, and a dispatcher that sends each
// command and settles its triple against the store.
//
// ============================================================================

pub mod actions;
pub mod connection;
pub mod core;
pub mod dispatcher;
pub mod keys;
pub mod storage;
pub mod update;

// Re-export main types for convenience
pub use crate::core::{MirrorError, Result};
pub use storage::{KeyState, MirrorStore, SubscriptionId};
pub use update::{Branch, PendingAction, TripleBuilder, UpdateOperation, UpdateTriple};

// Re-export dispatcher API
pub use dispatcher::{
    CommandDispatcher, CommandRequest, CommandResponse, FailureKind, HttpTransport,
    RetryingTransport, ScriptedTransport, Settlement, Transport, TransportError, WriteHandle,
    WriteMode, WriteOptions,
};

// Re-export client API
pub use actions::{Actions, PreparedWrite};
pub use connection::{
    MirrorClient,
    config::{DispatcherPolicy, MirrorConfig, RetryPolicy, StorePolicy},
};
