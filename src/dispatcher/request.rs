use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CommandKind {
    Read,
    Write,
}

/// One command as handed to a transport.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommandRequest {
    /// Unique ID of this network request.
    pub request_id: Uuid,
    pub kind: CommandKind,
    /// Name of the remote command, e.g. `EnablePolicyDistanceRates`.
    pub command: String,
    /// JSON object of parameters.
    pub params: Value,
    /// Timestamp when the request was created.
    pub created_at: DateTime<Utc>,
}

impl CommandRequest {
    pub fn new(kind: CommandKind, command: impl Into<String>, params: Value) -> Self {
        Self {
            request_id: Uuid::new_v4(),
            kind,
            command: command.into(),
            params,
            created_at: Utc::now(),
        }
    }

    pub fn param(&self, name: &str) -> Option<&Value> {
        self.params.get(name)
    }
}

/// How a write is queued.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum WriteMode {
    /// Every write is sent on its own.
    #[default]
    Standard,
    /// A queued, unsent write with the same command and the same value of
    /// `params[conflict_field]` is folded into this one.
    NoDuplicates { conflict_field: String },
}

/// A read issued after a write fails with a conflict, to resync the mirror.
#[derive(Debug, Clone, PartialEq)]
pub struct RefetchCommand {
    pub command: String,
    pub params: Value,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct WriteOptions {
    pub mode: WriteMode,
    pub refetch_on_conflict: Option<RefetchCommand>,
}

impl WriteOptions {
    pub fn no_duplicates(conflict_field: impl Into<String>) -> Self {
        Self {
            mode: WriteMode::NoDuplicates {
                conflict_field: conflict_field.into(),
            },
            refetch_on_conflict: None,
        }
    }

    pub fn refetch_on_conflict(mut self, command: impl Into<String>, params: Value) -> Self {
        self.refetch_on_conflict = Some(RefetchCommand {
            command: command.into(),
            params,
        });
        self
    }
}

/// Why a mutation was routed to its failure branch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FailureKind {
    /// The server rejected the parameters.
    Validation,
    /// The server could not be reached.
    Network,
    /// Server state diverged from what the optimistic branch assumed.
    Conflict,
    /// The command was queued and then dropped before it was sent.
    Abandoned,
}

/// How a dispatched mutation ended. Exactly one settlement per mutation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Settlement {
    Succeeded,
    Failed(FailureKind),
}

impl Settlement {
    pub fn is_success(&self) -> bool {
        matches!(self, Settlement::Succeeded)
    }

    pub fn failure_kind(&self) -> Option<FailureKind> {
        match self {
            Settlement::Succeeded => None,
            Settlement::Failed(kind) => Some(*kind),
        }
    }
}
