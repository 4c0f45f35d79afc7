// ============================================================================
// Command Transport
// ============================================================================
//
// The only thing the dispatcher needs from the network layer: send one
// command, get back either the server's updates or a classified error.
// Retrying is a transport concern; `RetryingTransport` adds it around any
// other transport.
//
// ============================================================================

use super::request::{CommandRequest, FailureKind};
use crate::connection::config::RetryPolicy;
use crate::update::UpdateOperation;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::time::sleep;
use tracing::warn;

pub const JSON_CODE_SUCCESS: i64 = 200;

/// Successful response to a command.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommandResponse {
    #[serde(default = "default_json_code")]
    pub json_code: i64,
    /// Updates pushed by the server, applied before the success branch.
    #[serde(default, rename = "onyxData")]
    pub updates: Vec<UpdateOperation>,
    #[serde(default)]
    pub message: Option<String>,
}

fn default_json_code() -> i64 {
    JSON_CODE_SUCCESS
}

impl CommandResponse {
    pub fn ok() -> Self {
        Self {
            json_code: JSON_CODE_SUCCESS,
            updates: Vec::new(),
            message: None,
        }
    }

    pub fn with_updates(updates: Vec<UpdateOperation>) -> Self {
        Self {
            updates,
            ..Self::ok()
        }
    }
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum TransportError {
    #[error("network error: {0}")]
    Network(String),

    #[error("validation error: {message}")]
    Validation {
        message: String,
        updates: Vec<UpdateOperation>,
    },

    #[error("conflict: {message}")]
    Conflict {
        message: String,
        updates: Vec<UpdateOperation>,
    },

    #[error("command abandoned before it was sent")]
    Abandoned,
}

impl TransportError {
    pub fn validation(message: impl Into<String>) -> Self {
        TransportError::Validation {
            message: message.into(),
            updates: Vec::new(),
        }
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        TransportError::Conflict {
            message: message.into(),
            updates: Vec::new(),
        }
    }

    pub fn kind(&self) -> FailureKind {
        match self {
            TransportError::Network(_) => FailureKind::Network,
            TransportError::Validation { .. } => FailureKind::Validation,
            TransportError::Conflict { .. } => FailureKind::Conflict,
            TransportError::Abandoned => FailureKind::Abandoned,
        }
    }

    /// Updates the server attached to a rejection, applied before the failure branch.
    pub fn server_updates(&self) -> &[UpdateOperation] {
        match self {
            TransportError::Validation { updates, .. } | TransportError::Conflict { updates, .. } => {
                updates
            }
            _ => &[],
        }
    }
}

#[async_trait]
pub trait Transport: Send + Sync {
    async fn send(&self, request: &CommandRequest) -> Result<CommandResponse, TransportError>;
}

/// Retries network failures with exponential backoff. Validation and
/// conflict errors are returned immediately.
pub struct RetryingTransport<T> {
    inner: T,
    policy: RetryPolicy,
}

impl<T: Transport> RetryingTransport<T> {
    pub fn new(inner: T, policy: RetryPolicy) -> Self {
        Self { inner, policy }
    }

    pub fn inner(&self) -> &T {
        &self.inner
    }
}

#[async_trait]
impl<T: Transport> Transport for RetryingTransport<T> {
    async fn send(&self, request: &CommandRequest) -> Result<CommandResponse, TransportError> {
        let mut attempt = 1;
        loop {
            match self.inner.send(request).await {
                Err(TransportError::Network(reason)) if attempt < self.policy.max_attempts => {
                    let backoff = self.policy.backoff_for(attempt);
                    warn!(
                        command = %request.command,
                        attempt,
                        backoff_ms = backoff.as_millis() as u64,
                        "network failure, retrying: {}",
                        reason
                    );
                    sleep(backoff).await;
                    attempt += 1;
                }
                outcome => return outcome,
            }
        }
    }
}

#[async_trait]
impl<T: Transport + ?Sized> Transport for std::sync::Arc<T> {
    async fn send(&self, request: &CommandRequest) -> Result<CommandResponse, TransportError> {
        (**self).send(request).await
    }
}
