// ============================================================================
// Update Operations
// ============================================================================
//
// One store write, tagged by method. The serialized form matches the update
// lists exchanged with the server (`{"onyxMethod": "merge", "key": .., "value": ..}`),
// so server-pushed updates and locally built updates share one type.
//
// ============================================================================

use crate::core::{MirrorError, Result};
use crate::keys::validate_key;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "onyxMethod", rename_all = "lowercase")]
pub enum UpdateOperation {
    /// Replace the value at `key`. A `null` value removes the key.
    Set { key: String, value: Value },

    /// Deep-merge `value` into the value at `key`.
    Merge { key: String, value: Value },

    /// Merge every entry; each entry key must start with the collection prefix `key`.
    #[serde(rename = "mergecollection")]
    MergeCollection {
        key: String,
        value: Map<String, Value>,
    },

    /// Replace many keys at once.
    #[serde(rename = "multiset")]
    MultiSet { value: Map<String, Value> },
}

/// A single-key write produced by expanding an operation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum KeyWrite<'a> {
    Replace(&'a Value),
    Merge(&'a Value),
}

impl KeyWrite<'_> {
    pub fn payload(&self) -> &Value {
        match self {
            KeyWrite::Replace(value) | KeyWrite::Merge(value) => value,
        }
    }
}

impl UpdateOperation {
    pub fn set(key: impl Into<String>, value: Value) -> Self {
        UpdateOperation::Set {
            key: key.into(),
            value,
        }
    }

    pub fn merge(key: impl Into<String>, value: Value) -> Self {
        UpdateOperation::Merge {
            key: key.into(),
            value,
        }
    }

    pub fn merge_collection(
        prefix: impl Into<String>,
        entries: impl IntoIterator<Item = (String, Value)>,
    ) -> Self {
        UpdateOperation::MergeCollection {
            key: prefix.into(),
            value: entries.into_iter().collect(),
        }
    }

    pub fn multi_set(entries: impl IntoIterator<Item = (String, Value)>) -> Self {
        UpdateOperation::MultiSet {
            value: entries.into_iter().collect(),
        }
    }

    /// Short method name, used in logs.
    pub fn method(&self) -> &'static str {
        match self {
            UpdateOperation::Set { .. } => "set",
            UpdateOperation::Merge { .. } => "merge",
            UpdateOperation::MergeCollection { .. } => "mergecollection",
            UpdateOperation::MultiSet { .. } => "multiset",
        }
    }

    /// Expand into per-key writes, in payload order.
    pub fn key_writes(&self) -> Vec<(&str, KeyWrite<'_>)> {
        match self {
            UpdateOperation::Set { key, value } => vec![(key.as_str(), KeyWrite::Replace(value))],
            UpdateOperation::Merge { key, value } => vec![(key.as_str(), KeyWrite::Merge(value))],
            UpdateOperation::MergeCollection { value, .. } => value
                .iter()
                .map(|(key, entry)| (key.as_str(), KeyWrite::Merge(entry)))
                .collect(),
            UpdateOperation::MultiSet { value } => value
                .iter()
                .map(|(key, entry)| (key.as_str(), KeyWrite::Replace(entry)))
                .collect(),
        }
    }

    /// Keys this operation touches.
    pub fn keys(&self) -> Vec<&str> {
        self.key_writes().into_iter().map(|(key, _)| key).collect()
    }

    pub fn validate(&self) -> Result<()> {
        if let UpdateOperation::MergeCollection { key: prefix, value } = self {
            validate_key(prefix)?;
            if let Some(stray) = value.keys().find(|member| !member.starts_with(prefix.as_str())) {
                return Err(MirrorError::InvalidUpdate(format!(
                    "mergecollection entry '{}' does not belong to collection '{}'",
                    stray, prefix
                )));
            }
        }

        for (key, _) in self.key_writes() {
            validate_key(key)?;
        }
        Ok(())
    }
}
