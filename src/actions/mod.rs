// ============================================================================
// Actions
// ============================================================================
//
// Each user action reads what it needs from the mirror store, builds an
// update triple with a pure `build_*` function, and hands both to the
// dispatcher. Failure branches only ever carry values captured here, at
// build time.
//
// ============================================================================

pub mod commands;
pub mod distance_rate;
pub mod models;
pub mod payment_methods;
pub mod per_diem;
pub mod policy;

use crate::core::{MirrorError, Result};
use crate::dispatcher::{CommandDispatcher, WriteHandle, WriteOptions};
use crate::keys::{collection, collection_key};
use crate::storage::MirrorStore;
use crate::update::UpdateTriple;
use serde_json::{Map, Value, json};

pub use distance_rate::RateField;
pub use policy::PolicyCleanup;

/// A write ready to be dispatched.
#[derive(Debug, Clone, PartialEq)]
pub struct PreparedWrite {
    pub command: &'static str,
    pub params: Value,
    pub triple: UpdateTriple,
    pub options: WriteOptions,
}

impl PreparedWrite {
    pub fn new(command: &'static str, params: Value, triple: UpdateTriple) -> Self {
        Self {
            command,
            params,
            triple,
            options: WriteOptions::default(),
        }
    }

    pub fn with_options(mut self, options: WriteOptions) -> Self {
        self.options = options;
        self
    }
}

/// Action entry points bound to one store and dispatcher.
#[derive(Clone)]
pub struct Actions {
    store: MirrorStore,
    dispatcher: CommandDispatcher,
}

impl Actions {
    pub fn new(dispatcher: CommandDispatcher) -> Self {
        Self {
            store: dispatcher.store().clone(),
            dispatcher,
        }
    }

    pub fn store(&self) -> &MirrorStore {
        &self.store
    }

    pub fn dispatcher(&self) -> &CommandDispatcher {
        &self.dispatcher
    }

    pub fn dispatch(&self, prepared: PreparedWrite) -> Result<WriteHandle> {
        self.dispatcher.write_with_options(
            prepared.command,
            prepared.params,
            prepared.triple,
            prepared.options,
        )
    }
}

pub(crate) fn policy_key(policy_id: &str) -> Result<String> {
    if policy_id.is_empty() {
        return Err(MirrorError::InvalidParams("policyID must not be empty".into()));
    }
    Ok(collection_key(collection::POLICY, policy_id))
}

/// `{"customUnits": {id: patch}}`
pub(crate) fn custom_unit_patch(custom_unit_id: &str, patch: Value) -> Value {
    json!({ "customUnits": { custom_unit_id: patch } })
}

/// `{"customUnits": {id: {"rates": rates}}}`
pub(crate) fn rates_patch(custom_unit_id: &str, rates: Map<String, Value>) -> Value {
    custom_unit_patch(custom_unit_id, json!({ "rates": rates }))
}

/// A top-level field as it was when the action was built, or `null` so that
/// a failure merge removes it again.
pub(crate) fn captured_field(record: Option<&Value>, field: &str) -> Value {
    record
        .and_then(|record| record.get(field))
        .cloned()
        .unwrap_or(Value::Null)
}

/// Shallow overlay of `fields` onto an object value.
pub(crate) fn with_fields(value: Value, fields: Value) -> Value {
    match (value, fields) {
        (Value::Object(mut base), Value::Object(overlay)) => {
            for (name, field) in overlay {
                base.insert(name, field);
            }
            Value::Object(base)
        }
        (_, fields) => fields,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_with_fields_overrides_shallowly() {
        let merged = with_fields(
            json!({"a": 1, "pendingFields": {"x": "update"}}),
            json!({"pendingFields": {"y": null}, "b": 2}),
        );
        assert_eq!(merged, json!({"a": 1, "pendingFields": {"y": null}, "b": 2}));
    }

    #[test]
    fn test_captured_field_defaults_to_null() {
        let policy = json!({"areDistanceRatesEnabled": true});
        assert_eq!(captured_field(Some(&policy), "areDistanceRatesEnabled"), json!(true));
        assert_eq!(captured_field(Some(&policy), "arePerDiemRatesEnabled"), Value::Null);
        assert_eq!(captured_field(None, "areDistanceRatesEnabled"), Value::Null);
    }

    #[test]
    fn test_policy_key_rejects_empty_id() {
        assert_eq!(policy_key("A1").unwrap(), "policy_A1");
        assert!(matches!(policy_key(""), Err(MirrorError::InvalidParams(_))));
    }
}
