//! Pending and error markers carried on stored records.
//!
//! A record marks in-flight work with `pendingAction` (whole record) or
//! `pendingFields.<field>` (one field). Failures are recorded in `errors` and
//! `errorFields.<field>` as `{ "<microsecond timestamp>": "<message key>" }`.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};

pub const PENDING_ACTION: &str = "pendingAction";
pub const PENDING_FIELDS: &str = "pendingFields";
pub const ERRORS: &str = "errors";
pub const ERROR_FIELDS: &str = "errorFields";

pub const GENERIC_ERROR_MESSAGE: &str = "common.genericErrorMessage";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PendingAction {
    Add,
    Update,
    Delete,
}

impl PendingAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            PendingAction::Add => "add",
            PendingAction::Update => "update",
            PendingAction::Delete => "delete",
        }
    }
}

impl std::fmt::Display for PendingAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<PendingAction> for Value {
    fn from(action: PendingAction) -> Self {
        Value::String(action.as_str().to_string())
    }
}

/// `{ "<now in microseconds>": message_key }`
pub fn error_with_key(message_key: &str) -> Value {
    let mut map = Map::new();
    map.insert(Utc::now().timestamp_micros().to_string(), json!(message_key));
    Value::Object(map)
}

pub fn generic_error() -> Value {
    error_with_key(GENERIC_ERROR_MESSAGE)
}

/// `{"pendingFields": {field: action}}`; `None` clears the field's marker.
pub fn pending_field(field: &str, action: Option<PendingAction>) -> Value {
    json!({ PENDING_FIELDS: { field: action.map(Value::from).unwrap_or(Value::Null) } })
}

/// `{"errorFields": {field: <generic error>}}`
pub fn field_error(field: &str) -> Value {
    json!({ ERROR_FIELDS: { field: generic_error() } })
}

pub fn pending_action_of(record: &Value) -> Option<PendingAction> {
    record
        .get(PENDING_ACTION)
        .and_then(|v| serde_json::from_value(v.clone()).ok())
}

pub fn pending_field_of(record: &Value, field: &str) -> Option<PendingAction> {
    record
        .get(PENDING_FIELDS)
        .and_then(|fields| fields.get(field))
        .and_then(|v| serde_json::from_value(v.clone()).ok())
}

pub fn has_errors(record: &Value) -> bool {
    record
        .get(ERRORS)
        .and_then(Value::as_object)
        .is_some_and(|errors| !errors.is_empty())
}

pub fn has_field_error(record: &Value, field: &str) -> bool {
    record
        .get(ERROR_FIELDS)
        .and_then(|fields| fields.get(field))
        .and_then(Value::as_object)
        .is_some_and(|errors| !errors.is_empty())
}

/// Paths of every non-null pending marker inside a payload.
///
/// `pendingAction` yields the path to it; each non-null entry of
/// `pendingFields` yields `[.., "pendingFields", field]`.
pub fn pending_marker_paths(value: &Value) -> Vec<Vec<String>> {
    let mut found = Vec::new();
    collect_marker_paths(value, &mut Vec::new(), &mut found);
    found
}

fn collect_marker_paths(value: &Value, prefix: &mut Vec<String>, found: &mut Vec<Vec<String>>) {
    let Some(fields) = value.as_object() else {
        return;
    };

    for (name, child) in fields {
        if name == PENDING_ACTION {
            if !child.is_null() {
                let mut path = prefix.clone();
                path.push(name.clone());
                found.push(path);
            }
            continue;
        }

        if name == PENDING_FIELDS {
            if let Some(pending) = child.as_object() {
                for (field, marker) in pending {
                    if !marker.is_null() {
                        let mut path = prefix.clone();
                        path.push(name.clone());
                        path.push(field.clone());
                        found.push(path);
                    }
                }
            }
            continue;
        }

        prefix.push(name.clone());
        collect_marker_paths(child, prefix, found);
        prefix.pop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pending_action_serialization() {
        assert_eq!(serde_json::to_value(PendingAction::Delete).unwrap(), json!("delete"));
        assert_eq!(
            pending_action_of(&json!({"pendingAction": "add"})),
            Some(PendingAction::Add)
        );
        assert_eq!(pending_action_of(&json!({"pendingAction": null})), None);
    }

    #[test]
    fn test_generic_error_shape() {
        let error = generic_error();
        let entries = error.as_object().unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries.values().next().unwrap(), GENERIC_ERROR_MESSAGE);
    }

    #[test]
    fn test_field_markers() {
        let record = json!({
            "pendingFields": {"enabled": "update", "name": null},
            "errorFields": {"rate": {"1": "bad"}, "name": {}}
        });
        assert_eq!(pending_field_of(&record, "enabled"), Some(PendingAction::Update));
        assert_eq!(pending_field_of(&record, "name"), None);
        assert!(has_field_error(&record, "rate"));
        assert!(!has_field_error(&record, "name"));
        assert!(!has_errors(&record));
    }

    #[test]
    fn test_pending_marker_paths_skip_cleared_markers() {
        let payload = json!({
            "pendingFields": {"areDistanceRatesEnabled": "update"},
            "customUnits": {
                "u1": {
                    "rates": {
                        "r1": {"pendingAction": "delete"},
                        "r2": {"pendingAction": null, "pendingFields": {"enabled": null}}
                    }
                }
            }
        });

        let paths = pending_marker_paths(&payload);
        assert_eq!(
            paths,
            vec![
                vec!["pendingFields".to_string(), "areDistanceRatesEnabled".to_string()],
                vec![
                    "customUnits".to_string(),
                    "u1".to_string(),
                    "rates".to_string(),
                    "r1".to_string(),
                    "pendingAction".to_string()
                ],
            ]
        );
    }
}
