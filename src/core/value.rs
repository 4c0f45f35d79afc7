// ============================================================================
// Store Value Helpers
// ============================================================================
//
// Store values are plain JSON documents. Objects keep insertion order so that
// "first record by stored order" has a stable meaning.
//
// Merge rules:
// - object into object merges recursively
// - `null` inside a patch removes that field
// - arrays and scalars replace whatever was there
// - a top-level `null` patch removes the whole value
//
// ============================================================================

use serde_json::{Map, Value};

/// Merge `patch` on top of `target`, returning the new value.
///
/// `None` means the value was removed.
pub fn merge_values(target: Option<&Value>, patch: &Value) -> Option<Value> {
    match (target, patch) {
        (_, Value::Null) => None,
        (Some(Value::Object(existing)), Value::Object(changes)) => {
            let mut merged = existing.clone();
            merge_object_in_place(&mut merged, changes);
            Some(Value::Object(merged))
        }
        (_, other) => Some(strip_nulls(other)),
    }
}

/// Merge `changes` into `target` in place, keeping the position of existing fields.
pub fn merge_object_in_place(target: &mut Map<String, Value>, changes: &Map<String, Value>) {
    for (field, change) in changes {
        if change.is_null() {
            target.shift_remove(field);
            continue;
        }

        match (target.get_mut(field), change) {
            (Some(Value::Object(existing)), Value::Object(nested)) => {
                merge_object_in_place(existing, nested);
            }
            _ => {
                target.insert(field.clone(), strip_nulls(change));
            }
        }
    }
}

/// Remove `null` fields from objects, recursively. Arrays are kept as-is.
pub fn strip_nulls(value: &Value) -> Value {
    match value {
        Value::Object(fields) => Value::Object(
            fields
                .iter()
                .filter(|(_, v)| !v.is_null())
                .map(|(k, v)| (k.clone(), strip_nulls(v)))
                .collect(),
        ),
        other => other.clone(),
    }
}

/// Walk an object path, e.g. `["customUnits", "abc", "rates"]`.
pub fn value_at_path<'a>(value: &'a Value, path: &[&str]) -> Option<&'a Value> {
    path.iter()
        .try_fold(value, |current, segment| current.as_object()?.get(*segment))
}

/// Build `{a: {b: {c: leaf}}}` from a path and a leaf value.
pub fn nest_at_path(path: &[&str], leaf: Value) -> Value {
    path.iter().rev().fold(leaf, |inner, segment| {
        let mut wrapper = Map::new();
        wrapper.insert((*segment).to_string(), inner);
        Value::Object(wrapper)
    })
}

/// An object with no fields, or a `null`.
pub fn is_empty_value(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::Object(fields) => fields.is_empty(),
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_merge_into_absent_strips_nulls() {
        let merged = merge_values(None, &json!({"a": 1, "b": null, "c": {"d": null}})).unwrap();
        assert_eq!(merged, json!({"a": 1, "c": {}}));
    }

    #[test]
    fn test_merge_null_removes_value() {
        assert_eq!(merge_values(Some(&json!({"a": 1})), &Value::Null), None);
    }

    #[test]
    fn test_nested_merge_removes_and_replaces() {
        let base = json!({
            "name": "Workspace",
            "pendingFields": {"enabled": "update", "name": "update"},
            "list": [1, 2, 3]
        });
        let patch = json!({
            "pendingFields": {"enabled": null},
            "list": [4]
        });

        let merged = merge_values(Some(&base), &patch).unwrap();
        assert_eq!(
            merged,
            json!({"name": "Workspace", "pendingFields": {"name": "update"}, "list": [4]})
        );
    }

    #[test]
    fn test_merge_keeps_field_order() {
        let base = json!({"first": {"enabled": true}, "second": {"enabled": true}, "third": {}});
        let patch = json!({"first": null, "third": {"enabled": false}});

        let merged = merge_values(Some(&base), &patch).unwrap();
        let keys: Vec<&String> = merged.as_object().unwrap().keys().collect();
        assert_eq!(keys, vec!["second", "third"]);
    }

    #[test]
    fn test_scalar_patch_replaces_object() {
        let merged = merge_values(Some(&json!({"a": 1})), &json!(true)).unwrap();
        assert_eq!(merged, json!(true));
    }

    #[test]
    fn test_path_helpers() {
        let nested = nest_at_path(&["customUnits", "u1", "rates"], json!({"r1": {"enabled": true}}));
        assert_eq!(
            value_at_path(&nested, &["customUnits", "u1", "rates", "r1", "enabled"]),
            Some(&json!(true))
        );
        assert_eq!(value_at_path(&nested, &["customUnits", "missing"]), None);
        assert!(is_empty_value(&json!({})));
        assert!(!is_empty_value(&json!([])));
    }
}
