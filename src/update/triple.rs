// ============================================================================
// Update Triples
// ============================================================================
//
// Every dispatched mutation carries three update lists:
// - optimistic: applied before the remote call is issued
// - success:    applied after the remote call confirms
// - failure:    applied after the remote call fails
//
// `TripleBuilder::build` refuses triples that leave an optimistic pending
// marker unreconciled by either settlement branch.
//
// ============================================================================

use super::markers::pending_marker_paths;
use super::operation::{KeyWrite, UpdateOperation};
use crate::core::{MirrorError, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateTriple {
    #[serde(default, rename = "optimisticData")]
    pub optimistic: Vec<UpdateOperation>,
    #[serde(default, rename = "successData")]
    pub success: Vec<UpdateOperation>,
    #[serde(default, rename = "failureData")]
    pub failure: Vec<UpdateOperation>,
}

/// Which settlement branch to apply.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Branch {
    Optimistic,
    Success,
    Failure,
}

impl Branch {
    pub fn as_str(&self) -> &'static str {
        match self {
            Branch::Optimistic => "optimistic",
            Branch::Success => "success",
            Branch::Failure => "failure",
        }
    }
}

impl UpdateTriple {
    pub fn builder() -> TripleBuilder {
        TripleBuilder::default()
    }

    pub fn is_empty(&self) -> bool {
        self.optimistic.is_empty() && self.success.is_empty() && self.failure.is_empty()
    }

    pub fn branch(&self, branch: Branch) -> &[UpdateOperation] {
        match branch {
            Branch::Optimistic => &self.optimistic,
            Branch::Success => &self.success,
            Branch::Failure => &self.failure,
        }
    }

    /// Append another triple's branches after this one's.
    pub fn extend(&mut self, other: UpdateTriple) {
        self.optimistic.extend(other.optimistic);
        self.success.extend(other.success);
        self.failure.extend(other.failure);
    }

    /// Check keys and collection membership of every operation.
    pub fn validate_operations(&self) -> Result<()> {
        for op in self
            .optimistic
            .iter()
            .chain(&self.success)
            .chain(&self.failure)
        {
            op.validate()?;
        }
        Ok(())
    }

    /// Check operation shapes and that every optimistic pending marker is
    /// reconciled by both the success and the failure branch.
    pub fn validate(&self) -> Result<()> {
        self.validate_operations()?;

        for op in &self.optimistic {
            for (key, write) in op.key_writes() {
                for path in pending_marker_paths(write.payload()) {
                    for (branch, ops) in [("success", &self.success), ("failure", &self.failure)] {
                        if !branch_clears_marker(ops, key, &path) {
                            return Err(MirrorError::InvalidTriple {
                                key: key.to_string(),
                                path: path.join("."),
                                branch,
                            });
                        }
                    }
                }
            }
        }
        Ok(())
    }
}

/// Does any write in `ops` leave `key` without a pending marker at `path`?
fn branch_clears_marker(ops: &[UpdateOperation], key: &str, path: &[String]) -> bool {
    ops.iter()
        .flat_map(UpdateOperation::key_writes)
        .filter(|(write_key, _)| *write_key == key)
        .any(|(_, write)| match write {
            KeyWrite::Replace(value) => marker_absent(value, path),
            KeyWrite::Merge(value) => merge_clears_path(value, path),
        })
}

fn marker_absent(value: &Value, path: &[String]) -> bool {
    let mut current = value;
    for segment in path {
        match current.as_object().and_then(|fields| fields.get(segment)) {
            Some(next) => current = next,
            None => return true,
        }
    }
    current.is_null()
}

/// A merge clears the marker when it writes `null` at the marker or at an
/// ancestor, or replaces an ancestor with a non-object.
fn merge_clears_path(patch: &Value, path: &[String]) -> bool {
    let mut current = patch;
    for segment in path {
        match current {
            Value::Null => return true,
            Value::Object(fields) => match fields.get(segment) {
                Some(next) => current = next,
                None => return false,
            },
            _ => return true,
        }
    }
    current.is_null()
}

/// Collects the three branches and validates them on `build`.
#[derive(Debug, Default)]
pub struct TripleBuilder {
    triple: UpdateTriple,
}

impl TripleBuilder {
    pub fn optimistic(mut self, op: UpdateOperation) -> Self {
        self.triple.optimistic.push(op);
        self
    }

    pub fn success(mut self, op: UpdateOperation) -> Self {
        self.triple.success.push(op);
        self
    }

    pub fn failure(mut self, op: UpdateOperation) -> Self {
        self.triple.failure.push(op);
        self
    }

    pub fn optimistic_all(mut self, ops: impl IntoIterator<Item = UpdateOperation>) -> Self {
        self.triple.optimistic.extend(ops);
        self
    }

    pub fn success_all(mut self, ops: impl IntoIterator<Item = UpdateOperation>) -> Self {
        self.triple.success.extend(ops);
        self
    }

    pub fn failure_all(mut self, ops: impl IntoIterator<Item = UpdateOperation>) -> Self {
        self.triple.failure.extend(ops);
        self
    }

    pub fn build(self) -> Result<UpdateTriple> {
        self.triple.validate()?;
        Ok(self.triple)
    }

    /// Skip marker validation. Operation shapes are still checked.
    pub fn build_unchecked(self) -> Result<UpdateTriple> {
        self.triple.validate_operations()?;
        Ok(self.triple)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn toggle_optimistic() -> UpdateOperation {
        UpdateOperation::merge(
            "policy_1",
            json!({"areDistanceRatesEnabled": true, "pendingFields": {"areDistanceRatesEnabled": "update"}}),
        )
    }

    #[test]
    fn test_build_accepts_reconciled_markers() {
        let triple = UpdateTriple::builder()
            .optimistic(toggle_optimistic())
            .success(UpdateOperation::merge(
                "policy_1",
                json!({"pendingFields": {"areDistanceRatesEnabled": null}}),
            ))
            .failure(UpdateOperation::merge(
                "policy_1",
                json!({"areDistanceRatesEnabled": false, "pendingFields": {"areDistanceRatesEnabled": null}}),
            ))
            .build()
            .unwrap();

        assert_eq!(triple.optimistic.len(), 1);
        assert!(!triple.is_empty());
    }

    #[test]
    fn test_build_rejects_missing_failure_cleanup() {
        let err = UpdateTriple::builder()
            .optimistic(toggle_optimistic())
            .success(UpdateOperation::merge(
                "policy_1",
                json!({"pendingFields": {"areDistanceRatesEnabled": null}}),
            ))
            .failure(UpdateOperation::merge(
                "policy_1",
                json!({"areDistanceRatesEnabled": false}),
            ))
            .build()
            .unwrap_err();

        match err {
            MirrorError::InvalidTriple { key, path, branch } => {
                assert_eq!(key, "policy_1");
                assert_eq!(path, "pendingFields.areDistanceRatesEnabled");
                assert_eq!(branch, "failure");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_removing_ancestor_clears_marker() {
        let triple = UpdateTriple::builder()
            .optimistic(UpdateOperation::merge(
                "fundList",
                json!({"42": {"pendingAction": "delete"}}),
            ))
            .success(UpdateOperation::merge("fundList", json!({"42": null})))
            .failure(UpdateOperation::set("fundList", json!({"42": {"isDefault": true}})))
            .build();
        assert!(triple.is_ok());
    }

    #[test]
    fn test_replacement_that_keeps_marker_is_rejected() {
        let result = UpdateTriple::builder()
            .optimistic(UpdateOperation::merge("fundList", json!({"42": {"pendingAction": "add"}})))
            .success(UpdateOperation::set("fundList", json!({"42": {"pendingAction": "add"}})))
            .failure(UpdateOperation::merge("fundList", json!({"42": null})))
            .build();
        assert!(matches!(
            result,
            Err(MirrorError::InvalidTriple { branch: "success", .. })
        ));
    }

    #[test]
    fn test_build_unchecked_skips_marker_validation() {
        let triple = UpdateTriple::builder()
            .optimistic(toggle_optimistic())
            .build_unchecked()
            .unwrap();
        assert!(triple.validate().is_err());
    }

    #[test]
    fn test_triple_wire_names() {
        let triple: UpdateTriple = serde_json::from_value(json!({
            "optimisticData": [{"onyxMethod": "set", "key": "walletTerms", "value": {}}],
            "failureData": []
        }))
        .unwrap();
        assert_eq!(triple.optimistic.len(), 1);
        assert!(triple.success.is_empty());
        assert_eq!(triple.branch(Branch::Optimistic).len(), 1);
    }
}
