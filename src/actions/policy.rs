use crate::core::Result;
use crate::keys::{collection, collection_key, member_id};
use crate::storage::{KeyState, MirrorStore, SubscriptionId};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use tracing::{debug, warn};

/// Draft keys to null out once `policy_id` is gone: the draft comment and
/// the actions draft of every report that belongs to the policy.
pub fn build_policy_removal_cleanup(
    policy_id: &str,
    reports: &BTreeMap<String, Value>,
) -> Map<String, Value> {
    let mut cleanup = Map::new();
    for (key, report) in reports {
        if report.get("policyID").and_then(Value::as_str) != Some(policy_id) {
            continue;
        }
        let report_id = match report.get("reportID") {
            Some(Value::String(id)) => id.clone(),
            Some(Value::Number(id)) => id.to_string(),
            _ => match member_id(collection::REPORT, key) {
                Some(id) => id.to_string(),
                None => continue,
            },
        };
        cleanup.insert(
            collection_key(collection::REPORT_DRAFT_COMMENT, &report_id),
            Value::Null,
        );
        cleanup.insert(
            collection_key(collection::REPORT_ACTIONS_DRAFTS, &report_id),
            Value::Null,
        );
    }
    cleanup
}

/// Watches the policy collection and clears report drafts of removed policies.
pub struct PolicyCleanup {
    store: MirrorStore,
    subscription: SubscriptionId,
}

impl PolicyCleanup {
    pub fn install(store: &MirrorStore) -> Result<Self> {
        let cleanup_store = store.clone();
        let subscription = store.connect_collection(collection::POLICY, move |key, state| {
            if !matches!(state, KeyState::Absent) {
                return;
            }
            let Some(policy_id) = member_id(collection::POLICY, key) else {
                return;
            };
            if let Err(e) = cascade_policy_removal(&cleanup_store, policy_id) {
                warn!(policy_id, "policy cleanup failed: {}", e);
            }
        })?;

        Ok(Self {
            store: store.clone(),
            subscription,
        })
    }

    pub fn subscription(&self) -> SubscriptionId {
        self.subscription
    }

    pub fn uninstall(self) -> Result<bool> {
        self.store.disconnect(self.subscription)
    }
}

fn cascade_policy_removal(store: &MirrorStore, policy_id: &str) -> Result<()> {
    let reports = store.get_collection(collection::REPORT)?;
    let cleanup = build_policy_removal_cleanup(policy_id, &reports);
    if cleanup.is_empty() {
        return Ok(());
    }
    debug!(policy_id, keys = cleanup.len(), "clearing drafts of removed policy");
    store.multi_set(cleanup)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connection::config::StorePolicy;
    use serde_json::json;

    #[test]
    fn test_cleanup_targets_only_reports_of_the_policy() {
        let mut reports = BTreeMap::new();
        reports.insert("report_1".to_string(), json!({"reportID": "1", "policyID": "A"}));
        reports.insert("report_2".to_string(), json!({"reportID": "2", "policyID": "B"}));
        reports.insert("report_3".to_string(), json!({"policyID": "A"}));

        let cleanup = build_policy_removal_cleanup("A", &reports);
        let keys: Vec<&str> = cleanup.keys().map(String::as_str).collect();
        assert_eq!(
            keys,
            vec![
                "reportDraftComment_1",
                "reportActionsDrafts_1",
                "reportDraftComment_3",
                "reportActionsDrafts_3"
            ]
        );
    }

    #[test]
    fn test_removing_policy_clears_drafts() {
        let initial = json!({
            "policy_A": {"name": "Team"},
            "report_1": {"reportID": "1", "policyID": "A"},
            "reportDraftComment_1": "half-written",
            "reportActionsDrafts_1": {"a1": "edit"},
            "reportDraftComment_9": "keep me",
        });
        let store =
            MirrorStore::with_state(StorePolicy::default(), initial.as_object().unwrap().clone())
                .unwrap();
        let cleanup = PolicyCleanup::install(&store).unwrap();

        store.set("policy_A", Value::Null).unwrap();

        assert_eq!(store.get("reportDraftComment_1").unwrap(), KeyState::Absent);
        assert_eq!(store.get("reportActionsDrafts_1").unwrap(), KeyState::Absent);
        assert!(store.value("reportDraftComment_9").unwrap().is_some());
        assert!(cleanup.uninstall().unwrap());
    }
}
