// ============================================================================
// Distance Rates
// ============================================================================
//
// Mutations of a policy's distance custom unit and its rates. Only rates a
// mutation targets appear in its update payloads; every other rate is left
// exactly as stored.
//
// ============================================================================

use super::commands::{read, write};
use super::models::{CustomUnit, Rate, TransactionViolation, distance_custom_unit};
use super::{
    Actions, PreparedWrite, captured_field, custom_unit_patch, policy_key, rates_patch, with_fields,
};
use crate::core::{MirrorError, Result, value_at_path};
use crate::dispatcher::{Settlement, WriteHandle, WriteOptions};
use crate::keys::{collection, collection_key, member_id};
use crate::update::markers::{
    ERROR_FIELDS, ERRORS, PENDING_ACTION, PENDING_FIELDS, generic_error, pending_field,
};
use crate::update::{PendingAction, UpdateOperation, UpdateTriple};
use serde_json::{Map, Value, json};
use std::collections::BTreeMap;

const ARE_DISTANCE_RATES_ENABLED: &str = "areDistanceRatesEnabled";

/// A single editable rate field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RateField {
    Value,
    Name,
    TaxClaimablePercentage,
    TaxRateExternalId,
}

impl RateField {
    /// Name used under `pendingFields` and `errorFields`.
    pub fn marker_name(&self) -> &'static str {
        match self {
            RateField::Value => "rate",
            RateField::Name => "name",
            RateField::TaxClaimablePercentage => "taxClaimablePercentage",
            RateField::TaxRateExternalId => "taxRateExternalID",
        }
    }

    pub fn command(&self) -> &'static str {
        match self {
            RateField::Value => write::UPDATE_POLICY_DISTANCE_RATE_VALUE,
            RateField::Name => write::UPDATE_POLICY_DISTANCE_RATE_NAME,
            RateField::TaxClaimablePercentage => write::UPDATE_DISTANCE_TAX_CLAIMABLE_VALUE,
            RateField::TaxRateExternalId => write::UPDATE_POLICY_DISTANCE_TAX_RATE_VALUE,
        }
    }
}

/// Toggle the distance rates feature.
///
/// Disabling leaves exactly one rate enabled: the first in stored order.
/// The failure branch restores the captured flag and every rate's captured
/// `enabled` value.
pub fn build_enable_policy_distance_rates(
    policy_id: &str,
    enabled: bool,
    policy: Option<&Value>,
) -> Result<PreparedWrite> {
    let key = policy_key(policy_id)?;
    let previous = captured_field(policy, ARE_DISTANCE_RATES_ENABLED);

    let mut builder = UpdateTriple::builder()
        .optimistic(UpdateOperation::merge(
            &key,
            json!({
                ARE_DISTANCE_RATES_ENABLED: enabled,
                PENDING_FIELDS: { ARE_DISTANCE_RATES_ENABLED: PendingAction::Update },
            }),
        ))
        .success(UpdateOperation::merge(
            &key,
            pending_field(ARE_DISTANCE_RATES_ENABLED, None),
        ))
        .failure(UpdateOperation::merge(
            &key,
            json!({
                ARE_DISTANCE_RATES_ENABLED: previous,
                PENDING_FIELDS: { ARE_DISTANCE_RATES_ENABLED: null },
            }),
        ));

    if !enabled {
        if let Some(unit) = policy.map(distance_custom_unit).transpose()?.flatten() {
            let entries = unit.rate_entries()?;
            if let Some((first_id, _)) = entries.first() {
                let mut optimistic_rates = Map::new();
                let mut failure_rates = Map::new();
                for (id, rate) in &entries {
                    optimistic_rates.insert(id.clone(), json!({ "enabled": id == first_id }));
                    failure_rates.insert(id.clone(), json!({ "enabled": rate.enabled }));
                }
                builder = builder
                    .optimistic(UpdateOperation::merge(
                        &key,
                        rates_patch(&unit.custom_unit_id, optimistic_rates),
                    ))
                    .failure(UpdateOperation::merge(
                        &key,
                        rates_patch(&unit.custom_unit_id, failure_rates),
                    ));
            }
        }
    }

    Ok(PreparedWrite::new(
        write::ENABLE_POLICY_DISTANCE_RATES,
        json!({ "policyID": policy_id, "enabled": enabled }),
        builder.build()?,
    )
    .with_options(WriteOptions::no_duplicates("policyID")))
}

pub fn build_create_policy_distance_rate(
    policy_id: &str,
    custom_unit_id: &str,
    rate: &Rate,
) -> Result<PreparedWrite> {
    let key = policy_key(policy_id)?;
    let rate_id = rate.custom_unit_rate_id.as_str();
    if rate_id.is_empty() {
        return Err(MirrorError::InvalidParams("customUnitRateID must not be empty".into()));
    }

    let optimistic_rate = with_fields(rate.to_value()?, json!({ PENDING_ACTION: PendingAction::Add }));
    let triple = UpdateTriple::builder()
        .optimistic(UpdateOperation::merge(
            &key,
            rates_patch(custom_unit_id, single(rate_id, optimistic_rate)),
        ))
        .success(UpdateOperation::merge(
            &key,
            rates_patch(custom_unit_id, single(rate_id, json!({ PENDING_ACTION: null }))),
        ))
        .failure(UpdateOperation::merge(
            &key,
            rates_patch(
                custom_unit_id,
                single(rate_id, json!({ PENDING_ACTION: null, ERRORS: generic_error() })),
            ),
        ))
        .build()?;

    Ok(PreparedWrite::new(
        write::CREATE_POLICY_DISTANCE_RATE,
        json!({
            "policyID": policy_id,
            "customUnitID": custom_unit_id,
            "customUnitRate": serde_json::to_string(rate)?,
        }),
        triple,
    ))
}

/// Change the unit attributes. Rates are not part of any branch.
pub fn build_set_policy_distance_rates_unit(
    policy_id: &str,
    current: &CustomUnit,
    updated: &CustomUnit,
) -> Result<PreparedWrite> {
    let key = policy_key(policy_id)?;
    if current.custom_unit_id != updated.custom_unit_id {
        return Err(MirrorError::InvalidParams(format!(
            "custom unit id changed from '{}' to '{}'",
            current.custom_unit_id, updated.custom_unit_id
        )));
    }
    let unit_id = updated.custom_unit_id.as_str();

    let optimistic_unit = with_fields(
        unit_without_rates(updated)?,
        json!({ PENDING_FIELDS: { "attributes": PendingAction::Update } }),
    );
    let failure_unit = with_fields(
        unit_without_rates(current)?,
        json!({
            ERROR_FIELDS: { "attributes": generic_error() },
            PENDING_FIELDS: { "attributes": null },
        }),
    );

    let triple = UpdateTriple::builder()
        .optimistic(UpdateOperation::merge(&key, custom_unit_patch(unit_id, optimistic_unit)))
        .success(UpdateOperation::merge(
            &key,
            custom_unit_patch(unit_id, pending_field("attributes", None)),
        ))
        .failure(UpdateOperation::merge(&key, custom_unit_patch(unit_id, failure_unit)))
        .build()?;

    Ok(PreparedWrite::new(
        write::SET_POLICY_DISTANCE_RATES_UNIT,
        json!({
            "policyID": policy_id,
            "customUnit": serde_json::to_string(&updated.without_field_markers())?,
        }),
        triple,
    ))
}

pub fn build_update_policy_distance_rate_field(
    policy_id: &str,
    custom_unit: &CustomUnit,
    rates: &[Rate],
    field: RateField,
) -> Result<PreparedWrite> {
    let triple = build_rate_field_updates(policy_id, custom_unit, rates, field.marker_name())?;
    Ok(PreparedWrite::new(
        field.command(),
        rate_array_params(policy_id, custom_unit, rates)?,
        triple,
    ))
}

pub fn build_set_policy_distance_rates_enabled(
    policy_id: &str,
    custom_unit: &CustomUnit,
    rates: &[Rate],
) -> Result<PreparedWrite> {
    let triple = build_rate_field_updates(policy_id, custom_unit, rates, "enabled")?;
    Ok(PreparedWrite::new(
        write::SET_POLICY_DISTANCE_RATES_ENABLED,
        rate_array_params(policy_id, custom_unit, rates)?,
        triple,
    ))
}

/// Delete rates and flag transactions that used them.
///
/// Each referencing transaction gets one `customUnitOutOfPolicy` violation;
/// a transaction that already carries it is left alone.
pub fn build_delete_policy_distance_rates(
    policy_id: &str,
    custom_unit: &CustomUnit,
    rate_ids: &[String],
    transactions: &BTreeMap<String, Value>,
    violations: &BTreeMap<String, Value>,
) -> Result<PreparedWrite> {
    let key = policy_key(policy_id)?;
    let unit_id = custom_unit.custom_unit_id.as_str();

    let mut optimistic_rates = Map::new();
    let mut success_rates = Map::new();
    let mut failure_rates = Map::new();
    for (id, current) in &custom_unit.rates {
        if !rate_ids.contains(id) {
            continue;
        }
        optimistic_rates.insert(
            id.clone(),
            with_fields(
                current.clone(),
                json!({ "enabled": false, PENDING_ACTION: PendingAction::Delete }),
            ),
        );
        success_rates.insert(id.clone(), Value::Null);
        failure_rates.insert(
            id.clone(),
            with_fields(
                current.clone(),
                json!({ PENDING_ACTION: null, ERRORS: generic_error() }),
            ),
        );
    }
    if optimistic_rates.is_empty() {
        return Err(MirrorError::InvalidParams(format!(
            "none of {:?} is a rate of custom unit '{}'",
            rate_ids, unit_id
        )));
    }

    let mut builder = UpdateTriple::builder()
        .optimistic(UpdateOperation::merge(&key, rates_patch(unit_id, optimistic_rates)))
        .success(UpdateOperation::merge(&key, rates_patch(unit_id, success_rates)))
        .failure(UpdateOperation::merge(&key, rates_patch(unit_id, failure_rates)));

    let violation = serde_json::to_value(TransactionViolation::custom_unit_out_of_policy())?;
    for transaction_id in transactions_using_rates(unit_id, rate_ids, transactions) {
        let violations_key = collection_key(collection::TRANSACTION_VIOLATIONS, &transaction_id);
        let current = violations.get(&violations_key).cloned();
        let mut list = current
            .as_ref()
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default();
        if list.iter().any(|v| v.get("name") == violation.get("name")) {
            continue;
        }
        list.push(violation.clone());

        builder = builder
            .optimistic(UpdateOperation::merge(&violations_key, Value::Array(list)))
            .failure(UpdateOperation::merge(
                &violations_key,
                current.unwrap_or(Value::Null),
            ));
    }

    Ok(PreparedWrite::new(
        write::DELETE_POLICY_DISTANCE_RATES,
        json!({
            "policyID": policy_id,
            "customUnitID": unit_id,
            "customUnitRateID": rate_ids,
        }),
        builder.build()?,
    ))
}

/// Per-rate optimistic/success/failure for one field of each targeted rate.
fn build_rate_field_updates(
    policy_id: &str,
    custom_unit: &CustomUnit,
    rates: &[Rate],
    marker: &str,
) -> Result<UpdateTriple> {
    let key = policy_key(policy_id)?;
    let unit_id = custom_unit.custom_unit_id.as_str();

    let mut optimistic_rates = Map::new();
    let mut success_rates = Map::new();
    let mut failure_rates = Map::new();
    for (id, current) in &custom_unit.rates {
        let Some(updated) = rates.iter().find(|rate| rate.custom_unit_rate_id == *id) else {
            continue;
        };
        let updated = updated.without_field_markers().to_value()?;

        optimistic_rates.insert(
            id.clone(),
            with_fields(updated.clone(), json!({ PENDING_FIELDS: { marker: PendingAction::Update } })),
        );
        success_rates.insert(id.clone(), with_fields(updated, pending_field(marker, None)));
        failure_rates.insert(
            id.clone(),
            with_fields(
                current.clone(),
                json!({
                    PENDING_FIELDS: { marker: null },
                    ERROR_FIELDS: { marker: generic_error() },
                }),
            ),
        );
    }
    if optimistic_rates.is_empty() {
        return Err(MirrorError::InvalidParams(format!(
            "no rate to update in custom unit '{}'",
            unit_id
        )));
    }

    UpdateTriple::builder()
        .optimistic(UpdateOperation::merge(&key, rates_patch(unit_id, optimistic_rates)))
        .success(UpdateOperation::merge(&key, rates_patch(unit_id, success_rates)))
        .failure(UpdateOperation::merge(&key, rates_patch(unit_id, failure_rates)))
        .build()
}

fn rate_array_params(policy_id: &str, custom_unit: &CustomUnit, rates: &[Rate]) -> Result<Value> {
    let cleaned: Vec<Rate> = rates.iter().map(Rate::without_field_markers).collect();
    Ok(json!({
        "policyID": policy_id,
        "customUnitID": custom_unit.custom_unit_id,
        "customUnitRateArray": serde_json::to_string(&cleaned)?,
    }))
}

fn transactions_using_rates(
    custom_unit_id: &str,
    rate_ids: &[String],
    transactions: &BTreeMap<String, Value>,
) -> Vec<String> {
    transactions
        .iter()
        .filter(|(_, transaction)| {
            let unit = value_at_path(transaction, &["comment", "customUnit", "customUnitID"]);
            let rate = value_at_path(transaction, &["comment", "customUnit", "customUnitRateID"])
                .and_then(Value::as_str);
            unit.and_then(Value::as_str) == Some(custom_unit_id)
                && rate.is_some_and(|rate| rate_ids.iter().any(|id| id == rate))
        })
        .filter_map(|(key, transaction)| match transaction.get("transactionID") {
            Some(Value::String(id)) => Some(id.clone()),
            Some(Value::Number(id)) => Some(id.to_string()),
            _ => member_id(collection::TRANSACTION, key).map(str::to_string),
        })
        .collect()
}

fn unit_without_rates(unit: &CustomUnit) -> Result<Value> {
    let mut value = serde_json::to_value(unit)?;
    if let Some(fields) = value.as_object_mut() {
        fields.shift_remove("rates");
    }
    Ok(value)
}

fn single(id: &str, value: Value) -> Map<String, Value> {
    let mut map = Map::new();
    map.insert(id.to_string(), value);
    map
}

impl Actions {
    /// The policy's distance custom unit as currently mirrored.
    pub fn distance_custom_unit(&self, policy_id: &str) -> Result<Option<CustomUnit>> {
        match self.store().value(&policy_key(policy_id)?)? {
            Some(policy) => distance_custom_unit(&policy),
            None => Ok(None),
        }
    }

    pub async fn open_policy_distance_rates_page(&self, policy_id: &str) -> Result<Settlement> {
        policy_key(policy_id)?;
        self.dispatcher()
            .read(
                read::OPEN_POLICY_DISTANCE_RATES_PAGE,
                json!({ "policyID": policy_id }),
            )
            .await
    }

    pub fn enable_policy_distance_rates(&self, policy_id: &str, enabled: bool) -> Result<WriteHandle> {
        let policy = self.store().value(&policy_key(policy_id)?)?;
        self.dispatch(build_enable_policy_distance_rates(
            policy_id,
            enabled,
            policy.as_ref(),
        )?)
    }

    pub fn create_policy_distance_rate(
        &self,
        policy_id: &str,
        custom_unit_id: &str,
        rate: &Rate,
    ) -> Result<WriteHandle> {
        self.dispatch(build_create_policy_distance_rate(policy_id, custom_unit_id, rate)?)
    }

    pub fn set_policy_distance_rates_unit(
        &self,
        policy_id: &str,
        current: &CustomUnit,
        updated: &CustomUnit,
    ) -> Result<WriteHandle> {
        self.dispatch(build_set_policy_distance_rates_unit(policy_id, current, updated)?)
    }

    pub fn update_policy_distance_rate_field(
        &self,
        policy_id: &str,
        custom_unit: &CustomUnit,
        rates: &[Rate],
        field: RateField,
    ) -> Result<WriteHandle> {
        self.dispatch(build_update_policy_distance_rate_field(
            policy_id,
            custom_unit,
            rates,
            field,
        )?)
    }

    pub fn set_policy_distance_rates_enabled(
        &self,
        policy_id: &str,
        custom_unit: &CustomUnit,
        rates: &[Rate],
    ) -> Result<WriteHandle> {
        self.dispatch(build_set_policy_distance_rates_enabled(
            policy_id,
            custom_unit,
            rates,
        )?)
    }

    pub fn delete_policy_distance_rates(
        &self,
        policy_id: &str,
        custom_unit: &CustomUnit,
        rate_ids: &[String],
    ) -> Result<WriteHandle> {
        let transactions = self.store().get_collection(collection::TRANSACTION)?;
        let violations = self
            .store()
            .get_collection(collection::TRANSACTION_VIOLATIONS)?;
        self.dispatch(build_delete_policy_distance_rates(
            policy_id,
            custom_unit,
            rate_ids,
            &transactions,
            &violations,
        )?)
    }

    /// Drop a rate whose creation failed.
    pub fn clear_create_distance_rate_item_and_error(
        &self,
        policy_id: &str,
        custom_unit_id: &str,
        rate_id: &str,
    ) -> Result<()> {
        self.store().merge(
            &policy_key(policy_id)?,
            rates_patch(custom_unit_id, single(rate_id, Value::Null)),
        )
    }

    pub fn clear_delete_distance_rate_error(
        &self,
        policy_id: &str,
        custom_unit_id: &str,
        rate_id: &str,
    ) -> Result<()> {
        self.store().merge(
            &policy_key(policy_id)?,
            rates_patch(custom_unit_id, single(rate_id, json!({ ERRORS: null }))),
        )
    }

    pub fn clear_policy_distance_rates_error_fields(
        &self,
        policy_id: &str,
        custom_unit_id: &str,
        updated_error_fields: Value,
    ) -> Result<()> {
        self.store().merge(
            &policy_key(policy_id)?,
            custom_unit_patch(custom_unit_id, json!({ ERROR_FIELDS: updated_error_fields })),
        )
    }

    pub fn clear_policy_distance_rate_error_fields(
        &self,
        policy_id: &str,
        custom_unit_id: &str,
        rate_id: &str,
        updated_error_fields: Value,
    ) -> Result<()> {
        self.store().merge(
            &policy_key(policy_id)?,
            rates_patch(
                custom_unit_id,
                single(rate_id, json!({ ERROR_FIELDS: updated_error_fields })),
            ),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::update::markers::{has_errors, has_field_error, pending_field_of};

    fn policy_with_rates() -> Value {
        json!({
            "name": "Workspace",
            "areDistanceRatesEnabled": true,
            "customUnits": {
                "u1": {
                    "customUnitID": "u1",
                    "name": "Distance",
                    "attributes": {"unit": "mi"},
                    "rates": {
                        "r1": {"customUnitRateID": "r1", "name": "Default", "rate": 670, "enabled": false},
                        "r2": {"customUnitRateID": "r2", "name": "Fast", "rate": 700, "enabled": true}
                    }
                }
            }
        })
    }

    fn unit() -> CustomUnit {
        distance_custom_unit(&policy_with_rates()).unwrap().unwrap()
    }

    fn merge_payload(op: &UpdateOperation) -> &Value {
        match op {
            UpdateOperation::Merge { value, .. } => value,
            other => panic!("expected merge, got {:?}", other),
        }
    }

    #[test]
    fn test_disable_enables_only_first_rate() {
        let policy = policy_with_rates();
        let prepared = build_enable_policy_distance_rates("P1", false, Some(&policy)).unwrap();

        let rates = &merge_payload(&prepared.triple.optimistic[1])["customUnits"]["u1"]["rates"];
        assert_eq!(rates["r1"]["enabled"], json!(true));
        assert_eq!(rates["r2"]["enabled"], json!(false));

        let restored = &merge_payload(&prepared.triple.failure[1])["customUnits"]["u1"]["rates"];
        assert_eq!(restored["r1"]["enabled"], json!(false));
        assert_eq!(restored["r2"]["enabled"], json!(true));
        assert_eq!(prepared.options, WriteOptions::no_duplicates("policyID"));
    }

    #[test]
    fn test_enable_touches_no_rates() {
        let policy = policy_with_rates();
        let prepared = build_enable_policy_distance_rates("P1", true, Some(&policy)).unwrap();
        assert_eq!(prepared.triple.optimistic.len(), 1);
        assert_eq!(prepared.params, json!({"policyID": "P1", "enabled": true}));
    }

    #[test]
    fn test_failed_toggle_restores_captured_flag() {
        let policy = policy_with_rates();
        let prepared = build_enable_policy_distance_rates("P1", true, Some(&policy)).unwrap();
        assert_eq!(
            merge_payload(&prepared.triple.failure[0])["areDistanceRatesEnabled"],
            json!(true)
        );

        let prepared = build_enable_policy_distance_rates("P1", true, None).unwrap();
        assert!(merge_payload(&prepared.triple.failure[0])["areDistanceRatesEnabled"].is_null());
    }

    #[test]
    fn test_create_rate_failure_sets_error() {
        let mut rate = Rate::new("r3");
        rate.name = Some("New".into());
        let prepared = build_create_policy_distance_rate("P1", "u1", &rate).unwrap();

        let optimistic = &merge_payload(&prepared.triple.optimistic[0])["customUnits"]["u1"]["rates"]["r3"];
        assert_eq!(optimistic["pendingAction"], json!("add"));
        let failure = &merge_payload(&prepared.triple.failure[0])["customUnits"]["u1"]["rates"]["r3"];
        assert!(failure["pendingAction"].is_null());
        assert!(has_errors(failure));
        assert!(prepared.params["customUnitRate"].as_str().unwrap().contains("\"r3\""));
    }

    #[test]
    fn test_create_rate_requires_id() {
        let result = build_create_policy_distance_rate("P1", "u1", &Rate::default());
        assert!(matches!(result, Err(MirrorError::InvalidParams(_))));
    }

    #[test]
    fn test_rate_field_update_targets_only_given_rates() {
        let mut edited = Rate::new("r2");
        edited.name = Some("Faster".into());
        let prepared =
            build_update_policy_distance_rate_field("P1", &unit(), &[edited], RateField::Name).unwrap();

        let rates = merge_payload(&prepared.triple.optimistic[0])["customUnits"]["u1"]["rates"]
            .as_object()
            .unwrap();
        assert_eq!(rates.len(), 1);
        assert_eq!(pending_field_of(&rates["r2"], "name"), Some(PendingAction::Update));

        let failure = &merge_payload(&prepared.triple.failure[0])["customUnits"]["u1"]["rates"]["r2"];
        assert_eq!(failure["name"], json!("Fast"));
        assert!(has_field_error(failure, "name"));
        assert_eq!(prepared.command, write::UPDATE_POLICY_DISTANCE_RATE_NAME);
    }

    #[test]
    fn test_rate_field_update_rejects_unknown_rates() {
        let result = build_set_policy_distance_rates_enabled("P1", &unit(), &[Rate::new("nope")]);
        assert!(matches!(result, Err(MirrorError::InvalidParams(_))));
    }

    #[test]
    fn test_set_unit_requires_same_id() {
        let current = unit();
        let mut updated = current.clone();
        updated.custom_unit_id = "other".into();
        assert!(build_set_policy_distance_rates_unit("P1", &current, &updated).is_err());

        updated.custom_unit_id = "u1".into();
        updated.attributes = Some(json!({"unit": "km"}));
        let prepared = build_set_policy_distance_rates_unit("P1", &current, &updated).unwrap();
        let optimistic = &merge_payload(&prepared.triple.optimistic[0])["customUnits"]["u1"];
        assert_eq!(optimistic["attributes"]["unit"], json!("km"));
        assert!(optimistic.get("rates").is_none());
        let failure = &merge_payload(&prepared.triple.failure[0])["customUnits"]["u1"];
        assert_eq!(failure["attributes"]["unit"], json!("mi"));
    }

    #[test]
    fn test_delete_adds_violation_once() {
        let mut transactions = BTreeMap::new();
        transactions.insert(
            "transactions_t1".to_string(),
            json!({"transactionID": "t1", "comment": {"customUnit": {"customUnitID": "u1", "customUnitRateID": "r1"}}}),
        );
        transactions.insert(
            "transactions_t2".to_string(),
            json!({"transactionID": "t2", "comment": {"customUnit": {"customUnitID": "u1", "customUnitRateID": "r2"}}}),
        );
        let mut violations = BTreeMap::new();
        violations.insert(
            "transactionViolations_t2".to_string(),
            json!([{"type": "violation", "name": "customUnitOutOfPolicy"}]),
        );

        let ids = vec!["r1".to_string(), "r2".to_string()];
        let prepared =
            build_delete_policy_distance_rates("P1", &unit(), &ids, &transactions, &violations).unwrap();

        let violation_writes: Vec<&str> = prepared
            .triple
            .optimistic
            .iter()
            .flat_map(|op| op.keys())
            .filter(|key| key.starts_with(collection::TRANSACTION_VIOLATIONS))
            .collect();
        assert_eq!(violation_writes, vec!["transactionViolations_t1"]);

        let success = merge_payload(&prepared.triple.success[0]);
        assert!(success["customUnits"]["u1"]["rates"]["r1"].is_null());
        assert_eq!(prepared.params["customUnitRateID"], json!(["r1", "r2"]));
    }
}
