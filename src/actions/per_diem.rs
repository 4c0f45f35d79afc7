use super::commands::{read, write};
use super::models::CUSTOM_UNIT_NAME_PER_DIEM_INTERNATIONAL;
use super::{Actions, PreparedWrite, captured_field, custom_unit_patch, policy_key};
use crate::core::Result;
use crate::dispatcher::{Settlement, WriteHandle};
use crate::update::markers::{PENDING_FIELDS, pending_field};
use crate::update::{PendingAction, UpdateOperation, UpdateTriple};
use serde_json::{Value, json};
use uuid::Uuid;

const ARE_PER_DIEM_RATES_ENABLED: &str = "arePerDiemRatesEnabled";
const CUSTOM_UNIT_ID_LEN: usize = 13;

/// Client-generated custom unit id: 13 upper-case hex digits.
pub fn generate_custom_unit_id() -> String {
    Uuid::new_v4().simple().to_string()[..CUSTOM_UNIT_ID_LEN].to_uppercase()
}

/// Toggle per diem rates. Without `custom_unit_id` a new per diem unit is
/// created optimistically and removed again on failure. The failure branch
/// restores the flag captured from `policy`.
pub fn build_enable_per_diem(
    policy_id: &str,
    enabled: bool,
    custom_unit_id: Option<&str>,
    policy: Option<&Value>,
) -> Result<PreparedWrite> {
    let key = policy_key(policy_id)?;
    let previous = captured_field(policy, ARE_PER_DIEM_RATES_ENABLED);
    let existing_unit = custom_unit_id.filter(|id| !id.is_empty());
    let unit_id = existing_unit
        .map(str::to_string)
        .unwrap_or_else(generate_custom_unit_id);

    let mut optimistic = json!({
        ARE_PER_DIEM_RATES_ENABLED: enabled,
        PENDING_FIELDS: { ARE_PER_DIEM_RATES_ENABLED: PendingAction::Update },
    });
    let mut failure = json!({
        ARE_PER_DIEM_RATES_ENABLED: previous,
        PENDING_FIELDS: { ARE_PER_DIEM_RATES_ENABLED: null },
    });

    if existing_unit.is_none() {
        let unit = json!({
            "name": CUSTOM_UNIT_NAME_PER_DIEM_INTERNATIONAL,
            "customUnitID": unit_id,
            "enabled": true,
            "defaultCategory": "",
            "rates": {},
        });
        merge_into(&mut optimistic, custom_unit_patch(&unit_id, unit));
        merge_into(&mut failure, custom_unit_patch(&unit_id, Value::Null));
    }

    let triple = UpdateTriple::builder()
        .optimistic(UpdateOperation::merge(&key, optimistic))
        .success(UpdateOperation::merge(
            &key,
            pending_field(ARE_PER_DIEM_RATES_ENABLED, None),
        ))
        .failure(UpdateOperation::merge(&key, failure))
        .build()?;

    Ok(PreparedWrite::new(
        write::TOGGLE_POLICY_PER_DIEM,
        json!({ "policyID": policy_id, "enabled": enabled, "customUnitID": unit_id }),
        triple,
    ))
}

fn merge_into(target: &mut Value, patch: Value) {
    if let (Some(target), Value::Object(patch)) = (target.as_object_mut(), patch) {
        target.extend(patch);
    }
}

impl Actions {
    pub fn enable_per_diem(
        &self,
        policy_id: &str,
        enabled: bool,
        custom_unit_id: Option<&str>,
    ) -> Result<WriteHandle> {
        let policy = self.store().value(&policy_key(policy_id)?)?;
        self.dispatch(build_enable_per_diem(
            policy_id,
            enabled,
            custom_unit_id,
            policy.as_ref(),
        )?)
    }

    pub async fn open_policy_per_diem_page(&self, policy_id: &str) -> Result<Settlement> {
        policy_key(policy_id)?;
        self.dispatcher()
            .read(
                read::OPEN_POLICY_PER_DIEM_RATES_PAGE,
                json!({ "policyID": policy_id }),
            )
            .await
    }
}
