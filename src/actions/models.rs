//! Typed views of the stored records the actions read and write.
//!
//! Fields the actions do not touch are kept in `extra` so a record survives
//! a read-modify-write untouched.

use crate::core::Result;
use crate::update::markers::{ERROR_FIELDS, PENDING_FIELDS};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Number, Value};

pub const CUSTOM_UNIT_NAME_DISTANCE: &str = "Distance";
pub const CUSTOM_UNIT_NAME_PER_DIEM_INTERNATIONAL: &str = "Per Diem International";

pub const VIOLATION_TYPE_VIOLATION: &str = "violation";
pub const VIOLATION_CUSTOM_UNIT_OUT_OF_POLICY: &str = "customUnitOutOfPolicy";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Rate {
    #[serde(rename = "customUnitRateID", default)]
    pub custom_unit_rate_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rate: Option<Number>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub currency: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enabled: Option<bool>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Rate {
    pub fn new(id: &str) -> Self {
        Self {
            custom_unit_rate_id: id.to_string(),
            ..Default::default()
        }
    }

    pub fn to_value(&self) -> Result<Value> {
        Ok(serde_json::to_value(self)?)
    }

    /// Copy without `pendingFields` and `errorFields`, as sent to the server.
    pub fn without_field_markers(&self) -> Rate {
        let mut rate = self.clone();
        rate.extra.shift_remove(PENDING_FIELDS);
        rate.extra.shift_remove(ERROR_FIELDS);
        rate
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CustomUnit {
    #[serde(rename = "customUnitID")]
    pub custom_unit_id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub attributes: Option<Value>,
    /// Rates by id, in stored order.
    #[serde(default)]
    pub rates: Map<String, Value>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl CustomUnit {
    /// Rates in stored order. A rate without an id takes its map key.
    pub fn rate_entries(&self) -> Result<Vec<(String, Rate)>> {
        self.rates
            .iter()
            .map(|(id, value)| {
                let mut rate: Rate = serde_json::from_value(value.clone())?;
                if rate.custom_unit_rate_id.is_empty() {
                    rate.custom_unit_rate_id = id.clone();
                }
                Ok((id.clone(), rate))
            })
            .collect()
    }

    /// Copy without field markers on the unit or any of its rates.
    pub fn without_field_markers(&self) -> CustomUnit {
        let mut unit = self.clone();
        unit.extra.shift_remove(PENDING_FIELDS);
        unit.extra.shift_remove(ERROR_FIELDS);
        for rate in unit.rates.values_mut() {
            if let Some(fields) = rate.as_object_mut() {
                fields.shift_remove(PENDING_FIELDS);
                fields.shift_remove(ERROR_FIELDS);
            }
        }
        unit
    }
}

/// The policy's distance custom unit, if it has one.
pub fn distance_custom_unit(policy: &Value) -> Result<Option<CustomUnit>> {
    let Some(units) = policy.get("customUnits").and_then(Value::as_object) else {
        return Ok(None);
    };

    for unit in units.values() {
        if unit.get("name").and_then(Value::as_str) == Some(CUSTOM_UNIT_NAME_DISTANCE) {
            return Ok(Some(serde_json::from_value(unit.clone())?));
        }
    }
    Ok(None)
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransactionViolation {
    #[serde(rename = "type")]
    pub violation_type: String,
    pub name: String,
    #[serde(rename = "showInReview", default, skip_serializing_if = "Option::is_none")]
    pub show_in_review: Option<bool>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl TransactionViolation {
    pub fn custom_unit_out_of_policy() -> Self {
        Self {
            violation_type: VIOLATION_TYPE_VIOLATION.to_string(),
            name: VIOLATION_CUSTOM_UNIT_OUT_OF_POLICY.to_string(),
            show_in_review: Some(true),
            extra: Map::new(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PaymentMethodType {
    #[serde(rename = "bankAccount")]
    PersonalBankAccount,
    #[serde(rename = "debitCard")]
    DebitCard,
}

impl PaymentMethodType {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentMethodType::PersonalBankAccount => "bankAccount",
            PaymentMethodType::DebitCard => "debitCard",
        }
    }

    /// Store key of the list holding methods of this type.
    pub fn list_key(&self) -> &'static str {
        match self {
            PaymentMethodType::PersonalBankAccount => crate::keys::BANK_ACCOUNT_LIST,
            PaymentMethodType::DebitCard => crate::keys::FUND_LIST,
        }
    }

    /// Parameter name carrying the method id.
    pub fn id_param(&self) -> &'static str {
        match self {
            PaymentMethodType::PersonalBankAccount => "bankAccountID",
            PaymentMethodType::DebitCard => "fundID",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentMethod {
    #[serde(rename = "accountType")]
    pub account_type: PaymentMethodType,
    #[serde(rename = "methodID")]
    pub method_id: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PaymentCardCurrency {
    USD,
    AUD,
    GBP,
    NZD,
    EUR,
}

impl PaymentCardCurrency {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentCardCurrency::USD => "USD",
            PaymentCardCurrency::AUD => "AUD",
            PaymentCardCurrency::GBP => "GBP",
            PaymentCardCurrency::NZD => "NZD",
            PaymentCardCurrency::EUR => "EUR",
        }
    }

    /// Cards in these currencies need strong customer authentication.
    pub fn requires_sca(&self) -> bool {
        matches!(self, PaymentCardCurrency::GBP | PaymentCardCurrency::EUR)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_rate_keeps_unknown_fields() {
        let stored = json!({
            "customUnitRateID": "r1",
            "rate": 700,
            "enabled": true,
            "attributes": {"taxClaimablePercentage": 0.5},
            "pendingFields": {"name": "update"}
        });
        let rate: Rate = serde_json::from_value(stored.clone()).unwrap();
        assert_eq!(rate.to_value().unwrap(), stored);

        let cleaned = rate.without_field_markers().to_value().unwrap();
        assert!(cleaned.get("pendingFields").is_none());
        assert_eq!(cleaned["rate"], json!(700));
    }

    #[test]
    fn test_distance_custom_unit_lookup() {
        let policy = json!({
            "customUnits": {
                "pd": {"customUnitID": "pd", "name": "Per Diem International"},
                "u1": {"customUnitID": "u1", "name": "Distance", "rates": {
                    "b": {"enabled": false},
                    "a": {"customUnitRateID": "a", "enabled": true}
                }}
            }
        });
        let unit = distance_custom_unit(&policy).unwrap().unwrap();
        assert_eq!(unit.custom_unit_id, "u1");

        let ids: Vec<String> = unit
            .rate_entries()
            .unwrap()
            .into_iter()
            .map(|(_, rate)| rate.custom_unit_rate_id)
            .collect();
        assert_eq!(ids, vec!["b", "a"]);

        assert!(distance_custom_unit(&json!({})).unwrap().is_none());
    }

    #[test]
    fn test_payment_method_wire_names() {
        let method: PaymentMethod =
            serde_json::from_value(json!({"accountType": "debitCard", "methodID": 7})).unwrap();
        assert_eq!(method.account_type.list_key(), crate::keys::FUND_LIST);
        assert_eq!(method.account_type.id_param(), "fundID");
        assert!(PaymentCardCurrency::EUR.requires_sca());
        assert!(!PaymentCardCurrency::USD.requires_sca());
    }
}
