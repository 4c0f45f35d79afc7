//! Store key names.
//!
//! Collection keys are a fixed prefix followed by an entity id, e.g.
//! `policy_` + `"ABC123"`. Single keys name one slice of state.

use crate::core::{MirrorError, Result};

pub mod collection {
    pub const POLICY: &str = "policy_";
    pub const REPORT: &str = "report_";
    pub const TRANSACTION: &str = "transactions_";
    pub const TRANSACTION_VIOLATIONS: &str = "transactionViolations_";
    pub const REPORT_DRAFT_COMMENT: &str = "reportDraftComment_";
    pub const REPORT_ACTIONS_DRAFTS: &str = "reportActionsDrafts_";
}

pub const SESSION: &str = "session";
pub const BANK_ACCOUNT_LIST: &str = "bankAccountList";
pub const FUND_LIST: &str = "fundList";
pub const CARD_LIST: &str = "cardList";
pub const USER_WALLET: &str = "userWallet";
pub const WALLET_TERMS: &str = "walletTerms";
pub const WALLET_TRANSFER: &str = "walletTransfer";
pub const IS_LOADING_PAYMENT_METHODS: &str = "isLoadingPaymentMethods";
pub const VERIFY_3DS_SUBSCRIPTION: &str = "verify3dsSubscription";

pub mod forms {
    pub const ADD_PAYMENT_CARD_FORM: &str = "addPaymentCardForm";
    pub const CHANGE_BILLING_CURRENCY_FORM: &str = "changeBillingCurrencyForm";
}

/// Build `prefix + id`.
pub fn collection_key(prefix: &str, id: &str) -> String {
    format!("{}{}", prefix, id)
}

/// Strip a collection prefix, returning the member id.
pub fn member_id<'a>(prefix: &str, key: &'a str) -> Option<&'a str> {
    key.strip_prefix(prefix).filter(|id| !id.is_empty())
}

/// A key is usable when it is non-empty and contains no whitespace.
pub fn validate_key(key: &str) -> Result<()> {
    if key.is_empty() {
        return Err(MirrorError::InvalidKey("key must not be empty".to_string()));
    }
    if key.chars().any(char::is_whitespace) {
        return Err(MirrorError::InvalidKey(format!(
            "key '{}' must not contain whitespace",
            key
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_collection_key_roundtrip() {
        let key = collection_key(collection::POLICY, "A1B2");
        assert_eq!(key, "policy_A1B2");
        assert_eq!(member_id(collection::POLICY, &key), Some("A1B2"));
        assert_eq!(member_id(collection::POLICY, "policy_"), None);
        assert_eq!(member_id(collection::REPORT, &key), None);
    }

    #[test]
    fn test_validate_key() {
        assert!(validate_key("fundList").is_ok());
        assert!(validate_key("").is_err());
        assert!(validate_key("bad key").is_err());
    }
}
