// ============================================================================
// Payment Methods
// ============================================================================
//
// Wallet, payment card, and billing actions. Most of these toggle a loading
// flag on a form or wallet key; the failure branches restore captured values
// or flag an error.
//
// ============================================================================

use super::commands::{read, write};
use super::models::{PaymentCardCurrency, PaymentMethod, PaymentMethodType};
use super::{Actions, PreparedWrite, policy_key};
use crate::core::{MirrorError, Result};
use crate::dispatcher::{Settlement, WriteHandle};
use crate::keys::{self, forms};
use crate::update::markers::{ERRORS, PENDING_ACTION, generic_error};
use crate::update::{PendingAction, UpdateOperation, UpdateTriple};
use lazy_static::lazy_static;
use regex::Regex;
use serde_json::{Map, Value, json};

lazy_static! {
    // MM/YY, MM/YYYY, MMYY
    static ref EXPIRATION_DATE: Regex =
        Regex::new(r"^\s*(0[1-9]|1[0-2])\s*/?\s*(\d{2}|\d{4})\s*$").expect("valid expiration regex");
}

/// Card details as entered in the add-card form.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PaymentCardParams {
    pub expiration_date: String,
    pub card_number: String,
    pub security_code: String,
    pub name_on_card: String,
    pub address_zip_code: String,
}

/// Card details for a subscription billing card.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubscriptionCardData {
    pub card_number: String,
    pub card_year: String,
    pub card_month: String,
    pub card_cvv: String,
    pub address_name: String,
    pub address_zip: String,
    pub currency: PaymentCardCurrency,
}

/// Split an expiration date into `(month, four digit year)`.
pub fn parse_expiration_date(expiration: &str) -> Result<(String, String)> {
    let captures = EXPIRATION_DATE.captures(expiration).ok_or_else(|| {
        MirrorError::InvalidParams(format!("invalid expiration date '{}'", expiration))
    })?;
    let month = captures[1].to_string();
    let year = match &captures[2] {
        short if short.len() == 2 => format!("20{}", short),
        full => full.to_string(),
    };
    Ok((month, year))
}

fn loading_form_triple(form_key: &str, clear_errors: bool) -> Result<UpdateTriple> {
    let optimistic = if clear_errors {
        json!({ "isLoading": true, ERRORS: null })
    } else {
        json!({ "isLoading": true })
    };
    UpdateTriple::builder()
        .optimistic(UpdateOperation::merge(form_key, optimistic))
        .success(UpdateOperation::merge(form_key, json!({ "isLoading": false })))
        .failure(UpdateOperation::merge(form_key, json!({ "isLoading": false })))
        .build()
}

pub fn build_open_wallet_page() -> Result<UpdateTriple> {
    let key = keys::IS_LOADING_PAYMENT_METHODS;
    UpdateTriple::builder()
        .optimistic(UpdateOperation::merge(key, json!(true)))
        .success(UpdateOperation::merge(key, json!(false)))
        .failure(UpdateOperation::merge(key, json!(false)))
        .build()
}

/// Point the wallet at another bank account or card.
///
/// `wallet` is the current wallet record, whose linked account the failure
/// branch restores.
pub fn build_make_default_payment_method(
    bank_account_id: u64,
    fund_id: u64,
    previous: Option<&PaymentMethod>,
    current: Option<&PaymentMethod>,
    wallet: Option<&Value>,
) -> Result<PreparedWrite> {
    let (linked_id, linked_type) = if bank_account_id != 0 {
        (bank_account_id, PaymentMethodType::PersonalBankAccount)
    } else {
        (fund_id, PaymentMethodType::DebitCard)
    };
    let captured = |field: &str| {
        wallet
            .and_then(|w| w.get(field))
            .cloned()
            .unwrap_or(Value::Null)
    };

    let mut optimistic = vec![UpdateOperation::merge(
        keys::USER_WALLET,
        json!({
            "walletLinkedAccountID": linked_id,
            "walletLinkedAccountType": linked_type.as_str(),
            ERRORS: null,
        }),
    )];
    let mut failure = vec![UpdateOperation::merge(
        keys::USER_WALLET,
        json!({
            "walletLinkedAccountID": captured("walletLinkedAccountID"),
            "walletLinkedAccountType": captured("walletLinkedAccountType"),
        }),
    )];

    for (method, optimistic_default) in [(previous, false), (current, true)] {
        let Some(method) = method.filter(|m| m.method_id != 0) else {
            continue;
        };
        let list_key = method.account_type.list_key();
        let id = method.method_id.to_string();
        optimistic.push(UpdateOperation::merge(
            list_key,
            json!({ id.as_str(): { "isDefault": optimistic_default } }),
        ));
        failure.push(UpdateOperation::merge(
            list_key,
            json!({ id.as_str(): { "isDefault": !optimistic_default } }),
        ));
    }

    let triple = UpdateTriple::builder()
        .optimistic_all(optimistic)
        .failure_all(failure)
        .build()?;

    Ok(PreparedWrite::new(
        write::MAKE_DEFAULT_PAYMENT_METHOD,
        json!({ "bankAccountID": bank_account_id, "fundID": fund_id }),
        triple,
    ))
}

pub fn build_add_payment_card(params: &PaymentCardParams) -> Result<PreparedWrite> {
    let (card_month, card_year) = parse_expiration_date(&params.expiration_date)?;
    let card_number: String = params
        .card_number
        .chars()
        .filter(|c| !c.is_whitespace())
        .collect();
    if card_number.is_empty() {
        return Err(MirrorError::InvalidParams("card number must not be empty".into()));
    }

    Ok(PreparedWrite::new(
        write::ADD_PAYMENT_CARD,
        json!({
            "cardNumber": card_number,
            "cardYear": card_year,
            "cardMonth": card_month,
            "cardCVV": params.security_code,
            "addressName": params.name_on_card,
            "addressZip": params.address_zip_code,
            "currency": PaymentCardCurrency::USD.as_str(),
            "isP2PDebitCard": true,
        }),
        loading_form_triple(forms::ADD_PAYMENT_CARD_FORM, false)?,
    ))
}

/// Cards in SCA currencies go through the 3DS-capable command.
pub fn build_add_subscription_payment_card(card: &SubscriptionCardData) -> Result<PreparedWrite> {
    let command = if card.currency.requires_sca() {
        write::ADD_PAYMENT_CARD_SCA
    } else {
        write::ADD_PAYMENT_CARD
    };

    Ok(PreparedWrite::new(
        command,
        json!({
            "cardNumber": card.card_number,
            "cardYear": card.card_year,
            "cardMonth": card.card_month,
            "cardCVV": card.card_cvv,
            "addressName": card.address_name,
            "addressZip": card.address_zip,
            "currency": card.currency.as_str(),
            "isP2PDebitCard": false,
            "shouldClaimEarlyDiscountOffer": true,
        }),
        loading_form_triple(forms::ADD_PAYMENT_CARD_FORM, false)?,
    ))
}

pub fn build_transfer_wallet_balance(method: &PaymentMethod) -> Result<PreparedWrite> {
    let key = keys::WALLET_TRANSFER;
    let triple = UpdateTriple::builder()
        .optimistic(UpdateOperation::merge(key, json!({ "loading": true, ERRORS: null })))
        .success(UpdateOperation::merge(
            key,
            json!({
                "loading": false,
                "shouldShowSuccess": true,
                "paymentMethodType": method.account_type.as_str(),
            }),
        ))
        .failure(UpdateOperation::merge(
            key,
            json!({ "loading": false, "shouldShowSuccess": false }),
        ))
        .build()?;

    let mut params = Map::new();
    params.insert(method.account_type.id_param().to_string(), json!(method.method_id));

    Ok(PreparedWrite::new(
        write::TRANSFER_WALLET_BALANCE,
        Value::Object(params),
        triple,
    ))
}

/// Remove a debit card. The card is dropped from the fund list on success
/// and flagged with an error on failure.
pub fn build_delete_payment_card(fund_id: u64) -> Result<PreparedWrite> {
    let id = fund_id.to_string();
    let triple = UpdateTriple::builder()
        .optimistic(UpdateOperation::merge(
            keys::FUND_LIST,
            json!({ id.as_str(): { PENDING_ACTION: PendingAction::Delete } }),
        ))
        .success(UpdateOperation::merge(keys::FUND_LIST, json!({ id.as_str(): null })))
        .failure(UpdateOperation::merge(
            keys::FUND_LIST,
            json!({ id.as_str(): { PENDING_ACTION: null, ERRORS: generic_error() } }),
        ))
        .build()?;

    Ok(PreparedWrite::new(
        write::DELETE_PAYMENT_CARD,
        json!({ "fundID": fund_id }),
        triple,
    ))
}

pub fn build_update_billing_currency(
    currency: PaymentCardCurrency,
    card_cvv: &str,
) -> Result<PreparedWrite> {
    Ok(PreparedWrite::new(
        write::UPDATE_BILLING_CARD_CURRENCY,
        json!({ "cardCVV": card_cvv, "currency": currency.as_str() }),
        loading_form_triple(forms::CHANGE_BILLING_CURRENCY_FORM, true)?,
    ))
}

pub fn build_set_invoicing_transfer_bank_account(
    bank_account_id: u64,
    policy_id: &str,
    previous_bank_account_id: u64,
) -> Result<PreparedWrite> {
    let key = policy_key(policy_id)?;
    let transfer_account =
        |id: u64| json!({ "invoice": { "bankAccount": { "transferBankAccountID": id } } });

    let triple = UpdateTriple::builder()
        .optimistic(UpdateOperation::merge(&key, transfer_account(bank_account_id)))
        .failure(UpdateOperation::merge(&key, transfer_account(previous_bank_account_id)))
        .build()?;

    Ok(PreparedWrite::new(
        write::SET_INVOICING_TRANSFER_BANK_ACCOUNT,
        json!({ "bankAccountID": bank_account_id, "policyID": policy_id }),
        triple,
    ))
}

/// True when any bank account or card carries an error.
pub fn has_payment_method_error(bank_list: Option<&Value>, fund_list: Option<&Value>) -> bool {
    [bank_list, fund_list]
        .into_iter()
        .flatten()
        .filter_map(Value::as_object)
        .flat_map(|list| list.values())
        .any(|method| {
            method
                .get(ERRORS)
                .and_then(Value::as_object)
                .is_some_and(|errors| !errors.is_empty())
        })
}

impl Actions {
    pub async fn open_wallet_page(&self) -> Result<Settlement> {
        self.dispatcher()
            .read_with_updates(read::OPEN_PAYMENTS_PAGE, json!({}), build_open_wallet_page()?)
            .await
    }

    pub fn make_default_payment_method(
        &self,
        bank_account_id: u64,
        fund_id: u64,
        previous: Option<&PaymentMethod>,
        current: Option<&PaymentMethod>,
    ) -> Result<WriteHandle> {
        let wallet = self.store().value(keys::USER_WALLET)?;
        self.dispatch(build_make_default_payment_method(
            bank_account_id,
            fund_id,
            previous,
            current,
            wallet.as_ref(),
        )?)
    }

    pub fn add_payment_card(&self, params: &PaymentCardParams) -> Result<WriteHandle> {
        self.dispatch(build_add_payment_card(params)?)
    }

    pub fn add_subscription_payment_card(&self, card: &SubscriptionCardData) -> Result<WriteHandle> {
        self.dispatch(build_add_subscription_payment_card(card)?)
    }

    pub fn verify_setup_intent(&self, account_id: u64, is_verifying: bool) -> Result<WriteHandle> {
        self.dispatcher().write(
            write::VERIFY_SETUP_INTENT,
            json!({ "accountID": account_id, "isVerifying": is_verifying }),
            UpdateTriple::default(),
        )
    }

    pub fn transfer_wallet_balance(&self, method: &PaymentMethod) -> Result<WriteHandle> {
        self.dispatch(build_transfer_wallet_balance(method)?)
    }

    pub fn delete_payment_card(&self, fund_id: u64) -> Result<WriteHandle> {
        self.dispatch(build_delete_payment_card(fund_id)?)
    }

    pub fn update_billing_currency(
        &self,
        currency: PaymentCardCurrency,
        card_cvv: &str,
    ) -> Result<WriteHandle> {
        self.dispatch(build_update_billing_currency(currency, card_cvv)?)
    }

    pub fn set_invoicing_transfer_bank_account(
        &self,
        bank_account_id: u64,
        policy_id: &str,
        previous_bank_account_id: u64,
    ) -> Result<WriteHandle> {
        self.dispatch(build_set_invoicing_transfer_bank_account(
            bank_account_id,
            policy_id,
            previous_bank_account_id,
        )?)
    }

    /// Reset the add-card form to its initial state.
    pub fn clear_payment_card_form_error_and_submit(&self) -> Result<()> {
        self.store().set(
            forms::ADD_PAYMENT_CARD_FORM,
            json!({
                "isLoading": false,
                "setupComplete": false,
                "nameOnCard": "",
                "cardNumber": "",
                "expirationDate": "",
                "securityCode": "",
                "addressStreet": "",
                "addressZipCode": "",
                "addressState": "",
                "acceptTerms": "",
                "currency": PaymentCardCurrency::USD.as_str(),
            }),
        )
    }

    pub fn clear_payment_card_3ds_verification(&self) -> Result<()> {
        self.store().set(keys::VERIFY_3DS_SUBSCRIPTION, json!(""))
    }

    pub fn set_payment_method_currency(&self, currency: PaymentCardCurrency) -> Result<()> {
        self.store().merge(
            forms::ADD_PAYMENT_CARD_FORM,
            json!({ "currency": currency.as_str() }),
        )
    }

    pub fn reset_wallet_transfer_data(&self) -> Result<()> {
        self.store().merge(
            keys::WALLET_TRANSFER,
            json!({
                "selectedAccountType": "",
                "selectedAccountID": null,
                "filterPaymentMethodType": null,
                "loading": false,
                "shouldShowSuccess": false,
            }),
        )
    }

    pub fn save_wallet_transfer_account_type_and_id(
        &self,
        account_type: Option<&str>,
        account_id: Option<&str>,
    ) -> Result<()> {
        self.store().merge(
            keys::WALLET_TRANSFER,
            json!({ "selectedAccountType": account_type, "selectedAccountID": account_id }),
        )
    }

    pub fn save_wallet_transfer_method_type(&self, method_type: Option<PaymentMethodType>) -> Result<()> {
        self.store().merge(
            keys::WALLET_TRANSFER,
            json!({ "filterPaymentMethodType": method_type.map(|t| t.as_str()) }),
        )
    }

    pub fn dismiss_successful_transfer_balance_page(&self) -> Result<()> {
        self.store()
            .merge(keys::WALLET_TRANSFER, json!({ "shouldShowSuccess": false }))
    }

    /// Clear a failed delete so the method shows as normal again.
    pub fn clear_delete_payment_method_error(&self, list_key: &str, method_id: u64) -> Result<()> {
        self.store().merge(
            list_key,
            json!({ method_id.to_string(): { PENDING_ACTION: null, ERRORS: null } }),
        )
    }

    /// A method that failed to add is dropped from its list.
    pub fn clear_add_payment_method_error(&self, list_key: &str, method_id: u64) -> Result<()> {
        self.store()
            .merge(list_key, json!({ method_id.to_string(): null }))
    }

    pub fn clear_wallet_error(&self) -> Result<()> {
        self.store().merge(keys::USER_WALLET, json!({ ERRORS: null }))
    }

    pub fn clear_wallet_terms_error(&self) -> Result<()> {
        self.store().merge(keys::WALLET_TERMS, json!({ ERRORS: null }))
    }

    pub fn has_payment_method_error(&self) -> Result<bool> {
        let bank_list = self.store().value(keys::BANK_ACCOUNT_LIST)?;
        let fund_list = self.store().value(keys::FUND_LIST)?;
        Ok(has_payment_method_error(bank_list.as_ref(), fund_list.as_ref()))
    }
}
