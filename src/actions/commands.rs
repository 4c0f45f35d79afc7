//! Remote command names.

pub mod write {
    pub const ENABLE_POLICY_DISTANCE_RATES: &str = "EnablePolicyDistanceRates";
    pub const CREATE_POLICY_DISTANCE_RATE: &str = "CreatePolicyDistanceRate";
    pub const SET_POLICY_DISTANCE_RATES_UNIT: &str = "SetPolicyDistanceRatesUnit";
    pub const UPDATE_POLICY_DISTANCE_RATE_VALUE: &str = "UpdatePolicyDistanceRateValue";
    pub const UPDATE_POLICY_DISTANCE_RATE_NAME: &str = "UpdatePolicyDistanceRateName";
    pub const UPDATE_DISTANCE_TAX_CLAIMABLE_VALUE: &str = "UpdateDistanceTaxClaimableValue";
    pub const UPDATE_POLICY_DISTANCE_TAX_RATE_VALUE: &str = "UpdatePolicyDistanceTaxRateValue";
    pub const SET_POLICY_DISTANCE_RATES_ENABLED: &str = "SetPolicyDistanceRatesEnabled";
    pub const DELETE_POLICY_DISTANCE_RATES: &str = "DeletePolicyDistanceRates";

    pub const TOGGLE_POLICY_PER_DIEM: &str = "TogglePolicyPerDiem";

    pub const MAKE_DEFAULT_PAYMENT_METHOD: &str = "MakeDefaultPaymentMethod";
    pub const ADD_PAYMENT_CARD: &str = "AddPaymentCard";
    pub const ADD_PAYMENT_CARD_SCA: &str = "AddPaymentCardSCA";
    pub const VERIFY_SETUP_INTENT: &str = "User_VerifySetupIntent";
    pub const TRANSFER_WALLET_BALANCE: &str = "TransferWalletBalance";
    pub const DELETE_PAYMENT_CARD: &str = "DeletePaymentCard";
    pub const UPDATE_BILLING_CARD_CURRENCY: &str = "UpdateBillingCardCurrency";
    pub const SET_INVOICING_TRANSFER_BANK_ACCOUNT: &str = "SetInvoicingTransferBankAccount";
}

pub mod read {
    pub const OPEN_POLICY_DISTANCE_RATES_PAGE: &str = "OpenPolicyDistanceRatesPage";
    pub const OPEN_POLICY_PER_DIEM_RATES_PAGE: &str = "OpenPolicyPerDiemRatesPage";
    pub const OPEN_PAYMENTS_PAGE: &str = "OpenPaymentsPage";
}
