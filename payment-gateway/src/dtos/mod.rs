//! Request and response bodies for the HTTP boundary.

use crate::models::{GatewayType, PaymentMetadata, PaymentStatus};
use crate::utils::has_minor_unit_precision;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use validator::{Validate, ValidationError};

fn positive_amount(amount: &Decimal) -> Result<(), ValidationError> {
    if *amount <= Decimal::ZERO {
        let mut err = ValidationError::new("positive_amount");
        err.message = Some("Amount must be greater than zero".into());
        return Err(err);
    }
    if !has_minor_unit_precision(*amount) {
        let mut err = ValidationError::new("amount_precision");
        err.message = Some("Amount cannot have more than two decimal places".into());
        return Err(err);
    }
    Ok(())
}

fn currency_code(currency: &str) -> Result<(), ValidationError> {
    if currency.len() == 3 && currency.chars().all(|c| c.is_ascii_alphabetic()) {
        Ok(())
    } else {
        let mut err = ValidationError::new("currency_code");
        err.message = Some("Currency must be a three-letter ISO code".into());
        Err(err)
    }
}

#[derive(Debug, Deserialize, Validate)]
pub struct InitiatePaymentRequest {
    /// Omitted means "use the recommended gateway for this amount".
    pub gateway: Option<GatewayType>,
    #[validate(custom(function = "positive_amount"))]
    pub amount: Decimal,
    #[validate(custom(function = "currency_code"))]
    pub currency: Option<String>,
    #[validate(length(min = 1, max = 100, message = "Purpose is required"))]
    pub purpose: String,
    pub package_id: Option<String>,
    #[validate(email(message = "Invalid email address"))]
    pub email: Option<String>,
    pub name: Option<String>,
    pub phone: Option<String>,
    #[serde(default)]
    pub metadata: serde_json::Map<String, serde_json::Value>,
}

impl InitiatePaymentRequest {
    pub fn payer_metadata(&self) -> PaymentMetadata {
        PaymentMetadata {
            email: self.email.clone(),
            name: self.name.clone(),
            phone: self.phone.clone(),
            callback_url: None,
            extra: self.metadata.clone(),
        }
    }
}

#[derive(Debug, Deserialize, Validate)]
pub struct VerifyPaymentRequest {
    pub gateway: GatewayType,
    #[validate(length(min = 1, message = "Reference is required"))]
    pub reference: String,
}

#[derive(Debug, Deserialize)]
pub struct MethodsQuery {
    pub amount: Option<Decimal>,
    pub purpose: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct TransactionsQuery {
    pub page: Option<u32>,
    pub limit: Option<u32>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct BankTransferRequest {
    #[validate(custom(function = "positive_amount"))]
    pub amount: Decimal,
    #[validate(custom(function = "currency_code"))]
    pub currency: Option<String>,
    #[validate(length(min = 1, max = 100, message = "Purpose is required"))]
    pub purpose: String,
    #[validate(url(message = "Proof must be a valid URL"))]
    pub proof_url: String,
    pub reference: Option<String>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct RefundRequest {
    pub gateway: GatewayType,
    #[validate(length(min = 1, message = "Transaction id is required"))]
    pub transaction_id: String,
    #[validate(custom(function = "positive_amount"))]
    pub amount: Option<Decimal>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct WalletCreditRequest {
    #[validate(length(min = 1, message = "User id is required"))]
    pub user_id: String,
    #[validate(custom(function = "positive_amount"))]
    pub amount: Decimal,
    pub description: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct WalletBalanceResponse {
    pub user_id: String,
    pub balance: Decimal,
}

/// Query string a provider appends when sending the payer back to us.
///
/// Paystack uses `reference`/`trxref`; Flutterwave uses `tx_ref`,
/// `transaction_id` and `status`.
#[derive(Debug, Default, Deserialize)]
pub struct CallbackQuery {
    pub status: Option<String>,
    pub tx_ref: Option<String>,
    pub reference: Option<String>,
    pub trxref: Option<String>,
    pub transaction_id: Option<String>,
}

impl CallbackQuery {
    pub fn payment_reference(&self) -> Option<&str> {
        [&self.tx_ref, &self.reference, &self.trxref]
            .into_iter()
            .flatten()
            .map(String::as_str)
            .find(|r| !r.is_empty())
    }

    pub fn is_cancelled(&self) -> bool {
        self.status
            .as_deref()
            .is_some_and(|s| s.eq_ignore_ascii_case("cancelled"))
    }
}

#[derive(Debug, Serialize)]
pub struct WebhookAck {
    pub received: bool,
    pub status: PaymentStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reference: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct CacheResponse {
    pub cleared: Vec<GatewayType>,
    pub cached: Vec<GatewayType>,
}
