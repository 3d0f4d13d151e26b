//! Payment orchestration.
//!
//! The processor owns no payment state. Each operation resolves a gateway
//! through the factory, makes one call and writes one audit entry before it
//! returns, whatever the outcome.

use super::metrics::{record_amount, record_attempt, record_webhook_signature_failure};
use super::store::Storage;
use crate::config::GatewaysConfig;
use crate::error::GatewayError;
use crate::gateways::{GatewayFactory, PaymentGateway};
use crate::models::{
    AttemptOperation, GatewayType, LedgerTransaction, PaymentAttempt, PaymentRequest,
    PaymentResponse, PaymentStatus, PaymentVerification, PendingPayment, PendingPaymentStatus,
    WebhookValidation,
};
use crate::utils::{has_minor_unit_precision, new_reference};
use chrono::Utc;
use rust_decimal::Decimal;
use serde::Serialize;
use serde_json::{json, Value};
use std::sync::Arc;
use uuid::Uuid;

pub const DEFAULT_PAGE_SIZE: u32 = 20;
pub const MAX_PAGE_SIZE: u32 = 100;

/// Money entering the core must be positive and a whole number of minor units.
fn check_amount(amount: Decimal, label: &str) -> Result<(), GatewayError> {
    if amount <= Decimal::ZERO {
        return Err(GatewayError::InvalidRequest(format!(
            "{} must be greater than zero",
            label
        )));
    }
    if !has_minor_unit_precision(amount) {
        return Err(GatewayError::InvalidRequest(format!(
            "{} cannot have more than two decimal places",
            label
        )));
    }
    Ok(())
}

/// One selectable payment method for a caller.
#[derive(Debug, Clone, Serialize)]
pub struct GatewayOption {
    pub gateway: GatewayType,
    pub name: &'static str,
    pub currencies: Vec<String>,
    pub redirect: bool,
    /// Wallet only: whether the current balance covers the requested amount.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub can_cover: Option<bool>,
}

#[derive(Debug, Clone, Serialize)]
pub struct AvailableGateways {
    pub methods: Vec<GatewayOption>,
    pub recommended: GatewayType,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub wallet_balance: Option<Decimal>,
}

#[derive(Debug, Clone, Serialize)]
pub struct TransactionPage {
    pub transactions: Vec<LedgerTransaction>,
    pub page: u32,
    pub limit: u32,
    pub total: u64,
    pub total_pages: u64,
}

/// Fields needed to submit a manual bank transfer for review.
#[derive(Debug, Clone)]
pub struct BankTransferSubmission {
    pub user_id: String,
    pub amount: Decimal,
    pub currency: String,
    pub purpose: String,
    pub proof_url: String,
    pub reference: Option<String>,
}

/// What an audited call produced, reduced to the fields the log keeps.
trait AttemptOutcome: Serialize {
    fn status(&self) -> PaymentStatus;
    fn success(&self) -> bool;
    fn error(&self) -> Option<String>;
    fn reference(&self) -> Option<String>;
    fn transaction_id(&self) -> Option<String>;
}

impl AttemptOutcome for PaymentResponse {
    fn status(&self) -> PaymentStatus {
        self.status
    }
    fn success(&self) -> bool {
        self.success
    }
    fn error(&self) -> Option<String> {
        self.error.clone()
    }
    fn reference(&self) -> Option<String> {
        self.reference.clone()
    }
    fn transaction_id(&self) -> Option<String> {
        self.transaction_id.clone()
    }
}

impl AttemptOutcome for PaymentVerification {
    fn status(&self) -> PaymentStatus {
        self.status
    }
    fn success(&self) -> bool {
        self.success
    }
    fn error(&self) -> Option<String> {
        self.error.clone()
    }
    fn reference(&self) -> Option<String> {
        Some(self.reference.clone())
    }
    fn transaction_id(&self) -> Option<String> {
        self.transaction_id.clone()
    }
}

impl AttemptOutcome for WebhookValidation {
    fn status(&self) -> PaymentStatus {
        self.status
    }
    fn success(&self) -> bool {
        self.is_valid
    }
    fn error(&self) -> Option<String> {
        (!self.is_valid).then(|| "Invalid webhook signature".to_string())
    }
    fn reference(&self) -> Option<String> {
        self.reference.clone()
    }
    fn transaction_id(&self) -> Option<String> {
        self.transaction_id.clone()
    }
}

pub struct PaymentProcessor {
    gateways: GatewaysConfig,
    factory: Arc<GatewayFactory>,
    storage: Storage,
}

impl PaymentProcessor {
    pub fn new(gateways: GatewaysConfig, factory: Arc<GatewayFactory>, storage: Storage) -> Self {
        Self {
            gateways,
            factory,
            storage,
        }
    }

    pub fn gateways(&self) -> &GatewaysConfig {
        &self.gateways
    }

    fn gateway(&self, gateway: GatewayType) -> Result<Arc<dyn PaymentGateway>, GatewayError> {
        self.factory
            .get_gateway(gateway, self.gateways.resolve(gateway))
    }

    /// Fills the outcome fields of `attempt`, counts it and appends it to the
    /// audit log. A failed log write is reported but never changes the result.
    async fn audit<T: AttemptOutcome>(
        &self,
        mut attempt: PaymentAttempt,
        result: &Result<T, GatewayError>,
    ) {
        match result {
            Ok(outcome) => {
                attempt.status = outcome.status();
                attempt.success = outcome.success();
                attempt.error = outcome.error();
                attempt.reference = attempt.reference.take().or_else(|| outcome.reference());
                attempt.transaction_id = outcome.transaction_id();
                attempt.response = serde_json::to_value(outcome).unwrap_or(Value::Null);
            }
            Err(err) => {
                attempt.status = PaymentStatus::Failed;
                attempt.success = false;
                attempt.error = Some(err.to_string());
            }
        }

        record_attempt(attempt.operation, attempt.gateway, attempt.status);

        let (operation, gateway) = (attempt.operation, attempt.gateway);
        if let Err(e) = self.storage.attempts.record(attempt).await {
            tracing::error!(
                error = %e,
                operation = operation.as_str(),
                gateway = %gateway,
                "Failed to write payment attempt"
            );
        }
    }

    pub async fn process_payment(
        &self,
        request: &PaymentRequest,
    ) -> Result<PaymentResponse, GatewayError> {
        let mut attempt = PaymentAttempt::new(AttemptOperation::Initiate, request.gateway);
        attempt.user_id = Some(request.user_id.clone());
        attempt.amount = Some(request.amount);
        attempt.currency = Some(request.currency.clone());
        attempt.request = serde_json::to_value(request).unwrap_or(Value::Null);

        let result = self.initiate(request).await;
        self.audit(attempt, &result).await;

        if let Ok(response) = &result {
            if response.status == PaymentStatus::Success {
                record_amount(request.gateway, &request.currency, request.amount);
            }
            tracing::info!(
                user_id = %request.user_id,
                gateway = %request.gateway,
                status = %response.status,
                reference = ?response.reference,
                "Payment processed"
            );
        }
        result
    }

    async fn initiate(&self, request: &PaymentRequest) -> Result<PaymentResponse, GatewayError> {
        check_amount(request.amount, "amount")?;
        let gateway = self.gateway(request.gateway)?;
        gateway.initiate(request).await
    }

    pub async fn verify_payment(
        &self,
        gateway: GatewayType,
        reference: &str,
    ) -> Result<PaymentVerification, GatewayError> {
        let mut attempt = PaymentAttempt::new(AttemptOperation::Verify, gateway);
        attempt.reference = Some(reference.to_string());
        attempt.request = json!({ "reference": reference });

        let result = match self.gateway(gateway) {
            Ok(instance) => instance.verify(reference).await,
            Err(e) => Err(e),
        };
        self.audit(attempt, &result).await;
        result
    }

    pub async fn refund_payment(
        &self,
        gateway: GatewayType,
        transaction_id: &str,
        amount: Option<Decimal>,
    ) -> Result<PaymentResponse, GatewayError> {
        let mut attempt = PaymentAttempt::new(AttemptOperation::Refund, gateway);
        attempt.transaction_id = Some(transaction_id.to_string());
        attempt.amount = amount;
        attempt.request = json!({ "transaction_id": transaction_id, "amount": amount });

        let result = self.refund(gateway, transaction_id, amount).await;
        self.audit(attempt, &result).await;

        if let Ok(response) = &result {
            tracing::info!(
                gateway = %gateway,
                transaction_id = %transaction_id,
                status = %response.status,
                "Refund processed"
            );
        }
        result
    }

    async fn refund(
        &self,
        gateway: GatewayType,
        transaction_id: &str,
        amount: Option<Decimal>,
    ) -> Result<PaymentResponse, GatewayError> {
        if let Some(amount) = amount {
            check_amount(amount, "refund amount")?;
        }
        let instance = self.gateway(gateway)?;
        instance.refund(transaction_id, amount).await
    }

    /// Authenticates a provider notification. Valid `Success` notifications are
    /// confirmed with a server-side verify before being reported as such.
    pub async fn handle_webhook(
        &self,
        gateway: GatewayType,
        payload: &[u8],
        signature: &str,
    ) -> Result<WebhookValidation, GatewayError> {
        let mut attempt = PaymentAttempt::new(AttemptOperation::Webhook, gateway);
        attempt.request = Value::String(String::from_utf8_lossy(payload).into_owned());

        let result = self.authenticate_webhook(gateway, payload, signature).await;
        self.audit(attempt, &result).await;
        result
    }

    async fn authenticate_webhook(
        &self,
        gateway: GatewayType,
        payload: &[u8],
        signature: &str,
    ) -> Result<WebhookValidation, GatewayError> {
        let instance = self.gateway(gateway)?;
        let mut validation = instance.validate_webhook(payload, signature).await?;

        if !validation.is_valid {
            record_webhook_signature_failure(gateway);
            tracing::warn!(gateway = %gateway, "Rejected webhook with invalid signature");
            return Ok(validation);
        }

        if validation.status == PaymentStatus::Success {
            match validation.reference.clone() {
                Some(reference) => {
                    let confirmed = self.verify_payment(gateway, &reference).await?;
                    if confirmed.status != PaymentStatus::Success {
                        tracing::warn!(
                            gateway = %gateway,
                            reference = %reference,
                            verified_status = %confirmed.status,
                            "Webhook success not confirmed by provider"
                        );
                    }
                    validation.status = confirmed.status;
                    if validation.transaction_id.is_none() {
                        validation.transaction_id = confirmed.transaction_id;
                    }
                }
                None => {
                    tracing::warn!(gateway = %gateway, "Webhook success without a reference");
                    validation.status = PaymentStatus::Pending;
                }
            }
        }

        tracing::info!(
            gateway = %gateway,
            reference = ?validation.reference,
            status = %validation.status,
            "Webhook accepted"
        );
        Ok(validation)
    }

    /// Wallet when it is enabled and covers `amount`, else the configured default.
    pub async fn recommended_gateway(
        &self,
        user_id: &str,
        amount: Decimal,
    ) -> Result<GatewayType, GatewayError> {
        if self.gateways.wallet.enabled {
            let balance = self.storage.wallet.balance(user_id).await?;
            if balance >= amount {
                return Ok(GatewayType::Wallet);
            }
        }
        Ok(self.gateways.default_gateway)
    }

    pub async fn available_gateways(
        &self,
        user_id: &str,
        amount: Option<Decimal>,
    ) -> Result<AvailableGateways, GatewayError> {
        let wallet_balance = if self.gateways.wallet.enabled {
            Some(self.storage.wallet.balance(user_id).await?)
        } else {
            None
        };

        let methods = self
            .gateways
            .enabled_gateways()
            .into_iter()
            .map(|gateway| {
                let config = self.gateways.resolve(gateway);
                let can_cover = match (gateway, wallet_balance, amount) {
                    (GatewayType::Wallet, Some(balance), Some(amount)) => Some(balance >= amount),
                    _ => None,
                };
                GatewayOption {
                    gateway,
                    name: gateway.display_name(),
                    currencies: config.features.supported_currencies.clone(),
                    redirect: gateway.is_redirect(),
                    can_cover,
                }
            })
            .collect();

        let recommended = match (wallet_balance, amount) {
            (Some(balance), Some(amount)) if balance >= amount => GatewayType::Wallet,
            _ => self.gateways.default_gateway,
        };

        Ok(AvailableGateways {
            methods,
            recommended,
            wallet_balance,
        })
    }

    pub async fn wallet_balance(&self, user_id: &str) -> Result<Decimal, GatewayError> {
        Ok(self.storage.wallet.balance(user_id).await?)
    }

    /// Newest first. `page` starts at 1; `limit` is clamped to 1..=100.
    pub async fn list_transactions(
        &self,
        user_id: &str,
        page: Option<u32>,
        limit: Option<u32>,
    ) -> Result<TransactionPage, GatewayError> {
        let page = page.unwrap_or(1).max(1);
        let limit = limit.unwrap_or(DEFAULT_PAGE_SIZE).clamp(1, MAX_PAGE_SIZE);
        let offset = u64::from(page - 1) * u64::from(limit);

        let (transactions, total) = self
            .storage
            .wallet
            .list_transactions(user_id, offset, i64::from(limit))
            .await?;

        Ok(TransactionPage {
            transactions,
            page,
            limit,
            total,
            total_pages: total.div_ceil(u64::from(limit)),
        })
    }

    pub async fn submit_bank_transfer(
        &self,
        submission: BankTransferSubmission,
    ) -> Result<PendingPayment, GatewayError> {
        check_amount(submission.amount, "amount")?;

        let reference = submission
            .reference
            .filter(|r| !r.trim().is_empty())
            .unwrap_or_else(|| new_reference("BT"));
        let pending = PendingPayment::new(
            &submission.user_id,
            submission.amount,
            &submission.currency.to_ascii_uppercase(),
            &submission.purpose,
            &submission.proof_url,
            reference,
        );

        if !self.storage.pending.create(pending.clone()).await? {
            return Err(GatewayError::Conflict(format!(
                "A bank transfer with reference {} has already been submitted",
                pending.reference
            )));
        }
        tracing::info!(
            user_id = %pending.owner_id,
            pending_payment_id = %pending.id,
            reference = %pending.reference,
            "Bank transfer submitted for review"
        );
        Ok(pending)
    }

    /// Approves or rejects a bank transfer. Anything past its review window is
    /// marked Expired instead and reported as a conflict.
    pub async fn review_pending_payment(
        &self,
        id: Uuid,
        approve: bool,
    ) -> Result<PendingPayment, GatewayError> {
        let pending = self
            .storage
            .pending
            .get(id)
            .await?
            .ok_or_else(|| GatewayError::NotFound(format!("Pending payment {}", id)))?;

        if pending.status != PendingPaymentStatus::Pending {
            return Err(GatewayError::Conflict(format!(
                "Pending payment {} has already been reviewed",
                id
            )));
        }

        let now = Utc::now();
        if pending.is_expired_at(now) {
            self.storage
                .pending
                .transition(id, PendingPaymentStatus::Expired, now)
                .await?;
            tracing::info!(pending_payment_id = %id, "Pending payment expired before review");
            return Err(GatewayError::Conflict(format!(
                "Pending payment {} has expired",
                id
            )));
        }

        let target = if approve {
            PendingPaymentStatus::Approved
        } else {
            PendingPaymentStatus::Rejected
        };
        let reviewed = self
            .storage
            .pending
            .transition(id, target, now)
            .await?
            .ok_or_else(|| {
                GatewayError::Conflict(format!("Pending payment {} has already been reviewed", id))
            })?;

        tracing::info!(pending_payment_id = %id, status = ?reviewed.status, "Pending payment reviewed");
        Ok(reviewed)
    }

    pub async fn retry_failed_payment(
        &self,
        transaction_id: &str,
    ) -> Result<PaymentResponse, GatewayError> {
        tracing::debug!(transaction_id = %transaction_id, "Retry requested");
        Err(GatewayError::NotImplemented(
            "Retrying failed payments".to_string(),
        ))
    }

    /// Administrative top-up. Returns the new balance.
    pub async fn credit_wallet(
        &self,
        user_id: &str,
        amount: Decimal,
        description: Option<String>,
    ) -> Result<Decimal, GatewayError> {
        check_amount(amount, "amount")?;
        let currency = self
            .gateways
            .wallet
            .features
            .supported_currencies
            .first()
            .cloned()
            .unwrap_or_else(|| "NGN".to_string());

        let credit = LedgerTransaction::credit(
            user_id,
            amount,
            &currency,
            description.unwrap_or_else(|| "Wallet top-up".to_string()),
            new_reference("CRD"),
        );
        let balance = self.storage.wallet.credit(credit).await?;
        tracing::info!(user_id = %user_id, amount = %amount, balance = %balance, "Wallet credited");
        Ok(balance)
    }

    pub async fn attempts_for_reference(
        &self,
        reference: &str,
    ) -> Result<Vec<PaymentAttempt>, GatewayError> {
        Ok(self.storage.attempts.list_for_reference(reference).await?)
    }
}
