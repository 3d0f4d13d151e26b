//! Internal stored-value wallet.
//!
//! Settles synchronously against the ledger. The balance check and the debit
//! happen inside one storage call, so concurrent payments cannot overdraw.

use super::{unsupported_currency, PaymentGateway};
use crate::config::GatewayConfig;
use crate::error::GatewayError;
use crate::models::{
    GatewayType, LedgerTransaction, PaymentRequest, PaymentResponse, PaymentStatus,
    PaymentVerification, TransactionStatus,
};
use crate::services::store::{DebitOutcome, RefundOutcome, WalletLedger};
use crate::utils::{format_amount, new_reference};
use async_trait::async_trait;
use rust_decimal::Decimal;
use std::sync::Arc;
use uuid::Uuid;

pub const DEFAULT_WALLET_CURRENCY: &str = "NGN";

pub struct WalletGateway {
    ledger: Arc<dyn WalletLedger>,
    currency: String,
}

impl WalletGateway {
    pub fn new(ledger: Arc<dyn WalletLedger>) -> Self {
        Self {
            ledger,
            currency: DEFAULT_WALLET_CURRENCY.to_string(),
        }
    }

    async fn lookup(&self, reference: &str) -> Result<Option<LedgerTransaction>, GatewayError> {
        if let Some(tx) = self.ledger.find_by_reference(reference).await? {
            return Ok(Some(tx));
        }
        match Uuid::parse_str(reference) {
            Ok(id) => Ok(self.ledger.find_transaction(id).await?),
            Err(_) => Ok(None),
        }
    }
}

#[async_trait]
impl PaymentGateway for WalletGateway {
    fn gateway_type(&self) -> GatewayType {
        GatewayType::Wallet
    }

    fn initialize(&mut self, config: &GatewayConfig) -> Result<(), GatewayError> {
        if let Some(currency) = config.features.supported_currencies.first() {
            self.currency = currency.to_ascii_uppercase();
        }
        tracing::debug!(currency = %self.currency, "Wallet gateway initialized");
        Ok(())
    }

    async fn initiate(&self, request: &PaymentRequest) -> Result<PaymentResponse, GatewayError> {
        if !self.supports_currency(&request.currency) {
            return Ok(unsupported_currency(GatewayType::Wallet, &request.currency));
        }

        let debit = LedgerTransaction::debit(
            &request.user_id,
            request.amount,
            &self.currency,
            request.description(),
            new_reference("WAL"),
        )
        .with_purpose(request.purpose.clone());

        match self.ledger.debit_if_sufficient(debit).await? {
            DebitOutcome::Applied {
                transaction,
                balance,
            } => {
                tracing::info!(
                    user_id = %request.user_id,
                    reference = %transaction.reference,
                    amount = %request.amount,
                    balance = %balance,
                    "Wallet debited"
                );
                Ok(PaymentResponse::succeeded(PaymentStatus::Success)
                    .with_transaction_id(transaction.id.to_string())
                    .with_reference(transaction.reference)
                    .with_balance(balance)
                    .with_message("Payment completed from wallet"))
            }
            DebitOutcome::Insufficient { balance } => {
                tracing::info!(
                    user_id = %request.user_id,
                    amount = %request.amount,
                    balance = %balance,
                    "Wallet debit declined for insufficient balance"
                );
                Ok(PaymentResponse::failed(format!(
                    "Insufficient wallet balance. You have {} but need {}",
                    format_amount(&self.currency, balance),
                    format_amount(&self.currency, request.amount)
                ))
                .with_balance(balance))
            }
        }
    }

    async fn verify(&self, reference: &str) -> Result<PaymentVerification, GatewayError> {
        let Some(tx) = self.lookup(reference).await? else {
            return Ok(PaymentVerification::failed(reference, "Transaction not found"));
        };

        let status = match tx.status {
            TransactionStatus::Completed => PaymentStatus::Success,
            TransactionStatus::Pending => PaymentStatus::Pending,
            TransactionStatus::Failed => PaymentStatus::Failed,
        };

        let mut verification = PaymentVerification::new(tx.reference.clone(), status);
        verification.transaction_id = Some(tx.id.to_string());
        verification.amount = Some(tx.amount.abs());
        verification.currency = Some(tx.currency.clone());
        verification.message = Some(tx.description.clone());
        if status == PaymentStatus::Success {
            verification.paid_at = Some(tx.created_at);
        }
        if tx.refunded_amount > Decimal::ZERO {
            verification
                .metadata
                .insert("refunded_amount".into(), tx.refunded_amount.to_string().into());
        }
        Ok(verification)
    }

    async fn refund(
        &self,
        transaction_id: &str,
        amount: Option<Decimal>,
    ) -> Result<PaymentResponse, GatewayError> {
        let Ok(original_id) = Uuid::parse_str(transaction_id) else {
            return Ok(PaymentResponse::failed("Invalid wallet transaction id"));
        };

        let outcome = self
            .ledger
            .refund_debit(original_id, amount, new_reference("RFD"))
            .await?;

        Ok(match outcome {
            RefundOutcome::Applied { refund, balance } => {
                tracing::info!(
                    original_transaction_id = %original_id,
                    refund_id = %refund.id,
                    amount = %refund.amount,
                    "Wallet refund applied"
                );
                PaymentResponse::succeeded(PaymentStatus::Refunded)
                    .with_transaction_id(refund.id.to_string())
                    .with_message(format!(
                        "Refunded {} to wallet",
                        format_amount(&refund.currency, refund.amount)
                    ))
                    .with_reference(refund.reference)
                    .with_balance(balance)
            }
            RefundOutcome::NotFound => PaymentResponse::failed("Transaction not found"),
            RefundOutcome::NotRefundable { reason } => PaymentResponse::failed(reason),
            RefundOutcome::ExceedsRefundable { refundable } => {
                PaymentResponse::failed(format!(
                    "Refund exceeds the refundable amount of {}",
                    format_amount(&self.currency, refundable)
                ))
            }
        })
    }

    fn supported_currencies(&self) -> Vec<String> {
        vec![self.currency.clone()]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::PaymentMetadata;
    use crate::services::memory::InMemoryStore;
    use rust_decimal_macros::dec;

    async fn funded_wallet(balance: Decimal) -> (WalletGateway, Arc<InMemoryStore>) {
        let store = Arc::new(InMemoryStore::new());
        if balance > Decimal::ZERO {
            store
                .credit(LedgerTransaction::credit(
                    "user-1",
                    balance,
                    "NGN",
                    "Top up".into(),
                    new_reference("CRD"),
                ))
                .await
                .unwrap();
        }
        let mut gateway = WalletGateway::new(store.clone());
        gateway.initialize(&GatewayConfig::enabled()).unwrap();
        (gateway, store)
    }

    fn request(amount: Decimal) -> PaymentRequest {
        PaymentRequest {
            user_id: "user-1".into(),
            amount,
            currency: "NGN".into(),
            gateway: GatewayType::Wallet,
            purpose: "registration".into(),
            package_id: None,
            metadata: PaymentMetadata::default(),
        }
    }

    #[tokio::test]
    async fn exact_balance_payment_succeeds_and_empties_wallet() {
        let (gateway, store) = funded_wallet(dec!(5000)).await;

        let response = gateway.initiate(&request(dec!(5000))).await.unwrap();
        assert!(response.success);
        assert_eq!(response.status, PaymentStatus::Success);
        assert_eq!(response.balance, Some(dec!(0)));
        assert!(response.reference.as_deref().unwrap().starts_with("WAL_"));

        let (rows, _) = store.list_transactions("user-1", 0, 10).await.unwrap();
        let debit = &rows[0];
        assert_eq!(debit.amount, dec!(-5000));
        assert_eq!(debit.status, TransactionStatus::Completed);
    }

    #[tokio::test]
    async fn short_balance_fails_with_formatted_message() {
        let (gateway, store) = funded_wallet(dec!(1000)).await;

        let response = gateway.initiate(&request(dec!(5000))).await.unwrap();
        assert!(!response.success);
        assert_eq!(response.status, PaymentStatus::Failed);
        assert_eq!(
            response.error.as_deref(),
            Some("Insufficient wallet balance. You have ₦1,000 but need ₦5,000")
        );
        assert_eq!(response.balance, Some(dec!(1000)));
        assert_eq!(store.balance("user-1").await.unwrap(), dec!(1000));
    }

    #[tokio::test]
    async fn other_currencies_are_refused_without_debiting() {
        let (gateway, store) = funded_wallet(dec!(1000)).await;
        let mut usd = request(dec!(10));
        usd.currency = "USD".into();

        let response = gateway.initiate(&usd).await.unwrap();
        assert_eq!(response.status, PaymentStatus::Failed);
        assert_eq!(store.balance("user-1").await.unwrap(), dec!(1000));
    }

    #[tokio::test]
    async fn full_refund_restores_balance_and_blocks_a_second() {
        let (gateway, store) = funded_wallet(dec!(5000)).await;
        let paid = gateway.initiate(&request(dec!(5000))).await.unwrap();
        let tx_id = paid.transaction_id.unwrap();

        let refunded = gateway.refund(&tx_id, None).await.unwrap();
        assert!(refunded.success);
        assert_eq!(refunded.status, PaymentStatus::Refunded);
        assert_eq!(refunded.balance, Some(dec!(5000)));
        assert_eq!(store.balance("user-1").await.unwrap(), dec!(5000));

        let again = gateway.refund(&tx_id, Some(dec!(1))).await.unwrap();
        assert!(!again.success);
        assert_eq!(store.balance("user-1").await.unwrap(), dec!(5000));
    }

    #[tokio::test]
    async fn verify_reports_completed_debit_as_success() {
        let (gateway, _store) = funded_wallet(dec!(2000)).await;
        let paid = gateway.initiate(&request(dec!(1500))).await.unwrap();
        let reference = paid.reference.unwrap();

        let verification = gateway.verify(&reference).await.unwrap();
        assert!(verification.success);
        assert_eq!(verification.amount, Some(dec!(1500)));

        let missing = gateway.verify("WAL_unknown").await.unwrap();
        assert_eq!(missing.status, PaymentStatus::Failed);
    }

    #[tokio::test]
    async fn webhooks_are_unsupported() {
        let (gateway, _store) = funded_wallet(dec!(0)).await;
        let err = gateway.validate_webhook(b"{}", "sig").await.unwrap_err();
        assert!(matches!(err, GatewayError::UnsupportedOperation { .. }));
    }
}
