//! Wallet ledger records.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::payment::GatewayType;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransactionKind {
    Debit,
    Credit,
    Refund,
}

impl TransactionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Debit => "debit",
            Self::Credit => "credit",
            Self::Refund => "refund",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransactionStatus {
    Pending,
    Completed,
    Failed,
}

impl TransactionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }
}

/// Append-only ledger row.
///
/// `amount` is signed: debits are negative, credits and refunds positive, so
/// a wallet balance is the sum of the owner's completed rows.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LedgerTransaction {
    pub id: Uuid,
    pub owner_id: String,
    pub amount: Decimal,
    pub currency: String,
    pub kind: TransactionKind,
    pub description: String,
    pub status: TransactionStatus,
    pub reference: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub original_transaction_id: Option<Uuid>,
    /// Running total refunded against this row; only meaningful for debits.
    pub refunded_amount: Decimal,
    pub gateway: GatewayType,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub purpose: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl LedgerTransaction {
    fn new(
        owner_id: &str,
        amount: Decimal,
        currency: &str,
        kind: TransactionKind,
        description: String,
        reference: String,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            owner_id: owner_id.to_string(),
            amount,
            currency: currency.to_string(),
            kind,
            description,
            status: TransactionStatus::Completed,
            reference,
            original_transaction_id: None,
            refunded_amount: Decimal::ZERO,
            gateway: GatewayType::Wallet,
            purpose: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// A completed wallet debit of `amount` (given as a positive value).
    pub fn debit(
        owner_id: &str,
        amount: Decimal,
        currency: &str,
        description: String,
        reference: String,
    ) -> Self {
        Self::new(
            owner_id,
            -amount.abs(),
            currency,
            TransactionKind::Debit,
            description,
            reference,
        )
    }

    pub fn credit(
        owner_id: &str,
        amount: Decimal,
        currency: &str,
        description: String,
        reference: String,
    ) -> Self {
        Self::new(
            owner_id,
            amount.abs(),
            currency,
            TransactionKind::Credit,
            description,
            reference,
        )
    }

    /// A refund credit pointing back at `original`.
    pub fn refund_of(original: &LedgerTransaction, amount: Decimal, reference: String) -> Self {
        let mut refund = Self::new(
            &original.owner_id,
            amount.abs(),
            &original.currency,
            TransactionKind::Refund,
            format!("Refund of {}", original.reference),
            reference,
        );
        refund.original_transaction_id = Some(original.id);
        refund.purpose = original.purpose.clone();
        refund
    }

    pub fn with_purpose(mut self, purpose: impl Into<String>) -> Self {
        self.purpose = Some(purpose.into());
        self
    }

    pub fn is_completed_debit(&self) -> bool {
        self.kind == TransactionKind::Debit && self.status == TransactionStatus::Completed
    }

    /// How much of a completed debit can still be refunded.
    pub fn refundable_amount(&self) -> Decimal {
        if !self.is_completed_debit() {
            return Decimal::ZERO;
        }
        (self.amount.abs() - self.refunded_amount).max(Decimal::ZERO)
    }
}
