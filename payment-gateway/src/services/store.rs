//! Storage ports used by the payment core.
//!
//! Balance checks and mutations are single calls on these traits so that
//! adapters can make each one atomic (one lock, or one database transaction).

use super::memory::InMemoryStore;
use super::repository::PaymentRepository;
use crate::models::{LedgerTransaction, PaymentAttempt, PendingPayment, PendingPaymentStatus};
use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use std::sync::Arc;
use uuid::Uuid;

/// Outcome of a conditional wallet debit.
#[derive(Debug, Clone, PartialEq)]
pub enum DebitOutcome {
    /// Balance was decremented and the debit row appended.
    Applied {
        transaction: LedgerTransaction,
        balance: Decimal,
    },
    /// Nothing changed; `balance` is the current balance.
    Insufficient { balance: Decimal },
}

/// Outcome of refunding a wallet debit.
#[derive(Debug, Clone, PartialEq)]
pub enum RefundOutcome {
    Applied {
        refund: LedgerTransaction,
        balance: Decimal,
    },
    NotFound,
    /// The original row is not a completed debit, or the amount is not positive.
    NotRefundable { reason: String },
    /// The requested amount exceeds what is left to refund.
    ExceedsRefundable { refundable: Decimal },
}

#[async_trait]
pub trait WalletLedger: Send + Sync {
    async fn balance(&self, owner_id: &str) -> Result<Decimal>;

    /// Decrements the owner's balance by `|debit.amount|` only if the balance
    /// covers it, appending `debit` in the same unit of work.
    async fn debit_if_sufficient(&self, debit: LedgerTransaction) -> Result<DebitOutcome>;

    /// Increments the balance and appends `credit`. Returns the new balance.
    async fn credit(&self, credit: LedgerTransaction) -> Result<Decimal>;

    /// Credits back part or all of a completed debit. `amount` defaults to the
    /// remaining refundable amount; cumulative refunds never exceed the debit.
    async fn refund_debit(
        &self,
        original_id: Uuid,
        amount: Option<Decimal>,
        reference: String,
    ) -> Result<RefundOutcome>;

    async fn find_transaction(&self, id: Uuid) -> Result<Option<LedgerTransaction>>;

    async fn find_by_reference(&self, reference: &str) -> Result<Option<LedgerTransaction>>;

    /// Newest first. Returns the page and the owner's total row count.
    async fn list_transactions(
        &self,
        owner_id: &str,
        offset: u64,
        limit: i64,
    ) -> Result<(Vec<LedgerTransaction>, u64)>;
}

/// Append-only audit trail of gateway calls.
#[async_trait]
pub trait AttemptLog: Send + Sync {
    async fn record(&self, attempt: PaymentAttempt) -> Result<()>;

    async fn list_for_reference(&self, reference: &str) -> Result<Vec<PaymentAttempt>>;
}

#[async_trait]
pub trait PendingPaymentStore: Send + Sync {
    /// Stores a new submission. Returns `false`, storing nothing, when the
    /// reference is already taken.
    async fn create(&self, payment: PendingPayment) -> Result<bool>;

    async fn get(&self, id: Uuid) -> Result<Option<PendingPayment>>;

    /// Moves a still-pending payment to `status`. Returns `None` when the
    /// payment does not exist or is no longer pending.
    async fn transition(
        &self,
        id: Uuid,
        status: PendingPaymentStatus,
        reviewed_at: DateTime<Utc>,
    ) -> Result<Option<PendingPayment>>;
}

/// Bundle of storage handles shared by the factory and processor.
#[derive(Clone)]
pub struct Storage {
    pub wallet: Arc<dyn WalletLedger>,
    pub attempts: Arc<dyn AttemptLog>,
    pub pending: Arc<dyn PendingPaymentStore>,
}

impl Storage {
    pub fn in_memory() -> Self {
        Self::from(Arc::new(InMemoryStore::new()))
    }
}

impl From<Arc<PaymentRepository>> for Storage {
    fn from(repository: Arc<PaymentRepository>) -> Self {
        Self {
            wallet: repository.clone(),
            attempts: repository.clone(),
            pending: repository,
        }
    }
}

impl From<Arc<InMemoryStore>> for Storage {
    fn from(store: Arc<InMemoryStore>) -> Self {
        Self {
            wallet: store.clone(),
            attempts: store.clone(),
            pending: store,
        }
    }
}
