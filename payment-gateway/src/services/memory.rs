//! In-process storage adapter.
//!
//! One mutex guards balances and the ledger together, so every wallet
//! operation reads, checks and writes under a single guard. Used for tests and
//! `PAYMENT_STORAGE=memory` runs.

use super::store::{
    AttemptLog, DebitOutcome, PendingPaymentStore, RefundOutcome, WalletLedger,
};
use crate::models::{
    LedgerTransaction, PaymentAttempt, PendingPayment, PendingPaymentStatus,
};
use anyhow::{anyhow, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use std::collections::HashMap;
use tokio::sync::Mutex;
use uuid::Uuid;

#[derive(Default)]
struct LedgerState {
    balances: HashMap<String, Decimal>,
    transactions: Vec<LedgerTransaction>,
    by_id: HashMap<Uuid, usize>,
    by_reference: HashMap<String, usize>,
}

impl LedgerState {
    fn append(&mut self, tx: LedgerTransaction) -> Result<()> {
        if self.by_reference.contains_key(&tx.reference) {
            return Err(anyhow!("Duplicate transaction reference '{}'", tx.reference));
        }
        let index = self.transactions.len();
        self.by_id.insert(tx.id, index);
        self.by_reference.insert(tx.reference.clone(), index);
        self.transactions.push(tx);
        Ok(())
    }

    fn balance(&self, owner_id: &str) -> Decimal {
        self.balances.get(owner_id).copied().unwrap_or(Decimal::ZERO)
    }
}

#[derive(Default)]
pub struct InMemoryStore {
    ledger: Mutex<LedgerState>,
    attempts: Mutex<Vec<PaymentAttempt>>,
    pending: Mutex<HashMap<Uuid, PendingPayment>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every audit entry in write order.
    pub async fn attempts(&self) -> Vec<PaymentAttempt> {
        self.attempts.lock().await.clone()
    }
}

#[async_trait]
impl WalletLedger for InMemoryStore {
    async fn balance(&self, owner_id: &str) -> Result<Decimal> {
        Ok(self.ledger.lock().await.balance(owner_id))
    }

    async fn debit_if_sufficient(&self, debit: LedgerTransaction) -> Result<DebitOutcome> {
        let mut state = self.ledger.lock().await;
        let current = state.balance(&debit.owner_id);
        let amount = debit.amount.abs();

        if current < amount {
            return Ok(DebitOutcome::Insufficient { balance: current });
        }

        let balance = current - amount;
        state.append(debit.clone())?;
        state.balances.insert(debit.owner_id.clone(), balance);

        Ok(DebitOutcome::Applied {
            transaction: debit,
            balance,
        })
    }

    async fn credit(&self, credit: LedgerTransaction) -> Result<Decimal> {
        let mut state = self.ledger.lock().await;
        let balance = state.balance(&credit.owner_id) + credit.amount.abs();
        let owner = credit.owner_id.clone();
        state.append(credit)?;
        state.balances.insert(owner, balance);
        Ok(balance)
    }

    async fn refund_debit(
        &self,
        original_id: Uuid,
        amount: Option<Decimal>,
        reference: String,
    ) -> Result<RefundOutcome> {
        let mut state = self.ledger.lock().await;
        let Some(&index) = state.by_id.get(&original_id) else {
            return Ok(RefundOutcome::NotFound);
        };
        let original = state.transactions[index].clone();

        if !original.is_completed_debit() {
            return Ok(RefundOutcome::NotRefundable {
                reason: "Only completed debit transactions can be refunded".to_string(),
            });
        }

        let refundable = original.refundable_amount();
        let amount = amount.unwrap_or(refundable);
        if amount <= Decimal::ZERO {
            return Ok(RefundOutcome::NotRefundable {
                reason: "Refund amount must be positive".to_string(),
            });
        }
        if amount > refundable {
            return Ok(RefundOutcome::ExceedsRefundable { refundable });
        }

        let refund = LedgerTransaction::refund_of(&original, amount, reference);
        state.append(refund.clone())?;

        let now = Utc::now();
        let row = &mut state.transactions[index];
        row.refunded_amount += amount;
        row.updated_at = now;

        let balance = state.balance(&original.owner_id) + amount;
        state.balances.insert(original.owner_id.clone(), balance);

        Ok(RefundOutcome::Applied { refund, balance })
    }

    async fn find_transaction(&self, id: Uuid) -> Result<Option<LedgerTransaction>> {
        let state = self.ledger.lock().await;
        Ok(state.by_id.get(&id).map(|&i| state.transactions[i].clone()))
    }

    async fn find_by_reference(&self, reference: &str) -> Result<Option<LedgerTransaction>> {
        let state = self.ledger.lock().await;
        Ok(state
            .by_reference
            .get(reference)
            .map(|&i| state.transactions[i].clone()))
    }

    async fn list_transactions(
        &self,
        owner_id: &str,
        offset: u64,
        limit: i64,
    ) -> Result<(Vec<LedgerTransaction>, u64)> {
        let state = self.ledger.lock().await;
        let owned: Vec<&LedgerTransaction> = state
            .transactions
            .iter()
            .rev()
            .filter(|tx| tx.owner_id == owner_id)
            .collect();
        let total = owned.len() as u64;
        let page = owned
            .into_iter()
            .skip(offset as usize)
            .take(limit.max(0) as usize)
            .cloned()
            .collect();
        Ok((page, total))
    }
}

#[async_trait]
impl AttemptLog for InMemoryStore {
    async fn record(&self, attempt: PaymentAttempt) -> Result<()> {
        self.attempts.lock().await.push(attempt);
        Ok(())
    }

    async fn list_for_reference(&self, reference: &str) -> Result<Vec<PaymentAttempt>> {
        Ok(self
            .attempts
            .lock()
            .await
            .iter()
            .filter(|a| a.reference.as_deref() == Some(reference))
            .cloned()
            .collect())
    }
}

#[async_trait]
impl PendingPaymentStore for InMemoryStore {
    async fn create(&self, payment: PendingPayment) -> Result<bool> {
        let mut pending = self.pending.lock().await;
        if pending.values().any(|p| p.reference == payment.reference) {
            return Ok(false);
        }
        pending.insert(payment.id, payment);
        Ok(true)
    }

    async fn get(&self, id: Uuid) -> Result<Option<PendingPayment>> {
        Ok(self.pending.lock().await.get(&id).cloned())
    }

    async fn transition(
        &self,
        id: Uuid,
        status: PendingPaymentStatus,
        reviewed_at: DateTime<Utc>,
    ) -> Result<Option<PendingPayment>> {
        let mut pending = self.pending.lock().await;
        match pending.get_mut(&id) {
            Some(payment) if payment.status == PendingPaymentStatus::Pending => {
                payment.status = status;
                payment.reviewed_at = Some(reviewed_at);
                Ok(Some(payment.clone()))
            }
            _ => Ok(None),
        }
    }
}
