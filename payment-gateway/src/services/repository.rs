//! MongoDB storage adapter.
//!
//! Money is stored in minor units (`*_minor` fields) so balances can be
//! adjusted with `$inc` and guarded with `$gte` in a single update. Wallet
//! debits and refunds run inside a multi-document session transaction that
//! covers the balance update and the ledger insert, which requires a replica
//! set deployment.

use super::store::{
    AttemptLog, DebitOutcome, PendingPaymentStore, RefundOutcome, WalletLedger,
};
use crate::models::{
    AttemptOperation, GatewayType, LedgerTransaction, PaymentAttempt, PaymentStatus,
    PendingPayment, PendingPaymentStatus, TransactionKind, TransactionStatus,
};
use crate::utils::{from_minor_units, to_minor_units};
use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::TryStreamExt;
use mongodb::bson::{self, doc, Bson};
use mongodb::error::{ErrorKind, WriteFailure};
use mongodb::options::{
    FindOneAndUpdateOptions, FindOptions, IndexOptions, ReturnDocument,
};
use mongodb::{Client, ClientSession, Collection, Database, IndexModel};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

const DUPLICATE_KEY_CODE: i32 = 11000;

#[derive(Debug, Serialize, Deserialize)]
struct WalletDocument {
    #[serde(rename = "_id")]
    owner_id: String,
    balance_minor: i64,
    updated_at: bson::DateTime,
}

#[derive(Debug, Serialize, Deserialize)]
struct TransactionDocument {
    #[serde(rename = "_id")]
    id: String,
    owner_id: String,
    amount_minor: i64,
    currency: String,
    kind: TransactionKind,
    description: String,
    status: TransactionStatus,
    reference: String,
    original_transaction_id: Option<String>,
    refunded_minor: i64,
    gateway: GatewayType,
    purpose: Option<String>,
    created_at: bson::DateTime,
    updated_at: bson::DateTime,
}

impl TryFrom<&LedgerTransaction> for TransactionDocument {
    type Error = anyhow::Error;

    fn try_from(tx: &LedgerTransaction) -> Result<Self> {
        Ok(Self {
            id: tx.id.to_string(),
            owner_id: tx.owner_id.clone(),
            amount_minor: minor(tx.amount)?,
            currency: tx.currency.clone(),
            kind: tx.kind,
            description: tx.description.clone(),
            status: tx.status,
            reference: tx.reference.clone(),
            original_transaction_id: tx.original_transaction_id.map(|id| id.to_string()),
            refunded_minor: minor(tx.refunded_amount)?,
            gateway: tx.gateway,
            purpose: tx.purpose.clone(),
            created_at: bson::DateTime::from_chrono(tx.created_at),
            updated_at: bson::DateTime::from_chrono(tx.updated_at),
        })
    }
}

impl TryFrom<TransactionDocument> for LedgerTransaction {
    type Error = anyhow::Error;

    fn try_from(doc: TransactionDocument) -> Result<Self> {
        Ok(Self {
            id: Uuid::parse_str(&doc.id).context("Invalid transaction id")?,
            owner_id: doc.owner_id,
            amount: from_minor_units(doc.amount_minor),
            currency: doc.currency,
            kind: doc.kind,
            description: doc.description,
            status: doc.status,
            reference: doc.reference,
            original_transaction_id: doc
                .original_transaction_id
                .as_deref()
                .map(Uuid::parse_str)
                .transpose()
                .context("Invalid original transaction id")?,
            refunded_amount: from_minor_units(doc.refunded_minor),
            gateway: doc.gateway,
            purpose: doc.purpose,
            created_at: doc.created_at.to_chrono(),
            updated_at: doc.updated_at.to_chrono(),
        })
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct AttemptDocument {
    #[serde(rename = "_id")]
    id: String,
    operation: AttemptOperation,
    gateway: GatewayType,
    user_id: Option<String>,
    reference: Option<String>,
    transaction_id: Option<String>,
    amount: Option<String>,
    currency: Option<String>,
    status: PaymentStatus,
    success: bool,
    error: Option<String>,
    request: Bson,
    response: Bson,
    recorded_at: bson::DateTime,
}

impl TryFrom<&PaymentAttempt> for AttemptDocument {
    type Error = anyhow::Error;

    fn try_from(a: &PaymentAttempt) -> Result<Self> {
        Ok(Self {
            id: a.id.to_string(),
            operation: a.operation,
            gateway: a.gateway,
            user_id: a.user_id.clone(),
            reference: a.reference.clone(),
            transaction_id: a.transaction_id.clone(),
            amount: a.amount.map(|d| d.to_string()),
            currency: a.currency.clone(),
            status: a.status,
            success: a.success,
            error: a.error.clone(),
            request: bson::to_bson(&a.request)?,
            response: bson::to_bson(&a.response)?,
            recorded_at: bson::DateTime::from_chrono(a.recorded_at),
        })
    }
}

impl TryFrom<AttemptDocument> for PaymentAttempt {
    type Error = anyhow::Error;

    fn try_from(d: AttemptDocument) -> Result<Self> {
        Ok(Self {
            id: Uuid::parse_str(&d.id).context("Invalid attempt id")?,
            operation: d.operation,
            gateway: d.gateway,
            user_id: d.user_id,
            reference: d.reference,
            transaction_id: d.transaction_id,
            amount: d
                .amount
                .as_deref()
                .map(str::parse::<Decimal>)
                .transpose()
                .context("Invalid attempt amount")?,
            currency: d.currency,
            status: d.status,
            success: d.success,
            error: d.error,
            request: d.request.into_relaxed_extjson(),
            response: d.response.into_relaxed_extjson(),
            recorded_at: d.recorded_at.to_chrono(),
        })
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct PendingPaymentDocument {
    #[serde(rename = "_id")]
    id: String,
    owner_id: String,
    amount: String,
    currency: String,
    purpose: String,
    proof_url: String,
    reference: String,
    status: PendingPaymentStatus,
    expires_at: bson::DateTime,
    created_at: bson::DateTime,
    reviewed_at: Option<bson::DateTime>,
}

impl From<&PendingPayment> for PendingPaymentDocument {
    fn from(p: &PendingPayment) -> Self {
        Self {
            id: p.id.to_string(),
            owner_id: p.owner_id.clone(),
            amount: p.amount.to_string(),
            currency: p.currency.clone(),
            purpose: p.purpose.clone(),
            proof_url: p.proof_url.clone(),
            reference: p.reference.clone(),
            status: p.status,
            expires_at: bson::DateTime::from_chrono(p.expires_at),
            created_at: bson::DateTime::from_chrono(p.created_at),
            reviewed_at: p.reviewed_at.map(bson::DateTime::from_chrono),
        }
    }
}

impl TryFrom<PendingPaymentDocument> for PendingPayment {
    type Error = anyhow::Error;

    fn try_from(d: PendingPaymentDocument) -> Result<Self> {
        Ok(Self {
            id: Uuid::parse_str(&d.id).context("Invalid pending payment id")?,
            owner_id: d.owner_id,
            amount: d.amount.parse().context("Invalid pending payment amount")?,
            currency: d.currency,
            purpose: d.purpose,
            proof_url: d.proof_url,
            reference: d.reference,
            status: d.status,
            expires_at: d.expires_at.to_chrono(),
            created_at: d.created_at.to_chrono(),
            reviewed_at: d.reviewed_at.map(|t| t.to_chrono()),
        })
    }
}

/// Unique index violation (server code 11000).
fn is_duplicate_key(err: &mongodb::error::Error) -> bool {
    matches!(
        err.kind.as_ref(),
        ErrorKind::Write(WriteFailure::WriteError(write)) if write.code == DUPLICATE_KEY_CODE
    )
}

fn minor(amount: Decimal) -> Result<i64> {
    to_minor_units(amount).ok_or_else(|| anyhow!("Amount {} is out of range", amount))
}

#[derive(Clone)]
pub struct PaymentRepository {
    client: Client,
    wallet_collection: Collection<WalletDocument>,
    transaction_collection: Collection<TransactionDocument>,
    attempt_collection: Collection<AttemptDocument>,
    pending_collection: Collection<PendingPaymentDocument>,
}

impl PaymentRepository {
    pub fn new(client: &Client, db: &Database) -> Self {
        Self {
            client: client.clone(),
            wallet_collection: db.collection("wallets"),
            transaction_collection: db.collection("transactions"),
            attempt_collection: db.collection("payment_attempts"),
            pending_collection: db.collection("pending_payments"),
        }
    }

    /// Initialize database indexes.
    pub async fn init_indexes(&self) -> Result<()> {
        let reference_index = IndexModel::builder()
            .keys(doc! { "reference": 1 })
            .options(
                IndexOptions::builder()
                    .name("transaction_reference_idx".to_string())
                    .unique(true)
                    .build(),
            )
            .build();

        let owner_index = IndexModel::builder()
            .keys(doc! { "owner_id": 1, "created_at": -1 })
            .options(
                IndexOptions::builder()
                    .name("owner_transaction_idx".to_string())
                    .build(),
            )
            .build();

        self.transaction_collection
            .create_indexes([reference_index, owner_index], None)
            .await?;

        let attempt_reference_index = IndexModel::builder()
            .keys(doc! { "reference": 1, "recorded_at": 1 })
            .options(
                IndexOptions::builder()
                    .name("attempt_reference_idx".to_string())
                    .build(),
            )
            .build();

        self.attempt_collection
            .create_indexes([attempt_reference_index], None)
            .await?;

        let pending_reference_index = IndexModel::builder()
            .keys(doc! { "reference": 1 })
            .options(
                IndexOptions::builder()
                    .name("pending_reference_idx".to_string())
                    .unique(true)
                    .build(),
            )
            .build();

        self.pending_collection
            .create_indexes([pending_reference_index], None)
            .await?;

        tracing::info!("Payment gateway indexes initialized");
        Ok(())
    }

    async fn start_transaction(&self) -> Result<ClientSession> {
        let mut session = self.client.start_session(None).await?;
        session.start_transaction(None).await?;
        Ok(session)
    }

    async fn adjust_balance(
        &self,
        owner_id: &str,
        delta_minor: i64,
        session: &mut ClientSession,
    ) -> Result<Decimal> {
        let options = FindOneAndUpdateOptions::builder()
            .upsert(true)
            .return_document(ReturnDocument::After)
            .build();
        let wallet = self
            .wallet_collection
            .find_one_and_update_with_session(
                doc! { "_id": owner_id },
                doc! {
                    "$inc": { "balance_minor": delta_minor },
                    "$set": { "updated_at": bson::DateTime::now() }
                },
                options,
                session,
            )
            .await?
            .ok_or_else(|| anyhow!("Wallet upsert returned no document"))?;
        Ok(from_minor_units(wallet.balance_minor))
    }
}

#[async_trait]
impl WalletLedger for PaymentRepository {
    async fn balance(&self, owner_id: &str) -> Result<Decimal> {
        let wallet = self
            .wallet_collection
            .find_one(doc! { "_id": owner_id }, None)
            .await?;
        Ok(wallet
            .map(|w| from_minor_units(w.balance_minor))
            .unwrap_or(Decimal::ZERO))
    }

    async fn debit_if_sufficient(&self, debit: LedgerTransaction) -> Result<DebitOutcome> {
        let amount_minor = minor(debit.amount.abs())?;
        let document = TransactionDocument::try_from(&debit)?;
        let mut session = self.start_transaction().await?;

        // The balance predicate and the decrement are one server-side update.
        let options = FindOneAndUpdateOptions::builder()
            .return_document(ReturnDocument::After)
            .build();
        let updated = self
            .wallet_collection
            .find_one_and_update_with_session(
                doc! { "_id": &debit.owner_id, "balance_minor": { "$gte": amount_minor } },
                doc! {
                    "$inc": { "balance_minor": -amount_minor },
                    "$set": { "updated_at": bson::DateTime::now() }
                },
                options,
                &mut session,
            )
            .await?;

        let Some(wallet) = updated else {
            session.abort_transaction().await?;
            let balance = self.balance(&debit.owner_id).await?;
            return Ok(DebitOutcome::Insufficient { balance });
        };

        self.transaction_collection
            .insert_one_with_session(document, None, &mut session)
            .await?;
        session.commit_transaction().await?;

        Ok(DebitOutcome::Applied {
            transaction: debit,
            balance: from_minor_units(wallet.balance_minor),
        })
    }

    async fn credit(&self, credit: LedgerTransaction) -> Result<Decimal> {
        let amount_minor = minor(credit.amount.abs())?;
        let document = TransactionDocument::try_from(&credit)?;
        let mut session = self.start_transaction().await?;

        let balance = self
            .adjust_balance(&credit.owner_id, amount_minor, &mut session)
            .await?;
        self.transaction_collection
            .insert_one_with_session(document, None, &mut session)
            .await?;
        session.commit_transaction().await?;

        Ok(balance)
    }

    async fn refund_debit(
        &self,
        original_id: Uuid,
        amount: Option<Decimal>,
        reference: String,
    ) -> Result<RefundOutcome> {
        let mut session = self.start_transaction().await?;

        let original = self
            .transaction_collection
            .find_one_with_session(doc! { "_id": original_id.to_string() }, None, &mut session)
            .await?;
        let Some(original) = original else {
            session.abort_transaction().await?;
            return Ok(RefundOutcome::NotFound);
        };
        let original = LedgerTransaction::try_from(original)?;

        if !original.is_completed_debit() {
            session.abort_transaction().await?;
            return Ok(RefundOutcome::NotRefundable {
                reason: "Only completed debit transactions can be refunded".to_string(),
            });
        }

        let refundable = original.refundable_amount();
        let amount = amount.unwrap_or(refundable);
        if amount <= Decimal::ZERO {
            session.abort_transaction().await?;
            return Ok(RefundOutcome::NotRefundable {
                reason: "Refund amount must be positive".to_string(),
            });
        }
        let amount_minor = minor(amount)?;

        // Guarded increment: refunded total may never pass the debit amount.
        let reserved = self
            .transaction_collection
            .find_one_and_update_with_session(
                doc! {
                    "_id": original_id.to_string(),
                    "kind": "debit",
                    "status": "completed",
                    "$expr": {
                        "$lte": [
                            { "$add": ["$refunded_minor", amount_minor] },
                            { "$abs": "$amount_minor" }
                        ]
                    }
                },
                doc! {
                    "$inc": { "refunded_minor": amount_minor },
                    "$set": { "updated_at": bson::DateTime::now() }
                },
                None,
                &mut session,
            )
            .await?;
        if reserved.is_none() {
            session.abort_transaction().await?;
            return Ok(RefundOutcome::ExceedsRefundable { refundable });
        }

        let refund = LedgerTransaction::refund_of(&original, amount, reference);
        let balance = self
            .adjust_balance(&original.owner_id, amount_minor, &mut session)
            .await?;
        self.transaction_collection
            .insert_one_with_session(TransactionDocument::try_from(&refund)?, None, &mut session)
            .await?;
        session.commit_transaction().await?;

        Ok(RefundOutcome::Applied { refund, balance })
    }

    async fn find_transaction(&self, id: Uuid) -> Result<Option<LedgerTransaction>> {
        self.transaction_collection
            .find_one(doc! { "_id": id.to_string() }, None)
            .await?
            .map(LedgerTransaction::try_from)
            .transpose()
    }

    async fn find_by_reference(&self, reference: &str) -> Result<Option<LedgerTransaction>> {
        self.transaction_collection
            .find_one(doc! { "reference": reference }, None)
            .await?
            .map(LedgerTransaction::try_from)
            .transpose()
    }

    async fn list_transactions(
        &self,
        owner_id: &str,
        offset: u64,
        limit: i64,
    ) -> Result<(Vec<LedgerTransaction>, u64)> {
        let filter = doc! { "owner_id": owner_id };

        let total_count = self
            .transaction_collection
            .count_documents(filter.clone(), None)
            .await?;

        let options = FindOptions::builder()
            .sort(doc! { "created_at": -1 })
            .skip(offset)
            .limit(limit)
            .build();

        let cursor = self.transaction_collection.find(filter, options).await?;
        let documents: Vec<TransactionDocument> = cursor.try_collect().await?;
        let transactions = documents
            .into_iter()
            .map(LedgerTransaction::try_from)
            .collect::<Result<Vec<_>>>()?;

        Ok((transactions, total_count))
    }
}

#[async_trait]
impl AttemptLog for PaymentRepository {
    async fn record(&self, attempt: PaymentAttempt) -> Result<()> {
        self.attempt_collection
            .insert_one(AttemptDocument::try_from(&attempt)?, None)
            .await?;
        Ok(())
    }

    async fn list_for_reference(&self, reference: &str) -> Result<Vec<PaymentAttempt>> {
        let options = FindOptions::builder().sort(doc! { "recorded_at": 1 }).build();
        let cursor = self
            .attempt_collection
            .find(doc! { "reference": reference }, options)
            .await?;
        let documents: Vec<AttemptDocument> = cursor.try_collect().await?;
        documents.into_iter().map(PaymentAttempt::try_from).collect()
    }
}

#[async_trait]
impl PendingPaymentStore for PaymentRepository {
    async fn create(&self, payment: PendingPayment) -> Result<bool> {
        match self
            .pending_collection
            .insert_one(PendingPaymentDocument::from(&payment), None)
            .await
        {
            Ok(_) => Ok(true),
            Err(e) if is_duplicate_key(&e) => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    async fn get(&self, id: Uuid) -> Result<Option<PendingPayment>> {
        self.pending_collection
            .find_one(doc! { "_id": id.to_string() }, None)
            .await?
            .map(PendingPayment::try_from)
            .transpose()
    }

    async fn transition(
        &self,
        id: Uuid,
        status: PendingPaymentStatus,
        reviewed_at: DateTime<Utc>,
    ) -> Result<Option<PendingPayment>> {
        let options = FindOneAndUpdateOptions::builder()
            .return_document(ReturnDocument::After)
            .build();
        self.pending_collection
            .find_one_and_update(
                doc! { "_id": id.to_string(), "status": "pending" },
                doc! {
                    "$set": {
                        "status": bson::to_bson(&status)?,
                        "reviewed_at": bson::DateTime::from_chrono(reviewed_at)
                    }
                },
                options,
            )
            .await?
            .map(PendingPayment::try_from)
            .transpose()
    }
}
