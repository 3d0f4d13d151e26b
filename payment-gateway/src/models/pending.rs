use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// How long a bank-transfer proof waits for review.
pub const PENDING_PAYMENT_TTL_HOURS: i64 = 24;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PendingPaymentStatus {
    Pending,
    Approved,
    Rejected,
    Expired,
}

/// Manual bank-transfer payment awaiting administrator review.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PendingPayment {
    pub id: Uuid,
    pub owner_id: String,
    pub amount: Decimal,
    pub currency: String,
    pub purpose: String,
    pub proof_url: String,
    pub reference: String,
    pub status: PendingPaymentStatus,
    pub expires_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reviewed_at: Option<DateTime<Utc>>,
}

impl PendingPayment {
    pub fn new(
        owner_id: &str,
        amount: Decimal,
        currency: &str,
        purpose: &str,
        proof_url: &str,
        reference: String,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            owner_id: owner_id.to_string(),
            amount,
            currency: currency.to_string(),
            purpose: purpose.to_string(),
            proof_url: proof_url.to_string(),
            reference,
            status: PendingPaymentStatus::Pending,
            expires_at: now + Duration::hours(PENDING_PAYMENT_TTL_HOURS),
            created_at: now,
            reviewed_at: None,
        }
    }

    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.status == PendingPaymentStatus::Pending && now >= self.expires_at
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn new_pending_payment_expires_in_a_day() {
        let pending = PendingPayment::new(
            "user-1",
            dec!(2500),
            "NGN",
            "registration",
            "https://files.example.com/proof.png",
            "BT_1".into(),
        );
        assert_eq!(pending.status, PendingPaymentStatus::Pending);
        assert_eq!(pending.expires_at - pending.created_at, Duration::hours(24));
        assert!(!pending.is_expired_at(pending.created_at));
        assert!(pending.is_expired_at(pending.expires_at));
    }
}
