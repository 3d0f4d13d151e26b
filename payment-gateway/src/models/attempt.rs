use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::payment::{GatewayType, PaymentStatus};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AttemptOperation {
    Initiate,
    Verify,
    Refund,
    Webhook,
}

impl AttemptOperation {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Initiate => "initiate",
            Self::Verify => "verify",
            Self::Refund => "refund",
            Self::Webhook => "webhook",
        }
    }
}

/// One audit-log entry per gateway call, written whatever the outcome.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PaymentAttempt {
    pub id: Uuid,
    pub operation: AttemptOperation,
    pub gateway: GatewayType,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reference: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub transaction_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub amount: Option<Decimal>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub currency: Option<String>,
    pub status: PaymentStatus,
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub request: serde_json::Value,
    pub response: serde_json::Value,
    pub recorded_at: DateTime<Utc>,
}

impl PaymentAttempt {
    pub fn new(operation: AttemptOperation, gateway: GatewayType) -> Self {
        Self {
            id: Uuid::new_v4(),
            operation,
            gateway,
            user_id: None,
            reference: None,
            transaction_id: None,
            amount: None,
            currency: None,
            status: PaymentStatus::Failed,
            success: false,
            error: None,
            request: serde_json::Value::Null,
            response: serde_json::Value::Null,
            recorded_at: Utc::now(),
        }
    }
}
