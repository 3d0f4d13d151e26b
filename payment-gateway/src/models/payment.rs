//! Gateway-facing request/response types shared by every backend.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Payment backend kind.
///
/// The set is closed: the factory matches on it exhaustively, so a new
/// variant does not compile until it has a constructor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GatewayType {
    Wallet,
    Mock,
    Paystack,
    Flutterwave,
}

impl GatewayType {
    pub const ALL: [GatewayType; 4] = [
        GatewayType::Wallet,
        GatewayType::Mock,
        GatewayType::Paystack,
        GatewayType::Flutterwave,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Wallet => "wallet",
            Self::Mock => "mock",
            Self::Paystack => "paystack",
            Self::Flutterwave => "flutterwave",
        }
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            Self::Wallet => "Cash Wallet",
            Self::Mock => "Test Gateway",
            Self::Paystack => "Paystack",
            Self::Flutterwave => "Flutterwave",
        }
    }

    /// Whether the backend hands the payer off to an external checkout page.
    pub fn is_redirect(&self) -> bool {
        matches!(self, Self::Paystack | Self::Flutterwave)
    }
}

impl fmt::Display for GatewayType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for GatewayType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "wallet" => Ok(Self::Wallet),
            "mock" => Ok(Self::Mock),
            "paystack" => Ok(Self::Paystack),
            "flutterwave" => Ok(Self::Flutterwave),
            other => Err(format!("Unknown payment gateway '{}'", other)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PaymentStatus {
    Pending,
    Success,
    Failed,
    Refunded,
}

impl PaymentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Success => "success",
            Self::Failed => "failed",
            Self::Refunded => "refunded",
        }
    }
}

impl fmt::Display for PaymentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Payer details forwarded to providers.
///
/// `extra` is an opaque passthrough: providers receive it as metadata and the
/// response echoes it back untouched.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PaymentMetadata {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub callback_url: Option<String>,
    #[serde(default, skip_serializing_if = "serde_json::Map::is_empty")]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

/// A charge request. Built once at the boundary and only ever borrowed after.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PaymentRequest {
    pub user_id: String,
    pub amount: Decimal,
    pub currency: String,
    pub gateway: GatewayType,
    pub purpose: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub package_id: Option<String>,
    #[serde(default)]
    pub metadata: PaymentMetadata,
}

impl PaymentRequest {
    /// Human-readable line used for ledger descriptions and provider narration.
    pub fn description(&self) -> String {
        match &self.package_id {
            Some(package) => format!("Payment for {} ({})", self.purpose, package),
            None => format!("Payment for {}", self.purpose),
        }
    }

    /// Metadata sent to providers: payer extras plus our own correlation keys.
    pub fn provider_metadata(&self) -> serde_json::Value {
        let mut meta = self.metadata.extra.clone();
        meta.insert("user_id".into(), self.user_id.clone().into());
        meta.insert("purpose".into(), self.purpose.clone().into());
        if let Some(package) = &self.package_id {
            meta.insert("package_id".into(), package.clone().into());
        }
        serde_json::Value::Object(meta)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PaymentResponse {
    pub success: bool,
    pub status: PaymentStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub transaction_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reference: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub redirect_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub balance: Option<Decimal>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "serde_json::Map::is_empty")]
    pub metadata: serde_json::Map<String, serde_json::Value>,
}

impl PaymentResponse {
    pub fn succeeded(status: PaymentStatus) -> Self {
        Self {
            success: true,
            status,
            transaction_id: None,
            reference: None,
            redirect_url: None,
            balance: None,
            message: None,
            error: None,
            metadata: serde_json::Map::new(),
        }
    }

    /// A Failed outcome carrying `error` as both the user message and the error.
    pub fn failed(error: impl Into<String>) -> Self {
        let error = error.into();
        Self {
            success: false,
            status: PaymentStatus::Failed,
            transaction_id: None,
            reference: None,
            redirect_url: None,
            balance: None,
            message: Some(error.clone()),
            error: Some(error),
            metadata: serde_json::Map::new(),
        }
    }

    pub fn with_reference(mut self, reference: impl Into<String>) -> Self {
        self.reference = Some(reference.into());
        self
    }

    pub fn with_transaction_id(mut self, id: impl Into<String>) -> Self {
        self.transaction_id = Some(id.into());
        self
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    pub fn with_balance(mut self, balance: Decimal) -> Self {
        self.balance = Some(balance);
        self
    }

    pub fn with_metadata(mut self, metadata: serde_json::Map<String, serde_json::Value>) -> Self {
        self.metadata = metadata;
        self
    }
}

/// Answer to "what happened to this payment", keyed by reference.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PaymentVerification {
    pub success: bool,
    pub status: PaymentStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub transaction_id: Option<String>,
    pub reference: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub amount: Option<Decimal>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub currency: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub paid_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "serde_json::Map::is_empty")]
    pub metadata: serde_json::Map<String, serde_json::Value>,
}

impl PaymentVerification {
    pub fn new(reference: impl Into<String>, status: PaymentStatus) -> Self {
        Self {
            success: status == PaymentStatus::Success,
            status,
            transaction_id: None,
            reference: reference.into(),
            amount: None,
            currency: None,
            paid_at: None,
            message: None,
            error: None,
            metadata: serde_json::Map::new(),
        }
    }

    pub fn failed(reference: impl Into<String>, error: impl Into<String>) -> Self {
        let error = error.into();
        let mut verification = Self::new(reference, PaymentStatus::Failed);
        verification.message = Some(error.clone());
        verification.error = Some(error);
        verification
    }
}

/// Result of authenticating an asynchronous provider notification.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WebhookValidation {
    pub is_valid: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub transaction_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reference: Option<String>,
    pub status: PaymentStatus,
}

impl WebhookValidation {
    pub fn invalid() -> Self {
        Self {
            is_valid: false,
            transaction_id: None,
            reference: None,
            status: PaymentStatus::Failed,
        }
    }
}
