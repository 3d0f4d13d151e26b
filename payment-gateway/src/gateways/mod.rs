//! Payment backends behind one contract.
//!
//! Every backend implements [`PaymentGateway`]. Expected failures (declined,
//! insufficient funds, provider unreachable) come back as `Ok` values with a
//! `Failed` status; `Err` is reserved for configuration faults, contract
//! misuse and storage errors.

pub mod factory;
pub mod flutterwave;
pub mod http;
pub mod mock;
pub mod paystack;
pub mod wallet;

pub use factory::GatewayFactory;
pub use flutterwave::FlutterwaveGateway;
pub use mock::MockGateway;
pub use paystack::PaystackGateway;
pub use wallet::WalletGateway;

use crate::config::GatewayConfig;
use crate::error::GatewayError;
use crate::models::{
    GatewayType, PaymentRequest, PaymentResponse, PaymentStatus, PaymentVerification,
    WebhookValidation,
};
use async_trait::async_trait;
use rust_decimal::Decimal;
use secrecy::{ExposeSecret, Secret};
use service_core::utils::verify_payload_signature;

#[async_trait]
pub trait PaymentGateway: Send + Sync {
    fn gateway_type(&self) -> GatewayType;

    /// One-time setup from configuration. Runs before the instance is cached.
    fn initialize(&mut self, config: &GatewayConfig) -> Result<(), GatewayError>;

    async fn initiate(&self, request: &PaymentRequest) -> Result<PaymentResponse, GatewayError>;

    async fn verify(&self, reference: &str) -> Result<PaymentVerification, GatewayError>;

    /// Authenticates a raw notification body against its signature header.
    async fn validate_webhook(
        &self,
        _payload: &[u8],
        _signature: &str,
    ) -> Result<WebhookValidation, GatewayError> {
        Err(GatewayError::UnsupportedOperation {
            gateway: self.gateway_type(),
            operation: "webhooks",
        })
    }

    /// Refunds all (`None`) or part of a completed payment.
    async fn refund(
        &self,
        _transaction_id: &str,
        _amount: Option<Decimal>,
    ) -> Result<PaymentResponse, GatewayError> {
        Err(GatewayError::UnsupportedOperation {
            gateway: self.gateway_type(),
            operation: "refunds",
        })
    }

    fn supported_currencies(&self) -> Vec<String>;

    fn supports_currency(&self, currency: &str) -> bool {
        self.supported_currencies()
            .iter()
            .any(|c| c.eq_ignore_ascii_case(currency))
    }
}

/// Failed response for a currency the backend does not accept.
pub(crate) fn unsupported_currency(gateway: GatewayType, currency: &str) -> PaymentResponse {
    PaymentResponse::failed(format!(
        "{} does not support {} payments",
        gateway.display_name(),
        currency.to_ascii_uppercase()
    ))
}

/// Constant-time HMAC-SHA256 check of a raw body. An unset secret never matches.
pub(crate) fn signature_matches(secret: &Secret<String>, payload: &[u8], signature: &str) -> bool {
    let secret = secret.expose_secret();
    if secret.is_empty() || signature.trim().is_empty() {
        return false;
    }
    verify_payload_signature(secret, payload, signature).unwrap_or(false)
}

/// Maps a provider's webhook event status onto Pending, Success or Failed.
/// A refunded charge is no longer a completed payment. Unknown values stay Pending.
pub(crate) fn status_from_provider(status: &str) -> PaymentStatus {
    match status.to_ascii_lowercase().as_str() {
        "success" | "successful" | "completed" | "charge.success" => PaymentStatus::Success,
        "failed" | "charge.failed" | "abandoned" | "reversed" | "refunded"
        | "refund.processed" => PaymentStatus::Failed,
        _ => PaymentStatus::Pending,
    }
}
