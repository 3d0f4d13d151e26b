//! Simulated backend for development and end-to-end tests.

use super::{signature_matches, status_from_provider, unsupported_currency, PaymentGateway};
use crate::config::GatewayConfig;
use crate::error::GatewayError;
use crate::models::{
    GatewayType, PaymentRequest, PaymentResponse, PaymentStatus, PaymentVerification,
    WebhookValidation,
};
use crate::utils::new_reference;
use async_trait::async_trait;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rust_decimal::Decimal;
use secrecy::Secret;
use serde::Deserialize;
use std::sync::Mutex;
use std::time::Duration;

pub const MOCK_REFERENCE_PREFIX: &str = "MOCK_";
pub const MOCK_SIGNATURE_HEADER: &str = "x-mock-signature";

pub struct MockGateway {
    latency: Duration,
    failure_rate: u8,
    currencies: Vec<String>,
    webhook_secret: Secret<String>,
    rng: Mutex<StdRng>,
}

impl MockGateway {
    pub fn new() -> Self {
        Self {
            latency: Duration::ZERO,
            failure_rate: 0,
            currencies: vec!["NGN".to_string()],
            webhook_secret: Secret::new(String::new()),
            rng: Mutex::new(StdRng::from_entropy()),
        }
    }

    /// Draws once from the RNG; true means this attempt should fail.
    fn roll_failure(&self) -> bool {
        if self.failure_rate == 0 {
            return false;
        }
        let roll: u8 = match self.rng.lock() {
            Ok(mut rng) => rng.gen_range(0..100),
            Err(poisoned) => poisoned.into_inner().gen_range(0..100),
        };
        roll < self.failure_rate
    }

    async fn simulate_latency(&self) {
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }
    }
}

impl Default for MockGateway {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Deserialize)]
struct MockNotification {
    #[serde(default)]
    reference: Option<String>,
    #[serde(default)]
    status: Option<String>,
}

#[async_trait]
impl PaymentGateway for MockGateway {
    fn gateway_type(&self) -> GatewayType {
        GatewayType::Mock
    }

    fn initialize(&mut self, config: &GatewayConfig) -> Result<(), GatewayError> {
        let features = &config.features;
        if features.failure_rate > 100 {
            return Err(GatewayError::InvalidRequest(
                "mock failure rate must be between 0 and 100".to_string(),
            ));
        }
        self.latency = Duration::from_millis(features.simulated_latency_ms);
        self.failure_rate = features.failure_rate;
        self.currencies = features
            .supported_currencies
            .iter()
            .map(|c| c.to_ascii_uppercase())
            .collect();
        self.webhook_secret = config.credentials.webhook_secret.clone();
        if let Some(seed) = features.seed {
            self.rng = Mutex::new(StdRng::seed_from_u64(seed));
        }
        tracing::debug!(
            latency_ms = features.simulated_latency_ms,
            failure_rate = self.failure_rate,
            seeded = features.seed.is_some(),
            "Mock gateway initialized"
        );
        Ok(())
    }

    async fn initiate(&self, request: &PaymentRequest) -> Result<PaymentResponse, GatewayError> {
        self.simulate_latency().await;

        if !self.supports_currency(&request.currency) {
            return Ok(unsupported_currency(GatewayType::Mock, &request.currency));
        }

        if self.roll_failure() {
            tracing::debug!(user_id = %request.user_id, "Mock payment declined");
            return Ok(PaymentResponse::failed("Mock payment declined"));
        }

        let reference = new_reference("MOCK");
        Ok(PaymentResponse::succeeded(PaymentStatus::Success)
            .with_transaction_id(reference.clone())
            .with_reference(reference)
            .with_message("Mock payment completed"))
    }

    async fn verify(&self, reference: &str) -> Result<PaymentVerification, GatewayError> {
        self.simulate_latency().await;

        if !reference.starts_with(MOCK_REFERENCE_PREFIX) {
            return Ok(PaymentVerification::failed(
                reference,
                "Invalid mock payment reference",
            ));
        }

        let mut verification = PaymentVerification::new(reference, PaymentStatus::Success);
        verification.transaction_id = Some(reference.to_string());
        verification.paid_at = Some(chrono::Utc::now());
        verification.message = Some("Mock payment verified".to_string());
        Ok(verification)
    }

    async fn validate_webhook(
        &self,
        payload: &[u8],
        signature: &str,
    ) -> Result<WebhookValidation, GatewayError> {
        if !signature_matches(&self.webhook_secret, payload, signature) {
            return Ok(WebhookValidation::invalid());
        }

        let notification: MockNotification = match serde_json::from_slice(payload) {
            Ok(n) => n,
            Err(e) => {
                tracing::warn!(error = %e, "Signed mock webhook has an unreadable body");
                MockNotification {
                    reference: None,
                    status: None,
                }
            }
        };

        Ok(WebhookValidation {
            is_valid: true,
            transaction_id: notification.reference.clone(),
            reference: notification.reference,
            status: notification
                .status
                .as_deref()
                .map(status_from_provider)
                .unwrap_or(PaymentStatus::Pending),
        })
    }

    async fn refund(
        &self,
        transaction_id: &str,
        _amount: Option<Decimal>,
    ) -> Result<PaymentResponse, GatewayError> {
        self.simulate_latency().await;

        if !transaction_id.starts_with(MOCK_REFERENCE_PREFIX) {
            return Ok(PaymentResponse::failed("Invalid mock payment reference"));
        }

        Ok(PaymentResponse::succeeded(PaymentStatus::Refunded)
            .with_transaction_id(transaction_id)
            .with_reference(transaction_id)
            .with_message("Mock refund completed"))
    }

    fn supported_currencies(&self) -> Vec<String> {
        self.currencies.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::GatewayFeatures;
    use crate::models::PaymentMetadata;
    use rust_decimal_macros::dec;

    fn mock_with(failure_rate: u8, seed: Option<u64>) -> MockGateway {
        let config = GatewayConfig::enabled()
            .with_credentials("", "", "mock-secret")
            .with_features(GatewayFeatures {
                failure_rate,
                seed,
                supported_currencies: vec!["NGN".into(), "USD".into()],
                ..GatewayFeatures::default()
            });
        let mut gateway = MockGateway::new();
        gateway.initialize(&config).unwrap();
        gateway
    }

    fn request() -> PaymentRequest {
        PaymentRequest {
            user_id: "user-1".into(),
            amount: dec!(100),
            currency: "NGN".into(),
            gateway: GatewayType::Mock,
            purpose: "test".into(),
            package_id: None,
            metadata: PaymentMetadata::default(),
        }
    }

    #[tokio::test]
    async fn zero_failure_rate_always_succeeds_with_mock_reference() {
        let gateway = mock_with(0, None);
        for _ in 0..50 {
            let response = gateway.initiate(&request()).await.unwrap();
            assert_eq!(response.status, PaymentStatus::Success);
            let reference = response.reference.unwrap();
            assert!(reference.starts_with("MOCK_"));
            let suffix = reference.rsplit('_').next().unwrap();
            assert_eq!(suffix.len(), 8);
            assert!(suffix.chars().all(|c| c.is_ascii_hexdigit()));
        }
    }

    #[tokio::test]
    async fn full_failure_rate_always_fails() {
        let gateway = mock_with(100, None);
        for _ in 0..20 {
            let response = gateway.initiate(&request()).await.unwrap();
            assert_eq!(response.status, PaymentStatus::Failed);
        }
    }

    #[tokio::test]
    async fn seeded_failure_rate_converges() {
        let gateway = mock_with(30, Some(42));
        let mut failures = 0u32;
        let runs = 2_000u32;
        for _ in 0..runs {
            if gateway.initiate(&request()).await.unwrap().status == PaymentStatus::Failed {
                failures += 1;
            }
        }
        let rate = f64::from(failures) / f64::from(runs);
        assert!((0.25..=0.35).contains(&rate), "observed failure rate {}", rate);
    }

    #[tokio::test]
    async fn same_seed_gives_same_sequence() {
        let a = mock_with(50, Some(7));
        let b = mock_with(50, Some(7));
        for _ in 0..30 {
            let sa = a.initiate(&request()).await.unwrap().status;
            let sb = b.initiate(&request()).await.unwrap().status;
            assert_eq!(sa, sb);
        }
    }

    #[tokio::test]
    async fn verify_only_accepts_mock_references() {
        let gateway = mock_with(0, None);
        assert!(gateway.verify("MOCK_1_abcdef12").await.unwrap().success);

        let other = gateway.verify("PSK_1").await.unwrap();
        assert_eq!(other.status, PaymentStatus::Failed);
        assert_eq!(other.error.as_deref(), Some("Invalid mock payment reference"));
    }

    #[tokio::test]
    async fn refund_of_mock_payment_is_refunded() {
        let gateway = mock_with(0, None);
        let refund = gateway.refund("MOCK_1_abcdef12", None).await.unwrap();
        assert_eq!(refund.status, PaymentStatus::Refunded);
        assert!(!gateway.refund("WAL_1", None).await.unwrap().success);
    }

    #[tokio::test]
    async fn webhook_signature_is_checked_before_reading_status() {
        let gateway = mock_with(0, None);
        let body = br#"{"reference":"MOCK_1_abcdef12","status":"success"}"#;
        let signature = service_core::utils::sign_payload("mock-secret", body).unwrap();

        let valid = gateway.validate_webhook(body, &signature).await.unwrap();
        assert!(valid.is_valid);
        assert_eq!(valid.status, PaymentStatus::Success);
        assert_eq!(valid.reference.as_deref(), Some("MOCK_1_abcdef12"));

        let invalid = gateway.validate_webhook(body, "deadbeef").await.unwrap();
        assert!(!invalid.is_valid);
        assert_eq!(invalid.reference, None);
    }
}
