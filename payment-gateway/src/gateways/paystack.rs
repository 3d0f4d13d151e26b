//! Paystack redirect checkout.
//!
//! Amounts go to Paystack in kobo (minor units) and come back the same way.

use super::http::{decimal_from_json, provider_message, string_from_json, ProviderClient};
use super::{signature_matches, status_from_provider, unsupported_currency, PaymentGateway};
use crate::config::GatewayConfig;
use crate::error::GatewayError;
use crate::models::{
    GatewayType, PaymentRequest, PaymentResponse, PaymentStatus, PaymentVerification,
    WebhookValidation,
};
use crate::utils::{new_reference, to_minor_units};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use secrecy::Secret;
use serde::Serialize;
use serde_json::Value;

pub const PAYSTACK_SIGNATURE_HEADER: &str = "x-paystack-signature";

#[derive(Debug, Serialize)]
struct InitializeTransaction<'a> {
    email: &'a str,
    amount: i64,
    currency: String,
    reference: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    callback_url: Option<&'a str>,
    metadata: Value,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    channels: Vec<String>,
}

#[derive(Debug, Serialize)]
struct CreateRefund<'a> {
    transaction: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    amount: Option<i64>,
}

pub struct PaystackGateway {
    http: reqwest::Client,
    api: Option<ProviderClient>,
    channels: Vec<String>,
    currencies: Vec<String>,
    webhook_secret: Secret<String>,
}

impl PaystackGateway {
    pub fn new(http: reqwest::Client) -> Self {
        Self {
            http,
            api: None,
            channels: Vec::new(),
            currencies: Vec::new(),
            webhook_secret: Secret::new(String::new()),
        }
    }

    fn api(&self) -> Result<&ProviderClient, GatewayError> {
        self.api.as_ref().ok_or(GatewayError::MissingCredentials {
            gateway: GatewayType::Paystack,
            field: "secret key",
        })
    }
}

/// Paystack envelopes carry `status: true` on success.
fn accepted(body: &Value) -> bool {
    body.get("status").and_then(Value::as_bool).unwrap_or(false)
}

fn rejection(body: &Value, fallback: &str) -> String {
    provider_message(body).unwrap_or_else(|| fallback.to_string())
}

#[async_trait]
impl PaymentGateway for PaystackGateway {
    fn gateway_type(&self) -> GatewayType {
        GatewayType::Paystack
    }

    fn initialize(&mut self, config: &GatewayConfig) -> Result<(), GatewayError> {
        if !config.credentials.has_secret_key() {
            return Err(GatewayError::MissingCredentials {
                gateway: GatewayType::Paystack,
                field: "secret key",
            });
        }
        self.api = Some(ProviderClient::new(self.http.clone(), "Paystack", config));
        self.channels = config.features.payment_options.clone();
        self.currencies = config
            .features
            .supported_currencies
            .iter()
            .map(|c| c.to_ascii_uppercase())
            .collect();
        self.webhook_secret = config.credentials.webhook_secret.clone();
        if !config.credentials.has_webhook_secret() {
            tracing::warn!("Paystack webhook secret not configured; webhooks will be rejected");
        }
        tracing::info!(environment = ?config.environment, "Paystack gateway initialized");
        Ok(())
    }

    async fn initiate(&self, request: &PaymentRequest) -> Result<PaymentResponse, GatewayError> {
        let api = self.api()?;

        if !self.supports_currency(&request.currency) {
            return Ok(unsupported_currency(GatewayType::Paystack, &request.currency));
        }
        let Some(email) = request.metadata.email.as_deref() else {
            return Ok(PaymentResponse::failed("Paystack requires a customer email"));
        };
        let Some(amount) = to_minor_units(request.amount) else {
            return Ok(PaymentResponse::failed("Amount is out of range"));
        };

        let reference = new_reference("PSK");
        let body = InitializeTransaction {
            email,
            amount,
            currency: request.currency.to_ascii_uppercase(),
            reference: &reference,
            callback_url: request.metadata.callback_url.as_deref(),
            metadata: request.provider_metadata(),
            channels: self.channels.clone(),
        };

        let response = match api.post("transaction/initialize", &body).await {
            Ok(response) => response,
            Err(failure) => {
                return Ok(PaymentResponse::failed(failure.message).with_reference(reference))
            }
        };

        if !accepted(&response) {
            return Ok(PaymentResponse::failed(rejection(
                &response,
                "Paystack declined the transaction",
            ))
            .with_reference(reference));
        }

        let Some(authorization_url) = response
            .pointer("/data/authorization_url")
            .and_then(Value::as_str)
        else {
            return Ok(PaymentResponse::failed(
                "Paystack response is missing the authorization URL",
            )
            .with_reference(reference));
        };

        tracing::info!(reference = %reference, amount_kobo = amount, "Paystack checkout created");

        let mut metadata = serde_json::Map::new();
        if let Some(code) = response.pointer("/data/access_code").and_then(Value::as_str) {
            metadata.insert("access_code".into(), code.into());
        }

        let mut payment = PaymentResponse::succeeded(PaymentStatus::Pending)
            .with_reference(reference.clone())
            .with_transaction_id(reference)
            .with_message("Redirect to Paystack to complete payment")
            .with_metadata(metadata);
        payment.redirect_url = Some(authorization_url.to_string());
        Ok(payment)
    }

    async fn verify(&self, reference: &str) -> Result<PaymentVerification, GatewayError> {
        let api = self.api()?;
        let path = format!("transaction/verify/{}", urlencoding::encode(reference));

        let response = match api.get(&path).await {
            Ok(response) => response,
            Err(failure) => return Ok(PaymentVerification::failed(reference, failure.message)),
        };
        if !accepted(&response) {
            return Ok(PaymentVerification::failed(
                reference,
                rejection(&response, "Paystack could not verify the transaction"),
            ));
        }

        let data = response.get("data").cloned().unwrap_or(Value::Null);
        let provider_status = data.get("status").and_then(Value::as_str).unwrap_or("");
        let status = match provider_status {
            "success" => PaymentStatus::Success,
            "ongoing" | "pending" | "processing" => PaymentStatus::Pending,
            _ => PaymentStatus::Failed,
        };

        let mut verification = PaymentVerification::new(reference, status);
        verification.transaction_id = data.get("id").and_then(string_from_json);
        verification.amount = data
            .get("amount")
            .and_then(decimal_from_json)
            .map(|kobo| kobo / Decimal::from(100));
        verification.currency = data
            .get("currency")
            .and_then(Value::as_str)
            .map(str::to_string);
        verification.paid_at = data
            .get("paid_at")
            .and_then(Value::as_str)
            .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
            .map(|t| t.with_timezone(&Utc));
        verification.message = data
            .get("gateway_response")
            .and_then(Value::as_str)
            .map(str::to_string)
            .or_else(|| provider_message(&response));
        if status == PaymentStatus::Failed {
            verification.error = verification.message.clone();
        }
        verification
            .metadata
            .insert("provider_status".into(), provider_status.into());
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

        let event: Value = serde_json::from_slice(payload).unwrap_or(Value::Null);
        let status = match event.get("event").and_then(Value::as_str) {
            Some("charge.success") => PaymentStatus::Success,
            Some("charge.failed") => PaymentStatus::Failed,
            _ => event
                .pointer("/data/status")
                .and_then(Value::as_str)
                .map(status_from_provider)
                .unwrap_or(PaymentStatus::Pending),
        };

        Ok(WebhookValidation {
            is_valid: true,
            transaction_id: event.pointer("/data/id").and_then(string_from_json),
            reference: event
                .pointer("/data/reference")
                .and_then(Value::as_str)
                .map(str::to_string),
            status,
        })
    }

    async fn refund(
        &self,
        transaction_id: &str,
        amount: Option<Decimal>,
    ) -> Result<PaymentResponse, GatewayError> {
        let api = self.api()?;
        let amount = match amount {
            Some(major) => match to_minor_units(major) {
                Some(minor) => Some(minor),
                None => return Ok(PaymentResponse::failed("Amount is out of range")),
            },
            None => None,
        };

        let body = CreateRefund {
            transaction: transaction_id,
            amount,
        };
        let response = match api.post("refund", &body).await {
            Ok(response) => response,
            Err(failure) => return Ok(PaymentResponse::failed(failure.message)),
        };
        if !accepted(&response) {
            return Ok(PaymentResponse::failed(rejection(
                &response,
                "Paystack declined the refund",
            )));
        }

        tracing::info!(transaction_id = %transaction_id, "Paystack refund accepted");

        let mut refund = PaymentResponse::succeeded(PaymentStatus::Refunded)
            .with_transaction_id(transaction_id)
            .with_message(
                provider_message(&response).unwrap_or_else(|| "Refund has been queued".into()),
            );
        if let Some(kobo) = response.pointer("/data/amount").and_then(decimal_from_json) {
            let major = (kobo / Decimal::from(100)).normalize();
            refund
                .metadata
                .insert("refunded_amount".into(), major.to_string().into());
        }
        Ok(refund)
    }

    fn supported_currencies(&self) -> Vec<String> {
        self.currencies.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::PaymentMetadata;
    use rust_decimal_macros::dec;
    use serde_json::json;
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn gateway_for(server: &MockServer) -> PaystackGateway {
        let config = GatewayConfig::enabled()
            .with_credentials("pk_test", "sk_test_abc", "whsec_paystack")
            .with_base_url(&server.uri());
        let mut gateway = PaystackGateway::new(reqwest::Client::new());
        gateway.initialize(&config).unwrap();
        gateway
    }

    fn request(amount: Decimal) -> PaymentRequest {
        PaymentRequest {
            user_id: "user-1".into(),
            amount,
            currency: "NGN".into(),
            gateway: GatewayType::Paystack,
            purpose: "registration".into(),
            package_id: None,
            metadata: PaymentMetadata {
                email: Some("payer@example.com".into()),
                callback_url: Some("http://localhost:3003/webhooks/paystack/callback".into()),
                ..Default::default()
            },
        }
    }

    #[test]
    fn initialize_requires_secret_key() {
        let mut gateway = PaystackGateway::new(reqwest::Client::new());
        let err = gateway.initialize(&GatewayConfig::enabled()).unwrap_err();
        assert!(err.is_configuration());
    }

    #[tokio::test]
    async fn initiate_returns_pending_with_authorization_url() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/transaction/initialize"))
            .and(header("authorization", "Bearer sk_test_abc"))
            .and(body_partial_json(json!({ "amount": 500000, "currency": "NGN" })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "status": true,
                "message": "Authorization URL created",
                "data": {
                    "authorization_url": "https://checkout.paystack.com/abc",
                    "access_code": "abc",
                    "reference": "ignored"
                }
            })))
            .mount(&server)
            .await;

        let response = gateway_for(&server).initiate(&request(dec!(5000))).await.unwrap();
        assert!(response.success);
        assert_eq!(response.status, PaymentStatus::Pending);
        assert_eq!(
            response.redirect_url.as_deref(),
            Some("https://checkout.paystack.com/abc")
        );
        assert!(response.reference.unwrap().starts_with("PSK_"));
    }

    #[tokio::test]
    async fn provider_rejection_keeps_its_message() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/transaction/initialize"))
            .respond_with(ResponseTemplate::new(401).set_body_json(json!({
                "status": false,
                "message": "Invalid key"
            })))
            .mount(&server)
            .await;

        let response = gateway_for(&server).initiate(&request(dec!(100))).await.unwrap();
        assert!(!response.success);
        assert_eq!(response.status, PaymentStatus::Failed);
        assert_eq!(response.error.as_deref(), Some("Invalid key"));
    }

    #[tokio::test]
    async fn verify_converts_kobo_back_to_major_units() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/transaction/verify/PSK_1_abcdef12"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "status": true,
                "message": "Verification successful",
                "data": {
                    "id": 4099260516u64,
                    "status": "success",
                    "amount": 500000,
                    "currency": "NGN",
                    "paid_at": "2024-08-22T09:15:02.000Z",
                    "gateway_response": "Successful"
                }
            })))
            .mount(&server)
            .await;

        let verification = gateway_for(&server).verify("PSK_1_abcdef12").await.unwrap();
        assert!(verification.success);
        assert_eq!(verification.amount, Some(dec!(5000)));
        assert_eq!(verification.transaction_id.as_deref(), Some("4099260516"));
        assert!(verification.paid_at.is_some());
    }

    #[tokio::test]
    async fn unrecognised_verify_status_is_failed() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/transaction/verify/PSK_2_abcdef12"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "status": true,
                "message": "Verification successful",
                "data": { "id": 1, "status": "blocked", "amount": 500000, "currency": "NGN" }
            })))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/transaction/verify/PSK_3_abcdef12"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "status": true,
                "message": "Verification successful",
                "data": { "id": 2, "status": "ongoing", "amount": 500000, "currency": "NGN" }
            })))
            .mount(&server)
            .await;

        let gateway = gateway_for(&server);
        let blocked = gateway.verify("PSK_2_abcdef12").await.unwrap();
        assert_eq!(blocked.status, PaymentStatus::Failed);
        assert!(!blocked.success);
        assert_eq!(blocked.metadata["provider_status"], "blocked");

        let ongoing = gateway.verify("PSK_3_abcdef12").await.unwrap();
        assert_eq!(ongoing.status, PaymentStatus::Pending);
    }

    #[tokio::test]
    async fn tampered_webhook_is_invalid() {
        let server = MockServer::start().await;
        let gateway = gateway_for(&server);
        let body = br#"{"event":"charge.success","data":{"id":1,"reference":"PSK_1","status":"success"}}"#;
        let signature = service_core::utils::sign_payload("whsec_paystack", body).unwrap();

        let valid = gateway.validate_webhook(body, &signature).await.unwrap();
        assert!(valid.is_valid);
        assert_eq!(valid.status, PaymentStatus::Success);
        assert_eq!(valid.reference.as_deref(), Some("PSK_1"));

        let mut tampered = body.to_vec();
        let last = tampered.len() - 3;
        tampered[last] ^= 0x01;
        let invalid = gateway.validate_webhook(&tampered, &signature).await.unwrap();
        assert!(!invalid.is_valid);
    }
}
