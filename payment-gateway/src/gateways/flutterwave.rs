//! Flutterwave Standard (hosted checkout).
//!
//! Flutterwave takes and reports amounts in major units.

use super::http::{decimal_from_json, provider_message, string_from_json, ProviderClient};
use super::{signature_matches, status_from_provider, unsupported_currency, PaymentGateway};
use crate::config::GatewayConfig;
use crate::error::GatewayError;
use crate::models::{
    GatewayType, PaymentRequest, PaymentResponse, PaymentStatus, PaymentVerification,
    WebhookValidation,
};
use crate::utils::new_reference;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use secrecy::Secret;
use serde::Serialize;
use serde_json::{json, Value};

pub const FLUTTERWAVE_SIGNATURE_HEADER: &str = "flutterwave-signature";

#[derive(Debug, Serialize)]
struct Customer<'a> {
    email: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    name: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    phonenumber: Option<&'a str>,
}

#[derive(Debug, Serialize)]
struct StandardPayment<'a> {
    tx_ref: &'a str,
    #[serde(with = "rust_decimal::serde::float")]
    amount: Decimal,
    currency: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    redirect_url: Option<&'a str>,
    customer: Customer<'a>,
    meta: Value,
    #[serde(skip_serializing_if = "String::is_empty")]
    payment_options: String,
    customizations: Value,
}

#[derive(Debug, Serialize)]
struct CreateRefund {
    #[serde(
        with = "rust_decimal::serde::float_option",
        skip_serializing_if = "Option::is_none"
    )]
    amount: Option<Decimal>,
}

pub struct FlutterwaveGateway {
    http: reqwest::Client,
    api: Option<ProviderClient>,
    payment_options: Vec<String>,
    currencies: Vec<String>,
    webhook_secret: Secret<String>,
}

impl FlutterwaveGateway {
    pub fn new(http: reqwest::Client) -> Self {
        Self {
            http,
            api: None,
            payment_options: Vec::new(),
            currencies: Vec::new(),
            webhook_secret: Secret::new(String::new()),
        }
    }

    fn api(&self) -> Result<&ProviderClient, GatewayError> {
        self.api.as_ref().ok_or(GatewayError::MissingCredentials {
            gateway: GatewayType::Flutterwave,
            field: "secret key",
        })
    }
}

/// Flutterwave envelopes carry `status: "success"` when the call was accepted.
fn accepted(body: &Value) -> bool {
    body.get("status").and_then(Value::as_str) == Some("success")
}

#[async_trait]
impl PaymentGateway for FlutterwaveGateway {
    fn gateway_type(&self) -> GatewayType {
        GatewayType::Flutterwave
    }

    fn initialize(&mut self, config: &GatewayConfig) -> Result<(), GatewayError> {
        if !config.credentials.has_secret_key() {
            return Err(GatewayError::MissingCredentials {
                gateway: GatewayType::Flutterwave,
                field: "secret key",
            });
        }
        self.api = Some(ProviderClient::new(self.http.clone(), "Flutterwave", config));
        self.payment_options = config.features.payment_options.clone();
        self.currencies = config
            .features
            .supported_currencies
            .iter()
            .map(|c| c.to_ascii_uppercase())
            .collect();
        self.webhook_secret = config.credentials.webhook_secret.clone();
        if !config.credentials.has_webhook_secret() {
            tracing::warn!("Flutterwave webhook secret not configured; webhooks will be rejected");
        }
        tracing::info!(environment = ?config.environment, "Flutterwave gateway initialized");
        Ok(())
    }

    async fn initiate(&self, request: &PaymentRequest) -> Result<PaymentResponse, GatewayError> {
        let api = self.api()?;

        if !self.supports_currency(&request.currency) {
            return Ok(unsupported_currency(GatewayType::Flutterwave, &request.currency));
        }
        let Some(email) = request.metadata.email.as_deref() else {
            return Ok(PaymentResponse::failed("Flutterwave requires a customer email"));
        };

        let tx_ref = new_reference("FLW");
        let body = StandardPayment {
            tx_ref: &tx_ref,
            amount: request.amount,
            currency: request.currency.to_ascii_uppercase(),
            redirect_url: request.metadata.callback_url.as_deref(),
            customer: Customer {
                email,
                name: request.metadata.name.as_deref(),
                phonenumber: request.metadata.phone.as_deref(),
            },
            meta: request.provider_metadata(),
            payment_options: self.payment_options.join(","),
            customizations: json!({ "title": "Payment", "description": request.description() }),
        };

        let response = match api.post("payments", &body).await {
            Ok(response) => response,
            Err(failure) => {
                return Ok(PaymentResponse::failed(failure.message).with_reference(tx_ref))
            }
        };

        if !accepted(&response) {
            let message = provider_message(&response)
                .unwrap_or_else(|| "Flutterwave declined the payment".to_string());
            return Ok(PaymentResponse::failed(message).with_reference(tx_ref));
        }

        let Some(link) = response.pointer("/data/link").and_then(Value::as_str) else {
            return Ok(
                PaymentResponse::failed("Flutterwave response is missing the checkout link")
                    .with_reference(tx_ref),
            );
        };

        tracing::info!(tx_ref = %tx_ref, amount = %request.amount, "Flutterwave checkout created");

        let mut payment = PaymentResponse::succeeded(PaymentStatus::Pending)
            .with_reference(tx_ref.clone())
            .with_transaction_id(tx_ref)
            .with_message("Redirect to Flutterwave to complete payment");
        payment.redirect_url = Some(link.to_string());
        Ok(payment)
    }

    async fn verify(&self, reference: &str) -> Result<PaymentVerification, GatewayError> {
        let api = self.api()?;
        let path = format!(
            "transactions/verify_by_reference?tx_ref={}",
            urlencoding::encode(reference)
        );

        let response = match api.get(&path).await {
            Ok(response) => response,
            Err(failure) => return Ok(PaymentVerification::failed(reference, failure.message)),
        };
        if !accepted(&response) {
            let message = provider_message(&response)
                .unwrap_or_else(|| "Flutterwave could not verify the transaction".to_string());
            return Ok(PaymentVerification::failed(reference, message));
        }

        let data = response.get("data").cloned().unwrap_or(Value::Null);
        let provider_status = data.get("status").and_then(Value::as_str).unwrap_or("");
        let status = match provider_status {
            "successful" => PaymentStatus::Success,
            "pending" => PaymentStatus::Pending,
            _ => PaymentStatus::Failed,
        };

        let mut verification = PaymentVerification::new(reference, status);
        verification.transaction_id = data.get("id").and_then(string_from_json);
        verification.amount = data.get("amount").and_then(decimal_from_json);
        verification.currency = data
            .get("currency")
            .and_then(Value::as_str)
            .map(str::to_string);
        verification.paid_at = data
            .get("created_at")
            .and_then(Value::as_str)
            .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
            .map(|t| t.with_timezone(&Utc));
        verification.message = data
            .get("processor_response")
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
        let status = event
            .pointer("/data/status")
            .and_then(Value::as_str)
            .map(status_from_provider)
            .unwrap_or(PaymentStatus::Pending);

        Ok(WebhookValidation {
            is_valid: true,
            transaction_id: event.pointer("/data/id").and_then(string_from_json),
            reference: event
                .pointer("/data/tx_ref")
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
        let body = CreateRefund { amount };
        let path = format!("transactions/{}/refund", urlencoding::encode(transaction_id));

        let response = match api.post(&path, &body).await {
            Ok(response) => response,
            Err(failure) => return Ok(PaymentResponse::failed(failure.message)),
        };
        if !accepted(&response) {
            let message = provider_message(&response)
                .unwrap_or_else(|| "Flutterwave declined the refund".to_string());
            return Ok(PaymentResponse::failed(message));
        }

        tracing::info!(transaction_id = %transaction_id, "Flutterwave refund accepted");

        let mut refund = PaymentResponse::succeeded(PaymentStatus::Refunded)
            .with_transaction_id(transaction_id)
            .with_message(
                provider_message(&response).unwrap_or_else(|| "Refund has been queued".into()),
            );
        if let Some(refunded) = response
            .pointer("/data/amount_refunded")
            .and_then(decimal_from_json)
        {
            refund
                .metadata
                .insert("refunded_amount".into(), refunded.to_string().into());
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
    use wiremock::matchers::{header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn gateway_for(server: &MockServer) -> FlutterwaveGateway {
        let config = GatewayConfig::enabled()
            .with_credentials("FLWPUBK_TEST", "FLWSECK_TEST", "whsec_flw")
            .with_base_url(&server.uri());
        let mut gateway = FlutterwaveGateway::new(reqwest::Client::new());
        gateway.initialize(&config).unwrap();
        gateway
    }

    fn request() -> PaymentRequest {
        PaymentRequest {
            user_id: "user-1".into(),
            amount: dec!(2500),
            currency: "NGN".into(),
            gateway: GatewayType::Flutterwave,
            purpose: "registration".into(),
            package_id: Some("gold".into()),
            metadata: PaymentMetadata {
                email: Some("payer@example.com".into()),
                name: Some("Ada Obi".into()),
                ..Default::default()
            },
        }
    }

    #[tokio::test]
    async fn initiate_returns_pending_with_checkout_link() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/payments"))
            .and(header("authorization", "Bearer FLWSECK_TEST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "status": "success",
                "message": "Hosted Link",
                "data": { "link": "https://checkout.flutterwave.com/v3/hosted/pay/abc" }
            })))
            .mount(&server)
            .await;

        let response = gateway_for(&server).initiate(&request()).await.unwrap();
        assert!(response.success);
        assert_eq!(response.status, PaymentStatus::Pending);
        assert_eq!(
            response.redirect_url.as_deref(),
            Some("https://checkout.flutterwave.com/v3/hosted/pay/abc")
        );
        assert!(response.reference.unwrap().starts_with("FLW_"));
    }

    #[tokio::test]
    async fn server_error_maps_to_failed() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/payments"))
            .respond_with(ResponseTemplate::new(500).set_body_string("upstream exploded"))
            .mount(&server)
            .await;

        let response = gateway_for(&server).initiate(&request()).await.unwrap();
        assert_eq!(response.status, PaymentStatus::Failed);
        assert!(response.error.unwrap().contains("HTTP 500"));
    }

    #[tokio::test]
    async fn verify_by_reference_maps_successful() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/transactions/verify_by_reference"))
            .and(query_param("tx_ref", "FLW_1_abcdef12"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "status": "success",
                "message": "Transaction fetched successfully",
                "data": {
                    "id": 288200108,
                    "tx_ref": "FLW_1_abcdef12",
                    "status": "successful",
                    "amount": 2500,
                    "currency": "NGN",
                    "created_at": "2024-08-22T09:15:02.000Z"
                }
            })))
            .mount(&server)
            .await;

        let verification = gateway_for(&server).verify("FLW_1_abcdef12").await.unwrap();
        assert!(verification.success);
        assert_eq!(verification.amount, Some(dec!(2500)));
        assert_eq!(verification.transaction_id.as_deref(), Some("288200108"));
    }

    #[tokio::test]
    async fn unrecognised_verify_status_is_failed() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/transactions/verify_by_reference"))
            .and(query_param("tx_ref", "FLW_2_abcdef12"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "status": "success",
                "message": "Transaction fetched successfully",
                "data": { "id": 1, "tx_ref": "FLW_2_abcdef12", "status": "voided", "amount": 2500 }
            })))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/transactions/verify_by_reference"))
            .and(query_param("tx_ref", "FLW_3_abcdef12"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "status": "success",
                "message": "Transaction fetched successfully",
                "data": { "id": 2, "tx_ref": "FLW_3_abcdef12", "status": "pending", "amount": 2500 }
            })))
            .mount(&server)
            .await;

        let gateway = gateway_for(&server);
        let voided = gateway.verify("FLW_2_abcdef12").await.unwrap();
        assert_eq!(voided.status, PaymentStatus::Failed);
        assert!(!voided.success);

        let pending = gateway.verify("FLW_3_abcdef12").await.unwrap();
        assert_eq!(pending.status, PaymentStatus::Pending);
    }

    #[tokio::test]
    async fn webhook_requires_matching_signature() {
        let server = MockServer::start().await;
        let gateway = gateway_for(&server);
        let body = br#"{"event":"charge.completed","data":{"id":1,"tx_ref":"FLW_1","status":"successful"}}"#;
        let signature = service_core::utils::sign_payload("whsec_flw", body).unwrap();

        let valid = gateway.validate_webhook(body, &signature).await.unwrap();
        assert!(valid.is_valid);
        assert_eq!(valid.status, PaymentStatus::Success);
        assert_eq!(valid.reference.as_deref(), Some("FLW_1"));

        let wrong = service_core::utils::sign_payload("other-secret", body).unwrap();
        assert!(!gateway.validate_webhook(body, &wrong).await.unwrap().is_valid);
    }
}
