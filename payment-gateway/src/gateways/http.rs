//! Outbound HTTP plumbing shared by the redirect providers.
//!
//! Every provider call ends in either a parsed JSON body or a
//! [`ProviderFailure`] carrying the provider's own message. Callers turn
//! failures into `Failed` responses; nothing here returns a `GatewayError`.

use crate::config::GatewayConfig;
use rust_decimal::Decimal;
use secrecy::{ExposeSecret, Secret};
use serde::Serialize;
use serde_json::Value;
use std::str::FromStr;
use std::time::Duration;

#[derive(Debug, Clone, PartialEq)]
pub struct ProviderFailure {
    pub message: String,
    pub http_status: Option<u16>,
}

impl ProviderFailure {
    fn new(message: impl Into<String>, http_status: Option<u16>) -> Self {
        Self {
            message: message.into(),
            http_status,
        }
    }
}

/// Bearer-authenticated JSON client bound to one provider.
#[derive(Clone)]
pub struct ProviderClient {
    client: reqwest::Client,
    provider: &'static str,
    base_url: String,
    secret_key: Secret<String>,
    timeout: Duration,
}

impl ProviderClient {
    pub fn new(client: reqwest::Client, provider: &'static str, config: &GatewayConfig) -> Self {
        Self {
            client,
            provider,
            base_url: config.api_base_url.trim_end_matches('/').to_string(),
            secret_key: config.credentials.secret_key.clone(),
            timeout: Duration::from_millis(config.timeout_ms),
        }
    }

    pub fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }

    pub async fn get(&self, path: &str) -> Result<Value, ProviderFailure> {
        self.send(self.client.get(self.url(path))).await
    }

    pub async fn post<B: Serialize + ?Sized>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<Value, ProviderFailure> {
        self.send(self.client.post(self.url(path)).json(body)).await
    }

    async fn send(&self, request: reqwest::RequestBuilder) -> Result<Value, ProviderFailure> {
        let response = request
            .bearer_auth(self.secret_key.expose_secret())
            .timeout(self.timeout)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    tracing::warn!(provider = self.provider, "Provider request timed out");
                    ProviderFailure::new(format!("{} request timed out", self.provider), None)
                } else {
                    tracing::warn!(provider = self.provider, error = %e, "Provider request failed");
                    ProviderFailure::new(format!("{} is unreachable: {}", self.provider, e), None)
                }
            })?;

        let status = response.status();
        let body = response.text().await.map_err(|e| {
            ProviderFailure::new(
                format!("Failed to read {} response: {}", self.provider, e),
                Some(status.as_u16()),
            )
        })?;

        tracing::debug!(provider = self.provider, status = %status, "Provider response received");

        let parsed = serde_json::from_str::<Value>(&body);

        if !status.is_success() {
            let message = parsed
                .ok()
                .as_ref()
                .and_then(provider_message)
                .unwrap_or_else(|| {
                    let snippet: String = body.chars().take(200).collect();
                    format!("{} returned HTTP {}: {}", self.provider, status.as_u16(), snippet)
                });
            tracing::warn!(
                provider = self.provider,
                status = status.as_u16(),
                message = %message,
                "Provider rejected request"
            );
            return Err(ProviderFailure::new(message, Some(status.as_u16())));
        }

        parsed.map_err(|e| {
            tracing::warn!(provider = self.provider, error = %e, "Malformed provider response");
            ProviderFailure::new(
                format!("Malformed {} response: {}", self.provider, e),
                Some(status.as_u16()),
            )
        })
    }
}

/// The `message` field providers put on both success and error envelopes.
pub fn provider_message(body: &Value) -> Option<String> {
    body.get("message")
        .and_then(Value::as_str)
        .filter(|m| !m.is_empty())
        .map(str::to_string)
}

/// Reads a JSON number or numeric string without going through `f64`.
pub fn decimal_from_json(value: &Value) -> Option<Decimal> {
    match value {
        Value::Number(n) => Decimal::from_str(&n.to_string())
            .or_else(|_| Decimal::from_scientific(&n.to_string()))
            .ok(),
        Value::String(s) => Decimal::from_str(s.trim()).ok(),
        _ => None,
    }
}

/// A JSON string or number rendered as a string (provider ids come as either).
pub fn string_from_json(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}
