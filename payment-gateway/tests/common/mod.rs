#![allow(dead_code)]

use payment_gateway::config::{
    AdminConfig, Config, GatewayConfig, GatewayEnvironment, GatewayFeatures, GatewaysConfig,
    ObservabilityConfig, RedirectConfig, ServerConfig, StorageBackend, StorageConfig,
};
use payment_gateway::models::GatewayType;
use payment_gateway::services::Storage;
use payment_gateway::startup::Application;
use rust_decimal::Decimal;
use secrecy::Secret;
use serde_json::json;

pub const TEST_USER_ID: &str = "test-user";
pub const INTERNAL_API_KEY: &str = "test-internal-key";
pub const MOCK_WEBHOOK_SECRET: &str = "mock-webhook-secret";
pub const PAYSTACK_WEBHOOK_SECRET: &str = "whsec_paystack";
pub const FRONTEND_URL: &str = "http://frontend.test";

pub struct TestApp {
    pub address: String,
    pub port: u16,
    pub client: reqwest::Client,
}

/// Wallet and a deterministic mock enabled; redirect providers off.
pub fn default_gateways() -> GatewaysConfig {
    GatewaysConfig {
        environment: GatewayEnvironment::Test,
        default_gateway: GatewayType::Mock,
        wallet: GatewayConfig::enabled(),
        mock: GatewayConfig::enabled()
            .with_credentials("", "", MOCK_WEBHOOK_SECRET)
            .with_features(GatewayFeatures {
                seed: Some(7),
                ..GatewayFeatures::default()
            }),
        paystack: GatewayConfig::disabled(),
        flutterwave: GatewayConfig::disabled(),
    }
}

/// Paystack pointed at a stub server, on top of the defaults.
pub fn gateways_with_paystack(base_url: &str) -> GatewaysConfig {
    GatewaysConfig {
        default_gateway: GatewayType::Paystack,
        paystack: GatewayConfig::enabled()
            .with_credentials("pk_test", "sk_test", PAYSTACK_WEBHOOK_SECRET)
            .with_base_url(base_url),
        ..default_gateways()
    }
}

pub fn gateways_with_flutterwave(base_url: &str) -> GatewaysConfig {
    GatewaysConfig {
        default_gateway: GatewayType::Flutterwave,
        flutterwave: GatewayConfig::enabled()
            .with_credentials("FLWPUBK_TEST", "FLWSECK_TEST", "flw-hash")
            .with_base_url(base_url),
        ..default_gateways()
    }
}

pub fn test_config(gateways: GatewaysConfig) -> Config {
    Config {
        server: ServerConfig {
            host: "127.0.0.1".to_string(),
            port: 0, // Random port
        },
        storage: StorageConfig {
            backend: StorageBackend::Memory,
            database: None,
        },
        gateways,
        redirect: RedirectConfig {
            frontend_url: FRONTEND_URL.to_string(),
            callback_base_url: "http://payments.test".to_string(),
        },
        admin: AdminConfig {
            internal_api_key: Secret::new(INTERNAL_API_KEY.to_string()),
        },
        observability: ObservabilityConfig {
            log_level: "info".to_string(),
            otlp_endpoint: None,
        },
        service_name: "payment-gateway-test".to_string(),
    }
}

impl TestApp {
    pub async fn spawn() -> Self {
        Self::spawn_with(default_gateways()).await
    }

    pub async fn spawn_with(gateways: GatewaysConfig) -> Self {
        let config = test_config(gateways);

        let app = Application::build_with_storage(config, Storage::in_memory())
            .await
            .expect("Failed to build test application");

        let port = app.port();
        let address = format!("http://127.0.0.1:{}", port);

        tokio::spawn(async move {
            app.run_until_stopped().await.ok();
        });

        let client = reqwest::Client::builder()
            .redirect(reqwest::redirect::Policy::none())
            .build()
            .expect("Failed to build client");

        // Wait for the server to be ready by polling the health endpoint
        let health_url = format!("{}/health", address);
        for _ in 0..50 {
            if client.get(&health_url).send().await.is_ok() {
                break;
            }
            tokio::time::sleep(tokio::time::Duration::from_millis(50)).await;
        }

        TestApp {
            address,
            port,
            client,
        }
    }

    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.address, path)
    }

    /// Request builder with the caller identity header set.
    pub fn as_user(&self, method: reqwest::Method, path: &str) -> reqwest::RequestBuilder {
        self.client
            .request(method, self.url(path))
            .header("X-User-ID", TEST_USER_ID)
    }

    pub fn as_admin(&self, method: reqwest::Method, path: &str) -> reqwest::RequestBuilder {
        self.client
            .request(method, self.url(path))
            .header("X-Internal-Api-Key", INTERNAL_API_KEY)
    }

    pub async fn credit_wallet(&self, user_id: &str, amount: Decimal) -> serde_json::Value {
        let response = self
            .as_admin(reqwest::Method::POST, "/admin/wallets/credit")
            .json(&json!({ "user_id": user_id, "amount": amount }))
            .send()
            .await
            .expect("Failed to execute request");
        assert_eq!(response.status().as_u16(), 200);
        response.json().await.expect("Failed to parse JSON")
    }

    pub async fn pay(&self, body: serde_json::Value) -> (u16, serde_json::Value) {
        let response = self
            .as_user(reqwest::Method::POST, "/payments")
            .json(&body)
            .send()
            .await
            .expect("Failed to execute request");
        let status = response.status().as_u16();
        (status, response.json().await.expect("Failed to parse JSON"))
    }
}
