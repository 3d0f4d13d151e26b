use crate::models::GatewayType;
use anyhow::{anyhow, Context, Result};
use dotenvy::dotenv;
use secrecy::{ExposeSecret, Secret};
use std::env;
use std::str::FromStr;

#[derive(Clone, Debug)]
pub struct Config {
    pub server: ServerConfig,
    pub storage: StorageConfig,
    pub gateways: GatewaysConfig,
    pub redirect: RedirectConfig,
    pub admin: AdminConfig,
    pub observability: ObservabilityConfig,
    pub service_name: String,
}

#[derive(Clone, Debug)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum StorageBackend {
    MongoDb,
    Memory,
}

#[derive(Clone, Debug)]
pub struct StorageConfig {
    pub backend: StorageBackend,
    pub database: Option<DatabaseConfig>,
}

#[derive(Clone, Debug)]
pub struct DatabaseConfig {
    pub url: Secret<String>,
    pub db_name: String,
}

/// Where the payer lands after an external checkout.
#[derive(Clone, Debug)]
pub struct RedirectConfig {
    /// Front-end origin hosting `/payment/success|failed|cancelled`.
    pub frontend_url: String,
    /// Public origin of this service, used to build provider callback URLs.
    pub callback_base_url: String,
}

#[derive(Clone, Debug)]
pub struct AdminConfig {
    pub internal_api_key: Secret<String>,
}

#[derive(Clone, Debug)]
pub struct ObservabilityConfig {
    pub log_level: String,
    pub otlp_endpoint: Option<String>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum GatewayEnvironment {
    Test,
    Live,
}

impl FromStr for GatewayEnvironment {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "test" | "sandbox" => Ok(Self::Test),
            "live" | "production" => Ok(Self::Live),
            other => Err(anyhow!("Unknown payment environment '{}'", other)),
        }
    }
}

#[derive(Clone, Debug)]
pub struct GatewayCredentials {
    pub public_key: String,
    pub secret_key: Secret<String>,
    pub webhook_secret: Secret<String>,
}

impl GatewayCredentials {
    pub fn empty() -> Self {
        Self {
            public_key: String::new(),
            secret_key: Secret::new(String::new()),
            webhook_secret: Secret::new(String::new()),
        }
    }

    pub fn has_secret_key(&self) -> bool {
        !self.secret_key.expose_secret().is_empty()
    }

    pub fn has_webhook_secret(&self) -> bool {
        !self.webhook_secret.expose_secret().is_empty()
    }
}

/// Backend-specific switches. Each backend reads only the fields it owns.
#[derive(Clone, Debug)]
pub struct GatewayFeatures {
    /// Payment instruments offered on the provider checkout (card, bank, ussd...).
    pub payment_options: Vec<String>,
    pub supported_currencies: Vec<String>,
    /// Mock only: artificial delay before answering.
    pub simulated_latency_ms: u64,
    /// Mock only: percentage (0-100) of initiations that fail.
    pub failure_rate: u8,
    /// Mock only: fixes the RNG so failure sequences are reproducible.
    pub seed: Option<u64>,
}

impl Default for GatewayFeatures {
    fn default() -> Self {
        Self {
            payment_options: Vec::new(),
            supported_currencies: vec!["NGN".to_string()],
            simulated_latency_ms: 0,
            failure_rate: 0,
            seed: None,
        }
    }
}

#[derive(Clone, Debug)]
pub struct GatewayConfig {
    pub enabled: bool,
    pub environment: GatewayEnvironment,
    pub credentials: GatewayCredentials,
    pub api_base_url: String,
    pub timeout_ms: u64,
    pub features: GatewayFeatures,
}

impl GatewayConfig {
    /// An enabled test-environment config with no credentials.
    pub fn enabled() -> Self {
        Self {
            enabled: true,
            environment: GatewayEnvironment::Test,
            credentials: GatewayCredentials::empty(),
            api_base_url: String::new(),
            timeout_ms: DEFAULT_GATEWAY_TIMEOUT_MS,
            features: GatewayFeatures::default(),
        }
    }

    pub fn disabled() -> Self {
        Self {
            enabled: false,
            ..Self::enabled()
        }
    }

    pub fn with_credentials(
        mut self,
        public_key: &str,
        secret_key: &str,
        webhook_secret: &str,
    ) -> Self {
        self.credentials = GatewayCredentials {
            public_key: public_key.to_string(),
            secret_key: Secret::new(secret_key.to_string()),
            webhook_secret: Secret::new(webhook_secret.to_string()),
        };
        self
    }

    pub fn with_base_url(mut self, url: &str) -> Self {
        self.api_base_url = url.trim_end_matches('/').to_string();
        self
    }

    pub fn with_features(mut self, features: GatewayFeatures) -> Self {
        self.features = features;
        self
    }
}

pub const DEFAULT_GATEWAY_TIMEOUT_MS: u64 = 15_000;

/// Static per-environment gateway configuration.
#[derive(Clone, Debug)]
pub struct GatewaysConfig {
    pub environment: GatewayEnvironment,
    pub default_gateway: GatewayType,
    pub wallet: GatewayConfig,
    pub mock: GatewayConfig,
    pub paystack: GatewayConfig,
    pub flutterwave: GatewayConfig,
}

impl GatewaysConfig {
    pub fn resolve(&self, gateway: GatewayType) -> &GatewayConfig {
        match gateway {
            GatewayType::Wallet => &self.wallet,
            GatewayType::Mock => &self.mock,
            GatewayType::Paystack => &self.paystack,
            GatewayType::Flutterwave => &self.flutterwave,
        }
    }

    pub fn enabled_gateways(&self) -> Vec<GatewayType> {
        GatewayType::ALL
            .into_iter()
            .filter(|g| self.resolve(*g).enabled)
            .collect()
    }

    fn from_env() -> Result<Self> {
        let environment: GatewayEnvironment =
            env_or("PAYMENT_ENVIRONMENT", "test").parse()?;
        let default_gateway: GatewayType = env_or("PAYMENT_DEFAULT_GATEWAY", "paystack")
            .parse()
            .map_err(|e: String| anyhow!(e))?;
        let timeout_ms = env_parse("GATEWAY_TIMEOUT_MS", DEFAULT_GATEWAY_TIMEOUT_MS)?;

        let wallet = GatewayConfig {
            enabled: env_bool("WALLET_ENABLED", true),
            environment,
            credentials: GatewayCredentials::empty(),
            api_base_url: String::new(),
            timeout_ms,
            features: GatewayFeatures {
                supported_currencies: vec![env_or("WALLET_CURRENCY", "NGN").to_uppercase()],
                ..GatewayFeatures::default()
            },
        };

        let failure_rate: u8 = env_parse("MOCK_FAILURE_RATE", 0)?;
        if failure_rate > 100 {
            return Err(anyhow!("MOCK_FAILURE_RATE must be between 0 and 100"));
        }
        let mock = GatewayConfig {
            enabled: env_bool(
                "MOCK_GATEWAY_ENABLED",
                environment == GatewayEnvironment::Test,
            ),
            environment,
            credentials: GatewayCredentials {
                public_key: String::new(),
                secret_key: Secret::new(String::new()),
                webhook_secret: Secret::new(env_or("MOCK_WEBHOOK_SECRET", "mock-webhook-secret")),
            },
            api_base_url: String::new(),
            timeout_ms,
            features: GatewayFeatures {
                supported_currencies: env_list("MOCK_CURRENCIES", &["NGN", "USD"]),
                simulated_latency_ms: env_parse("MOCK_LATENCY_MS", 0)?,
                failure_rate,
                seed: env::var("MOCK_SEED")
                    .ok()
                    .map(|s| s.parse().context("MOCK_SEED must be an integer"))
                    .transpose()?,
                ..GatewayFeatures::default()
            },
        };

        let paystack = redirect_gateway_from_env(
            "PAYSTACK",
            environment,
            timeout_ms,
            "https://api.paystack.co",
            "CHANNELS",
            &["card", "bank", "ussd", "bank_transfer"],
            &["NGN", "GHS", "ZAR", "USD"],
        );
        let flutterwave = redirect_gateway_from_env(
            "FLUTTERWAVE",
            environment,
            timeout_ms,
            "https://api.flutterwave.com/v3",
            "PAYMENT_OPTIONS",
            &["card", "banktransfer", "ussd"],
            &["NGN", "GHS", "KES", "USD"],
        );

        Ok(Self {
            environment,
            default_gateway,
            wallet,
            mock,
            paystack,
            flutterwave,
        })
    }
}

fn redirect_gateway_from_env(
    prefix: &str,
    environment: GatewayEnvironment,
    timeout_ms: u64,
    default_base_url: &str,
    options_var: &str,
    default_options: &[&str],
    default_currencies: &[&str],
) -> GatewayConfig {
    let var = |name: &str| format!("{}_{}", prefix, name);

    GatewayConfig {
        enabled: env_bool(&var("ENABLED"), false),
        environment,
        credentials: GatewayCredentials {
            public_key: env_or(&var("PUBLIC_KEY"), ""),
            secret_key: Secret::new(env_or(&var("SECRET_KEY"), "")),
            webhook_secret: Secret::new(env_or(&var("WEBHOOK_SECRET"), "")),
        },
        api_base_url: env_or(&var("BASE_URL"), default_base_url)
            .trim_end_matches('/')
            .to_string(),
        timeout_ms,
        features: GatewayFeatures {
            payment_options: env_list(&var(options_var), default_options),
            supported_currencies: env_list(&var("CURRENCIES"), default_currencies),
            ..GatewayFeatures::default()
        },
    }
}

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenv().ok();

        let host = env_or("PAYMENT_SERVICE_HOST", "0.0.0.0");
        let port = env_or("PAYMENT_SERVICE_PORT", "3003").parse()?;

        let backend = match env_or("PAYMENT_STORAGE", "mongodb").to_ascii_lowercase().as_str() {
            "memory" => StorageBackend::Memory,
            "mongodb" | "mongo" => StorageBackend::MongoDb,
            other => return Err(anyhow!("Unknown PAYMENT_STORAGE '{}'", other)),
        };
        let database = match backend {
            StorageBackend::MongoDb => Some(DatabaseConfig {
                url: Secret::new(
                    env::var("PAYMENT_DATABASE_URL")
                        .context("PAYMENT_DATABASE_URL must be set")?,
                ),
                db_name: env_or("PAYMENT_DATABASE_NAME", "payment_db"),
            }),
            StorageBackend::Memory => None,
        };

        Ok(Self {
            server: ServerConfig { host, port },
            storage: StorageConfig { backend, database },
            gateways: GatewaysConfig::from_env()?,
            redirect: RedirectConfig {
                frontend_url: env_or("PAYMENT_FRONTEND_URL", "http://localhost:3000")
                    .trim_end_matches('/')
                    .to_string(),
                callback_base_url: env_or("PAYMENT_CALLBACK_BASE_URL", "http://localhost:3003")
                    .trim_end_matches('/')
                    .to_string(),
            },
            admin: AdminConfig {
                internal_api_key: Secret::new(env_or(
                    "PAYMENT_INTERNAL_API_KEY",
                    "dev-internal-key",
                )),
            },
            observability: ObservabilityConfig {
                log_level: env_or("PAYMENT_LOG_LEVEL", "info,payment_gateway=debug"),
                otlp_endpoint: env::var("PAYMENT_OTLP_ENDPOINT")
                    .ok()
                    .filter(|s| !s.is_empty()),
            },
            service_name: "payment-gateway".to_string(),
        })
    }
}

fn env_or(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_string())
}

fn env_bool(key: &str, default: bool) -> bool {
    env::var(key)
        .ok()
        .and_then(|v| match v.trim().to_ascii_lowercase().as_str() {
            "1" | "true" | "yes" | "on" => Some(true),
            "0" | "false" | "no" | "off" => Some(false),
            _ => None,
        })
        .unwrap_or(default)
}

fn env_parse<T>(key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse()
            .with_context(|| format!("{} has an invalid value '{}'", key, raw)),
        Err(_) => Ok(default),
    }
}

fn env_list(key: &str, default: &[&str]) -> Vec<String> {
    match env::var(key) {
        Ok(raw) => raw
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect(),
        Err(_) => default.iter().map(|s| s.to_string()).collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn environment_parses_aliases() {
        assert_eq!(
            "sandbox".parse::<GatewayEnvironment>().unwrap(),
            GatewayEnvironment::Test
        );
        assert_eq!(
            "LIVE".parse::<GatewayEnvironment>().unwrap(),
            GatewayEnvironment::Live
        );
        assert!("staging".parse::<GatewayEnvironment>().is_err());
    }

    #[test]
    fn builder_helpers_set_credentials_and_trim_base_url() {
        let cfg = GatewayConfig::enabled()
            .with_credentials("pk_test", "sk_test", "whsec")
            .with_base_url("https://api.example.com/");
        assert!(cfg.enabled);
        assert!(cfg.credentials.has_secret_key());
        assert!(cfg.credentials.has_webhook_secret());
        assert_eq!(cfg.api_base_url, "https://api.example.com");
        assert!(!GatewayConfig::disabled().enabled);
    }
}
