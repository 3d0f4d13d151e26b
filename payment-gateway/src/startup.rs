//! Application startup and lifecycle management.

use crate::config::{Config, StorageBackend};
use crate::gateways::GatewayFactory;
use crate::handlers::{self, admin, bank_transfer, payments, transactions, webhooks};
use crate::middleware::require_internal_api_key;
use crate::services::{PaymentProcessor, PaymentRepository, Storage};
use axum::middleware::{from_fn, from_fn_with_state};
use axum::{
    routing::{delete, get, post},
    Router,
};
use mongodb::{options::ClientOptions, Client};
use secrecy::ExposeSecret;
use service_core::error::AppError;
use service_core::middleware::{
    metrics::metrics_middleware,
    tracing::{request_id_middleware, REQUEST_ID_HEADER},
};
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub config: Config,
    pub processor: Arc<PaymentProcessor>,
    pub factory: Arc<GatewayFactory>,
}

/// Application container for managing server lifecycle.
pub struct Application {
    port: u16,
    listener: TcpListener,
    state: AppState,
}

impl Application {
    /// Build the application, connecting to the configured storage backend.
    pub async fn build(config: Config) -> Result<Self, AppError> {
        let storage = match config.storage.backend {
            StorageBackend::Memory => {
                tracing::warn!("Using in-memory storage; balances are lost on restart");
                Storage::in_memory()
            }
            StorageBackend::MongoDb => connect_mongo(&config).await?,
        };
        Self::build_with_storage(config, storage).await
    }

    /// Build the application on an already constructed storage backend.
    pub async fn build_with_storage(config: Config, storage: Storage) -> Result<Self, AppError> {
        let http = reqwest::Client::builder()
            .user_agent(concat!("payment-gateway/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| {
                tracing::error!("Failed to build HTTP client: {}", e);
                AppError::InternalError(e.into())
            })?;

        let factory = Arc::new(GatewayFactory::new(storage.wallet.clone(), http));
        let processor = Arc::new(PaymentProcessor::new(
            config.gateways.clone(),
            factory.clone(),
            storage,
        ));

        let enabled = config.gateways.enabled_gateways();
        if enabled.is_empty() {
            tracing::warn!("No payment gateways enabled - payment features are unavailable");
        } else {
            tracing::info!(
                environment = ?config.gateways.environment,
                default_gateway = %config.gateways.default_gateway,
                enabled = ?enabled,
                "Payment gateways configured"
            );
        }

        let state = AppState {
            config: config.clone(),
            processor,
            factory,
        };

        // Port 0 binds a random port for tests.
        let addr = format!("{}:{}", config.server.host, config.server.port);
        let listener = TcpListener::bind(&addr).await.map_err(|e| {
            tracing::error!("Failed to bind HTTP listener to {}: {}", addr, e);
            AppError::from(e)
        })?;
        let port = listener.local_addr()?.port();

        tracing::info!("Payment gateway: HTTP on port {}", port);

        Ok(Self {
            port,
            listener,
            state,
        })
    }

    /// Get the port the server is listening on.
    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn state(&self) -> AppState {
        self.state.clone()
    }

    pub async fn run_until_stopped(self) -> std::io::Result<()> {
        let router = build_router(self.state);
        axum::serve(self.listener, router).await
    }
}

async fn connect_mongo(config: &Config) -> Result<Storage, AppError> {
    let database = config.storage.database.as_ref().ok_or_else(|| {
        AppError::ConfigError(anyhow::anyhow!(
            "MongoDB storage selected without a database configuration"
        ))
    })?;

    let mut client_options = ClientOptions::parse(database.url.expose_secret())
        .await
        .map_err(|e| {
            tracing::error!("Failed to parse MongoDB connection string: {}", e);
            AppError::DatabaseError(e.into())
        })?;
    client_options.app_name = Some(config.service_name.clone());

    let client = Client::with_options(client_options).map_err(|e| {
        tracing::error!("Failed to create MongoDB client: {}", e);
        AppError::DatabaseError(e.into())
    })?;
    let db = client.database(&database.db_name);

    let repository = PaymentRepository::new(&client, &db);
    repository.init_indexes().await.map_err(|e| {
        tracing::error!("Failed to initialize database indexes: {}", e);
        AppError::DatabaseError(e)
    })?;

    Ok(Storage::from(Arc::new(repository)))
}

/// Every HTTP route, with request-id, metrics and trace layers applied.
pub fn build_router(state: AppState) -> Router {
    let admin_routes = Router::new()
        .route("/admin/payments/refund", post(admin::refund_payment))
        .route(
            "/admin/payments/:reference/attempts",
            get(admin::list_attempts),
        )
        .route(
            "/admin/pending-payments/:id/approve",
            post(admin::approve_pending_payment),
        )
        .route(
            "/admin/pending-payments/:id/reject",
            post(admin::reject_pending_payment),
        )
        .route("/admin/gateways/cache", delete(admin::clear_gateway_cache))
        .route(
            "/admin/gateways/cache/:gateway",
            delete(admin::evict_gateway),
        )
        .route("/admin/wallets/credit", post(admin::credit_wallet))
        .route_layer(from_fn_with_state(
            state.config.admin.internal_api_key.clone(),
            require_internal_api_key,
        ));

    Router::new()
        .route("/health", get(handlers::health_check))
        .route("/ready", get(handlers::readiness_check))
        .route("/metrics", get(handlers::metrics_endpoint))
        .route("/payments", post(payments::initiate_payment))
        .route("/payments/methods", get(payments::list_methods))
        .route("/payments/verify", post(payments::verify_payment))
        .route(
            "/payments/bank-transfer",
            post(bank_transfer::submit_proof),
        )
        .route(
            "/payments/:transaction_id/retry",
            post(payments::retry_payment),
        )
        .route("/wallet/balance", get(payments::wallet_balance))
        .route("/transactions", get(transactions::list_transactions))
        .route(
            "/webhooks/:gateway/callback",
            get(webhooks::payment_callback),
        )
        .route("/webhooks/:gateway", post(webhooks::receive_webhook))
        .merge(admin_routes)
        .layer(from_fn(metrics_middleware))
        .layer(from_fn(request_id_middleware))
        .layer(
            TraceLayer::new_for_http().make_span_with(|request: &axum::http::Request<_>| {
                let request_id = request
                    .headers()
                    .get(REQUEST_ID_HEADER)
                    .and_then(|value| value.to_str().ok())
                    .unwrap_or("-");

                tracing::info_span!(
                    "http_request",
                    request_id = %request_id,
                    method = %request.method(),
                    uri = %request.uri(),
                    user_id = tracing::field::Empty,
                )
            }),
        )
        .with_state(state)
}
