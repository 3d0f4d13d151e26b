use crate::models::{AttemptOperation, GatewayType, PaymentStatus};
use crate::utils::to_minor_units;
use anyhow::{anyhow, Result};
use metrics::counter;
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use rust_decimal::Decimal;
use std::sync::OnceLock;

pub static METRICS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

/// Installs the global Prometheus recorder. Call once from `main`.
pub fn init_metrics() -> Result<()> {
    let handle = PrometheusBuilder::new()
        .install_recorder()
        .map_err(|e| anyhow!("failed to install Prometheus recorder: {}", e))?;

    METRICS_HANDLE
        .set(handle)
        .map_err(|_| anyhow!("metrics handle already initialized"))
}

pub fn get_metrics() -> String {
    METRICS_HANDLE
        .get()
        .map(|handle| handle.render())
        .unwrap_or_else(|| "# Metrics recorder not initialized\n".to_string())
}

/// Counts one gateway call by operation, backend and outcome.
pub fn record_attempt(operation: AttemptOperation, gateway: GatewayType, status: PaymentStatus) {
    counter!(
        "payment_attempts_total",
        "operation" => operation.as_str(),
        "gateway" => gateway.as_str(),
        "status" => status.as_str()
    )
    .increment(1);
}

/// Adds a settled amount, in minor units, to the per-currency total.
pub fn record_amount(gateway: GatewayType, currency: &str, amount: Decimal) {
    let Some(minor) = to_minor_units(amount.abs()) else {
        return;
    };
    counter!(
        "payment_amount_minor_total",
        "gateway" => gateway.as_str(),
        "currency" => currency.to_ascii_uppercase()
    )
    .increment(minor.unsigned_abs());
}

pub fn record_webhook_signature_failure(gateway: GatewayType) {
    counter!("webhook_signature_failures_total", "gateway" => gateway.as_str()).increment(1);
}
