//! Internal operations. Mounted behind `require_internal_api_key`.

use axum::{
    extract::{Path, State},
    Json,
};
use service_core::error::AppError;
use uuid::Uuid;
use validator::Validate;

use crate::{
    dtos::{CacheResponse, RefundRequest, WalletBalanceResponse, WalletCreditRequest},
    models::{GatewayType, PaymentAttempt, PaymentResponse, PendingPayment},
    AppState,
};

pub async fn refund_payment(
    State(state): State<AppState>,
    Json(payload): Json<RefundRequest>,
) -> Result<Json<PaymentResponse>, AppError> {
    payload.validate()?;

    tracing::info!(
        gateway = %payload.gateway,
        transaction_id = %payload.transaction_id,
        amount = ?payload.amount,
        "Refund requested"
    );

    let response = state
        .processor
        .refund_payment(payload.gateway, &payload.transaction_id, payload.amount)
        .await?;
    Ok(Json(response))
}

pub async fn approve_pending_payment(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<PendingPayment>, AppError> {
    let reviewed = state.processor.review_pending_payment(id, true).await?;
    Ok(Json(reviewed))
}

pub async fn reject_pending_payment(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<PendingPayment>, AppError> {
    let reviewed = state.processor.review_pending_payment(id, false).await?;
    Ok(Json(reviewed))
}

pub async fn clear_gateway_cache(State(state): State<AppState>) -> Json<CacheResponse> {
    let cleared = state.factory.cached_types();
    state.factory.clear();
    Json(CacheResponse {
        cleared,
        cached: state.factory.cached_types(),
    })
}

pub async fn evict_gateway(
    State(state): State<AppState>,
    Path(gateway): Path<String>,
) -> Result<Json<CacheResponse>, AppError> {
    let gateway: GatewayType = gateway
        .parse()
        .map_err(|e: String| AppError::NotFound(anyhow::anyhow!(e)))?;

    let cleared = if state.factory.evict(gateway) {
        vec![gateway]
    } else {
        Vec::new()
    };
    Ok(Json(CacheResponse {
        cleared,
        cached: state.factory.cached_types(),
    }))
}

pub async fn credit_wallet(
    State(state): State<AppState>,
    Json(payload): Json<WalletCreditRequest>,
) -> Result<Json<WalletBalanceResponse>, AppError> {
    payload.validate()?;

    let balance = state
        .processor
        .credit_wallet(&payload.user_id, payload.amount, payload.description)
        .await?;
    Ok(Json(WalletBalanceResponse {
        user_id: payload.user_id,
        balance,
    }))
}

/// Audit trail for one payment reference, oldest first.
pub async fn list_attempts(
    State(state): State<AppState>,
    Path(reference): Path<String>,
) -> Result<Json<Vec<PaymentAttempt>>, AppError> {
    let attempts = state.processor.attempts_for_reference(&reference).await?;
    Ok(Json(attempts))
}
