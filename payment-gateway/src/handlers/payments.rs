//! Payer-facing payment endpoints.

use axum::{
    extract::{Path, Query, State},
    Json,
};
use service_core::error::AppError;
use validator::Validate;

use crate::{
    dtos::{InitiatePaymentRequest, MethodsQuery, VerifyPaymentRequest, WalletBalanceResponse},
    middleware::Requester,
    models::{GatewayType, PaymentRequest, PaymentResponse, PaymentVerification},
    services::AvailableGateways,
    AppState,
};

/// Payment methods the caller can use right now, with a recommendation.
pub async fn list_methods(
    State(state): State<AppState>,
    requester: Requester,
    Query(query): Query<MethodsQuery>,
) -> Result<Json<AvailableGateways>, AppError> {
    let methods = state
        .processor
        .available_gateways(&requester.user_id, query.amount)
        .await?;

    tracing::debug!(
        user_id = %requester.user_id,
        purpose = ?query.purpose,
        recommended = %methods.recommended,
        "Listed payment methods"
    );
    Ok(Json(methods))
}

pub async fn initiate_payment(
    State(state): State<AppState>,
    requester: Requester,
    Json(payload): Json<InitiatePaymentRequest>,
) -> Result<Json<PaymentResponse>, AppError> {
    payload.validate()?;

    let gateway = match payload.gateway {
        Some(gateway) => gateway,
        None => {
            state
                .processor
                .recommended_gateway(&requester.user_id, payload.amount)
                .await?
        }
    };

    let currency = payload
        .currency
        .clone()
        .or_else(|| {
            state
                .config
                .gateways
                .resolve(gateway)
                .features
                .supported_currencies
                .first()
                .cloned()
        })
        .unwrap_or_else(|| "NGN".to_string())
        .to_ascii_uppercase();

    let mut metadata = payload.payer_metadata();
    if gateway.is_redirect() {
        metadata.callback_url = Some(callback_url(&state, gateway));
    }

    let request = PaymentRequest {
        user_id: requester.user_id.clone(),
        amount: payload.amount,
        currency,
        gateway,
        purpose: payload.purpose.clone(),
        package_id: payload.package_id.clone(),
        metadata,
    };

    tracing::info!(
        user_id = %request.user_id,
        gateway = %gateway,
        amount = %request.amount,
        currency = %request.currency,
        "Initiating payment"
    );

    let response = state.processor.process_payment(&request).await?;
    Ok(Json(response))
}

pub async fn verify_payment(
    State(state): State<AppState>,
    requester: Requester,
    Json(payload): Json<VerifyPaymentRequest>,
) -> Result<Json<PaymentVerification>, AppError> {
    payload.validate()?;

    tracing::info!(
        user_id = %requester.user_id,
        gateway = %payload.gateway,
        reference = %payload.reference,
        "Verifying payment"
    );

    let verification = state
        .processor
        .verify_payment(payload.gateway, &payload.reference)
        .await?;
    Ok(Json(verification))
}

pub async fn wallet_balance(
    State(state): State<AppState>,
    requester: Requester,
) -> Result<Json<WalletBalanceResponse>, AppError> {
    let balance = state.processor.wallet_balance(&requester.user_id).await?;
    Ok(Json(WalletBalanceResponse {
        user_id: requester.user_id,
        balance,
    }))
}

pub async fn retry_payment(
    State(state): State<AppState>,
    _requester: Requester,
    Path(transaction_id): Path<String>,
) -> Result<Json<PaymentResponse>, AppError> {
    let response = state
        .processor
        .retry_failed_payment(&transaction_id)
        .await?;
    Ok(Json(response))
}

/// Where a redirect provider sends the payer back after checkout.
fn callback_url(state: &AppState, gateway: GatewayType) -> String {
    format!(
        "{}/webhooks/{}/callback",
        state.config.redirect.callback_base_url, gateway
    )
}
