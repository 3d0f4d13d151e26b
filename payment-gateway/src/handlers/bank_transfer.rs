use axum::{extract::State, http::StatusCode, Json};
use service_core::error::AppError;
use validator::Validate;

use crate::{
    dtos::BankTransferRequest, middleware::Requester, models::PendingPayment,
    services::BankTransferSubmission, AppState,
};

/// Records proof of a manual bank transfer for administrator review.
pub async fn submit_proof(
    State(state): State<AppState>,
    requester: Requester,
    Json(payload): Json<BankTransferRequest>,
) -> Result<(StatusCode, Json<PendingPayment>), AppError> {
    payload.validate()?;

    let currency = payload.currency.unwrap_or_else(|| {
        state
            .config
            .gateways
            .wallet
            .features
            .supported_currencies
            .first()
            .cloned()
            .unwrap_or_else(|| "NGN".to_string())
    });

    let pending = state
        .processor
        .submit_bank_transfer(BankTransferSubmission {
            user_id: requester.user_id,
            amount: payload.amount,
            currency,
            purpose: payload.purpose,
            proof_url: payload.proof_url,
            reference: payload.reference,
        })
        .await?;

    Ok((StatusCode::CREATED, Json(pending)))
}
