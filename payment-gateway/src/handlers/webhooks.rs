//! Provider callbacks.
//!
//! Two entry points per gateway: the browser redirect a payer follows after
//! an external checkout, and the signed server-to-server notification.

use axum::{
    body::Bytes,
    extract::{Path, Query, State},
    http::HeaderMap,
    response::Redirect,
    Json,
};
use service_core::error::AppError;

use crate::{
    dtos::{CallbackQuery, WebhookAck},
    gateways::{
        flutterwave::FLUTTERWAVE_SIGNATURE_HEADER, mock::MOCK_SIGNATURE_HEADER,
        paystack::PAYSTACK_SIGNATURE_HEADER,
    },
    models::{GatewayType, PaymentStatus},
    AppState,
};

fn parse_gateway(raw: &str) -> Result<GatewayType, AppError> {
    raw.parse::<GatewayType>()
        .map_err(|e| AppError::NotFound(anyhow::anyhow!(e)))
}

fn signature_header(gateway: GatewayType) -> Option<&'static str> {
    match gateway {
        GatewayType::Paystack => Some(PAYSTACK_SIGNATURE_HEADER),
        GatewayType::Flutterwave => Some(FLUTTERWAVE_SIGNATURE_HEADER),
        GatewayType::Mock => Some(MOCK_SIGNATURE_HEADER),
        GatewayType::Wallet => None,
    }
}

/// Builds `{frontend}/payment/{outcome}?reference=..&status=..`.
fn frontend_redirect(
    state: &AppState,
    outcome: &str,
    reference: Option<&str>,
    status: Option<PaymentStatus>,
) -> Redirect {
    let mut params = Vec::new();
    if let Some(reference) = reference {
        params.push(format!("reference={}", urlencoding::encode(reference)));
    }
    if let Some(status) = status {
        params.push(format!("status={}", status));
    }

    let mut url = format!("{}/payment/{}", state.config.redirect.frontend_url, outcome);
    if !params.is_empty() {
        url.push('?');
        url.push_str(&params.join("&"));
    }
    Redirect::to(&url)
}

/// Landing point for a payer returning from a provider checkout page.
///
/// The query string is never trusted for the outcome: anything other than an
/// explicit cancellation is re-verified with the provider.
pub async fn payment_callback(
    State(state): State<AppState>,
    Path(gateway): Path<String>,
    Query(query): Query<CallbackQuery>,
) -> Result<Redirect, AppError> {
    let gateway = parse_gateway(&gateway)?;
    let reference = query.payment_reference().map(str::to_string);

    tracing::info!(
        gateway = %gateway,
        reference = ?reference,
        provider_status = ?query.status,
        provider_transaction_id = ?query.transaction_id,
        "Payment callback received"
    );

    if query.is_cancelled() {
        return Ok(frontend_redirect(
            &state,
            "cancelled",
            reference.as_deref(),
            None,
        ));
    }

    let Some(reference) = reference else {
        tracing::warn!(gateway = %gateway, "Payment callback without a reference");
        return Ok(frontend_redirect(
            &state,
            "failed",
            None,
            Some(PaymentStatus::Failed),
        ));
    };

    let status = match state.processor.verify_payment(gateway, &reference).await {
        Ok(verification) => verification.status,
        Err(e) => {
            tracing::error!(
                gateway = %gateway,
                reference = %reference,
                error = %e,
                "Callback verification failed"
            );
            PaymentStatus::Failed
        }
    };

    let outcome = if status == PaymentStatus::Success {
        "success"
    } else {
        "failed"
    };
    Ok(frontend_redirect(
        &state,
        outcome,
        Some(&reference),
        Some(status),
    ))
}

/// Signed provider notification. The raw body is what the signature covers,
/// so it is taken as bytes and never re-serialized.
pub async fn receive_webhook(
    State(state): State<AppState>,
    Path(gateway): Path<String>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<WebhookAck>, AppError> {
    let gateway = parse_gateway(&gateway)?;

    let signature = signature_header(gateway)
        .and_then(|name| headers.get(name))
        .and_then(|v| v.to_str().ok())
        .unwrap_or("");

    let validation = state
        .processor
        .handle_webhook(gateway, &body, signature)
        .await?;

    if !validation.is_valid {
        return Err(AppError::Unauthorized(anyhow::anyhow!(
            "Invalid webhook signature"
        )));
    }

    Ok(Json(WebhookAck {
        received: true,
        status: validation.status,
        reference: validation.reference,
    }))
}
