use axum::{
    extract::{Query, State},
    Json,
};
use service_core::error::AppError;

use crate::{
    dtos::TransactionsQuery, middleware::Requester, services::TransactionPage, AppState,
};

/// The caller's wallet ledger, newest first.
pub async fn list_transactions(
    State(state): State<AppState>,
    requester: Requester,
    Query(query): Query<TransactionsQuery>,
) -> Result<Json<TransactionPage>, AppError> {
    let page = state
        .processor
        .list_transactions(&requester.user_id, query.page, query.limit)
        .await?;

    tracing::debug!(
        user_id = %requester.user_id,
        page = page.page,
        total = page.total,
        "Fetched transactions"
    );
    Ok(Json(page))
}
