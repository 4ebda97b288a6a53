//! Transaction REST API handlers

use axum::{
    extract::{Path, Query, State},
    Json,
};

use super::dto::{
    ReceiptResponse, RefundRequest, StationTransactionResponse, TransactionResponse,
};
use crate::domain::{ChargeError, Transaction};
use crate::interfaces::http::common::{ApiError, ApiResponse, ApiResult, ValidatedJson};
use crate::interfaces::http::middleware::CurrentUser;
use crate::interfaces::http::modules::{PaginatedResponse, PaginationParams};
use crate::interfaces::http::router::ApiState;

async fn owned_transaction(
    state: &ApiState,
    user: &CurrentUser,
    id: &str,
) -> Result<Transaction, ApiError> {
    let tx = state.store.get_transaction(id).await?;
    if tx.user_id != user.user_id {
        return Err(ChargeError::not_found("Transaction", "id", id).into());
    }
    Ok(tx)
}

#[utoipa::path(
    get,
    path = "/api/v1/transactions",
    tag = "Transactions",
    security(("bearer_auth" = [])),
    params(PaginationParams),
    responses(
        (status = 200, description = "The caller's payment history, newest first", body = ApiResponse<PaginatedResponse<TransactionResponse>>)
    )
)]
pub async fn list_transactions(
    State(state): State<ApiState>,
    user: CurrentUser,
    Query(params): Query<PaginationParams>,
) -> ApiResult<PaginatedResponse<TransactionResponse>> {
    let mut txs = state.store.query_user_transactions(&user.user_id).await?;
    txs.sort_by_key(|tx| std::cmp::Reverse(tx.created_at));
    let items = txs.into_iter().map(Into::into).collect();
    Ok(Json(ApiResponse::success(PaginatedResponse::paginate(items, &params))))
}

#[utoipa::path(
    get,
    path = "/api/v1/stations/transactions",
    tag = "Transactions",
    security(("bearer_auth" = [])),
    params(PaginationParams),
    responses(
        (status = 200, description = "Transactions at stations the caller owns", body = ApiResponse<PaginatedResponse<StationTransactionResponse>>)
    )
)]
pub async fn list_station_transactions(
    State(state): State<ApiState>,
    user: CurrentUser,
    Query(params): Query<PaginationParams>,
) -> ApiResult<PaginatedResponse<StationTransactionResponse>> {
    let items = state
        .store
        .query_station_transactions(&user.user_id)
        .await?
        .into_iter()
        .map(Into::into)
        .collect();
    Ok(Json(ApiResponse::success(PaginatedResponse::paginate(items, &params))))
}

#[utoipa::path(
    post,
    path = "/api/v1/transactions/{id}/receipt",
    tag = "Transactions",
    security(("bearer_auth" = [])),
    params(("id" = String, Path, description = "Transaction ID")),
    responses(
        (status = 200, description = "Receipt (re)sent", body = ApiResponse<ReceiptResponse>),
        (status = 404, description = "Not found"),
        (status = 502, description = "Mail transport failed")
    )
)]
pub async fn resend_receipt(
    State(state): State<ApiState>,
    user: CurrentUser,
    Path(id): Path<String>,
) -> ApiResult<ReceiptResponse> {
    let tx = owned_transaction(&state, &user, &id).await?;
    let sent = state.receipts.send_receipt(&tx.id).await?;
    Ok(Json(ApiResponse::success(ReceiptResponse {
        transaction_id: tx.id,
        sent,
    })))
}

#[utoipa::path(
    post,
    path = "/api/v1/transactions/{id}/refund",
    tag = "Transactions",
    security(("bearer_auth" = [])),
    params(("id" = String, Path, description = "Transaction ID")),
    request_body = RefundRequest,
    responses(
        (status = 200, description = "Refunded", body = ApiResponse<TransactionResponse>),
        (status = 400, description = "Amount exceeds the captured amount"),
        (status = 404, description = "Not found"),
        (status = 409, description = "Transaction is not refundable")
    )
)]
pub async fn refund_transaction(
    State(state): State<ApiState>,
    user: CurrentUser,
    Path(id): Path<String>,
    ValidatedJson(req): ValidatedJson<RefundRequest>,
) -> ApiResult<TransactionResponse> {
    let tx = owned_transaction(&state, &user, &id).await?;
    let refunded = state.refunds.refund(&tx.id, req.amount, &req.reason).await?;
    Ok(Json(ApiResponse::success(refunded.into())))
}
