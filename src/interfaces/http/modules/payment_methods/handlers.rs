//! Payment method REST API handlers
//!
//! Every call first resolves the caller's processor customer, creating it
//! on first use.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};

use super::dto::{PaymentMethodResponse, SavePaymentMethodRequest};
use crate::interfaces::http::common::{ApiError, ApiResponse, ApiResult, EmptyData, ValidatedJson};
use crate::interfaces::http::middleware::CurrentUser;
use crate::interfaces::http::router::ApiState;

async fn customer_id(state: &ApiState, user: &CurrentUser) -> Result<String, ApiError> {
    Ok(state
        .customers
        .resolve_customer(&user.user_id, &user.email)
        .await?)
}

#[utoipa::path(
    get,
    path = "/api/v1/payment-methods",
    tag = "Payment Methods",
    security(("bearer_auth" = [])),
    responses(
        (status = 200, description = "Saved cards", body = ApiResponse<Vec<PaymentMethodResponse>>),
        (status = 502, description = "Payment processor unavailable")
    )
)]
pub async fn list_payment_methods(
    State(state): State<ApiState>,
    user: CurrentUser,
) -> ApiResult<Vec<PaymentMethodResponse>> {
    let customer_id = customer_id(&state, &user).await?;
    let methods = state
        .gateway
        .list_payment_methods(&user.user_id, &customer_id)
        .await?;
    Ok(Json(ApiResponse::success(
        methods.into_iter().map(Into::into).collect(),
    )))
}

#[utoipa::path(
    post,
    path = "/api/v1/payment-methods",
    tag = "Payment Methods",
    security(("bearer_auth" = [])),
    request_body = SavePaymentMethodRequest,
    responses(
        (status = 201, description = "Card saved", body = ApiResponse<PaymentMethodResponse>),
        (status = 502, description = "Payment processor rejected the card")
    )
)]
pub async fn save_payment_method(
    State(state): State<ApiState>,
    user: CurrentUser,
    ValidatedJson(req): ValidatedJson<SavePaymentMethodRequest>,
) -> Result<(StatusCode, Json<ApiResponse<PaymentMethodResponse>>), ApiError> {
    let customer_id = customer_id(&state, &user).await?;
    let method = state
        .gateway
        .save_payment_method(
            &user.user_id,
            &customer_id,
            &req.payment_method_id,
            req.make_default,
        )
        .await?;
    Ok((StatusCode::CREATED, Json(ApiResponse::success(method.into()))))
}

#[utoipa::path(
    put,
    path = "/api/v1/payment-methods/{id}/default",
    tag = "Payment Methods",
    security(("bearer_auth" = [])),
    params(("id" = String, Path, description = "Payment method ID")),
    responses(
        (status = 200, description = "Default changed", body = ApiResponse<PaymentMethodResponse>),
        (status = 404, description = "Not found")
    )
)]
pub async fn set_default_payment_method(
    State(state): State<ApiState>,
    user: CurrentUser,
    Path(id): Path<String>,
) -> ApiResult<PaymentMethodResponse> {
    let customer_id = customer_id(&state, &user).await?;
    let method = state
        .gateway
        .set_default_payment_method(&user.user_id, &customer_id, &id)
        .await?;
    Ok(Json(ApiResponse::success(method.into())))
}

#[utoipa::path(
    delete,
    path = "/api/v1/payment-methods/{id}",
    tag = "Payment Methods",
    security(("bearer_auth" = [])),
    params(("id" = String, Path, description = "Payment method ID")),
    responses(
        (status = 200, description = "Card removed", body = ApiResponse<EmptyData>),
        (status = 404, description = "Not found")
    )
)]
pub async fn delete_payment_method(
    State(state): State<ApiState>,
    user: CurrentUser,
    Path(id): Path<String>,
) -> ApiResult<EmptyData> {
    state
        .gateway
        .delete_payment_method(&user.user_id, &id)
        .await?;
    Ok(Json(ApiResponse::success(EmptyData {})))
}
