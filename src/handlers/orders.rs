//! HTTP surface for the order lifecycle.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::{
    auth::AuthUser,
    errors::ServiceError,
    services::orders::{
        CheckoutOutcome, CreateOrderRequest, OrderListFilter, OrderResponse,
    },
    ApiResponse, AppState, PaginatedResponse,
};

#[derive(Debug, Deserialize, ToSchema)]
pub struct AssignTransporterRequest {
    pub transporter_id: Uuid,
}

pub fn order_routes() -> Router<AppState> {
    Router::new()
        .route("/", post(create_order).get(list_orders))
        .route("/:id", get(get_order))
        .route("/:id/assign", post(assign_transporter))
        .route("/:id/reject", post(reject_order))
        .route("/:id/cancel", post(cancel_order))
        .route("/:id/deliver", post(deliver_order))
        .route("/:id/confirm-payment", post(confirm_payment))
}

/// Convert the requester's cart into an order. Non-COD methods reply with a
/// payment redirect instead of the order body.
pub async fn create_order(
    State(state): State<AppState>,
    auth_user: AuthUser,
    Json(request): Json<CreateOrderRequest>,
) -> Result<(StatusCode, Json<ApiResponse<CheckoutOutcome>>), ServiceError> {
    let outcome = state.services.orders.create_order(&auth_user, request).await?;
    Ok((StatusCode::CREATED, Json(ApiResponse::success(outcome))))
}

pub async fn list_orders(
    State(state): State<AppState>,
    auth_user: AuthUser,
    Query(filter): Query<OrderListFilter>,
) -> Result<Json<PaginatedResponse<OrderResponse>>, ServiceError> {
    let page = filter.page.unwrap_or(1).max(1);
    let limit = filter.limit.unwrap_or(20).clamp(1, 100);
    let (orders, total) = state.services.orders.list_orders(filter, &auth_user).await?;
    Ok(Json(PaginatedResponse::new(orders, page, limit, total)))
}

pub async fn get_order(
    State(state): State<AppState>,
    auth_user: AuthUser,
    Path(id): Path<Uuid>,
) -> Result<Json<ApiResponse<OrderResponse>>, ServiceError> {
    let order = state.services.orders.get_order(id, &auth_user).await?;
    Ok(Json(ApiResponse::success(order)))
}

pub async fn assign_transporter(
    State(state): State<AppState>,
    auth_user: AuthUser,
    Path(id): Path<Uuid>,
    Json(request): Json<AssignTransporterRequest>,
) -> Result<Json<ApiResponse<OrderResponse>>, ServiceError> {
    let order = state
        .services
        .orders
        .assign_transporter(id, request.transporter_id, &auth_user)
        .await?;
    Ok(Json(ApiResponse::success(order)))
}

pub async fn reject_order(
    State(state): State<AppState>,
    auth_user: AuthUser,
    Path(id): Path<Uuid>,
) -> Result<Json<ApiResponse<OrderResponse>>, ServiceError> {
    let order = state.services.orders.reject(id, &auth_user).await?;
    Ok(Json(ApiResponse::success(order)))
}

pub async fn cancel_order(
    State(state): State<AppState>,
    auth_user: AuthUser,
    Path(id): Path<Uuid>,
) -> Result<Json<ApiResponse<OrderResponse>>, ServiceError> {
    let order = state.services.orders.cancel(id, &auth_user).await?;
    Ok(Json(ApiResponse::success(order)))
}

pub async fn deliver_order(
    State(state): State<AppState>,
    auth_user: AuthUser,
    Path(id): Path<Uuid>,
) -> Result<Json<ApiResponse<OrderResponse>>, ServiceError> {
    let order = state.services.orders.mark_delivered(id, &auth_user).await?;
    Ok(Json(ApiResponse::success(order)))
}

pub async fn confirm_payment(
    State(state): State<AppState>,
    auth_user: AuthUser,
    Path(id): Path<Uuid>,
) -> Result<Json<ApiResponse<OrderResponse>>, ServiceError> {
    let order = state.services.orders.confirm_payment(id, &auth_user).await?;
    Ok(Json(ApiResponse::success(order)))
}
