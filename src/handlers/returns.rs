//! HTTP surface for the return lifecycle; mirrors the order routes minus
//! payment confirmation.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use uuid::Uuid;

use crate::{
    auth::AuthUser,
    errors::ServiceError,
    handlers::orders::AssignTransporterRequest,
    services::returns::{CreateReturnRequest, ReturnListFilter, ReturnResponse},
    ApiResponse, AppState, PaginatedResponse,
};

pub fn return_routes() -> Router<AppState> {
    Router::new()
        .route("/", post(create_return).get(list_returns))
        .route("/:id", get(get_return))
        .route("/:id/assign", post(assign_transporter))
        .route("/:id/reject", post(reject_return))
        .route("/:id/cancel", post(cancel_return))
        .route("/:id/deliver", post(deliver_return))
}

pub async fn create_return(
    State(state): State<AppState>,
    auth_user: AuthUser,
    Json(request): Json<CreateReturnRequest>,
) -> Result<(StatusCode, Json<ApiResponse<ReturnResponse>>), ServiceError> {
    let created = state.services.returns.create_return(&auth_user, request).await?;
    Ok((StatusCode::CREATED, Json(ApiResponse::success(created))))
}

pub async fn list_returns(
    State(state): State<AppState>,
    auth_user: AuthUser,
    Query(filter): Query<ReturnListFilter>,
) -> Result<Json<PaginatedResponse<ReturnResponse>>, ServiceError> {
    let page = filter.page.unwrap_or(1).max(1);
    let limit = filter.limit.unwrap_or(20).clamp(1, 100);
    let (returns, total) = state.services.returns.list_returns(filter, &auth_user).await?;
    Ok(Json(PaginatedResponse::new(returns, page, limit, total)))
}

pub async fn get_return(
    State(state): State<AppState>,
    auth_user: AuthUser,
    Path(id): Path<Uuid>,
) -> Result<Json<ApiResponse<ReturnResponse>>, ServiceError> {
    let found = state.services.returns.get_return(id, &auth_user).await?;
    Ok(Json(ApiResponse::success(found)))
}

pub async fn assign_transporter(
    State(state): State<AppState>,
    auth_user: AuthUser,
    Path(id): Path<Uuid>,
    Json(request): Json<AssignTransporterRequest>,
) -> Result<Json<ApiResponse<ReturnResponse>>, ServiceError> {
    let updated = state
        .services
        .returns
        .assign_transporter(id, request.transporter_id, &auth_user)
        .await?;
    Ok(Json(ApiResponse::success(updated)))
}

pub async fn reject_return(
    State(state): State<AppState>,
    auth_user: AuthUser,
    Path(id): Path<Uuid>,
) -> Result<Json<ApiResponse<ReturnResponse>>, ServiceError> {
    let updated = state.services.returns.reject(id, &auth_user).await?;
    Ok(Json(ApiResponse::success(updated)))
}

pub async fn cancel_return(
    State(state): State<AppState>,
    auth_user: AuthUser,
    Path(id): Path<Uuid>,
) -> Result<Json<ApiResponse<ReturnResponse>>, ServiceError> {
    let updated = state.services.returns.cancel(id, &auth_user).await?;
    Ok(Json(ApiResponse::success(updated)))
}

pub async fn deliver_return(
    State(state): State<AppState>,
    auth_user: AuthUser,
    Path(id): Path<Uuid>,
) -> Result<Json<ApiResponse<ReturnResponse>>, ServiceError> {
    let updated = state.services.returns.mark_delivered(id, &auth_user).await?;
    Ok(Json(ApiResponse::success(updated)))
}
