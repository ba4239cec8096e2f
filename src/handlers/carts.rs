//! Cart endpoints. GET runs the validator, so reading a cart is also what
//! repairs it.

use axum::{
    extract::{Path, State},
    routing::{get, post, put},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

use crate::{
    auth::AuthUser,
    errors::ServiceError,
    services::carts::ValidatedCart,
    ApiResponse, AppState,
};

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct AddItemRequest {
    pub product_id: Uuid,
    #[validate(range(min = 1, message = "Quantity must be at least 1"))]
    pub quantity: i32,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct UpdateItemRequest {
    /// Zero or negative removes the item
    pub quantity: i32,
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct ApplyPromoRequest {
    #[validate(length(min = 1, max = 64))]
    pub code: String,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct CartItemView {
    pub product_id: Uuid,
    pub product_name: String,
    pub unit_price_cents: i64,
    pub sale_percent: i32,
    pub quantity: i32,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct CartView {
    pub id: Uuid,
    pub items: Vec<CartItemView>,
    pub promo_code: Option<String>,
}

impl From<ValidatedCart> for CartView {
    fn from(validated: ValidatedCart) -> Self {
        Self {
            id: validated.cart.id,
            items: validated
                .items
                .into_iter()
                .map(|(item, product)| CartItemView {
                    product_id: product.id,
                    product_name: product.name,
                    unit_price_cents: product.price_cents,
                    sale_percent: product.sale_percent,
                    quantity: item.quantity,
                })
                .collect(),
            promo_code: validated.promo.map(|p| p.code),
        }
    }
}

pub fn cart_routes() -> Router<AppState> {
    Router::new()
        .route("/", get(get_cart))
        .route("/items", post(add_item))
        .route("/items/:product_id", put(update_item))
        .route("/promo", post(apply_promo))
}

pub async fn get_cart(
    State(state): State<AppState>,
    auth_user: AuthUser,
) -> Result<Json<ApiResponse<Option<CartView>>>, ServiceError> {
    let validated = state.services.carts.validate_cart(auth_user.id).await?;
    Ok(Json(ApiResponse::success(validated.map(Into::into))))
}

pub async fn add_item(
    State(state): State<AppState>,
    auth_user: AuthUser,
    Json(request): Json<AddItemRequest>,
) -> Result<Json<ApiResponse<()>>, ServiceError> {
    request.validate()?;
    state
        .services
        .carts
        .add_item(auth_user.id, request.product_id, request.quantity)
        .await?;
    Ok(Json(ApiResponse::success(())))
}

pub async fn update_item(
    State(state): State<AppState>,
    auth_user: AuthUser,
    Path(product_id): Path<Uuid>,
    Json(request): Json<UpdateItemRequest>,
) -> Result<Json<ApiResponse<()>>, ServiceError> {
    state
        .services
        .carts
        .update_item_quantity(auth_user.id, product_id, request.quantity)
        .await?;
    Ok(Json(ApiResponse::success(())))
}

pub async fn apply_promo(
    State(state): State<AppState>,
    auth_user: AuthUser,
    Json(request): Json<ApplyPromoRequest>,
) -> Result<Json<ApiResponse<()>>, ServiceError> {
    request.validate()?;
    state
        .services
        .carts
        .apply_promo(auth_user.id, &request.code)
        .await?;
    Ok(Json(ApiResponse::success(())))
}
