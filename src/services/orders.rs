//! Order lifecycle manager: cart-to-order conversion with atomic stock
//! reservation, payment routing by method, and role-gated transitions.

use crate::{
    auth::{authorize, Action, AuthUser},
    config::AppConfig,
    entities::{
        order::{self, OrderStatus, PaymentMethod},
        order_item,
        user::{self, Role},
        Order, OrderItem, User,
    },
    errors::ServiceError,
    events::{Event, EventSender},
    services::{
        addresses::AddressService,
        carts::CartService,
        inventory::InventoryLedger,
        payments::{BuyerInfo, PaymentGateway},
        pricing::{self, PricingItem, Surcharges},
    },
};
use chrono::Utc;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, PaginatorTrait, QueryFilter,
    QueryOrder, Set, TransactionTrait,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, instrument, warn};
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct CreateOrderRequest {
    pub address_id: Uuid,
    /// Resolve the address as a flagged store address instead of a personal one
    #[serde(default)]
    pub store_pickup: bool,
    /// Adds the flat delivery fee and marks the order for transport
    #[serde(default)]
    pub delivery_needed: bool,
    pub payment_method: PaymentMethod,
    #[validate(length(min = 3, max = 3, message = "Currency must be a 3-letter code"))]
    pub currency: String,
    /// Required when payment_method is MOBILEWALLET
    pub wallet_identifier: Option<String>,
}

#[derive(Debug, Deserialize, Default, ToSchema)]
pub struct OrderListFilter {
    pub page: Option<u64>,
    pub limit: Option<u64>,
    pub user_id: Option<Uuid>,
    pub status: Option<OrderStatus>,
    pub payment_method: Option<PaymentMethod>,
    pub delivery_needed: Option<bool>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct OrderItemResponse {
    pub product_id: Uuid,
    pub unit_price_cents: i64,
    pub sale_percent: i32,
    pub warranty_days: i32,
    pub quantity: i32,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct OrderResponse {
    pub id: Uuid,
    pub user_id: Uuid,
    pub address_id: Uuid,
    pub payment_method: PaymentMethod,
    pub currency: String,
    pub total_cents: i64,
    pub status: OrderStatus,
    pub delivery_needed: bool,
    pub transporter_id: Option<Uuid>,
    pub created_at: chrono::DateTime<Utc>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub items: Vec<OrderItemResponse>,
}

impl OrderResponse {
    fn from_model(model: order::Model, items: Vec<order_item::Model>) -> Self {
        Self {
            id: model.id,
            user_id: model.user_id,
            address_id: model.address_id,
            payment_method: model.payment_method,
            currency: model.currency,
            total_cents: model.total_cents,
            status: model.status,
            delivery_needed: model.delivery_needed,
            transporter_id: model.transporter_id,
            created_at: model.created_at,
            items: items
                .into_iter()
                .map(|i| OrderItemResponse {
                    product_id: i.product_id,
                    unit_price_cents: i.unit_price_cents,
                    sale_percent: i.sale_percent,
                    warranty_days: i.warranty_days,
                    quantity: i.quantity,
                })
                .collect(),
        }
    }
}

/// What the caller gets back from checkout: the order body for COD, or a
/// gateway redirect for methods that pay online.
#[derive(Debug, Serialize, ToSchema)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum CheckoutOutcome {
    Placed { order: OrderResponse },
    RedirectToPayment { order_id: Uuid, redirect_url: String },
}

#[derive(Clone)]
pub struct OrderService {
    db: Arc<DatabaseConnection>,
    carts: CartService,
    addresses: AddressService,
    inventory: InventoryLedger,
    gateway: Arc<dyn PaymentGateway>,
    event_sender: EventSender,
    config: Arc<AppConfig>,
}

impl OrderService {
    pub fn new(
        db: Arc<DatabaseConnection>,
        carts: CartService,
        addresses: AddressService,
        gateway: Arc<dyn PaymentGateway>,
        event_sender: EventSender,
        config: Arc<AppConfig>,
    ) -> Self {
        Self {
            db,
            carts,
            addresses,
            inventory: InventoryLedger::new(),
            gateway,
            event_sender,
            config,
        }
    }

    /// Converts the requester's cart into an order.
    ///
    /// Order, order items and all stock decrements commit as one transaction;
    /// any insufficient stock aborts the whole unit. The gateway call for
    /// non-COD methods happens strictly after the commit: its failure is
    /// reported as `PaymentPending`, never as a creation failure, because the
    /// order row already exists.
    #[instrument(skip(self, request), fields(user_id = %user.id))]
    pub async fn create_order(
        &self,
        user: &AuthUser,
        request: CreateOrderRequest,
    ) -> Result<CheckoutOutcome, ServiceError> {
        request.validate()?;

        if !self.config.currency_allowed(&request.currency) {
            return Err(ServiceError::ValidationError(format!(
                "currency {} is not accepted",
                request.currency
            )));
        }

        let address = self
            .addresses
            .validate_address(request.address_id, user.id, request.store_pickup)
            .await?
            .ok_or_else(|| {
                ServiceError::InvalidOperation(
                    "address does not exist or is not available to this user".into(),
                )
            })?;

        let validated = self
            .carts
            .validate_cart(user.id)
            .await?
            .ok_or_else(|| ServiceError::InvalidOperation("user has no cart".into()))?;

        if validated.items.is_empty() {
            return Err(ServiceError::InvalidOperation("cart is empty".into()));
        }

        let pricing_items: Vec<PricingItem> = validated
            .items
            .iter()
            .map(|(item, product)| PricingItem {
                product_id: product.id,
                unit_price_cents: product.price_cents,
                sale_percent: product.sale_percent,
                warranty_days: product.warranty_days,
                quantity: item.quantity,
            })
            .collect();

        let quote = pricing::quote(
            &pricing_items,
            validated.promo.as_ref().map(|p| p.discount_percent),
            request.delivery_needed,
            request.payment_method,
            Surcharges {
                delivery_fee_cents: self.config.delivery_fee_cents,
                cod_fee_cents: self.config.cod_fee_cents,
            },
        )?;

        let now = Utc::now();
        let order_id = Uuid::new_v4();
        let status = OrderStatus::initial_for(request.payment_method);

        let txn = self.db.begin().await?;

        let order_model = order::ActiveModel {
            id: Set(order_id),
            user_id: Set(user.id),
            address_id: Set(address.id),
            payment_method: Set(request.payment_method),
            currency: Set(request.currency.to_uppercase()),
            total_cents: Set(quote.total_cents),
            status: Set(status),
            delivery_needed: Set(request.delivery_needed),
            transporter_id: Set(None),
            deleted: Set(false),
            deleted_at: Set(None),
            created_at: Set(now),
            updated_at: Set(now),
        }
        .insert(&txn)
        .await?;

        let mut item_models = Vec::with_capacity(quote.lines.len());
        for line in &quote.lines {
            let item = order_item::ActiveModel {
                id: Set(Uuid::new_v4()),
                order_id: Set(order_id),
                product_id: Set(line.product_id),
                unit_price_cents: Set(line.unit_price_cents),
                sale_percent: Set(line.sale_percent),
                warranty_days: Set(line.warranty_days),
                quantity: Set(line.quantity),
                created_at: Set(now),
            }
            .insert(&txn)
            .await?;
            item_models.push(item);

            // Store-enforced conditional decrement; a miss aborts everything.
            self.inventory
                .decrement_stock(&txn, line.product_id, line.quantity)
                .await?;
        }

        self.carts.clear_cart(&txn, &validated.cart).await?;

        txn.commit().await?;

        info!(order_id = %order_id, total_cents = quote.total_cents, "Order created");
        self.event_sender.send_or_log(Event::OrderCreated(order_id));
        for line in &quote.lines {
            self.event_sender.send_or_log(Event::StockDecremented {
                product_id: line.product_id,
                quantity: line.quantity,
                order_id,
            });
        }

        if request.payment_method == PaymentMethod::Cod {
            return Ok(CheckoutOutcome::Placed {
                order: OrderResponse::from_model(order_model, item_models),
            });
        }

        // Past this point the order is durable; only the reply changes.
        let buyer = BuyerInfo::from_auth(user);
        match self
            .gateway
            .pay(
                &buyer,
                &order_model,
                &item_models,
                &address,
                request.wallet_identifier.as_deref(),
            )
            .await
        {
            Ok(redirect_url) => {
                self.event_sender
                    .send_or_log(Event::PaymentRedirectIssued { order_id });
                Ok(CheckoutOutcome::RedirectToPayment {
                    order_id,
                    redirect_url,
                })
            }
            Err(e) => {
                warn!(order_id = %order_id, error = %e, "Payment unresolved after commit");
                self.event_sender
                    .send_or_log(Event::PaymentUnresolved { order_id });
                Err(ServiceError::PaymentPending {
                    order_id,
                    reason: e.to_string(),
                })
            }
        }
    }

    /// Marks an externally confirmed payment: PAYING -> PROCESSING. Entry
    /// point for the gateway confirmation collaborator; staff-gated here.
    #[instrument(skip(self, requester), fields(order_id = %order_id))]
    pub async fn confirm_payment(
        &self,
        order_id: Uuid,
        requester: &AuthUser,
    ) -> Result<OrderResponse, ServiceError> {
        authorize(requester, Action::ConfirmPayment, None)?;
        let order = self.find_active(order_id).await?;
        self.transition(order, OrderStatus::Processing).await
    }

    /// Assigns a transporter to a PROCESSING order. Assignment also moves the
    /// order to ON_THE_WAY: a courier holding the parcel and an order still
    /// "processing" cannot both be true.
    #[instrument(skip(self, requester), fields(order_id = %order_id, transporter_id = %transporter_id))]
    pub async fn assign_transporter(
        &self,
        order_id: Uuid,
        transporter_id: Uuid,
        requester: &AuthUser,
    ) -> Result<OrderResponse, ServiceError> {
        authorize(requester, Action::AssignTransporter, None)?;

        let order = self.find_active(order_id).await?;
        if order.status != OrderStatus::Processing {
            return Err(ServiceError::InvalidStatus(format!(
                "transporter can only be assigned while PROCESSING, order is {}",
                order.status
            )));
        }

        let transporter = User::find_by_id(transporter_id)
            .filter(user::Column::Deleted.eq(false))
            .one(&*self.db)
            .await?
            .filter(|u| u.role == Role::Transporter)
            .ok_or_else(|| {
                ServiceError::InvalidOperation(format!(
                    "user {} is not an active transporter",
                    transporter_id
                ))
            })?;

        let old_status = order.status;
        let mut update: order::ActiveModel = order.into();
        update.transporter_id = Set(Some(transporter.id));
        update.status = Set(OrderStatus::OnTheWay);
        update.updated_at = Set(Utc::now());
        let updated = update.update(&*self.db).await?;

        info!(order_id = %order_id, transporter_id = %transporter.id, "Transporter assigned");
        self.event_sender.send_or_log(Event::TransporterAssigned {
            order_id,
            transporter_id: transporter.id,
        });
        self.event_sender.send_or_log(Event::OrderStatusChanged {
            order_id,
            old_status: old_status.to_string(),
            new_status: updated.status.to_string(),
        });

        Ok(OrderResponse::from_model(updated, Vec::new()))
    }

    /// Staff rejection: PROCESSING -> REJECTED.
    #[instrument(skip(self, requester), fields(order_id = %order_id))]
    pub async fn reject(
        &self,
        order_id: Uuid,
        requester: &AuthUser,
    ) -> Result<OrderResponse, ServiceError> {
        authorize(requester, Action::Reject, None)?;
        let order = self.find_active(order_id).await?;
        self.transition(order, OrderStatus::Rejected).await
    }

    /// Marks a delivered order: ON_THE_WAY -> DELIVERED.
    #[instrument(skip(self, requester), fields(order_id = %order_id))]
    pub async fn mark_delivered(
        &self,
        order_id: Uuid,
        requester: &AuthUser,
    ) -> Result<OrderResponse, ServiceError> {
        let order = self.find_active(order_id).await?;
        // Staff or the assigned transporter may confirm delivery.
        if !requester.role.is_staff() && order.transporter_id != Some(requester.id) {
            return Err(ServiceError::Forbidden(
                "only staff or the assigned transporter may mark delivery".into(),
            ));
        }
        self.transition(order, OrderStatus::Delivered).await
    }

    /// Owner cancellation: PROCESSING or ON_THE_WAY -> CANCELLED, combined
    /// with a soft delete.
    #[instrument(skip(self, requester), fields(order_id = %order_id))]
    pub async fn cancel(
        &self,
        order_id: Uuid,
        requester: &AuthUser,
    ) -> Result<OrderResponse, ServiceError> {
        let order = self.find_active(order_id).await?;
        authorize(requester, Action::Cancel, Some(order.user_id))?;

        if !order.status.can_transition_to(OrderStatus::Cancelled) {
            return Err(ServiceError::InvalidStatus(format!(
                "order in status {} cannot be cancelled",
                order.status
            )));
        }

        let old_status = order.status;
        let now = Utc::now();
        let mut update: order::ActiveModel = order.into();
        update.status = Set(OrderStatus::Cancelled);
        update.deleted = Set(true);
        update.deleted_at = Set(Some(now));
        update.updated_at = Set(now);
        let updated = update.update(&*self.db).await?;

        info!(order_id = %order_id, %old_status, "Order cancelled");
        self.event_sender.send_or_log(Event::OrderCancelled(order_id));

        Ok(OrderResponse::from_model(updated, Vec::new()))
    }

    /// Fetches one order with its items, enforcing read access.
    #[instrument(skip(self, requester), fields(order_id = %order_id))]
    pub async fn get_order(
        &self,
        order_id: Uuid,
        requester: &AuthUser,
    ) -> Result<OrderResponse, ServiceError> {
        let order = self.find_active(order_id).await?;

        let assigned = order.transporter_id == Some(requester.id);
        if !assigned {
            authorize(requester, Action::View, Some(order.user_id))?;
        }

        let items = OrderItem::find()
            .filter(order_item::Column::OrderId.eq(order.id))
            .all(&*self.db)
            .await?;

        Ok(OrderResponse::from_model(order, items))
    }

    /// Role-scoped listing. Transporters always see exactly their own
    /// assignments regardless of filter content; customers their own orders;
    /// staff filter freely.
    #[instrument(skip(self, requester))]
    pub async fn list_orders(
        &self,
        filter: OrderListFilter,
        requester: &AuthUser,
    ) -> Result<(Vec<OrderResponse>, u64), ServiceError> {
        let page = filter.page.unwrap_or(1).max(1);
        let limit = filter.limit.unwrap_or(20).clamp(1, 100);

        let mut query = Order::find().filter(order::Column::Deleted.eq(false));

        match requester.role {
            Role::Transporter => {
                query = query.filter(order::Column::TransporterId.eq(requester.id));
            }
            Role::Customer => {
                query = query.filter(order::Column::UserId.eq(requester.id));
            }
            Role::Admin | Role::Moderator => {
                if let Some(user_id) = filter.user_id {
                    query = query.filter(order::Column::UserId.eq(user_id));
                }
            }
        }

        if let Some(status) = filter.status {
            query = query.filter(order::Column::Status.eq(status));
        }
        if let Some(method) = filter.payment_method {
            query = query.filter(order::Column::PaymentMethod.eq(method));
        }
        if let Some(delivery) = filter.delivery_needed {
            query = query.filter(order::Column::DeliveryNeeded.eq(delivery));
        }

        let paginator = query
            .order_by_desc(order::Column::CreatedAt)
            .paginate(&*self.db, limit);

        let total = paginator.num_items().await?;
        let orders = paginator.fetch_page(page - 1).await?;

        Ok((
            orders
                .into_iter()
                .map(|o| OrderResponse::from_model(o, Vec::new()))
                .collect(),
            total,
        ))
    }

    async fn find_active(&self, order_id: Uuid) -> Result<order::Model, ServiceError> {
        Order::find_by_id(order_id)
            .filter(order::Column::Deleted.eq(false))
            .one(&*self.db)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Order {} not found", order_id)))
    }

    /// Applies a lifecycle transition after checking the adjacency graph.
    async fn transition(
        &self,
        order: order::Model,
        next: OrderStatus,
    ) -> Result<OrderResponse, ServiceError> {
        if !order.status.can_transition_to(next) {
            return Err(ServiceError::InvalidStatus(format!(
                "order cannot move from {} to {}",
                order.status, next
            )));
        }

        let order_id = order.id;
        let old_status = order.status;
        let mut update: order::ActiveModel = order.into();
        update.status = Set(next);
        update.updated_at = Set(Utc::now());
        let updated = update.update(&*self.db).await?;

        info!(order_id = %order_id, %old_status, new_status = %next, "Order status changed");
        self.event_sender.send_or_log(Event::OrderStatusChanged {
            order_id,
            old_status: old_status.to_string(),
            new_status: next.to_string(),
        });

        Ok(OrderResponse::from_model(updated, Vec::new()))
    }
}
