//! Return lifecycle manager. Returns mirror the order lifecycle minus the
//! payment phase and are capped per order line: across all live returns for
//! one (order, product) pair the returned quantity never exceeds what was
//! ordered.

use crate::{
    auth::{authorize, Action, AuthUser},
    entities::{
        order::{self, OrderStatus},
        order_item,
        return_request::{self, ReturnStatus},
        user::{self, Role},
        Order, OrderItem, ReturnRequest, User,
    },
    errors::ServiceError,
    events::{Event, EventSender},
    services::{addresses::AddressService, inventory::InventoryLedger},
};
use chrono::Utc;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, PaginatorTrait, QueryFilter,
    QueryOrder, Set,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, instrument};
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct CreateReturnRequest {
    pub order_id: Uuid,
    pub product_id: Uuid,
    #[validate(range(min = 1, message = "Quantity must be at least 1"))]
    pub quantity: i32,
    #[validate(length(min = 1, max = 1000, message = "Reason is required"))]
    pub reason: String,
    /// Pickup address for the returned items
    pub address_id: Uuid,
    #[serde(default)]
    pub store_pickup: bool,
}

#[derive(Debug, Deserialize, Default, ToSchema)]
pub struct ReturnListFilter {
    pub page: Option<u64>,
    pub limit: Option<u64>,
    pub user_id: Option<Uuid>,
    pub order_id: Option<Uuid>,
    pub status: Option<ReturnStatus>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct ReturnResponse {
    pub id: Uuid,
    pub order_id: Uuid,
    pub product_id: Uuid,
    pub user_id: Uuid,
    pub quantity: i32,
    pub reason: String,
    pub status: ReturnStatus,
    pub address_id: Option<Uuid>,
    pub transporter_id: Option<Uuid>,
    pub created_at: chrono::DateTime<Utc>,
}

impl From<return_request::Model> for ReturnResponse {
    fn from(model: return_request::Model) -> Self {
        Self {
            id: model.id,
            order_id: model.order_id,
            product_id: model.product_id,
            user_id: model.user_id,
            quantity: model.quantity,
            reason: model.reason,
            status: model.status,
            address_id: model.address_id,
            transporter_id: model.transporter_id,
            created_at: model.created_at,
        }
    }
}

#[derive(Clone)]
pub struct ReturnService {
    db: Arc<DatabaseConnection>,
    addresses: AddressService,
    inventory: InventoryLedger,
    event_sender: EventSender,
}

impl ReturnService {
    pub fn new(
        db: Arc<DatabaseConnection>,
        addresses: AddressService,
        event_sender: EventSender,
    ) -> Self {
        Self {
            db,
            addresses,
            inventory: InventoryLedger::new(),
            event_sender,
        }
    }

    /// Opens a return for one line of a delivered order. The cap counts every
    /// live (non-deleted) return for the same line, so repeated partial
    /// returns can never exceed the ordered quantity combined.
    #[instrument(skip(self, request), fields(user_id = %user.id))]
    pub async fn create_return(
        &self,
        user: &AuthUser,
        request: CreateReturnRequest,
    ) -> Result<ReturnResponse, ServiceError> {
        request.validate()?;

        let order = Order::find_by_id(request.order_id)
            .filter(order::Column::Deleted.eq(false))
            .one(&*self.db)
            .await?
            .ok_or_else(|| {
                ServiceError::NotFound(format!("Order {} not found", request.order_id))
            })?;

        if order.user_id != user.id {
            return Err(ServiceError::Forbidden(
                "only the order owner may open a return".into(),
            ));
        }

        if order.status != OrderStatus::Delivered {
            return Err(ServiceError::InvalidStatus(format!(
                "returns require a DELIVERED order, order is {}",
                order.status
            )));
        }

        let item = OrderItem::find()
            .filter(order_item::Column::OrderId.eq(order.id))
            .filter(order_item::Column::ProductId.eq(request.product_id))
            .one(&*self.db)
            .await?
            .ok_or_else(|| {
                ServiceError::NotFound(format!(
                    "Product {} is not part of order {}",
                    request.product_id, order.id
                ))
            })?;

        let already_returned: i32 = ReturnRequest::find()
            .filter(return_request::Column::OrderId.eq(order.id))
            .filter(return_request::Column::ProductId.eq(request.product_id))
            .filter(return_request::Column::Deleted.eq(false))
            .all(&*self.db)
            .await?
            .iter()
            .map(|r| r.quantity)
            .sum();

        if already_returned + request.quantity > item.quantity {
            return Err(ServiceError::InvalidOperation(format!(
                "cannot return {} units: {} of {} already requested",
                request.quantity, already_returned, item.quantity
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

        let now = Utc::now();
        let created = return_request::ActiveModel {
            id: Set(Uuid::new_v4()),
            order_id: Set(order.id),
            product_id: Set(request.product_id),
            user_id: Set(user.id),
            quantity: Set(request.quantity),
            reason: Set(request.reason),
            status: Set(ReturnStatus::Processing),
            address_id: Set(Some(address.id)),
            transporter_id: Set(None),
            deleted: Set(false),
            deleted_at: Set(None),
            created_at: Set(now),
            updated_at: Set(now),
        }
        .insert(&*self.db)
        .await?;

        info!(return_id = %created.id, order_id = %order.id, "Return created");
        self.event_sender
            .send_or_log(Event::ReturnCreated(created.id));

        Ok(created.into())
    }

    /// Assigns a transporter for pickup; like orders, assignment also moves
    /// the return to ON_THE_WAY.
    #[instrument(skip(self, requester), fields(return_id = %return_id, transporter_id = %transporter_id))]
    pub async fn assign_transporter(
        &self,
        return_id: Uuid,
        transporter_id: Uuid,
        requester: &AuthUser,
    ) -> Result<ReturnResponse, ServiceError> {
        authorize(requester, Action::AssignTransporter, None)?;

        let ret = self.find_active(return_id).await?;
        if ret.status != ReturnStatus::Processing {
            return Err(ServiceError::InvalidStatus(format!(
                "transporter can only be assigned while PROCESSING, return is {}",
                ret.status
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

        let old_status = ret.status;
        let mut update: return_request::ActiveModel = ret.into();
        update.transporter_id = Set(Some(transporter.id));
        update.status = Set(ReturnStatus::OnTheWay);
        update.updated_at = Set(Utc::now());
        let updated = update.update(&*self.db).await?;

        info!(return_id = %return_id, transporter_id = %transporter.id, "Transporter assigned to return");
        self.event_sender.send_or_log(Event::ReturnStatusChanged {
            return_id,
            old_status: old_status.to_string(),
            new_status: updated.status.to_string(),
        });

        Ok(updated.into())
    }

    /// Staff rejection: PROCESSING -> REJECTED.
    #[instrument(skip(self, requester), fields(return_id = %return_id))]
    pub async fn reject(
        &self,
        return_id: Uuid,
        requester: &AuthUser,
    ) -> Result<ReturnResponse, ServiceError> {
        authorize(requester, Action::Reject, None)?;
        let ret = self.find_active(return_id).await?;
        self.transition(ret, ReturnStatus::Rejected).await
    }

    /// Marks the returned items as received: ON_THE_WAY -> DELIVERED. Received
    /// units go back into stock.
    #[instrument(skip(self, requester), fields(return_id = %return_id))]
    pub async fn mark_delivered(
        &self,
        return_id: Uuid,
        requester: &AuthUser,
    ) -> Result<ReturnResponse, ServiceError> {
        let ret = self.find_active(return_id).await?;
        if !requester.role.is_staff() && ret.transporter_id != Some(requester.id) {
            return Err(ServiceError::Forbidden(
                "only staff or the assigned transporter may mark delivery".into(),
            ));
        }

        let product_id = ret.product_id;
        let quantity = ret.quantity;
        let received = self.transition(ret, ReturnStatus::Delivered).await?;
        self.inventory
            .restock(&*self.db, product_id, quantity)
            .await?;
        Ok(received)
    }

    /// Owner cancellation: PROCESSING or ON_THE_WAY -> CANCELLED plus soft
    /// delete, which also releases the quantity back to the per-line cap.
    #[instrument(skip(self, requester), fields(return_id = %return_id))]
    pub async fn cancel(
        &self,
        return_id: Uuid,
        requester: &AuthUser,
    ) -> Result<ReturnResponse, ServiceError> {
        let ret = self.find_active(return_id).await?;
        authorize(requester, Action::Cancel, Some(ret.user_id))?;

        if !ret.status.can_transition_to(ReturnStatus::Cancelled) {
            return Err(ServiceError::InvalidStatus(format!(
                "return in status {} cannot be cancelled",
                ret.status
            )));
        }

        let old_status = ret.status;
        let now = Utc::now();
        let mut update: return_request::ActiveModel = ret.into();
        update.status = Set(ReturnStatus::Cancelled);
        update.deleted = Set(true);
        update.deleted_at = Set(Some(now));
        update.updated_at = Set(now);
        let updated = update.update(&*self.db).await?;

        info!(return_id = %return_id, %old_status, "Return cancelled");
        self.event_sender
            .send_or_log(Event::ReturnCancelled(return_id));

        Ok(updated.into())
    }

    #[instrument(skip(self, requester), fields(return_id = %return_id))]
    pub async fn get_return(
        &self,
        return_id: Uuid,
        requester: &AuthUser,
    ) -> Result<ReturnResponse, ServiceError> {
        let ret = self.find_active(return_id).await?;
        let assigned = ret.transporter_id == Some(requester.id);
        if !assigned {
            authorize(requester, Action::View, Some(ret.user_id))?;
        }
        Ok(ret.into())
    }

    /// Role-scoped listing, same scoping rules as orders.
    #[instrument(skip(self, requester))]
    pub async fn list_returns(
        &self,
        filter: ReturnListFilter,
        requester: &AuthUser,
    ) -> Result<(Vec<ReturnResponse>, u64), ServiceError> {
        let page = filter.page.unwrap_or(1).max(1);
        let limit = filter.limit.unwrap_or(20).clamp(1, 100);

        let mut query = ReturnRequest::find().filter(return_request::Column::Deleted.eq(false));

        match requester.role {
            Role::Transporter => {
                query = query.filter(return_request::Column::TransporterId.eq(requester.id));
            }
            Role::Customer => {
                query = query.filter(return_request::Column::UserId.eq(requester.id));
            }
            Role::Admin | Role::Moderator => {
                if let Some(user_id) = filter.user_id {
                    query = query.filter(return_request::Column::UserId.eq(user_id));
                }
            }
        }

        if let Some(order_id) = filter.order_id {
            query = query.filter(return_request::Column::OrderId.eq(order_id));
        }
        if let Some(status) = filter.status {
            query = query.filter(return_request::Column::Status.eq(status));
        }

        let paginator = query
            .order_by_desc(return_request::Column::CreatedAt)
            .paginate(&*self.db, limit);

        let total = paginator.num_items().await?;
        let returns = paginator.fetch_page(page - 1).await?;

        Ok((returns.into_iter().map(Into::into).collect(), total))
    }

    async fn find_active(&self, return_id: Uuid) -> Result<return_request::Model, ServiceError> {
        ReturnRequest::find_by_id(return_id)
            .filter(return_request::Column::Deleted.eq(false))
            .one(&*self.db)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Return {} not found", return_id)))
    }

    async fn transition(
        &self,
        ret: return_request::Model,
        next: ReturnStatus,
    ) -> Result<ReturnResponse, ServiceError> {
        if !ret.status.can_transition_to(next) {
            return Err(ServiceError::InvalidStatus(format!(
                "return cannot move from {} to {}",
                ret.status, next
            )));
        }

        let return_id = ret.id;
        let old_status = ret.status;
        let mut update: return_request::ActiveModel = ret.into();
        update.status = Set(next);
        update.updated_at = Set(Utc::now());
        let updated = update.update(&*self.db).await?;

        info!(return_id = %return_id, %old_status, new_status = %next, "Return status changed");
        self.event_sender.send_or_log(Event::ReturnStatusChanged {
            return_id,
            old_status: old_status.to_string(),
            new_status: next.to_string(),
        });

        Ok(updated.into())
    }
}
