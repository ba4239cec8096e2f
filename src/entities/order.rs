use chrono::{DateTime, Utc};
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

/// Immutable snapshot of a purchase intent. Totals are frozen at creation and
/// never recomputed from the live catalog; all mutation goes through lifecycle
/// transitions. Orders are soft-deleted, never removed.
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "orders")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub user_id: Uuid,
    pub address_id: Uuid,
    pub payment_method: PaymentMethod,
    pub currency: String,
    /// Frozen total in minor currency units
    pub total_cents: i64,
    pub status: OrderStatus,
    pub delivery_needed: bool,
    #[sea_orm(nullable)]
    pub transporter_id: Option<Uuid>,
    pub deleted: bool,
    #[sea_orm(nullable)]
    pub deleted_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::order_item::Entity")]
    OrderItems,
    #[sea_orm(has_many = "super::return_request::Entity")]
    Returns,
    #[sea_orm(
        belongs_to = "super::user::Entity",
        from = "Column::UserId",
        to = "super::user::Column::Id"
    )]
    User,
    #[sea_orm(
        belongs_to = "super::address::Entity",
        from = "Column::AddressId",
        to = "super::address::Column::Id"
    )]
    Address,
}

impl Related<super::order_item::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::OrderItems.def()
    }
}

impl Related<super::return_request::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Returns.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}

/// Payment methods routed by the checkout flow.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Serialize,
    Deserialize,
    EnumIter,
    DeriveActiveEnum,
    ToSchema,
    strum::Display,
)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(20))")]
#[serde(rename_all = "UPPERCASE")]
#[strum(serialize_all = "UPPERCASE")]
pub enum PaymentMethod {
    /// Cash on delivery; no gateway involvement, carries a flat fee
    #[sea_orm(string_value = "COD")]
    Cod,
    #[sea_orm(string_value = "CREDITCARD")]
    CreditCard,
    /// Requires a wallet identifier on the order request
    #[sea_orm(string_value = "MOBILEWALLET")]
    MobileWallet,
}

/// Order lifecycle states. The happy path is
/// Paying -> Processing -> OnTheWay -> Delivered; Rejected and Cancelled are
/// off-path terminals. COD orders skip Paying entirely.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Serialize,
    Deserialize,
    EnumIter,
    DeriveActiveEnum,
    ToSchema,
    strum::Display,
)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(20))")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderStatus {
    #[sea_orm(string_value = "PAYING")]
    Paying,
    #[sea_orm(string_value = "PROCESSING")]
    Processing,
    #[sea_orm(string_value = "ON_THE_WAY")]
    OnTheWay,
    #[sea_orm(string_value = "DELIVERED")]
    Delivered,
    #[sea_orm(string_value = "REJECTED")]
    Rejected,
    #[sea_orm(string_value = "CANCELLED")]
    Cancelled,
}

impl OrderStatus {
    /// Adjacency of the lifecycle graph. Any transition not listed here is a
    /// business-rule violation and must leave state unchanged.
    pub fn can_transition_to(self, next: OrderStatus) -> bool {
        use OrderStatus::*;
        matches!(
            (self, next),
            (Paying, Processing)
                | (Processing, OnTheWay)
                | (OnTheWay, Delivered)
                | (Processing, Rejected)
                | (Processing, Cancelled)
                | (OnTheWay, Cancelled)
        )
    }

    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            OrderStatus::Delivered | OrderStatus::Rejected | OrderStatus::Cancelled
        )
    }

    /// Initial status for a freshly created order.
    pub fn initial_for(method: PaymentMethod) -> Self {
        match method {
            PaymentMethod::Cod => OrderStatus::Processing,
            PaymentMethod::CreditCard | PaymentMethod::MobileWallet => OrderStatus::Paying,
        }
    }
}
