//! Stock ledger. The decrement is the single most safety-critical write in
//! the system: it is expressed as a conditional update enforced by the store
//! (`stock = stock - q WHERE stock >= q`) so concurrent orders can never drive
//! stock negative, and it always runs inside the order-creation transaction.

use crate::{entities::product, errors::ServiceError};
use sea_orm::sea_query::Expr;
use sea_orm::{ColumnTrait, ConnectionTrait, EntityTrait, QueryFilter};
use tracing::instrument;
use uuid::Uuid;

#[derive(Debug, Clone, Default)]
pub struct InventoryLedger;

impl InventoryLedger {
    pub fn new() -> Self {
        Self
    }

    /// Decrements stock for one product, failing when fewer than `quantity`
    /// units remain. Intended to run on the order-creation transaction; a
    /// failure must abort the whole transaction.
    #[instrument(skip(self, conn), fields(product_id = %product_id, quantity))]
    pub async fn decrement_stock<C: ConnectionTrait>(
        &self,
        conn: &C,
        product_id: Uuid,
        quantity: i32,
    ) -> Result<(), ServiceError> {
        if quantity <= 0 {
            return Err(ServiceError::InvalidInput(
                "decrement quantity must be positive".into(),
            ));
        }

        let result = product::Entity::update_many()
            .col_expr(
                product::Column::Stock,
                Expr::col(product::Column::Stock).sub(quantity),
            )
            .filter(product::Column::Id.eq(product_id))
            .filter(product::Column::Stock.gte(quantity))
            .filter(product::Column::Deleted.eq(false))
            .exec(conn)
            .await?;

        if result.rows_affected == 0 {
            return Err(ServiceError::InsufficientStock(format!(
                "product {} has fewer than {} units in stock",
                product_id, quantity
            )));
        }

        Ok(())
    }

    /// Returns units to stock, e.g. when a completed return is restocked.
    #[instrument(skip(self, conn), fields(product_id = %product_id, quantity))]
    pub async fn restock<C: ConnectionTrait>(
        &self,
        conn: &C,
        product_id: Uuid,
        quantity: i32,
    ) -> Result<(), ServiceError> {
        if quantity <= 0 {
            return Err(ServiceError::InvalidInput(
                "restock quantity must be positive".into(),
            ));
        }

        let result = product::Entity::update_many()
            .col_expr(
                product::Column::Stock,
                Expr::col(product::Column::Stock).add(quantity),
            )
            .filter(product::Column::Id.eq(product_id))
            .exec(conn)
            .await?;

        if result.rows_affected == 0 {
            return Err(ServiceError::NotFound(format!(
                "product {} not found",
                product_id
            )));
        }

        Ok(())
    }
}
