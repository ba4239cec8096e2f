//! Cart management and validation.
//!
//! `validate_cart` is deliberately a side-effecting read: it reconciles the
//! persisted cart against live catalog state and repairs what it finds —
//! items whose product vanished, was soft-deleted, or lost stock are removed;
//! an expired promo is detached. Callers always receive a snapshot that
//! matches storage after healing.

use crate::{
    entities::{cart, cart_item, product, promo_code, Cart, CartItem, PromoCode},
    errors::ServiceError,
    events::{Event, EventSender},
};
use chrono::Utc;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, Set,
};
use std::sync::Arc;
use tracing::{info, instrument};
use uuid::Uuid;

/// Cart snapshot guaranteed to be consistent with storage: every item's
/// product exists, is not deleted, and has stock for the requested quantity;
/// the promo, when present, is within its validity window.
#[derive(Debug, Clone)]
pub struct ValidatedCart {
    pub cart: cart::Model,
    pub items: Vec<(cart_item::Model, product::Model)>,
    pub promo: Option<promo_code::Model>,
}

#[derive(Clone)]
pub struct CartService {
    db: Arc<DatabaseConnection>,
    event_sender: EventSender,
}

impl CartService {
    pub fn new(db: Arc<DatabaseConnection>, event_sender: EventSender) -> Self {
        Self { db, event_sender }
    }

    /// Loads and self-heals the user's cart. Returns `None` when the user has
    /// no cart. Idempotent: a second call with no intervening catalog change
    /// performs no further repairs.
    #[instrument(skip(self), fields(user_id = %user_id))]
    pub async fn validate_cart(
        &self,
        user_id: Uuid,
    ) -> Result<Option<ValidatedCart>, ServiceError> {
        let Some(cart) = Cart::find()
            .filter(cart::Column::UserId.eq(user_id))
            .one(&*self.db)
            .await?
        else {
            return Ok(None);
        };

        let rows = CartItem::find()
            .filter(cart_item::Column::CartId.eq(cart.id))
            .find_also_related(product::Entity)
            .all(&*self.db)
            .await?;

        let mut valid = Vec::with_capacity(rows.len());
        let mut invalid_ids = Vec::new();

        for (item, maybe_product) in rows {
            match maybe_product {
                Some(p) if !p.deleted && p.stock >= item.quantity => valid.push((item, p)),
                _ => invalid_ids.push(item.id),
            }
        }

        // Self-healing delete: violations are repaired, not reported.
        if !invalid_ids.is_empty() {
            let removed = invalid_ids.len();
            CartItem::delete_many()
                .filter(cart_item::Column::Id.is_in(invalid_ids))
                .exec(&*self.db)
                .await?;
            info!(cart_id = %cart.id, removed, "Removed invalid cart items");
            self.event_sender.send_or_log(Event::CartRepaired {
                cart_id: cart.id,
                removed_items: removed,
            });
        }

        let (cart, promo) = self.resolve_promo(cart).await?;

        Ok(Some(ValidatedCart {
            cart,
            items: valid,
            promo,
        }))
    }

    /// Loads the attached promo, detaching it from the persisted cart when
    /// its validity window has elapsed.
    async fn resolve_promo(
        &self,
        cart: cart::Model,
    ) -> Result<(cart::Model, Option<promo_code::Model>), ServiceError> {
        let Some(promo_id) = cart.promo_code_id else {
            return Ok((cart, None));
        };

        let promo = PromoCode::find_by_id(promo_id).one(&*self.db).await?;
        let keep = promo
            .as_ref()
            .map(|p| !p.is_expired(Utc::now()))
            .unwrap_or(false);

        if keep {
            return Ok((cart, promo));
        }

        let cart_id = cart.id;
        let mut update: cart::ActiveModel = cart.into();
        update.promo_code_id = Set(None);
        update.updated_at = Set(Utc::now());
        let cart = update.update(&*self.db).await?;

        info!(cart_id = %cart_id, "Detached expired promo code from cart");
        self.event_sender
            .send_or_log(Event::PromoDetached { cart_id });

        Ok((cart, None))
    }

    /// Adds a product to the cart, or bumps quantity when already present.
    #[instrument(skip(self), fields(user_id = %user_id, product_id = %product_id))]
    pub async fn add_item(
        &self,
        user_id: Uuid,
        product_id: Uuid,
        quantity: i32,
    ) -> Result<cart_item::Model, ServiceError> {
        if quantity <= 0 {
            return Err(ServiceError::InvalidInput(
                "quantity must be positive".into(),
            ));
        }

        let cart = self.find_or_create_cart(user_id).await?;

        let product = product::Entity::find_by_id(product_id)
            .filter(product::Column::Deleted.eq(false))
            .one(&*self.db)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Product {} not found", product_id)))?;

        let existing = CartItem::find()
            .filter(cart_item::Column::CartId.eq(cart.id))
            .filter(cart_item::Column::ProductId.eq(product_id))
            .one(&*self.db)
            .await?;

        let requested = existing.as_ref().map_or(quantity, |i| i.quantity + quantity);
        if product.stock < requested {
            return Err(ServiceError::InsufficientStock(format!(
                "product {} has only {} units in stock",
                product_id, product.stock
            )));
        }

        let item = match existing {
            Some(item) => {
                let mut update: cart_item::ActiveModel = item.into();
                update.quantity = Set(requested);
                update.updated_at = Set(Utc::now());
                update.update(&*self.db).await?
            }
            None => {
                let now = Utc::now();
                cart_item::ActiveModel {
                    id: Set(Uuid::new_v4()),
                    cart_id: Set(cart.id),
                    product_id: Set(product_id),
                    quantity: Set(quantity),
                    created_at: Set(now),
                    updated_at: Set(now),
                }
                .insert(&*self.db)
                .await?
            }
        };

        Ok(item)
    }

    /// Sets an item's quantity; zero or negative removes the row entirely.
    #[instrument(skip(self), fields(user_id = %user_id, product_id = %product_id))]
    pub async fn update_item_quantity(
        &self,
        user_id: Uuid,
        product_id: Uuid,
        quantity: i32,
    ) -> Result<(), ServiceError> {
        let cart = self.require_cart(user_id).await?;

        let item = CartItem::find()
            .filter(cart_item::Column::CartId.eq(cart.id))
            .filter(cart_item::Column::ProductId.eq(product_id))
            .one(&*self.db)
            .await?
            .ok_or_else(|| {
                ServiceError::NotFound(format!("Product {} is not in the cart", product_id))
            })?;

        if quantity <= 0 {
            CartItem::delete_by_id(item.id).exec(&*self.db).await?;
            return Ok(());
        }

        let mut update: cart_item::ActiveModel = item.into();
        update.quantity = Set(quantity);
        update.updated_at = Set(Utc::now());
        update.update(&*self.db).await?;
        Ok(())
    }

    /// Attaches a promo code to the cart; expired codes are rejected up front.
    #[instrument(skip(self), fields(user_id = %user_id))]
    pub async fn apply_promo(&self, user_id: Uuid, code: &str) -> Result<(), ServiceError> {
        let cart = self.require_cart(user_id).await?;

        let promo = PromoCode::find()
            .filter(promo_code::Column::Code.eq(code))
            .one(&*self.db)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Promo code {} not found", code)))?;

        if promo.is_expired(Utc::now()) {
            return Err(ServiceError::InvalidOperation(format!(
                "promo code {} has expired",
                code
            )));
        }

        let mut update: cart::ActiveModel = cart.into();
        update.promo_code_id = Set(Some(promo.id));
        update.updated_at = Set(Utc::now());
        update.update(&*self.db).await?;
        Ok(())
    }

    /// Empties the cart and detaches any promo. Runs on the order-creation
    /// transaction so a committed order always leaves an empty cart behind.
    pub async fn clear_cart<C: sea_orm::ConnectionTrait>(
        &self,
        conn: &C,
        cart: &cart::Model,
    ) -> Result<(), ServiceError> {
        CartItem::delete_many()
            .filter(cart_item::Column::CartId.eq(cart.id))
            .exec(conn)
            .await?;

        let mut update: cart::ActiveModel = cart.clone().into();
        update.promo_code_id = Set(None);
        update.updated_at = Set(Utc::now());
        update.update(conn).await?;
        Ok(())
    }

    async fn require_cart(&self, user_id: Uuid) -> Result<cart::Model, ServiceError> {
        Cart::find()
            .filter(cart::Column::UserId.eq(user_id))
            .one(&*self.db)
            .await?
            .ok_or_else(|| ServiceError::NotFound("User has no cart".into()))
    }

    async fn find_or_create_cart(&self, user_id: Uuid) -> Result<cart::Model, ServiceError> {
        if let Some(cart) = Cart::find()
            .filter(cart::Column::UserId.eq(user_id))
            .one(&*self.db)
            .await?
        {
            return Ok(cart);
        }

        let now = Utc::now();
        let cart = cart::ActiveModel {
            id: Set(Uuid::new_v4()),
            user_id: Set(user_id),
            promo_code_id: Set(None),
            created_at: Set(now),
            updated_at: Set(now),
        }
        .insert(&*self.db)
        .await?;
        Ok(cart)
    }
}
