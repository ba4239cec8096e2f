//! Shared integration test harness: an in-memory sqlite database with the
//! full service graph wired to a mock payment gateway.
//!
//! The pool is capped at one connection so every test sees a single database
//! (each sqlite `:memory:` connection is otherwise its own database) and
//! concurrent operations serialize the way a single store node would.

#![allow(dead_code)]

use chrono::{Duration, Utc};
use sea_orm::{ActiveModelTrait, Set};
use std::sync::Arc;
use storefront_api::{
    auth::AuthUser,
    config::AppConfig,
    db::{self, DbConfig, DbPool},
    entities::{address, cart, product, promo_code, user, user::Role},
    events::{Event, EventSender},
    schema,
    services::{
        AddressService, CartService, MockPaymentGateway, OrderService, ReturnService,
    },
};
use tokio::sync::mpsc;
use uuid::Uuid;

pub struct TestApp {
    pub db: Arc<DbPool>,
    pub config: Arc<AppConfig>,
    pub gateway: Arc<MockPaymentGateway>,
    pub carts: CartService,
    pub addresses: AddressService,
    pub orders: OrderService,
    pub returns: ReturnService,
    _event_rx: mpsc::Receiver<Event>,
}

pub async fn spawn() -> TestApp {
    let db_config = DbConfig {
        url: "sqlite::memory:".to_string(),
        max_connections: 1,
        min_connections: 1,
        ..Default::default()
    };
    let db = Arc::new(
        db::establish_connection_with_config(&db_config)
            .await
            .expect("test database"),
    );
    schema::init_schema(&db).await.expect("schema bootstrap");

    let (event_tx, event_rx) = mpsc::channel(1024);
    let event_sender = EventSender::new(event_tx);

    let config = Arc::new(AppConfig::for_tests("sqlite::memory:"));
    let gateway = Arc::new(MockPaymentGateway::new());

    let carts = CartService::new(db.clone(), event_sender.clone());
    let addresses = AddressService::new(db.clone());
    let orders = OrderService::new(
        db.clone(),
        carts.clone(),
        addresses.clone(),
        gateway.clone(),
        event_sender.clone(),
        config.clone(),
    );
    let returns = ReturnService::new(db.clone(), addresses.clone(), event_sender);

    TestApp {
        db,
        config,
        gateway,
        carts,
        addresses,
        orders,
        returns,
        _event_rx: event_rx,
    }
}

impl TestApp {
    pub async fn seed_user(&self, role: Role) -> AuthUser {
        let id = Uuid::new_v4();
        let now = Utc::now();
        user::ActiveModel {
            id: Set(id),
            name: Set(format!("user-{}", &id.to_string()[..8])),
            email: Set(format!("{}@example.test", &id.to_string()[..8])),
            phone: Set(Some("01000000000".to_string())),
            role: Set(role),
            deleted: Set(false),
            deleted_at: Set(None),
            created_at: Set(now),
            updated_at: Set(now),
        }
        .insert(&*self.db)
        .await
        .expect("seed user");

        AuthUser {
            id,
            role,
            email: format!("{}@example.test", &id.to_string()[..8]),
            name: format!("user-{}", &id.to_string()[..8]),
            phone: Some("01000000000".to_string()),
        }
    }

    pub async fn seed_product(
        &self,
        price_cents: i64,
        sale_percent: i32,
        stock: i32,
    ) -> product::Model {
        let now = Utc::now();
        product::ActiveModel {
            id: Set(Uuid::new_v4()),
            name: Set("widget".to_string()),
            price_cents: Set(price_cents),
            sale_percent: Set(sale_percent),
            stock: Set(stock),
            warranty_days: Set(365),
            deleted: Set(false),
            created_at: Set(now),
            updated_at: Set(now),
        }
        .insert(&*self.db)
        .await
        .expect("seed product")
    }

    pub async fn seed_address(&self, user_id: Option<Uuid>, is_store: bool) -> address::Model {
        let now = Utc::now();
        address::ActiveModel {
            id: Set(Uuid::new_v4()),
            user_id: Set(user_id),
            city: Set("Cairo".to_string()),
            street: Set("Main St".to_string()),
            building: Set(Some("12".to_string())),
            is_store: Set(is_store),
            deleted: Set(false),
            created_at: Set(now),
            updated_at: Set(now),
        }
        .insert(&*self.db)
        .await
        .expect("seed address")
    }

    pub async fn seed_promo(&self, code: &str, discount_percent: i32, valid_for: Duration) -> promo_code::Model {
        promo_code::ActiveModel {
            id: Set(Uuid::new_v4()),
            code: Set(code.to_string()),
            discount_percent: Set(discount_percent),
            valid_until: Set(Utc::now() + valid_for),
            created_at: Set(Utc::now()),
        }
        .insert(&*self.db)
        .await
        .expect("seed promo")
    }

    /// Attaches a promo id directly to a cart row, bypassing expiry checks;
    /// used to set up carts holding a stale promo.
    pub async fn force_promo(&self, cart: cart::Model, promo_id: Uuid) {
        let mut update: cart::ActiveModel = cart.into();
        update.promo_code_id = Set(Some(promo_id));
        update.updated_at = Set(Utc::now());
        update.update(&*self.db).await.expect("force promo");
    }
}
