//! Idempotent DDL bootstrap shared by the binary (`auto_migrate`) and the
//! integration test harness. Statements are portable across the supported
//! sqlx backends (Postgres and SQLite).

use sea_orm::{ConnectionTrait, DatabaseConnection, DbErr};

const TABLES: &[&str] = &[
    r#"CREATE TABLE IF NOT EXISTS users (
        id uuid PRIMARY KEY,
        name text NOT NULL,
        email text NOT NULL,
        phone text,
        role varchar(20) NOT NULL,
        deleted boolean NOT NULL DEFAULT FALSE,
        deleted_at timestamptz,
        created_at timestamptz NOT NULL,
        updated_at timestamptz NOT NULL
    )"#,
    r#"CREATE TABLE IF NOT EXISTS addresses (
        id uuid PRIMARY KEY,
        user_id uuid,
        city text NOT NULL,
        street text NOT NULL,
        building text,
        is_store boolean NOT NULL DEFAULT FALSE,
        deleted boolean NOT NULL DEFAULT FALSE,
        created_at timestamptz NOT NULL,
        updated_at timestamptz NOT NULL
    )"#,
    r#"CREATE TABLE IF NOT EXISTS products (
        id uuid PRIMARY KEY,
        name text NOT NULL,
        price_cents bigint NOT NULL,
        sale_percent integer NOT NULL DEFAULT 0,
        stock integer NOT NULL DEFAULT 0,
        warranty_days integer NOT NULL DEFAULT 0,
        deleted boolean NOT NULL DEFAULT FALSE,
        created_at timestamptz NOT NULL,
        updated_at timestamptz NOT NULL
    )"#,
    r#"CREATE TABLE IF NOT EXISTS promo_codes (
        id uuid PRIMARY KEY,
        code varchar(64) NOT NULL UNIQUE,
        discount_percent integer NOT NULL,
        valid_until timestamptz NOT NULL,
        created_at timestamptz NOT NULL
    )"#,
    r#"CREATE TABLE IF NOT EXISTS carts (
        id uuid PRIMARY KEY,
        user_id uuid NOT NULL UNIQUE,
        promo_code_id uuid,
        created_at timestamptz NOT NULL,
        updated_at timestamptz NOT NULL
    )"#,
    r#"CREATE TABLE IF NOT EXISTS cart_items (
        id uuid PRIMARY KEY,
        cart_id uuid NOT NULL,
        product_id uuid NOT NULL,
        quantity integer NOT NULL,
        created_at timestamptz NOT NULL,
        updated_at timestamptz NOT NULL
    )"#,
    r#"CREATE TABLE IF NOT EXISTS orders (
        id uuid PRIMARY KEY,
        user_id uuid NOT NULL,
        address_id uuid NOT NULL,
        payment_method varchar(20) NOT NULL,
        currency varchar(3) NOT NULL,
        total_cents bigint NOT NULL,
        status varchar(20) NOT NULL,
        delivery_needed boolean NOT NULL DEFAULT FALSE,
        transporter_id uuid,
        deleted boolean NOT NULL DEFAULT FALSE,
        deleted_at timestamptz,
        created_at timestamptz NOT NULL,
        updated_at timestamptz NOT NULL
    )"#,
    r#"CREATE TABLE IF NOT EXISTS order_items (
        id uuid PRIMARY KEY,
        order_id uuid NOT NULL,
        product_id uuid NOT NULL,
        unit_price_cents bigint NOT NULL,
        sale_percent integer NOT NULL DEFAULT 0,
        warranty_days integer NOT NULL DEFAULT 0,
        quantity integer NOT NULL,
        created_at timestamptz NOT NULL
    )"#,
    r#"CREATE TABLE IF NOT EXISTS return_requests (
        id uuid PRIMARY KEY,
        order_id uuid NOT NULL,
        product_id uuid NOT NULL,
        user_id uuid NOT NULL,
        quantity integer NOT NULL,
        reason text NOT NULL,
        status varchar(20) NOT NULL,
        address_id uuid,
        transporter_id uuid,
        deleted boolean NOT NULL DEFAULT FALSE,
        deleted_at timestamptz,
        created_at timestamptz NOT NULL,
        updated_at timestamptz NOT NULL
    )"#,
];

const INDEXES: &[&str] = &[
    "CREATE INDEX IF NOT EXISTS idx_cart_items_cart ON cart_items (cart_id)",
    "CREATE INDEX IF NOT EXISTS idx_orders_user ON orders (user_id)",
    "CREATE INDEX IF NOT EXISTS idx_orders_transporter ON orders (transporter_id)",
    "CREATE INDEX IF NOT EXISTS idx_order_items_order ON order_items (order_id)",
    "CREATE INDEX IF NOT EXISTS idx_returns_order ON return_requests (order_id)",
    "CREATE INDEX IF NOT EXISTS idx_returns_transporter ON return_requests (transporter_id)",
];

/// Creates all tables and indexes when missing.
pub async fn init_schema(db: &DatabaseConnection) -> Result<(), DbErr> {
    for ddl in TABLES.iter().chain(INDEXES) {
        db.execute_unprepared(ddl).await?;
    }
    Ok(())
}
