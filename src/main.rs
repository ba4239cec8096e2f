use anyhow::Context;
use std::sync::Arc;
use storefront_api::{
    app_router, config, db, events,
    schema,
    services::{AddressService, CartService, HttpPaymentGateway, OrderService, ReturnService},
    AppServices, AppState,
};
use tokio::sync::mpsc;
use tracing::info;

const EVENT_CHANNEL_CAPACITY: usize = 1024;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cfg = config::load_config().context("failed to load configuration")?;
    config::init_tracing(&cfg.log_level, cfg.log_json);

    info!(
        environment = %cfg.environment,
        "Starting {} v{}",
        env!("CARGO_PKG_NAME"),
        env!("CARGO_PKG_VERSION")
    );

    let db = Arc::new(
        db::establish_connection_from_app_config(&cfg)
            .await
            .context("failed to connect to database")?,
    );

    if cfg.auto_migrate {
        schema::init_schema(&db)
            .await
            .context("failed to initialize database schema")?;
        info!("Database schema ready");
    }

    let (event_tx, event_rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);
    let event_sender = events::EventSender::new(event_tx);
    tokio::spawn(events::process_events(event_rx));

    let config = Arc::new(cfg);
    let gateway = Arc::new(HttpPaymentGateway::new(&config.payment));

    let carts = CartService::new(db.clone(), event_sender.clone());
    let addresses = AddressService::new(db.clone());
    let orders = OrderService::new(
        db.clone(),
        carts.clone(),
        addresses.clone(),
        gateway,
        event_sender.clone(),
        config.clone(),
    );
    let returns = ReturnService::new(db.clone(), addresses, event_sender.clone());

    let state = AppState {
        db,
        config: config.clone(),
        event_sender,
        services: AppServices {
            carts,
            orders,
            returns,
        },
    };

    let addr = format!("{}:{}", config.host, config.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind {}", addr))?;
    info!(%addr, "Listening");

    axum::serve(listener, app_router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;

    info!("Shutdown complete");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for shutdown signal");
        return;
    }
    info!("Shutdown signal received");
}
