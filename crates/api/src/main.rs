//! ChannelGate API Server
//!
//! Serves the payment provider endpoints (Stripe webhooks, Telegram Stars
//! payments) and the operator queue tooling. Commerce CRUD, authentication,
//! and the dashboard live in separate services.

mod config;
mod error;
mod routes;
mod state;

use std::net::SocketAddr;

use tower_http::trace::TraceLayer;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use channelgate_access::AccessService;
use channelgate_shared::{create_migration_pool, create_pool, run_migrations};

use crate::{config::Config, routes::create_router, state::AppState};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env file if present
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,channelgate_api=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting ChannelGate API Server v{}", env!("CARGO_PKG_VERSION"));

    let config = Config::from_env()?;

    info!("Connecting to database...");
    let pool = create_pool(&config.database_url).await?;
    info!("Database connection established");

    info!("Running database migrations...");
    let migration_pool = create_migration_pool(&config.database_url).await?;
    run_migrations(&migration_pool).await?;
    migration_pool.close().await;
    info!("Migrations complete");

    let access = AccessService::from_env(pool.clone())?;
    let state = AppState::new(pool, access);

    let app = create_router(state).layer(TraceLayer::new_for_http());

    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    info!("Listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
