//! Marketplace Platform - Backend Server
//!
//! Multi-tenant e-commerce backend: catalog-backed order placement,
//! vendor fulfillment, delivery assignment, courier tracking, and payment
//! settlement.

use axum::{routing::get, Router};
use std::{net::SocketAddr, sync::Arc};
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod config;
mod error;
mod external;
mod handlers;
mod middleware;
mod models;
mod routes;
mod services;
mod tenant;

pub use config::Config;

use external::{CourierClient, GatewayClient, InvoiceClient};
use tenant::TenantRegistry;

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub tenants: TenantRegistry,
    pub config: Arc<Config>,
    pub gateway: GatewayClient,
    pub courier: CourierClient,
    pub invoices: InvoiceClient,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "mkt_server=debug,tower_http=debug,sqlx=warn".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration
    dotenvy::dotenv().ok();
    let config = config::Config::load()?;

    tracing::info!("Starting Marketplace Platform Server");
    tracing::info!("Environment: {}", config.environment);

    // Connect tenant database pools
    tracing::info!("Connecting to tenant databases...");
    let tenants = TenantRegistry::connect(&config).await?;
    tracing::info!("Database connections established");

    // Run migrations in development
    if config.environment == "development" {
        tracing::info!("Running database migrations...");
        sqlx::migrate!("./migrations")
            .run(tenants.default_pool())
            .await?;
        tracing::info!("Migrations completed");
    }

    // External collaborators
    let gateway = GatewayClient::new(&config.gateway)?;
    let courier = CourierClient::new(&config.courier)?;
    let invoices = InvoiceClient::new(&config.invoices)?;

    // Create application state
    let state = AppState {
        tenants,
        config: Arc::new(config.clone()),
        gateway,
        courier,
        invoices,
    };

    // Build application
    let app = create_app(state);

    // Start server
    let addr = SocketAddr::from(([0, 0, 0, 0], config.server.port));
    tracing::info!("Listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

/// Create the application router with all routes and middleware
fn create_app(state: AppState) -> Router {
    // CORS configuration
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/", get(root))
        .route("/health", get(handlers::health_check))
        .nest("/api/v1", routes::api_routes())
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

/// Root endpoint
async fn root() -> &'static str {
    "Marketplace Platform API v1.0"
}
