//! Route definitions for the Marketplace Platform

use axum::{
    middleware,
    routing::{get, patch, post},
    Router,
};

use crate::{handlers, middleware::auth_middleware, AppState};

/// Create API routes
pub fn api_routes() -> Router<AppState> {
    Router::new()
        // Health check (public)
        .route("/health", get(handlers::health_check))
        // Courier webhook (public - signature-less courier callback)
        .route("/courier/webhook", post(handlers::courier_webhook))
        // Protected routes - orders
        .nest("/orders", order_routes())
        // Protected routes - payments
        .nest("/payments", payment_routes())
        // Protected routes - delivery agents
        .nest("/delivery", delivery_routes())
        // Protected routes - notifications
        .nest("/notifications", notification_routes())
}

/// Order routes (protected)
fn order_routes() -> Router<AppState> {
    Router::new()
        .route("/", post(handlers::place_order))
        .route("/status", patch(handlers::update_status))
        .route("/dispatch", post(handlers::dispatch_courier))
        .route("/customer", get(handlers::list_customer_orders))
        .route("/shop", get(handlers::list_shop_orders))
        .route("/:order_number", get(handlers::get_order))
        .route_layer(middleware::from_fn(auth_middleware))
}

/// Payment routes (protected)
fn payment_routes() -> Router<AppState> {
    Router::new()
        .route("/create-order", post(handlers::create_payment_order))
        .route("/verify", post(handlers::verify_payment))
        .route_layer(middleware::from_fn(auth_middleware))
}

/// Delivery agent routes (protected)
fn delivery_routes() -> Router<AppState> {
    Router::new()
        .route("/accept", post(handlers::accept_order))
        .route("/complete", post(handlers::complete_order))
        .route("/profile", get(handlers::get_agent_profile))
        .route_layer(middleware::from_fn(auth_middleware))
}

/// Notification routes (protected)
fn notification_routes() -> Router<AppState> {
    Router::new()
        .route("/", get(handlers::list_notifications))
        .route("/:notification_id/read", post(handlers::mark_notification_read))
        .route_layer(middleware::from_fn(auth_middleware))
}
