//! HTTP handlers for order endpoints

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use serde::Deserialize;

use crate::error::{AppError, AppResult};
use crate::handlers::ApiResponse;
use crate::middleware::{CurrentUser, Role};
use crate::services::orders::{
    Order, OrderConfirmation, OrderDetail, PlaceOrderInput, ShopOrderFilter,
};
use crate::services::{FulfillmentService, NotificationService, OrderService};
use crate::AppState;
use shared::{NotificationKind, OrderStatus, PaginatedResponse, Pagination};

/// Place a new order from the authenticated customer's items
pub async fn place_order(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Json(input): Json<PlaceOrderInput>,
) -> AppResult<(StatusCode, Json<ApiResponse<OrderConfirmation>>)> {
    current_user.0.require_role(Role::Customer)?;
    let pool = state.tenants.resolve(current_user.0.tenant_id)?;

    let service = OrderService::new(pool);
    let confirmation = service
        .place_order(
            current_user.0.user_id,
            input,
            state.config.shipping.flat_fee,
            &state.invoices,
        )
        .await?;

    let response = if confirmation.warnings.is_empty() {
        ApiResponse::ok(confirmation)
    } else {
        let note = confirmation.warnings.join("; ");
        ApiResponse::with_message(confirmation, note)
    };

    Ok((StatusCode::CREATED, response))
}

/// Fetch one order by its order number
pub async fn get_order(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Path(order_number): Path<String>,
) -> AppResult<Json<ApiResponse<OrderDetail>>> {
    let pool = state.tenants.resolve(current_user.0.tenant_id)?;
    let service = OrderService::new(pool);
    let detail = service.get_order(&order_number).await?;

    // Orders are visible to their customer, the owning shop, and the
    // assigned delivery agent; everyone else sees a missing order.
    let user = &current_user.0;
    let visible = match user.role {
        Role::Customer => detail.order.customer_id == user.user_id,
        Role::Vendor => user.shop_id == Some(detail.order.shop_id),
        Role::Delivery => detail.order.delivery_agent_id == Some(user.user_id),
    };
    if !visible {
        return Err(AppError::NotFound("Order".to_string()));
    }

    Ok(ApiResponse::ok(detail))
}

/// List the authenticated customer's orders
pub async fn list_customer_orders(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Query(pagination): Query<Pagination>,
) -> AppResult<Json<ApiResponse<PaginatedResponse<Order>>>> {
    current_user.0.require_role(Role::Customer)?;
    let pool = state.tenants.resolve(current_user.0.tenant_id)?;

    let service = OrderService::new(pool);
    let orders = service
        .list_customer_orders(current_user.0.user_id, pagination)
        .await?;

    Ok(ApiResponse::ok(orders))
}

/// List the authenticated vendor's shop orders
pub async fn list_shop_orders(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Query(filter): Query<ShopOrderFilter>,
) -> AppResult<Json<ApiResponse<PaginatedResponse<Order>>>> {
    let shop_id = current_user.0.require_shop()?;
    let pool = state.tenants.resolve(current_user.0.tenant_id)?;

    let service = OrderService::new(pool);
    let orders = service.list_shop_orders(shop_id, filter).await?;

    Ok(ApiResponse::ok(orders))
}

/// Input for the vendor status update
#[derive(Debug, Deserialize)]
pub struct UpdateStatusInput {
    pub order_number: String,
    pub status: OrderStatus,
}

/// Vendor-initiated order status update
pub async fn update_status(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Json(input): Json<UpdateStatusInput>,
) -> AppResult<Json<ApiResponse<serde_json::Value>>> {
    let shop_id = current_user.0.require_shop()?;
    let pool = state.tenants.resolve(current_user.0.tenant_id)?;

    let service = FulfillmentService::new(pool.clone());
    let result = service
        .update_status(shop_id, &input.order_number, input.status)
        .await?;

    // Post-commit, best-effort customer notification
    let notifications = NotificationService::new(pool);
    if let Err(e) = notifications
        .notify(
            result.customer_id,
            Some(result.order_id),
            NotificationKind::OrderStatusChanged,
            &format!("Order {} is now {}", result.order_number, result.status),
        )
        .await
    {
        tracing::warn!(order_number = %result.order_number, error = %e, "status notification failed");
    }

    Ok(ApiResponse::ok(serde_json::json!({
        "order_number": result.order_number,
        "status": result.status,
    })))
}

/// Input for dispatching an order to the courier
#[derive(Debug, Deserialize)]
pub struct DispatchInput {
    pub order_number: String,
}

/// Register a confirmed order with the courier for pickup
pub async fn dispatch_courier(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Json(input): Json<DispatchInput>,
) -> AppResult<Json<ApiResponse<serde_json::Value>>> {
    let shop_id = current_user.0.require_shop()?;
    let pool = state.tenants.resolve(current_user.0.tenant_id)?;

    let service = FulfillmentService::new(pool);
    let courier_ref = service
        .dispatch_courier(&state.courier, shop_id, &input.order_number)
        .await?;

    Ok(ApiResponse::ok(serde_json::json!({
        "order_number": input.order_number,
        "courier_order_id": courier_ref,
    })))
}
