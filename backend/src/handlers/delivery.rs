//! HTTP handlers for delivery agent endpoints

use axum::{extract::State, Json};
use serde::Deserialize;
use uuid::Uuid;

use crate::error::AppResult;
use crate::handlers::ApiResponse;
use crate::middleware::{CurrentUser, Role};
use crate::services::fulfillment::{AgentProfile, DeliveryAssignment};
use crate::services::{FulfillmentService, NotificationService};
use crate::AppState;
use shared::NotificationKind;

/// Input for accept/complete actions
#[derive(Debug, Deserialize)]
pub struct DeliveryActionInput {
    pub order_id: Uuid,
}

/// Delivery agent accepts an unassigned order
pub async fn accept_order(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Json(input): Json<DeliveryActionInput>,
) -> AppResult<Json<ApiResponse<DeliveryAssignment>>> {
    current_user.0.require_role(Role::Delivery)?;
    let pool = state.tenants.resolve(current_user.0.tenant_id)?;

    let service = FulfillmentService::new(pool);
    let assignment = service
        .accept_order(current_user.0.user_id, input.order_id)
        .await?;

    Ok(ApiResponse::ok(assignment))
}

/// Delivery agent completes an assigned order
pub async fn complete_order(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Json(input): Json<DeliveryActionInput>,
) -> AppResult<Json<ApiResponse<serde_json::Value>>> {
    current_user.0.require_role(Role::Delivery)?;
    let pool = state.tenants.resolve(current_user.0.tenant_id)?;

    let service = FulfillmentService::new(pool.clone());
    let result = service
        .complete_order(current_user.0.user_id, input.order_id)
        .await?;

    // Post-commit, best-effort fan-out to customer and vendor
    let notifications = NotificationService::new(pool);
    notifications
        .fan_out_order_event(
            result.order_id,
            result.customer_id,
            result.shop_id,
            NotificationKind::DeliveryUpdate,
            &format!("Order {} has been delivered", result.order_number),
        )
        .await;

    Ok(ApiResponse::ok(serde_json::json!({
        "order_number": result.order_number,
        "status": result.status,
    })))
}

/// Delivery agent profile with lifetime counters
pub async fn get_agent_profile(
    State(state): State<AppState>,
    current_user: CurrentUser,
) -> AppResult<Json<ApiResponse<AgentProfile>>> {
    current_user.0.require_role(Role::Delivery)?;
    let pool = state.tenants.resolve(current_user.0.tenant_id)?;

    let service = FulfillmentService::new(pool);
    let profile = service.agent_profile(current_user.0.user_id).await?;

    Ok(ApiResponse::ok(profile))
}
