//! HTTP handlers for payment endpoints

use axum::{extract::State, Json};

use crate::error::AppResult;
use crate::handlers::ApiResponse;
use crate::middleware::{CurrentUser, Role};
use crate::services::payments::{
    CaptureOutcome, CreatePaymentInput, PaymentIntent, VerifyPaymentInput,
};
use crate::services::{NotificationService, PaymentService};
use crate::AppState;
use shared::NotificationKind;

/// Create a gateway payment order for an internal order
pub async fn create_payment_order(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Json(input): Json<CreatePaymentInput>,
) -> AppResult<Json<ApiResponse<PaymentIntent>>> {
    current_user.0.require_role(Role::Customer)?;
    let pool = state.tenants.resolve(current_user.0.tenant_id)?;

    let service = PaymentService::new(pool);
    let intent = service.create_intent(&state.gateway, input).await?;

    Ok(ApiResponse::ok(intent))
}

/// Verify a gateway capture signature and settle the payment
pub async fn verify_payment(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Json(input): Json<VerifyPaymentInput>,
) -> AppResult<Json<ApiResponse<CaptureOutcome>>> {
    let pool = state.tenants.resolve(current_user.0.tenant_id)?;
    let order_id = input.order_id;

    let service = PaymentService::new(pool.clone());
    let outcome = service.verify_and_capture(&state.gateway, input).await?;

    // Post-commit, best-effort customer notification; replays stay silent
    if let CaptureOutcome::Captured { customer_id } = &outcome {
        let notifications = NotificationService::new(pool);
        if let Err(e) = notifications
            .notify(
                *customer_id,
                Some(order_id),
                NotificationKind::PaymentReceived,
                "Payment received, your order is confirmed",
            )
            .await
        {
            tracing::warn!(%order_id, error = %e, "payment notification failed");
        }
    }

    Ok(ApiResponse::ok(outcome))
}
