//! Courier webhook handler
//!
//! Public endpoint the third-party courier posts status updates to. Must
//! acknowledge quickly and tolerate at-least-once delivery: ingestion is
//! idempotent on the courier event id, and server-side failures return 5xx
//! so the courier retries.

use axum::{extract::State, http::HeaderMap, Json};
use serde::Serialize;

use crate::error::AppResult;
use crate::external::courier::CourierWebhookPayload;
use crate::handlers::ApiResponse;
use crate::services::fulfillment::IngestOutcome;
use crate::services::{FulfillmentService, NotificationService};
use crate::AppState;
use shared::NotificationKind;

/// Acknowledgement returned to the courier
#[derive(Debug, Serialize)]
pub struct WebhookAck {
    pub outcome: &'static str,
}

/// Ingest a courier status callback
pub async fn courier_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(payload): Json<CourierWebhookPayload>,
) -> AppResult<Json<ApiResponse<WebhookAck>>> {
    // The courier carries no bearer token; tenant rides in a header and
    // falls back to the default deployment.
    let tenant_id = headers
        .get("x-tenant-id")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| uuid::Uuid::parse_str(v).ok());
    let pool = state.tenants.resolve_strict(tenant_id)?;

    let service = FulfillmentService::new(pool.clone());
    let outcome = service.ingest_courier_event(&payload).await?;

    let ack = match outcome {
        IngestOutcome::Applied {
            order_id,
            customer_id,
            shop_id,
            status,
        } => {
            // Post-commit, best-effort fan-out; replays never reach here
            let notifications = NotificationService::new(pool);
            notifications
                .fan_out_order_event(
                    order_id,
                    customer_id,
                    shop_id,
                    NotificationKind::DeliveryUpdate,
                    &format!("Delivery update: order is now {}", status),
                )
                .await;
            WebhookAck { outcome: "applied" }
        }
        IngestOutcome::Replayed => WebhookAck { outcome: "replayed" },
        IngestOutcome::RecordedOnly => WebhookAck { outcome: "recorded" },
    };

    Ok(ApiResponse::ok(ack))
}
