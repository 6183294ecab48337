//! Courier (last-mile delivery) integration
//!
//! Creates delivery orders with the third-party courier and defines the
//! webhook payload the courier posts back. The courier speaks its own
//! status vocabulary; [`map_courier_status`] is the single translation
//! point onto the internal order lifecycle.

use chrono::{DateTime, Utc};
use reqwest::Client;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::config::CourierConfig;
use crate::error::{AppError, AppResult};
use shared::OrderStatus;

/// Courier API client
#[derive(Clone)]
pub struct CourierClient {
    client: Client,
    base_url: String,
    api_key: String,
}

/// Delivery order registered with the courier
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CourierOrder {
    pub order_ref: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tracking_url: Option<String>,
}

/// Request to create a courier delivery
#[derive(Debug, Serialize)]
pub struct CreateDeliveryRequest {
    pub order_number: String,
    pub drop_address: shared::DeliveryAddress,
    pub amount: Decimal,
}

/// Webhook payload posted by the courier on status changes
#[derive(Debug, Clone, Deserialize)]
pub struct CourierWebhookPayload {
    /// Courier-side unique event id; dedup key for replays
    pub event_id: String,
    /// Courier's reference for the delivery order
    pub courier_order_id: String,
    /// Raw courier status vocabulary
    pub status: String,
    pub rider_name: Option<String>,
    pub rider_phone: Option<String>,
    pub location: Option<CourierLocation>,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CourierLocation {
    pub latitude: Decimal,
    pub longitude: Decimal,
}

/// Map the courier status vocabulary onto the internal enum.
///
/// Unknown statuses return `None`; the webhook records them for audit but
/// performs no transition.
pub fn map_courier_status(raw: &str) -> Option<OrderStatus> {
    match raw {
        "order_accepted" | "rider_assigned" => Some(OrderStatus::OrderPlaced),
        "picked_up" | "in_transit" => Some(OrderStatus::Shipped),
        "delivered" => Some(OrderStatus::Delivered),
        "cancelled" | "returned" => Some(OrderStatus::Cancelled),
        _ => None,
    }
}

#[derive(Debug, Deserialize)]
struct CreateDeliveryResponse {
    order_id: String,
    tracking_url: Option<String>,
}

impl CourierClient {
    /// Build a client from configuration
    pub fn new(config: &CourierConfig) -> Result<Self, reqwest::Error> {
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(5))
            .timeout(Duration::from_secs(10))
            .build()?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
        })
    }

    /// Register a delivery order with the courier
    pub async fn create_delivery(
        &self,
        request: &CreateDeliveryRequest,
    ) -> AppResult<CourierOrder> {
        let response = self
            .client
            .post(format!("{}/v1/orders", self.base_url))
            .header("x-api-key", &self.api_key)
            .json(request)
            .send()
            .await
            .map_err(|e| AppError::Upstream(format!("courier create delivery: {}", e)))?;

        if !response.status().is_success() {
            return Err(AppError::Upstream(format!(
                "courier create delivery returned {}",
                response.status()
            )));
        }

        let body: CreateDeliveryResponse = response
            .json()
            .await
            .map_err(|e| AppError::Upstream(format!("courier response decode: {}", e)))?;

        Ok(CourierOrder {
            order_ref: body.order_id,
            tracking_url: body.tracking_url,
        })
    }
}
