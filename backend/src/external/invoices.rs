//! Invoice rendering service client
//!
//! Renders an order invoice to PDF and stores it in object storage,
//! returning the public URL. Invoked post-commit and best-effort: a failed
//! render never fails the order.

use reqwest::Client;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::config::InvoiceConfig;
use crate::error::{AppError, AppResult};

/// Invoice service client
#[derive(Clone)]
pub struct InvoiceClient {
    client: Client,
    base_url: String,
}

/// Line as it appears on the invoice document
#[derive(Debug, Serialize)]
pub struct InvoiceLine {
    pub description: String,
    pub quantity: i32,
    pub unit_price: Decimal,
    pub line_total: Decimal,
}

/// Render request for one order
#[derive(Debug, Serialize)]
pub struct InvoiceRequest {
    pub order_number: String,
    pub lines: Vec<InvoiceLine>,
    pub subtotal: Decimal,
    pub discount: Decimal,
    pub tax: Decimal,
    pub shipping_fee: Decimal,
    pub grand_total: Decimal,
}

#[derive(Debug, Deserialize)]
struct InvoiceResponse {
    url: String,
}

impl InvoiceClient {
    /// Build a client from configuration
    pub fn new(config: &InvoiceConfig) -> Result<Self, reqwest::Error> {
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(5))
            .timeout(Duration::from_secs(15))
            .build()?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
        })
    }

    /// Render and store the invoice, returning its URL
    pub async fn render(&self, request: &InvoiceRequest) -> AppResult<String> {
        let response = self
            .client
            .post(format!("{}/v1/invoices", self.base_url))
            .json(request)
            .send()
            .await
            .map_err(|e| AppError::Upstream(format!("invoice render: {}", e)))?;

        if !response.status().is_success() {
            return Err(AppError::Upstream(format!(
                "invoice render returned {}",
                response.status()
            )));
        }

        let body: InvoiceResponse = response
            .json()
            .await
            .map_err(|e| AppError::Upstream(format!("invoice response decode: {}", e)))?;

        Ok(body.url)
    }
}
