//! Payment gateway client
//!
//! Creates gateway-side payment orders and verifies capture signatures.
//! Calls carry explicit timeouts so an unresponsive gateway never holds a
//! request (or a database transaction) open.

use base64::Engine;
use hmac::{Hmac, Mac};
use reqwest::Client;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use std::time::Duration;

use crate::config::GatewayConfig;
use crate::error::{AppError, AppResult};

type HmacSha256 = Hmac<Sha256>;

/// Payment gateway client
#[derive(Clone)]
pub struct GatewayClient {
    client: Client,
    base_url: String,
    key_id: String,
    secret: String,
}

/// Gateway-side payment order
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayOrder {
    pub id: String,
    pub amount_minor: i64,
    pub currency: String,
    pub status: String,
}

#[derive(Debug, Serialize)]
struct CreateOrderRequest<'a> {
    amount: i64,
    currency: &'a str,
    receipt: &'a str,
}

#[derive(Debug, Deserialize)]
struct CreateOrderResponse {
    id: String,
    amount: i64,
    currency: String,
    status: String,
}

impl GatewayClient {
    /// Build a client from configuration
    pub fn new(config: &GatewayConfig) -> Result<Self, reqwest::Error> {
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(5))
            .timeout(Duration::from_secs(10))
            .build()?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            key_id: config.key_id.clone(),
            secret: config.secret.clone(),
        })
    }

    /// Public key id exposed to clients for checkout
    pub fn key_id(&self) -> &str {
        &self.key_id
    }

    /// Create a payment order on the gateway.
    ///
    /// The gateway works in minor currency units; the decimal amount is
    /// converted here and nowhere else.
    pub async fn create_order(
        &self,
        amount: Decimal,
        currency: &str,
        receipt: &str,
    ) -> AppResult<GatewayOrder> {
        let amount_minor = (amount * Decimal::from(100))
            .trunc()
            .to_i64()
            .ok_or_else(|| AppError::ValidationError("Amount out of range".to_string()))?;

        let response = self
            .client
            .post(format!("{}/v1/orders", self.base_url))
            .basic_auth(&self.key_id, Some(&self.secret))
            .json(&CreateOrderRequest {
                amount: amount_minor,
                currency,
                receipt,
            })
            .send()
            .await
            .map_err(|e| AppError::Upstream(format!("gateway create order: {}", e)))?;

        if !response.status().is_success() {
            return Err(AppError::Upstream(format!(
                "gateway create order returned {}",
                response.status()
            )));
        }

        let body: CreateOrderResponse = response
            .json()
            .await
            .map_err(|e| AppError::Upstream(format!("gateway response decode: {}", e)))?;

        Ok(GatewayOrder {
            id: body.id,
            amount_minor: body.amount,
            currency: body.currency,
            status: body.status,
        })
    }

    /// Verify a capture signature.
    ///
    /// The gateway signs `"{order_ref}|{payment_ref}"` with the shared
    /// secret (HMAC-SHA256, base64). Comparison is constant-time via
    /// `Mac::verify_slice`.
    pub fn verify_signature(
        &self,
        gateway_order_ref: &str,
        gateway_payment_ref: &str,
        signature: &str,
    ) -> bool {
        verify_capture_signature(
            &self.secret,
            gateway_order_ref,
            gateway_payment_ref,
            signature,
        )
    }
}

/// Signature check, exposed for reuse and testing without a client
pub fn verify_capture_signature(
    secret: &str,
    gateway_order_ref: &str,
    gateway_payment_ref: &str,
    signature: &str,
) -> bool {
    let Ok(raw_signature) = base64::engine::general_purpose::STANDARD.decode(signature) else {
        return false;
    };

    let mut mac = match HmacSha256::new_from_slice(secret.as_bytes()) {
        Ok(mac) => mac,
        Err(_) => return false,
    };
    mac.update(gateway_order_ref.as_bytes());
    mac.update(b"|");
    mac.update(gateway_payment_ref.as_bytes());

    mac.verify_slice(&raw_signature).is_ok()
}
