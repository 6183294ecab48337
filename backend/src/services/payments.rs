//! Payment reconciliation
//!
//! Binds gateway-side payment orders to internal orders and settles them
//! exactly once. Signature verification is constant-time; capture is a
//! single transaction covering both the payment row and the order row, so
//! a partial settlement can never be observed.

use chrono::Utc;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use uuid::Uuid;

use crate::error::{AppError, AppResult};
use crate::external::gateway::{GatewayClient, GatewayOrder};
use shared::{validate_amount, validate_currency, OrderStatus, PaymentStatus, StatusHistory};

/// Payment service
#[derive(Clone)]
pub struct PaymentService {
    db: PgPool,
}

/// Input for creating a payment intent
#[derive(Debug, Deserialize)]
pub struct CreatePaymentInput {
    pub order_id: Uuid,
    pub amount: Decimal,
    pub currency: String,
}

/// Gateway order handed back to the client for checkout
#[derive(Debug, Serialize)]
pub struct PaymentIntent {
    pub gateway_order: GatewayOrder,
    /// Public key id the client passes to the gateway SDK
    pub key_id: String,
}

/// Input for verifying and capturing a payment
#[derive(Debug, Deserialize)]
pub struct VerifyPaymentInput {
    pub gateway_order_id: String,
    pub gateway_payment_id: String,
    pub signature: String,
    pub order_id: Uuid,
}

/// Result of a capture attempt
#[derive(Debug, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case", tag = "outcome")]
pub enum CaptureOutcome {
    /// Payment settled by this call
    Captured { customer_id: Uuid },
    /// Same capture already settled earlier; replay is a no-op success
    AlreadyCaptured,
}

impl PaymentService {
    /// Create a new PaymentService instance
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }

    /// Create a gateway payment order for an internal order.
    ///
    /// The gateway call happens before any database write and outside any
    /// transaction; a gateway failure leaves no local state behind.
    pub async fn create_intent(
        &self,
        gateway: &GatewayClient,
        input: CreatePaymentInput,
    ) -> AppResult<PaymentIntent> {
        validate_amount(input.amount).map_err(|e| AppError::Validation {
            field: "amount".to_string(),
            message: e.to_string(),
        })?;
        validate_currency(&input.currency).map_err(|e| AppError::Validation {
            field: "currency".to_string(),
            message: e.to_string(),
        })?;

        let order_number = sqlx::query_scalar::<_, String>(
            "SELECT order_number FROM orders WHERE id = $1",
        )
        .bind(input.order_id)
        .fetch_optional(&self.db)
        .await?
        .ok_or_else(|| AppError::NotFound("Order".to_string()))?;

        let gateway_order = gateway
            .create_order(input.amount, &input.currency, &order_number)
            .await?;

        sqlx::query(
            r#"
            INSERT INTO payment_transactions (order_id, gateway_order_id, amount, currency, status)
            VALUES ($1, $2, $3, $4, 'created')
            "#,
        )
        .bind(input.order_id)
        .bind(&gateway_order.id)
        .bind(input.amount)
        .bind(&input.currency)
        .execute(&self.db)
        .await?;

        tracing::info!(
            order_id = %input.order_id,
            gateway_order_id = %gateway_order.id,
            "payment intent created"
        );

        Ok(PaymentIntent {
            gateway_order,
            key_id: gateway.key_id().to_string(),
        })
    }

    /// Verify a gateway capture signature and settle the payment.
    ///
    /// A signature mismatch changes nothing. On a valid signature the
    /// payment transaction moves `created -> paid` and the order becomes
    /// paid/confirmed in the same database transaction. A replay of an
    /// already-settled capture returns success without writing.
    pub async fn verify_and_capture(
        &self,
        gateway: &GatewayClient,
        input: VerifyPaymentInput,
    ) -> AppResult<CaptureOutcome> {
        if !gateway.verify_signature(
            &input.gateway_order_id,
            &input.gateway_payment_id,
            &input.signature,
        ) {
            return Err(AppError::InvalidSignature);
        }

        let mut tx = self.db.begin().await?;

        #[derive(sqlx::FromRow)]
        struct TxnRow {
            id: Uuid,
            status: String,
            gateway_payment_id: Option<String>,
        }

        let txn = sqlx::query_as::<_, TxnRow>(
            r#"
            SELECT id, status, gateway_payment_id
            FROM payment_transactions
            WHERE gateway_order_id = $1 AND order_id = $2
            FOR UPDATE
            "#,
        )
        .bind(&input.gateway_order_id)
        .bind(input.order_id)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or_else(|| AppError::NotFound("Payment transaction".to_string()))?;

        if txn.status == "paid" {
            return if txn.gateway_payment_id.as_deref() == Some(input.gateway_payment_id.as_str()) {
                tracing::debug!(
                    gateway_order_id = %input.gateway_order_id,
                    "capture replayed, already settled"
                );
                Ok(CaptureOutcome::AlreadyCaptured)
            } else {
                Err(AppError::DuplicateCapture(input.gateway_order_id.clone()))
            };
        }

        let now = Utc::now();

        sqlx::query(
            r#"
            UPDATE payment_transactions
            SET status = 'paid', gateway_payment_id = $1, settled_at = $2
            WHERE id = $3 AND status = 'created'
            "#,
        )
        .bind(&input.gateway_payment_id)
        .bind(now)
        .bind(txn.id)
        .execute(&mut *tx)
        .await?;

        // The order row this transaction points at must exist
        #[derive(sqlx::FromRow)]
        struct OrderRow {
            customer_id: Uuid,
            status: String,
            status_history: serde_json::Value,
        }

        let order = sqlx::query_as::<_, OrderRow>(
            "SELECT customer_id, status, status_history FROM orders WHERE id = $1 FOR UPDATE",
        )
        .bind(input.order_id)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or_else(|| {
            AppError::Integrity(format!(
                "payment transaction references missing order {}",
                input.order_id
            ))
        })?;

        let current = order.status.parse::<OrderStatus>().map_err(|_| {
            AppError::Integrity(format!("order {} has unknown status", input.order_id))
        })?;

        // Payment confirmation moves a pending order forward; an order the
        // vendor already progressed keeps its status.
        let (new_status, history_json) = if current.can_transition_to(OrderStatus::OrderPlaced) {
            let mut history: StatusHistory = serde_json::from_value(order.status_history)
                .map_err(|e| {
                    AppError::Integrity(format!("order {} history decode: {}", input.order_id, e))
                })?;
            history.append(OrderStatus::OrderPlaced, now);
            let json = serde_json::to_value(&history)
                .map_err(|e| AppError::Internal(e.to_string()))?;
            (OrderStatus::OrderPlaced, Some(json))
        } else {
            (current, None)
        };

        match history_json {
            Some(history_json) => {
                sqlx::query(
                    r#"
                    UPDATE orders
                    SET payment_status = $1, status = $2, status_history = $3, updated_at = $4
                    WHERE id = $5
                    "#,
                )
                .bind(PaymentStatus::Paid.as_str())
                .bind(new_status.as_str())
                .bind(&history_json)
                .bind(now)
                .bind(input.order_id)
                .execute(&mut *tx)
                .await?;
            }
            None => {
                sqlx::query(
                    "UPDATE orders SET payment_status = $1, updated_at = $2 WHERE id = $3",
                )
                .bind(PaymentStatus::Paid.as_str())
                .bind(now)
                .bind(input.order_id)
                .execute(&mut *tx)
                .await?;
            }
        }

        tx.commit().await?;

        tracing::info!(
            order_id = %input.order_id,
            gateway_payment_id = %input.gateway_payment_id,
            "payment captured"
        );

        Ok(CaptureOutcome::Captured {
            customer_id: order.customer_id,
        })
    }
}
