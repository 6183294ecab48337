//! Fulfillment state machine
//!
//! Advances orders through the vendor / delivery-agent / courier lifecycle.
//! Every transition runs in its own transaction against a locked order row;
//! courier webhook ingestion is idempotent on the courier event id.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Serialize;
use sqlx::{PgConnection, PgPool};
use uuid::Uuid;

use crate::error::{AppError, AppResult};
use crate::external::courier::{
    map_courier_status, CourierClient, CourierWebhookPayload, CreateDeliveryRequest,
};
use crate::services::inventory;
use shared::{AgentStatus, DeliveryAddress, OrderStatus, StatusHistory};

/// Fulfillment service for order status transitions
#[derive(Clone)]
pub struct FulfillmentService {
    db: PgPool,
}

/// Locked order fields needed for a transition
#[derive(Debug, sqlx::FromRow)]
struct OrderForTransition {
    id: Uuid,
    customer_id: Uuid,
    shop_id: Uuid,
    status: String,
    status_history: serde_json::Value,
    delivery_agent_id: Option<Uuid>,
    shipping_fee: Decimal,
}

impl OrderForTransition {
    fn status(&self) -> AppResult<OrderStatus> {
        self.status
            .parse::<OrderStatus>()
            .map_err(|_| AppError::Integrity(format!("order {} has unknown status", self.id)))
    }

    fn history(&self) -> AppResult<StatusHistory> {
        serde_json::from_value(self.status_history.clone())
            .map_err(|e| AppError::Integrity(format!("order {} history decode: {}", self.id, e)))
    }
}

/// Result of a status transition
#[derive(Debug, Serialize)]
pub struct TransitionResult {
    pub order_id: Uuid,
    pub order_number: String,
    pub status: OrderStatus,
    pub customer_id: Uuid,
    pub shop_id: Uuid,
}

/// Outcome of a courier webhook ingestion
#[derive(Debug, PartialEq, Eq)]
pub enum IngestOutcome {
    /// Event applied; notification fan-out should follow
    Applied {
        order_id: Uuid,
        customer_id: Uuid,
        shop_id: Uuid,
        status: OrderStatus,
    },
    /// Same event already processed, nothing changed
    Replayed,
    /// Event recorded for audit only (unknown or non-advancing status)
    RecordedOnly,
}

/// Delivery assignment as exposed through the API
#[derive(Debug, Serialize, sqlx::FromRow)]
pub struct DeliveryAssignment {
    pub id: Uuid,
    pub order_id: Uuid,
    pub agent_id: Uuid,
    pub accepted_at: DateTime<Utc>,
    pub delivered_at: Option<DateTime<Utc>>,
    pub earning: Decimal,
}

/// Delivery agent profile with lifetime counters
#[derive(Debug, Serialize, sqlx::FromRow)]
pub struct AgentProfile {
    pub id: Uuid,
    pub name: String,
    pub phone: String,
    pub status: String,
    pub total_deliveries: i64,
    pub total_earnings: Decimal,
}

impl FulfillmentService {
    /// Create a new FulfillmentService instance
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }

    /// Vendor-initiated status update.
    ///
    /// Only the owning shop may move its orders; an order number belonging
    /// to another shop is indistinguishable from a missing one. Transitions
    /// must follow the monotonic graph; cancelling a pre-shipment order
    /// releases its reserved stock in the same transaction.
    pub async fn update_status(
        &self,
        shop_id: Uuid,
        order_number: &str,
        new_status: OrderStatus,
    ) -> AppResult<TransitionResult> {
        let mut tx = self.db.begin().await?;

        let order = sqlx::query_as::<_, OrderForTransition>(
            r#"
            SELECT id, customer_id, shop_id, status, status_history,
                   delivery_agent_id, shipping_fee
            FROM orders
            WHERE order_number = $1 AND shop_id = $2
            FOR UPDATE
            "#,
        )
        .bind(order_number)
        .bind(shop_id)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or_else(|| AppError::NotFound("Order".to_string()))?;

        let current = order.status()?;
        if !current.can_transition_to(new_status) {
            return Err(AppError::InvalidStateTransition(format!(
                "cannot move order {} from {} to {}",
                order_number, current, new_status
            )));
        }

        if new_status == OrderStatus::Cancelled && current.is_pre_shipment() {
            restock_order_items(&mut tx, order.id).await?;
        }

        let now = Utc::now();
        let mut history = order.history()?;
        history.append(new_status, now);

        apply_status(&mut tx, order.id, new_status, &history, now).await?;

        tx.commit().await?;

        tracing::info!(%order_number, from = %current, to = %new_status, "order status updated");

        Ok(TransitionResult {
            order_id: order.id,
            order_number: order_number.to_string(),
            status: new_status,
            customer_id: order.customer_id,
            shop_id: order.shop_id,
        })
    }

    /// Register the order with the third-party courier.
    ///
    /// The courier call runs outside any database transaction; the returned
    /// reference is stored afterwards in a single statement.
    pub async fn dispatch_courier(
        &self,
        courier: &CourierClient,
        shop_id: Uuid,
        order_number: &str,
    ) -> AppResult<String> {
        #[derive(sqlx::FromRow)]
        struct DispatchRow {
            status: String,
            courier_order_id: Option<String>,
            delivery_address: serde_json::Value,
            grand_total: Decimal,
        }

        let row = sqlx::query_as::<_, DispatchRow>(
            r#"
            SELECT status, courier_order_id, delivery_address, grand_total
            FROM orders
            WHERE order_number = $1 AND shop_id = $2
            "#,
        )
        .bind(order_number)
        .bind(shop_id)
        .fetch_optional(&self.db)
        .await?
        .ok_or_else(|| AppError::NotFound("Order".to_string()))?;

        if let Some(existing) = row.courier_order_id {
            return Ok(existing);
        }

        let status = row
            .status
            .parse::<OrderStatus>()
            .map_err(|_| AppError::Integrity(format!("order {} has unknown status", order_number)))?;
        if status != OrderStatus::OrderPlaced {
            return Err(AppError::InvalidStateTransition(format!(
                "order {} is {}, only confirmed orders can be dispatched",
                order_number, status
            )));
        }

        let drop_address: DeliveryAddress = serde_json::from_value(row.delivery_address)
            .map_err(|e| AppError::Integrity(format!("order {} address decode: {}", order_number, e)))?;

        let courier_order = courier
            .create_delivery(&CreateDeliveryRequest {
                order_number: order_number.to_string(),
                drop_address,
                amount: row.grand_total,
            })
            .await?;

        sqlx::query(
            "UPDATE orders SET courier_order_id = $1, updated_at = NOW() WHERE order_number = $2",
        )
        .bind(&courier_order.order_ref)
        .bind(order_number)
        .execute(&self.db)
        .await?;

        Ok(courier_order.order_ref)
    }

    /// Delivery agent accepts an unassigned order.
    ///
    /// The conditional update on `delivery_agent_id IS NULL` is the race
    /// guard: of two concurrent accepts exactly one sees a row affected,
    /// the other gets `OrderAlreadyAssigned`.
    pub async fn accept_order(&self, agent_id: Uuid, order_id: Uuid) -> AppResult<DeliveryAssignment> {
        let mut tx = self.db.begin().await?;

        let agent_status = sqlx::query_scalar::<_, String>(
            "SELECT status FROM delivery_agents WHERE id = $1 FOR UPDATE",
        )
        .bind(agent_id)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or_else(|| AppError::NotFound("Delivery agent".to_string()))?;

        if agent_status != AgentStatus::Available.as_str() {
            return Err(AppError::ValidationError(
                "Agent is not available for new deliveries".to_string(),
            ));
        }

        // Existence and state checks first, so a missing order is NotFound
        // rather than a lost race.
        #[derive(sqlx::FromRow)]
        struct AcceptRow {
            status: String,
            delivery_agent_id: Option<Uuid>,
        }

        let order = sqlx::query_as::<_, AcceptRow>(
            "SELECT status, delivery_agent_id FROM orders WHERE id = $1",
        )
        .bind(order_id)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or_else(|| AppError::NotFound("Order".to_string()))?;

        if order.delivery_agent_id.is_some() {
            return Err(AppError::OrderAlreadyAssigned);
        }

        let status = order
            .status
            .parse::<OrderStatus>()
            .map_err(|_| AppError::Integrity(format!("order {} has unknown status", order_id)))?;
        if status.is_terminal() {
            return Err(AppError::InvalidStateTransition(format!(
                "order {} is {}, not deliverable",
                order_id, status
            )));
        }

        let claimed = sqlx::query(
            "UPDATE orders SET delivery_agent_id = $1, updated_at = NOW() \
             WHERE id = $2 AND delivery_agent_id IS NULL",
        )
        .bind(agent_id)
        .bind(order_id)
        .execute(&mut *tx)
        .await?;

        if claimed.rows_affected() == 0 {
            return Err(AppError::OrderAlreadyAssigned);
        }

        let assignment = sqlx::query_as::<_, DeliveryAssignment>(
            r#"
            INSERT INTO delivery_assignments (order_id, agent_id)
            VALUES ($1, $2)
            RETURNING id, order_id, agent_id, accepted_at, delivered_at, earning
            "#,
        )
        .bind(order_id)
        .bind(agent_id)
        .fetch_one(&mut *tx)
        .await?;

        sqlx::query("UPDATE delivery_agents SET status = $1 WHERE id = $2")
            .bind(AgentStatus::OnDelivery.as_str())
            .bind(agent_id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;

        tracing::info!(%order_id, %agent_id, "delivery accepted");

        Ok(assignment)
    }

    /// Delivery agent completes a delivery they own.
    ///
    /// Marks the order delivered, stamps the assignment, credits the agent
    /// with the shipping fee and frees them for new work.
    pub async fn complete_order(&self, agent_id: Uuid, order_id: Uuid) -> AppResult<TransitionResult> {
        let mut tx = self.db.begin().await?;

        let order = sqlx::query_as::<_, OrderForTransition>(
            r#"
            SELECT id, customer_id, shop_id, status, status_history,
                   delivery_agent_id, shipping_fee
            FROM orders
            WHERE id = $1
            FOR UPDATE
            "#,
        )
        .bind(order_id)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or_else(|| AppError::NotFound("Order".to_string()))?;

        if order.delivery_agent_id != Some(agent_id) {
            return Err(AppError::Forbidden(
                "Order is not assigned to this agent".to_string(),
            ));
        }

        let current = order.status()?;
        if !current.can_transition_to(OrderStatus::Delivered) {
            return Err(AppError::InvalidStateTransition(format!(
                "cannot complete order {} from {}",
                order_id, current
            )));
        }

        // Assignment must exist for an assigned order
        let assignment_id = sqlx::query_scalar::<_, Uuid>(
            "SELECT id FROM delivery_assignments \
             WHERE order_id = $1 AND agent_id = $2 AND delivered_at IS NULL \
             FOR UPDATE",
        )
        .bind(order_id)
        .bind(agent_id)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or_else(|| {
            AppError::Integrity(format!("no open assignment for order {}", order_id))
        })?;

        let now = Utc::now();
        let earning = order.shipping_fee;
        let mut history = order.history()?;
        history.append(OrderStatus::Delivered, now);

        apply_status(&mut tx, order.id, OrderStatus::Delivered, &history, now).await?;

        sqlx::query(
            "UPDATE delivery_assignments SET delivered_at = $1, earning = $2 WHERE id = $3",
        )
        .bind(now)
        .bind(earning)
        .bind(assignment_id)
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            r#"
            UPDATE delivery_agents
            SET status = $1,
                total_deliveries = total_deliveries + 1,
                total_earnings = total_earnings + $2
            WHERE id = $3
            "#,
        )
        .bind(AgentStatus::Available.as_str())
        .bind(earning)
        .bind(agent_id)
        .execute(&mut *tx)
        .await?;

        let order_number = sqlx::query_scalar::<_, String>(
            "SELECT order_number FROM orders WHERE id = $1",
        )
        .bind(order_id)
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;

        tracing::info!(%order_id, %agent_id, "delivery completed");

        Ok(TransitionResult {
            order_id: order.id,
            order_number,
            status: OrderStatus::Delivered,
            customer_id: order.customer_id,
            shop_id: order.shop_id,
        })
    }

    /// Delivery agent profile with lifetime counters
    pub async fn agent_profile(&self, agent_id: Uuid) -> AppResult<AgentProfile> {
        sqlx::query_as::<_, AgentProfile>(
            r#"
            SELECT id, name, phone, status, total_deliveries, total_earnings
            FROM delivery_agents
            WHERE id = $1
            "#,
        )
        .bind(agent_id)
        .fetch_optional(&self.db)
        .await?
        .ok_or_else(|| AppError::NotFound("Delivery agent".to_string()))
    }

    /// Ingest a courier webhook event.
    ///
    /// Replays of the same `(order, event_id)` pair are detected via the
    /// courier_events dedup table and short-circuit without touching the
    /// order, its history, or notifications. Unknown courier statuses and
    /// non-advancing repeats are recorded for audit but drive no
    /// transition. The caller fans out notifications only for `Applied`
    /// outcomes.
    pub async fn ingest_courier_event(
        &self,
        event: &CourierWebhookPayload,
    ) -> AppResult<IngestOutcome> {
        let mut tx = self.db.begin().await?;

        let order = sqlx::query_as::<_, OrderForTransition>(
            r#"
            SELECT id, customer_id, shop_id, status, status_history,
                   delivery_agent_id, shipping_fee
            FROM orders
            WHERE courier_order_id = $1
            FOR UPDATE
            "#,
        )
        .bind(&event.courier_order_id)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or_else(|| AppError::NotFound("Order".to_string()))?;

        // Dedup: first writer records the event, replays see a conflict
        let recorded = sqlx::query(
            r#"
            INSERT INTO courier_events (order_id, external_event_id, raw_status, occurred_at)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (order_id, external_event_id) DO NOTHING
            "#,
        )
        .bind(order.id)
        .bind(&event.event_id)
        .bind(&event.status)
        .bind(event.occurred_at)
        .execute(&mut *tx)
        .await?;

        if recorded.rows_affected() == 0 {
            tracing::debug!(
                order_id = %order.id,
                event_id = %event.event_id,
                "courier event replayed, ignoring"
            );
            return Ok(IngestOutcome::Replayed);
        }

        // Rider contact/location updates apply for every fresh event
        sqlx::query(
            r#"
            UPDATE orders
            SET rider_name = COALESCE($1, rider_name),
                rider_phone = COALESCE($2, rider_phone),
                rider_latitude = COALESCE($3, rider_latitude),
                rider_longitude = COALESCE($4, rider_longitude),
                updated_at = NOW()
            WHERE id = $5
            "#,
        )
        .bind(&event.rider_name)
        .bind(&event.rider_phone)
        .bind(event.location.as_ref().map(|l| l.latitude))
        .bind(event.location.as_ref().map(|l| l.longitude))
        .bind(order.id)
        .execute(&mut *tx)
        .await?;

        let current = order.status()?;
        let Some(new_status) = map_courier_status(&event.status) else {
            tracing::warn!(
                order_id = %order.id,
                courier_status = %event.status,
                "unknown courier status, recorded for audit only"
            );
            tx.commit().await?;
            return Ok(IngestOutcome::RecordedOnly);
        };

        if !current.can_transition_to(new_status) {
            tracing::warn!(
                order_id = %order.id,
                from = %current,
                to = %new_status,
                courier_status = %event.status,
                "courier event does not advance order, recorded for audit only"
            );
            tx.commit().await?;
            return Ok(IngestOutcome::RecordedOnly);
        }

        let now = Utc::now();
        let mut history = order.history()?;
        history.append_courier(new_status, &event.status, now);

        apply_status(&mut tx, order.id, new_status, &history, now).await?;

        tx.commit().await?;

        tracing::info!(
            order_id = %order.id,
            courier_status = %event.status,
            status = %new_status,
            "courier event applied"
        );

        Ok(IngestOutcome::Applied {
            order_id: order.id,
            customer_id: order.customer_id,
            shop_id: order.shop_id,
            status: new_status,
        })
    }
}

/// Write a new status + history onto a locked order row
async fn apply_status(
    tx: &mut PgConnection,
    order_id: Uuid,
    status: OrderStatus,
    history: &StatusHistory,
    at: DateTime<Utc>,
) -> AppResult<()> {
    let history_json =
        serde_json::to_value(history).map_err(|e| AppError::Internal(e.to_string()))?;

    sqlx::query(
        r#"
        UPDATE orders
        SET status = $1,
            status_history = $2,
            updated_at = $3,
            delivered_at = CASE WHEN $1 = 'delivered' THEN $3 ELSE delivered_at END
        WHERE id = $4
        "#,
    )
    .bind(status.as_str())
    .bind(&history_json)
    .bind(at)
    .bind(order_id)
    .execute(&mut *tx)
    .await?;

    Ok(())
}

/// Return every line item's reserved stock on pre-shipment cancellation
async fn restock_order_items(tx: &mut PgConnection, order_id: Uuid) -> AppResult<()> {
    #[derive(sqlx::FromRow)]
    struct RestockRow {
        product_id: Uuid,
        variant_id: Option<Uuid>,
        quantity: i32,
    }

    let mut items = sqlx::query_as::<_, RestockRow>(
        "SELECT product_id, variant_id, quantity FROM order_items WHERE order_id = $1",
    )
    .bind(order_id)
    .fetch_all(&mut *tx)
    .await?;

    // Same ascending lock order as reservation
    items.sort_by_key(|item| (item.product_id, item.variant_id));

    for item in items {
        inventory::release(tx, item.product_id, item.variant_id, item.quantity).await?;
    }

    Ok(())
}
