//! Notification service
//!
//! In-app notification rows written on order lifecycle events. Callers
//! treat writes as best-effort fan-out: a failed insert is logged and never
//! aborts the transition that triggered it.

use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::PgPool;
use uuid::Uuid;

use crate::error::{AppError, AppResult};
use shared::NotificationKind;

/// Notification service
#[derive(Clone)]
pub struct NotificationService {
    db: PgPool,
}

/// Notification record
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct Notification {
    pub id: Uuid,
    pub user_id: Uuid,
    pub order_id: Option<Uuid>,
    pub kind: String,
    pub body: String,
    pub is_read: bool,
    pub created_at: DateTime<Utc>,
}

impl NotificationService {
    /// Create a new NotificationService instance
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }

    /// Record a notification for a user
    pub async fn notify(
        &self,
        user_id: Uuid,
        order_id: Option<Uuid>,
        kind: NotificationKind,
        body: &str,
    ) -> AppResult<Notification> {
        let notification = sqlx::query_as::<_, Notification>(
            r#"
            INSERT INTO notifications (user_id, order_id, kind, body)
            VALUES ($1, $2, $3, $4)
            RETURNING id, user_id, order_id, kind, body, is_read, created_at
            "#,
        )
        .bind(user_id)
        .bind(order_id)
        .bind(kind.as_str())
        .bind(body)
        .fetch_one(&self.db)
        .await?;

        Ok(notification)
    }

    /// Notify the customer and the shop owner about an order event.
    ///
    /// Best-effort: each failed insert is logged and skipped.
    pub async fn fan_out_order_event(
        &self,
        order_id: Uuid,
        customer_id: Uuid,
        shop_id: Uuid,
        kind: NotificationKind,
        body: &str,
    ) {
        if let Err(e) = self.notify(customer_id, Some(order_id), kind, body).await {
            tracing::warn!(%order_id, error = %e, "customer notification failed");
        }

        match self.shop_owner(shop_id).await {
            Ok(owner_id) => {
                if let Err(e) = self.notify(owner_id, Some(order_id), kind, body).await {
                    tracing::warn!(%order_id, error = %e, "vendor notification failed");
                }
            }
            Err(e) => {
                tracing::warn!(%shop_id, error = %e, "shop owner lookup failed");
            }
        }
    }

    /// List a user's notifications, newest first
    pub async fn list(&self, user_id: Uuid, unread_only: bool) -> AppResult<Vec<Notification>> {
        let notifications = sqlx::query_as::<_, Notification>(
            r#"
            SELECT id, user_id, order_id, kind, body, is_read, created_at
            FROM notifications
            WHERE user_id = $1 AND ($2 = false OR is_read = false)
            ORDER BY created_at DESC
            LIMIT 100
            "#,
        )
        .bind(user_id)
        .bind(unread_only)
        .fetch_all(&self.db)
        .await?;

        Ok(notifications)
    }

    /// Mark one notification as read
    pub async fn mark_read(&self, user_id: Uuid, notification_id: Uuid) -> AppResult<()> {
        let result = sqlx::query(
            "UPDATE notifications SET is_read = true WHERE id = $1 AND user_id = $2",
        )
        .bind(notification_id)
        .bind(user_id)
        .execute(&self.db)
        .await?;

        if result.rows_affected() == 0 {
            return Err(AppError::NotFound("Notification".to_string()));
        }

        Ok(())
    }

    async fn shop_owner(&self, shop_id: Uuid) -> AppResult<Uuid> {
        sqlx::query_scalar::<_, Uuid>("SELECT owner_id FROM shops WHERE id = $1")
            .bind(shop_id)
            .fetch_optional(&self.db)
            .await?
            .ok_or_else(|| AppError::NotFound("Shop".to_string()))
    }
}
