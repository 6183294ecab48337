//! HTTP handlers for notification endpoints

use axum::{
    extract::{Path, Query, State},
    Json,
};
use serde::Deserialize;
use uuid::Uuid;

use crate::error::AppResult;
use crate::handlers::ApiResponse;
use crate::middleware::CurrentUser;
use crate::services::notifications::Notification;
use crate::services::NotificationService;
use crate::AppState;

/// Query parameters for the notification listing
#[derive(Debug, Default, Deserialize)]
pub struct NotificationQuery {
    #[serde(default)]
    pub unread: bool,
}

/// List the authenticated user's notifications
pub async fn list_notifications(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Query(query): Query<NotificationQuery>,
) -> AppResult<Json<ApiResponse<Vec<Notification>>>> {
    let pool = state.tenants.resolve(current_user.0.tenant_id)?;

    let service = NotificationService::new(pool);
    let notifications = service.list(current_user.0.user_id, query.unread).await?;

    Ok(ApiResponse::ok(notifications))
}

/// Mark one notification as read
pub async fn mark_notification_read(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Path(notification_id): Path<Uuid>,
) -> AppResult<Json<ApiResponse<()>>> {
    let pool = state.tenants.resolve(current_user.0.tenant_id)?;

    let service = NotificationService::new(pool);
    service
        .mark_read(current_user.0.user_id, notification_id)
        .await?;

    Ok(ApiResponse::ok(()))
}
