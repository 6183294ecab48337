//! Notification models

use serde::{Deserialize, Serialize};

/// What a notification is about
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum NotificationKind {
    OrderPlaced,
    OrderStatusChanged,
    PaymentReceived,
    DeliveryUpdate,
}

impl NotificationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            NotificationKind::OrderPlaced => "order_placed",
            NotificationKind::OrderStatusChanged => "order_status_changed",
            NotificationKind::PaymentReceived => "payment_received",
            NotificationKind::DeliveryUpdate => "delivery_update",
        }
    }
}
