//! Order lifecycle models
//!
//! The order status enums, the append-only status history, and the frozen
//! purchase-time product snapshot live here so every component mutating an
//! order speaks the same vocabulary.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::types::GpsCoordinates;

/// Lifecycle status of an order
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    Pending,
    OrderPlaced,
    Shipped,
    Delivered,
    Cancelled,
}

impl OrderStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderStatus::Pending => "pending",
            OrderStatus::OrderPlaced => "order_placed",
            OrderStatus::Shipped => "shipped",
            OrderStatus::Delivered => "delivered",
            OrderStatus::Cancelled => "cancelled",
        }
    }

    /// Delivered and cancelled orders accept no further transitions
    pub fn is_terminal(&self) -> bool {
        matches!(self, OrderStatus::Delivered | OrderStatus::Cancelled)
    }

    /// An order still awaiting handoff to the courier
    pub fn is_pre_shipment(&self) -> bool {
        matches!(self, OrderStatus::Pending | OrderStatus::OrderPlaced)
    }

    /// Whether `next` is a legal successor of the current status.
    ///
    /// Progression is monotonic: pending -> order_placed -> shipped ->
    /// delivered, with cancellation reachable from any non-terminal state.
    pub fn can_transition_to(&self, next: OrderStatus) -> bool {
        if next == OrderStatus::Cancelled {
            return !self.is_terminal();
        }
        matches!(
            (self, next),
            (OrderStatus::Pending, OrderStatus::OrderPlaced)
                | (OrderStatus::OrderPlaced, OrderStatus::Shipped)
                | (OrderStatus::Shipped, OrderStatus::Delivered)
        )
    }
}

impl std::fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for OrderStatus {
    type Err = &'static str;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(OrderStatus::Pending),
            "order_placed" => Ok(OrderStatus::OrderPlaced),
            "shipped" => Ok(OrderStatus::Shipped),
            "delivered" => Ok(OrderStatus::Delivered),
            "cancelled" => Ok(OrderStatus::Cancelled),
            _ => Err("unknown order status"),
        }
    }
}

/// Settlement status of an order's payment
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum PaymentStatus {
    Unpaid,
    Paid,
    Refunded,
}

impl PaymentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentStatus::Unpaid => "unpaid",
            PaymentStatus::Paid => "paid",
            PaymentStatus::Refunded => "refunded",
        }
    }
}

impl std::str::FromStr for PaymentStatus {
    type Err = &'static str;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "unpaid" => Ok(PaymentStatus::Unpaid),
            "paid" => Ok(PaymentStatus::Paid),
            "refunded" => Ok(PaymentStatus::Refunded),
            _ => Err("unknown payment status"),
        }
    }
}

/// How the customer pays for the order
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum PaymentMethod {
    CashOnDelivery,
    Online,
}

impl PaymentMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentMethod::CashOnDelivery => "cash_on_delivery",
            PaymentMethod::Online => "online",
        }
    }
}

impl std::str::FromStr for PaymentMethod {
    type Err = &'static str;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "cash_on_delivery" => Ok(PaymentMethod::CashOnDelivery),
            "online" => Ok(PaymentMethod::Online),
            _ => Err("unknown payment method"),
        }
    }
}

/// Delivery address captured at order time
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DeliveryAddress {
    pub street: String,
    pub city: String,
    pub state: String,
    pub postal_code: String,
    pub country: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub coordinates: Option<GpsCoordinates>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub instructions: Option<String>,
}

/// One entry in an order's status history
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StatusEvent {
    pub status: OrderStatus,
    /// Raw courier vocabulary when the transition came from a webhook
    #[serde(skip_serializing_if = "Option::is_none")]
    pub courier_status: Option<String>,
    pub at: DateTime<Utc>,
}

/// Append-only, ordered log of an order's status transitions.
///
/// The event vector is private: entries can be added but never edited or
/// removed, and serialization is the only way in or out of the database
/// column.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
#[serde(transparent)]
pub struct StatusHistory {
    events: Vec<StatusEvent>,
}

impl StatusHistory {
    /// History for a freshly created order
    pub fn starting_with(status: OrderStatus, at: DateTime<Utc>) -> Self {
        Self {
            events: vec![StatusEvent {
                status,
                courier_status: None,
                at,
            }],
        }
    }

    pub fn append(&mut self, status: OrderStatus, at: DateTime<Utc>) {
        self.events.push(StatusEvent {
            status,
            courier_status: None,
            at,
        });
    }

    /// Append a transition driven by a courier event, keeping the raw
    /// courier status string for audit.
    pub fn append_courier(&mut self, status: OrderStatus, raw: &str, at: DateTime<Utc>) {
        self.events.push(StatusEvent {
            status,
            courier_status: Some(raw.to_string()),
            at,
        });
    }

    pub fn current(&self) -> Option<&StatusEvent> {
        self.events.last()
    }

    pub fn events(&self) -> &[StatusEvent] {
        &self.events
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }
}

/// Frozen snapshot of a product (and variant) at purchase time.
///
/// Stored on the order line item so later catalog edits never alter
/// historical orders.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ProductSnapshot {
    pub product_id: Uuid,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub variant_id: Option<Uuid>,
    pub name: String,
    pub sku: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub variant_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,
    pub unit_price: Decimal,
}

/// Generate a human-readable order number.
///
/// Time-based prefix plus a random suffix; the suffix keeps collision
/// probability negligible for concurrent placements within one second.
pub fn generate_order_number(at: DateTime<Utc>, entropy: u32) -> String {
    format!("ORD-{}-{:06X}", at.format("%y%m%d%H%M%S"), entropy & 0x00FF_FFFF)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn forward_transitions_are_legal() {
        assert!(OrderStatus::Pending.can_transition_to(OrderStatus::OrderPlaced));
        assert!(OrderStatus::OrderPlaced.can_transition_to(OrderStatus::Shipped));
        assert!(OrderStatus::Shipped.can_transition_to(OrderStatus::Delivered));
    }

    #[test]
    fn backward_and_skipping_transitions_are_rejected() {
        assert!(!OrderStatus::Delivered.can_transition_to(OrderStatus::Pending));
        assert!(!OrderStatus::Pending.can_transition_to(OrderStatus::Shipped));
        assert!(!OrderStatus::Shipped.can_transition_to(OrderStatus::OrderPlaced));
        assert!(!OrderStatus::Pending.can_transition_to(OrderStatus::Pending));
    }

    #[test]
    fn cancellation_only_from_non_terminal() {
        assert!(OrderStatus::Pending.can_transition_to(OrderStatus::Cancelled));
        assert!(OrderStatus::Shipped.can_transition_to(OrderStatus::Cancelled));
        assert!(!OrderStatus::Delivered.can_transition_to(OrderStatus::Cancelled));
        assert!(!OrderStatus::Cancelled.can_transition_to(OrderStatus::Cancelled));
    }

    #[test]
    fn history_preserves_insertion_order() {
        let t0 = Utc.with_ymd_and_hms(2025, 3, 1, 12, 0, 0).unwrap();
        let t1 = t0 + chrono::Duration::minutes(5);
        let mut history = StatusHistory::starting_with(OrderStatus::Pending, t0);
        history.append(OrderStatus::OrderPlaced, t1);
        history.append_courier(OrderStatus::Shipped, "picked_up", t1);

        let events = history.events();
        assert_eq!(events.len(), 3);
        assert_eq!(events[0].status, OrderStatus::Pending);
        assert_eq!(events[2].courier_status.as_deref(), Some("picked_up"));
        assert_eq!(history.current().unwrap().status, OrderStatus::Shipped);
    }

    #[test]
    fn history_round_trips_through_json() {
        let t0 = Utc.with_ymd_and_hms(2025, 3, 1, 12, 0, 0).unwrap();
        let history = StatusHistory::starting_with(OrderStatus::Pending, t0);
        let json = serde_json::to_value(&history).unwrap();
        assert!(json.is_array());
        let back: StatusHistory = serde_json::from_value(json).unwrap();
        assert_eq!(back, history);
    }

    #[test]
    fn order_number_embeds_timestamp_and_suffix() {
        let at = Utc.with_ymd_and_hms(2025, 3, 1, 12, 30, 45).unwrap();
        let number = generate_order_number(at, 0xABCDEF);
        assert_eq!(number, "ORD-250301123045-ABCDEF");
    }

    #[test]
    fn order_number_suffix_is_masked_to_24_bits() {
        let at = Utc.with_ymd_and_hms(2025, 3, 1, 0, 0, 0).unwrap();
        let a = generate_order_number(at, 0xFF_ABCDEF);
        let b = generate_order_number(at, 0x00_ABCDEF);
        assert_eq!(a, b);
    }
}
