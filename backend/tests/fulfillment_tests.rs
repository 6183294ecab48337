//! Fulfillment state machine tests
//!
//! Tests for order lifecycle transitions including:
//! - Monotonic status progression with cancellation from non-terminal states
//! - At-most-one delivery assignment under concurrent accepts
//! - Idempotent courier webhook ingestion
//! - Append-only status history ordering

use proptest::prelude::*;
use std::collections::HashSet;

use chrono::{TimeZone, Utc};
use shared::{OrderStatus, StatusHistory};

const ALL_STATUSES: [OrderStatus; 5] = [
    OrderStatus::Pending,
    OrderStatus::OrderPlaced,
    OrderStatus::Shipped,
    OrderStatus::Delivered,
    OrderStatus::Cancelled,
];

/// Conditional assignment mirroring
/// `UPDATE orders SET delivery_agent_id = $1 WHERE ... agent IS NULL`:
/// the first writer wins, later writers observe the existing assignee.
fn try_assign(slot: &mut Option<u32>, agent: u32) -> Result<(), &'static str> {
    match slot {
        None => {
            *slot = Some(agent);
            Ok(())
        }
        Some(_) => Err("order already assigned"),
    }
}

/// Webhook ingestion keyed on (order, event id): replays are dropped before
/// any history append.
struct WebhookLedger {
    seen: HashSet<(u32, String)>,
    history: StatusHistory,
    status: OrderStatus,
    notifications: u32,
}

impl WebhookLedger {
    fn new() -> Self {
        Self {
            seen: HashSet::new(),
            history: StatusHistory::starting_with(
                OrderStatus::Pending,
                Utc.with_ymd_and_hms(2025, 3, 1, 8, 0, 0).unwrap(),
            ),
            status: OrderStatus::Pending,
            notifications: 0,
        }
    }

    fn ingest(&mut self, order: u32, event_id: &str, raw_status: &str) {
        if !self.seen.insert((order, event_id.to_string())) {
            return; // replay
        }
        let Some(new_status) = map_status(raw_status) else {
            return; // unknown vocabulary, audit only
        };
        if !self.status.can_transition_to(new_status) {
            return; // non-advancing event, audit only
        }
        self.history.append_courier(new_status, raw_status, Utc::now());
        self.status = new_status;
        self.notifications += 1;
    }
}

/// Courier vocabulary mapping mirrored from the courier integration
fn map_status(raw: &str) -> Option<OrderStatus> {
    match raw {
        "order_accepted" | "rider_assigned" => Some(OrderStatus::OrderPlaced),
        "picked_up" | "in_transit" => Some(OrderStatus::Shipped),
        "delivered" => Some(OrderStatus::Delivered),
        "cancelled" | "returned" => Some(OrderStatus::Cancelled),
        _ => None,
    }
}

// ============================================================================
// Unit Tests
// ============================================================================

#[cfg(test)]
mod unit_tests {
    use super::*;

    /// The full happy path is legal step by step
    #[test]
    fn test_happy_path_transitions() {
        let path = [
            OrderStatus::Pending,
            OrderStatus::OrderPlaced,
            OrderStatus::Shipped,
            OrderStatus::Delivered,
        ];
        for pair in path.windows(2) {
            assert!(pair[0].can_transition_to(pair[1]), "{:?} -> {:?}", pair[0], pair[1]);
        }
    }

    /// Terminal states accept nothing further
    #[test]
    fn test_terminal_states_are_final() {
        for terminal in [OrderStatus::Delivered, OrderStatus::Cancelled] {
            for next in ALL_STATUSES {
                assert!(!terminal.can_transition_to(next), "{:?} -> {:?}", terminal, next);
            }
        }
    }

    /// Regression of the free-form vendor override: delivered -> pending
    /// must be rejected
    #[test]
    fn test_backward_override_rejected() {
        assert!(!OrderStatus::Delivered.can_transition_to(OrderStatus::Pending));
        assert!(!OrderStatus::Shipped.can_transition_to(OrderStatus::Pending));
    }

    /// Two agents accepting the same order: exactly one wins
    #[test]
    fn test_at_most_one_assignment() {
        let mut slot: Option<u32> = None;
        let first = try_assign(&mut slot, 7);
        let second = try_assign(&mut slot, 9);

        assert!(first.is_ok());
        assert_eq!(second, Err("order already assigned"));
        assert_eq!(slot, Some(7));
    }

    /// The courier delivering the same "delivered" event twice yields one
    /// history entry and one notification
    #[test]
    fn test_webhook_replay_is_idempotent() {
        let mut ledger = WebhookLedger::new();
        ledger.ingest(1, "evt-accept", "order_accepted");
        ledger.ingest(1, "evt-pickup", "picked_up");
        let history_before = ledger.history.len();
        let notified_before = ledger.notifications;

        ledger.ingest(1, "evt-final", "delivered");
        ledger.ingest(1, "evt-final", "delivered");

        assert_eq!(ledger.history.len(), history_before + 1);
        assert_eq!(ledger.notifications, notified_before + 1);
        assert_eq!(ledger.status, OrderStatus::Delivered);
    }

    /// Unknown courier vocabulary drives no transition
    #[test]
    fn test_unknown_courier_status_ignored() {
        let mut ledger = WebhookLedger::new();
        ledger.ingest(1, "evt-1", "rider_took_a_break");
        assert_eq!(ledger.status, OrderStatus::Pending);
        assert_eq!(ledger.history.len(), 1);
    }

    /// A repeated status under a fresh event id is recorded but does not
    /// duplicate the transition
    #[test]
    fn test_non_advancing_event_does_not_duplicate() {
        let mut ledger = WebhookLedger::new();
        ledger.ingest(1, "evt-1", "picked_up");
        assert_eq!(ledger.status, OrderStatus::Pending); // pending cannot skip to shipped

        ledger.ingest(1, "evt-2", "order_accepted");
        ledger.ingest(1, "evt-3", "picked_up");
        ledger.ingest(1, "evt-4", "in_transit"); // same internal status as picked_up

        assert_eq!(ledger.status, OrderStatus::Shipped);
        // pending + order_placed + shipped = 3 entries, in_transit added none
        assert_eq!(ledger.history.len(), 3);
    }

    /// History preserves the exact transition order
    #[test]
    fn test_history_ordering() {
        let t0 = Utc.with_ymd_and_hms(2025, 3, 1, 8, 0, 0).unwrap();
        let mut history = StatusHistory::starting_with(OrderStatus::Pending, t0);
        history.append(OrderStatus::OrderPlaced, t0 + chrono::Duration::minutes(1));
        history.append_courier(OrderStatus::Shipped, "picked_up", t0 + chrono::Duration::minutes(2));
        history.append(OrderStatus::Delivered, t0 + chrono::Duration::minutes(3));

        let statuses: Vec<OrderStatus> = history.events().iter().map(|e| e.status).collect();
        assert_eq!(
            statuses,
            vec![
                OrderStatus::Pending,
                OrderStatus::OrderPlaced,
                OrderStatus::Shipped,
                OrderStatus::Delivered
            ]
        );
        assert!(history
            .events()
            .windows(2)
            .all(|pair| pair[0].at <= pair[1].at));
    }
}

// ============================================================================
// Property-Based Tests
// ============================================================================

#[cfg(test)]
mod property_tests {
    use super::*;

    fn status_strategy() -> impl Strategy<Value = OrderStatus> {
        prop::sample::select(ALL_STATUSES.to_vec())
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(100))]

        /// Cancellation is reachable from exactly the non-terminal states
        #[test]
        fn prop_cancellation_reachability(status in status_strategy()) {
            let reachable = status.can_transition_to(OrderStatus::Cancelled);
            prop_assert_eq!(reachable, !status.is_terminal());
        }

        /// No transition graph edge ever points backwards along the happy
        /// path
        #[test]
        fn prop_no_backward_edges(from in status_strategy(), to in status_strategy()) {
            let order = |s: OrderStatus| ALL_STATUSES.iter().position(|&x| x == s).unwrap();
            if from.can_transition_to(to) && to != OrderStatus::Cancelled {
                prop_assert!(order(to) == order(from) + 1);
            }
        }

        /// Self transitions never exist
        #[test]
        fn prop_no_self_transitions(status in status_strategy()) {
            prop_assert!(!status.can_transition_to(status));
        }

        /// Any interleaving of concurrent accepts yields exactly one winner
        #[test]
        fn prop_single_winner(agents in prop::collection::vec(0u32..100, 1..20)) {
            let mut slot: Option<u32> = None;
            let winners = agents
                .iter()
                .filter(|&&agent| try_assign(&mut slot, agent).is_ok())
                .count();

            prop_assert_eq!(winners, 1);
            prop_assert_eq!(slot, Some(agents[0]));
        }

        /// Replaying any event sequence is a no-op: ingesting a stream
        /// twice leaves the same history length as once
        #[test]
        fn prop_webhook_replay_noop(
            events in prop::collection::vec(
                (0u32..3, "[a-z]{4}", prop::sample::select(vec![
                    "order_accepted", "picked_up", "in_transit", "delivered", "cancelled", "garbage",
                ])),
                0..15
            )
        ) {
            let mut once = WebhookLedger::new();
            for (order, id, status) in &events {
                once.ingest(*order, id, status);
            }

            let mut twice = WebhookLedger::new();
            for (order, id, status) in &events {
                twice.ingest(*order, id, status);
            }
            for (order, id, status) in &events {
                twice.ingest(*order, id, status);
            }

            prop_assert_eq!(once.history.len(), twice.history.len());
            prop_assert_eq!(once.notifications, twice.notifications);
            prop_assert_eq!(once.status, twice.status);
        }

        /// History length grows by exactly one per applied transition and
        /// statuses in history follow the legality graph
        #[test]
        fn prop_history_follows_graph(
            raw_statuses in prop::collection::vec(
                prop::sample::select(vec![
                    "order_accepted", "picked_up", "delivered", "cancelled",
                ]),
                0..10
            )
        ) {
            let mut ledger = WebhookLedger::new();
            for (i, status) in raw_statuses.iter().enumerate() {
                ledger.ingest(0, &format!("evt-{}", i), status);
            }

            let events = ledger.history.events();
            for pair in events.windows(2) {
                prop_assert!(pair[0].status.can_transition_to(pair[1].status));
            }
        }
    }
}
