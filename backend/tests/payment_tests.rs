//! Payment reconciliation tests
//!
//! Tests for payment settlement including:
//! - HMAC capture signature verification (round trip, tamper, malformed)
//! - Exactly-once capture: replays are no-op successes, conflicting
//!   captures are rejected
//! - Order payment status transition on capture

use base64::Engine;
use hmac::{Hmac, Mac};
use proptest::prelude::*;
use sha2::Sha256;

use shared::{OrderStatus, PaymentStatus};

type HmacSha256 = Hmac<Sha256>;

/// Sign `"{order_ref}|{payment_ref}"` the way the gateway does
fn sign(secret: &str, order_ref: &str, payment_ref: &str) -> String {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes()).unwrap();
    mac.update(order_ref.as_bytes());
    mac.update(b"|");
    mac.update(payment_ref.as_bytes());
    base64::engine::general_purpose::STANDARD.encode(mac.finalize().into_bytes())
}

/// Constant-time verification mirroring the gateway client
fn verify(secret: &str, order_ref: &str, payment_ref: &str, signature: &str) -> bool {
    let Ok(raw) = base64::engine::general_purpose::STANDARD.decode(signature) else {
        return false;
    };
    let Ok(mut mac) = HmacSha256::new_from_slice(secret.as_bytes()) else {
        return false;
    };
    mac.update(order_ref.as_bytes());
    mac.update(b"|");
    mac.update(payment_ref.as_bytes());
    mac.verify_slice(&raw).is_ok()
}

/// Payment transaction state machine mirroring the capture path
#[derive(Debug, Clone, PartialEq)]
struct Txn {
    status: &'static str,
    gateway_payment_id: Option<String>,
}

#[derive(Debug, PartialEq)]
enum Capture {
    Captured,
    AlreadyCaptured,
    Duplicate,
    BadSignature,
}

/// Verify-and-capture simulation: signature first, then the single legal
/// `created -> paid` transition, with replay detection on the payment ref.
fn verify_and_capture(
    txn: &mut Txn,
    order: &mut (PaymentStatus, OrderStatus),
    secret: &str,
    order_ref: &str,
    payment_ref: &str,
    signature: &str,
) -> Capture {
    if !verify(secret, order_ref, payment_ref, signature) {
        return Capture::BadSignature;
    }

    if txn.status == "paid" {
        return if txn.gateway_payment_id.as_deref() == Some(payment_ref) {
            Capture::AlreadyCaptured
        } else {
            Capture::Duplicate
        };
    }

    txn.status = "paid";
    txn.gateway_payment_id = Some(payment_ref.to_string());
    order.0 = PaymentStatus::Paid;
    if order.1.can_transition_to(OrderStatus::OrderPlaced) {
        order.1 = OrderStatus::OrderPlaced;
    }
    Capture::Captured
}

fn fresh_txn() -> Txn {
    Txn {
        status: "created",
        gateway_payment_id: None,
    }
}

// ============================================================================
// Unit Tests
// ============================================================================

#[cfg(test)]
mod unit_tests {
    use super::*;

    #[test]
    fn test_signature_round_trip() {
        let sig = sign("secret", "order_G5kp", "pay_29am");
        assert!(verify("secret", "order_G5kp", "pay_29am", &sig));
    }

    #[test]
    fn test_tampered_refs_rejected() {
        let sig = sign("secret", "order_G5kp", "pay_29am");
        assert!(!verify("secret", "order_G5kp", "pay_other", &sig));
        assert!(!verify("secret", "order_other", "pay_29am", &sig));
        assert!(!verify("wrong-secret", "order_G5kp", "pay_29am", &sig));
    }

    #[test]
    fn test_malformed_signature_rejected() {
        assert!(!verify("secret", "order_G5kp", "pay_29am", "???"));
        assert!(!verify("secret", "order_G5kp", "pay_29am", ""));
    }

    /// Valid capture settles the transaction and confirms the order
    #[test]
    fn test_capture_settles_order() {
        let mut txn = fresh_txn();
        let mut order = (PaymentStatus::Unpaid, OrderStatus::Pending);
        let sig = sign("secret", "order_1", "pay_1");

        let outcome = verify_and_capture(&mut txn, &mut order, "secret", "order_1", "pay_1", &sig);

        assert_eq!(outcome, Capture::Captured);
        assert_eq!(txn.status, "paid");
        assert_eq!(order.0, PaymentStatus::Paid);
        assert_eq!(order.1, OrderStatus::OrderPlaced);
    }

    /// Replaying the same valid capture is a no-op success, not a
    /// double-credit
    #[test]
    fn test_capture_replay_is_noop() {
        let mut txn = fresh_txn();
        let mut order = (PaymentStatus::Unpaid, OrderStatus::Pending);
        let sig = sign("secret", "order_1", "pay_1");

        let first = verify_and_capture(&mut txn, &mut order, "secret", "order_1", "pay_1", &sig);
        let state_after_first = (txn.clone(), order);
        let second = verify_and_capture(&mut txn, &mut order, "secret", "order_1", "pay_1", &sig);

        assert_eq!(first, Capture::Captured);
        assert_eq!(second, Capture::AlreadyCaptured);
        assert_eq!((txn, order), state_after_first);
    }

    /// A different payment ref against a settled transaction is a conflict
    #[test]
    fn test_conflicting_capture_rejected() {
        let mut txn = fresh_txn();
        let mut order = (PaymentStatus::Unpaid, OrderStatus::Pending);
        let sig1 = sign("secret", "order_1", "pay_1");
        let sig2 = sign("secret", "order_1", "pay_2");

        verify_and_capture(&mut txn, &mut order, "secret", "order_1", "pay_1", &sig1);
        let outcome = verify_and_capture(&mut txn, &mut order, "secret", "order_1", "pay_2", &sig2);

        assert_eq!(outcome, Capture::Duplicate);
        assert_eq!(txn.gateway_payment_id.as_deref(), Some("pay_1"));
    }

    /// Invalid signature leaves all state untouched
    #[test]
    fn test_bad_signature_changes_nothing() {
        let mut txn = fresh_txn();
        let mut order = (PaymentStatus::Unpaid, OrderStatus::Pending);

        let outcome =
            verify_and_capture(&mut txn, &mut order, "secret", "order_1", "pay_1", "bogus");

        assert_eq!(outcome, Capture::BadSignature);
        assert_eq!(txn, fresh_txn());
        assert_eq!(order, (PaymentStatus::Unpaid, OrderStatus::Pending));
    }

    /// Capture against an order the vendor already shipped keeps its
    /// fulfillment status
    #[test]
    fn test_capture_preserves_advanced_status() {
        let mut txn = fresh_txn();
        let mut order = (PaymentStatus::Unpaid, OrderStatus::Shipped);
        let sig = sign("secret", "order_1", "pay_1");

        verify_and_capture(&mut txn, &mut order, "secret", "order_1", "pay_1", &sig);

        assert_eq!(order.0, PaymentStatus::Paid);
        assert_eq!(order.1, OrderStatus::Shipped);
    }
}

// ============================================================================
// Property-Based Tests
// ============================================================================

#[cfg(test)]
mod property_tests {
    use super::*;

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(100))]

        /// Signing and verifying round-trips for arbitrary refs and secrets
        #[test]
        fn prop_signature_round_trip(
            secret in "[a-zA-Z0-9]{8,32}",
            order_ref in "[a-zA-Z0-9_]{4,24}",
            payment_ref in "[a-zA-Z0-9_]{4,24}"
        ) {
            let sig = sign(&secret, &order_ref, &payment_ref);
            prop_assert!(verify(&secret, &order_ref, &payment_ref, &sig));
        }

        /// A signature never verifies under a different payment ref
        #[test]
        fn prop_signature_binds_payment_ref(
            secret in "[a-zA-Z0-9]{8,32}",
            order_ref in "[a-zA-Z0-9_]{4,24}",
            payment_ref in "[a-zA-Z0-9_]{4,24}",
            other_ref in "[a-zA-Z0-9_]{4,24}"
        ) {
            prop_assume!(payment_ref != other_ref);
            let sig = sign(&secret, &order_ref, &payment_ref);
            prop_assert!(!verify(&secret, &order_ref, &other_ref, &sig));
        }

        /// Any number of replays of a valid capture settles the order
        /// exactly once
        #[test]
        fn prop_exactly_once_capture(replays in 1usize..10) {
            let mut txn = fresh_txn();
            let mut order = (PaymentStatus::Unpaid, OrderStatus::Pending);
            let sig = sign("secret", "order_1", "pay_1");

            let mut captured = 0;
            for _ in 0..replays {
                if verify_and_capture(&mut txn, &mut order, "secret", "order_1", "pay_1", &sig)
                    == Capture::Captured
                {
                    captured += 1;
                }
            }

            prop_assert_eq!(captured, 1);
            prop_assert_eq!(order.0, PaymentStatus::Paid);
        }
    }
}
