//! Pricing engine
//!
//! Computes per-line and order-level totals from prices snapshotted at
//! order time. Pure decimal arithmetic; the orchestrator feeds it rows it
//! has already locked and read.

use rust_decimal::Decimal;
use serde::Serialize;
use sqlx::PgPool;
use uuid::Uuid;

use crate::error::AppResult;

/// One order line as priced at purchase time
#[derive(Debug, Clone, Copy)]
pub struct PricedLine {
    pub unit_price: Decimal,
    pub unit_discount: Decimal,
    pub unit_tax: Decimal,
    pub quantity: i32,
}

impl PricedLine {
    /// Line total: (price - discount + tax) * quantity
    pub fn line_total(&self) -> Decimal {
        (self.unit_price - self.unit_discount + self.unit_tax) * Decimal::from(self.quantity)
    }
}

/// Order-level monetary totals
#[derive(Debug, Clone, Copy, Serialize, PartialEq)]
pub struct OrderTotals {
    pub subtotal: Decimal,
    pub discount: Decimal,
    pub tax: Decimal,
    pub shipping_fee: Decimal,
    pub grand_total: Decimal,
}

impl OrderTotals {
    /// The invariant every persisted order must satisfy
    pub fn invariant_holds(&self) -> bool {
        self.grand_total == self.subtotal - self.discount + self.tax + self.shipping_fee
    }
}

/// Compute order totals from priced lines.
///
/// Subtotal and tax sum the per-unit figures over quantities; the order
/// discount is the sum of line discounts plus any coupon amount. The grand
/// total follows the invariant `subtotal - discount + tax + shipping`.
pub fn compute_totals(
    lines: &[PricedLine],
    coupon_discount: Decimal,
    shipping_fee: Decimal,
) -> OrderTotals {
    let mut subtotal = Decimal::ZERO;
    let mut line_discounts = Decimal::ZERO;
    let mut tax = Decimal::ZERO;

    for line in lines {
        let quantity = Decimal::from(line.quantity);
        subtotal += line.unit_price * quantity;
        line_discounts += line.unit_discount * quantity;
        tax += line.unit_tax * quantity;
    }

    let discount = line_discounts + coupon_discount;
    let grand_total = subtotal - discount + tax + shipping_fee;

    OrderTotals {
        subtotal,
        discount,
        tax,
        shipping_fee,
        grand_total,
    }
}

/// Resolve a coupon code to an order-level discount amount.
///
/// Coupon management is owned by the catalog/CMS side; until that wiring
/// lands the resolution yields no discount.
pub async fn resolve_coupon(
    _db: &PgPool,
    customer_id: Uuid,
    code: &str,
) -> AppResult<Decimal> {
    tracing::debug!(%customer_id, coupon = %code, "coupon resolution not wired, applying zero discount");
    Ok(Decimal::ZERO)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    fn dec(s: &str) -> Decimal {
        Decimal::from_str(s).unwrap()
    }

    #[test]
    fn line_total_follows_invariant() {
        let line = PricedLine {
            unit_price: dec("100"),
            unit_discount: dec("10"),
            unit_tax: dec("5"),
            quantity: 2,
        };
        assert_eq!(line.line_total(), dec("190"));
    }

    #[test]
    fn totals_for_single_line_order() {
        // Variant at 100 with tax 5, quantity 2: subtotal 200, tax 10,
        // grand total 210 with no shipping or discount.
        let lines = [PricedLine {
            unit_price: dec("100"),
            unit_discount: Decimal::ZERO,
            unit_tax: dec("5"),
            quantity: 2,
        }];
        let totals = compute_totals(&lines, Decimal::ZERO, Decimal::ZERO);
        assert_eq!(totals.subtotal, dec("200"));
        assert_eq!(totals.tax, dec("10"));
        assert_eq!(totals.grand_total, dec("210"));
        assert!(totals.invariant_holds());
    }

    #[test]
    fn shipping_and_coupon_affect_grand_total() {
        let lines = [PricedLine {
            unit_price: dec("50"),
            unit_discount: dec("5"),
            unit_tax: dec("2.50"),
            quantity: 4,
        }];
        let totals = compute_totals(&lines, dec("20"), dec("30"));
        assert_eq!(totals.subtotal, dec("200"));
        assert_eq!(totals.discount, dec("40"));
        assert_eq!(totals.tax, dec("10"));
        assert_eq!(totals.grand_total, dec("200"));
        assert!(totals.invariant_holds());
    }

    #[test]
    fn empty_order_totals_are_zero() {
        let totals = compute_totals(&[], Decimal::ZERO, Decimal::ZERO);
        assert_eq!(totals.grand_total, Decimal::ZERO);
        assert!(totals.invariant_holds());
    }
}
