//! Pricing engine tests
//!
//! Tests for order pricing including:
//! - Line total invariant: (price - discount + tax) * quantity
//! - Order total invariant: grand = subtotal - discount + tax + shipping
//! - Coupon and shipping interaction

use proptest::prelude::*;
use rust_decimal::Decimal;
use std::str::FromStr;

// Helper to create Decimal from string
fn dec(s: &str) -> Decimal {
    Decimal::from_str(s).unwrap()
}

/// One priced order line, mirroring the pricing engine's inputs
#[derive(Debug, Clone, Copy)]
struct Line {
    unit_price: Decimal,
    unit_discount: Decimal,
    unit_tax: Decimal,
    quantity: i32,
}

impl Line {
    fn line_total(&self) -> Decimal {
        (self.unit_price - self.unit_discount + self.unit_tax) * Decimal::from(self.quantity)
    }
}

/// Order-level totals as the pricing engine computes them
#[derive(Debug, PartialEq)]
struct Totals {
    subtotal: Decimal,
    discount: Decimal,
    tax: Decimal,
    shipping_fee: Decimal,
    grand_total: Decimal,
}

fn compute_totals(lines: &[Line], coupon_discount: Decimal, shipping_fee: Decimal) -> Totals {
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
    Totals {
        subtotal,
        discount,
        tax,
        shipping_fee,
        grand_total: subtotal - discount + tax + shipping_fee,
    }
}

fn invariant_holds(t: &Totals) -> bool {
    t.grand_total == t.subtotal - t.discount + t.tax + t.shipping_fee
}

// ============================================================================
// Unit Tests
// ============================================================================

#[cfg(test)]
mod unit_tests {
    use super::*;

    /// Scenario from the placement contract: variant priced 100 with tax 5,
    /// quantity 2, no shipping or discount
    #[test]
    fn test_two_units_at_100_with_tax() {
        let lines = [Line {
            unit_price: dec("100"),
            unit_discount: Decimal::ZERO,
            unit_tax: dec("5"),
            quantity: 2,
        }];
        let totals = compute_totals(&lines, Decimal::ZERO, Decimal::ZERO);

        assert_eq!(totals.subtotal, dec("200"));
        assert_eq!(totals.tax, dec("10"));
        assert_eq!(totals.discount, Decimal::ZERO);
        assert_eq!(totals.grand_total, dec("210"));
        assert!(invariant_holds(&totals));
    }

    /// Line total formula
    #[test]
    fn test_line_total_formula() {
        let line = Line {
            unit_price: dec("50"),
            unit_discount: dec("5"),
            unit_tax: dec("2.5"),
            quantity: 3,
        };
        // (50 - 5 + 2.5) * 3 = 142.5
        assert_eq!(line.line_total(), dec("142.5"));
    }

    /// Order totals over multiple lines
    #[test]
    fn test_multi_line_totals() {
        let lines = [
            Line {
                unit_price: dec("100"),
                unit_discount: Decimal::ZERO,
                unit_tax: dec("5"),
                quantity: 1,
            },
            Line {
                unit_price: dec("20"),
                unit_discount: dec("2"),
                unit_tax: dec("1"),
                quantity: 5,
            },
        ];
        let totals = compute_totals(&lines, Decimal::ZERO, dec("15"));

        assert_eq!(totals.subtotal, dec("200"));
        assert_eq!(totals.discount, dec("10"));
        assert_eq!(totals.tax, dec("10"));
        assert_eq!(totals.grand_total, dec("215"));
        assert!(invariant_holds(&totals));
    }

    /// Coupon discount lowers the grand total, never the subtotal
    #[test]
    fn test_coupon_applies_at_order_level() {
        let lines = [Line {
            unit_price: dec("80"),
            unit_discount: Decimal::ZERO,
            unit_tax: Decimal::ZERO,
            quantity: 1,
        }];
        let without = compute_totals(&lines, Decimal::ZERO, Decimal::ZERO);
        let with = compute_totals(&lines, dec("30"), Decimal::ZERO);

        assert_eq!(without.subtotal, with.subtotal);
        assert_eq!(with.grand_total, dec("50"));
    }

    /// Sum of line totals equals grand total minus coupon and shipping
    #[test]
    fn test_line_totals_reconcile_with_order_total() {
        let lines = [
            Line {
                unit_price: dec("10"),
                unit_discount: dec("1"),
                unit_tax: dec("0.5"),
                quantity: 2,
            },
            Line {
                unit_price: dec("7"),
                unit_discount: Decimal::ZERO,
                unit_tax: dec("0.35"),
                quantity: 4,
            },
        ];
        let totals = compute_totals(&lines, Decimal::ZERO, Decimal::ZERO);
        let line_sum: Decimal = lines.iter().map(|l| l.line_total()).sum();

        assert_eq!(line_sum, totals.grand_total);
    }

    /// Empty order prices to zero
    #[test]
    fn test_empty_order() {
        let totals = compute_totals(&[], Decimal::ZERO, Decimal::ZERO);
        assert_eq!(totals.grand_total, Decimal::ZERO);
        assert!(invariant_holds(&totals));
    }
}

// ============================================================================
// Property-Based Tests
// ============================================================================

#[cfg(test)]
mod property_tests {
    use super::*;

    /// Strategy for generating unit prices (0.01 to 1000.00)
    fn price_strategy() -> impl Strategy<Value = Decimal> {
        (1i64..=100_000i64).prop_map(|n| Decimal::new(n, 2))
    }

    /// Strategy for generating per-unit discounts (0.00 to 10.00)
    fn discount_strategy() -> impl Strategy<Value = Decimal> {
        (0i64..=1_000i64).prop_map(|n| Decimal::new(n, 2))
    }

    /// Strategy for generating per-unit tax (0.00 to 100.00)
    fn tax_strategy() -> impl Strategy<Value = Decimal> {
        (0i64..=10_000i64).prop_map(|n| Decimal::new(n, 2))
    }

    fn line_strategy() -> impl Strategy<Value = Line> {
        (price_strategy(), discount_strategy(), tax_strategy(), 1i32..=20).prop_map(
            |(unit_price, unit_discount, unit_tax, quantity)| Line {
                unit_price,
                unit_discount,
                unit_tax,
                quantity,
            },
        )
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(100))]

        /// Grand total invariant holds for every computed order
        #[test]
        fn prop_total_invariant(
            lines in prop::collection::vec(line_strategy(), 0..8),
            coupon in discount_strategy(),
            shipping in tax_strategy()
        ) {
            let totals = compute_totals(&lines, coupon, shipping);
            prop_assert!(invariant_holds(&totals));
        }

        /// Subtotal and tax scale linearly with quantity
        #[test]
        fn prop_quantity_scales_subtotal(line in line_strategy()) {
            let single = compute_totals(&[Line { quantity: 1, ..line }], Decimal::ZERO, Decimal::ZERO);
            let many = compute_totals(&[line], Decimal::ZERO, Decimal::ZERO);

            prop_assert_eq!(many.subtotal, single.subtotal * Decimal::from(line.quantity));
            prop_assert_eq!(many.tax, single.tax * Decimal::from(line.quantity));
        }

        /// Adding a line never decreases the subtotal
        #[test]
        fn prop_subtotal_monotonic(
            lines in prop::collection::vec(line_strategy(), 1..6),
            extra in line_strategy()
        ) {
            let base = compute_totals(&lines, Decimal::ZERO, Decimal::ZERO);
            let mut extended = lines.clone();
            extended.push(extra);
            let grown = compute_totals(&extended, Decimal::ZERO, Decimal::ZERO);

            prop_assert!(grown.subtotal >= base.subtotal);
        }

        /// A larger coupon never yields a larger grand total
        #[test]
        fn prop_coupon_monotonic(
            lines in prop::collection::vec(line_strategy(), 1..6),
            coupon in discount_strategy(),
            extra in discount_strategy()
        ) {
            let small = compute_totals(&lines, coupon, Decimal::ZERO);
            let large = compute_totals(&lines, coupon + extra, Decimal::ZERO);

            prop_assert!(large.grand_total <= small.grand_total);
        }

        /// Line totals always reconcile with the order total when there is
        /// no order-level coupon or shipping
        #[test]
        fn prop_line_totals_reconcile(lines in prop::collection::vec(line_strategy(), 0..8)) {
            let totals = compute_totals(&lines, Decimal::ZERO, Decimal::ZERO);
            let line_sum: Decimal = lines.iter().map(|l| l.line_total()).sum();

            prop_assert_eq!(line_sum, totals.grand_total);
        }
    }
}
