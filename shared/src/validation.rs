//! Validation utilities for the Marketplace Platform

use rust_decimal::Decimal;

// ============================================================================
// Order Validations
// ============================================================================

/// Validate an ordered quantity
pub fn validate_quantity(quantity: i32) -> Result<(), &'static str> {
    if quantity <= 0 {
        return Err("Quantity must be positive");
    }
    Ok(())
}

/// Validate that an order carries at least one item
pub fn validate_items_not_empty(item_count: usize) -> Result<(), &'static str> {
    if item_count == 0 {
        return Err("Order must contain at least one item");
    }
    Ok(())
}

/// Validate a monetary amount is non-negative
pub fn validate_amount(amount: Decimal) -> Result<(), &'static str> {
    if amount < Decimal::ZERO {
        return Err("Amount cannot be negative");
    }
    Ok(())
}

/// Validate an ISO 4217 currency code (3 uppercase letters)
pub fn validate_currency(currency: &str) -> Result<(), &'static str> {
    if currency.len() != 3 || !currency.chars().all(|c| c.is_ascii_uppercase()) {
        return Err("Currency must be a 3-letter uppercase code");
    }
    Ok(())
}

/// Validate the shape of an externally supplied order number
pub fn validate_order_number(order_number: &str) -> Result<(), &'static str> {
    if !order_number.starts_with("ORD-") {
        return Err("Order number must start with ORD-");
    }
    if order_number.len() < 10 || order_number.len() > 32 {
        return Err("Order number has invalid length");
    }
    if !order_number[4..]
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '-')
    {
        return Err("Order number contains invalid characters");
    }
    Ok(())
}

// ============================================================================
// Address Validations
// ============================================================================

/// Validate a postal code (loose: 3-10 alphanumerics, spaces and dashes)
pub fn validate_postal_code(code: &str) -> Result<(), &'static str> {
    let significant: String = code.chars().filter(|c| !c.is_whitespace() && *c != '-').collect();
    if significant.len() < 3 || significant.len() > 10 {
        return Err("Postal code has invalid length");
    }
    if !significant.chars().all(|c| c.is_ascii_alphanumeric()) {
        return Err("Postal code contains invalid characters");
    }
    Ok(())
}
