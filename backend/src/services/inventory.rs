//! Inventory ledger
//!
//! Owns the per-product and per-variant stock counters. All mutations run
//! inside the caller's transaction under row locks, so a rollback restores
//! stock implicitly and concurrent orders serialize on the product row.

use sqlx::PgConnection;
use uuid::Uuid;

use crate::error::{AppError, AppResult};

/// Atomically reserve stock for one order line.
///
/// Locks the product row (and the variant row when a variant is ordered),
/// compares requested quantity against current stock and decrements it.
/// Returns `InsufficientStock` without mutating anything when the request
/// cannot be covered. Must be called inside the order transaction.
pub async fn reserve(
    tx: &mut PgConnection,
    product_id: Uuid,
    variant_id: Option<Uuid>,
    quantity: i32,
) -> AppResult<()> {
    let product_stock = lock_product_stock(tx, product_id).await?;

    match variant_id {
        Some(variant_id) => {
            let variant_stock = lock_variant_stock(tx, product_id, variant_id).await?;
            if variant_stock < quantity {
                return Err(AppError::InsufficientStock(format!(
                    "variant {} has {} in stock, {} requested",
                    variant_id, variant_stock, quantity
                )));
            }

            sqlx::query("UPDATE product_variants SET stock_quantity = stock_quantity - $1 WHERE id = $2")
                .bind(quantity)
                .bind(variant_id)
                .execute(&mut *tx)
                .await?;

            recompute_product_aggregate(tx, product_id).await?;
        }
        None => {
            if product_stock < quantity {
                return Err(AppError::InsufficientStock(format!(
                    "product {} has {} in stock, {} requested",
                    product_id, product_stock, quantity
                )));
            }

            sqlx::query("UPDATE products SET stock_quantity = stock_quantity - $1 WHERE id = $2")
                .bind(quantity)
                .bind(product_id)
                .execute(&mut *tx)
                .await?;
        }
    }

    Ok(())
}

/// Return previously reserved stock (compensating action).
///
/// Used when a pre-shipment order is cancelled; not part of the generic
/// cancellation path for shipped orders.
pub async fn release(
    tx: &mut PgConnection,
    product_id: Uuid,
    variant_id: Option<Uuid>,
    quantity: i32,
) -> AppResult<()> {
    lock_product_stock(tx, product_id).await?;

    match variant_id {
        Some(variant_id) => {
            lock_variant_stock(tx, product_id, variant_id).await?;

            sqlx::query("UPDATE product_variants SET stock_quantity = stock_quantity + $1 WHERE id = $2")
                .bind(quantity)
                .bind(variant_id)
                .execute(&mut *tx)
                .await?;

            recompute_product_aggregate(tx, product_id).await?;
        }
        None => {
            sqlx::query("UPDATE products SET stock_quantity = stock_quantity + $1 WHERE id = $2")
                .bind(quantity)
                .bind(product_id)
                .execute(&mut *tx)
                .await?;
        }
    }

    Ok(())
}

/// Lock and read a product's aggregate stock
async fn lock_product_stock(tx: &mut PgConnection, product_id: Uuid) -> AppResult<i32> {
    sqlx::query_scalar::<_, i32>("SELECT stock_quantity FROM products WHERE id = $1 FOR UPDATE")
        .bind(product_id)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or_else(|| AppError::NotFound("Product".to_string()))
}

/// Lock and read a variant's stock, verifying it belongs to the product
async fn lock_variant_stock(
    tx: &mut PgConnection,
    product_id: Uuid,
    variant_id: Uuid,
) -> AppResult<i32> {
    sqlx::query_scalar::<_, i32>(
        "SELECT stock_quantity FROM product_variants WHERE id = $1 AND product_id = $2 FOR UPDATE",
    )
    .bind(variant_id)
    .bind(product_id)
    .fetch_optional(&mut *tx)
    .await?
    .ok_or_else(|| AppError::NotFound("Product variant".to_string()))
}

/// Keep the denormalized product aggregate equal to the sum of its
/// variants' stock. Runs inside the same transaction as the variant
/// mutation.
async fn recompute_product_aggregate(tx: &mut PgConnection, product_id: Uuid) -> AppResult<()> {
    sqlx::query(
        r#"
        UPDATE products
        SET stock_quantity = (
            SELECT COALESCE(SUM(stock_quantity), 0)
            FROM product_variants
            WHERE product_id = $1
        )
        WHERE id = $1
        "#,
    )
    .bind(product_id)
    .execute(&mut *tx)
    .await?;

    Ok(())
}
