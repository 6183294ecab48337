//! Order placement and order queries
//!
//! The placement path validates a cart's items against live inventory,
//! reserves stock under row locks, computes pricing, and persists the order
//! with frozen line-item snapshots — all inside one transaction. Invoice
//! rendering and cart cleanup happen post-commit and are best-effort.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::{PgConnection, PgPool};
use uuid::Uuid;

use crate::error::{AppError, AppResult};
use crate::external::invoices::{InvoiceClient, InvoiceLine, InvoiceRequest};
use crate::services::{inventory, pricing};
use shared::{
    generate_order_number, validate_items_not_empty, validate_postal_code, validate_quantity,
    DeliveryAddress, OrderStatus, PaginatedResponse, Pagination, PaginationMeta, PaymentMethod,
    PaymentStatus, ProductSnapshot, StatusHistory,
};

/// Order service for placement and queries
#[derive(Clone)]
pub struct OrderService {
    db: PgPool,
}

/// One requested order line
#[derive(Debug, Clone, Deserialize)]
pub struct OrderItemInput {
    pub product_id: Uuid,
    pub variant_id: Option<Uuid>,
    pub quantity: i32,
}

/// Input for placing an order
#[derive(Debug, Deserialize)]
pub struct PlaceOrderInput {
    pub delivery_address: DeliveryAddress,
    pub items: Vec<OrderItemInput>,
    pub payment_method: PaymentMethod,
    pub coupon_code: Option<String>,
}

/// Database row for an order header
#[derive(Debug, sqlx::FromRow)]
struct OrderRow {
    id: Uuid,
    order_number: String,
    customer_id: Uuid,
    shop_id: Uuid,
    delivery_address: serde_json::Value,
    payment_method: String,
    payment_status: String,
    status: String,
    subtotal: Decimal,
    discount: Decimal,
    tax: Decimal,
    shipping_fee: Decimal,
    grand_total: Decimal,
    coupon_code: Option<String>,
    status_history: serde_json::Value,
    delivery_agent_id: Option<Uuid>,
    courier_order_id: Option<String>,
    rider_name: Option<String>,
    rider_phone: Option<String>,
    invoice_url: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    delivered_at: Option<DateTime<Utc>>,
}

/// Order header as exposed through the API
#[derive(Debug, Clone, Serialize)]
pub struct Order {
    pub id: Uuid,
    pub order_number: String,
    pub customer_id: Uuid,
    pub shop_id: Uuid,
    pub delivery_address: DeliveryAddress,
    pub payment_method: PaymentMethod,
    pub payment_status: PaymentStatus,
    pub status: OrderStatus,
    pub subtotal: Decimal,
    pub discount: Decimal,
    pub tax: Decimal,
    pub shipping_fee: Decimal,
    pub grand_total: Decimal,
    pub coupon_code: Option<String>,
    pub status_history: StatusHistory,
    pub delivery_agent_id: Option<Uuid>,
    pub courier_order_id: Option<String>,
    pub rider_name: Option<String>,
    pub rider_phone: Option<String>,
    pub invoice_url: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub delivered_at: Option<DateTime<Utc>>,
}

impl TryFrom<OrderRow> for Order {
    type Error = AppError;

    fn try_from(row: OrderRow) -> Result<Self, Self::Error> {
        let status = row
            .status
            .parse::<OrderStatus>()
            .map_err(|_| AppError::Integrity(format!("order {} has unknown status", row.id)))?;
        let payment_status = row
            .payment_status
            .parse::<PaymentStatus>()
            .map_err(|_| AppError::Integrity(format!("order {} has unknown payment status", row.id)))?;
        let payment_method = row
            .payment_method
            .parse::<PaymentMethod>()
            .map_err(|_| AppError::Integrity(format!("order {} has unknown payment method", row.id)))?;
        let delivery_address: DeliveryAddress = serde_json::from_value(row.delivery_address)
            .map_err(|e| AppError::Integrity(format!("order {} address decode: {}", row.id, e)))?;
        let status_history: StatusHistory = serde_json::from_value(row.status_history)
            .map_err(|e| AppError::Integrity(format!("order {} history decode: {}", row.id, e)))?;

        Ok(Order {
            id: row.id,
            order_number: row.order_number,
            customer_id: row.customer_id,
            shop_id: row.shop_id,
            delivery_address,
            payment_method,
            payment_status,
            status,
            subtotal: row.subtotal,
            discount: row.discount,
            tax: row.tax,
            shipping_fee: row.shipping_fee,
            grand_total: row.grand_total,
            coupon_code: row.coupon_code,
            status_history,
            delivery_agent_id: row.delivery_agent_id,
            courier_order_id: row.courier_order_id,
            rider_name: row.rider_name,
            rider_phone: row.rider_phone,
            invoice_url: row.invoice_url,
            created_at: row.created_at,
            updated_at: row.updated_at,
            delivered_at: row.delivered_at,
        })
    }
}

/// Database row for an order line item
#[derive(Debug, sqlx::FromRow)]
struct OrderItemRow {
    id: Uuid,
    order_id: Uuid,
    product_id: Uuid,
    variant_id: Option<Uuid>,
    quantity: i32,
    unit_price: Decimal,
    unit_discount: Decimal,
    unit_tax: Decimal,
    line_total: Decimal,
    snapshot: serde_json::Value,
}

/// Order line item as exposed through the API
#[derive(Debug, Clone, Serialize)]
pub struct OrderItem {
    pub id: Uuid,
    pub order_id: Uuid,
    pub product_id: Uuid,
    pub variant_id: Option<Uuid>,
    pub quantity: i32,
    pub unit_price: Decimal,
    pub unit_discount: Decimal,
    pub unit_tax: Decimal,
    pub line_total: Decimal,
    pub snapshot: ProductSnapshot,
}

impl TryFrom<OrderItemRow> for OrderItem {
    type Error = AppError;

    fn try_from(row: OrderItemRow) -> Result<Self, Self::Error> {
        let snapshot: ProductSnapshot = serde_json::from_value(row.snapshot).map_err(|e| {
            AppError::Integrity(format!("order item {} snapshot decode: {}", row.id, e))
        })?;
        Ok(OrderItem {
            id: row.id,
            order_id: row.order_id,
            product_id: row.product_id,
            variant_id: row.variant_id,
            quantity: row.quantity,
            unit_price: row.unit_price,
            unit_discount: row.unit_discount,
            unit_tax: row.unit_tax,
            line_total: row.line_total,
            snapshot,
        })
    }
}

/// Order with its line items
#[derive(Debug, Serialize)]
pub struct OrderDetail {
    #[serde(flatten)]
    pub order: Order,
    pub items: Vec<OrderItem>,
}

/// Successful placement result
#[derive(Debug, Serialize)]
pub struct OrderConfirmation {
    pub order_number: String,
    pub invoice_url: Option<String>,
    /// Degraded-success notes from best-effort post-commit steps
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<String>,
    pub order: OrderDetail,
}

/// Filters for the shop-facing order listing
#[derive(Debug, Default, Deserialize)]
pub struct ShopOrderFilter {
    pub search: Option<String>,
    pub status: Option<String>,
    pub sort: Option<String>,
    #[serde(flatten)]
    pub pagination: Pagination,
}

/// Locked product row read during placement
#[derive(Debug, sqlx::FromRow)]
struct ProductForUpdate {
    id: Uuid,
    shop_id: Uuid,
    name: String,
    sku: String,
    price: Decimal,
    discount: Decimal,
    tax: Decimal,
    image_url: Option<String>,
    stock_quantity: i32,
}

/// Locked variant row read during placement
#[derive(Debug, sqlx::FromRow)]
struct VariantForUpdate {
    id: Uuid,
    name: String,
    sku: String,
    price: Decimal,
    stock_quantity: i32,
}

/// Per-line data accumulated while locking and reserving
struct PreparedLine {
    input_index: usize,
    product_id: Uuid,
    variant_id: Option<Uuid>,
    quantity: i32,
    priced: pricing::PricedLine,
    snapshot: ProductSnapshot,
}

impl OrderService {
    /// Create a new OrderService instance
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }

    /// Place an order for a customer.
    ///
    /// Steps 1-6 of the placement algorithm run in one transaction:
    /// customer resolution, per-item lock + stock reservation (items
    /// processed in ascending product-id order to prevent deadlocks
    /// between overlapping concurrent orders), pricing, and persistence of
    /// the header plus immutable line snapshots. Cart cleanup and invoice
    /// rendering run after commit and only degrade the response, never
    /// fail it.
    pub async fn place_order(
        &self,
        customer_id: Uuid,
        input: PlaceOrderInput,
        shipping_fee: Decimal,
        invoices: &InvoiceClient,
    ) -> AppResult<OrderConfirmation> {
        validate_items_not_empty(input.items.len())
            .map_err(|e| AppError::ValidationError(e.to_string()))?;
        for item in &input.items {
            validate_quantity(item.quantity).map_err(|e| AppError::Validation {
                field: "quantity".to_string(),
                message: e.to_string(),
            })?;
        }
        validate_postal_code(&input.delivery_address.postal_code).map_err(|e| {
            AppError::Validation {
                field: "delivery_address.postal_code".to_string(),
                message: e.to_string(),
            }
        })?;

        let mut tx = self.db.begin().await?;

        let customer_exists =
            sqlx::query_scalar::<_, bool>("SELECT EXISTS(SELECT 1 FROM customers WHERE id = $1)")
                .bind(customer_id)
                .fetch_one(&mut *tx)
                .await?;
        if !customer_exists {
            return Err(AppError::NotFound("Customer".to_string()));
        }

        // Lock items in ascending product id order so two concurrent orders
        // touching overlapping products cannot deadlock.
        let mut lock_order: Vec<usize> = (0..input.items.len()).collect();
        lock_order.sort_by_key(|&i| (input.items[i].product_id, input.items[i].variant_id));

        let mut shop_id: Option<Uuid> = None;
        let mut prepared: Vec<PreparedLine> = Vec::with_capacity(input.items.len());

        for index in lock_order {
            let item = &input.items[index];
            let line = self
                .lock_and_reserve(&mut tx, item, index, &mut shop_id)
                .await?;
            prepared.push(line);
        }

        // Line items persist in the order the customer sent them
        prepared.sort_by_key(|line| line.input_index);

        let shop_id =
            shop_id.ok_or_else(|| AppError::Integrity("order resolved no shop".to_string()))?;

        let coupon_discount = match &input.coupon_code {
            Some(code) => pricing::resolve_coupon(&self.db, customer_id, code).await?,
            None => Decimal::ZERO,
        };

        let priced_lines: Vec<pricing::PricedLine> =
            prepared.iter().map(|line| line.priced).collect();
        let totals = pricing::compute_totals(&priced_lines, coupon_discount, shipping_fee);

        let now = Utc::now();
        let entropy = Uuid::new_v4().as_u128() as u32;
        let order_number = generate_order_number(now, entropy);
        let history = StatusHistory::starting_with(OrderStatus::Pending, now);

        let address_json = serde_json::to_value(&input.delivery_address)
            .map_err(|e| AppError::Internal(e.to_string()))?;
        let history_json =
            serde_json::to_value(&history).map_err(|e| AppError::Internal(e.to_string()))?;

        let order_id = sqlx::query_scalar::<_, Uuid>(
            r#"
            INSERT INTO orders (
                order_number, customer_id, shop_id, delivery_address,
                payment_method, payment_status, status,
                subtotal, discount, tax, shipping_fee, grand_total,
                coupon_code, status_history
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14)
            RETURNING id
            "#,
        )
        .bind(&order_number)
        .bind(customer_id)
        .bind(shop_id)
        .bind(&address_json)
        .bind(input.payment_method.as_str())
        .bind(PaymentStatus::Unpaid.as_str())
        .bind(OrderStatus::Pending.as_str())
        .bind(totals.subtotal)
        .bind(totals.discount)
        .bind(totals.tax)
        .bind(totals.shipping_fee)
        .bind(totals.grand_total)
        .bind(&input.coupon_code)
        .bind(&history_json)
        .fetch_one(&mut *tx)
        .await?;

        for line in &prepared {
            let snapshot_json = serde_json::to_value(&line.snapshot)
                .map_err(|e| AppError::Internal(e.to_string()))?;
            sqlx::query(
                r#"
                INSERT INTO order_items (
                    order_id, product_id, variant_id, quantity,
                    unit_price, unit_discount, unit_tax, line_total, snapshot
                )
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
                "#,
            )
            .bind(order_id)
            .bind(line.product_id)
            .bind(line.variant_id)
            .bind(line.quantity)
            .bind(line.priced.unit_price)
            .bind(line.priced.unit_discount)
            .bind(line.priced.unit_tax)
            .bind(line.priced.line_total())
            .bind(&snapshot_json)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;

        tracing::info!(%order_number, %customer_id, %shop_id, "order placed");

        // Post-commit, best-effort side effects
        let mut warnings = Vec::new();

        let ordered_products: Vec<Uuid> = prepared.iter().map(|line| line.product_id).collect();
        if let Err(e) = self.clear_cart(customer_id, &ordered_products).await {
            tracing::warn!(%order_number, error = %e, "cart cleanup failed after placement");
            warnings.push("cart could not be cleared".to_string());
        }

        let invoice_url = match self
            .render_invoice(invoices, &order_number, &prepared, &totals)
            .await
        {
            Ok(url) => Some(url),
            Err(e) => {
                tracing::warn!(%order_number, error = %e, "invoice rendering failed");
                warnings.push("invoice generation is delayed".to_string());
                None
            }
        };

        let detail = self.get_order(&order_number).await?;

        Ok(OrderConfirmation {
            order_number,
            invoice_url,
            warnings,
            order: detail,
        })
    }

    /// Lock the product (and variant) rows for one item, validate stock,
    /// reserve it, and capture the pricing inputs and frozen snapshot.
    async fn lock_and_reserve(
        &self,
        tx: &mut PgConnection,
        item: &OrderItemInput,
        input_index: usize,
        shop_id: &mut Option<Uuid>,
    ) -> AppResult<PreparedLine> {
        let product = sqlx::query_as::<_, ProductForUpdate>(
            r#"
            SELECT id, shop_id, name, sku, price, discount, tax, image_url, stock_quantity
            FROM products
            WHERE id = $1
            FOR UPDATE
            "#,
        )
        .bind(item.product_id)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or_else(|| AppError::NotFound("Product".to_string()))?;

        match shop_id {
            None => *shop_id = Some(product.shop_id),
            Some(existing) if *existing != product.shop_id => {
                return Err(AppError::ValidationError(
                    "All items must belong to the same shop".to_string(),
                ));
            }
            Some(_) => {}
        }

        let (unit_price, variant_name, sku, available) = match item.variant_id {
            Some(variant_id) => {
                let variant = sqlx::query_as::<_, VariantForUpdate>(
                    r#"
                    SELECT id, name, sku, price, stock_quantity
                    FROM product_variants
                    WHERE id = $1 AND product_id = $2
                    FOR UPDATE
                    "#,
                )
                .bind(variant_id)
                .bind(item.product_id)
                .fetch_optional(&mut *tx)
                .await?
                .ok_or_else(|| AppError::NotFound("Product variant".to_string()))?;

                (
                    variant.price,
                    Some(variant.name),
                    variant.sku,
                    variant.stock_quantity,
                )
            }
            None => (product.price, None, product.sku.clone(), product.stock_quantity),
        };

        if available < item.quantity {
            return Err(AppError::InsufficientStock(format!(
                "{} has {} in stock, {} requested",
                product.name, available, item.quantity
            )));
        }

        inventory::reserve(tx, item.product_id, item.variant_id, item.quantity).await?;

        let snapshot = ProductSnapshot {
            product_id: product.id,
            variant_id: item.variant_id,
            name: product.name,
            sku,
            variant_name,
            image_url: product.image_url,
            unit_price,
        };

        Ok(PreparedLine {
            input_index,
            product_id: item.product_id,
            variant_id: item.variant_id,
            quantity: item.quantity,
            priced: pricing::PricedLine {
                unit_price,
                unit_discount: product.discount,
                unit_tax: product.tax,
                quantity: item.quantity,
            },
            snapshot,
        })
    }

    /// Remove the ordered products from the customer's cart
    async fn clear_cart(&self, customer_id: Uuid, product_ids: &[Uuid]) -> AppResult<()> {
        sqlx::query("DELETE FROM cart_items WHERE customer_id = $1 AND product_id = ANY($2)")
            .bind(customer_id)
            .bind(product_ids)
            .execute(&self.db)
            .await?;
        Ok(())
    }

    /// Render the invoice and store its URL on the order
    async fn render_invoice(
        &self,
        invoices: &InvoiceClient,
        order_number: &str,
        lines: &[PreparedLine],
        totals: &pricing::OrderTotals,
    ) -> AppResult<String> {
        let request = InvoiceRequest {
            order_number: order_number.to_string(),
            lines: lines
                .iter()
                .map(|line| InvoiceLine {
                    description: match &line.snapshot.variant_name {
                        Some(variant) => format!("{} ({})", line.snapshot.name, variant),
                        None => line.snapshot.name.clone(),
                    },
                    quantity: line.quantity,
                    unit_price: line.priced.unit_price,
                    line_total: line.priced.line_total(),
                })
                .collect(),
            subtotal: totals.subtotal,
            discount: totals.discount,
            tax: totals.tax,
            shipping_fee: totals.shipping_fee,
            grand_total: totals.grand_total,
        };

        let url = invoices.render(&request).await?;

        sqlx::query("UPDATE orders SET invoice_url = $1, updated_at = NOW() WHERE order_number = $2")
            .bind(&url)
            .bind(order_number)
            .execute(&self.db)
            .await?;

        Ok(url)
    }

    /// Fetch an order with its line items by order number
    pub async fn get_order(&self, order_number: &str) -> AppResult<OrderDetail> {
        let row = sqlx::query_as::<_, OrderRow>(
            r#"
            SELECT id, order_number, customer_id, shop_id, delivery_address,
                   payment_method, payment_status, status,
                   subtotal, discount, tax, shipping_fee, grand_total,
                   coupon_code, status_history, delivery_agent_id, courier_order_id,
                   rider_name, rider_phone, invoice_url,
                   created_at, updated_at, delivered_at
            FROM orders
            WHERE order_number = $1
            "#,
        )
        .bind(order_number)
        .fetch_optional(&self.db)
        .await?
        .ok_or_else(|| AppError::NotFound("Order".to_string()))?;

        let order: Order = row.try_into()?;

        let item_rows = sqlx::query_as::<_, OrderItemRow>(
            r#"
            SELECT id, order_id, product_id, variant_id, quantity,
                   unit_price, unit_discount, unit_tax, line_total, snapshot
            FROM order_items
            WHERE order_id = $1
            ORDER BY created_at ASC, id ASC
            "#,
        )
        .bind(order.id)
        .fetch_all(&self.db)
        .await?;

        let items = item_rows
            .into_iter()
            .map(OrderItem::try_from)
            .collect::<Result<Vec<_>, _>>()?;

        Ok(OrderDetail { order, items })
    }

    /// List a customer's orders, newest first
    pub async fn list_customer_orders(
        &self,
        customer_id: Uuid,
        pagination: Pagination,
    ) -> AppResult<PaginatedResponse<Order>> {
        let total = sqlx::query_scalar::<_, i64>(
            "SELECT COUNT(*) FROM orders WHERE customer_id = $1",
        )
        .bind(customer_id)
        .fetch_one(&self.db)
        .await?;

        let rows = sqlx::query_as::<_, OrderRow>(
            r#"
            SELECT id, order_number, customer_id, shop_id, delivery_address,
                   payment_method, payment_status, status,
                   subtotal, discount, tax, shipping_fee, grand_total,
                   coupon_code, status_history, delivery_agent_id, courier_order_id,
                   rider_name, rider_phone, invoice_url,
                   created_at, updated_at, delivered_at
            FROM orders
            WHERE customer_id = $1
            ORDER BY created_at DESC
            LIMIT $2 OFFSET $3
            "#,
        )
        .bind(customer_id)
        .bind(pagination.limit())
        .bind(pagination.offset())
        .fetch_all(&self.db)
        .await?;

        let data = rows
            .into_iter()
            .map(Order::try_from)
            .collect::<Result<Vec<_>, _>>()?;

        Ok(PaginatedResponse {
            data,
            pagination: PaginationMeta::new(&pagination, total as u64),
        })
    }

    /// List a shop's orders with allow-listed filtering and sorting.
    ///
    /// The status filter is parsed into the closed enum and the search term
    /// is always bound as a parameter; only the ORDER BY fragment comes
    /// from the fixed allow-list below.
    pub async fn list_shop_orders(
        &self,
        shop_id: Uuid,
        filter: ShopOrderFilter,
    ) -> AppResult<PaginatedResponse<Order>> {
        let status = match filter.status.as_deref() {
            None | Some("") => None,
            Some(raw) => Some(raw.parse::<OrderStatus>().map_err(|_| {
                AppError::Validation {
                    field: "status".to_string(),
                    message: format!("unknown status filter: {}", raw),
                }
            })?),
        };

        let order_by = sort_clause(filter.sort.as_deref())?;

        let total = sqlx::query_scalar::<_, i64>(
            r#"
            SELECT COUNT(*)
            FROM orders
            WHERE shop_id = $1
              AND ($2::text IS NULL OR status = $2)
              AND ($3::text IS NULL OR order_number ILIKE '%' || $3 || '%')
            "#,
        )
        .bind(shop_id)
        .bind(status.map(|s| s.as_str()))
        .bind(&filter.search)
        .fetch_one(&self.db)
        .await?;

        let query = format!(
            r#"
            SELECT id, order_number, customer_id, shop_id, delivery_address,
                   payment_method, payment_status, status,
                   subtotal, discount, tax, shipping_fee, grand_total,
                   coupon_code, status_history, delivery_agent_id, courier_order_id,
                   rider_name, rider_phone, invoice_url,
                   created_at, updated_at, delivered_at
            FROM orders
            WHERE shop_id = $1
              AND ($2::text IS NULL OR status = $2)
              AND ($3::text IS NULL OR order_number ILIKE '%' || $3 || '%')
            ORDER BY {}
            LIMIT $4 OFFSET $5
            "#,
            order_by
        );

        let rows = sqlx::query_as::<_, OrderRow>(&query)
            .bind(shop_id)
            .bind(status.map(|s| s.as_str()))
            .bind(&filter.search)
            .bind(filter.pagination.limit())
            .bind(filter.pagination.offset())
            .fetch_all(&self.db)
            .await?;

        let data = rows
            .into_iter()
            .map(Order::try_from)
            .collect::<Result<Vec<_>, _>>()?;

        Ok(PaginatedResponse {
            data,
            pagination: PaginationMeta::new(&filter.pagination, total as u64),
        })
    }
}

/// Allow-list of sortable columns for the shop order listing
fn sort_clause(sort: Option<&str>) -> AppResult<&'static str> {
    match sort {
        None | Some("") | Some("newest") => Ok("created_at DESC"),
        Some("oldest") => Ok("created_at ASC"),
        Some("amount") => Ok("grand_total DESC, created_at DESC"),
        Some("status") => Ok("status ASC, created_at DESC"),
        Some(other) => Err(AppError::Validation {
            field: "sort".to_string(),
            message: format!("unknown sort key: {}", other),
        }),
    }
}
