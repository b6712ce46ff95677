//! # Order Repository
//!
//! Checkout: the Stock-Commit unit of work plus the order it pays for, in
//! one transaction.
//!
//! ## Checkout Flow
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  checkout_cart(user, contact, method, key)                              │
//! │                                                                         │
//! │  BEGIN                                                                  │
//! │    ├── key already used? ──────────────────► return stored order       │
//! │    ├── load cart_lines (empty? InvalidCartItem)                         │
//! │    ├── plan_in_tx()        stock re-read + cumulative staging           │
//! │    ├── price each line     catalog offer price read in this tx          │
//! │    ├── apply_writes()      guarded UPDATEs (Conflict ──► retry all)     │
//! │    ├── next_number(OD)                                                  │
//! │    ├── INSERT orders + order_items                                      │
//! │    └── DELETE cart_lines                                                │
//! │  COMMIT                                                                 │
//! │                                                                         │
//! │  publish StockChanged × n, OrderPlaced                                  │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! The cart's captured price is only what the customer saw. The order is
//! charged at the offer price read inside the transaction; any difference is
//! logged.

use std::collections::hash_map::Entry;
use std::collections::HashMap;

use chrono::{DateTime, Utc};
use sqlx::{SqliteConnection, SqlitePool};
use tracing::{debug, info, warn};
use uuid::Uuid;

use pitstop_core::sequence::SequenceKind;
use pitstop_core::validation::validate_contact;
use pitstop_core::{
    CartLine, ContactInfo, Money, Order, OrderItem, OrderStatus, PaymentMethod, PaymentStatus, Product,
    StockError, StockRequest, StockUpdate,
};

use crate::error::{DbError, DbResult};
use crate::events::StoreEvent;
use crate::pool::StoreContext;
use crate::repository::cart::{clear_cart, load_cart};
use crate::repository::counter::next_number;
use crate::repository::inventory::{apply_writes, plan_in_tx};
use crate::repository::product::fetch_product;
use crate::retry::with_retry;

// =============================================================================
// Input
// =============================================================================

/// One line of a direct order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderLine {
    pub product_id: String,
    pub sku: String,
    pub quantity: i64,
    /// The price the customer saw, if known. Only compared, never charged.
    pub expected_price: Option<Money>,
}

impl OrderLine {
    pub fn new(product_id: impl Into<String>, sku: impl Into<String>, quantity: i64) -> Self {
        OrderLine {
            product_id: product_id.into(),
            sku: sku.into(),
            quantity,
            expected_price: None,
        }
    }

    fn to_request(&self) -> StockRequest {
        StockRequest::new(&self.product_id, &self.sku, self.quantity)
    }
}

impl From<&CartLine> for OrderLine {
    fn from(line: &CartLine) -> Self {
        OrderLine {
            product_id: line.product_id.clone(),
            sku: line.sku.clone(),
            quantity: line.quantity,
            expected_price: Some(line.unit_price),
        }
    }
}

/// A direct order that does not go through the persisted cart.
#[derive(Debug, Clone)]
pub struct PlaceOrder {
    pub user_id: String,
    pub lines: Vec<OrderLine>,
    pub contact: ContactInfo,
    pub payment_method: PaymentMethod,
    /// Retrying with the same key returns the first order.
    pub idempotency_key: Option<String>,
}

enum LineSource<'a> {
    Lines(&'a [OrderLine]),
    Cart,
}

enum Placed {
    Created(Order, Vec<StockUpdate>),
    Existing(Order),
}

// =============================================================================
// Rows
// =============================================================================

#[derive(Debug, sqlx::FromRow)]
struct OrderRow {
    id: String,
    order_number: String,
    user_id: String,
    subtotal_paise: i64,
    total_paise: i64,
    payment_method: PaymentMethod,
    payment_status: PaymentStatus,
    status: OrderStatus,
    contact_name: String,
    contact_phone: String,
    contact_address: Option<String>,
    idempotency_key: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

#[derive(Debug, sqlx::FromRow)]
struct OrderItemRow {
    product_id: String,
    sku: String,
    name: String,
    variant_label: String,
    unit_price_paise: i64,
    quantity: i64,
    line_total_paise: i64,
}

impl From<OrderItemRow> for OrderItem {
    fn from(row: OrderItemRow) -> Self {
        OrderItem {
            product_id: row.product_id,
            sku: row.sku,
            name: row.name,
            variant_label: row.variant_label,
            unit_price: Money::from_paise(row.unit_price_paise),
            quantity: row.quantity,
            line_total: Money::from_paise(row.line_total_paise),
        }
    }
}

impl OrderRow {
    fn into_order(self, items: Vec<OrderItem>) -> Order {
        Order {
            id: self.id,
            order_number: self.order_number,
            user_id: self.user_id,
            items,
            subtotal: Money::from_paise(self.subtotal_paise),
            total: Money::from_paise(self.total_paise),
            payment_method: self.payment_method,
            payment_status: self.payment_status,
            status: self.status,
            contact: ContactInfo {
                name: self.contact_name,
                phone: self.contact_phone,
                address: self.contact_address,
            },
            idempotency_key: self.idempotency_key,
            created_at: self.created_at,
            updated_at: self.updated_at,
        }
    }
}

const ORDER_COLUMNS: &str = r#"
    id, order_number, user_id, subtotal_paise, total_paise,
    payment_method, payment_status, status,
    contact_name, contact_phone, contact_address,
    idempotency_key, created_at, updated_at
"#;

// =============================================================================
// Connection-Level Helpers
// =============================================================================

async fn fetch_items(conn: &mut SqliteConnection, order_id: &str) -> DbResult<Vec<OrderItem>> {
    let rows: Vec<OrderItemRow> = sqlx::query_as(
        r#"
        SELECT product_id, sku, name, variant_label, unit_price_paise, quantity, line_total_paise
        FROM order_items
        WHERE order_id = ?1
        ORDER BY line_no
        "#,
    )
    .bind(order_id)
    .fetch_all(&mut *conn)
    .await?;

    Ok(rows.into_iter().map(OrderItem::from).collect())
}

/// Loads the order whose `column` equals `value`.
///
/// `column` is always one of this module's own literals.
async fn fetch_order_by(conn: &mut SqliteConnection, column: &str, value: &str) -> DbResult<Option<Order>> {
    let sql = format!("SELECT {} FROM orders WHERE {} = ?1", ORDER_COLUMNS, column);
    let row: Option<OrderRow> = sqlx::query_as(&sql)
        .bind(value)
        .fetch_optional(&mut *conn)
        .await?;

    match row {
        Some(row) => {
            let items = fetch_items(conn, &row.id).await?;
            Ok(Some(row.into_order(items)))
        }
        None => Ok(None),
    }
}

async fn insert_order(conn: &mut SqliteConnection, order: &Order) -> DbResult<()> {
    sqlx::query(
        r#"
        INSERT INTO orders (
            id, order_number, user_id, subtotal_paise, total_paise,
            payment_method, payment_status, status,
            contact_name, contact_phone, contact_address,
            idempotency_key, created_at, updated_at
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14)
        "#,
    )
    .bind(&order.id)
    .bind(&order.order_number)
    .bind(&order.user_id)
    .bind(order.subtotal.paise())
    .bind(order.total.paise())
    .bind(order.payment_method)
    .bind(order.payment_status)
    .bind(order.status)
    .bind(&order.contact.name)
    .bind(&order.contact.phone)
    .bind(&order.contact.address)
    .bind(&order.idempotency_key)
    .bind(order.created_at)
    .bind(order.updated_at)
    .execute(&mut *conn)
    .await?;

    for (idx, item) in order.items.iter().enumerate() {
        sqlx::query(
            r#"
            INSERT INTO order_items (
                order_id, line_no, product_id, sku, name, variant_label,
                unit_price_paise, quantity, line_total_paise
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
            "#,
        )
        .bind(&order.id)
        .bind(idx as i64 + 1)
        .bind(&item.product_id)
        .bind(&item.sku)
        .bind(&item.name)
        .bind(&item.variant_label)
        .bind(item.unit_price.paise())
        .bind(item.quantity)
        .bind(item.line_total.paise())
        .execute(&mut *conn)
        .await?;
    }

    Ok(())
}

/// Prices each line from the catalog as read on `conn`.
async fn price_lines(conn: &mut SqliteConnection, lines: &[OrderLine]) -> DbResult<Vec<OrderItem>> {
    let mut products: HashMap<String, Product> = HashMap::new();
    let mut items = Vec::with_capacity(lines.len());

    for line in lines {
        let product = match products.entry(line.product_id.clone()) {
            Entry::Occupied(entry) => entry.into_mut(),
            Entry::Vacant(entry) => {
                let product = fetch_product(conn, &line.product_id)
                    .await?
                    .ok_or_else(|| StockError::ProductNotFound {
                        product_id: line.product_id.clone(),
                    })?;
                entry.insert(product)
            }
        };

        let unit_price = product.offer_price;
        if let Some(expected) = line.expected_price {
            if expected != unit_price {
                warn!(
                    product_id = %line.product_id,
                    sku = %line.sku,
                    expected = %expected,
                    charged = %unit_price,
                    "Price changed since the item was added"
                );
            }
        }

        let line_total = unit_price
            .checked_multiply_quantity(line.quantity)
            .ok_or_else(|| StockError::invalid_item(format!("{}: line total overflows", line.sku)))?;

        items.push(OrderItem {
            product_id: line.product_id.clone(),
            sku: line.sku.clone(),
            name: product.name.clone(),
            variant_label: product.variant(&line.sku).map(|v| v.label()).unwrap_or_default(),
            unit_price,
            quantity: line.quantity,
            line_total,
        });
    }

    Ok(items)
}

// =============================================================================
// Repository
// =============================================================================

/// Repository for checkout and order lookups.
///
/// ## Usage
/// ```rust,ignore
/// let order = db
///     .orders()
///     .checkout_cart("user-1", contact, PaymentMethod::CashOnDelivery, Some("tap-42".into()))
///     .await?;
/// println!("Placed {}", order.order_number);
/// ```
#[derive(Debug, Clone)]
pub struct OrderRepository {
    pool: SqlitePool,
    ctx: StoreContext,
}

impl OrderRepository {
    /// Creates a new OrderRepository.
    pub fn new(pool: SqlitePool, ctx: StoreContext) -> Self {
        OrderRepository { pool, ctx }
    }

    /// Places an order for explicit lines.
    ///
    /// ## Returns
    /// * `Ok(Order)` - The new order, or the stored one when the idempotency key was used before
    /// * `Err(DbError::Stock(_))` - A line was rejected; nothing was written
    /// * `Err(DbError::Validation(_))` - Bad contact details
    /// * `Err(DbError::CommitFailed)` - Conflicts outlasted the retry policy
    pub async fn place_order(&self, order: PlaceOrder) -> DbResult<Order> {
        validate_contact(&order.contact)?;
        let requests: Vec<StockRequest> = order.lines.iter().map(OrderLine::to_request).collect();
        pitstop_core::stock::validate_requests(&requests)?;

        debug!(user_id = %order.user_id, lines = order.lines.len(), "Placing order");

        self.run(
            &order.user_id,
            &order.contact,
            order.payment_method,
            order.idempotency_key.as_deref(),
            LineSource::Lines(&order.lines),
        )
        .await
    }

    /// Checks out the user's persisted cart and empties it.
    ///
    /// Same guarantees as [`place_order`](Self::place_order). An empty cart
    /// fails with `InvalidCartItem` unless the key matches an earlier order.
    pub async fn checkout_cart(
        &self,
        user_id: &str,
        contact: ContactInfo,
        payment_method: PaymentMethod,
        idempotency_key: Option<String>,
    ) -> DbResult<Order> {
        validate_contact(&contact)?;
        debug!(user_id = %user_id, "Checking out cart");

        self.run(
            user_id,
            &contact,
            payment_method,
            idempotency_key.as_deref(),
            LineSource::Cart,
        )
        .await
    }

    async fn run(
        &self,
        user_id: &str,
        contact: &ContactInfo,
        payment_method: PaymentMethod,
        idempotency_key: Option<&str>,
        source: LineSource<'_>,
    ) -> DbResult<Order> {
        let result = with_retry(&self.ctx.retry, "checkout", || {
            self.try_place(user_id, contact, payment_method, idempotency_key, &source)
        })
        .await;

        let placed = match (result, idempotency_key) {
            // A concurrent request with the same key committed first
            (Err(err), Some(key)) if err.is_unique_violation_on("idempotency_key") => {
                let mut conn = self.pool.acquire().await?;
                match fetch_order_by(&mut conn, "idempotency_key", key).await? {
                    Some(existing) if existing.user_id == user_id => Placed::Existing(existing),
                    _ => return Err(err),
                }
            }
            (result, _) => result?,
        };

        match placed {
            Placed::Created(order, updates) => {
                info!(
                    order_number = %order.order_number,
                    user_id = %order.user_id,
                    items = order.items.len(),
                    total = %order.total,
                    "Order placed"
                );
                self.ctx.feed.publish_stock(&updates);
                self.ctx.feed.publish(StoreEvent::OrderPlaced {
                    order_id: order.id.clone(),
                    order_number: order.order_number.clone(),
                    user_id: order.user_id.clone(),
                    total: order.total,
                });
                Ok(order)
            }
            Placed::Existing(order) => {
                info!(order_number = %order.order_number, "Idempotent replay, returning stored order");
                Ok(order)
            }
        }
    }

    async fn try_place(
        &self,
        user_id: &str,
        contact: &ContactInfo,
        payment_method: PaymentMethod,
        idempotency_key: Option<&str>,
        source: &LineSource<'_>,
    ) -> DbResult<Placed> {
        let mut tx = self.pool.begin().await?;

        if let Some(key) = idempotency_key {
            if let Some(existing) = fetch_order_by(&mut tx, "idempotency_key", key).await? {
                if existing.user_id != user_id {
                    return Err(DbError::duplicate("idempotency_key", key));
                }
                return Ok(Placed::Existing(existing));
            }
        }

        let cart_lines;
        let lines: &[OrderLine] = match source {
            LineSource::Lines(lines) => *lines,
            LineSource::Cart => {
                let cart = load_cart(&mut tx, user_id).await?;
                if cart.is_empty() {
                    return Err(StockError::invalid_item("cart is empty").into());
                }
                cart_lines = cart.lines.iter().map(OrderLine::from).collect::<Vec<_>>();
                &cart_lines
            }
        };

        let requests: Vec<StockRequest> = lines.iter().map(OrderLine::to_request).collect();
        let plan = plan_in_tx(&mut tx, &requests).await?;
        let items = price_lines(&mut tx, lines).await?;
        apply_writes(&mut tx, &plan).await?;

        let subtotal = items
            .iter()
            .try_fold(Money::zero(), |acc, item| acc.checked_add(item.line_total))
            .ok_or_else(|| StockError::invalid_item("order total overflows"))?;

        let now = Utc::now();
        let order = Order {
            id: Uuid::new_v4().to_string(),
            order_number: next_number(&mut tx, &self.ctx.sequences, SequenceKind::Order).await?,
            user_id: user_id.to_string(),
            items,
            subtotal,
            total: subtotal,
            payment_method,
            payment_status: PaymentStatus::Pending,
            status: OrderStatus::Placed,
            contact: contact.clone(),
            idempotency_key: idempotency_key.map(str::to_string),
            created_at: now,
            updated_at: now,
        };
        insert_order(&mut tx, &order).await?;

        if matches!(source, LineSource::Cart) {
            clear_cart(&mut tx, user_id).await?;
        }

        tx.commit().await?;
        Ok(Placed::Created(order, plan.into_updates()))
    }

    /// Gets an order by its ID.
    pub async fn get_by_id(&self, id: &str) -> DbResult<Option<Order>> {
        let mut conn = self.pool.acquire().await?;
        fetch_order_by(&mut conn, "id", id).await
    }

    /// Gets an order by its number, e.g. `OD004`.
    pub async fn get_by_number(&self, order_number: &str) -> DbResult<Option<Order>> {
        let mut conn = self.pool.acquire().await?;
        fetch_order_by(&mut conn, "order_number", order_number).await
    }

    /// Lists a customer's orders, newest first.
    pub async fn list_for_user(&self, user_id: &str) -> DbResult<Vec<Order>> {
        let sql = format!(
            "SELECT {} FROM orders WHERE user_id = ?1 ORDER BY created_at DESC, order_number DESC",
            ORDER_COLUMNS
        );
        let mut conn = self.pool.acquire().await?;
        let rows: Vec<OrderRow> = sqlx::query_as(&sql)
            .bind(user_id)
            .fetch_all(&mut *conn)
            .await?;

        let mut orders = Vec::with_capacity(rows.len());
        for row in rows {
            let items = fetch_items(&mut conn, &row.id).await?;
            orders.push(row.into_order(items));
        }
        Ok(orders)
    }

    /// Sets the fulfilment status. Items and totals never change.
    pub async fn update_status(&self, id: &str, status: OrderStatus) -> DbResult<Order> {
        debug!(order_id = %id, status = ?status, "Updating order status");
        let mut conn = self.pool.acquire().await?;

        let result = sqlx::query("UPDATE orders SET status = ?2, updated_at = ?3 WHERE id = ?1")
            .bind(id)
            .bind(status)
            .bind(Utc::now())
            .execute(&mut *conn)
            .await?;

        self.finish_update(&mut conn, id, result.rows_affected()).await
    }

    /// Sets the payment status.
    pub async fn update_payment_status(&self, id: &str, status: PaymentStatus) -> DbResult<Order> {
        debug!(order_id = %id, payment_status = ?status, "Updating order payment status");
        let mut conn = self.pool.acquire().await?;

        let result = sqlx::query("UPDATE orders SET payment_status = ?2, updated_at = ?3 WHERE id = ?1")
            .bind(id)
            .bind(status)
            .bind(Utc::now())
            .execute(&mut *conn)
            .await?;

        self.finish_update(&mut conn, id, result.rows_affected()).await
    }

    async fn finish_update(&self, conn: &mut SqliteConnection, id: &str, rows_affected: u64) -> DbResult<Order> {
        if rows_affected == 0 {
            return Err(DbError::not_found("Order", id));
        }

        let order = fetch_order_by(conn, "id", id)
            .await?
            .ok_or_else(|| DbError::not_found("Order", id))?;

        self.ctx.feed.publish(StoreEvent::OrderUpdated {
            order_id: order.id.clone(),
            status: order.status,
            payment_status: order.payment_status,
        });
        Ok(order)
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::{Database, DbConfig};
    use pitstop_core::Variant;

    fn contact() -> ContactInfo {
        ContactInfo {
            name: "Asha Rao".to_string(),
            phone: "9845012345".to_string(),
            address: Some("12 MG Road, Bengaluru".to_string()),
        }
    }

    async fn seeded() -> (Database, Product) {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let product = Product {
            id: String::new(),
            name: "Headlight Bulb".to_string(),
            brand: Some("Philips".to_string()),
            description: None,
            mrp: Money::from_major(400),
            discount_bps: 0,
            offer_price: Money::zero(),
            rating: 4.5,
            images: vec![],
            tags: vec![],
            warranty: None,
            return_policy: None,
            is_active: true,
            is_featured: false,
            variants: vec![Variant {
                sku: "HB-H4".to_string(),
                position: None,
                material: Some("Halogen".to_string()),
                stock: 3,
                sort_order: 0,
            }],
            total_stock: 0,
            version: 0,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        };
        let stored = db.products().insert(&product).await.unwrap();
        (db, stored)
    }

    #[tokio::test]
    async fn test_place_order_decrements_and_prices_from_catalog() {
        let (db, product) = seeded().await;
        let mut line = OrderLine::new(&product.id, "HB-H4", 2);
        line.expected_price = Some(Money::from_major(350));

        let order = db
            .orders()
            .place_order(PlaceOrder {
                user_id: "u1".to_string(),
                lines: vec![line],
                contact: contact(),
                payment_method: PaymentMethod::CashOnDelivery,
                idempotency_key: None,
            })
            .await
            .unwrap();

        assert_eq!(order.order_number, "OD001");
        assert_eq!(order.items[0].unit_price, Money::from_major(400));
        assert_eq!(order.items[0].variant_label, "Halogen");
        assert_eq!(order.total, Money::from_major(800));
        assert_eq!(order.total, order.subtotal);
        assert_eq!(db.inventory().get_stock(&product.id, "HB-H4").await.unwrap(), 1);

        let loaded = db.orders().get_by_number("OD001").await.unwrap().unwrap();
        assert_eq!(loaded.items.len(), 1);
        assert_eq!(loaded.payment_method, PaymentMethod::CashOnDelivery);
    }

    #[tokio::test]
    async fn test_checkout_clears_cart() {
        let (db, product) = seeded().await;
        db.carts().add("u1", &product.id, "HB-H4", 3).await.unwrap();

        let order = db
            .orders()
            .checkout_cart("u1", contact(), PaymentMethod::Online, None)
            .await
            .unwrap();

        assert_eq!(order.items[0].quantity, 3);
        assert!(db.carts().get("u1").await.unwrap().is_empty());
        assert_eq!(db.inventory().get_stock(&product.id, "HB-H4").await.unwrap(), 0);
        assert_eq!(db.orders().list_for_user("u1").await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_failed_checkout_keeps_cart_and_number() {
        let (db, product) = seeded().await;
        db.carts().add("u1", &product.id, "HB-H4", 4).await.unwrap();

        let err = db
            .orders()
            .checkout_cart("u1", contact(), PaymentMethod::Online, None)
            .await
            .unwrap_err();

        assert!(matches!(err, DbError::Stock(StockError::OutOfStock { .. })));
        assert_eq!(db.carts().get("u1").await.unwrap().total_quantity(), 4);
        assert_eq!(db.counters().current(SequenceKind::Order).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_empty_cart_rejected() {
        let (db, _) = seeded().await;

        let err = db
            .orders()
            .checkout_cart("u1", contact(), PaymentMethod::Online, None)
            .await
            .unwrap_err();
        assert!(matches!(err, DbError::Stock(StockError::InvalidCartItem { .. })));
    }

    #[tokio::test]
    async fn test_status_updates() {
        let (db, product) = seeded().await;
        let order = db
            .orders()
            .place_order(PlaceOrder {
                user_id: "u1".to_string(),
                lines: vec![OrderLine::new(&product.id, "HB-H4", 1)],
                contact: contact(),
                payment_method: PaymentMethod::Online,
                idempotency_key: None,
            })
            .await
            .unwrap();

        let updated = db
            .orders()
            .update_payment_status(&order.id, PaymentStatus::Paid)
            .await
            .unwrap();
        assert_eq!(updated.payment_status, PaymentStatus::Paid);

        let updated = db
            .orders()
            .update_status(&order.id, OrderStatus::Shipped)
            .await
            .unwrap();
        assert_eq!(updated.status, OrderStatus::Shipped);
        assert_eq!(updated.total, order.total);

        assert!(matches!(
            db.orders().update_status("missing", OrderStatus::Shipped).await,
            Err(DbError::NotFound { .. })
        ));
    }

    #[tokio::test]
    async fn test_checkout_replay_returns_same_order() {
        let (db, product) = seeded().await;
        db.carts().add("u1", &product.id, "HB-H4", 1).await.unwrap();
        let mut sub = db.subscribe();

        let first = db
            .orders()
            .checkout_cart("u1", contact(), PaymentMethod::Online, Some("chk-1".to_string()))
            .await
            .unwrap();

        // The cart is empty now, so only the stored order can satisfy a replay
        let replay = db
            .orders()
            .checkout_cart("u1", contact(), PaymentMethod::Online, Some("chk-1".to_string()))
            .await
            .unwrap();

        assert_eq!(replay.id, first.id);
        assert_eq!(replay.order_number, "OD001");
        assert_eq!(db.inventory().get_stock(&product.id, "HB-H4").await.unwrap(), 2);
        assert_eq!(db.counters().current(SequenceKind::Order).await.unwrap(), 1);

        let mut placed = 0;
        while let Some(event) = sub.try_recv() {
            if matches!(event, StoreEvent::OrderPlaced { .. }) {
                placed += 1;
            }
        }
        assert_eq!(placed, 1);
    }

    #[tokio::test]
    async fn test_idempotency_key_is_per_user() {
        let (db, product) = seeded().await;
        let place = |user: &str| PlaceOrder {
            user_id: user.to_string(),
            lines: vec![OrderLine::new(&product.id, "HB-H4", 1)],
            contact: contact(),
            payment_method: PaymentMethod::Online,
            idempotency_key: Some("shared".to_string()),
        };

        db.orders().place_order(place("u1")).await.unwrap();
        let err = db.orders().place_order(place("u2")).await.unwrap_err();

        assert!(err.is_unique_violation_on("idempotency_key"));
        assert_eq!(db.inventory().get_stock(&product.id, "HB-H4").await.unwrap(), 2);
    }
}
