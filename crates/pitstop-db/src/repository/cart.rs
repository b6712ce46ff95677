//! # Cart Repository
//!
//! Persists each customer's [`Cart`] in `cart_lines`, keyed by
//! `(user_id, sku)`. Every mutation loads the cart, applies the rule from
//! `pitstop_core::cart`, and writes the changed line back in one transaction.
//!
//! Cart lines never touch stock. Stock is checked when the cart is checked
//! out (see [`OrderRepository::checkout_cart`]).
//!
//! [`OrderRepository::checkout_cart`]: crate::repository::order::OrderRepository::checkout_cart

use chrono::{DateTime, Utc};
use sqlx::{SqliteConnection, SqlitePool};
use tracing::debug;

use pitstop_core::{Cart, CartLine, Money, StockError};

use crate::error::DbResult;
use crate::repository::product::fetch_product;

#[derive(Debug, sqlx::FromRow)]
struct CartLineRow {
    product_id: String,
    sku: String,
    name: String,
    variant_label: String,
    unit_price_paise: i64,
    quantity: i64,
    added_at: DateTime<Utc>,
}

impl From<CartLineRow> for CartLine {
    fn from(row: CartLineRow) -> Self {
        CartLine {
            product_id: row.product_id,
            sku: row.sku,
            name: row.name,
            variant_label: row.variant_label,
            unit_price: Money::from_paise(row.unit_price_paise),
            quantity: row.quantity,
            added_at: row.added_at,
        }
    }
}

/// Loads `user_id`'s cart on `conn`.
pub(crate) async fn load_cart(conn: &mut SqliteConnection, user_id: &str) -> DbResult<Cart> {
    let rows: Vec<CartLineRow> = sqlx::query_as(
        r#"
        SELECT product_id, sku, name, variant_label, unit_price_paise, quantity, added_at
        FROM cart_lines
        WHERE user_id = ?1
        ORDER BY added_at, rowid
        "#,
    )
    .bind(user_id)
    .fetch_all(&mut *conn)
    .await?;

    Ok(Cart::from_lines(user_id, rows.into_iter().map(CartLine::from).collect()))
}

/// Deletes every line of `user_id`'s cart on `conn`.
pub(crate) async fn clear_cart(conn: &mut SqliteConnection, user_id: &str) -> DbResult<u64> {
    let result = sqlx::query("DELETE FROM cart_lines WHERE user_id = ?1")
        .bind(user_id)
        .execute(&mut *conn)
        .await?;

    Ok(result.rows_affected())
}

async fn save_line(conn: &mut SqliteConnection, user_id: &str, line: &CartLine) -> DbResult<()> {
    sqlx::query(
        r#"
        INSERT INTO cart_lines (
            user_id, sku, product_id, name, variant_label, unit_price_paise, quantity, added_at
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
        ON CONFLICT (user_id, sku) DO UPDATE SET quantity = excluded.quantity
        "#,
    )
    .bind(user_id)
    .bind(&line.sku)
    .bind(&line.product_id)
    .bind(&line.name)
    .bind(&line.variant_label)
    .bind(line.unit_price.paise())
    .bind(line.quantity)
    .bind(line.added_at)
    .execute(&mut *conn)
    .await?;

    Ok(())
}

async fn delete_line(conn: &mut SqliteConnection, user_id: &str, sku: &str) -> DbResult<()> {
    sqlx::query("DELETE FROM cart_lines WHERE user_id = ?1 AND sku = ?2")
        .bind(user_id)
        .bind(sku)
        .execute(&mut *conn)
        .await?;

    Ok(())
}

/// Repository for per-user carts.
#[derive(Debug, Clone)]
pub struct CartRepository {
    pool: SqlitePool,
}

impl CartRepository {
    /// Creates a new CartRepository.
    pub fn new(pool: SqlitePool) -> Self {
        CartRepository { pool }
    }

    /// Gets the cart for `user_id` (empty if nothing was added yet).
    pub async fn get(&self, user_id: &str) -> DbResult<Cart> {
        let mut conn = self.pool.acquire().await?;
        load_cart(&mut conn, user_id).await
    }

    /// Adds `quantity` of `sku` to the cart, merging with an existing line.
    ///
    /// The price and labels are captured from the catalog now. Stock is not
    /// checked here.
    ///
    /// ## Errors
    /// - `Stock(ProductNotFound)` for a missing or deactivated product
    /// - `Stock(VariantNotFound)` when the product has variants and `sku` is not one
    /// - `Cart(_)` for quantity or size limits
    pub async fn add(&self, user_id: &str, product_id: &str, sku: &str, quantity: i64) -> DbResult<Cart> {
        debug!(user_id = %user_id, product_id = %product_id, sku = %sku, quantity = quantity, "Adding to cart");

        let mut tx = self.pool.begin().await?;

        let product = fetch_product(&mut tx, product_id)
            .await?
            .filter(|p| p.is_active)
            .ok_or_else(|| StockError::ProductNotFound {
                product_id: product_id.to_string(),
            })?;

        let variant = if product.variants.is_empty() {
            None
        } else {
            Some(product.variant(sku).ok_or_else(|| StockError::VariantNotFound {
                product_id: product_id.to_string(),
                sku: sku.to_string(),
            })?)
        };

        let mut cart = load_cart(&mut tx, user_id).await?;
        let line = cart
            .add(CartLine::from_product(&product, variant, sku, quantity))?
            .clone();
        save_line(&mut tx, user_id, &line).await?;

        tx.commit().await?;
        Ok(cart)
    }

    /// The "+" button. Returns the new quantity.
    pub async fn increment(&self, user_id: &str, sku: &str) -> DbResult<i64> {
        self.update_line(user_id, sku, |cart| cart.increment(sku)).await
    }

    /// The "-" button. Returns the new quantity.
    ///
    /// Fails with `QuantityBelowMinimum` at quantity 1.
    pub async fn decrement(&self, user_id: &str, sku: &str) -> DbResult<i64> {
        self.update_line(user_id, sku, |cart| cart.decrement(sku)).await
    }

    /// Sets the quantity of a line directly.
    pub async fn set_quantity(&self, user_id: &str, sku: &str, quantity: i64) -> DbResult<i64> {
        self.update_line(user_id, sku, |cart| {
            cart.set_quantity(sku, quantity)?;
            Ok(quantity)
        })
        .await
    }

    async fn update_line<F>(&self, user_id: &str, sku: &str, apply: F) -> DbResult<i64>
    where
        F: FnOnce(&mut Cart) -> pitstop_core::error::CoreResult<i64>,
    {
        let mut tx = self.pool.begin().await?;

        let mut cart = load_cart(&mut tx, user_id).await?;
        let quantity = apply(&mut cart)?;
        if let Some(line) = cart.line(sku) {
            save_line(&mut tx, user_id, line).await?;
        }

        tx.commit().await?;
        debug!(user_id = %user_id, sku = %sku, quantity = quantity, "Cart line updated");
        Ok(quantity)
    }

    /// Removes a line. Returns the removed line.
    pub async fn remove(&self, user_id: &str, sku: &str) -> DbResult<CartLine> {
        let mut tx = self.pool.begin().await?;

        let mut cart = load_cart(&mut tx, user_id).await?;
        let removed = cart.remove(sku)?;
        delete_line(&mut tx, user_id, sku).await?;

        tx.commit().await?;
        debug!(user_id = %user_id, sku = %sku, "Cart line removed");
        Ok(removed)
    }

    /// Empties the cart. Returns how many lines were removed.
    pub async fn clear(&self, user_id: &str) -> DbResult<u64> {
        let mut conn = self.pool.acquire().await?;
        let removed = clear_cart(&mut conn, user_id).await?;

        debug!(user_id = %user_id, removed = removed, "Cart cleared");
        Ok(removed)
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::DbError;
    use crate::pool::{Database, DbConfig};
    use pitstop_core::{CoreError, Product, Variant};

    async fn seeded() -> (Database, Product) {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let product = Product {
            id: String::new(),
            name: "Wiper Blade".to_string(),
            brand: Some("Bosch".to_string()),
            description: None,
            mrp: Money::from_major(500),
            discount_bps: 1000,
            offer_price: Money::zero(),
            rating: 4.1,
            images: vec![],
            tags: vec![],
            warranty: None,
            return_policy: None,
            is_active: true,
            is_featured: false,
            variants: vec![Variant {
                sku: "WB-22".to_string(),
                position: Some("Driver".to_string()),
                material: Some("Rubber".to_string()),
                stock: 10,
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
    async fn test_add_merges_same_sku() {
        let (db, product) = seeded().await;
        let carts = db.carts();

        carts.add("u1", &product.id, "WB-22", 2).await.unwrap();
        let cart = carts.add("u1", &product.id, "WB-22", 3).await.unwrap();

        assert_eq!(cart.item_count(), 1);
        assert_eq!(cart.lines[0].quantity, 5);
        assert_eq!(cart.lines[0].unit_price, Money::from_major(450));
        assert_eq!(cart.lines[0].variant_label, "Driver / Rubber");

        let stored = carts.get("u1").await.unwrap();
        assert_eq!(stored.total_quantity(), 5);
        assert!(carts.get("u2").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_add_unknown_variant() {
        let (db, product) = seeded().await;

        let err = db.carts().add("u1", &product.id, "WB-99", 1).await.unwrap_err();
        assert!(matches!(err, DbError::Stock(StockError::VariantNotFound { .. })));

        let err = db.carts().add("u1", "ghost", "WB-22", 1).await.unwrap_err();
        assert!(matches!(err, DbError::Stock(StockError::ProductNotFound { .. })));
    }

    #[tokio::test]
    async fn test_decrement_stops_at_one() {
        let (db, product) = seeded().await;
        let carts = db.carts();
        carts.add("u1", &product.id, "WB-22", 2).await.unwrap();

        assert_eq!(carts.decrement("u1", "WB-22").await.unwrap(), 1);
        let err = carts.decrement("u1", "WB-22").await.unwrap_err();
        assert!(matches!(err, DbError::Cart(CoreError::QuantityBelowMinimum { .. })));
        assert_eq!(carts.get("u1").await.unwrap().lines[0].quantity, 1);

        assert_eq!(carts.increment("u1", "WB-22").await.unwrap(), 2);
        assert_eq!(carts.set_quantity("u1", "WB-22", 7).await.unwrap(), 7);
        assert!(carts.set_quantity("u1", "WB-22", 1000).await.is_err());
    }

    #[tokio::test]
    async fn test_remove_and_clear() {
        let (db, product) = seeded().await;
        let carts = db.carts();
        carts.add("u1", &product.id, "WB-22", 1).await.unwrap();

        let removed = carts.remove("u1", "WB-22").await.unwrap();
        assert_eq!(removed.sku, "WB-22");
        assert!(matches!(
            carts.remove("u1", "WB-22").await,
            Err(DbError::Cart(CoreError::CartLineNotFound { .. }))
        ));

        carts.add("u1", &product.id, "WB-22", 1).await.unwrap();
        assert_eq!(carts.clear("u1").await.unwrap(), 1);
        assert!(carts.get("u1").await.unwrap().is_empty());
    }
}
