//! # Inventory Ledger
//!
//! The only writer of `product_variants.stock` and `products.total_stock`.
//!
//! ## Stock-Commit Unit of Work
//! ```text
//! commit_stock(requests)
//!      │
//!      ├── validate_requests()            InvalidCartItem? ──► return
//!      │
//!      └── with_retry ─────────────────────────────────────────────────┐
//!            BEGIN                                                      │
//!              plan_in_tx()    re-read each product inside the tx,     │
//!                              StockPlan::stage() (cumulative)          │
//!              apply_writes()  UPDATE ... WHERE stock = read            │
//!                              UPDATE ... WHERE version = read          │
//!                              0 rows? ──► Conflict ──► ROLLBACK ───────┘
//!            COMMIT
//!      │
//!      └── publish StockChanged per line
//! ```
//!
//! Checkout runs the same `plan_in_tx` + `apply_writes` pair inside its own
//! transaction, so an order and its stock decrement commit together.

use chrono::Utc;
use sqlx::{SqliteConnection, SqlitePool};
use tracing::{debug, info};

use pitstop_core::stock::{validate_requests, ProductStock, StockPlan, StockRequest, StockUpdate, VariantStock};
use pitstop_core::StockError;

use crate::error::{DbError, DbResult};
use crate::pool::StoreContext;
use crate::retry::with_retry;

// =============================================================================
// Transaction Helpers
// =============================================================================

#[derive(Debug, sqlx::FromRow)]
struct StockRow {
    id: String,
    total_stock: i64,
    version: i64,
}

#[derive(Debug, sqlx::FromRow)]
struct VariantStockRow {
    sku: String,
    stock: i64,
}

/// Reads an active product's stock snapshot on `conn`.
///
/// Deactivated products read as missing, so they cannot be sold.
pub(crate) async fn load_product_stock(conn: &mut SqliteConnection, product_id: &str) -> DbResult<Option<ProductStock>> {
    let row: Option<StockRow> = sqlx::query_as(
        "SELECT id, total_stock, version FROM products WHERE id = ?1 AND is_active = 1",
    )
    .bind(product_id)
    .fetch_optional(&mut *conn)
    .await?;

    let Some(row) = row else {
        return Ok(None);
    };

    let variants: Vec<VariantStockRow> = sqlx::query_as(
        "SELECT sku, stock FROM product_variants WHERE product_id = ?1 ORDER BY sort_order, sku",
    )
    .bind(product_id)
    .fetch_all(&mut *conn)
    .await?;

    Ok(Some(ProductStock {
        product_id: row.id,
        total_stock: row.total_stock,
        version: row.version,
        variants: variants
            .into_iter()
            .map(|v| VariantStock {
                sku: v.sku,
                stock: v.stock,
            })
            .collect(),
    }))
}

/// Validates `requests` and stages them against stock read on `conn`.
pub(crate) async fn plan_in_tx(conn: &mut SqliteConnection, requests: &[StockRequest]) -> DbResult<StockPlan> {
    validate_requests(requests)?;

    let mut plan = StockPlan::new();
    for req in requests {
        let snapshot = if plan.has_product(&req.product_id) {
            None
        } else {
            load_product_stock(conn, &req.product_id).await?
        };
        plan.stage(req, snapshot)?;
    }

    Ok(plan)
}

/// Applies a plan with guarded updates.
///
/// ## Errors
/// `DbError::Conflict` when any row changed since it was read. The caller's
/// transaction must then be dropped.
pub(crate) async fn apply_writes(conn: &mut SqliteConnection, plan: &StockPlan) -> DbResult<()> {
    let now = Utc::now();

    for write in plan.writes() {
        for variant in &write.variants {
            let result = sqlx::query(
                r#"
                UPDATE product_variants
                SET stock = ?1
                WHERE sku = ?2 AND product_id = ?3 AND stock = ?4
                "#,
            )
            .bind(variant.new_stock)
            .bind(&variant.sku)
            .bind(&write.product_id)
            .bind(variant.read_stock)
            .execute(&mut *conn)
            .await?;

            if result.rows_affected() == 0 {
                return Err(DbError::conflict(format!(
                    "variant {} changed since it was read",
                    variant.sku
                )));
            }
        }

        let result = sqlx::query(
            r#"
            UPDATE products
            SET total_stock = ?1, version = version + 1, updated_at = ?2
            WHERE id = ?3 AND version = ?4
            "#,
        )
        .bind(write.new_total_stock)
        .bind(now)
        .bind(&write.product_id)
        .bind(write.read_version)
        .execute(&mut *conn)
        .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::conflict(format!(
                "product {} changed since it was read",
                write.product_id
            )));
        }

        debug!(
            product_id = %write.product_id,
            total_stock = write.new_total_stock,
            variants = write.variants.len(),
            "Staged stock written"
        );
    }

    Ok(())
}

// =============================================================================
// Ledger
// =============================================================================

/// Stock reads and the Stock-Commit unit of work.
///
/// ## Usage
/// ```rust,ignore
/// let ledger = db.inventory();
/// let updates = ledger
///     .commit_stock(&[StockRequest::new(&pads.id, "BP-FR", 2)])
///     .await?;
/// ```
#[derive(Debug, Clone)]
pub struct InventoryLedger {
    pool: SqlitePool,
    ctx: StoreContext,
}

impl InventoryLedger {
    /// Creates a new InventoryLedger.
    pub fn new(pool: SqlitePool, ctx: StoreContext) -> Self {
        InventoryLedger { pool, ctx }
    }

    /// Current stock of a variant, or of the product when it has no variants.
    ///
    /// ## Errors
    /// `ProductNotFound`, `VariantNotFound`.
    pub async fn get_stock(&self, product_id: &str, sku: &str) -> DbResult<i64> {
        let mut conn = self.pool.acquire().await?;
        let snapshot = load_product_stock(&mut conn, product_id)
            .await?
            .ok_or_else(|| StockError::ProductNotFound {
                product_id: product_id.to_string(),
            })?;

        if snapshot.variants.is_empty() {
            return Ok(snapshot.total_stock);
        }

        snapshot
            .variants
            .iter()
            .find(|v| v.sku == sku)
            .map(|v| v.stock)
            .ok_or_else(|| {
                StockError::VariantNotFound {
                    product_id: product_id.to_string(),
                    sku: sku.to_string(),
                }
                .into()
            })
    }

    /// Atomically decrements stock for every line, or for none.
    ///
    /// ## Returns
    /// * `Ok(updates)` - One entry per request line, in request order
    /// * `Err(DbError::Stock(_))` - A line was rejected; nothing was written
    /// * `Err(DbError::CommitFailed)` - Conflicts outlasted the retry policy
    pub async fn commit_stock(&self, requests: &[StockRequest]) -> DbResult<Vec<StockUpdate>> {
        validate_requests(requests)?;
        debug!(lines = requests.len(), "Committing stock");

        let updates = with_retry(&self.ctx.retry, "commit_stock", || self.try_commit(requests)).await?;

        info!(lines = updates.len(), "Stock committed");
        self.ctx.feed.publish_stock(&updates);
        Ok(updates)
    }

    async fn try_commit(&self, requests: &[StockRequest]) -> DbResult<Vec<StockUpdate>> {
        let mut tx = self.pool.begin().await?;

        let plan = plan_in_tx(&mut tx, requests).await?;
        apply_writes(&mut tx, &plan).await?;

        tx.commit().await?;
        Ok(plan.into_updates())
    }

    /// Takes `amount` units of one variant. Returns the new variant stock.
    pub async fn decrement(&self, product_id: &str, sku: &str, amount: i64) -> DbResult<i64> {
        let updates = self
            .commit_stock(&[StockRequest::new(product_id, sku, amount)])
            .await?;

        updates
            .first()
            .map(|u| u.stock)
            .ok_or_else(|| DbError::Internal("stock commit returned no update".to_string()))
    }

    /// Adds `amount` units to one variant. Returns the new variant stock.
    ///
    /// ## Errors
    /// `InvalidCartItem` for a non-positive amount, `ProductNotFound`,
    /// `VariantNotFound`.
    pub async fn restock(&self, product_id: &str, sku: &str, amount: i64) -> DbResult<i64> {
        debug!(product_id = %product_id, sku = %sku, amount = amount, "Restocking");

        let update = with_retry(&self.ctx.retry, "restock", || {
            self.try_restock(product_id, sku, amount)
        })
        .await?;

        info!(
            product_id = %product_id,
            sku = %sku,
            stock = update.stock,
            total_stock = update.total_stock,
            "Restocked"
        );
        self.ctx.feed.publish_stock(std::slice::from_ref(&update));
        Ok(update.stock)
    }

    async fn try_restock(&self, product_id: &str, sku: &str, amount: i64) -> DbResult<StockUpdate> {
        let mut tx = self.pool.begin().await?;

        let snapshot = load_product_stock(&mut tx, product_id).await?;
        let mut plan = StockPlan::new();
        let update = plan.stage_restock(product_id, sku, amount, snapshot)?.clone();
        apply_writes(&mut tx, &plan).await?;

        tx.commit().await?;
        Ok(update)
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::StoreEvent;
    use crate::pool::{Database, DbConfig};
    use pitstop_core::{Money, Product, Variant};

    fn brake_pads() -> Product {
        Product {
            id: String::new(),
            name: "Brake Pad Set".to_string(),
            brand: None,
            description: None,
            mrp: Money::from_major(1_500),
            discount_bps: 0,
            offer_price: Money::zero(),
            rating: 4.0,
            images: vec![],
            tags: vec![],
            warranty: None,
            return_policy: None,
            is_active: true,
            is_featured: false,
            variants: vec![
                Variant {
                    sku: "BP-FR".to_string(),
                    position: Some("Front".to_string()),
                    material: None,
                    stock: 5,
                    sort_order: 0,
                },
                Variant {
                    sku: "BP-RR".to_string(),
                    position: Some("Rear".to_string()),
                    material: None,
                    stock: 2,
                    sort_order: 1,
                },
            ],
            total_stock: 0,
            version: 0,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    async fn seeded() -> (Database, String) {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let stored = db.products().insert(&brake_pads()).await.unwrap();
        (db, stored.id)
    }

    #[tokio::test]
    async fn test_get_stock() {
        let (db, id) = seeded().await;
        let ledger = db.inventory();

        assert_eq!(ledger.get_stock(&id, "BP-FR").await.unwrap(), 5);
        assert_eq!(ledger.get_stock(&id, "BP-FR").await.unwrap(), 5);
        assert!(matches!(
            ledger.get_stock(&id, "NOPE").await,
            Err(DbError::Stock(StockError::VariantNotFound { .. }))
        ));
        assert!(matches!(
            ledger.get_stock("ghost", "BP-FR").await,
            Err(DbError::Stock(StockError::ProductNotFound { .. }))
        ));
    }

    #[tokio::test]
    async fn test_commit_updates_variant_and_aggregate() {
        let (db, id) = seeded().await;
        let ledger = db.inventory();

        let updates = ledger
            .commit_stock(&[
                StockRequest::new(&id, "BP-FR", 2),
                StockRequest::new(&id, "BP-RR", 1),
            ])
            .await
            .unwrap();

        assert_eq!(updates[0].stock, 3);
        assert_eq!(updates[1].stock, 1);
        assert_eq!(updates[1].total_stock, 4);

        let product = db.products().get_by_id(&id).await.unwrap().unwrap();
        assert_eq!(product.total_stock, 4);
        assert!(product.is_stock_consistent());
        assert_eq!(product.version, 1);
    }

    #[tokio::test]
    async fn test_rejected_commit_writes_nothing() {
        let (db, id) = seeded().await;
        let ledger = db.inventory();

        let err = ledger
            .commit_stock(&[
                StockRequest::new(&id, "BP-FR", 2),
                StockRequest::new(&id, "BP-RR", 3),
            ])
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            DbError::Stock(StockError::VariantOutOfStock { available: 2, requested: 3, .. })
        ));
        assert_eq!(ledger.get_stock(&id, "BP-FR").await.unwrap(), 5);
        assert_eq!(ledger.get_stock(&id, "BP-RR").await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_invalid_request_rejected_before_read() {
        let (db, _) = seeded().await;

        let err = db.inventory().commit_stock(&[]).await.unwrap_err();
        assert!(matches!(err, DbError::Stock(StockError::InvalidCartItem { .. })));
    }

    #[tokio::test]
    async fn test_decrement_and_restock() {
        let (db, id) = seeded().await;
        let ledger = db.inventory();

        assert_eq!(ledger.decrement(&id, "BP-RR", 2).await.unwrap(), 0);
        assert!(matches!(
            ledger.decrement(&id, "BP-RR", 1).await,
            Err(DbError::Stock(StockError::VariantOutOfStock { .. }))
        ));

        assert_eq!(ledger.restock(&id, "BP-RR", 4).await.unwrap(), 4);
        assert!(ledger.restock(&id, "BP-RR", 0).await.is_err());

        let product = db.products().get_by_id(&id).await.unwrap().unwrap();
        assert_eq!(product.total_stock, 9);
        assert!(product.is_stock_consistent());
    }

    #[tokio::test]
    async fn test_inactive_product_cannot_be_sold() {
        let (db, id) = seeded().await;
        db.products().set_active(&id, false).await.unwrap();

        let err = db.inventory().decrement(&id, "BP-FR", 1).await.unwrap_err();
        assert!(matches!(err, DbError::Stock(StockError::ProductNotFound { .. })));
    }

    #[tokio::test]
    async fn test_commit_publishes_after_success() {
        let (db, id) = seeded().await;
        let mut sub = db.subscribe();

        db.inventory().decrement(&id, "BP-FR", 1).await.unwrap();
        let _ = db.inventory().decrement(&id, "BP-FR", 50).await;

        assert_eq!(
            sub.try_recv(),
            Some(StoreEvent::StockChanged {
                product_id: id.clone(),
                sku: "BP-FR".to_string(),
                stock: 4,
                total_stock: 6,
            })
        );
        assert_eq!(sub.try_recv(), None);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_decrements_never_oversell() {
        use crate::retry::RetryPolicy;
        use std::time::Duration;

        let dir = tempfile::tempdir().unwrap();
        let config = DbConfig::new(dir.path().join("pitstop.db"))
            .max_connections(4)
            .retry(RetryPolicy {
                max_attempts: 50,
                initial_backoff: Duration::from_millis(1),
                max_backoff: Duration::from_millis(20),
            });
        let db = Database::new(config).await.unwrap();
        let id = db.products().insert(&brake_pads()).await.unwrap().id;

        let mut handles = Vec::new();
        for _ in 0..12 {
            let db = db.clone();
            let id = id.clone();
            handles.push(tokio::spawn(async move {
                db.inventory().decrement(&id, "BP-FR", 1).await
            }));
        }

        let mut sold = 0;
        for handle in handles {
            match handle.await.unwrap() {
                Ok(_) => sold += 1,
                Err(DbError::Stock(e)) if e.is_out_of_stock() => {}
                Err(DbError::CommitFailed { .. }) => {}
                Err(other) => panic!("unexpected error: {other}"),
            }
        }

        let stock = db.inventory().get_stock(&id, "BP-FR").await.unwrap();
        assert_eq!(sold, 5);
        assert_eq!(stock, 0);

        let stored = db.products().get_by_id(&id).await.unwrap().unwrap();
        assert!(stored.is_stock_consistent());
        assert_eq!(stored.total_stock, 7 - sold);
    }
}
