//! # Product Repository
//!
//! Catalog reads and admin edits. Stock columns are written here only on
//! insert; after that they change through [`InventoryLedger`] alone.
//!
//! [`InventoryLedger`]: crate::repository::inventory::InventoryLedger
//!
//! ## Storage Layout
//! ```text
//! ┌─────────────────────────────────┐        ┌─────────────────────────────┐
//! │ products                        │ 1    * │ product_variants            │
//! │ ─────────────────────────────── │────────│ ─────────────────────────── │
//! │ id, name, brand, mrp_paise,     │        │ sku (PK), product_id,       │
//! │ discount_bps, offer_price_paise,│        │ position, material, stock,  │
//! │ images/tags (JSON), total_stock,│        │ sort_order                  │
//! │ version, is_active ...          │        │                             │
//! └─────────────────────────────────┘        └─────────────────────────────┘
//! ```

use chrono::{DateTime, Utc};
use sqlx::{SqliteConnection, SqlitePool};
use tracing::{debug, info};
use uuid::Uuid;

use pitstop_core::validation::validate_product;
use pitstop_core::{offer_price, Money, Product, Variant};

use crate::error::{DbError, DbResult};

// =============================================================================
// Rows
// =============================================================================

#[derive(Debug, sqlx::FromRow)]
struct ProductRow {
    id: String,
    name: String,
    brand: Option<String>,
    description: Option<String>,
    mrp_paise: i64,
    discount_bps: i64,
    offer_price_paise: i64,
    rating: f64,
    images: String,
    tags: String,
    warranty: Option<String>,
    return_policy: Option<String>,
    is_active: bool,
    is_featured: bool,
    total_stock: i64,
    version: i64,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

#[derive(Debug, sqlx::FromRow)]
struct VariantRow {
    sku: String,
    position: Option<String>,
    material: Option<String>,
    stock: i64,
    sort_order: i64,
}

impl From<VariantRow> for Variant {
    fn from(row: VariantRow) -> Self {
        Variant {
            sku: row.sku,
            position: row.position,
            material: row.material,
            stock: row.stock,
            sort_order: row.sort_order,
        }
    }
}

impl ProductRow {
    fn into_product(self, variants: Vec<Variant>) -> DbResult<Product> {
        Ok(Product {
            id: self.id,
            name: self.name,
            brand: self.brand,
            description: self.description,
            mrp: Money::from_paise(self.mrp_paise),
            discount_bps: self.discount_bps as u32,
            offer_price: Money::from_paise(self.offer_price_paise),
            rating: self.rating,
            images: serde_json::from_str(&self.images)?,
            tags: serde_json::from_str(&self.tags)?,
            warranty: self.warranty,
            return_policy: self.return_policy,
            is_active: self.is_active,
            is_featured: self.is_featured,
            variants,
            total_stock: self.total_stock,
            version: self.version,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

const PRODUCT_COLUMNS: &str = r#"
    id, name, brand, description, mrp_paise, discount_bps, offer_price_paise,
    rating, images, tags, warranty, return_policy, is_active, is_featured,
    total_stock, version, created_at, updated_at
"#;

// =============================================================================
// Connection-Level Helpers
// =============================================================================

/// Loads a product's variants in display order.
pub(crate) async fn fetch_variants(conn: &mut SqliteConnection, product_id: &str) -> DbResult<Vec<Variant>> {
    let rows: Vec<VariantRow> = sqlx::query_as(
        r#"
        SELECT sku, position, material, stock, sort_order
        FROM product_variants
        WHERE product_id = ?1
        ORDER BY sort_order, sku
        "#,
    )
    .bind(product_id)
    .fetch_all(&mut *conn)
    .await?;

    Ok(rows.into_iter().map(Variant::from).collect())
}

/// Loads a product with its variants on `conn` (which may be a transaction).
pub(crate) async fn fetch_product(conn: &mut SqliteConnection, id: &str) -> DbResult<Option<Product>> {
    let sql = format!("SELECT {} FROM products WHERE id = ?1", PRODUCT_COLUMNS);
    let row: Option<ProductRow> = sqlx::query_as(&sql)
        .bind(id)
        .fetch_optional(&mut *conn)
        .await?;

    match row {
        Some(row) => {
            let variants = fetch_variants(conn, &row.id).await?;
            Ok(Some(row.into_product(variants)?))
        }
        None => Ok(None),
    }
}

async fn hydrate(conn: &mut SqliteConnection, rows: Vec<ProductRow>) -> DbResult<Vec<Product>> {
    let mut products = Vec::with_capacity(rows.len());
    for row in rows {
        let variants = fetch_variants(conn, &row.id).await?;
        products.push(row.into_product(variants)?);
    }
    Ok(products)
}

// =============================================================================
// Repository
// =============================================================================

/// Repository for catalog operations.
///
/// ## Usage
/// ```rust,ignore
/// let repo = db.products();
/// let pads = repo.get_by_id("uuid-here").await?;
/// let hits = repo.search("brake", 20).await?;
/// ```
#[derive(Debug, Clone)]
pub struct ProductRepository {
    pool: SqlitePool,
}

impl ProductRepository {
    /// Creates a new ProductRepository.
    pub fn new(pool: SqlitePool) -> Self {
        ProductRepository { pool }
    }

    /// Gets a product (active or not) with its variants.
    pub async fn get_by_id(&self, id: &str) -> DbResult<Option<Product>> {
        let mut conn = self.pool.acquire().await?;
        fetch_product(&mut conn, id).await
    }

    /// Finds the product that owns variant `sku`.
    pub async fn get_by_sku(&self, sku: &str) -> DbResult<Option<Product>> {
        let product_id: Option<String> =
            sqlx::query_scalar("SELECT product_id FROM product_variants WHERE sku = ?1")
                .bind(sku)
                .fetch_optional(&self.pool)
                .await?;

        match product_id {
            Some(id) => self.get_by_id(&id).await,
            None => Ok(None),
        }
    }

    /// Lists active products, featured first, then by name.
    pub async fn list_active(&self, limit: u32) -> DbResult<Vec<Product>> {
        let sql = format!(
            "SELECT {} FROM products WHERE is_active = 1 ORDER BY is_featured DESC, name LIMIT ?1",
            PRODUCT_COLUMNS
        );
        let mut conn = self.pool.acquire().await?;
        let rows: Vec<ProductRow> = sqlx::query_as(&sql)
            .bind(limit as i64)
            .fetch_all(&mut *conn)
            .await?;

        hydrate(&mut conn, rows).await
    }

    /// Lists active featured products for the home screen.
    pub async fn list_featured(&self, limit: u32) -> DbResult<Vec<Product>> {
        let sql = format!(
            "SELECT {} FROM products WHERE is_active = 1 AND is_featured = 1 ORDER BY rating DESC, name LIMIT ?1",
            PRODUCT_COLUMNS
        );
        let mut conn = self.pool.acquire().await?;
        let rows: Vec<ProductRow> = sqlx::query_as(&sql)
            .bind(limit as i64)
            .fetch_all(&mut *conn)
            .await?;

        hydrate(&mut conn, rows).await
    }

    /// Searches active products by name, brand or tag.
    ///
    /// An empty query returns the same as [`list_active`](Self::list_active).
    pub async fn search(&self, query: &str, limit: u32) -> DbResult<Vec<Product>> {
        let query = query.trim();
        if query.is_empty() {
            return self.list_active(limit).await;
        }

        debug!(query = %query, limit = limit, "Searching products");

        let pattern = format!("%{}%", query.to_lowercase());
        let sql = format!(
            r#"
            SELECT {} FROM products
            WHERE is_active = 1
              AND (lower(name) LIKE ?1 OR lower(coalesce(brand, '')) LIKE ?1 OR lower(tags) LIKE ?1)
            ORDER BY is_featured DESC, rating DESC, name
            LIMIT ?2
            "#,
            PRODUCT_COLUMNS
        );
        let mut conn = self.pool.acquire().await?;
        let rows: Vec<ProductRow> = sqlx::query_as(&sql)
            .bind(&pattern)
            .bind(limit as i64)
            .fetch_all(&mut *conn)
            .await?;

        hydrate(&mut conn, rows).await
    }

    /// Inserts a new product and its variants.
    ///
    /// `offer_price` and `total_stock` are recomputed from `mrp`, the
    /// discount and the variants; whatever the caller put there is ignored
    /// (except `total_stock` for products without variants).
    ///
    /// ## Returns
    /// * `Ok(Product)` - The stored product
    /// * `Err(DbError::Validation)` - Bad name, price, rating or SKU
    /// * `Err(DbError::UniqueViolation)` - A SKU already exists
    pub async fn insert(&self, product: &Product) -> DbResult<Product> {
        validate_product(product)?;

        let now = Utc::now();
        let mut product = product.clone();
        if product.id.trim().is_empty() {
            product.id = generate_product_id();
        }
        for (idx, variant) in product.variants.iter_mut().enumerate() {
            variant.sort_order = idx as i64;
        }
        product.normalize();
        product.version = 0;
        product.created_at = now;
        product.updated_at = now;

        debug!(id = %product.id, name = %product.name, variants = product.variants.len(), "Inserting product");

        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            INSERT INTO products (
                id, name, brand, description, mrp_paise, discount_bps, offer_price_paise,
                rating, images, tags, warranty, return_policy, is_active, is_featured,
                total_stock, version, created_at, updated_at
            ) VALUES (
                ?1, ?2, ?3, ?4, ?5, ?6, ?7,
                ?8, ?9, ?10, ?11, ?12, ?13, ?14,
                ?15, ?16, ?17, ?18
            )
            "#,
        )
        .bind(&product.id)
        .bind(&product.name)
        .bind(&product.brand)
        .bind(&product.description)
        .bind(product.mrp.paise())
        .bind(product.discount_bps as i64)
        .bind(product.offer_price.paise())
        .bind(product.rating)
        .bind(serde_json::to_string(&product.images)?)
        .bind(serde_json::to_string(&product.tags)?)
        .bind(&product.warranty)
        .bind(&product.return_policy)
        .bind(product.is_active)
        .bind(product.is_featured)
        .bind(product.total_stock)
        .bind(product.version)
        .bind(product.created_at)
        .bind(product.updated_at)
        .execute(&mut *tx)
        .await?;

        for variant in &product.variants {
            sqlx::query(
                r#"
                INSERT INTO product_variants (sku, product_id, position, material, stock, sort_order)
                VALUES (?1, ?2, ?3, ?4, ?5, ?6)
                "#,
            )
            .bind(&variant.sku)
            .bind(&product.id)
            .bind(&variant.position)
            .bind(&variant.material)
            .bind(variant.stock)
            .bind(variant.sort_order)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;

        info!(id = %product.id, total_stock = product.total_stock, "Product created");
        Ok(product)
    }

    /// Updates catalog details and pricing. Stock and variants are untouched.
    ///
    /// Bumps `version`, so an in-flight stock commit on this product retries.
    pub async fn update_details(&self, product: &Product) -> DbResult<Product> {
        validate_product(product)?;
        debug!(id = %product.id, "Updating product details");

        let now = Utc::now();
        let offer = offer_price(product.mrp, product.discount_bps);

        let result = sqlx::query(
            r#"
            UPDATE products SET
                name = ?2,
                brand = ?3,
                description = ?4,
                mrp_paise = ?5,
                discount_bps = ?6,
                offer_price_paise = ?7,
                rating = ?8,
                images = ?9,
                tags = ?10,
                warranty = ?11,
                return_policy = ?12,
                is_featured = ?13,
                updated_at = ?14,
                version = version + 1
            WHERE id = ?1
            "#,
        )
        .bind(&product.id)
        .bind(&product.name)
        .bind(&product.brand)
        .bind(&product.description)
        .bind(product.mrp.paise())
        .bind(product.discount_bps as i64)
        .bind(offer.paise())
        .bind(product.rating)
        .bind(serde_json::to_string(&product.images)?)
        .bind(serde_json::to_string(&product.tags)?)
        .bind(&product.warranty)
        .bind(&product.return_policy)
        .bind(product.is_featured)
        .bind(now)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::not_found("Product", &product.id));
        }

        self.get_by_id(&product.id)
            .await?
            .ok_or_else(|| DbError::not_found("Product", &product.id))
    }

    /// Activates or deactivates a product. Products are never hard-deleted;
    /// past orders still reference them.
    pub async fn set_active(&self, id: &str, active: bool) -> DbResult<()> {
        debug!(id = %id, active = active, "Setting product active flag");

        let result = sqlx::query(
            r#"
            UPDATE products
            SET is_active = ?2, updated_at = ?3, version = version + 1
            WHERE id = ?1
            "#,
        )
        .bind(id)
        .bind(active)
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::not_found("Product", id));
        }

        Ok(())
    }

    /// Counts active products (for diagnostics).
    pub async fn count(&self) -> DbResult<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM products WHERE is_active = 1")
            .fetch_one(&self.pool)
            .await?;

        Ok(count)
    }
}

/// Generates a new product ID.
pub fn generate_product_id() -> String {
    Uuid::new_v4().to_string()
}

// =============================================================================
// Unit Tests
// =============================================================================
