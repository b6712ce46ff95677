//! # Stock-Commit Planning
//!
//! The pure half of the Stock-Commit unit of work: validate request lines,
//! check them against stock read inside the transaction, and stage every
//! decrement before a single write happens.
//!
//! ## Commit Flow
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  pitstop-db (in one SQLite transaction)     pitstop-core (this file)   │
//! │  ──────────────────────────────────────     ────────────────────────   │
//! │                                                                         │
//! │                                   ┌──────► validate_requests()         │
//! │  BEGIN ───────────────────────────┘        InvalidCartItem?            │
//! │    │                                                                    │
//! │    ├─ for each line: SELECT product  ─────► StockPlan::stage()         │
//! │    │                 + variants            ProductNotFound?             │
//! │    │                                       OutOfStock? (total)          │
//! │    │                                       VariantNotFound?             │
//! │    │                                       VariantOutOfStock?           │
//! │    │                                       stage decrement (cumulative) │
//! │    │                                                                    │
//! │    ├─ StockPlan::writes() ◄──────────────── guarded writes              │
//! │    │    UPDATE ... WHERE stock = ? / version = ?                        │
//! │  COMMIT                                                                 │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Staging is cumulative: two lines for the same SKU see each other's
//! decrements, so `[A×3, A×3]` against stock 5 is rejected on the second line.

use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::error::{StockError, StockResult};
use crate::MAX_ITEM_QUANTITY;

// =============================================================================
// Requests & Results
// =============================================================================

/// One line of a Stock-Commit request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct StockRequest {
    pub product_id: String,
    /// Ignored for products without variants, but must be non-empty.
    pub sku: String,
    pub quantity: i64,
}

impl StockRequest {
    pub fn new(product_id: impl Into<String>, sku: impl Into<String>, quantity: i64) -> Self {
        StockRequest {
            product_id: product_id.into(),
            sku: sku.into(),
            quantity,
        }
    }
}

/// Stock after a committed line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct StockUpdate {
    pub product_id: String,
    pub sku: String,
    /// Variant stock (or product stock when there are no variants).
    pub stock: i64,
    /// Product aggregate after the line.
    pub total_stock: i64,
}

/// Validates request lines before any read.
///
/// ## Errors
/// `InvalidCartItem` for an empty request, a blank product id or SKU, or a
/// quantity outside `1..=999`.
pub fn validate_requests(requests: &[StockRequest]) -> StockResult<()> {
    if requests.is_empty() {
        return Err(StockError::invalid_item("no items to commit"));
    }

    for (idx, req) in requests.iter().enumerate() {
        if req.product_id.trim().is_empty() {
            return Err(StockError::invalid_item(format!(
                "line {}: product id is required",
                idx + 1
            )));
        }
        if req.sku.trim().is_empty() {
            return Err(StockError::invalid_item(format!(
                "line {}: sku is required",
                idx + 1
            )));
        }
        if req.quantity <= 0 || req.quantity > MAX_ITEM_QUANTITY {
            return Err(StockError::invalid_item(format!(
                "line {}: quantity {} must be between 1 and {}",
                idx + 1,
                req.quantity,
                MAX_ITEM_QUANTITY
            )));
        }
    }

    Ok(())
}

// =============================================================================
// Snapshots
// =============================================================================

/// Stock of one variant as read inside the transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VariantStock {
    pub sku: String,
    pub stock: i64,
}

/// Stock of a product and its variants as read inside the transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProductStock {
    pub product_id: String,
    pub total_stock: i64,
    pub version: i64,
    /// Empty for products that keep stock only in `total_stock`.
    pub variants: Vec<VariantStock>,
}

// =============================================================================
// Plan
// =============================================================================

/// A guarded variant write: `SET stock = new_stock WHERE stock = read_stock`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VariantWrite {
    pub sku: String,
    pub read_stock: i64,
    pub new_stock: i64,
}

/// A guarded product write: `SET total_stock = new_total WHERE version = read_version`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProductWrite {
    pub product_id: String,
    pub read_version: i64,
    pub new_total_stock: i64,
    pub variants: Vec<VariantWrite>,
}

#[derive(Debug, Clone)]
struct Staged {
    read: ProductStock,
    total_stock: i64,
    variant_stock: Vec<i64>,
}

impl Staged {
    fn new(read: ProductStock) -> Self {
        let variant_stock = read.variants.iter().map(|v| v.stock).collect();
        Staged {
            total_stock: read.total_stock,
            variant_stock,
            read,
        }
    }
}

/// Staged stock changes for one unit of work.
///
/// Products are kept in first-seen order so writes happen in the same
/// order every attempt.
#[derive(Debug, Clone, Default)]
pub struct StockPlan {
    staged: Vec<Staged>,
    updates: Vec<StockUpdate>,
}

impl StockPlan {
    pub fn new() -> Self {
        Self::default()
    }

    /// True when `product_id` already has a snapshot in the plan.
    ///
    /// Callers skip re-reading a product the plan already holds so that
    /// staged decrements are not lost.
    pub fn has_product(&self, product_id: &str) -> bool {
        self.staged.iter().any(|s| s.read.product_id == product_id)
    }

    fn staged_mut(&mut self, product: Option<ProductStock>, product_id: &str) -> StockResult<&mut Staged> {
        if let Some(idx) = self
            .staged
            .iter()
            .position(|s| s.read.product_id == product_id)
        {
            return Ok(&mut self.staged[idx]);
        }

        let read = product.ok_or_else(|| StockError::ProductNotFound {
            product_id: product_id.to_string(),
        })?;
        self.staged.push(Staged::new(read));
        let last = self.staged.len() - 1;
        Ok(&mut self.staged[last])
    }

    /// Checks one request line and stages its decrement.
    ///
    /// `product` is the snapshot read for `request.product_id`, or `None`
    /// when no such product exists. It is ignored when the plan already
    /// holds the product.
    ///
    /// ## Errors
    /// In order: `ProductNotFound`, `OutOfStock`, `VariantNotFound`,
    /// `VariantOutOfStock`. On error nothing is staged for the line.
    pub fn stage(&mut self, request: &StockRequest, product: Option<ProductStock>) -> StockResult<&StockUpdate> {
        let staged = self.staged_mut(product, &request.product_id)?;

        if staged.total_stock < request.quantity {
            return Err(StockError::OutOfStock {
                product_id: request.product_id.clone(),
                available: staged.total_stock,
                requested: request.quantity,
            });
        }

        let stock = if staged.read.variants.is_empty() {
            staged.total_stock -= request.quantity;
            staged.total_stock
        } else {
            let idx = staged
                .read
                .variants
                .iter()
                .position(|v| v.sku == request.sku)
                .ok_or_else(|| StockError::VariantNotFound {
                    product_id: request.product_id.clone(),
                    sku: request.sku.clone(),
                })?;

            let available = staged.variant_stock[idx];
            if available < request.quantity {
                return Err(StockError::VariantOutOfStock {
                    product_id: request.product_id.clone(),
                    sku: request.sku.clone(),
                    available,
                    requested: request.quantity,
                });
            }

            staged.variant_stock[idx] = available - request.quantity;
            staged.total_stock = staged.variant_stock.iter().sum();
            staged.variant_stock[idx]
        };

        let total_stock = staged.total_stock;
        self.updates.push(StockUpdate {
            product_id: request.product_id.clone(),
            sku: request.sku.clone(),
            stock,
            total_stock,
        });
        let last = self.updates.len() - 1;
        Ok(&self.updates[last])
    }

    /// Stages a positive restock of `amount` units.
    ///
    /// ## Errors
    /// `InvalidCartItem` for a non-positive amount, `ProductNotFound`,
    /// `VariantNotFound`.
    pub fn stage_restock(
        &mut self,
        product_id: &str,
        sku: &str,
        amount: i64,
        product: Option<ProductStock>,
    ) -> StockResult<&StockUpdate> {
        if amount <= 0 {
            return Err(StockError::invalid_item(format!(
                "restock amount {} must be positive",
                amount
            )));
        }

        let staged = self.staged_mut(product, product_id)?;
        let stock = if staged.read.variants.is_empty() {
            staged.total_stock += amount;
            staged.total_stock
        } else {
            let idx = staged
                .read
                .variants
                .iter()
                .position(|v| v.sku == sku)
                .ok_or_else(|| StockError::VariantNotFound {
                    product_id: product_id.to_string(),
                    sku: sku.to_string(),
                })?;
            staged.variant_stock[idx] += amount;
            staged.total_stock = staged.variant_stock.iter().sum();
            staged.variant_stock[idx]
        };

        let total_stock = staged.total_stock;
        self.updates.push(StockUpdate {
            product_id: product_id.to_string(),
            sku: sku.to_string(),
            stock,
            total_stock,
        });
        let last = self.updates.len() - 1;
        Ok(&self.updates[last])
    }

    /// Guarded writes for every product the plan touched.
    ///
    /// Only variants whose stock changed are included.
    pub fn writes(&self) -> Vec<ProductWrite> {
        self.staged
            .iter()
            .map(|s| ProductWrite {
                product_id: s.read.product_id.clone(),
                read_version: s.read.version,
                new_total_stock: s.total_stock,
                variants: s
                    .read
                    .variants
                    .iter()
                    .zip(&s.variant_stock)
                    .filter(|(v, new)| v.stock != **new)
                    .map(|(v, new)| VariantWrite {
                        sku: v.sku.clone(),
                        read_stock: v.stock,
                        new_stock: *new,
                    })
                    .collect(),
            })
            .collect()
    }

    /// Per-line results, in request order.
    pub fn updates(&self) -> &[StockUpdate] {
        &self.updates
    }

    pub fn into_updates(self) -> Vec<StockUpdate> {
        self.updates
    }
}

/// Plans a whole request against snapshots from `lookup`.
///
/// `lookup` is only called for products the plan has not seen yet.
///
/// ## Example
/// ```rust
/// use pitstop_core::stock::{plan_commit, ProductStock, StockRequest, VariantStock};
///
/// let pads = ProductStock {
///     product_id: "p1".into(),
///     total_stock: 5,
///     version: 3,
///     variants: vec![VariantStock { sku: "BP-FR".into(), stock: 5 }],
/// };
/// let plan = plan_commit(&[StockRequest::new("p1", "BP-FR", 2)], |_| Some(pads.clone())).unwrap();
/// assert_eq!(plan.updates()[0].stock, 3);
/// ```
pub fn plan_commit<F>(requests: &[StockRequest], mut lookup: F) -> StockResult<StockPlan>
where
    F: FnMut(&str) -> Option<ProductStock>,
{
    validate_requests(requests)?;

    let mut plan = StockPlan::new();
    for req in requests {
        let snapshot = if plan.has_product(&req.product_id) {
            None
        } else {
            lookup(&req.product_id)
        };
        plan.stage(req, snapshot)?;
    }
    Ok(plan)
}

// =============================================================================
// Unit Tests
// =============================================================================
