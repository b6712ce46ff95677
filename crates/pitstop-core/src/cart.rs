//! # Cart Snapshot
//!
//! A customer's cart: what they intend to buy, at the price they saw.
//!
//! ## Cart Operations
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  Screen Action           Cart Method               Change               │
//! │  ─────────────           ───────────               ──────               │
//! │                                                                         │
//! │  Add to cart ──────────► add()  ─────────────────► push or qty += n    │
//! │  "+" button ───────────► increment() ────────────► qty += 1            │
//! │  "-" button ───────────► decrement() ────────────► qty -= 1 (min 1)    │
//! │  Remove ───────────────► remove() ───────────────► line deleted        │
//! │  Checkout ─────────────► to_stock_requests() ────► Stock-Commit input  │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Invariants
//! - Lines are unique by SKU (adding the same SKU again increases quantity)
//! - Every quantity is in `1..=MAX_ITEM_QUANTITY`
//! - At most `MAX_CART_ITEMS` lines
//!
//! The captured `unit_price` is for display. Checkout re-reads the catalog
//! price inside its transaction.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::error::{CoreError, CoreResult};
use crate::money::Money;
use crate::stock::StockRequest;
use crate::types::{Product, Variant};
use crate::validation::{validate_quantity, validate_sku};
use crate::{MAX_CART_ITEMS, MAX_ITEM_QUANTITY};

// =============================================================================
// Cart Line
// =============================================================================

/// One line in the cart.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct CartLine {
    pub product_id: String,
    /// Variant SKU, or the product's own SKU when it has no variants.
    pub sku: String,
    /// Product name at time of adding (frozen).
    pub name: String,
    /// Variant descriptor at time of adding (frozen).
    pub variant_label: String,
    /// Offer price at time of adding (frozen).
    pub unit_price: Money,
    pub quantity: i64,
    #[ts(as = "String")]
    pub added_at: DateTime<Utc>,
}

impl CartLine {
    /// Captures a line from a product, and the chosen variant if it has any.
    pub fn from_product(product: &Product, variant: Option<&Variant>, sku: &str, quantity: i64) -> Self {
        CartLine {
            product_id: product.id.clone(),
            sku: sku.to_string(),
            name: product.name.clone(),
            variant_label: variant.map(Variant::label).unwrap_or_default(),
            unit_price: product.offer_price,
            quantity,
            added_at: Utc::now(),
        }
    }

    /// Unit price × quantity.
    pub fn line_total(&self) -> Money {
        self.unit_price.multiply_quantity(self.quantity)
    }
}

// =============================================================================
// Cart
// =============================================================================

/// A customer's cart.
#[derive(Debug, Clone, Default, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct Cart {
    pub user_id: String,
    /// Lines in the order they were first added.
    pub lines: Vec<CartLine>,
}

impl Cart {
    /// Creates an empty cart for `user_id`.
    pub fn new(user_id: impl Into<String>) -> Self {
        Cart {
            user_id: user_id.into(),
            lines: Vec::new(),
        }
    }

    /// Builds a cart from stored lines.
    pub fn from_lines(user_id: impl Into<String>, lines: Vec<CartLine>) -> Self {
        Cart {
            user_id: user_id.into(),
            lines,
        }
    }

    /// Returns the line for `sku`, if present.
    pub fn line(&self, sku: &str) -> Option<&CartLine> {
        self.lines.iter().find(|l| l.sku == sku)
    }

    /// Adds a line, or increases the quantity when the SKU is already present.
    ///
    /// ## Returns
    /// The line as it now stands.
    ///
    /// ## Errors
    /// - `Validation` for a malformed SKU or a quantity outside `1..=999`
    /// - `QuantityTooLarge` when the merged quantity would pass 999
    /// - `CartTooLarge` when a new line would exceed the line limit
    pub fn add(&mut self, line: CartLine) -> CoreResult<&CartLine> {
        validate_sku(&line.sku)?;
        validate_quantity(line.quantity)?;

        if let Some(idx) = self.lines.iter().position(|l| l.sku == line.sku) {
            let existing = &mut self.lines[idx];
            let merged = existing.quantity + line.quantity;
            if merged > MAX_ITEM_QUANTITY {
                return Err(CoreError::QuantityTooLarge {
                    requested: merged,
                    max: MAX_ITEM_QUANTITY,
                });
            }
            existing.quantity = merged;
            return Ok(&self.lines[idx]);
        }

        if self.lines.len() >= MAX_CART_ITEMS {
            return Err(CoreError::CartTooLarge {
                max: MAX_CART_ITEMS,
            });
        }

        self.lines.push(line);
        let last = self.lines.len() - 1;
        Ok(&self.lines[last])
    }

    /// Increases the quantity of `sku` by one.
    pub fn increment(&mut self, sku: &str) -> CoreResult<i64> {
        let line = self.line_mut(sku)?;
        if line.quantity >= MAX_ITEM_QUANTITY {
            return Err(CoreError::QuantityTooLarge {
                requested: line.quantity + 1,
                max: MAX_ITEM_QUANTITY,
            });
        }
        line.quantity += 1;
        Ok(line.quantity)
    }

    /// Decreases the quantity of `sku` by one.
    ///
    /// A line at quantity 1 is not removed; the call fails with
    /// `QuantityBelowMinimum` and removal stays an explicit action.
    pub fn decrement(&mut self, sku: &str) -> CoreResult<i64> {
        let line = self.line_mut(sku)?;
        if line.quantity <= 1 {
            return Err(CoreError::QuantityBelowMinimum {
                sku: sku.to_string(),
            });
        }
        line.quantity -= 1;
        Ok(line.quantity)
    }

    /// Sets the quantity of `sku` directly (1..=999).
    pub fn set_quantity(&mut self, sku: &str, quantity: i64) -> CoreResult<()> {
        if quantity < 1 {
            return Err(CoreError::QuantityBelowMinimum {
                sku: sku.to_string(),
            });
        }
        if quantity > MAX_ITEM_QUANTITY {
            return Err(CoreError::QuantityTooLarge {
                requested: quantity,
                max: MAX_ITEM_QUANTITY,
            });
        }
        self.line_mut(sku)?.quantity = quantity;
        Ok(())
    }

    /// Removes the line for `sku`.
    pub fn remove(&mut self, sku: &str) -> CoreResult<CartLine> {
        let idx = self
            .lines
            .iter()
            .position(|l| l.sku == sku)
            .ok_or_else(|| CoreError::CartLineNotFound {
                sku: sku.to_string(),
            })?;
        Ok(self.lines.remove(idx))
    }

    /// Removes every line.
    pub fn clear(&mut self) {
        self.lines.clear();
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    /// Number of distinct lines.
    pub fn item_count(&self) -> usize {
        self.lines.len()
    }

    /// Total units across lines.
    pub fn total_quantity(&self) -> i64 {
        self.lines.iter().map(|l| l.quantity).sum()
    }

    /// Sum of captured line totals (display only).
    pub fn subtotal(&self) -> Money {
        self.lines.iter().map(CartLine::line_total).sum()
    }

    /// The stock requests checkout submits for this cart.
    pub fn to_stock_requests(&self) -> Vec<StockRequest> {
        self.lines
            .iter()
            .map(|l| StockRequest::new(&l.product_id, &l.sku, l.quantity))
            .collect()
    }

    fn line_mut(&mut self, sku: &str) -> CoreResult<&mut CartLine> {
        self.lines
            .iter_mut()
            .find(|l| l.sku == sku)
            .ok_or_else(|| CoreError::CartLineNotFound {
                sku: sku.to_string(),
            })
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn line(sku: &str, quantity: i64) -> CartLine {
        CartLine {
            product_id: "p1".to_string(),
            sku: sku.to_string(),
            name: "Brake Pad Set".to_string(),
            variant_label: "Front / Ceramic".to_string(),
            unit_price: Money::from_major(1_800),
            quantity,
            added_at: Utc::now(),
        }
    }

    #[test]
    fn test_add_same_sku_increments() {
        let mut cart = Cart::new("u1");
        cart.add(line("BP-FR", 1)).unwrap();
        let merged = cart.add(line("BP-FR", 2)).unwrap();

        assert_eq!(merged.quantity, 3);
        assert_eq!(cart.item_count(), 1);
    }

    #[test]
    fn test_add_rejects_merged_quantity_over_max() {
        let mut cart = Cart::new("u1");
        cart.add(line("BP-FR", 998)).unwrap();

        let err = cart.add(line("BP-FR", 2)).unwrap_err();
        assert!(matches!(err, CoreError::QuantityTooLarge { requested: 1000, .. }));
        assert_eq!(cart.line("BP-FR").unwrap().quantity, 998);
    }

    #[test]
    fn test_add_rejects_bad_quantity() {
        let mut cart = Cart::new("u1");
        assert!(matches!(cart.add(line("BP-FR", 0)), Err(CoreError::Validation(_))));
    }

    #[test]
    fn test_cart_line_limit() {
        let mut cart = Cart::new("u1");
        for i in 0..MAX_CART_ITEMS {
            cart.add(line(&format!("SKU-{}", i), 1)).unwrap();
        }
        let err = cart.add(line("ONE-MORE", 1)).unwrap_err();
        assert!(matches!(err, CoreError::CartTooLarge { .. }));
    }

    #[test]
    fn test_decrement_stops_at_one() {
        let mut cart = Cart::new("u1");
        cart.add(line("BP-FR", 2)).unwrap();

        assert_eq!(cart.decrement("BP-FR").unwrap(), 1);
        let err = cart.decrement("BP-FR").unwrap_err();
        assert!(matches!(err, CoreError::QuantityBelowMinimum { .. }));
        assert_eq!(cart.line("BP-FR").unwrap().quantity, 1);
    }

    #[test]
    fn test_increment_and_missing_line() {
        let mut cart = Cart::new("u1");
        cart.add(line("BP-FR", 1)).unwrap();
        assert_eq!(cart.increment("BP-FR").unwrap(), 2);
        assert!(matches!(
            cart.increment("NOPE"),
            Err(CoreError::CartLineNotFound { .. })
        ));
    }

    #[test]
    fn test_set_quantity_bounds() {
        let mut cart = Cart::new("u1");
        cart.add(line("BP-FR", 1)).unwrap();
        cart.set_quantity("BP-FR", 5).unwrap();
        assert_eq!(cart.total_quantity(), 5);
        assert!(cart.set_quantity("BP-FR", 0).is_err());
        assert!(cart.set_quantity("BP-FR", 1000).is_err());
    }

    #[test]
    fn test_remove_and_totals() {
        let mut cart = Cart::new("u1");
        cart.add(line("BP-FR", 2)).unwrap();
        cart.add(line("BP-RR", 1)).unwrap();
        assert_eq!(cart.subtotal(), Money::from_major(5_400));

        let removed = cart.remove("BP-FR").unwrap();
        assert_eq!(removed.quantity, 2);
        assert_eq!(cart.item_count(), 1);
        assert!(cart.remove("BP-FR").is_err());
    }

    #[test]
    fn test_to_stock_requests() {
        let mut cart = Cart::new("u1");
        cart.add(line("BP-FR", 2)).unwrap();
        let requests = cart.to_stock_requests();

        assert_eq!(requests, vec![StockRequest::new("p1", "BP-FR", 2)]);
    }
}
