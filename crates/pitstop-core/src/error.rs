//! # Error Types
//!
//! Domain-specific error types for pitstop-core.
//!
//! ## Error Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Error Types                                     │
//! │                                                                         │
//! │  pitstop-core errors (this file)                                       │
//! │  ├── ValidationError  - Field-level input failures                     │
//! │  ├── CoreError        - Cart rule violations                           │
//! │  ├── StockError       - Stock-commit rejections                        │
//! │  └── BillingError     - Invoice / service status rejections           │
//! │                                                                         │
//! │  pitstop-db errors (separate crate)                                    │
//! │  └── DbError          - Wraps the above + storage failures             │
//! │                                                                         │
//! │  Flow: ValidationError → Stock/Billing/CoreError → DbError → screen    │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Every variant carries the ids and amounts a screen needs to show a
//! specific message ("Only 2 left of BP-FR-CER").

use thiserror::Error;

use crate::types::ServiceStatus;

// =============================================================================
// Core Error
// =============================================================================

/// Cart rule violations.
#[derive(Debug, Error)]
pub enum CoreError {
    /// The SKU is not in the cart.
    #[error("SKU {sku} is not in the cart")]
    CartLineNotFound { sku: String },

    /// Decrementing would take the line below one unit.
    ///
    /// Removing the line is a separate, explicit action.
    #[error("Quantity of {sku} cannot go below 1; remove the item instead")]
    QuantityBelowMinimum { sku: String },

    /// Cart has exceeded maximum allowed lines.
    #[error("Cart cannot have more than {max} items")]
    CartTooLarge { max: usize },

    /// Line quantity exceeds maximum allowed.
    #[error("Quantity {requested} exceeds maximum allowed ({max})")]
    QuantityTooLarge { requested: i64, max: i64 },

    /// Validation error (wraps ValidationError).
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),
}

// =============================================================================
// Stock Error
// =============================================================================

/// Reasons a stock commit is rejected.
///
/// A rejected commit has no side effects: no variant anywhere changes.
///
/// ## Validation Order
/// ```text
/// request ──► InvalidCartItem?        (before any read)
///        ──► ProductNotFound?
///        ──► OutOfStock?              (coarse: product total)
///        ──► VariantNotFound?         (only when the product has variants)
///        ──► VariantOutOfStock?       (fine: the one SKU)
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StockError {
    /// Malformed request line (blank id/sku, bad quantity, empty request).
    #[error("Invalid cart item: {reason}")]
    InvalidCartItem { reason: String },

    /// Referenced product does not exist.
    #[error("Product not found: {product_id}")]
    ProductNotFound { product_id: String },

    /// Product-level stock cannot cover the request.
    #[error("Product {product_id} is out of stock: available {available}, requested {requested}")]
    OutOfStock {
        product_id: String,
        available: i64,
        requested: i64,
    },

    /// Product has variants but none with this SKU.
    #[error("Variant {sku} not found for product {product_id}")]
    VariantNotFound { product_id: String, sku: String },

    /// The specific variant cannot cover the request.
    #[error("Insufficient stock for {sku}: available {available}, requested {requested}")]
    VariantOutOfStock {
        product_id: String,
        sku: String,
        available: i64,
        requested: i64,
    },
}

impl StockError {
    /// Creates an InvalidCartItem error.
    pub fn invalid_item(reason: impl Into<String>) -> Self {
        StockError::InvalidCartItem {
            reason: reason.into(),
        }
    }

    /// True for the two insufficient-inventory rejections.
    pub fn is_out_of_stock(&self) -> bool {
        matches!(
            self,
            StockError::OutOfStock { .. } | StockError::VariantOutOfStock { .. }
        )
    }
}

// =============================================================================
// Billing Error
// =============================================================================

/// Reasons an invoice cannot be generated.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BillingError {
    /// Service record does not exist.
    #[error("Service record not found: {service_id}")]
    ServiceNotFound { service_id: String },

    /// Service billing needs at least one part.
    #[error("No parts found for service {service_id}")]
    NoPartsFound { service_id: String },

    /// Grand total is zero or negative.
    #[error("Invalid bill amount: grand total {grand_total_paise} paise must be positive")]
    InvalidAmount { grand_total_paise: i64 },

    /// Operation is not allowed from the record's current status.
    #[error("Service {service_id} is {from}, cannot move to {to}")]
    InvalidStatusTransition {
        service_id: String,
        from: ServiceStatus,
        to: ServiceStatus,
    },

    /// A part line is malformed (blank name, zero quantity, negative price).
    #[error("Invalid part: {reason}")]
    InvalidPart { reason: String },
}

// =============================================================================
// Validation Error
// =============================================================================

/// Input validation errors.
///
/// Used for early validation before business logic runs.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    /// A required field is missing or empty.
    #[error("{field} is required")]
    Required { field: String },

    /// Field value is too long.
    #[error("{field} must be at most {max} characters")]
    TooLong { field: String, max: usize },

    /// Numeric value is out of range.
    #[error("{field} must be between {min} and {max}")]
    OutOfRange { field: String, min: i64, max: i64 },

    /// Value must be positive.
    #[error("{field} must be positive")]
    MustBePositive { field: String },

    /// Invalid format (e.g., invalid UUID, bad SKU characters).
    #[error("{field} has invalid format: {reason}")]
    InvalidFormat { field: String, reason: String },

    /// Duplicate value (e.g., duplicate SKU within one product).
    #[error("{field} '{value}' already exists")]
    Duplicate { field: String, value: String },
}

// =============================================================================
// Result Type Aliases
// =============================================================================

/// Convenience type alias for Results with CoreError.
pub type CoreResult<T> = Result<T, CoreError>;

/// Convenience type alias for stock planning results.
pub type StockResult<T> = Result<T, StockError>;

/// Convenience type alias for billing results.
pub type BillingResult<T> = Result<T, BillingError>;

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stock_error_messages() {
        let err = StockError::VariantOutOfStock {
            product_id: "p1".to_string(),
            sku: "BP-FR-CER".to_string(),
            available: 2,
            requested: 5,
        };
        assert_eq!(
            err.to_string(),
            "Insufficient stock for BP-FR-CER: available 2, requested 5"
        );
        assert!(err.is_out_of_stock());
        assert!(!StockError::invalid_item("x").is_out_of_stock());
    }

    #[test]
    fn test_billing_error_messages() {
        let err = BillingError::InvalidStatusTransition {
            service_id: "s1".to_string(),
            from: ServiceStatus::Approved,
            to: ServiceStatus::BillCompleted,
        };
        assert_eq!(
            err.to_string(),
            "Service s1 is approved, cannot move to bill_completed"
        );
    }

    #[test]
    fn test_validation_converts_to_core_error() {
        let validation_err = ValidationError::Required {
            field: "sku".to_string(),
        };
        let core_err: CoreError = validation_err.into();
        assert!(matches!(core_err, CoreError::Validation(_)));
    }
}
