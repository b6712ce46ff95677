//! # Validation Module
//!
//! Field-level input checks for Pitstop records.
//!
//! ## Validation Strategy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                      Validation Layers                                  │
//! │                                                                         │
//! │  Layer 1: Mobile screens                                               │
//! │  └── Basic format checks, immediate feedback                           │
//! │           │                                                             │
//! │           ▼                                                             │
//! │  Layer 2: THIS MODULE (before any transaction opens)                   │
//! │  ├── SKU / name / phone / registration formats                         │
//! │  └── Quantity, price, discount and tax ranges                          │
//! │           │                                                             │
//! │           ▼                                                             │
//! │  Layer 3: SQLite                                                       │
//! │  ├── CHECK (stock >= 0), CHECK (quantity > 0)                          │
//! │  ├── UNIQUE (sku), UNIQUE (idempotency_key)                            │
//! │  └── Foreign keys                                                      │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Usage
//! ```rust
//! use pitstop_core::validation::{validate_sku, validate_quantity};
//!
//! validate_sku("BP-FR-CER").unwrap();
//! validate_quantity(5).unwrap();
//! ```

use std::collections::HashSet;

use crate::error::ValidationError;
use crate::types::{ContactInfo, Product, Vehicle};
use crate::{MAX_CART_ITEMS, MAX_ITEM_QUANTITY};

/// Result type for validation operations.
pub type ValidationResult<T> = Result<T, ValidationError>;

fn required(field: &str, value: &str) -> ValidationResult<()> {
    if value.trim().is_empty() {
        return Err(ValidationError::Required {
            field: field.to_string(),
        });
    }
    Ok(())
}

fn max_len(field: &str, value: &str, max: usize) -> ValidationResult<()> {
    if value.trim().chars().count() > max {
        return Err(ValidationError::TooLong {
            field: field.to_string(),
            max,
        });
    }
    Ok(())
}

// =============================================================================
// String Validators
// =============================================================================

/// Validates a SKU (Stock Keeping Unit).
///
/// ## Rules
/// - Must not be empty
/// - At most 50 characters
/// - Letters, numbers, hyphens and underscores only
///
/// ## Example
/// ```rust
/// use pitstop_core::validation::validate_sku;
///
/// assert!(validate_sku("BP-FR-CER").is_ok());
/// assert!(validate_sku("").is_err());
/// assert!(validate_sku("A".repeat(100).as_str()).is_err());
/// ```
pub fn validate_sku(sku: &str) -> ValidationResult<()> {
    required("sku", sku)?;
    max_len("sku", sku, 50)?;

    if !sku
        .trim()
        .chars()
        .all(|c| c.is_alphanumeric() || c == '-' || c == '_')
    {
        return Err(ValidationError::InvalidFormat {
            field: "sku".to_string(),
            reason: "must contain only letters, numbers, hyphens, and underscores".to_string(),
        });
    }

    Ok(())
}

/// Validates a product name (1 to 200 characters).
pub fn validate_product_name(name: &str) -> ValidationResult<()> {
    required("name", name)?;
    max_len("name", name, 200)
}

/// Validates a phone number.
///
/// Accepts digits with an optional leading `+` and spaces or hyphens between
/// groups; 10 to 15 digits in total.
///
/// ## Example
/// ```rust
/// use pitstop_core::validation::validate_phone;
///
/// assert!(validate_phone("+91 98450 12345").is_ok());
/// assert!(validate_phone("12345").is_err());
/// ```
pub fn validate_phone(phone: &str) -> ValidationResult<()> {
    required("phone", phone)?;
    let phone = phone.trim();
    let body = phone.strip_prefix('+').unwrap_or(phone);

    if !body
        .chars()
        .all(|c| c.is_ascii_digit() || c == ' ' || c == '-')
    {
        return Err(ValidationError::InvalidFormat {
            field: "phone".to_string(),
            reason: "must contain only digits, spaces and hyphens".to_string(),
        });
    }

    let digits = body.chars().filter(|c| c.is_ascii_digit()).count();
    if !(10..=15).contains(&digits) {
        return Err(ValidationError::InvalidFormat {
            field: "phone".to_string(),
            reason: "must have 10 to 15 digits".to_string(),
        });
    }

    Ok(())
}

/// Validates a vehicle registration plate, e.g. `KA01AB1234`.
///
/// Letters and digits, 4 to 15 characters once spaces and hyphens are
/// removed.
pub fn validate_registration(registration: &str) -> ValidationResult<()> {
    required("registration", registration)?;
    let compact: String = registration
        .chars()
        .filter(|c| *c != ' ' && *c != '-')
        .collect();

    if !compact.chars().all(|c| c.is_ascii_alphanumeric()) {
        return Err(ValidationError::InvalidFormat {
            field: "registration".to_string(),
            reason: "must contain only letters and digits".to_string(),
        });
    }
    if !(4..=15).contains(&compact.len()) {
        return Err(ValidationError::InvalidFormat {
            field: "registration".to_string(),
            reason: "must be 4 to 15 characters".to_string(),
        });
    }

    Ok(())
}

/// Validates a contact block (name and phone required).
pub fn validate_contact(contact: &ContactInfo) -> ValidationResult<()> {
    required("contact name", &contact.name)?;
    max_len("contact name", &contact.name, 100)?;
    validate_phone(&contact.phone)?;
    if let Some(address) = &contact.address {
        max_len("address", address, 500)?;
    }
    Ok(())
}

/// Validates a vehicle block.
pub fn validate_vehicle(vehicle: &Vehicle) -> ValidationResult<()> {
    required("make", &vehicle.make)?;
    required("model", &vehicle.model)?;
    validate_registration(&vehicle.registration)
}

// =============================================================================
// Numeric Validators
// =============================================================================

/// Validates a quantity value.
///
/// ## Rules
/// - Must be positive (> 0)
/// - Must not exceed MAX_ITEM_QUANTITY (999)
///
/// ```text
/// qty <= 0   → "quantity must be positive"
/// qty > 999  → "quantity must be between 1 and 999"
/// ```
pub fn validate_quantity(qty: i64) -> ValidationResult<()> {
    if qty <= 0 {
        return Err(ValidationError::MustBePositive {
            field: "quantity".to_string(),
        });
    }

    if qty > MAX_ITEM_QUANTITY {
        return Err(ValidationError::OutOfRange {
            field: "quantity".to_string(),
            min: 1,
            max: MAX_ITEM_QUANTITY,
        });
    }

    Ok(())
}

/// Validates a price in paise. Zero is allowed (free fitment).
///
/// ## Example
/// ```rust
/// use pitstop_core::validation::validate_price_paise;
///
/// assert!(validate_price_paise(149_900).is_ok());
/// assert!(validate_price_paise(0).is_ok());
/// assert!(validate_price_paise(-100).is_err());
/// ```
pub fn validate_price_paise(paise: i64) -> ValidationResult<()> {
    if paise < 0 {
        return Err(ValidationError::OutOfRange {
            field: "price".to_string(),
            min: 0,
            max: i64::MAX,
        });
    }

    Ok(())
}

/// Validates a discount in basis points (0% to 100%).
pub fn validate_discount_bps(bps: u32) -> ValidationResult<()> {
    if bps > 10_000 {
        return Err(ValidationError::OutOfRange {
            field: "discount".to_string(),
            min: 0,
            max: 10_000,
        });
    }
    Ok(())
}

/// Validates a tax rate in basis points (0% to 100%).
pub fn validate_tax_rate_bps(bps: u32) -> ValidationResult<()> {
    if bps > 10_000 {
        return Err(ValidationError::OutOfRange {
            field: "tax_rate".to_string(),
            min: 0,
            max: 10_000,
        });
    }

    Ok(())
}

/// Validates a review rating (0.0 to 5.0).
pub fn validate_rating(rating: f64) -> ValidationResult<()> {
    if !(0.0..=5.0).contains(&rating) {
        return Err(ValidationError::OutOfRange {
            field: "rating".to_string(),
            min: 0,
            max: 5,
        });
    }
    Ok(())
}

// =============================================================================
// Collection Validators
// =============================================================================

/// Validates that one more line fits in a cart holding `current_items`.
pub fn validate_cart_size(current_items: usize) -> ValidationResult<()> {
    if current_items >= MAX_CART_ITEMS {
        return Err(ValidationError::OutOfRange {
            field: "cart items".to_string(),
            min: 0,
            max: MAX_CART_ITEMS as i64,
        });
    }

    Ok(())
}

/// Validates a catalog product before insert or update.
///
/// ## Checks
/// - name, MRP, discount and rating ranges
/// - every variant SKU is well-formed and unique within the product
/// - no negative stock
pub fn validate_product(product: &Product) -> ValidationResult<()> {
    validate_product_name(&product.name)?;
    validate_price_paise(product.mrp.paise())?;
    validate_discount_bps(product.discount_bps)?;
    validate_rating(product.rating)?;

    let mut seen = HashSet::new();
    for variant in &product.variants {
        validate_sku(&variant.sku)?;
        if !seen.insert(variant.sku.as_str()) {
            return Err(ValidationError::Duplicate {
                field: "sku".to_string(),
                value: variant.sku.clone(),
            });
        }
        if variant.stock < 0 {
            return Err(ValidationError::OutOfRange {
                field: "stock".to_string(),
                min: 0,
                max: i64::MAX,
            });
        }
    }

    if product.variants.is_empty() && product.total_stock < 0 {
        return Err(ValidationError::OutOfRange {
            field: "stock".to_string(),
            min: 0,
            max: i64::MAX,
        });
    }

    Ok(())
}

// =============================================================================
// UUID Validators
// =============================================================================

/// Validates a UUID string format.
///
/// ## Example
/// ```rust
/// use pitstop_core::validation::validate_uuid;
///
/// assert!(validate_uuid("550e8400-e29b-41d4-a716-446655440000").is_ok());
/// assert!(validate_uuid("not-a-uuid").is_err());
/// ```
pub fn validate_uuid(id: &str) -> ValidationResult<()> {
    required("id", id)?;

    uuid::Uuid::parse_str(id).map_err(|_| ValidationError::InvalidFormat {
        field: "id".to_string(),
        reason: "must be a valid UUID".to_string(),
    })?;

    Ok(())
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::money::Money;
    use crate::types::Variant;
    use chrono::Utc;

    fn variant(sku: &str, stock: i64) -> Variant {
        Variant {
            sku: sku.to_string(),
            position: None,
            material: None,
            stock,
            sort_order: 0,
        }
    }

    fn product(variants: Vec<Variant>) -> Product {
        Product {
            id: "p1".to_string(),
            name: "Wiper Blade".to_string(),
            brand: None,
            description: None,
            mrp: Money::from_major(450),
            discount_bps: 500,
            offer_price: Money::zero(),
            rating: 4.0,
            images: vec![],
            tags: vec![],
            warranty: None,
            return_policy: None,
            is_active: true,
            is_featured: false,
            variants,
            total_stock: 0,
            version: 0,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn test_validate_sku() {
        assert!(validate_sku("BP-FR-CER").is_ok());
        assert!(validate_sku("OIL_5W30").is_ok());

        assert!(validate_sku("").is_err());
        assert!(validate_sku("   ").is_err());
        assert!(validate_sku("has space").is_err());
        assert!(validate_sku(&"A".repeat(100)).is_err());
    }

    #[test]
    fn test_validate_quantity() {
        assert!(validate_quantity(1).is_ok());
        assert!(validate_quantity(999).is_ok());

        assert!(validate_quantity(0).is_err());
        assert!(validate_quantity(-1).is_err());
        assert!(validate_quantity(1000).is_err());
    }

    #[test]
    fn test_validate_phone() {
        assert!(validate_phone("9845012345").is_ok());
        assert!(validate_phone("+91-98450-12345").is_ok());

        assert!(validate_phone("").is_err());
        assert!(validate_phone("98450").is_err());
        assert!(validate_phone("98450abc45").is_err());
    }

    #[test]
    fn test_validate_registration() {
        assert!(validate_registration("KA01AB1234").is_ok());
        assert!(validate_registration("KA 01 AB 1234").is_ok());
        assert!(validate_registration("KA01@1234").is_err());
        assert!(validate_registration("K1").is_err());
    }

    #[test]
    fn test_validate_contact_and_vehicle() {
        let contact = ContactInfo {
            name: "Ravi".to_string(),
            phone: "9845012345".to_string(),
            address: None,
        };
        assert!(validate_contact(&contact).is_ok());
        assert!(validate_contact(&ContactInfo::default()).is_err());

        let vehicle = Vehicle {
            make: "Maruti".to_string(),
            model: "Swift".to_string(),
            registration: "KA01AB1234".to_string(),
        };
        assert!(validate_vehicle(&vehicle).is_ok());
        assert!(validate_vehicle(&Vehicle::default()).is_err());
    }

    #[test]
    fn test_validate_ranges() {
        assert!(validate_price_paise(0).is_ok());
        assert!(validate_price_paise(-1).is_err());
        assert!(validate_discount_bps(10_000).is_ok());
        assert!(validate_discount_bps(10_001).is_err());
        assert!(validate_tax_rate_bps(1800).is_ok());
        assert!(validate_tax_rate_bps(10_001).is_err());
        assert!(validate_rating(4.5).is_ok());
        assert!(validate_rating(5.1).is_err());
    }

    #[test]
    fn test_validate_product_rejects_duplicate_sku() {
        assert!(validate_product(&product(vec![variant("A", 1), variant("B", 2)])).is_ok());

        let err = validate_product(&product(vec![variant("A", 1), variant("A", 2)])).unwrap_err();
        assert!(matches!(err, ValidationError::Duplicate { .. }));
    }

    #[test]
    fn test_validate_product_rejects_negative_stock() {
        assert!(validate_product(&product(vec![variant("A", -1)])).is_err());
    }

    #[test]
    fn test_validate_cart_size() {
        assert!(validate_cart_size(0).is_ok());
        assert!(validate_cart_size(MAX_CART_ITEMS - 1).is_ok());
        assert!(validate_cart_size(MAX_CART_ITEMS).is_err());
    }

    #[test]
    fn test_validate_uuid() {
        assert!(validate_uuid("550e8400-e29b-41d4-a716-446655440000").is_ok());
        assert!(validate_uuid("").is_err());
        assert!(validate_uuid("123").is_err());
    }
}
