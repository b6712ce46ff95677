//! # Money Module
//!
//! Provides the `Money` type for handling rupee amounts safely.
//!
//! ## Why Integer Money?
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  THE FLOATING POINT PROBLEM                                             │
//! │                                                                         │
//! │  In JavaScript/floating point:                                          │
//! │    0.1 + 0.2 = 0.30000000000000004  ❌ WRONG!                           │
//! │                                                                         │
//! │  A workshop bill of ₹450 at 18% GST must print ₹81.00 tax, not         │
//! │  ₹80.99999999.                                                          │
//! │                                                                         │
//! │  OUR SOLUTION: Integer Paise                                            │
//! │    45000 paise × 1800 bps / 10000 = 8100 paise = ₹81.00               │
//! │    Rounding happens exactly once, at the tax line.                     │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Usage
//! ```rust
//! use pitstop_core::money::Money;
//!
//! let pad = Money::from_paise(149_900); // ₹1,499.00
//! let pair = pad * 2;
//! let total = pair + Money::from_major(250);
//! assert_eq!(total.paise(), 324_800);
//! ```

use serde::{Deserialize, Serialize};
use std::fmt;
use std::iter::Sum;
use std::ops::{Add, AddAssign, Mul, Sub, SubAssign};
use ts_rs::TS;

use crate::types::TaxRate;

// =============================================================================
// Money Type
// =============================================================================

/// A monetary value in paise (1/100 rupee).
///
/// ## Design Decisions
/// - **i64 (signed)**: Allows negative values for refunds and adjustments
/// - **Single field tuple struct**: Zero-cost abstraction over i64
///
/// ## Where Money Flows
/// ```text
/// ┌─────────────────────────────────────────────────────────────────────────┐
/// │  Product.mrp ──► offer_price ──► CartLine.unit_price ──► OrderItem     │
/// │                                                                         │
/// │  Part.unit_price × qty ──► parts_total ──► + labour ──► subtotal       │
/// │                                   subtotal × GST ──► tax_amount        │
/// │                                   subtotal + tax ──► grand_total       │
/// └─────────────────────────────────────────────────────────────────────────┘
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct Money(i64);

impl Money {
    /// Creates a Money value from paise (the smallest currency unit).
    ///
    /// ## Example
    /// ```rust
    /// use pitstop_core::money::Money;
    ///
    /// let price = Money::from_paise(1099); // ₹10.99
    /// assert_eq!(price.paise(), 1099);
    /// ```
    #[inline]
    pub const fn from_paise(paise: i64) -> Self {
        Money(paise)
    }

    /// Creates a Money value from whole rupees.
    ///
    /// ## Example
    /// ```rust
    /// use pitstop_core::money::Money;
    ///
    /// assert_eq!(Money::from_major(450).paise(), 45_000);
    /// ```
    #[inline]
    pub const fn from_major(rupees: i64) -> Self {
        Money(rupees * 100)
    }

    /// Creates a Money value from rupees and paise.
    ///
    /// For negative amounts only the rupee part carries the sign:
    /// `from_major_minor(-5, 50)` is -₹5.50.
    #[inline]
    pub const fn from_major_minor(rupees: i64, paise: i64) -> Self {
        if rupees < 0 {
            Money(rupees * 100 - paise)
        } else {
            Money(rupees * 100 + paise)
        }
    }

    /// Returns the value in paise.
    #[inline]
    pub const fn paise(&self) -> i64 {
        self.0
    }

    /// Returns the whole-rupee portion.
    #[inline]
    pub const fn rupees(&self) -> i64 {
        self.0 / 100
    }

    /// Returns the paise portion (always 0-99).
    #[inline]
    pub const fn paise_part(&self) -> i64 {
        (self.0 % 100).abs()
    }

    /// Returns zero money value.
    #[inline]
    pub const fn zero() -> Self {
        Money(0)
    }

    /// Checks if the value is zero.
    #[inline]
    pub const fn is_zero(&self) -> bool {
        self.0 == 0
    }

    /// Checks if the value is positive (greater than zero).
    #[inline]
    pub const fn is_positive(&self) -> bool {
        self.0 > 0
    }

    /// Checks if the value is negative (less than zero).
    #[inline]
    pub const fn is_negative(&self) -> bool {
        self.0 < 0
    }

    /// Calculates tax at `rate`, rounding half up to the nearest paisa.
    ///
    /// ## Implementation
    /// Integer math: `(amount * bps + 5000) / 10000`.
    /// The +5000 provides rounding (5000/10000 = 0.5).
    ///
    /// ## Example
    /// ```rust
    /// use pitstop_core::money::Money;
    /// use pitstop_core::types::TaxRate;
    ///
    /// let subtotal = Money::from_major(450);
    /// let gst = subtotal.calculate_tax(TaxRate::from_bps(1800));
    /// assert_eq!(gst.paise(), 8_100); // ₹81.00
    ///
    /// // ₹10.00 at 8.25% = ₹0.825 → ₹0.83
    /// assert_eq!(Money::from_paise(1000).calculate_tax(TaxRate::from_bps(825)).paise(), 83);
    /// ```
    pub fn calculate_tax(&self, rate: TaxRate) -> Money {
        self.checked_calculate_tax(rate).unwrap_or(if self.0 < 0 {
            Money(i64::MIN)
        } else {
            Money(i64::MAX)
        })
    }

    /// Like [`calculate_tax`](Self::calculate_tax), but `None` when the tax
    /// does not fit in an `i64`.
    pub fn checked_calculate_tax(&self, rate: TaxRate) -> Option<Money> {
        // i128 keeps large bills from overflowing before the division
        let tax = (i128::from(self.0) * i128::from(rate.bps()) + 5000) / 10000;
        i64::try_from(tax).ok().map(Money)
    }

    /// Multiplies money by a quantity.
    ///
    /// ## Example
    /// ```rust
    /// use pitstop_core::money::Money;
    ///
    /// let unit_price = Money::from_paise(29_900);
    /// assert_eq!(unit_price.multiply_quantity(3).paise(), 89_700);
    /// ```
    #[inline]
    pub const fn multiply_quantity(&self, qty: i64) -> Self {
        Money(self.0 * qty)
    }

    /// Multiplies by a quantity, returning `None` on overflow.
    #[inline]
    pub fn checked_multiply_quantity(&self, qty: i64) -> Option<Self> {
        self.0.checked_mul(qty).map(Money)
    }

    /// Adds two amounts, returning `None` on overflow.
    #[inline]
    pub fn checked_add(&self, other: Money) -> Option<Self> {
        self.0.checked_add(other.0).map(Money)
    }

    /// Applies a percentage discount and returns the discounted amount.
    ///
    /// ## Arguments
    /// * `discount_bps` - Discount in basis points (1000 = 10%)
    ///
    /// ## Example
    /// ```rust
    /// use pitstop_core::money::Money;
    ///
    /// let mrp = Money::from_major(2_000);
    /// assert_eq!(mrp.apply_percentage_discount(1500).paise(), 170_000); // 15% off
    /// ```
    ///
    /// Discounts above 100% are treated as 100%.
    pub fn apply_percentage_discount(&self, discount_bps: u32) -> Money {
        let amount = i128::from(self.0);
        let discount_amount = (amount * i128::from(discount_bps.min(10_000)) + 5000) / 10000;
        let discounted = amount - discount_amount;
        Money(i64::try_from(discounted).unwrap_or(if discounted < 0 { i64::MIN } else { i64::MAX }))
    }
}

// =============================================================================
// Trait Implementations
// =============================================================================

/// Human-readable rupee amount, e.g. `₹531.00`.
///
/// Screens should format with the device locale; this is for logs and tests.
impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sign = if self.0 < 0 { "-" } else { "" };
        write!(f, "{}₹{}.{:02}", sign, self.rupees().abs(), self.paise_part())
    }
}

impl Default for Money {
    fn default() -> Self {
        Money::zero()
    }
}

impl Add for Money {
    type Output = Self;

    #[inline]
    fn add(self, other: Self) -> Self {
        Money(self.0 + other.0)
    }
}

impl AddAssign for Money {
    #[inline]
    fn add_assign(&mut self, other: Self) {
        self.0 += other.0;
    }
}

impl Sub for Money {
    type Output = Self;

    #[inline]
    fn sub(self, other: Self) -> Self {
        Money(self.0 - other.0)
    }
}

impl SubAssign for Money {
    #[inline]
    fn sub_assign(&mut self, other: Self) {
        self.0 -= other.0;
    }
}

impl Mul<i64> for Money {
    type Output = Self;

    #[inline]
    fn mul(self, qty: i64) -> Self {
        Money(self.0 * qty)
    }
}

impl Sum for Money {
    fn sum<I: Iterator<Item = Money>>(iter: I) -> Self {
        iter.fold(Money::zero(), |acc, m| acc + m)
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_paise() {
        let money = Money::from_paise(1099);
        assert_eq!(money.paise(), 1099);
        assert_eq!(money.rupees(), 10);
        assert_eq!(money.paise_part(), 99);
    }

    #[test]
    fn test_from_major_minor() {
        assert_eq!(Money::from_major_minor(10, 99).paise(), 1099);
        assert_eq!(Money::from_major_minor(-5, 50).paise(), -550);
    }

    #[test]
    fn test_display() {
        assert_eq!(Money::from_paise(53_100).to_string(), "₹531.00");
        assert_eq!(Money::from_paise(500).to_string(), "₹5.00");
        assert_eq!(Money::from_paise(-550).to_string(), "-₹5.50");
        assert_eq!(Money::zero().to_string(), "₹0.00");
    }

    #[test]
    fn test_arithmetic() {
        let a = Money::from_paise(1000);
        let b = Money::from_paise(500);

        assert_eq!((a + b).paise(), 1500);
        assert_eq!((a - b).paise(), 500);
        assert_eq!((a * 3).paise(), 3000);
    }

    #[test]
    fn test_gst_eighteen_percent() {
        let subtotal = Money::from_major(450);
        let tax = subtotal.calculate_tax(TaxRate::from_bps(1800));
        assert_eq!(tax, Money::from_major(81));
    }

    #[test]
    fn test_tax_overflow_is_detected() {
        let huge = Money::from_paise(i64::MAX / 2);
        assert_eq!(huge.checked_calculate_tax(TaxRate::from_bps(u32::MAX)), None);
        assert_eq!(huge.calculate_tax(TaxRate::from_bps(u32::MAX)), Money::from_paise(i64::MAX));
        assert_eq!(
            Money::from_major(450).checked_calculate_tax(TaxRate::from_bps(1800)),
            Some(Money::from_major(81))
        );
    }

    #[test]
    fn test_discount_above_full_price_is_capped() {
        let mrp = Money::from_major(100);
        assert_eq!(mrp.apply_percentage_discount(u32::MAX), Money::zero());
        assert_eq!(Money::from_paise(i64::MAX).apply_percentage_discount(0), Money::from_paise(i64::MAX));
    }

    #[test]
    fn test_tax_rounds_half_up() {
        // ₹0.05 at 10% = 0.5 paise → 1 paisa
        let tax = Money::from_paise(5).calculate_tax(TaxRate::from_bps(1000));
        assert_eq!(tax.paise(), 1);

        // ₹0.04 at 10% = 0.4 paise → 0
        let tax = Money::from_paise(4).calculate_tax(TaxRate::from_bps(1000));
        assert_eq!(tax.paise(), 0);
    }

    #[test]
    fn test_percentage_discount() {
        let mrp = Money::from_major(100);
        assert_eq!(mrp.apply_percentage_discount(1000).paise(), 9000);
        assert_eq!(mrp.apply_percentage_discount(0), mrp);
        assert_eq!(mrp.apply_percentage_discount(10_000), Money::zero());
    }

    #[test]
    fn test_checked_ops() {
        assert_eq!(
            Money::from_paise(i64::MAX).checked_multiply_quantity(2),
            None
        );
        assert_eq!(
            Money::from_paise(100).checked_add(Money::from_paise(1)),
            Some(Money::from_paise(101))
        );
    }

    #[test]
    fn test_sum() {
        let total: Money = [Money::from_major(200), Money::from_major(50)]
            .into_iter()
            .sum();
        assert_eq!(total, Money::from_major(250));
    }

    #[test]
    fn test_zero_and_checks() {
        let zero = Money::zero();
        assert!(zero.is_zero());
        assert!(!zero.is_positive());
        assert!(!zero.is_negative());

        assert!(Money::from_paise(100).is_positive());
        assert!(Money::from_paise(-100).is_negative());
    }
}
