//! # Domain Types
//!
//! Core records used throughout Pitstop.
//!
//! ## Type Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Domain Types                                    │
//! │                                                                         │
//! │  ┌─────────────────┐   ┌─────────────────┐   ┌─────────────────┐       │
//! │  │    Product      │   │     Order       │   │ ServiceRecord   │       │
//! │  │  ─────────────  │   │  ─────────────  │   │  ─────────────  │       │
//! │  │  id (UUID)      │   │  id (UUID)      │   │  id (UUID)      │       │
//! │  │  mrp, discount  │   │  order_number   │   │  service_number │       │
//! │  │  total_stock    │   │  items (frozen) │   │  status         │       │
//! │  │  variants[] ────┼─┐ │  totals         │   │  parts[]        │       │
//! │  └─────────────────┘ │ └─────────────────┘   └────────┬────────┘       │
//! │                      │                                │                │
//! │  ┌─────────────────┐ │                       ┌────────▼────────┐       │
//! │  │    Variant      │◄┘                       │    Invoice      │       │
//! │  │  sku, position  │                         │  parts, labour  │       │
//! │  │  material, stock│                         │  GST, totals    │       │
//! │  └─────────────────┘                         └─────────────────┘       │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Dual-Key Identity Pattern
//! Every persisted entity has:
//! - `id`: UUID v4, immutable, used for relations
//! - A business id where people read it aloud (`SKU`, `OD004`, `SE012`, `BS007`)

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use ts_rs::TS;

use crate::error::ValidationError;
use crate::money::Money;

// =============================================================================
// Tax Rate
// =============================================================================

/// Tax rate represented in basis points (bps).
///
/// 1 basis point = 0.01%, so GST 18% is 1800 bps.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct TaxRate(u32);

impl TaxRate {
    /// Creates a tax rate from basis points.
    #[inline]
    pub const fn from_bps(bps: u32) -> Self {
        TaxRate(bps)
    }

    /// Creates a tax rate from a whole percentage (18 → 18%).
    #[inline]
    pub const fn from_percent(pct: u32) -> Self {
        TaxRate(pct.saturating_mul(100))
    }

    /// Returns the rate in basis points.
    #[inline]
    pub const fn bps(&self) -> u32 {
        self.0
    }

    /// Returns the rate as a percentage (for display only).
    #[inline]
    pub fn percentage(&self) -> f64 {
        self.0 as f64 / 100.0
    }

    /// Zero tax rate.
    #[inline]
    pub const fn zero() -> Self {
        TaxRate(0)
    }
}

impl Default for TaxRate {
    fn default() -> Self {
        TaxRate::from_bps(crate::DEFAULT_GST_BPS)
    }
}

// =============================================================================
// Product & Variant
// =============================================================================

/// A purchasable configuration of a product (e.g. front, ceramic pads).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct Variant {
    /// Stock Keeping Unit, unique across the catalog.
    pub sku: String,
    /// Fitment position ("Front", "Rear", "Front Left").
    pub position: Option<String>,
    /// Material or grade ("Ceramic", "Semi-metallic").
    pub material: Option<String>,
    /// Units on hand.
    pub stock: i64,
    /// Display position within the product.
    pub sort_order: i64,
}

impl Variant {
    /// Short descriptor shown on order lines, e.g. `Front / Ceramic`.
    pub fn label(&self) -> String {
        match (&self.position, &self.material) {
            (Some(p), Some(m)) => format!("{} / {}", p, m),
            (Some(p), None) => p.clone(),
            (None, Some(m)) => m.clone(),
            (None, None) => self.sku.clone(),
        }
    }
}

/// A catalog product with an ordered list of variants.
///
/// ## Stock Invariant
/// When `variants` is non-empty, `total_stock == Σ variant.stock` after every
/// mutation. A product without variants keeps its stock in `total_stock`.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct Product {
    /// Unique identifier (UUID v4).
    pub id: String,
    pub name: String,
    pub brand: Option<String>,
    pub description: Option<String>,
    /// List price (MRP).
    pub mrp: Money,
    /// Discount off MRP in basis points (1500 = 15%).
    pub discount_bps: u32,
    /// Derived selling price; see [`offer_price`].
    pub offer_price: Money,
    /// Average review rating, 0.0 to 5.0.
    pub rating: f64,
    pub images: Vec<String>,
    pub tags: Vec<String>,
    pub warranty: Option<String>,
    pub return_policy: Option<String>,
    pub is_active: bool,
    pub is_featured: bool,
    /// Ordered variants (display order).
    pub variants: Vec<Variant>,
    /// Aggregate stock across variants.
    pub total_stock: i64,
    /// Optimistic concurrency version, bumped on every write.
    pub version: i64,
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
    #[ts(as = "String")]
    pub updated_at: DateTime<Utc>,
}

impl Product {
    /// Returns the variant with `sku`, if any.
    pub fn variant(&self, sku: &str) -> Option<&Variant> {
        self.variants.iter().find(|v| v.sku == sku)
    }

    /// Sum of variant stock, or `total_stock` when there are no variants.
    pub fn computed_total_stock(&self) -> i64 {
        if self.variants.is_empty() {
            self.total_stock
        } else {
            self.variants.iter().map(|v| v.stock).sum()
        }
    }

    /// True when the aggregate matches the variants.
    pub fn is_stock_consistent(&self) -> bool {
        self.total_stock == self.computed_total_stock()
    }

    /// Re-derives `offer_price` and `total_stock` from their sources.
    pub fn normalize(&mut self) {
        self.offer_price = offer_price(self.mrp, self.discount_bps);
        self.total_stock = self.computed_total_stock();
    }
}

/// Selling price after discount: `mrp - round(mrp × discount)`.
///
/// ## Example
/// ```rust
/// use pitstop_core::{offer_price, Money};
///
/// assert_eq!(offer_price(Money::from_major(1_000), 1250), Money::from_major(875));
/// ```
pub fn offer_price(mrp: Money, discount_bps: u32) -> Money {
    mrp.apply_percentage_discount(discount_bps.min(10_000))
}

// =============================================================================
// Contact & Vehicle
// =============================================================================

/// Customer or shipping contact block.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct ContactInfo {
    pub name: String,
    pub phone: String,
    pub address: Option<String>,
}

/// The vehicle a service job is for.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct Vehicle {
    pub make: String,
    pub model: String,
    /// Registration plate, e.g. `KA01AB1234`.
    pub registration: String,
}

impl fmt::Display for Vehicle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} ({})", self.make, self.model, self.registration)
    }
}

// =============================================================================
// Order
// =============================================================================

/// Fulfilment status of an order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "snake_case"))]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    #[default]
    Placed,
    Confirmed,
    Shipped,
    Delivered,
    Cancelled,
}

/// How the customer pays.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "snake_case"))]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum PaymentMethod {
    CashOnDelivery,
    /// UPI / card through the payment gateway.
    Online,
}

/// Payment state shared by orders and invoices.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "snake_case"))]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum PaymentStatus {
    #[default]
    Pending,
    Paid,
    Failed,
    Refunded,
}

/// A frozen order line.
///
/// Snapshot pattern: name, variant and price are copied at commit time so the
/// order reads the same after catalog edits.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct OrderItem {
    pub product_id: String,
    pub sku: String,
    pub name: String,
    pub variant_label: String,
    pub unit_price: Money,
    pub quantity: i64,
    pub line_total: Money,
}

/// A placed order. Items and totals never change after creation.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct Order {
    pub id: String,
    /// Human-readable number, e.g. `OD004`.
    pub order_number: String,
    pub user_id: String,
    pub items: Vec<OrderItem>,
    pub subtotal: Money,
    pub total: Money,
    pub payment_method: PaymentMethod,
    pub payment_status: PaymentStatus,
    pub status: OrderStatus,
    pub contact: ContactInfo,
    pub idempotency_key: Option<String>,
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
    #[ts(as = "String")]
    pub updated_at: DateTime<Utc>,
}

// =============================================================================
// Service Status
// =============================================================================

/// Workflow status of a service job.
///
/// ## State Machine
/// ```text
/// Booked → CallVerified → Approved → Processing → WaitingForSpare
///        → ServiceGoingOn → BillPending → BillCompleted → ServiceCompleted
///
/// Any non-terminal state ──► Cancelled
/// ```
/// Moves are forward only; skipping ahead is allowed (not every job waits for
/// spares) but never past billing. `ServiceCompleted` and `Cancelled` are
/// terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "snake_case"))]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum ServiceStatus {
    #[default]
    Booked,
    CallVerified,
    Approved,
    Processing,
    WaitingForSpare,
    ServiceGoingOn,
    BillPending,
    BillCompleted,
    ServiceCompleted,
    Cancelled,
}

impl ServiceStatus {
    /// All statuses in workflow order.
    pub const ALL: [ServiceStatus; 10] = [
        ServiceStatus::Booked,
        ServiceStatus::CallVerified,
        ServiceStatus::Approved,
        ServiceStatus::Processing,
        ServiceStatus::WaitingForSpare,
        ServiceStatus::ServiceGoingOn,
        ServiceStatus::BillPending,
        ServiceStatus::BillCompleted,
        ServiceStatus::ServiceCompleted,
        ServiceStatus::Cancelled,
    ];

    /// Stable snake_case name (matches the database and JSON form).
    pub const fn as_str(&self) -> &'static str {
        match self {
            ServiceStatus::Booked => "booked",
            ServiceStatus::CallVerified => "call_verified",
            ServiceStatus::Approved => "approved",
            ServiceStatus::Processing => "processing",
            ServiceStatus::WaitingForSpare => "waiting_for_spare",
            ServiceStatus::ServiceGoingOn => "service_going_on",
            ServiceStatus::BillPending => "bill_pending",
            ServiceStatus::BillCompleted => "bill_completed",
            ServiceStatus::ServiceCompleted => "service_completed",
            ServiceStatus::Cancelled => "cancelled",
        }
    }

    /// No further moves are possible.
    pub const fn is_terminal(&self) -> bool {
        matches!(self, ServiceStatus::ServiceCompleted | ServiceStatus::Cancelled)
    }

    /// The next status in the normal flow.
    pub fn next(&self) -> Option<ServiceStatus> {
        if self.is_terminal() {
            return None;
        }
        let idx = Self::ALL.iter().position(|s| s == self)?;
        Self::ALL
            .get(idx + 1)
            .copied()
            .filter(|s| *s != ServiceStatus::Cancelled)
    }

    /// Whether a move from `self` to `to` is allowed.
    ///
    /// ## Example
    /// ```rust
    /// use pitstop_core::ServiceStatus;
    ///
    /// assert!(ServiceStatus::Booked.can_transition_to(ServiceStatus::CallVerified));
    /// assert!(ServiceStatus::ServiceGoingOn.can_transition_to(ServiceStatus::BillCompleted));
    /// assert!(!ServiceStatus::BillPending.can_transition_to(ServiceStatus::Approved));
    /// assert!(ServiceStatus::Processing.can_transition_to(ServiceStatus::Cancelled));
    /// assert!(!ServiceStatus::Cancelled.can_transition_to(ServiceStatus::Booked));
    /// ```
    pub fn can_transition_to(&self, to: ServiceStatus) -> bool {
        if self.is_terminal() {
            return false;
        }
        if to == ServiceStatus::Cancelled {
            return true;
        }
        to > *self
    }

    /// Whether staff may move a job from `self` to `to` by hand.
    ///
    /// A subset of [`can_transition_to`](Self::can_transition_to) that never
    /// reaches or jumps over `BillCompleted`: that status is only set
    /// together with the invoice. Before billing, jobs may skip ahead as far
    /// as `BillPending`; after billing, the only move is to
    /// `ServiceCompleted`.
    ///
    /// ## Example
    /// ```rust
    /// use pitstop_core::ServiceStatus;
    ///
    /// assert!(ServiceStatus::Booked.can_move_manually(ServiceStatus::ServiceGoingOn));
    /// assert!(!ServiceStatus::BillPending.can_move_manually(ServiceStatus::ServiceCompleted));
    /// assert!(ServiceStatus::BillCompleted.can_move_manually(ServiceStatus::ServiceCompleted));
    /// ```
    pub fn can_move_manually(&self, to: ServiceStatus) -> bool {
        if !self.can_transition_to(to) {
            return false;
        }
        match to {
            ServiceStatus::Cancelled => true,
            ServiceStatus::BillCompleted => false,
            ServiceStatus::ServiceCompleted => *self == ServiceStatus::BillCompleted,
            _ => to <= ServiceStatus::BillPending,
        }
    }
}

impl fmt::Display for ServiceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ServiceStatus {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .iter()
            .copied()
            .find(|status| status.as_str() == s)
            .ok_or_else(|| ValidationError::InvalidFormat {
                field: "status".to_string(),
                reason: format!("unknown service status '{}'", s),
            })
    }
}

// =============================================================================
// Service Record, Part, Invoice
// =============================================================================

/// A part consumed on a service job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct Part {
    pub name: String,
    pub quantity: i64,
    pub unit_price: Money,
    pub line_total: Money,
}

/// A booked car-service job.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct ServiceRecord {
    pub id: String,
    /// Human-readable number, e.g. `SE012`.
    pub service_number: String,
    pub user_id: String,
    pub contact: ContactInfo,
    pub vehicle: Vehicle,
    /// What was booked ("General service", "Brake inspection").
    pub service_type: String,
    pub notes: Option<String>,
    pub status: ServiceStatus,
    /// Parts attached so far, in the order they were added.
    pub parts: Vec<Part>,
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
    #[ts(as = "String")]
    pub updated_at: DateTime<Utc>,
}

/// Which flow produced an invoice.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "snake_case"))]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum InvoiceKind {
    /// Workshop bill for a service record.
    Service,
    /// Over-the-counter sale, no service record.
    Counter,
}

/// An immutable bill. Only `payment_status` changes after creation.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct Invoice {
    pub id: String,
    /// Human-readable number, e.g. `BS007`.
    pub invoice_number: String,
    pub kind: InvoiceKind,
    pub service_id: Option<String>,
    pub contact: ContactInfo,
    pub vehicle: Option<Vehicle>,
    pub parts: Vec<Part>,
    pub parts_total: Money,
    pub labour: Money,
    pub tax_rate: TaxRate,
    pub tax_amount: Money,
    pub subtotal: Money,
    pub grand_total: Money,
    pub payment_status: PaymentStatus,
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn product(variants: Vec<Variant>, total_stock: i64) -> Product {
        Product {
            id: "p1".to_string(),
            name: "Brake Pad Set".to_string(),
            brand: Some("Bosch".to_string()),
            description: None,
            mrp: Money::from_major(2_000),
            discount_bps: 1000,
            offer_price: Money::zero(),
            rating: 4.5,
            images: vec![],
            tags: vec![],
            warranty: None,
            return_policy: None,
            is_active: true,
            is_featured: false,
            variants,
            total_stock,
            version: 0,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    fn variant(sku: &str, stock: i64) -> Variant {
        Variant {
            sku: sku.to_string(),
            position: Some("Front".to_string()),
            material: Some("Ceramic".to_string()),
            stock,
            sort_order: 0,
        }
    }

    #[test]
    fn test_tax_rate_from_percent() {
        assert_eq!(TaxRate::from_percent(18).bps(), 1800);
        assert_eq!(TaxRate::from_percent(u32::MAX).bps(), u32::MAX);
        assert!((TaxRate::from_bps(825).percentage() - 8.25).abs() < 0.001);
        assert_eq!(TaxRate::default().bps(), 1800);
    }

    #[test]
    fn test_normalize_recomputes_total_and_offer() {
        let mut p = product(vec![variant("A", 3), variant("B", 4)], 0);
        assert!(!p.is_stock_consistent());

        p.normalize();
        assert_eq!(p.total_stock, 7);
        assert_eq!(p.offer_price, Money::from_major(1_800));
        assert!(p.is_stock_consistent());
    }

    #[test]
    fn test_product_without_variants_keeps_total() {
        let p = product(vec![], 12);
        assert_eq!(p.computed_total_stock(), 12);
        assert!(p.is_stock_consistent());
    }

    #[test]
    fn test_variant_label() {
        assert_eq!(variant("A", 1).label(), "Front / Ceramic");
        let bare = Variant {
            sku: "OIL-5W30".to_string(),
            position: None,
            material: None,
            stock: 1,
            sort_order: 0,
        };
        assert_eq!(bare.label(), "OIL-5W30");
    }

    #[test]
    fn test_status_next_follows_workflow() {
        assert_eq!(ServiceStatus::Booked.next(), Some(ServiceStatus::CallVerified));
        assert_eq!(
            ServiceStatus::BillCompleted.next(),
            Some(ServiceStatus::ServiceCompleted)
        );
        assert_eq!(ServiceStatus::ServiceCompleted.next(), None);
        assert_eq!(ServiceStatus::Cancelled.next(), None);
    }

    #[test]
    fn test_status_transitions() {
        use ServiceStatus::*;

        assert!(Booked.can_transition_to(Approved));
        assert!(BillPending.can_transition_to(BillCompleted));
        assert!(!BillCompleted.can_transition_to(BillPending));
        assert!(!Approved.can_transition_to(Approved));
        assert!(BillCompleted.can_transition_to(Cancelled));
        assert!(!ServiceCompleted.can_transition_to(Cancelled));
        assert!(!Cancelled.can_transition_to(ServiceCompleted));
    }

    #[test]
    fn test_manual_moves_stop_at_billing() {
        use ServiceStatus::*;

        assert!(Booked.can_move_manually(BillPending));
        assert!(WaitingForSpare.can_move_manually(ServiceGoingOn));
        assert!(BillPending.can_move_manually(Cancelled));
        assert!(BillCompleted.can_move_manually(ServiceCompleted));

        assert!(!Booked.can_move_manually(ServiceCompleted));
        assert!(!ServiceGoingOn.can_move_manually(BillCompleted));
        assert!(!BillPending.can_move_manually(BillCompleted));
        assert!(!BillPending.can_move_manually(ServiceCompleted));
        assert!(!Approved.can_move_manually(Booked));
        assert!(!ServiceCompleted.can_move_manually(Cancelled));
    }

    #[test]
    fn test_status_round_trips_through_str() {
        for status in ServiceStatus::ALL {
            assert_eq!(status.as_str().parse::<ServiceStatus>().unwrap(), status);
        }
        assert!("in_the_shop".parse::<ServiceStatus>().is_err());
    }

    #[test]
    fn test_status_serde_matches_as_str() {
        let json = serde_json::to_string(&ServiceStatus::WaitingForSpare).unwrap();
        assert_eq!(json, "\"waiting_for_spare\"");
    }
}
