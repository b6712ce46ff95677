//! # pitstop-core: Pure Business Logic for Pitstop
//!
//! Domain rules for a car-service shop: parts and accessories sold from a
//! catalog with per-variant stock, and workshop jobs billed as
//! parts + labour + GST. Everything here is a pure function over plain data.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        Pitstop Architecture                             │
//! │                                                                         │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                    Mobile screens (out of tree)                 │   │
//! │  │   Catalog ──► Cart ──► Checkout        Bookings ──► Bill        │   │
//! │  └─────────────────────────────┬───────────────────────────────────┘   │
//! │                                │                                        │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │                 pitstop-db (transactions)                       │   │
//! │  │   InventoryLedger, OrderRepository, ServiceRepository, ...      │   │
//! │  └─────────────────────────────┬───────────────────────────────────┘   │
//! │                                │ pure calls                             │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │               ★ pitstop-core (THIS CRATE) ★                     │   │
//! │  │                                                                 │   │
//! │  │   types   money   cart   stock   billing   validation  sequence │   │
//! │  │                                                                 │   │
//! │  │   NO I/O • NO DATABASE • NO NETWORK • PURE FUNCTIONS           │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Modules
//!
//! - [`types`] - Domain records (Product, Variant, Order, ServiceRecord, Invoice)
//! - [`money`] - Money type with integer arithmetic (paise, no floating point)
//! - [`cart`] - Cart snapshot rules (add, increment, decrement, remove)
//! - [`stock`] - Stock-commit planning: coarse-then-fine validation and staging
//! - [`billing`] - Invoice computation and the service status machine
//! - [`sequence`] - Human-readable sequential ids (`SE001`, `BS002`)
//! - [`error`] - Domain error types
//! - [`validation`] - Field-level input validation
//!
//! ## Example Usage
//!
//! ```rust
//! use pitstop_core::billing::{InvoiceTotals, PartInput};
//! use pitstop_core::{Money, TaxRate};
//!
//! let parts = vec![
//!     PartInput::new("Brake pad", 2, Money::from_major(100)),
//!     PartInput::new("Brake fluid", 1, Money::from_major(50)),
//! ];
//! let totals = InvoiceTotals::compute(&parts, Money::from_major(200), TaxRate::from_bps(1800)).unwrap();
//!
//! assert_eq!(totals.subtotal, Money::from_major(450));
//! assert_eq!(totals.grand_total.to_string(), "₹531.00");
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod billing;
pub mod cart;
pub mod error;
pub mod money;
pub mod sequence;
pub mod stock;
pub mod types;
pub mod validation;

// =============================================================================
// Re-exports for Convenience
// =============================================================================

pub use billing::{BillingFlow, InvoiceTotals, PartInput};
pub use cart::{Cart, CartLine};
pub use error::{BillingError, CoreError, StockError, ValidationError};
pub use money::Money;
pub use stock::{ProductStock, StockPlan, StockRequest, StockUpdate, VariantStock};
pub use types::*;

// =============================================================================
// Crate-Level Constants
// =============================================================================

/// Maximum distinct lines allowed in a single cart.
pub const MAX_CART_ITEMS: usize = 100;

/// Maximum quantity of a single line in a cart or stock request.
///
/// Guards against fat-finger orders (typing 1000 instead of 10).
pub const MAX_ITEM_QUANTITY: i64 = 999;

/// Default GST rate applied to workshop bills, in basis points (18%).
pub const DEFAULT_GST_BPS: u32 = 1800;
