//! # Repository Module
//!
//! Database repositories for Pitstop.
//!
//! ## Repository Pattern
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Who Writes What                                      │
//! │                                                                         │
//! │  ProductRepository   products, product_variants (catalog fields only)  │
//! │  InventoryLedger     variant stock + total_stock (Stock-Commit)        │
//! │  CartRepository      cart_lines                                        │
//! │  OrderRepository     orders, order_items, and stock/cart via the       │
//! │                      ledger helpers in the same transaction            │
//! │  ServiceRepository   service_records, service_parts, service invoices  │
//! │  InvoiceRepository   counter invoices, payment status                  │
//! │  CounterRepository   counters (SE / OD / BS numbers)                   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Units of work that span repositories share `pub(crate)` helpers that take
//! a `&mut SqliteConnection`, so they run inside one caller-owned
//! transaction.

pub mod cart;
pub mod counter;
pub mod inventory;
pub mod invoice;
pub mod order;
pub mod product;
pub mod service;
