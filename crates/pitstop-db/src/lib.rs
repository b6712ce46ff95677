//! # pitstop-db: Storage and Units of Work for Pitstop
//!
//! SQLite storage for the car-service shop, and the transactional units of
//! work built on it: stock commits, checkout, and service billing.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        Pitstop Data Flow                                │
//! │                                                                         │
//! │  App screen (checkout, billing desk)                                   │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                   pitstop-db (THIS CRATE)                       │   │
//! │  │                                                                 │   │
//! │  │   ┌───────────────┐    ┌───────────────┐    ┌──────────────┐  │   │
//! │  │   │   Database    │    │  Repositories │    │  ChangeFeed  │  │   │
//! │  │   │   (pool.rs)   │◄───│ Inventory     │───►│ (events.rs)  │  │   │
//! │  │   │ SqlitePool    │    │ Orders        │    │ StoreEvent   │  │   │
//! │  │   │ StoreContext  │    │ Services ...  │    │ broadcast    │  │   │
//! │  │   └───────────────┘    └───────┬───────┘    └──────────────┘  │   │
//! │  │                                │ plan / compute                │   │
//! │  │                                ▼                               │   │
//! │  │                      pitstop-core (pure rules)                 │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  SQLite (WAL) ~/.local/share/pitstop/pitstop.db                        │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Module Organization
//!
//! - [`config`] - `pitstop.toml` loading and env overrides
//! - [`pool`] - Connection pool, [`Database`] handle
//! - [`migrations`] - Embedded database migrations
//! - [`retry`] - Conflict retry for units of work
//! - [`events`] - Change feed
//! - [`error`] - Database error types
//! - [`repository`] - Repository implementations
//!
//! ## Usage
//!
//! ```rust,ignore
//! use pitstop_db::{Database, PitstopConfig};
//!
//! let config = PitstopConfig::load(None)?;
//! let db = Database::new(config.db_config()).await?;
//!
//! let updates = db
//!     .inventory()
//!     .commit_stock(&[StockRequest::new(&pads_id, "BP-1", 2)])
//!     .await?;
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod config;
pub mod error;
pub mod events;
pub mod migrations;
pub mod pool;
pub mod repository;
pub mod retry;

// =============================================================================
// Re-exports
// =============================================================================

pub use config::PitstopConfig;
pub use error::{ConfigError, ConfigResult, DbError, DbResult};
pub use events::{ChangeFeed, StoreEvent, Subscription};
pub use pool::{Database, DbConfig, StoreContext};
pub use retry::{with_retry, RetryPolicy};

// Repository re-exports for convenience
pub use repository::cart::CartRepository;
pub use repository::counter::{CounterRepository, SequenceSettings};
pub use repository::inventory::InventoryLedger;
pub use repository::invoice::InvoiceRepository;
pub use repository::order::{OrderLine, OrderRepository, PlaceOrder};
pub use repository::product::ProductRepository;
pub use repository::service::{NewService, ServiceRepository};
