//! # Database Handle
//!
//! Opens the SQLite pool and hands out repositories that share it.
//!
//! ## Wiring
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                      Database Connection Pool                           │
//! │                                                                         │
//! │  PitstopConfig::load() ──► db_config()                                 │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  Database::new(config).await ← Create pool + run migrations            │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  ┌─────────────────────────────────────────┐   ┌───────────────────┐   │
//! │  │            SqlitePool                    │   │   StoreContext    │   │
//! │  │  ┌─────┐ ┌─────┐ ┌─────┐ ┌─────┐       │   │  retry policy     │   │
//! │  │  │Conn1│ │Conn2│ │Conn3│ │Conn4│ ...   │   │  sequence prefixes│   │
//! │  │  └─────┘ └─────┘ └─────┘ └─────┘       │   │  default GST      │   │
//! │  └─────────────────────────────────────────┘   │  change feed      │   │
//! │       │                                        └───────────────────┘   │
//! │       ▼                                                                 │
//! │  db.inventory() / db.orders() / db.services() / ...                    │
//! │  (each unit of work takes one connection for its transaction)          │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## WAL Mode
//! File databases use WAL so readers never block the single writer. A
//! writer whose snapshot went stale gets `SQLITE_BUSY_SNAPSHOT`, which the
//! unit of work treats as a conflict and retries.

use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous};
use sqlx::SqlitePool;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;
use tracing::{debug, info};

use pitstop_core::TaxRate;

use crate::error::{DbError, DbResult};
use crate::events::{ChangeFeed, Subscription, DEFAULT_FEED_CAPACITY};
use crate::migrations;
use crate::repository::cart::CartRepository;
use crate::repository::counter::{CounterRepository, SequenceSettings};
use crate::repository::inventory::InventoryLedger;
use crate::repository::invoice::InvoiceRepository;
use crate::repository::order::OrderRepository;
use crate::repository::product::ProductRepository;
use crate::repository::service::ServiceRepository;
use crate::retry::RetryPolicy;

const IN_MEMORY_PATH: &str = ":memory:";

// =============================================================================
// Configuration
// =============================================================================

/// Database configuration.
///
/// ## Example
/// ```rust,ignore
/// let config = DbConfig::new("/path/to/pitstop.db")
///     .max_connections(5)
///     .retry(RetryPolicy { max_attempts: 8, ..Default::default() });
/// ```
#[derive(Debug, Clone)]
pub struct DbConfig {
    /// Path to the SQLite database file, or `:memory:`.
    pub database_path: PathBuf,

    /// Maximum number of connections in the pool.
    /// Default: 5
    pub max_connections: u32,

    /// Minimum number of connections to keep alive.
    /// Default: 1
    pub min_connections: u32,

    /// How long to wait for a pooled connection.
    /// Default: 30 seconds
    pub connect_timeout: Duration,

    /// Idle timeout before closing a connection. `None` keeps them forever.
    /// Default: 10 minutes
    pub idle_timeout: Option<Duration>,

    /// How long SQLite waits on a lock before returning BUSY.
    /// Default: 5 seconds
    pub busy_timeout: Duration,

    /// Whether to run migrations on connect.
    /// Default: true
    pub run_migrations: bool,

    /// Retry policy for write conflicts.
    pub retry: RetryPolicy,

    /// Prefixes for service, order and invoice numbers.
    pub sequences: SequenceSettings,

    /// GST applied when a caller does not pass a rate.
    pub default_tax_rate: TaxRate,

    /// Events buffered per change-feed subscriber.
    pub feed_capacity: usize,
}

impl DbConfig {
    /// Creates a configuration for the database file at `path`.
    ///
    /// The file is created if it doesn't exist.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        DbConfig {
            database_path: path.into(),
            max_connections: 5,
            min_connections: 1,
            connect_timeout: Duration::from_secs(30),
            idle_timeout: Some(Duration::from_secs(600)),
            busy_timeout: Duration::from_secs(5),
            run_migrations: true,
            retry: RetryPolicy::default(),
            sequences: SequenceSettings::default(),
            default_tax_rate: TaxRate::default(),
            feed_capacity: DEFAULT_FEED_CAPACITY,
        }
    }

    /// Sets the maximum number of connections.
    pub fn max_connections(mut self, max: u32) -> Self {
        self.max_connections = max;
        self
    }

    /// Sets the minimum number of connections.
    pub fn min_connections(mut self, min: u32) -> Self {
        self.min_connections = min;
        self
    }

    /// Sets the connection timeout.
    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Sets the SQLite busy timeout.
    pub fn busy_timeout(mut self, timeout: Duration) -> Self {
        self.busy_timeout = timeout;
        self
    }

    /// Sets whether to run migrations on connect.
    pub fn run_migrations(mut self, run: bool) -> Self {
        self.run_migrations = run;
        self
    }

    /// Sets the write-conflict retry policy.
    pub fn retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Sets the sequence prefixes.
    pub fn sequences(mut self, sequences: SequenceSettings) -> Self {
        self.sequences = sequences;
        self
    }

    /// Sets the default GST rate.
    pub fn default_tax_rate(mut self, rate: TaxRate) -> Self {
        self.default_tax_rate = rate;
        self
    }

    /// Creates an in-memory database configuration (for testing).
    ///
    /// Single connection: every connection to `:memory:` is its own database.
    pub fn in_memory() -> Self {
        DbConfig {
            database_path: PathBuf::from(IN_MEMORY_PATH),
            max_connections: 1,
            min_connections: 1,
            connect_timeout: Duration::from_secs(5),
            idle_timeout: None,
            ..Self::new(IN_MEMORY_PATH)
        }
    }

    pub fn is_in_memory(&self) -> bool {
        self.database_path.as_os_str() == IN_MEMORY_PATH
    }

    fn connect_options(&self) -> DbResult<SqliteConnectOptions> {
        let options = if self.is_in_memory() {
            SqliteConnectOptions::from_str("sqlite::memory:")
                .map_err(|e| DbError::ConnectionFailed(e.to_string()))?
        } else {
            SqliteConnectOptions::new()
                .filename(&self.database_path)
                .create_if_missing(true)
                .journal_mode(SqliteJournalMode::Wal)
                .synchronous(SqliteSynchronous::Normal)
        };

        Ok(options
            .foreign_keys(true)
            .busy_timeout(self.busy_timeout))
    }
}

// =============================================================================
// Store Context
// =============================================================================

/// Settings shared by every repository that runs a unit of work.
#[derive(Debug, Clone)]
pub struct StoreContext {
    pub retry: RetryPolicy,
    pub sequences: SequenceSettings,
    pub default_tax_rate: TaxRate,
    pub feed: ChangeFeed,
}

impl StoreContext {
    fn from_config(config: &DbConfig) -> Self {
        StoreContext {
            retry: config.retry,
            sequences: config.sequences.clone(),
            default_tax_rate: config.default_tax_rate,
            feed: ChangeFeed::new(config.feed_capacity),
        }
    }
}

// =============================================================================
// Database
// =============================================================================

/// Main database handle providing repository access.
///
/// Cheap to clone; clones share the pool and the change feed.
#[derive(Debug, Clone)]
pub struct Database {
    pool: SqlitePool,
    ctx: StoreContext,
}

impl Database {
    /// Creates a new database connection pool.
    ///
    /// ## What This Does
    /// 1. Creates the database file if it doesn't exist
    /// 2. Enables WAL, NORMAL synchronous, foreign keys and the busy timeout
    /// 3. Creates the connection pool
    /// 4. Runs migrations (if enabled)
    pub async fn new(config: DbConfig) -> DbResult<Self> {
        info!(
            path = %config.database_path.display(),
            "Initializing database connection"
        );

        let connect_options = config.connect_options()?;
        debug!(busy_timeout = ?config.busy_timeout, "Connection options configured");

        let mut pool_options = SqlitePoolOptions::new()
            .max_connections(config.max_connections)
            .min_connections(config.min_connections)
            .acquire_timeout(config.connect_timeout)
            .idle_timeout(config.idle_timeout);
        if config.is_in_memory() {
            // Recycling the only connection would drop the database
            pool_options = pool_options.max_lifetime(None);
        }

        let pool = pool_options
            .connect_with(connect_options)
            .await
            .map_err(|e| DbError::ConnectionFailed(e.to_string()))?;

        info!(
            max_connections = config.max_connections,
            max_attempts = config.retry.max_attempts,
            "Database pool created"
        );

        let db = Database {
            pool,
            ctx: StoreContext::from_config(&config),
        };

        if config.run_migrations {
            db.run_migrations().await?;
        }

        Ok(db)
    }

    /// Runs database migrations.
    pub async fn run_migrations(&self) -> DbResult<()> {
        info!("Running database migrations");
        migrations::run_migrations(&self.pool).await?;
        info!("Migrations complete");
        Ok(())
    }

    /// Returns a reference to the connection pool.
    ///
    /// Prefer repository methods; stock must only change through
    /// [`InventoryLedger`] or [`OrderRepository`].
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Catalog reads and admin edits.
    pub fn products(&self) -> ProductRepository {
        ProductRepository::new(self.pool.clone())
    }

    /// Stock reads and the Stock-Commit unit of work.
    pub fn inventory(&self) -> InventoryLedger {
        InventoryLedger::new(self.pool.clone(), self.ctx.clone())
    }

    /// Per-user carts.
    pub fn carts(&self) -> CartRepository {
        CartRepository::new(self.pool.clone())
    }

    /// Checkout and order lookups.
    pub fn orders(&self) -> OrderRepository {
        OrderRepository::new(self.pool.clone(), self.ctx.clone())
    }

    /// Service bookings, parts and billing.
    pub fn services(&self) -> ServiceRepository {
        ServiceRepository::new(self.pool.clone(), self.ctx.clone())
    }

    /// Invoice lookups, counter sales and payment status.
    pub fn invoices(&self) -> InvoiceRepository {
        InvoiceRepository::new(self.pool.clone(), self.ctx.clone())
    }

    /// Human-readable number counters.
    pub fn counters(&self) -> CounterRepository {
        CounterRepository::new(self.pool.clone(), self.ctx.sequences.clone())
    }

    /// Subscribes to committed changes.
    pub fn subscribe(&self) -> Subscription {
        self.ctx.feed.subscribe()
    }

    /// The GST rate configured for workshop bills.
    pub fn default_tax_rate(&self) -> TaxRate {
        self.ctx.default_tax_rate
    }

    /// Closes the database connection pool.
    ///
    /// After calling close, all repository operations will fail.
    pub async fn close(&self) {
        info!("Closing database connection pool");
        self.pool.close().await;
    }

    /// Checks if the database can execute queries.
    pub async fn health_check(&self) -> bool {
        sqlx::query("SELECT 1").execute(&self.pool).await.is_ok()
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_in_memory_database() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();

        assert!(db.health_check().await);
        let (total, applied) = migrations::migration_status(db.pool()).await.unwrap();
        assert_eq!(total, applied);
    }

    #[tokio::test]
    async fn test_file_database_uses_wal() {
        let dir = tempfile::tempdir().unwrap();
        let db = Database::new(DbConfig::new(dir.path().join("pitstop.db")))
            .await
            .unwrap();

        let mode: String = sqlx::query_scalar("PRAGMA journal_mode")
            .fetch_one(db.pool())
            .await
            .unwrap();
        assert_eq!(mode.to_lowercase(), "wal");
        db.close().await;
    }

    #[test]
    fn test_config_builder() {
        let config = DbConfig::new("workshop.db")
            .max_connections(8)
            .min_connections(3)
            .default_tax_rate(TaxRate::from_bps(500));

        assert_eq!(config.max_connections, 8);
        assert_eq!(config.min_connections, 3);
        assert_eq!(config.default_tax_rate.bps(), 500);
        assert!(!config.is_in_memory());
        assert!(DbConfig::in_memory().is_in_memory());
    }
}
