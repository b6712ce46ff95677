//! # Store Errors
//!
//! Everything a repository call can fail with, from a rejected stock line
//! to a locked database file.
//!
//! ## Where Errors Come From
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Error Propagation                                    │
//! │                                                                         │
//! │  StockError / BillingError / CoreError (pitstop-core)                  │
//! │  SQLite Error (sqlx::Error)                                            │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  DbError (this module) ← Adds context and categorization               │
//! │       │                                                                 │
//! │       ├── Conflict ──► retried by the unit of work (never returned     │
//! │       │                 to callers; becomes CommitFailed when the      │
//! │       │                 attempts run out)                              │
//! │       ▼                                                                 │
//! │  Caller shows a specific message                                       │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use pitstop_core::{BillingError, CoreError, StockError, ValidationError};
use thiserror::Error;

/// SQLite primary result codes that mean "another writer got there first".
const SQLITE_BUSY: i32 = 5;
const SQLITE_LOCKED: i32 = 6;

/// Database operation errors.
#[derive(Debug, Error)]
pub enum DbError {
    /// A stock commit was rejected. Nothing was written.
    #[error(transparent)]
    Stock(#[from] StockError),

    /// Invoice generation or a status move was rejected. Nothing was written.
    #[error(transparent)]
    Billing(#[from] BillingError),

    /// A cart rule was violated.
    #[error(transparent)]
    Cart(#[from] CoreError),

    /// Input failed validation before any transaction opened.
    #[error(transparent)]
    Validation(#[from] ValidationError),

    /// Entity not found in database.
    ///
    /// ## When This Occurs
    /// - ID doesn't exist
    /// - Order / invoice number doesn't exist
    #[error("{entity} not found: {id}")]
    NotFound { entity: String, id: String },

    /// Unique constraint violation.
    ///
    /// ## When This Occurs
    /// - Inserting a duplicate SKU
    /// - Reusing an idempotency key (handled inside checkout)
    /// - Any UNIQUE index violation
    #[error("Duplicate {field}: '{value}' already exists")]
    UniqueViolation { field: String, value: String },

    /// Foreign key constraint violation.
    #[error("Foreign key violation: {message}")]
    ForeignKeyViolation { message: String },

    /// A concurrent writer changed the rows this unit of work read.
    ///
    /// ## When This Occurs
    /// - A guarded `UPDATE ... WHERE stock = ?` matched zero rows
    /// - SQLite returned BUSY, LOCKED or BUSY_SNAPSHOT
    ///
    /// Retried internally.
    #[error("Write conflict: {0}")]
    Conflict(String),

    /// Write conflicts persisted through every retry.
    #[error("Commit failed after {attempts} attempts due to concurrent updates")]
    CommitFailed { attempts: u32 },

    /// Database connection failed.
    ///
    /// ## When This Occurs
    /// - Database file can't be created
    /// - File permissions issue
    /// - Disk full
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    /// Migration failed.
    #[error("Migration failed: {0}")]
    MigrationFailed(String),

    /// Query execution failed.
    #[error("Query failed: {0}")]
    QueryFailed(String),

    /// A JSON column could not be encoded or decoded.
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Pool exhausted (all connections in use).
    #[error("Connection pool exhausted")]
    PoolExhausted,

    /// Internal database error.
    #[error("Internal database error: {0}")]
    Internal(String),
}

impl DbError {
    /// Creates a NotFound error for a given entity type and ID.
    pub fn not_found(entity: impl Into<String>, id: impl Into<String>) -> Self {
        DbError::NotFound {
            entity: entity.into(),
            id: id.into(),
        }
    }

    /// Creates a UniqueViolation error.
    pub fn duplicate(field: impl Into<String>, value: impl Into<String>) -> Self {
        DbError::UniqueViolation {
            field: field.into(),
            value: value.into(),
        }
    }

    /// Creates a Conflict error.
    pub fn conflict(message: impl Into<String>) -> Self {
        DbError::Conflict(message.into())
    }

    /// True when the unit of work should be retried.
    pub fn is_conflict(&self) -> bool {
        matches!(self, DbError::Conflict(_))
    }

    /// True when the error is a unique violation on `column`.
    pub fn is_unique_violation_on(&self, column: &str) -> bool {
        matches!(self, DbError::UniqueViolation { field, .. } if field.contains(column))
    }
}

/// True for SQLite result codes that signal lock contention.
///
/// Extended codes keep the primary code in the low byte
/// (BUSY_SNAPSHOT = 517 = 5 | 2 << 8).
fn is_contention_code(code: &str) -> bool {
    code.parse::<i32>()
        .map(|c| matches!(c & 0xff, SQLITE_BUSY | SQLITE_LOCKED))
        .unwrap_or(false)
}

/// Convert sqlx errors to DbError.
///
/// ## Error Mapping
/// ```text
/// sqlx::Error::RowNotFound    → DbError::NotFound
/// sqlx::Error::Database       → BUSY/LOCKED → Conflict
///                               UNIQUE / FOREIGN KEY → constraint variants
/// sqlx::Error::PoolTimedOut   → DbError::PoolExhausted
/// Other                       → DbError::Internal
/// ```
impl From<sqlx::Error> for DbError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::RowNotFound => DbError::NotFound {
                entity: "Record".to_string(),
                id: "unknown".to_string(),
            },

            sqlx::Error::Database(db_err) => {
                let msg = db_err.message();
                let contention = db_err.code().map(|c| is_contention_code(&c)).unwrap_or(false)
                    || msg.contains("database is locked")
                    || msg.contains("database table is locked");

                if contention {
                    DbError::Conflict(msg.to_string())
                } else if msg.contains("UNIQUE constraint failed") {
                    // "UNIQUE constraint failed: <table>.<column>"
                    let field = msg
                        .split("UNIQUE constraint failed: ")
                        .nth(1)
                        .unwrap_or("unknown")
                        .to_string();
                    DbError::UniqueViolation {
                        field,
                        value: "unknown".to_string(),
                    }
                } else if msg.contains("FOREIGN KEY constraint failed") {
                    DbError::ForeignKeyViolation {
                        message: msg.to_string(),
                    }
                } else {
                    DbError::QueryFailed(msg.to_string())
                }
            }

            sqlx::Error::PoolTimedOut => DbError::PoolExhausted,

            sqlx::Error::PoolClosed => DbError::ConnectionFailed("Pool is closed".to_string()),

            _ => DbError::Internal(err.to_string()),
        }
    }
}

impl From<sqlx::migrate::MigrateError> for DbError {
    fn from(err: sqlx::migrate::MigrateError) -> Self {
        DbError::MigrationFailed(err.to_string())
    }
}

impl From<serde_json::Error> for DbError {
    fn from(err: serde_json::Error) -> Self {
        DbError::Serialization(err.to_string())
    }
}

/// Result type for database operations.
pub type DbResult<T> = Result<T, DbError>;

// =============================================================================
// Config Error
// =============================================================================

/// Errors while loading `pitstop.toml`.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The file exists but could not be read.
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    /// The file is not valid TOML for [`crate::PitstopConfig`].
    #[error("Failed to parse config file: {0}")]
    Parse(#[from] toml::de::Error),

    /// The config could not be written back.
    #[error("Failed to write config file: {0}")]
    Serialize(#[from] toml::ser::Error),

    /// A value is out of range.
    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Result type for config operations.
pub type ConfigResult<T> = Result<T, ConfigError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_contention_codes() {
        assert!(is_contention_code("5"));
        assert!(is_contention_code("6"));
        assert!(is_contention_code("517")); // BUSY_SNAPSHOT
        assert!(is_contention_code("262")); // LOCKED_SHAREDCACHE
        assert!(!is_contention_code("19")); // CONSTRAINT
        assert!(!is_contention_code("2067")); // CONSTRAINT_UNIQUE
        assert!(!is_contention_code("abc"));
    }

    #[test]
    fn test_stock_error_passes_through() {
        let err: DbError = StockError::ProductNotFound {
            product_id: "p1".to_string(),
        }
        .into();
        assert_eq!(err.to_string(), "Product not found: p1");
        assert!(!err.is_conflict());
    }

    #[test]
    fn test_unique_violation_on() {
        let err = DbError::duplicate("orders.idempotency_key", "unknown");
        assert!(err.is_unique_violation_on("idempotency_key"));
        assert!(!err.is_unique_violation_on("order_number"));
    }

    #[test]
    fn test_commit_failed_message() {
        let err = DbError::CommitFailed { attempts: 5 };
        assert_eq!(
            err.to_string(),
            "Commit failed after 5 attempts due to concurrent updates"
        );
    }
}
