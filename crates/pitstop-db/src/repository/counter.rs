//! # Counter Repository
//!
//! Sequential human-readable numbers: `SE001` for bookings, `OD001` for
//! orders, `BS001` for bills.
//!
//! ```text
//! INSERT INTO counters (prefix, value) VALUES ('BS', 1)
//!   ON CONFLICT (prefix) DO UPDATE SET value = value + 1
//!   RETURNING value                       ──► 7 ──► "BS007"
//! ```
//!
//! The upsert runs on whatever connection it is given. Units of work draw
//! their number inside their own transaction, so a rolled-back commit never
//! burns a number.

use serde::{Deserialize, Serialize};
use sqlx::{SqliteConnection, SqlitePool};
use tracing::debug;

use pitstop_core::sequence::{format_sequence, SequenceKind, DEFAULT_SEQUENCE_WIDTH};

use crate::error::DbResult;

/// Prefixes and padding for each counter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SequenceSettings {
    pub service_prefix: String,
    pub order_prefix: String,
    pub invoice_prefix: String,
    pub width: usize,
}

impl Default for SequenceSettings {
    fn default() -> Self {
        SequenceSettings {
            service_prefix: SequenceKind::Service.default_prefix().to_string(),
            order_prefix: SequenceKind::Order.default_prefix().to_string(),
            invoice_prefix: SequenceKind::Invoice.default_prefix().to_string(),
            width: DEFAULT_SEQUENCE_WIDTH,
        }
    }
}

impl SequenceSettings {
    /// The configured prefix for `kind`.
    pub fn prefix(&self, kind: SequenceKind) -> &str {
        match kind {
            SequenceKind::Service => &self.service_prefix,
            SequenceKind::Order => &self.order_prefix,
            SequenceKind::Invoice => &self.invoice_prefix,
        }
    }
}

/// Increments the counter for `prefix` and returns the new value.
pub(crate) async fn next_value(conn: &mut SqliteConnection, prefix: &str) -> DbResult<i64> {
    let value: i64 = sqlx::query_scalar(
        r#"
        INSERT INTO counters (prefix, value) VALUES (?1, 1)
        ON CONFLICT (prefix) DO UPDATE SET value = value + 1
        RETURNING value
        "#,
    )
    .bind(prefix)
    .fetch_one(&mut *conn)
    .await?;

    Ok(value)
}

/// Draws the next formatted number for `kind`.
pub(crate) async fn next_number(
    conn: &mut SqliteConnection,
    settings: &SequenceSettings,
    kind: SequenceKind,
) -> DbResult<String> {
    let prefix = settings.prefix(kind);
    let value = next_value(conn, prefix).await?;
    let number = format_sequence(prefix, value, settings.width);

    debug!(number = %number, "Drew sequence number");
    Ok(number)
}

/// Repository for sequence counters.
#[derive(Debug, Clone)]
pub struct CounterRepository {
    pool: SqlitePool,
    settings: SequenceSettings,
}

impl CounterRepository {
    /// Creates a new CounterRepository.
    pub fn new(pool: SqlitePool, settings: SequenceSettings) -> Self {
        CounterRepository { pool, settings }
    }

    /// Draws the next number for `kind`, e.g. `BS008`.
    pub async fn next(&self, kind: SequenceKind) -> DbResult<String> {
        let mut conn = self.pool.acquire().await?;
        next_number(&mut conn, &self.settings, kind).await
    }

    /// Draws the next number for an arbitrary prefix.
    pub async fn next_with_prefix(&self, prefix: &str) -> DbResult<String> {
        let mut conn = self.pool.acquire().await?;
        let value = next_value(&mut conn, prefix).await?;
        Ok(format_sequence(prefix, value, self.settings.width))
    }

    /// The last value drawn for `kind` (0 if none yet).
    pub async fn current(&self, kind: SequenceKind) -> DbResult<i64> {
        let value: Option<i64> = sqlx::query_scalar("SELECT value FROM counters WHERE prefix = ?1")
            .bind(self.settings.prefix(kind))
            .fetch_optional(&self.pool)
            .await?;

        Ok(value.unwrap_or(0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::{Database, DbConfig};

    #[tokio::test]
    async fn test_counters_increment_per_prefix() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let counters = db.counters();

        assert_eq!(counters.next(SequenceKind::Invoice).await.unwrap(), "BS001");
        assert_eq!(counters.next(SequenceKind::Invoice).await.unwrap(), "BS002");
        assert_eq!(counters.next(SequenceKind::Service).await.unwrap(), "SE001");
        assert_eq!(counters.current(SequenceKind::Invoice).await.unwrap(), 2);
        assert_eq!(counters.current(SequenceKind::Order).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_counter_rolled_back_with_transaction() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();

        let mut tx = db.pool().begin().await.unwrap();
        let number = next_number(&mut tx, &SequenceSettings::default(), SequenceKind::Order)
            .await
            .unwrap();
        assert_eq!(number, "OD001");
        tx.rollback().await.unwrap();

        assert_eq!(db.counters().next(SequenceKind::Order).await.unwrap(), "OD001");
    }

    #[tokio::test]
    async fn test_custom_prefix() {
        let settings = SequenceSettings {
            invoice_prefix: "INV".to_string(),
            width: 5,
            ..Default::default()
        };
        let db = Database::new(DbConfig::in_memory().sequences(settings)).await.unwrap();

        assert_eq!(db.counters().next(SequenceKind::Invoice).await.unwrap(), "INV00001");
        assert_eq!(db.counters().next_with_prefix("JOB").await.unwrap(), "JOB00001");
    }
}
