//! # Invoice Repository
//!
//! Bills are written once and never edited; only `payment_status` moves.
//! Workshop bills are created by [`ServiceRepository::generate_invoice`];
//! this repository creates counter sales and serves every invoice read.
//!
//! [`ServiceRepository::generate_invoice`]: crate::repository::service::ServiceRepository::generate_invoice
//!
//! ```text
//! invoices (1) ──── (*) invoice_parts      copied from the job, frozen
//!    │
//!    └── service_id ──► service_records     NULL for counter sales,
//!                                           unique when present
//! ```

use chrono::{DateTime, Utc};
use sqlx::{SqliteConnection, SqlitePool};
use tracing::{debug, info};
use uuid::Uuid;

use pitstop_core::sequence::SequenceKind;
use pitstop_core::validation::{validate_contact, validate_tax_rate_bps};
use pitstop_core::{
    BillingFlow, ContactInfo, Invoice, InvoiceKind, InvoiceTotals, Money, Part, PartInput, PaymentStatus,
    TaxRate, Vehicle,
};

use crate::error::{DbError, DbResult};
use crate::events::StoreEvent;
use crate::pool::StoreContext;
use crate::repository::counter::next_number;
use crate::retry::with_retry;

// =============================================================================
// Rows
// =============================================================================

#[derive(Debug, sqlx::FromRow)]
struct InvoiceRow {
    id: String,
    invoice_number: String,
    kind: InvoiceKind,
    service_id: Option<String>,
    contact_name: String,
    contact_phone: String,
    contact_address: Option<String>,
    vehicle_make: Option<String>,
    vehicle_model: Option<String>,
    vehicle_registration: Option<String>,
    parts_total_paise: i64,
    labour_paise: i64,
    tax_rate_bps: i64,
    tax_amount_paise: i64,
    subtotal_paise: i64,
    grand_total_paise: i64,
    payment_status: PaymentStatus,
    created_at: DateTime<Utc>,
}

#[derive(Debug, sqlx::FromRow)]
pub(crate) struct PartRow {
    name: String,
    quantity: i64,
    unit_price_paise: i64,
    line_total_paise: i64,
}

impl From<PartRow> for Part {
    fn from(row: PartRow) -> Self {
        Part {
            name: row.name,
            quantity: row.quantity,
            unit_price: Money::from_paise(row.unit_price_paise),
            line_total: Money::from_paise(row.line_total_paise),
        }
    }
}

impl InvoiceRow {
    fn into_invoice(self, parts: Vec<Part>) -> Invoice {
        let vehicle = match (self.vehicle_make, self.vehicle_model, self.vehicle_registration) {
            (Some(make), Some(model), Some(registration)) => Some(Vehicle {
                make,
                model,
                registration,
            }),
            _ => None,
        };

        Invoice {
            id: self.id,
            invoice_number: self.invoice_number,
            kind: self.kind,
            service_id: self.service_id,
            contact: ContactInfo {
                name: self.contact_name,
                phone: self.contact_phone,
                address: self.contact_address,
            },
            vehicle,
            parts,
            parts_total: Money::from_paise(self.parts_total_paise),
            labour: Money::from_paise(self.labour_paise),
            tax_rate: TaxRate::from_bps(self.tax_rate_bps as u32),
            tax_amount: Money::from_paise(self.tax_amount_paise),
            subtotal: Money::from_paise(self.subtotal_paise),
            grand_total: Money::from_paise(self.grand_total_paise),
            payment_status: self.payment_status,
            created_at: self.created_at,
        }
    }
}

const INVOICE_COLUMNS: &str = r#"
    id, invoice_number, kind, service_id,
    contact_name, contact_phone, contact_address,
    vehicle_make, vehicle_model, vehicle_registration,
    parts_total_paise, labour_paise, tax_rate_bps, tax_amount_paise,
    subtotal_paise, grand_total_paise, payment_status, created_at
"#;

// =============================================================================
// Connection-Level Helpers
// =============================================================================

/// Assembles an unsaved invoice from computed totals.
pub(crate) fn build_invoice(
    invoice_number: String,
    kind: InvoiceKind,
    service_id: Option<String>,
    contact: ContactInfo,
    vehicle: Option<Vehicle>,
    totals: InvoiceTotals,
) -> Invoice {
    Invoice {
        id: Uuid::new_v4().to_string(),
        invoice_number,
        kind,
        service_id,
        contact,
        vehicle,
        parts: totals.lines,
        parts_total: totals.parts_total,
        labour: totals.labour,
        tax_rate: totals.tax_rate,
        tax_amount: totals.tax_amount,
        subtotal: totals.subtotal,
        grand_total: totals.grand_total,
        payment_status: PaymentStatus::Pending,
        created_at: Utc::now(),
    }
}

/// Writes an invoice and its part lines on `conn`.
pub(crate) async fn insert_invoice(conn: &mut SqliteConnection, invoice: &Invoice) -> DbResult<()> {
    let vehicle = invoice.vehicle.as_ref();

    sqlx::query(
        r#"
        INSERT INTO invoices (
            id, invoice_number, kind, service_id,
            contact_name, contact_phone, contact_address,
            vehicle_make, vehicle_model, vehicle_registration,
            parts_total_paise, labour_paise, tax_rate_bps, tax_amount_paise,
            subtotal_paise, grand_total_paise, payment_status, created_at
        ) VALUES (
            ?1, ?2, ?3, ?4,
            ?5, ?6, ?7,
            ?8, ?9, ?10,
            ?11, ?12, ?13, ?14,
            ?15, ?16, ?17, ?18
        )
        "#,
    )
    .bind(&invoice.id)
    .bind(&invoice.invoice_number)
    .bind(invoice.kind)
    .bind(&invoice.service_id)
    .bind(&invoice.contact.name)
    .bind(&invoice.contact.phone)
    .bind(&invoice.contact.address)
    .bind(vehicle.map(|v| v.make.as_str()))
    .bind(vehicle.map(|v| v.model.as_str()))
    .bind(vehicle.map(|v| v.registration.as_str()))
    .bind(invoice.parts_total.paise())
    .bind(invoice.labour.paise())
    .bind(invoice.tax_rate.bps() as i64)
    .bind(invoice.tax_amount.paise())
    .bind(invoice.subtotal.paise())
    .bind(invoice.grand_total.paise())
    .bind(invoice.payment_status)
    .bind(invoice.created_at)
    .execute(&mut *conn)
    .await?;

    for (idx, part) in invoice.parts.iter().enumerate() {
        sqlx::query(
            r#"
            INSERT INTO invoice_parts (invoice_id, line_no, name, quantity, unit_price_paise, line_total_paise)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6)
            "#,
        )
        .bind(&invoice.id)
        .bind(idx as i64 + 1)
        .bind(&part.name)
        .bind(part.quantity)
        .bind(part.unit_price.paise())
        .bind(part.line_total.paise())
        .execute(&mut *conn)
        .await?;
    }

    Ok(())
}

async fn fetch_invoice_parts(conn: &mut SqliteConnection, invoice_id: &str) -> DbResult<Vec<Part>> {
    let rows: Vec<PartRow> = sqlx::query_as(
        r#"
        SELECT name, quantity, unit_price_paise, line_total_paise
        FROM invoice_parts
        WHERE invoice_id = ?1
        ORDER BY line_no
        "#,
    )
    .bind(invoice_id)
    .fetch_all(&mut *conn)
    .await?;

    Ok(rows.into_iter().map(Part::from).collect())
}

/// Loads the invoice whose `column` equals `value`.
///
/// `column` is always one of this module's own literals.
pub(crate) async fn fetch_invoice_by(
    conn: &mut SqliteConnection,
    column: &str,
    value: &str,
) -> DbResult<Option<Invoice>> {
    let sql = format!("SELECT {} FROM invoices WHERE {} = ?1", INVOICE_COLUMNS, column);
    let row: Option<InvoiceRow> = sqlx::query_as(&sql)
        .bind(value)
        .fetch_optional(&mut *conn)
        .await?;

    match row {
        Some(row) => {
            let parts = fetch_invoice_parts(conn, &row.id).await?;
            Ok(Some(row.into_invoice(parts)))
        }
        None => Ok(None),
    }
}

// =============================================================================
// Repository
// =============================================================================

/// Repository for invoice reads, counter sales and payment status.
#[derive(Debug, Clone)]
pub struct InvoiceRepository {
    pool: SqlitePool,
    ctx: StoreContext,
}

impl InvoiceRepository {
    /// Creates a new InvoiceRepository.
    pub fn new(pool: SqlitePool, ctx: StoreContext) -> Self {
        InvoiceRepository { pool, ctx }
    }

    /// Gets an invoice by its ID.
    pub async fn get_by_id(&self, id: &str) -> DbResult<Option<Invoice>> {
        let mut conn = self.pool.acquire().await?;
        fetch_invoice_by(&mut conn, "id", id).await
    }

    /// Gets an invoice by its number, e.g. `BS007`.
    pub async fn get_by_number(&self, invoice_number: &str) -> DbResult<Option<Invoice>> {
        let mut conn = self.pool.acquire().await?;
        fetch_invoice_by(&mut conn, "invoice_number", invoice_number).await
    }

    /// Gets the bill for a service job, if it has been billed.
    pub async fn get_for_service(&self, service_id: &str) -> DbResult<Option<Invoice>> {
        let mut conn = self.pool.acquire().await?;
        fetch_invoice_by(&mut conn, "service_id", service_id).await
    }

    /// Lists the most recent invoices, newest first.
    pub async fn list_recent(&self, limit: u32) -> DbResult<Vec<Invoice>> {
        let sql = format!(
            "SELECT {} FROM invoices ORDER BY created_at DESC, invoice_number DESC LIMIT ?1",
            INVOICE_COLUMNS
        );
        let mut conn = self.pool.acquire().await?;
        let rows: Vec<InvoiceRow> = sqlx::query_as(&sql)
            .bind(limit as i64)
            .fetch_all(&mut *conn)
            .await?;

        let mut invoices = Vec::with_capacity(rows.len());
        for row in rows {
            let parts = fetch_invoice_parts(&mut conn, &row.id).await?;
            invoices.push(row.into_invoice(parts));
        }
        Ok(invoices)
    }

    /// Bills an over-the-counter sale that has no service job.
    ///
    /// `parts` may be empty (labour only). `tax_rate` falls back to the
    /// configured default.
    ///
    /// ## Errors
    /// - `Validation` for a bad contact or a tax rate above 100%
    /// - `Billing(InvalidPart | InvalidAmount)` from the totals
    pub async fn create_counter_invoice(
        &self,
        contact: ContactInfo,
        parts: &[PartInput],
        labour: Money,
        tax_rate: Option<TaxRate>,
    ) -> DbResult<Invoice> {
        validate_contact(&contact)?;
        let tax_rate = tax_rate.unwrap_or(self.ctx.default_tax_rate);
        validate_tax_rate_bps(tax_rate.bps())?;
        let totals = BillingFlow::counter_invoice(parts, labour, tax_rate)?;

        debug!(parts = totals.lines.len(), grand_total = %totals.grand_total, "Creating counter invoice");

        let invoice = with_retry(&self.ctx.retry, "create_counter_invoice", || {
            self.try_create_counter(&contact, &totals)
        })
        .await?;

        info!(
            invoice_number = %invoice.invoice_number,
            grand_total = %invoice.grand_total,
            "Counter invoice created"
        );
        self.ctx.feed.publish(StoreEvent::InvoiceCreated {
            invoice_id: invoice.id.clone(),
            invoice_number: invoice.invoice_number.clone(),
            service_id: None,
            grand_total: invoice.grand_total,
        });

        Ok(invoice)
    }

    async fn try_create_counter(&self, contact: &ContactInfo, totals: &InvoiceTotals) -> DbResult<Invoice> {
        let mut tx = self.pool.begin().await?;

        let number = next_number(&mut tx, &self.ctx.sequences, SequenceKind::Invoice).await?;
        let invoice = build_invoice(number, InvoiceKind::Counter, None, contact.clone(), None, totals.clone());
        insert_invoice(&mut tx, &invoice).await?;

        tx.commit().await?;
        Ok(invoice)
    }

    /// Marks an invoice as paid.
    pub async fn mark_paid(&self, invoice_id: &str) -> DbResult<()> {
        self.set_payment_status(invoice_id, PaymentStatus::Paid).await
    }

    /// Sets the payment status of an invoice. Nothing else on it changes.
    pub async fn set_payment_status(&self, invoice_id: &str, status: PaymentStatus) -> DbResult<()> {
        debug!(invoice_id = %invoice_id, status = ?status, "Setting invoice payment status");

        let result = sqlx::query("UPDATE invoices SET payment_status = ?2 WHERE id = ?1")
            .bind(invoice_id)
            .bind(status)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::not_found("Invoice", invoice_id));
        }

        Ok(())
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::{Database, DbConfig};
    use pitstop_core::{BillingError, ValidationError};

    fn walk_in() -> ContactInfo {
        ContactInfo {
            name: "Walk-in".to_string(),
            phone: "9845012345".to_string(),
            address: None,
        }
    }

    #[tokio::test]
    async fn test_counter_invoice_round_trip() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let invoices = db.invoices();

        let invoice = invoices
            .create_counter_invoice(
                walk_in(),
                &[
                    PartInput::new("Engine oil 1L", 2, Money::from_major(100)),
                    PartInput::new("Oil filter", 1, Money::from_major(50)),
                ],
                Money::from_major(200),
                None,
            )
            .await
            .unwrap();

        assert_eq!(invoice.invoice_number, "BS001");
        assert_eq!(invoice.kind, InvoiceKind::Counter);
        assert_eq!(invoice.grand_total, Money::from_major(531));

        let loaded = invoices.get_by_number("BS001").await.unwrap().unwrap();
        assert_eq!(loaded.id, invoice.id);
        assert_eq!(loaded.parts.len(), 2);
        assert_eq!(loaded.tax_amount, Money::from_major(81));
        assert_eq!(loaded.payment_status, PaymentStatus::Pending);
        assert!(loaded.vehicle.is_none());
        assert_eq!(invoices.list_recent(10).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_counter_invoice_zero_rejected_without_number() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();

        let err = db
            .invoices()
            .create_counter_invoice(walk_in(), &[], Money::zero(), None)
            .await
            .unwrap_err();

        assert!(matches!(err, DbError::Billing(BillingError::InvalidAmount { .. })));
        assert_eq!(db.counters().current(SequenceKind::Invoice).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_counter_invoice_rejects_out_of_range_tax() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let parts = [PartInput::new("Wiper blade", 2, Money::from_major(325))];

        let err = db
            .invoices()
            .create_counter_invoice(walk_in(), &parts, Money::zero(), Some(TaxRate::from_bps(10_001)))
            .await
            .unwrap_err();

        assert!(matches!(err, DbError::Validation(ValidationError::OutOfRange { .. })));
        assert!(db.invoices().list_recent(10).await.unwrap().is_empty());

        let full = db
            .invoices()
            .create_counter_invoice(walk_in(), &parts, Money::zero(), Some(TaxRate::from_bps(10_000)))
            .await
            .unwrap();
        assert_eq!(full.grand_total, Money::from_major(1_300));
    }

    #[tokio::test]
    async fn test_payment_status_is_only_mutable_field() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let invoices = db.invoices();
        let invoice = invoices
            .create_counter_invoice(walk_in(), &[], Money::from_major(300), Some(TaxRate::zero()))
            .await
            .unwrap();

        invoices.mark_paid(&invoice.id).await.unwrap();
        let loaded = invoices.get_by_id(&invoice.id).await.unwrap().unwrap();
        assert_eq!(loaded.payment_status, PaymentStatus::Paid);
        assert_eq!(loaded.grand_total, Money::from_major(300));

        assert!(matches!(
            invoices.mark_paid("missing").await,
            Err(DbError::NotFound { .. })
        ));
    }
}
