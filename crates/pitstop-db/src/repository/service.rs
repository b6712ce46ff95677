//! # Service Repository
//!
//! Workshop jobs: booking, status moves, parts, and billing.
//!
//! ## Job Lifecycle
//! ```text
//! book() ──► Booked ──transition()──► ... ──► ServiceGoingOn
//!                                                  │
//!                                   add_parts() ───┤──► BillPending
//!                                                  │        │
//!                                   generate_invoice() ◄────┘
//!                                                  │
//!                                  ┌───────────────┴──────────────────┐
//!                                  │ one transaction:                  │
//!                                  │   INSERT invoice (BSnnn)          │
//!                                  │   UPDATE status = bill_completed  │
//!                                  │     WHERE status = <read status>  │
//!                                  └───────────────────────────────────┘
//!                                                  │
//!                                  transition() ──► ServiceCompleted
//! ```
//!
//! Every status write is guarded on the status that was read, so two
//! concurrent moves on one job cannot both land.

use chrono::{DateTime, Utc};
use sqlx::{SqliteConnection, SqlitePool};
use tracing::{debug, info};
use uuid::Uuid;

use pitstop_core::sequence::SequenceKind;
use pitstop_core::validation::{validate_contact, validate_tax_rate_bps, validate_vehicle};
use pitstop_core::{
    BillingError, BillingFlow, ContactInfo, Invoice, InvoiceKind, Money, Part, PartInput, ServiceRecord,
    ServiceStatus, TaxRate, ValidationError, Vehicle,
};

use crate::error::{DbError, DbResult};
use crate::events::StoreEvent;
use crate::pool::StoreContext;
use crate::repository::counter::next_number;
use crate::repository::invoice::{build_invoice, insert_invoice, PartRow};
use crate::retry::with_retry;

// =============================================================================
// Input & Rows
// =============================================================================

/// A new booking.
#[derive(Debug, Clone)]
pub struct NewService {
    pub user_id: String,
    pub contact: ContactInfo,
    pub vehicle: Vehicle,
    pub service_type: String,
    pub notes: Option<String>,
}

#[derive(Debug, sqlx::FromRow)]
struct ServiceRow {
    id: String,
    service_number: String,
    user_id: String,
    contact_name: String,
    contact_phone: String,
    contact_address: Option<String>,
    vehicle_make: String,
    vehicle_model: String,
    vehicle_registration: String,
    service_type: String,
    notes: Option<String>,
    status: ServiceStatus,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl ServiceRow {
    fn into_record(self, parts: Vec<Part>) -> ServiceRecord {
        ServiceRecord {
            id: self.id,
            service_number: self.service_number,
            user_id: self.user_id,
            contact: ContactInfo {
                name: self.contact_name,
                phone: self.contact_phone,
                address: self.contact_address,
            },
            vehicle: Vehicle {
                make: self.vehicle_make,
                model: self.vehicle_model,
                registration: self.vehicle_registration,
            },
            service_type: self.service_type,
            notes: self.notes,
            status: self.status,
            parts,
            created_at: self.created_at,
            updated_at: self.updated_at,
        }
    }
}

const SERVICE_COLUMNS: &str = r#"
    id, service_number, user_id,
    contact_name, contact_phone, contact_address,
    vehicle_make, vehicle_model, vehicle_registration,
    service_type, notes, status, created_at, updated_at
"#;

// =============================================================================
// Connection-Level Helpers
// =============================================================================

async fn fetch_parts(conn: &mut SqliteConnection, service_id: &str) -> DbResult<Vec<Part>> {
    let rows: Vec<PartRow> = sqlx::query_as(
        r#"
        SELECT name, quantity, unit_price_paise, line_total_paise
        FROM service_parts
        WHERE service_id = ?1
        ORDER BY line_no
        "#,
    )
    .bind(service_id)
    .fetch_all(&mut *conn)
    .await?;

    Ok(rows.into_iter().map(Part::from).collect())
}

async fn fetch_service(conn: &mut SqliteConnection, id: &str) -> DbResult<Option<ServiceRecord>> {
    let sql = format!("SELECT {} FROM service_records WHERE id = ?1", SERVICE_COLUMNS);
    let row: Option<ServiceRow> = sqlx::query_as(&sql)
        .bind(id)
        .fetch_optional(&mut *conn)
        .await?;

    match row {
        Some(row) => {
            let parts = fetch_parts(conn, &row.id).await?;
            Ok(Some(row.into_record(parts)))
        }
        None => Ok(None),
    }
}

async fn require_service(conn: &mut SqliteConnection, id: &str) -> DbResult<ServiceRecord> {
    fetch_service(conn, id).await?.ok_or_else(|| {
        BillingError::ServiceNotFound {
            service_id: id.to_string(),
        }
        .into()
    })
}

/// `UPDATE status WHERE status = from`. Zero rows means someone moved first.
async fn guarded_status_update(
    conn: &mut SqliteConnection,
    id: &str,
    from: ServiceStatus,
    to: ServiceStatus,
) -> DbResult<()> {
    let result = sqlx::query(
        r#"
        UPDATE service_records
        SET status = ?3, updated_at = ?4
        WHERE id = ?1 AND status = ?2
        "#,
    )
    .bind(id)
    .bind(from)
    .bind(to)
    .bind(Utc::now())
    .execute(&mut *conn)
    .await?;

    if result.rows_affected() == 0 {
        return Err(DbError::conflict(format!("service {} is no longer {}", id, from)));
    }

    Ok(())
}

// =============================================================================
// Repository
// =============================================================================

/// Repository for service jobs.
///
/// ## Usage
/// ```rust,ignore
/// let services = db.services();
/// let job = services.book(new_service).await?;
/// services.transition(&job.id, ServiceStatus::ServiceGoingOn).await?;
/// services.add_parts(&job.id, &[PartInput::new("Oil filter", 1, Money::from_major(350))]).await?;
/// let bill = services.generate_invoice(&job.id, &[], Money::from_major(800), None).await?;
/// ```
#[derive(Debug, Clone)]
pub struct ServiceRepository {
    pool: SqlitePool,
    ctx: StoreContext,
}

impl ServiceRepository {
    /// Creates a new ServiceRepository.
    pub fn new(pool: SqlitePool, ctx: StoreContext) -> Self {
        ServiceRepository { pool, ctx }
    }

    /// Books a job. It starts in `Booked` with the next `SE` number.
    pub async fn book(&self, booking: NewService) -> DbResult<ServiceRecord> {
        validate_contact(&booking.contact)?;
        validate_vehicle(&booking.vehicle)?;
        if booking.service_type.trim().is_empty() {
            return Err(ValidationError::Required {
                field: "service_type".to_string(),
            }
            .into());
        }

        let record = with_retry(&self.ctx.retry, "book_service", || self.try_book(&booking)).await?;

        info!(
            service_number = %record.service_number,
            vehicle = %record.vehicle,
            "Service booked"
        );
        Ok(record)
    }

    async fn try_book(&self, booking: &NewService) -> DbResult<ServiceRecord> {
        let mut tx = self.pool.begin().await?;

        let now = Utc::now();
        let record = ServiceRecord {
            id: Uuid::new_v4().to_string(),
            service_number: next_number(&mut tx, &self.ctx.sequences, SequenceKind::Service).await?,
            user_id: booking.user_id.clone(),
            contact: booking.contact.clone(),
            vehicle: booking.vehicle.clone(),
            service_type: booking.service_type.trim().to_string(),
            notes: booking.notes.clone(),
            status: ServiceStatus::Booked,
            parts: Vec::new(),
            created_at: now,
            updated_at: now,
        };

        sqlx::query(
            r#"
            INSERT INTO service_records (
                id, service_number, user_id,
                contact_name, contact_phone, contact_address,
                vehicle_make, vehicle_model, vehicle_registration,
                service_type, notes, status, created_at, updated_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14)
            "#,
        )
        .bind(&record.id)
        .bind(&record.service_number)
        .bind(&record.user_id)
        .bind(&record.contact.name)
        .bind(&record.contact.phone)
        .bind(&record.contact.address)
        .bind(&record.vehicle.make)
        .bind(&record.vehicle.model)
        .bind(&record.vehicle.registration)
        .bind(&record.service_type)
        .bind(&record.notes)
        .bind(record.status)
        .bind(record.created_at)
        .bind(record.updated_at)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(record)
    }

    /// Gets a job with its parts.
    pub async fn get_by_id(&self, id: &str) -> DbResult<Option<ServiceRecord>> {
        let mut conn = self.pool.acquire().await?;
        fetch_service(&mut conn, id).await
    }

    /// Lists a customer's jobs, newest first.
    pub async fn list_for_user(&self, user_id: &str) -> DbResult<Vec<ServiceRecord>> {
        let sql = format!(
            "SELECT {} FROM service_records WHERE user_id = ?1 ORDER BY created_at DESC, service_number DESC",
            SERVICE_COLUMNS
        );
        self.list(&sql, user_id).await
    }

    /// Lists jobs in `status`, oldest first (the workshop queue).
    pub async fn list_by_status(&self, status: ServiceStatus) -> DbResult<Vec<ServiceRecord>> {
        let sql = format!(
            "SELECT {} FROM service_records WHERE status = ?1 ORDER BY created_at, service_number",
            SERVICE_COLUMNS
        );
        self.list(&sql, status.as_str()).await
    }

    async fn list(&self, sql: &str, param: &str) -> DbResult<Vec<ServiceRecord>> {
        let mut conn = self.pool.acquire().await?;
        let rows: Vec<ServiceRow> = sqlx::query_as(sql)
            .bind(param)
            .fetch_all(&mut *conn)
            .await?;

        let mut records = Vec::with_capacity(rows.len());
        for row in rows {
            let parts = fetch_parts(&mut conn, &row.id).await?;
            records.push(row.into_record(parts));
        }
        Ok(records)
    }

    /// Moves a job to `to`.
    ///
    /// Forward only, or to `Cancelled` from any non-terminal status. Before
    /// billing a job may skip ahead as far as `BillPending`; `BillCompleted`
    /// is reached only through [`generate_invoice`](Self::generate_invoice),
    /// and after it the only move is to `ServiceCompleted`.
    ///
    /// ## Errors
    /// `Billing(ServiceNotFound)`, `Billing(InvalidStatusTransition)`.
    pub async fn transition(&self, id: &str, to: ServiceStatus) -> DbResult<ServiceRecord> {
        debug!(service_id = %id, to = %to, "Moving service status");

        let (from, record) = with_retry(&self.ctx.retry, "service_transition", || self.try_transition(id, to)).await?;

        info!(service_number = %record.service_number, from = %from, to = %to, "Service status changed");
        self.ctx.feed.publish(StoreEvent::ServiceStatusChanged {
            service_id: id.to_string(),
            from,
            to,
        });
        Ok(record)
    }

    async fn try_transition(&self, id: &str, to: ServiceStatus) -> DbResult<(ServiceStatus, ServiceRecord)> {
        let mut tx = self.pool.begin().await?;

        let mut record = require_service(&mut tx, id).await?;
        let from = record.status;
        BillingFlow::transition(id, from, to)?;
        guarded_status_update(&mut tx, id, from, to).await?;

        tx.commit().await?;
        record.status = to;
        record.updated_at = Utc::now();
        Ok((from, record))
    }

    /// Appends parts to a job in `ServiceGoingOn` or `BillPending`.
    ///
    /// A job in `ServiceGoingOn` moves to `BillPending` in the same
    /// transaction.
    pub async fn add_parts(&self, id: &str, parts: &[PartInput]) -> DbResult<ServiceRecord> {
        if parts.is_empty() {
            return Err(BillingError::InvalidPart {
                reason: "at least one part is required".to_string(),
            }
            .into());
        }
        let parts = parts
            .iter()
            .map(PartInput::to_part)
            .collect::<Result<Vec<_>, _>>()?;

        let (from, record) = with_retry(&self.ctx.retry, "add_parts", || self.try_add_parts(id, &parts)).await?;

        info!(
            service_number = %record.service_number,
            added = parts.len(),
            status = %record.status,
            "Parts added"
        );
        if from != record.status {
            self.ctx.feed.publish(StoreEvent::ServiceStatusChanged {
                service_id: id.to_string(),
                from,
                to: record.status,
            });
        }
        Ok(record)
    }

    async fn try_add_parts(&self, id: &str, parts: &[Part]) -> DbResult<(ServiceStatus, ServiceRecord)> {
        let mut tx = self.pool.begin().await?;

        let record = require_service(&mut tx, id).await?;
        let from = record.status;
        let to = BillingFlow::after_adding_parts(id, from)?;

        let first_line = record.parts.len() as i64 + 1;
        for (offset, part) in parts.iter().enumerate() {
            sqlx::query(
                r#"
                INSERT INTO service_parts (service_id, line_no, name, quantity, unit_price_paise, line_total_paise)
                VALUES (?1, ?2, ?3, ?4, ?5, ?6)
                "#,
            )
            .bind(id)
            .bind(first_line + offset as i64)
            .bind(&part.name)
            .bind(part.quantity)
            .bind(part.unit_price.paise())
            .bind(part.line_total.paise())
            .execute(&mut *tx)
            .await?;
        }

        guarded_status_update(&mut tx, id, from, to).await?;
        let record = require_service(&mut tx, id).await?;

        tx.commit().await?;
        Ok((from, record))
    }

    /// Bills a job and moves it to `BillCompleted`, atomically.
    ///
    /// Uses `parts` when given, otherwise the parts already on the job.
    /// `tax_rate` falls back to the configured default.
    ///
    /// ## Errors
    /// In order:
    /// - `Validation` for a tax rate above 100%
    /// - `Billing(ServiceNotFound)`
    /// - `Billing(InvalidStatusTransition)` unless `ServiceGoingOn` or `BillPending`
    /// - `Billing(InvalidPart)` / `Billing(InvalidAmount)`
    /// - `Billing(NoPartsFound)`
    ///
    /// On any error no invoice exists and the status is unchanged.
    pub async fn generate_invoice(
        &self,
        service_id: &str,
        parts: &[PartInput],
        labour: Money,
        tax_rate: Option<TaxRate>,
    ) -> DbResult<Invoice> {
        let tax_rate = tax_rate.unwrap_or(self.ctx.default_tax_rate);
        validate_tax_rate_bps(tax_rate.bps())?;
        debug!(service_id = %service_id, supplied_parts = parts.len(), labour = %labour, "Generating invoice");

        let (from, invoice) = with_retry(&self.ctx.retry, "generate_invoice", || {
            self.try_generate_invoice(service_id, parts, labour, tax_rate)
        })
        .await?;

        info!(
            invoice_number = %invoice.invoice_number,
            service_id = %service_id,
            grand_total = %invoice.grand_total,
            "Invoice generated"
        );
        self.ctx.feed.publish(StoreEvent::InvoiceCreated {
            invoice_id: invoice.id.clone(),
            invoice_number: invoice.invoice_number.clone(),
            service_id: Some(service_id.to_string()),
            grand_total: invoice.grand_total,
        });
        self.ctx.feed.publish(StoreEvent::ServiceStatusChanged {
            service_id: service_id.to_string(),
            from,
            to: ServiceStatus::BillCompleted,
        });

        Ok(invoice)
    }

    async fn try_generate_invoice(
        &self,
        service_id: &str,
        parts: &[PartInput],
        labour: Money,
        tax_rate: TaxRate,
    ) -> DbResult<(ServiceStatus, Invoice)> {
        let mut tx = self.pool.begin().await?;

        let record = require_service(&mut tx, service_id).await?;
        let totals = BillingFlow::service_invoice(service_id, record.status, parts, &record.parts, labour, tax_rate)?;

        let number = next_number(&mut tx, &self.ctx.sequences, SequenceKind::Invoice).await?;
        let invoice = build_invoice(
            number,
            InvoiceKind::Service,
            Some(record.id.clone()),
            record.contact,
            Some(record.vehicle),
            totals,
        );
        insert_invoice(&mut tx, &invoice).await?;
        guarded_status_update(&mut tx, service_id, record.status, ServiceStatus::BillCompleted).await?;

        tx.commit().await?;
        Ok((record.status, invoice))
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
