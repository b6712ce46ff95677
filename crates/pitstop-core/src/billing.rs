//! # Billing Aggregator
//!
//! Turns parts and labour into an invoice, and decides which service
//! statuses may be billed.
//!
//! ## Invoice Math
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  parts     [2 × ₹100, 1 × ₹50]                                          │
//! │     │                                                                   │
//! │     ▼  line_total = qty × unit_price                                    │
//! │  parts_total ............................ ₹250.00                       │
//! │  + labour ............................... ₹200.00                       │
//! │  = subtotal ............................. ₹450.00                       │
//! │  + GST 18% (half up, once) .............. ₹81.00                        │
//! │  = grand_total .......................... ₹531.00   must be > 0         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Billing Gate
//! ```text
//! ServiceGoingOn ──add_parts──► BillPending ──generate_invoice──► BillCompleted
//!        │                                          ▲
//!        └──────────────generate_invoice────────────┘
//! Any other status ──► InvalidStatusTransition
//! ```
//!
//! Same inputs always give the same totals; nothing here reads a clock.

use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::error::{BillingError, BillingResult};
use crate::money::Money;
use crate::types::{Part, ServiceStatus, TaxRate};

// =============================================================================
// Part Input
// =============================================================================

/// A part line as entered by the mechanic, before totals.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct PartInput {
    pub name: String,
    pub quantity: i64,
    pub unit_price: Money,
}

impl PartInput {
    pub fn new(name: impl Into<String>, quantity: i64, unit_price: Money) -> Self {
        PartInput {
            name: name.into(),
            quantity,
            unit_price,
        }
    }

    /// Checks the line and computes its total.
    ///
    /// ## Errors
    /// `InvalidPart` for a blank name, a quantity of zero or less, a
    /// negative price, or a line total that overflows.
    pub fn to_part(&self) -> BillingResult<Part> {
        if self.name.trim().is_empty() {
            return Err(BillingError::InvalidPart {
                reason: "part name is required".to_string(),
            });
        }
        if self.quantity <= 0 {
            return Err(BillingError::InvalidPart {
                reason: format!("{}: quantity must be positive", self.name),
            });
        }
        if self.unit_price.is_negative() {
            return Err(BillingError::InvalidPart {
                reason: format!("{}: price cannot be negative", self.name),
            });
        }

        let line_total = self
            .unit_price
            .checked_multiply_quantity(self.quantity)
            .ok_or_else(|| BillingError::InvalidPart {
                reason: format!("{}: line total overflows", self.name),
            })?;

        Ok(Part {
            name: self.name.trim().to_string(),
            quantity: self.quantity,
            unit_price: self.unit_price,
            line_total,
        })
    }
}

impl From<&Part> for PartInput {
    fn from(part: &Part) -> Self {
        PartInput::new(part.name.clone(), part.quantity, part.unit_price)
    }
}

// =============================================================================
// Invoice Totals
// =============================================================================

/// Computed invoice figures.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct InvoiceTotals {
    pub lines: Vec<Part>,
    pub parts_total: Money,
    pub labour: Money,
    pub tax_rate: TaxRate,
    pub tax_amount: Money,
    pub subtotal: Money,
    pub grand_total: Money,
}

impl InvoiceTotals {
    /// Computes totals for `parts` plus `labour` at `tax_rate`.
    ///
    /// Tax is computed on the subtotal and rounded half up exactly once.
    ///
    /// ## Errors
    /// - `InvalidPart` for a malformed line or negative labour
    /// - `InvalidAmount` when the grand total is zero or negative
    pub fn compute(parts: &[PartInput], labour: Money, tax_rate: TaxRate) -> BillingResult<Self> {
        if labour.is_negative() {
            return Err(BillingError::InvalidPart {
                reason: "labour cannot be negative".to_string(),
            });
        }

        let lines = parts
            .iter()
            .map(PartInput::to_part)
            .collect::<BillingResult<Vec<_>>>()?;

        let overflow = || BillingError::InvalidPart {
            reason: "invoice total overflows".to_string(),
        };

        let parts_total = lines
            .iter()
            .try_fold(Money::zero(), |acc, p| acc.checked_add(p.line_total))
            .ok_or_else(overflow)?;
        let subtotal = parts_total.checked_add(labour).ok_or_else(overflow)?;
        let tax_amount = subtotal.checked_calculate_tax(tax_rate).ok_or_else(overflow)?;
        let grand_total = subtotal.checked_add(tax_amount).ok_or_else(overflow)?;

        if !grand_total.is_positive() {
            return Err(BillingError::InvalidAmount {
                grand_total_paise: grand_total.paise(),
            });
        }

        Ok(InvoiceTotals {
            lines,
            parts_total,
            labour,
            tax_rate,
            tax_amount,
            subtotal,
            grand_total,
        })
    }
}

// =============================================================================
// Billing Flow
// =============================================================================

/// Status rules for service billing.
pub struct BillingFlow;

impl BillingFlow {
    /// Statuses from which a service can be billed or receive parts.
    pub const BILLABLE: [ServiceStatus; 2] =
        [ServiceStatus::ServiceGoingOn, ServiceStatus::BillPending];

    /// Checks that a service in `status` can be billed.
    pub fn ensure_billable(service_id: &str, status: ServiceStatus) -> BillingResult<()> {
        if Self::BILLABLE.contains(&status) {
            Ok(())
        } else {
            Err(BillingError::InvalidStatusTransition {
                service_id: service_id.to_string(),
                from: status,
                to: ServiceStatus::BillCompleted,
            })
        }
    }

    /// Decides the totals for a service invoice.
    ///
    /// ## Steps
    /// 1. Status must be `ServiceGoingOn` or `BillPending`
    /// 2. Use `supplied` parts, or `attached` ones when none are supplied
    /// 3. Compute totals (`InvalidAmount` is reported before an empty list)
    /// 4. No parts at all → `NoPartsFound`
    pub fn service_invoice(
        service_id: &str,
        status: ServiceStatus,
        supplied: &[PartInput],
        attached: &[Part],
        labour: Money,
        tax_rate: TaxRate,
    ) -> BillingResult<InvoiceTotals> {
        Self::ensure_billable(service_id, status)?;

        let parts: Vec<PartInput> = if supplied.is_empty() {
            attached.iter().map(PartInput::from).collect()
        } else {
            supplied.to_vec()
        };

        let totals = InvoiceTotals::compute(&parts, labour, tax_rate)?;

        if totals.lines.is_empty() {
            return Err(BillingError::NoPartsFound {
                service_id: service_id.to_string(),
            });
        }

        Ok(totals)
    }

    /// Decides the totals for a counter sale. Parts may be empty.
    pub fn counter_invoice(parts: &[PartInput], labour: Money, tax_rate: TaxRate) -> BillingResult<InvoiceTotals> {
        InvoiceTotals::compute(parts, labour, tax_rate)
    }

    /// Checks that parts can be attached and returns the status afterwards.
    ///
    /// `ServiceGoingOn` moves to `BillPending`; `BillPending` stays.
    pub fn after_adding_parts(service_id: &str, status: ServiceStatus) -> BillingResult<ServiceStatus> {
        match status {
            ServiceStatus::ServiceGoingOn | ServiceStatus::BillPending => Ok(ServiceStatus::BillPending),
            from => Err(BillingError::InvalidStatusTransition {
                service_id: service_id.to_string(),
                from,
                to: ServiceStatus::BillPending,
            }),
        }
    }

    /// Checks a manual status move. `BillCompleted` is never a manual
    /// target; see [`ServiceStatus::can_move_manually`].
    pub fn transition(service_id: &str, from: ServiceStatus, to: ServiceStatus) -> BillingResult<()> {
        if from.can_move_manually(to) {
            Ok(())
        } else {
            Err(BillingError::InvalidStatusTransition {
                service_id: service_id.to_string(),
                from,
                to,
            })
        }
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
