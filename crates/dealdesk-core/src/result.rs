//! # Tax Calculation Result
//!
//! The itemized breakdown returned to the caller and snapshotted into
//! the audit log.
//!
//! ## Reconciliation Invariant
//! `total_tax` is the exact sum of the already-rounded lines. The
//! validator re-checks this within a 1-cent tolerance as a guard
//! against future calculator changes, but by construction the two
//! should match to the penny.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::jurisdiction::RateSource;
use crate::money::TaxRate;
use crate::request::{TaxCalculationRequest, TransactionKind};

// =============================================================================
// Breakdown Lines
// =============================================================================

/// What a breakdown line taxes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaxLineKind {
    /// State-level tax on the vehicle base.
    State,
    /// One local jurisdiction's tax on the vehicle base.
    Local,
    /// Tax on a taxable fee.
    Fee,
    /// Tax on a taxable accessory.
    Accessory,
    /// One-time tax on lease cap-cost reductions.
    CapReduction,
    /// Aggregated tax on the scheduled lease payment stream.
    LeasePayments,
    /// Reciprocity credit for tax paid elsewhere (negative amount).
    Credit,
}

/// One line of the itemized breakdown.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaxLine {
    pub kind: TaxLineKind,
    pub description: String,
    /// Jurisdiction name for state/local lines.
    pub jurisdiction: Option<String>,
    pub rate: TaxRate,
    /// The base this line taxed (unrounded; informational).
    pub taxable_amount: Decimal,
    /// Finalized tax, rounded to the penny. Negative only for credits.
    pub tax: Decimal,
}

impl TaxLine {
    /// Whether this line is an explicitly-flagged credit.
    #[inline]
    pub fn is_credit(&self) -> bool {
        matches!(self.kind, TaxLineKind::Credit)
    }
}

// =============================================================================
// Result
// =============================================================================

/// The complete, immutable outcome of one calculation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaxCalculationResult {
    pub kind: TransactionKind,
    pub lines: Vec<TaxLine>,
    /// Exact sum of the finalized lines.
    pub total_tax: Decimal,
    /// State-layer taxable base (metadata; local bases may differ).
    pub taxable_base: Decimal,
    /// total_tax / taxable_base, 6 decimal places. Display metadata
    /// only - never an input to further arithmetic.
    pub effective_rate: Decimal,
    /// Per-payment tax for monthly/hybrid leases.
    pub monthly_payment_tax: Option<Decimal>,

    // --- provenance, for the audit trail ---------------------------------
    pub rate_source: RateSource,
    pub used_fallback_rule: bool,
    /// State rule version the calculation used.
    pub rule_version: Uuid,
    /// Every jurisdiction row version that contributed a rate.
    pub jurisdiction_versions: Vec<Uuid>,
}

impl TaxCalculationResult {
    /// Exact sum of the breakdown lines.
    pub fn line_sum(&self) -> Decimal {
        self.lines.iter().map(|l| l.tax).sum()
    }
}

// =============================================================================
// Audit Log Entry
// =============================================================================

/// Immutable audit record: created exactly once per calculation, never
/// updated or deleted by the engine. Later corrections are a NEW
/// calculation carrying a `corrects` back-reference, never an edit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditLogEntry {
    /// Calculation id; the caller attaches this to its deal records.
    pub calculation_id: Uuid,
    /// Full request snapshot.
    pub request: TaxCalculationRequest,
    /// Full result snapshot.
    pub result: TaxCalculationResult,
    pub rule_version: Uuid,
    pub jurisdiction_versions: Vec<Uuid>,
    pub created_at: DateTime<Utc>,
    /// Deal this calculation belongs to, when the caller has one.
    pub deal_id: Option<String>,
    /// Who asked for the calculation.
    pub actor: Option<String>,
    /// Prior calculation this one supersedes.
    pub corrects: Option<Uuid>,
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn line(kind: TaxLineKind, tax: Decimal) -> TaxLine {
        TaxLine {
            kind,
            description: "test".to_string(),
            jurisdiction: None,
            rate: TaxRate::zero(),
            taxable_amount: Decimal::ZERO,
            tax,
        }
    }

    #[test]
    fn test_line_sum_includes_credits() {
        let result = TaxCalculationResult {
            kind: TransactionKind::RetailSale,
            lines: vec![
                line(TaxLineKind::State, dec!(400.00)),
                line(TaxLineKind::Local, dec!(1200.00)),
                line(TaxLineKind::Credit, dec!(-150.00)),
            ],
            total_tax: dec!(1450.00),
            taxable_base: dec!(20000),
            effective_rate: dec!(0.0725),
            monthly_payment_tax: None,
            rate_source: RateSource::Table,
            used_fallback_rule: false,
            rule_version: Uuid::nil(),
            jurisdiction_versions: vec![],
        };
        assert_eq!(result.line_sum(), result.total_tax);
    }

    #[test]
    fn test_credit_flag() {
        assert!(line(TaxLineKind::Credit, dec!(-1)).is_credit());
        assert!(!line(TaxLineKind::State, dec!(1)).is_credit());
    }
}
