//! # Result Validator
//!
//! Advisory sanity checks over a finished calculation. Findings never
//! abort a quote - the desk manager sees them alongside the breakdown
//! and decides. The engine attaches them to the response and the audit
//! snapshot records them implicitly through the result it stores.
//!
//! ## Rules
//! - The breakdown must reconcile: lines sum to the total within one
//!   cent.
//! - No line is negative unless it is an explicit credit.
//! - A trade-in larger than the vehicle price is legal but suspicious.
//! - The combined local rate is checked against the state's published
//!   ceiling, or a conservative default when the rule has none.

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};

use crate::jurisdiction::JurisdictionSet;
use crate::money::TaxRate;
use crate::request::TaxCalculationRequest;
use crate::result::TaxCalculationResult;
use crate::rules::ResolvedRule;

/// Reconciliation tolerance: one cent.
const LINE_SUM_TOLERANCE: Decimal = dec!(0.01);

/// Combined-local-rate ceiling used when the state rule publishes none.
fn default_local_rate_bound() -> TaxRate {
    TaxRate::from_fraction(dec!(0.08))
}

// =============================================================================
// Findings
// =============================================================================

/// Stable machine-readable finding codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValidationCode {
    /// Lines do not sum to the total within tolerance.
    LineSumMismatch,
    /// A non-credit line carries negative tax.
    NegativeLine,
    /// Trade-in value exceeds the vehicle price.
    TradeInExceedsPrice,
    /// Combined local rate above the state's plausible ceiling.
    LocalRateOutOfBounds,
}

/// One advisory finding.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationFinding {
    pub code: ValidationCode,
    pub message: String,
}

/// Overall verdict. `Advisory` still quotes; it just asks for a second
/// look.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValidationStatus {
    Ok,
    Advisory,
}

/// The validator's report.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationReport {
    pub status: ValidationStatus,
    pub findings: Vec<ValidationFinding>,
}

impl ValidationReport {
    pub fn is_clean(&self) -> bool {
        matches!(self.status, ValidationStatus::Ok)
    }
}

// =============================================================================
// Validation
// =============================================================================

/// Runs every advisory check over a finished calculation.
pub fn validate_result(
    request: &TaxCalculationRequest,
    result: &TaxCalculationResult,
    jurisdictions: &JurisdictionSet,
    resolved: &ResolvedRule,
) -> ValidationReport {
    let mut findings = Vec::new();

    let drift = (result.line_sum() - result.total_tax).abs();
    if drift > LINE_SUM_TOLERANCE {
        findings.push(ValidationFinding {
            code: ValidationCode::LineSumMismatch,
            message: format!(
                "breakdown lines sum to {} but total is {}",
                result.line_sum(),
                result.total_tax
            ),
        });
    }

    for line in &result.lines {
        if line.tax < Decimal::ZERO && !line.is_credit() {
            findings.push(ValidationFinding {
                code: ValidationCode::NegativeLine,
                message: format!("non-credit line '{}' has negative tax {}", line.description, line.tax),
            });
        }
    }

    if request.trade_in_value > request.vehicle_price {
        findings.push(ValidationFinding {
            code: ValidationCode::TradeInExceedsPrice,
            message: format!(
                "trade-in value {} exceeds vehicle price {}",
                request.trade_in_value, request.vehicle_price
            ),
        });
    }

    let bound = resolved
        .rule
        .max_combined_local_rate
        .unwrap_or_else(default_local_rate_bound);
    let combined_local = jurisdictions.combined_local_rate();
    if combined_local.fraction() > bound.fraction() {
        findings.push(ValidationFinding {
            code: ValidationCode::LocalRateOutOfBounds,
            message: format!(
                "combined local rate {} exceeds the {} ceiling for {}",
                combined_local, bound, resolved.rule.state_code
            ),
        });
    }

    let status = if findings.is_empty() {
        ValidationStatus::Ok
    } else {
        ValidationStatus::Advisory
    };
    ValidationReport { status, findings }
}

// =============================================================================
// Unit Tests
// =============================================================================
