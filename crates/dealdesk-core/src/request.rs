//! # Tax Calculation Request
//!
//! The transaction facts handed to the engine by the deal workflow.
//!
//! ## Boundary Contract
//! All monetary fields are `Decimal` and cross the JSON boundary as
//! strings (never numeric literals) so precision is exact end to end.
//! The caller's fee taxability hints are just that - hints; the state
//! rule is the single source of truth for categories it governs.

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::error::{TaxError, TaxResult};
use crate::jurisdiction::{validate_state_code, validate_zip};

// =============================================================================
// Transaction Kind
// =============================================================================

/// Retail sale or lease.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransactionKind {
    RetailSale,
    Lease,
}

// =============================================================================
// Itemized Lines
// =============================================================================

/// Who funds a rebate. States treat the two differently, so the engine
/// never lumps them together.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RebateSource {
    Manufacturer,
    Dealer,
}

/// One itemized rebate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RebateLine {
    pub description: String,
    pub source: RebateSource,
    pub amount: Decimal,
}

/// Fee categories the state rule has an opinion about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FeeCategory {
    /// Documentation fee.
    DocFee,
    /// Vehicle service contract (extended warranty).
    ServiceContract,
    /// GAP coverage.
    Gap,
    /// Anything else (title runner, nitrogen, etch...). The caller's
    /// taxable hint decides, since no statutory flag exists.
    Other,
}

/// One itemized fee.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeeLine {
    pub description: String,
    pub category: FeeCategory,
    pub amount: Decimal,
    /// Caller's taxability hint. Honored only for [`FeeCategory::Other`];
    /// for governed categories the state rule overrides it.
    #[serde(default)]
    pub taxable_hint: Option<bool>,
}

/// When an accessory was added - some states tax the two differently.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InstallTiming {
    AtSale,
    AfterDelivery,
}

/// One itemized accessory.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AccessoryLine {
    pub description: String,
    pub amount: Decimal,
    pub installed: InstallTiming,
}

// =============================================================================
// Lease Terms
// =============================================================================

/// Lease-specific terms; required when `kind` is [`TransactionKind::Lease`].
/// The capitalized cost is the request's `vehicle_price`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LeaseTerms {
    /// Residual value at lease end.
    pub residual: Decimal,
    /// Money factor (monthly rent charge factor, e.g. 0.00125).
    pub money_factor: Decimal,
    pub term_months: u32,
    /// Cash cap-cost reduction (down payment).
    #[serde(default)]
    pub cash_down: Decimal,
}

// =============================================================================
// Request
// =============================================================================

/// The complete transaction facts for one calculation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaxCalculationRequest {
    pub kind: TransactionKind,
    /// Selling price for retail, gross capitalized cost for leases.
    pub vehicle_price: Decimal,
    #[serde(default)]
    pub trade_in_value: Decimal,
    /// Remaining loan balance on the trade.
    #[serde(default)]
    pub trade_in_payoff: Decimal,
    #[serde(default)]
    pub rebates: Vec<RebateLine>,
    #[serde(default)]
    pub fees: Vec<FeeLine>,
    #[serde(default)]
    pub accessories: Vec<AccessoryLine>,
    pub lease: Option<LeaseTerms>,

    /// Where the buyer will register the vehicle.
    pub buyer_state: Option<String>,
    pub buyer_zip: String,
    pub dealership_state: String,
    /// Vehicle will be removed and registered out of state (drive-out).
    #[serde(default)]
    pub out_of_state_registration: bool,
    /// Tax already paid to another jurisdiction on this transaction.
    #[serde(default)]
    pub tax_paid_elsewhere: Decimal,

    /// Calculation date; the engine defaults it to today when absent.
    pub as_of: Option<NaiveDate>,
}

impl TaxCalculationRequest {
    /// Validates the transaction facts.
    ///
    /// Every rejection is an [`TaxError::InvalidInput`] naming exactly
    /// one offending field. Checks shape and sign only - policy
    /// questions (taxability, caps) belong to the calculator.
    pub fn validate(&self) -> TaxResult<()> {
        if self.vehicle_price < Decimal::ZERO {
            return Err(TaxError::invalid_input(
                "vehicle_price",
                "must not be negative",
            ));
        }
        if self.trade_in_value < Decimal::ZERO {
            return Err(TaxError::invalid_input(
                "trade_in_value",
                "must not be negative",
            ));
        }
        if self.trade_in_payoff < Decimal::ZERO {
            return Err(TaxError::invalid_input(
                "trade_in_payoff",
                "must not be negative",
            ));
        }
        if self.tax_paid_elsewhere < Decimal::ZERO {
            return Err(TaxError::invalid_input(
                "tax_paid_elsewhere",
                "must not be negative",
            ));
        }
        for (i, rebate) in self.rebates.iter().enumerate() {
            if rebate.amount < Decimal::ZERO {
                return Err(TaxError::invalid_input(
                    format!("rebates[{i}].amount"),
                    "must not be negative",
                ));
            }
        }
        for (i, fee) in self.fees.iter().enumerate() {
            if fee.amount < Decimal::ZERO {
                return Err(TaxError::invalid_input(
                    format!("fees[{i}].amount"),
                    "must not be negative",
                ));
            }
        }
        for (i, accessory) in self.accessories.iter().enumerate() {
            if accessory.amount < Decimal::ZERO {
                return Err(TaxError::invalid_input(
                    format!("accessories[{i}].amount"),
                    "must not be negative",
                ));
            }
        }

        validate_zip(&self.buyer_zip)?;
        validate_state_code(&self.dealership_state)?;
        if let Some(state) = &self.buyer_state {
            validate_state_code(state)?;
        }

        match self.kind {
            TransactionKind::Lease => {
                let terms = self.lease.as_ref().ok_or_else(|| {
                    TaxError::invalid_input("lease", "lease terms are required for a lease")
                })?;
                if terms.residual < Decimal::ZERO {
                    return Err(TaxError::invalid_input(
                        "lease.residual",
                        "must not be negative",
                    ));
                }
                if terms.money_factor < Decimal::ZERO {
                    return Err(TaxError::invalid_input(
                        "lease.money_factor",
                        "must not be negative",
                    ));
                }
                if terms.term_months == 0 {
                    return Err(TaxError::invalid_input(
                        "lease.term_months",
                        "must be at least 1",
                    ));
                }
                if terms.cash_down < Decimal::ZERO {
                    return Err(TaxError::invalid_input(
                        "lease.cash_down",
                        "must not be negative",
                    ));
                }
            }
            TransactionKind::RetailSale => {}
        }

        Ok(())
    }

    /// Trade-in equity: value above payoff, floored at zero.
    pub fn trade_in_equity(&self) -> Decimal {
        (self.trade_in_value - self.trade_in_payoff).max(Decimal::ZERO)
    }

    /// Negative equity: payoff above value, floored at zero.
    pub fn negative_equity(&self) -> Decimal {
        (self.trade_in_payoff - self.trade_in_value).max(Decimal::ZERO)
    }

    /// The registration state when it differs from the dealership state.
    pub fn interstate_destination(&self) -> Option<&str> {
        match &self.buyer_state {
            Some(buyer) if !buyer.eq_ignore_ascii_case(&self.dealership_state) => {
                Some(buyer.as_str())
            }
            _ => None,
        }
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
