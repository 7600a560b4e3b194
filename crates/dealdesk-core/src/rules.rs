//! # State Rule Registry
//!
//! Per-state policy knobs governing how vehicle tax is computed.
//!
//! ## Policy Axes as Data
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  Every way states differ is an explicit field on StateRule:            │
//! │                                                                         │
//! │  trade_in_credit            Full | Capped{cap} | None                  │
//! │  trade_in_..._local         bifurcated states: credit state layer only │
//! │  *_rebate_reduces_base      manufacturer / dealer, independently       │
//! │  doc_fee_taxable (+cap)     taxable portion capped in some states      │
//! │  service_contract/gap       VSC and GAP taxability                     │
//! │  accessory_*                at-sale (optional reduced rate) vs after   │
//! │  lease_tax_method           Upfront | Monthly | Hybrid                 │
//! │  negative_equity_*          purchase (default NO) / lease (default YES)│
//! │  reciprocity / drive_out    interstate behavior                        │
//! │                                                                         │
//! │  The calculator consults ONLY this structured data - it never          │
//! │  branches on a state code.                                             │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Versioning
//! Rule versions are never mutated in place. A policy change inserts a
//! new version effective from its date; exactly one version is active
//! per state per date. A state with no entry at all falls back to a
//! documented conservative default instead of failing - tax calculation
//! must never hard-fail merely because a state hasn't been configured.

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

use crate::money::TaxRate;
use crate::request::RebateSource;

// =============================================================================
// Policy Enums
// =============================================================================

/// How much of a traded vehicle's value reduces the taxable base.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "policy")]
pub enum TradeInCredit {
    /// Full trade-in value reduces the base.
    Full,
    /// Credit up to a statutory cap.
    Capped { cap: Decimal },
    /// No trade-in credit at all.
    None,
}

impl TradeInCredit {
    /// The credit a given trade-in value earns under this policy.
    pub fn credit_for(&self, trade_in_value: Decimal) -> Decimal {
        let value = trade_in_value.max(Decimal::ZERO);
        match self {
            TradeInCredit::Full => value,
            TradeInCredit::Capped { cap } => value.min(*cap),
            TradeInCredit::None => Decimal::ZERO,
        }
    }
}

/// When lease tax is collected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LeaseTaxMethod {
    /// Whole lease price taxed once at inception.
    Upfront,
    /// Each scheduled payment taxed as billed; cap-cost reductions
    /// taxed up front as a one-time charge.
    Monthly,
    /// Same mechanics as `Monthly`; the distinction is carried entirely
    /// by the bucket flags (`cap_reduction_reduces_lease_base`,
    /// `trade_in_reduces_lease_base`, negative-equity treatment), which
    /// decide what lands in the upfront bucket versus the stream.
    Hybrid,
}

// =============================================================================
// State Rule
// =============================================================================

/// One versioned policy record for one state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StateRule {
    pub state_code: String,
    /// Version identifier, referenced by audit entries.
    pub version: Uuid,
    pub effective_date: NaiveDate,
    /// `None` = still in force.
    pub end_date: Option<NaiveDate>,

    // --- retail base -----------------------------------------------------
    pub trade_in_credit: TradeInCredit,
    /// `false` in bifurcated states: trade-in credit applies to the
    /// state layer only, local jurisdictions tax the full price.
    pub trade_in_credit_applies_to_local: bool,
    pub manufacturer_rebate_reduces_base: bool,
    pub dealer_rebate_reduces_base: bool,
    /// Negative equity rolled into a purchase. Default: not taxable.
    pub negative_equity_taxable_on_purchase: bool,

    // --- fees and accessories --------------------------------------------
    pub doc_fee_taxable: bool,
    /// Caps the TAXABLE portion of the doc fee, not the fee itself.
    pub doc_fee_cap: Option<Decimal>,
    pub service_contract_taxable: bool,
    pub gap_taxable: bool,
    pub accessory_at_sale_taxable: bool,
    /// Reduced rate for accessories bundled at time of sale, where a
    /// state taxes them below the general rate.
    pub accessory_at_sale_rate: Option<TaxRate>,
    pub accessory_after_delivery_taxable: bool,

    // --- leases ----------------------------------------------------------
    pub lease_tax_method: LeaseTaxMethod,
    /// Whether trade-in equity reduces the lease taxable base. States
    /// that deny this tax the equity as a cap-cost reduction instead.
    pub trade_in_reduces_lease_base: bool,
    /// Whether cash cap-cost reductions reduce the upfront lease base.
    /// Most states: they do not - only actual trade-in equity does.
    pub cap_reduction_reduces_lease_base: bool,
    /// Negative equity rolled into a lease. Default: taxable.
    pub negative_equity_taxable_on_lease: bool,

    // --- interstate ------------------------------------------------------
    /// Credit for tax already paid to another jurisdiction, up to this
    /// state's own tax amount (never a refund beyond it).
    pub reciprocity_credit: bool,
    /// Drive-out provision: out-of-state registration pays state tax
    /// only, capped at the destination state's rate, local waived.
    pub drive_out_eligible: bool,

    // --- data sanity -----------------------------------------------------
    /// Plausible historical ceiling for the combined local rate, used by
    /// the validator to flag stale or corrupt jurisdiction data.
    pub max_combined_local_rate: Option<TaxRate>,
}

impl StateRule {
    /// The documented conservative default for unconfigured states.
    ///
    /// ## Why These Defaults
    /// - Full trade-in credit, no cap: the majority position
    /// - Rebates taxable (do NOT reduce the base): the majority position
    /// - Doc fee taxable, uncapped: collects rather than under-collects
    /// - Upfront lease taxation, cash down not credited
    /// - Negative equity: not taxable on purchase, taxable on lease
    /// - No reciprocity credit, no drive-out: never under-collects
    ///
    /// Results computed with this rule carry `used_fallback_rule: true`
    /// so under-configured states show up in logs without blocking the
    /// transaction.
    pub fn conservative_default(state_code: &str) -> Self {
        StateRule {
            state_code: state_code.to_uppercase(),
            version: Uuid::nil(),
            effective_date: NaiveDate::MIN,
            end_date: None,
            trade_in_credit: TradeInCredit::Full,
            trade_in_credit_applies_to_local: true,
            manufacturer_rebate_reduces_base: false,
            dealer_rebate_reduces_base: false,
            negative_equity_taxable_on_purchase: false,
            doc_fee_taxable: true,
            doc_fee_cap: None,
            service_contract_taxable: false,
            gap_taxable: false,
            accessory_at_sale_taxable: true,
            accessory_at_sale_rate: None,
            accessory_after_delivery_taxable: false,
            lease_tax_method: LeaseTaxMethod::Upfront,
            trade_in_reduces_lease_base: true,
            cap_reduction_reduces_lease_base: false,
            negative_equity_taxable_on_lease: true,
            reciprocity_credit: false,
            drive_out_eligible: false,
            max_combined_local_rate: None,
        }
    }

    /// Whether this version is in force on the given date.
    pub fn is_effective(&self, as_of: NaiveDate) -> bool {
        if as_of < self.effective_date {
            return false;
        }
        match self.end_date {
            Some(end) => as_of < end,
            None => true,
        }
    }

    /// Whether a rebate from the given source reduces the taxable base.
    pub fn rebate_reduces_base(&self, source: RebateSource) -> bool {
        match source {
            RebateSource::Manufacturer => self.manufacturer_rebate_reduces_base,
            RebateSource::Dealer => self.dealer_rebate_reduces_base,
        }
    }
}

// =============================================================================
// Rule Table
// =============================================================================

/// A rule lookup outcome: always a rule, plus whether the conservative
/// default stood in for a missing state.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedRule {
    pub rule: StateRule,
    pub used_fallback: bool,
}

/// Immutable snapshot of all state rule versions.
///
/// Same lifecycle as [`crate::jurisdiction::RateTable`]: built from the
/// store, shared behind an `Arc`, swapped atomically on refresh.
#[derive(Debug, Clone, Default)]
pub struct RuleTable {
    rules: HashMap<String, Vec<StateRule>>,
}

impl RuleTable {
    pub fn new(rules: Vec<StateRule>) -> Self {
        let mut table = RuleTable::default();
        for rule in rules {
            table
                .rules
                .entry(rule.state_code.clone())
                .or_default()
                .push(rule);
        }
        table
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// Total-function rule lookup.
    ///
    /// Returns the most recent version effective at `as_of`, or the
    /// conservative default flagged `used_fallback: true`. Never fails:
    /// whether the state code exists at all was already settled by the
    /// jurisdiction resolver.
    pub fn rule_for(&self, state_code: &str, as_of: NaiveDate) -> ResolvedRule {
        let state = state_code.to_uppercase();
        let found = self
            .rules
            .get(&state)
            .and_then(|versions| {
                versions
                    .iter()
                    .filter(|r| r.is_effective(as_of))
                    .max_by_key(|r| r.effective_date)
            })
            .cloned();

        match found {
            Some(rule) => ResolvedRule {
                rule,
                used_fallback: false,
            },
            None => ResolvedRule {
                rule: StateRule::conservative_default(&state),
                used_fallback: true,
            },
        }
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn rule_version(state: &str, effective: NaiveDate, credit: TradeInCredit) -> StateRule {
        StateRule {
            state_code: state.to_string(),
            version: Uuid::new_v4(),
            effective_date: effective,
            trade_in_credit: credit,
            ..StateRule::conservative_default(state)
        }
    }

    #[test]
    fn test_trade_in_credit_policies() {
        assert_eq!(TradeInCredit::Full.credit_for(dec!(10000)), dec!(10000));
        assert_eq!(
            TradeInCredit::Capped { cap: dec!(8000) }.credit_for(dec!(10000)),
            dec!(8000)
        );
        assert_eq!(
            TradeInCredit::Capped { cap: dec!(8000) }.credit_for(dec!(5000)),
            dec!(5000)
        );
        assert_eq!(TradeInCredit::None.credit_for(dec!(10000)), dec!(0));
        // Garbage in: negative trade-in earns no credit
        assert_eq!(TradeInCredit::Full.credit_for(dec!(-500)), dec!(0));
    }

    #[test]
    fn test_rule_lookup_picks_effective_version() {
        let old = rule_version("OH", date(2020, 1, 1), TradeInCredit::Full);
        let mut closed = old.clone();
        closed.end_date = Some(date(2025, 1, 1));
        let new = rule_version(
            "OH",
            date(2025, 1, 1),
            TradeInCredit::Capped { cap: dec!(10000) },
        );
        let table = RuleTable::new(vec![closed, new]);

        let before = table.rule_for("OH", date(2024, 6, 1));
        assert!(!before.used_fallback);
        assert_eq!(before.rule.trade_in_credit, TradeInCredit::Full);

        let after = table.rule_for("OH", date(2025, 6, 1));
        assert_eq!(
            after.rule.trade_in_credit,
            TradeInCredit::Capped { cap: dec!(10000) }
        );
    }

    #[test]
    fn test_missing_state_uses_conservative_default() {
        let table = RuleTable::new(vec![]);
        let resolved = table.rule_for("WY", date(2026, 8, 1));

        assert!(resolved.used_fallback);
        assert_eq!(resolved.rule.state_code, "WY");
        // The documented defaults: full credit, rebates taxable, doc fee taxable
        assert_eq!(resolved.rule.trade_in_credit, TradeInCredit::Full);
        assert!(!resolved.rule.manufacturer_rebate_reduces_base);
        assert!(!resolved.rule.dealer_rebate_reduces_base);
        assert!(resolved.rule.doc_fee_taxable);
        assert!(!resolved.rule.negative_equity_taxable_on_purchase);
        assert!(resolved.rule.negative_equity_taxable_on_lease);
    }

    #[test]
    fn test_lookup_is_case_insensitive() {
        let table = RuleTable::new(vec![rule_version(
            "TX",
            date(2020, 1, 1),
            TradeInCredit::Full,
        )]);
        assert!(!table.rule_for("tx", date(2026, 1, 1)).used_fallback);
    }

    #[test]
    fn test_rule_serde_round_trip() {
        let mut rule = rule_version("IL", date(2020, 1, 1), TradeInCredit::Capped { cap: dec!(10000) });
        rule.max_combined_local_rate = Some(TaxRate::from_fraction(dec!(0.0475)));
        let json = serde_json::to_string(&rule).unwrap();
        let back: StateRule = serde_json::from_str(&json).unwrap();
        assert_eq!(back, rule);
        // Monetary fields cross the boundary as strings
        assert!(json.contains("\"cap\":\"10000\""));
    }
}
