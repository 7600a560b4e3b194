//! # Tax Calculator
//!
//! The algorithmic core: a pure function of (transaction facts,
//! resolved jurisdiction set, resolved state rule) with no side effects.
//!
//! ## Calculation Flow
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                      calculate(request, set, rule)                      │
//! │                                                                         │
//! │  RETAIL                              LEASE                              │
//! │  ──────                              ─────                              │
//! │  state base  = price                 Upfront: credited-adjusted cap     │
//! │              - trade-in credit                - residual + rent charge  │
//! │              - reducing rebates      Monthly: per-payment tax × term    │
//! │              + neg equity (if rule)           + cap reductions up front │
//! │  local base  = computed SEPARATELY   Hybrid:  cap bucket up front,      │
//! │   (bifurcated states credit the               payment bucket monthly    │
//! │    state layer only)                                                    │
//! │       │                                  │                              │
//! │       └──────────────┬───────────────────┘                              │
//! │                      ▼                                                  │
//! │  + one line per taxable fee / accessory (rule flags decide)            │
//! │  + drive-out: state only, capped at destination rate, local waived     │
//! │  + reciprocity: credit up to own tax, never a refund                   │
//! │                      ▼                                                  │
//! │  total = exact sum of finalized lines                                  │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Numeric Semantics
//! All intermediate arithmetic is unrounded `Decimal`. Each line rounds
//! exactly once, at finalization, half-up. The total is the exact sum
//! of finalized lines, so the breakdown always reconciles to the penny.

use rust_decimal::{Decimal, RoundingStrategy};

use crate::error::TaxResult;
use crate::jurisdiction::JurisdictionSet;
use crate::money::{round_line, TaxRate, RATE_SCALE};
use crate::request::{
    AccessoryLine, FeeCategory, FeeLine, InstallTiming, TaxCalculationRequest, TransactionKind,
};
use crate::result::{TaxCalculationResult, TaxLine, TaxLineKind};
use crate::rules::{LeaseTaxMethod, ResolvedRule, StateRule};

/// Computes the itemized tax breakdown for one transaction.
///
/// Pure and deterministic: identical inputs against identical rule and
/// jurisdiction versions yield a bit-identical result.
///
/// `destination_state_rate` is the registration state's own state-level
/// rate, used only to cap drive-out tax; the engine resolves it from
/// the rate table when the buyer registers out of state.
pub fn calculate(
    request: &TaxCalculationRequest,
    jurisdictions: &JurisdictionSet,
    resolved: &ResolvedRule,
    destination_state_rate: Option<TaxRate>,
) -> TaxResult<TaxCalculationResult> {
    request.validate()?;
    let rule = &resolved.rule;

    // Drive-out never touches a monthly or hybrid lease: the payment
    // stream is taxed where the lessee garages the vehicle, and the
    // fee/accessory lines follow the same treatment.
    let drive_out = request.interstate_destination().is_some()
        && request.out_of_state_registration
        && rule.drive_out_eligible
        && match request.kind {
            TransactionKind::RetailSale => true,
            TransactionKind::Lease => matches!(rule.lease_tax_method, LeaseTaxMethod::Upfront),
        };

    let mut outcome = match request.kind {
        TransactionKind::RetailSale => {
            retail_lines(request, jurisdictions, rule, drive_out, destination_state_rate)
        }
        TransactionKind::Lease => {
            lease_lines(request, jurisdictions, rule, drive_out, destination_state_rate)
        }
    };

    // The general rate a fee or accessory is taxed at: everything the
    // vehicle itself is subject to. Drive-out waives the local layer.
    let general_rate = if drive_out {
        outcome.vehicle_state_rate
    } else {
        outcome.vehicle_state_rate + jurisdictions.combined_local_rate()
    };
    for fee in &request.fees {
        if let Some(line) = fee_line(fee, rule, general_rate) {
            outcome.lines.push(line);
        }
    }
    for accessory in &request.accessories {
        if let Some(line) = accessory_line(accessory, rule, general_rate) {
            outcome.lines.push(line);
        }
    }

    // Reciprocity: credit for tax already paid elsewhere, capped at our
    // own tax so the line never turns the total into a refund.
    if request.interstate_destination().is_some()
        && !drive_out
        && rule.reciprocity_credit
        && request.tax_paid_elsewhere > Decimal::ZERO
    {
        let owed: Decimal = outcome.lines.iter().map(|l| l.tax).sum();
        let credit = round_line(request.tax_paid_elsewhere.min(owed));
        if credit > Decimal::ZERO {
            outcome.lines.push(TaxLine {
                kind: TaxLineKind::Credit,
                description: "Reciprocity credit for tax paid elsewhere".to_string(),
                jurisdiction: None,
                rate: TaxRate::zero(),
                taxable_amount: Decimal::ZERO,
                tax: -credit,
            });
        }
    }

    let total_tax: Decimal = outcome.lines.iter().map(|l| l.tax).sum();
    let effective_rate = if outcome.taxable_base > Decimal::ZERO {
        (total_tax / outcome.taxable_base)
            .round_dp_with_strategy(RATE_SCALE, RoundingStrategy::MidpointAwayFromZero)
    } else {
        Decimal::ZERO
    };

    Ok(TaxCalculationResult {
        kind: request.kind,
        lines: outcome.lines,
        total_tax,
        taxable_base: outcome.taxable_base,
        effective_rate,
        monthly_payment_tax: outcome.monthly_payment_tax,
        rate_source: jurisdictions.source,
        used_fallback_rule: resolved.used_fallback,
        rule_version: rule.version,
        jurisdiction_versions: jurisdictions.version_ids(),
    })
}

/// Intermediate output of the vehicle-layer computation.
struct VehicleLines {
    lines: Vec<TaxLine>,
    taxable_base: Decimal,
    /// State rate actually charged (drive-out may cap it).
    vehicle_state_rate: TaxRate,
    monthly_payment_tax: Option<Decimal>,
}

// =============================================================================
// Retail
// =============================================================================

fn retail_lines(
    request: &TaxCalculationRequest,
    jurisdictions: &JurisdictionSet,
    rule: &StateRule,
    drive_out: bool,
    destination_state_rate: Option<TaxRate>,
) -> VehicleLines {
    let credit = rule.trade_in_credit.credit_for(request.trade_in_value);
    let reducing_rebates = reducing_rebate_total(request, rule);
    let negative_equity = if rule.negative_equity_taxable_on_purchase {
        request.negative_equity()
    } else {
        Decimal::ZERO
    };

    let state_base = (request.vehicle_price - credit - reducing_rebates + negative_equity)
        .max(Decimal::ZERO);

    // Bifurcated states: local jurisdictions do not honor the trade-in
    // credit. The local base is computed independently, never shared.
    let local_credit = if rule.trade_in_credit_applies_to_local {
        credit
    } else {
        Decimal::ZERO
    };
    let local_base = (request.vehicle_price - local_credit - reducing_rebates + negative_equity)
        .max(Decimal::ZERO);

    let state_rate = charged_state_rate(jurisdictions, drive_out, destination_state_rate);
    let mut lines = vec![TaxLine {
        kind: TaxLineKind::State,
        description: format!("{} state tax", jurisdictions.state.state_code),
        jurisdiction: Some(jurisdictions.state.name.clone()),
        rate: state_rate,
        taxable_amount: state_base,
        tax: round_line(state_rate.apply(state_base)),
    }];

    if !drive_out {
        for local in &jurisdictions.locals {
            lines.push(TaxLine {
                kind: TaxLineKind::Local,
                description: format!("{} {} tax", local.name, local.level),
                jurisdiction: Some(local.name.clone()),
                rate: local.rate,
                taxable_amount: local_base,
                tax: round_line(local.rate.apply(local_base)),
            });
        }
    }

    VehicleLines {
        lines,
        taxable_base: state_base,
        vehicle_state_rate: state_rate,
        monthly_payment_tax: None,
    }
}

// =============================================================================
// Lease
// =============================================================================

fn lease_lines(
    request: &TaxCalculationRequest,
    jurisdictions: &JurisdictionSet,
    rule: &StateRule,
    drive_out: bool,
    destination_state_rate: Option<TaxRate>,
) -> VehicleLines {
    // validate() guarantees terms exist for a lease
    let terms = request
        .lease
        .as_ref()
        .expect("lease terms validated before calculation");
    let cap_cost = request.vehicle_price;
    let equity = request.trade_in_equity();
    let term = Decimal::from(terms.term_months);

    let trade_credit = if rule.trade_in_reduces_lease_base {
        equity
    } else {
        Decimal::ZERO
    };
    let cash_credit = if rule.cap_reduction_reduces_lease_base {
        terms.cash_down
    } else {
        Decimal::ZERO
    };
    let reducing_rebates = reducing_rebate_total(request, rule);
    let negative_equity = if rule.negative_equity_taxable_on_lease {
        request.negative_equity()
    } else {
        Decimal::ZERO
    };

    match rule.lease_tax_method {
        LeaseTaxMethod::Upfront => {
            // The whole lease price taxed once at inception. Only
            // credited reductions lower the base; a non-credited cash
            // down never enters the formula, so the tax is invariant to
            // it. The rent charge is computed on the same credited-
            // adjusted cap for the same reason.
            let credited = trade_credit + cash_credit + reducing_rebates;
            let adjusted_cap = cap_cost - credited;
            let rent_charge = (adjusted_cap + terms.residual) * terms.money_factor * term;
            let base =
                (adjusted_cap - terms.residual + rent_charge + negative_equity).max(Decimal::ZERO);

            let state_rate = charged_state_rate(jurisdictions, drive_out, destination_state_rate);
            let mut lines = vec![TaxLine {
                kind: TaxLineKind::State,
                description: format!("{} state lease tax", jurisdictions.state.state_code),
                jurisdiction: Some(jurisdictions.state.name.clone()),
                rate: state_rate,
                taxable_amount: base,
                tax: round_line(state_rate.apply(base)),
            }];
            if !drive_out {
                for local in &jurisdictions.locals {
                    lines.push(TaxLine {
                        kind: TaxLineKind::Local,
                        description: format!("{} {} tax", local.name, local.level),
                        jurisdiction: Some(local.name.clone()),
                        rate: local.rate,
                        taxable_amount: base,
                        tax: round_line(local.rate.apply(base)),
                    });
                }
            }

            VehicleLines {
                lines,
                taxable_base: base,
                vehicle_state_rate: state_rate,
                monthly_payment_tax: None,
            }
        }

        // Hybrid shares the Monthly computation: cap-reduction bucket
        // up front, payment stream taxed per payment.
        LeaseTaxMethod::Monthly | LeaseTaxMethod::Hybrid => {
            // Payment math uses the real adjusted cap - every reduction
            // lowers what is financed, whatever its tax treatment.
            let all_reductions = equity + terms.cash_down + rebate_total(request);
            let adjusted_cap = cap_cost - all_reductions;
            let depreciation = (adjusted_cap - terms.residual).max(Decimal::ZERO);
            let base_payment = (depreciation / term
                + (adjusted_cap + terms.residual) * terms.money_factor)
                .max(Decimal::ZERO);

            let combined = jurisdictions.total_rate();
            // Per-payment tax rounds per billing cycle - that is how
            // the lessor invoices it.
            let per_payment_tax = round_line(combined.apply(base_payment));
            let stream_tax = per_payment_tax * term;

            // Cap-cost reductions the state does not credit are taxed
            // up front as a one-time charge.
            let taxable_reduction = terms.cash_down - cash_credit + (equity - trade_credit)
                + (rebate_total(request) - reducing_rebates)
                + negative_equity;

            let mut lines = vec![TaxLine {
                kind: TaxLineKind::LeasePayments,
                description: format!(
                    "Lease payment tax ({} payments)",
                    terms.term_months
                ),
                jurisdiction: Some(jurisdictions.state.name.clone()),
                rate: combined,
                taxable_amount: base_payment * term,
                tax: stream_tax,
            }];
            if taxable_reduction > Decimal::ZERO {
                lines.push(TaxLine {
                    kind: TaxLineKind::CapReduction,
                    description: "Cap-cost reduction tax".to_string(),
                    jurisdiction: Some(jurisdictions.state.name.clone()),
                    rate: combined,
                    taxable_amount: taxable_reduction,
                    tax: round_line(combined.apply(taxable_reduction)),
                });
            }

            VehicleLines {
                taxable_base: base_payment * term + taxable_reduction.max(Decimal::ZERO),
                vehicle_state_rate: jurisdictions.state_rate(),
                monthly_payment_tax: Some(per_payment_tax),
                lines,
            }
        }
    }
}

// =============================================================================
// Shared Helpers
// =============================================================================

/// The state rate actually charged: drive-out caps it at the
/// destination state's own rate (when known).
fn charged_state_rate(
    jurisdictions: &JurisdictionSet,
    drive_out: bool,
    destination_state_rate: Option<TaxRate>,
) -> TaxRate {
    let own = jurisdictions.state_rate();
    if drive_out {
        match destination_state_rate {
            Some(dest) => own.min(dest),
            None => own,
        }
    } else {
        own
    }
}

fn rebate_total(request: &TaxCalculationRequest) -> Decimal {
    request.rebates.iter().map(|r| r.amount).sum()
}

fn reducing_rebate_total(request: &TaxCalculationRequest, rule: &StateRule) -> Decimal {
    request
        .rebates
        .iter()
        .filter(|r| rule.rebate_reduces_base(r.source))
        .map(|r| r.amount)
        .sum()
}

/// The taxable portion of a fee under the state rule.
///
/// For governed categories the rule is the single source of truth; the
/// caller's hint is consulted only for `Other`, where no statutory flag
/// exists (defaulting to taxable - the conservative direction).
fn fee_taxable_portion(fee: &FeeLine, rule: &StateRule) -> Decimal {
    match fee.category {
        FeeCategory::DocFee => {
            if rule.doc_fee_taxable {
                match rule.doc_fee_cap {
                    Some(cap) => fee.amount.min(cap),
                    None => fee.amount,
                }
            } else {
                Decimal::ZERO
            }
        }
        FeeCategory::ServiceContract => {
            if rule.service_contract_taxable {
                fee.amount
            } else {
                Decimal::ZERO
            }
        }
        FeeCategory::Gap => {
            if rule.gap_taxable {
                fee.amount
            } else {
                Decimal::ZERO
            }
        }
        FeeCategory::Other => {
            if fee.taxable_hint.unwrap_or(true) {
                fee.amount
            } else {
                Decimal::ZERO
            }
        }
    }
}

fn fee_line(fee: &FeeLine, rule: &StateRule, general_rate: TaxRate) -> Option<TaxLine> {
    let portion = fee_taxable_portion(fee, rule);
    if portion <= Decimal::ZERO {
        return None;
    }
    Some(TaxLine {
        kind: TaxLineKind::Fee,
        description: format!("Tax on {}", fee.description),
        jurisdiction: None,
        rate: general_rate,
        taxable_amount: portion,
        tax: round_line(general_rate.apply(portion)),
    })
}

fn accessory_line(
    accessory: &AccessoryLine,
    rule: &StateRule,
    general_rate: TaxRate,
) -> Option<TaxLine> {
    let rate = match accessory.installed {
        InstallTiming::AtSale => {
            if !rule.accessory_at_sale_taxable {
                return None;
            }
            // Bundled accessories use the reduced rate where one exists
            rule.accessory_at_sale_rate.unwrap_or(general_rate)
        }
        InstallTiming::AfterDelivery => {
            if !rule.accessory_after_delivery_taxable {
                return None;
            }
            general_rate
        }
    };
    if accessory.amount <= Decimal::ZERO {
        return None;
    }
    Some(TaxLine {
        kind: TaxLineKind::Accessory,
        description: format!("Tax on {}", accessory.description),
        jurisdiction: None,
        rate,
        taxable_amount: accessory.amount,
        tax: round_line(rate.apply(accessory.amount)),
    })
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::jurisdiction::{jurisdiction, JurisdictionLevel, RateSource, RateTable};
    use crate::request::{LeaseTerms, RebateLine, RebateSource};
    use crate::rules::TradeInCredit;
    use chrono::NaiveDate;
    use rust_decimal_macros::dec;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    /// A state at 2% with a single 4% local layer.
    fn two_four_set() -> JurisdictionSet {
        let table = RateTable::new(
            vec![jurisdiction(
                JurisdictionLevel::State,
                "TX",
                "TX",
                dec!(0.02),
                date(2020, 1, 1),
            )],
            vec![(
                "78701".to_string(),
                jurisdiction(
                    JurisdictionLevel::County,
                    "TX",
                    "Travis County",
                    dec!(0.04),
                    date(2020, 1, 1),
                ),
            )],
        );
        table.resolve("78701", date(2026, 8, 1), None).unwrap()
    }

    fn rule(mutate: impl FnOnce(&mut StateRule)) -> ResolvedRule {
        let mut rule = StateRule::conservative_default("TX");
        rule.version = uuid::Uuid::new_v4();
        mutate(&mut rule);
        ResolvedRule {
            rule,
            used_fallback: false,
        }
    }

    fn retail_request(price: Decimal, trade_in: Decimal) -> TaxCalculationRequest {
        TaxCalculationRequest {
            kind: TransactionKind::RetailSale,
            vehicle_price: price,
            trade_in_value: trade_in,
            trade_in_payoff: Decimal::ZERO,
            rebates: vec![],
            fees: vec![],
            accessories: vec![],
            lease: None,
            buyer_state: None,
            buyer_zip: "78701".to_string(),
            dealership_state: "TX".to_string(),
            out_of_state_registration: false,
            tax_paid_elsewhere: Decimal::ZERO,
            as_of: None,
        }
    }

    fn lease_request(cap: Decimal, terms: LeaseTerms) -> TaxCalculationRequest {
        let mut req = retail_request(cap, Decimal::ZERO);
        req.kind = TransactionKind::Lease;
        req.lease = Some(terms);
        req
    }

    // --- bifurcated trade-in credit ---------------------------------------

    #[test]
    fn test_bifurcated_trade_in_scenario() {
        // $30,000 price, $10,000 trade-in, full credit applied to the
        // state layer only: state 2% on $20,000 = $400.00, local 4% on
        // the full $30,000 = $1,200.00, total $1,600.00.
        let resolved = rule(|r| r.trade_in_credit_applies_to_local = false);
        let req = retail_request(dec!(30000), dec!(10000));
        let result = calculate(&req, &two_four_set(), &resolved, None).unwrap();

        assert_eq!(result.lines[0].tax, dec!(400.00));
        assert_eq!(result.lines[1].tax, dec!(1200.00));
        assert_eq!(result.total_tax, dec!(1600.00));
        assert_eq!(result.taxable_base, dec!(20000));
    }

    #[test]
    fn test_full_credit_both_layers() {
        let resolved = rule(|_| {});
        let req = retail_request(dec!(30000), dec!(10000));
        let result = calculate(&req, &two_four_set(), &resolved, None).unwrap();

        // state 2% and local 4% both on $20,000
        assert_eq!(result.lines[0].tax, dec!(400.00));
        assert_eq!(result.lines[1].tax, dec!(800.00));
        assert_eq!(result.total_tax, dec!(1200.00));
    }

    #[test]
    fn test_capped_trade_in_never_exceeds_cap() {
        let resolved = rule(|r| {
            r.trade_in_credit = TradeInCredit::Capped { cap: dec!(8000) };
        });
        let req = retail_request(dec!(30000), dec!(10000));
        let result = calculate(&req, &two_four_set(), &resolved, None).unwrap();

        // base = 30000 - 8000 = 22000 at 6% combined
        assert_eq!(result.taxable_base, dec!(22000));
        assert_eq!(result.total_tax, dec!(1320.00));
    }

    #[test]
    fn test_no_credit_policy() {
        let resolved = rule(|r| r.trade_in_credit = TradeInCredit::None);
        let req = retail_request(dec!(30000), dec!(10000));
        let result = calculate(&req, &two_four_set(), &resolved, None).unwrap();
        assert_eq!(result.taxable_base, dec!(30000));
    }

    // --- rebates ----------------------------------------------------------

    #[test]
    fn test_non_reducing_rebates_never_shrink_the_base() {
        let resolved = rule(|_| {}); // default: rebates taxable
        let mut req = retail_request(dec!(30000), dec!(0));
        req.rebates.push(RebateLine {
            description: "Factory rebate".to_string(),
            source: RebateSource::Manufacturer,
            amount: dec!(3000),
        });
        let result = calculate(&req, &two_four_set(), &resolved, None).unwrap();
        assert_eq!(result.taxable_base, dec!(30000));
    }

    #[test]
    fn test_reducing_rebates_shrink_the_base() {
        let resolved = rule(|r| r.manufacturer_rebate_reduces_base = true);
        let mut req = retail_request(dec!(30000), dec!(0));
        req.rebates.push(RebateLine {
            description: "Factory rebate".to_string(),
            source: RebateSource::Manufacturer,
            amount: dec!(3000),
        });
        req.rebates.push(RebateLine {
            description: "Dealer cash".to_string(),
            source: RebateSource::Dealer,
            amount: dec!(1000),
        });
        let result = calculate(&req, &two_four_set(), &resolved, None).unwrap();
        // Only the manufacturer rebate reduces; dealer stays taxable
        assert_eq!(result.taxable_base, dec!(27000));
    }

    // --- negative equity --------------------------------------------------

    #[test]
    fn test_negative_equity_excluded_on_purchase_by_default() {
        let resolved = rule(|_| {});
        let mut req = retail_request(dec!(30000), dec!(5000));
        req.trade_in_payoff = dec!(8000); // $3,000 under water
        let result = calculate(&req, &two_four_set(), &resolved, None).unwrap();
        // credit = 5000, negative equity ignored
        assert_eq!(result.taxable_base, dec!(25000));
    }

    #[test]
    fn test_negative_equity_taxable_when_state_inverts_default() {
        let resolved = rule(|r| r.negative_equity_taxable_on_purchase = true);
        let mut req = retail_request(dec!(30000), dec!(5000));
        req.trade_in_payoff = dec!(8000);
        let result = calculate(&req, &two_four_set(), &resolved, None).unwrap();
        assert_eq!(result.taxable_base, dec!(28000));
    }

    // --- fees and accessories ---------------------------------------------

    #[test]
    fn test_doc_fee_cap_bounds_taxable_portion() {
        let resolved = rule(|r| r.doc_fee_cap = Some(dec!(150)));
        let mut req = retail_request(dec!(30000), dec!(0));
        req.fees.push(FeeLine {
            description: "Doc fee".to_string(),
            category: FeeCategory::DocFee,
            amount: dec!(499),
            taxable_hint: None,
        });
        let result = calculate(&req, &two_four_set(), &resolved, None).unwrap();

        let fee = result
            .lines
            .iter()
            .find(|l| l.kind == TaxLineKind::Fee)
            .unwrap();
        assert_eq!(fee.taxable_amount, dec!(150));
        assert_eq!(fee.tax, dec!(9.00)); // 6% of $150
    }

    #[test]
    fn test_rule_overrides_caller_hint_for_governed_categories() {
        let resolved = rule(|r| r.gap_taxable = false);
        let mut req = retail_request(dec!(30000), dec!(0));
        req.fees.push(FeeLine {
            description: "GAP".to_string(),
            category: FeeCategory::Gap,
            amount: dec!(800),
            taxable_hint: Some(true), // caller thinks it's taxable
        });
        let result = calculate(&req, &two_four_set(), &resolved, None).unwrap();
        assert!(!result.lines.iter().any(|l| l.kind == TaxLineKind::Fee));
    }

    #[test]
    fn test_hint_honored_for_other_fees() {
        let resolved = rule(|_| {});
        let mut req = retail_request(dec!(30000), dec!(0));
        req.fees.push(FeeLine {
            description: "Title runner".to_string(),
            category: FeeCategory::Other,
            amount: dec!(75),
            taxable_hint: Some(false),
        });
        let result = calculate(&req, &two_four_set(), &resolved, None).unwrap();
        assert!(!result.lines.iter().any(|l| l.kind == TaxLineKind::Fee));
    }

    #[test]
    fn test_at_sale_accessory_uses_reduced_rate() {
        let resolved = rule(|r| {
            r.accessory_at_sale_rate = Some(TaxRate::from_fraction(dec!(0.03)));
        });
        let mut req = retail_request(dec!(30000), dec!(0));
        req.accessories.push(AccessoryLine {
            description: "Bed liner".to_string(),
            amount: dec!(500),
            installed: InstallTiming::AtSale,
        });
        req.accessories.push(AccessoryLine {
            description: "Roof rack".to_string(),
            amount: dec!(400),
            installed: InstallTiming::AfterDelivery,
        });
        let result = calculate(&req, &two_four_set(), &resolved, None).unwrap();

        let acc: Vec<_> = result
            .lines
            .iter()
            .filter(|l| l.kind == TaxLineKind::Accessory)
            .collect();
        // After-delivery not taxable under the default rule
        assert_eq!(acc.len(), 1);
        assert_eq!(acc[0].tax, dec!(15.00)); // 3% of $500
    }

    // --- interstate -------------------------------------------------------

    #[test]
    fn test_drive_out_waives_local_and_caps_at_destination() {
        let resolved = rule(|r| r.drive_out_eligible = true);
        let mut req = retail_request(dec!(30000), dec!(0));
        req.buyer_state = Some("OK".to_string());
        req.out_of_state_registration = true;
        // Destination state taxes at 1.25%, below our 2%
        let dest = Some(TaxRate::from_fraction(dec!(0.0125)));
        let result = calculate(&req, &two_four_set(), &resolved, dest).unwrap();

        assert_eq!(result.lines.len(), 1);
        assert_eq!(result.lines[0].kind, TaxLineKind::State);
        assert_eq!(result.lines[0].tax, dec!(375.00)); // 1.25% of 30k
    }

    #[test]
    fn test_reciprocity_credit_never_refunds() {
        let resolved = rule(|r| r.reciprocity_credit = true);
        let mut req = retail_request(dec!(30000), dec!(0));
        req.buyer_state = Some("OK".to_string());
        req.tax_paid_elsewhere = dec!(5000); // more than we'd charge
        let result = calculate(&req, &two_four_set(), &resolved, None).unwrap();

        // 6% of 30k = 1800; credit capped there, total bottoms at zero
        let credit = result.lines.iter().find(|l| l.is_credit()).unwrap();
        assert_eq!(credit.tax, dec!(-1800.00));
        assert_eq!(result.total_tax, dec!(0.00));
    }

    #[test]
    fn test_no_reciprocity_without_rule_flag() {
        let resolved = rule(|_| {});
        let mut req = retail_request(dec!(30000), dec!(0));
        req.buyer_state = Some("OK".to_string());
        req.tax_paid_elsewhere = dec!(500);
        let result = calculate(&req, &two_four_set(), &resolved, None).unwrap();
        assert!(!result.lines.iter().any(|l| l.is_credit()));
    }

    // --- leases -----------------------------------------------------------

    fn lease_terms() -> LeaseTerms {
        LeaseTerms {
            residual: dec!(22000),
            money_factor: dec!(0.00125),
            term_months: 36,
            cash_down: dec!(5000),
        }
    }

    #[test]
    fn test_upfront_lease_cash_down_invariance() {
        // Changing cash down (not trade-in equity) leaves the tax
        // unchanged, given fixed cap cost, residual and equity.
        let resolved = rule(|_| {});
        let mut with_down = lease_request(dec!(40000), lease_terms());
        with_down.trade_in_value = dec!(5000);

        let mut no_down = with_down.clone();
        no_down.lease.as_mut().unwrap().cash_down = Decimal::ZERO;

        let a = calculate(&with_down, &two_four_set(), &resolved, None).unwrap();
        let b = calculate(&no_down, &two_four_set(), &resolved, None).unwrap();
        assert_eq!(a.total_tax, b.total_tax);
    }

    #[test]
    fn test_upfront_lease_equity_not_credited_scenario() {
        // $5,000 cash down and $5,000 trade-in equity under a
        // trade-in-not-credited-on-lease rule: cash down stays out of
        // the taxable cap-reduction base, equity stays in and is taxed.
        let mut terms = lease_terms();
        terms.money_factor = Decimal::ZERO; // isolate the base math
        let not_credited = rule(|r| r.trade_in_reduces_lease_base = false);
        let credited = rule(|r| r.trade_in_reduces_lease_base = true);

        let mut req = lease_request(dec!(40000), terms);
        req.trade_in_value = dec!(5000);

        let taxed = calculate(&req, &two_four_set(), &not_credited, None).unwrap();
        let exempt = calculate(&req, &two_four_set(), &credited, None).unwrap();

        // base 18000 vs 13000 at 6% combined
        assert_eq!(taxed.taxable_base, dec!(18000));
        assert_eq!(taxed.total_tax, dec!(1080.00));
        assert_eq!(exempt.taxable_base, dec!(13000));
        assert_eq!(exempt.total_tax, dec!(780.00));
    }

    #[test]
    fn test_upfront_lease_includes_rent_charge() {
        let resolved = rule(|_| {});
        let req = lease_request(
            dec!(40000),
            LeaseTerms {
                residual: dec!(22000),
                money_factor: dec!(0.001),
                term_months: 36,
                cash_down: Decimal::ZERO,
            },
        );
        let result = calculate(&req, &two_four_set(), &resolved, None).unwrap();

        // rent = (40000 + 22000) * 0.001 * 36 = 2232
        // base = 40000 - 22000 + 2232 = 20232 at 6%
        assert_eq!(result.taxable_base, dec!(20232.000));
        assert_eq!(result.total_tax, dec!(1213.92));
    }

    #[test]
    fn test_monthly_lease_taxes_payments_and_cap_reduction() {
        let resolved = rule(|r| {
            r.lease_tax_method = LeaseTaxMethod::Monthly;
        });
        let req = lease_request(
            dec!(40000),
            LeaseTerms {
                residual: dec!(22000),
                money_factor: Decimal::ZERO,
                term_months: 36,
                cash_down: dec!(3600),
            },
        );
        let result = calculate(&req, &two_four_set(), &resolved, None).unwrap();

        // adjusted cap 36400, depreciation 14400, payment 400.00
        // per-payment tax 6% = 24.00, stream = 864.00
        assert_eq!(result.monthly_payment_tax, Some(dec!(24.00)));
        let stream = result
            .lines
            .iter()
            .find(|l| l.kind == TaxLineKind::LeasePayments)
            .unwrap();
        assert_eq!(stream.tax, dec!(864.00));

        // cash down taxed up front: 6% of 3600 = 216.00
        let cap = result
            .lines
            .iter()
            .find(|l| l.kind == TaxLineKind::CapReduction)
            .unwrap();
        assert_eq!(cap.tax, dec!(216.00));
        assert_eq!(result.total_tax, dec!(1080.00));
    }

    #[test]
    fn test_monthly_lease_negative_equity_taxed_by_default() {
        let resolved = rule(|r| r.lease_tax_method = LeaseTaxMethod::Monthly);
        let mut req = lease_request(
            dec!(40000),
            LeaseTerms {
                residual: dec!(22000),
                money_factor: Decimal::ZERO,
                term_months: 36,
                cash_down: Decimal::ZERO,
            },
        );
        req.trade_in_value = dec!(2000);
        req.trade_in_payoff = dec!(5000); // $3,000 negative equity

        let result = calculate(&req, &two_four_set(), &resolved, None).unwrap();
        let cap = result
            .lines
            .iter()
            .find(|l| l.kind == TaxLineKind::CapReduction)
            .unwrap();
        // 6% of the $3,000 rolled-in balance
        assert_eq!(cap.tax, dec!(180.00));
    }

    #[test]
    fn test_hybrid_lease_bucket_flags_split_upfront_and_stream() {
        // Cash down is credited out of the upfront bucket; trade-in
        // equity is not, so it lands there and is taxed once.
        let resolved = rule(|r| {
            r.lease_tax_method = LeaseTaxMethod::Hybrid;
            r.cap_reduction_reduces_lease_base = true;
            r.trade_in_reduces_lease_base = false;
        });
        let mut req = lease_request(
            dec!(45400),
            LeaseTerms {
                residual: dec!(22000),
                money_factor: Decimal::ZERO,
                term_months: 36,
                cash_down: dec!(4000),
            },
        );
        req.trade_in_value = dec!(5000);
        let result = calculate(&req, &two_four_set(), &resolved, None).unwrap();

        // adjusted cap 45400 - 9000 = 36400, depreciation 14400,
        // payment 400.00, per-payment tax 6% = 24.00, stream 864.00
        assert_eq!(result.monthly_payment_tax, Some(dec!(24.00)));
        let stream = result
            .lines
            .iter()
            .find(|l| l.kind == TaxLineKind::LeasePayments)
            .unwrap();
        assert_eq!(stream.tax, dec!(864.00));

        // upfront bucket holds only the $5,000 equity: 6% = 300.00
        let cap = result
            .lines
            .iter()
            .find(|l| l.kind == TaxLineKind::CapReduction)
            .unwrap();
        assert_eq!(cap.taxable_amount, dec!(5000));
        assert_eq!(cap.tax, dec!(300.00));
        assert_eq!(result.total_tax, dec!(1164.00));
    }

    #[test]
    fn test_monthly_lease_ignores_drive_out() {
        // The payment stream is taxed where the vehicle is garaged, so
        // an out-of-state registration changes nothing: payments and
        // fees both stay at the full combined rate.
        let resolved = rule(|r| {
            r.lease_tax_method = LeaseTaxMethod::Monthly;
            r.drive_out_eligible = true;
        });
        let mut req = lease_request(
            dec!(40000),
            LeaseTerms {
                residual: dec!(22000),
                money_factor: Decimal::ZERO,
                term_months: 36,
                cash_down: Decimal::ZERO,
            },
        );
        req.buyer_state = Some("OK".to_string());
        req.out_of_state_registration = true;
        req.fees.push(FeeLine {
            description: "Doc fee".to_string(),
            category: FeeCategory::DocFee,
            amount: dec!(200),
            taxable_hint: None,
        });
        let dest = Some(TaxRate::from_fraction(dec!(0.0125)));
        let result = calculate(&req, &two_four_set(), &resolved, dest).unwrap();

        let combined = TaxRate::from_fraction(dec!(0.06));
        let stream = result
            .lines
            .iter()
            .find(|l| l.kind == TaxLineKind::LeasePayments)
            .unwrap();
        assert_eq!(stream.rate, combined);
        let fee = result
            .lines
            .iter()
            .find(|l| l.kind == TaxLineKind::Fee)
            .unwrap();
        assert_eq!(fee.rate, combined);
        assert_eq!(fee.tax, dec!(12.00)); // 6% of $200, no destination cap
    }

    // --- cross-cutting ----------------------------------------------------

    #[test]
    fn test_total_is_exact_sum_of_lines() {
        let resolved = rule(|r| r.doc_fee_cap = Some(dec!(150)));
        let mut req = retail_request(dec!(30987.65), dec!(4321.09));
        req.fees.push(FeeLine {
            description: "Doc fee".to_string(),
            category: FeeCategory::DocFee,
            amount: dec!(499.99),
            taxable_hint: None,
        });
        let result = calculate(&req, &two_four_set(), &resolved, None).unwrap();
        assert_eq!(result.line_sum(), result.total_tax);
    }

    #[test]
    fn test_determinism() {
        let resolved = rule(|_| {});
        let req = retail_request(dec!(31415.92), dec!(2718.28));
        let set = two_four_set();
        let a = calculate(&req, &set, &resolved, None).unwrap();
        let b = calculate(&req, &set, &resolved, None).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_fallback_set_state_rate_only() {
        let resolved = rule(|_| {});
        let table = RateTable::new(
            vec![jurisdiction(
                JurisdictionLevel::State,
                "TX",
                "TX",
                dec!(0.0625),
                date(2020, 1, 1),
            )],
            vec![],
        );
        let set = table
            .resolve("79999", date(2026, 8, 1), Some("TX"))
            .unwrap();
        assert_eq!(set.source, RateSource::Fallback);

        let req = retail_request(dec!(20000), dec!(0));
        let result = calculate(&req, &set, &resolved, None).unwrap();
        assert_eq!(result.rate_source, RateSource::Fallback);
        assert_eq!(result.total_tax, dec!(1250.00));
        assert_eq!(result.lines.len(), 1);
    }

    #[test]
    fn test_invalid_input_aborts() {
        let resolved = rule(|_| {});
        let req = retail_request(dec!(-5), dec!(0));
        assert!(calculate(&req, &two_four_set(), &resolved, None).is_err());
    }
}
