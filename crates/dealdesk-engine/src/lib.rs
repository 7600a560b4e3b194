//! # dealdesk-engine: Quote Orchestration
//!
//! The facade the deal workflow calls. One `quote()` call runs the full
//! pipeline against one consistent data snapshot and leaves exactly one
//! immutable audit record behind.
//!
//! ## Quote Pipeline
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                      TaxEngine::quote(request, ctx)                     │
//! │                                                                         │
//! │  1. validate(request)          shape and sign checks, abort on error   │
//! │  2. snapshots()                Arc<RateTable> + Arc<RuleTable>, one    │
//! │                                consistent view for the whole quote     │
//! │  3. resolve(zip, as_of)        state + locals, or state-only fallback  │
//! │  4. rule_for(state, as_of)     policy row, or conservative default     │
//! │  5. calculate(...)             pure decimal math, itemized lines       │
//! │  6. validate_result(...)       advisory findings, never aborts         │
//! │  7. audit insert               INSERT-only; failure is its own error   │
//! │                                carrying the computed outcome           │
//! │                                                                         │
//! │  ──► QuoteResponse { calculation_id, result, validation }              │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Usage
//!
//! ```rust,ignore
//! use dealdesk_engine::{CalculationContext, EngineConfig, TaxEngine};
//! use dealdesk_store::{Store, StoreConfig};
//!
//! let store = Store::new(StoreConfig::new("dealdesk.db")).await?;
//! let engine = TaxEngine::new(store, EngineConfig::default());
//!
//! let quote = engine
//!     .quote(request, CalculationContext::for_deal("D-1001", "desk-manager"))
//!     .await?;
//! println!("total tax: {}", quote.result.total_tax);
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod error;

pub use error::{EngineError, EngineResult};

use std::time::Duration;

use chrono::Utc;
use tracing::{debug, info, warn};
use uuid::Uuid;

use dealdesk_core::result::AuditLogEntry;
use dealdesk_core::validator::{validate_result, ValidationReport};
use dealdesk_core::{calculate, TaxCalculationRequest, TaxCalculationResult};
use dealdesk_store::{SnapshotCache, Store, DEFAULT_SNAPSHOT_TTL};

// =============================================================================
// Configuration
// =============================================================================

/// Engine configuration.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// How long rate/rule snapshots are served before reloading.
    pub snapshot_ttl: Duration,
}

impl Default for EngineConfig {
    fn default() -> Self {
        EngineConfig {
            snapshot_ttl: DEFAULT_SNAPSHOT_TTL,
        }
    }
}

// =============================================================================
// Calculation Context
// =============================================================================

/// Caller-supplied provenance for the audit record.
#[derive(Debug, Clone, Default)]
pub struct CalculationContext {
    /// Deal this calculation belongs to.
    pub deal_id: Option<String>,
    /// Who asked for the calculation.
    pub actor: Option<String>,
    /// Prior calculation this one corrects. The old record stays; the
    /// audit log links the two.
    pub corrects: Option<Uuid>,
}

impl CalculationContext {
    /// Context for a quote attached to a deal.
    pub fn for_deal(deal_id: impl Into<String>, actor: impl Into<String>) -> Self {
        CalculationContext {
            deal_id: Some(deal_id.into()),
            actor: Some(actor.into()),
            corrects: None,
        }
    }

    /// Marks this calculation as correcting an earlier one.
    pub fn correcting(mut self, calculation_id: Uuid) -> Self {
        self.corrects = Some(calculation_id);
        self
    }
}

// =============================================================================
// Quote Response
// =============================================================================

/// What a successful quote returns: the recorded calculation id, the
/// itemized result, and the advisory validation report.
#[derive(Debug, Clone, PartialEq)]
pub struct QuoteResponse {
    pub calculation_id: Uuid,
    pub result: TaxCalculationResult,
    pub validation: ValidationReport,
}

// =============================================================================
// Engine
// =============================================================================

/// The tax engine facade.
///
/// Cloneable and cheap to share across request handlers; clones share
/// the store pool and the snapshot cache.
#[derive(Clone)]
pub struct TaxEngine {
    store: Store,
    cache: SnapshotCache,
}

impl TaxEngine {
    /// Creates an engine over an opened store.
    pub fn new(store: Store, config: EngineConfig) -> Self {
        let cache = SnapshotCache::new(store.clone(), config.snapshot_ttl);
        TaxEngine { store, cache }
    }

    /// The underlying store, for seeding and administration.
    pub fn store(&self) -> &Store {
        &self.store
    }

    /// Forces a snapshot reload, making freshly written rate or rule
    /// rows visible without waiting out the TTL.
    pub async fn refresh_snapshots(&self) -> EngineResult<()> {
        self.cache.refresh().await?;
        Ok(())
    }

    /// Computes, validates and records one tax quote.
    ///
    /// ## Guarantees
    /// - The whole quote is computed against one consistent snapshot
    /// - A returned `Ok` means the audit record is durably written
    /// - An [`EngineError::AuditWriteFailed`] still carries the
    ///   computed outcome so the desk can display it, flagged unrecorded
    pub async fn quote(
        &self,
        request: TaxCalculationRequest,
        ctx: CalculationContext,
    ) -> EngineResult<QuoteResponse> {
        request.validate()?;

        // "Today" is resolved here, once - the core never reads a clock.
        let as_of = request.as_of.unwrap_or_else(|| Utc::now().date_naive());

        debug!(
            zip = %request.buyer_zip,
            state = %request.dealership_state,
            %as_of,
            "Starting tax quote"
        );

        let (rates, rules) = self.cache.snapshots().await?;

        let jurisdictions =
            rates.resolve(&request.buyer_zip, as_of, Some(&request.dealership_state))?;
        let resolved = rules.rule_for(&jurisdictions.state.state_code, as_of);
        if resolved.used_fallback {
            warn!(
                state = %jurisdictions.state.state_code,
                "No configured rule for state, using conservative default"
            );
        }

        // Destination state rate, for the drive-out cap. Unknown
        // destination rates simply leave the cap unapplied.
        let destination_state_rate = request
            .interstate_destination()
            .and_then(|dest| rates.state_rate(dest, as_of));

        let result = calculate(&request, &jurisdictions, &resolved, destination_state_rate)?;
        let validation = validate_result(&request, &result, &jurisdictions, &resolved);

        let calculation_id = Uuid::new_v4();
        let entry = AuditLogEntry {
            calculation_id,
            rule_version: result.rule_version,
            jurisdiction_versions: result.jurisdiction_versions.clone(),
            request,
            result,
            created_at: Utc::now(),
            deal_id: ctx.deal_id,
            actor: ctx.actor,
            corrects: ctx.corrects,
        };

        let response = QuoteResponse {
            calculation_id,
            result: entry.result.clone(),
            validation,
        };

        if let Err(source) = self.store.audit().insert(&entry).await {
            warn!(%calculation_id, error = %source, "Audit write failed after successful calculation");
            return Err(EngineError::AuditWriteFailed {
                outcome: Box::new(response),
                source,
            });
        }

        info!(
            %calculation_id,
            total = %response.result.total_tax,
            clean = response.validation.is_clean(),
            "Tax quote recorded"
        );
        Ok(response)
    }

    /// Fetches a recorded calculation by id.
    pub async fn calculation(&self, calculation_id: Uuid) -> EngineResult<AuditLogEntry> {
        Ok(self.store.audit().get(calculation_id).await?)
    }

    /// Every calculation recorded for a deal, oldest first, corrected
    /// quotes included.
    pub async fn deal_history(&self, deal_id: &str) -> EngineResult<Vec<AuditLogEntry>> {
        Ok(self.store.audit().list_for_deal(deal_id).await?)
    }
}

// =============================================================================
// Integration Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use dealdesk_core::jurisdiction::{jurisdiction, JurisdictionLevel, RateSource};
    use dealdesk_core::request::TransactionKind;
    use dealdesk_core::rules::StateRule;
    use dealdesk_core::TaxError;
    use dealdesk_store::StoreConfig;
    use rust_decimal::Decimal;
    use rust_decimal_macros::dec;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    /// Engine over an in-memory store seeded with TX at 2% state and a
    /// single 4% county over 78701.
    async fn seeded_engine() -> TaxEngine {
        let store = Store::new(StoreConfig::in_memory()).await.unwrap();
        let repo = store.jurisdictions();
        repo.insert(
            &jurisdiction(JurisdictionLevel::State, "TX", "TX", dec!(0.02), date(2020, 1, 1)),
            &[],
        )
        .await
        .unwrap();
        repo.insert(
            &jurisdiction(
                JurisdictionLevel::County,
                "TX",
                "Travis County",
                dec!(0.04),
                date(2020, 1, 1),
            ),
            &["78701".to_string()],
        )
        .await
        .unwrap();

        let mut rule = StateRule::conservative_default("TX");
        rule.version = Uuid::new_v4();
        rule.effective_date = date(2020, 1, 1);
        rule.trade_in_credit_applies_to_local = false;
        store.state_rules().insert(&rule).await.unwrap();

        TaxEngine::new(store, EngineConfig::default())
    }

    fn request(price: Decimal, trade_in: Decimal) -> TaxCalculationRequest {
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
            as_of: Some(date(2026, 8, 1)),
        }
    }

    #[tokio::test]
    async fn test_quote_end_to_end() {
        let engine = seeded_engine().await;
        let quote = engine
            .quote(request(dec!(30000), dec!(10000)), CalculationContext::default())
            .await
            .unwrap();

        // Bifurcated: state 2% on 20k, county 4% on the full 30k
        assert_eq!(quote.result.total_tax, dec!(1600.00));
        assert!(quote.validation.is_clean());
        assert!(!quote.result.used_fallback_rule);
    }

    #[tokio::test]
    async fn test_quote_writes_exactly_one_audit_record() {
        let engine = seeded_engine().await;
        let quote = engine
            .quote(
                request(dec!(30000), dec!(0)),
                CalculationContext::for_deal("D-1001", "desk-manager"),
            )
            .await
            .unwrap();

        let entry = engine.calculation(quote.calculation_id).await.unwrap();
        assert_eq!(entry.result, quote.result);
        assert_eq!(entry.deal_id.as_deref(), Some("D-1001"));
        assert_eq!(entry.actor.as_deref(), Some("desk-manager"));
        assert_eq!(entry.rule_version, quote.result.rule_version);

        let history = engine.deal_history("D-1001").await.unwrap();
        assert_eq!(history.len(), 1);
    }

    #[tokio::test]
    async fn test_correction_links_to_original() {
        let engine = seeded_engine().await;
        let first = engine
            .quote(
                request(dec!(30000), dec!(0)),
                CalculationContext::for_deal("D-2002", "desk-manager"),
            )
            .await
            .unwrap();

        // Trade-in was missed the first time; requote, correcting
        let second = engine
            .quote(
                request(dec!(30000), dec!(10000)),
                CalculationContext::for_deal("D-2002", "desk-manager")
                    .correcting(first.calculation_id),
            )
            .await
            .unwrap();

        let history = engine.deal_history("D-2002").await.unwrap();
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].corrects, None);
        assert_eq!(history[1].corrects, Some(first.calculation_id));
        assert_ne!(second.calculation_id, first.calculation_id);
    }

    #[tokio::test]
    async fn test_unknown_zip_degrades_to_state_rate() {
        let engine = seeded_engine().await;
        let mut req = request(dec!(30000), dec!(0));
        req.buyer_zip = "79999".to_string();

        let quote = engine.quote(req, CalculationContext::default()).await.unwrap();
        // State rate only; flagged on the result, validation stays clean
        assert_eq!(quote.result.total_tax, dec!(600.00));
        assert_eq!(quote.result.rate_source, RateSource::Fallback);
        assert!(quote.validation.is_clean());
    }

    #[tokio::test]
    async fn test_unconfigured_state_rule_is_advisory() {
        let engine = seeded_engine().await;
        engine
            .store()
            .jurisdictions()
            .insert(
                &jurisdiction(JurisdictionLevel::State, "NM", "NM", dec!(0.04), date(2020, 1, 1)),
                &[],
            )
            .await
            .unwrap();
        engine.refresh_snapshots().await.unwrap();

        let mut req = request(dec!(20000), dec!(0));
        req.buyer_zip = "87501".to_string();
        req.dealership_state = "NM".to_string();

        let quote = engine.quote(req, CalculationContext::default()).await.unwrap();
        assert!(quote.result.used_fallback_rule);
        assert!(quote.validation.is_clean());
    }

    #[tokio::test]
    async fn test_invalid_input_aborts_without_audit_record() {
        let engine = seeded_engine().await;
        let err = engine
            .quote(request(dec!(-1), dec!(0)), CalculationContext::for_deal("D-3003", "x"))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            EngineError::Calculation(TaxError::InvalidInput { .. })
        ));

        assert!(engine.deal_history("D-3003").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_unknown_state_aborts() {
        let engine = seeded_engine().await;
        let mut req = request(dec!(30000), dec!(0));
        req.buyer_zip = "99999".to_string();
        req.dealership_state = "ZZ".to_string();

        let err = engine.quote(req, CalculationContext::default()).await.unwrap_err();
        assert!(matches!(
            err,
            EngineError::Calculation(TaxError::UnknownState { .. })
        ));
    }

    #[tokio::test]
    async fn test_audit_failure_still_carries_the_outcome() {
        let engine = seeded_engine().await;
        // Warm the snapshot so the calculation itself needs no database
        engine.refresh_snapshots().await.unwrap();

        // Shut the pool out from under the audit write
        engine.store().close().await;

        let err = engine
            .quote(request(dec!(30000), dec!(10000)), CalculationContext::default())
            .await
            .unwrap_err();
        match err {
            EngineError::AuditWriteFailed { outcome, .. } => {
                // The computed quote survives; the desk can display it
                // and retry the record
                assert_eq!(outcome.result.total_tax, dec!(1600.00));
                assert!(outcome.validation.is_clean());
            }
            other => panic!("expected AuditWriteFailed, got {other}"),
        }
    }

    #[tokio::test]
    async fn test_new_rates_invisible_until_refresh() {
        let engine = seeded_engine().await;
        // Prime the snapshot
        engine
            .quote(request(dec!(30000), dec!(0)), CalculationContext::default())
            .await
            .unwrap();

        // Supersede the state rate: 2% -> 3% effective 2026-01-01
        let table = engine.store().jurisdictions().load_rate_table().await.unwrap();
        let old_id = table
            .resolve("78701", date(2026, 8, 1), None)
            .unwrap()
            .state
            .id;
        engine
            .store()
            .jurisdictions()
            .supersede(
                old_id,
                &jurisdiction(JurisdictionLevel::State, "TX", "TX", dec!(0.03), date(2026, 1, 1)),
                &[],
            )
            .await
            .unwrap();

        // Cached snapshot still quotes the old rate
        let stale = engine
            .quote(request(dec!(30000), dec!(0)), CalculationContext::default())
            .await
            .unwrap();
        assert_eq!(stale.result.lines[0].tax, dec!(600.00));

        engine.refresh_snapshots().await.unwrap();
        let fresh = engine
            .quote(request(dec!(30000), dec!(0)), CalculationContext::default())
            .await
            .unwrap();
        assert_eq!(fresh.result.lines[0].tax, dec!(900.00));
    }
}
