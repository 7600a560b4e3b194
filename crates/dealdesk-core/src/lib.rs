//! # dealdesk-core: Pure Tax Calculation Logic
//!
//! This crate is the **heart** of the deal desk engine. It contains the
//! full tax computation as pure functions with zero I/O dependencies.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                       Deal Desk Architecture                            │
//! │                                                                         │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                 Deal Workflow (caller)                          │   │
//! │  │    desking screen ──► quote request ──► printed breakdown       │   │
//! │  └─────────────────────────────┬───────────────────────────────────┘   │
//! │                                │                                        │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │                 dealdesk-engine (facade)                        │   │
//! │  │    resolve ──► rule ──► calculate ──► validate ──► audit        │   │
//! │  └─────────────────────────────┬───────────────────────────────────┘   │
//! │                                │                                        │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │               ★ dealdesk-core (THIS CRATE) ★                    │   │
//! │  │                                                                 │   │
//! │  │   ┌────────────┐ ┌─────────┐ ┌────────────┐ ┌─────────────┐   │   │
//! │  │   │jurisdiction│ │  rules  │ │ calculator │ │  validator  │   │   │
//! │  │   │  resolver  │ │ registry│ │ retail/    │ │  advisory   │   │   │
//! │  │   │  ZIP→rates │ │ per-state│ │ lease math │ │  findings   │   │   │
//! │  │   └────────────┘ └─────────┘ └────────────┘ └─────────────┘   │   │
//! │  │                                                                 │   │
//! │  │   NO I/O • NO DATABASE • NO CLOCK • PURE FUNCTIONS             │   │
//! │  └─────────────────────────────┬───────────────────────────────────┘   │
//! │                                │                                        │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │                 dealdesk-store (SQLite layer)                   │   │
//! │  │        rate/rule tables, snapshots, immutable audit log         │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Modules
//!
//! - [`money`] - Decimal helpers, the [`money::TaxRate`] newtype, rounding
//! - [`jurisdiction`] - ZIP to layered jurisdiction resolution
//! - [`rules`] - Per-state taxability policy as data
//! - [`request`] / [`result`] - The calculation boundary types
//! - [`calculator`] - Retail, lease and interstate tax math
//! - [`validator`] - Advisory sanity checks over a finished result
//! - [`error`] - Domain error types
//!
//! ## Design Principles
//!
//! 1. **Pure Functions**: same inputs against the same rule and rate
//!    versions produce a bit-identical result
//! 2. **No I/O**: database, network and clock access are FORBIDDEN here;
//!    even "today" arrives as an explicit `as_of` date
//! 3. **Decimal Money**: all monetary values are `rust_decimal::Decimal`,
//!    serialized as strings - floats never touch a tax figure
//! 4. **Policy As Data**: the calculator never branches on a state code;
//!    every state difference lives in a [`rules::StateRule`] row
//!
//! ## Example Usage
//!
//! ```rust
//! use chrono::NaiveDate;
//! use dealdesk_core::jurisdiction::{jurisdiction, JurisdictionLevel, RateTable};
//! use dealdesk_core::rules::RuleTable;
//! use dealdesk_core::{calculate, TaxCalculationRequest, TransactionKind};
//! use rust_decimal::Decimal;
//!
//! let as_of = NaiveDate::from_ymd_opt(2026, 8, 1).unwrap();
//! let rates = RateTable::new(
//!     vec![jurisdiction(
//!         JurisdictionLevel::State,
//!         "TX",
//!         "TX",
//!         "0.0625".parse().unwrap(),
//!         NaiveDate::from_ymd_opt(2020, 1, 1).unwrap(),
//!     )],
//!     vec![],
//! );
//! let set = rates.resolve("78701", as_of, Some("TX")).unwrap();
//! let rule = RuleTable::default().rule_for("TX", as_of);
//!
//! let request = TaxCalculationRequest {
//!     kind: TransactionKind::RetailSale,
//!     vehicle_price: "30000".parse().unwrap(),
//!     trade_in_value: "10000".parse().unwrap(),
//!     trade_in_payoff: Decimal::ZERO,
//!     rebates: vec![],
//!     fees: vec![],
//!     accessories: vec![],
//!     lease: None,
//!     buyer_state: None,
//!     buyer_zip: "78701".to_string(),
//!     dealership_state: "TX".to_string(),
//!     out_of_state_registration: false,
//!     tax_paid_elsewhere: Decimal::ZERO,
//!     as_of: Some(as_of),
//! };
//!
//! let result = calculate(&request, &set, &rule, None).unwrap();
//! // 6.25% of $20,000 after the full trade-in credit
//! assert_eq!(result.total_tax, "1250.00".parse().unwrap());
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod calculator;
pub mod error;
pub mod jurisdiction;
pub mod money;
pub mod request;
pub mod result;
pub mod rules;
pub mod validator;

// =============================================================================
// Re-exports for Convenience
// =============================================================================
// These allow users to do `use dealdesk_core::TaxRate` instead of
// `use dealdesk_core::money::TaxRate`

pub use calculator::calculate;
pub use error::{TaxError, TaxResult};
pub use jurisdiction::{Jurisdiction, JurisdictionLevel, JurisdictionSet, RateSource, RateTable};
pub use money::TaxRate;
pub use request::{TaxCalculationRequest, TransactionKind};
pub use result::{AuditLogEntry, TaxCalculationResult, TaxLine, TaxLineKind};
pub use rules::{ResolvedRule, RuleTable, StateRule};
pub use validator::{validate_result, ValidationCode, ValidationReport, ValidationStatus};
