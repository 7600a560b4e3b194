//! # Error Types
//!
//! Domain-specific error types for dealdesk-core.
//!
//! ## Error Taxonomy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Error Taxonomy                                  │
//! │                                                                         │
//! │  ABORTING (no legally-correct number possible)                         │
//! │  ├── InvalidInput         - malformed request data, names the field    │
//! │  ├── UnknownState         - state code not recognized at all           │
//! │  └── UnknownJurisdiction  - ZIP unresolvable with no state fallback    │
//! │                                                                         │
//! │  ADVISORY (carried on an otherwise-returned result, never errors)      │
//! │  ├── used_fallback_rule   - default state rule substituted             │
//! │  ├── RateSource::Fallback - state-rate-only jurisdiction set           │
//! │  └── ValidationFinding    - consistency check failed (validator.rs)    │
//! │                                                                         │
//! │  AuditWriteFailed lives in dealdesk-engine: the calculation            │
//! │  succeeded, only the durable log write did not.                        │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Design Principles
//! 1. Use `thiserror` for derive macros (not manual impl)
//! 2. Include context in error messages (field name, ZIP, state code)
//! 3. Errors are enum variants, never String
//! 4. An approximate quote beats no quote: only errors that prevent a
//!    legally-correct number abort the calculation

use thiserror::Error;

// =============================================================================
// Tax Error
// =============================================================================

/// Errors that abort a tax calculation.
///
/// Everything else in the engine degrades to an advisory flag on an
/// otherwise-returned result.
#[derive(Debug, Error)]
pub enum TaxError {
    /// Malformed or out-of-range request data.
    ///
    /// ## When This Occurs
    /// - Negative vehicle price or fee amount
    /// - ZIP that is not a 5-digit string
    /// - Lease transaction without lease terms
    ///
    /// Always names the offending field so the caller can fix exactly
    /// one thing.
    #[error("Invalid input for '{field}': {reason}")]
    InvalidInput { field: String, reason: String },

    /// State code not recognized at all - no fallback possible.
    #[error("Unknown state code: {state}")]
    UnknownState { state: String },

    /// ZIP could not be resolved and no state hint was available to
    /// fall back on.
    #[error("No tax jurisdiction found for ZIP {zip}")]
    UnknownJurisdiction { zip: String },
}

impl TaxError {
    /// Creates an InvalidInput error for a given field.
    pub fn invalid_input(field: impl Into<String>, reason: impl Into<String>) -> Self {
        TaxError::InvalidInput {
            field: field.into(),
            reason: reason.into(),
        }
    }
}

// =============================================================================
// Result Type Alias
// =============================================================================

/// Convenience type alias for Results with TaxError.
pub type TaxResult<T> = Result<T, TaxError>;

// =============================================================================
// Unit Tests
// =============================================================================
