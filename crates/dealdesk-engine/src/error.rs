//! # Engine Error Types
//!
//! The engine's error taxonomy separates three situations:
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  Calculation(..)       the tax math refused the input - no quote       │
//! │  Store(..)             the database failed before a result existed     │
//! │  AuditWriteFailed{..}  the math SUCCEEDED but the audit insert failed  │
//! │                        ── carries the computed outcome, because the    │
//! │                        caller must not treat "couldn't record it" the  │
//! │                        same as "couldn't compute it". A deal is never  │
//! │                        finalized on an unrecorded quote.               │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use thiserror::Error;

use crate::QuoteResponse;
use dealdesk_core::TaxError;
use dealdesk_store::StoreError;

/// Errors from the quote pipeline.
#[derive(Debug, Error)]
pub enum EngineError {
    /// The calculation itself failed (invalid input, unknown state or
    /// jurisdiction). No result exists.
    #[error(transparent)]
    Calculation(#[from] TaxError),

    /// Storage failed before a result was computed (snapshot load,
    /// connection loss).
    #[error(transparent)]
    Store(#[from] StoreError),

    /// The calculation succeeded but its audit record could not be
    /// written. The computed outcome rides along for display, but its
    /// calculation id references a record that never landed - retry the
    /// quote before finalizing anything against it.
    #[error("calculation succeeded but audit write failed: {source}")]
    AuditWriteFailed {
        outcome: Box<QuoteResponse>,
        #[source]
        source: StoreError,
    },
}

/// Result type for engine operations.
pub type EngineResult<T> = Result<T, EngineError>;
