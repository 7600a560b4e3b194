//! # Repository Module
//!
//! Database repository implementations for the tax engine.
//!
//! ## Repository Pattern
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Repository Pattern Explained                         │
//! │                                                                         │
//! │  The Repository pattern abstracts database access behind a clean API.  │
//! │                                                                         │
//! │  Engine / snapshot cache                                               │
//! │       │                                                                 │
//! │       │  store.jurisdictions().load_rate_table()                       │
//! │       │  store.audit().insert(&entry)                                  │
//! │       ▼                                                                 │
//! │  JurisdictionRepository / StateRuleRepository / AuditRepository        │
//! │       │                                                                 │
//! │       │  SQL (runtime-bound queries, decimals as TEXT)                 │
//! │       ▼                                                                 │
//! │  SQLite Database                                                       │
//! │                                                                         │
//! │  Write discipline:                                                      │
//! │  • rate/rule rows are append-only (supersede, never update)            │
//! │  • audit rows are insert-only (no update, no delete, ever)             │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Available Repositories
//!
//! - [`jurisdiction::JurisdictionRepository`] - Versioned rate rows + ZIP coverage
//! - [`state_rule::StateRuleRepository`] - Versioned per-state policy rows
//! - [`audit::AuditRepository`] - Immutable calculation audit log

pub mod audit;
pub mod jurisdiction;
pub mod state_rule;

use chrono::NaiveDate;
use rust_decimal::Decimal;
use sqlx::sqlite::SqliteRow;
use sqlx::Row;

use crate::error::{StoreError, StoreResult};

/// Reads a TEXT column holding an exact decimal string.
pub(crate) fn decimal_column(row: &SqliteRow, column: &str) -> StoreResult<Decimal> {
    let raw: String = row.try_get(column)?;
    raw.parse()
        .map_err(|_| StoreError::corrupt(column, format!("'{raw}' is not a decimal")))
}

/// Reads a TEXT column holding an ISO-8601 date.
pub(crate) fn date_column(row: &SqliteRow, column: &str) -> StoreResult<NaiveDate> {
    let raw: String = row.try_get(column)?;
    raw.parse()
        .map_err(|_| StoreError::corrupt(column, format!("'{raw}' is not an ISO date")))
}

/// Reads an optional TEXT date column.
pub(crate) fn opt_date_column(row: &SqliteRow, column: &str) -> StoreResult<Option<NaiveDate>> {
    let raw: Option<String> = row.try_get(column)?;
    match raw {
        None => Ok(None),
        Some(raw) => raw
            .parse()
            .map(Some)
            .map_err(|_| StoreError::corrupt(column, format!("'{raw}' is not an ISO date"))),
    }
}

/// Reads a TEXT column holding a UUID.
pub(crate) fn uuid_column(row: &SqliteRow, column: &str) -> StoreResult<uuid::Uuid> {
    let raw: String = row.try_get(column)?;
    raw.parse()
        .map_err(|_| StoreError::corrupt(column, format!("'{raw}' is not a UUID")))
}
