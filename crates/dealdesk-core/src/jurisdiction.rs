//! # Jurisdiction Resolver
//!
//! Maps a ZIP code (optionally a state hint) to the set of taxing
//! authorities covering it on a given date.
//!
//! ## Resolution Flow
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                      resolve(zip, as_of, hint)                          │
//! │                                                                         │
//! │  "78701", 2026-08-01                                                    │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  local rows covering ZIP, effective at as_of                           │
//! │       │                                                                 │
//! │       ├── found ──► state row + county + city + every overlapping      │
//! │       │             special district (additive)  → RateSource::Table    │
//! │       │                                                                 │
//! │       ├── ZIP unknown, state hint known ──► state rate only            │
//! │       │                                     → RateSource::Fallback      │
//! │       │                                                                 │
//! │       ├── ZIP unknown, no hint ──► UnknownJurisdiction                 │
//! │       │                                                                 │
//! │       └── state itself unknown ──► UnknownState                        │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Effective Dating
//! Jurisdiction rows are append-only: a rate change inserts a new row
//! with a new effective date and closes the old row's end date. Nothing
//! is ever mutated in place, so any historical date can be re-resolved
//! exactly as it stood then.

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use uuid::Uuid;

use crate::error::{TaxError, TaxResult};
use crate::money::TaxRate;

// =============================================================================
// Jurisdiction
// =============================================================================

/// The level of a taxing authority.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JurisdictionLevel {
    State,
    County,
    City,
    SpecialDistrict,
}

impl JurisdictionLevel {
    /// True for the layers that make up the combined local rate.
    #[inline]
    pub fn is_local(&self) -> bool {
        !matches!(self, JurisdictionLevel::State)
    }
}

impl fmt::Display for JurisdictionLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            JurisdictionLevel::State => "state",
            JurisdictionLevel::County => "county",
            JurisdictionLevel::City => "city",
            JurisdictionLevel::SpecialDistrict => "special_district",
        };
        f.write_str(s)
    }
}

/// One taxing authority at one level, for one effective range.
///
/// Immutable once superseded: rate changes add a new row rather than
/// editing this one, which is what makes point-in-time queries and the
/// audit trail trustworthy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Jurisdiction {
    /// Version identifier, referenced by audit entries.
    pub id: Uuid,
    pub level: JurisdictionLevel,
    /// Two-letter state the authority sits in.
    pub state_code: String,
    /// Geography name ("TX", "Travis County", "Austin", "Austin MTA").
    pub name: String,
    pub rate: TaxRate,
    pub effective_date: NaiveDate,
    /// `None` = still in force.
    pub end_date: Option<NaiveDate>,
}

impl Jurisdiction {
    /// Whether this row is in force on the given date.
    pub fn is_effective(&self, as_of: NaiveDate) -> bool {
        if as_of < self.effective_date {
            return false;
        }
        match self.end_date {
            Some(end) => as_of < end,
            None => true,
        }
    }
}

// =============================================================================
// Jurisdiction Set
// =============================================================================

/// Where the resolved rates came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RateSource {
    /// Full layered lookup from the rate table.
    Table,
    /// ZIP not in the data; state rate only. A best-effort quote beats
    /// no quote, so this is an advisory marker, not an error.
    Fallback,
}

/// The layered set of jurisdictions covering one ZIP on one date.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JurisdictionSet {
    pub zip: String,
    pub as_of: NaiveDate,
    pub state: Jurisdiction,
    /// County, city, and every overlapping special district. Overlap is
    /// additive - that is how real combined local rates work.
    pub locals: Vec<Jurisdiction>,
    pub source: RateSource,
}

impl JurisdictionSet {
    /// The state-level rate.
    #[inline]
    pub fn state_rate(&self) -> TaxRate {
        self.state.rate
    }

    /// Sum of all local-layer rates.
    pub fn combined_local_rate(&self) -> TaxRate {
        self.locals.iter().map(|j| j.rate).sum()
    }

    /// State rate plus combined local rate.
    pub fn total_rate(&self) -> TaxRate {
        self.state_rate() + self.combined_local_rate()
    }

    /// Version ids of every row that contributed, for the audit entry.
    pub fn version_ids(&self) -> Vec<Uuid> {
        std::iter::once(self.state.id)
            .chain(self.locals.iter().map(|j| j.id))
            .collect()
    }
}

// =============================================================================
// Rate Table
// =============================================================================

/// Immutable snapshot of all jurisdiction rows.
///
/// Built once from the store, shared behind an `Arc`, and swapped
/// atomically on refresh - readers never observe a half-updated table.
#[derive(Debug, Clone, Default)]
pub struct RateTable {
    /// State-level rows keyed by state code (all versions, filtered by
    /// date at resolve time).
    state_rows: HashMap<String, Vec<Jurisdiction>>,
    /// Local rows keyed by covered ZIP.
    local_rows: HashMap<String, Vec<Jurisdiction>>,
}

impl RateTable {
    /// Builds a snapshot from state-level rows and (zip, row) coverage
    /// pairs. A local row covering n ZIPs appears in n pairs.
    pub fn new(
        state_rows: Vec<Jurisdiction>,
        local_coverage: Vec<(String, Jurisdiction)>,
    ) -> Self {
        let mut table = RateTable::default();
        for row in state_rows {
            table
                .state_rows
                .entry(row.state_code.clone())
                .or_default()
                .push(row);
        }
        for (zip, row) in local_coverage {
            table.local_rows.entry(zip).or_default().push(row);
        }
        table
    }

    /// True when the snapshot holds no rows at all (never seeded).
    pub fn is_empty(&self) -> bool {
        self.state_rows.is_empty() && self.local_rows.is_empty()
    }

    /// The state-level rate for a state on a date, if configured.
    ///
    /// Used by the calculator to cap drive-out tax at the destination
    /// state's own rate.
    pub fn state_rate(&self, state_code: &str, as_of: NaiveDate) -> Option<TaxRate> {
        self.effective_state_row(state_code, as_of).map(|j| j.rate)
    }

    /// Resolves the full jurisdiction set for a ZIP.
    ///
    /// ## Contract
    /// `resolve(zip, as_of, state_hint) -> JurisdictionSet | error`
    ///
    /// - ZIP must be a 5-digit string (`InvalidInput` otherwise)
    /// - Unknown ZIP with a known state hint degrades to a
    ///   state-rate-only set marked [`RateSource::Fallback`]
    /// - Unknown ZIP with no hint → `UnknownJurisdiction`
    /// - State not present in the table at all → `UnknownState`
    pub fn resolve(
        &self,
        zip: &str,
        as_of: NaiveDate,
        state_hint: Option<&str>,
    ) -> TaxResult<JurisdictionSet> {
        validate_zip(zip)?;
        if let Some(hint) = state_hint {
            validate_state_code(hint)?;
        }

        let locals = self.effective_locals(zip, as_of);

        // The state governing the ZIP: taken from the ZIP's own rows
        // when we have them, else from the caller's hint.
        let state_code = match locals.first() {
            Some(row) => row.state_code.clone(),
            None => match state_hint {
                Some(hint) => hint.to_uppercase(),
                None => {
                    return Err(TaxError::UnknownJurisdiction {
                        zip: zip.to_string(),
                    })
                }
            },
        };

        let state = self
            .effective_state_row(&state_code, as_of)
            .cloned()
            .ok_or_else(|| TaxError::UnknownState {
                state: state_code.clone(),
            })?;

        let source = if locals.is_empty() {
            RateSource::Fallback
        } else {
            RateSource::Table
        };

        Ok(JurisdictionSet {
            zip: zip.to_string(),
            as_of,
            state,
            locals,
            source,
        })
    }

    /// Local rows covering a ZIP and effective on the date, at most one
    /// per (level, geography). When superseded rows overlap (data-load
    /// races), the most recently effective row wins.
    fn effective_locals(&self, zip: &str, as_of: NaiveDate) -> Vec<Jurisdiction> {
        let mut picked: HashMap<(JurisdictionLevel, &str), &Jurisdiction> = HashMap::new();
        if let Some(rows) = self.local_rows.get(zip) {
            for row in rows.iter().filter(|r| r.is_effective(as_of)) {
                let key = (row.level, row.name.as_str());
                match picked.get(&key) {
                    Some(existing) if existing.effective_date >= row.effective_date => {}
                    _ => {
                        picked.insert(key, row);
                    }
                }
            }
        }
        let mut locals: Vec<Jurisdiction> = picked.into_values().cloned().collect();
        // Deterministic ordering: county, city, then districts by name
        locals.sort_by(|a, b| {
            local_sort_key(a.level)
                .cmp(&local_sort_key(b.level))
                .then_with(|| a.name.cmp(&b.name))
        });
        locals
    }

    fn effective_state_row(&self, state_code: &str, as_of: NaiveDate) -> Option<&Jurisdiction> {
        self.state_rows
            .get(&state_code.to_uppercase())?
            .iter()
            .filter(|r| r.is_effective(as_of))
            .max_by_key(|r| r.effective_date)
    }
}

fn local_sort_key(level: JurisdictionLevel) -> u8 {
    match level {
        JurisdictionLevel::State => 0,
        JurisdictionLevel::County => 1,
        JurisdictionLevel::City => 2,
        JurisdictionLevel::SpecialDistrict => 3,
    }
}

// =============================================================================
// Input Validators
// =============================================================================

/// Validates a 5-digit ZIP string.
pub fn validate_zip(zip: &str) -> TaxResult<()> {
    if zip.len() != 5 || !zip.chars().all(|c| c.is_ascii_digit()) {
        return Err(TaxError::invalid_input(
            "zip",
            format!("'{zip}' is not a 5-digit ZIP code"),
        ));
    }
    Ok(())
}

/// Validates a two-letter state code's shape (existence is checked
/// against the rate table, not a hard-coded list).
pub fn validate_state_code(state: &str) -> TaxResult<()> {
    if state.len() != 2 || !state.chars().all(|c| c.is_ascii_alphabetic()) {
        return Err(TaxError::invalid_input(
            "state",
            format!("'{state}' is not a two-letter state code"),
        ));
    }
    Ok(())
}

/// Convenience constructor used by snapshot builders and tests.
pub fn jurisdiction(
    level: JurisdictionLevel,
    state_code: &str,
    name: &str,
    rate: Decimal,
    effective_date: NaiveDate,
) -> Jurisdiction {
    Jurisdiction {
        id: Uuid::new_v4(),
        level,
        state_code: state_code.to_string(),
        name: name.to_string(),
        rate: TaxRate::from_fraction(rate),
        effective_date,
        end_date: None,
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
