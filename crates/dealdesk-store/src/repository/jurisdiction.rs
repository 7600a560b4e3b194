//! # Jurisdiction Repository
//!
//! Versioned jurisdiction rate rows and their ZIP coverage.
//!
//! ## Append-Only Versioning
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  Rate change for Austin city tax, effective 2025-01-01:                │
//! │                                                                         │
//! │  BEFORE                                                                 │
//! │  ┌──────┬────────┬───────┬────────────┬──────────┐                     │
//! │  │ id=A │ Austin │ 0.75% │ 2019-01-01 │ end=NULL │                     │
//! │  └──────┴────────┴───────┴────────────┴──────────┘                     │
//! │                                                                         │
//! │  supersede(A, new_row effective 2025-01-01)                            │
//! │                                                                         │
//! │  AFTER                                                                  │
//! │  ┌──────┬────────┬───────┬────────────┬────────────────┐               │
//! │  │ id=A │ Austin │ 0.75% │ 2019-01-01 │ end=2025-01-01 │ ← closed      │
//! │  │ id=B │ Austin │ 1.00% │ 2025-01-01 │ end=NULL       │ ← new         │
//! │  └──────┴────────┴───────┴────────────┴────────────────┘               │
//! │                                                                         │
//! │  Rates are NEVER edited in place. Closing an end date is the only      │
//! │  update the table ever sees, so a 2024 deal re-resolves to 0.75%       │
//! │  forever.                                                               │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use chrono::Utc;
use sqlx::{Row, SqlitePool};
use tracing::debug;

use crate::error::{StoreError, StoreResult};
use crate::repository::{date_column, decimal_column, opt_date_column, uuid_column};
use dealdesk_core::jurisdiction::{Jurisdiction, JurisdictionLevel, RateTable};
use dealdesk_core::money::TaxRate;

fn level_to_str(level: JurisdictionLevel) -> &'static str {
    match level {
        JurisdictionLevel::State => "state",
        JurisdictionLevel::County => "county",
        JurisdictionLevel::City => "city",
        JurisdictionLevel::SpecialDistrict => "special_district",
    }
}

fn level_from_str(raw: &str) -> StoreResult<JurisdictionLevel> {
    match raw {
        "state" => Ok(JurisdictionLevel::State),
        "county" => Ok(JurisdictionLevel::County),
        "city" => Ok(JurisdictionLevel::City),
        "special_district" => Ok(JurisdictionLevel::SpecialDistrict),
        other => Err(StoreError::corrupt(
            "level",
            format!("'{other}' is not a jurisdiction level"),
        )),
    }
}

fn row_to_jurisdiction(row: &sqlx::sqlite::SqliteRow) -> StoreResult<Jurisdiction> {
    let level: String = row.try_get("level")?;
    Ok(Jurisdiction {
        id: uuid_column(row, "id")?,
        level: level_from_str(&level)?,
        state_code: row.try_get("state_code")?,
        name: row.try_get("name")?,
        rate: TaxRate::from_fraction(decimal_column(row, "rate")?),
        effective_date: date_column(row, "effective_date")?,
        end_date: opt_date_column(row, "end_date")?,
    })
}

/// Repository for versioned jurisdiction rate rows.
#[derive(Debug, Clone)]
pub struct JurisdictionRepository {
    pool: SqlitePool,
}

impl JurisdictionRepository {
    /// Creates a new JurisdictionRepository.
    pub fn new(pool: SqlitePool) -> Self {
        JurisdictionRepository { pool }
    }

    /// Inserts a new jurisdiction row together with its ZIP coverage,
    /// in one transaction. State-level rows carry no coverage.
    pub async fn insert(&self, row: &Jurisdiction, zips: &[String]) -> StoreResult<()> {
        debug!(
            id = %row.id,
            name = %row.name,
            rate = %row.rate,
            zips = zips.len(),
            "Inserting jurisdiction row"
        );

        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            INSERT INTO jurisdictions
                (id, level, state_code, name, rate, effective_date, end_date, created_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(row.id.to_string())
        .bind(level_to_str(row.level))
        .bind(row.state_code.to_uppercase())
        .bind(&row.name)
        .bind(row.rate.fraction().to_string())
        .bind(row.effective_date.to_string())
        .bind(row.end_date.map(|d| d.to_string()))
        .bind(Utc::now().to_rfc3339())
        .execute(&mut *tx)
        .await?;

        for zip in zips {
            sqlx::query(
                "INSERT INTO jurisdiction_zips (jurisdiction_id, zip) VALUES (?, ?)",
            )
            .bind(row.id.to_string())
            .bind(zip)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(())
    }

    /// Supersedes an existing row: closes its end date and inserts the
    /// replacement, atomically. The replacement's effective date is the
    /// old row's end date.
    pub async fn supersede(
        &self,
        old_id: uuid::Uuid,
        replacement: &Jurisdiction,
        zips: &[String],
    ) -> StoreResult<()> {
        debug!(old = %old_id, new = %replacement.id, "Superseding jurisdiction row");

        let mut tx = self.pool.begin().await?;

        let closed = sqlx::query(
            "UPDATE jurisdictions SET end_date = ? WHERE id = ? AND end_date IS NULL",
        )
        .bind(replacement.effective_date.to_string())
        .bind(old_id.to_string())
        .execute(&mut *tx)
        .await?;

        if closed.rows_affected() == 0 {
            return Err(StoreError::not_found("Jurisdiction", old_id.to_string()));
        }

        sqlx::query(
            r#"
            INSERT INTO jurisdictions
                (id, level, state_code, name, rate, effective_date, end_date, created_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(replacement.id.to_string())
        .bind(level_to_str(replacement.level))
        .bind(replacement.state_code.to_uppercase())
        .bind(&replacement.name)
        .bind(replacement.rate.fraction().to_string())
        .bind(replacement.effective_date.to_string())
        .bind(replacement.end_date.map(|d| d.to_string()))
        .bind(Utc::now().to_rfc3339())
        .execute(&mut *tx)
        .await?;

        for zip in zips {
            sqlx::query(
                "INSERT INTO jurisdiction_zips (jurisdiction_id, zip) VALUES (?, ?)",
            )
            .bind(replacement.id.to_string())
            .bind(zip)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(())
    }

    /// Fetches one row by version id.
    pub async fn get(&self, id: uuid::Uuid) -> StoreResult<Jurisdiction> {
        let row = sqlx::query("SELECT * FROM jurisdictions WHERE id = ?")
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| StoreError::not_found("Jurisdiction", id.to_string()))?;
        row_to_jurisdiction(&row)
    }

    /// Loads every jurisdiction row (all versions) into an immutable
    /// [`RateTable`] snapshot. Effective-date filtering happens at
    /// resolve time, so one snapshot serves any `as_of` date.
    pub async fn load_rate_table(&self) -> StoreResult<RateTable> {
        let state_rows = sqlx::query("SELECT * FROM jurisdictions WHERE level = 'state'")
            .fetch_all(&self.pool)
            .await?
            .iter()
            .map(row_to_jurisdiction)
            .collect::<StoreResult<Vec<_>>>()?;

        let local_rows = sqlx::query(
            r#"
            SELECT z.zip AS zip, j.*
            FROM jurisdictions j
            JOIN jurisdiction_zips z ON z.jurisdiction_id = j.id
            WHERE j.level != 'state'
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        let mut local_coverage = Vec::with_capacity(local_rows.len());
        for row in &local_rows {
            let zip: String = row.try_get("zip")?;
            local_coverage.push((zip, row_to_jurisdiction(row)?));
        }

        debug!(
            states = state_rows.len(),
            coverage = local_coverage.len(),
            "Loaded rate table snapshot"
        );
        Ok(RateTable::new(state_rows, local_coverage))
    }
}

// =============================================================================
// Integration Tests
// =============================================================================
