//! # State Rule Repository
//!
//! Versioned per-state taxability policy rows.
//!
//! ## Storage Shape
//! The full policy struct is stored as JSON in the `policy` column -
//! the set of policy axes grows over time and a column per flag would
//! mean a migration per flag. The columns that drive queries
//! (state_code, effective_date, end_date) are first-class and
//! AUTHORITATIVE: supersede closes the end_date column without touching
//! the JSON, so loads always take versioning fields from the columns.

use chrono::Utc;
use sqlx::{Row, SqlitePool};
use tracing::debug;

use crate::error::{StoreError, StoreResult};
use crate::repository::{date_column, opt_date_column, uuid_column};
use dealdesk_core::rules::{RuleTable, StateRule};

fn row_to_rule(row: &sqlx::sqlite::SqliteRow) -> StoreResult<StateRule> {
    let policy: String = row.try_get("policy")?;
    let mut rule: StateRule = serde_json::from_str(&policy)?;
    // Versioning columns are authoritative over the JSON snapshot
    rule.version = uuid_column(row, "id")?;
    rule.state_code = row.try_get("state_code")?;
    rule.effective_date = date_column(row, "effective_date")?;
    rule.end_date = opt_date_column(row, "end_date")?;
    Ok(rule)
}

/// Repository for versioned state rule rows.
#[derive(Debug, Clone)]
pub struct StateRuleRepository {
    pool: SqlitePool,
}

impl StateRuleRepository {
    /// Creates a new StateRuleRepository.
    pub fn new(pool: SqlitePool) -> Self {
        StateRuleRepository { pool }
    }

    /// Inserts a new rule version.
    pub async fn insert(&self, rule: &StateRule) -> StoreResult<()> {
        debug!(state = %rule.state_code, version = %rule.version, "Inserting state rule");

        sqlx::query(
            r#"
            INSERT INTO state_rules
                (id, state_code, policy, effective_date, end_date, created_at)
            VALUES (?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(rule.version.to_string())
        .bind(rule.state_code.to_uppercase())
        .bind(serde_json::to_string(rule)?)
        .bind(rule.effective_date.to_string())
        .bind(rule.end_date.map(|d| d.to_string()))
        .bind(Utc::now().to_rfc3339())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Supersedes an existing rule version: closes its end date and
    /// inserts the replacement, atomically.
    pub async fn supersede(&self, old_version: uuid::Uuid, replacement: &StateRule) -> StoreResult<()> {
        debug!(old = %old_version, new = %replacement.version, "Superseding state rule");

        let mut tx = self.pool.begin().await?;

        let closed = sqlx::query(
            "UPDATE state_rules SET end_date = ? WHERE id = ? AND end_date IS NULL",
        )
        .bind(replacement.effective_date.to_string())
        .bind(old_version.to_string())
        .execute(&mut *tx)
        .await?;

        if closed.rows_affected() == 0 {
            return Err(StoreError::not_found("StateRule", old_version.to_string()));
        }

        sqlx::query(
            r#"
            INSERT INTO state_rules
                (id, state_code, policy, effective_date, end_date, created_at)
            VALUES (?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(replacement.version.to_string())
        .bind(replacement.state_code.to_uppercase())
        .bind(serde_json::to_string(replacement)?)
        .bind(replacement.effective_date.to_string())
        .bind(replacement.end_date.map(|d| d.to_string()))
        .bind(Utc::now().to_rfc3339())
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(())
    }

    /// Fetches one rule by version id.
    pub async fn get(&self, version: uuid::Uuid) -> StoreResult<StateRule> {
        let row = sqlx::query("SELECT * FROM state_rules WHERE id = ?")
            .bind(version.to_string())
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| StoreError::not_found("StateRule", version.to_string()))?;
        row_to_rule(&row)
    }

    /// Loads every rule version into an immutable [`RuleTable`]
    /// snapshot. Effective-date filtering happens at lookup time.
    pub async fn load_rule_table(&self) -> StoreResult<RuleTable> {
        let rows = sqlx::query("SELECT * FROM state_rules")
            .fetch_all(&self.pool)
            .await?;

        let rules = rows
            .iter()
            .map(row_to_rule)
            .collect::<StoreResult<Vec<_>>>()?;

        debug!(rules = rules.len(), "Loaded rule table snapshot");
        Ok(RuleTable::new(rules))
    }
}

// =============================================================================
// Integration Tests
// =============================================================================
