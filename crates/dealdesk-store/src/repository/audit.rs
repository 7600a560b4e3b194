//! # Audit Log Repository
//!
//! Immutable calculation audit records.
//!
//! ## Immutability Contract
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  tax_audit_log is INSERT-ONLY.                                         │
//! │                                                                         │
//! │  This repository deliberately exposes no update or delete method.      │
//! │  A wrong quote is corrected by a NEW calculation whose audit entry     │
//! │  carries `corrects = <old calculation_id>` - the mistake stays on      │
//! │  record next to its correction, which is what an auditor wants to      │
//! │  see.                                                                   │
//! │                                                                         │
//! │  Each entry snapshots the FULL request and result plus the rule and    │
//! │  jurisdiction version ids, so any quote can be explained later even    │
//! │  after rates change.                                                    │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use chrono::{DateTime, Utc};
use sqlx::{Row, SqlitePool};
use tracing::{debug, info};

use crate::error::{StoreError, StoreResult};
use crate::repository::uuid_column;
use dealdesk_core::result::AuditLogEntry;

fn row_to_entry(row: &sqlx::sqlite::SqliteRow) -> StoreResult<AuditLogEntry> {
    let request_json: String = row.try_get("request_json")?;
    let result_json: String = row.try_get("result_json")?;
    let versions_json: String = row.try_get("jurisdiction_versions")?;
    let created_raw: String = row.try_get("created_at")?;
    let created_at: DateTime<Utc> = created_raw
        .parse()
        .map_err(|_| StoreError::corrupt("created_at", format!("'{created_raw}' is not a timestamp")))?;

    let corrects: Option<String> = row.try_get("corrects")?;
    let corrects = match corrects {
        None => None,
        Some(raw) => Some(raw.parse().map_err(|_| {
            StoreError::corrupt("corrects", format!("'{raw}' is not a UUID"))
        })?),
    };

    Ok(AuditLogEntry {
        calculation_id: uuid_column(row, "calculation_id")?,
        request: serde_json::from_str(&request_json)?,
        result: serde_json::from_str(&result_json)?,
        rule_version: uuid_column(row, "rule_version")?,
        jurisdiction_versions: serde_json::from_str(&versions_json)?,
        created_at,
        deal_id: row.try_get("deal_id")?,
        actor: row.try_get("actor")?,
        corrects,
    })
}

/// Repository for the immutable audit log.
#[derive(Debug, Clone)]
pub struct AuditRepository {
    pool: SqlitePool,
}

impl AuditRepository {
    /// Creates a new AuditRepository.
    pub fn new(pool: SqlitePool) -> Self {
        AuditRepository { pool }
    }

    /// Inserts one audit entry. Fails on a duplicate calculation_id -
    /// an entry is written exactly once.
    pub async fn insert(&self, entry: &AuditLogEntry) -> StoreResult<()> {
        info!(
            calculation_id = %entry.calculation_id,
            deal_id = ?entry.deal_id,
            total = %entry.result.total_tax,
            "Recording tax calculation"
        );

        sqlx::query(
            r#"
            INSERT INTO tax_audit_log
                (calculation_id, deal_id, actor, corrects,
                 request_json, result_json, rule_version, jurisdiction_versions,
                 created_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(entry.calculation_id.to_string())
        .bind(entry.deal_id.as_deref())
        .bind(entry.actor.as_deref())
        .bind(entry.corrects.map(|id| id.to_string()))
        .bind(serde_json::to_string(&entry.request)?)
        .bind(serde_json::to_string(&entry.result)?)
        .bind(entry.rule_version.to_string())
        .bind(serde_json::to_string(&entry.jurisdiction_versions)?)
        // Fixed-width timestamp so ORDER BY created_at is stable
        .bind(entry.created_at.to_rfc3339_opts(chrono::SecondsFormat::Micros, true))
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Fetches one entry by calculation id.
    pub async fn get(&self, calculation_id: uuid::Uuid) -> StoreResult<AuditLogEntry> {
        let row = sqlx::query("SELECT * FROM tax_audit_log WHERE calculation_id = ?")
            .bind(calculation_id.to_string())
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| StoreError::not_found("AuditLogEntry", calculation_id.to_string()))?;
        row_to_entry(&row)
    }

    /// Every calculation recorded for a deal, oldest first. The history
    /// includes corrected quotes - that is the point.
    pub async fn list_for_deal(&self, deal_id: &str) -> StoreResult<Vec<AuditLogEntry>> {
        debug!(deal_id, "Listing audit entries for deal");

        let rows = sqlx::query(
            "SELECT * FROM tax_audit_log WHERE deal_id = ? ORDER BY created_at ASC",
        )
        .bind(deal_id)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(row_to_entry).collect()
    }
}

// =============================================================================
// Integration Tests
// =============================================================================
