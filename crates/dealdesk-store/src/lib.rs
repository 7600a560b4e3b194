//! # dealdesk-store: Storage Layer for the Deal Desk Tax Engine
//!
//! This crate provides database access for the tax engine. It uses
//! SQLite for local storage with sqlx for async operations.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                     Deal Desk Data Flow                                 │
//! │                                                                         │
//! │  dealdesk-engine quote pipeline                                        │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                  dealdesk-store (THIS CRATE)                    │   │
//! │  │                                                                 │   │
//! │  │   ┌───────────────┐   ┌────────────────┐   ┌──────────────┐   │   │
//! │  │   │     Store     │   │  Repositories  │   │  Migrations  │   │   │
//! │  │   │   (pool.rs)   │   │ jurisdiction   │   │  (embedded)  │   │   │
//! │  │   │               │   │ state_rule     │   │              │   │   │
//! │  │   │ SqlitePool    │◄──│ audit          │   │ 001_init.sql │   │   │
//! │  │   │ WAL mode      │   │                │   │              │   │   │
//! │  │   └───────────────┘   └────────────────┘   └──────────────┘   │   │
//! │  │                                                                 │   │
//! │  │   ┌─────────────────────────────────────────────────────────┐  │   │
//! │  │   │ SnapshotCache: Arc<RateTable> / Arc<RuleTable>,         │  │   │
//! │  │   │ TTL read-through, atomic swap on refresh                │  │   │
//! │  │   └─────────────────────────────────────────────────────────┘  │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  SQLite Database (dealdesk.db)                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Module Organization
//!
//! - [`pool`] - Connection pool creation and configuration
//! - [`migrations`] - Embedded database migrations
//! - [`cache`] - Rate/rule snapshot cache with atomic refresh
//! - [`error`] - Storage error types
//! - [`repository`] - Repository implementations
//!
//! ## Usage
//!
//! ```rust,ignore
//! use dealdesk_store::{Store, StoreConfig};
//!
//! let store = Store::new(StoreConfig::new("path/to/dealdesk.db")).await?;
//! let rates = store.jurisdictions().load_rate_table().await?;
//! let rules = store.state_rules().load_rule_table().await?;
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod cache;
pub mod error;
pub mod migrations;
pub mod pool;
pub mod repository;

// =============================================================================
// Re-exports
// =============================================================================

pub use cache::{SnapshotCache, DEFAULT_SNAPSHOT_TTL};
pub use error::{StoreError, StoreResult};
pub use pool::{Store, StoreConfig};

// Repository re-exports for convenience
pub use repository::audit::AuditRepository;
pub use repository::jurisdiction::JurisdictionRepository;
pub use repository::state_rule::StateRuleRepository;
