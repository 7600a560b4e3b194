//! # Snapshot Cache
//!
//! In-memory rate and rule table snapshots with atomic refresh.
//!
//! ## Why Snapshots
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  A quote must be computed against ONE consistent view of the data.     │
//! │                                                                         │
//! │       quote A ──► Arc<RateTable> #1 ─┐                                 │
//! │       quote B ──► Arc<RateTable> #1 ─┤  both finish on snapshot #1     │
//! │                                      │                                  │
//! │       refresh ──► build #2, swap ────┘  (atomic Arc swap)              │
//! │                                                                         │
//! │       quote C ──► Arc<RateTable> #2     new quotes see #2              │
//! │                                                                         │
//! │  A refresh mid-quote can never mix old local rates with new state      │
//! │  rates: the running quote holds its Arc until it finishes.             │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## TTL
//! Reads go through the cache; a read that finds the snapshot older
//! than the TTL reloads from the store first. Rate data changes a few
//! times a year, so the default TTL is generous.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::RwLock;
use tracing::{debug, info};

use crate::error::StoreResult;
use crate::pool::Store;
use dealdesk_core::jurisdiction::RateTable;
use dealdesk_core::rules::RuleTable;

/// Default snapshot time-to-live: 15 minutes.
pub const DEFAULT_SNAPSHOT_TTL: Duration = Duration::from_secs(15 * 60);

struct Snapshots {
    rates: Arc<RateTable>,
    rules: Arc<RuleTable>,
    loaded_at: Instant,
}

/// Read-through cache over the store's rate and rule tables.
///
/// Cloneable and cheap to share; all clones see the same snapshots.
#[derive(Clone)]
pub struct SnapshotCache {
    store: Store,
    ttl: Duration,
    inner: Arc<RwLock<Option<Snapshots>>>,
}

impl SnapshotCache {
    /// Creates an empty cache; the first read populates it.
    pub fn new(store: Store, ttl: Duration) -> Self {
        SnapshotCache {
            store,
            ttl,
            inner: Arc::new(RwLock::new(None)),
        }
    }

    /// Creates a cache with the default TTL.
    pub fn with_default_ttl(store: Store) -> Self {
        SnapshotCache::new(store, DEFAULT_SNAPSHOT_TTL)
    }

    /// Returns the current snapshots, loading or reloading from the
    /// store when empty or past the TTL.
    pub async fn snapshots(&self) -> StoreResult<(Arc<RateTable>, Arc<RuleTable>)> {
        {
            let guard = self.inner.read().await;
            if let Some(snap) = guard.as_ref() {
                if snap.loaded_at.elapsed() < self.ttl {
                    return Ok((Arc::clone(&snap.rates), Arc::clone(&snap.rules)));
                }
                debug!("Snapshot past TTL, reloading");
            }
        }
        self.refresh().await
    }

    /// Rebuilds both snapshots from the store and swaps them in
    /// atomically. Call after seeding or superseding rows to make the
    /// change visible without waiting out the TTL.
    pub async fn refresh(&self) -> StoreResult<(Arc<RateTable>, Arc<RuleTable>)> {
        // Load outside the lock; readers keep serving the old snapshot
        let rates = Arc::new(self.store.jurisdictions().load_rate_table().await?);
        let rules = Arc::new(self.store.state_rules().load_rule_table().await?);

        let mut guard = self.inner.write().await;
        *guard = Some(Snapshots {
            rates: Arc::clone(&rates),
            rules: Arc::clone(&rules),
            loaded_at: Instant::now(),
        });

        info!("Rate and rule snapshots refreshed");
        Ok((rates, rules))
    }
}

// =============================================================================
// Integration Tests
// =============================================================================
