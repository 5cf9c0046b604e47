//!
//! Expiring idempotency ledger keyed by inbound message ID
//!
//! Providers retry callbacks they think were not acknowledged. The ledger
//! remembers every message ID it has seen for a fixed retention window so a
//! retried delivery is dropped instead of being processed twice.
//!

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::HashMap;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::{debug, trace};

use crate::types::ExternalMessageId;

/// Summary of the ledger contents
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct LedgerStats {
    /// Live entries
    pub count: usize,

    /// First-seen time of the oldest live entry
    pub oldest: Option<DateTime<Utc>>,

    /// First-seen time of the newest live entry
    pub newest: Option<DateTime<Utc>>,
}

/// Idempotency ledger
///
/// `unmark` is a compensating action only: callers that marked an ID and then
/// failed remove the mark so the provider's retry is processed.
#[async_trait]
pub trait Deduplicator: Send + Sync {
    /// Whether `id` was marked within the retention window
    async fn is_processed(&self, id: &ExternalMessageId) -> bool;

    /// Mark `id` as processed
    async fn mark(&self, id: &ExternalMessageId);

    /// Remove the mark on `id`
    async fn unmark(&self, id: &ExternalMessageId);

    /// Check and mark in one critical section. Returns `true` when `id` was
    /// not seen before and is now marked, `false` for a duplicate.
    async fn check_and_mark(&self, id: &ExternalMessageId) -> bool;

    /// Ledger statistics
    async fn stats(&self) -> LedgerStats;
}

struct LedgerEntry {
    first_seen: Instant,
    first_seen_at: DateTime<Utc>,
}

/// Process-wide in-memory ledger with lazy TTL eviction
///
/// One mutex covers read, eviction and write, so two deliveries of the same
/// ID can never both observe "not processed".
pub struct InMemoryDeduplicator {
    ttl: Duration,
    entries: Mutex<HashMap<String, LedgerEntry>>,
}

impl InMemoryDeduplicator {
    /// Create a ledger with the given retention window
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            entries: Mutex::new(HashMap::new()),
        }
    }

    /// Retention window
    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    fn evict_expired(&self, entries: &mut HashMap<String, LedgerEntry>) {
        let now = Instant::now();
        let before = entries.len();
        entries.retain(|_, entry| now.duration_since(entry.first_seen) < self.ttl);
        let evicted = before - entries.len();
        if evicted > 0 {
            trace!(evicted, remaining = entries.len(), "evicted expired ledger entries");
        }
    }

    fn insert(entries: &mut HashMap<String, LedgerEntry>, id: &ExternalMessageId) {
        entries.insert(
            id.0.clone(),
            LedgerEntry {
                first_seen: Instant::now(),
                first_seen_at: Utc::now(),
            },
        );
    }
}

impl Default for InMemoryDeduplicator {
    fn default() -> Self {
        Self::new(Duration::from_secs(24 * 60 * 60))
    }
}

#[async_trait]
impl Deduplicator for InMemoryDeduplicator {
    async fn is_processed(&self, id: &ExternalMessageId) -> bool {
        let mut entries = self.entries.lock().await;
        self.evict_expired(&mut entries);
        entries.contains_key(&id.0)
    }

    async fn mark(&self, id: &ExternalMessageId) {
        let mut entries = self.entries.lock().await;
        self.evict_expired(&mut entries);
        if !entries.contains_key(&id.0) {
            Self::insert(&mut entries, id);
        }
    }

    async fn unmark(&self, id: &ExternalMessageId) {
        let mut entries = self.entries.lock().await;
        if entries.remove(&id.0).is_some() {
            debug!(external_id = %id, "removed ledger mark");
        }
    }

    async fn check_and_mark(&self, id: &ExternalMessageId) -> bool {
        let mut entries = self.entries.lock().await;
        self.evict_expired(&mut entries);
        if entries.contains_key(&id.0) {
            return false;
        }
        Self::insert(&mut entries, id);
        true
    }

    async fn stats(&self) -> LedgerStats {
        let mut entries = self.entries.lock().await;
        self.evict_expired(&mut entries);
        LedgerStats {
            count: entries.len(),
            oldest: entries.values().map(|e| e.first_seen_at).min(),
            newest: entries.values().map(|e| e.first_seen_at).max(),
        }
    }
}
