use std::sync::Arc;

use tracing::debug;

use skyfare_core::models::{CachedSearchResult, Flight};
use skyfare_store::LocalStore;

use crate::SyncResult;

/// Memoizes filtered search results in the local store's search-cache
/// collection with a bounded time-to-live. Entries are immutable once
/// written; expiry is evaluated at read time, so a lookup racing a purge
/// still treats an expired entry as a miss.
pub struct SearchCache {
    store: Arc<LocalStore>,
    ttl: chrono::Duration,
}

impl SearchCache {
    pub fn new(store: Arc<LocalStore>, ttl_seconds: u64) -> Self {
        Self {
            store,
            ttl: chrono::Duration::seconds(ttl_seconds as i64),
        }
    }

    /// A hit only when a stored entry for this canonical query has not yet
    /// expired; anything else is a miss.
    pub async fn lookup(&self, query: &str) -> SyncResult<Option<Vec<Flight>>> {
        let hit = self.store.search_result(query).await?;
        if let Some(entry) = &hit {
            debug!(query, captured_at = %entry.captured_at, "search cache hit");
        }
        Ok(hit.map(|entry| entry.flights))
    }

    /// Capture a fresh result. A later capture for the same query wins.
    pub async fn store(&self, query: &str, flights: Vec<Flight>) -> SyncResult<()> {
        let entry = CachedSearchResult::new(query.to_string(), flights, self.ttl);
        self.store.put_search_result(&entry).await?;
        Ok(())
    }

    /// Physically remove expired entries; safe concurrently with lookups.
    pub async fn purge_expired(&self) -> SyncResult<u64> {
        let removed = self.store.purge_expired_results().await?;
        if removed > 0 {
            debug!(removed, "purged expired search results");
        }
        Ok(removed)
    }
}
