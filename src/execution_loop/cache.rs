//! Query result cache
//!
//! Keyed by gate-normalized SQL text. Entries live for the life of the
//! process; there is no eviction. Concurrent requests for the same key
//! share one in-flight fetch, and a failed fetch leaves no entry behind.

use crate::db::ResultSet;
use crate::error::Result;
use dashmap::DashMap;
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::OnceCell;

#[derive(Default)]
pub struct QueryCache {
    entries: DashMap<String, Arc<OnceCell<Arc<ResultSet>>>>,
}

/// Where a cached lookup's rows came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheOutcome {
    Hit,
    Miss,
}

impl QueryCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, sql: &str) -> Option<Arc<ResultSet>> {
        self.entries.get(sql).and_then(|cell| cell.value().get().cloned())
    }

    /// Store a result. An existing entry for the same SQL is replaced.
    pub fn insert(&self, sql: impl Into<String>, result: ResultSet) {
        let cell = OnceCell::new_with(Some(Arc::new(result)));
        self.entries.insert(sql.into(), Arc::new(cell));
    }

    /// Return the cached rows for `sql`, running `fetch` on a miss.
    pub async fn get_or_fetch<F, Fut>(&self, sql: &str, fetch: F) -> Result<(Arc<ResultSet>, CacheOutcome)>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<ResultSet>>,
    {
        // Clone the cell out so no shard lock is held across the await.
        let cell = Arc::clone(self.entries.entry(sql.to_string()).or_default().value());
        if let Some(result) = cell.get() {
            return Ok((Arc::clone(result), CacheOutcome::Hit));
        }

        let fetched = AtomicBool::new(false);
        let fetched_ref = &fetched;
        let result = cell
            .get_or_try_init(move || async move {
                fetched_ref.store(true, Ordering::SeqCst);
                fetch().await.map(Arc::new)
            })
            .await?;

        let outcome = if fetched.load(Ordering::SeqCst) {
            CacheOutcome::Miss
        } else {
            CacheOutcome::Hit
        };
        Ok((Arc::clone(result), outcome))
    }

    /// Number of populated entries.
    pub fn len(&self) -> usize {
        self.entries
            .iter()
            .filter(|entry| entry.value().initialized())
            .count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        self.entries.clear();
    }
}
