//! Query history
//!
//! Bounded, newest-last log of handled requests for the history endpoint.

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::Serialize;
use std::collections::VecDeque;
use uuid::Uuid;

pub const DEFAULT_HISTORY_CAPACITY: usize = 100;

#[derive(Debug, Clone, Serialize)]
pub struct QueryLogEntry {
    pub id: Uuid,
    pub timestamp: DateTime<Utc>,
    pub question: String,
    pub intent: Option<String>,
    pub sql: Option<String>,
    pub rows_returned: usize,
    pub repaired: bool,
    pub success: bool,
    pub error: Option<String>,
    pub elapsed_ms: u64,
}

impl QueryLogEntry {
    pub fn new(question: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            timestamp: Utc::now(),
            question: question.into(),
            intent: None,
            sql: None,
            rows_returned: 0,
            repaired: false,
            success: false,
            error: None,
            elapsed_ms: 0,
        }
    }
}

pub struct QueryHistory {
    capacity: usize,
    entries: Mutex<VecDeque<QueryLogEntry>>,
}

impl Default for QueryHistory {
    fn default() -> Self {
        Self::new(DEFAULT_HISTORY_CAPACITY)
    }
}

impl QueryHistory {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            entries: Mutex::new(VecDeque::with_capacity(capacity)),
        }
    }

    /// Append an entry, dropping the oldest when full.
    pub fn record(&self, entry: QueryLogEntry) {
        let mut entries = self.entries.lock();
        if entries.len() == self.capacity {
            entries.pop_front();
        }
        entries.push_back(entry);
    }

    /// Up to `limit` entries, newest first.
    pub fn recent(&self, limit: usize) -> Vec<QueryLogEntry> {
        self.entries.lock().iter().rev().take(limit).cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
