// Copyright 2025-2026 CloudSnooze Contributors
// SPDX-License-Identifier: Apache-2.0

//! Rolling in-memory store of snooze decisions.
//!
//! The socket protocol's HISTORY shape is fixed; the backing store is an
//! extension point. This implementation keeps a bounded ring in memory, so
//! a fresh daemon reports an empty history.

use std::collections::VecDeque;

use parking_lot::RwLock;

use crate::types::SnoozeEvent;

/// Default ring capacity.
pub const DEFAULT_CAPACITY: usize = 64;

/// Thread-safe rolling event store.
pub struct HistoryStore {
    inner: RwLock<Ring>,
}

struct Ring {
    events: VecDeque<SnoozeEvent>,
    capacity: usize,
}

impl HistoryStore {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            inner: RwLock::new(Ring {
                events: VecDeque::with_capacity(capacity),
                capacity,
            }),
        }
    }

    /// Record one decision, evicting the oldest past capacity.
    pub fn record(&self, event: SnoozeEvent) {
        let mut ring = self.inner.write();
        ring.events.push_back(event);
        while ring.events.len() > ring.capacity {
            ring.events.pop_front();
        }
    }

    /// Chronologically ordered events, oldest first, optionally bounded by
    /// `since` (epoch seconds) and truncated to the `limit` most recent.
    pub fn query(&self, limit: usize, since: Option<u64>) -> Vec<SnoozeEvent> {
        let ring = self.inner.read();
        let filtered: Vec<SnoozeEvent> = ring
            .events
            .iter()
            .filter(|e| since.map_or(true, |s| e.timestamp >= s))
            .cloned()
            .collect();
        let skip = filtered.len().saturating_sub(limit);
        filtered.into_iter().skip(skip).collect()
    }

    pub fn len(&self) -> usize {
        self.inner.read().events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.read().events.is_empty()
    }
}

impl Default for HistoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::SystemMetrics;

    fn event(timestamp: u64) -> SnoozeEvent {
        SnoozeEvent {
            timestamp,
            reason: "idle for 1800s below thresholds".into(),
            metrics_snapshot: SystemMetrics::default(),
            instance_id: "i-0abc".into(),
        }
    }

    #[test]
    fn test_empty_store() {
        let store = HistoryStore::new();
        assert!(store.is_empty());
        assert!(store.query(10, None).is_empty());
    }

    #[test]
    fn test_record_and_query_in_order() {
        let store = HistoryStore::new();
        store.record(event(100));
        store.record(event(200));
        store.record(event(300));

        let events = store.query(10, None);
        let stamps: Vec<u64> = events.iter().map(|e| e.timestamp).collect();
        assert_eq!(stamps, vec![100, 200, 300]);
    }

    #[test]
    fn test_limit_keeps_most_recent() {
        let store = HistoryStore::new();
        for t in [100, 200, 300, 400] {
            store.record(event(t));
        }
        let events = store.query(2, None);
        let stamps: Vec<u64> = events.iter().map(|e| e.timestamp).collect();
        assert_eq!(stamps, vec![300, 400]);
    }

    #[test]
    fn test_since_filter() {
        let store = HistoryStore::new();
        for t in [100, 200, 300] {
            store.record(event(t));
        }
        let events = store.query(10, Some(200));
        let stamps: Vec<u64> = events.iter().map(|e| e.timestamp).collect();
        assert_eq!(stamps, vec![200, 300]);
    }

    #[test]
    fn test_capacity_evicts_oldest() {
        let store = HistoryStore::with_capacity(2);
        for t in [100, 200, 300] {
            store.record(event(t));
        }
        assert_eq!(store.len(), 2);
        let events = store.query(10, None);
        assert_eq!(events[0].timestamp, 200);
    }
}
