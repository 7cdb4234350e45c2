//! Sequence-to-timestamp correlation store
//!
//! Maps each in-flight probe sequence to its send instant so the receive
//! path can compute round-trip time. Lookups are non-destructive: a
//! duplicate or late echo for the same sequence must still resolve.
//! Entries older than the retention window are evicted once per cycle to
//! bound memory; a very late echo arriving after eviction simply cannot
//! compute an RTT.

use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};
use std::time::{Duration, Instant};

/// Time-bounded map from probe sequence to send instant
#[derive(Debug, Default)]
pub struct CorrelationStore {
    inflight: Mutex<HashMap<u16, Instant>>,
}

impl CorrelationStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record the send instant for a sequence, overwriting any prior entry.
    /// Sequences repeat every 65535 sends, so overwrite is the correct
    /// behavior for a wrapped counter.
    pub fn record(&self, sequence: u16, sent_at: Instant) {
        self.inflight
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(sequence, sent_at);
    }

    /// Look up the send instant for a sequence without removing it
    pub fn resolve(&self, sequence: u16) -> Option<Instant> {
        self.inflight
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&sequence)
            .copied()
    }

    /// Drop entries older than `retention`. Called once per probe cycle,
    /// not per receive.
    pub fn evict_older_than(&self, retention: Duration) {
        let now = Instant::now();
        self.inflight
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .retain(|_, sent_at| now.duration_since(*sent_at) <= retention);
    }

    /// Drop every entry. Used at session restart.
    pub fn clear(&self) {
        self.inflight
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }

    pub fn len(&self) -> usize {
        self.inflight
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_and_resolve() {
        let store = CorrelationStore::new();
        let now = Instant::now();

        store.record(42, now);
        assert_eq!(store.resolve(42), Some(now));
        assert_eq!(store.resolve(43), None);
    }

    #[test]
    fn test_resolve_is_non_destructive() {
        let store = CorrelationStore::new();
        store.record(7, Instant::now());

        assert!(store.resolve(7).is_some());
        assert!(store.resolve(7).is_some(), "second resolve must still hit");
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_record_overwrites() {
        let store = CorrelationStore::new();
        let first = Instant::now();
        store.record(1, first);

        let later = first + Duration::from_millis(100);
        store.record(1, later);

        assert_eq!(store.resolve(1), Some(later));
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_eviction_window() {
        let store = CorrelationStore::new();
        let now = Instant::now();

        // Entry aged 6s is past the 5s retention; entry aged 4s is not
        let stale = now.checked_sub(Duration::from_secs(6)).unwrap();
        let fresh = now.checked_sub(Duration::from_secs(4)).unwrap();
        store.record(10, stale);
        store.record(11, fresh);

        store.evict_older_than(Duration::from_secs(5));

        assert_eq!(store.resolve(10), None, "6s-old entry must be evicted");
        assert_eq!(store.resolve(11), Some(fresh), "4s-old entry must remain");
    }

    #[test]
    fn test_clear() {
        let store = CorrelationStore::new();
        store.record(1, Instant::now());
        store.record(2, Instant::now());

        store.clear();

        assert!(store.is_empty());
    }
}
