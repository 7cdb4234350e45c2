//! Per-device RTT sample history
//!
//! Stores one `(sequence, rtt)` series per device address for charting
//! and post-run analysis. Each series is capped; the oldest samples are
//! dropped first so a long continuous run cannot grow without bound.

use std::collections::{HashMap, VecDeque};
use std::sync::{Mutex, PoisonError};

use crate::MAX_SAMPLES_PER_DEVICE;

/// One matched response's measurement
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RttSample {
    /// Sequence the device answered
    pub sequence: u16,
    /// Measured round-trip time in milliseconds
    pub rtt_ms: f64,
}

/// Thread-safe map of device address to bounded RTT series
#[derive(Debug, Default)]
pub struct SampleStore {
    series: Mutex<HashMap<String, VecDeque<RttSample>>>,
}

impl SampleStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a sample for an address, evicting the oldest past the cap
    pub fn record(&self, address: &str, sequence: u16, rtt_ms: f64) {
        let mut series = self.lock();
        let samples = series.entry(address.to_string()).or_default();
        if samples.len() >= MAX_SAMPLES_PER_DEVICE {
            samples.pop_front();
        }
        samples.push_back(RttSample { sequence, rtt_ms });
    }

    /// Copy of one address's series, oldest first
    pub fn samples(&self, address: &str) -> Vec<RttSample> {
        self.lock()
            .get(address)
            .map(|s| s.iter().copied().collect())
            .unwrap_or_default()
    }

    /// Every address with at least one sample, sorted
    pub fn addresses(&self) -> Vec<String> {
        let mut addresses: Vec<String> = self.lock().keys().cloned().collect();
        addresses.sort();
        addresses
    }

    /// Drop all series. Used at run start.
    pub fn reset(&self) {
        self.lock().clear();
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, VecDeque<RttSample>>> {
        self.series.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_and_read_back() {
        let store = SampleStore::new();

        store.record("10.0.0.1", 0, 1.5);
        store.record("10.0.0.1", 1, 2.5);
        store.record("10.0.0.2", 0, 9.0);

        let samples = store.samples("10.0.0.1");
        assert_eq!(samples.len(), 2);
        assert_eq!(samples[0].sequence, 0);
        assert_eq!(samples[1].rtt_ms, 2.5);

        assert_eq!(
            store.addresses(),
            vec!["10.0.0.1".to_string(), "10.0.0.2".to_string()]
        );
    }

    #[test]
    fn test_unknown_address_is_empty() {
        let store = SampleStore::new();
        assert!(store.samples("10.0.0.9").is_empty());
    }

    #[test]
    fn test_cap_drops_oldest_first() {
        let store = SampleStore::new();

        for i in 0..(MAX_SAMPLES_PER_DEVICE + 10) {
            store.record("10.0.0.1", (i % 65536) as u16, i as f64);
        }

        let samples = store.samples("10.0.0.1");
        assert_eq!(samples.len(), MAX_SAMPLES_PER_DEVICE);
        // The first 10 samples were evicted
        assert_eq!(samples[0].rtt_ms, 10.0);
    }

    #[test]
    fn test_reset() {
        let store = SampleStore::new();
        store.record("10.0.0.1", 0, 1.0);

        store.reset();

        assert!(store.addresses().is_empty());
    }
}
