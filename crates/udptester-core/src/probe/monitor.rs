//! Per-cycle timeout detection
//!
//! Tracks which devices answered the outstanding sequence within the
//! current cycle and, at the next cycle boundary, penalizes every enabled
//! device that stayed silent. The sweep for cycle N runs before the probe
//! for cycle N+1 goes out, so a response arriving after the next probe is
//! judged by sequence comparison (mismatch), never as on-time.

use std::collections::HashSet;
use std::sync::{Mutex, PoisonError};

use crate::events::{EventSink, ProbeEvent};

use super::registry::DeviceRegistry;

/// Tracks the responded set for the current cycle and applies timeout
/// penalties at cycle boundaries
#[derive(Debug, Default)]
pub struct CycleMonitor {
    responded: Mutex<HashSet<String>>,
}

impl CycleMonitor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record that a device answered the current sequence. Returns `true`
    /// for the first response of the cycle; the set insert is the single
    /// atomic first-responder transition, so two near-simultaneous
    /// duplicates cannot both claim to be first.
    pub fn mark_responded(&self, identity_key: &str) -> bool {
        self.responded
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(identity_key.to_string())
    }

    /// Number of devices that answered so far this cycle
    pub fn responded_count(&self) -> usize {
        self.responded
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Apply timeout penalties for the cycle that just ended, then clear
    /// the responded set unconditionally so the next cycle starts clean.
    ///
    /// Every enabled device absent from the responded set gets its error
    /// count incremented and its last response marked timed out. Disabled
    /// devices are skipped entirely.
    pub fn sweep(&self, registry: &DeviceRegistry, events: &dyn EventSink) {
        let responded = std::mem::take(
            &mut *self
                .responded
                .lock()
                .unwrap_or_else(PoisonError::into_inner),
        );

        for record in registry.snapshot_enabled() {
            if responded.contains(&record.identity_key) {
                continue;
            }
            if let Some(error_count) = registry.increment_error(&record.identity_key) {
                tracing::warn!(
                    key = %record.identity_key,
                    address = %record.secondary_address,
                    error_count,
                    "device missed cycle"
                );
                events.emit(&ProbeEvent::DeviceTimedOut {
                    key: record.identity_key.clone(),
                    error_count,
                });
            }
        }
    }

    /// Discard the responded set without sweeping. Used at session restart.
    pub fn clear(&self) {
        self.responded
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::NullSink;
    use crate::probe::registry::ResponseTime;
    use std::sync::Mutex as StdMutex;

    struct RecordingSink(StdMutex<Vec<ProbeEvent>>);

    impl RecordingSink {
        fn new() -> Self {
            Self(StdMutex::new(Vec::new()))
        }
        fn events(&self) -> Vec<ProbeEvent> {
            self.0.lock().unwrap().clone()
        }
    }

    impl EventSink for RecordingSink {
        fn emit(&self, event: &ProbeEvent) {
            self.0.lock().unwrap().push(event.clone());
        }
    }

    #[test]
    fn test_first_response_wins_once() {
        let monitor = CycleMonitor::new();

        assert!(monitor.mark_responded("AA:BB"));
        assert!(!monitor.mark_responded("AA:BB"), "duplicate is not first");
        assert!(monitor.mark_responded("CC:DD"));
    }

    #[test]
    fn test_sweep_penalizes_silent_enabled_devices() {
        let registry = DeviceRegistry::new();
        registry.upsert("AA:BB", "10.0.0.1");
        registry.upsert("CC:DD", "10.0.0.2");
        let monitor = CycleMonitor::new();
        let sink = RecordingSink::new();

        monitor.mark_responded("AA:BB");
        monitor.sweep(&registry, &sink);

        let silent = registry.get("CC:DD").unwrap();
        assert_eq!(silent.error_count, 1);
        assert_eq!(silent.last_response, ResponseTime::TimedOut);

        let answered = registry.get("AA:BB").unwrap();
        assert_eq!(answered.error_count, 0);

        assert_eq!(
            sink.events(),
            vec![ProbeEvent::DeviceTimedOut {
                key: "CC:DD".to_string(),
                error_count: 1,
            }]
        );
    }

    #[test]
    fn test_sweep_skips_disabled_devices() {
        let registry = DeviceRegistry::new();
        registry.upsert("AA:BB", "10.0.0.1");
        registry.set_enabled("AA:BB", false);
        let monitor = CycleMonitor::new();

        monitor.sweep(&registry, &NullSink);

        let record = registry.get("AA:BB").unwrap();
        assert_eq!(record.error_count, 0);
        assert_eq!(record.last_response, ResponseTime::NotMeasured);
    }

    #[test]
    fn test_sweep_clears_responded_set_unconditionally() {
        let registry = DeviceRegistry::new();
        registry.upsert("AA:BB", "10.0.0.1");
        let monitor = CycleMonitor::new();

        monitor.mark_responded("AA:BB");
        monitor.sweep(&registry, &NullSink);

        // AA:BB answered last cycle but not this one
        monitor.sweep(&registry, &NullSink);
        assert_eq!(registry.get("AA:BB").unwrap().error_count, 1);
    }

    #[test]
    fn test_repeated_sweeps_accumulate_errors() {
        let registry = DeviceRegistry::new();
        registry.upsert("AA:BB", "10.0.0.1");
        let monitor = CycleMonitor::new();

        for _ in 0..3 {
            monitor.sweep(&registry, &NullSink);
        }

        assert_eq!(registry.get("AA:BB").unwrap().error_count, 3);
    }
}
