//! Identity-keyed device registry
//!
//! One record per distinct device identity. The registry is mutated
//! concurrently from the receive path (every inbound datagram) and the
//! scheduler path (timeout sweep, counter reset), so all state lives
//! behind an internal mutex and is exposed only through method contracts.
//!
//! Devices are created on first sighting and never silently deleted; the
//! registry only grows within a session.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::{Mutex, PoisonError};

use serde::{Deserialize, Serialize};

use super::codec::{EchoMessage, TelemetryReport};

/// Last observed round-trip result for a device
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub enum ResponseTime {
    /// No measurement yet this session
    #[default]
    NotMeasured,
    /// The device missed a cycle; set by the timeout sweep
    TimedOut,
    /// Last measured RTT in milliseconds
    Millis(f64),
}

impl std::fmt::Display for ResponseTime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ResponseTime::NotMeasured => write!(f, "N/A"),
            ResponseTime::TimedOut => write!(f, "Timeout"),
            ResponseTime::Millis(ms) => write!(f, "{ms:.1}"),
        }
    }
}

/// Which address space keys the registry for a session
///
/// Chosen once at session start and used consistently for both
/// registration and lookup; keys are never mixed within one session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IdentityPolicy {
    /// Key by the MAC token carried in the echo message
    Mac,
    /// Key by the source IP address of the datagram
    Ip,
}

impl IdentityPolicy {
    /// Identity key for an echo response from `source`
    pub fn echo_key(&self, echo: &EchoMessage, source: SocketAddr) -> String {
        match self {
            IdentityPolicy::Mac => echo.identity.clone(),
            IdentityPolicy::Ip => source.ip().to_string(),
        }
    }

    /// Complementary address for an echo: the side of the (identity, ip)
    /// pair that is not the key
    pub fn echo_secondary(&self, echo: &EchoMessage, source: SocketAddr) -> String {
        match self {
            IdentityPolicy::Mac => source.ip().to_string(),
            IdentityPolicy::Ip => echo.identity.clone(),
        }
    }

    /// Identity key for a telemetry report from `source`. Telemetry
    /// carries no MAC, so under MAC keying the numeric device id stands
    /// in as the identity token.
    pub fn telemetry_key(&self, report: &TelemetryReport, source: SocketAddr) -> String {
        match self {
            IdentityPolicy::Mac => report.id.to_string(),
            IdentityPolicy::Ip => source.ip().to_string(),
        }
    }

    /// Complementary address for a telemetry report
    pub fn telemetry_secondary(&self, report: &TelemetryReport, source: SocketAddr) -> String {
        match self {
            IdentityPolicy::Mac => source.ip().to_string(),
            IdentityPolicy::Ip => report.id.to_string(),
        }
    }
}

/// Per-device state and counters
#[derive(Debug, Clone, PartialEq)]
pub struct DeviceRecord {
    /// Primary key, immutable once assigned
    pub identity_key: String,
    /// The complementary address (IP if keyed by MAC, or vice versa);
    /// updated in place when it changes between sightings
    pub secondary_address: String,
    /// Disabled devices are excluded from timeout accounting but keep
    /// their history
    pub enabled: bool,
    /// Missed-cycle count; incremented only by the timeout sweep
    pub error_count: u64,
    /// Stale-sequence count; incremented when an echoed sequence differs
    /// from the outstanding one
    pub mismatch_count: u64,
    /// Duplicate-delivery count; incremented when a second echo arrives
    /// for an already-answered sequence in the same cycle
    pub over_count: u64,
    /// Last RTT observation
    pub last_response: ResponseTime,
    /// Extended telemetry snapshot, present only after a PCIR report
    pub telemetry: Option<TelemetryReport>,
}

impl DeviceRecord {
    fn new(identity_key: &str, secondary_address: &str) -> Self {
        Self {
            identity_key: identity_key.to_string(),
            secondary_address: secondary_address.to_string(),
            enabled: true,
            error_count: 0,
            mismatch_count: 0,
            over_count: 0,
            last_response: ResponseTime::NotMeasured,
            telemetry: None,
        }
    }
}

/// Result of an upsert, so the caller can emit the right event
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertOutcome {
    /// First sighting of this identity
    Discovered,
    /// Known identity answering from a new secondary address
    AddressChanged,
    /// Known identity, nothing changed
    Unchanged,
}

/// Thread-safe registry of known devices
#[derive(Debug, Default)]
pub struct DeviceRegistry {
    devices: Mutex<HashMap<String, DeviceRecord>>,
}

impl DeviceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a record on first sight, or update the secondary address
    /// if it differs from the last sighting
    pub fn upsert(&self, identity_key: &str, secondary_address: &str) -> UpsertOutcome {
        let mut devices = self.lock();
        match devices.get_mut(identity_key) {
            Some(record) => {
                if record.secondary_address != secondary_address {
                    record.secondary_address = secondary_address.to_string();
                    UpsertOutcome::AddressChanged
                } else {
                    UpsertOutcome::Unchanged
                }
            }
            None => {
                devices.insert(
                    identity_key.to_string(),
                    DeviceRecord::new(identity_key, secondary_address),
                );
                UpsertOutcome::Discovered
            }
        }
    }

    /// Increment the missed-cycle counter and mark the device timed out.
    /// Returns the new error count, or `None` for an unknown key.
    pub fn increment_error(&self, identity_key: &str) -> Option<u64> {
        let mut devices = self.lock();
        let record = devices.get_mut(identity_key)?;
        record.error_count += 1;
        record.last_response = ResponseTime::TimedOut;
        Some(record.error_count)
    }

    /// Increment the stale-sequence counter. Ignored for unknown keys.
    pub fn increment_mismatch(&self, identity_key: &str) -> Option<u64> {
        let mut devices = self.lock();
        let record = devices.get_mut(identity_key)?;
        record.mismatch_count += 1;
        Some(record.mismatch_count)
    }

    /// Increment the duplicate-delivery counter. Ignored for unknown keys.
    pub fn increment_over(&self, identity_key: &str) -> Option<u64> {
        let mut devices = self.lock();
        let record = devices.get_mut(identity_key)?;
        record.over_count += 1;
        Some(record.over_count)
    }

    /// Record a measured round-trip time
    pub fn record_response_time(&self, identity_key: &str, rtt_ms: f64) {
        if let Some(record) = self.lock().get_mut(identity_key) {
            record.last_response = ResponseTime::Millis(rtt_ms);
        }
    }

    /// Replace the device's telemetry snapshot wholesale
    pub fn apply_telemetry(&self, identity_key: &str, report: TelemetryReport) {
        if let Some(record) = self.lock().get_mut(identity_key) {
            record.telemetry = Some(report);
        }
    }

    /// Enable or disable a device. Disabling excludes it from timeout
    /// accounting without removing its history.
    pub fn set_enabled(&self, identity_key: &str, enabled: bool) {
        if let Some(record) = self.lock().get_mut(identity_key) {
            record.enabled = enabled;
        }
    }

    /// Zero the error/mismatch/over counters for every device, at the
    /// start of a fresh measurement run. Identity, enabled flag, last
    /// response time, and telemetry are untouched.
    pub fn reset_cycle_counters(&self) {
        for record in self.lock().values_mut() {
            record.error_count = 0;
            record.mismatch_count = 0;
            record.over_count = 0;
        }
    }

    /// Snapshot of every enabled device, ordered by identity key.
    /// Reflects the current enabled set, never a cache.
    pub fn snapshot_enabled(&self) -> Vec<DeviceRecord> {
        let mut records: Vec<DeviceRecord> = self
            .lock()
            .values()
            .filter(|r| r.enabled)
            .cloned()
            .collect();
        records.sort_by(|a, b| a.identity_key.cmp(&b.identity_key));
        records
    }

    /// Snapshot of every device, ordered by identity key
    pub fn snapshot(&self) -> Vec<DeviceRecord> {
        let mut records: Vec<DeviceRecord> = self.lock().values().cloned().collect();
        records.sort_by(|a, b| a.identity_key.cmp(&b.identity_key));
        records
    }

    /// Copy of one device's record
    pub fn get(&self, identity_key: &str) -> Option<DeviceRecord> {
        self.lock().get(identity_key).cloned()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, DeviceRecord>> {
        self.devices.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn report(id: u64) -> TelemetryReport {
        TelemetryReport {
            id,
            link_fail_count: 1,
            max_cycle_ms: 25,
            min_cycle_ms: 10,
            over_15ms: 4,
            over_20ms: 3,
            over_25ms: 2,
            over_30ms: 1,
            recv_count: 100,
            recv_double_count: 2,
            recv_fail_count: 1,
        }
    }

    #[test]
    fn test_upsert_discovers_then_no_op() {
        let registry = DeviceRegistry::new();

        assert_eq!(
            registry.upsert("AA:BB", "192.168.0.10"),
            UpsertOutcome::Discovered
        );
        assert_eq!(
            registry.upsert("AA:BB", "192.168.0.10"),
            UpsertOutcome::Unchanged
        );
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_upsert_updates_changed_address() {
        let registry = DeviceRegistry::new();
        registry.upsert("AA:BB", "192.168.0.10");

        assert_eq!(
            registry.upsert("AA:BB", "192.168.0.99"),
            UpsertOutcome::AddressChanged
        );
        assert_eq!(
            registry.get("AA:BB").unwrap().secondary_address,
            "192.168.0.99"
        );
    }

    #[test]
    fn test_counters_ignored_for_unknown_key() {
        let registry = DeviceRegistry::new();

        assert_eq!(registry.increment_error("nope"), None);
        assert_eq!(registry.increment_mismatch("nope"), None);
        assert_eq!(registry.increment_over("nope"), None);
        registry.record_response_time("nope", 1.0);
        assert!(registry.is_empty());
    }

    #[test]
    fn test_increment_error_sets_timeout_sentinel() {
        let registry = DeviceRegistry::new();
        registry.upsert("AA:BB", "10.0.0.1");
        registry.record_response_time("AA:BB", 3.5);

        assert_eq!(registry.increment_error("AA:BB"), Some(1));

        let record = registry.get("AA:BB").unwrap();
        assert_eq!(record.error_count, 1);
        assert_eq!(record.last_response, ResponseTime::TimedOut);
    }

    #[test]
    fn test_reset_cycle_counters_preserves_identity_state() {
        let registry = DeviceRegistry::new();
        registry.upsert("AA:BB", "10.0.0.1");
        registry.set_enabled("AA:BB", false);
        registry.increment_error("AA:BB");
        registry.increment_mismatch("AA:BB");
        registry.increment_over("AA:BB");
        registry.apply_telemetry("AA:BB", report(7));

        registry.reset_cycle_counters();

        let record = registry.get("AA:BB").unwrap();
        assert_eq!(record.error_count, 0);
        assert_eq!(record.mismatch_count, 0);
        assert_eq!(record.over_count, 0);
        assert_eq!(
            record.last_response,
            ResponseTime::TimedOut,
            "last response column must survive reset"
        );
        assert!(!record.enabled, "enabled flag must survive reset");
        assert!(record.telemetry.is_some(), "telemetry must survive reset");
    }

    #[test]
    fn test_apply_telemetry_overwrites_wholesale() {
        let registry = DeviceRegistry::new();
        registry.upsert("AA:BB", "10.0.0.1");

        registry.apply_telemetry("AA:BB", report(1));
        registry.apply_telemetry("AA:BB", report(2));

        assert_eq!(registry.get("AA:BB").unwrap().telemetry.unwrap().id, 2);
    }

    #[test]
    fn test_snapshot_enabled_excludes_disabled_and_sorts() {
        let registry = DeviceRegistry::new();
        registry.upsert("CC:DD", "10.0.0.2");
        registry.upsert("AA:BB", "10.0.0.1");
        registry.upsert("EE:FF", "10.0.0.3");
        registry.set_enabled("CC:DD", false);

        let enabled = registry.snapshot_enabled();
        let keys: Vec<&str> = enabled.iter().map(|r| r.identity_key.as_str()).collect();
        assert_eq!(keys, vec!["AA:BB", "EE:FF"]);
    }

    #[test]
    fn test_response_time_display() {
        assert_eq!(ResponseTime::NotMeasured.to_string(), "N/A");
        assert_eq!(ResponseTime::TimedOut.to_string(), "Timeout");
        assert_eq!(ResponseTime::Millis(3.14).to_string(), "3.1");
    }

    #[test]
    fn test_identity_policy_keys() {
        let source: SocketAddr = "192.168.0.10:5000".parse().unwrap();
        let echo = EchoMessage {
            identity: "AA:BB".to_string(),
            sequence: 1,
        };

        assert_eq!(IdentityPolicy::Mac.echo_key(&echo, source), "AA:BB");
        assert_eq!(IdentityPolicy::Ip.echo_key(&echo, source), "192.168.0.10");

        let r = report(42);
        assert_eq!(IdentityPolicy::Mac.telemetry_key(&r, source), "42");
        assert_eq!(
            IdentityPolicy::Ip.telemetry_key(&r, source),
            "192.168.0.10"
        );
    }

    #[test]
    fn test_identity_policy_secondary_is_complementary() {
        let source: SocketAddr = "192.168.0.10:5000".parse().unwrap();
        let echo = EchoMessage {
            identity: "AA:BB".to_string(),
            sequence: 1,
        };

        assert_eq!(
            IdentityPolicy::Mac.echo_secondary(&echo, source),
            "192.168.0.10"
        );
        assert_eq!(IdentityPolicy::Ip.echo_secondary(&echo, source), "AA:BB");

        let r = report(42);
        assert_eq!(
            IdentityPolicy::Mac.telemetry_secondary(&r, source),
            "192.168.0.10"
        );
        assert_eq!(IdentityPolicy::Ip.telemetry_secondary(&r, source), "42");
    }
}
