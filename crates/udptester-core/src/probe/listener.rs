//! Receive-path datagram handling
//!
//! One [`ProbeListener`] serves a probing session. Each inbound datagram
//! is classified (echo, telemetry, or noise) and applied to the shared
//! stores. Malformed buffers are logged and dropped; they never raise an
//! error into the scheduler.

use std::net::SocketAddr;
use std::sync::Arc;

use crate::events::{EventSink, ProbeEvent};
use crate::stats::store::SampleStore;

use super::codec::{self, EchoMessage, TelemetryReport};
use super::correlation::CorrelationStore;
use super::monitor::CycleMonitor;
use super::registry::{DeviceRegistry, IdentityPolicy, UpsertOutcome};
use super::scheduler::SequenceCounter;

/// Applies inbound datagrams to a session's shared state
pub struct ProbeListener {
    registry: Arc<DeviceRegistry>,
    correlation: Arc<CorrelationStore>,
    monitor: Arc<CycleMonitor>,
    sequence: Arc<SequenceCounter>,
    stats: Arc<SampleStore>,
    events: Arc<dyn EventSink>,
    policy: IdentityPolicy,
}

impl ProbeListener {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        registry: Arc<DeviceRegistry>,
        correlation: Arc<CorrelationStore>,
        monitor: Arc<CycleMonitor>,
        sequence: Arc<SequenceCounter>,
        stats: Arc<SampleStore>,
        events: Arc<dyn EventSink>,
        policy: IdentityPolicy,
    ) -> Self {
        Self {
            registry,
            correlation,
            monitor,
            sequence,
            stats,
            events,
            policy,
        }
    }

    /// Classify and apply one inbound datagram
    pub fn handle_datagram(&self, buf: &[u8], source: SocketAddr) {
        if let Some(echo) = codec::decode_echo(buf) {
            self.handle_echo(&echo, source);
            return;
        }
        if let Some(report) = codec::decode_telemetry(buf) {
            self.handle_telemetry(&report, source);
            return;
        }
        // Not ours; keep the raw payload visible but take no state action
        tracing::debug!(
            source = %source,
            payload = %String::from_utf8_lossy(buf),
            "unrecognized datagram ignored"
        );
    }

    fn handle_echo(&self, echo: &EchoMessage, source: SocketAddr) {
        let key = self.policy.echo_key(echo, source);
        let address = source.ip().to_string();
        self.register_sighting(&key, &self.policy.echo_secondary(echo, source));

        let expected = self.sequence.last_sent();
        if expected != Some(echo.sequence) {
            // Stale or delayed response from an earlier cycle
            self.registry.increment_mismatch(&key);
            tracing::debug!(
                key = %key,
                echoed = echo.sequence,
                expected = ?expected,
                "stale response"
            );
            self.events.emit(&ProbeEvent::ResponseMismatched {
                key,
                address,
                echoed_sequence: echo.sequence,
                expected_sequence: expected,
            });
            return;
        }

        let first = self.monitor.mark_responded(&key);
        if !first {
            self.registry.increment_over(&key);
            tracing::debug!(key = %key, address = %address, "duplicate response");
            self.events.emit(&ProbeEvent::ResponseDuplicate {
                key: key.clone(),
                address: address.clone(),
                sequence: echo.sequence,
            });
        }

        // RTT is recorded for duplicates too; only an evicted correlation
        // entry leaves the response unmeasured
        if let Some(sent_at) = self.correlation.resolve(echo.sequence) {
            let rtt_ms = sent_at.elapsed().as_secs_f64() * 1000.0;
            self.registry.record_response_time(&key, rtt_ms);
            self.stats.record(&address, echo.sequence, rtt_ms);
            tracing::debug!(
                key = %key,
                sequence = echo.sequence,
                rtt_ms = %format!("{rtt_ms:.1}"),
                "response matched"
            );
            self.events.emit(&ProbeEvent::ResponseMatched {
                key,
                address,
                sequence: echo.sequence,
                rtt_ms,
            });
        }
    }

    fn handle_telemetry(&self, report: &TelemetryReport, source: SocketAddr) {
        let key = self.policy.telemetry_key(report, source);
        self.register_sighting(&key, &self.policy.telemetry_secondary(report, source));

        self.registry.apply_telemetry(&key, *report);
        tracing::debug!(
            key = %key,
            id = report.id,
            link_fail = report.link_fail_count,
            recv_count = report.recv_count,
            "telemetry applied"
        );
    }

    fn register_sighting(&self, key: &str, address: &str) {
        match self.registry.upsert(key, address) {
            UpsertOutcome::Discovered => {
                tracing::info!(key = %key, address = %address, "new device discovered");
                self.events.emit(&ProbeEvent::DeviceDiscovered {
                    key: key.to_string(),
                    address: address.to_string(),
                });
            }
            UpsertOutcome::AddressChanged => {
                tracing::info!(key = %key, address = %address, "device address changed");
                self.events.emit(&ProbeEvent::DeviceAddressChanged {
                    key: key.to_string(),
                    address: address.to_string(),
                });
            }
            UpsertOutcome::Unchanged => {}
        }
    }
}
