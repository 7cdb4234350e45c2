//! Discrete events emitted by the probing engine
//!
//! The core does not persist anything itself; a collaborator (CSV log,
//! UI, test harness) implements [`EventSink`] and records whatever subset
//! of these it cares about.

use chrono::{DateTime, Utc};

/// Why a periodic run ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    /// The configured iteration limit was reached
    LimitReached,
    /// The operator stopped the run
    Cancelled,
}

impl std::fmt::Display for StopReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StopReason::LimitReached => write!(f, "limit reached"),
            StopReason::Cancelled => write!(f, "cancelled"),
        }
    }
}

/// A discrete observation from the probing engine
#[derive(Debug, Clone, PartialEq)]
pub enum ProbeEvent {
    /// A device identity was seen for the first time
    DeviceDiscovered { key: String, address: String },
    /// A known device answered from a different secondary address
    DeviceAddressChanged { key: String, address: String },
    /// A probe datagram was handed to the transport
    ProbeSent { sequence: u16, timestamp: DateTime<Utc> },
    /// An echo matched the outstanding sequence and resolved to an RTT
    ResponseMatched {
        key: String,
        address: String,
        sequence: u16,
        rtt_ms: f64,
    },
    /// An echo carried a stale sequence. `expected_sequence` is `None`
    /// when nothing has been sent yet this session
    ResponseMismatched {
        key: String,
        address: String,
        echoed_sequence: u16,
        expected_sequence: Option<u16>,
    },
    /// A second echo for an already-answered sequence in the same cycle
    ResponseDuplicate {
        key: String,
        address: String,
        sequence: u16,
    },
    /// An enabled device failed to answer before the cycle sweep
    DeviceTimedOut { key: String, error_count: u64 },
    /// A periodic run started
    RunStarted,
    /// A periodic run ended
    RunStopped { reason: StopReason },
}

/// Collaborator contract for persisting engine events
pub trait EventSink: Send + Sync {
    fn emit(&self, event: &ProbeEvent);
}

/// Sink that discards every event
#[derive(Debug, Default)]
pub struct NullSink;

impl EventSink for NullSink {
    fn emit(&self, _event: &ProbeEvent) {}
}
