//! Udptester Core - UDP probe scheduling, correlation, and device statistics
//!
//! This library is the diagnostic core of a device-discovery and monitoring
//! tool. It periodically broadcasts or unicasts tagged probe datagrams,
//! correlates echoed sequence numbers with their send timestamps to measure
//! round-trip time, and keeps per-device health counters (timeouts,
//! duplicate responses, stale responses).

pub mod events;
pub mod probe;
pub mod stats;

pub use events::{EventSink, NullSink, ProbeEvent, StopReason};
pub use probe::codec::{EchoMessage, TelemetryReport};
pub use probe::registry::{DeviceRecord, DeviceRegistry, IdentityPolicy, ResponseTime};
pub use probe::scheduler::{PeriodicConfig, ProbeScheduler};
pub use probe::transport::{Transport, UdpTransport};
pub use stats::store::SampleStore;

/// Application version from Cargo.toml
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Highest probe sequence number; the counter wraps past this value
pub const MAX_SEQUENCE: u16 = 65535;

/// Sequence value after a wrap. 0 is reserved for the first probe of a session
pub const SEQUENCE_WRAP_TO: u16 = 1;

/// How long an in-flight probe timestamp is retained for RTT correlation
pub const CORRELATION_RETENTION: std::time::Duration = std::time::Duration::from_secs(5);

/// Maximum RTT samples retained per device address; oldest dropped first
pub const MAX_SAMPLES_PER_DEVICE: usize = 65535;
