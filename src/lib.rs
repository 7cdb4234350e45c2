//! Udptester - UDP device liveness and round-trip latency tester
//!
//! This library wires the probing engine from `udptester-core` to the
//! CLI surface: configuration, CSV session logging.

pub mod config;
pub mod csv_log;

pub use udptester_core::probe;
pub use udptester_core::stats;

pub use config::{AppConfig, ConfigError, SessionSettings};
pub use csv_log::CsvEventSink;
pub use udptester_core::{
    DeviceRegistry, EventSink, IdentityPolicy, PeriodicConfig, ProbeEvent, ProbeScheduler,
    UdpTransport, VERSION,
};
