//! Probing engine
//!
//! This module contains the temporal/state coordination core:
//! - Wire message encoding and decoding ([`codec`])
//! - Sequence-to-send-timestamp correlation ([`correlation`])
//! - Identity-keyed device state and counters ([`registry`])
//! - Per-cycle timeout detection ([`monitor`])
//! - Receive-path datagram handling ([`listener`])
//! - Timer-driven probe sending ([`scheduler`])
//! - UDP transport collaborator ([`transport`])

pub mod codec;
pub mod correlation;
pub mod listener;
pub mod monitor;
pub mod registry;
pub mod scheduler;
pub mod transport;
