//! Statistics module
//!
//! Bounded per-device RTT sample history ([`store`]).

pub mod store;
