//! TWAMP-Light client - active measurement of network delay and loss.
//!
//! The client sends timestamped UDP probes to a reflector, receives the
//! timestamped reflections and splits each round trip into forward,
//! reflector-internal and backward delay. A minimal reflector is included so
//! the client can be exercised end to end.
//!
//! # Usage
//!
//! Run the client:
//! ```bash
//! twamp-sender --remote-host 192.0.2.1 --count 20 --payload-len 64
//! ```
//!
//! Run the reflector:
//! ```bash
//! twamp-reflector --local-host 0.0.0.0 --local-port 862
//! ```

/// Command-line configuration and validation.
pub mod configuration;
/// Four-timestamp delay decomposition and sync detection.
pub mod delay;
/// Error estimate encoding/decoding for timestamps.
pub mod error_estimate;
/// Probe and reflection wire formats.
pub mod packets;
/// Reflector answering probes.
pub mod reflector;
/// Per-probe metrics records and their output formats.
pub mod report;
/// Measurement session driver.
pub mod sender;
/// Per-run probe counters.
pub mod session;
/// NTP-style timestamps.
pub mod time;
/// UDP transport reporting TTL/TOS of received datagrams.
pub mod transport;
