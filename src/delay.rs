//! Four-timestamp delay decomposition.
//!
//! ```text
//!   sender            reflector
//!   t_send ----------> t_recv_refl
//!                         | internal
//!   t_recv_local <---- t_send_refl
//! ```
//!
//! All arithmetic is in signed integer microseconds so that
//! `round_trip == forward + internal + backward` holds exactly.

use std::fmt;

use serde::Serialize;

use crate::time::Timestamp;

/// Whether the one-way delays look plausible for the sender/reflector clocks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum SyncFlag {
    /// Both one-way delays are non-negative.
    #[serde(rename = "Y")]
    Synchronized,
    /// At least one one-way delay is negative.
    #[serde(rename = "N")]
    Unsynchronized,
}

impl SyncFlag {
    /// Single-character report form.
    pub fn as_char(self) -> char {
        match self {
            SyncFlag::Synchronized => 'Y',
            SyncFlag::Unsynchronized => 'N',
        }
    }
}

impl fmt::Display for SyncFlag {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.as_char())
    }
}

/// Delay components of one probe/reflection exchange, in microseconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct DelayMeasurement {
    /// Sender to reflector.
    pub forward_us: i64,
    /// Reflector to sender.
    pub backward_us: i64,
    /// Reflector processing time.
    pub internal_us: i64,
    /// Sender send to sender receive.
    pub round_trip_us: i64,
}

impl DelayMeasurement {
    /// `N` when either one-way delay is negative, otherwise `Y`.
    pub fn sync(&self) -> SyncFlag {
        if self.forward_us < 0 || self.backward_us < 0 {
            SyncFlag::Unsynchronized
        } else {
            SyncFlag::Synchronized
        }
    }
}

/// Computes the delays from four instants given in microseconds.
pub fn compute_delays(
    t_send: i64,
    t_recv_refl: i64,
    t_send_refl: i64,
    t_recv_local: i64,
) -> DelayMeasurement {
    let forward_us = t_recv_refl - t_send;
    let internal_us = t_send_refl - t_recv_refl;
    let backward_us = t_recv_local - t_send_refl;

    DelayMeasurement {
        forward_us,
        backward_us,
        internal_us,
        round_trip_us: t_recv_local - t_send,
    }
}

/// Same as [`compute_delays`] for wire timestamps.
pub fn compute_from_timestamps(
    t_send: Timestamp,
    t_recv_refl: Timestamp,
    t_send_refl: Timestamp,
    t_recv_local: Timestamp,
) -> DelayMeasurement {
    compute_delays(
        t_send.to_micros(),
        t_recv_refl.to_micros(),
        t_send_refl.to_micros(),
        t_recv_local.to_micros(),
    )
}
