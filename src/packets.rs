//! TWAMP-Light test packet structures.
//!
//! Two wire structures are exchanged: the probe sent by the client and the
//! reflection returned by the reflector. All multi-byte integers are
//! big-endian and decoding is bounds-checked against the supplied slice.

use thiserror::Error;

use crate::{error_estimate::ErrorEstimate, time::Timestamp};

/// Fixed part of a probe: sequence number, timestamp, error estimate.
pub const PROBE_HEADER_SIZE: usize = 14;

/// Fixed part of a reflection.
pub const REFLECTION_HEADER_SIZE: usize = 38;

/// Largest UDP payload that fits an IPv4 datagram.
pub const MAX_PAYLOAD_LEN: usize = 65_507;

/// Errors raised by the packet codec.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PacketError {
    #[error("payload length {len} is smaller than the {min}-byte probe header")]
    InvalidPayloadLength { len: usize, min: usize },
    #[error("truncated packet: got {len} bytes, need at least {min}")]
    TruncatedPacket { len: usize, min: usize },
}

/// Probe sent by the client.
///
/// Wire format:
/// ```text
///  0                   1                   2                   3
///  0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// |                        Sequence Number                        |
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// |                          Timestamp                            |
/// |                                                               |
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// |         Error Estimate        |                               |
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+                               +
/// .             Zero padding up to the payload length             .
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// ```
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct ProbePacket {
    /// Probe index within the run.
    pub sequence_number: u32,
    /// Local send time.
    pub timestamp: Timestamp,
    /// Error estimate in wire format.
    pub error_estimate: u16,
}

impl ProbePacket {
    /// Creates a probe carrying the fixed sender error estimate.
    pub fn new(sequence_number: u32, timestamp: Timestamp) -> Self {
        Self {
            sequence_number,
            timestamp,
            error_estimate: ErrorEstimate::SENDER_DEFAULT.to_wire(),
        }
    }

    /// Serializes the probe, zero-padded to `payload_len` bytes.
    ///
    /// # Errors
    /// Returns `PacketError::InvalidPayloadLength` if `payload_len` cannot
    /// hold the probe header.
    pub fn encode(&self, payload_len: usize) -> Result<Vec<u8>, PacketError> {
        if payload_len < PROBE_HEADER_SIZE {
            return Err(PacketError::InvalidPayloadLength {
                len: payload_len,
                min: PROBE_HEADER_SIZE,
            });
        }
        let mut buf = vec![0u8; payload_len];
        buf[0..4].copy_from_slice(&self.sequence_number.to_be_bytes());
        buf[4..12].copy_from_slice(&self.timestamp.to_be_bytes());
        buf[12..14].copy_from_slice(&self.error_estimate.to_be_bytes());
        Ok(buf)
    }

    /// Deserializes a probe; bytes past the header are ignored.
    ///
    /// # Errors
    /// Returns `PacketError::TruncatedPacket` if the buffer is shorter than
    /// the probe header.
    pub fn from_bytes(buf: &[u8]) -> Result<Self, PacketError> {
        check_len(buf, PROBE_HEADER_SIZE)?;
        Ok(Self {
            sequence_number: be_u32(buf, 0),
            timestamp: be_timestamp(buf, 4),
            error_estimate: be_u16(buf, 12),
        })
    }
}

/// Reflection returned by the reflector.
///
/// Wire format:
/// ```text
///  0                   1                   2                   3
///  0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// |                  Session-Sender Seq Number                    |
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// |                  Session-Sender Timestamp                     |
/// |                                                               |
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// | Session-Sender Error Estimate |Ses-Sender TTL |Ses-Sender TOS |
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// |                       Receive Timestamp                       |
/// |                                                               |
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// |                        Sequence Number                        |
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// |                          Timestamp                            |
/// |                                                               |
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// |         Error Estimate        |
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// ```
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct ReflectedPacket {
    /// Original sender's sequence number (echoed back).
    pub sess_sender_seq_number: u32,
    /// Original sender's timestamp (echoed back).
    pub sess_sender_timestamp: Timestamp,
    /// Original sender's error estimate (echoed back).
    pub sess_sender_err_estimate: u16,
    /// TTL of the probe as seen by the reflector.
    pub sess_sender_ttl: u8,
    /// TOS of the probe as seen by the reflector.
    pub sess_sender_tos: u8,
    /// Time the reflector received the probe.
    pub receive_timestamp: Timestamp,
    /// Reflector's own sequence number.
    pub sequence_number: u32,
    /// Time the reflector sent this reflection.
    pub timestamp: Timestamp,
    /// Reflector's error estimate.
    pub error_estimate: u16,
}

impl ReflectedPacket {
    /// Serializes the reflection, zero-padded to at least `len` bytes.
    pub fn encode(&self, len: usize) -> Vec<u8> {
        let mut buf = vec![0u8; len.max(REFLECTION_HEADER_SIZE)];
        buf[0..4].copy_from_slice(&self.sess_sender_seq_number.to_be_bytes());
        buf[4..12].copy_from_slice(&self.sess_sender_timestamp.to_be_bytes());
        buf[12..14].copy_from_slice(&self.sess_sender_err_estimate.to_be_bytes());
        buf[14] = self.sess_sender_ttl;
        buf[15] = self.sess_sender_tos;
        buf[16..24].copy_from_slice(&self.receive_timestamp.to_be_bytes());
        buf[24..28].copy_from_slice(&self.sequence_number.to_be_bytes());
        buf[28..36].copy_from_slice(&self.timestamp.to_be_bytes());
        buf[36..38].copy_from_slice(&self.error_estimate.to_be_bytes());
        buf
    }

    /// Deserializes a reflection; bytes past the header are ignored.
    ///
    /// # Errors
    /// Returns `PacketError::TruncatedPacket` if the buffer is shorter than
    /// the reflection header.
    pub fn from_bytes(buf: &[u8]) -> Result<Self, PacketError> {
        check_len(buf, REFLECTION_HEADER_SIZE)?;
        Ok(Self {
            sess_sender_seq_number: be_u32(buf, 0),
            sess_sender_timestamp: be_timestamp(buf, 4),
            sess_sender_err_estimate: be_u16(buf, 12),
            sess_sender_ttl: buf[14],
            sess_sender_tos: buf[15],
            receive_timestamp: be_timestamp(buf, 16),
            sequence_number: be_u32(buf, 24),
            timestamp: be_timestamp(buf, 28),
            error_estimate: be_u16(buf, 36),
        })
    }
}

/// Builds the wire bytes of probe `sequence` sent at `send_time`.
pub fn encode_probe(
    sequence: u32,
    send_time: Timestamp,
    payload_len: usize,
) -> Result<Vec<u8>, PacketError> {
    ProbePacket::new(sequence, send_time).encode(payload_len)
}

/// Parses a received reflection.
pub fn decode_reflection(buf: &[u8]) -> Result<ReflectedPacket, PacketError> {
    ReflectedPacket::from_bytes(buf)
}

/// Parses a received probe.
pub fn decode_probe(buf: &[u8]) -> Result<ProbePacket, PacketError> {
    ProbePacket::from_bytes(buf)
}

fn check_len(buf: &[u8], min: usize) -> Result<(), PacketError> {
    if buf.len() < min {
        return Err(PacketError::TruncatedPacket {
            len: buf.len(),
            min,
        });
    }
    Ok(())
}

// Callers have already checked `buf` covers the field.
fn be_u16(buf: &[u8], at: usize) -> u16 {
    u16::from_be_bytes([buf[at], buf[at + 1]])
}

fn be_u32(buf: &[u8], at: usize) -> u32 {
    u32::from_be_bytes([buf[at], buf[at + 1], buf[at + 2], buf[at + 3]])
}

fn be_timestamp(buf: &[u8], at: usize) -> Timestamp {
    let mut raw = [0u8; 8];
    raw.copy_from_slice(&buf[at..at + 8]);
    Timestamp::from_be_bytes(raw)
}
