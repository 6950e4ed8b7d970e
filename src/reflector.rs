//! Minimal TWAMP-Light reflector.
//!
//! Answers every well-formed probe with a reflection echoing the probe's
//! sequence number, timestamp and error estimate together with the TTL/TOS
//! the probe arrived with. Reflections are padded to the probe's length.

use std::future::Future;

use crate::{
    error_estimate::ErrorEstimate,
    packets::{decode_probe, ProbePacket, ReflectedPacket},
    sender::RECV_BUFFER_SIZE,
    time::{self, Timestamp},
    transport::{IpDiagnostics, TransportError, UdpTransport},
};

/// Counters reported when the reflector shuts down.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReflectorStats {
    pub packets_received: u64,
    pub packets_reflected: u64,
    pub packets_dropped: u64,
}

/// Builds the reflection for `probe`, stamping the current time as send time.
///
/// # Arguments
/// * `probe` - Decoded probe
/// * `received_at` - Time the probe was read from the socket
/// * `diagnostics` - TTL/TOS the probe arrived with
/// * `sequence_number` - Reflector's own sequence number
pub fn assemble_reflection(
    probe: &ProbePacket,
    received_at: Timestamp,
    diagnostics: IpDiagnostics,
    sequence_number: u32,
) -> ReflectedPacket {
    ReflectedPacket {
        sess_sender_seq_number: probe.sequence_number,
        sess_sender_timestamp: probe.timestamp,
        sess_sender_err_estimate: probe.error_estimate,
        sess_sender_ttl: diagnostics.ttl,
        sess_sender_tos: diagnostics.tos,
        receive_timestamp: received_at,
        sequence_number,
        timestamp: time::now(),
        error_estimate: ErrorEstimate::SENDER_DEFAULT.to_wire(),
    }
}

/// Reflects probes arriving on `transport` until `shutdown` completes.
///
/// Undecodable or truncated datagrams are dropped. Failed sends are logged
/// and dropped; only receive failures end the loop with an error.
pub async fn run_reflector<F>(
    transport: &mut UdpTransport,
    shutdown: F,
) -> Result<ReflectorStats, TransportError>
where
    F: Future<Output = ()>,
{
    tokio::pin!(shutdown);

    let mut buf = vec![0u8; RECV_BUFFER_SIZE];
    let mut stats = ReflectorStats::default();
    let mut next_seq: u32 = 0;

    log::info!("Reflector listening on {}", transport.local_addr());

    loop {
        let datagram = tokio::select! {
            result = transport.recv(&mut buf) => result?,
            _ = &mut shutdown => {
                log::info!(
                    "Reflector shutting down: {} received, {} reflected, {} dropped",
                    stats.packets_received,
                    stats.packets_reflected,
                    stats.packets_dropped
                );
                return Ok(stats);
            }
        };
        stats.packets_received += 1;

        if datagram.truncated {
            log::debug!("Dropping truncated datagram from {}", datagram.source);
            stats.packets_dropped += 1;
            continue;
        }

        let probe = match decode_probe(&buf[..datagram.len]) {
            Ok(probe) => probe,
            Err(e) => {
                log::debug!("Dropping datagram from {}: {}", datagram.source, e);
                stats.packets_dropped += 1;
                continue;
            }
        };

        let reflection = assemble_reflection(
            &probe,
            datagram.received_at,
            datagram.diagnostics,
            next_seq,
        );
        next_seq = next_seq.wrapping_add(1);

        match transport
            .send_to(&reflection.encode(datagram.len), datagram.source)
            .await
        {
            Ok(()) => {
                stats.packets_reflected += 1;
                log::trace!(
                    "Reflected probe {} to {}",
                    probe.sequence_number,
                    datagram.source
                );
            }
            Err(e) => {
                log::warn!("Failed to reflect to {}: {}", datagram.source, e);
                stats.packets_dropped += 1;
            }
        }
    }
}
