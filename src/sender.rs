//! Measurement session driver.
//!
//! Sends `count` probes one at a time. After each probe the driver waits for
//! a single reflection, bounded by the response timeout, then either emits a
//! metrics record or counts the probe as lost.

use std::{io::Write, time::Duration};

use thiserror::Error;

use crate::{
    delay::compute_from_timestamps,
    error_estimate::ErrorEstimate,
    packets::{decode_reflection, encode_probe, PacketError, ReflectedPacket},
    report::{MetricsRecord, Reporter},
    session::{Session, SessionSummary},
    time,
    transport::{Datagram, Transport, TransportError},
};

/// Receive buffer size; larger reflections are truncated and count as lost.
pub const RECV_BUFFER_SIZE: usize = 65_536;

/// Driver parameters derived from the configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionParams {
    /// Number of probes to send.
    pub count: u32,
    /// Probe payload length in bytes.
    pub payload_len: usize,
    /// How long to wait for each reflection.
    pub timeout: Duration,
    /// Pause between successive probes.
    pub interval: Duration,
    /// Only accept reflections echoing the expected sequence number.
    pub strict_sequence: bool,
}

/// Errors that abort a run.
#[derive(Error, Debug)]
pub enum SenderError {
    #[error("cannot build probe: {0}")]
    Packet(#[from] PacketError),
    #[error(transparent)]
    Transport(#[from] TransportError),
    #[error("failed to write report: {0}")]
    Report(#[from] std::io::Error),
}

/// Runs one measurement session over `transport`, writing a record per
/// answered probe to `reporter`.
///
/// Timeouts, truncated datagrams and undecodable reflections count as lost
/// probes. Any other transport failure aborts the run.
pub async fn run_sender<T: Transport, W: Write>(
    transport: &mut T,
    params: &SessionParams,
    reporter: &mut Reporter<W>,
) -> Result<SessionSummary, SenderError> {
    let mut session = Session::new();
    let mut recv_buf = vec![0u8; RECV_BUFFER_SIZE];
    let sender_port = transport.local_port();

    log::info!(
        "Sending {} probes of {} bytes from port {} (timeout {:?}, interval {:?})",
        params.count,
        params.payload_len,
        sender_port,
        params.timeout,
        params.interval
    );

    for index in 0..params.count {
        if index > 0 && !params.interval.is_zero() {
            tokio::time::sleep(params.interval).await;
        }

        let seq_num = session.generate_sequence_number();
        let probe = encode_probe(seq_num, time::now(), params.payload_len)?;
        transport.send(&probe).await?;
        session.record_sent();
        log::trace!("Probe {} sent", seq_num);

        match await_reflection(transport, &mut recv_buf, seq_num, params).await? {
            Some((reflection, datagram)) => {
                session.record_received();
                let record = build_record(
                    index,
                    &reflection,
                    &datagram,
                    sender_port,
                    params.payload_len,
                    session.lost(),
                );
                reporter.emit(record)?;
            }
            None => session.record_loss(),
        }
    }

    let summary = session.summary();
    log::info!(
        "Session finished: {} sent, {} received, {} lost ({:.1}%)",
        summary.packets_sent,
        summary.packets_received,
        summary.packets_lost,
        summary.loss_percent()
    );
    Ok(summary)
}

/// Waits for the reflection of probe `seq_num`.
///
/// `Ok(None)` means the probe is lost. In strict mode reflections echoing
/// another sequence number are dropped and waiting resumes until the same
/// deadline.
async fn await_reflection<T: Transport>(
    transport: &mut T,
    buf: &mut [u8],
    seq_num: u32,
    params: &SessionParams,
) -> Result<Option<(ReflectedPacket, Datagram)>, TransportError> {
    let deadline = tokio::time::Instant::now() + params.timeout;

    loop {
        let remaining = deadline.saturating_duration_since(tokio::time::Instant::now());
        let datagram = match transport.receive(buf, remaining).await {
            Ok(datagram) => datagram,
            Err(e) if e.is_timeout() => {
                log::debug!(
                    "Probe {} lost: no reflection within {:?}",
                    seq_num,
                    params.timeout
                );
                return Ok(None);
            }
            Err(e) => return Err(e),
        };

        if datagram.truncated {
            log::debug!(
                "Probe {} lost: reflection from {} truncated",
                seq_num,
                datagram.source
            );
            return Ok(None);
        }

        let reflection = match decode_reflection(&buf[..datagram.len.min(buf.len())]) {
            Ok(reflection) => reflection,
            Err(e) => {
                log::debug!("Probe {} lost: {}", seq_num, e);
                return Ok(None);
            }
        };

        if reflection.sess_sender_seq_number != seq_num {
            if params.strict_sequence {
                log::debug!(
                    "Discarding reflection of probe {} while waiting for {}",
                    reflection.sess_sender_seq_number,
                    seq_num
                );
                continue;
            }
            log::debug!(
                "Accepting reflection of probe {} as reply to {}",
                reflection.sess_sender_seq_number,
                seq_num
            );
        }

        log::debug!(
            "Reflection {} from {} (reflector error estimate {})",
            reflection.sequence_number,
            datagram.source,
            ErrorEstimate::from_wire(reflection.error_estimate)
        );
        return Ok(Some((reflection, datagram)));
    }
}

fn build_record(
    index: u32,
    reflection: &ReflectedPacket,
    datagram: &Datagram,
    sender_port: u16,
    payload_len: usize,
    loss: u32,
) -> MetricsRecord {
    let delays = compute_from_timestamps(
        reflection.sess_sender_timestamp,
        reflection.receive_timestamp,
        reflection.timestamp,
        datagram.received_at,
    );

    MetricsRecord {
        index,
        send_time_us: reflection.sess_sender_timestamp.to_unix_micros(),
        ip: *datagram.source.ip(),
        sender_seq: reflection.sess_sender_seq_number,
        reflector_seq: reflection.sequence_number,
        sender_port,
        receiver_port: datagram.source.port(),
        forward_ttl: reflection.sess_sender_ttl,
        backward_ttl: datagram.diagnostics.ttl,
        sender_tos: reflection.sess_sender_tos,
        backward_tos: datagram.diagnostics.tos,
        delays,
        payload_len,
        loss,
    }
}
