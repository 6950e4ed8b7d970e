//! Per-probe metrics records and their CSV / JSON-lines rendering.

use std::{
    io::{self, Write},
    net::Ipv4Addr,
};

use serde::Serialize;

use crate::delay::{DelayMeasurement, SyncFlag};

/// Column names of the CSV report, in output order.
pub const CSV_HEADER: &str =
    "Time,IP,Snd#,Rcv#,SndPort,RcvPort,Sync,FW_TTL,SW_TTL,SndTOS,FW_TOS,SW_TOS,RTT,IntD,FWD,BWD,PLEN,LOSS";

/// Output format for the per-probe report.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, clap::ValueEnum, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    /// Comma-separated values with a single header line.
    #[default]
    Csv,
    /// One JSON object per line, no header.
    Json,
}

/// Everything reported for one answered probe.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MetricsRecord {
    /// Probe index the driver was waiting on.
    pub index: u32,
    /// Send time of the answered probe, microseconds since the Unix epoch.
    pub send_time_us: i64,
    /// Source address of the reflection.
    pub ip: Ipv4Addr,
    /// Sender sequence number echoed by the reflector.
    pub sender_seq: u32,
    /// Reflector's own sequence number.
    pub reflector_seq: u32,
    /// Local port probes were sent from.
    pub sender_port: u16,
    /// Port the reflection came from.
    pub receiver_port: u16,
    /// Probe TTL as seen by the reflector.
    pub forward_ttl: u8,
    /// Reflection TTL as seen locally.
    pub backward_ttl: u8,
    /// Probe TOS as seen by the reflector.
    pub sender_tos: u8,
    /// Reflection TOS as seen locally.
    pub backward_tos: u8,
    #[serde(flatten)]
    pub delays: DelayMeasurement,
    /// Configured probe payload length in bytes.
    pub payload_len: usize,
    /// Probes lost so far in this run.
    pub loss: u32,
}

impl MetricsRecord {
    /// Sync flag derived from the one-way delays.
    pub fn sync(&self) -> SyncFlag {
        self.delays.sync()
    }

    fn to_csv_line(&self) -> String {
        format!(
            "{},{},{},{},{},{},{},{},{},{},-,{},{},{},{},{},{},{}",
            format_ms(self.send_time_us),
            self.ip,
            self.sender_seq,
            self.reflector_seq,
            self.sender_port,
            self.receiver_port,
            self.sync(),
            self.forward_ttl,
            self.backward_ttl,
            self.sender_tos,
            self.backward_tos,
            format_ms(self.delays.round_trip_us),
            format_ms(self.delays.internal_us),
            format_ms(self.delays.forward_us),
            format_ms(self.delays.backward_us),
            self.payload_len,
            self.loss,
        )
    }
}

/// Writes records to `out` in the chosen format.
///
/// The CSV header is written once per reporter, right before its first record.
pub struct Reporter<W: Write> {
    out: W,
    format: OutputFormat,
    header_written: bool,
}

impl<W: Write> Reporter<W> {
    pub fn new(out: W, format: OutputFormat) -> Self {
        Self {
            out,
            format,
            header_written: false,
        }
    }

    /// Writes one record and flushes so lines appear as probes complete.
    pub fn emit(&mut self, record: MetricsRecord) -> io::Result<()> {
        match self.format {
            OutputFormat::Csv => {
                if !self.header_written {
                    writeln!(self.out, "{}", CSV_HEADER)?;
                    self.header_written = true;
                }
                writeln!(self.out, "{}", record.to_csv_line())?;
            }
            OutputFormat::Json => {
                #[derive(Serialize)]
                struct JsonLine<'a> {
                    #[serde(flatten)]
                    record: &'a MetricsRecord,
                    sync: SyncFlag,
                }

                let line = JsonLine {
                    record: &record,
                    sync: record.sync(),
                };
                serde_json::to_writer(&mut self.out, &line)?;
                writeln!(self.out)?;
            }
        }
        self.out.flush()
    }

    pub fn into_inner(self) -> W {
        self.out
    }
}

/// Renders microseconds as milliseconds with six decimals.
fn format_ms(us: i64) -> String {
    let sign = if us < 0 { "-" } else { "" };
    let abs = us.unsigned_abs();
    format!("{}{}.{:03}000", sign, abs / 1000, abs % 1000)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::delay::compute_delays;

    fn sample_record(index: u32, loss: u32) -> MetricsRecord {
        let delays = compute_delays(1000, 1010, 1015, 1030);
        MetricsRecord {
            index,
            send_time_us: 1_700_000_000_123_456,
            ip: Ipv4Addr::new(192, 0, 2, 7),
            sender_seq: index,
            reflector_seq: 40 + index,
            sender_port: 50_000,
            receiver_port: 862,
            forward_ttl: 63,
            backward_ttl: 62,
            sender_tos: 0xB8,
            backward_tos: 0,
            delays,
            payload_len: 50,
            loss,
        }
    }

    fn render(format: OutputFormat, records: Vec<MetricsRecord>) -> String {
        let mut reporter = Reporter::new(Vec::new(), format);
        for record in records {
            reporter.emit(record).unwrap();
        }
        String::from_utf8(reporter.into_inner()).unwrap()
    }

    #[test]
    fn test_format_ms() {
        assert_eq!(format_ms(0), "0.000000");
        assert_eq!(format_ms(30), "0.030000");
        assert_eq!(format_ms(1_234_567), "1234.567000");
        assert_eq!(format_ms(-500), "-0.500000");
        assert_eq!(format_ms(-1_001), "-1.001000");
    }

    #[test]
    fn test_csv_header_written_once() {
        let output = render(
            OutputFormat::Csv,
            (0..3).map(|i| sample_record(i, 0)).collect(),
        );
        let lines: Vec<&str> = output.lines().collect();

        assert_eq!(lines.len(), 4);
        assert_eq!(lines[0], CSV_HEADER);
        assert_eq!(output.matches("Time,IP").count(), 1);
        assert!(lines[1..].iter().all(|l| !l.starts_with("Time")));
    }

    #[test]
    fn test_csv_nothing_written_without_records() {
        assert_eq!(render(OutputFormat::Csv, Vec::new()), "");
    }

    #[test]
    fn test_header_state_is_per_reporter() {
        let first = render(OutputFormat::Csv, vec![sample_record(0, 0)]);
        let second = render(OutputFormat::Csv, vec![sample_record(1, 0)]);

        assert!(first.starts_with(CSV_HEADER));
        assert!(second.starts_with(CSV_HEADER));
    }

    #[test]
    fn test_csv_line_columns() {
        let output = render(OutputFormat::Csv, vec![sample_record(3, 2)]);
        let line = output.lines().nth(1).unwrap();

        assert_eq!(
            line,
            "1700000000123.456000,192.0.2.7,3,43,50000,862,Y,63,62,184,-,0,\
             0.030000,0.005000,0.010000,0.015000,50,2"
        );
        assert_eq!(
            line.split(',').count(),
            CSV_HEADER.split(',').count()
        );
    }

    #[test]
    fn test_csv_unsynchronized_negative_delay() {
        let mut record = sample_record(0, 0);
        record.delays = compute_delays(1000, 500, 505, 1030);
        assert_eq!(record.sync(), SyncFlag::Unsynchronized);

        let output = render(OutputFormat::Csv, vec![record]);
        let fields: Vec<&str> = output.lines().nth(1).unwrap().split(',').collect();

        assert_eq!(fields[6], "N");
        assert_eq!(fields[14], "-0.500000");
    }

    #[test]
    fn test_json_lines_without_header() {
        let output = render(
            OutputFormat::Json,
            vec![sample_record(0, 0), sample_record(1, 1)],
        );
        let lines: Vec<&str> = output.lines().collect();
        assert_eq!(lines.len(), 2);

        let value: serde_json::Value = serde_json::from_str(lines[1]).unwrap();
        assert_eq!(value["index"], 1);
        assert_eq!(value["ip"], "192.0.2.7");
        assert_eq!(value["sync"], "Y");
        assert_eq!(value["round_trip_us"], 30);
        assert_eq!(value["forward_us"], 10);
        assert_eq!(value["loss"], 1);
    }

    #[test]
    fn test_json_sync_follows_delays() {
        let mut record = sample_record(0, 0);
        record.delays = compute_delays(1000, 1050, 1060, 1030);

        let output = render(OutputFormat::Json, vec![record]);
        let value: serde_json::Value = serde_json::from_str(output.trim_end()).unwrap();
        assert_eq!(value["sync"], "N");
        assert_eq!(value["backward_us"], -30);
    }

    #[test]
    fn test_output_format_serializes_lowercase() {
        assert_eq!(serde_json::to_string(&OutputFormat::Csv).unwrap(), "\"csv\"");
        assert_eq!(OutputFormat::default(), OutputFormat::Csv);
    }
}
