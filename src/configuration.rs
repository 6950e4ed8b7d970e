//! Command-line configuration of the client and the reflector.

use std::{net::Ipv4Addr, time::Duration};

pub use clap::Parser;
use thiserror::Error;

use crate::{
    packets::{MAX_PAYLOAD_LEN, PROBE_HEADER_SIZE},
    report::OutputFormat,
    sender::SessionParams,
};

/// Rejected configuration values.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigurationError {
    #[error("payload length {len} out of range ({min}-{max} bytes)")]
    InvalidPayloadLength { len: usize, min: usize, max: usize },
    #[error("probe count must be at least 1")]
    ZeroCount,
    #[error("response timeout must be at least 1 second")]
    ZeroTimeout,
}

/// TWAMP-Light client options.
#[derive(Parser, Debug, Clone)]
#[command(version, about, long_about = None)]
pub struct Configuration {
    /// Reflector host name or IPv4 address
    #[arg(short, long)]
    pub remote_host: String,
    /// Reflector UDP port
    #[arg(short = 'p', long, default_value_t = 862)]
    pub remote_port: u16,
    /// Local IPv4 address to bind to
    #[arg(short, long, default_value = "0.0.0.0")]
    pub local_host: Ipv4Addr,
    /// Local UDP port (0 picks an ephemeral port)
    #[arg(short = 'o', long, default_value_t = 0)]
    pub local_port: u16,
    /// Probe payload length in bytes
    #[arg(short = 's', long, default_value_t = 50)]
    pub payload_len: usize,
    /// Seconds to wait for each reflection
    #[arg(short, long, default_value_t = 1)]
    pub timeout: u64,
    /// IP TOS byte set on outgoing probes
    #[arg(long, default_value_t = 0)]
    pub tos: u8,
    /// Number of probes to send
    #[arg(short, long, default_value_t = 10)]
    pub count: u32,
    /// Milliseconds between successive probes
    #[arg(short, long, default_value_t = 100)]
    pub interval: u64,
    /// Drop reflections whose echoed sequence number is not the one awaited
    #[arg(long)]
    pub strict_sequence: bool,
    /// Report format
    #[arg(short = 'f', long, value_enum, default_value_t = OutputFormat::Csv)]
    pub output_format: OutputFormat,
}

impl Configuration {
    pub fn validate(&self) -> Result<(), ConfigurationError> {
        if !(PROBE_HEADER_SIZE..=MAX_PAYLOAD_LEN).contains(&self.payload_len) {
            return Err(ConfigurationError::InvalidPayloadLength {
                len: self.payload_len,
                min: PROBE_HEADER_SIZE,
                max: MAX_PAYLOAD_LEN,
            });
        }
        if self.count == 0 {
            return Err(ConfigurationError::ZeroCount);
        }
        if self.timeout == 0 {
            return Err(ConfigurationError::ZeroTimeout);
        }
        Ok(())
    }

    /// Driver parameters for this configuration.
    pub fn session_params(&self) -> SessionParams {
        SessionParams {
            count: self.count,
            payload_len: self.payload_len,
            timeout: Duration::from_secs(self.timeout),
            interval: Duration::from_millis(self.interval),
            strict_sequence: self.strict_sequence,
        }
    }
}

/// Reflector options.
#[derive(Parser, Debug, Clone)]
#[command(version, about = "TWAMP-Light reflector", long_about = None)]
pub struct ReflectorConfiguration {
    /// Local IPv4 address to listen on
    #[arg(short, long, default_value = "0.0.0.0")]
    pub local_host: Ipv4Addr,
    /// Local UDP port to listen on
    #[arg(short = 'o', long, default_value_t = 862)]
    pub local_port: u16,
    /// IP TOS byte set on outgoing reflections
    #[arg(long, default_value_t = 0)]
    pub tos: u8,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Configuration {
        Configuration::try_parse_from(std::iter::once("twamp-sender").chain(args.iter().copied()))
            .unwrap()
    }

    #[test]
    fn test_defaults() {
        let conf = parse(&["-r", "192.0.2.1"]);

        assert_eq!(conf.remote_host, "192.0.2.1");
        assert_eq!(conf.remote_port, 862);
        assert_eq!(conf.local_host, Ipv4Addr::UNSPECIFIED);
        assert_eq!(conf.local_port, 0);
        assert_eq!(conf.payload_len, 50);
        assert_eq!(conf.timeout, 1);
        assert_eq!(conf.tos, 0);
        assert_eq!(conf.count, 10);
        assert_eq!(conf.interval, 100);
        assert!(!conf.strict_sequence);
        assert_eq!(conf.output_format, OutputFormat::Csv);
        assert_eq!(conf.validate(), Ok(()));
    }

    #[test]
    fn test_all_options() {
        let conf = parse(&[
            "--remote-host",
            "reflector.example",
            "-p",
            "5000",
            "-l",
            "10.0.0.2",
            "-o",
            "40000",
            "-s",
            "128",
            "-t",
            "3",
            "--tos",
            "184",
            "-c",
            "5",
            "-i",
            "0",
            "--strict-sequence",
            "--output-format",
            "json",
        ]);

        assert_eq!(conf.remote_port, 5000);
        assert_eq!(conf.local_host, Ipv4Addr::new(10, 0, 0, 2));
        assert_eq!(conf.tos, 184);
        assert_eq!(conf.output_format, OutputFormat::Json);
        assert_eq!(
            conf.session_params(),
            SessionParams {
                count: 5,
                payload_len: 128,
                timeout: Duration::from_secs(3),
                interval: Duration::ZERO,
                strict_sequence: true,
            }
        );
    }

    #[test]
    fn test_remote_host_required() {
        assert!(Configuration::try_parse_from(["twamp-sender"]).is_err());
    }

    #[test]
    fn test_rejects_ipv6_local_host() {
        assert!(
            Configuration::try_parse_from(["twamp-sender", "-r", "h", "-l", "::1"]).is_err()
        );
    }

    #[test]
    fn test_validate_payload_len() {
        let mut conf = parse(&["-r", "h", "-s", "14"]);
        assert_eq!(conf.validate(), Ok(()));

        conf.payload_len = 13;
        assert_eq!(
            conf.validate(),
            Err(ConfigurationError::InvalidPayloadLength {
                len: 13,
                min: 14,
                max: 65_507
            })
        );

        conf.payload_len = 65_508;
        assert!(conf.validate().is_err());
    }

    #[test]
    fn test_validate_count_and_timeout() {
        let conf = parse(&["-r", "h", "-c", "0"]);
        assert_eq!(conf.validate(), Err(ConfigurationError::ZeroCount));

        let conf = parse(&["-r", "h", "-t", "0"]);
        assert_eq!(conf.validate(), Err(ConfigurationError::ZeroTimeout));
    }

    #[test]
    fn test_reflector_defaults() {
        let conf = ReflectorConfiguration::try_parse_from(["twamp-reflector"]).unwrap();
        assert_eq!(conf.local_host, Ipv4Addr::UNSPECIFIED);
        assert_eq!(conf.local_port, 862);
        assert_eq!(conf.tos, 0);
    }
}
