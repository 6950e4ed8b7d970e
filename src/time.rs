//! NTP-style fixed-point timestamps.
//!
//! A timestamp is a 64-bit value: the high 32 bits hold whole seconds since
//! the NTP epoch (1900-01-01 00:00 UTC), the low 32 bits hold the fractional
//! second scaled to 2^32.

use std::fmt;

use chrono::{DateTime, Utc};

/// Seconds between the NTP epoch (1900) and the Unix epoch (1970).
pub const NTP_UNIX_OFFSET: i64 = 2_208_988_800;

const MICROS_PER_SEC: u64 = 1_000_000;
const NANOS_PER_SEC: u64 = 1_000_000_000;

/// 64-bit fixed-point timestamp as carried on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Timestamp(u64);

impl Timestamp {
    /// Builds a timestamp from its raw 64-bit representation.
    pub const fn from_raw(raw: u64) -> Self {
        Timestamp(raw)
    }

    /// Builds a timestamp from its seconds and fraction halves.
    pub const fn from_parts(seconds: u32, fraction: u32) -> Self {
        Timestamp(((seconds as u64) << 32) | fraction as u64)
    }

    /// Raw 64-bit value.
    pub const fn raw(self) -> u64 {
        self.0
    }

    /// Whole seconds since the NTP epoch.
    pub const fn seconds(self) -> u32 {
        (self.0 >> 32) as u32
    }

    /// Fractional second in units of 2^-32 s.
    pub const fn fraction(self) -> u32 {
        self.0 as u32
    }

    /// Microseconds since the NTP epoch.
    ///
    /// The fraction is truncated toward zero. Every representable timestamp
    /// fits: the largest value is below 2^32 * 10^6, far inside `i64`.
    pub fn to_micros(self) -> i64 {
        let secs = self.seconds() as i64 * MICROS_PER_SEC as i64;
        let frac = ((self.fraction() as u64 * MICROS_PER_SEC) >> 32) as i64;
        secs + frac
    }

    /// Microseconds since the Unix epoch. Negative for pre-1970 timestamps.
    pub fn to_unix_micros(self) -> i64 {
        self.to_micros() - NTP_UNIX_OFFSET * MICROS_PER_SEC as i64
    }

    /// Inverse of [`Timestamp::to_micros`].
    ///
    /// The fraction is rounded up so that `from_micros(x).to_micros() == x`
    /// for every `x` whose seconds part fits in 32 bits. Larger values wrap
    /// the seconds field the same way the NTP era does.
    pub fn from_micros(micros: u64) -> Self {
        let secs = (micros / MICROS_PER_SEC) as u32;
        let rem = micros % MICROS_PER_SEC;
        let fraction = ((rem << 32) + MICROS_PER_SEC - 1) / MICROS_PER_SEC;
        Timestamp::from_parts(secs, fraction as u32)
    }

    /// Converts a UTC date-time to a timestamp with nanosecond-derived fraction.
    pub fn from_datetime(date: DateTime<Utc>) -> Self {
        let secs = (date.timestamp() + NTP_UNIX_OFFSET) as u32;
        let nanos = date.timestamp_subsec_nanos() as u64;
        let fraction = (nanos << 32) / NANOS_PER_SEC;
        Timestamp::from_parts(secs, fraction as u32)
    }

    /// Big-endian wire encoding.
    pub fn to_be_bytes(self) -> [u8; 8] {
        self.0.to_be_bytes()
    }

    /// Decodes the big-endian wire encoding.
    pub fn from_be_bytes(bytes: [u8; 8]) -> Self {
        Timestamp(u64::from_be_bytes(bytes))
    }
}

impl From<u64> for Timestamp {
    fn from(raw: u64) -> Self {
        Timestamp(raw)
    }
}

impl From<Timestamp> for u64 {
    fn from(ts: Timestamp) -> Self {
        ts.0
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}.{:010}", self.seconds(), self.fraction())
    }
}

/// Samples the system clock.
///
/// Wall-clock jumps between two samples show up as skewed delays; they are a
/// known accuracy limit rather than an error.
///
/// ```
/// use twamp_light::time::now;
/// let timestamp = now();
/// println!("Timestamp is {}", timestamp);
/// ```
pub fn now() -> Timestamp {
    Timestamp::from_datetime(Utc::now())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn from_datetime_test() {
        const TEST_CASES: &[(i64, u32)] = &[(1_525_987, 0), (0, 0), (2_584_229, 151_000_000)];

        for &(secs, nanos) in TEST_CASES {
            let sample = DateTime::<Utc>::from_timestamp(secs, nanos).expect("Invalid timestamp");
            let ts = Timestamp::from_datetime(sample);

            assert_eq!(ts.seconds() as i64, secs + NTP_UNIX_OFFSET);

            let expected_micros = sample.timestamp_subsec_micros() as i64;
            let actual_micros = ts.to_micros() % 1_000_000;
            assert!(
                (expected_micros - actual_micros).abs() <= 1,
                "Mismatch in fractional micros: expected {}, got {}",
                expected_micros,
                actual_micros
            );
        }
    }

    #[test]
    fn test_to_micros_known_values() {
        assert_eq!(Timestamp::from_parts(0, 0).to_micros(), 0);
        assert_eq!(Timestamp::from_parts(1, 0).to_micros(), 1_000_000);
        // Half a second.
        assert_eq!(Timestamp::from_parts(2, 0x8000_0000).to_micros(), 2_500_000);
        // Largest fraction is just under one second.
        assert_eq!(Timestamp::from_parts(0, u32::MAX).to_micros(), 999_999);
    }

    #[test]
    fn test_to_micros_no_overflow_at_era_end() {
        let ts = Timestamp::from_parts(u32::MAX, u32::MAX);
        assert_eq!(ts.to_micros(), u32::MAX as i64 * 1_000_000 + 999_999);
    }

    #[test]
    fn test_micros_roundtrip_within_one_unit() {
        let samples = [
            Timestamp::from_parts(0, 0),
            Timestamp::from_parts(0, 1),
            Timestamp::from_parts(3_900_000_000, 0x1234_5678),
            Timestamp::from_parts(3_900_000_000, u32::MAX),
            Timestamp::from_parts(u32::MAX, 0xDEAD_BEEF),
            now(),
        ];

        // One microsecond spans 2^32 / 10^6 fraction units.
        let max_error = (1u64 << 32) / 1_000_000 + 1;
        for ts in samples {
            let micros = ts.to_micros();
            let back = Timestamp::from_micros(micros as u64);
            assert_eq!(back.to_micros(), micros, "micros not preserved for {}", ts);
            assert!(
                back.raw().abs_diff(ts.raw()) <= max_error,
                "{} drifted to {}",
                ts,
                back
            );
        }
    }

    #[test]
    fn test_from_micros_exact_for_every_sub_second_offset() {
        for rem in (0..1_000_000u64).step_by(997) {
            let micros = 3_912_345_678 * 1_000_000 + rem;
            assert_eq!(Timestamp::from_micros(micros).to_micros(), micros as i64);
        }
    }

    #[test]
    fn test_unix_micros() {
        let sample = DateTime::<Utc>::from_timestamp(1_700_000_000, 250_000_000).unwrap();
        let ts = Timestamp::from_datetime(sample);
        assert_eq!(ts.to_unix_micros(), 1_700_000_000_250_000);
    }

    #[test]
    fn test_be_bytes_layout() {
        let ts = Timestamp::from_parts(0x0102_0304, 0x0506_0708);
        assert_eq!(ts.to_be_bytes(), [1, 2, 3, 4, 5, 6, 7, 8]);
        assert_eq!(Timestamp::from_be_bytes(ts.to_be_bytes()), ts);
    }

    #[test]
    fn test_now_is_non_decreasing() {
        let first = now();
        let second = now();
        assert!(second >= first);
        assert!(first.to_unix_micros() > 0);
    }
}
