//! Error estimate field of TWAMP test packets (RFC 4656 Section 4.1.2).
//!
//! ```text
//!  0                   1
//!  0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! |S|Z|   Scale   |   Multiplier  |
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! ```
//!
//! The estimated error in seconds is `Multiplier * 2^(Scale - 32)`.
//! The client emits a fixed value and never interprets what the reflector
//! sends beyond logging it.

use std::fmt;

use thiserror::Error;

/// Decoded error estimate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ErrorEstimate {
    /// S bit: the clock generating the timestamp is synchronized.
    pub synchronized: bool,
    /// Z bit. Must be zero for NTP-format timestamps.
    pub z_flag: bool,
    /// Scale exponent (0-63).
    pub scale: u8,
    /// Multiplier (0-255).
    pub multiplier: u8,
}

/// Errors raised when building an [`ErrorEstimate`].
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ErrorEstimateError {
    #[error("Scale value {0} exceeds maximum of 63")]
    ScaleOutOfRange(u8),
}

impl ErrorEstimate {
    /// Value stamped on every probe: S=1, Scale=0, Multiplier=1 (`0x8001`).
    pub const SENDER_DEFAULT: ErrorEstimate = ErrorEstimate {
        synchronized: true,
        z_flag: false,
        scale: 0,
        multiplier: 1,
    };

    /// Creates a validated error estimate with the Z bit cleared.
    ///
    /// # Errors
    /// Returns `ErrorEstimateError::ScaleOutOfRange` if scale > 63.
    pub fn new(synchronized: bool, scale: u8, multiplier: u8) -> Result<Self, ErrorEstimateError> {
        if scale > 63 {
            return Err(ErrorEstimateError::ScaleOutOfRange(scale));
        }
        Ok(Self {
            synchronized,
            z_flag: false,
            scale,
            multiplier,
        })
    }

    /// Decodes the 16-bit wire value.
    #[must_use]
    pub fn from_wire(value: u16) -> Self {
        Self {
            synchronized: (value & 0x8000) != 0,
            z_flag: (value & 0x4000) != 0,
            scale: ((value >> 8) & 0x3F) as u8,
            multiplier: (value & 0xFF) as u8,
        }
    }

    /// Encodes to the 16-bit wire value.
    #[must_use]
    pub fn to_wire(&self) -> u16 {
        let s_bit = if self.synchronized { 0x8000u16 } else { 0 };
        let z_bit = if self.z_flag { 0x4000u16 } else { 0 };
        let scale_bits = ((self.scale as u16) & 0x3F) << 8;

        s_bit | z_bit | scale_bits | self.multiplier as u16
    }

    /// Estimated error in seconds.
    #[must_use]
    pub fn error_seconds(&self) -> f64 {
        let exponent = (self.scale as i32) - 32;
        (self.multiplier as f64) * 2.0_f64.powi(exponent)
    }
}

impl From<u16> for ErrorEstimate {
    fn from(value: u16) -> Self {
        Self::from_wire(value)
    }
}

impl From<ErrorEstimate> for u16 {
    fn from(estimate: ErrorEstimate) -> Self {
        estimate.to_wire()
    }
}

impl fmt::Display for ErrorEstimate {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "S={} scale={} mult={} (~{:.3e}s)",
            u8::from(self.synchronized),
            self.scale,
            self.multiplier,
            self.error_seconds()
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sender_default_wire_value() {
        assert_eq!(ErrorEstimate::SENDER_DEFAULT.to_wire(), 0x8001);
        assert_eq!(ErrorEstimate::from_wire(0x8001), ErrorEstimate::SENDER_DEFAULT);
    }

    #[test]
    fn test_wire_format_roundtrip() {
        let test_cases = [(true, 0, 0), (false, 0, 1), (true, 63, 255), (true, 10, 100)];

        for (sync, scale, mult) in test_cases {
            let original = ErrorEstimate::new(sync, scale, mult).unwrap();
            let decoded = ErrorEstimate::from_wire(original.to_wire());
            assert_eq!(
                original, decoded,
                "Roundtrip failed for ({}, {}, {})",
                sync, scale, mult
            );
        }
    }

    #[test]
    fn test_scale_range() {
        assert!(ErrorEstimate::new(false, 63, 1).is_ok());
        assert!(matches!(
            ErrorEstimate::new(false, 64, 1),
            Err(ErrorEstimateError::ScaleOutOfRange(64))
        ));
    }

    #[test]
    fn test_from_wire_fields() {
        let estimate = ErrorEstimate::from_wire(0xCA64);
        assert!(estimate.synchronized);
        assert!(estimate.z_flag);
        assert_eq!(estimate.scale, 10);
        assert_eq!(estimate.multiplier, 100);
    }

    #[test]
    fn test_error_calculation() {
        let estimate = ErrorEstimate::new(false, 32, 1).unwrap();
        assert!((estimate.error_seconds() - 1.0).abs() < 1e-10);

        let expected = 2.0_f64.powi(-32);
        assert!((ErrorEstimate::SENDER_DEFAULT.error_seconds() - expected).abs() < 1e-15);
    }
}
