//! Per-run probe bookkeeping.

/// Counters of one measurement run.
///
/// Sequence numbers start at 0 and match the probe index. The loss counter
/// only ever grows.
#[derive(Debug, Default)]
pub struct Session {
    next_seq: u32,
    sent: u32,
    received: u32,
    lost: u32,
}

impl Session {
    pub fn new() -> Session {
        Session::default()
    }

    /// Returns the sequence number for the next probe.
    pub fn generate_sequence_number(&mut self) -> u32 {
        let seq = self.next_seq;
        self.next_seq = self.next_seq.wrapping_add(1);
        seq
    }

    pub fn record_sent(&mut self) {
        self.sent += 1;
    }

    pub fn record_received(&mut self) {
        self.received += 1;
    }

    pub fn record_loss(&mut self) {
        self.lost += 1;
    }

    /// Probes lost so far.
    pub fn lost(&self) -> u32 {
        self.lost
    }

    pub fn summary(&self) -> SessionSummary {
        SessionSummary {
            packets_sent: self.sent,
            packets_received: self.received,
            packets_lost: self.lost,
        }
    }
}

/// Totals returned when a run completes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionSummary {
    pub packets_sent: u32,
    pub packets_received: u32,
    pub packets_lost: u32,
}

impl SessionSummary {
    pub fn loss_percent(&self) -> f64 {
        if self.packets_sent == 0 {
            return 0.0;
        }
        self.packets_lost as f64 * 100.0 / self.packets_sent as f64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sequence_starts_at_zero() {
        let mut session = Session::new();
        assert_eq!(session.generate_sequence_number(), 0);
        assert_eq!(session.generate_sequence_number(), 1);
        assert_eq!(session.generate_sequence_number(), 2);
    }

    #[test]
    fn test_counters() {
        let mut session = Session::new();
        for _ in 0..4 {
            session.record_sent();
        }
        session.record_received();
        session.record_received();
        session.record_loss();
        assert_eq!(session.lost(), 1);
        session.record_loss();

        let summary = session.summary();
        assert_eq!(
            summary,
            SessionSummary {
                packets_sent: 4,
                packets_received: 2,
                packets_lost: 2,
            }
        );
        assert!((summary.loss_percent() - 50.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_loss_percent_empty_run() {
        assert_eq!(Session::new().summary().loss_percent(), 0.0);
    }
}
