//! In-flight probe tracking.
//!
//! Maps the 16-bit ICMP sequence field back to the 64-bit running sequence
//! and remembers whether a probe was already answered, so a second reply is
//! reported as a duplicate. The wire sequence wraps every 65536 probes; a new
//! probe simply replaces the entry it collides with.

use std::collections::HashMap;
use std::time::{Duration, Instant};

/// A probe that has been sent
#[derive(Debug, Clone, Copy)]
pub struct InFlight {
    pub sequence: u64,
    pub sent_at: Instant,
    pub answered: bool,
}

/// How a reply relates to the probe it answers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resolution {
    First { sequence: u64, rtt: Duration },
    Duplicate { sequence: u64, rtt: Duration },
}

/// Map from wire sequence to in-flight probe
#[derive(Debug, Default)]
pub struct PendingTable {
    probes: HashMap<u16, InFlight>,
}

/// Wire representation of a running sequence number
pub fn wire_sequence(sequence: u64) -> u16 {
    (sequence & 0xFFFF) as u16
}

impl PendingTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a probe before it is sent
    pub fn insert(&mut self, sequence: u64, sent_at: Instant) {
        self.probes.insert(
            wire_sequence(sequence),
            InFlight {
                sequence,
                sent_at,
                answered: false,
            },
        );
    }

    /// Forget a probe whose send failed
    pub fn remove(&mut self, sequence: u64) {
        let wire = wire_sequence(sequence);
        if self.probes.get(&wire).is_some_and(|p| p.sequence == sequence) {
            self.probes.remove(&wire);
        }
    }

    /// Match a reply; `None` if no probe with that wire sequence was sent
    pub fn resolve(&mut self, wire: u16, received_at: Instant) -> Option<Resolution> {
        let probe = self.probes.get_mut(&wire)?;
        let sequence = probe.sequence;
        let rtt = received_at.saturating_duration_since(probe.sent_at);

        if probe.answered {
            Some(Resolution::Duplicate { sequence, rtt })
        } else {
            probe.answered = true;
            Some(Resolution::First { sequence, rtt })
        }
    }

    /// Number of probes sent but not yet answered
    pub fn outstanding(&self) -> usize {
        self.probes.values().filter(|p| !p.answered).count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_first_then_duplicate() {
        let mut table = PendingTable::new();
        let sent = Instant::now();
        table.insert(3, sent);

        let later = sent + Duration::from_millis(12);
        assert_eq!(
            table.resolve(3, later),
            Some(Resolution::First {
                sequence: 3,
                rtt: Duration::from_millis(12)
            })
        );
        assert!(matches!(
            table.resolve(3, later),
            Some(Resolution::Duplicate { sequence: 3, .. })
        ));
    }

    #[test]
    fn test_unknown_sequence() {
        let mut table = PendingTable::new();
        assert!(table.resolve(9, Instant::now()).is_none());
    }

    #[test]
    fn test_wraparound_maps_to_running_sequence() {
        let mut table = PendingTable::new();
        let sent = Instant::now();
        table.insert(65536 + 4, sent);
        assert_eq!(wire_sequence(65536 + 4), 4);
        assert!(matches!(
            table.resolve(4, sent),
            Some(Resolution::First { sequence: 65540, .. })
        ));
    }

    #[test]
    fn test_outstanding_and_remove() {
        let mut table = PendingTable::new();
        let now = Instant::now();
        table.insert(0, now);
        table.insert(1, now);
        assert_eq!(table.outstanding(), 2);

        table.resolve(0, now);
        assert_eq!(table.outstanding(), 1);

        table.remove(1);
        assert_eq!(table.outstanding(), 0);
        assert!(table.resolve(1, now).is_none());
    }
}
