use serde::{Deserialize, Serialize};

/// Default number of songs between announcements.
pub const DEFAULT_FREQUENCY: i32 = 3;

/// Frequency-based decision logic for whether an announcement is due.
///
/// Persisted as part of the radio settings so the counter survives restarts.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AnnouncementGate {
    #[serde(default)]
    pub enabled: bool,
    /// Announce every N songs. Values <= 0 mean "every boundary".
    #[serde(default = "default_frequency")]
    pub frequency: i32,
    /// Songs played since the last announcement.
    #[serde(default)]
    pub songs_since_last: u32,
}

fn default_frequency() -> i32 {
    DEFAULT_FREQUENCY
}

/// Snapshot returned by the peek and check endpoints.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct GateStatus {
    pub should_announce: bool,
    pub enabled: bool,
    pub current_count: u32,
    pub frequency: i32,
}

impl AnnouncementGate {
    pub fn new(enabled: bool, frequency: i32) -> Self {
        AnnouncementGate {
            enabled,
            frequency,
            songs_since_last: 0,
        }
    }

    /// Reports what the next `consume` would report, without side effects.
    pub fn peek(&self) -> bool {
        self.enabled && self.is_due_at(self.songs_since_last.saturating_add(1))
    }

    /// Count one song boundary. Resets the counter iff the announcement is due.
    pub fn consume(&mut self) -> bool {
        if !self.enabled {
            return false;
        }
        self.songs_since_last = self.songs_since_last.saturating_add(1);
        let due = self.is_due_at(self.songs_since_last);
        if due {
            self.songs_since_last = 0;
        }
        due
    }

    pub fn peek_status(&self) -> GateStatus {
        GateStatus {
            should_announce: self.peek(),
            enabled: self.enabled,
            current_count: self.songs_since_last,
            frequency: self.frequency,
        }
    }

    pub fn consume_status(&mut self) -> GateStatus {
        let due = self.consume();
        GateStatus {
            should_announce: due,
            enabled: self.enabled,
            current_count: self.songs_since_last,
            frequency: self.frequency,
        }
    }

    pub fn reset_counter(&mut self) {
        self.songs_since_last = 0;
    }

    fn is_due_at(&self, count: u32) -> bool {
        if self.frequency <= 0 {
            return true;
        }
        count >= self.frequency as u32
    }
}

impl Default for AnnouncementGate {
    fn default() -> Self {
        AnnouncementGate::new(false, DEFAULT_FREQUENCY)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn peek_reports_due_iff_next_count_reaches_frequency() {
        for n in 1..=6 {
            for c in 0..8u32 {
                let gate = AnnouncementGate {
                    enabled: true,
                    frequency: n,
                    songs_since_last: c,
                };
                assert_eq!(gate.peek(), c + 1 >= n as u32, "n={} c={}", n, c);
            }
        }
    }

    #[test]
    fn peek_is_idempotent() {
        let gate = AnnouncementGate {
            enabled: true,
            frequency: 3,
            songs_since_last: 2,
        };
        let before = gate.clone();
        assert!(gate.peek());
        assert!(gate.peek());
        assert_eq!(gate, before);
    }

    #[test]
    fn consume_due_exactly_on_nth_call() {
        for n in 1..=5 {
            let mut gate = AnnouncementGate::new(true, n);
            for call in 1..=n {
                let due = gate.consume();
                assert_eq!(due, call == n, "n={} call={}", n, call);
            }
            assert_eq!(gate.songs_since_last, 0);
        }
    }

    #[test]
    fn frequency_three_sequence() {
        let mut gate = AnnouncementGate::new(true, 3);

        let first = gate.consume_status();
        assert!(!first.should_announce);
        assert_eq!(first.current_count, 1);

        let second = gate.consume_status();
        assert!(!second.should_announce);
        assert_eq!(second.current_count, 2);

        let third = gate.consume_status();
        assert!(third.should_announce);
        assert_eq!(third.current_count, 0);
    }

    #[test]
    fn disabled_gate_is_a_no_op() {
        let mut gate = AnnouncementGate::new(false, 1);
        assert!(!gate.peek());
        assert!(!gate.consume());
        assert_eq!(gate.songs_since_last, 0);
        assert!(!gate.peek_status().enabled);
    }

    #[test]
    fn non_positive_frequency_is_always_due() {
        let mut gate = AnnouncementGate::new(true, 0);
        assert!(gate.peek());
        assert!(gate.consume());
        assert!(gate.consume());

        let mut negative = AnnouncementGate::new(true, -4);
        assert!(negative.consume());
        assert_eq!(negative.songs_since_last, 0);
    }

    #[test]
    fn status_serializes_camel_case() {
        let gate = AnnouncementGate::new(true, 2);
        let json = serde_json::to_string(&gate.peek_status()).unwrap();
        assert!(json.contains("\"shouldAnnounce\":false"));
        assert!(json.contains("\"currentCount\":0"));
        assert!(json.contains("\"frequency\":2"));
    }

    #[test]
    fn counter_defaults_when_missing_from_json() {
        let gate: AnnouncementGate = serde_json::from_str(r#"{"enabled":true}"#).unwrap();
        assert_eq!(gate.frequency, DEFAULT_FREQUENCY);
        assert_eq!(gate.songs_since_last, 0);
    }
}
