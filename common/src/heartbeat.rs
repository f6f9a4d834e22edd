/// Periodic liveness announcement schedule.
///
/// Deliberately independent of command traffic: nothing outside `poll` touches
/// `last_sent_ms`, so inbound messages can never push the next beat out. The
/// first beat lands one full interval after boot; the retained "online"
/// published at connect covers the gap.
#[derive(Debug, Clone)]
pub struct HeartbeatSchedule {
    interval_ms: u64,
    last_sent_ms: u64,
}

impl HeartbeatSchedule {
    pub fn new(interval_ms: u64) -> Self {
        Self {
            interval_ms,
            last_sent_ms: 0,
        }
    }

    /// Returns true when a heartbeat is due and stamps the send time.
    pub fn poll(&mut self, now_ms: u64) -> bool {
        if now_ms.saturating_sub(self.last_sent_ms) > self.interval_ms {
            self.last_sent_ms = now_ms;
            true
        } else {
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_beat_is_one_full_interval_after_boot() {
        let mut schedule = HeartbeatSchedule::new(120_000);
        assert!(!schedule.poll(0));
        assert!(!schedule.poll(120_000));
        assert!(schedule.poll(120_001));
    }

    #[test]
    fn at_most_one_beat_per_window() {
        let mut schedule = HeartbeatSchedule::new(120_000);
        assert!(schedule.poll(120_001));
        assert!(!schedule.poll(120_002));
        assert!(!schedule.poll(240_001));
        assert!(schedule.poll(240_002));
    }

    #[test]
    fn late_polls_still_fire() {
        let mut schedule = HeartbeatSchedule::new(120_000);
        // A stalled loop (outage, firmware download) polls late; the beat must
        // still go out on the next poll.
        assert!(schedule.poll(900_000));
        assert!(!schedule.poll(900_001));
    }
}
