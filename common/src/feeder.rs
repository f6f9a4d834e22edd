use crate::config::FeederConfig;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FeederState {
    Idle,
    Running,
}

/// Logical level to drive on the feed pin.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PinCommand {
    High,
    Low,
}

/// Timed feed cycle state machine, advanced once per control-loop tick.
///
/// While a cycle is running the engine re-asserts the pin HIGH once per pulse
/// interval and never drives it LOW until the cycle ends. The shipped firmware
/// behaves this way (a keep-alive pulse, not a blink) and downstream hardware
/// depends on it.
#[derive(Debug, Clone)]
pub struct FeederEngine {
    config: FeederConfig,
    state: FeederState,
    cycle_start_ms: u64,
    cycle_duration_ms: Option<u64>,
    last_pulse_ms: u64,
}

impl FeederEngine {
    pub fn new(config: FeederConfig) -> Self {
        Self {
            config,
            state: FeederState::Idle,
            cycle_start_ms: 0,
            cycle_duration_ms: None,
            last_pulse_ms: 0,
        }
    }

    pub fn state(&self) -> FeederState {
        self.state
    }

    pub fn is_running(&self) -> bool {
        self.state == FeederState::Running
    }

    /// Begins a feed cycle. Returns false without touching the current cycle
    /// if one is already running; cycles never stack or restart.
    ///
    /// `duration_ms` of `None` runs until an explicit [`stop`](Self::stop).
    /// The first pulse fires one pulse interval after the start, not
    /// immediately.
    pub fn start(&mut self, duration_ms: Option<u64>, now_ms: u64) -> bool {
        if self.is_running() {
            return false;
        }

        self.state = FeederState::Running;
        self.cycle_start_ms = now_ms;
        self.cycle_duration_ms = duration_ms;
        self.last_pulse_ms = now_ms;
        true
    }

    /// Ends the cycle unconditionally and forces the pin LOW. Idempotent.
    pub fn stop(&mut self) -> Vec<PinCommand> {
        self.state = FeederState::Idle;
        vec![PinCommand::Low]
    }

    /// Advances the cycle by one tick. No-op while idle.
    pub fn tick(&mut self, now_ms: u64) -> Vec<PinCommand> {
        if !self.is_running() {
            return Vec::new();
        }

        let mut actions = Vec::new();

        if now_ms.saturating_sub(self.last_pulse_ms) >= self.config.pulse_interval_ms {
            self.last_pulse_ms = now_ms;
            actions.push(PinCommand::High);
        }

        if let Some(duration) = self.cycle_duration_ms {
            if now_ms.saturating_sub(self.cycle_start_ms) >= duration {
                self.state = FeederState::Idle;
                actions.push(PinCommand::Low);
            }
        }

        actions
    }

    pub fn remaining_ms(&self, now_ms: u64) -> Option<u64> {
        if !self.is_running() {
            return None;
        }
        self.cycle_duration_ms
            .map(|duration| duration.saturating_sub(now_ms.saturating_sub(self.cycle_start_ms)))
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    fn engine() -> FeederEngine {
        FeederEngine::new(FeederConfig::default())
    }

    #[test]
    fn cycle_expires_after_duration() {
        let mut engine = engine();
        assert!(engine.start(Some(5_000), 0));
        assert_eq!(engine.state(), FeederState::Running);

        assert!(!engine.tick(4_999).contains(&PinCommand::Low));
        assert!(engine.is_running());

        let actions = engine.tick(5_000);
        assert!(actions.contains(&PinCommand::Low));
        assert_eq!(engine.state(), FeederState::Idle);
    }

    #[test]
    fn start_while_running_is_ignored() {
        let mut engine = engine();
        assert!(engine.start(Some(5_000), 0));
        assert!(!engine.start(Some(60_000), 2_000));

        // The in-progress cycle is untouched by the second start.
        assert_eq!(engine.cycle_start_ms, 0);
        assert_eq!(engine.cycle_duration_ms, Some(5_000));

        let actions = engine.tick(5_000);
        assert!(actions.contains(&PinCommand::Low));
        assert!(!engine.is_running());
    }

    #[test]
    fn stop_cancels_cycle_and_suppresses_expiry() {
        let mut engine = engine();
        assert!(engine.start(Some(5_000), 0));
        let _ = engine.tick(1_500);

        assert_eq!(engine.stop(), vec![PinCommand::Low]);
        assert_eq!(engine.state(), FeederState::Idle);

        // No late auto-transition from the cancelled cycle.
        assert_eq!(engine.tick(5_001), Vec::new());
    }

    #[test]
    fn stop_while_idle_is_idempotent() {
        let mut engine = engine();
        assert_eq!(engine.stop(), vec![PinCommand::Low]);
        assert_eq!(engine.stop(), vec![PinCommand::Low]);
        assert_eq!(engine.state(), FeederState::Idle);
    }

    #[test]
    fn unbounded_cycle_runs_until_stopped() {
        let mut engine = engine();
        assert!(engine.start(None, 0));

        let actions = engine.tick(3_600_000);
        assert_eq!(actions, vec![PinCommand::High]);
        assert!(engine.is_running());
        assert_eq!(engine.remaining_ms(3_600_000), None);

        assert_eq!(engine.stop(), vec![PinCommand::Low]);
        assert!(!engine.is_running());
    }

    #[test]
    fn pulse_cadence_asserts_high_never_low_mid_cycle() {
        let mut engine = engine();
        assert!(engine.start(Some(10_000), 0));

        assert_eq!(engine.tick(999), Vec::new());
        assert_eq!(engine.tick(1_000), vec![PinCommand::High]);
        assert_eq!(engine.tick(1_500), Vec::new());
        assert_eq!(engine.tick(2_000), vec![PinCommand::High]);

        for now in (2_100..9_900).step_by(100) {
            assert!(!engine.tick(now).contains(&PinCommand::Low));
        }
    }

    #[test]
    fn pulse_and_expiry_can_share_a_tick() {
        let mut engine = engine();
        assert!(engine.start(Some(5_000), 0));
        for now in [1_000, 2_000, 3_000, 4_000] {
            assert_eq!(engine.tick(now), vec![PinCommand::High]);
        }

        // One tick both re-asserts the pulse and ends the cycle; the final
        // LOW must win.
        assert_eq!(engine.tick(5_000), vec![PinCommand::High, PinCommand::Low]);
        assert_eq!(engine.state(), FeederState::Idle);
    }

    #[test]
    fn remaining_ms_counts_down() {
        let mut engine = engine();
        assert!(engine.start(Some(5_000), 1_000));
        assert_eq!(engine.remaining_ms(1_000), Some(5_000));
        assert_eq!(engine.remaining_ms(3_500), Some(2_500));
        assert_eq!(engine.remaining_ms(9_000), Some(0));
        let _ = engine.tick(6_000);
        assert_eq!(engine.remaining_ms(6_000), None);
    }
}
