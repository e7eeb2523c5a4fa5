use serde::Serialize;
use tokio::sync::mpsc;

pub const DEFAULT_WORK_MINUTES: u64 = 25; // Default Pomodoro work time
pub const DEFAULT_SHORT_BREAK_MINUTES: u64 = 5; // Default short break
pub const DEFAULT_LONG_BREAK_MINUTES: u64 = 15; // Default long break
pub const SESSIONS_PER_LONG_BREAK: u32 = 4; // Every 4th work session earns the long break

// Settings bounds, in minutes
const WORK_MINUTES_MAX: u64 = 60;
const SHORT_BREAK_MINUTES_MAX: u64 = 30;
const LONG_BREAK_MINUTES_MAX: u64 = 60;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Phase {
    Work,
    Break,
}

impl Phase {
    pub fn as_str(&self) -> &str {
        match self {
            Phase::Work => "WORK",
            Phase::Break => "BREAK",
        }
    }

    pub fn emoji(&self) -> &str {
        match self {
            Phase::Work => "🔴",
            Phase::Break => "🟢",
        }
    }
}

/// Fired on every phase completion (natural countdown or skip).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PhaseEvent {
    pub previous_phase: Phase,
    pub new_phase: Phase,
    pub long_break: bool,
}

pub type EventSender = mpsc::UnboundedSender<PhaseEvent>;
pub type EventReceiver = mpsc::UnboundedReceiver<PhaseEvent>;

pub fn create_event_channel() -> (EventSender, EventReceiver) {
    mpsc::unbounded_channel()
}

/// Snapshot for whatever renders the timer (terminal, WebSocket client).
#[derive(Debug, Clone, Serialize)]
pub struct DisplayState {
    pub phase: Phase,
    pub clock: String, // MM:SS
    pub sessions_completed: u32,
    pub long_break_next: bool,
}

/// The countdown state machine. One instance per process, owned by main and
/// shared behind a mutex; every mutation goes through the methods below.
///
/// Phases alternate WORK -> BREAK -> WORK. A completed phase always lands
/// paused; the caller decides when to start the next countdown.
#[derive(Debug)]
pub struct TimerEngine {
    work_duration: u64, // seconds
    short_break_duration: u64,
    long_break_duration: u64,
    phase: Phase,
    remaining: u64,
    running: bool,
    sessions_completed: u32,
    events: EventSender,
}

impl TimerEngine {
    pub fn new(events: EventSender) -> Self {
        Self {
            work_duration: DEFAULT_WORK_MINUTES * 60,
            short_break_duration: DEFAULT_SHORT_BREAK_MINUTES * 60,
            long_break_duration: DEFAULT_LONG_BREAK_MINUTES * 60,
            phase: Phase::Work,
            remaining: DEFAULT_WORK_MINUTES * 60,
            running: false,
            sessions_completed: 0,
            events,
        }
    }

    pub fn start(&mut self) {
        self.running = true;
    }

    pub fn pause(&mut self) {
        self.running = false;
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn remaining(&self) -> u64 {
        self.remaining
    }

    pub fn sessions_completed(&self) -> u32 {
        self.sessions_completed
    }

    /// Advance the countdown by the measured elapsed whole seconds.
    ///
    /// A delayed or coalesced wakeup passes the real elapsed count so the
    /// clock never drifts; the decrement saturates at zero. Reaching zero
    /// completes the phase. Ticks while paused are ignored.
    pub fn tick(&mut self, elapsed_secs: u64) {
        if !self.running {
            return;
        }
        if self.remaining > 0 {
            self.remaining = self.remaining.saturating_sub(elapsed_secs);
        }
        if self.remaining == 0 {
            self.complete_phase();
        }
    }

    /// Force the current phase to complete, exactly as if it had counted
    /// down to zero. Skipping a work phase still counts the session.
    pub fn skip(&mut self) {
        self.running = false;
        self.complete_phase();
    }

    /// Pause and restore the current phase's full duration. Phase and
    /// session count are untouched.
    pub fn reset(&mut self) {
        self.running = false;
        self.remaining = match self.phase {
            Phase::Work => self.work_duration,
            Phase::Break => {
                if self.on_long_break() {
                    self.long_break_duration
                } else {
                    self.short_break_duration
                }
            }
        };
    }

    /// Store new durations (minutes). Ignored while running; out-of-range
    /// values are dropped without touching any state. During a work phase
    /// the countdown restarts from the new work duration.
    pub fn update_settings(&mut self, work_min: u64, short_min: u64, long_min: u64) -> bool {
        if self.running {
            return false;
        }
        if !(1..=WORK_MINUTES_MAX).contains(&work_min)
            || !(1..=SHORT_BREAK_MINUTES_MAX).contains(&short_min)
            || !(1..=LONG_BREAK_MINUTES_MAX).contains(&long_min)
        {
            return false;
        }
        self.work_duration = work_min * 60;
        self.short_break_duration = short_min * 60;
        self.long_break_duration = long_min * 60;
        if self.phase == Phase::Work {
            self.remaining = self.work_duration;
        }
        true
    }

    pub fn current_display(&self) -> DisplayState {
        DisplayState {
            phase: self.phase,
            clock: format_clock(self.remaining),
            sessions_completed: self.sessions_completed,
            long_break_next: (self.sessions_completed + 1) % SESSIONS_PER_LONG_BREAK == 0,
        }
    }

    // Whether the break in progress (or about to resume) is the long one.
    // Derived from the session count, never stored.
    fn on_long_break(&self) -> bool {
        self.sessions_completed > 0 && self.sessions_completed % SESSIONS_PER_LONG_BREAK == 0
    }

    fn complete_phase(&mut self) {
        self.running = false;
        let previous_phase = self.phase;
        let long_break;
        match self.phase {
            Phase::Work => {
                self.sessions_completed += 1;
                long_break = self.sessions_completed % SESSIONS_PER_LONG_BREAK == 0;
                self.remaining = if long_break {
                    self.long_break_duration
                } else {
                    self.short_break_duration
                };
                self.phase = Phase::Break;
            }
            Phase::Break => {
                long_break = false;
                self.remaining = self.work_duration;
                self.phase = Phase::Work;
            }
        }
        // Fire-and-forget; a dropped receiver just means nobody is listening
        let _ = self.events.send(PhaseEvent {
            previous_phase,
            new_phase: self.phase,
            long_break,
        });
    }
}

/// Format seconds as zero-padded MM:SS.
pub fn format_clock(seconds: u64) -> String {
    format!("{:02}:{:02}", seconds / 60, seconds % 60)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn new_engine() -> (TimerEngine, EventReceiver) {
        let (tx, rx) = create_event_channel();
        (TimerEngine::new(tx), rx)
    }

    fn tick_n(engine: &mut TimerEngine, n: u64) {
        for _ in 0..n {
            engine.tick(1);
        }
    }

    // Run one full work phase to completion, starting again afterwards if
    // more phases are needed.
    fn complete_work_phase(engine: &mut TimerEngine) {
        engine.start();
        while engine.phase() == Phase::Work {
            engine.tick(1);
        }
    }

    #[test]
    fn test_initial_state() {
        let (engine, _rx) = new_engine();
        assert_eq!(engine.phase(), Phase::Work);
        assert_eq!(engine.remaining(), 1500);
        assert!(!engine.is_running());
        assert_eq!(engine.sessions_completed(), 0);
    }

    #[test]
    fn test_format_clock() {
        assert_eq!(format_clock(1500), "25:00");
        assert_eq!(format_clock(65), "01:05");
        assert_eq!(format_clock(0), "00:00");
        assert_eq!(format_clock(9), "00:09");
    }

    #[test]
    fn test_update_settings_resets_work_remaining() {
        let (mut engine, _rx) = new_engine();
        for minutes in [1u64, 30, 60] {
            assert!(engine.update_settings(minutes, 5, 15));
            assert_eq!(engine.remaining(), minutes * 60);
        }
    }

    #[test]
    fn test_update_settings_ignored_while_running() {
        let (mut engine, _rx) = new_engine();
        engine.start();
        tick_n(&mut engine, 10);
        assert!(!engine.update_settings(10, 2, 20));
        assert_eq!(engine.remaining(), 1490);
        assert_eq!(engine.phase(), Phase::Work);
        // Pausing afterwards reveals the durations were never stored
        engine.pause();
        engine.reset();
        assert_eq!(engine.remaining(), 1500);
    }

    #[test]
    fn test_update_settings_rejects_out_of_range() {
        let (mut engine, _rx) = new_engine();
        assert!(!engine.update_settings(0, 5, 15));
        assert!(!engine.update_settings(61, 5, 15));
        assert!(!engine.update_settings(25, 0, 15));
        assert!(!engine.update_settings(25, 31, 15));
        assert!(!engine.update_settings(25, 5, 0));
        assert!(!engine.update_settings(25, 5, 61));
        assert_eq!(engine.remaining(), 1500);
    }

    #[test]
    fn test_update_settings_leaves_break_remaining() {
        let (mut engine, _rx) = new_engine();
        complete_work_phase(&mut engine);
        assert_eq!(engine.phase(), Phase::Break);
        assert_eq!(engine.remaining(), 300);
        assert!(engine.update_settings(50, 10, 20));
        // Break countdown untouched until the next transition or reset
        assert_eq!(engine.remaining(), 300);
        engine.reset();
        assert_eq!(engine.remaining(), 600);
    }

    #[test]
    fn test_full_work_countdown() {
        let (mut engine, mut rx) = new_engine();
        engine.start();
        tick_n(&mut engine, 1500);
        assert_eq!(engine.phase(), Phase::Break);
        assert_eq!(engine.remaining(), 300);
        assert_eq!(engine.sessions_completed(), 1);
        assert!(!engine.is_running());
        let event = rx.try_recv().expect("one completion event");
        assert_eq!(event.previous_phase, Phase::Work);
        assert_eq!(event.new_phase, Phase::Break);
        assert!(!event.long_break);
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_break_completion_keeps_session_count() {
        let (mut engine, mut rx) = new_engine();
        complete_work_phase(&mut engine);
        rx.try_recv().expect("work completion event");
        engine.start();
        tick_n(&mut engine, 300);
        assert_eq!(engine.phase(), Phase::Work);
        assert_eq!(engine.remaining(), 1500);
        assert_eq!(engine.sessions_completed(), 1);
        let event = rx.try_recv().expect("break completion event");
        assert_eq!(event.previous_phase, Phase::Break);
        assert_eq!(event.new_phase, Phase::Work);
        assert!(!event.long_break);
    }

    #[test]
    fn test_long_break_after_fourth_session() {
        let (mut engine, mut rx) = new_engine();
        for session in 1..=4u32 {
            complete_work_phase(&mut engine);
            let event = rx.try_recv().expect("completion event");
            assert_eq!(engine.sessions_completed(), session);
            if session == 4 {
                assert!(event.long_break);
                assert_eq!(engine.remaining(), 900);
            } else {
                assert!(!event.long_break);
                assert_eq!(engine.remaining(), 300);
            }
            // Finish the break before the next work session
            engine.start();
            while engine.phase() == Phase::Break {
                engine.tick(1);
            }
            rx.try_recv().expect("break completion event");
        }
    }

    #[test]
    fn test_skip_matches_natural_completion() {
        let (mut natural, _rx_a) = new_engine();
        natural.start();
        tick_n(&mut natural, 1500);

        let (mut skipped, mut rx_b) = new_engine();
        skipped.start();
        tick_n(&mut skipped, 5);
        skipped.skip();

        assert_eq!(skipped.phase(), natural.phase());
        assert_eq!(skipped.remaining(), natural.remaining());
        assert_eq!(skipped.sessions_completed(), natural.sessions_completed());
        assert!(!skipped.is_running());
        let event = rx_b.try_recv().expect("skip emits the completion event");
        assert_eq!(event.new_phase, Phase::Break);
    }

    #[test]
    fn test_skip_works_while_paused() {
        let (mut engine, mut rx) = new_engine();
        engine.skip();
        assert_eq!(engine.phase(), Phase::Break);
        assert_eq!(engine.sessions_completed(), 1);
        assert!(rx.try_recv().is_ok());
    }

    #[test]
    fn test_reset_keeps_phase_and_sessions() {
        let (mut engine, _rx) = new_engine();
        engine.start();
        tick_n(&mut engine, 100);
        engine.reset();
        assert!(!engine.is_running());
        assert_eq!(engine.phase(), Phase::Work);
        assert_eq!(engine.remaining(), 1500);
        assert_eq!(engine.sessions_completed(), 0);
    }

    #[test]
    fn test_reset_during_long_break() {
        let (mut engine, _rx) = new_engine();
        for _ in 0..4 {
            complete_work_phase(&mut engine);
            if engine.sessions_completed() < 4 {
                engine.start();
                while engine.phase() == Phase::Break {
                    engine.tick(1);
                }
            }
        }
        assert_eq!(engine.sessions_completed(), 4);
        engine.start();
        tick_n(&mut engine, 30);
        engine.reset();
        assert_eq!(engine.phase(), Phase::Break);
        assert_eq!(engine.remaining(), 900);
    }

    #[test]
    fn test_pause_idempotent() {
        let (mut engine, _rx) = new_engine();
        engine.start();
        tick_n(&mut engine, 3);
        engine.pause();
        let remaining = engine.remaining();
        engine.pause();
        assert!(!engine.is_running());
        assert_eq!(engine.remaining(), remaining);
    }

    #[test]
    fn test_start_noop_while_running() {
        let (mut engine, _rx) = new_engine();
        engine.start();
        tick_n(&mut engine, 3);
        engine.start();
        assert!(engine.is_running());
        assert_eq!(engine.remaining(), 1497);
    }

    #[test]
    fn test_ticks_ignored_while_paused() {
        let (mut engine, mut rx) = new_engine();
        tick_n(&mut engine, 50);
        assert_eq!(engine.remaining(), 1500);
        engine.start();
        engine.pause();
        tick_n(&mut engine, 50);
        assert_eq!(engine.remaining(), 1500);
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_coalesced_tick_decrements_by_elapsed() {
        let (mut engine, _rx) = new_engine();
        engine.start();
        engine.tick(3);
        assert_eq!(engine.remaining(), 1497);
    }

    #[test]
    fn test_coalesced_tick_never_goes_negative() {
        let (mut engine, mut rx) = new_engine();
        assert!(engine.update_settings(1, 1, 1));
        engine.start();
        tick_n(&mut engine, 58);
        assert_eq!(engine.remaining(), 2);
        // 7 seconds of missed wakeups delivered at once
        engine.tick(7);
        assert_eq!(engine.phase(), Phase::Break);
        assert_eq!(engine.remaining(), 60);
        assert!(rx.try_recv().is_ok());
    }

    #[test]
    fn test_one_minute_scenario() {
        let (mut engine, mut rx) = new_engine();
        assert!(engine.update_settings(1, 1, 1));
        engine.start();
        tick_n(&mut engine, 60);
        assert_eq!(engine.phase(), Phase::Break);
        assert_eq!(engine.remaining(), 60);
        assert_eq!(engine.sessions_completed(), 1);
        let display = engine.current_display();
        assert_eq!(display.clock, "01:00");
        assert!(!display.long_break_next);
        assert!(rx.try_recv().is_ok());
    }

    #[test]
    fn test_long_break_next_flag_modulo() {
        let (mut engine, mut rx) = new_engine();
        assert!(engine.update_settings(1, 1, 1));
        for session in 1..=8u32 {
            complete_work_phase(&mut engine);
            rx.try_recv().expect("work completion event");
            // Long next exactly when the upcoming session is the 4th or 8th
            let expected = (session + 1) % 4 == 0;
            assert_eq!(engine.current_display().long_break_next, expected);
            engine.start();
            while engine.phase() == Phase::Break {
                engine.tick(1);
            }
            rx.try_recv().expect("break completion event");
        }
    }

    #[test]
    fn test_display_has_no_side_effects() {
        let (mut engine, _rx) = new_engine();
        engine.start();
        tick_n(&mut engine, 7);
        let before = engine.remaining();
        let display = engine.current_display();
        assert_eq!(display.phase, Phase::Work);
        assert_eq!(display.sessions_completed, 0);
        assert_eq!(engine.remaining(), before);
        assert!(engine.is_running());
    }
}
