//! Map ↔ cartogram animation state machine
//!
//! Pure state: it decides which transition happens, and the controller carries
//! out the effects (timers, simulation runs, render events).

use std::fmt;

use serde::Serialize;

use crate::scheduler::TimerId;

/// Stage of the animation cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    /// Region shapes visible, circles hidden
    Map,
    /// Region shapes faded, circles at simulated positions
    Cartogram,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Phase::Map => write!(f, "map"),
            Phase::Cartogram => write!(f, "cartogram"),
        }
    }
}

/// What the controller must do after resuming
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resume {
    /// Nothing pending can be re-armed (already playing, or waiting on a live run)
    Nothing,
    /// Arm the map dwell timer
    ArmDwell,
    /// The run finished while paused; go back to the map now
    EnterMap,
}

/// Animation cycle state
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnimationState {
    phase: Phase,
    playing: bool,
    looping: bool,
    dwell: Option<TimerId>,
}

impl Default for AnimationState {
    fn default() -> Self {
        Self::new(true)
    }
}

impl AnimationState {
    /// Start in the map phase, playing. Without looping the cartogram stays up.
    pub fn new(looping: bool) -> Self {
        Self {
            phase: Phase::Map,
            playing: true,
            looping,
            dwell: None,
        }
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn is_playing(&self) -> bool {
        self.playing
    }

    pub fn is_looping(&self) -> bool {
        self.looping
    }

    /// Pending map dwell timer
    pub fn dwell(&self) -> Option<TimerId> {
        self.dwell
    }

    /// Record a freshly armed dwell timer
    pub fn arm_dwell(&mut self, timer: TimerId) {
        self.dwell = Some(timer);
    }

    /// Forget the dwell timer, returning it so the caller can cancel it
    pub fn take_dwell(&mut self) -> Option<TimerId> {
        self.dwell.take()
    }

    /// Whether the dwell should be (re-)armed right now
    pub fn wants_dwell(&self) -> bool {
        self.looping && self.playing && self.phase == Phase::Map && self.dwell.is_none()
    }

    /// The dwell timer fired. Returns true when the cycle moves to the cartogram.
    pub fn dwell_elapsed(&mut self) -> bool {
        self.dwell = None;
        if self.playing && self.phase == Phase::Map {
            self.phase = Phase::Cartogram;
            true
        } else {
            false
        }
    }

    /// The active run converged. Returns true when the cycle moves back to the map.
    pub fn run_converged(&mut self) -> bool {
        if self.looping && self.playing && self.phase == Phase::Cartogram {
            self.phase = Phase::Map;
            true
        } else {
            false
        }
    }

    /// Stop automatic transitions; the phase is kept. Returns true if it changed anything.
    pub fn pause(&mut self) -> bool {
        std::mem::replace(&mut self.playing, false)
    }

    /// Allow automatic transitions again and report what must be re-armed
    pub fn resume(&mut self, run_active: bool) -> Resume {
        if self.playing {
            return Resume::Nothing;
        }
        self.playing = true;
        match self.phase {
            Phase::Map if self.wants_dwell() => Resume::ArmDwell,
            Phase::Map => Resume::Nothing,
            Phase::Cartogram if !run_active && self.looping => {
                self.phase = Phase::Map;
                Resume::EnterMap
            }
            Phase::Cartogram => Resume::Nothing,
        }
    }

    /// Force the map phase. Returns the phase that was left.
    pub fn restart(&mut self) -> Phase {
        self.dwell = None;
        std::mem::replace(&mut self.phase, Phase::Map)
    }

    /// Show the cartogram directly (static mode)
    pub fn show_cartogram(&mut self) -> Phase {
        self.dwell = None;
        std::mem::replace(&mut self.phase, Phase::Cartogram)
    }

    /// Hover highlighting is only live while circles are shown
    pub fn allows_highlight(&self) -> bool {
        self.phase == Phase::Cartogram
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scheduler::{Event, Generation, Scheduler};
    use std::time::Duration;

    fn timer() -> TimerId {
        let mut s = Scheduler::new();
        s.schedule(
            Duration::from_millis(1),
            Event::DwellElapsed {
                generation: Generation(1),
            },
        )
    }

    #[test]
    fn starts_in_map_phase_playing() {
        let state = AnimationState::default();
        assert_eq!(state.phase(), Phase::Map);
        assert!(state.is_playing());
        assert!(state.wants_dwell());
    }

    #[test]
    fn full_cycle() {
        let mut state = AnimationState::default();
        state.arm_dwell(timer());
        assert!(!state.wants_dwell());

        assert!(state.dwell_elapsed());
        assert_eq!(state.phase(), Phase::Cartogram);

        assert!(state.run_converged());
        assert_eq!(state.phase(), Phase::Map);
        assert!(state.wants_dwell());
    }

    #[test]
    fn paused_dwell_does_not_transition() {
        let mut state = AnimationState::default();
        state.arm_dwell(timer());
        assert!(state.pause());

        assert!(!state.dwell_elapsed());
        assert_eq!(state.phase(), Phase::Map);
        assert_eq!(state.dwell(), None);

        assert_eq!(state.resume(false), Resume::ArmDwell);
    }

    #[test]
    fn pause_is_idempotent() {
        let mut state = AnimationState::default();
        assert!(state.pause());
        let after_first = state.clone();
        assert!(!state.pause());
        assert_eq!(state, after_first);
    }

    #[test]
    fn resume_while_dwell_pending_keeps_timer() {
        let mut state = AnimationState::default();
        state.arm_dwell(timer());
        state.pause();
        assert_eq!(state.resume(false), Resume::Nothing);
        assert!(state.dwell().is_some());
    }

    #[test]
    fn paused_convergence_stays_in_cartogram() {
        let mut state = AnimationState::default();
        state.dwell_elapsed();
        state.pause();

        assert!(!state.run_converged());
        assert_eq!(state.phase(), Phase::Cartogram);

        assert_eq!(state.resume(false), Resume::EnterMap);
        assert_eq!(state.phase(), Phase::Map);
    }

    #[test]
    fn resume_during_live_run_waits_for_convergence() {
        let mut state = AnimationState::default();
        state.dwell_elapsed();
        state.pause();

        assert_eq!(state.resume(true), Resume::Nothing);
        assert_eq!(state.phase(), Phase::Cartogram);
        assert!(state.run_converged());
    }

    #[test]
    fn restart_forces_map_phase() {
        let mut state = AnimationState::default();
        state.dwell_elapsed();
        state.arm_dwell(timer());

        assert_eq!(state.restart(), Phase::Cartogram);
        assert_eq!(state.phase(), Phase::Map);
        assert_eq!(state.dwell(), None);
    }

    #[test]
    fn static_mode_never_returns_to_map() {
        let mut state = AnimationState::new(false);
        assert!(!state.wants_dwell());
        state.show_cartogram();

        assert!(!state.run_converged());
        assert_eq!(state.phase(), Phase::Cartogram);
        assert_eq!(state.resume(false), Resume::Nothing);
    }

    #[test]
    fn highlight_only_in_cartogram_phase() {
        let mut state = AnimationState::default();
        assert!(!state.allows_highlight());
        state.dwell_elapsed();
        assert!(state.allows_highlight());
    }
}
