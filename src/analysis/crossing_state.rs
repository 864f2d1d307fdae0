// src/analysis/crossing_state.rs
//
// Per-track crossing state machine.
//
//   UNSET ──side──▶ SIDE(x) ──middle, held ≥ N frames──▶ SIDE(x) ARMED
//                     ▲                                       │
//                     └────── opposite side: fire candidate ◀─┘
//
// A count is only ever proposed from the armed state (explicit middle visit)
// or, when enabled, from a single frame whose box spans both lines. Whatever
// the counting engine decides, the track lands on the new side unarmed.

use crate::types::{Side, Zone};

/// Thresholds the state machine needs on every observation.
#[derive(Debug, Clone, Copy)]
pub struct TransitionParams {
    pub min_side_frames_before_middle: u32,
    pub hang_timeout_ms: f64,
    pub infer_middle_from_span: bool,
}

/// A zone change that may become a counted crossing.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FireCandidate {
    pub from: Side,
    pub to: Side,
    /// Axis travel since the track last held its starting side
    pub moved: f32,
    /// When the explicit middle visit began; `None` for span-inferred crossings
    pub entered_middle_ms: Option<f64>,
    pub inferred: bool,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum StepOutcome {
    /// Middle observation with no side yet
    Unset,
    Established(Side),
    SideHeld,
    MiddleEntered,
    MiddleHeld,
    /// Middle entry ignored: the side was not held long enough
    MiddleRejected,
    /// Armed too long inside the doorway, back to UNSET
    Stalled,
    /// Armed track returned to its own side
    Abandoned,
    /// Jumped sides without a middle visit; the new side is established
    FlipWithoutMiddle { from: Side, to: Side },
    Fire(FireCandidate),
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct CrossState {
    side: Option<Side>,
    first_side_axis: f32,
    armed: bool,
    entered_middle_ms: Option<f64>,
    side_frames: u32,
    middle_frames: u32,
    /// Any middle frame since the current side was established
    middle_seen: bool,
    pub last_event_ms: Option<f64>,
    pub last_seen_ms: f64,
}

impl CrossState {
    pub fn new(now_ms: f64) -> Self {
        Self {
            last_seen_ms: now_ms,
            ..Self::default()
        }
    }

    pub fn side(&self) -> Option<Side> {
        self.side
    }

    pub fn is_armed(&self) -> bool {
        self.armed
    }

    pub fn side_frames(&self) -> u32 {
        self.side_frames
    }

    pub fn middle_frames(&self) -> u32 {
        self.middle_frames
    }

    pub fn entered_middle_ms(&self) -> Option<f64> {
        self.entered_middle_ms
    }

    pub fn first_side_axis(&self) -> f32 {
        self.first_side_axis
    }

    /// Back to UNSET. The rearm timestamp survives so a reset cannot be used
    /// to dodge the per-track rearm window.
    pub fn reset(&mut self) {
        *self = Self {
            last_event_ms: self.last_event_ms,
            last_seen_ms: self.last_seen_ms,
            ..Self::default()
        };
    }

    pub fn record_event(&mut self, now_ms: f64) {
        self.last_event_ms = Some(now_ms);
    }

    pub fn observe(
        &mut self,
        zone: Zone,
        axis_value: f32,
        spans_both: bool,
        now_ms: f64,
        params: &TransitionParams,
    ) -> StepOutcome {
        let current = match self.side {
            None => {
                return match zone.side() {
                    None => StepOutcome::Unset,
                    Some(side) => {
                        self.establish(side, axis_value);
                        StepOutcome::Established(side)
                    }
                };
            }
            Some(side) => side,
        };

        match zone.side() {
            None => self.observe_middle(now_ms, params),
            Some(side) if side == current => {
                if self.armed {
                    if params.infer_middle_from_span && spans_both {
                        self.side_frames += 1;
                        self.first_side_axis = axis_value;
                        return StepOutcome::SideHeld;
                    }
                    self.establish(current, axis_value);
                    return StepOutcome::Abandoned;
                }
                self.side_frames += 1;
                self.middle_frames = 0;
                self.first_side_axis = axis_value;
                StepOutcome::SideHeld
            }
            Some(side) => {
                let outcome = if self.armed {
                    StepOutcome::Fire(FireCandidate {
                        from: current,
                        to: side,
                        moved: (axis_value - self.first_side_axis).abs(),
                        entered_middle_ms: self.entered_middle_ms,
                        inferred: false,
                    })
                } else if params.infer_middle_from_span
                    && spans_both
                    && !self.middle_seen
                    && self.side_frames >= params.min_side_frames_before_middle
                {
                    StepOutcome::Fire(FireCandidate {
                        from: current,
                        to: side,
                        moved: (axis_value - self.first_side_axis).abs(),
                        entered_middle_ms: None,
                        inferred: true,
                    })
                } else {
                    StepOutcome::FlipWithoutMiddle {
                        from: current,
                        to: side,
                    }
                };
                self.establish(side, axis_value);
                outcome
            }
        }
    }

    fn observe_middle(&mut self, now_ms: f64, params: &TransitionParams) -> StepOutcome {
        self.middle_seen = true;
        if self.armed {
            self.middle_frames += 1;
            let dwell = self.entered_middle_ms.map_or(0.0, |t| now_ms - t);
            if dwell > params.hang_timeout_ms {
                self.reset();
                return StepOutcome::Stalled;
            }
            return StepOutcome::MiddleHeld;
        }

        self.middle_frames += 1;
        if self.side_frames >= params.min_side_frames_before_middle {
            self.armed = true;
            self.entered_middle_ms = Some(now_ms);
            StepOutcome::MiddleEntered
        } else {
            StepOutcome::MiddleRejected
        }
    }

    fn establish(&mut self, side: Side, axis_value: f32) {
        self.side = Some(side);
        self.first_side_axis = axis_value;
        self.armed = false;
        self.entered_middle_ms = None;
        self.side_frames = 1;
        self.middle_frames = 0;
        self.middle_seen = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params() -> TransitionParams {
        TransitionParams {
            min_side_frames_before_middle: 2,
            hang_timeout_ms: 2500.0,
            infer_middle_from_span: true,
        }
    }

    fn step(state: &mut CrossState, zone: Zone, axis: f32, t: f64) -> StepOutcome {
        state.observe(zone, axis, false, t, &params())
    }

    #[test]
    fn test_middle_without_side_stays_unset() {
        let mut state = CrossState::new(0.0);
        assert_eq!(step(&mut state, Zone::Middle, 0.5, 0.0), StepOutcome::Unset);
        assert_eq!(state.side(), None);
        assert!(!state.is_armed());
    }

    #[test]
    fn test_full_crossing_fires_once() {
        let mut state = CrossState::new(0.0);
        assert_eq!(step(&mut state, Zone::SideA, 0.2, 0.0), StepOutcome::Established(Side::A));
        assert_eq!(step(&mut state, Zone::SideA, 0.25, 100.0), StepOutcome::SideHeld);
        assert_eq!(step(&mut state, Zone::Middle, 0.5, 200.0), StepOutcome::MiddleEntered);
        assert!(state.is_armed());
        assert_eq!(step(&mut state, Zone::Middle, 0.55, 300.0), StepOutcome::MiddleHeld);

        match step(&mut state, Zone::SideB, 0.8, 400.0) {
            StepOutcome::Fire(c) => {
                assert_eq!((c.from, c.to), (Side::A, Side::B));
                assert!((c.moved - 0.55).abs() < 1e-6);
                assert_eq!(c.entered_middle_ms, Some(200.0));
                assert!(!c.inferred);
            }
            other => panic!("expected fire, got {other:?}"),
        }
        assert_eq!(state.side(), Some(Side::B));
        assert!(!state.is_armed());
        assert_eq!(state.side_frames(), 1);

        // Staying on B never fires again
        assert_eq!(step(&mut state, Zone::SideB, 0.8, 500.0), StepOutcome::SideHeld);
    }

    #[test]
    fn test_short_side_hold_rejects_middle() {
        let mut state = CrossState::new(0.0);
        step(&mut state, Zone::SideA, 0.2, 0.0);
        assert_eq!(step(&mut state, Zone::Middle, 0.5, 100.0), StepOutcome::MiddleRejected);
        assert!(!state.is_armed());
        assert_eq!(
            step(&mut state, Zone::SideB, 0.8, 200.0),
            StepOutcome::FlipWithoutMiddle {
                from: Side::A,
                to: Side::B
            }
        );
        assert_eq!(state.side(), Some(Side::B));
    }

    #[test]
    fn test_return_to_same_side_disarms() {
        let mut state = CrossState::new(0.0);
        step(&mut state, Zone::SideA, 0.2, 0.0);
        step(&mut state, Zone::SideA, 0.2, 100.0);
        step(&mut state, Zone::Middle, 0.5, 200.0);
        assert_eq!(step(&mut state, Zone::SideA, 0.2, 300.0), StepOutcome::Abandoned);
        assert_eq!(state.side(), Some(Side::A));
        assert!(!state.is_armed());
        assert_eq!(state.entered_middle_ms(), None);
    }

    #[test]
    fn test_armed_return_with_span_keeps_arm() {
        let mut state = CrossState::new(0.0);
        step(&mut state, Zone::SideA, 0.2, 0.0);
        step(&mut state, Zone::SideA, 0.2, 100.0);
        step(&mut state, Zone::Middle, 0.5, 200.0);
        let outcome = state.observe(Zone::SideA, 0.3, true, 300.0, &params());
        assert_eq!(outcome, StepOutcome::SideHeld);
        assert!(state.is_armed());
    }

    #[test]
    fn test_stall_in_middle_resets() {
        let mut state = CrossState::new(0.0);
        step(&mut state, Zone::SideA, 0.2, 0.0);
        step(&mut state, Zone::SideA, 0.2, 100.0);
        step(&mut state, Zone::Middle, 0.5, 200.0);
        assert_eq!(step(&mut state, Zone::Middle, 0.5, 2600.0), StepOutcome::MiddleHeld);
        assert_eq!(step(&mut state, Zone::Middle, 0.5, 2800.0), StepOutcome::Stalled);
        assert_eq!(state.side(), None);
        assert!(!state.is_armed());
    }

    #[test]
    fn test_span_inference_fires_without_middle_frame() {
        let mut state = CrossState::new(0.0);
        state.observe(Zone::SideA, 0.3, true, 0.0, &params());
        state.observe(Zone::SideA, 0.3, true, 100.0, &params());
        match state.observe(Zone::SideB, 0.7, true, 200.0, &params()) {
            StepOutcome::Fire(c) => {
                assert!(c.inferred);
                assert_eq!(c.entered_middle_ms, None);
            }
            other => panic!("expected inferred fire, got {other:?}"),
        }
    }

    #[test]
    fn test_span_inference_disabled() {
        let mut state = CrossState::new(0.0);
        let p = TransitionParams {
            infer_middle_from_span: false,
            ..params()
        };
        state.observe(Zone::SideA, 0.3, true, 0.0, &p);
        state.observe(Zone::SideA, 0.3, true, 100.0, &p);
        let outcome = state.observe(Zone::SideB, 0.7, true, 200.0, &p);
        assert!(matches!(outcome, StepOutcome::FlipWithoutMiddle { .. }));
    }

    #[test]
    fn test_span_inference_skipped_after_rejected_middle() {
        let mut state = CrossState::new(0.0);
        state.observe(Zone::SideA, 0.3, true, 0.0, &params());
        state.observe(Zone::Middle, 0.5, true, 100.0, &params());
        let outcome = state.observe(Zone::SideB, 0.7, true, 200.0, &params());
        assert!(matches!(outcome, StepOutcome::FlipWithoutMiddle { .. }));
    }

    #[test]
    fn test_span_inference_skipped_after_middle_then_side_again() {
        let mut state = CrossState::new(0.0);
        assert_eq!(
            state.observe(Zone::SideA, 0.3, true, 0.0, &params()),
            StepOutcome::Established(Side::A)
        );
        assert_eq!(
            state.observe(Zone::Middle, 0.5, true, 100.0, &params()),
            StepOutcome::MiddleRejected
        );
        assert_eq!(
            state.observe(Zone::SideA, 0.3, true, 200.0, &params()),
            StepOutcome::SideHeld
        );
        assert_eq!(state.side_frames(), 2);
        assert_eq!(
            state.observe(Zone::SideB, 0.7, true, 300.0, &params()),
            StepOutcome::FlipWithoutMiddle {
                from: Side::A,
                to: Side::B
            }
        );

        // The new side starts clean, so span inference applies again
        state.observe(Zone::SideB, 0.7, true, 400.0, &params());
        match state.observe(Zone::SideA, 0.3, true, 500.0, &params()) {
            StepOutcome::Fire(c) => assert!(c.inferred),
            other => panic!("expected inferred fire, got {other:?}"),
        }
    }

    #[test]
    fn test_explicit_middle_wins_over_span() {
        let mut state = CrossState::new(0.0);
        state.observe(Zone::SideA, 0.3, true, 0.0, &params());
        state.observe(Zone::SideA, 0.3, true, 100.0, &params());
        assert_eq!(
            state.observe(Zone::Middle, 0.5, true, 200.0, &params()),
            StepOutcome::MiddleEntered
        );
        match state.observe(Zone::SideB, 0.7, true, 300.0, &params()) {
            StepOutcome::Fire(c) => {
                assert!(!c.inferred);
                assert_eq!(c.entered_middle_ms, Some(200.0));
            }
            other => panic!("expected explicit fire, got {other:?}"),
        }
    }

    #[test]
    fn test_reset_keeps_rearm_timestamp() {
        let mut state = CrossState::new(0.0);
        step(&mut state, Zone::SideA, 0.2, 0.0);
        state.record_event(50.0);
        state.reset();
        assert_eq!(state.side(), None);
        assert_eq!(state.last_event_ms, Some(50.0));
    }

    #[test]
    fn test_side_never_middle() {
        let mut state = CrossState::new(0.0);
        let zones = [
            Zone::Middle,
            Zone::SideA,
            Zone::Middle,
            Zone::SideB,
            Zone::Middle,
            Zone::Middle,
            Zone::SideA,
        ];
        for (i, zone) in zones.iter().enumerate() {
            step(&mut state, *zone, 0.5, i as f64 * 100.0);
            if state.is_armed() {
                assert!(state.side().is_some());
            }
        }
    }
}
