/// Per-track step state machine: cursor, direction, gate timing and randomization
use crate::error::{Result, SequencerError};
use crate::sequencer::euclid::{generate, Pattern};
use crate::sequencer::params::{Direction, Instrument, OutputMode, ParamId, TrackParameters};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TrackState {
    /// Waiting for the next relevant tick
    #[default]
    Idle,
    /// Cursor about to advance
    StepDue,
    /// Gate open
    Firing,
    /// Gate just closed, returning to idle
    GateClosing,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StepCursor {
    pub index: u8,
    /// Travel direction for alternating mode
    pub ascending: bool,
}

impl Default for StepCursor {
    fn default() -> Self {
        Self {
            index: 0,
            ascending: true,
        }
    }
}

impl StepCursor {
    pub fn advance(&mut self, direction: Direction, len: u8) {
        if len <= 1 {
            self.index = 0;
            return;
        }
        self.index = self.index.min(len - 1);
        match direction {
            Direction::Forward => self.index = (self.index + 1) % len,
            Direction::Backward => {
                self.index = if self.index == 0 { len - 1 } else { self.index - 1 }
            }
            Direction::Alternating => {
                if self.ascending {
                    if self.index + 1 >= len {
                        self.ascending = false;
                        self.index -= 1;
                    } else {
                        self.index += 1;
                    }
                } else if self.index == 0 {
                    self.ascending = true;
                    self.index = 1;
                } else {
                    self.index -= 1;
                }
            }
        }
    }
}

/// A step that fired, with the values the output should use
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StepFire {
    pub step: u8,
    pub channel: u8,
    pub note: u8,
    pub velocity: u8,
    /// Gate as percent of the step
    pub gate: u8,
    pub gate_ticks: u32,
    pub output: OutputMode,
    pub randomized: bool,
}

/// Pending parameters that could not produce a pattern
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PatternRejection {
    pub length: u8,
    pub pulses: u8,
}

impl From<PatternRejection> for SequencerError {
    fn from(r: PatternRejection) -> Self {
        SequencerError::PatternGeneration {
            length: r.length,
            pulses: r.pulses,
        }
    }
}

/// What one track did on one tick
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TrackTick {
    pub gate_closed: bool,
    pub fired: Option<StepFire>,
    pub rejected: Option<PatternRejection>,
}

/// Read-only view for the display collaborator
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TrackSnapshot {
    pub indicator: char,
    pub pattern: Pattern,
    pub cursor: u8,
    pub state: TrackState,
    pub gate_open: bool,
}

pub struct TrackSequencer {
    instrument: Instrument,
    params: TrackParameters,
    pending: Option<TrackParameters>,
    pattern: Pattern,
    cursor: StepCursor,
    state: TrackState,
    // The first boundary after a reset plays the cursor in place
    primed: bool,
    gate_remaining: u32,
    rng: fastrand::Rng,
}

impl TrackSequencer {
    pub fn new(instrument: Instrument, params: TrackParameters, seed: u64) -> Result<Self> {
        params.validate()?;
        let pattern = generate(params.length, params.pulses, params.rotation)?;
        Ok(Self {
            instrument,
            params,
            pending: None,
            pattern,
            cursor: StepCursor::default(),
            state: TrackState::Idle,
            primed: false,
            gate_remaining: 0,
            rng: fastrand::Rng::with_seed(seed),
        })
    }

    pub fn instrument(&self) -> Instrument {
        self.instrument
    }

    /// Parameters in effect for the current step
    pub fn params(&self) -> &TrackParameters {
        &self.params
    }

    /// Parameters that will be in effect after the next step boundary
    pub fn next_params(&self) -> TrackParameters {
        self.pending.unwrap_or(self.params)
    }

    pub fn pattern(&self) -> &Pattern {
        &self.pattern
    }

    pub fn cursor(&self) -> StepCursor {
        self.cursor
    }

    pub fn state(&self) -> TrackState {
        self.state
    }

    pub fn gate_open(&self) -> bool {
        self.state == TrackState::Firing
    }

    /// Validate and stage a parameter change for the next step boundary
    pub fn set_parameter(&mut self, param: ParamId, value: i32) -> Result<()> {
        let mut next = self.next_params();
        next.set(param, value)?;
        if param.affects_pattern() && next.pulses > next.length {
            return Err(SequencerError::PatternGeneration {
                length: next.length,
                pulses: next.pulses,
            });
        }
        self.pending = Some(next);
        Ok(())
    }

    /// Back to step 0; the caller closes any open gate first
    pub fn reset(&mut self) {
        self.cursor = StepCursor::default();
        self.primed = false;
        self.state = TrackState::Idle;
        self.gate_remaining = 0;
    }

    /// Close an open gate immediately. Returns whether one was open.
    pub fn close_gate(&mut self) -> bool {
        if self.state != TrackState::Firing {
            return false;
        }
        self.state = TrackState::Idle;
        self.gate_remaining = 0;
        true
    }

    pub fn snapshot(&self) -> TrackSnapshot {
        TrackSnapshot {
            indicator: self.instrument.indicator(),
            pattern: self.pattern,
            cursor: self.cursor.index,
            state: self.state,
            gate_open: self.gate_open(),
        }
    }

    pub fn tick(&mut self, tick: u64) -> TrackTick {
        let mut out = TrackTick::default();

        match self.state {
            TrackState::GateClosing => self.state = TrackState::Idle,
            TrackState::Firing => {
                self.gate_remaining = self.gate_remaining.saturating_sub(1);
                if self.gate_remaining == 0 {
                    self.state = TrackState::GateClosing;
                    out.gate_closed = true;
                }
            }
            _ => {}
        }

        let ticks_per_step = self.params.ticks_per_step() as u64;
        if tick % ticks_per_step != 0 {
            return out;
        }

        // A gate still open at the boundary closes before the next step
        if self.close_gate() {
            out.gate_closed = true;
        }
        self.state = TrackState::StepDue;
        out.rejected = self.apply_pending();

        if self.primed {
            self.cursor
                .advance(self.params.direction, self.pattern.len() as u8);
        } else {
            self.primed = true;
        }

        if self.pattern.get(self.cursor.index as usize) {
            out.fired = Some(self.fire());
        } else {
            self.state = TrackState::Idle;
        }
        out
    }

    // set_parameter already refuses pulses > length, so the regeneration below only
    // fails if that check is bypassed; the prior pattern is kept either way.
    fn apply_pending(&mut self) -> Option<PatternRejection> {
        let next = self.pending.take()?;
        let shape_changed = next.length != self.params.length
            || next.pulses != self.params.pulses
            || next.rotation != self.params.rotation;
        if shape_changed {
            match generate(next.length, next.pulses, next.rotation) {
                Ok(pattern) => self.pattern = pattern,
                Err(_) => {
                    return Some(PatternRejection {
                        length: next.length,
                        pulses: next.pulses,
                    })
                }
            }
        }
        self.params = next;
        let last = self.pattern.len().saturating_sub(1) as u8;
        self.cursor.index = self.cursor.index.min(last);
        None
    }

    fn fire(&mut self) -> StepFire {
        let p = self.params;
        let mut velocity = p.velocity;
        let mut gate = p.gate;
        let randomized = self.rng.u8(0..100) < p.random_chance;
        if randomized {
            velocity = jitter(&mut self.rng, velocity, p.random_amount, 1, 127);
            gate = jitter(&mut self.rng, gate, p.random_amount, 1, 99);
        }

        let gate_ticks = (p.ticks_per_step() * gate as u32 / 100).max(1);
        self.state = TrackState::Firing;
        self.gate_remaining = gate_ticks;

        StepFire {
            step: self.cursor.index,
            channel: p.midi_channel,
            note: p.note,
            velocity,
            gate,
            gate_ticks,
            output: p.output,
            randomized,
        }
    }
}

/// Uniform offset of up to `amount` percent of `nominal`, clamped to `min..=max`
fn jitter(rng: &mut fastrand::Rng, nominal: u8, amount: u8, min: i32, max: i32) -> u8 {
    let spread = nominal as i32 * amount as i32 / 100;
    let offset = if spread > 0 { rng.i32(-spread..=spread) } else { 0 };
    (nominal as i32 + offset).clamp(min, max) as u8
}

#[cfg(test)]
mod tests {
    use super::*;

    fn track(length: u8, pulses: u8) -> TrackSequencer {
        let params = TrackParameters {
            length,
            pulses,
            ..Default::default()
        };
        TrackSequencer::new(Instrument::Kick, params, 7).unwrap()
    }

    /// Cursor positions visited at each step boundary
    fn visit(track: &mut TrackSequencer, steps: usize) -> Vec<u8> {
        let tps = track.params().ticks_per_step() as u64;
        (0..steps as u64)
            .map(|s| {
                track.tick(s * tps);
                track.cursor().index
            })
            .collect()
    }

    #[test]
    fn test_steps_on_divisor_only() {
        let mut t = track(4, 4);
        assert!(t.tick(0).fired.is_some());
        for tick in 1..6 {
            assert!(t.tick(tick).fired.is_none());
        }
        let fired = t.tick(6).fired.unwrap();
        assert_eq!(fired.step, 1);
    }

    #[test]
    fn test_directions() {
        let mut t = track(4, 0);
        assert_eq!(visit(&mut t, 6), vec![0, 1, 2, 3, 0, 1]);

        let mut t = track(4, 0);
        t.set_parameter(ParamId::Direction, 1).unwrap();
        assert_eq!(visit(&mut t, 6), vec![0, 3, 2, 1, 0, 3]);

        let mut t = track(4, 0);
        t.set_parameter(ParamId::Direction, 2).unwrap();
        assert_eq!(visit(&mut t, 9), vec![0, 1, 2, 3, 2, 1, 0, 1, 2]);
    }

    #[test]
    fn test_alternating_single_step_stays_put() {
        let mut cursor = StepCursor::default();
        for _ in 0..4 {
            cursor.advance(Direction::Alternating, 1);
            assert_eq!(cursor.index, 0);
        }
    }

    #[test]
    fn test_gate_closes_after_gate_percent() {
        let mut t = track(4, 4);
        t.set_parameter(ParamId::Gate, 50).unwrap();
        let fired = t.tick(0).fired.unwrap();
        assert_eq!(fired.gate_ticks, 3);
        assert!(t.gate_open());
        assert!(!t.tick(1).gate_closed);
        assert!(!t.tick(2).gate_closed);
        assert!(t.tick(3).gate_closed);
        assert_eq!(t.state(), TrackState::GateClosing);
        assert!(!t.gate_open());
        t.tick(4);
        assert_eq!(t.state(), TrackState::Idle);
    }

    #[test]
    fn test_short_gate_is_at_least_one_tick() {
        let mut t = track(4, 4);
        t.set_parameter(ParamId::Gate, 1).unwrap();
        assert_eq!(t.tick(0).fired.unwrap().gate_ticks, 1);
        assert!(t.tick(1).gate_closed);
    }

    #[test]
    fn test_pending_applies_at_boundary() {
        let mut t = track(4, 4);
        t.tick(0);
        t.set_parameter(ParamId::Velocity, 42).unwrap();
        assert_eq!(t.params().velocity, 100);
        t.tick(3);
        assert_eq!(t.params().velocity, 100);
        let fired = t.tick(6).fired.unwrap();
        assert_eq!(fired.velocity, 42);
    }

    #[test]
    fn test_pulses_over_length_rejected() {
        let mut t = track(8, 4);
        let err = t.set_parameter(ParamId::Length, 3).unwrap_err();
        assert!(matches!(err, SequencerError::PatternGeneration { length: 3, pulses: 4 }));
        assert!(t.set_parameter(ParamId::Pulses, 9).is_err());
        assert_eq!(t.next_params().length, 8);
    }

    #[test]
    fn test_unplayable_pending_shape_keeps_pattern() {
        let mut t = track(8, 3);
        t.tick(0);
        t.pending = Some(TrackParameters {
            length: 2,
            pulses: 3,
            velocity: 42,
            ..*t.params()
        });
        let out = t.tick(6);
        assert_eq!(out.rejected, Some(PatternRejection { length: 2, pulses: 3 }));
        assert_eq!(t.params().length, 8);
        assert_eq!(t.params().velocity, 100);
        assert_eq!(t.pattern(), &generate(8, 3, 0).unwrap());
        assert_eq!(t.cursor().index, 1);
    }

    #[test]
    fn test_out_of_range_params_refused_at_construction() {
        let params = TrackParameters {
            note_length: 128,
            ..Default::default()
        };
        assert!(matches!(
            TrackSequencer::new(Instrument::Kick, params, 0),
            Err(SequencerError::InvalidParameter { param: "Snln", .. })
        ));
        let params = TrackParameters {
            length: 4,
            pulses: 5,
            ..Default::default()
        };
        assert!(matches!(
            TrackSequencer::new(Instrument::Kick, params, 0),
            Err(SequencerError::PatternGeneration { length: 4, pulses: 5 })
        ));
    }

    #[test]
    fn test_length_change_clamps_cursor() {
        let mut t = track(8, 0);
        visit(&mut t, 7);
        assert_eq!(t.cursor().index, 6);
        t.set_parameter(ParamId::Length, 4).unwrap();
        t.tick(7 * 6);
        assert_eq!(t.pattern().len(), 4);
        // clamped to 3, then advanced with wrap
        assert_eq!(t.cursor().index, 0);
    }

    #[test]
    fn test_no_randomization_at_zero_chance() {
        let mut t = track(1, 1);
        t.set_parameter(ParamId::RandomAmount, 100).unwrap();
        for s in 0..1000u64 {
            if let Some(f) = t.tick(s * 6).fired {
                assert!(!f.randomized);
                assert_eq!(f.velocity, 100);
                assert_eq!(f.gate, 50);
            }
        }
    }

    #[test]
    fn test_full_chance_stays_within_amount() {
        let mut t = track(1, 1);
        t.set_parameter(ParamId::RandomChance, 100).unwrap();
        t.set_parameter(ParamId::RandomAmount, 20).unwrap();
        let mut varied = false;
        for s in 0..1000u64 {
            if let Some(f) = t.tick(s * 6).fired {
                assert!(f.randomized);
                assert!((80..=120).contains(&f.velocity));
                assert!((40..=60).contains(&f.gate));
                varied |= f.velocity != 100;
            }
        }
        assert!(varied);
    }

    #[test]
    fn test_close_gate_and_reset() {
        let mut t = track(4, 4);
        t.tick(0);
        visit(&mut t, 3);
        assert!(t.close_gate());
        assert!(!t.close_gate());
        t.reset();
        assert_eq!(t.cursor(), StepCursor::default());
        assert_eq!(t.tick(0).fired.unwrap().step, 0);
    }
}
