/// Turns firing steps into trigger pulses or MIDI notes
use crate::audio::TriggerGates;
use crate::constants::TRACK_COUNT;
use crate::error::Result;
use crate::midi::MidiOutputDevice;
use crate::sequencer::engine::TickReport;
use crate::sequencer::params::OutputMode;
use crate::sequencer::track::StepFire;

/// Hardware side of the dispatcher
pub trait OutputSink {
    fn note_on(&mut self, channel: u8, note: u8, velocity: u8) -> Result<()>;
    fn note_off(&mut self, channel: u8, note: u8) -> Result<()>;
    fn gate_open(&mut self, track: usize) -> Result<()>;
    fn gate_close(&mut self, track: usize) -> Result<()>;
}

/// What was sent when a gate opened, so the close matches it
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct OpenGate {
    mode: OutputMode,
    channel: u8,
    note: u8,
}

#[derive(Debug, Default)]
pub struct OutputDispatcher {
    open: [Option<OpenGate>; TRACK_COUNT],
}

impl OutputDispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn open_gates(&self) -> usize {
        self.open.iter().filter(|g| g.is_some()).count()
    }

    pub fn is_open(&self, track: usize) -> bool {
        matches!(self.open.get(track), Some(Some(_)))
    }

    /// Send every close and fire in the report. Closes go first so a track
    /// never has two notes open. All items are sent even if one fails.
    pub fn dispatch<S: OutputSink>(&mut self, report: &TickReport, sink: &mut S) -> Result<()> {
        let mut result = Ok(());
        for (track, t) in report.iter() {
            if t.gate_closed {
                result = result.and(self.close(track, sink));
            }
            if let Some(fire) = &t.fired {
                result = result.and(self.fire(track, fire, sink));
            }
        }
        result
    }

    pub fn fire<S: OutputSink>(&mut self, track: usize, fire: &StepFire, sink: &mut S) -> Result<()> {
        let closed = self.close(track, sink);
        let Some(slot) = self.open.get_mut(track) else {
            return closed;
        };
        let sent = match fire.output {
            OutputMode::Off => return closed,
            OutputMode::Trigger => sink.gate_open(track),
            OutputMode::Midi => sink.note_on(fire.channel, fire.note, fire.velocity),
        };
        *slot = Some(OpenGate {
            mode: fire.output,
            channel: fire.channel,
            note: fire.note,
        });
        closed.and(sent)
    }

    /// Emit the off matching whatever was opened on `track`, at most once
    pub fn close<S: OutputSink>(&mut self, track: usize, sink: &mut S) -> Result<()> {
        let Some(gate) = self.open.get_mut(track).and_then(Option::take) else {
            return Ok(());
        };
        match gate.mode {
            OutputMode::Off => Ok(()),
            OutputMode::Trigger => sink.gate_close(track),
            OutputMode::Midi => sink.note_off(gate.channel, gate.note),
        }
    }

    pub fn close_all<S: OutputSink>(&mut self, sink: &mut S) -> Result<()> {
        let mut result = Ok(());
        for track in 0..TRACK_COUNT {
            result = result.and(self.close(track, sink));
        }
        result
    }
}

/// MIDI device and trigger outputs together
pub struct HardwareOutputs {
    pub midi: MidiOutputDevice,
    pub triggers: TriggerGates,
}

impl OutputSink for HardwareOutputs {
    fn note_on(&mut self, channel: u8, note: u8, velocity: u8) -> Result<()> {
        self.midi.note_on(channel, note, velocity)
    }

    fn note_off(&mut self, channel: u8, note: u8) -> Result<()> {
        self.midi.note_off(channel, note)
    }

    fn gate_open(&mut self, track: usize) -> Result<()> {
        self.triggers.gate_open(track)
    }

    fn gate_close(&mut self, track: usize) -> Result<()> {
        self.triggers.gate_close(track)
    }
}
