/// euclid-sqnc - Euclidean step sequencer engine
///
/// This library provides the sequencer/clock core of a hardware Euclidean sequencer:
/// - Euclidean pattern generation with rotation
/// - Per-track stepping with direction, gate and randomization
/// - Internal (BPM + swing) or external (CV gate) clock
/// - Trigger and MIDI output dispatch
/// - A host timer thread for running the engine on a desktop

pub mod audio;
pub mod config;
pub mod constants;
pub mod dispatch;
pub mod error;
pub mod midi;
pub mod sequencer;

// Re-export commonly used types
pub use audio::{AudioOutput, TriggerGates};
pub use config::SequencerConfig;
pub use dispatch::{HardwareOutputs, OutputDispatcher, OutputSink};
pub use error::{Result, SequencerError};
pub use midi::{midi_note_name, MidiOutputDevice};
pub use sequencer::playback::{Command, PlaybackEngine, PlaybackEvent};
pub use sequencer::{
    generate, ClockParam, ClockSource, Direction, EditMode, EngineSnapshot, Instrument,
    OutputMode, ParamId, Pattern, SequencerEngine, TickReport, TrackParameters, TransportState,
};
