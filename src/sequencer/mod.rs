/// Sequencer/clock engine: pattern generation, per-track stepping, clock sync
pub mod clock;
pub mod engine;
pub mod euclid;
pub mod params;
pub mod playback;
pub mod track;

pub use clock::{ClockSource, ExternalClockInput};
pub use engine::{EngineSnapshot, SequencerEngine, TickReport, TransportState};
pub use euclid::{generate, Pattern};
pub use params::{
    ClockParam, ClockSettings, ClockSourceKind, Direction, EditMode, Instrument, OutputMode,
    ParamId, TrackParameters,
};
pub use track::{StepCursor, StepFire, TrackSequencer, TrackSnapshot, TrackState, TrackTick};
