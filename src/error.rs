/// Error types for the sequencer engine
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SequencerError {
    #[error("Invalid value {value} for {param}: expected {min}..={max}")]
    InvalidParameter {
        param: &'static str,
        value: i32,
        min: i32,
        max: i32,
    },
    #[error("Cannot generate pattern with {pulses} pulses over {length} steps")]
    PatternGeneration { length: u8, pulses: u8 },
    #[error("External clock silent for {silent_us}us")]
    ClockTimeout { silent_us: u64 },
    #[error("Track not found: {0}")]
    InvalidTrack(usize),
    #[error("Unknown parameter: {0}")]
    UnknownParameter(String),
    #[error("Command queue full")]
    CommandQueueFull,
    #[error("MIDI error: {0}")]
    Midi(String),
    #[error("Audio error: {0}")]
    Audio(String),
    #[error("Config error: {0}")]
    Config(String),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, SequencerError>;
