/// Track and clock parameters with their documented ranges
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::constants::*;
use crate::error::{Result, SequencerError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    #[default]
    Forward,
    Backward,
    Alternating,
}

impl Direction {
    pub fn from_index(value: i32) -> Option<Self> {
        match value {
            0 => Some(Self::Forward),
            1 => Some(Self::Backward),
            2 => Some(Self::Alternating),
            _ => None,
        }
    }

    pub fn index(self) -> i32 {
        self as i32
    }
}

/// Where a track's firing steps go
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputMode {
    Off,
    Trigger,
    #[default]
    Midi,
}

impl OutputMode {
    pub fn from_index(value: i32) -> Option<Self> {
        match value {
            0 => Some(Self::Off),
            1 => Some(Self::Trigger),
            2 => Some(Self::Midi),
            _ => None,
        }
    }

    pub fn index(self) -> i32 {
        self as i32
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ClockSourceKind {
    /// CV gate edges, one base pulse each
    External,
    #[default]
    Internal,
}

impl ClockSourceKind {
    pub fn indicator(self) -> char {
        match self {
            Self::External => SETTING_CLOCKSOURCE_CV,
            Self::Internal => SETTING_CLOCKSOURCE_INTERNAL,
        }
    }

    pub fn from_indicator(c: char) -> Option<Self> {
        match c {
            SETTING_CLOCKSOURCE_CV => Some(Self::External),
            SETTING_CLOCKSOURCE_INTERNAL => Some(Self::Internal),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EditMode {
    #[default]
    Menu,
    Grid,
}

impl EditMode {
    pub fn indicator(self) -> char {
        match self {
            Self::Menu => DISPLAY_EDITMODE_MENU,
            Self::Grid => DISPLAY_EDITMODE_GRID,
        }
    }
}

/// The instrument voices, one per track
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Instrument {
    Kick,
    Snare,
    HihatClosed,
    HihatOpen,
    Rimshot,
    Clave,
    TomHi,
    TomLo,
}

impl Instrument {
    pub const ALL: [Instrument; TRACK_COUNT] = [
        Self::Kick,
        Self::Snare,
        Self::HihatClosed,
        Self::HihatOpen,
        Self::Rimshot,
        Self::Clave,
        Self::TomHi,
        Self::TomLo,
    ];

    pub fn indicator(self) -> char {
        match self {
            Self::Kick => DISPLAY_SEQINDICATOR_KICK,
            Self::Snare => DISPLAY_SEQINDICATOR_SNARE,
            Self::HihatClosed => DISPLAY_SEQINDICATOR_HIHAT_CLOSED,
            Self::HihatOpen => DISPLAY_SEQINDICATOR_HIHAT_OPEN,
            Self::Rimshot => DISPLAY_SEQINDICATOR_RIMSHOT,
            Self::Clave => DISPLAY_SEQINDICATOR_CLAVE,
            Self::TomHi => DISPLAY_SEQINDICATOR_TOM_HI,
            Self::TomLo => DISPLAY_SEQINDICATOR_TOM_LO,
        }
    }

    /// General MIDI drum map
    pub fn default_note(self) -> u8 {
        match self {
            Self::Kick => 36,
            Self::Snare => 38,
            Self::HihatClosed => 42,
            Self::HihatOpen => 46,
            Self::Rimshot => 37,
            Self::Clave => 75,
            Self::TomHi => 50,
            Self::TomLo => 45,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::Kick => "Kick",
            Self::Snare => "Snare",
            Self::HihatClosed => "Closed Hat",
            Self::HihatOpen => "Open Hat",
            Self::Rimshot => "Rimshot",
            Self::Clave => "Clave",
            Self::TomHi => "Tom Hi",
            Self::TomLo => "Tom Lo",
        }
    }
}

/// Per-track parameter, named by its display code
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParamId {
    MidiChannel,
    Length,
    Pulses,
    Rotation,
    Direction,
    NoteLength,
    Gate,
    Velocity,
    Note,
    RandomAmount,
    RandomChance,
    Output,
}

impl ParamId {
    pub const ALL: [ParamId; 12] = [
        Self::MidiChannel,
        Self::Length,
        Self::Pulses,
        Self::Rotation,
        Self::Direction,
        Self::NoteLength,
        Self::Gate,
        Self::Velocity,
        Self::Note,
        Self::RandomAmount,
        Self::RandomChance,
        Self::Output,
    ];

    pub fn code(self) -> &'static str {
        match self {
            Self::MidiChannel => "Mchn",
            Self::Length => "Slen",
            Self::Pulses => "Spul",
            Self::Rotation => "Srot",
            Self::Direction => "Sdir",
            Self::NoteLength => "Snln",
            Self::Gate => "Sgte",
            Self::Velocity => "Svel",
            Self::Note => "Snte",
            Self::RandomAmount => "Srda",
            Self::RandomChance => "Srdc",
            Self::Output => "Sout",
        }
    }

    /// Inclusive bounds; note length is further restricted to `NOTE_LENGTHS`
    pub fn range(self) -> (i32, i32) {
        match self {
            Self::MidiChannel => (1, 16),
            Self::Length => (1, MAX_STEPS as i32),
            Self::Pulses => (0, MAX_STEPS as i32),
            Self::Rotation => (0, MAX_STEPS as i32 - 1),
            Self::Direction => (0, 2),
            Self::NoteLength => (1, 32),
            Self::Gate => (1, 99),
            Self::Velocity => (1, 127),
            Self::Note => (24, 96),
            Self::RandomAmount => (0, 100),
            Self::RandomChance => (0, 100),
            Self::Output => (0, 2),
        }
    }

    /// Changing these invalidates the cached pattern
    pub fn affects_pattern(self) -> bool {
        matches!(self, Self::Length | Self::Pulses | Self::Rotation)
    }
}

impl fmt::Display for ParamId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

impl FromStr for ParamId {
    type Err = SequencerError;

    fn from_str(s: &str) -> Result<Self> {
        Self::ALL
            .iter()
            .copied()
            .find(|p| p.code().eq_ignore_ascii_case(s))
            .ok_or_else(|| SequencerError::UnknownParameter(s.to_string()))
    }
}

fn invalid(param: &'static str, value: i32, (min, max): (i32, i32)) -> SequencerError {
    SequencerError::InvalidParameter { param, value, min, max }
}

/// Reject `value` unless it lies within the documented range of `param`
pub fn validate(param: ParamId, value: i32) -> Result<()> {
    let range = param.range();
    let in_range = value >= range.0 && value <= range.1;
    let ok = match param {
        ParamId::NoteLength => in_range && NOTE_LENGTHS.contains(&(value as u8)),
        _ => in_range,
    };
    if ok {
        Ok(())
    } else {
        Err(invalid(param.code(), value, range))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TrackParameters {
    pub midi_channel: u8,
    pub length: u8,
    pub pulses: u8,
    pub rotation: u8,
    pub direction: Direction,
    pub note_length: u8,
    pub gate: u8,
    pub velocity: u8,
    pub note: u8,
    pub random_amount: u8,
    pub random_chance: u8,
    pub output: OutputMode,
}

impl Default for TrackParameters {
    fn default() -> Self {
        Self {
            midi_channel: MIDI_DRUM_CHANNEL,
            length: 16,
            pulses: 4,
            rotation: 0,
            direction: Direction::Forward,
            note_length: 16,
            gate: 50,
            velocity: 100,
            note: Instrument::Kick.default_note(),
            random_amount: 0,
            random_chance: 0,
            output: OutputMode::Midi,
        }
    }
}

impl TrackParameters {
    pub fn for_instrument(instrument: Instrument) -> Self {
        let (pulses, rotation) = match instrument {
            Instrument::Kick => (4, 0),
            Instrument::Snare => (2, 4),
            Instrument::HihatClosed => (8, 0),
            Instrument::HihatOpen => (4, 2),
            _ => (0, 0),
        };
        Self {
            pulses,
            rotation,
            note: instrument.default_note(),
            ..Default::default()
        }
    }

    pub fn get(&self, param: ParamId) -> i32 {
        match param {
            ParamId::MidiChannel => self.midi_channel as i32,
            ParamId::Length => self.length as i32,
            ParamId::Pulses => self.pulses as i32,
            ParamId::Rotation => self.rotation as i32,
            ParamId::Direction => self.direction.index(),
            ParamId::NoteLength => self.note_length as i32,
            ParamId::Gate => self.gate as i32,
            ParamId::Velocity => self.velocity as i32,
            ParamId::Note => self.note as i32,
            ParamId::RandomAmount => self.random_amount as i32,
            ParamId::RandomChance => self.random_chance as i32,
            ParamId::Output => self.output.index(),
        }
    }

    /// Range-checked write; on error `self` is untouched
    pub fn set(&mut self, param: ParamId, value: i32) -> Result<()> {
        validate(param, value)?;
        // validate() bounds every value below 128, so the narrowing is lossless
        let v = value as u8;
        match param {
            ParamId::MidiChannel => self.midi_channel = v,
            ParamId::Length => self.length = v,
            ParamId::Pulses => self.pulses = v,
            ParamId::Rotation => self.rotation = v,
            ParamId::Direction => {
                self.direction = Direction::from_index(value)
                    .ok_or_else(|| invalid(param.code(), value, param.range()))?
            }
            ParamId::NoteLength => self.note_length = v,
            ParamId::Gate => self.gate = v,
            ParamId::Velocity => self.velocity = v,
            ParamId::Note => self.note = v,
            ParamId::RandomAmount => self.random_amount = v,
            ParamId::RandomChance => self.random_chance = v,
            ParamId::Output => {
                self.output = OutputMode::from_index(value)
                    .ok_or_else(|| invalid(param.code(), value, param.range()))?
            }
        }
        Ok(())
    }

    /// Check every field against its range, as `set` would
    pub fn validate(&self) -> Result<()> {
        for param in ParamId::ALL {
            validate(param, self.get(param))?;
        }
        Ok(())
    }

    /// Base pulses between consecutive steps
    pub fn ticks_per_step(&self) -> u32 {
        PULSES_PER_WHOLE_NOTE / self.note_length.max(1) as u32
    }
}

/// Global clock settings
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClockParam {
    Bpm,
    Swing,
    Source,
}

impl ClockParam {
    pub fn code(self) -> &'static str {
        match self {
            Self::Bpm => "Bpm",
            Self::Swing => "Swng",
            Self::Source => "Clck",
        }
    }

    fn check(self, value: i32) -> Result<()> {
        let range = self.range();
        if value < range.0 || value > range.1 {
            return Err(invalid(self.code(), value, range));
        }
        Ok(())
    }

    pub fn range(self) -> (i32, i32) {
        match self {
            Self::Bpm => (BPM_MIN as i32, BPM_MAX as i32),
            Self::Swing => (0, SWING_MAX as i32),
            // 0 = external, 1 = internal
            Self::Source => (0, 1),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClockSettings {
    pub bpm: u16,
    pub swing: u8,
    pub source: ClockSourceKind,
}

impl Default for ClockSettings {
    fn default() -> Self {
        Self {
            bpm: BPM_DEFAULT,
            swing: 0,
            source: ClockSourceKind::Internal,
        }
    }
}

impl ClockSettings {
    pub fn set(&mut self, param: ClockParam, value: i32) -> Result<()> {
        param.check(value)?;
        match param {
            ClockParam::Bpm => self.bpm = value as u16,
            ClockParam::Swing => self.swing = value as u8,
            ClockParam::Source => {
                self.source = if value == 0 {
                    ClockSourceKind::External
                } else {
                    ClockSourceKind::Internal
                }
            }
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        ClockParam::Bpm.check(self.bpm as i32)?;
        ClockParam::Swing.check(self.swing as i32)
    }
}
