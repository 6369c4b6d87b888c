/// Constants shared across the engine, outputs and the display collaborator
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Base pulses per quarter note
pub const CLOCK_TIMER_RESOLUTION: u32 = 24;

/// Base pulses per whole note; ticks per step is this divided by the note length
pub const PULSES_PER_WHOLE_NOTE: u32 = CLOCK_TIMER_RESOLUTION * 4;

/// Longest supported sequence
pub const MAX_STEPS: usize = 32;

/// Number of instrument tracks
pub const TRACK_COUNT: usize = 8;

// Edit modes reported to the display
pub const DISPLAY_EDITMODE_MENU: char = 'm';
pub const DISPLAY_EDITMODE_GRID: char = 'g';

// Track indicators
pub const DISPLAY_SEQINDICATOR_KICK: char = 'K';
pub const DISPLAY_SEQINDICATOR_SNARE: char = 'S';
pub const DISPLAY_SEQINDICATOR_HIHAT_CLOSED: char = 'h';
pub const DISPLAY_SEQINDICATOR_HIHAT_OPEN: char = 'H';
pub const DISPLAY_SEQINDICATOR_RIMSHOT: char = 'R';
pub const DISPLAY_SEQINDICATOR_CLAVE: char = 'C';
pub const DISPLAY_SEQINDICATOR_TOM_HI: char = 'T';
pub const DISPLAY_SEQINDICATOR_TOM_LO: char = 't';

pub const SETTING_CLOCKSOURCE_CV: char = 'C';
pub const SETTING_CLOCKSOURCE_INTERNAL: char = 'I';

// Clock settings
pub const BPM_MIN: u16 = 40;
pub const BPM_MAX: u16 = 240;
pub const BPM_DEFAULT: u16 = 120;
pub const SWING_MAX: u8 = 50;

/// External clock silence before a timeout is reported
pub const CLOCK_TIMEOUT_US_DEFAULT: u64 = 2_000_000;

/// Pulses the internal clock will catch up after a stall before resyncing
pub const CLOCK_MAX_CATCHUP_PULSES: u32 = 96;

/// Note lengths whose step divides a whole note evenly
pub const NOTE_LENGTHS: [u8; 10] = [1, 2, 3, 4, 6, 8, 12, 16, 24, 32];

/// Default MIDI channel for drum voices
pub const MIDI_DRUM_CHANNEL: u8 = 10;
