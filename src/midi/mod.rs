/// MIDI output using midir
use midir::{MidiOutput, MidiOutputConnection};
use tracing::info;

use crate::dispatch::OutputSink;
use crate::error::{Result, SequencerError};

const CLIENT_NAME: &str = "euclid-sqnc MIDI Output";

const NOTE_ON: u8 = 0x90;
const NOTE_OFF: u8 = 0x80;

/// Note-on bytes; `channel` is 1-16
pub fn note_on_message(channel: u8, note: u8, velocity: u8) -> [u8; 3] {
    [NOTE_ON | channel_nibble(channel), note & 0x7f, velocity & 0x7f]
}

pub fn note_off_message(channel: u8, note: u8) -> [u8; 3] {
    [NOTE_OFF | channel_nibble(channel), note & 0x7f, 0]
}

fn channel_nibble(channel: u8) -> u8 {
    channel.clamp(1, 16) - 1
}

pub struct MidiOutputDevice {
    connection: Option<MidiOutputConnection>,
}

impl MidiOutputDevice {
    pub fn new() -> Self {
        Self { connection: None }
    }

    pub fn available_ports() -> Vec<String> {
        if let Ok(midi_out) = MidiOutput::new(CLIENT_NAME) {
            midi_out
                .ports()
                .iter()
                .filter_map(|p| midi_out.port_name(p).ok())
                .collect()
        } else {
            vec![]
        }
    }

    pub fn connect(&mut self, port_index: usize) -> Result<()> {
        let midi_out = MidiOutput::new(CLIENT_NAME)
            .map_err(|e| SequencerError::Midi(format!("Failed to create MIDI output: {}", e)))?;

        let ports = midi_out.ports();
        let port = ports
            .get(port_index)
            .ok_or_else(|| SequencerError::Midi(format!("Invalid port index {}", port_index)))?;
        let name = midi_out.port_name(port).unwrap_or_default();

        let connection = midi_out
            .connect(port, "euclid-sqnc")
            .map_err(|e| SequencerError::Midi(format!("Failed to connect: {}", e)))?;

        info!("Connected MIDI output to {}", name);
        self.connection = Some(connection);
        Ok(())
    }

    /// Connect to the first port whose name contains `pattern`
    pub fn connect_matching(&mut self, pattern: &str) -> Result<()> {
        let index = Self::available_ports()
            .iter()
            .position(|name| name.contains(pattern))
            .ok_or_else(|| SequencerError::Midi(format!("No MIDI port matching '{}'", pattern)))?;
        self.connect(index)
    }

    pub fn is_connected(&self) -> bool {
        self.connection.is_some()
    }

    fn send(&mut self, message: &[u8]) -> Result<()> {
        if let Some(ref mut conn) = self.connection {
            conn.send(message)
                .map_err(|e| SequencerError::Midi(format!("Failed to send: {}", e)))?;
        }
        Ok(())
    }
}

impl Default for MidiOutputDevice {
    fn default() -> Self {
        Self::new()
    }
}

impl OutputSink for MidiOutputDevice {
    fn note_on(&mut self, channel: u8, note: u8, velocity: u8) -> Result<()> {
        self.send(&note_on_message(channel, note, velocity))
    }

    fn note_off(&mut self, channel: u8, note: u8) -> Result<()> {
        self.send(&note_off_message(channel, note))
    }

    fn gate_open(&mut self, _track: usize) -> Result<()> {
        Ok(())
    }

    fn gate_close(&mut self, _track: usize) -> Result<()> {
        Ok(())
    }
}

pub fn midi_note_name(note: u8) -> String {
    let note_names = ["C", "C#", "D", "D#", "E", "F", "F#", "G", "G#", "A", "A#", "B"];
    let octave = (note / 12) as i32 - 1;
    let note_index = (note % 12) as usize;
    format!("{}{}", note_names[note_index], octave)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_messages() {
        assert_eq!(note_on_message(10, 36, 100), [0x99, 36, 100]);
        assert_eq!(note_off_message(1, 60), [0x80, 60, 0]);
        assert_eq!(note_on_message(16, 96, 127), [0x9f, 96, 127]);
    }

    #[test]
    fn test_disconnected_device_is_silent() {
        let mut dev = MidiOutputDevice::new();
        assert!(!dev.is_connected());
        assert!(dev.note_on(10, 36, 100).is_ok());
        assert!(dev.note_off(10, 36).is_ok());
    }

    #[test]
    fn test_note_names() {
        assert_eq!(midi_note_name(36), "C2");
        assert_eq!(midi_note_name(42), "F#2");
        assert_eq!(midi_note_name(60), "C4");
    }
}
