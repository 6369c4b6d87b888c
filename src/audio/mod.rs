/// Trigger outputs using cpal: each open gate holds a DC pulse on its channel
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use tracing::{info, warn};

use crate::constants::TRACK_COUNT;
use crate::dispatch::OutputSink;
use crate::error::{Result, SequencerError};

/// Pulse amplitude while a gate is open
const TRIGGER_LEVEL: f32 = 0.8;

/// Open-gate bitmask shared with the audio callback, one bit per track
#[derive(Debug, Clone, Default)]
pub struct TriggerGates {
    mask: Arc<AtomicU32>,
}

impl TriggerGates {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn mask(&self) -> u32 {
        self.mask.load(Ordering::Acquire)
    }

    pub fn is_open(&self, track: usize) -> bool {
        track < TRACK_COUNT && self.mask() & (1 << track) != 0
    }
}

impl OutputSink for TriggerGates {
    fn note_on(&mut self, _channel: u8, _note: u8, _velocity: u8) -> Result<()> {
        Ok(())
    }

    fn note_off(&mut self, _channel: u8, _note: u8) -> Result<()> {
        Ok(())
    }

    fn gate_open(&mut self, track: usize) -> Result<()> {
        if track < TRACK_COUNT {
            self.mask.fetch_or(1 << track, Ordering::Release);
        }
        Ok(())
    }

    fn gate_close(&mut self, track: usize) -> Result<()> {
        if track < TRACK_COUNT {
            self.mask.fetch_and(!(1 << track), Ordering::Release);
        }
        Ok(())
    }
}

/// Tracks routed to output `channel`: track `t` plays on `t % channels`
pub fn channel_mask(channel: usize, channels: usize) -> u32 {
    (0..TRACK_COUNT)
        .filter(|t| channels > 0 && t % channels == channel)
        .fold(0, |mask, t| mask | (1 << t))
}

/// Fill interleaved frames from the gate mask
pub fn render_triggers(data: &mut [f32], channels: usize, gates: u32) {
    let channels = channels.max(1);
    for frame in data.chunks_mut(channels) {
        for (channel, sample) in frame.iter_mut().enumerate() {
            *sample = if gates & channel_mask(channel, channels) != 0 {
                TRIGGER_LEVEL
            } else {
                0.0
            };
        }
    }
}

pub struct AudioOutput {
    _stream: Option<cpal::Stream>,
    gates: TriggerGates,
}

impl AudioOutput {
    pub fn new() -> Result<Self> {
        let gates = TriggerGates::new();
        let stream = Self::setup_audio_stream(gates.clone())?;

        Ok(Self {
            _stream: Some(stream),
            gates,
        })
    }

    fn setup_audio_stream(gates: TriggerGates) -> Result<cpal::Stream> {
        let host = cpal::default_host();
        let device = host
            .default_output_device()
            .ok_or_else(|| SequencerError::Audio("No output device".into()))?;
        let config = device
            .default_output_config()
            .map_err(|e| SequencerError::Audio(e.to_string()))?;

        let channels = config.channels() as usize;

        let stream = match config.sample_format() {
            cpal::SampleFormat::F32 => device.build_output_stream(
                &config.into(),
                move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
                    render_triggers(data, channels, gates.mask());
                },
                |err| warn!("Audio stream error: {}", err),
                None,
            ),
            other => {
                return Err(SequencerError::Audio(format!(
                    "Unsupported sample format {:?}",
                    other
                )))
            }
        }
        .map_err(|e| SequencerError::Audio(e.to_string()))?;

        stream
            .play()
            .map_err(|e| SequencerError::Audio(e.to_string()))?;
        info!("Trigger outputs on {} channels", channels);
        Ok(stream)
    }

    pub fn gates(&self) -> TriggerGates {
        self.gates.clone()
    }
}

impl Default for AudioOutput {
    fn default() -> Self {
        Self::new().unwrap_or_else(|e| {
            warn!("Trigger outputs disabled: {}", e);
            Self {
                _stream: None,
                gates: TriggerGates::new(),
            }
        })
    }
}
