/// Top-level driver: owns the clock and tracks, fans out ticks, runs the transport
use tracing::{debug, info, warn};

use crate::config::SequencerConfig;
use crate::constants::TRACK_COUNT;
use crate::error::{Result, SequencerError};
use crate::sequencer::clock::{ClockSource, ExternalClockInput};
use crate::sequencer::params::{
    ClockParam, ClockSettings, ClockSourceKind, EditMode, Instrument, ParamId, TrackParameters,
};
use crate::sequencer::track::{TrackSequencer, TrackSnapshot, TrackTick};

const DEFAULT_SEED: u64 = 0x5eed_e0c1_1d5e_0001;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TransportState {
    #[default]
    Stopped,
    Playing,
    Paused,
}

/// Everything that happened on one tick, one slot per track
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TickReport {
    pub tick: u64,
    pub tracks: [TrackTick; TRACK_COUNT],
}

impl TickReport {
    fn new(tick: u64) -> Self {
        Self {
            tick,
            tracks: [TrackTick::default(); TRACK_COUNT],
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (usize, &TrackTick)> {
        self.tracks.iter().enumerate()
    }

    pub fn fired_count(&self) -> usize {
        self.tracks.iter().filter(|t| t.fired.is_some()).count()
    }

    pub fn closed_count(&self) -> usize {
        self.tracks.iter().filter(|t| t.gate_closed).count()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EngineSnapshot {
    pub transport: TransportState,
    pub tick: u64,
    pub edit_mode: EditMode,
    pub clock: ClockSettings,
    pub clock_timeout: bool,
    pub tracks: [TrackSnapshot; TRACK_COUNT],
}

pub struct SequencerEngine {
    clock: ClockSource,
    tracks: Vec<TrackSequencer>,
    transport: TransportState,
    next_tick: u64,
    edit_mode: EditMode,
    clock_timeout: bool,
    report: TickReport,
}

impl SequencerEngine {
    pub fn new(seed: u64) -> Result<Self> {
        let params = Instrument::ALL.map(TrackParameters::for_instrument);
        Self::with_parameters(ClockSource::new(ClockSettings::default())?, params, seed)
    }

    pub fn from_config(config: &SequencerConfig) -> Result<Self> {
        let mut settings = ClockSettings::default();
        settings.set(ClockParam::Bpm, config.clock.bpm as i32)?;
        settings.set(ClockParam::Swing, config.clock.swing as i32)?;
        settings.source = config.clock.source;
        let clock = ClockSource::new(settings)?
            .with_timeout_us(config.clock.timeout_ms.saturating_mul(1_000));

        let mut params = Instrument::ALL.map(TrackParameters::for_instrument);
        for p in params.iter_mut() {
            p.output = config.output.mode;
        }
        for track in &config.tracks {
            let target = params
                .get_mut(track.track)
                .ok_or(SequencerError::InvalidTrack(track.track))?;
            for (code, &value) in &track.params {
                target.set(code.parse::<ParamId>()?, value)?;
            }
        }

        Self::with_parameters(clock, params, config.seed.unwrap_or(DEFAULT_SEED))
    }

    fn with_parameters(
        clock: ClockSource,
        params: [TrackParameters; TRACK_COUNT],
        seed: u64,
    ) -> Result<Self> {
        let mut tracks = Vec::with_capacity(TRACK_COUNT);
        for (i, (instrument, p)) in Instrument::ALL.into_iter().zip(params).enumerate() {
            tracks.push(TrackSequencer::new(instrument, p, seed.wrapping_add(i as u64))?);
        }
        Ok(Self {
            clock,
            tracks,
            transport: TransportState::Stopped,
            next_tick: 0,
            edit_mode: EditMode::default(),
            clock_timeout: false,
            report: TickReport::new(0),
        })
    }

    pub fn transport(&self) -> TransportState {
        self.transport
    }

    pub fn is_playing(&self) -> bool {
        self.transport == TransportState::Playing
    }

    /// Ticks processed since the last start
    pub fn tick_count(&self) -> u64 {
        self.next_tick
    }

    pub fn track(&self, index: usize) -> Option<&TrackSequencer> {
        self.tracks.get(index)
    }

    pub fn open_gates(&self) -> usize {
        self.tracks.iter().filter(|t| t.gate_open()).count()
    }

    pub fn clock_settings(&self) -> ClockSettings {
        self.clock.settings()
    }

    pub fn external_clock_input(&self) -> ExternalClockInput {
        self.clock.external_input()
    }

    pub fn edit_mode(&self) -> EditMode {
        self.edit_mode
    }

    pub fn set_edit_mode(&mut self, mode: EditMode) {
        self.edit_mode = mode;
    }

    /// Validated write; takes effect at the track's next step boundary
    pub fn set_parameter(&mut self, track: usize, param: ParamId, value: i32) -> Result<()> {
        let seq = self
            .tracks
            .get_mut(track)
            .ok_or(SequencerError::InvalidTrack(track))?;
        seq.set_parameter(param, value).inspect_err(|e| {
            warn!("Rejected {}={} on track {}: {}", param, value, track, e);
        })?;
        debug!("Track {} {} <- {}", track, param, value);
        Ok(())
    }

    pub fn set_clock_parameter(&mut self, param: ClockParam, value: i32) -> Result<()> {
        let mut settings = self.clock.settings();
        settings.set(param, value).inspect_err(|e| {
            warn!("Rejected clock {}={}: {}", param.code(), value, e);
        })?;
        self.clock.apply_settings(settings)?;
        if settings.source != ClockSourceKind::External {
            self.clock_timeout = false;
        }
        debug!("Clock {} <- {}", param.code(), value);
        Ok(())
    }

    /// Reset every cursor to step 0 and align to tick 0.
    /// The report carries gates that were still open.
    pub fn start(&mut self, now_us: u64) -> &TickReport {
        self.close_all_gates();
        for track in &mut self.tracks {
            track.reset();
        }
        self.next_tick = 0;
        self.clock.reset(now_us, 0);
        self.clock_timeout = false;
        self.transport = TransportState::Playing;
        info!("Transport started");
        &self.report
    }

    /// Close all gates now; cursors go back to 0 on the next start
    pub fn stop(&mut self) -> &TickReport {
        self.close_all_gates();
        self.transport = TransportState::Stopped;
        info!("Transport stopped");
        &self.report
    }

    /// Suspend tick forwarding, keeping cursor positions
    pub fn pause(&mut self) -> &TickReport {
        self.close_all_gates();
        if self.transport == TransportState::Playing {
            self.transport = TransportState::Paused;
            info!("Transport paused at tick {}", self.next_tick);
        }
        &self.report
    }

    pub fn resume(&mut self, now_us: u64) {
        if self.transport == TransportState::Paused {
            self.clock.reset(now_us, self.next_tick);
            self.transport = TransportState::Playing;
            info!("Transport resumed at tick {}", self.next_tick);
        }
    }

    fn close_all_gates(&mut self) {
        self.report = TickReport::new(self.next_tick);
        for (slot, track) in self.report.tracks.iter_mut().zip(&mut self.tracks) {
            slot.gate_closed = track.close_gate();
        }
    }

    /// Advance one base pulse. Does nothing unless playing.
    pub fn tick(&mut self) -> &TickReport {
        self.report = TickReport::new(self.next_tick);
        if self.transport != TransportState::Playing {
            return &self.report;
        }

        let tick = self.next_tick;
        for (i, (slot, track)) in self
            .report
            .tracks
            .iter_mut()
            .zip(&mut self.tracks)
            .enumerate()
        {
            *slot = track.tick(tick);
            if let Some(r) = slot.rejected {
                warn!("Track {} kept its pattern: {}", i, SequencerError::from(r));
            }
        }
        self.next_tick += 1;
        &self.report
    }

    /// Poll the clock and process every pulse it reports, handing each tick's
    /// report to `on_tick`. While the external clock is silent the position holds.
    pub fn run<F: FnMut(&TickReport)>(&mut self, now_us: u64, on_tick: F) -> Result<u32> {
        if self.transport != TransportState::Playing {
            return Ok(0);
        }

        let pulses = match self.clock.tick(now_us) {
            Ok(pulses) => {
                if self.clock_timeout {
                    self.clock_timeout = false;
                    info!("External clock resumed");
                }
                pulses
            }
            Err(e) => {
                if !self.clock_timeout {
                    self.clock_timeout = true;
                    warn!("{}", e);
                }
                return Err(e);
            }
        };

        self.process(pulses, on_tick);
        Ok(pulses)
    }

    /// Run `pulses` ticks, handing each report to `on_tick` before the next overwrites it
    pub fn process<F: FnMut(&TickReport)>(&mut self, pulses: u32, mut on_tick: F) {
        for _ in 0..pulses {
            on_tick(self.tick());
        }
    }

    pub fn clock_timed_out(&self) -> bool {
        self.clock_timeout
    }

    pub fn snapshot(&self) -> EngineSnapshot {
        EngineSnapshot {
            transport: self.transport,
            tick: self.next_tick,
            edit_mode: self.edit_mode,
            clock: self.clock.settings(),
            clock_timeout: self.clock_timeout,
            tracks: std::array::from_fn(|i| self.tracks[i].snapshot()),
        }
    }
}
