/// Host timer thread: drives the engine, applies editor commands, publishes events
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use ringbuf::traits::{Consumer, Producer, Split};
use ringbuf::{HeapCons, HeapProd, HeapRb};
use tracing::{debug, warn};

use crate::dispatch::{OutputDispatcher, OutputSink};
use crate::error::{Result, SequencerError};
use crate::sequencer::clock::ExternalClockInput;
use crate::sequencer::engine::{EngineSnapshot, SequencerEngine, TickReport, TransportState};
use crate::sequencer::params::{validate, ClockParam, EditMode, ParamId};

const COMMAND_CAPACITY: usize = 256;
const EVENT_CAPACITY: usize = 4096;
const TIMER_PERIOD: Duration = Duration::from_micros(250);

/// Editor → engine requests
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    Start,
    Stop,
    Pause,
    Resume,
    SetParameter { track: usize, param: ParamId, value: i32 },
    SetClock { param: ClockParam, value: i32 },
    SetEditMode(EditMode),
}

/// Engine → host notifications
#[derive(Debug)]
pub enum PlaybackEvent {
    Transport(TransportState),
    StepFired { track: usize, step: u8, note: u8, velocity: u8 },
    GateClosed { track: usize },
    Rejected(SequencerError),
    ClockTimeout,
    ClockResumed,
    OutputError(SequencerError),
}

pub struct PlaybackEngine {
    commands: HeapProd<Command>,
    events: HeapCons<PlaybackEvent>,
    snapshot: Arc<Mutex<EngineSnapshot>>,
    is_running: Arc<AtomicBool>,
    external_clock: ExternalClockInput,
    handle: Option<JoinHandle<()>>,
}

impl PlaybackEngine {
    /// Move the engine and sink onto a timer thread
    pub fn spawn<S>(engine: SequencerEngine, sink: S) -> Self
    where
        S: OutputSink + Send + 'static,
    {
        let (commands, command_rx) = HeapRb::<Command>::new(COMMAND_CAPACITY).split();
        let (event_tx, events) = HeapRb::<PlaybackEvent>::new(EVENT_CAPACITY).split();
        let snapshot = Arc::new(Mutex::new(engine.snapshot()));
        let is_running = Arc::new(AtomicBool::new(true));
        let external_clock = engine.external_clock_input();

        let worker = TimerWorker {
            engine,
            dispatcher: OutputDispatcher::new(),
            sink,
            commands: command_rx,
            events: event_tx,
            snapshot: Arc::clone(&snapshot),
            origin: Instant::now(),
            timed_out: false,
        };
        let running = Arc::clone(&is_running);
        let handle = thread::spawn(move || worker.run(running));

        Self {
            commands,
            events,
            snapshot,
            is_running,
            external_clock,
            handle: Some(handle),
        }
    }

    fn send(&mut self, command: Command) -> Result<()> {
        self.commands
            .try_push(command)
            .map_err(|_| SequencerError::CommandQueueFull)
    }

    pub fn start(&mut self) -> Result<()> {
        self.send(Command::Start)
    }

    pub fn stop(&mut self) -> Result<()> {
        self.send(Command::Stop)
    }

    pub fn pause(&mut self) -> Result<()> {
        self.send(Command::Pause)
    }

    pub fn resume(&mut self) -> Result<()> {
        self.send(Command::Resume)
    }

    /// Range-checked here; shape checks come back as `PlaybackEvent::Rejected`
    pub fn set_parameter(&mut self, track: usize, param: ParamId, value: i32) -> Result<()> {
        validate(param, value)?;
        self.send(Command::SetParameter { track, param, value })
    }

    pub fn set_clock_parameter(&mut self, param: ClockParam, value: i32) -> Result<()> {
        let (min, max) = param.range();
        if value < min || value > max {
            return Err(SequencerError::InvalidParameter {
                param: param.code(),
                value,
                min,
                max,
            });
        }
        self.send(Command::SetClock { param, value })
    }

    pub fn set_edit_mode(&mut self, mode: EditMode) -> Result<()> {
        self.send(Command::SetEditMode(mode))
    }

    pub fn external_clock(&self) -> ExternalClockInput {
        self.external_clock.clone()
    }

    pub fn is_running(&self) -> bool {
        self.is_running.load(Ordering::Acquire)
    }

    pub fn snapshot(&self) -> Option<EngineSnapshot> {
        self.snapshot.lock().ok().map(|s| *s)
    }

    pub fn poll_events(&mut self) -> Vec<PlaybackEvent> {
        let mut events = Vec::new();
        while let Some(event) = self.events.try_pop() {
            events.push(event);
        }
        events
    }

    /// Stop the thread; open gates are closed on the way out
    pub fn shutdown(&mut self) {
        self.is_running.store(false, Ordering::Release);
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                warn!("Playback thread panicked");
            }
        }
    }
}

impl Drop for PlaybackEngine {
    fn drop(&mut self) {
        self.shutdown();
    }
}

struct TimerWorker<S> {
    engine: SequencerEngine,
    dispatcher: OutputDispatcher,
    sink: S,
    commands: HeapCons<Command>,
    events: HeapProd<PlaybackEvent>,
    snapshot: Arc<Mutex<EngineSnapshot>>,
    origin: Instant,
    timed_out: bool,
}

impl<S: OutputSink> TimerWorker<S> {
    fn run(mut self, running: Arc<AtomicBool>) {
        debug!("Playback thread started");
        while running.load(Ordering::Acquire) {
            let now_us = self.origin.elapsed().as_micros() as u64;
            // Transport and parameter changes go before any step advance
            while let Some(command) = self.commands.try_pop() {
                self.apply(command, now_us);
            }
            self.poll_clock(now_us);

            if let Ok(mut shared) = self.snapshot.try_lock() {
                *shared = self.engine.snapshot();
            }
            thread::sleep(TIMER_PERIOD);
        }

        let report = *self.engine.stop();
        self.dispatch(&report);
        if let Err(e) = self.dispatcher.close_all(&mut self.sink) {
            warn!("Closing outputs failed: {}", e);
        }
        debug!("Playback thread stopped");
    }

    fn apply(&mut self, command: Command, now_us: u64) {
        let report = match command {
            Command::Start => Some(*self.engine.start(now_us)),
            Command::Stop => Some(*self.engine.stop()),
            Command::Pause => Some(*self.engine.pause()),
            Command::Resume => {
                self.engine.resume(now_us);
                None
            }
            Command::SetParameter { track, param, value } => {
                if let Err(e) = self.engine.set_parameter(track, param, value) {
                    self.emit(PlaybackEvent::Rejected(e));
                }
                return;
            }
            Command::SetClock { param, value } => {
                if let Err(e) = self.engine.set_clock_parameter(param, value) {
                    self.emit(PlaybackEvent::Rejected(e));
                }
                return;
            }
            Command::SetEditMode(mode) => {
                self.engine.set_edit_mode(mode);
                return;
            }
        };
        if let Some(report) = report {
            self.dispatch(&report);
        }
        self.emit(PlaybackEvent::Transport(self.engine.transport()));
    }

    fn poll_clock(&mut self, now_us: u64) {
        let Self {
            engine,
            dispatcher,
            sink,
            events,
            ..
        } = self;
        let result = engine.run(now_us, |report| {
            if let Err(e) = dispatcher.dispatch(report, sink) {
                let _ = events.try_push(PlaybackEvent::OutputError(e));
            }
            publish(events, report);
        });

        match result {
            Ok(_) if self.timed_out => {
                self.timed_out = false;
                self.emit(PlaybackEvent::ClockResumed);
            }
            Err(SequencerError::ClockTimeout { .. }) if !self.timed_out => {
                self.timed_out = true;
                self.emit(PlaybackEvent::ClockTimeout);
            }
            _ => {}
        }
    }

    fn dispatch(&mut self, report: &TickReport) {
        if let Err(e) = self.dispatcher.dispatch(report, &mut self.sink) {
            self.emit(PlaybackEvent::OutputError(e));
        }
        publish(&mut self.events, report);
    }

    fn emit(&mut self, event: PlaybackEvent) {
        let _ = self.events.try_push(event);
    }
}

fn publish(events: &mut HeapProd<PlaybackEvent>, report: &TickReport) {
    for (track, t) in report.iter() {
        if t.gate_closed {
            let _ = events.try_push(PlaybackEvent::GateClosed { track });
        }
        if let Some(rejection) = t.rejected {
            let _ = events.try_push(PlaybackEvent::Rejected(rejection.into()));
        }
        if let Some(fire) = t.fired {
            let _ = events.try_push(PlaybackEvent::StepFired {
                track,
                step: fire.step,
                note: fire.note,
                velocity: fire.velocity,
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::TriggerGates;

    fn wait_for<F: FnMut(&PlaybackEvent) -> bool>(
        playback: &mut PlaybackEngine,
        mut pred: F,
    ) -> bool {
        let deadline = Instant::now() + Duration::from_secs(2);
        while Instant::now() < deadline {
            if playback.poll_events().iter().any(&mut pred) {
                return true;
            }
            thread::sleep(Duration::from_millis(5));
        }
        false
    }

    #[test]
    fn test_start_fires_and_stop_closes() {
        let engine = SequencerEngine::new(3).unwrap();
        let mut playback = PlaybackEngine::spawn(engine, TriggerGates::new());
        playback.start().unwrap();
        assert!(wait_for(&mut playback, |e| matches!(
            e,
            PlaybackEvent::StepFired { track: 0, step: 0, .. }
        )));

        playback.stop().unwrap();
        assert!(wait_for(&mut playback, |e| matches!(
            e,
            PlaybackEvent::Transport(TransportState::Stopped)
        )));
        thread::sleep(Duration::from_millis(10));
        let snap = playback.snapshot().unwrap();
        assert!(snap.tracks.iter().all(|t| !t.gate_open));
        playback.shutdown();
        assert!(!playback.is_running());
    }

    #[test]
    fn test_invalid_write_rejected_before_queueing() {
        let engine = SequencerEngine::new(3).unwrap();
        let mut playback = PlaybackEngine::spawn(engine, TriggerGates::new());
        assert!(matches!(
            playback.set_parameter(0, ParamId::Velocity, 0),
            Err(SequencerError::InvalidParameter { .. })
        ));
        assert!(playback.set_clock_parameter(ClockParam::Bpm, 500).is_err());

        playback.set_parameter(0, ParamId::Length, 2).unwrap();
        assert!(wait_for(&mut playback, |e| matches!(
            e,
            PlaybackEvent::Rejected(SequencerError::PatternGeneration { length: 2, pulses: 4 })
        )));
    }
}
