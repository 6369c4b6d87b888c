use std::io::{self, BufRead};
use std::sync::mpsc;
use std::thread;
use std::time::Duration;

use euclid_sqnc::config::DEFAULT_CONFIG_PATH;
use euclid_sqnc::constants::VERSION;
use euclid_sqnc::sequencer::ClockSourceKind;
use euclid_sqnc::{
    midi_note_name, AudioOutput, ClockParam, EditMode, EngineSnapshot, HardwareOutputs, Instrument,
    MidiOutputDevice, ParamId, PlaybackEngine, PlaybackEvent, Result, SequencerConfig,
    SequencerEngine, SequencerError,
};
use tracing::{error, info, trace, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// A line typed by the operator
#[derive(Debug, PartialEq, Eq)]
enum Input {
    Start,
    Stop,
    Pause,
    Resume,
    Set { track: usize, param: ParamId, value: i32 },
    Clock { param: ClockParam, value: i32 },
    Mode(EditMode),
    Edge,
    Status,
    Ports,
    Quit,
}

fn parse_int(word: Option<&str>) -> Result<i32> {
    let word = word.ok_or_else(|| SequencerError::Config("missing value".into()))?;
    word.parse()
        .map_err(|_| SequencerError::Config(format!("not a number: {}", word)))
}

fn parse_input(line: &str) -> Result<Input> {
    let mut words = line.split_whitespace();
    let input = match words.next().unwrap_or_default() {
        "start" => Input::Start,
        "stop" => Input::Stop,
        "pause" => Input::Pause,
        "resume" => Input::Resume,
        "set" => {
            let track = parse_int(words.next())? as usize;
            let param = words
                .next()
                .ok_or_else(|| SequencerError::Config("missing parameter".into()))?
                .parse()?;
            let value = parse_int(words.next())?;
            Input::Set { track, param, value }
        }
        "bpm" => Input::Clock {
            param: ClockParam::Bpm,
            value: parse_int(words.next())?,
        },
        "swing" => Input::Clock {
            param: ClockParam::Swing,
            value: parse_int(words.next())?,
        },
        "clock" => {
            let source = words
                .next()
                .and_then(|w| w.chars().next())
                .and_then(|c| ClockSourceKind::from_indicator(c.to_ascii_uppercase()))
                .ok_or_else(|| SequencerError::Config("clock expects C or I".into()))?;
            let value = match source {
                ClockSourceKind::External => 0,
                ClockSourceKind::Internal => 1,
            };
            Input::Clock {
                param: ClockParam::Source,
                value,
            }
        }
        "menu" => Input::Mode(EditMode::Menu),
        "grid" => Input::Mode(EditMode::Grid),
        "edge" => Input::Edge,
        "status" => Input::Status,
        "ports" => Input::Ports,
        "quit" | "exit" => Input::Quit,
        other => return Err(SequencerError::Config(format!("unknown command: {}", other))),
    };
    Ok(input)
}

fn log_snapshot(snapshot: &EngineSnapshot) {
    info!(
        "{:?} tick={} bpm={} swing={} clock={}{} mode={}",
        snapshot.transport,
        snapshot.tick,
        snapshot.clock.bpm,
        snapshot.clock.swing,
        snapshot.clock.source.indicator(),
        if snapshot.clock_timeout { " (timeout)" } else { "" },
        snapshot.edit_mode.indicator(),
    );
    for (instrument, track) in Instrument::ALL.iter().zip(&snapshot.tracks) {
        let steps: String = track
            .pattern
            .steps()
            .iter()
            .enumerate()
            .map(|(i, &on)| match (i == track.cursor as usize, on) {
                (true, _) => '>',
                (false, true) => 'x',
                (false, false) => '.',
            })
            .collect();
        info!("{} {:<10} {}", track.indicator, instrument.name(), steps);
    }
}

fn log_event(event: PlaybackEvent) {
    match event {
        PlaybackEvent::StepFired {
            track,
            step,
            note,
            velocity,
        } => trace!(
            "track {} step {} {} vel {}",
            track,
            step,
            midi_note_name(note),
            velocity
        ),
        PlaybackEvent::GateClosed { track } => trace!("track {} gate closed", track),
        PlaybackEvent::Transport(state) => info!("Transport {:?}", state),
        PlaybackEvent::Rejected(e) => warn!("Rejected: {}", e),
        PlaybackEvent::ClockTimeout => warn!("External clock lost, holding position"),
        PlaybackEvent::ClockResumed => info!("External clock back"),
        PlaybackEvent::OutputError(e) => warn!("Output error: {}", e),
    }
}

fn connect_midi(config: &SequencerConfig) -> MidiOutputDevice {
    let mut midi = MidiOutputDevice::new();
    let connected = match &config.output.midi_port {
        Some(pattern) => midi.connect_matching(pattern),
        None if !MidiOutputDevice::available_ports().is_empty() => midi.connect(0),
        None => Err(SequencerError::Midi("no MIDI ports available".into())),
    };
    if let Err(e) = connected {
        warn!("MIDI output disabled: {}", e);
    }
    midi
}

fn run() -> Result<()> {
    let path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| DEFAULT_CONFIG_PATH.to_string());
    let config = SequencerConfig::load(&path)?;
    let engine = SequencerEngine::from_config(&config)?;

    let audio = AudioOutput::default();
    let outputs = HardwareOutputs {
        midi: connect_midi(&config),
        triggers: audio.gates(),
    };
    let mut playback = PlaybackEngine::spawn(engine, outputs);
    let edges = playback.external_clock();

    let (line_tx, line_rx) = mpsc::channel::<String>();
    thread::spawn(move || {
        for line in io::stdin().lock().lines().map_while(|l| l.ok()) {
            if line_tx.send(line).is_err() {
                break;
            }
        }
    });

    info!("euclid-sqnc {} ready", VERSION);
    loop {
        for event in playback.poll_events() {
            log_event(event);
        }

        let line = match line_rx.recv_timeout(Duration::from_millis(20)) {
            Ok(line) => line,
            Err(mpsc::RecvTimeoutError::Timeout) => continue,
            Err(mpsc::RecvTimeoutError::Disconnected) => break,
        };
        if line.trim().is_empty() {
            continue;
        }

        let result = match parse_input(&line) {
            Ok(Input::Start) => playback.start(),
            Ok(Input::Stop) => playback.stop(),
            Ok(Input::Pause) => playback.pause(),
            Ok(Input::Resume) => playback.resume(),
            Ok(Input::Set { track, param, value }) => playback.set_parameter(track, param, value),
            Ok(Input::Clock { param, value }) => playback.set_clock_parameter(param, value),
            Ok(Input::Mode(mode)) => playback.set_edit_mode(mode),
            Ok(Input::Edge) => {
                edges.edge();
                Ok(())
            }
            Ok(Input::Status) => {
                if let Some(snapshot) = playback.snapshot() {
                    log_snapshot(&snapshot);
                }
                Ok(())
            }
            Ok(Input::Ports) => {
                for (i, name) in MidiOutputDevice::available_ports().iter().enumerate() {
                    info!("{}: {}", i, name);
                }
                Ok(())
            }
            Ok(Input::Quit) => break,
            Err(e) => Err(e),
        };
        if let Err(e) = result {
            warn!("{}", e);
        }
    }

    playback.shutdown();
    for event in playback.poll_events() {
        log_event(event);
    }
    info!("Bye");
    Ok(())
}

fn main() {
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("euclid_sqnc=info")),
        )
        .init();

    if let Err(e) = run() {
        error!("{}", e);
        std::process::exit(1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_commands() {
        assert_eq!(parse_input("start").unwrap(), Input::Start);
        assert_eq!(
            parse_input("set 2 Spul 5").unwrap(),
            Input::Set {
                track: 2,
                param: ParamId::Pulses,
                value: 5
            }
        );
        assert_eq!(
            parse_input("clock c").unwrap(),
            Input::Clock {
                param: ClockParam::Source,
                value: 0
            }
        );
        assert_eq!(
            parse_input("bpm 90").unwrap(),
            Input::Clock {
                param: ClockParam::Bpm,
                value: 90
            }
        );
    }

    #[test]
    fn test_parse_errors() {
        assert!(parse_input("set 2 Sxyz 5").is_err());
        assert!(parse_input("bpm fast").is_err());
        assert!(parse_input("dance").is_err());
    }
}
