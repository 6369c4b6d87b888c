/// Startup configuration loaded from TOML
use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::constants::{BPM_DEFAULT, CLOCK_TIMEOUT_US_DEFAULT};
use crate::error::{Result, SequencerError};
use crate::sequencer::params::{ClockSourceKind, OutputMode};

pub const DEFAULT_CONFIG_PATH: &str = "euclid-sqnc.toml";

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct SequencerConfig {
    /// Seed for per-track randomization
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub seed: Option<u64>,
    #[serde(default)]
    pub clock: ClockConfig,
    #[serde(default)]
    pub output: OutputConfig,
    #[serde(default)]
    pub tracks: Vec<TrackConfig>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClockConfig {
    pub source: ClockSourceKind,
    pub bpm: u16,
    pub swing: u8,
    pub timeout_ms: u64,
}

impl Default for ClockConfig {
    fn default() -> Self {
        Self {
            source: ClockSourceKind::Internal,
            bpm: BPM_DEFAULT,
            swing: 0,
            timeout_ms: CLOCK_TIMEOUT_US_DEFAULT / 1_000,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    pub mode: OutputMode,
    /// Substring of the MIDI port name; first port when unset
    #[serde(skip_serializing_if = "Option::is_none")]
    pub midi_port: Option<String>,
}

/// Overrides for one track, keyed by parameter code (`Slen = 12`)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrackConfig {
    pub track: usize,
    #[serde(flatten)]
    pub params: BTreeMap<String, i32>,
}

impl SequencerConfig {
    /// Defaults when the file does not exist
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            info!("No config at {}, using defaults", path.display());
            return Ok(Self::default());
        }
        let text = std::fs::read_to_string(path)?;
        let config = Self::from_toml_str(&text)?;
        info!("Loaded config from {}", path.display());
        Ok(config)
    }

    pub fn from_toml_str(text: &str) -> Result<Self> {
        toml::from_str(text).map_err(|e| SequencerError::Config(e.to_string()))
    }

    pub fn to_toml_string(&self) -> Result<String> {
        toml::to_string_pretty(self).map_err(|e| SequencerError::Config(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sequencer::engine::SequencerEngine;
    use crate::sequencer::params::Direction;

    const SAMPLE: &str = r#"
seed = 42

[clock]
source = "external"
bpm = 96
swing = 20

[output]
mode = "trigger"

[[tracks]]
track = 1
Slen = 12
Spul = 5
Sdir = 2
"#;

    #[test]
    fn test_parse_sample() {
        let config = SequencerConfig::from_toml_str(SAMPLE).unwrap();
        assert_eq!(config.seed, Some(42));
        assert_eq!(config.clock.source, ClockSourceKind::External);
        assert_eq!(config.clock.bpm, 96);
        assert_eq!(config.clock.timeout_ms, 2_000);
        assert_eq!(config.output.mode, OutputMode::Trigger);
        assert_eq!(config.tracks[0].params["Slen"], 12);
    }

    #[test]
    fn test_empty_config_is_default() {
        assert_eq!(SequencerConfig::from_toml_str("").unwrap(), SequencerConfig::default());
    }

    #[test]
    fn test_round_trip() {
        let config = SequencerConfig::from_toml_str(SAMPLE).unwrap();
        let text = config.to_toml_string().unwrap();
        assert_eq!(SequencerConfig::from_toml_str(&text).unwrap(), config);
    }

    #[test]
    fn test_engine_from_config() {
        let config = SequencerConfig::from_toml_str(SAMPLE).unwrap();
        let engine = SequencerEngine::from_config(&config).unwrap();
        let snare = engine.track(1).unwrap();
        assert_eq!(snare.params().length, 12);
        assert_eq!(snare.params().direction, Direction::Alternating);
        assert_eq!(snare.pattern().active_count(), 5);
        assert_eq!(snare.params().output, OutputMode::Trigger);
        assert_eq!(engine.clock_settings().bpm, 96);
    }

    #[test]
    fn test_invalid_values_rejected() {
        let bad_bpm = "[clock]\nbpm = 300\n";
        let config = SequencerConfig::from_toml_str(bad_bpm).unwrap();
        assert!(matches!(
            SequencerEngine::from_config(&config),
            Err(SequencerError::InvalidParameter { param: "Bpm", .. })
        ));

        let bad_code = "[[tracks]]\ntrack = 0\nSfoo = 1\n";
        let config = SequencerConfig::from_toml_str(bad_code).unwrap();
        assert!(matches!(
            SequencerEngine::from_config(&config),
            Err(SequencerError::UnknownParameter(_))
        ));

        let bad_shape = "[[tracks]]\ntrack = 0\nSlen = 4\nSpul = 6\n";
        let config = SequencerConfig::from_toml_str(bad_shape).unwrap();
        assert!(matches!(
            SequencerEngine::from_config(&config),
            Err(SequencerError::PatternGeneration { length: 4, pulses: 6 })
        ));

        let huge_timeout = format!("[clock]\ntimeout_ms = {}\n", i64::MAX);
        let config = SequencerConfig::from_toml_str(&huge_timeout).unwrap();
        assert!(SequencerEngine::from_config(&config).is_ok());

        let bad_track = "[[tracks]]\ntrack = 9\nSvel = 1\n";
        let config = SequencerConfig::from_toml_str(bad_track).unwrap();
        assert!(SequencerEngine::from_config(&config).is_err());
    }
}
