/// Base-pulse clock: internal BPM timer with swing, or external CV edges
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use crate::constants::{CLOCK_MAX_CATCHUP_PULSES, CLOCK_TIMEOUT_US_DEFAULT, CLOCK_TIMER_RESOLUTION};
use crate::error::{Result, SequencerError};
use crate::sequencer::params::{ClockSettings, ClockSourceKind};

/// Pulses per 8th note; swing alternates every 8th within a quarter
const PULSES_PER_EIGHTH: u64 = CLOCK_TIMER_RESOLUTION as u64 / 2;

/// Cloneable handle for recording CV gate edges from another context
#[derive(Debug, Clone, Default)]
pub struct ExternalClockInput {
    edges: Arc<AtomicU32>,
}

impl ExternalClockInput {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one gate edge
    pub fn edge(&self) {
        self.edges.fetch_add(1, Ordering::Release);
    }

    fn take(&self) -> u32 {
        self.edges.swap(0, Ordering::Acquire)
    }
}

pub struct ClockSource {
    settings: ClockSettings,
    external: ExternalClockInput,
    timeout_us: u64,
    // Internal timer, in hundredths of a microsecond
    next_due_cus: Option<u64>,
    pulse_index: u64,
    // External clock
    last_edge_us: Option<u64>,
    timed_out: bool,
}

impl ClockSource {
    pub fn new(settings: ClockSettings) -> Result<Self> {
        settings.validate()?;
        Ok(Self {
            settings,
            external: ExternalClockInput::new(),
            timeout_us: CLOCK_TIMEOUT_US_DEFAULT,
            next_due_cus: None,
            pulse_index: 0,
            last_edge_us: None,
            timed_out: false,
        })
    }

    pub fn with_timeout_us(mut self, timeout_us: u64) -> Self {
        self.timeout_us = timeout_us;
        self
    }

    pub fn settings(&self) -> ClockSettings {
        self.settings
    }

    /// Takes effect from the next pulse; out-of-range settings leave the clock unchanged
    pub fn apply_settings(&mut self, settings: ClockSettings) -> Result<()> {
        settings.validate()?;
        if settings.source != self.settings.source {
            self.next_due_cus = None;
            self.last_edge_us = None;
            self.timed_out = false;
        }
        self.settings = settings;
        Ok(())
    }

    pub fn external_input(&self) -> ExternalClockInput {
        self.external.clone()
    }

    pub fn is_timed_out(&self) -> bool {
        self.timed_out
    }

    /// Align so the next `tick` at or after `now_us` emits pulse `pulse_index`.
    /// Swing phase follows that index, so resuming mid-bar keeps the 8th grid.
    pub fn reset(&mut self, now_us: u64, pulse_index: u64) {
        self.next_due_cus = Some(now_us * 100);
        self.pulse_index = pulse_index;
        self.last_edge_us = Some(now_us);
        self.timed_out = false;
        self.external.take();
    }

    /// Nominal pulse interval for the current BPM, in microseconds
    pub fn pulse_interval_us(&self) -> u64 {
        60_000_000 / (self.settings.bpm as u64 * CLOCK_TIMER_RESOLUTION as u64)
    }

    /// Duration of pulse `index`, in hundredths of a microsecond.
    /// The first 8th of each quarter is lengthened by swing%, the second shortened.
    fn pulse_interval_cus(&self, index: u64) -> u64 {
        let swing = self.settings.swing as u64;
        let percent = if (index / PULSES_PER_EIGHTH) % 2 == 0 {
            100 + swing
        } else {
            100 - swing
        };
        60_000_000 * percent / (self.settings.bpm as u64 * CLOCK_TIMER_RESOLUTION as u64)
    }

    /// Base pulses elapsed since the previous call.
    ///
    /// Never blocks or allocates. With an external source, silence longer than the
    /// timeout yields `ClockTimeout` and no pulses until edges resume.
    pub fn tick(&mut self, now_us: u64) -> Result<u32> {
        match self.settings.source {
            ClockSourceKind::Internal => Ok(self.tick_internal(now_us)),
            ClockSourceKind::External => self.tick_external(now_us),
        }
    }

    fn tick_internal(&mut self, now_us: u64) -> u32 {
        let now_cus = now_us * 100;
        let mut next_due = *self.next_due_cus.get_or_insert(now_cus);
        let mut pulses = 0;
        while now_cus >= next_due {
            pulses += 1;
            next_due += self.pulse_interval_cus(self.pulse_index);
            self.pulse_index += 1;
            if pulses >= CLOCK_MAX_CATCHUP_PULSES {
                next_due = now_cus + self.pulse_interval_cus(self.pulse_index);
                break;
            }
        }
        self.next_due_cus = Some(next_due);
        pulses
    }

    fn tick_external(&mut self, now_us: u64) -> Result<u32> {
        let edges = self.external.take();
        if edges > 0 {
            // keep the swing phase in step for a later switch to internal
            self.pulse_index += edges as u64;
            self.last_edge_us = Some(now_us);
            self.timed_out = false;
            return Ok(edges);
        }
        let last = *self.last_edge_us.get_or_insert(now_us);
        let silent_us = now_us.saturating_sub(last);
        if silent_us > self.timeout_us {
            self.timed_out = true;
            return Err(SequencerError::ClockTimeout { silent_us });
        }
        Ok(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn internal(bpm: u16, swing: u8) -> ClockSource {
        ClockSource::new(ClockSettings {
            bpm,
            swing,
            source: ClockSourceKind::Internal,
        })
        .unwrap()
    }

    #[test]
    fn test_pulse_interval() {
        assert_eq!(internal(120, 0).pulse_interval_us(), 20_833);
        assert_eq!(internal(60, 0).pulse_interval_us(), 41_666);
    }

    #[test]
    fn test_internal_quarter_note() {
        let mut clock = internal(120, 0);
        clock.reset(0, 0);
        assert_eq!(clock.tick(0).unwrap(), 1);
        let mut total = 1;
        for now in (1..500_000u64).step_by(100) {
            total += clock.tick(now).unwrap();
        }
        // pulse 24 falls exactly on 500ms
        assert_eq!(total, 24);
        assert_eq!(clock.tick(500_000).unwrap(), 1);
    }

    #[test]
    fn test_swing_preserves_quarter_length() {
        let mut clock = internal(120, 25);
        clock.reset(0, 0);
        let mut first_eighth = 0;
        let mut total = 0;
        for now in (0..500_000u64).step_by(50) {
            let pulses = clock.tick(now).unwrap();
            total += pulses;
            if now < 250_000 {
                first_eighth += pulses;
            }
        }
        assert_eq!(total, 24);
        // lengthened first 8th: fewer than 12 pulses fit in the first 250ms
        assert!(first_eighth < 12, "got {first_eighth}");
    }

    #[test]
    fn test_catchup_is_capped() {
        let mut clock = internal(240, 0);
        clock.reset(0, 0);
        assert_eq!(clock.tick(60_000_000).unwrap(), CLOCK_MAX_CATCHUP_PULSES);
        assert_eq!(clock.tick(60_000_001).unwrap(), 0);
    }

    #[test]
    fn test_external_edges_and_timeout() {
        let mut clock = ClockSource::new(ClockSettings {
            source: ClockSourceKind::External,
            ..Default::default()
        })
        .unwrap()
        .with_timeout_us(1_000);
        let input = clock.external_input();
        clock.reset(0, 0);

        input.edge();
        input.edge();
        assert_eq!(clock.tick(10).unwrap(), 2);
        assert_eq!(clock.tick(500).unwrap(), 0);
        assert!(!clock.is_timed_out());

        assert!(matches!(
            clock.tick(2_000),
            Err(SequencerError::ClockTimeout { silent_us: 1_990 })
        ));
        assert!(clock.is_timed_out());

        input.edge();
        assert_eq!(clock.tick(2_100).unwrap(), 1);
        assert!(!clock.is_timed_out());
    }

    #[test]
    fn test_external_ignores_bpm() {
        let mut clock = ClockSource::new(ClockSettings {
            bpm: 240,
            source: ClockSourceKind::External,
            ..Default::default()
        })
        .unwrap();
        clock.reset(0, 0);
        assert_eq!(clock.tick(1_000_000).unwrap(), 0);
    }

    #[test]
    fn test_reset_keeps_swing_phase() {
        // pulse 14 sits in the short second 8th: 10.4ms at 120 BPM, swing 50
        let mut clock = internal(120, 50);
        clock.reset(1_000_000, 14);
        assert_eq!(clock.tick(1_000_000).unwrap(), 1);
        assert_eq!(clock.tick(1_010_000).unwrap(), 0);
        assert_eq!(clock.tick(1_011_000).unwrap(), 1);
        // pulse 24 starts the next long 8th: 31.25ms
        let mut clock = internal(120, 50);
        clock.reset(0, 24);
        assert_eq!(clock.tick(0).unwrap(), 1);
        assert_eq!(clock.tick(31_000).unwrap(), 0);
        assert_eq!(clock.tick(31_250).unwrap(), 1);
    }

    #[test]
    fn test_external_edges_advance_swing_phase() {
        let mut clock = ClockSource::new(ClockSettings {
            swing: 50,
            source: ClockSourceKind::External,
            ..Default::default()
        })
        .unwrap();
        let input = clock.external_input();
        clock.reset(0, 0);
        for _ in 0..14 {
            input.edge();
        }
        assert_eq!(clock.tick(100).unwrap(), 14);

        let mut settings = clock.settings();
        settings.source = ClockSourceKind::Internal;
        clock.apply_settings(settings).unwrap();
        assert_eq!(clock.tick(1_000_000).unwrap(), 1);
        assert_eq!(clock.tick(1_011_000).unwrap(), 1);
    }

    #[test]
    fn test_out_of_range_settings_refused() {
        let zero_bpm = ClockSettings {
            bpm: 0,
            ..Default::default()
        };
        assert!(matches!(
            ClockSource::new(zero_bpm),
            Err(SequencerError::InvalidParameter { param: "Bpm", .. })
        ));

        let mut clock = internal(120, 0);
        let wide_swing = ClockSettings {
            swing: 120,
            ..Default::default()
        };
        assert!(clock.apply_settings(wide_swing).is_err());
        assert_eq!(clock.settings().swing, 0);
        clock.reset(0, 0);
        assert_eq!(clock.tick(0).unwrap(), 1);
    }
}
