//! Information about the current sweep
//! that may be used by the controller and its reporters.

use std::default::Default;
use std::path::PathBuf;
use std::time::{Duration, SystemTime};

use chrono::{DateTime, Utc};

use serde::{Deserialize, Serialize};

use qsweep_shared::{RawCode, TriggerType};

use crate::error::SweepErr;
use crate::math::FitConfig;

/// Shortest allowed interval between scan status queries
pub const MIN_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// How the output and input scans are started together
#[derive(Serialize, Deserialize, Default, Clone, Copy, Debug, PartialEq, Eq)]
pub enum SyncMode {
    /// Arm both scans on the external trigger, then raise a digital output bit
    /// wired to the trigger input
    #[default]
    DigitalTrigger,

    /// Arm both scans on the external trigger, then raise a second analog output
    /// wired to the trigger input
    AnalogTrigger,

    /// Start the input scan, then the output scan, with no trigger.
    /// The two scans are skewed by however long the second start call takes.
    Untriggered,
}

/// External trigger condition and the line that fires it
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct TriggerConfig {
    pub trigger_type: TriggerType,
    pub low_threshold: RawCode,
    pub high_threshold: RawCode,

    /// Value written to the whole digital port before the trigger bit is driven low
    pub port_value: u16,
    pub bit: u8,

    /// Analog output channel that fires the trigger in [`SyncMode::AnalogTrigger`]
    pub analog_channel: u8,
    pub analog_low: RawCode,
    pub analog_high: RawCode,
}

impl Default for TriggerConfig {
    fn default() -> Self {
        Self {
            trigger_type: TriggerType::TrigHigh,
            low_threshold: 0,
            high_threshold: 36045,
            port_value: 0xFF,
            bit: 0,
            analog_channel: 1,
            analog_low: 0,
            analog_high: 49480,
        }
    }
}

/// Sweep context
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[non_exhaustive]
pub struct SweepCtx {
    /// A name for this sweep,
    /// which will be used as the name of the log, plot, and CSV files
    /// and must be compatible with that use.
    pub op_name: String,

    /// A directory to place outputs.
    pub op_dir: PathBuf,

    pub board_num: u32,

    /// Analog channel used for both the stimulus and the response
    pub channel: u8,

    /// Length of the output buffer in samples
    pub output_points: usize,

    /// Length of the input buffer in samples, including the sample dropped from each capture
    pub input_points: usize,

    /// Peak stimulus amplitude in volts
    pub stimulus_amplitude_volts: f64,

    /// Index into the board's supported analog output ranges
    pub ao_range_index: usize,

    /// Index into the board's supported analog input ranges
    pub ai_range_index: usize,

    pub sync: SyncMode,
    pub trigger: TriggerConfig,

    /// Interval between scan status queries, raised to [`MIN_POLL_INTERVAL`] if smaller
    pub poll_interval_ms: u64,

    /// Time allowed for both scans of one sweep point to finish,
    /// beyond the time the scans themselves take to clock out
    pub point_timeout_ms: u64,

    pub fit: FitConfig,
}

impl Default for SweepCtx {
    fn default() -> Self {
        // Use current time with seconds as op name and use working directory as op dir,
        // replacing characters in the name that would be invalid on Windows.
        let op_name = DateTime::<Utc>::from(SystemTime::now())
            .to_rfc3339_opts(chrono::SecondsFormat::Secs, true)
            .replace(":", "");
        Self {
            op_name,
            op_dir: std::fs::canonicalize("./").unwrap_or_default(),
            board_num: 0,
            channel: 0,
            output_points: 46,
            input_points: 46,
            stimulus_amplitude_volts: 10.0,
            ao_range_index: 0,
            ai_range_index: 0,
            sync: SyncMode::default(),
            trigger: TriggerConfig::default(),
            poll_interval_ms: 100,
            point_timeout_ms: 5_000,
            fit: FitConfig::default(),
        }
    }
}

impl SweepCtx {
    /// Check values that do not depend on the board
    pub fn validate(&self) -> Result<(), SweepErr> {
        let invalid = |msg: String| Err(SweepErr::InvalidConfig { msg });

        if self.op_name.is_empty() {
            return invalid("Op name must not be empty".to_owned());
        }
        if self.output_points == 0 {
            return invalid("Output buffer must hold at least one sample".to_owned());
        }
        // The fit needs at least as many samples as parameters after the first is dropped
        if self.input_points < 5 {
            return invalid(format!(
                "Input buffer of {} samples is too short to fit",
                self.input_points
            ));
        }
        if !self.stimulus_amplitude_volts.is_finite() || self.stimulus_amplitude_volts < 0.0 {
            return invalid(format!(
                "Stimulus amplitude must be finite and non-negative, got {}",
                self.stimulus_amplitude_volts
            ));
        }
        if self.point_timeout_ms == 0 {
            return invalid("Point timeout must be nonzero".to_owned());
        }
        if self.fit.max_evaluations == 0 {
            return invalid("Fit evaluation cap must be nonzero".to_owned());
        }
        if self.trigger.low_threshold > self.trigger.high_threshold {
            return invalid(format!(
                "Trigger low threshold {} above high threshold {}",
                self.trigger.low_threshold, self.trigger.high_threshold
            ));
        }
        if self.sync == SyncMode::AnalogTrigger && self.trigger.analog_channel == self.channel {
            return invalid(format!(
                "Analog trigger channel {} is also the stimulus channel",
                self.channel
            ));
        }
        Ok(())
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms).max(MIN_POLL_INTERVAL)
    }

    pub fn point_timeout(&self) -> Duration {
        Duration::from_millis(self.point_timeout_ms)
    }

    /// Deadline for one point whose scans run at `rate_hz`: the longer buffer's
    /// duration at that rate plus [`SweepCtx::point_timeout`]
    pub fn point_deadline(&self, rate_hz: f64) -> Duration {
        let samples = self.output_points.max(self.input_points) as f64;
        let scan = Duration::try_from_secs_f64(samples / rate_hz).unwrap_or(Duration::MAX);
        self.point_timeout().saturating_add(scan)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ser_roundtrip() {
        let ctx = SweepCtx {
            sync: SyncMode::AnalogTrigger,
            poll_interval_ms: 250,
            ..Default::default()
        };
        let s = serde_json::to_string_pretty(&ctx).unwrap();
        let back: SweepCtx = serde_json::from_str(&s).unwrap();
        assert_eq!(back, ctx);
    }

    #[test]
    fn default_is_valid_and_windows_safe() {
        let ctx = SweepCtx::default();
        ctx.validate().unwrap();
        assert!(!ctx.op_name.contains(':'));
    }

    #[test]
    fn poll_interval_has_floor() {
        let ctx = SweepCtx {
            poll_interval_ms: 1,
            ..Default::default()
        };
        assert_eq!(ctx.poll_interval(), MIN_POLL_INTERVAL);

        let ctx = SweepCtx {
            poll_interval_ms: 300,
            ..Default::default()
        };
        assert_eq!(ctx.poll_interval(), Duration::from_millis(300));
    }

    #[test]
    fn point_deadline_covers_slow_scans() {
        let ctx = SweepCtx::default();

        // 46 samples at 9 Hz take over 5 s on their own
        let slow = ctx.point_deadline(9.0);
        assert!(slow > Duration::from_secs_f64(46.0 / 9.0));
        assert!(slow >= ctx.point_timeout() + Duration::from_secs(5));

        // Fast scans add almost nothing to the timeout
        let fast = ctx.point_deadline(9e4);
        assert!(fast - ctx.point_timeout() < Duration::from_millis(1));

        assert_eq!(ctx.point_deadline(0.0), Duration::MAX);
    }

    #[test]
    fn rejects_bad_values() {
        let base = SweepCtx::default();
        let cases = [
            SweepCtx {
                input_points: 4,
                ..base.clone()
            },
            SweepCtx {
                stimulus_amplitude_volts: f64::NAN,
                ..base.clone()
            },
            SweepCtx {
                point_timeout_ms: 0,
                ..base.clone()
            },
            SweepCtx {
                sync: SyncMode::AnalogTrigger,
                channel: 1,
                ..base.clone()
            },
        ];
        for ctx in cases {
            assert!(matches!(
                ctx.validate(),
                Err(SweepErr::InvalidConfig { .. })
            ));
        }
    }
}
