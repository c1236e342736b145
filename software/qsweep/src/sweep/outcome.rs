//! Per-point outcomes and the sweep summary

use core::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use qsweep_shared::DaqErr;

use crate::capture::CaptureRecord;
use crate::error::SweepErr;
use crate::math::{FitErr, SineFit};

/// Why a sweep point has no capture
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub enum PointFailure {
    /// A driver call failed partway through the point
    Driver { during: String, err: DaqErr },

    /// The scans did not both go idle in time
    Timeout {
        waited: Duration,
        output: String,
        input: String,
    },

    /// The sweep was cancelled while this point was in progress
    Cancelled,
}

impl fmt::Display for PointFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Driver { during, err } => write!(f, "Driver failure while {during}: {err}"),
            Self::Timeout {
                waited,
                output,
                input,
            } => write!(
                f,
                "Scans not idle after {waited:?} (output {output}, input {input})"
            ),
            Self::Cancelled => write!(f, "Cancelled"),
        }
    }
}

impl std::error::Error for PointFailure {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Driver { err, .. } => Some(err),
            _ => None,
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub enum PointOutcome {
    /// Input was captured; the fit may still have failed
    Captured {
        capture: CaptureRecord,
        fit: Result<SineFit, FitErr>,

        /// The fit re-expressed in volts, when the input range allows it
        fit_volts: Option<SineFit>,
    },
    Failed(PointFailure),
}

/// One frequency of a sweep
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct SweepPoint {
    pub frequency_hz: f64,

    /// Output scan rate requested for this frequency
    pub rate_hz: f64,

    /// Output scan rate the board settled on, if the output scan started
    pub realized_rate_hz: Option<f64>,
    pub outcome: PointOutcome,
}

impl SweepPoint {
    pub fn capture(&self) -> Option<&CaptureRecord> {
        match &self.outcome {
            PointOutcome::Captured { capture, .. } => Some(capture),
            PointOutcome::Failed(_) => None,
        }
    }

    pub fn fit(&self) -> Option<&SineFit> {
        match &self.outcome {
            PointOutcome::Captured { fit: Ok(fit), .. } => Some(fit),
            _ => None,
        }
    }

    pub fn failure(&self) -> Option<&PointFailure> {
        match &self.outcome {
            PointOutcome::Failed(failure) => Some(failure),
            PointOutcome::Captured { .. } => None,
        }
    }

    /// Fitted amplitude in raw codes
    pub fn amplitude(&self) -> Option<f64> {
        self.fit().map(|fit| fit.amplitude)
    }

    pub fn amplitude_volts(&self) -> Option<f64> {
        match &self.outcome {
            PointOutcome::Captured {
                fit_volts: Some(fit),
                ..
            } => Some(fit.amplitude),
            _ => None,
        }
    }

    /// Stimulus frequency actually played, given the realized output rate
    pub fn realized_frequency_hz(&self) -> Option<f64> {
        self.realized_rate_hz
            .map(|rate| rate * self.frequency_hz / self.rate_hz)
    }

    /// Short status word for tables
    pub fn status(&self) -> &'static str {
        match &self.outcome {
            PointOutcome::Captured { fit: Ok(_), .. } => "ok",
            PointOutcome::Captured { fit: Err(_), .. } => "fit_failed",
            PointOutcome::Failed(PointFailure::Driver { .. }) => "driver_error",
            PointOutcome::Failed(PointFailure::Timeout { .. }) => "timeout",
            PointOutcome::Failed(PointFailure::Cancelled) => "cancelled",
        }
    }
}

/// Everything a finished sweep produced
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct SweepReport {
    pub frequencies: Vec<f64>,
    pub points: Vec<SweepPoint>,

    /// Wall-clock time spent on the sweep points
    pub elapsed: Duration,
    pub cancelled: bool,
}

impl SweepReport {
    pub fn captured_count(&self) -> usize {
        self.points.iter().filter(|p| p.capture().is_some()).count()
    }

    pub fn fitted_count(&self) -> usize {
        self.points.iter().filter(|p| p.fit().is_some()).count()
    }

    /// Fitted amplitude per frequency, absent where the point failed or was never reached
    pub fn amplitudes(&self) -> Vec<Option<f64>> {
        self.frequencies
            .iter()
            .enumerate()
            .map(|(i, &f)| {
                self.points
                    .get(i)
                    .filter(|p| p.frequency_hz == f)
                    .and_then(SweepPoint::amplitude)
            })
            .collect()
    }

    /// Error unless every frequency has exactly one capture and one fit
    pub fn check_complete(&self) -> Result<(), SweepErr> {
        let expected = self.frequencies.len();
        let captured = self.captured_count();
        let fitted = self.fitted_count();
        let missing_hz: Vec<f64> = self
            .frequencies
            .iter()
            .zip(self.amplitudes())
            .filter(|(_, a)| a.is_none())
            .map(|(&f, _)| f)
            .collect();

        if self.points.len() == expected
            && captured == expected
            && fitted == expected
            && missing_hz.is_empty()
        {
            Ok(())
        } else {
            Err(SweepErr::IncompleteSweep {
                expected,
                captured,
                fitted,
                missing_hz,
            })
        }
    }
}
