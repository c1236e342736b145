//! Errors that end a sweep, or that a finished sweep reports about itself

use core::fmt;

use qsweep_shared::DaqErr;

/// Sweep-level failure.
///
/// Failures of a single sweep point do not show up here; they are recorded
/// on the point and the sweep moves on.
#[derive(Debug, Clone, PartialEq)]
pub enum SweepErr {
    /// Frequency bounds or step cannot produce a finite, ordered sweep
    InvalidRange { msg: String },

    /// A configuration value is out of bounds
    InvalidConfig { msg: String },

    /// The board lacks a subsystem the sweep needs
    MissingCapability { msg: String },

    /// A driver call failed before or after the per-point loop,
    /// where there is no point to skip
    Driver { during: String, err: DaqErr },

    /// The number of captures or fits does not match the number of frequencies
    IncompleteSweep {
        expected: usize,
        captured: usize,
        fitted: usize,
        missing_hz: Vec<f64>,
    },

    /// A reporter failed to initialize, record, or finish
    Report { msg: String },
}

impl SweepErr {
    pub(crate) fn driver(during: &str, err: DaqErr) -> Self {
        Self::Driver {
            during: during.to_owned(),
            err,
        }
    }
}

impl fmt::Display for SweepErr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidRange { msg } => write!(f, "Invalid frequency range: {msg}"),
            Self::InvalidConfig { msg } => write!(f, "Invalid sweep configuration: {msg}"),
            Self::MissingCapability { msg } => write!(f, "Device capability missing: {msg}"),
            Self::Driver { during, err } => write!(f, "Driver failure while {during}: {err}"),
            Self::IncompleteSweep {
                expected,
                captured,
                fitted,
                missing_hz,
            } => write!(
                f,
                "Incomplete sweep: {expected} frequencies, {captured} captures, {fitted} fits; \
                 no amplitude at {missing_hz:?} Hz"
            ),
            Self::Report { msg } => write!(f, "Reporter failure: {msg}"),
        }
    }
}

impl std::error::Error for SweepErr {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Driver { err, .. } => Some(err),
            _ => None,
        }
    }
}
