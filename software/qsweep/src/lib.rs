//! Frequency-sweep resonance measurement over a DAQ board.
//!
//! A sine stimulus is played on an analog output while an analog input records the
//! response, both started together by an external trigger. Each capture is fit with
//! a sine model and the fitted amplitude is reported per frequency.

pub mod capture;
pub mod daq;
pub mod error;
pub mod logging;
pub mod math;
pub mod reporter;
pub mod stimulus;
pub mod sweep;

pub use capture::CaptureRecord;
pub use daq::{Daq, SimulatedDaq};
pub use error::SweepErr;
pub use reporter::Reporter;
pub use sweep::{SweepController, SweepCtx, SweepPlan, SweepReport};

pub use qsweep_shared;

/// Distinct stimulus samples per output cycle.
/// The output scan rate is this many times the stimulus frequency.
pub const POINTS_PER_CYCLE: usize = 9;
