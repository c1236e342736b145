//! End-of-sweep summary in the run log.

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use qsweep_shared::RawCode;

use crate::sweep::{SweepCtx, SweepPoint, SweepReport};

use super::Reporter;

/// Writes the frequency list, the raw captures, and the fitted amplitudes
/// to the log once the sweep finishes.
///
/// Captures are only collected when `include_raw` is set, since a long sweep
/// holds one capture per frequency.
#[derive(Serialize, Deserialize, Debug)]
pub struct TextLogReporter {
    include_raw: bool,

    #[serde(skip)]
    captures: Vec<Option<Vec<RawCode>>>,
}

impl Default for TextLogReporter {
    fn default() -> Self {
        Self {
            include_raw: true,
            captures: Vec::new(),
        }
    }
}

impl TextLogReporter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Summarize amplitudes only, without the raw captures
    pub fn without_raw() -> Self {
        Self {
            include_raw: false,
            ..Self::default()
        }
    }
}

#[typetag::serde]
impl Reporter for TextLogReporter {
    fn init(&mut self, _ctx: &SweepCtx, frequencies: &[f64]) -> Result<(), String> {
        self.captures.clear();
        if self.include_raw {
            self.captures.reserve(frequencies.len());
        }
        Ok(())
    }

    fn consume(&mut self, point: &SweepPoint) -> Result<(), String> {
        if self.include_raw {
            self.captures.push(point.capture().map(|c| c.samples.clone()));
        }
        if let Some(failure) = point.failure() {
            warn!("No capture at {} Hz: {failure}", point.frequency_hz);
        }
        Ok(())
    }

    fn finish(&mut self, report: &SweepReport) -> Result<(), String> {
        info!("Frequencies: {:?}", report.frequencies);
        if self.include_raw {
            info!("Resonance data: {:?}", self.captures);
        }
        info!("Amplitudes: {:?}", report.amplitudes());
        info!("Time taken: {:.2} sec", report.elapsed.as_secs_f64());
        Ok(())
    }
}
