//! Raw input captures

use serde::{Deserialize, Serialize};

use qsweep_shared::{AnalogRange, DaqErr, RawCode};

/// Samples recorded at one sweep frequency, in raw codes.
///
/// The first sample of the input buffer is taken before the scan settles
/// and is not part of the record.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct CaptureRecord {
    pub frequency_hz: f64,
    pub samples: Vec<RawCode>,
}

impl CaptureRecord {
    /// Build a record from a full input buffer, discarding its first sample.
    pub fn from_input_buffer(frequency_hz: f64, buffer: &[RawCode]) -> Self {
        Self {
            frequency_hz,
            samples: buffer.get(1..).unwrap_or_default().to_vec(),
        }
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn as_f64(&self) -> Vec<f64> {
        self.samples.iter().map(|&s| f64::from(s)).collect()
    }

    /// Samples in volts for the input range they were taken with
    pub fn to_volts(&self, range: AnalogRange, resolution_bits: u8) -> Result<Vec<f64>, DaqErr> {
        self.samples
            .iter()
            .map(|&s| range.to_eng(s, resolution_bits))
            .collect()
    }
}
