//! Quantized sine stimulus for the analog output scan.
//!
//! One cycle of `sin` is sampled at `N` points from phase 0 to 2π inclusive,
//! scaled to the stimulus amplitude around the middle of the output range, and
//! converted to that range's raw codes. The whole swing must fit inside the range;
//! a stimulus that would clip is rejected rather than saturated.
//! Because the last sample repeats the first, only the first `N - 1` samples
//! are ever replicated into the output buffer; tiling all `N` would put two
//! zero-phase samples back to back at every seam.

use qsweep_shared::{AnalogRange, RawCode};

use crate::POINTS_PER_CYCLE;
use crate::error::SweepErr;
use crate::math::linspace;

/// One sampled, quantized stimulus cycle
#[derive(Debug, Clone, PartialEq)]
pub struct Waveform {
    volts: Vec<f64>,
    codes: Vec<RawCode>,
}

impl Waveform {
    /// Sample one sine cycle at `n_points` points, endpoints included,
    /// centered on the midpoint of `range`.
    pub fn sine(
        n_points: usize,
        amplitude_volts: f64,
        range: AnalogRange,
        resolution_bits: u8,
    ) -> Result<Self, SweepErr> {
        if n_points < 2 {
            return Err(SweepErr::InvalidConfig {
                msg: format!("Stimulus needs at least 2 points per cycle, got {n_points}"),
            });
        }
        if !amplitude_volts.is_finite() || amplitude_volts < 0.0 {
            return Err(SweepErr::InvalidConfig {
                msg: format!("Stimulus amplitude must be finite and non-negative, got {amplitude_volts}"),
            });
        }

        let (low, high) = range.span_volts().ok_or_else(|| SweepErr::InvalidConfig {
            msg: format!("Stimulus cannot be expressed in unrecognized range {range:?}"),
        })?;
        let center = 0.5 * (low + high);
        let half_span = 0.5 * (high - low);
        if amplitude_volts > half_span {
            return Err(SweepErr::InvalidConfig {
                msg: format!(
                    "Stimulus amplitude {amplitude_volts} V exceeds the {half_span} V swing of {range:?}"
                ),
            });
        }

        let volts: Vec<f64> = linspace(0.0, 2.0 * core::f64::consts::PI, n_points)
            .into_iter()
            .map(|x| x.sin().mul_add(amplitude_volts, center))
            .collect();

        let codes = volts
            .iter()
            .map(|&v| range.from_eng(v, resolution_bits))
            .collect::<Result<Vec<RawCode>, _>>()
            .map_err(|e| SweepErr::InvalidConfig {
                msg: format!("Stimulus cannot be expressed in {range:?}: {e}"),
            })?;

        Ok(Self { volts, codes })
    }

    /// The stimulus used for sweeps, with `POINTS_PER_CYCLE` distinct samples per cycle.
    pub fn for_sweep(
        amplitude_volts: f64,
        range: AnalogRange,
        resolution_bits: u8,
    ) -> Result<Self, SweepErr> {
        Self::sine(POINTS_PER_CYCLE + 1, amplitude_volts, range, resolution_bits)
    }

    pub fn len(&self) -> usize {
        self.codes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.codes.is_empty()
    }

    /// All `N` raw codes, including the closing sample at 2π
    pub fn codes(&self) -> &[RawCode] {
        &self.codes
    }

    /// Unquantized sample values in volts
    pub fn volts(&self) -> &[f64] {
        &self.volts
    }

    /// The `N - 1` samples that make up one seamless period
    pub fn cycle(&self) -> &[RawCode] {
        &self.codes[..self.codes.len() - 1]
    }

    /// Fill an output buffer of `len` codes by repeating [`Waveform::cycle`]
    pub fn tile(&self, len: usize) -> Vec<RawCode> {
        self.cycle().iter().copied().cycle().take(len).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const RANGE: AnalogRange = AnalogRange::Bip10Volts;

    #[test]
    fn sine_has_requested_length_and_starts_at_zero() {
        for n in 2..40 {
            let w = Waveform::sine(n, 10.0, RANGE, 16).unwrap();
            assert_eq!(w.len(), n);
            assert_eq!(w.volts()[0], 0.0);
            assert_eq!(w.codes()[0], RANGE.mid_code(16).unwrap());
            assert_eq!(w.cycle().len(), n - 1);
        }
    }

    #[test]
    fn closing_sample_duplicates_first() {
        let w = Waveform::for_sweep(10.0, RANGE, 16).unwrap();
        assert_eq!(w.len(), POINTS_PER_CYCLE + 1);
        let last = *w.codes().last().unwrap();
        // sin(2π) is not exactly zero in floating point, but quantizes to the same code
        assert_eq!(last, w.codes()[0]);
    }

    #[test]
    fn tile_repeats_cycle_without_seam() {
        for n in 2..20 {
            let w = Waveform::sine(n, 5.0, RANGE, 16).unwrap();
            let cycle = w.cycle();
            for len in [0, 1, n - 1, n, 46, 3 * n + 2] {
                let tiled = w.tile(len);
                assert_eq!(tiled.len(), len);
                for (k, code) in tiled.iter().enumerate() {
                    assert_eq!(*code, cycle[k % (n - 1)], "n={n} len={len} k={k}");
                }
            }
        }
    }

    #[test]
    fn tiled_sweep_buffer_has_no_flat_segment() {
        let w = Waveform::for_sweep(10.0, RANGE, 16).unwrap();
        let tiled = w.tile(46);
        for pair in tiled.windows(2) {
            assert_ne!(pair[0], pair[1], "repeated sample in tiled stimulus");
        }
    }

    #[test]
    fn narrow_bipolar_range_rejects_clipping_amplitude() {
        let range = AnalogRange::Bip5Volts;
        assert!(matches!(
            Waveform::sine(10, 10.0, range, 16),
            Err(SweepErr::InvalidConfig { .. })
        ));

        let w = Waveform::sine(10, 5.0, range, 16).unwrap();
        let max = *w.codes().iter().max().unwrap();
        let min = *w.codes().iter().min().unwrap();
        assert!(max > 60_000 && min < 5_000, "{:?}", w.codes());
        // No two neighboring samples saturate at the same code
        assert!(w.cycle().windows(2).all(|p| p[0] != p[1]));
    }

    #[test]
    fn unipolar_range_centers_stimulus() {
        let range = AnalogRange::Uni10Volts;
        assert!(Waveform::sine(10, 10.0, range, 16).is_err());

        let w = Waveform::sine(10, 5.0, range, 16).unwrap();
        assert_eq!(w.volts()[0], 5.0);
        assert_eq!(w.codes()[0], range.from_eng(5.0, 16).unwrap());
        assert!(w.volts().iter().all(|&v| (0.0..=10.0).contains(&v)));

        // Both half-cycles survive quantization
        let below = w.cycle().iter().filter(|&&c| c < 32768).count();
        let above = w.cycle().iter().filter(|&&c| c > 32768).count();
        assert_eq!(below, 4);
        assert_eq!(above, 4);
    }

    #[test]
    fn rejects_degenerate_inputs() {
        assert!(Waveform::sine(1, 10.0, RANGE, 16).is_err());
        assert!(Waveform::sine(10, f64::NAN, RANGE, 16).is_err());
        assert!(Waveform::sine(10, 10.0, AnalogRange::Unknown(55), 16).is_err());
    }
}
