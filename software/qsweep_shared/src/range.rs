//! Analog voltage ranges and conversion between raw codes and engineering units.
//!
//! Raw codes are unsigned and span the whole range: code 0 is the low end of the
//! range and code `2^bits - 1` is one step below the high end. Conversion in
//! either direction is a pure function of the range and the converter resolution.

use serde::{Deserialize, Serialize};

use crate::{enum_with_unknown, DaqErr, ErrorCode, RawCode};

/// Largest converter resolution representable in a [`RawCode`]
pub const MAX_RESOLUTION_BITS: u8 = 16;

enum_with_unknown!(
    /// Input or output voltage range of an analog channel
    #[derive(Serialize, Deserialize)]
    #[non_exhaustive]
    pub enum AnalogRange(i32) {
        Bip5Volts = 0,
        Bip10Volts = 1,
        Bip2Pt5Volts = 2,
        Bip1Pt25Volts = 3,
        Bip1Volts = 4,
        Uni10Volts = 100,
        Uni5Volts = 101,
        Uni2Pt5Volts = 102,
    }
);

impl AnalogRange {
    /// Low and high end of the range in volts, if the range is recognized
    pub fn span_volts(&self) -> Option<(f64, f64)> {
        let span = match self {
            Self::Bip10Volts => (-10.0, 10.0),
            Self::Bip5Volts => (-5.0, 5.0),
            Self::Bip2Pt5Volts => (-2.5, 2.5),
            Self::Bip1Pt25Volts => (-1.25, 1.25),
            Self::Bip1Volts => (-1.0, 1.0),
            Self::Uni10Volts => (0.0, 10.0),
            Self::Uni5Volts => (0.0, 5.0),
            Self::Uni2Pt5Volts => (0.0, 2.5),
            Self::Unknown(_) => return None,
        };
        Some(span)
    }

    /// Volts per raw code step
    pub fn lsb_volts(&self, resolution_bits: u8) -> Result<f64, DaqErr> {
        let (low, high) = self.checked_span()?;
        let counts = full_scale_counts(resolution_bits)?;
        Ok((high - low) / counts)
    }

    /// Convert a raw code to volts
    pub fn to_eng(&self, raw: RawCode, resolution_bits: u8) -> Result<f64, DaqErr> {
        let (low, _) = self.checked_span()?;
        let max_code = max_code(resolution_bits)?;
        if raw > max_code {
            return Err(DaqErr::new(
                ErrorCode::BadRange,
                format!("Raw code {raw} exceeds {resolution_bits}-bit resolution"),
            ));
        }
        let lsb = self.lsb_volts(resolution_bits)?;
        Ok(low + f64::from(raw) * lsb)
    }

    /// Convert volts to the nearest raw code, saturating at the ends of the range
    pub fn from_eng(&self, volts: f64, resolution_bits: u8) -> Result<RawCode, DaqErr> {
        if !volts.is_finite() {
            return Err(DaqErr::new(
                ErrorCode::BadRange,
                format!("Cannot convert non-finite value {volts} to a raw code"),
            ));
        }
        let (low, _) = self.checked_span()?;
        let max_code = max_code(resolution_bits)?;
        let lsb = self.lsb_volts(resolution_bits)?;
        let code = ((volts - low) / lsb).round().clamp(0.0, f64::from(max_code));
        Ok(code as RawCode)
    }

    /// Raw code nearest to zero volts, or the low end for unipolar ranges
    pub fn mid_code(&self, resolution_bits: u8) -> Result<RawCode, DaqErr> {
        self.from_eng(0.0, resolution_bits)
    }

    fn checked_span(&self) -> Result<(f64, f64), DaqErr> {
        self.span_volts().ok_or_else(|| {
            DaqErr::new(
                ErrorCode::BadRange,
                format!("Unrecognized analog range {self:?}"),
            )
        })
    }
}

fn full_scale_counts(resolution_bits: u8) -> Result<f64, DaqErr> {
    if resolution_bits == 0 || resolution_bits > MAX_RESOLUTION_BITS {
        return Err(DaqErr::new(
            ErrorCode::BadRange,
            format!("Unsupported converter resolution of {resolution_bits} bits"),
        ));
    }
    Ok(f64::from(1_u32 << resolution_bits))
}

fn max_code(resolution_bits: u8) -> Result<RawCode, DaqErr> {
    let counts = full_scale_counts(resolution_bits)?;
    Ok((counts - 1.0) as RawCode)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn raw_to_eng_to_raw_recovers_code() {
        for range in [
            AnalogRange::Bip10Volts,
            AnalogRange::Bip1Volts,
            AnalogRange::Uni5Volts,
        ] {
            for bits in [12_u8, 16] {
                let max = max_code(bits).unwrap();
                for raw in (0..=max).step_by(97).chain([max]) {
                    let volts = range.to_eng(raw, bits).unwrap();
                    let back = range.from_eng(volts, bits).unwrap();
                    let diff = (i32::from(back) - i32::from(raw)).abs();
                    assert!(
                        diff <= 1,
                        "{range:?} {bits}-bit: {raw} -> {volts} V -> {back}"
                    );
                }
            }
        }
    }

    #[test]
    fn bipolar_zero_is_mid_scale() {
        let range = AnalogRange::Bip10Volts;
        assert_eq!(range.mid_code(16).unwrap(), 32768);
        assert_eq!(range.to_eng(32768, 16).unwrap(), 0.0);
        assert_eq!(range.from_eng(-10.0, 16).unwrap(), 0);
    }

    #[test]
    fn from_eng_saturates() {
        let range = AnalogRange::Bip5Volts;
        assert_eq!(range.from_eng(100.0, 16).unwrap(), u16::MAX);
        assert_eq!(range.from_eng(-100.0, 16).unwrap(), 0);
        assert_eq!(range.from_eng(100.0, 12).unwrap(), 4095);
    }

    #[test]
    fn rejects_bad_inputs() {
        assert!(AnalogRange::Unknown(77).to_eng(0, 16).is_err());
        assert!(AnalogRange::Bip10Volts.to_eng(0, 0).is_err());
        assert!(AnalogRange::Bip10Volts.to_eng(0, 17).is_err());
        assert!(AnalogRange::Bip10Volts.to_eng(4096, 12).is_err());
        assert!(AnalogRange::Bip10Volts.from_eng(f64::NAN, 16).is_err());
    }

    #[test]
    fn serde_roundtrip_keeps_unknown() {
        let ranges = vec![AnalogRange::Bip10Volts, AnalogRange::Unknown(-3)];
        let s = serde_json::to_string(&ranges).unwrap();
        let back: Vec<AnalogRange> = serde_json::from_str(&s).unwrap();
        assert_eq!(ranges, back);
    }
}
