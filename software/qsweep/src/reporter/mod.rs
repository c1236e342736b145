//! Reporters receive sweep points as they complete and record them somewhere:
//! a file, a plot, the log, the console, or memory.

use std::fmt::Debug;
use std::time::SystemTime;

use chrono::{DateTime, Utc};

mod csv;
pub use csv::CsvReporter;
mod text_log;
pub use text_log::TextLogReporter;
mod memory;
pub use memory::{MemoryHandle, MemoryReporter};
mod plot;
pub use plot::PlotReporter;
mod progress;
pub use progress::ProgressReporter;

use crate::sweep::{SweepCtx, SweepPoint, SweepReport};

/// A reporting plugin that receives a sweep one point at a time.
#[typetag::serde(tag = "type")]
pub trait Reporter: Send + Sync + Debug {
    /// Set up the reporter at the start of a sweep
    fn init(&mut self, ctx: &SweepCtx, frequencies: &[f64]) -> Result<(), String>;

    /// Ingest one finished sweep point
    fn consume(&mut self, point: &SweepPoint) -> Result<(), String>;

    /// Wrap up after the last point, with the whole sweep available
    fn finish(&mut self, report: &SweepReport) -> Result<(), String>;
}

/// Columns of a sweep point table
pub const POINT_COLUMNS: [&str; 12] = [
    "index",
    "time",
    "frequency_hz",
    "rate_hz",
    "realized_rate_hz",
    "status",
    "offset",
    "amplitude",
    "phase",
    "cycles",
    "amplitude_std",
    "amplitude_volts",
];

/// Width of the status column, which is padded to keep rows fixed-width
const STATUS_WIDTH: usize = 12;

/// Generate CSV header row for a sweep point table
pub fn csv_header() -> String {
    let mut header_string = POINT_COLUMNS.join(",");
    header_string.push('\n');
    header_string
}

/// Fixed-width ISO-8601 UTC timestamp with zero-padded sub-second nanoseconds and Z-suffix
pub fn fmt_time(time: SystemTime) -> String {
    DateTime::<Utc>::from(time).to_rfc3339_opts(chrono::SecondsFormat::Nanos, true)
}

/// Format a CSV row for one sweep point that guarantees fixed width.
/// Values a point does not have are written as NaN.
pub fn csv_row_fixed_width(stringbuf: &mut String, index: i64, time: SystemTime, point: &SweepPoint) {
    stringbuf.clear();

    let fit = point.fit();
    let values = [
        point.frequency_hz,
        point.rate_hz,
        point.realized_rate_hz.unwrap_or(f64::NAN),
    ];
    let fit_values = [
        fit.map_or(f64::NAN, |f| f.offset),
        fit.map_or(f64::NAN, |f| f.amplitude),
        fit.map_or(f64::NAN, |f| f.phase),
        fit.map_or(f64::NAN, |f| f.cycles),
        fit.map_or(f64::NAN, |f| f.amplitude_std()),
        point.amplitude_volts().unwrap_or(f64::NAN),
    ];

    stringbuf.push_str(&fmt_i64(index));
    stringbuf.push(',');
    stringbuf.push_str(&fmt_time(time));
    for v in values {
        stringbuf.push(',');
        stringbuf.push_str(&fmt_f64(v));
    }
    stringbuf.push_str(&format!(",{:<width$}", point.status(), width = STATUS_WIDTH));
    for v in fit_values {
        stringbuf.push(',');
        stringbuf.push_str(&fmt_f64(v));
    }
    stringbuf.push('\n');
}

/// Fixed-width formatting of float values
#[allow(clippy::manual_strip)]
pub fn fmt_f64(num: f64) -> String {
    let precision = 17;
    let exp_pad = 3;
    let width = precision + exp_pad + 5;

    let prefix = match num {
        x if x.is_sign_positive() => "+",
        _ => "",
    };

    // Handle +/- Infinity and NaN.
    let mut numstr = format!("{prefix}{:.precision$e}", num, precision = precision);
    if !num.is_finite() {
        return format!("{:>width$}", numstr, width = width);
    }

    // Handle finite numbers.
    // Finite numbers always contain `e` in exponential format.
    let exp = match numstr.find('e') {
        Some(at) => numstr.split_off(at),
        None => return format!("{:>width$}", numstr, width = width),
    };

    let (sign, exp) = if exp.starts_with("e-") {
        ('-', &exp[2..])
    } else {
        ('+', &exp[1..])
    };
    numstr.push_str(&format!("e{}{:0>pad$}", sign, exp, pad = exp_pad));

    format!("{:>width$}", numstr, width = width)
}

/// Fixed-width formatting of integer values
/// 20 is the largest size.
pub fn fmt_i64(num: i64) -> String {
    format!("{num:+020}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::CaptureRecord;
    use crate::math::{FitErr, SineFit};
    use crate::sweep::{PointFailure, PointOutcome};
    use qsweep_shared::{DaqErr, ErrorCode};

    #[test]
    fn fmt_f64_has_consistent_width() {
        let values = [
            f64::INFINITY,
            f64::NEG_INFINITY,
            f64::NAN,
            0.0,
            -0.0,
            1.0,
            -1.0,
            10.0,
            -10.0,
            f64::MIN,
            f64::MAX,
        ];

        let expected_len = fmt_f64(values[0]).len();
        for value in values {
            let formatted = fmt_f64(value);

            // Make sure length matches
            assert_eq!(
                formatted.len(),
                expected_len,
                "length of `{value}` -> `{formatted}` should be {expected_len} but is {}",
                formatted.len()
            );

            // Make sure we can parse the number back
            let parsed: f64 = formatted
                .trim()
                .parse()
                .unwrap_or_else(|_| panic!("Failed to parse `{formatted}` to `{value}`"));
            if !value.is_nan() {
                assert_eq!(
                    value, parsed,
                    "{value} was serialized as `{formatted}` and parsed as `{parsed}`"
                );
            } else {
                assert!(parsed.is_nan(), "Failed to parse NaN value as NaN");
            }
        }
    }

    #[test]
    fn fmt_i64_has_consistent_width() {
        let values = [0, i64::MIN, i64::MAX, -1, 1, -10, 10];

        let expected_len = fmt_i64(values[0]).len();
        for value in values {
            let formatted = fmt_i64(value);
            assert_eq!(formatted.len(), expected_len, "`{value}` -> `{formatted}`");
            assert_eq!(formatted.parse::<i64>().unwrap(), value);
        }
    }

    fn points() -> Vec<SweepPoint> {
        let capture = CaptureRecord {
            frequency_hz: 1000.0,
            samples: vec![0; 45],
        };
        let fit = SineFit {
            offset: 32768.0,
            amplitude: 1234.5,
            phase: 0.25,
            cycles: 44.0 / 9.0,
            covariance: [[1.0; 4]; 4],
            evaluations: 20,
        };
        vec![
            SweepPoint {
                frequency_hz: 1000.0,
                rate_hz: 9000.0,
                realized_rate_hz: Some(9000.140627),
                outcome: PointOutcome::Captured {
                    capture: capture.clone(),
                    fit: Ok(fit.clone()),
                    fit_volts: Some(fit),
                },
            },
            SweepPoint {
                frequency_hz: 1100.0,
                rate_hz: 9900.0,
                realized_rate_hz: Some(9899.458),
                outcome: PointOutcome::Captured {
                    capture,
                    fit: Err(FitErr::Divergence {
                        reason: "LostPatience".to_owned(),
                        evaluations: 1500,
                    }),
                    fit_volts: None,
                },
            },
            SweepPoint {
                frequency_hz: 1200.0,
                rate_hz: 10800.0,
                realized_rate_hz: None,
                outcome: PointOutcome::Failed(PointFailure::Driver {
                    during: "starting the output scan".to_owned(),
                    err: DaqErr::new(ErrorCode::DeadDevice, "unplugged"),
                }),
            },
        ]
    }

    #[test]
    fn point_rows_have_consistent_width() {
        let mut buf = String::new();
        let mut expected_len = None;
        for (i, point) in points().iter().enumerate() {
            csv_row_fixed_width(&mut buf, i as i64, SystemTime::now(), point);
            assert_eq!(buf.split(',').count(), POINT_COLUMNS.len());
            let len = *expected_len.get_or_insert(buf.len());
            assert_eq!(buf.len(), len, "{buf}");
        }
        assert_eq!(csv_header().trim_end().split(',').count(), POINT_COLUMNS.len());
    }
}
