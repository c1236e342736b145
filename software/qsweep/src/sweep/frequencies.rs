//! Sweep frequency list and output scan rate

use crate::POINTS_PER_CYCLE;
use crate::error::SweepErr;

/// Longest frequency list a single sweep will accept
pub const MAX_SWEEP_POINTS: usize = 100_000;

/// Frequencies from `min_hz` by repeated addition of `step_hz` while not above `max_hz`.
///
/// `max_hz` is included when the accumulated frequency lands on it, and is otherwise
/// not reached; the list is never snapped to end exactly at `max_hz`.
pub fn frequency_list(min_hz: f64, max_hz: f64, step_hz: f64) -> Result<Vec<f64>, SweepErr> {
    let invalid = |msg: String| Err(SweepErr::InvalidRange { msg });

    if !(min_hz.is_finite() && max_hz.is_finite() && step_hz.is_finite()) {
        return invalid(format!(
            "Frequencies must be finite; got min {min_hz}, max {max_hz}, step {step_hz}"
        ));
    }
    if min_hz <= 0.0 {
        return invalid(format!("Minimum frequency must be positive, got {min_hz}"));
    }
    if max_hz < min_hz {
        return invalid(format!(
            "Maximum frequency {max_hz} is below minimum frequency {min_hz}"
        ));
    }
    if step_hz <= 0.0 {
        return invalid(format!("Frequency step must be positive, got {step_hz}"));
    }

    let approx_points = ((max_hz - min_hz) / step_hz).floor() + 1.0;
    if approx_points > MAX_SWEEP_POINTS as f64 {
        return invalid(format!(
            "Sweep of about {approx_points} points exceeds the limit of {MAX_SWEEP_POINTS}"
        ));
    }

    let mut frequencies = Vec::with_capacity(approx_points as usize + 1);
    let mut freq = min_hz;
    while freq <= max_hz {
        if frequencies.len() == MAX_SWEEP_POINTS {
            return invalid(format!("Sweep exceeds the limit of {MAX_SWEEP_POINTS} points"));
        }
        frequencies.push(freq);
        freq += step_hz;
    }

    Ok(frequencies)
}

/// Output scan rate that plays one stimulus cycle per `POINTS_PER_CYCLE` samples at `freq_hz`
pub fn output_rate(freq_hz: f64) -> f64 {
    freq_hz * POINTS_PER_CYCLE as f64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn includes_exact_endpoint() {
        assert_eq!(
            frequency_list(1000.0, 1200.0, 100.0).unwrap(),
            vec![1000.0, 1100.0, 1200.0]
        );
        assert_eq!(frequency_list(5.0, 5.0, 1.0).unwrap(), vec![5.0]);
    }

    #[test]
    fn does_not_snap_to_max() {
        assert_eq!(
            frequency_list(1000.0, 1250.0, 100.0).unwrap(),
            vec![1000.0, 1100.0, 1200.0]
        );
    }

    #[test]
    fn list_properties_hold() {
        let cases = [
            (1.0, 10.0, 0.3),
            (1000.0, 55_000.0, 250.0),
            (0.5, 0.5, 100.0),
            (17.0, 1017.0, 7.7),
            (100.0, 200.0, 0.1),
        ];
        for (min, max, step) in cases {
            let f = frequency_list(min, max, step).unwrap();
            assert_eq!(f[0], min);
            assert!(f.windows(2).all(|w| w[0] <= w[1]));
            assert!(f.iter().all(|&x| x <= max));
            let last = *f.last().unwrap();
            assert!(max - last < step, "{min} {max} {step}: last {last}");
        }
    }

    #[test]
    fn rejects_invalid_ranges() {
        for (min, max, step) in [
            (1000.0, 1200.0, 0.0),
            (1000.0, 1200.0, -100.0),
            (1200.0, 1000.0, 100.0),
            (0.0, 1000.0, 100.0),
            (f64::NAN, 1000.0, 100.0),
            (1000.0, f64::INFINITY, 100.0),
            (1.0, 1e9, 1.0),
        ] {
            assert!(matches!(
                frequency_list(min, max, step),
                Err(SweepErr::InvalidRange { .. })
            ));
        }
    }

    #[test]
    fn rate_is_points_per_cycle_times_frequency() {
        assert_eq!(output_rate(1000.0), 9000.0);
    }
}
