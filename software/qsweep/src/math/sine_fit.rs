//! Fit `y = offset + amplitude * sin(cycles * x + phase)` to a capture using Levenberg-Marquardt method.
//!
//! The phase grid `x` spans 0 to 2π over the capture, so `cycles` is the number of
//! stimulus periods the capture covers. Bounds (amplitude and cycles non-negative,
//! phase in [0, 2π]) are enforced after minimization by mapping the solution onto the
//! equivalent parameter set that satisfies them; the model value is unchanged by
//! that mapping.

use core::f64::consts::PI;
use core::fmt;

use levenberg_marquardt::{LeastSquaresProblem, LevenbergMarquardt, TerminationReason};
use nalgebra::{DVector, Dyn, Matrix4, OMatrix, U4, Vector4, storage::Owned};
use serde::{Deserialize, Serialize};

use qsweep_shared::{AnalogRange, DaqErr};

use crate::POINTS_PER_CYCLE;
use crate::math::linspace;

/// Number of model parameters: offset, amplitude, phase, cycles
const N_PARAMS: usize = 4;

/// How to seed the amplitude before minimization
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AmplitudeGuess {
    /// Half the peak-to-peak span, `0.5 * (max - min)`
    #[default]
    HalfPeakToPeak,

    /// Half the sum of the extrema, `0.5 * (max + min)`.
    /// For a sine capture this lands on the offset, not the amplitude.
    SumOfExtrema,
}

impl AmplitudeGuess {
    fn seed(&self, min: f64, max: f64) -> f64 {
        match self {
            Self::HalfPeakToPeak => 0.5 * (max - min),
            Self::SumOfExtrema => 0.5 * (max + min),
        }
    }
}

/// Fit settings
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq)]
pub struct FitConfig {
    pub amplitude_guess: AmplitudeGuess,

    /// Cap on residual evaluations before the fit is declared divergent
    pub max_evaluations: usize,
}

impl Default for FitConfig {
    fn default() -> Self {
        Self {
            amplitude_guess: AmplitudeGuess::default(),
            max_evaluations: 1500,
        }
    }
}

/// Fit did not produce usable parameters
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub enum FitErr {
    /// Input cannot be fit at all
    InvalidData { msg: String },

    /// Minimization stopped without converging
    Divergence { reason: String, evaluations: usize },
}

impl fmt::Display for FitErr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidData { msg } => write!(f, "Sine fit rejected input: {msg}"),
            Self::Divergence {
                reason,
                evaluations,
            } => write!(
                f,
                "Sine fit diverged after {evaluations} evaluations: {reason}"
            ),
        }
    }
}

impl std::error::Error for FitErr {}

/// Fitted sine parameters and their covariance
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct SineFit {
    pub offset: f64,
    pub amplitude: f64,
    pub phase: f64,
    pub cycles: f64,

    /// Parameter covariance, ordered (offset, amplitude, phase, cycles).
    /// Infinite where the problem is rank-deficient.
    pub covariance: [[f64; N_PARAMS]; N_PARAMS],

    /// Residual evaluations spent by the minimizer
    pub evaluations: usize,
}

impl SineFit {
    /// Parameters ordered (offset, amplitude, phase, cycles)
    pub fn params(&self) -> [f64; N_PARAMS] {
        [self.offset, self.amplitude, self.phase, self.cycles]
    }

    /// One-sigma uncertainty of the amplitude
    pub fn amplitude_std(&self) -> f64 {
        self.covariance[1][1].sqrt()
    }

    /// Express a fit made on raw codes in volts.
    /// Offset maps through the range's affine conversion and amplitude scales by the code step.
    pub fn to_volts(&self, range: AnalogRange, resolution_bits: u8) -> Result<SineFit, DaqErr> {
        let lsb = range.lsb_volts(resolution_bits)?;
        let low = range.to_eng(0, resolution_bits)?;
        let scale = [lsb, lsb, 1.0, 1.0];

        let mut covariance = self.covariance;
        for (i, row) in covariance.iter_mut().enumerate() {
            for (j, c) in row.iter_mut().enumerate() {
                *c *= scale[i] * scale[j];
            }
        }

        Ok(SineFit {
            offset: low + self.offset * lsb,
            amplitude: self.amplitude * lsb,
            covariance,
            ..self.clone()
        })
    }
}

/// Phase grid for a capture of `n` samples, spanning 0 to 2π inclusive
pub fn phase_grid(n: usize) -> Vec<f64> {
    linspace(0.0, 2.0 * PI, n)
}

/// Stimulus periods covered by a capture of `capture_len` samples taken at the output rate
pub fn expected_cycles(capture_len: usize) -> f64 {
    capture_len.saturating_sub(1) as f64 / POINTS_PER_CYCLE as f64
}

#[inline]
fn model(p: &[f64; N_PARAMS], x: f64) -> f64 {
    let [offset, amplitude, phase, cycles] = *p;
    amplitude.mul_add((cycles * x + phase).sin(), offset)
}

/// Fit the sine model to `(x, y)`, seeding the cycle count with `expected_cycles`.
pub fn fit_sine(
    x: &[f64],
    y: &[f64],
    expected_cycles: f64,
    config: &FitConfig,
) -> Result<SineFit, FitErr> {
    if x.len() != y.len() {
        return Err(FitErr::InvalidData {
            msg: format!("{} grid points for {} samples", x.len(), y.len()),
        });
    }
    if y.len() < N_PARAMS {
        return Err(FitErr::InvalidData {
            msg: format!(
                "Sine fit requires at least {N_PARAMS} samples; got {}",
                y.len()
            ),
        });
    }
    if x.iter().chain(y).any(|v| !v.is_finite()) || !expected_cycles.is_finite() {
        return Err(FitErr::InvalidData {
            msg: "Sine fit requires finite samples".to_string(),
        });
    }

    // Seed
    let (min, max) = y
        .iter()
        .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), &v| {
            (lo.min(v), hi.max(v))
        });
    let offset = 0.5 * (min + max);
    let amplitude = config.amplitude_guess.seed(min, max);
    let initial = Vector4::new(offset, amplitude, 0.0, expected_cycles.max(0.0));

    // Minimize
    let patience = config.max_evaluations.div_ceil(N_PARAMS + 1).max(1);
    let problem = SineFitProblem {
        x,
        y,
        params: initial,
    };
    let (problem, report) = LevenbergMarquardt::new()
        .with_patience(patience)
        .minimize(problem);
    check_termination(&report.termination, report.number_of_evaluations)?;

    let p = problem.params;
    if p.iter().any(|v| !v.is_finite()) {
        return Err(FitErr::Divergence {
            reason: "non-finite parameters".to_string(),
            evaluations: report.number_of_evaluations,
        });
    }

    let covariance = covariance(&problem);
    let (params, signs) = canonicalize([p[0], p[1], p[2], p[3]]);

    let mut cov = [[0.0; N_PARAMS]; N_PARAMS];
    for i in 0..N_PARAMS {
        for j in 0..N_PARAMS {
            cov[i][j] = signs[i] * signs[j] * covariance[(i, j)];
        }
    }

    let [offset, amplitude, phase, cycles] = params;
    Ok(SineFit {
        offset,
        amplitude,
        phase,
        cycles,
        covariance: cov,
        evaluations: report.number_of_evaluations,
    })
}

/// Map minimizer termination onto success or divergence
fn check_termination(termination: &TerminationReason, evaluations: usize) -> Result<(), FitErr> {
    if termination.was_successful() {
        Ok(())
    } else {
        Err(FitErr::Divergence {
            reason: format!("{termination:?}"),
            evaluations,
        })
    }
}

/// Move parameters into bounds without changing the model,
/// returning the sign each parameter's deviation picked up along the way.
fn canonicalize(p: [f64; N_PARAMS]) -> ([f64; N_PARAMS], [f64; N_PARAMS]) {
    let [offset, mut amplitude, mut phase, mut cycles] = p;
    let mut signs = [1.0; N_PARAMS];

    // sin(-c x + p) = sin(c x + π - p)
    if cycles < 0.0 {
        cycles = -cycles;
        phase = PI - phase;
        signs[2] = -signs[2];
        signs[3] = -signs[3];
    }

    // -a sin(θ) = a sin(θ + π)
    if amplitude < 0.0 {
        amplitude = -amplitude;
        phase += PI;
        signs[1] = -signs[1];
    }

    phase = phase.rem_euclid(2.0 * PI);

    ([offset, amplitude, phase, cycles], signs)
}

/// Parameter covariance `(JᵀJ)⁻¹ s²` with `s²` the residual variance
fn covariance(problem: &SineFitProblem) -> Matrix4<f64> {
    let singular = Matrix4::from_element(f64::INFINITY);
    let dof = problem.y.len().saturating_sub(N_PARAMS);
    let (Some(j), Some(r)) = (problem.jacobian(), problem.residuals()) else {
        return singular;
    };
    if dof == 0 {
        return singular;
    }

    let s2 = r.norm_squared() / dof as f64;
    let jtj: Matrix4<f64> = j.transpose() * &j;
    match jtj.try_inverse() {
        Some(inv) => inv * s2,
        None => singular,
    }
}

/// Levenberg-Marquardt curve-fitting wrapper for the sine model
struct SineFitProblem<'a> {
    x: &'a [f64],
    y: &'a [f64],
    params: Vector4<f64>,
}

impl SineFitProblem<'_> {
    fn param_array(&self) -> [f64; N_PARAMS] {
        [self.params[0], self.params[1], self.params[2], self.params[3]]
    }
}

impl LeastSquaresProblem<f64, Dyn, U4> for SineFitProblem<'_> {
    type ResidualStorage = Owned<f64, Dyn>;
    type JacobianStorage = Owned<f64, Dyn, U4>;
    type ParameterStorage = Owned<f64, U4>;

    fn set_params(&mut self, p: &nalgebra::Vector<f64, U4, Self::ParameterStorage>) {
        self.params.copy_from(p);
    }

    fn params(&self) -> nalgebra::Vector<f64, U4, Self::ParameterStorage> {
        self.params.clone_owned()
    }

    fn residuals(&self) -> Option<nalgebra::Vector<f64, Dyn, Self::ResidualStorage>> {
        let p = self.param_array();
        Some(DVector::from_iterator(
            self.y.len(),
            self.x.iter().zip(self.y).map(|(&x, &y)| model(&p, x) - y),
        ))
    }

    fn jacobian(&self) -> Option<nalgebra::Matrix<f64, Dyn, U4, Self::JacobianStorage>> {
        let [_, amplitude, phase, cycles] = self.param_array();
        let mut jacobian = OMatrix::<f64, Dyn, U4>::zeros(self.x.len());
        for (row, &x) in self.x.iter().enumerate() {
            let (s, c) = (cycles * x + phase).sin_cos();
            jacobian[(row, 0)] = 1.0;
            jacobian[(row, 1)] = s;
            jacobian[(row, 2)] = amplitude * c;
            jacobian[(row, 3)] = amplitude * x * c;
        }
        Some(jacobian)
    }
}
