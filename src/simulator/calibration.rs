use serde::{Deserialize, Serialize};

use super::steady_state::{find_steady_state, SteadyStateOptions};
use super::{ConcentrationTrace, SimulationParams, SolverResult};
use crate::error::{ensure_non_negative, ensure_positive, UreaKinError};
use crate::schedule::MINUTES_PER_WEEK;

/// Configuration of the generation-rate bisection
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CalibrationOptions {
    /// Lower bound of G (mg/min, default: 0.01)
    pub lower: f64,
    /// Upper bound of G (mg/min, default: 50)
    pub upper: f64,
    /// Accepted |C(offset) − target| in mg/dL (default: 0.001)
    pub tolerance: f64,
    /// Bisection cap (default: 50)
    pub max_iterations: usize,
    /// Options of the nested steady-state search
    pub steady_state: SteadyStateOptions,
}

impl Default for CalibrationOptions {
    fn default() -> Self {
        Self {
            lower: 0.01,
            upper: 50.0,
            tolerance: 0.001,
            max_iterations: 50,
            steady_state: SteadyStateOptions::default(),
        }
    }
}

impl CalibrationOptions {
    pub fn with_bounds(mut self, lower: f64, upper: f64) -> Self {
        self.lower = lower;
        self.upper = upper;
        self
    }

    pub fn with_tolerance(mut self, tolerance: f64) -> Self {
        self.tolerance = tolerance;
        self
    }

    pub fn with_max_iterations(mut self, max_iterations: usize) -> Self {
        self.max_iterations = max_iterations;
        self
    }

    pub fn with_steady_state(mut self, options: SteadyStateOptions) -> Self {
        self.steady_state = options;
        self
    }

    fn validate(&self) -> Result<(), UreaKinError> {
        ensure_non_negative("lower", self.lower)?;
        if !(self.upper.is_finite() && self.upper > self.lower) {
            return Err(UreaKinError::invalid("upper", self.upper));
        }
        ensure_positive("tolerance", self.tolerance)?;
        if self.max_iterations == 0 {
            return Err(UreaKinError::invalid("max_iterations", 0));
        }
        Ok(())
    }
}

struct Candidate {
    error: f64,
    generation_rate: f64,
    trace: ConcentrationTrace,
}

/// Find the generation rate whose steady state matches a measured concentration
///
/// `offset_minutes` locates the measurement within the week (0 = start of the
/// first session). The steady-state concentration at a fixed point in the week
/// grows with G, so the bracket `[lower, upper]` is bisected. `value` of the
/// result is G in mg/min. When the cap is reached, the candidate with the
/// smallest error is returned with `converged == false`.
pub fn calibrate_generation_rate(
    params: &SimulationParams,
    target: f64,
    offset_minutes: usize,
    options: &CalibrationOptions,
) -> Result<SolverResult, UreaKinError> {
    ensure_positive("target_concentration", target)?;
    if offset_minutes > MINUTES_PER_WEEK {
        return Err(UreaKinError::invalid("offset_minutes", offset_minutes));
    }
    options.validate()?;
    params.validate()?;

    let mut trial = params.clone();
    let (mut lower, mut upper) = (options.lower, options.upper);
    let mut guess = target;
    let mut best: Option<Candidate> = None;

    for iteration in 1..=options.max_iterations {
        let generation_rate = 0.5 * (lower + upper);
        trial.generation_rate = generation_rate;

        let steady = find_steady_state(&trial, guess, &options.steady_state)?;
        guess = steady.value;
        let error = steady.trace.values()[offset_minutes] - target;

        if error.abs() <= options.tolerance {
            tracing::debug!(
                "Generation rate {:.4} mg/min calibrated after {} iterations",
                generation_rate,
                iteration
            );
            return Ok(SolverResult {
                value: generation_rate,
                trace: steady.trace,
                iterations: iteration,
                converged: steady.converged,
            });
        }

        if best.as_ref().map_or(true, |b| error.abs() < b.error) {
            best = Some(Candidate {
                error: error.abs(),
                generation_rate,
                trace: steady.trace,
            });
        }

        if error < 0.0 {
            lower = generation_rate;
        } else {
            upper = generation_rate;
        }
    }

    let best = best.ok_or_else(|| UreaKinError::invalid("max_iterations", 0))?;
    tracing::warn!(
        "Generation-rate calibration did not converge after {} iterations (best G = {:.4} mg/min, |error| = {:.4} mg/dL)",
        options.max_iterations,
        best.generation_rate,
        best.error
    );
    Ok(SolverResult {
        value: best.generation_rate,
        trace: best.trace,
        iterations: options.max_iterations,
        converged: false,
    })
}
