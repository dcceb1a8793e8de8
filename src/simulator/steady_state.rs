use serde::{Deserialize, Serialize};

use super::{ConcentrationTrace, SimulationParams, SolverResult, WeekModel};
use crate::error::{ensure_non_negative, ensure_positive, UreaKinError};

/// Configuration of the damped fixed-point search for the weekly steady state
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SteadyStateOptions {
    /// Fraction of the end-of-week mismatch applied per iteration (default: 0.5)
    pub damping: f64,
    /// Accepted |C(end) − C(start)| in mg/dL (default: 1e-5)
    pub tolerance: f64,
    /// Iteration cap (default: 100)
    pub max_iterations: usize,
}

impl Default for SteadyStateOptions {
    fn default() -> Self {
        Self {
            damping: 0.5,
            tolerance: 1e-5,
            max_iterations: 100,
        }
    }
}

impl SteadyStateOptions {
    pub fn with_damping(mut self, damping: f64) -> Self {
        self.damping = damping;
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

    fn validate(&self) -> Result<(), UreaKinError> {
        if !(self.damping > 0.0 && self.damping <= 1.0) {
            return Err(UreaKinError::invalid("damping", self.damping));
        }
        ensure_positive("tolerance", self.tolerance)?;
        if self.max_iterations == 0 {
            return Err(UreaKinError::invalid("max_iterations", 0));
        }
        Ok(())
    }
}

/// Find the initial concentration that one simulated week reproduces
///
/// `value` of the result is that initial concentration and `trace` its week.
/// If the cap is reached, the iterate with the smallest end-of-week mismatch
/// is returned with `converged == false`.
pub fn find_steady_state(
    params: &SimulationParams,
    initial_guess: f64,
    options: &SteadyStateOptions,
) -> Result<SolverResult, UreaKinError> {
    ensure_non_negative("initial_guess", initial_guess)?;
    options.validate()?;
    let week = WeekModel::prepare(params)?;

    let mut c0 = initial_guess;
    let mut best: Option<(f64, f64, ConcentrationTrace)> = None;

    for iteration in 1..=options.max_iterations {
        let trace = week.run(c0);
        let delta = trace.last() - c0;

        if delta.abs() < options.tolerance {
            tracing::debug!(
                "Steady state {:.4} mg/dL found after {} iterations",
                c0,
                iteration
            );
            return Ok(SolverResult {
                value: c0,
                trace,
                iterations: iteration,
                converged: true,
            });
        }

        if best.as_ref().map_or(true, |(mismatch, _, _)| delta.abs() < *mismatch) {
            best = Some((delta.abs(), c0, trace));
        }
        c0 += options.damping * delta;
    }

    // max_iterations >= 1, so at least one iterate was stored
    let (mismatch, value, trace) = best.ok_or_else(|| UreaKinError::invalid("max_iterations", 0))?;
    tracing::warn!(
        "Steady-state search did not converge after {} iterations (|Δ| = {:.3e})",
        options.max_iterations,
        mismatch
    );
    Ok(SolverResult {
        value,
        trace,
        iterations: options.max_iterations,
        converged: false,
    })
}
