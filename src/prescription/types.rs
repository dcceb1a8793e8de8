use serde::{Deserialize, Serialize};
use std::fmt;

use crate::schedule::Frequency;

/// Configuration of the fixed-step session-duration search
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DurationSearchOptions {
    /// Step applied to the trial duration per iteration (min, default: 0.1)
    pub step: f64,
    /// Accepted |std Kt/V − target| as a fraction of the target (default: 0.001)
    pub relative_tolerance: f64,
    /// Iteration cap (default: 100 000)
    pub max_iterations: usize,
    /// Highest acceptable ultrafiltration rate (mL/kg/h, default: 13)
    pub ufr_limit: f64,
}

impl Default for DurationSearchOptions {
    fn default() -> Self {
        Self {
            step: 0.1,
            relative_tolerance: 0.001,
            max_iterations: 100_000,
            ufr_limit: 13.0,
        }
    }
}

impl DurationSearchOptions {
    pub fn with_step(mut self, step: f64) -> Self {
        self.step = step;
        self
    }

    pub fn with_relative_tolerance(mut self, tolerance: f64) -> Self {
        self.relative_tolerance = tolerance;
        self
    }

    pub fn with_max_iterations(mut self, max_iterations: usize) -> Self {
        self.max_iterations = max_iterations;
        self
    }

    pub fn with_ufr_limit(mut self, limit: f64) -> Self {
        self.ufr_limit = limit;
        self
    }
}

/// Alternative treatment bringing the UF rate down to the limit
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UfAdvisory {
    /// Session duration at which the UF rate equals the limit (min)
    pub duration_minutes: usize,
    pub sp_ktv: f64,
    pub std_ktv: f64,
    /// The limit that was exceeded (mL/kg/h)
    pub ufr_limit: f64,
}

/// Ultrafiltration rate of a treatment, with an advisory when above the limit
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UfAssessment {
    /// mL/kg/h
    pub rate: f64,
    pub advisory: Option<UfAdvisory>,
}

/// Result of the session-duration search
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionDuration {
    pub frequency: Frequency,
    pub target_std_ktv: f64,
    /// Duration rounded to the nearest minute
    pub duration_minutes: usize,
    /// Unrounded duration where the search stopped
    pub search_minutes: f64,
    pub sp_ktv: f64,
    pub std_ktv: f64,
    pub ultrafiltration: UfAssessment,
    pub iterations: usize,
    pub converged: bool,
}

impl fmt::Display for SessionDuration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}: {} min (spKt/V {:.2}, std Kt/V {:.2}, UFR {:.1} mL/kg/h)",
            self.frequency,
            self.duration_minutes,
            self.sp_ktv,
            self.std_ktv,
            self.ultrafiltration.rate
        )?;
        if let Some(ref advisory) = self.ultrafiltration.advisory {
            write!(
                f,
                "; {} min would bring UFR to {} mL/kg/h",
                advisory.duration_minutes, advisory.ufr_limit
            )?;
        }
        if !self.converged {
            write!(f, " [not converged]")?;
        }
        Ok(())
    }
}
