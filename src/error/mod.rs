use thiserror::Error;

/// Errors raised by the urea kinetic engine
///
/// Solver non-convergence is not an error: it is reported on the returned
/// result (`converged == false`) so callers can show a best effort.
#[derive(Error, Debug)]
pub enum UreaKinError {
    /// A scalar input is non-finite or outside its domain
    #[error("Invalid input: {param} = {value}")]
    InvalidInput { param: String, value: String },

    /// Sessions and gaps do not describe a valid week
    #[error("Inconsistent schedule: {reason}")]
    ScheduleInconsistency { reason: String },

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Csv(#[from] csv::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl UreaKinError {
    pub(crate) fn invalid(param: &str, value: impl ToString) -> Self {
        UreaKinError::InvalidInput {
            param: param.to_string(),
            value: value.to_string(),
        }
    }

    pub(crate) fn schedule(reason: impl Into<String>) -> Self {
        UreaKinError::ScheduleInconsistency {
            reason: reason.into(),
        }
    }
}

/// Reject non-finite and non-positive values
pub(crate) fn ensure_positive(param: &str, value: f64) -> Result<f64, UreaKinError> {
    if value.is_finite() && value > 0.0 {
        Ok(value)
    } else {
        Err(UreaKinError::invalid(param, value))
    }
}

/// Reject non-finite and negative values
pub(crate) fn ensure_non_negative(param: &str, value: f64) -> Result<f64, UreaKinError> {
    if value.is_finite() && value >= 0.0 {
        Ok(value)
    } else {
        Err(UreaKinError::invalid(param, value))
    }
}
