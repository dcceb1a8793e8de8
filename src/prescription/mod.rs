//! Session-duration prescription
//!
//! Finds the session duration at which the Leypoldt standardized Kt/V,
//! corrected for ultrafiltration and residual renal clearance, meets a
//! clinician-supplied target for a 2x or 3x weekly regimen.
//!
//! # Usage
//!
//! ```rust,ignore
//! use ureakin::prelude::*;
//!
//! let patient = PatientParameters::builder(35.0, 70.0)
//!     .current_treatment(1.4, 240.0)
//!     .weekly_uf(2.0)
//!     .build()?;
//!
//! let result = solve_session_duration(
//!     &patient,
//!     Frequency::TwiceWeekly,
//!     2.1,
//!     &DurationSearchOptions::default(),
//! )?;
//!
//! println!("{}", result);
//! if let Some(advisory) = result.ultrafiltration.advisory {
//!     println!("UFR above limit, consider {} min", advisory.duration_minutes);
//! }
//! ```

pub mod calc;
mod solver;
mod types;

pub use calc::StdKtvModel;
pub use solver::{assess_ultrafiltration, solve_session_duration, std_ktv_at};
pub use types::{DurationSearchOptions, SessionDuration, UfAdvisory, UfAssessment};
