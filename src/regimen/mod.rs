//! Side-by-side comparison of the current and proposed regimens
//!
//! [`compare_regimens`] runs the whole pipeline for one patient: volume
//! estimate, session durations for a new 3x and a new 2x weekly regimen, and
//! the steady-state weekly PUN trajectory of the previous 3x regimen and both
//! new ones. When a measured PUN is supplied, the generation rate is first
//! calibrated on the previous regimen, where the sample was drawn.
//!
//! ```rust,ignore
//! use ureakin::prelude::*;
//!
//! let input = PrescriptionInput::from_json(&std::fs::read_to_string("patient.json")?)?;
//! let comparison = compare_regimens(&input, &ComparisonOptions::default())?;
//! for outcome in &comparison.regimens {
//!     println!("{}: APC {:.1}, TAC {:.1}", outcome.label, outcome.apc, outcome.tac);
//! }
//! comparison.write_csv(std::fs::File::create("pun.csv")?)?;
//! ```

mod export;

use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::io::Read;

use crate::error::{ensure_positive, UreaKinError};
use crate::patient::{estimate_volume, PatientParameters, VolumeInput};
use crate::prescription::{solve_session_duration, DurationSearchOptions, SessionDuration};
use crate::schedule::{build_schedule, Frequency, RegimenSpec, MINUTES_PER_DAY};
use crate::simulator::{
    calibrate_generation_rate, dialyzer_clearance, find_steady_state, CalibrationOptions,
    KdConvention, SimulationParams, SolverResult, SteadyStateOptions, EXTRACELLULAR_FRACTION,
};

/// Initial guess of the steady-state search without a measured PUN (mg/dL)
const DEFAULT_GUESS: f64 = 100.0;

/// Weekday of the measured pre-dialysis PUN on a Mon/Wed/Fri regimen
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MeasurementDay {
    #[default]
    Monday,
    Wednesday,
    Friday,
}

impl MeasurementDay {
    /// Minute of the week at which the sample is drawn
    pub fn offset_minutes(&self) -> usize {
        match self {
            MeasurementDay::Monday => 0,
            MeasurementDay::Wednesday => 2 * MINUTES_PER_DAY,
            MeasurementDay::Friday => 4 * MINUTES_PER_DAY,
        }
    }
}

/// Raw patient and target description, as collected by a form or a JSON file
///
/// Missing numeric fields deserialize to zero and are rejected by validation
/// where zero is out of domain.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PrescriptionInput {
    pub volume: VolumeInput,
    #[serde(default)]
    pub weight_kg: f64,
    /// Measured spKt/V of the current 3x regimen
    #[serde(default)]
    pub sp_ktv: f64,
    /// Current session duration (min)
    #[serde(default)]
    pub session_minutes: f64,
    /// Weekly ultrafiltration volume (L)
    #[serde(default)]
    pub weekly_uf_l: f64,
    /// Kru (mL/min)
    #[serde(default)]
    pub residual_clearance: f64,
    #[serde(default)]
    pub target_std_ktv: f64,
    /// G (mg/min), used when no PUN measurement is given
    #[serde(default)]
    pub generation_rate: f64,
    /// Kic (mL/min), defaults to 0.016 × V
    #[serde(default)]
    pub intercompartment_clearance: Option<f64>,
    /// Measured pre-dialysis PUN (mg/dL)
    #[serde(default)]
    pub measured_pun: Option<f64>,
    #[serde(default)]
    pub measurement_day: MeasurementDay,
}

impl PrescriptionInput {
    pub fn from_json(json: &str) -> Result<Self, UreaKinError> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn from_reader<R: Read>(reader: R) -> Result<Self, UreaKinError> {
        Ok(serde_json::from_reader(reader)?)
    }

    /// Estimate the volume and assemble validated [`PatientParameters`]
    pub fn patient(&self) -> Result<PatientParameters, UreaKinError> {
        let volume_l = estimate_volume(&self.volume)?;
        let mut builder = PatientParameters::builder(volume_l, self.weight_kg)
            .current_treatment(self.sp_ktv, self.session_minutes)
            .residual_clearance(self.residual_clearance)
            .weekly_uf(self.weekly_uf_l)
            .generation_rate(self.generation_rate);
        if let Some(kic) = self.intercompartment_clearance {
            builder = builder.intercompartment_clearance(kic);
        }
        builder.build()
    }
}

/// Configuration of the whole comparison
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ComparisonOptions {
    pub duration: DurationSearchOptions,
    pub steady_state: SteadyStateOptions,
    pub calibration: CalibrationOptions,
    pub kd_convention: KdConvention,
    pub extracellular_fraction: f64,
}

impl Default for ComparisonOptions {
    fn default() -> Self {
        Self {
            duration: DurationSearchOptions::default(),
            steady_state: SteadyStateOptions::default(),
            calibration: CalibrationOptions::default(),
            kd_convention: KdConvention::default(),
            extracellular_fraction: EXTRACELLULAR_FRACTION,
        }
    }
}

impl ComparisonOptions {
    pub fn from_json(json: &str) -> Result<Self, UreaKinError> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn with_duration(mut self, options: DurationSearchOptions) -> Self {
        self.duration = options;
        self
    }

    pub fn with_steady_state(mut self, options: SteadyStateOptions) -> Self {
        self.steady_state = options;
        self
    }

    pub fn with_calibration(mut self, options: CalibrationOptions) -> Self {
        self.calibration = options;
        self
    }

    pub fn with_kd_convention(mut self, convention: KdConvention) -> Self {
        self.kd_convention = convention;
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RegimenLabel {
    PreviousThrice,
    NewThrice,
    NewTwice,
}

impl RegimenLabel {
    pub fn frequency(&self) -> Frequency {
        match self {
            RegimenLabel::PreviousThrice | RegimenLabel::NewThrice => Frequency::ThriceWeekly,
            RegimenLabel::NewTwice => Frequency::TwiceWeekly,
        }
    }

    pub fn column(&self) -> &'static str {
        match self {
            RegimenLabel::PreviousThrice => "previous_3x",
            RegimenLabel::NewThrice => "new_3x",
            RegimenLabel::NewTwice => "new_2x",
        }
    }
}

impl fmt::Display for RegimenLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RegimenLabel::PreviousThrice => write!(f, "Current 3x/wk"),
            RegimenLabel::NewThrice => write!(f, "New 3x/wk"),
            RegimenLabel::NewTwice => write!(f, "New 2x/wk"),
        }
    }
}

/// Iterative stage of the pipeline
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Stage {
    SessionDuration,
    SteadyState,
    Calibration,
}

/// Conditions worth surfacing to the clinician
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Warning {
    /// An iterative search stopped at its cap; its result is a best effort
    NonConvergence { stage: Stage, iterations: usize },
    /// The UF rate exceeds the limit; a longer session would bring it down
    HighUltrafiltrationRate {
        rate: f64,
        limit: f64,
        alternative_minutes: usize,
    },
}

impl fmt::Display for Warning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Warning::NonConvergence { stage, iterations } => {
                write!(f, "{:?} search did not converge in {} iterations", stage, iterations)
            }
            Warning::HighUltrafiltrationRate {
                rate,
                limit,
                alternative_minutes,
            } => write!(
                f,
                "UF rate {:.1} mL/kg/h exceeds {} mL/kg/h; {} min would bring it to the limit",
                rate, limit, alternative_minutes
            ),
        }
    }
}

/// Steady-state week of one regimen
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegimenOutcome {
    pub label: RegimenLabel,
    pub session_minutes: usize,
    /// Duration search result, absent for the previous regimen
    pub prescription: Option<SessionDuration>,
    pub steady_state: SolverResult,
    /// Average pre-dialysis concentration (mg/dL)
    pub apc: f64,
    /// Time-averaged concentration (mg/dL)
    pub tac: f64,
    pub warnings: Vec<Warning>,
}

/// Output of [`compare_regimens`]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegimenComparison {
    pub volume_l: f64,
    /// Kd (mL/min)
    pub dialyzer_clearance: f64,
    /// G used for all regimens (mg/min)
    pub generation_rate: f64,
    /// Calibration of G against the measured PUN, if one was given
    pub calibration: Option<SolverResult>,
    pub regimens: Vec<RegimenOutcome>,
}

impl RegimenComparison {
    pub fn get(&self, label: RegimenLabel) -> Option<&RegimenOutcome> {
        self.regimens.iter().find(|r| r.label == label)
    }

    /// All warnings, those of the calibration first
    pub fn warnings(&self) -> Vec<Warning> {
        let mut warnings = Vec::new();
        if let Some(calibration) = self.calibration.as_ref().filter(|c| !c.converged) {
            warnings.push(Warning::NonConvergence {
                stage: Stage::Calibration,
                iterations: calibration.iterations,
            });
        }
        for outcome in &self.regimens {
            warnings.extend(outcome.warnings.iter().cloned());
        }
        warnings
    }
}

struct RegimenPlan {
    label: RegimenLabel,
    session_minutes: usize,
    prescription: Option<SessionDuration>,
}

fn simulation_params(
    patient: &PatientParameters,
    frequency: Frequency,
    session_minutes: usize,
    dialyzer_clearance: f64,
    options: &ComparisonOptions,
) -> Result<SimulationParams, UreaKinError> {
    let spec = RegimenSpec::standard(frequency, session_minutes, patient.weekly_uf_l * 1000.0)?;
    Ok(
        SimulationParams::new(build_schedule(&spec)?, patient, dialyzer_clearance)
            .with_extracellular_fraction(options.extracellular_fraction),
    )
}

fn prescription_warnings(prescription: &SessionDuration) -> Vec<Warning> {
    let mut warnings = Vec::new();
    if !prescription.converged {
        warnings.push(Warning::NonConvergence {
            stage: Stage::SessionDuration,
            iterations: prescription.iterations,
        });
    }
    if let Some(ref advisory) = prescription.ultrafiltration.advisory {
        warnings.push(Warning::HighUltrafiltrationRate {
            rate: prescription.ultrafiltration.rate,
            limit: advisory.ufr_limit,
            alternative_minutes: advisory.duration_minutes,
        });
    }
    warnings
}

/// Compute durations and steady-state PUN weeks for the previous 3x, new 3x
/// and new 2x regimens
///
/// The dialyzer clearance is derived from the current 3x treatment and shared
/// by all regimens. The three steady-state searches are independent and run
/// in parallel.
pub fn compare_regimens(
    input: &PrescriptionInput,
    options: &ComparisonOptions,
) -> Result<RegimenComparison, UreaKinError> {
    let mut patient = input.patient()?;
    ensure_positive("target_std_ktv", input.target_std_ktv)?;
    if let Some(pun) = input.measured_pun {
        ensure_positive("measured_pun", pun)?;
    }

    let kd = dialyzer_clearance(&patient, Frequency::ThriceWeekly, options.kd_convention)?;
    let previous_minutes = (patient.session_minutes.round() as usize).max(1);

    let calibration = match input.measured_pun {
        Some(pun) => {
            let params = simulation_params(
                &patient,
                Frequency::ThriceWeekly,
                previous_minutes,
                kd,
                options,
            )?;
            let result = calibrate_generation_rate(
                &params,
                pun,
                input.measurement_day.offset_minutes(),
                &options.calibration,
            )?;
            patient.generation_rate = result.value;
            Some(result)
        }
        None => None,
    };

    let mut plans = vec![RegimenPlan {
        label: RegimenLabel::PreviousThrice,
        session_minutes: previous_minutes,
        prescription: None,
    }];
    for label in [RegimenLabel::NewThrice, RegimenLabel::NewTwice] {
        let prescription = solve_session_duration(
            &patient,
            label.frequency(),
            input.target_std_ktv,
            &options.duration,
        )?;
        plans.push(RegimenPlan {
            label,
            session_minutes: prescription.duration_minutes,
            prescription: Some(prescription),
        });
    }

    let guess = input.measured_pun.unwrap_or(DEFAULT_GUESS);
    let regimens = plans
        .into_par_iter()
        .map(|plan| -> Result<RegimenOutcome, UreaKinError> {
            let params = simulation_params(
                &patient,
                plan.label.frequency(),
                plan.session_minutes,
                kd,
                options,
            )?;
            let steady_state = find_steady_state(&params, guess, &options.steady_state)?;

            let mut warnings = plan
                .prescription
                .as_ref()
                .map(prescription_warnings)
                .unwrap_or_default();
            if !steady_state.converged {
                warnings.push(Warning::NonConvergence {
                    stage: Stage::SteadyState,
                    iterations: steady_state.iterations,
                });
            }

            Ok(RegimenOutcome {
                label: plan.label,
                session_minutes: plan.session_minutes,
                apc: steady_state.trace.average_predialysis(&params.schedule),
                tac: steady_state.trace.time_averaged(),
                prescription: plan.prescription,
                steady_state,
                warnings,
            })
        })
        .collect::<Result<Vec<_>, UreaKinError>>()?;

    Ok(RegimenComparison {
        volume_l: patient.volume_l,
        dialyzer_clearance: kd,
        generation_rate: patient.generation_rate,
        calibration,
        regimens,
    })
}
