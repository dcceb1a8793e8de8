//! Two-compartment weekly urea kinetics
//!
//! Urea is generated into and removed from an extracellular-equivalent
//! compartment V1 (one third of the distribution volume by default), which
//! exchanges with an intracellular-equivalent compartment V2 through the
//! inter-compartment clearance Kic. V1 expands with interdialytic fluid gain
//! and contracts with ultrafiltration; V2 is constant.
//!
//! Units: volumes in mL, clearances in mL/min, concentrations in mg/dL and
//! the generation rate in mg/min.
//!
//! The per-minute update is an explicit mass balance:
//!
//! | Term | Compartment 1 | Compartment 2 |
//! |------|---------------|---------------|
//! | Generation | `+G` | |
//! | Exchange | `+Kic·(C2 − C1)` | `−Kic·(C2 − C1)` |
//! | Dialysis (on minutes) | `−Kd·C1` | |
//! | Residual renal | `−Kru·C1` | |

pub mod calibration;
pub mod steady_state;

use nalgebra::Vector2;
use serde::{Deserialize, Serialize};

use crate::error::{ensure_non_negative, ensure_positive, UreaKinError};
use crate::patient::PatientParameters;
use crate::schedule::{Frequency, MinuteSchedule, MINUTES_PER_WEEK};

pub use calibration::{calibrate_generation_rate, CalibrationOptions};
pub use steady_state::{find_steady_state, SteadyStateOptions};

/// Converts mg/min of generation into mg·mL/dL per minute of solute
pub const ML_PER_DL: f64 = 100.0;

/// Default share of the distribution volume in the extracellular compartment
pub const EXTRACELLULAR_FRACTION: f64 = 1.0 / 3.0;

/// How the dialyzer clearance is inferred from the measured spKt/V
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum KdConvention {
    /// `Kd = spKt/V · V / (n · t) − Kru`, spreading the dose over weekly treatment time
    #[default]
    PerWeeklyTreatmentTime,
    /// `Kd = spKt/V · V / t − Kru`, the clearance of a single session
    PerSession,
}

/// Dialyzer urea clearance (mL/min) implied by the patient's current treatment
///
/// `current` is the frequency on which `patient.sp_ktv` was measured. Negative
/// values, when residual clearance dominates, are clamped to zero.
pub fn dialyzer_clearance(
    patient: &PatientParameters,
    current: Frequency,
    convention: KdConvention,
) -> Result<f64, UreaKinError> {
    patient.validate()?;
    let treatment_minutes = match convention {
        KdConvention::PerWeeklyTreatmentTime => current.sessions() as f64 * patient.session_minutes,
        KdConvention::PerSession => patient.session_minutes,
    };
    let kd = patient.sp_ktv * patient.volume_ml() / treatment_minutes - patient.residual_clearance;
    Ok(kd.max(0.0))
}

/// Everything the simulator needs besides the initial concentration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimulationParams {
    pub schedule: MinuteSchedule,
    /// Total urea distribution volume (mL)
    pub volume_ml: f64,
    /// Share of the volume in compartment 1, in (0, 1)
    pub extracellular_fraction: f64,
    /// Kd (mL/min)
    pub dialyzer_clearance: f64,
    /// Kru (mL/min)
    pub residual_clearance: f64,
    /// G (mg/min)
    pub generation_rate: f64,
    /// Kic (mL/min)
    pub intercompartment_clearance: f64,
}

impl SimulationParams {
    pub fn new(schedule: MinuteSchedule, patient: &PatientParameters, dialyzer_clearance: f64) -> Self {
        Self {
            schedule,
            volume_ml: patient.volume_ml(),
            extracellular_fraction: EXTRACELLULAR_FRACTION,
            dialyzer_clearance,
            residual_clearance: patient.residual_clearance,
            generation_rate: patient.generation_rate,
            intercompartment_clearance: patient.intercompartment_clearance,
        }
    }

    pub fn with_generation_rate(mut self, generation_rate: f64) -> Self {
        self.generation_rate = generation_rate;
        self
    }

    pub fn with_extracellular_fraction(mut self, fraction: f64) -> Self {
        self.extracellular_fraction = fraction;
        self
    }

    pub fn validate(&self) -> Result<(), UreaKinError> {
        self.schedule.validate()?;
        ensure_positive("volume_ml", self.volume_ml)?;
        if !(self.extracellular_fraction > 0.0 && self.extracellular_fraction < 1.0) {
            return Err(UreaKinError::invalid(
                "extracellular_fraction",
                self.extracellular_fraction,
            ));
        }
        ensure_non_negative("dialyzer_clearance", self.dialyzer_clearance)?;
        ensure_non_negative("residual_clearance", self.residual_clearance)?;
        ensure_non_negative("generation_rate", self.generation_rate)?;
        ensure_non_negative("intercompartment_clearance", self.intercompartment_clearance)?;
        Ok(())
    }

    /// Interdialytic fluid gain (mL/min)
    pub fn fluid_gain_rate(&self) -> f64 {
        self.schedule.weekly_uf_ml() / self.schedule.off_minutes() as f64
    }

    pub fn intracellular_volume(&self) -> f64 {
        self.volume_ml * (1.0 - self.extracellular_fraction)
    }

    /// Compartment-1 volume at each minute boundary
    ///
    /// Starts from the baseline share plus the fluid gained since the last
    /// session of the previous week.
    pub fn extracellular_volumes(&self) -> Result<Vec<f64>, UreaKinError> {
        self.validate()?;
        let fluid = self.fluid_gain_rate();
        let mut volumes = Vec::with_capacity(MINUTES_PER_WEEK + 1);
        let mut v1 = self.volume_ml * self.extracellular_fraction
            + self.schedule.trailing_off_minutes() as f64 * fluid;
        volumes.push(v1);
        for minute in 0..MINUTES_PER_WEEK {
            if self.schedule.is_on(minute) {
                v1 -= self.schedule.uf_rate(minute);
            } else {
                v1 += fluid;
            }
            if v1 <= 0.0 {
                return Err(UreaKinError::invalid("extracellular_volume", v1));
            }
            volumes.push(v1);
        }
        Ok(volumes)
    }
}

/// Compartment-1 concentration (mg/dL) at each of the 10 081 minute boundaries
///
/// Never empty.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "Vec<f64>")]
pub struct ConcentrationTrace(Vec<f64>);

impl ConcentrationTrace {
    pub fn values(&self) -> &[f64] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn at(&self, minute: usize) -> Option<f64> {
        self.0.get(minute).copied()
    }

    pub fn initial(&self) -> f64 {
        self.0[0]
    }

    pub fn last(&self) -> f64 {
        self.0[self.0.len() - 1]
    }

    /// Time-averaged concentration (TAC)
    pub fn time_averaged(&self) -> f64 {
        self.0.iter().sum::<f64>() / self.0.len() as f64
    }

    /// Average pre-dialysis concentration (APC): mean at each session start
    ///
    /// Session starts beyond the trace are skipped.
    pub fn average_predialysis(&self, schedule: &MinuteSchedule) -> f64 {
        let samples: Vec<f64> = schedule
            .session_starts()
            .iter()
            .filter_map(|&minute| self.at(minute))
            .collect();
        if samples.is_empty() {
            return self.initial();
        }
        samples.iter().sum::<f64>() / samples.len() as f64
    }

    pub fn peak(&self) -> f64 {
        self.0.iter().copied().fold(f64::NEG_INFINITY, f64::max)
    }

    pub fn trough(&self) -> f64 {
        self.0.iter().copied().fold(f64::INFINITY, f64::min)
    }
}

impl TryFrom<Vec<f64>> for ConcentrationTrace {
    type Error = UreaKinError;

    fn try_from(values: Vec<f64>) -> Result<Self, Self::Error> {
        if values.is_empty() {
            return Err(UreaKinError::invalid("concentration_trace", "empty"));
        }
        Ok(ConcentrationTrace(values))
    }
}

/// Full two-compartment state over one week
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompartmentTrace {
    pub extracellular: ConcentrationTrace,
    /// Compartment-2 concentration (mg/dL)
    pub intracellular: Vec<f64>,
    /// Compartment-1 volume (mL)
    pub extracellular_volume: Vec<f64>,
    /// Solute in compartment 1 (mg·mL/dL)
    pub extracellular_solute: Vec<f64>,
    /// Solute in compartment 2 (mg·mL/dL)
    pub intracellular_solute: Vec<f64>,
}

impl CompartmentTrace {
    /// Total solute at `minute`
    pub fn total_solute(&self, minute: usize) -> f64 {
        self.extracellular_solute[minute] + self.intracellular_solute[minute]
    }
}

/// Result of an iterative search over the simulator
///
/// `value` is the quantity searched for (an initial concentration or a
/// generation rate) and `trace` the steady-state week it produces.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SolverResult {
    pub value: f64,
    pub trace: ConcentrationTrace,
    pub iterations: usize,
    pub converged: bool,
}

/// Validated parameters with the volume profile precomputed
///
/// The volume profile does not depend on the initial concentration, so the
/// steady-state search prepares it once and reruns only the solute balance.
pub(crate) struct WeekModel<'a> {
    params: &'a SimulationParams,
    v1: Vec<f64>,
    v2: f64,
    generation: f64,
}

impl<'a> WeekModel<'a> {
    pub(crate) fn prepare(params: &'a SimulationParams) -> Result<Self, UreaKinError> {
        let v1 = params.extracellular_volumes()?;
        Ok(Self {
            params,
            v1,
            v2: params.intracellular_volume(),
            generation: params.generation_rate * ML_PER_DL,
        })
    }

    /// Advance the solute balance minute by minute, reporting each new state
    fn integrate(&self, c0: f64, mut record: impl FnMut(&Vector2<f64>, &Vector2<f64>)) {
        let p = self.params;
        let mut solute = Vector2::new(c0 * self.v1[0], c0 * self.v2);
        let mut concentration = Vector2::new(c0, c0);
        record(&concentration, &solute);

        for minute in 0..MINUTES_PER_WEEK {
            let exchange = p.intercompartment_clearance * (concentration[1] - concentration[0]);
            let dialysis = if p.schedule.is_on(minute) {
                p.dialyzer_clearance * concentration[0]
            } else {
                0.0
            };
            let renal = p.residual_clearance * concentration[0];

            solute += Vector2::new(self.generation + exchange - dialysis - renal, -exchange);
            concentration = solute.component_div(&Vector2::new(self.v1[minute + 1], self.v2));
            record(&concentration, &solute);
        }
    }

    pub(crate) fn run(&self, c0: f64) -> ConcentrationTrace {
        let mut values = Vec::with_capacity(MINUTES_PER_WEEK + 1);
        self.integrate(c0, |c, _| values.push(c[0]));
        ConcentrationTrace(values)
    }

    fn run_detailed(&self, c0: f64) -> CompartmentTrace {
        let n = MINUTES_PER_WEEK + 1;
        let mut c1 = Vec::with_capacity(n);
        let mut c2 = Vec::with_capacity(n);
        let mut s1 = Vec::with_capacity(n);
        let mut s2 = Vec::with_capacity(n);
        self.integrate(c0, |c, s| {
            c1.push(c[0]);
            c2.push(c[1]);
            s1.push(s[0]);
            s2.push(s[1]);
        });
        CompartmentTrace {
            extracellular: ConcentrationTrace(c1),
            intracellular: c2,
            extracellular_volume: self.v1.clone(),
            extracellular_solute: s1,
            intracellular_solute: s2,
        }
    }
}

/// Simulate one week from compartment-1 concentration `c0`
///
/// Deterministic: identical inputs give bit-identical traces.
pub fn simulate_week(c0: f64, params: &SimulationParams) -> Result<ConcentrationTrace, UreaKinError> {
    ensure_non_negative("initial_concentration", c0)?;
    Ok(WeekModel::prepare(params)?.run(c0))
}

/// Simulate one week and keep both compartments, volumes and solute masses
pub fn simulate_compartments(
    c0: f64,
    params: &SimulationParams,
) -> Result<CompartmentTrace, UreaKinError> {
    ensure_non_negative("initial_concentration", c0)?;
    Ok(WeekModel::prepare(params)?.run_detailed(c0))
}
