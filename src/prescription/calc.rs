//! Pure dose calculations for the session-duration search
//!
//! All functions take validated inputs; [`StdKtvModel::new`] is the single
//! place where the patient's parameters are checked.

use crate::error::{ensure_positive, UreaKinError};
use crate::patient::PatientParameters;
use crate::schedule::{Frequency, MINUTES_PER_WEEK};

/// Post-dialysis urea rebound window (min)
pub const REBOUND_MINUTES: f64 = 30.0;

/// Coefficient of the ultrafiltration correction to std Kt/V
pub const UF_COEFFICIENT: f64 = 0.74;

const WEEK: f64 = MINUTES_PER_WEEK as f64;

/// Equilibrated Kt/V from single-pool Kt/V (rate equation)
#[inline]
pub fn equilibrated_ktv(sp_ktv: f64, minutes: f64) -> f64 {
    sp_ktv * minutes / (minutes + REBOUND_MINUTES)
}

/// Leypoldt standardized Kt/V for `sessions` treatments of `minutes` per week
#[inline]
pub fn leypoldt_std_ktv(e_ktv: f64, minutes: f64, sessions: usize) -> f64 {
    let a = 1.0 - (-e_ktv).exp();
    (WEEK * a / minutes) / (a / e_ktv + WEEK / (sessions as f64 * minutes) - 1.0)
}

/// Weekly Kt/V contributed by residual renal clearance
#[inline]
pub fn residual_ktv(kru: f64, volume_ml: f64) -> f64 {
    WEEK * kru / volume_ml
}

/// Fluid removed per session after the longest interdialytic interval (mL)
#[inline]
pub fn fluid_accumulation_ml(weekly_uf_l: f64, frequency: Frequency) -> f64 {
    weekly_uf_l / 7.0 * frequency.fluid_gain_days() * 1000.0
}

/// Ultrafiltration rate (mL/kg/h) needed to remove the accumulated fluid
#[inline]
pub fn ultrafiltration_rate(accumulation_ml: f64, minutes: f64, weight_kg: f64) -> f64 {
    accumulation_ml / (minutes / 60.0 * weight_kg)
}

/// Session duration (min) at which the UF rate equals `limit`
#[inline]
pub fn uf_limited_minutes(accumulation_ml: f64, weight_kg: f64, limit: f64) -> f64 {
    60.0 * accumulation_ml / (weight_kg * limit)
}

/// std Kt/V as a function of session duration for one patient and frequency
///
/// The effective clearance `Keff` is derived once from the current measured
/// treatment and held constant while the duration varies.
#[derive(Debug, Clone, Copy)]
pub struct StdKtvModel {
    frequency: Frequency,
    volume_ml: f64,
    keff: f64,
    uf_factor: f64,
    kru_add: f64,
}

impl StdKtvModel {
    pub fn new(patient: &PatientParameters, frequency: Frequency) -> Result<Self, UreaKinError> {
        patient.validate()?;
        let volume_ml = patient.volume_ml();
        let sessions = frequency.sessions() as f64;

        let e_ktv = equilibrated_ktv(patient.sp_ktv, patient.session_minutes);
        let keff = volume_ml * e_ktv / patient.session_minutes;

        let uf_denominator = 1.0 - UF_COEFFICIENT * patient.weekly_uf_l / (sessions * patient.volume_l);
        ensure_positive("uf_correction_denominator", uf_denominator)?;

        Ok(Self {
            frequency,
            volume_ml,
            keff,
            uf_factor: 1.0 / uf_denominator,
            kru_add: residual_ktv(patient.residual_clearance, volume_ml),
        })
    }

    pub fn frequency(&self) -> Frequency {
        self.frequency
    }

    /// Effective (rebound-corrected) dialyzer clearance, mL/min
    pub fn keff(&self) -> f64 {
        self.keff
    }

    pub fn uf_factor(&self) -> f64 {
        self.uf_factor
    }

    pub fn sp_ktv(&self, minutes: f64) -> f64 {
        self.keff * (minutes + REBOUND_MINUTES) / self.volume_ml
    }

    /// UF- and residual-function-adjusted std Kt/V
    pub fn std_ktv(&self, minutes: f64) -> f64 {
        let e_ktv = equilibrated_ktv(self.sp_ktv(minutes), minutes);
        self.uf_factor * leypoldt_std_ktv(e_ktv, minutes, self.frequency.sessions()) + self.kru_add
    }
}
