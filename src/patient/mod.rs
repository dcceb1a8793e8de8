//! Patient description: urea distribution volume and kinetic parameters
//!
//! The distribution volume is either supplied directly (e.g. from a previous
//! formal urea kinetic model) or estimated from anthropometrics with the
//! Watson regression, scaled by 0.9.

use serde::{Deserialize, Serialize};

use crate::error::{ensure_non_negative, ensure_positive, UreaKinError};

/// Correction applied to the Watson total body water estimate
pub const WATSON_CORRECTION: f64 = 0.9;

/// Default inter-compartment clearance per mL of distribution volume (mL/min)
pub const KIC_PER_ML: f64 = 0.016;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Sex {
    Male,
    Female,
}

/// How the urea distribution volume is obtained
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "method", rename_all = "snake_case")]
pub enum VolumeInput {
    /// Volume in litres, taken as is
    Direct {
        #[serde(default)]
        volume_l: f64,
    },
    /// Watson regression from age (yr), height (cm) and weight (kg)
    Anthropometric {
        #[serde(default)]
        age: f64,
        #[serde(default)]
        height_cm: f64,
        #[serde(default)]
        weight_kg: f64,
        sex: Sex,
    },
}

/// Estimate the urea distribution volume in litres
///
/// Fails with [`UreaKinError::InvalidInput`] when a field is non-finite or the
/// resulting volume is not positive.
pub fn estimate_volume(input: &VolumeInput) -> Result<f64, UreaKinError> {
    match *input {
        VolumeInput::Direct { volume_l } => ensure_positive("volume_l", volume_l),
        VolumeInput::Anthropometric {
            age,
            height_cm,
            weight_kg,
            sex,
        } => {
            for (param, value) in [("age", age), ("height_cm", height_cm), ("weight_kg", weight_kg)]
            {
                if !value.is_finite() {
                    return Err(UreaKinError::invalid(param, value));
                }
            }
            let watson = match sex {
                Sex::Male => 2.447 - 0.09156 * age + 0.1074 * height_cm + 0.3362 * weight_kg,
                Sex::Female => -2.097 + 0.1069 * height_cm + 0.2466 * weight_kg,
            };
            ensure_positive("volume_l", watson * WATSON_CORRECTION)
        }
    }
}

/// Kinetic description of a patient on their current regimen
///
/// `session_minutes` and `sp_ktv` describe the current (measured) treatment,
/// which anchors both the session-duration search and the dialyzer clearance.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PatientParameters {
    /// Urea distribution volume (L)
    pub volume_l: f64,
    /// Body weight (kg)
    pub weight_kg: f64,
    /// Residual renal urea clearance Kru (mL/min)
    pub residual_clearance: f64,
    /// Measured single-pool Kt/V of the current session
    pub sp_ktv: f64,
    /// Current session duration (min)
    pub session_minutes: f64,
    /// Weekly ultrafiltration volume (L)
    pub weekly_uf_l: f64,
    /// Urea nitrogen generation rate G (mg/min)
    pub generation_rate: f64,
    /// Inter-compartment clearance Kic (mL/min)
    pub intercompartment_clearance: f64,
}

impl PatientParameters {
    pub fn builder(volume_l: f64, weight_kg: f64) -> PatientBuilder {
        PatientBuilder::new(volume_l, weight_kg)
    }

    /// Distribution volume in mL
    pub fn volume_ml(&self) -> f64 {
        self.volume_l * 1000.0
    }

    /// Check every field before it reaches a solver
    pub fn validate(&self) -> Result<(), UreaKinError> {
        ensure_positive("volume_l", self.volume_l)?;
        ensure_positive("weight_kg", self.weight_kg)?;
        ensure_positive("sp_ktv", self.sp_ktv)?;
        ensure_positive("session_minutes", self.session_minutes)?;
        ensure_non_negative("residual_clearance", self.residual_clearance)?;
        ensure_non_negative("weekly_uf_l", self.weekly_uf_l)?;
        ensure_non_negative("generation_rate", self.generation_rate)?;
        ensure_non_negative("intercompartment_clearance", self.intercompartment_clearance)?;
        Ok(())
    }
}

/// Builder for [`PatientParameters`]
///
/// Kic defaults to `0.016 × V` (mL/min, V in mL) unless set explicitly.
#[derive(Debug, Clone)]
pub struct PatientBuilder {
    volume_l: f64,
    weight_kg: f64,
    residual_clearance: f64,
    sp_ktv: f64,
    session_minutes: f64,
    weekly_uf_l: f64,
    generation_rate: f64,
    intercompartment_clearance: Option<f64>,
}

impl PatientBuilder {
    pub fn new(volume_l: f64, weight_kg: f64) -> Self {
        Self {
            volume_l,
            weight_kg,
            residual_clearance: 0.0,
            sp_ktv: 0.0,
            session_minutes: 0.0,
            weekly_uf_l: 0.0,
            generation_rate: 0.0,
            intercompartment_clearance: None,
        }
    }

    /// Current treatment: measured spKt/V over a session of `minutes`
    pub fn current_treatment(mut self, sp_ktv: f64, minutes: f64) -> Self {
        self.sp_ktv = sp_ktv;
        self.session_minutes = minutes;
        self
    }

    pub fn residual_clearance(mut self, kru: f64) -> Self {
        self.residual_clearance = kru;
        self
    }

    pub fn weekly_uf(mut self, litres: f64) -> Self {
        self.weekly_uf_l = litres;
        self
    }

    pub fn generation_rate(mut self, g: f64) -> Self {
        self.generation_rate = g;
        self
    }

    pub fn intercompartment_clearance(mut self, kic: f64) -> Self {
        self.intercompartment_clearance = Some(kic);
        self
    }

    pub fn build(self) -> Result<PatientParameters, UreaKinError> {
        let patient = PatientParameters {
            volume_l: self.volume_l,
            weight_kg: self.weight_kg,
            residual_clearance: self.residual_clearance,
            sp_ktv: self.sp_ktv,
            session_minutes: self.session_minutes,
            weekly_uf_l: self.weekly_uf_l,
            generation_rate: self.generation_rate,
            intercompartment_clearance: self
                .intercompartment_clearance
                .unwrap_or(KIC_PER_ML * self.volume_l * 1000.0),
        };
        patient.validate()?;
        Ok(patient)
    }
}
