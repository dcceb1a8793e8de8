//! Minute-resolution weekly dialysis schedules
//!
//! A [`RegimenSpec`] lays sessions and gaps end to end starting at minute 0.
//! [`build_schedule`] expands it into a [`MinuteSchedule`] of
//! [`MINUTES_PER_WEEK`] on/off flags with a per-minute ultrafiltration rate.

use serde::{Deserialize, Serialize};

use crate::error::{ensure_non_negative, UreaKinError};

pub const MINUTES_PER_DAY: usize = 1440;
pub const MINUTES_PER_WEEK: usize = 7 * MINUTES_PER_DAY;

/// Tolerance on the sum of UF fractions
const FRACTION_TOLERANCE: f64 = 1e-9;

/// Number of dialysis sessions per week
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Frequency {
    TwiceWeekly,
    ThriceWeekly,
}

impl Frequency {
    pub fn sessions(&self) -> usize {
        match self {
            Frequency::TwiceWeekly => 2,
            Frequency::ThriceWeekly => 3,
        }
    }

    /// Longest interdialytic interval in days, over which fluid accumulates
    pub fn fluid_gain_days(&self) -> f64 {
        match self {
            Frequency::TwiceWeekly => 4.0,
            Frequency::ThriceWeekly => 3.0,
        }
    }
}

impl std::fmt::Display for Frequency {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}x/week", self.sessions())
    }
}

/// Sessions, gaps and UF split for one week
///
/// Session `k` is followed by `gaps[k]` minutes off dialysis and removes
/// `uf_fractions[k]` of the weekly ultrafiltration volume.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegimenSpec {
    pub frequency: Frequency,
    pub session_minutes: usize,
    /// Weekly ultrafiltration volume (mL)
    pub weekly_uf_ml: f64,
    pub uf_fractions: Vec<f64>,
    pub gaps: Vec<usize>,
}

impl RegimenSpec {
    /// Conventional layout: Mon/Wed/Fri for 3x, Mon/Thu for 2x
    ///
    /// Each session removes the fluid gained over the interval before it, so
    /// the session after the long break carries the larger UF share.
    pub fn standard(
        frequency: Frequency,
        session_minutes: usize,
        weekly_uf_ml: f64,
    ) -> Result<Self, UreaKinError> {
        let (starts_days, uf_fractions): (&[usize], Vec<f64>) = match frequency {
            Frequency::ThriceWeekly => (&[2, 2, 3], vec![3.0 / 7.0, 2.0 / 7.0, 2.0 / 7.0]),
            Frequency::TwiceWeekly => (&[3, 4], vec![4.0 / 7.0, 3.0 / 7.0]),
        };
        let gaps = starts_days
            .iter()
            .map(|days| {
                (days * MINUTES_PER_DAY)
                    .checked_sub(session_minutes)
                    .ok_or_else(|| {
                        UreaKinError::schedule(format!(
                            "session of {} min does not fit a {}-day slot",
                            session_minutes, days
                        ))
                    })
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self {
            frequency,
            session_minutes,
            weekly_uf_ml,
            uf_fractions,
            gaps,
        })
    }

    /// Total dialysis minutes per week, saturating on overflow
    pub fn on_minutes(&self) -> usize {
        self.session_minutes.saturating_mul(self.frequency.sessions())
    }

    pub fn validate(&self) -> Result<(), UreaKinError> {
        let n = self.frequency.sessions();
        if self.session_minutes == 0 {
            return Err(UreaKinError::invalid("session_minutes", 0));
        }
        ensure_non_negative("weekly_uf_ml", self.weekly_uf_ml)?;
        if self.gaps.len() != n || self.uf_fractions.len() != n {
            return Err(UreaKinError::schedule(format!(
                "{} sessions need {} gaps and UF fractions, got {} and {}",
                n,
                n,
                self.gaps.len(),
                self.uf_fractions.len()
            )));
        }
        if self.uf_fractions.iter().any(|f| !f.is_finite() || *f < 0.0) {
            return Err(UreaKinError::schedule("UF fractions must be finite and non-negative"));
        }
        let fraction_sum: f64 = self.uf_fractions.iter().sum();
        if (fraction_sum - 1.0).abs() > FRACTION_TOLERANCE {
            return Err(UreaKinError::schedule(format!(
                "UF fractions sum to {}, expected 1",
                fraction_sum
            )));
        }
        if self.session_minutes > MINUTES_PER_WEEK {
            return Err(UreaKinError::schedule(format!(
                "session of {} min is longer than one week",
                self.session_minutes
            )));
        }
        if let Some(gap) = self.gaps.iter().find(|&&gap| gap > MINUTES_PER_WEEK) {
            return Err(UreaKinError::schedule(format!(
                "gap of {} min is longer than one week",
                gap
            )));
        }
        self.session_minutes
            .checked_mul(n)
            .and_then(|on| self.gaps.iter().try_fold(on, |acc, &gap| acc.checked_add(gap)))
            .filter(|&total| total <= MINUTES_PER_WEEK)
            .ok_or_else(|| UreaKinError::schedule("sessions and gaps span more than one week"))?;
        if self.on_minutes() >= MINUTES_PER_WEEK {
            return Err(UreaKinError::schedule("no off-dialysis time left in the week"));
        }
        Ok(())
    }
}

/// One week of dialysis on/off flags and UF rates, one entry per minute
///
/// Only [`build_schedule`] and the validating deserializer construct one.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawMinuteSchedule")]
pub struct MinuteSchedule {
    on: Vec<bool>,
    uf_rate: Vec<f64>,
    session_starts: Vec<usize>,
    weekly_uf_ml: f64,
}

#[derive(Deserialize)]
struct RawMinuteSchedule {
    on: Vec<bool>,
    uf_rate: Vec<f64>,
    session_starts: Vec<usize>,
    weekly_uf_ml: f64,
}

impl TryFrom<RawMinuteSchedule> for MinuteSchedule {
    type Error = UreaKinError;

    fn try_from(raw: RawMinuteSchedule) -> Result<Self, Self::Error> {
        let schedule = MinuteSchedule {
            on: raw.on,
            uf_rate: raw.uf_rate,
            session_starts: raw.session_starts,
            weekly_uf_ml: raw.weekly_uf_ml,
        };
        schedule.validate()?;
        Ok(schedule)
    }
}

impl MinuteSchedule {
    /// Check the shape every consumer indexes into
    pub fn validate(&self) -> Result<(), UreaKinError> {
        if self.on.len() != MINUTES_PER_WEEK {
            return Err(UreaKinError::schedule(format!(
                "schedule covers {} min, expected {}",
                self.on.len(),
                MINUTES_PER_WEEK
            )));
        }
        if self.uf_rate.len() != self.on.len() {
            return Err(UreaKinError::schedule(format!(
                "{} UF rates for {} minutes",
                self.uf_rate.len(),
                self.on.len()
            )));
        }
        if self.uf_rate.iter().any(|rate| !rate.is_finite() || *rate < 0.0) {
            return Err(UreaKinError::schedule("UF rates must be finite and non-negative"));
        }
        if let Some(start) = self.session_starts.iter().find(|&&s| s >= MINUTES_PER_WEEK) {
            return Err(UreaKinError::schedule(format!(
                "session start {} lies outside the week",
                start
            )));
        }
        ensure_non_negative("weekly_uf_ml", self.weekly_uf_ml)?;
        if self.off_minutes() == 0 {
            return Err(UreaKinError::schedule("no off-dialysis time left in the week"));
        }
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.on.len()
    }

    pub fn is_empty(&self) -> bool {
        self.on.is_empty()
    }

    pub fn is_on(&self, minute: usize) -> bool {
        self.on[minute]
    }

    /// Ultrafiltration rate (mL/min) during `minute`, zero when off
    pub fn uf_rate(&self, minute: usize) -> f64 {
        self.uf_rate[minute]
    }

    pub fn flags(&self) -> &[bool] {
        &self.on
    }

    pub fn session_starts(&self) -> &[usize] {
        &self.session_starts
    }

    pub fn weekly_uf_ml(&self) -> f64 {
        self.weekly_uf_ml
    }

    pub fn on_minutes(&self) -> usize {
        self.on.iter().filter(|&&on| on).count()
    }

    pub fn off_minutes(&self) -> usize {
        self.len() - self.on_minutes()
    }

    /// Off-dialysis minutes at the end of the week, continuing into minute 0
    pub fn trailing_off_minutes(&self) -> usize {
        self.on.iter().rev().take_while(|&&on| !on).count()
    }
}

/// Expand a [`RegimenSpec`] into a [`MinuteSchedule`]
///
/// Any shortfall against a full week is padded as off time at the end.
pub fn build_schedule(spec: &RegimenSpec) -> Result<MinuteSchedule, UreaKinError> {
    spec.validate()?;

    let mut on = Vec::with_capacity(MINUTES_PER_WEEK);
    let mut uf_rate = Vec::with_capacity(MINUTES_PER_WEEK);
    let mut session_starts = Vec::with_capacity(spec.gaps.len());
    let session = spec.session_minutes as f64;

    for (fraction, gap) in spec.uf_fractions.iter().zip(&spec.gaps) {
        session_starts.push(on.len());
        let rate = spec.weekly_uf_ml * fraction / session;
        on.extend(std::iter::repeat(true).take(spec.session_minutes));
        uf_rate.extend(std::iter::repeat(rate).take(spec.session_minutes));
        on.extend(std::iter::repeat(false).take(*gap));
        uf_rate.extend(std::iter::repeat(0.0).take(*gap));
    }

    let padding = MINUTES_PER_WEEK - on.len();
    if padding > 0 {
        tracing::debug!("Padding schedule with {} off-dialysis minutes", padding);
        on.extend(std::iter::repeat(false).take(padding));
        uf_rate.extend(std::iter::repeat(0.0).take(padding));
    }

    Ok(MinuteSchedule {
        on,
        uf_rate,
        session_starts,
        weekly_uf_ml: spec.weekly_uf_ml,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_standard_thrice_weekly_layout() {
        let spec = RegimenSpec::standard(Frequency::ThriceWeekly, 240, 2000.0).unwrap();
        assert_eq!(spec.gaps, vec![2640, 2640, 4080]);
        let schedule = build_schedule(&spec).unwrap();

        assert_eq!(schedule.len(), MINUTES_PER_WEEK);
        assert_eq!(schedule.on_minutes(), 720);
        assert_eq!(schedule.flags().iter().filter(|&&on| on).count(), 720);
        assert_eq!(schedule.on_minutes() + schedule.off_minutes(), MINUTES_PER_WEEK);
        assert_eq!(schedule.session_starts(), &[0, 2880, 5760]);
        assert_eq!(schedule.trailing_off_minutes(), 4080);
        assert!(schedule.is_on(0) && schedule.is_on(239) && !schedule.is_on(240));
        assert!(schedule.is_on(5760 + 239) && !schedule.is_on(6000));
    }

    #[test]
    fn test_standard_twice_weekly_layout() {
        let spec = RegimenSpec::standard(Frequency::TwiceWeekly, 300, 2000.0).unwrap();
        let schedule = build_schedule(&spec).unwrap();
        assert_eq!(schedule.session_starts(), &[0, 4320]);
        assert_eq!(schedule.trailing_off_minutes(), 4 * MINUTES_PER_DAY - 300);
    }

    #[test]
    fn test_uf_rate_distributes_weekly_volume() {
        let spec = RegimenSpec::standard(Frequency::ThriceWeekly, 240, 2100.0).unwrap();
        let schedule = build_schedule(&spec).unwrap();

        assert_relative_eq!(schedule.uf_rate(0), 900.0 / 240.0, epsilon = 1e-12);
        assert_relative_eq!(schedule.uf_rate(2880), 600.0 / 240.0, epsilon = 1e-12);
        assert_eq!(schedule.uf_rate(240), 0.0);

        let removed: f64 = (0..schedule.len()).map(|i| schedule.uf_rate(i)).sum();
        assert_relative_eq!(removed, 2100.0, epsilon = 1e-9);
    }

    #[test]
    fn test_short_week_is_padded() {
        let spec = RegimenSpec {
            frequency: Frequency::TwiceWeekly,
            session_minutes: 240,
            weekly_uf_ml: 1000.0,
            uf_fractions: vec![0.5, 0.5],
            gaps: vec![1000, 1000],
        };
        let schedule = build_schedule(&spec).unwrap();
        assert_eq!(schedule.len(), MINUTES_PER_WEEK);
        assert_eq!(schedule.on_minutes(), 480);
        assert_eq!(schedule.trailing_off_minutes(), MINUTES_PER_WEEK - 240 - 1000 - 240);
    }

    #[test]
    fn test_overlong_week_is_rejected() {
        let spec = RegimenSpec {
            frequency: Frequency::TwiceWeekly,
            session_minutes: 240,
            weekly_uf_ml: 1000.0,
            uf_fractions: vec![0.5, 0.5],
            gaps: vec![5000, 5000],
        };
        assert!(matches!(
            build_schedule(&spec),
            Err(UreaKinError::ScheduleInconsistency { .. })
        ));
    }

    #[test]
    fn test_fractions_must_sum_to_one() {
        let mut spec = RegimenSpec::standard(Frequency::ThriceWeekly, 240, 2000.0).unwrap();
        spec.uf_fractions = vec![0.5, 0.5, 0.5];
        assert!(matches!(
            build_schedule(&spec),
            Err(UreaKinError::ScheduleInconsistency { .. })
        ));
    }

    #[test]
    fn test_overflowing_gaps_are_rejected() {
        let spec = RegimenSpec {
            frequency: Frequency::TwiceWeekly,
            session_minutes: 240,
            weekly_uf_ml: 1000.0,
            uf_fractions: vec![0.5, 0.5],
            gaps: vec![usize::MAX, 10],
        };
        assert!(matches!(
            build_schedule(&spec),
            Err(UreaKinError::ScheduleInconsistency { .. })
        ));
    }

    #[test]
    fn test_overflowing_session_is_rejected() {
        let spec = RegimenSpec {
            frequency: Frequency::ThriceWeekly,
            session_minutes: usize::MAX / 2,
            weekly_uf_ml: 1000.0,
            uf_fractions: vec![1.0 / 3.0, 1.0 / 3.0, 1.0 / 3.0],
            gaps: vec![10, 10, 10],
        };
        assert_eq!(spec.on_minutes(), usize::MAX);
        assert!(matches!(
            build_schedule(&spec),
            Err(UreaKinError::ScheduleInconsistency { .. })
        ));
    }

    fn tampered(field: &str, value: serde_json::Value) -> Result<MinuteSchedule, serde_json::Error> {
        let spec = RegimenSpec::standard(Frequency::ThriceWeekly, 240, 2000.0).unwrap();
        let mut json = serde_json::to_value(build_schedule(&spec).unwrap()).unwrap();
        json[field] = value;
        serde_json::from_value(json)
    }

    #[test]
    fn test_schedule_json_round_trip() {
        let spec = RegimenSpec::standard(Frequency::ThriceWeekly, 240, 2000.0).unwrap();
        let schedule = build_schedule(&spec).unwrap();
        let json = serde_json::to_string(&schedule).unwrap();
        let parsed: MinuteSchedule = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, schedule);
    }

    #[test]
    fn test_tampered_schedule_json_is_rejected() {
        assert!(tampered("uf_rate", serde_json::json!([])).is_err());
        assert!(tampered("session_starts", serde_json::json!([0, 20000])).is_err());
        assert!(tampered("weekly_uf_ml", serde_json::json!(-1.0)).is_err());
        assert!(tampered("on", serde_json::json!([true, false])).is_err());
        assert!(tampered("weekly_uf_ml", serde_json::json!(500.0)).is_ok());
    }

    #[test]
    fn test_session_too_long_for_slot() {
        assert!(RegimenSpec::standard(Frequency::ThriceWeekly, 3000, 0.0).is_err());
    }

    #[test]
    fn test_zero_session_rejected() {
        let spec = RegimenSpec::standard(Frequency::ThriceWeekly, 0, 2000.0).unwrap();
        assert!(matches!(
            build_schedule(&spec),
            Err(UreaKinError::InvalidInput { .. })
        ));
    }
}
