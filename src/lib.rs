pub mod error;
pub mod patient;
pub mod prescription;
pub mod regimen;
pub mod schedule;
pub mod simulator;

pub use error::UreaKinError;
pub use patient::{estimate_volume, PatientParameters, Sex, VolumeInput};
pub use prescription::{
    assess_ultrafiltration, solve_session_duration, std_ktv_at, DurationSearchOptions,
    SessionDuration,
};
pub use regimen::{compare_regimens, ComparisonOptions, PrescriptionInput, RegimenComparison};
pub use schedule::{build_schedule, Frequency, MinuteSchedule, RegimenSpec};
pub use simulator::{
    calibrate_generation_rate, dialyzer_clearance, find_steady_state, simulate_compartments,
    simulate_week, ConcentrationTrace, SimulationParams, SolverResult,
};

pub mod prelude {
    pub mod prescription {
        pub use crate::prescription::calc::{
            equilibrated_ktv, fluid_accumulation_ml, leypoldt_std_ktv, residual_ktv,
            ultrafiltration_rate,
        };
        pub use crate::prescription::{StdKtvModel, UfAdvisory, UfAssessment};
    }
    pub mod simulator {
        pub use crate::simulator::{
            CalibrationOptions, CompartmentTrace, KdConvention, SteadyStateOptions,
        };
    }

    pub use crate::error::UreaKinError;
    pub use crate::patient::{estimate_volume, PatientParameters, Sex, VolumeInput};
    pub use crate::prescription::{
        assess_ultrafiltration, solve_session_duration, std_ktv_at, DurationSearchOptions,
        SessionDuration,
    };
    pub use crate::regimen::{
        compare_regimens, ComparisonOptions, MeasurementDay, PrescriptionInput, RegimenComparison,
        RegimenLabel, RegimenOutcome, Warning,
    };
    pub use crate::schedule::{build_schedule, Frequency, MinuteSchedule, RegimenSpec};
    pub use crate::simulator::{
        calibrate_generation_rate, dialyzer_clearance, find_steady_state, simulate_compartments,
        simulate_week, CalibrationOptions, ConcentrationTrace, KdConvention, SimulationParams,
        SolverResult, SteadyStateOptions,
    };
}
