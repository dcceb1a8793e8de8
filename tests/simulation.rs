use approx::assert_relative_eq;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use ureakin::prelude::*;

fn patient(generation_rate: f64) -> PatientParameters {
    PatientParameters::builder(35.0, 70.0)
        .current_treatment(1.4, 240.0)
        .weekly_uf(2.0)
        .generation_rate(generation_rate)
        .build()
        .expect("valid patient")
}

fn thrice_weekly(p: &PatientParameters, weekly_uf_ml: f64) -> SimulationParams {
    let spec = RegimenSpec::standard(Frequency::ThriceWeekly, 240, weekly_uf_ml).unwrap();
    let kd = dialyzer_clearance(p, Frequency::ThriceWeekly, KdConvention::default()).unwrap();
    SimulationParams::new(build_schedule(&spec).unwrap(), p, kd)
}

#[test]
fn simulation_is_deterministic() {
    let params = thrice_weekly(&patient(8.0), 2000.0);
    let first = simulate_week(80.0, &params).unwrap();
    let second = simulate_week(80.0, &params).unwrap();
    assert_eq!(first.values(), second.values());
    assert_eq!(first.len(), 10_081);
}

#[test]
fn closed_system_conserves_solute() {
    let mut rng = StdRng::seed_from_u64(42);

    for _ in 0..5 {
        let c0 = rng.random_range(10.0..200.0);
        let kic = rng.random_range(100.0..1000.0);
        let fraction = rng.random_range(0.2..0.5);

        let mut params = thrice_weekly(&patient(0.0), 0.0).with_extracellular_fraction(fraction);
        params.dialyzer_clearance = 0.0;
        params.residual_clearance = 0.0;
        params.intercompartment_clearance = kic;

        let trace = simulate_compartments(c0, &params).unwrap();
        let initial = trace.total_solute(0);
        assert_relative_eq!(initial, c0 * params.volume_ml, max_relative = 1e-12);
        for minute in [1, 240, 2880, 10_080] {
            assert_relative_eq!(trace.total_solute(minute), initial, max_relative = 1e-9);
        }
    }
}

#[test]
fn solute_balance_holds_every_minute() {
    let mut p = patient(8.0);
    p.residual_clearance = 2.0;
    let params = thrice_weekly(&p, 2000.0);
    let trace = simulate_compartments(60.0, &params).unwrap();

    let generation = params.generation_rate * 100.0;
    for minute in 0..10_080 {
        let c1 = trace.extracellular.values()[minute];
        let dialysis = if params.schedule.is_on(minute) {
            params.dialyzer_clearance
        } else {
            0.0
        };
        let expected = trace.total_solute(minute) + generation
            - (dialysis + params.residual_clearance) * c1;
        assert_relative_eq!(
            trace.total_solute(minute + 1),
            expected,
            max_relative = 1e-9
        );
    }
}

#[test]
fn volume_returns_to_its_starting_point() {
    let params = thrice_weekly(&patient(8.0), 2000.0);
    let trace = simulate_compartments(60.0, &params).unwrap();
    let volumes = &trace.extracellular_volume;
    assert_eq!(volumes.len(), 10_081);
    assert_relative_eq!(volumes[0], volumes[10_080], max_relative = 1e-9);
    assert!(volumes.iter().all(|&v| v > 0.0));
}

#[test]
fn concentration_drops_during_sessions() {
    let params = thrice_weekly(&patient(8.0), 2000.0);
    let steady = find_steady_state(&params, 100.0, &SteadyStateOptions::default()).unwrap();
    assert!(steady.converged);

    for &start in params.schedule.session_starts() {
        let before = steady.trace.values()[start];
        let after = steady.trace.values()[start + 240];
        assert!(after < before, "session at {} did not clear urea", start);
    }
    assert!(steady.trace.peak() > steady.trace.time_averaged());
    assert!(steady.trace.trough() < steady.trace.time_averaged());
}

#[test]
fn steady_state_scales_with_generation() {
    let options = SteadyStateOptions::default();
    let low = find_steady_state(&thrice_weekly(&patient(4.0), 2000.0), 50.0, &options).unwrap();
    let high = find_steady_state(&thrice_weekly(&patient(8.0), 2000.0), 50.0, &options).unwrap();
    assert!(low.converged && high.converged);
    // The solute balance is linear in (c0, G)
    assert_relative_eq!(high.value, 2.0 * low.value, max_relative = 1e-4);
}

#[test]
fn longer_sessions_lower_the_time_averaged_concentration() {
    let p = patient(8.0);
    let kd = dialyzer_clearance(&p, Frequency::ThriceWeekly, KdConvention::default()).unwrap();
    let options = SteadyStateOptions::default();

    let tac = |minutes: usize| {
        let spec = RegimenSpec::standard(Frequency::ThriceWeekly, minutes, 2000.0).unwrap();
        let params = SimulationParams::new(build_schedule(&spec).unwrap(), &p, kd);
        find_steady_state(&params, 80.0, &options)
            .unwrap()
            .trace
            .time_averaged()
    };
    assert!(tac(300) < tac(240));
}
