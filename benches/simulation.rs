use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion};
use std::hint::black_box;
use ureakin::prelude::*;

fn patient() -> PatientParameters {
    PatientParameters::builder(35.0, 70.0)
        .current_treatment(1.4, 240.0)
        .weekly_uf(2.0)
        .generation_rate(8.0)
        .build()
        .unwrap()
}

fn params(frequency: Frequency, minutes: usize) -> SimulationParams {
    let p = patient();
    let spec = RegimenSpec::standard(frequency, minutes, 2000.0).unwrap();
    let kd = dialyzer_clearance(&p, Frequency::ThriceWeekly, KdConvention::default()).unwrap();
    SimulationParams::new(build_schedule(&spec).unwrap(), &p, kd)
}

fn bench_single_week(c: &mut Criterion) {
    let params = params(Frequency::ThriceWeekly, 240);
    c.bench_function("simulate_week", |b| {
        b.iter(|| {
            let trace = simulate_week(black_box(80.0), black_box(&params)).unwrap();
            black_box(trace);
        });
    });
}

fn bench_steady_state(c: &mut Criterion) {
    let mut group = c.benchmark_group("steady_state");
    let options = SteadyStateOptions::default();
    for (frequency, minutes) in [(Frequency::ThriceWeekly, 240), (Frequency::TwiceWeekly, 360)] {
        let params = params(frequency, minutes);
        group.bench_with_input(
            BenchmarkId::from_parameter(frequency),
            &params,
            |b, params| {
                b.iter(|| {
                    let result = find_steady_state(black_box(params), 100.0, &options).unwrap();
                    black_box(result);
                });
            },
        );
    }
    group.finish();
}

fn bench_duration_search(c: &mut Criterion) {
    let p = patient();
    let options = DurationSearchOptions::default();
    c.bench_function("solve_session_duration", |b| {
        b.iter(|| {
            let result =
                solve_session_duration(black_box(&p), Frequency::TwiceWeekly, 2.1, &options)
                    .unwrap();
            black_box(result);
        });
    });
}

fn bench_compare_regimens(c: &mut Criterion) {
    let input = PrescriptionInput {
        volume: VolumeInput::Direct { volume_l: 35.0 },
        weight_kg: 70.0,
        sp_ktv: 1.4,
        session_minutes: 240.0,
        weekly_uf_l: 2.0,
        residual_clearance: 0.0,
        target_std_ktv: 2.1,
        generation_rate: 8.0,
        intercompartment_clearance: None,
        measured_pun: Some(60.0),
        measurement_day: MeasurementDay::Monday,
    };
    let options = ComparisonOptions::default();

    let mut group = c.benchmark_group("compare_regimens");
    group.sample_size(10);
    group.bench_function("calibrated", |b| {
        b.iter(|| {
            let comparison = compare_regimens(black_box(&input), &options).unwrap();
            black_box(comparison);
        });
    });
    group.finish();
}

criterion_group!(
    benches,
    bench_single_week,
    bench_steady_state,
    bench_duration_search,
    bench_compare_regimens
);
criterion_main!(benches);
