use criterion::{black_box, criterion_group, criterion_main, Criterion};

use hdx_core::{CoverageRules, HdxMeasurement, HdxMeasurementSet, IntrinsicRateTable, PeptideRecord};
use hdx_global::forward::{ForwardModel, Penalties};
use hdx_global::{fit_deltag_global_batch, AlignedInputs, DeltaGField, GlobalFitConfig};

const N_RESIDUES: usize = 80;

fn state(name: &str, shift: f64) -> HdxMeasurement {
    let times = [0.0, 0.17, 0.5, 1.0, 5.0, 10.0, 30.0, 100.0];
    let mut records = Vec::new();
    for start in (1..70).step_by(3) {
        let end = start + 10;
        for &t in &times {
            let uptake: f64 = ((start + 1)..=end)
                .map(|r: i64| 1.0 - (-(0.01 + 0.05 * ((r + shift as i64) % 7) as f64) * t).exp())
                .sum();
            records.push(PeptideRecord {
                state: name.into(),
                exposure: t,
                start,
                end,
                sequence: String::new(),
                uptake,
                uptake_sd: None,
            });
        }
    }
    HdxMeasurement::from_records(name, &records, 303.15, 8.0, CoverageRules::default())
        .expect("synthetic measurement")
}

fn bench_epoch_loop(c: &mut Criterion) {
    let set = HdxMeasurementSet::new(vec![state("apo", 0.0), state("bound", 3.0)]).expect("set");
    let rates = IntrinsicRateTable::from_slice(1, &[10.0; N_RESIDUES]).expect("rates");
    let initial = DeltaGField::from_residues(1, vec![20_000.0; N_RESIDUES]).expect("guess");
    let inputs = AlignedInputs::from_set(&set, std::slice::from_ref(&rates)).expect("inputs");
    let config = GlobalFitConfig {
        epochs: 200,
        r2: 0.5,
        stop_patience: 1_000,
        log_interval: 0,
        covariance: false,
        ..GlobalFitConfig::default()
    };
    let params = vec![20.0; 2 * N_RESIDUES];
    let penalties = Penalties::from(&config);
    let model = ForwardModel::cpu(&inputs).expect("model");

    c.bench_function("evaluate_two_states", |b| {
        b.iter(|| black_box(model.evaluate(&params, &penalties).expect("evaluate")))
    });
    c.bench_function("batch_fit_200_epochs", |b| {
        b.iter(|| {
            black_box(
                fit_deltag_global_batch(&set, std::slice::from_ref(&rates), &initial, &config)
                    .expect("fit"),
            )
        })
    });
}

criterion_group!(benches, bench_epoch_loop);
criterion_main!(benches);
