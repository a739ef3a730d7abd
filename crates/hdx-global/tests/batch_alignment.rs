mod common;

use std::sync::Arc;

use common::*;
use hdx_core::{CoverageRules, HdxMeasurement, HdxMeasurementSet};
use hdx_global::forward::{ForwardModel, Penalties};
use hdx_global::{
    fit_deltag_global_batch, AlignedInputs, DeltaGField, GlobalDeltaGOptimizer, GlobalFitConfig,
    NullObserver, RegularizerNorm,
};

#[test]
fn uneven_states_are_padded_and_masked() {
    let apo = measurement("apo", 0.0);
    let short = records("short", &true_deltag(0.0), &PEPTIDES[..3], &TIMES[..4]);
    let short = HdxMeasurement::from_records("short", &short, TEMPERATURE, PH, CoverageRules::default())
        .unwrap();
    let set = HdxMeasurementSet::new(vec![apo, short]).unwrap();
    let inputs = AlignedInputs::from_set(&set, &[k_int()]).unwrap();

    assert_eq!(inputs.n_states(), 2);
    assert_eq!(inputs.n_peptides, PEPTIDES.len());
    assert_eq!(inputs.n_timepoints, TIMES.len());
    assert_eq!(inputs.n_residues, N_RESIDUES);
    assert_eq!(inputs.peptide_counts, vec![6, 3]);
    assert_eq!(inputs.timepoint_counts, vec![7, 4]);
    // padded peptide and padded timepoint of the second state
    assert!(!inputs.mask[inputs.entry(1, 4, 0)]);
    assert!(!inputs.mask[inputs.entry(1, 0, 5)]);
    assert!(inputs.mask[inputs.entry(1, 0, 3)]);
    assert_eq!(inputs.n_valid(), 6 * 7 + 3 * 4);
    assert!(inputs.coverage_row(1, 5).iter().all(|&w| w == 0.0));

    let err = AlignedInputs::from_set(&set, &[k_int(), k_int(), k_int()]).unwrap_err();
    assert_eq!(err.info().code, "rate_tables");
}

fn trajectory(set: &HdxMeasurementSet, config: &GlobalFitConfig, epochs: usize) -> Vec<f64> {
    let inputs = Arc::new(AlignedInputs::from_set(set, &[k_int()]).unwrap());
    let guess = DeltaGField::from_residues(inputs.r_start, vec![14_000.0; inputs.n_residues]).unwrap();
    let mut optimizer = GlobalDeltaGOptimizer::new(inputs, &guess, config.clone()).unwrap();
    for _ in 0..epochs {
        optimizer.step(&mut NullObserver).unwrap();
    }
    optimizer.current_deltag().unwrap()
}

#[test]
fn uncoupled_batch_matches_independent_fits() {
    let config = GlobalFitConfig {
        learning_rate: 0.01,
        r1: 0.0,
        r2: 0.0,
        stop_patience: 1_000,
        ..quick_config(1_000)
    };
    let set = two_state_set();
    let joint = trajectory(&set, &config, 40);

    for (s, state) in set.states().enumerate() {
        let single = HdxMeasurementSet::from(state.clone());
        let alone = trajectory(&single, &config, 40);
        for r in 0..N_RESIDUES {
            let a = joint[s * N_RESIDUES + r];
            let b = alone[r];
            assert!((a - b).abs() < 1e-6, "state {s} residue {r}: {a} vs {b}");
        }
    }
}

fn mean_state_gap(result: &hdx_global::FitResult) -> f64 {
    let apo = result.deltag_of("apo").unwrap();
    let bound = result.deltag_of("bound").unwrap();
    // residue 1 is covered in neither state
    let gaps: Vec<f64> = (1..N_RESIDUES).map(|r| (apo[r] - bound[r]).abs()).collect();
    gaps.iter().sum::<f64>() / gaps.len() as f64
}

#[test]
fn cross_state_penalty_pulls_states_together() {
    let set = two_state_set();
    let free = fit_deltag_global_batch(&set, &[k_int()], &flat_guess(), &quick_config(400)).unwrap();
    let coupled = fit_deltag_global_batch(
        &set,
        &[k_int()],
        &flat_guess(),
        &GlobalFitConfig {
            r2: 50.0,
            ..quick_config(400)
        },
    )
    .unwrap();
    assert!(coupled.losses()[0].reg2 == 0.0);
    assert!(coupled.losses().iter().any(|l| l.reg2 > 0.0));
    assert!(mean_state_gap(&coupled) < mean_state_gap(&free));
}

/// Peptides of a state that never saw the C-terminal peptides 6-12 and 8-12.
const SHORT_PEPTIDES: [(i64, i64); 4] = [(1, 5), (3, 8), (5, 6), (2, 10)];

fn partial_overlap_set() -> HdxMeasurementSet {
    let bound = records("bound", &true_deltag(2_500.0), &SHORT_PEPTIDES, &TIMES);
    let bound = HdxMeasurement::from_records("bound", &bound, TEMPERATURE, PH, CoverageRules::default())
        .unwrap();
    HdxMeasurementSet::new(vec![measurement("apo", 0.0), bound]).unwrap()
}

#[test]
fn partial_overlap_aligns_on_the_shared_axis() {
    let set = partial_overlap_set();
    let inputs = AlignedInputs::from_set(&set, &[k_int()]).unwrap();
    assert_eq!(inputs.n_residues, N_RESIDUES);
    assert_eq!(inputs.peptide_counts, vec![6, 4]);
    let multiplicity = inputs.coverage_multiplicity();
    assert_eq!(multiplicity[0], 0);
    assert!(multiplicity[1..10].iter().all(|&m| m == 2));
    assert_eq!(&multiplicity[10..], &[1, 1]);
    assert!(!inputs.covered[N_RESIDUES + 10]);
    assert!(!inputs.mask[inputs.entry(1, 4, 2)]);
}

#[test]
fn partial_overlap_without_coupling_matches_independent_fits() {
    let config = GlobalFitConfig {
        learning_rate: 0.01,
        r1: 0.0,
        r2: 0.0,
        stop_patience: 1_000,
        ..quick_config(1_000)
    };
    let set = partial_overlap_set();
    let joint = trajectory(&set, &config, 40);
    for (s, state) in set.states().enumerate() {
        let single = HdxMeasurementSet::from(state.clone());
        let alone = trajectory(&single, &config, 40);
        for (r, b) in alone.iter().enumerate() {
            let a = joint[s * N_RESIDUES + r];
            assert!((a - b).abs() < 1e-6, "state {s} residue {r}: {a} vs {b}");
        }
    }
}

#[test]
fn single_state_residues_are_not_coupled() {
    let set = partial_overlap_set();
    let inputs = AlignedInputs::from_set(&set, &[k_int()]).unwrap();
    let model = ForwardModel::cpu(&inputs).unwrap();
    // states agree on every shared residue and differ only where bound has no peptide
    let mut params = vec![15.0; 2 * N_RESIDUES];
    params[N_RESIDUES + 10] = 30.0;
    params[N_RESIDUES + 11] = 5.0;
    let coupled = Penalties { r1: 0.0, r2: 10.0, norm: RegularizerNorm::L2 };
    let free = Penalties { r2: 0.0, ..coupled };
    let with_r2 = model.evaluate(&params, &coupled).unwrap();
    let without = model.evaluate(&params, &free).unwrap();
    assert_eq!(with_r2.reg2, 0.0);
    assert_eq!(with_r2.gradient, without.gradient);
    // nothing reaches the uncovered parameters of bound
    assert_eq!(with_r2.gradient[N_RESIDUES + 10], 0.0);
    assert_eq!(with_r2.gradient[N_RESIDUES + 11], 0.0);
}

#[test]
fn cross_state_penalty_only_pulls_shared_residues() {
    let set = partial_overlap_set();
    let free_config = GlobalFitConfig {
        r1: 0.0,
        ..quick_config(400)
    };
    let coupled_config = GlobalFitConfig {
        r2: 50.0,
        ..free_config.clone()
    };
    let free = fit_deltag_global_batch(&set, &[k_int()], &flat_guess(), &free_config).unwrap();
    let coupled = fit_deltag_global_batch(&set, &[k_int()], &flat_guess(), &coupled_config).unwrap();

    let shared_gap = |result: &hdx_global::FitResult| {
        let apo = result.deltag_of("apo").unwrap();
        let bound = result.deltag_of("bound").unwrap();
        (1..10).map(|r| (apo[r] - bound[r]).abs()).sum::<f64>() / 9.0
    };
    assert!(coupled.losses().iter().any(|l| l.reg2 > 0.0));
    assert!(shared_gap(&coupled) < shared_gap(&free));

    // residues seen by apo only keep the bound guess untouched in both fits
    for result in [&free, &coupled] {
        let bound = result.deltag_of("bound").unwrap();
        assert_eq!(bound[10], 14_000.0);
        assert_eq!(bound[11], 14_000.0);
        let errors = result.get_squared_errors();
        assert_eq!(errors.get(1, 4, 0), None);
        assert_eq!(errors.get(1, 5, 3), None);
        assert!(errors.get(1, 3, 3).is_some());
    }
}
