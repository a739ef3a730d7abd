#![allow(dead_code)]

use hdx_core::{
    CoverageRules, HdxMeasurement, HdxMeasurementSet, IntrinsicRateTable, PeptideRecord,
};
use hdx_global::{DeltaGField, GlobalFitConfig};
use hdx_kinetics::k_obs;

pub const TEMPERATURE: f64 = 300.0;
pub const PH: f64 = 8.0;
pub const R_START: i64 = 1;
pub const N_RESIDUES: usize = 12;
pub const TIMES: [f64; 7] = [0.0, 0.5, 1.0, 5.0, 10.0, 60.0, 300.0];
pub const PEPTIDES: [(i64, i64); 6] = [(1, 5), (3, 8), (5, 6), (6, 12), (2, 10), (8, 12)];

pub fn k_int() -> IntrinsicRateTable {
    IntrinsicRateTable::from_slice(R_START, &[10.0; N_RESIDUES]).unwrap()
}

/// Known deltaG (J/mol) of residues 1..=12.
pub fn true_deltag(shift: f64) -> Vec<f64> {
    (0..N_RESIDUES)
        .map(|i| 15_000.0 + 4_000.0 * ((i as f64) * 0.7).sin() + shift)
        .collect()
}

pub fn records(state: &str, deltag: &[f64], peptides: &[(i64, i64)], times: &[f64]) -> Vec<PeptideRecord> {
    let table = k_int();
    let mut out = Vec::new();
    for &(start, end) in peptides {
        for &t in times {
            let uptake: f64 = ((start + 1)..=end)
                .map(|r| {
                    let k = k_obs(deltag[(r - R_START) as usize], table.k_int(r), TEMPERATURE);
                    1.0 - (-k * t).exp()
                })
                .sum();
            out.push(PeptideRecord {
                state: state.to_string(),
                exposure: t,
                start,
                end,
                sequence: String::new(),
                uptake,
                uptake_sd: None,
            });
        }
    }
    out
}

pub fn measurement(state: &str, shift: f64) -> HdxMeasurement {
    let data = records(state, &true_deltag(shift), &PEPTIDES, &TIMES);
    HdxMeasurement::from_records(state, &data, TEMPERATURE, PH, CoverageRules::default()).unwrap()
}

pub fn two_state_set() -> HdxMeasurementSet {
    HdxMeasurementSet::new(vec![measurement("apo", 0.0), measurement("bound", 2_500.0)]).unwrap()
}

pub fn flat_guess() -> DeltaGField {
    DeltaGField::from_residues(R_START, vec![14_000.0; N_RESIDUES]).unwrap()
}

pub fn quick_config(epochs: usize) -> GlobalFitConfig {
    GlobalFitConfig {
        epochs,
        r1: 0.1,
        log_interval: 0,
        covariance: false,
        ..GlobalFitConfig::default()
    }
}
